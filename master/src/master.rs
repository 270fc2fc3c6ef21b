//! The synchronization master: shared training state, message handlers,
//! and the lifecycle around the mode loops.
//!
//! Locking: `core` (the parameter plus the delta ring) is the one mutex
//! shared between handler tasks and the mode loop; it is never held across
//! an await. Counters are atomics. The per-worker `wt_*` telemetry scalars
//! live outside any lock.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Instant,
};

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::UnboundedReceiver;

use comms::msg::{Ctl, Msg, reply};
use ml_core::{Model, OptimizerSpec, Parameter};

use crate::{
    accumulator::DeltaPool,
    archive::{self, Archiver},
    atomic::AtomicF64,
    config::{MasterConfig, Mode},
    error::{MasterErr, Result},
    interval::{self, IntervalEstimator},
    modes,
    net::Transport,
    registry::{ReplyRegistry, Tag},
    selector::{self, ReceiverSelector},
    sizer::{self, Timing},
    stats::Stats,
    sync::{AnyUnit, EachUnit},
    telemetry::Telemetry,
    worker_map::WorkerMap,
};

/// Which delta handler is wired in; mode init swaps the entry, the
/// termination path swaps in the tail drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeltaSlot {
    Bsp,
    Tap,
    Ssp,
    Sap,
    Fsp,
    Aap,
    Pap,
    Tail,
}

impl DeltaSlot {
    fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Bsp => DeltaSlot::Bsp,
            Mode::Tap => DeltaSlot::Tap,
            Mode::Ssp => DeltaSlot::Ssp,
            Mode::Sap => DeltaSlot::Sap,
            Mode::Fsp => DeltaSlot::Fsp,
            Mode::Aap => DeltaSlot::Aap,
            Mode::Pap => DeltaSlot::Pap,
        }
    }
}

/// The state guarded by the accumulator mutex.
pub(crate) struct Core {
    pub model: Model,
    pub pool: DeltaPool,
}

impl Core {
    /// Applies the stale slots `1..=d` straight to the parameter and
    /// returns the datapoints credited. The ring itself is untouched.
    pub fn apply_stale(&mut self, d: usize, factor: f64) -> u64 {
        let Core { model, pool } = self;
        let mut credited = 0;
        for (slot, dp) in pool.stale_slots(d) {
            model.accumulate_parameter(slot, factor);
            credited += dp;
        }
        credited
    }
}

struct DatasetShape {
    nx: u64,
    ny: u64,
}

pub struct Master {
    conf: MasterConfig,
    net: Arc<dyn Transport>,
    pub(crate) wm: WorkerMap,
    pub(crate) rph: ReplyRegistry,
    pub stats: Stats,
    pub(crate) telemetry: Telemetry,

    pub(crate) core: Mutex<Core>,
    pub(crate) factor_delta: f64,

    iter: AtomicU64,
    pub(crate) n_delta: AtomicU64,
    pub(crate) n_point_proc: AtomicU64,
    n_point_dataset: AtomicU64,
    n_point_worker: Mutex<Vec<u64>>,
    dataset_shape: Mutex<DatasetShape>,
    fatal: Mutex<Option<MasterErr>>,

    pub(crate) delta_iter: Vec<AtomicU64>,
    pub(crate) last_delta_source: AtomicUsize,
    global_batch_size: AtomicU64,
    local_report_size: AtomicU64,
    loss_global: AtomicF64,

    pub(crate) su_online: Arc<EachUnit>,
    pub(crate) su_worker: Arc<EachUnit>,
    pub(crate) su_dataset: Arc<EachUnit>,
    pub(crate) su_ready: Arc<EachUnit>,
    pub(crate) su_param: Arc<EachUnit>,
    pub(crate) su_tpause: Arc<EachUnit>,
    pub(crate) su_tcontinue: Arc<EachUnit>,
    pub(crate) su_all_closed: Arc<EachUnit>,
    pub(crate) su_delta_any: Arc<AnyUnit>,
    pub(crate) su_delta_all: Arc<EachUnit>,
    pub(crate) su_pap: Arc<AnyUnit>,

    delta_slot: RwLock<DeltaSlot>,
    pub(crate) pie: Mutex<Option<Box<dyn IntervalEstimator>>>,
    pub(crate) prs: Mutex<Option<Box<dyn ReceiverSelector>>>,

    pub(crate) archiver: Archiver,
    tmr_train: Mutex<Instant>,
    time_offset: f64,
    pub(crate) init_param: Mutex<Option<Parameter>>,
}

impl Master {
    /// Builds a master over `net` from a validated configuration.
    ///
    /// Performs everything that can fail before workers connect: model and
    /// optimizer construction, estimator/selector construction for the
    /// configured mode, archive open, and the resume load.
    ///
    /// # Errors
    /// Any fatal misconfiguration per the error kinds of `MasterErr`.
    pub fn new(conf: MasterConfig, net: Arc<dyn Transport>) -> Result<Arc<Self>> {
        conf.validate()?;
        let nw = conf.nw;

        let mut model = Model::new(&conf.algorithm, &conf.alg_param)?;
        let optimizer = OptimizerSpec::parse(&conf.optimizer, &conf.optimizer_param)?;

        let factor_delta = if conf.mode.is_sync() && optimizer.need_averaged_delta() {
            1.0 / nw as f64
        } else {
            1.0
        };

        let width = model.param_width();
        let mut iter = 0;
        let mut time_offset = 0.0;

        let mut resumed = false;
        if conf.resume {
            let path = std::path::Path::new(&conf.fn_output);
            if let Some((i, t, weights)) = archive::load_last(path, width, conf.binary)? {
                info!("resume to iteration {i} at time {t:.3}");
                if weights.len() != width {
                    return Err(MasterErr::ResumeMismatch {
                        got: weights.len(),
                        expected: width,
                    });
                }
                iter = i.max(0) as u64;
                time_offset = t;
                model
                    .set_parameter(Parameter::from_weights(weights))
                    .map_err(MasterErr::from)?;
                resumed = true;
            } else {
                warn!("resume requested but no archived record found");
            }
        }
        if !resumed && !model.kernel().need_init_parameter_by_data() {
            model.set_parameter(Parameter::uniform(width, 0.01, conf.seed))?;
        }

        let archiver = if conf.fn_output.is_empty() {
            Archiver::disabled()
        } else {
            Archiver::open(
                std::path::Path::new(&conf.fn_output),
                conf.binary,
                conf.resume,
                conf.arv_iter,
                conf.arv_time,
            )?
        };

        let pie = match conf.mode {
            Mode::Fsp => Some(
                interval::from_conf(&conf.interval_param, nw, 0).map_err(MasterErr::Config)?,
            ),
            _ => None,
        };
        let prs = match conf.mode {
            Mode::Aap => {
                Some(selector::from_conf(&conf.mcast_param, nw).map_err(MasterErr::Config)?)
            }
            _ => None,
        };

        let master = Arc::new(Self {
            wm: WorkerMap::new(nw),
            rph: ReplyRegistry::new(),
            stats: Stats::new(),
            telemetry: Telemetry::new(nw),
            core: Mutex::new(Core {
                model,
                pool: DeltaPool::new(width),
            }),
            factor_delta,
            iter: AtomicU64::new(iter),
            n_delta: AtomicU64::new(0),
            n_point_proc: AtomicU64::new(0),
            n_point_dataset: AtomicU64::new(0),
            n_point_worker: Mutex::new(vec![0; nw]),
            dataset_shape: Mutex::new(DatasetShape { nx: 0, ny: 0 }),
            fatal: Mutex::new(None),
            delta_iter: (0..nw).map(|_| AtomicU64::new(0)).collect(),
            last_delta_source: AtomicUsize::new(0),
            global_batch_size: AtomicU64::new(conf.batch_size),
            local_report_size: AtomicU64::new(conf.report_size),
            loss_global: AtomicF64::default(),
            su_online: Arc::new(EachUnit::new(nw)),
            su_worker: Arc::new(EachUnit::new(nw)),
            su_dataset: Arc::new(EachUnit::new(nw)),
            su_ready: Arc::new(EachUnit::new(nw)),
            su_param: Arc::new(EachUnit::new(nw)),
            su_tpause: Arc::new(EachUnit::new(nw)),
            su_tcontinue: Arc::new(EachUnit::new(nw)),
            su_all_closed: Arc::new(EachUnit::new(nw)),
            su_delta_any: Arc::new(AnyUnit::new(nw as u64)),
            su_delta_all: Arc::new(EachUnit::new(nw)),
            su_pap: Arc::new(AnyUnit::new(1)),
            delta_slot: RwLock::new(DeltaSlot::for_mode(conf.mode)),
            pie: Mutex::new(pie),
            prs: Mutex::new(prs),
            archiver,
            tmr_train: Mutex::new(Instant::now()),
            time_offset,
            init_param: Mutex::new(None),
            conf,
            net,
        });

        master.register_rendezvous();
        Ok(master)
    }

    fn register_rendezvous(&self) {
        self.rph
            .register_each(Tag::Online, Arc::clone(&self.su_online));
        self.rph
            .register_each(Tag::Workers, Arc::clone(&self.su_worker));
        self.rph
            .register_each(Tag::Dataset, Arc::clone(&self.su_dataset));
        self.rph.register_each(Tag::Ready, Arc::clone(&self.su_ready));
        self.rph
            .register_each(Tag::Parameter, Arc::clone(&self.su_param));
        self.rph
            .register_each(Tag::TrainPause, Arc::clone(&self.su_tpause));
        self.rph
            .register_each(Tag::TrainContinue, Arc::clone(&self.su_tcontinue));
        self.rph
            .register_each(Tag::Closed, Arc::clone(&self.su_all_closed));
        self.rph
            .register_any(Tag::DeltaAny, Arc::clone(&self.su_delta_any));
        self.rph
            .register_each(Tag::DeltaAll, Arc::clone(&self.su_delta_all));
    }

    pub fn conf(&self) -> &MasterConfig {
        &self.conf
    }

    pub fn iteration(&self) -> u64 {
        self.iter.load(Ordering::Relaxed)
    }

    pub(crate) fn set_iteration(&self, iter: u64) {
        self.iter.store(iter, Ordering::Relaxed);
    }

    /// Advances the iteration clock; SSP advances under the core lock, so
    /// callers there must already hold it.
    pub(crate) fn tick_iteration(&self) {
        self.iter.fetch_add(1, Ordering::Relaxed);
    }

    /// The clock derived from the delta count in the asynchronous modes.
    pub(crate) fn derived_iteration(&self) -> u64 {
        self.n_delta.load(Ordering::Relaxed) / self.conf.nw as u64 + 1
    }

    pub fn global_batch_size(&self) -> u64 {
        self.global_batch_size.load(Ordering::Relaxed)
    }

    pub(crate) fn set_global_batch_size(&self, gbs: u64) {
        self.global_batch_size.store(gbs, Ordering::Relaxed);
    }

    pub fn local_report_size(&self) -> u64 {
        self.local_report_size.load(Ordering::Relaxed)
    }

    pub(crate) fn set_local_report_size(&self, lrs: u64) {
        self.local_report_size.store(lrs, Ordering::Relaxed);
    }

    /// Global loss fed by the external loss aggregation; the progressive
    /// probe reads it to score a batch size.
    pub fn record_global_loss(&self, loss: f64) {
        self.loss_global.store(loss);
    }

    pub(crate) fn global_loss(&self) -> f64 {
        self.loss_global.load()
    }

    pub(crate) fn processed_points(&self) -> u64 {
        self.n_point_proc.load(Ordering::Relaxed)
    }

    pub(crate) fn dataset_points(&self) -> u64 {
        self.n_point_dataset.load(Ordering::Relaxed)
    }

    /// Per-worker delta counts (the SSP progress vector).
    pub fn delta_counts(&self) -> Vec<u64> {
        self.delta_iter
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    /// A copy of the current parameter.
    pub fn parameter(&self) -> Vec<f64> {
        self.core.lock().model.parameter().weights().to_vec()
    }

    pub(crate) fn set_delta_slot(&self, slot: DeltaSlot) {
        *self.delta_slot.write() = slot;
    }

    pub(crate) fn train_elapsed(&self) -> f64 {
        self.tmr_train.lock().elapsed().as_secs_f64()
    }

    fn restart_train_timer(&self) {
        *self.tmr_train.lock() = Instant::now();
    }

    pub(crate) fn terminate_check(&self) -> bool {
        self.iteration() > self.conf.tc_iter || self.train_elapsed() > self.conf.tc_time
    }

    /// Whether the current iteration is on the log cadence.
    pub(crate) fn log_mark(&self) -> bool {
        self.iteration() % self.conf.log_iter == 0
    }

    /// Averaged timing inputs for the adaptive sizer.
    pub(crate) fn timing_snapshot(&self) -> Timing {
        let avg = |sum: f64, n: u64| if n == 0 { 0.0 } else { sum / n as f64 };
        Timing {
            mtu: avg(
                self.telemetry.mt_delta_sum.load(),
                self.n_delta.load(Ordering::Relaxed),
            ),
            mtb: avg(
                self.telemetry.mt_parameter_sum.load(),
                self.stats.n_par_send.load(Ordering::Relaxed),
            ),
            mtr: avg(
                self.telemetry.mt_report_sum.load(),
                self.telemetry.n_report.load(Ordering::Relaxed),
            ),
            wtd: sizer::hmean(&self.telemetry.wt_datapoint_snapshot()),
            wtc: sizer::mean(&self.telemetry.wt_delta_snapshot()),
            wtr: sizer::mean(&self.telemetry.wt_report_snapshot()),
        }
    }

    fn set_fatal(&self, err: MasterErr) {
        error!("{err}");
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(err);
        }
    }

    fn check_fatal(&self) -> Result<()> {
        match self.fatal.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ---- message routing ----

    /// Consumes the dispatcher queue until every sender hangs up.
    pub async fn dispatch_loop(self: Arc<Self>, mut rx: UnboundedReceiver<(u32, Msg<'static>)>) {
        while let Some((nid, msg)) = rx.recv().await {
            self.dispatch(nid, msg).await;
        }
    }

    async fn dispatch(&self, nid: u32, msg: Msg<'static>) {
        match msg {
            Msg::Normal(Ctl::Online { lid_hint }) => self.handle_online(nid, lid_hint).await,
            Msg::Immediate(ctl) => self.handle_immediate(nid, &ctl),
            Msg::Normal(ctl) => {
                let Some(lid) = self.wm.lid(nid) else {
                    warn!("control message from unregistered peer {nid}");
                    return;
                };
                match ctl {
                    Ctl::Reply(code) => self.handle_reply(lid, code),
                    Ctl::Dataset { nx, ny, n_point } => {
                        self.handle_dataset(lid, nid, nx, ny, n_point).await;
                    }
                    Ctl::Ready => self.rph.input(Tag::Ready, lid),
                    other => warn!("unexpected control message from worker {lid}: {other:?}"),
                }
            }
            Msg::Delta { dp, grad } => {
                let Some(lid) = self.wm.lid(nid) else {
                    warn!("delta from unregistered peer {nid}");
                    return;
                };
                self.handle_delta(lid, nid, dp, &grad).await;
            }
            Msg::Parameter(weights) => {
                let Some(lid) = self.wm.lid(nid) else {
                    warn!("parameter from unregistered peer {nid}");
                    return;
                };
                self.handle_parameter(lid, &weights);
            }
            Msg::Report(report) => {
                let Some(lid) = self.wm.lid(nid) else {
                    warn!("report from unregistered peer {nid}");
                    return;
                };
                self.handle_report(lid, report);
            }
        }
    }

    /// Handles control messages that bypass the dispatcher queue; called
    /// straight from the receive tasks.
    pub fn handle_immediate(&self, nid: u32, ctl: &Ctl) {
        match ctl {
            Ctl::Closed => {
                if let Some(lid) = self.wm.lid(nid) {
                    self.rph.input(Tag::Closed, lid);
                }
            }
            other => warn!("unexpected immediate control from peer {nid}: {other:?}"),
        }
    }

    async fn handle_online(&self, nid: u32, lid_hint: i32) {
        let Some(lid) = self.wm.register(nid, lid_hint) else {
            warn!("worker roster full, rejecting peer {nid}");
            return;
        };
        debug!("worker {lid} online as peer {nid}");
        self.rph.input(Tag::Online, lid);
        self.send_ctl(nid, Ctl::Reply(reply::ONLINE)).await;
    }

    fn handle_reply(&self, lid: usize, code: u8) {
        let tag = match code {
            reply::WORKERS => Tag::Workers,
            reply::TRAIN_PAUSE => Tag::TrainPause,
            reply::TRAIN_CONTINUE => Tag::TrainContinue,
            other => {
                debug!("ignoring reply code {other} from worker {lid}");
                return;
            }
        };
        self.rph.input(tag, lid);
    }

    async fn handle_dataset(&self, lid: usize, nid: u32, nx: u64, ny: u64, n_point: u64) {
        {
            let mut shape = self.dataset_shape.lock();
            let nx_ok = shape.nx == 0 || shape.nx == nx;
            let ny_ok = shape.ny == 0 || shape.ny == ny;
            if nx_ok && ny_ok {
                shape.nx = nx;
                shape.ny = ny;
            } else {
                self.set_fatal(MasterErr::DatasetMismatch {
                    source: lid,
                    nx: (shape.nx, nx),
                    ny: (shape.ny, ny),
                });
            }
        }
        self.n_point_worker.lock()[lid] = n_point;
        self.n_point_dataset.fetch_add(n_point, Ordering::Relaxed);
        self.rph.input(Tag::Dataset, lid);
        self.send_ctl(nid, Ctl::Reply(reply::DATASET)).await;
    }

    fn handle_parameter(&self, lid: usize, weights: &[f64]) {
        {
            let mut core = self.core.lock();
            if weights.len() != core.model.param_width() {
                warn!(
                    "parameter from worker {lid} has width {}, expected {}",
                    weights.len(),
                    core.model.param_width()
                );
                return;
            }
            core.model.merge_parameter(weights);
        }
        self.rph.input(Tag::Parameter, lid);
    }

    fn handle_report(&self, lid: usize, report: [f64; 4]) {
        let tmr = Instant::now();
        let count = report[0].max(0.0) as u64;
        let total = self.telemetry.update_report_proc(lid, count);

        self.telemetry.wt_datapoint[lid].store(report[1]);
        self.telemetry.wt_delta[lid].store(report[2]);
        self.telemetry.wt_report[lid].store(report[3]);

        if total > self.global_batch_size() {
            self.telemetry.reset_report_proc();
            self.su_pap.signal();
        }
        self.telemetry
            .mt_report_sum
            .fetch_add(tmr.elapsed().as_secs_f64());
        self.telemetry.n_report.fetch_add(1, Ordering::Relaxed);
    }

    /// Routes one delta receipt through the handler the active mode wired
    /// in.
    pub(crate) async fn handle_delta(&self, lid: usize, nid: u32, dp: u64, grad: &[f64]) {
        let slot = *self.delta_slot.read();
        let tmr = Instant::now();

        {
            let core = self.core.lock();
            if grad.len() != core.model.param_width() {
                warn!(
                    "delta from worker {lid} has width {}, expected {}",
                    grad.len(),
                    core.model.param_width()
                );
                return;
            }
        }

        match slot {
            DeltaSlot::Bsp => {
                self.apply_now(grad);
                self.count_delta(dp);
                self.rph.input(Tag::DeltaAll, lid);
                self.rph.input(Tag::DeltaAny, lid);
            }
            DeltaSlot::Tap | DeltaSlot::Sap => {
                self.apply_now(grad);
                self.count_delta(dp);
                self.rph.input(Tag::DeltaAny, lid);
                self.send_parameter(nid).await;
            }
            DeltaSlot::Ssp => {
                {
                    let mut core = self.core.lock();
                    let my = self.delta_iter[lid].fetch_add(1, Ordering::Relaxed) + 1;
                    let iter = self.iteration();
                    let stale = my.saturating_sub(iter);
                    if stale == 0 {
                        core.pool.accumulate(grad, dp);
                    } else {
                        core.pool.accumulate_next(stale as usize, grad, dp);
                    }
                }
                self.count_delta(dp);
                self.rph.input(Tag::DeltaAny, lid);
            }
            DeltaSlot::Fsp => {
                self.core.lock().pool.accumulate(grad, dp);
                self.count_delta(dp);
                self.rph.input(Tag::DeltaAll, lid);
            }
            DeltaSlot::Aap => {
                self.apply_now(grad);
                self.count_delta(dp);
                self.last_delta_source.store(lid, Ordering::Relaxed);
                self.rph.input(Tag::DeltaAny, lid);
                if self.conf.aap_wait {
                    self.send_ctl(nid, Ctl::Reply(reply::DELTA)).await;
                }
            }
            DeltaSlot::Pap => {
                self.apply_now(grad);
                self.count_delta(dp);
                self.rph.input(Tag::DeltaAll, lid);
                self.telemetry
                    .mt_delta_sum
                    .fetch_add(tmr.elapsed().as_secs_f64());
            }
            DeltaSlot::Tail => {
                // drain in-flight deltas after the mode loop exited: apply
                // but do not tick any rendezvous
                self.apply_now(grad);
                self.stats.n_delta_recv.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.stats
            .t_delta_calc
            .fetch_add(tmr.elapsed().as_secs_f64());
    }

    /// Applies one delta straight to the parameter with the mode factor.
    fn apply_now(&self, delta: &[f64]) {
        let tmr = Instant::now();
        let mut core = self.core.lock();
        core.model.accumulate_parameter(delta, self.factor_delta);
        drop(core);
        self.stats.t_par_calc.fetch_add(tmr.elapsed().as_secs_f64());
    }

    fn count_delta(&self, dp: u64) {
        self.n_delta.fetch_add(1, Ordering::Relaxed);
        self.n_point_proc.fetch_add(dp, Ordering::Relaxed);
        self.stats.n_point.fetch_add(dp, Ordering::Relaxed);
        self.stats.n_delta_recv.fetch_add(1, Ordering::Relaxed);
    }

    /// Applies the accumulated current delta and returns its datapoint
    /// count; the caller clears or shifts afterwards.
    pub(crate) fn apply_accumulated(&self) -> u64 {
        let tmr = Instant::now();
        let mut core = self.core.lock();
        let Core { model, pool } = &mut *core;
        model.accumulate_parameter(pool.cur(), self.factor_delta);
        let dp = pool.cur_dp();
        drop(core);
        self.stats.t_par_calc.fetch_add(tmr.elapsed().as_secs_f64());
        dp
    }

    // ---- outbound operations ----

    async fn send_ctl(&self, nid: u32, ctl: Ctl) {
        if let Err(e) = self.net.send(nid, &Msg::Normal(ctl)).await {
            warn!("send to peer {nid} failed: {e}");
        }
    }

    pub(crate) async fn broadcast_ctl(&self, ctl: Ctl) {
        if let Err(e) = self.net.broadcast(&Msg::Normal(ctl)).await {
            warn!("broadcast failed: {e}");
        }
    }

    /// Unicasts the current parameter to one peer.
    pub(crate) async fn send_parameter(&self, nid: u32) {
        let tmr = Instant::now();
        let weights = self.parameter();
        if let Err(e) = self.net.send(nid, &Msg::Parameter(weights.into())).await {
            warn!("parameter send to peer {nid} failed: {e}");
        }
        self.telemetry
            .mt_parameter_sum
            .fetch_add(tmr.elapsed().as_secs_f64());
        self.stats.n_par_send.fetch_add(1, Ordering::Relaxed);
    }

    /// Broadcasts the current parameter to every worker.
    pub(crate) async fn broadcast_parameter(&self) {
        let tmr = Instant::now();
        let weights = self.parameter();
        if let Err(e) = self.net.broadcast(&Msg::Parameter(weights.into())).await {
            warn!("parameter broadcast failed: {e}");
        }
        self.telemetry
            .mt_parameter_sum
            .fetch_add(tmr.elapsed().as_secs_f64());
        self.stats
            .n_par_send
            .fetch_add(self.conf.nw as u64, Ordering::Relaxed);
    }

    /// Multicasts the current parameter to the peers the receiver selector
    /// picks for `source`.
    pub(crate) async fn multicast_parameter(&self, source: usize) {
        let tmr = Instant::now();
        let targets: Vec<usize> = match self.prs.lock().as_mut() {
            Some(prs) => prs.targets(source),
            None => return,
        };
        let nids: Vec<u32> = targets.iter().filter_map(|&lid| self.wm.nid(lid)).collect();

        let weights = self.parameter();
        if let Err(e) = self
            .net
            .multicast(&nids, &Msg::Parameter(weights.into()))
            .await
        {
            warn!("parameter multicast failed: {e}");
        }
        self.telemetry
            .mt_parameter_sum
            .fetch_add(tmr.elapsed().as_secs_f64());
        self.stats
            .n_par_send
            .fetch_add(nids.len() as u64, Ordering::Relaxed);
    }

    async fn broadcast_worker_list(&self) {
        self.broadcast_ctl(Ctl::Workers(self.wm.list())).await;
        self.su_worker.wait().await;
    }

    /// Pauses every worker and waits for all acks.
    pub(crate) async fn broadcast_pause(&self) {
        self.broadcast_ctl(Ctl::TrainPause).await;
        self.su_tpause.wait_and_reset().await;
    }

    /// Pulls the pending deltas from every worker and waits for all of
    /// them.
    pub(crate) async fn gather_delta(&self) {
        self.su_delta_all.reset();
        self.broadcast_ctl(Ctl::RequestDelta).await;
        self.su_delta_all.wait().await;
    }

    pub(crate) async fn broadcast_batch_size(&self, gbs: u64) {
        self.broadcast_ctl(Ctl::BatchSize(gbs)).await;
    }

    pub(crate) async fn broadcast_report_size(&self, lrs: u64) {
        self.broadcast_ctl(Ctl::ReportSize(lrs)).await;
    }

    /// Snapshots the parameter and hands it to the archiver when the
    /// gating policy (or `force`) asks for it.
    pub(crate) fn archive_progress(&self, force: bool) {
        let iter = self.iteration();
        if !force && !self.archiver.need(iter) {
            return;
        }
        let weights = self.parameter();
        let time = self.time_offset + self.train_elapsed();
        if self.archiver.dump(iter, time, weights) {
            self.stats.n_archive.fetch_add(1, Ordering::Relaxed);
        }
    }

    // ---- lifecycle ----

    /// Runs the whole master lifecycle: online, dataset exchange,
    /// parameter coordination, the mode loop, and termination.
    ///
    /// # Errors
    /// Fatal setup failures; the training loop itself only ends via the
    /// termination condition.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        info!("wait online messages");
        self.restart_train_timer();
        self.su_online.wait().await;
        self.stats.t_data_load.fetch_add(self.train_elapsed());

        info!("send worker list");
        self.broadcast_worker_list().await;

        info!("waiting dataset info to initialize parameters");
        self.su_dataset.wait_and_reset().await;
        self.check_fatal()?;
        let (nx, ny) = {
            let shape = self.dataset_shape.lock();
            (shape.nx, shape.ny)
        };
        {
            let core = self.core.lock();
            core.model.check_data(nx, ny)?;
        }
        info!(
            "got x-length {nx}, y-length {ny}, data points {}, parameter width {}",
            self.dataset_points(),
            self.core.lock().model.param_width()
        );

        info!("coordinate initializing parameter");
        self.restart_train_timer();
        self.coordinate_parameter().await;
        self.su_ready.wait_and_reset().await;
        self.stats.t_train_prepare.fetch_add(self.train_elapsed());

        info!("start training with mode {}", self.conf.mode);
        self.broadcast_ctl(Ctl::Start).await;
        self.restart_train_timer();
        self.archive_progress(true);

        *self.init_param.lock() = Some(Parameter::from_weights(self.parameter()));

        self.set_iteration(self.iteration().max(1));
        match self.conf.mode {
            Mode::Bsp => {
                modes::bsp::init(self);
                modes::bsp::process(self).await;
            }
            Mode::Tap => {
                modes::tap::init(self);
                modes::tap::process(self).await;
            }
            Mode::Ssp => {
                modes::ssp::init(self);
                modes::ssp::process(self).await;
            }
            Mode::Sap => {
                modes::sap::init(self);
                modes::sap::process(self).await;
            }
            Mode::Fsp => {
                modes::fsp::init(self);
                modes::fsp::process(self).await;
            }
            Mode::Aap => {
                modes::aap::init(self);
                modes::aap::process(self).await;
            }
            Mode::Pap => {
                modes::pap::init(self);
                modes::pap::process(self).await;
            }
        }

        let iter = self.iteration().saturating_sub(1);
        self.set_iteration(iter);
        let t = self.train_elapsed();
        info!(
            "finish training, time {t:.3}s, iterations {iter}, average {:.4}s",
            if iter == 0 { 0.0 } else { t / iter as f64 }
        );

        self.shutdown().await;
        Ok(())
    }

    async fn coordinate_parameter(&self) {
        if !self.conf.resume {
            let need_data = {
                let core = self.core.lock();
                core.model.kernel().need_init_parameter_by_data()
            };
            if need_data {
                self.su_param.wait_and_reset().await;
            }
        }
        self.broadcast_parameter().await;
    }

    async fn shutdown(&self) {
        if let Err(e) = self.net.broadcast(&Msg::Immediate(Ctl::Terminate)).await {
            warn!("terminate broadcast failed: {e}");
        }
        self.set_delta_slot(DeltaSlot::Tail);
        self.archiver.close().await;
        self.rph.deactivate(Tag::DeltaAny);
        self.rph.deactivate(Tag::DeltaAll);
        self.su_all_closed.wait().await;
        info!("all workers closed; {}", self.stats.summary());
    }
}

#[cfg(test)]
mod tests {
    use ml_core::Model;

    use super::*;

    #[test]
    fn test_apply_stale_credits_and_keeps_ring() {
        let model = Model::new("linear", "2").unwrap();
        let mut core = Core {
            model,
            pool: DeltaPool::new(2),
        };
        core.pool.accumulate_next(1, &[1.0, 0.0], 3);
        core.pool.accumulate_next(2, &[0.0, 2.0], 4);

        let credited = core.apply_stale(1, 0.5);
        assert_eq!(credited, 3);
        assert_eq!(core.model.parameter().weights(), &[0.5, 0.0]);

        // slots survive until the caller shifts
        assert_eq!(core.pool.stale_slots(8).count(), 2);

        let credited = core.apply_stale(8, 0.5);
        assert_eq!(credited, 7);
        assert_eq!(core.model.parameter().weights(), &[1.0, 1.0]);
    }
}
