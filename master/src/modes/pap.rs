//! Progressive asynchronous parallel: worker reports pace the clock, and
//! the global batch size can be re-estimated online or searched for with
//! an initial halving/doubling probe.

use std::{sync::atomic::Ordering, time::Instant};

use log::debug;

use crate::{
    master::{DeltaSlot, Master},
    sizer,
};

pub(crate) fn init(m: &Master) {
    m.set_delta_slot(DeltaSlot::Pap);
}

pub(crate) async fn process(m: &Master) {
    if m.conf().pap_search_batch_size {
        probe(m).await;
        let gbs = m.global_batch_size();
        let lrs = m.local_report_size();
        debug!("finish probe with gbs {gbs}, lrs {lrs}");
        m.broadcast_batch_size(gbs).await;
        m.broadcast_report_size(lrs).await;
    }
    steady(m).await;
}

/// Steady state: wait for the report total to cross the global batch
/// size, pull the pending deltas, publish.
async fn steady(m: &Master) {
    while !m.terminate_check() {
        let tmr = Instant::now();
        if m.log_mark() {
            let t = m.timing_snapshot();
            debug!(
                "start iteration {}; mtu={:.6} mtb={:.6} mtr={:.6} wtd={:.6} wtc={:.6} wtr={:.6} loss={:.6}",
                m.iteration(),
                t.mtu,
                t.mtb,
                t.mtr,
                t.wtd,
                t.wtc,
                t.wtr,
                m.global_loss(),
            );
        }

        m.su_pap.wait_and_reset().await;

        if m.conf().pap_dynamic_batch_size {
            let gbs = sizer::estimate_global_batch_size(
                m.global_batch_size(),
                m.conf().nw as u64,
                m.local_report_size(),
                &m.timing_snapshot(),
            );
            m.set_global_batch_size(gbs);
            debug!("gbs={gbs} lrs={}", m.local_report_size());
        }

        m.gather_delta().await;
        m.stats.t_delta_wait.fetch_add(tmr.elapsed().as_secs_f64());

        m.broadcast_parameter().await;
        m.archive_progress(false);
        m.tick_iteration();
    }
}

/// Online search for the global batch size.
///
/// Each round consumes `probe_ratio` of the dataset at the candidate
/// size k and scores it with f(k) = g(k) / (wtd/N + wtu/k). While f
/// keeps improving the candidate halves (resetting the model to the
/// training-start parameter); once it stops improving the candidate
/// doubles back and the probe ends. Halving also stops at the analytic
/// minimum of the sizer.
async fn probe(m: &Master) {
    let mut minfk = -1.0_f64;

    while !m.terminate_check() {
        m.su_pap.wait_and_reset().await;
        m.gather_delta().await;

        let consumed = m.processed_points();
        let enough = consumed as f64 > m.dataset_points() as f64 * m.conf().probe_ratio;

        if m.conf().pap_dynamic_batch_size && enough {
            let gbs = m.global_batch_size();
            let timing = m.timing_snapshot();
            let nw = m.conf().nw as f64;

            let gk = m.global_loss() / consumed as f64;
            let fk = gk / (timing.wtd / nw + timing.mtu / gbs as f64);
            let mink = sizer::estimate_global_batch_size(
                0,
                m.conf().nw as u64,
                m.local_report_size(),
                &timing,
            );
            debug!(
                "probe k={gbs} np={consumed} gk={gk:.6} fk={fk:.6} minfk={minfk:.6} mink={mink}"
            );

            if minfk < 0.0 || fk < minfk {
                minfk = fk;
                if gbs / 2 < mink {
                    break;
                }
                let gbs = gbs / 2;
                m.set_global_batch_size(gbs);

                let start = m.init_param.lock().clone();
                if let Some(param) = start {
                    let mut core = m.core.lock();
                    if let Err(e) = core.model.set_parameter(param) {
                        debug!("probe reset skipped: {e}");
                    }
                }

                let lrs = (gbs / (2 * m.conf().nw as u64)).max(1);
                m.set_local_report_size(lrs);
                m.broadcast_report_size(lrs).await;
            } else {
                m.set_global_batch_size(gbs * 2);
                break;
            }

            // fresh round at the new candidate size
            m.set_iteration(0);
            m.n_point_proc.store(0, Ordering::Relaxed);
            m.record_global_loss(0.0);
        }

        m.broadcast_parameter().await;
        m.tick_iteration();
    }
}
