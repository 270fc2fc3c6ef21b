//! Shared harness: a recording transport plus scripted-worker plumbing
//! that drives the master through its public dispatcher queue.
#![allow(dead_code)]

use std::{borrow::Cow, io, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{
    sync::mpsc::{UnboundedSender, unbounded_channel},
    task::JoinHandle,
    time::{sleep, timeout},
};

use comms::msg::{Ctl, Msg, reply};
use master::{Master, MasterConfig, MasterErr, Transport};

const WAIT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(5);

/// One outbound transport event.
#[derive(Debug, Clone)]
pub enum Sent {
    Send(u32, Msg<'static>),
    Broadcast(Msg<'static>),
    Multicast(Vec<u32>, Msg<'static>),
}

impl Sent {
    pub fn is_parameter_broadcast(&self) -> bool {
        matches!(self, Sent::Broadcast(Msg::Parameter(..)))
    }
}

/// Transport fake that records every send for the test to inspect.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingTransport {
    pub fn snapshot(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn parameter_broadcasts(&self) -> Vec<Vec<f64>> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Broadcast(Msg::Parameter(w)) => Some(w.to_vec()),
                _ => None,
            })
            .collect()
    }

    /// Polls until the recorded history satisfies `pred`.
    pub async fn wait_until<F>(&self, pred: F)
    where
        F: Fn(&[Sent]) -> bool,
    {
        timeout(WAIT, async {
            loop {
                if pred(&self.sent.lock()) {
                    return;
                }
                sleep(POLL).await;
            }
        })
        .await
        .expect("transport never matched the expected traffic");
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, nid: u32, msg: &Msg<'_>) -> io::Result<()> {
        self.sent.lock().push(Sent::Send(nid, msg.clone().into_owned()));
        Ok(())
    }

    async fn broadcast(&self, msg: &Msg<'_>) -> io::Result<()> {
        self.sent.lock().push(Sent::Broadcast(msg.clone().into_owned()));
        Ok(())
    }

    async fn multicast(&self, nids: &[u32], msg: &Msg<'_>) -> io::Result<()> {
        self.sent
            .lock()
            .push(Sent::Multicast(nids.to_vec(), msg.clone().into_owned()));
        Ok(())
    }
}

/// A master wired to the recording transport and a scripted message
/// queue; network ids equal logical ids.
pub struct Harness {
    pub master: Arc<Master>,
    pub net: Arc<RecordingTransport>,
    queue: UnboundedSender<(u32, Msg<'static>)>,
    run: Option<JoinHandle<Result<(), MasterErr>>>,
    dispatcher: JoinHandle<()>,
}

impl Harness {
    pub fn start(conf: MasterConfig) -> Self {
        let net = Arc::new(RecordingTransport::default());
        let master =
            Master::new(conf, Arc::clone(&net) as Arc<dyn Transport>).expect("master setup");

        let (queue, rx) = unbounded_channel();
        let dispatcher = tokio::spawn(Arc::clone(&master).dispatch_loop(rx));
        let run = {
            let master = Arc::clone(&master);
            tokio::spawn(async move { master.run().await })
        };

        Self {
            master,
            net,
            queue,
            run: Some(run),
            dispatcher,
        }
    }

    pub fn send(&self, nid: u32, msg: Msg<'static>) {
        self.queue.send((nid, msg)).expect("dispatcher alive");
    }

    pub fn send_delta(&self, nid: u32, dp: u64, grad: &[f64]) {
        self.send(
            nid,
            Msg::Delta {
                dp,
                grad: Cow::Owned(grad.to_vec()),
            },
        );
    }

    pub fn send_report(&self, nid: u32, count: f64, td: f64, tc: f64, tr: f64) {
        self.send(nid, Msg::Report([count, td, tc, tr]));
    }

    /// Walks all workers through online, roster ack, dataset exchange and
    /// ready, then waits for the training start broadcast.
    pub async fn boot(&self, shapes: &[(u64, u64, u64)]) {
        for (lid, &(nx, ny, n_point)) in shapes.iter().enumerate() {
            let nid = lid as u32;
            self.send(nid, Msg::Normal(Ctl::Online { lid_hint: lid as i32 }));
            self.send(nid, Msg::Normal(Ctl::Reply(reply::WORKERS)));
            self.send(nid, Msg::Normal(Ctl::Dataset { nx, ny, n_point }));
            self.send(nid, Msg::Normal(Ctl::Ready));
        }
        self.net
            .wait_until(|sent| {
                sent.iter()
                    .any(|s| matches!(s, Sent::Broadcast(Msg::Normal(Ctl::Start))))
            })
            .await;
    }

    /// The parameter published during initialization.
    pub fn initial_parameter(&self) -> Vec<f64> {
        self.net
            .parameter_broadcasts()
            .first()
            .expect("initial parameter broadcast")
            .clone()
    }

    /// Waits for the terminate broadcast, closes every worker, and
    /// returns the run outcome.
    pub async fn finish(&mut self, nw: u32) -> Result<(), MasterErr> {
        self.wait_terminate().await;
        for nid in 0..nw {
            self.send(nid, Msg::Immediate(Ctl::Closed));
        }
        self.outcome().await
    }

    /// Waits for the terminate broadcast without closing workers yet.
    pub async fn wait_terminate(&self) {
        self.net
            .wait_until(|sent| {
                sent.iter()
                    .any(|s| matches!(s, Sent::Broadcast(Msg::Immediate(Ctl::Terminate))))
            })
            .await;
    }

    /// Closes every worker and returns the run outcome.
    pub async fn close_all(&mut self, nw: u32) -> Result<(), MasterErr> {
        for nid in 0..nw {
            self.send(nid, Msg::Immediate(Ctl::Closed));
        }
        self.outcome().await
    }

    /// Whether the run task is still going.
    pub fn run_pending(&self) -> bool {
        self.run.as_ref().is_some_and(|run| !run.is_finished())
    }

    /// Awaits the run task's result.
    pub async fn outcome(&mut self) -> Result<(), MasterErr> {
        let run = self.run.take().expect("run already awaited");
        let ret = timeout(WAIT, run)
            .await
            .expect("master run did not finish")
            .expect("master run panicked");
        self.dispatcher.abort();
        ret
    }
}

/// A config tuned for the fast, deterministic integration runs.
pub fn test_conf(nw: usize, mode: &str) -> MasterConfig {
    let mut conf = MasterConfig::default();
    conf.nw = nw;
    conf.mode = mode.parse().expect("mode");
    conf.algorithm = "linear".to_string();
    conf.alg_param = "3".to_string();
    conf.optimizer = "gd".to_string();
    conf.optimizer_param = "0.1".to_string();
    conf.tc_iter = 1;
    conf.tc_time = 30.0;
    conf.log_iter = 1;
    conf
}
