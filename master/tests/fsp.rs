//! Flexible synchronous runs: interval sleep, pause barrier, collective
//! apply, publish.

mod common;

use common::{Harness, Sent, test_conf};
use comms::msg::{Ctl, Msg, reply};

#[tokio::test]
async fn fsp_pause_collect_apply_cycle() {
    let mut conf = test_conf(2, "fsp");
    conf.interval_param = vec!["fixed".to_string(), "0.05".to_string()];
    let mut harness = Harness::start(conf);
    harness.boot(&[(3, 1, 50), (3, 1, 50)]).await;

    let p0 = harness.initial_parameter();

    // after the interval the master pauses everyone
    harness
        .net
        .wait_until(|sent| {
            sent.iter()
                .any(|s| matches!(s, Sent::Broadcast(Msg::Normal(Ctl::TrainPause))))
        })
        .await;

    // both workers ack the pause and flush their pending delta
    harness.send(0, Msg::Normal(Ctl::Reply(reply::TRAIN_PAUSE)));
    harness.send(1, Msg::Normal(Ctl::Reply(reply::TRAIN_PAUSE)));
    harness.send_delta(0, 1, &[2.0, 0.0, 0.0]);
    harness.send_delta(1, 1, &[0.0, 4.0, 0.0]);

    harness.finish(2).await.unwrap();

    // the aggregate is applied once, averaged (gd in a sync mode)
    let broadcasts = harness.net.parameter_broadcasts();
    assert_eq!(broadcasts.len(), 2);
    let expected: Vec<f64> = p0
        .iter()
        .zip([2.0, 4.0, 0.0])
        .map(|(w, d)| w + 0.5 * d)
        .collect();
    assert_eq!(broadcasts[1], expected);
    assert_eq!(harness.master.iteration(), 1);
}

#[tokio::test]
async fn fsp_rejects_unknown_estimator() {
    let mut conf = test_conf(2, "fsp");
    conf.interval_param = vec!["exotic".to_string()];

    let net = std::sync::Arc::new(common::RecordingTransport::default());
    let ret = master::Master::new(conf, net as std::sync::Arc<dyn master::Transport>);
    assert!(matches!(ret, Err(master::MasterErr::Config(..))));
}
