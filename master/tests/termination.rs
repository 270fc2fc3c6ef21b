//! Termination interlock: terminate broadcast, tail drain of in-flight
//! deltas, and the closed rendezvous releasing the run.

mod common;

use std::sync::atomic::Ordering;

use common::{Harness, test_conf};

#[tokio::test]
async fn tail_handler_applies_without_ticking() {
    let mut harness = Harness::start(test_conf(1, "bsp"));
    harness.boot(&[(3, 1, 50)]).await;

    harness.send_delta(0, 1, &[1.0, 1.0, 1.0]);
    harness.wait_terminate().await;

    let p_after_loop = harness.master.parameter();
    let iter_after_loop = harness.master.iteration();

    // a retransmitted delta lands after the mode loop exited
    harness.send_delta(0, 1, &[2.0, 0.0, 0.0]);
    harness.close_all(1).await.unwrap();

    let p_final = harness.master.parameter();
    assert_eq!(p_final[0], p_after_loop[0] + 2.0);
    assert_eq!(p_final[1], p_after_loop[1]);
    assert_eq!(harness.master.iteration(), iter_after_loop);
    assert_eq!(harness.master.stats.n_delta_recv.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn run_waits_for_every_closed() {
    let mut harness = Harness::start(test_conf(2, "bsp"));
    harness.boot(&[(3, 1, 50), (3, 1, 50)]).await;

    harness.send_delta(0, 1, &[1.0, 0.0, 0.0]);
    harness.send_delta(1, 1, &[0.0, 1.0, 0.0]);
    harness.wait_terminate().await;

    // one worker closing is not enough
    harness.send(0, comms::msg::Msg::Immediate(comms::msg::Ctl::Closed));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(harness.run_pending());

    harness.send(1, comms::msg::Msg::Immediate(comms::msg::Ctl::Closed));
    harness.outcome().await.unwrap();
}

#[tokio::test]
async fn dataset_mismatch_is_fatal() {
    let harness = Harness::start(test_conf(2, "bsp"));

    use comms::msg::{Ctl, Msg, reply};
    for lid in 0..2u32 {
        harness.send(lid, Msg::Normal(Ctl::Online { lid_hint: lid as i32 }));
        harness.send(lid, Msg::Normal(Ctl::Reply(reply::WORKERS)));
    }
    harness.send(
        0,
        Msg::Normal(Ctl::Dataset {
            nx: 3,
            ny: 1,
            n_point: 10,
        }),
    );
    harness.send(
        1,
        Msg::Normal(Ctl::Dataset {
            nx: 4,
            ny: 1,
            n_point: 10,
        }),
    );

    let mut harness = harness;
    let err = harness.outcome().await.unwrap_err();
    assert!(matches!(err, master::MasterErr::DatasetMismatch { .. }));
}
