//! Stale synchronous runs: a fast worker banks deltas in the staleness
//! ring while the clock stays pinned to the slowest worker.

mod common;

use std::time::Duration;

use common::{Harness, test_conf};

#[tokio::test]
async fn ssp_holds_fast_worker_in_staleness_ring() {
    let mut harness = Harness::start(test_conf(2, "ssp"));
    harness.boot(&[(3, 1, 50), (3, 1, 50)]).await;

    let p0 = harness.initial_parameter();

    // worker 0 races three iterations ahead; worker 1 stays silent
    harness.send_delta(0, 1, &[1.0, 0.0, 0.0]);
    harness.send_delta(0, 1, &[0.0, 10.0, 0.0]);
    harness.send_delta(0, 1, &[0.0, 0.0, 100.0]);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // nothing may advance: only the initial parameter went out
    assert_eq!(harness.master.delta_counts(), vec![3, 0]);
    assert_eq!(harness.master.iteration(), 1);
    assert_eq!(harness.net.parameter_broadcasts().len(), 1);

    // the slow worker reaches iteration 1, releasing exactly one advance
    harness.send_delta(1, 1, &[0.0, 2.0, 0.0]);
    harness.finish(2).await.unwrap();

    assert_eq!(harness.master.delta_counts(), vec![3, 1]);
    // the loop closed iteration 1 and terminated at the clock bound
    assert_eq!(harness.master.iteration(), 1);

    // only the iteration-1 aggregate was applied (factor 1.0 in ssp);
    // the banked deltas for iterations 2 and 3 stayed in the ring
    let broadcasts = harness.net.parameter_broadcasts();
    assert_eq!(broadcasts.len(), 2);
    let expected: Vec<f64> = p0
        .iter()
        .zip([1.0, 2.0, 0.0])
        .map(|(w, d)| w + d)
        .collect();
    assert_eq!(broadcasts[1], expected);
}

#[tokio::test]
async fn ssp_advances_one_iteration_per_loop() {
    let mut conf = test_conf(2, "ssp");
    conf.tc_iter = 2;
    let mut harness = Harness::start(conf);
    harness.boot(&[(3, 1, 50), (3, 1, 50)]).await;

    let p0 = harness.initial_parameter();

    // both workers deliver two iterations' worth up front
    harness.send_delta(0, 1, &[1.0, 0.0, 0.0]);
    harness.send_delta(0, 1, &[2.0, 0.0, 0.0]);
    harness.send_delta(1, 1, &[4.0, 0.0, 0.0]);
    harness.send_delta(1, 1, &[8.0, 0.0, 0.0]);

    harness.finish(2).await.unwrap();

    // two loop bodies ran, each applying exactly one iteration's aggregate
    let broadcasts = harness.net.parameter_broadcasts();
    assert_eq!(broadcasts.len(), 3);
    assert_eq!(broadcasts[1][0], p0[0] + 5.0);
    assert_eq!(broadcasts[2][0], p0[0] + 5.0 + 10.0);
    assert_eq!(harness.master.iteration(), 2);
}
