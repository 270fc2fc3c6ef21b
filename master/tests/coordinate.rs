//! Data-driven parameter initialization: kernels that seed from worker
//! shards hold the initial broadcast until every worker contributes.

mod common;

use std::borrow::Cow;

use common::{Harness, test_conf};
use comms::msg::{Ctl, Msg, reply};

#[tokio::test]
async fn kmeans_folds_worker_contributions_before_first_broadcast() {
    let mut conf = test_conf(2, "bsp");
    conf.algorithm = "kmeans".to_string();
    conf.alg_param = "2-2".to_string();
    let mut harness = Harness::start(conf);

    for lid in 0..2u32 {
        harness.send(
            lid,
            Msg::Normal(Ctl::Online {
                lid_hint: lid as i32,
            }),
        );
        harness.send(lid, Msg::Normal(Ctl::Reply(reply::WORKERS)));
        harness.send(
            lid,
            Msg::Normal(Ctl::Dataset {
                nx: 2,
                ny: 1,
                n_point: 50,
            }),
        );
        harness.send(lid, Msg::Normal(Ctl::Ready));
    }

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    // no parameter may go out before both contributions arrive
    assert!(harness.net.parameter_broadcasts().is_empty());

    harness.send(
        0,
        Msg::Parameter(Cow::Owned(vec![1.0, 2.0, 3.0, 4.0])),
    );
    harness.send(
        1,
        Msg::Parameter(Cow::Owned(vec![10.0, 20.0, 30.0, 40.0])),
    );

    harness
        .net
        .wait_until(|sent| sent.iter().any(|s| s.is_parameter_broadcast()))
        .await;
    assert_eq!(
        harness.net.parameter_broadcasts()[0],
        vec![11.0, 22.0, 33.0, 44.0]
    );

    // a normal bulk-sync round still closes on top of the folded start
    harness.send_delta(0, 1, &[1.0, 0.0, 0.0, 0.0]);
    harness.send_delta(1, 1, &[1.0, 0.0, 0.0, 0.0]);
    harness.finish(2).await.unwrap();

    assert_eq!(
        harness.master.parameter(),
        vec![12.0, 22.0, 33.0, 44.0]
    );
}
