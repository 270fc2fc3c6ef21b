//! Stale asynchronous parallel.
//!
//! The master side is the typical asynchronous loop; the pairing differs
//! on the worker, which keeps computing on a stale parameter instead of
//! waiting for every reply.

use std::time::Instant;

use log::debug;

use crate::master::{DeltaSlot, Master};

pub(crate) fn init(m: &Master) {
    m.set_delta_slot(DeltaSlot::Sap);
}

pub(crate) async fn process(m: &Master) {
    let mut new_iter = true;

    while !m.terminate_check() {
        let tmr = Instant::now();
        if new_iter {
            new_iter = false;
            if m.log_mark() {
                debug!("start iteration {}", m.iteration());
            }
        }

        m.su_delta_any.wait_and_reset().await;
        m.stats.t_delta_wait.fetch_add(tmr.elapsed().as_secs_f64());

        let p = m.derived_iteration();
        if m.iteration() != p {
            m.archive_progress(false);
            m.set_iteration(p);
            new_iter = true;
        }
    }
}
