//! Bulk synchronous parallel: one delta from every worker closes an
//! iteration, and nobody runs ahead.

use std::time::Instant;

use log::debug;

use crate::master::{DeltaSlot, Master};

pub(crate) fn init(m: &Master) {
    m.set_delta_slot(DeltaSlot::Bsp);
}

/// Waits for all deltas (each already applied on receipt), publishes the
/// new parameter, archives, advances the clock.
///
/// Every worker sees parameter version k before any delta for k+1 is
/// folded, because workers only resume on the broadcast.
pub(crate) async fn process(m: &Master) {
    let ln = m.conf().log_iter;
    let mut tl = m.train_elapsed();

    while !m.terminate_check() {
        let tmr = Instant::now();
        if m.log_mark() {
            let t = m.train_elapsed();
            debug!(
                "start iteration {}; recent {ln} iterations took {:.3}s",
                m.iteration(),
                t - tl
            );
            tl = t;
        }

        m.su_delta_all.wait_and_reset().await;
        m.stats.t_delta_wait.fetch_add(tmr.elapsed().as_secs_f64());

        m.broadcast_parameter().await;
        m.archive_progress(false);
        m.tick_iteration();
    }
}
