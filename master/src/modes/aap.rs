//! Aggressive asynchronous parallel: every applied delta is echoed to a
//! selected subset of peers instead of everyone.

use std::{sync::atomic::Ordering, time::Instant};

use log::debug;

use crate::master::{DeltaSlot, Master};

pub(crate) fn init(m: &Master) {
    m.set_delta_slot(DeltaSlot::Aap);
}

pub(crate) async fn process(m: &Master) {
    let mut new_iter = true;

    while !m.terminate_check() {
        let tmr = Instant::now();
        if new_iter {
            new_iter = false;
            if m.log_mark() {
                debug!(
                    "start iteration {}; deltas so far {}",
                    m.iteration(),
                    m.n_delta.load(Ordering::Relaxed)
                );
            }
        }

        m.su_delta_any.wait_and_reset().await;
        m.stats.t_delta_wait.fetch_add(tmr.elapsed().as_secs_f64());

        let source = m.last_delta_source.load(Ordering::Relaxed);
        m.multicast_parameter(source).await;

        let p = m.derived_iteration();
        if m.iteration() != p {
            m.archive_progress(false);
            m.set_iteration(p);
            new_iter = true;
        }
    }
}
