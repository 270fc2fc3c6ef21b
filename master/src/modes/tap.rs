//! Typical asynchronous parallel: every delta is applied on arrival and
//! answered with the fresh parameter; the clock is derived from the
//! delta count.

use std::time::Instant;

use log::debug;

use crate::master::{DeltaSlot, Master};

pub(crate) fn init(m: &Master) {
    m.set_delta_slot(DeltaSlot::Tap);
}

pub(crate) async fn process(m: &Master) {
    let mut new_iter = true;
    let mut tl = m.train_elapsed();

    while !m.terminate_check() {
        let tmr = Instant::now();
        if new_iter {
            new_iter = false;
            if m.log_mark() {
                let t = m.train_elapsed();
                debug!(
                    "start iteration {}; recent window took {:.3}s",
                    m.iteration(),
                    t - tl
                );
                tl = t;
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
