//! Stale synchronous parallel: fast workers may run ahead into the
//! staleness ring, but the clock only advances once the slowest worker
//! has reached it.

use std::time::Instant;

use log::debug;

use crate::master::{Core, DeltaSlot, Master};

pub(crate) fn init(m: &Master) {
    m.set_delta_slot(DeltaSlot::Ssp);
}

pub(crate) async fn process(m: &Master) {
    while !m.terminate_check() {
        let tmr = Instant::now();
        if m.log_mark() {
            debug!("start iteration {}", m.iteration());
        }

        loop {
            let slowest = m.delta_counts().into_iter().min().unwrap_or(0);
            if slowest >= m.iteration() {
                break;
            }
            m.su_delta_any.wait_and_reset().await;
        }
        m.stats.t_delta_wait.fetch_add(tmr.elapsed().as_secs_f64());

        // The slowest worker may have moved two or more iterations at
        // once; still close exactly one iteration per loop body. Apply,
        // shift and tick under one hold of the accumulator lock so a
        // concurrent handler never sees the clock ahead of the ring.
        {
            let mut core = m.core.lock();
            let Core { model, pool } = &mut *core;
            model.accumulate_parameter(pool.cur(), m.factor_delta);
            pool.shift();
            m.tick_iteration();
        }

        m.broadcast_parameter().await;
        m.archive_progress(false);
    }
}
