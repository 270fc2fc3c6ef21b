//! Flexible synchronous parallel: the interval estimator decides how
//! long workers run before the master pauses them and collects one
//! collective delta.

use std::time::Instant;

use log::debug;

use crate::master::{DeltaSlot, Master};

pub(crate) fn init(m: &Master) {
    m.set_delta_slot(DeltaSlot::Fsp);
}

pub(crate) async fn process(m: &Master) {
    while !m.terminate_check() {
        if m.log_mark() {
            debug!("start iteration {}", m.iteration());
        }

        let interval = match m.pie.lock().as_mut() {
            Some(pie) => pie.interval(),
            None => return,
        };
        tokio::time::sleep(interval).await;

        let tsync = Instant::now();
        m.broadcast_pause().await;

        let tmr = Instant::now();
        m.su_delta_all.wait_and_reset().await;
        m.stats.t_delta_wait.fetch_add(tmr.elapsed().as_secs_f64());

        let dp = m.apply_accumulated();
        m.broadcast_parameter().await;

        // feed the estimator before the buffer is cleared; workers are
        // still paused, so nothing folds in concurrently
        let delta = { m.core.lock().pool.cur().to_vec() };
        if let Some(pie) = m.pie.lock().as_mut() {
            pie.update(
                &delta,
                interval,
                dp,
                tsync.elapsed().as_secs_f64(),
                m.train_elapsed(),
            );
        }
        m.core.lock().pool.clear();

        m.archive_progress(false);
        m.tick_iteration();
    }
}
