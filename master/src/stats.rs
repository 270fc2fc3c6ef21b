//! Run-wide counters, reported once after training.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::atomic::AtomicF64;

#[derive(Default)]
pub struct Stats {
    pub n_point: AtomicU64,
    pub n_delta_recv: AtomicU64,
    pub n_par_send: AtomicU64,
    pub n_archive: AtomicU64,
    pub t_data_load: AtomicF64,
    pub t_train_prepare: AtomicF64,
    pub t_delta_wait: AtomicF64,
    pub t_par_calc: AtomicF64,
    pub t_delta_calc: AtomicF64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> String {
        format!(
            "points: {}, deltas: {}, parameters sent: {}, archives: {}, \
             t-load: {:.3}s, t-prepare: {:.3}s, t-delta-wait: {:.3}s, \
             t-par-calc: {:.3}s, t-delta-calc: {:.3}s",
            self.n_point.load(Ordering::Relaxed),
            self.n_delta_recv.load(Ordering::Relaxed),
            self.n_par_send.load(Ordering::Relaxed),
            self.n_archive.load(Ordering::Relaxed),
            self.t_data_load.load(),
            self.t_train_prepare.load(),
            self.t_delta_wait.load(),
            self.t_par_calc.load(),
            self.t_delta_calc.load(),
        )
    }
}
