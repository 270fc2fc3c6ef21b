//! Per-worker and master-side timing telemetry feeding the adaptive sizer.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::atomic::AtomicF64;

/// Timing sums gathered on the master and reported by the workers.
///
/// The `wt_*` arrays hold one scalar per worker, written by the report
/// handler without a lock and read by the mode loop; the report counters
/// sit behind their own mutex because the batch-threshold decision must
/// see a consistent pair.
pub struct Telemetry {
    pub mt_delta_sum: AtomicF64,
    pub mt_parameter_sum: AtomicF64,
    pub mt_report_sum: AtomicF64,
    pub n_report: AtomicU64,
    pub wt_datapoint: Vec<AtomicF64>,
    pub wt_delta: Vec<AtomicF64>,
    pub wt_report: Vec<AtomicF64>,
    report_proc: Mutex<ReportProc>,
}

struct ReportProc {
    each: Vec<u64>,
    total: u64,
}

impl Telemetry {
    pub fn new(n: usize) -> Self {
        Self {
            mt_delta_sum: AtomicF64::default(),
            mt_parameter_sum: AtomicF64::default(),
            mt_report_sum: AtomicF64::default(),
            n_report: AtomicU64::new(0),
            wt_datapoint: (0..n).map(|_| AtomicF64::default()).collect(),
            wt_delta: (0..n).map(|_| AtomicF64::default()).collect(),
            wt_report: (0..n).map(|_| AtomicF64::default()).collect(),
            report_proc: Mutex::new(ReportProc {
                each: vec![0; n],
                total: 0,
            }),
        }
    }

    /// Replaces worker `lid`'s processed-point count and returns the new
    /// running total across workers.
    ///
    /// A count lower than the previous one (worker restarted its window)
    /// cannot drive the total below zero.
    pub fn update_report_proc(&self, lid: usize, count: u64) -> u64 {
        let mut proc = self.report_proc.lock();
        let prev = proc.each[lid];
        proc.each[lid] = count;
        proc.total = (proc.total as i64 + count as i64 - prev as i64).max(0) as u64;
        proc.total
    }

    /// Restarts the running total, keeping the last per-worker counts as
    /// the new baseline.
    pub fn reset_report_proc(&self) {
        let mut proc = self.report_proc.lock();
        proc.total = 0;
    }

    pub fn report_proc_total(&self) -> u64 {
        self.report_proc.lock().total
    }

    fn snapshot(values: &[AtomicF64]) -> Vec<f64> {
        values.iter().map(AtomicF64::load).collect()
    }

    pub fn wt_datapoint_snapshot(&self) -> Vec<f64> {
        Self::snapshot(&self.wt_datapoint)
    }

    pub fn wt_delta_snapshot(&self) -> Vec<f64> {
        Self::snapshot(&self.wt_delta)
    }

    pub fn wt_report_snapshot(&self) -> Vec<f64> {
        Self::snapshot(&self.wt_report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_proc_tracks_deltas_of_counts() {
        let t = Telemetry::new(2);

        assert_eq!(t.update_report_proc(0, 6), 6);
        assert_eq!(t.update_report_proc(1, 5), 11);
        // worker 0 moves from 6 to 9: total grows by 3
        assert_eq!(t.update_report_proc(0, 9), 14);
    }

    #[test]
    fn test_reset_keeps_baselines() {
        let t = Telemetry::new(2);
        t.update_report_proc(0, 10);
        t.reset_report_proc();

        assert_eq!(t.report_proc_total(), 0);
        assert_eq!(t.update_report_proc(0, 12), 2);
    }
}
