//! Batch-size and report-size estimation from observed timings.
//!
//! All inputs are averages over the run so far: `mt_*` are master-side
//! per-event costs, `wt_*` are worker-side per-event costs. Every
//! estimate guards its denominators and falls back to the previous value,
//! and the batch-size estimate never shrinks below the current one.

/// Averaged timing inputs for one estimation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timing {
    /// Master cost per delta fold.
    pub mtu: f64,
    /// Master cost per parameter send.
    pub mtb: f64,
    /// Master cost per report receipt.
    pub mtr: f64,
    /// Worker cost per datapoint (harmonic mean across workers).
    pub wtd: f64,
    /// Worker cost per delta send (mean across workers).
    pub wtc: f64,
    /// Worker cost per report send (mean across workers).
    pub wtr: f64,
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn hmean(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|&v| v <= 0.0) {
        return 0.0;
    }
    values.len() as f64 / values.iter().map(|v| 1.0 / v).sum::<f64>()
}

/// Estimates the global batch size that balances master and worker
/// throughput, clamped to at least `prev`.
pub fn estimate_global_batch_size(prev: u64, nw: u64, lrs: u64, t: &Timing) -> u64 {
    if lrs == 0 {
        return prev;
    }
    let nw = nw as f64;
    let up = nw * nw * (t.mtu + t.mtb) - nw * t.wtc;
    let down = t.wtd + (t.wtr - nw * t.mtr) / lrs as f64;
    if down <= 0.0 || up <= 0.0 {
        return prev;
    }
    prev.max((up / down) as u64)
}

/// Estimates the per-worker report interval in datapoints.
///
/// The quick form only balances report traffic; the full form accounts
/// for the whole master iteration at global batch size `gbs`.
pub fn estimate_local_report_size(prev: u64, nw: u64, gbs: u64, quick: bool, t: &Timing) -> u64 {
    let nwf = nw as f64;
    if quick {
        if t.wtd <= 0.0 {
            return prev;
        }
        let lrs = (nwf * t.mtr - t.wtr) / t.wtd;
        if lrs <= 0.0 { prev } else { lrs as u64 }
    } else {
        let up = gbs as f64 * t.wtr - nwf * t.mtr;
        let down = nwf * nwf * (t.mtu + t.mtb) - nwf * t.wtc - gbs as f64 * t.wtd;
        if down <= 0.0 || up <= 0.0 {
            return prev;
        }
        (up / down) as u64
    }
}
