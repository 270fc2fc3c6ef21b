//! Sync-interval estimation for the flexible synchronous mode.

use std::time::Duration;

/// Chooses how long the master lets the workers run before the next
/// collective synchronization.
pub trait IntervalEstimator: Send {
    /// The sleep before the next pause/collect cycle.
    fn interval(&mut self) -> Duration;

    /// Feeds back one finished cycle.
    ///
    /// # Arguments
    /// * `delta` - The aggregated delta that was applied.
    /// * `interval` - The interval that produced it.
    /// * `dp_count` - Datapoints behind the delta.
    /// * `sync_time` - Seconds spent pausing and collecting.
    /// * `wall_time` - Seconds of training so far.
    fn update(
        &mut self,
        delta: &[f64],
        interval: Duration,
        dp_count: u64,
        sync_time: f64,
        wall_time: f64,
    );
}

/// Builds an estimator from its config form, e.g. `["fixed", "0.5"]`.
///
/// # Errors
/// A human-readable message for an unknown estimator name or unparsable
/// parameters; the caller treats this as fatal.
pub fn from_conf(
    param: &[String],
    _n_worker: usize,
    _n_point: u64,
) -> Result<Box<dyn IntervalEstimator>, String> {
    let name = param.first().map(String::as_str).unwrap_or_default();
    match name {
        "fixed" => {
            let secs: f64 = param
                .get(1)
                .ok_or("fixed estimator needs an interval")?
                .parse()
                .map_err(|e| format!("bad fixed interval: {e}"))?;
            if secs <= 0.0 {
                return Err(format!("fixed interval must be positive, got {secs}"));
            }
            Ok(Box::new(FixedInterval {
                every: Duration::from_secs_f64(secs),
            }))
        }
        other => Err(format!("unknown interval estimator: '{other}'")),
    }
}

/// Constant interval, ignoring feedback.
struct FixedInterval {
    every: Duration,
}

impl IntervalEstimator for FixedInterval {
    fn interval(&mut self) -> Duration {
        self.every
    }

    fn update(
        &mut self,
        _delta: &[f64],
        _interval: Duration,
        _dp_count: u64,
        _sync_time: f64,
        _wall_time: f64,
    ) {
    }
}
