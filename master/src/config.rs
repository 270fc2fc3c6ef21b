use std::{fmt, path::Path, str::FromStr};

use serde::Deserialize;

use crate::error::{MasterErr, Result};

/// The synchronization protocol driving the mode loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Bsp,
    Tap,
    Ssp,
    Sap,
    Fsp,
    Aap,
    Pap,
}

impl Mode {
    /// Whether the mode closes iterations collectively; only these average
    /// deltas when the optimizer asks for it.
    pub fn is_sync(&self) -> bool {
        matches!(self, Mode::Bsp | Mode::Fsp)
    }
}

impl FromStr for Mode {
    type Err = MasterErr;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bsp" => Ok(Mode::Bsp),
            "tap" => Ok(Mode::Tap),
            "ssp" => Ok(Mode::Ssp),
            "sap" => Ok(Mode::Sap),
            "fsp" => Ok(Mode::Fsp),
            "aap" => Ok(Mode::Aap),
            "pap" => Ok(Mode::Pap),
            other => Err(MasterErr::Config(format!("unknown mode: '{other}'"))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Bsp => "bsp",
            Mode::Tap => "tap",
            Mode::Ssp => "ssp",
            Mode::Sap => "sap",
            Mode::Fsp => "fsp",
            Mode::Aap => "aap",
            Mode::Pap => "pap",
        };
        f.write_str(name)
    }
}

/// Full configuration surface of the master.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Number of workers.
    pub nw: usize,
    /// Global batch size: datapoints across all workers per iteration.
    pub batch_size: u64,
    /// Datapoints a worker processes between reports.
    pub report_size: u64,
    pub mode: Mode,
    /// Terminate after this many iterations.
    pub tc_iter: u64,
    /// Terminate after this many seconds of training.
    pub tc_time: f64,
    /// Archive at least every this many iterations.
    pub arv_iter: u64,
    /// Archive at least every this many seconds.
    pub arv_time: f64,
    /// Log cadence in iterations.
    pub log_iter: u64,
    /// Archive file; empty disables archiving.
    pub fn_output: String,
    /// Binary archive records instead of text lines.
    pub binary: bool,
    /// Resume from the last archived record.
    pub resume: bool,
    pub seed: u64,
    pub optimizer: String,
    pub optimizer_param: String,
    pub algorithm: String,
    pub alg_param: String,
    /// Interval estimator spec for fsp, e.g. `["fixed", "0.5"]`.
    pub interval_param: Vec<String>,
    /// Receiver selector spec for aap, e.g. `["ring", "2"]`.
    pub mcast_param: Vec<String>,
    /// Ack every delta in aap so workers can pace themselves.
    pub aap_wait: bool,
    /// Probe the global batch size before steady-state pap.
    pub pap_search_batch_size: bool,
    pub pap_search_report_freq: bool,
    /// Re-estimate the global batch size online in pap.
    pub pap_dynamic_batch_size: bool,
    /// Fraction of the dataset a probe round must consume before judging.
    pub probe_ratio: f64,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            nw: 1,
            batch_size: 100,
            report_size: 10,
            mode: Mode::Bsp,
            tc_iter: 1000,
            tc_time: 3600.0,
            arv_iter: 100,
            arv_time: 60.0,
            log_iter: 100,
            fn_output: String::new(),
            binary: false,
            resume: false,
            seed: 123,
            optimizer: "gd".to_string(),
            optimizer_param: "0.1".to_string(),
            algorithm: "linear".to_string(),
            alg_param: "1".to_string(),
            interval_param: vec!["fixed".to_string(), "1".to_string()],
            mcast_param: vec!["all".to_string()],
            aap_wait: false,
            pap_search_batch_size: false,
            pap_search_report_freq: false,
            pap_dynamic_batch_size: false,
            probe_ratio: 0.05,
        }
    }
}

impl MasterConfig {
    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Errors
    /// Unreadable file, invalid JSON, or an invalid field combination.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let conf: Self = serde_json::from_str(&content)
            .map_err(|e| MasterErr::Config(format!("invalid config JSON: {e}")))?;
        conf.validate()?;
        Ok(conf)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nw == 0 {
            return Err(MasterErr::Config("nw must be at least 1".to_string()));
        }
        if self.log_iter == 0 {
            return Err(MasterErr::Config("log_iter must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(MasterErr::Config("batch_size must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.probe_ratio) {
            return Err(MasterErr::Config(format!(
                "probe_ratio must be within [0, 1], got {}",
                self.probe_ratio
            )));
        }
        if self.resume && self.fn_output.is_empty() {
            return Err(MasterErr::Config(
                "resume requires fn_output".to_string(),
            ));
        }
        Ok(())
    }
}
