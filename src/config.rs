use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::error::Error;
use crate::histogram::upper_bounds;
use crate::report::{GRAPH_HEADER, MAX_BAR_WIDTH};

/// Parameters for one sampling session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Number of histogram bins; half linear below the knee, half exponential above it.
    pub bins: usize,
    /// Tick value where bin spacing turns exponential. Deltas above it are outliers.
    pub knee: u64,
    /// Expected minimum delta in ticks.
    pub min: u64,
    /// Outlier ring buffer capacity in entries.
    pub outbuf: usize,
    /// Sleep before each block in milliseconds.
    pub pause: u64,
    /// Sampling duration in seconds.
    pub runtime: u64,
    /// Report line width in characters.
    pub width: usize,
    /// Outlier log destination. Capture is enabled only when set and `outbuf` > 0.
    pub outfile: Option<PathBuf>,
    /// CPU list to pin the sampling process to (e.g. "0", "1-3,6").
    pub cpu: Option<String>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            bins: 20,
            knee: 50,
            min: 10,
            outbuf: 10000,
            pause: 0,
            runtime: 1,
            width: 79,
            outfile: None,
            cpu: None,
        }
    }
}

impl SamplingConfig {
    pub fn min_width() -> usize {
        GRAPH_HEADER.len() + 1
    }

    pub fn max_width() -> usize {
        GRAPH_HEADER.len() + MAX_BAR_WIDTH
    }

    /// Reject settings that cannot produce a well-formed histogram or report.
    ///
    /// Every violated constraint is listed in the returned error, one per line.
    pub fn validate(&self) -> Result<(), Error> {
        let mut problems = Vec::new();

        if self.bins < 2 || self.bins % 2 != 0 {
            problems.push(format!(
                "bins ({}) must be an even number of at least 2",
                self.bins
            ));
        }
        if self.knee <= self.min {
            problems.push(format!(
                "min ({}) must be < knee ({})",
                self.min, self.knee
            ));
        } else if self.knee - self.min < (self.bins / 2) as u64 {
            problems.push(format!(
                "too few ({}) discrete values between min ({}) and knee ({}) for linear histogram bins ({})",
                self.knee - self.min,
                self.min,
                self.knee,
                self.bins / 2
            ));
        }
        let bins_ok = self.bins >= 2 && self.bins % 2 == 0;
        if bins_ok && self.knee > self.min {
            if let Err(overflow) = upper_bounds(self.bins, self.min, self.knee) {
                problems.push(overflow);
            }
        }
        if Instant::now().checked_add(self.runtime()).is_none() {
            problems.push(format!("runtime ({}) is too large", self.runtime));
        }
        if self.width < Self::min_width() {
            problems.push(format!("minimum line width is {}", Self::min_width()));
        }
        if self.width > Self::max_width() {
            problems.push(format!("maximum line width is {}", Self::max_width()));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidConfig(problems.join("\n")))
        }
    }

    pub fn capture_enabled(&self) -> bool {
        self.outfile.is_some() && self.outbuf > 0
    }

    pub fn runtime(&self) -> Duration {
        Duration::from_secs(self.runtime)
    }

    pub fn pause(&self) -> Option<Duration> {
        if self.pause == 0 {
            None
        } else {
            Some(Duration::from_millis(self.pause))
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sampling: SamplingConfig,
}

/// Load configuration from a TOML file.
///
/// - If `explicit_path` is `Some` and the file is missing, returns an error.
/// - If `explicit_path` is `None`, tries `/etc/tickjitter.toml`; if missing, returns defaults.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config, Error> {
    let path = match explicit_path {
        Some(p) => {
            if !p.exists() {
                return Err(Error::InvalidConfig(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            p.to_path_buf()
        }
        None => {
            let default = Path::new("/etc/tickjitter.toml");
            if !default.exists() {
                return Ok(Config::default());
            }
            default.to_path_buf()
        }
    };

    let contents = std::fs::read_to_string(&path).map_err(|e| {
        Error::InvalidConfig(format!("failed to read config {}: {}", path.display(), e))
    })?;

    let config: Config = toml::from_str(&contents).map_err(|e| {
        Error::InvalidConfig(format!("failed to parse config {}: {}", path.display(), e))
    })?;

    Ok(config)
}
