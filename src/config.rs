//! Matching configuration.

use anyhow::{Context, Result, bail};

/// Environment variable the binary reads the match threshold from.
pub const THRESHOLD_ENV: &str = "FACE_MATCH_THRESHOLD";
/// Maximum Euclidean distance still accepted as the same face.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy)]
pub struct MatchConfig {
    threshold: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl MatchConfig {
    pub fn new(threshold: f64) -> Result<Self> {
        let config = Self { threshold };
        config.validate()?;
        Ok(config)
    }

    /// Parse a threshold given as text, e.g. from [`THRESHOLD_ENV`].
    pub fn parse(raw: &str) -> Result<Self> {
        let threshold: f64 = raw
            .trim()
            .parse()
            .with_context(|| format!("{THRESHOLD_ENV} must be a number, got '{raw}'"))?;
        Self::new(threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() {
            bail!("match threshold must be finite");
        }
        if self.threshold <= 0.0 {
            bail!("match threshold must be > 0");
        }
        Ok(())
    }
}
