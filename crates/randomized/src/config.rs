//! Harness configuration
//!
//! Every probability and interval the randomized writer uses is a knob
//! here, defaulting to the values the harness is tuned for. Configs load
//! from TOML; any key left out keeps its default.
//!
//! Runs are reproduced by seed: [`test_seed`] honors `STRATA_TEST_SEED`
//! and logs whichever seed it settles on.

use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_core::{StrataError, StrataResult};
use strata_engine::LEGACY_CODEC;

/// Environment variable that pins the seed of a randomized run.
pub const SEED_ENV_VAR: &str = "STRATA_TEST_SEED";

/// Knobs for [`RandomIndexWriter`](crate::RandomIndexWriter).
///
/// # Example
///
/// ```toml
/// # Commit every 10..=1000 add/update calls (interval grows after each commit)
/// commit_interval_min = 10
/// commit_interval_max = 1000
///
/// # Route one in five single-document writes through the batch path
/// batch_reroute_one_in = 5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Lower bound of the auto-commit interval, before growth
    pub commit_interval_min: u64,
    /// Upper bound of the auto-commit interval, before growth
    pub commit_interval_max: u64,
    /// Growth factor applied to the interval after each auto-commit
    pub commit_growth: f64,
    /// Growth stops once the factor reaches this value
    pub commit_growth_cap: f64,
    /// Single-document writes take the batch path one time in N
    pub batch_reroute_one_in: u32,
    /// Reader requests force-merge first one time in N
    pub reader_force_merge_one_in: u32,
    /// Near-real-time readers commit first one time in N
    pub nrt_commit_one_in: u32,
    /// Close force-merges first one time in N (if no reader was requested)
    pub close_force_merge_one_in: u32,
    /// Test points yield the thread one time in N
    pub yield_one_in: u64,
    /// Upper bound of the thread hint when reopening a reader
    pub max_reader_threads: u64,
    /// Codec whose readers are always reopened from the directory when
    /// deletions must be applied
    pub legacy_codec: String,
    /// Seed used when `STRATA_TEST_SEED` is unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            commit_interval_min: 10,
            commit_interval_max: 1000,
            commit_growth: 1.05,
            commit_growth_cap: 2_000_000.0,
            batch_reroute_one_in: 5,
            reader_force_merge_one_in: 20,
            nrt_commit_one_in: 5,
            close_force_merge_one_in: 8,
            yield_one_in: 4,
            max_reader_threads: 10,
            legacy_codec: LEGACY_CODEC.to_string(),
            seed: None,
        }
    }
}

impl HarnessConfig {
    /// Parse from TOML text and validate.
    pub fn from_toml_str(content: &str) -> StrataResult<Self> {
        let config: HarnessConfig = toml::from_str(content)
            .map_err(|e| StrataError::config(format!("Failed to parse harness config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails
    /// [`validate`](Self::validate).
    pub fn from_file(path: &Path) -> StrataResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StrataError::config(format!(
                "Failed to read harness config '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> StrataResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| StrataError::config(format!("Failed to serialize harness config: {}", e)))
    }

    /// Check that intervals are ordered and every probability is usable.
    pub fn validate(&self) -> StrataResult<()> {
        if self.commit_interval_min == 0 {
            return Err(StrataError::config("commit_interval_min must be at least 1"));
        }
        if self.commit_interval_max < self.commit_interval_min {
            return Err(StrataError::config(format!(
                "commit_interval_max ({}) is below commit_interval_min ({})",
                self.commit_interval_max, self.commit_interval_min
            )));
        }
        if !self.commit_growth.is_finite() || self.commit_growth < 1.0 {
            return Err(StrataError::config("commit_growth must be a finite value >= 1.0"));
        }
        if self.commit_growth_cap.is_nan() || self.commit_growth_cap < 1.0 {
            return Err(StrataError::config("commit_growth_cap must be >= 1.0"));
        }
        let odds = [
            ("batch_reroute_one_in", self.batch_reroute_one_in as u64),
            ("reader_force_merge_one_in", self.reader_force_merge_one_in as u64),
            ("nrt_commit_one_in", self.nrt_commit_one_in as u64),
            ("close_force_merge_one_in", self.close_force_merge_one_in as u64),
            ("yield_one_in", self.yield_one_in),
            ("max_reader_threads", self.max_reader_threads),
        ];
        for (name, value) in odds {
            if value == 0 {
                return Err(StrataError::config(format!("{} must be at least 1", name)));
            }
        }
        Ok(())
    }
}

/// Seed for a randomized run.
///
/// Precedence: `STRATA_TEST_SEED`, then `fallback`, then a fresh random
/// seed. The result is logged so a failing run can be replayed.
pub fn test_seed(fallback: Option<u64>) -> StrataResult<u64> {
    let (seed, source) = match std::env::var(SEED_ENV_VAR) {
        Ok(raw) => (parse_seed(&raw)?, "env"),
        Err(_) => match fallback {
            Some(seed) => (seed, "config"),
            None => (rand::random::<u64>(), "random"),
        },
    };
    tracing::info!(
        target: "strata::randomized",
        seed,
        source,
        "Test seed (set {} to reproduce)",
        SEED_ENV_VAR
    );
    Ok(seed)
}

/// Parse a seed in decimal or `0x`-prefixed hex.
fn parse_seed(raw: &str) -> StrataResult<u64> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };
    parsed.map_err(|e| StrataError::config(format!("Invalid {} '{}': {}", SEED_ENV_VAR, raw, e)))
}
