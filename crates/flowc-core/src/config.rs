//! Compiler configuration that downstream crates can serialize/deserialize.
//!
//! Layering (lowest to highest priority): defaults, environment, batch
//! description `config:` block, command-line flags.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// What the batch compiler does after a jobflow fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Stop at the first failing jobflow.
    FailFast,
    /// Compile every jobflow, then report all failures together.
    #[default]
    BestEffort,
}

impl FromStr for FailureMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_fast" | "fail-fast" | "true" => Ok(FailureMode::FailFast),
            "best_effort" | "best-effort" | "false" => Ok(FailureMode::BestEffort),
            other => Err(Error::Config(format!("unknown failure mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Identifies one compiler invocation; recorded in every plan.
    pub build_id: String,

    pub failure_mode: FailureMode,

    /// Inline nested flow operators before optimization.
    pub flatten: bool,

    /// Run graph rewriters (checkpoint folding, dead operator elimination).
    pub rewrite: bool,

    /// Upper bound (bytes) for inputs declared `tiny`.
    pub tiny_input_limit_bytes: u64,

    /// Upper bound (bytes) for inputs declared `small`.
    pub small_input_limit_bytes: u64,

    /// Free-form compiler properties, visible to backends.
    pub properties: BTreeMap<String, String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            build_id: Uuid::new_v4().to_string(),
            failure_mode: FailureMode::BestEffort,
            flatten: true,
            rewrite: true,
            tiny_input_limit_bytes: 10 * 1024 * 1024,   // 10 MiB
            small_input_limit_bytes: 200 * 1024 * 1024, // 200 MiB
            properties: BTreeMap::new(),
        }
    }
}

/// Snapshot of the size thresholds used by estimators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatorOptions {
    pub tiny_limit_bytes: f64,
    pub small_limit_bytes: f64,
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        CompilerConfig::default().estimator_options()
    }
}

impl CompilerConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `FLOWC_BUILD_ID`: build identifier
    /// - `FLOWC_FAIL_FAST`: `true` for fail-fast, `false` for best-effort
    /// - `FLOWC_FLATTEN`: inline flow operators (`true`/`false`)
    /// - `FLOWC_REWRITE`: run graph rewriters (`true`/`false`)
    /// - `FLOWC_TINY_LIMIT`: tiny input limit in bytes
    /// - `FLOWC_SMALL_LIMIT`: small input limit in bytes
    /// - `FLOWC_PROP_<KEY>`: compiler property `<key>` (lower-cased)
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Same as [`CompilerConfig::from_env`], over an explicit variable list.
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut cfg = Self::default();

        for (key, value) in vars {
            match key.as_str() {
                "FLOWC_BUILD_ID" => cfg.build_id = value,
                "FLOWC_FAIL_FAST" => {
                    if let Ok(v) = value.parse::<FailureMode>() {
                        cfg.failure_mode = v;
                    }
                }
                "FLOWC_FLATTEN" => {
                    if let Ok(v) = value.parse::<bool>() {
                        cfg.flatten = v;
                    }
                }
                "FLOWC_REWRITE" => {
                    if let Ok(v) = value.parse::<bool>() {
                        cfg.rewrite = v;
                    }
                }
                "FLOWC_TINY_LIMIT" => {
                    if let Ok(v) = value.parse::<u64>() {
                        cfg.tiny_input_limit_bytes = v;
                    }
                }
                "FLOWC_SMALL_LIMIT" => {
                    if let Ok(v) = value.parse::<u64>() {
                        cfg.small_input_limit_bytes = v;
                    }
                }
                _ => {
                    if let Some(prop) = key.strip_prefix("FLOWC_PROP_") {
                        cfg.properties.insert(prop.to_ascii_lowercase(), value);
                    }
                }
            }
        }

        cfg
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), Error> {
        if self.build_id.trim().is_empty() {
            return Err(Error::Config("build id must not be empty".into()));
        }
        if self.tiny_input_limit_bytes > self.small_input_limit_bytes {
            return Err(Error::Config(format!(
                "tiny input limit ({}) exceeds small input limit ({})",
                self.tiny_input_limit_bytes, self.small_input_limit_bytes
            )));
        }
        Ok(())
    }

    /// Produce the size-threshold snapshot used by the optimizer.
    pub fn estimator_options(&self) -> EstimatorOptions {
        EstimatorOptions {
            tiny_limit_bytes: self.tiny_input_limit_bytes as f64,
            small_limit_bytes: self.small_input_limit_bytes as f64,
        }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}
