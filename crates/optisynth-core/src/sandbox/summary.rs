//! Structured run summary printed by executed programs.
//!
//! A program reports its outcome with a single stdout line
//! `OPTISYNTH_SUMMARY <json>`. The last such line wins. Python's `json`
//! module emits bare `NaN`/`Infinity` tokens, which are quoted before
//! decoding.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

/// Stdout marker that introduces the summary line.
pub const SUMMARY_PREFIX: &str = "OPTISYNTH_SUMMARY ";

fn non_finite_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([:\[,]\s*)(-?Infinity|NaN)\b").ok())
        .as_ref()
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyStatus {
    Success,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Outcome of one search strategy run inside the program.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StrategyOutcome {
    #[serde(default)]
    pub status: StrategyStatus,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub objective: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StrategyOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == StrategyStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub objective: Option<f64>,
    #[serde(default)]
    pub converged: Option<bool>,
    #[serde(default)]
    pub strategies: BTreeMap<String, StrategyOutcome>,
}

impl RunSummary {
    /// Parse the last summary line of `stdout`, if any decodes.
    pub fn from_stdout(stdout: &str) -> Option<Self> {
        let line = stdout
            .lines()
            .rev()
            .find_map(|l| l.trim_start().strip_prefix(SUMMARY_PREFIX))?;
        Self::parse(line)
    }

    /// Decode one summary payload.
    pub fn parse(payload: &str) -> Option<Self> {
        let quoted = match non_finite_regex() {
            Some(re) => re.replace_all(payload.trim(), "$1\"$2\"").into_owned(),
            None => payload.trim().to_string(),
        };
        match serde_json::from_str(&quoted) {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::debug!(error = %e, "run summary did not decode");
                None
            }
        }
    }

    /// Successful strategy with the lowest finite objective.
    pub fn best_strategy(&self) -> Option<(&str, f64)> {
        self.strategies
            .iter()
            .filter(|(_, s)| s.succeeded())
            .filter_map(|(name, s)| s.objective.filter(|v| v.is_finite()).map(|v| (name.as_str(), v)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Share of strategies that succeeded; `None` without strategies.
    pub fn success_ratio(&self) -> Option<f64> {
        if self.strategies.is_empty() {
            return None;
        }
        let ok = self.strategies.values().filter(|s| s.succeeded()).count();
        Some(ok as f64 / self.strategies.len() as f64)
    }

    /// Best strategy objective, else the top-level objective.
    pub fn best_objective(&self) -> Option<f64> {
        self.best_strategy().map(|(_, v)| v).or(self.objective)
    }
}
