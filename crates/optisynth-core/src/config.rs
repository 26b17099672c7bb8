//! Configuration for workflows, the sandbox and the generation gateway.
//!
//! Values come from (in increasing precedence) defaults, a TOML file and
//! `OPTISYNTH_*` environment variables. Binaries apply CLI flags last.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collaborator::{prompts, CollaboratorRole};
use crate::domain::{OptisynthError, Result};
use crate::policy::DecisionThresholds;
use crate::sandbox::SandboxConfig;

pub const ENV_MAX_ITERATIONS: &str = "OPTISYNTH_MAX_ITERATIONS";
pub const ENV_PYTHON: &str = "OPTISYNTH_PYTHON";
pub const ENV_API_BASE: &str = "OPTISYNTH_API_BASE";
pub const ENV_MODEL: &str = "OPTISYNTH_MODEL";
pub const ENV_API_KEY: &str = "OPTISYNTH_API_KEY";

/// Round-loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Ceiling on rounds, the initial round included.
    pub max_iterations: u32,
    /// Placeholder filled by the designer (objective function).
    pub designer_placeholder: String,
    /// Placeholder filled by the solver (optimization algorithm).
    pub solver_placeholder: String,
    /// Characters of error text kept in reviewer and manager prompts.
    pub error_log_chars: usize,
    pub thresholds: DecisionThresholds,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            designer_placeholder: "OBJECTIVE_FUNCTION".to_string(),
            solver_placeholder: "OPTIMIZATION_ALGORITHM".to_string(),
            error_log_chars: 4000,
            thresholds: DecisionThresholds::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations < 1 {
            return Err(OptisynthError::Config(
                "max_iterations must be at least 1".into(),
            ));
        }
        if self.designer_placeholder.trim().is_empty() || self.solver_placeholder.trim().is_empty()
        {
            return Err(OptisynthError::Config(
                "placeholder names must not be empty".into(),
            ));
        }
        if self.designer_placeholder == self.solver_placeholder {
            return Err(OptisynthError::Config(
                "designer and solver must target different placeholders".into(),
            ));
        }
        if self.error_log_chars == 0 {
            return Err(OptisynthError::Config(
                "error_log_chars must be positive".into(),
            ));
        }
        self.thresholds.validate()
    }
}

/// Generation settings for one collaborator role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleProfile {
    pub temperature: f32,
    pub system_prompt: String,
}

impl RoleProfile {
    pub fn for_role(role: CollaboratorRole) -> Self {
        let temperature = match role {
            CollaboratorRole::Designer => 0.4,
            CollaboratorRole::Solver => 0.2,
            CollaboratorRole::Reviewer => 0.2,
            CollaboratorRole::Manager => 0.3,
        };
        Self {
            temperature,
            system_prompt: prompts::system_prompt(role).to_string(),
        }
    }
}

/// OpenAI-compatible chat endpoint used by the HTTP gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
    pub max_tokens: u32,
    /// Temperature for roles without a profile.
    pub temperature: f32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Profiles keyed by role name (`designer`, `solver`, ...).
    pub roles: BTreeMap<String, RoleProfile>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: ENV_API_KEY.to_string(),
            max_tokens: 4096,
            temperature: 0.2,
            timeout_secs: 300,
            roles: CollaboratorRole::ALL
                .into_iter()
                .map(|role| (role.as_str().to_string(), RoleProfile::for_role(role)))
                .collect(),
        }
    }
}

impl GatewayConfig {
    /// Profile for `role`, falling back to the default temperature and the
    /// built-in system prompt.
    pub fn profile(&self, role: CollaboratorRole) -> RoleProfile {
        self.roles.get(role.as_str()).cloned().unwrap_or_else(|| RoleProfile {
            temperature: self.temperature,
            system_prompt: prompts::system_prompt(role).to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(OptisynthError::Config(format!(
                "gateway base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.model.trim().is_empty() {
            return Err(OptisynthError::Config("gateway model must not be empty".into()));
        }
        if self.max_tokens == 0 || self.timeout_secs == 0 {
            return Err(OptisynthError::Config(
                "gateway max_tokens and timeout_secs must be positive".into(),
            ));
        }
        for name in self.roles.keys() {
            name.parse::<CollaboratorRole>()
                .map_err(|e| OptisynthError::Config(e.to_string()))?;
        }
        let temperatures = std::iter::once(self.temperature)
            .chain(self.roles.values().map(|p| p.temperature));
        for t in temperatures {
            if !(0.0..=2.0).contains(&t) {
                return Err(OptisynthError::Config(format!(
                    "temperature {t} is outside [0, 2]"
                )));
            }
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptisynthConfig {
    pub workflow: WorkflowConfig,
    pub sandbox: SandboxConfig,
    pub gateway: GatewayConfig,
}

impl OptisynthConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| OptisynthError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Load `path` if given (defaults otherwise), apply environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `OPTISYNTH_*` overrides read through `lookup`.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup(ENV_MAX_ITERATIONS) {
            self.workflow.max_iterations = raw.trim().parse().map_err(|_| {
                OptisynthError::Config(format!("{ENV_MAX_ITERATIONS} is not a number: {raw:?}"))
            })?;
        }
        if let Some(python) = lookup(ENV_PYTHON).filter(|v| !v.trim().is_empty()) {
            self.sandbox.interpreter = python;
        }
        if let Some(base) = lookup(ENV_API_BASE).filter(|v| !v.trim().is_empty()) {
            self.gateway.base_url = base.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            self.gateway.model = model;
        }
        // The key itself stays in the environment; only its name is configured.
        if lookup(ENV_API_KEY).is_some() {
            self.gateway.api_key_env = ENV_API_KEY.to_string();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.workflow.validate()?;
        self.sandbox
            .validate()
            .map_err(|e| OptisynthError::Config(e.to_string()))?;
        self.gateway.validate()
    }
}
