use std::path::Path;

use serde::Deserialize;

use crate::types::FailurePolicy;

pub const CONFIG_FILE_NAME: &str = "tick-golem.toml";

#[derive(Default, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TickGolemConfig {
    pub driver: DriverConfig,
    pub plan: PlanConfig,
    pub trace: TraceConfig,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    /// Maximum work items executed per drive tick.
    pub budget: u32,
    /// Drive on every Nth tick only.
    pub tick_interval: u32,
    /// Wall-clock period of one tick when run from the CLI.
    pub tick_ms: u64,
    pub on_failure: FailurePolicy,
    pub max_cycles: Option<u64>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PlanConfig {
    /// Relative to the config file's directory.
    pub path: String,
}

#[derive(Default, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TraceConfig {
    /// JSONL trace output. Disabled when unset.
    pub path: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            budget: 10,
            tick_interval: 1,
            tick_ms: 16,
            on_failure: FailurePolicy::Restart,
            max_cycles: None,
        }
    }
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            path: "plan.toml".to_string(),
        }
    }
}

pub fn validate(config: &TickGolemConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.driver.budget < 1 {
        errors.push("driver.budget must be >= 1".to_string());
    }

    if config.driver.tick_interval < 1 {
        errors.push("driver.tick_interval must be >= 1".to_string());
    }

    if config.driver.tick_ms < 1 {
        errors.push("driver.tick_ms must be >= 1".to_string());
    }

    if config.driver.max_cycles == Some(0) {
        errors.push("driver.max_cycles must be >= 1 when set".to_string());
    }

    if config.plan.path.trim().is_empty() {
        errors.push("plan.path must not be empty".to_string());
    }

    if let Some(trace_path) = &config.trace.path {
        if trace_path.trim().is_empty() {
            errors.push("trace.path must not be empty when set".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Format validation errors the way the CLI reports them.
pub fn format_validation_errors(errors: &[String]) -> String {
    format!(
        "Config validation failed:\n{}",
        errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

pub fn load_config(project_root: &Path) -> Result<TickGolemConfig, String> {
    load_config_at(&project_root.join(CONFIG_FILE_NAME), false)
}

/// Load from an explicit path when given, otherwise from `{root}/tick-golem.toml`.
///
/// An explicit path must exist; the default path falls back to defaults.
pub fn load_config_from(
    config_path: Option<&Path>,
    project_root: &Path,
) -> Result<TickGolemConfig, String> {
    match config_path {
        Some(path) => load_config_at(path, true),
        None => load_config(project_root),
    }
}

fn load_config_at(config_path: &Path, required: bool) -> Result<TickGolemConfig, String> {
    if !config_path.exists() {
        if required {
            return Err(format!("Config file not found: {}", config_path.display()));
        }
        return Ok(TickGolemConfig::default());
    }

    let contents = std::fs::read_to_string(config_path)
        .map_err(|e| format!("Failed to read {}: {}", config_path.display(), e))?;

    let config: TickGolemConfig = toml::from_str(&contents)
        .map_err(|e| format!("Failed to parse {}: {}", config_path.display(), e))?;

    validate(&config).map_err(|errors| format_validation_errors(&errors))?;

    Ok(config)
}

/// Contents written by `tick-golem init`.
pub fn default_config_toml() -> String {
    r#"[driver]
budget = 10            # work items per drive tick
tick_interval = 1      # drive on every Nth tick
tick_ms = 16           # tick period for `tick-golem run`
on_failure = "restart" # restart | halt
# max_cycles = 100

[plan]
path = "plan.toml"

[trace]
# path = "trace.jsonl"
"#
    .to_string()
}
