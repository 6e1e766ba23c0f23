use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::{AppConfig, HttpPlannerConfig, PlannerConfig};

/// Get the default data directory: ~/.flowpilot
pub fn get_flowpilot_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".flowpilot"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    load(None)
}

/// Load configuration.
///
/// Priority: explicit path > ~/.flowpilot/config.toml > ./flowpilot.toml > defaults,
/// then `FLOWPILOT_*` environment overrides on top.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    let mut cfg = match explicit {
        Some(path) => load_from_path(path)?,
        None => {
            let home_config = get_flowpilot_data_dir()
                .ok()
                .map(|d| d.join("config.toml"))
                .filter(|p| p.exists());
            let local_config = Path::new("flowpilot.toml");

            if let Some(path) = home_config {
                load_from_path(&path)?
            } else if local_config.exists() {
                load_from_path(local_config)?
            } else {
                AppConfig::default()
            }
        }
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    toml::from_str::<AppConfig>(&s).with_context(|| format!("Invalid config file {:?}", path))
}

/// Apply `FLOWPILOT_*` overrides. Empty values are ignored.
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, get: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| get(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = var("FLOWPILOT_MAX_CONCURRENCY") {
        cfg.engine.max_concurrency = v
            .trim()
            .parse()
            .with_context(|| format!("FLOWPILOT_MAX_CONCURRENCY: invalid value {v:?}"))?;
    }
    if let Some(v) = var("FLOWPILOT_TASK_TIMEOUT_MS") {
        cfg.engine.task_timeout_ms = v
            .trim()
            .parse()
            .with_context(|| format!("FLOWPILOT_TASK_TIMEOUT_MS: invalid value {v:?}"))?;
    }
    if let Some(v) = var("FLOWPILOT_FAILURE_POLICY") {
        cfg.engine.failure_policy = v.parse().map_err(anyhow::Error::msg)?;
    }

    if let Some(url) = var("FLOWPILOT_PLANNER_URL") {
        match &mut cfg.planner {
            PlannerConfig::Http(http) => http.url = url,
            other => {
                *other = PlannerConfig::Http(HttpPlannerConfig {
                    url,
                    ..HttpPlannerConfig::default()
                })
            }
        }
    }
    if let Some(key) = var("FLOWPILOT_PLANNER_API_KEY") {
        if let PlannerConfig::Http(http) = &mut cfg.planner {
            http.api_key = key;
        }
    }

    Ok(())
}

/// Snapshot directory, defaulting to ~/.flowpilot/snapshots.
pub fn snapshot_dir(cfg: &AppConfig) -> anyhow::Result<PathBuf> {
    match cfg.snapshots.directory.as_deref().map(str::trim) {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => Ok(get_flowpilot_data_dir()?.join("snapshots")),
    }
}
