use crate::config::ServerConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use vigil_common::types::{Event, MultiStrategy, Strategy};
use vigil_judge::Judger;

// ---- Seed file schemas ----

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategySeedFile {
    #[serde(default)]
    pub strategies: Vec<Strategy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiStrategySeedFile {
    #[serde(default)]
    pub multi_strategies: Vec<MultiStrategy>,
}

fn read_seed<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", path, e))
}

pub fn load_strategies(path: &str) -> Result<Vec<Strategy>> {
    let seed: StrategySeedFile = read_seed(path)?;
    Ok(seed.strategies)
}

pub fn load_multi_strategies(path: &str) -> Result<Vec<MultiStrategy>> {
    let seed: MultiStrategySeedFile = read_seed(path)?;
    Ok(seed.multi_strategies)
}

// ---- Judger reload ----

/// Pushes the configured seed files into the judger as full snapshots.
///
/// Returns the `Closed` events produced by the reconciliation. A failure to
/// read either file leaves the judger untouched.
pub fn reload_judger(config: &ServerConfig, judger: &Judger) -> Result<Vec<Event>> {
    let strategies = load_strategies(&config.strategies_path)?;
    let multis = match &config.multi_strategies_path {
        Some(path) => Some(load_multi_strategies(path)?),
        None => None,
    };

    let loaded = strategies.len();
    let mut closed = judger.set_strategy_data(strategies);
    if let Some(multis) = multis {
        closed.extend(judger.set_multi_strategy_data(multis));
    }

    tracing::info!(
        loaded,
        active = judger.unit_count(),
        multi = judger.multi_count(),
        "Judger reloaded from seed files"
    );
    Ok(closed)
}
