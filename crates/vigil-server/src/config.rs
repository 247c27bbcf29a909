use serde::{Deserialize, Serialize};
use vigil_judge::JudgeConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// JSON seed file holding `{ "strategies": [...] }`.
    #[serde(default = "default_strategies_path")]
    pub strategies_path: String,
    /// Optional JSON seed file holding `{ "multi_strategies": [...] }`.
    #[serde(default)]
    pub multi_strategies_path: Option<String>,
    /// Period of the composite scoring scan.
    #[serde(default = "default_multi_scan_interval_secs")]
    pub multi_scan_interval_secs: u64,
    /// Windows without a sample for this long are dropped; 0 keeps them
    /// forever. Measured against the newest metric timestamp judged, not
    /// the wall clock.
    #[serde(default = "default_window_idle_secs")]
    pub window_idle_secs: u64,
    #[serde(default)]
    pub judge: JudgeConfig,
}

fn default_strategies_path() -> String {
    "config/strategies.json".to_string()
}

fn default_multi_scan_interval_secs() -> u64 {
    10
}

fn default_window_idle_secs() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            strategies_path: default_strategies_path(),
            multi_strategies_path: None,
            multi_scan_interval_secs: default_multi_scan_interval_secs(),
            window_idle_secs: default_window_idle_secs(),
            judge: JudgeConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path, e))?;
        Ok(config)
    }
}
