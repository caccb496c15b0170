use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Compat mode governing how aggressively the degradation retry engine
/// rewrites a request before giving up (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompatMode {
    Strict,
    #[default]
    Balanced,
    Relaxed,
}

/// Account selection policy (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    #[default]
    RoundRobin,
    Random,
    LeastUsed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the shared accounts file. `None` means the pool runs in
    /// standalone (non-shared) mode and accepts writes.
    pub shared_accounts_file: Option<PathBuf>,
    /// Account selection policy.
    pub selection_policy: SelectionPolicy,
    /// Degradation retry compat mode.
    pub compat_mode: CompatMode,
    /// Cooldown duration before an auto-recovery attempt (§4.3, §9 — not
    /// configurable per the source, kept as a named constant callers can
    /// still read for display purposes).
    #[serde(with = "duration_secs")]
    pub cooldown_duration: Duration,
    /// Safety margin before an access token's reported expiry at which it
    /// is considered no longer valid (§4.2 — minimum 60s).
    #[serde(with = "duration_secs")]
    pub token_safety_margin: Duration,
    /// Upstream AWS region, used to build the `q.<region>.amazonaws.com` host.
    pub region: String,
    /// `KiroIDE-<version>` component of the outbound user-agent headers.
    pub kiro_version: String,
    /// Optional HTTP(S) proxy for outbound upstream/refresh calls.
    pub proxy_url: Option<String>,
    /// Bearer key required on the admin control surface (§6.2).
    pub admin_key: Option<String>,
    /// Capacity of the read-only log ring buffer (§3 LogRecord, §4.9).
    pub log_buffer_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shared_accounts_file: None,
            selection_policy: SelectionPolicy::default(),
            compat_mode: CompatMode::default(),
            cooldown_duration: Duration::from_secs(5 * 60),
            token_safety_margin: Duration::from_secs(60),
            region: "us-east-1".to_string(),
            kiro_version: "0.1.0".to_string(),
            proxy_url: None,
            admin_key: None,
            log_buffer_capacity: 1000,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let config_path = path.unwrap_or_else(Self::default_path);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: Option<PathBuf>) -> anyhow::Result<()> {
        let config_path = path.unwrap_or_else(Self::default_path);

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    fn default_path() -> PathBuf {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home_dir.join(".relayq").join("config.toml")
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
