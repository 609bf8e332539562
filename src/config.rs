use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, bail};
use regex::Regex;
use tracing::{debug, trace, warn};

/// Ethereum mainnet slot time
pub const DEFAULT_FREQUENCY: u64 = 12;

pub const DEFAULT_WARMUP_ROUNDS: u32 = 3;

/// Seconds to pause a target after one of its alerts has been sent
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

pub const DEFAULT_WINDOW: usize = 3;

static PUBKEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{96}$").expect("pubkey pattern is valid"));

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory history (lost on restart)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./validators.db")
}

/// Legacy `data` section: `data: { sqlite_db_opts: { path } }`
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegacyData {
    pub sqlite_db_opts: Option<LegacySqliteOpts>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegacySqliteOpts {
    pub path: PathBuf,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    /// Older storage section, used only when `storage` is absent
    pub data: Option<LegacyData>,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct AlertsConfig {
    /// Ticks to wait before the first evaluation
    #[serde(alias = "check_balance_for")]
    pub warmup_rounds: Option<i64>,

    #[serde(alias = "sleep_alerts_for")]
    pub cooldown_secs: Option<i64>,

    pub window: Option<usize>,

    #[serde(default)]
    pub dispatch: DispatchMode,

    #[serde(default)]
    pub sender: SenderConfig,
}

/// How the alerts produced within one tick are delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// At most one alert per tick, the last validator's message wins
    #[default]
    Batched,
    /// One alert for every validator that triggered
    PerEntity,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SenderConfig {
    #[default]
    Log,
    Webhook(Webhook),
    Discord(Discord),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct BeaconApi {
    pub network: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TargetConfig {
    pub beacon_api: BeaconApi,
    #[serde(default)]
    pub validators: Vec<ValidatorEntry>,
    pub frequency: Option<i64>,
    #[serde(default)]
    pub ranges: Vec<RangeConfig>,
}

/// A validator as written in the config file, before validation
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ValidatorEntry {
    pub index: Option<IndexValue>,
    pub pubkey: Option<String>,
}

/// Validator indices are accepted as numbers or decimal strings
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(untagged)]
pub enum IndexValue {
    Number(u64),
    Text(String),
}

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct RangeConfig {
    pub start: i64,
    pub end: i64,
}

/// Identity used to query a validator from the beacon node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValidatorId {
    Index(u64),
    Pubkey(String),
}

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorId::Index(index) => write!(f, "{index}"),
            ValidatorId::Pubkey(pubkey) => write!(f, "{pubkey}"),
        }
    }
}

impl ValidatorEntry {
    pub fn resolve(&self) -> anyhow::Result<ValidatorId> {
        let index = match &self.index {
            Some(IndexValue::Number(index)) => Some(*index),
            Some(IndexValue::Text(text)) if text.trim().is_empty() => None,
            Some(IndexValue::Text(text)) => Some(
                text.trim()
                    .parse::<u64>()
                    .with_context(|| format!("invalid validator index {text:?}"))?,
            ),
            None => None,
        };
        let pubkey = self
            .pubkey
            .as_deref()
            .map(str::trim)
            .filter(|pubkey| !pubkey.is_empty());

        match (index, pubkey) {
            (Some(index), None) => Ok(ValidatorId::Index(index)),
            (None, Some(pubkey)) => {
                if !PUBKEY_PATTERN.is_match(pubkey) {
                    bail!("invalid validator pubkey {pubkey:?}");
                }
                Ok(ValidatorId::Pubkey(pubkey.to_ascii_lowercase()))
            }
            (Some(_), Some(_)) => bail!("validator must define either index or pubkey, not both"),
            (None, None) => bail!("validator must define index or pubkey"),
        }
    }
}

impl RangeConfig {
    /// Expand into concrete indices, `None` if the range is unusable
    fn expand(&self) -> Option<impl Iterator<Item = ValidatorId>> {
        let RangeConfig { start, end } = *self;
        if start < 0 {
            debug!("invalid start index {start}. skipping...");
            return None;
        }
        if end < 0 {
            debug!("invalid end index {end}. skipping...");
            return None;
        }
        if start > end {
            debug!("start index {start} is greater than end index {end}. skipping...");
            return None;
        }

        Some((start as u64..=end as u64).map(ValidatorId::Index))
    }
}

/// Fully resolved configuration, every default applied
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub storage: StorageConfig,
    pub alerts: AlertOptions,
    pub targets: Vec<ResolvedTarget>,
}

/// Alert policy shared by every target loop
#[derive(Debug, Clone)]
pub struct AlertOptions {
    pub warmup_rounds: u32,
    pub cooldown: Duration,
    pub window: usize,
    pub dispatch: DispatchMode,
    pub sender: SenderConfig,
}

impl Default for AlertOptions {
    fn default() -> Self {
        Self {
            warmup_rounds: DEFAULT_WARMUP_ROUNDS,
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
            window: DEFAULT_WINDOW,
            dispatch: DispatchMode::default(),
            sender: SenderConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub beacon_api: BeaconApi,
    pub frequency: u64,
    pub validators: Vec<ValidatorId>,
}

impl ResolvedTarget {
    pub fn network(&self) -> &str {
        &self.beacon_api.network
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.frequency)
    }
}

impl AlertsConfig {
    fn resolve(&self) -> AlertOptions {
        let warmup_rounds = match self.warmup_rounds {
            Some(rounds) if rounds >= 0 => u32::try_from(rounds).unwrap_or(u32::MAX),
            _ => DEFAULT_WARMUP_ROUNDS,
        };
        let cooldown_secs = match self.cooldown_secs {
            Some(secs) if secs >= 0 => secs as u64,
            _ => DEFAULT_COOLDOWN_SECS,
        };
        let window = match self.window {
            Some(window) if window > 0 => window,
            _ => DEFAULT_WINDOW,
        };

        AlertOptions {
            warmup_rounds,
            cooldown: Duration::from_secs(cooldown_secs),
            window,
            dispatch: self.dispatch,
            sender: self.sender.clone(),
        }
    }
}

impl TargetConfig {
    fn resolve(&self) -> anyhow::Result<ResolvedTarget> {
        let frequency = match self.frequency {
            Some(frequency) if frequency > 0 => frequency as u64,
            _ => DEFAULT_FREQUENCY,
        };

        let mut validators = self
            .validators
            .iter()
            .map(ValidatorEntry::resolve)
            .collect::<anyhow::Result<Vec<_>>>()?;

        for range in &self.ranges {
            if let Some(indices) = range.expand() {
                validators.extend(indices);
            }
        }

        Ok(ResolvedTarget {
            beacon_api: self.beacon_api.clone(),
            frequency,
            validators,
        })
    }
}

impl Config {
    /// Apply defaults and expand validator ranges
    pub fn resolve(&self) -> anyhow::Result<ResolvedConfig> {
        let targets = self
            .targets
            .iter()
            .enumerate()
            .map(|(i, target)| {
                debug!("expanding validators ranges for target {i}");
                target
                    .resolve()
                    .with_context(|| format!("invalid target {i} ({})", target.beacon_api.network))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(ResolvedConfig {
            storage: self.resolve_storage(),
            alerts: self.alerts.resolve(),
            targets,
        })
    }

    fn resolve_storage(&self) -> StorageConfig {
        let legacy_path = self
            .data
            .as_ref()
            .and_then(|data| data.sqlite_db_opts.as_ref())
            .map(|opts| opts.path.clone());

        match (&self.storage, legacy_path) {
            (Some(storage), Some(path)) => {
                warn!(
                    "both `storage` and `data.sqlite_db_opts` are set, ignoring {}",
                    path.display()
                );
                storage.clone()
            }
            (Some(storage), None) => storage.clone(),
            (None, Some(path)) => StorageConfig::Sqlite { path },
            (None, None) => StorageConfig::default(),
        }
    }
}

pub fn read_config_file(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let config: Config = match extension.as_deref() {
        Some("json") => serde_json::from_str(&file_content)
            .with_context(|| format!("invalid JSON configuration in {}", path.display()))?,
        Some("yaml" | "yml") => serde_yaml::from_str(&file_content)
            .with_context(|| format!("invalid YAML configuration in {}", path.display()))?,
        _ => bail!("unknown config file format: {}", path.display()),
    };

    trace!("loaded config: {config:?}");
    Ok(config)
}
