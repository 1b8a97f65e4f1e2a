//! Client configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `campus.{toml,yaml,json}` (or an explicit file), then `CAMPUS_*`
//! environment variables with `__` between nested keys, e.g.
//! `CAMPUS_EXCHANGE__TOKENS_PER_CURRENCY=5000`.

use campus_economics::integration::EconomicsConfig;
use campus_economics::{AccountId, AssetSpec, ExchangeRate, PaymentDestination, Scale, StakingPoolConfig, TrackId};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::refresh::RefreshGrace;
use crate::snapshot::Staleness;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSettings {
    pub id: String,
    pub symbol: String,
    pub decimals: u8,
}

impl AssetSettings {
    fn new(id: &str, symbol: &str, decimals: u8) -> Self {
        AssetSettings {
            id: id.to_string(),
            symbol: symbol.to_string(),
            decimals,
        }
    }

    pub fn spec(&self) -> Result<AssetSpec, ConfigError> {
        let scale = Scale::new(self.decimals).map_err(|e| ConfigError::Invalid(format!("asset {}: {}", self.id, e)))?;
        Ok(AssetSpec::new(&self.id, &self.symbol, scale))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub tokens_per_currency: u64,
    pub currency: AssetSettings,
    pub token: AssetSettings,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        ExchangeSettings {
            tokens_per_currency: 4000,
            currency: AssetSettings::new("eth", "ETH", 18),
            token: AssetSettings::new("yd", "YD", 18),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    pub exchange: String,
    pub course_gate: String,
    pub operator: String,
    /// Course payments go here instead of the creator when set
    pub treasury: Option<String>,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        IdentitySettings {
            exchange: "exchange".to_string(),
            course_gate: "course-gate".to_string(),
            operator: "operator".to_string(),
            treasury: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSettings {
    pub id: String,
    pub pool: String,
    pub asset: AssetSettings,
    pub receipt_symbol: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    pub allowance_grace_ms: u64,
    pub state_grace_ms: u64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        RefreshSettings {
            allowance_grace_ms: 1500,
            state_grace_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StalenessSettings {
    /// Balances and allowances
    pub account_ms: u64,
    /// Reserves, stake records, pool stats and flags
    pub shared_ms: u64,
}

impl Default for StalenessSettings {
    fn default() -> Self {
        StalenessSettings {
            account_ms: 1000,
            shared_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub window_blocks: u64,
    pub max_lookback_blocks: u64,
}

impl Default for HistorySettings {
    fn default() -> Self {
        HistorySettings {
            window_blocks: 1000,
            max_lookback_blocks: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub exchange: ExchangeSettings,
    pub identities: IdentitySettings,
    pub tracks: Vec<TrackSettings>,
    pub refresh: RefreshSettings,
    pub staleness: StalenessSettings,
    pub confirmation_timeout_ms: u64,
    pub history: HistorySettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            exchange: ExchangeSettings::default(),
            identities: IdentitySettings::default(),
            tracks: vec![
                TrackSettings {
                    id: "usdt".to_string(),
                    pool: "staking-usdt".to_string(),
                    asset: AssetSettings::new("usdt", "USDT", 6),
                    receipt_symbol: "aUSDT".to_string(),
                },
                TrackSettings {
                    id: "link".to_string(),
                    pool: "staking-link".to_string(),
                    asset: AssetSettings::new("link", "LINK", 18),
                    receipt_symbol: "aLINK".to_string(),
                },
            ],
            refresh: RefreshSettings::default(),
            staleness: StalenessSettings::default(),
            confirmation_timeout_ms: 60_000,
            history: HistorySettings::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults, then `path` (or an optional `campus.*` in the working directory), then environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("campus").required(false),
        };
        Self::assemble(Config::builder().add_source(Config::try_from(&ClientConfig::default())?).add_source(file))
    }

    /// Defaults overlaid with an inline TOML document, then environment
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Self::assemble(
            Config::builder()
                .add_source(Config::try_from(&ClientConfig::default())?)
                .add_source(File::from_str(contents, FileFormat::Toml)),
        )
    }

    fn assemble(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self, ConfigError> {
        let config: ClientConfig = builder
            .add_source(
                Environment::with_prefix("CAMPUS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exchange.tokens_per_currency == 0 {
            return Err(ConfigError::Invalid("exchange rate must be positive".to_string()));
        }
        let currency = self.exchange.currency.spec()?;
        let token = self.exchange.token.spec()?;
        if currency.id == token.id {
            return Err(ConfigError::Invalid("currency and token must be different assets".to_string()));
        }

        let mut seen = HashSet::new();
        for track in &self.tracks {
            let asset = track.asset.spec()?;
            if !seen.insert(track.id.trim().to_lowercase()) {
                return Err(ConfigError::Invalid(format!("duplicate staking track {}", track.id)));
            }
            for known in [&currency, &token] {
                if known.id == asset.id && known.scale != asset.scale {
                    return Err(ConfigError::Invalid(format!(
                        "track {} uses {} decimals for {}, expected {}",
                        track.id,
                        asset.scale.decimals(),
                        asset.id,
                        known.scale.decimals()
                    )));
                }
            }
        }

        if self.confirmation_timeout_ms == 0 {
            return Err(ConfigError::Invalid("confirmation timeout must be positive".to_string()));
        }
        if self.history.window_blocks == 0 {
            return Err(ConfigError::Invalid("history window must cover at least one block".to_string()));
        }
        Ok(())
    }

    pub fn operator(&self) -> AccountId {
        AccountId::new(&self.identities.operator)
    }

    pub fn exchange_rate(&self) -> Result<ExchangeRate, ConfigError> {
        ExchangeRate::new(
            self.exchange.tokens_per_currency as u128,
            self.exchange.currency.spec()?,
            self.exchange.token.spec()?,
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn track(&self, track: &TrackId) -> Option<&TrackSettings> {
        self.tracks.iter().find(|t| TrackId::new(&t.id) == *track)
    }

    /// Ledger deployment described by this config
    pub fn economics_config(&self) -> Result<EconomicsConfig, ConfigError> {
        let tracks = self
            .tracks
            .iter()
            .map(|track| {
                Ok(StakingPoolConfig {
                    track: TrackId::new(&track.id),
                    pool_id: AccountId::new(&track.pool),
                    asset: track.asset.spec()?,
                    receipt_symbol: track.receipt_symbol.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let destination = match &self.identities.treasury {
            Some(treasury) => PaymentDestination::Treasury(AccountId::new(treasury)),
            None => PaymentDestination::Creator,
        };
        Ok(EconomicsConfig {
            operator: self.operator(),
            exchange_id: AccountId::new(&self.identities.exchange),
            gate_id: AccountId::new(&self.identities.course_gate),
            tokens_per_currency: self.exchange.tokens_per_currency as u128,
            currency: self.exchange.currency.spec()?,
            token: self.exchange.token.spec()?,
            tracks,
            destination,
        })
    }

    pub fn staleness(&self) -> Staleness {
        Staleness {
            account: Duration::from_millis(self.staleness.account_ms),
            shared: Duration::from_millis(self.staleness.shared_ms),
        }
    }

    pub fn refresh_grace(&self) -> RefreshGrace {
        RefreshGrace {
            allowance: Duration::from_millis(self.refresh.allowance_grace_ms),
            state: Duration::from_millis(self.refresh.state_grace_ms),
        }
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.economics_config().unwrap(), EconomicsConfig::reference());
        assert_eq!(config.refresh_grace(), RefreshGrace::default());
        assert_eq!(config.staleness().account, Duration::from_millis(1000));
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = ClientConfig::from_toml(
            r#"
            confirmation_timeout_ms = 5000

            [exchange]
            tokens_per_currency = 5000

            [identities]
            treasury = "platform-treasury"
            "#,
        )
        .unwrap();

        assert_eq!(config.exchange.tokens_per_currency, 5000);
        assert_eq!(config.exchange.token.symbol, "YD");
        assert_eq!(config.tracks.len(), 2);
        assert_eq!(config.confirmation_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.economics_config().unwrap().destination,
            PaymentDestination::Treasury(AccountId::new("platform-treasury"))
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_rate = ClientConfig {
            exchange: ExchangeSettings {
                tokens_per_currency: 0,
                ..ExchangeSettings::default()
            },
            ..ClientConfig::default()
        };
        assert!(matches!(zero_rate.validate(), Err(ConfigError::Invalid(_))));

        let mut wide = ClientConfig::default();
        wide.tracks[0].asset.decimals = 40;
        assert!(matches!(wide.validate(), Err(ConfigError::Invalid(_))));

        let mut duplicate = ClientConfig::default();
        let first = duplicate.tracks[0].clone();
        duplicate.tracks.push(first);
        assert!(matches!(duplicate.validate(), Err(ConfigError::Invalid(_))));

        let mut clash = ClientConfig::default();
        clash.tracks[1].asset = AssetSettings::new("yd", "YD", 6);
        assert!(matches!(clash.validate(), Err(ConfigError::Invalid(_))));
    }
}
