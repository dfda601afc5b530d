use crate::find_tickers::Universe;
use crate::indicators::StdMode;
use crate::klines::CandleSource;
use crate::risk::RiskParams;
use crate::rules::{ConfirmRule, EntryPrice, EntryRule, PriceSource, RsiGate, TouchPrice};
use anyhow::Context;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const STORAGE_ENV: &str = "SCREENER_STORAGE";

// CONFIGURATION STRUCTS
// config.json maps straight onto these types. Only a scanner's name and
// confirmation rule are required, everything else falls back to defaults.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct KlineConfig {
    pub source: CandleSource,
    pub resolution_minutes: u32, // e.g., 60 for 1h candles
    pub lookback_bars: u32,      // how far back to request
    pub min_bars: usize,         // fewer closed bars than this => no data
}

impl Default for KlineConfig {
    fn default() -> Self {
        Self {
            source: CandleSource::default(),
            resolution_minutes: 60,
            lookback_bars: 250,
            min_bars: 50,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_workers: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_workers: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct TelegramConfig {
    pub parse_mode: Option<String>, // "HTML", "Markdown" or none
}

/// One scanner: what to fetch, which rules to run, how to size trades.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScannerConfig {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub source: PriceSource,
    #[serde(default)]
    pub entry: Option<EntryRule>,
    pub confirm: ConfirmRule,
    #[serde(default = "enabled_by_default")]
    pub invalidate_on_opposite: bool,
    #[serde(default)]
    pub expire_after_bars: Option<u32>,
    #[serde(default)]
    pub universe: Universe,
    #[serde(default)]
    pub candles: KlineConfig,
    #[serde(default)]
    pub risk: Option<RiskParams>,
    #[serde(default)]
    pub entry_price: EntryPrice,
}

fn enabled_by_default() -> bool {
    true
}

impl ScannerConfig {
    fn new(name: &str, title: &str, entry: Option<EntryRule>, confirm: ConfirmRule) -> Self {
        Self {
            name: name.to_string(),
            title: Some(title.to_string()),
            enabled: true,
            source: PriceSource::Raw,
            entry,
            confirm,
            invalidate_on_opposite: true,
            expire_after_bars: None,
            universe: Universe::Active,
            candles: KlineConfig::default(),
            risk: Some(RiskParams::default()),
            entry_price: EntryPrice::Close,
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub telegram: TelegramConfig,
    pub margin_currency: String, // e.g., "USDT"
    /// Seconds between cycles; 0 runs a single cycle and exits.
    pub poll_interval_secs: u64,
    pub scanners: Vec<ScannerConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let bb = EntryRule::BollingerTouch {
            period: 20,
            k: 2.0,
            std_mode: StdMode::Sample,
            touch: TouchPrice::Wick,
        };

        let bb_green = ScannerConfig {
            entry_price: EntryPrice::Breakout,
            ..ScannerConfig::new("bb_green", "BB touch + first candle", Some(bb), ConfirmRule::CandleColor)
        };
        let bb_rsi = ScannerConfig {
            source: PriceSource::HeikinAshiCandles,
            ..ScannerConfig::new(
                "bb_rsi",
                "BB touch + RSI (Heikin-Ashi)",
                Some(EntryRule::BollingerTouch {
                    period: 20,
                    k: 3.0,
                    std_mode: StdMode::Sample,
                    touch: TouchPrice::Wick,
                }),
                ConfirmRule::RsiLevel { period: 21, level: 50.0 },
            )
        };
        let bb_supertrend = ScannerConfig {
            expire_after_bars: Some(48),
            ..ScannerConfig::new(
                "bb_supertrend",
                "BB touch + Supertrend flip",
                Some(EntryRule::BollingerTouch {
                    period: 200,
                    k: 3.0,
                    std_mode: StdMode::Sample,
                    touch: TouchPrice::Close,
                }),
                ConfirmRule::SupertrendFlip {
                    period: 10,
                    multiplier: 2.0,
                    rsi: Some(RsiGate { period: 28, level: 52.0 }),
                },
            )
        };
        let bb_breakout = ScannerConfig {
            source: PriceSource::HeikinAshi,
            universe: Universe::Fixed {
                pairs: ["B-BTC_USDT", "B-ETH_USDT", "B-SOL_USDT", "B-XRP_USDT", "B-ZEC_USDT"]
                    .map(String::from)
                    .to_vec(),
            },
            ..ScannerConfig::new(
                "bb_breakout",
                "BB breakout continuation (Heikin-Ashi)",
                None,
                ConfirmRule::BandBreakout { period: 20, k: 1.3, std_mode: StdMode::Population },
            )
        };
        let rsi_macd = ScannerConfig::new(
            "rsi_macd",
            "RSI extreme + MACD cross",
            Some(EntryRule::RsiExtreme { period: 14, oversold: 30.0, overbought: 70.0 }),
            ConfirmRule::MacdCross { fast: 12, slow: 26, signal: 9 },
        );
        let williams = ScannerConfig {
            enabled: false,
            ..ScannerConfig::new(
                "williams_green",
                "Williams %R extreme + first candle",
                Some(EntryRule::WilliamsExtreme { period: 14, oversold: -80.0, overbought: -20.0 }),
                ConfirmRule::CandleColor,
            )
        };
        let cci_setup = ScannerConfig::new(
            "cci_setup",
            "CCI first cross",
            None,
            ConfirmRule::CciCross { period: 20, level: 100.0, quiet_bars: Some(5) },
        );
        let ema_cluster = ScannerConfig::new(
            "ema_cluster",
            "EMA cluster cross",
            None,
            ConfirmRule::EmaCross { fast: 9, slow: 21, trend: Some(50) },
        );
        let stochastic_movers = ScannerConfig {
            universe: Universe::TopMovers { skip: 0, take: 20 },
            ..ScannerConfig::new(
                "stochastic_movers",
                "Stochastic cross on top movers",
                None,
                ConfirmRule::StochasticCross {
                    period: 14,
                    k_smooth: 3,
                    d_smooth: 3,
                    oversold: 20.0,
                    overbought: 80.0,
                },
            )
        };
        let rsi_zone = ScannerConfig {
            risk: None,
            ..ScannerConfig::new(
                "rsi_zone",
                "RSI zone entry",
                None,
                ConfirmRule::RsiZone { period: 14, lower: 30.0, upper: 70.0, follow_momentum: true },
            )
        };
        let adx = ScannerConfig {
            enabled: false,
            ..ScannerConfig::new("adx_trend", "ADX trend start", None, ConfirmRule::AdxTrend { period: 14, threshold: 25.0 })
        };

        Self {
            http: HttpConfig::default(),
            telegram: TelegramConfig::default(),
            margin_currency: "USDT".to_string(),
            poll_interval_secs: 0,
            scanners: vec![
                bb_green,
                bb_rsi,
                bb_supertrend,
                bb_breakout,
                rsi_macd,
                williams,
                cci_setup,
                ema_cluster,
                stochastic_movers,
                rsi_zone,
                adx,
            ],
        }
    }
}

// STORAGE MANAGER

pub struct AsyncStorageManager {
    // Absolute path to the storage directory (e.g., ".../target/debug/storage")
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// Storage directory relative to the running executable.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;
        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);
        Self::new(base_dir).await
    }

    /// Storage in an explicit directory, created if missing.
    pub async fn new<P: AsRef<Path>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir)
                .await
                .with_context(|| format!("creating storage directory {}", base_dir.display()))?;
        }
        Ok(Self { base_dir })
    }

    /// `$SCREENER_STORAGE` if set, else `storage/` next to the binary.
    pub async fn from_env() -> anyhow::Result<Self> {
        match std::env::var_os(STORAGE_ENV) {
            Some(dir) if !dir.is_empty() => Self::new(PathBuf::from(dir)).await,
            _ => Self::new_relative("storage").await,
        }
    }

    fn path_of(&self, filename: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", filename))
    }

    pub async fn exists(&self, filename: &str) -> bool {
        fs::try_exists(self.path_of(filename)).await.unwrap_or(false)
    }

    /// Serializes `data` to `<filename>.json`.
    /// Writes a `.tmp` sibling first and renames it over the target, so a crash
    /// mid-write leaves the previous file intact.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> anyhow::Result<()> {
        let final_path = self.path_of(filename);
        let tmp_path = self.base_dir.join(format!("{}.json.tmp", filename));

        let json_bytes = serde_json::to_vec_pretty(data)?;

        fs::write(&tmp_path, json_bytes)
            .await
            .with_context(|| format!("writing {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &final_path)
            .await
            .with_context(|| format!("replacing {}", final_path.display()))?;

        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        let path = self.path_of(filename);

        // serde_json validates UTF-8 itself, no need for read_to_string
        let content = fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;

        let data = serde_json::from_slice(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(data)
    }

    /// Like [`load`](Self::load) but a missing or unreadable file yields the
    /// default value.
    pub async fn load_or_default<T: DeserializeOwned + Default>(&self, filename: &str) -> T {
        if !self.exists(filename).await {
            log::debug!("{filename}.json not found, starting empty");
            return T::default();
        }
        match self.load(filename).await {
            Ok(data) => data,
            Err(e) => {
                log::warn!("{e:#}; starting empty");
                T::default()
            }
        }
    }
}

/// Reads `config.json`, writing the defaults first when it does not exist.
pub async fn load_config(storage: &AsyncStorageManager) -> anyhow::Result<AppConfig> {
    if !storage.exists("config").await {
        let config = AppConfig::default();
        storage.save("config", &config).await?;
        log::info!("wrote default config to {}", storage.base_dir.join("config.json").display());
        return Ok(config);
    }
    storage.load("config").await.context("invalid config.json")
}
