//! Configuration types for bybit-bot

use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::credentials::Credentials;

/// Example configuration shipped with the binary, used when no file is found
pub const EXAMPLE_CONFIG: &str = include_str!("../config.toml.example");

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

/// Exchange connectivity configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Target the Bybit testnet instead of mainnet
    #[serde(default = "default_true")]
    pub testnet: bool,

    /// Signed request validity window (milliseconds)
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,

    /// HTTP request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Requests allowed per rate window
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    /// Sliding rate window length (seconds)
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,

    /// Default TTL for cached GET responses (seconds)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Attempts for requests that time out
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_true() -> bool {
    true
}
fn default_recv_window_ms() -> u64 {
    5000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_requests() -> usize {
    120
}
fn default_rate_window_secs() -> u64 {
    60
}
fn default_cache_ttl_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            testnet: true,
            recv_window_ms: 5000,
            timeout_secs: 30,
            max_requests: 120,
            rate_window_secs: 60,
            cache_ttl_secs: 30,
            max_retries: 3,
        }
    }
}

impl ExchangeConfig {
    /// Environment label used for database files and logs
    pub fn environment(&self) -> &'static str {
        if self.testnet {
            "testnet"
        } else {
            "mainnet"
        }
    }
}

/// Where API credentials are read from
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// `KEY=VALUE` file consulted after the environment
    #[serde(default = "default_keys_file")]
    pub keys_file: PathBuf,
}

fn default_keys_file() -> PathBuf {
    PathBuf::from("keys")
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            keys_file: default_keys_file(),
        }
    }
}

/// Strategy engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Maximum strategies running at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Interval between strategy updates (seconds)
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,

    /// How long fetched market data is reused (seconds)
    #[serde(default = "default_market_data_ttl_secs")]
    pub market_data_ttl_secs: u64,

    /// Kline interval fed to strategies
    #[serde(default = "default_kline_interval")]
    pub kline_interval: String,

    /// Number of klines fetched per update
    #[serde(default = "default_kline_limit")]
    pub kline_limit: u32,

    /// A running strategy not updated for this long is reported (seconds)
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Interval between performance snapshots (seconds)
    #[serde(default = "default_metrics_save_interval_secs")]
    pub metrics_save_interval_secs: u64,
}

fn default_max_concurrent() -> usize {
    3
}
fn default_update_interval_secs() -> u64 {
    5
}
fn default_market_data_ttl_secs() -> u64 {
    30
}
fn default_kline_interval() -> String {
    "1m".to_string()
}
fn default_kline_limit() -> u32 {
    100
}
fn default_stale_after_secs() -> u64 {
    300
}
fn default_metrics_save_interval_secs() -> u64 {
    900
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            update_interval_secs: 5,
            market_data_ttl_secs: 30,
            kline_interval: default_kline_interval(),
            kline_limit: 100,
            stale_after_secs: 300,
            metrics_save_interval_secs: 900,
        }
    }
}

/// Global risk limits (percentages are expressed in percent, not fractions)
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RiskConfig {
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: f64,
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
    #[serde(default = "default_max_stop_loss_pct")]
    pub max_stop_loss_pct: f64,
    #[serde(default = "default_max_position_size_pct")]
    pub max_position_size_pct: f64,
    #[serde(default = "default_max_trades_per_day")]
    pub max_trades_per_day: u32,
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence_threshold: f64,
}

fn default_max_daily_loss_pct() -> f64 {
    20.0
}
fn default_max_consecutive_losses() -> u32 {
    3
}
fn default_max_stop_loss_pct() -> f64 {
    40.0
}
fn default_max_position_size_pct() -> f64 {
    10.0
}
fn default_max_trades_per_day() -> u32 {
    10
}
fn default_max_drawdown_pct() -> f64 {
    15.0
}
fn default_min_confidence() -> f64 {
    0.7
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: 20.0,
            max_consecutive_losses: 3,
            max_stop_loss_pct: 40.0,
            max_position_size_pct: 10.0,
            max_trades_per_day: 10,
            max_drawdown_pct: 15.0,
            min_confidence_threshold: 0.7,
        }
    }
}

/// Execution engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Taker fee charged on simulated fills
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,

    /// Starting quote balance for paper trading
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
}

/// Execution mode: paper trading or live
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Paper,
    Live,
}

fn default_fee_rate() -> Decimal {
    Decimal::new(1, 3) // 0.1%
}
fn default_initial_balance() -> Decimal {
    Decimal::new(10_000, 0)
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Paper,
            fee_rate: default_fee_rate(),
            initial_balance: default_initial_balance(),
        }
    }
}

/// Trade journal configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding one database file per environment
    #[serde(default = "default_db_dir")]
    pub dir: PathBuf,

    /// Rows older than this are removed by cleanup (days)
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Take a backup before `run` starts trading
    #[serde(default)]
    pub backup_on_start: bool,
}

fn default_db_dir() -> PathBuf {
    PathBuf::from("~/.bybit_trading_bot")
}
fn default_retention_days() -> u32 {
    90
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dir: default_db_dir(),
            retention_days: 90,
            backup_on_start: false,
        }
    }
}

impl DatabaseConfig {
    /// Database file for the given environment, with `~` expanded
    pub fn path_for(&self, environment: &str) -> PathBuf {
        expand_home(&self.dir).join(format!("trading_bot_{}.db", environment))
    }
}

/// Telegram notification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub trade_notifications: bool,
    #[serde(default = "default_true")]
    pub error_notifications: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trade_notifications: true,
            error_notifications: true,
        }
    }
}

/// Data capture configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub capture_enabled: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_rotation_interval")]
    pub rotation_interval: String,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_rotation_interval() -> String {
    "1h".to_string()
}
fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string()]
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            capture_enabled: false,
            output_dir: default_output_dir(),
            rotation_interval: default_rotation_interval(),
            symbols: default_symbols(),
        }
    }
}

impl DataConfig {
    /// Rotation interval in seconds. Accepts `s`, `m`, `h` and `d` suffixes
    /// or a bare number of seconds; falls back to one hour.
    pub fn rotation_secs(&self) -> u64 {
        let raw = self.rotation_interval.trim();
        let (digits, unit) = match raw.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
            Some((i, _)) => raw.split_at(i),
            None => (raw, "s"),
        };
        let multiplier = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            "d" => 86_400,
            _ => return 3600,
        };
        match digits.parse::<u64>() {
            Ok(n) if n > 0 => n * multiplier,
            _ => 3600,
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Directory for daily-rolling log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Prometheus exporter port (0 disables the exporter)
    #[serde(default)]
    pub metrics_port: u16,
    /// Set by `--debug`: the level wins over `RUST_LOG`
    #[serde(skip)]
    pub force_level: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
            log_dir: None,
            metrics_port: 0,
            force_level: false,
        }
    }
}

/// A configured strategy instance
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Unique instance name
    pub name: String,
    /// Registry name, e.g. `moving_averages`
    pub kind: String,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Order quantity in base asset
    #[serde(default = "default_position_size")]
    pub position_size: Decimal,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_max_position_size")]
    pub max_position_size: Decimal,
    #[serde(default = "default_strategy_max_daily_loss")]
    pub max_daily_loss: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// Strategy-specific parameters
    #[serde(default)]
    pub params: toml::Table,
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}
fn default_position_size() -> Decimal {
    Decimal::new(1, 2)
}
fn default_stop_loss_pct() -> f64 {
    2.0
}
fn default_take_profit_pct() -> f64 {
    4.0
}
fn default_timeframe() -> String {
    "1h".to_string()
}
fn default_max_position_size() -> Decimal {
    Decimal::new(1, 1)
}
fn default_strategy_max_daily_loss() -> f64 {
    5.0
}

impl StrategyConfig {
    /// Settings for a strategy kind with every other field defaulted
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            symbol: default_symbol(),
            position_size: default_position_size(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            timeframe: default_timeframe(),
            max_position_size: default_max_position_size(),
            max_daily_loss: default_strategy_max_daily_loss(),
            min_confidence: default_min_confidence(),
            auto_start: true,
            params: toml::Table::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// The configuration embedded in the binary
    pub fn example() -> anyhow::Result<Self> {
        Ok(toml::from_str(EXAMPLE_CONFIG)?)
    }

    /// Apply command-line overrides
    pub fn apply_overrides(&mut self, testnet: bool, debug: bool) {
        if testnet {
            self.exchange.testnet = true;
        }
        if debug {
            self.telemetry.log_level = "debug".to_string();
            self.telemetry.force_level = true;
        }
    }

    /// Database file for the active environment
    pub fn database_path(&self) -> PathBuf {
        self.database.path_for(self.exchange.environment())
    }

    /// List configuration problems; an empty list means the config is usable
    pub fn validate(&self, credentials: &Credentials) -> Vec<String> {
        let mut problems = Vec::new();
        let env = self.exchange.environment();

        if self.execution.mode == ExecutionMode::Live
            && credentials.bybit(self.exchange.testnet).is_none()
        {
            problems.push(format!("missing Bybit API keys for {}", env));
        }
        if self.telegram.enabled && credentials.telegram.is_none() {
            problems.push("telegram enabled but bot token or chat id missing".to_string());
        }

        let risk = &self.risk;
        if risk.max_daily_loss_pct <= 0.0 || risk.max_daily_loss_pct > 100.0 {
            problems.push("risk.max_daily_loss_pct must be in (0, 100]".to_string());
        }
        if risk.max_stop_loss_pct <= 0.0 || risk.max_stop_loss_pct > 100.0 {
            problems.push("risk.max_stop_loss_pct must be in (0, 100]".to_string());
        }
        if risk.max_consecutive_losses == 0 || risk.max_trades_per_day == 0 {
            problems.push("risk loss and trade limits must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&risk.min_confidence_threshold) {
            problems.push("risk.min_confidence_threshold must be in [0, 1]".to_string());
        }
        if self.engine.max_concurrent == 0 {
            problems.push("engine.max_concurrent must be positive".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for strategy in &self.strategies {
            if !seen.insert(strategy.name.as_str()) {
                problems.push(format!("duplicate strategy name '{}'", strategy.name));
            }
            if crate::strategy::StrategyKind::from_name(&strategy.kind).is_none() {
                problems.push(format!(
                    "strategy '{}' has unknown kind '{}'",
                    strategy.name, strategy.kind
                ));
            }
        }

        problems
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            Some(home) => PathBuf::from(home).join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rotation_interval_parsing() {
        let mut data = DataConfig::default();
        assert_eq!(data.rotation_secs(), 3600);
        data.rotation_interval = "15m".into();
        assert_eq!(data.rotation_secs(), 900);
        data.rotation_interval = "2d".into();
        assert_eq!(data.rotation_secs(), 172_800);
        data.rotation_interval = "90".into();
        assert_eq!(data.rotation_secs(), 90);
        data.rotation_interval = "soon".into();
        assert_eq!(data.rotation_secs(), 3600);
    }

    #[test]
    fn test_config_deserialize() {
        let toml = r#"
            [exchange]
            testnet = false
            max_requests = 60

            [engine]
            max_concurrent = 2

            [execution]
            mode = "paper"
            fee_rate = 0.002

            [telemetry]
            log_level = "warn"
            log_format = "json"

            [[strategies]]
            name = "ma-btc"
            kind = "moving_averages"
            position_size = 0.005

            [strategies.params]
            fast_period = 5
            slow_period = 20
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert!(!config.exchange.testnet);
        assert_eq!(config.exchange.max_requests, 60);
        assert_eq!(config.exchange.rate_window_secs, 60);
        assert_eq!(config.engine.max_concurrent, 2);
        assert_eq!(config.execution.fee_rate, dec!(0.002));
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
        assert_eq!(config.strategies.len(), 1);

        let strategy = &config.strategies[0];
        assert_eq!(strategy.symbol, "BTCUSDT");
        assert_eq!(strategy.position_size, dec!(0.005));
        assert_eq!(strategy.stop_loss_pct, 2.0);
        assert_eq!(
            strategy.params.get("fast_period").and_then(|v| v.as_integer()),
            Some(5)
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.exchange.testnet);
        assert_eq!(config.engine.update_interval_secs, 5);
        assert_eq!(config.risk, RiskConfig::default());
        assert_eq!(config.execution.mode, ExecutionMode::Paper);
        assert!(config.strategies.is_empty());
    }

    #[test]
    fn test_execution_mode_live() {
        let config: Config = toml::from_str("[execution]\nmode = \"live\"").unwrap();
        assert_eq!(config.execution.mode, ExecutionMode::Live);
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::example().unwrap();
        assert!(config.exchange.testnet);
        assert!(!config.strategies.is_empty());
        assert!(config.validate(&Credentials::default()).is_empty());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config: Config = toml::from_str("[exchange]\ntestnet = false").unwrap();
        config.apply_overrides(false, false);
        assert!(!config.exchange.testnet);
        assert_eq!(config.telemetry.log_level, "info");

        config.apply_overrides(true, true);
        assert!(config.exchange.testnet);
        assert_eq!(config.telemetry.log_level, "debug");
        assert!(config.telemetry.force_level);
    }

    #[test]
    fn test_database_path_per_environment() {
        let mut config: Config = toml::from_str("[database]\ndir = \"/tmp/bot\"").unwrap();
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/bot/trading_bot_testnet.db")
        );
        config.exchange.testnet = false;
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/bot/trading_bot_mainnet.db")
        );
    }

    #[test]
    fn test_validate_reports_problems() {
        let toml = r#"
            [execution]
            mode = "live"

            [risk]
            min_confidence_threshold = 1.5

            [[strategies]]
            name = "a"
            kind = "moving_averages"

            [[strategies]]
            name = "a"
            kind = "adaptive_ml"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        let problems = config.validate(&Credentials::default());

        assert!(problems.iter().any(|p| p.contains("API keys")));
        assert!(problems.iter().any(|p| p.contains("min_confidence")));
        assert!(problems.iter().any(|p| p.contains("duplicate")));
        assert!(problems.iter().any(|p| p.contains("adaptive_ml")));
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_expand_home_leaves_absolute_paths() {
        let path = Path::new("/var/lib/bot");
        assert_eq!(expand_home(path), PathBuf::from("/var/lib/bot"));
    }
}
