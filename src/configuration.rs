use config::{self, ConfigError, Environment as ConfigEnvironment};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::{postgres::PgConnectOptions, ConnectOptions};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub order_service: OrderServiceSettings,
    pub providers: ProviderSettings,
    pub sweep: SweepSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub port: u16,
    pub host: String,
    pub environment: AppEnvironment,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    Local,
    Production,
}

impl AppEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppEnvironment::Local => "local",
            AppEnvironment::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, AppEnvironment::Production)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub backend: DatabaseBackend,
    pub username: String,
    pub password: SecretString,
    pub port: u16,
    pub host: String,
    pub name: String,
}

impl DatabaseSettings {
    pub fn without_db(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .username(&self.username)
            .password(self.password.expose_secret())
            .port(self.port)
    }

    pub fn with_db(&self) -> PgConnectOptions {
        self.without_db()
            .database(&self.name)
            .log_statements(tracing::log::LevelFilter::Trace)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrderServiceSettings {
    pub base_url: String,
    pub authorization_token: SecretString,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderSettings {
    pub mpesa: MobileMoneySettings,
    pub airtel_money: MobileMoneySettings,
    pub equitel: MobileMoneySettings,
    pub card: CardSettings,
    pub bank_transfer: BankTransferSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MobileMoneySettings {
    pub base_url: String,
    pub api_key: SecretString,
    pub webhook_token: SecretString,
    pub min_amount: i64,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CardSettings {
    pub base_url: String,
    pub api_key: SecretString,
    pub webhook_secret: SecretString,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BankTransferSettings {
    pub validity_hours: i64,
    pub account_name: String,
    pub account_number: String,
    pub bank_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SweepSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub pending_max_age_secs: i64,
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");
    let builder = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("configuration.yaml"),
        ))
        .add_source(ConfigEnvironment::default().separator("__"))
        .build()?;
    builder.try_deserialize::<Settings>()
}
