use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

#[derive(serde::Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    pub database: DBConfig,
    pub redis_uri: SecretString,
    pub mail: MailConfig,
}

#[derive(serde::Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    /// 签名 session cookie，至少 64 字节
    pub hmac_secret: SecretString,
}

impl WebConfig {
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct DBConfig {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub db_name: String,
    #[serde(default)]
    pub require_ssl: bool,
    /// 完整连接串，设置后覆盖其余字段
    pub dsn: Option<SecretString>,
}

impl DBConfig {
    pub fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(self.password.expose_secret())
            .ssl_mode(ssl_mode)
    }

    pub fn with_db(&self) -> Result<PgConnectOptions, sqlx::Error> {
        match &self.dsn {
            Some(dsn) => PgConnectOptions::from_str(dsn.expose_secret()),
            None => Ok(self.without_db().database(&self.db_name)),
        }
    }
}

/// 邮件投递的静态配置，启动时构造一次，之后只读
#[derive(serde::Deserialize, Clone, Debug)]
pub struct MailConfig {
    /// SMTP 握手时使用的 HELO 域名
    pub domain: String,
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub encryption: Encryption,
    pub from_address: String,
    pub from_name: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_timeout_milliseconds")]
    pub timeout_milliseconds: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            domain: "localhost".into(),
            host: "localhost".into(),
            port: 1025,
            encryption: Encryption::None,
            from_address: "noreply@localhost".into(),
            from_name: "subscription".into(),
            username: None,
            password: None,
            queue_capacity: default_queue_capacity(),
            timeout_milliseconds: default_timeout_milliseconds(),
        }
    }
}

fn default_queue_capacity() -> usize {
    100
}

fn default_timeout_milliseconds() -> u64 {
    10_000
}

#[derive(serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Encryption {
    /// 明文连接
    None,
    /// 隐式 TLS
    Ssl,
    /// STARTTLS
    Tls,
}

/// 依次读取 `config.yaml`、`APP_` 前缀的环境变量，以及 `DSN`/`REDIS`
pub fn try_config() -> Result<Config, config::ConfigError> {
    load(std::env::var("DSN").ok(), std::env::var("REDIS").ok())
}

fn load(dsn: Option<String>, redis: Option<String>) -> Result<Config, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::new("config.yaml", config::FileFormat::Yaml))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .set_override_option("database.dsn", dsn)?
        .set_override_option("redis_uri", redis)?
        .build()?
        .try_deserialize::<Config>()
}
