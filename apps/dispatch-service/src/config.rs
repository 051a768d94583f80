//! # Dispatch Service 設定
//!
//! 環境変数から起動時の設定スナップショットを読み込む。
//!
//! `EMAIL_PROVIDER` 環境変数で送信バックエンドを切り替える:
//! - `mailhog` / `local-relay`: 認証なしのローカル SMTP（開発、デフォルト）
//! - `smtp`: 認証付き SMTP リレー（`SMTP_USER` がなければローカルリレー扱い）
//! - `resend` / `hosted-api`: Bearer トークンの HTTP メール API
//! - `noop`: 送信しない（ログ出力のみ）
//!
//! 読み込みは [`DispatchConfig::from_lookup`] に集約しており、テストでは
//! プロセスの環境変数を書き換えずに任意の値を渡せる。

use std::{path::PathBuf, time::Duration};

use partsrelay_domain::{
    DomainError,
    notification::Mailbox,
    routing::{EnvironmentMode, OverrideRecipients, RoutingTable},
    value_objects::Email,
};
use partsrelay_infra::transport::{SmtpCredentials, TransportConfig};
use serde::Deserialize;
use thiserror::Error;

/// 組み込みのルーティングテーブル
const EMBEDDED_ROUTING_TABLE: &str = include_str!("../config/routing.json");

const DEFAULT_SMTP_HOST: &str = "localhost";
const DEFAULT_SMTP_PORT: u16 = 1025;
const DEFAULT_HOSTED_API_URL: &str = "https://api.resend.com";
const DEFAULT_FROM_ADDRESS: &str = "noreply@partsrelay.example.com";
const DEFAULT_FROM_NAME: &str = "PartsRelay";
const DEFAULT_TEST_OEM_EMAIL: &str = "test-oem@partsrelay.example.com";
const DEFAULT_TEST_ALT_EMAIL: &str = "test-alt@partsrelay.example.com";
const DEFAULT_TEST_CUSTOMER_EMAIL: &str = "test-customer@partsrelay.example.com";
const DEFAULT_SEND_TIMEOUT_SECS: u64 = 30;

/// 設定読み込みエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 必須の環境変数が設定されていない
    #[error("{0} が設定されていません")]
    Missing(&'static str),

    /// 値の形式が不正
    #[error("{var} の値が不正です: {message}")]
    InvalidValue { var: &'static str, message: String },

    /// 未知の送信バックエンド
    #[error("EMAIL_PROVIDER が未知の値です: {0}")]
    UnknownProvider(String),

    /// ルーティングテーブルファイルを読めない
    #[error("ルーティングテーブルを読み込めません（{path}）: {source}")]
    RoutingFile {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// ルーティングテーブルの形式が不正
    #[error("ルーティングテーブルの形式が不正です: {0}")]
    RoutingFormat(#[from] serde_json::Error),

    /// メーカー別の宛先が一件もない
    #[error("メーカー別のルーティングテーブルが空です")]
    EmptyRoutingTable,

    /// 代替・中古部品の一斉送信リストが空
    #[error("代替・中古部品の一斉送信リストが空です")]
    EmptyBroadcast,
}

/// ルーティング設定
///
/// メーカー別の宛先と、代替・中古部品の一斉送信リスト。
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    pub manufacturers:      RoutingTable,
    pub alt_used_broadcast: Vec<Email>,
}

impl RoutingConfig {
    /// JSON からルーティング設定を読み込む
    ///
    /// アドレスの形式は `Email` のデシリアライズで検証される。
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        if config.manufacturers.is_empty() {
            return Err(ConfigError::EmptyRoutingTable);
        }
        if config.alt_used_broadcast.is_empty() {
            return Err(ConfigError::EmptyBroadcast);
        }
        Ok(config)
    }

    /// 組み込みのルーティング設定
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_json(EMBEDDED_ROUTING_TABLE)
    }
}

/// Dispatch Service の設定
///
/// 起動時に一度だけ構築し、以後変更しない。
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// 環境モード
    pub mode:         EnvironmentMode,
    /// 送信バックエンドの接続設定
    pub transport:    TransportConfig,
    /// 送信者
    pub sender:       Mailbox,
    /// 非本番で使うテスト宛先
    pub overrides:    OverrideRecipients,
    /// ルーティング設定
    pub routing:      RoutingConfig,
    /// 送信・疎通確認 1 回あたりの上限
    pub send_timeout: Duration,
}

impl DispatchConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意のルックアップ関数から設定を読み込む
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mode = match var("APP_ENV").as_deref().map(str::trim) {
            Some("production") => EnvironmentMode::Production,
            _ => EnvironmentMode::NonProduction,
        };

        let transport = transport_config(&var)?;

        let sender = Mailbox {
            name:    var("EMAIL_FROM_NAME").unwrap_or_else(|| DEFAULT_FROM_NAME.to_string()),
            address: parse_email(
                "EMAIL_FROM",
                var("EMAIL_FROM").unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string()),
            )?,
        };

        let overrides = OverrideRecipients {
            oem:      parse_email(
                "TEST_OEM_EMAIL",
                var("TEST_OEM_EMAIL").unwrap_or_else(|| DEFAULT_TEST_OEM_EMAIL.to_string()),
            )?,
            alt_used: parse_email(
                "TEST_ALT_EMAIL",
                var("TEST_ALT_EMAIL").unwrap_or_else(|| DEFAULT_TEST_ALT_EMAIL.to_string()),
            )?,
            customer: parse_email(
                "TEST_CUSTOMER_EMAIL",
                var("TEST_CUSTOMER_EMAIL")
                    .unwrap_or_else(|| DEFAULT_TEST_CUSTOMER_EMAIL.to_string()),
            )?,
        };

        let routing = match var("ROUTING_TABLE_PATH") {
            Some(path) => {
                let path = PathBuf::from(path);
                let json = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::RoutingFile { path, source })?;
                RoutingConfig::from_json(&json)?
            }
            None => RoutingConfig::embedded()?,
        };

        let send_timeout = match var("EMAIL_SEND_TIMEOUT_SECS") {
            Some(value) => {
                let secs: u64 = parse_number("EMAIL_SEND_TIMEOUT_SECS", &value)?;
                if secs == 0 {
                    return Err(ConfigError::InvalidValue {
                        var:     "EMAIL_SEND_TIMEOUT_SECS",
                        message: "1 以上を指定してください".to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECS),
        };

        Ok(Self {
            mode,
            transport,
            sender,
            overrides,
            routing,
            send_timeout,
        })
    }
}

fn transport_config(var: &dyn Fn(&str) -> Option<String>) -> Result<TransportConfig, ConfigError> {
    let provider = var("EMAIL_PROVIDER")
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_else(|| "mailhog".to_string());

    let host = || var("SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string());
    let port = || match var("SMTP_PORT") {
        Some(value) => parse_number("SMTP_PORT", &value),
        None => Ok(DEFAULT_SMTP_PORT),
    };

    match provider.as_str() {
        "mailhog" | "local-relay" => Ok(TransportConfig::LocalRelay {
            host: host(),
            port: port()?,
        }),
        "smtp" => match var("SMTP_USER") {
            Some(username) => {
                let password = var("SMTP_PASSWORD").ok_or(ConfigError::Missing("SMTP_PASSWORD"))?;
                let implicit_tls = match var("SMTP_SECURE") {
                    Some(value) => parse_bool("SMTP_SECURE", &value)?,
                    None => false,
                };
                Ok(TransportConfig::AuthenticatedRelay {
                    host: host(),
                    port: port()?,
                    implicit_tls,
                    credentials: SmtpCredentials::new(username, password),
                })
            }
            None => Ok(TransportConfig::LocalRelay {
                host: host(),
                port: port()?,
            }),
        },
        "resend" | "hosted-api" => Ok(TransportConfig::HostedApi {
            base_url: var("HOSTED_API_URL").unwrap_or_else(|| DEFAULT_HOSTED_API_URL.to_string()),
            api_key:  var("HOSTED_API_KEY").ok_or(ConfigError::Missing("HOSTED_API_KEY"))?,
        }),
        "noop" => Ok(TransportConfig::Noop),
        _ => Err(ConfigError::UnknownProvider(provider)),
    }
}

fn parse_email(var: &'static str, value: String) -> Result<Email, ConfigError> {
    Email::new(value.trim()).map_err(|e: DomainError| ConfigError::InvalidValue {
        var,
        message: e.to_string(),
    })
}

fn parse_number<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            var,
            message: e.to_string(),
        })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            var,
            message: format!("真偽値ではありません: {other}"),
        }),
    }
}
