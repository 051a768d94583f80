//! # メール送信トランスポート
//!
//! 送信エンベロープを外部バックエンドへ届けるインフラストラクチャモジュール。
//!
//! ## 設計方針
//!
//! - **trait による抽象化**: `TransportProvider` trait で送信・疎通確認を抽象化
//! - **起動時に 1 回だけ選択**: [`build_transport`] で設定からバックエンドを決定し、
//!   以後プロセス終了まで切り替えない
//! - **失敗を握りつぶさない**: プロバイダはタグ付きの `TransportError` を返すだけで、
//!   ログ出力と結果への変換はディスパッチ層が行う
//!
//! ## バックエンド
//!
//! | バリアント | 実装 | 用途 |
//! |-----------|------|------|
//! | [`TransportBackend::LocalRelay`] | [`SmtpTransportProvider`] | MailHog 等の認証なしローカル SMTP |
//! | [`TransportBackend::AuthenticatedRelay`] | [`SmtpTransportProvider`] | 認証付き SMTP リレー |
//! | [`TransportBackend::HostedApi`] | [`HostedApiTransportProvider`] | Bearer トークンの HTTP メール API |
//! | [`TransportBackend::Noop`] | [`NoopTransportProvider`] | 送信せずログ出力のみ |

mod hosted_api;
mod noop;
mod smtp;

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
pub use hosted_api::HostedApiTransportProvider;
pub use noop::NoopTransportProvider;
use partsrelay_domain::notification::{EmailEnvelope, ProviderMessageId, TransportError};
use serde::Serialize;
pub use smtp::{SmtpCredentials, SmtpTransportProvider};

use crate::error::InfraError;

/// 送信バックエンドの種別
///
/// ログとレスポンスの `provider` フィールドに出力する。認証情報は含まない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransportBackend {
    LocalRelay,
    AuthenticatedRelay,
    HostedApi,
    Noop,
}

/// メール送信トレイト
///
/// プロバイダの構築が接続準備（connect/initialize）にあたる。
/// 実装は並行呼び出しに耐えること。呼び出し間で可変状態を共有しない。
#[async_trait]
pub trait TransportProvider: Send + Sync {
    /// バックエンド種別を返す
    fn backend(&self) -> TransportBackend;

    /// バックエンドとの疎通を確認する（SMTP ハンドシェイク、API 認証確認）
    async fn verify(&self) -> Result<(), TransportError>;

    /// エンベロープを送信し、プロバイダが採番したメッセージ ID を返す
    async fn send(&self, envelope: &EmailEnvelope) -> Result<ProviderMessageId, TransportError>;
}

/// トランスポートの接続設定
///
/// `Debug` 出力ではパスワードと API キーを伏せる。
#[derive(Clone)]
pub enum TransportConfig {
    /// 認証なし SMTP（MailHog など）
    LocalRelay { host: String, port: u16 },
    /// 認証付き SMTP リレー
    AuthenticatedRelay {
        host:         String,
        port:         u16,
        implicit_tls: bool,
        credentials:  SmtpCredentials,
    },
    /// Bearer トークンの HTTP メール API
    HostedApi { base_url: String, api_key: String },
    /// 送信しない
    Noop,
}

impl TransportConfig {
    /// 設定が選択するバックエンド種別
    pub fn backend(&self) -> TransportBackend {
        match self {
            Self::LocalRelay { .. } => TransportBackend::LocalRelay,
            Self::AuthenticatedRelay { .. } => TransportBackend::AuthenticatedRelay,
            Self::HostedApi { .. } => TransportBackend::HostedApi,
            Self::Noop => TransportBackend::Noop,
        }
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalRelay { host, port } => f
                .debug_struct("LocalRelay")
                .field("host", host)
                .field("port", port)
                .finish(),
            Self::AuthenticatedRelay {
                host,
                port,
                implicit_tls,
                credentials,
            } => f
                .debug_struct("AuthenticatedRelay")
                .field("host", host)
                .field("port", port)
                .field("implicit_tls", implicit_tls)
                .field("username", &credentials.username)
                .field("password", &"***")
                .finish(),
            Self::HostedApi { base_url, .. } => f
                .debug_struct("HostedApi")
                .field("base_url", base_url)
                .field("api_key", &"***")
                .finish(),
            Self::Noop => f.write_str("Noop"),
        }
    }
}

/// 設定からトランスポートを構築する
///
/// `timeout` はバックエンドのクライアント側タイムアウトとして設定される。
#[tracing::instrument(skip_all, fields(backend = %config.backend()))]
pub fn build_transport(
    config: &TransportConfig,
    timeout: Duration,
) -> Result<Arc<dyn TransportProvider>, InfraError> {
    let transport: Arc<dyn TransportProvider> = match config {
        TransportConfig::LocalRelay { host, port } => {
            Arc::new(SmtpTransportProvider::local_relay(host, *port, timeout))
        }
        TransportConfig::AuthenticatedRelay {
            host,
            port,
            implicit_tls,
            credentials,
        } => Arc::new(SmtpTransportProvider::authenticated_relay(
            host,
            *port,
            *implicit_tls,
            credentials.clone(),
            timeout,
        )?),
        TransportConfig::HostedApi { base_url, api_key } => Arc::new(
            HostedApiTransportProvider::new(base_url, api_key.clone(), timeout)?,
        ),
        TransportConfig::Noop => Arc::new(NoopTransportProvider),
    };

    tracing::info!(backend = %transport.backend(), "メール送信トランスポートを初期化しました");
    Ok(transport)
}
