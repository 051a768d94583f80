//! # インフラ層エラー定義
//!
//! トランスポートプロバイダの構築（接続準備）で発生するエラーを表現する。
//! 送信時のエラーはドメイン層の `TransportError` で表現し、こちらは起動時のみ使う。
//!
//! ## 構造
//!
//! `std::io::Error` と同じ struct + enum パターンを採用:
//! - [`InfraError`]: エラー種別（[`InfraErrorKind`]）と [`SpanTrace`] を保持するラッパー
//! - [`InfraErrorKind`]: エラーの具体的な種別（Smtp, Http, InvalidConfig 等）

use std::fmt;

use derive_more::Display;
use thiserror::Error;
use tracing_error::SpanTrace;

/// インフラ層で発生するエラー
///
/// エラー種別（[`InfraErrorKind`]）と [`SpanTrace`]（呼び出し経路）を保持する。
/// `From` 実装や convenience constructor でエラーを生成すると、
/// その時点のスパン情報が自動的にキャプチャされる。
#[derive(Display)]
#[display("{kind}")]
pub struct InfraError {
    kind:       InfraErrorKind,
    span_trace: SpanTrace,
}

/// インフラ層エラーの種別
#[derive(Debug, Error)]
pub enum InfraErrorKind {
    /// SMTP トランスポートの構築失敗（TLS パラメータ不正など）
    #[error("SMTP エラー: {0}")]
    Smtp(#[source] lettre::transport::smtp::Error),

    /// HTTP クライアントの構築失敗
    #[error("HTTP クライアントエラー: {0}")]
    Http(#[source] reqwest::Error),

    /// 設定値が不正
    ///
    /// 認証情報や接続先が欠けている場合に使用する。値そのもの（パスワード等）は含めない。
    #[error("設定が不正です: {0}")]
    InvalidConfig(String),
}

impl InfraError {
    /// エラー種別を取得する
    pub fn kind(&self) -> &InfraErrorKind {
        &self.kind
    }

    /// SpanTrace を取得する
    pub fn span_trace(&self) -> &SpanTrace {
        &self.span_trace
    }

    /// 設定不正エラーを生成する
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self {
            kind:       InfraErrorKind::InvalidConfig(msg.into()),
            span_trace: SpanTrace::capture(),
        }
    }
}

impl fmt::Debug for InfraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfraError")
            .field("kind", &self.kind)
            .field("span_trace", &self.span_trace)
            .finish()
    }
}

impl std::error::Error for InfraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

// ===== From 実装（SpanTrace 自動キャプチャ） =====

impl From<lettre::transport::smtp::Error> for InfraError {
    fn from(source: lettre::transport::smtp::Error) -> Self {
        Self {
            kind:       InfraErrorKind::Smtp(source),
            span_trace: SpanTrace::capture(),
        }
    }
}

impl From<reqwest::Error> for InfraError {
    fn from(source: reqwest::Error) -> Self {
        Self {
            kind:       InfraErrorKind::Http(source),
            span_trace: SpanTrace::capture(),
        }
    }
}
