//! # Observability 基盤
//!
//! トレーシング初期化とログ出力形式の設定を提供する。
//!
//! - 出力形式は `LOG_FORMAT`（`json` / `pretty`）で切り替える
//! - [`init_tracing`] はサービス名を持つルートスパン `app` を返す。呼び出し元は処理全体を
//!   このスパンの中で実行し、JSON ログの `spans[0].service` でサービスを識別できるようにする
//! - `tracing_error::ErrorLayer` を登録し、インフラ層エラーの `SpanTrace` に
//!   送信時のスパン（ルーティングキー、バックエンド）が含まれるようにする

/// ルートスパン名
pub const ROOT_SPAN_NAME: &str = "app";

/// ログ出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON 形式（本番環境向け）
    Json,
    /// 人間が読みやすい形式（開発環境向け）
    #[default]
    Pretty,
}

impl LogFormat {
    /// 文字列からログ形式をパースする
    ///
    /// 大文字小文字と前後の空白は無視する。不正な値は [`Pretty`](LogFormat::Pretty) に
    /// フォールバックし、stderr に警告を出す（subscriber 初期化前のため tracing は使えない）。
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" | "" => Self::Pretty,
            other => {
                eprintln!("WARNING: unknown LOG_FORMAT={other:?}, falling back to pretty");
                Self::Pretty
            }
        }
    }

    /// 環境変数 `LOG_FORMAT` から読み取る
    pub fn from_env() -> Self {
        std::env::var("LOG_FORMAT")
            .map(|val| Self::parse(&val))
            .unwrap_or_default()
    }
}

/// トレーシング初期化設定
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// サービス名（ルートスパンの `service` フィールド）
    pub service_name: String,
    pub log_format:   LogFormat,
}

impl TracingConfig {
    pub fn new(service_name: impl Into<String>, log_format: LogFormat) -> Self {
        Self {
            service_name: service_name.into(),
            log_format,
        }
    }

    /// `LOG_FORMAT` 環境変数から出力形式を決める
    pub fn from_env(service_name: impl Into<String>) -> Self {
        Self::new(service_name, LogFormat::from_env())
    }

    /// サービス名を持つルートスパンを作成する
    #[cfg(feature = "observability")]
    pub fn root_span(&self) -> tracing::Span {
        tracing::info_span!(ROOT_SPAN_NAME, service = %self.service_name)
    }
}

/// トレーシングを初期化し、ルートスパンを返す
///
/// `RUST_LOG` 未設定時のフィルタは `"info,partsrelay=debug"`。
/// JSON 形式ではスパンの一覧を出力するため、ネストした送信スパンの中でも
/// ルートスパンのサービス名が失われない。
#[cfg(feature = "observability")]
pub fn init_tracing(config: &TracingConfig) -> tracing::Span {
    use tracing_subscriber::{Layer as _, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,partsrelay=debug".into());

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(tracing_error::ErrorLayer::default())
        .init();

    config.root_span()
}
