//! # PartsRelay インフラ層
//!
//! メール送信バックエンドとの接続・通信を担当するインフラストラクチャ層。
//!
//! ## 設計方針
//!
//! このクレートはドメイン層の送信エンベロープを受け取り、具体的なバックエンド
//! （SMTP リレー、ホスト型メール API）へ届ける。バックエンドの詳細をカプセル化し、
//! ディスパッチ層をトランスポートの違いから保護する。
//!
//! ## 依存関係
//!
//! ```text
//! dispatch-service → infra → domain
//! ```
//!
//! ## モジュール構成
//!
//! - [`transport`] - `TransportProvider` trait と各バックエンド実装
//! - [`error`] - インフラ層エラー定義（プロバイダ構築時のエラー）
//! - `mock` - テスト用の呼び出し記録付きトランスポート（`test-utils` feature）
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use std::time::Duration;
//!
//! use partsrelay_infra::transport::{TransportConfig, build_transport};
//!
//! let transport = build_transport(
//!     &TransportConfig::LocalRelay { host: "localhost".into(), port: 1025 },
//!     Duration::from_secs(30),
//! )?;
//! let reachable = transport.verify().await.is_ok();
//! ```

pub mod error;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use error::InfraError;
pub use transport::{TransportBackend, TransportConfig, TransportProvider, build_transport};
