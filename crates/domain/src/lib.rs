//! # PartsRelay ドメイン層
//!
//! 部品見積依頼メールの宛先解決と配信結果を表現するドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! - **純粋性**: 宛先解決は (ルーティングキー, ルーティングテーブル, 環境モード) の純粋関数
//! - **不変スナップショット**: ルーティングテーブルと環境モードは起動時に一度だけ構築する
//! - **型付きの結果**: 配信結果は bool ではなく [`notification::DeliveryOutcome`] で表現する
//!
//! ## 依存関係の方向
//!
//! ```text
//! dispatch-service → infra → domain
//! ```
//!
//! ドメイン層はトランスポート（SMTP、HTTP API）に一切依存しない。
//!
//! ## モジュール構成
//!
//! - [`error`] - ドメイン層で発生するエラーの定義
//! - [`value_objects`] - メールアドレス、ルーティングキー
//! - [`routing`] - ルーティングテーブルと宛先リゾルバ
//! - [`notification`] - 通知リクエスト、送信エンベロープ、配信結果、送信エラー

pub mod error;
pub mod notification;
pub mod routing;
pub mod value_objects;

pub use error::DomainError;
