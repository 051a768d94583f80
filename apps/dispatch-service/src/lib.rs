//! # Dispatch Service ライブラリ
//!
//! 見積依頼メールの宛先解決と送信を担当するアプリケーション層。
//! バイナリ（`partsrelay-dispatch`）と統合テストの両方から利用する。
//!
//! ## モジュール構成
//!
//! - [`config`] - 環境変数からの設定スナップショット
//! - [`usecase`] - ディスパッチサービスとテンプレートレンダラー
//! - [`response`] - JSON レスポンス DTO
//! - [`cli`] - サブコマンドの解釈と実行

pub mod cli;
pub mod config;
pub mod response;
pub mod usecase;
