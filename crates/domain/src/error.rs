//! # ドメイン層エラー定義
//!
//! 入力値の検証失敗などドメイン固有の例外状態を表現するエラー型。
//!
//! ## 使用例
//!
//! ```rust
//! use partsrelay_domain::DomainError;
//!
//! fn validate_job_no(job_no: &str) -> Result<(), DomainError> {
//!     if job_no.is_empty() {
//!         return Err(DomainError::Validation("ジョブ番号は必須です".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// ドメイン層で発生するエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// バリデーションエラー
    ///
    /// 入力値がビジネスルールに違反している場合に使用する。
    ///
    /// # 例
    ///
    /// - ルーティングキーが空
    /// - メールアドレスの形式が不正
    #[error("バリデーションエラー: {0}")]
    Validation(String),
}
