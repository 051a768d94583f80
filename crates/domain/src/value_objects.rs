//! # 共通値オブジェクト
//!
//! 宛先解決と送信エンベロープで共有される値オブジェクトを定義する。
//!
//! ## 設計方針
//!
//! - **Newtype パターン**: プリミティブ型をラップし、型安全性を確保
//! - **バリデーション**: 生成時に検証し、不正な値の存在を型レベルで排除
//! - **不変性**: 一度作成したら変更不可
//!
//! ## 含まれる型
//!
//! | 型 | ラップ対象 | 用途 |
//! |---|-----------|------|
//! | [`Email`] | `String` | 宛先・送信元メールアドレス |
//! | [`RoutingKey`] | `String` | 宛先グループの識別子（メーカー名など） |

use serde::{Deserialize, Serialize};

use crate::DomainError;

// =========================================================================
// Email（メールアドレス）
// =========================================================================

/// メールアドレス（値オブジェクト）
///
/// 生成時にバリデーションを実行し、不正な値の作成を防ぐ。
/// 設定ファイルからのデシリアライズ時にも同じ検証が適用される。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// メールアドレスを作成する
    ///
    /// # バリデーション
    ///
    /// - 空文字列ではない
    /// - `local@domain` の形式
    /// - 空白を含まない
    /// - 最大 255 文字
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_string();

        if value.is_empty() {
            return Err(DomainError::Validation(
                "メールアドレスは必須です".to_string(),
            ));
        }

        let Some((local, domain)) = value.split_once('@') else {
            return Err(DomainError::Validation(format!(
                "メールアドレスの形式が不正です: {value}"
            )));
        };

        if local.is_empty() || domain.is_empty() || value.contains(char::is_whitespace) {
            return Err(DomainError::Validation(format!(
                "メールアドレスの形式が不正です: {value}"
            )));
        }

        if value.len() > 255 {
            return Err(DomainError::Validation(
                "メールアドレスは255文字以内である必要があります".to_string(),
            ));
        }

        Ok(Self(value))
    }

    /// 文字列参照を取得する
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// ドメイン部（`@` 以降）を取得する
    pub fn domain(&self) -> &str {
        self.0
            .split_once('@')
            .map_or(self.0.as_str(), |(_, domain)| domain)
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

// =========================================================================
// RoutingKey（ルーティングキー）
// =========================================================================

/// ルーティングキー（値オブジェクト）
///
/// 宛先グループを識別する不透明な文字列。メーカー名（`"Toyota"` など）が入る。
/// 大文字小文字を区別し、空でないこと以外は検証しない。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(derive_more::Display)]
#[serde(try_from = "String", into = "String")]
#[display("{_0}")]
pub struct RoutingKey(String);

impl RoutingKey {
    /// ルーティングキーを作成する
    ///
    /// 空文字列と空白のみの文字列は拒否する。値そのものは加工しない。
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();

        if value.trim().is_empty() {
            return Err(DomainError::Validation(
                "ルーティングキーは必須です".to_string(),
            ));
        }

        Ok(Self(value))
    }

    /// 文字列参照を取得する
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoutingKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoutingKey> for String {
    fn from(key: RoutingKey) -> Self {
        key.0
    }
}
