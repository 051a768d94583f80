//! # 通知
//!
//! 見積依頼メールの送信に関するドメインモデルを定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 説明 |
//! |---|------------|------|
//! | [`NotificationRequest`] | 通知リクエスト | 汎用メール送信の入力 |
//! | [`PriceRequestDetails`] | 見積依頼詳細 | ジョブ番号・クレーム番号・車両情報 |
//! | [`EmailEnvelope`] | 送信エンベロープ | トランスポートに渡す最終メッセージ |
//! | [`DeliveryOutcome`] | 配信結果 | 成功/失敗、宛先、メッセージ ID、失敗理由 |
//! | [`TransportError`] | 送信エラー | トランスポートが返すタグ付きの失敗 |
//!
//! ## 設計方針
//!
//! - **失敗も値で返す**: 送信失敗は [`DeliveryOutcome`] に畳み込み、呼び出し元へ例外を伝播しない
//! - **宛先ゼロは必ず失敗**: 解決された宛先が空なら `success = false`、理由は `"no recipients"`

use bytes::Bytes;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value_objects::Email;

/// 宛先ゼロ時の失敗理由
pub const NO_RECIPIENTS_REASON: &str = "no recipients";

/// PDF の Content-Type
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

// =========================================================================
// 入力
// =========================================================================

/// 添付ファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename:     String,
    pub content_type: String,
    pub content:      Bytes,
}

impl Attachment {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            filename:     filename.into(),
            content_type: content_type.into(),
            content:      content.into(),
        }
    }

    /// PDF 添付ファイルを作成する
    pub fn pdf(filename: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self::new(filename, PDF_CONTENT_TYPE, content)
    }
}

/// 通知リクエスト（汎用メール）
///
/// `to` は呼び出し元が意図した宛先。非本番では顧客テスト宛先に差し替えられる。
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub to:          Vec<Email>,
    pub subject:     String,
    pub html_body:   String,
    pub text_body:   Option<String>,
    pub attachments: Vec<Attachment>,
}

/// 見積依頼の詳細
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRequestDetails {
    pub job_no:        String,
    pub claim_no:      String,
    pub vehicle_make:  String,
    pub vehicle_model: String,
    pub vehicle_year:  u16,
}

/// 見積対象の部品
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartLine {
    pub description: String,
    pub quantity:    u32,
}

// =========================================================================
// 送信エンベロープ
// =========================================================================

/// 送信者（表示名 + アドレス）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub name:    String,
    pub address: Email,
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.address)
    }
}

/// 送信エンベロープ
///
/// 宛先解決後の最終メッセージ。トランスポートに渡される。
#[derive(Debug, Clone)]
pub struct EmailEnvelope {
    pub from:        Mailbox,
    pub to:          Vec<Email>,
    pub subject:     String,
    pub text_body:   String,
    pub html_body:   String,
    pub attachments: Vec<Attachment>,
}

impl EmailEnvelope {
    /// 宛先をカンマ区切りで連結する（To ヘッダ表現）
    pub fn to_header(&self) -> String {
        self.to.iter().map(Email::as_str).join(",")
    }
}

/// プロバイダが採番したメッセージ ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(transparent)]
#[display("{_0}")]
pub struct ProviderMessageId(String);

impl ProviderMessageId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =========================================================================
// 送信エラー
// =========================================================================

/// トランスポートの送信・疎通確認エラー
///
/// プロバイダ内部で握りつぶさず、必ずこの型で呼び出し元に返す。
/// ログ出力してよい情報のみを保持し、認証情報は含めない。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// 接続できない（接続拒否、名前解決失敗など）
    #[error("接続に失敗: {0}")]
    ConnectionRefused(String),

    /// 認証が拒否された
    #[error("認証が拒否された: {0}")]
    AuthenticationRejected(String),

    /// バックエンドが宛先またはメッセージを拒否した
    #[error("送信が拒否された: {0}")]
    RecipientRejected(String),

    /// 応答待ちがタイムアウトした
    #[error("タイムアウト（{0:?}）")]
    Timeout(std::time::Duration),

    /// メッセージを構築できない
    #[error("メッセージ構築失敗: {0}")]
    InvalidMessage(String),

    /// 予期しないプロバイダ障害
    #[error("予期しないエラー: {0}")]
    Unexpected(String),
}

impl TransportError {
    /// 配信結果の失敗種別に分類する
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::ConnectionRefused(_) | Self::Timeout(_) => FailureKind::TransportUnavailable,
            Self::AuthenticationRejected(_) | Self::RecipientRejected(_) => {
                FailureKind::TransportRejected
            }
            Self::InvalidMessage(_) | Self::Unexpected(_) => FailureKind::Unknown,
        }
    }
}

// =========================================================================
// 配信結果
// =========================================================================

/// 失敗種別
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// 宛先が解決できなかった
    ResolutionEmpty,
    /// トランスポートに到達できない（接続失敗・タイムアウト）
    TransportUnavailable,
    /// バックエンドが送信を拒否した
    TransportRejected,
    /// 予期しない障害
    Unknown,
}

/// 失敗の詳細
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub kind:   FailureKind,
    pub reason: String,
}

/// 配信結果
///
/// # 不変条件
///
/// - `success = true` なら宛先は空でなく、メッセージ ID を持つ
/// - 宛先が空なら必ず `success = false`（[`FailureKind::ResolutionEmpty`]）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    success:             bool,
    recipients:          Vec<Email>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider_message_id: Option<ProviderMessageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure:             Option<DeliveryFailure>,
}

impl DeliveryOutcome {
    /// 送信成功
    ///
    /// 宛先が空の場合は成功扱いにせず [`Self::no_recipients`] を返す。
    pub fn delivered(recipients: Vec<Email>, message_id: ProviderMessageId) -> Self {
        if recipients.is_empty() {
            return Self::no_recipients();
        }

        Self {
            success: true,
            recipients,
            provider_message_id: Some(message_id),
            failure: None,
        }
    }

    /// 宛先ゼロによる失敗
    pub fn no_recipients() -> Self {
        Self {
            success:             false,
            recipients:          Vec::new(),
            provider_message_id: None,
            failure:             Some(DeliveryFailure {
                kind:   FailureKind::ResolutionEmpty,
                reason: NO_RECIPIENTS_REASON.to_string(),
            }),
        }
    }

    /// トランスポートエラーによる失敗
    pub fn failed(recipients: Vec<Email>, error: &TransportError) -> Self {
        Self {
            success: false,
            recipients,
            provider_message_id: None,
            failure: Some(DeliveryFailure {
                kind:   error.failure_kind(),
                reason: error.to_string(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn recipients(&self) -> &[Email] {
        &self.recipients
    }

    pub fn provider_message_id(&self) -> Option<&ProviderMessageId> {
        self.provider_message_id.as_ref()
    }

    pub fn failure(&self) -> Option<&DeliveryFailure> {
        self.failure.as_ref()
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.reason.as_str())
    }
}
