//! # レスポンス DTO
//!
//! ディスパッチ結果を JSON に変換する。HTTP 層を載せる場合もこの形状をそのまま返す。

use itertools::Itertools;
use partsrelay_domain::{
    notification::{DeliveryOutcome, FailureKind},
    value_objects::Email,
};
use partsrelay_infra::TransportBackend;
use serde::Serialize;

/// 送信結果レスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResponse {
    pub success:      bool,
    pub message:      String,
    pub recipients:   Vec<String>,
    pub provider:     TransportBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id:   Option<String>,
}

impl DispatchResponse {
    pub fn from_outcome(outcome: &DeliveryOutcome, provider: TransportBackend) -> Self {
        let recipients: Vec<String> = outcome
            .recipients()
            .iter()
            .map(|email| email.as_str().to_string())
            .collect();

        let message = match outcome.failure_reason() {
            None => format!(
                "Email sent to {}",
                outcome.recipients().iter().map(Email::as_str).join(", ")
            ),
            Some(reason) => format!("Failed to send email: {reason}"),
        };

        Self {
            success: outcome.is_success(),
            message,
            recipients,
            provider,
            failure_kind: outcome.failure_kind(),
            message_id: outcome
                .provider_message_id()
                .map(|id| id.as_str().to_string()),
        }
    }
}

/// 接続状態レスポンス
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatusResponse {
    pub success:   bool,
    pub message:   String,
    pub provider:  TransportBackend,
    /// 非本番（宛先差し替えが有効）かどうか
    pub test_mode: bool,
}

impl ConnectionStatusResponse {
    pub fn new(connected: bool, provider: TransportBackend, test_mode: bool) -> Self {
        let message = if connected {
            format!("Email service connected ({provider})")
        } else {
            format!("Email service connection failed ({provider})")
        };

        Self {
            success: connected,
            message,
            provider,
            test_mode,
        }
    }
}
