//! Noop トランスポート実装
//!
//! メールを実際に送信せず、ログ出力のみ行う。
//! 送信先を持たないローカル実行や通知無効化時に使用する。

use async_trait::async_trait;
use partsrelay_domain::notification::{EmailEnvelope, ProviderMessageId, TransportError};
use uuid::Uuid;

use super::{TransportBackend, TransportProvider};

/// Noop トランスポート（ログ出力のみ）
#[derive(Debug, Clone)]
pub struct NoopTransportProvider;

#[async_trait]
impl TransportProvider for NoopTransportProvider {
    fn backend(&self) -> TransportBackend {
        TransportBackend::Noop
    }

    async fn verify(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(&self, envelope: &EmailEnvelope) -> Result<ProviderMessageId, TransportError> {
        let message_id = ProviderMessageId::new(format!("noop-{}", Uuid::now_v7()));
        tracing::info!(
            to = %envelope.to_header(),
            subject = %envelope.subject,
            attachments = envelope.attachments.len(),
            message_id = %message_id,
            "Noop: メール送信をスキップ"
        );
        Ok(message_id)
    }
}
