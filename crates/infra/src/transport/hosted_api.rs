//! ホスト型メール API トランスポート実装
//!
//! Bearer トークン認証の HTTP API（Resend 互換）でメールを送信する。
//!
//! - 送信: `POST {base_url}/emails` → `{ "id": "..." }`
//! - 疎通確認: `GET {base_url}/domains`
//!
//! 送信専用に権限を絞った API キーは `/domains` を参照できず、
//! `401` と `"name": "restricted_api_key"` を返す。キー自体は認証済みのため、
//! 疎通確認ではこの応答を接続成功として扱う。

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use partsrelay_domain::notification::{EmailEnvelope, ProviderMessageId, TransportError};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{TransportBackend, TransportProvider};
use crate::error::InfraError;

/// ホスト型 API トランスポート
pub struct HostedApiTransportProvider {
    client:   reqwest::Client,
    base_url: String,
    api_key:  String,
    timeout:  Duration,
}

/// 送信 API のリクエストボディ
#[derive(Debug, Serialize)]
struct SendEmailPayload<'a> {
    from:        String,
    to:          Vec<&'a str>,
    subject:     &'a str,
    html:        &'a str,
    text:        &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentPayload<'a>>,
}

#[derive(Debug, Serialize)]
struct AttachmentPayload<'a> {
    filename:     &'a str,
    /// base64 エンコード済みの内容
    content:      String,
    content_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

/// エラー応答のボディ（`name` のみ参照する）
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    name: Option<String>,
}

/// 送信専用キーで参照系 API を呼んだときのエラー名
const RESTRICTED_API_KEY: &str = "restricted_api_key";

impl<'a> SendEmailPayload<'a> {
    fn from_envelope(envelope: &'a EmailEnvelope) -> Self {
        Self {
            from:        envelope.from.to_string(),
            to:          envelope.to.iter().map(|e| e.as_str()).collect(),
            subject:     &envelope.subject,
            html:        &envelope.html_body,
            text:        &envelope.text_body,
            attachments: envelope
                .attachments
                .iter()
                .map(|a| AttachmentPayload {
                    filename:     &a.filename,
                    content:      STANDARD.encode(&a.content),
                    content_type: &a.content_type,
                })
                .collect(),
        }
    }
}

impl HostedApiTransportProvider {
    /// 新しいトランスポートを作成
    ///
    /// # 引数
    ///
    /// - `base_url`: API のベース URL（例: `https://api.resend.com`）
    /// - `api_key`: Bearer トークン
    /// - `timeout`: 1 リクエストあたりの上限（接続から応答本文の受信まで）
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self, InfraError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(InfraError::invalid_config(
                "ホスト型 API のベース URL が空です",
            ));
        }
        if api_key.is_empty() {
            return Err(InfraError::invalid_config(
                "ホスト型 API の API キーが空です",
            ));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
            timeout,
        })
    }

    fn build_send_request(&self, envelope: &EmailEnvelope) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&SendEmailPayload::from_envelope(envelope))
    }

    fn build_verify_request(&self) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}/domains", self.base_url))
            .bearer_auth(&self.api_key)
    }

    fn classify_request_error(&self, err: &reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if err.is_connect() {
            TransportError::ConnectionRefused(err.to_string())
        } else {
            TransportError::Unexpected(err.to_string())
        }
    }
}

/// HTTP ステータスを送信エラーに分類する
fn classify_status(status: StatusCode, body: &str) -> TransportError {
    let detail = format!("HTTP {status}: {body}");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            TransportError::AuthenticationRejected(detail)
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            TransportError::RecipientRejected(detail)
        }
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
            TransportError::ConnectionRefused(detail)
        }
        _ => TransportError::Unexpected(detail),
    }
}

/// 疎通確認の失敗応答を解釈する
///
/// 送信専用キーによる `401 restricted_api_key` は接続成功とみなす。
fn interpret_verify_failure(status: StatusCode, body: &str) -> Result<(), TransportError> {
    let restricted = status == StatusCode::UNAUTHORIZED
        && serde_json::from_str::<ErrorResponse>(body)
            .is_ok_and(|e| e.name.as_deref() == Some(RESTRICTED_API_KEY));

    if restricted {
        tracing::debug!("送信専用の API キーのため /domains は参照できません");
        Ok(())
    } else {
        Err(classify_status(status, body))
    }
}

#[async_trait]
impl TransportProvider for HostedApiTransportProvider {
    fn backend(&self) -> TransportBackend {
        TransportBackend::HostedApi
    }

    async fn verify(&self) -> Result<(), TransportError> {
        let response = self
            .build_verify_request()
            .send()
            .await
            .map_err(|e| self.classify_request_error(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        interpret_verify_failure(status, &body)
    }

    async fn send(&self, envelope: &EmailEnvelope) -> Result<ProviderMessageId, TransportError> {
        let response = self
            .build_send_request(envelope)
            .send()
            .await
            .map_err(|e| self.classify_request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: SendEmailResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Unexpected(format!("レスポンス解析失敗: {e}")))?;

        Ok(ProviderMessageId::new(body.id))
    }
}

#[cfg(test)]
mod tests {
    use partsrelay_domain::{
        notification::{Attachment, Mailbox},
        value_objects::Email,
    };
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn email(value: &str) -> Email {
        Email::new(value).unwrap()
    }

    fn make_provider() -> HostedApiTransportProvider {
        HostedApiTransportProvider::new(
            "https://api.resend.com/",
            "re_test_key".to_string(),
            Duration::from_secs(10),
        )
        .unwrap()
    }

    fn make_envelope() -> EmailEnvelope {
        EmailEnvelope {
            from:        Mailbox {
                name:    "PartsRelay".to_string(),
                address: email("noreply@partsrelay.example.com"),
            },
            to:          vec![email("sales@onetimeauto.example.com")],
            subject:     "Alternative/Used Parts Request - Job J-7".to_string(),
            text_body:   "text".to_string(),
            html_body:   "<p>html</p>".to_string(),
            attachments: vec![Attachment::pdf("Alt_Parts_Request_J-7.pdf", b"PDF".to_vec())],
        }
    }

    #[test]
    fn トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HostedApiTransportProvider>();
    }

    #[test]
    fn test_送信リクエストはbearer認証とjsonボディを持つ() {
        let provider = make_provider();
        let envelope = make_envelope();

        let request = provider.build_send_request(&envelope).build().unwrap();

        assert_eq!(request.method(), &reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "https://api.resend.com/emails");
        assert_eq!(
            request
                .headers()
                .get("authorization")
                .unwrap()
                .to_str()
                .unwrap(),
            "Bearer re_test_key"
        );

        let body: serde_json::Value =
            serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "from": "PartsRelay <noreply@partsrelay.example.com>",
                "to": ["sales@onetimeauto.example.com"],
                "subject": "Alternative/Used Parts Request - Job J-7",
                "html": "<p>html</p>",
                "text": "text",
                "attachments": [{
                    "filename": "Alt_Parts_Request_J-7.pdf",
                    "content": "UERG",
                    "content_type": "application/pdf"
                }]
            })
        );
    }

    #[test]
    fn test_疎通確認リクエストはdomainsを参照する() {
        let provider = make_provider();

        let request = provider.build_verify_request().build().unwrap();

        assert_eq!(request.method(), &reqwest::Method::GET);
        assert_eq!(request.url().as_str(), "https://api.resend.com/domains");
    }

    #[test]
    fn test_api_keyが空なら構築に失敗する() {
        let result = HostedApiTransportProvider::new(
            "https://api.resend.com",
            String::new(),
            Duration::from_secs(10),
        );
        assert!(result.is_err());
    }

    #[rstest]
    #[case(StatusCode::UNAUTHORIZED, "authentication_rejected")]
    #[case(StatusCode::FORBIDDEN, "authentication_rejected")]
    #[case(StatusCode::UNPROCESSABLE_ENTITY, "recipient_rejected")]
    #[case(StatusCode::BAD_REQUEST, "recipient_rejected")]
    #[case(StatusCode::SERVICE_UNAVAILABLE, "connection_refused")]
    #[case(StatusCode::INTERNAL_SERVER_ERROR, "unexpected")]
    #[case(StatusCode::TOO_MANY_REQUESTS, "unexpected")]
    fn test_httpステータスを送信エラーに分類する(
        #[case] status: StatusCode,
        #[case] expected: &str,
    ) {
        let actual = match classify_status(status, "{}") {
            TransportError::AuthenticationRejected(_) => "authentication_rejected",
            TransportError::RecipientRejected(_) => "recipient_rejected",
            TransportError::ConnectionRefused(_) => "connection_refused",
            TransportError::Timeout(_) => "timeout",
            TransportError::InvalidMessage(_) => "invalid_message",
            TransportError::Unexpected(_) => "unexpected",
        };
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_送信専用キーの401は疎通成功とみなす() {
        let body = serde_json::json!({
            "statusCode": 401,
            "message": "This API key is restricted to only send emails",
            "name": "restricted_api_key"
        })
        .to_string();

        assert!(interpret_verify_failure(StatusCode::UNAUTHORIZED, &body).is_ok());
    }

    #[rstest]
    #[case(
        StatusCode::UNAUTHORIZED,
        r#"{"statusCode":401,"message":"API key is invalid","name":"validation_error"}"#
    )]
    #[case(StatusCode::UNAUTHORIZED, "not json")]
    #[case(StatusCode::FORBIDDEN, r#"{"name":"restricted_api_key"}"#)]
    fn test_それ以外の認証失敗は疎通失敗になる(#[case] status: StatusCode, #[case] body: &str) {
        assert!(matches!(
            interpret_verify_failure(status, body),
            Err(TransportError::AuthenticationRejected(_))
        ));
    }
}
