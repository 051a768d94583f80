//! SMTP トランスポート実装
//!
//! lettre の `AsyncSmtpTransport` を使用してメールを送信する。
//! ローカルリレー（MailHog 等、認証なし）と認証付きリレーの両方を扱う。

use std::{fmt, time::Duration};

use async_trait::async_trait;
use lettre::{
    Address,
    AsyncSmtpTransport,
    AsyncTransport,
    Tokio1Executor,
    message::{
        Attachment as LettreAttachment,
        Mailbox as LettreMailbox,
        Message,
        MultiPart,
        SinglePart,
        header::ContentType,
    },
    transport::smtp::authentication::Credentials,
};
use partsrelay_domain::{
    notification::{EmailEnvelope, ProviderMessageId, TransportError},
    value_objects::Email,
};
use uuid::Uuid;

use super::{TransportBackend, TransportProvider};
use crate::error::InfraError;

/// 認証拒否として扱う SMTP 応答コード
const AUTH_REJECTION_CODES: [&str; 3] = ["530", "534", "535"];

/// SMTP 認証情報
///
/// `Debug` 出力ではパスワードを伏せる。
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpCredentials {
    pub username: String,
    password:     String,
}

impl SmtpCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// SMTP トランスポート
///
/// `lettre::AsyncSmtpTransport<Tokio1Executor>` をラップする。
/// 送信ごとに接続するため、並行呼び出しでも状態を共有しない。
pub struct SmtpTransportProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    backend:   TransportBackend,
    timeout:   Duration,
}

impl SmtpTransportProvider {
    /// 認証なしのローカルリレーに接続するトランスポートを作成
    ///
    /// # 引数
    ///
    /// - `host`: SMTP サーバーのホスト名（例: "localhost"）
    /// - `port`: SMTP サーバーのポート番号（例: 1025 for MailHog）
    /// - `timeout`: 1 コマンドあたりの応答待ち上限
    pub fn local_relay(host: &str, port: u16, timeout: Duration) -> Self {
        // builder_dangerous: TLS なしで接続（MailHog 等のローカル SMTP 向け）
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .timeout(Some(timeout))
            .build();

        Self {
            transport,
            backend: TransportBackend::LocalRelay,
            timeout,
        }
    }

    /// 認証付きリレーに接続するトランスポートを作成
    ///
    /// `implicit_tls` が true の場合は接続直後から TLS（SMTPS, 通常 465 番）を使う。
    /// false の場合は STARTTLS を必須とし、TLS に昇格できないサーバーには認証情報を送らない。
    pub fn authenticated_relay(
        host: &str,
        port: u16,
        implicit_tls: bool,
        credentials: SmtpCredentials,
        timeout: Duration,
    ) -> Result<Self, InfraError> {
        if credentials.username.is_empty() {
            return Err(InfraError::invalid_config(
                "認証付きリレーにはユーザー名が必要です",
            ));
        }

        let builder = if implicit_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
        };

        let transport = builder
            .port(port)
            .credentials(Credentials::new(
                credentials.username,
                credentials.password,
            ))
            .timeout(Some(timeout))
            .build();

        Ok(Self {
            transport,
            backend: TransportBackend::AuthenticatedRelay,
            timeout,
        })
    }
}

#[async_trait]
impl TransportProvider for SmtpTransportProvider {
    fn backend(&self) -> TransportBackend {
        self.backend
    }

    async fn verify(&self) -> Result<(), TransportError> {
        let connected = self
            .transport
            .test_connection()
            .await
            .map_err(|e| classify_smtp_error(&e, self.timeout))?;

        if connected {
            Ok(())
        } else {
            Err(TransportError::ConnectionRefused(
                "SMTP サーバーが NOOP に応答しません".to_string(),
            ))
        }
    }

    async fn send(&self, envelope: &EmailEnvelope) -> Result<ProviderMessageId, TransportError> {
        let (message, message_id) = build_message(envelope)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| classify_smtp_error(&e, self.timeout))?;

        Ok(message_id)
    }
}

/// エンベロープから MIME メッセージを組み立てる
///
/// 構造は `multipart/mixed` = [`multipart/alternative`(text, html), 添付...]。
/// `Message-ID` は送信元ドメインで採番し、そのままプロバイダのメッセージ ID とする。
fn build_message(envelope: &EmailEnvelope) -> Result<(Message, ProviderMessageId), TransportError> {
    let message_id = format!("<{}@{}>", Uuid::now_v7(), envelope.from.address.domain());

    let mut builder = Message::builder()
        .from(LettreMailbox::new(
            Some(envelope.from.name.clone()),
            to_address(&envelope.from.address)?,
        ))
        .message_id(Some(message_id.clone()))
        .subject(&envelope.subject);

    for recipient in &envelope.to {
        builder = builder.to(LettreMailbox::new(None, to_address(recipient)?));
    }

    let alternative = MultiPart::alternative()
        .singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(envelope.text_body.clone()),
        )
        .singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(envelope.html_body.clone()),
        );

    let mut body = MultiPart::mixed().multipart(alternative);
    for attachment in &envelope.attachments {
        let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
            TransportError::InvalidMessage(format!(
                "添付ファイルの Content-Type 不正（{}）: {e}",
                attachment.filename
            ))
        })?;
        body = body.singlepart(
            LettreAttachment::new(attachment.filename.clone())
                .body(attachment.content.to_vec(), content_type),
        );
    }

    let message = builder
        .multipart(body)
        .map_err(|e| TransportError::InvalidMessage(e.to_string()))?;

    Ok((message, ProviderMessageId::new(message_id)))
}

fn to_address(email: &Email) -> Result<Address, TransportError> {
    email
        .as_str()
        .parse()
        .map_err(|e| TransportError::InvalidMessage(format!("アドレス不正（{email}）: {e}")))
}

fn classify_smtp_error(err: &lettre::transport::smtp::Error, timeout: Duration) -> TransportError {
    classify_smtp_failure(
        err.status().map(|code| code.to_string()).as_deref(),
        err.is_timeout(),
        err.to_string(),
        timeout,
    )
}

/// SMTP の失敗を送信エラーに分類する
///
/// - タイムアウト → `Timeout`
/// - 530/534/535 → `AuthenticationRejected`
/// - その他 5xx → `RecipientRejected`
/// - 4xx、または応答コードなし（接続・ネットワーク障害） → `ConnectionRefused`
fn classify_smtp_failure(
    reply_code: Option<&str>,
    timed_out: bool,
    detail: String,
    timeout: Duration,
) -> TransportError {
    if timed_out {
        return TransportError::Timeout(timeout);
    }

    match reply_code {
        Some(code) if AUTH_REJECTION_CODES.contains(&code) => {
            TransportError::AuthenticationRejected(detail)
        }
        Some(code) if code.starts_with('5') => TransportError::RecipientRejected(detail),
        Some(code) if code.starts_with('4') => TransportError::ConnectionRefused(detail),
        Some(_) => TransportError::Unexpected(detail),
        None => TransportError::ConnectionRefused(detail),
    }
}
