//! # ディスパッチサービス
//!
//! 宛先解決 → エンベロープ組み立て → 送信 → 結果の正規化を統合するサービス。
//!
//! ## 設計方針
//!
//! - **失敗を値で返す**: 各操作は `DeliveryOutcome` を返し、エラーもパニックも伝播しない
//! - **宛先ゼロは送信しない**: 解決結果が空ならトランスポートを呼ばずに失敗を返す
//! - **送信は 1 回のみ**: リトライしない。すべての送信・疎通確認は `send_timeout` で打ち切る
//! - **依存性注入**: `TransportProvider` は trait オブジェクトで受け取る

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use partsrelay_domain::{
    notification::{
        Attachment,
        DeliveryOutcome,
        EmailEnvelope,
        Mailbox,
        NotificationRequest,
        PartLine,
        PriceRequestDetails,
        TransportError,
    },
    routing::{EnvironmentMode, RecipientResolver, RoutingTarget},
    value_objects::{Email, RoutingKey},
};
use partsrelay_infra::{TransportBackend, TransportProvider};
use partsrelay_shared::{
    event_log::{error as error_fields, event},
    log_business_event,
};

use super::{PriceRequestKind, TemplateRenderer};

/// ディスパッチサービス
///
/// 起動時に一度だけ構築し、`Arc` で共有する。内部状態は読み取り専用。
pub struct DispatchService {
    resolver:     RecipientResolver,
    transport:    Arc<dyn TransportProvider>,
    renderer:     TemplateRenderer,
    sender:       Mailbox,
    send_timeout: Duration,
}

impl DispatchService {
    pub fn new(
        resolver: RecipientResolver,
        transport: Arc<dyn TransportProvider>,
        renderer: TemplateRenderer,
        sender: Mailbox,
        send_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            transport,
            renderer,
            sender,
            send_timeout,
        }
    }

    /// 稼働中のバックエンド種別
    pub fn transport_backend(&self) -> TransportBackend {
        self.transport.backend()
    }

    /// 環境モード
    pub fn environment_mode(&self) -> EnvironmentMode {
        self.resolver.mode()
    }

    /// 汎用メールを送信する
    ///
    /// 宛先は顧客カテゴリで解決する。非本番では `request.to` は使われない。
    #[tracing::instrument(
        skip_all,
        fields(category = "customer", backend = %self.transport.backend())
    )]
    pub async fn send_generic(&self, request: NotificationRequest) -> DeliveryOutcome {
        let target = RoutingTarget::Customer(&request.to);
        let recipients = self.resolver.resolve(&target);
        if recipients.is_empty() {
            return self.reject_empty(&target);
        }

        let envelope = EmailEnvelope {
            from:        self.sender.clone(),
            to:          recipients,
            subject:     request.subject,
            text_body:   request.text_body.unwrap_or_default(),
            html_body:   request.html_body,
            attachments: request.attachments,
        };

        self.deliver(&target, envelope).await
    }

    /// メーカーへ純正部品の見積依頼を送信する
    #[tracing::instrument(
        skip_all,
        fields(
            routing_key = %key,
            category = "oem",
            backend = %self.transport.backend(),
            job_no = %details.job_no,
        )
    )]
    pub async fn send_manufacturer_request(
        &self,
        key: &RoutingKey,
        details: &PriceRequestDetails,
        parts: &[PartLine],
        pdf: Bytes,
    ) -> DeliveryOutcome {
        let target = RoutingTarget::Manufacturer(key);
        self.send_price_request(&target, PriceRequestKind::Oem, details, parts, pdf)
            .await
    }

    /// 代替・中古部品サプライヤーへ見積依頼を一斉送信する
    #[tracing::instrument(
        skip_all,
        fields(category = "alt_used", backend = %self.transport.backend(), job_no = %details.job_no)
    )]
    pub async fn send_alt_used_request(
        &self,
        details: &PriceRequestDetails,
        parts: &[PartLine],
        pdf: Bytes,
    ) -> DeliveryOutcome {
        self.send_price_request(
            &RoutingTarget::AltUsed,
            PriceRequestKind::AltUsed,
            details,
            parts,
            pdf,
        )
        .await
    }

    /// トランスポートの疎通を確認する
    ///
    /// 失敗時は原因をログに残し、`false` を返す。
    #[tracing::instrument(skip_all, fields(backend = %self.transport.backend()))]
    pub async fn verify_transport(&self) -> bool {
        let backend = self.transport.backend();
        let result = tokio::time::timeout(self.send_timeout, self.transport.verify())
            .await
            .unwrap_or(Err(TransportError::Timeout(self.send_timeout)));

        match result {
            Ok(()) => {
                log_business_event!(
                    event.category = event::category::TRANSPORT,
                    event.action = event::action::TRANSPORT_VERIFIED,
                    event.result = event::result::SUCCESS,
                    transport.backend = %backend,
                    "メール送信トランスポートの疎通確認に成功"
                );
                true
            }
            Err(e) => {
                log_business_event!(
                    event.category = event::category::TRANSPORT,
                    event.action = event::action::TRANSPORT_VERIFY_FAILED,
                    event.result = event::result::FAILURE,
                    transport.backend = %backend,
                    error.category = error_fields::category::EXTERNAL_SERVICE,
                    error = %e,
                    "メール送信トランスポートの疎通確認に失敗"
                );
                false
            }
        }
    }

    async fn send_price_request(
        &self,
        target: &RoutingTarget<'_>,
        kind: PriceRequestKind,
        details: &PriceRequestDetails,
        parts: &[PartLine],
        pdf: Bytes,
    ) -> DeliveryOutcome {
        let recipients = self.resolver.resolve(target);
        if recipients.is_empty() {
            return self.reject_empty(target);
        }

        let email = match self.renderer.render_price_request(kind, details, parts) {
            Ok(email) => email,
            Err(e) => {
                let error = TransportError::InvalidMessage(e.to_string());
                self.log_failure(target, &recipients, &error);
                return DeliveryOutcome::failed(recipients, &error);
            }
        };

        let envelope = EmailEnvelope {
            from:        self.sender.clone(),
            to:          recipients,
            subject:     email.subject,
            text_body:   email.text_body,
            html_body:   email.html_body,
            attachments: vec![Attachment::pdf(kind.attachment_filename(details), pdf)],
        };

        self.deliver(target, envelope).await
    }

    /// エンベロープを送信し、結果を配信結果に変換する
    async fn deliver(
        &self,
        target: &RoutingTarget<'_>,
        envelope: EmailEnvelope,
    ) -> DeliveryOutcome {
        let result = tokio::time::timeout(self.send_timeout, self.transport.send(&envelope))
            .await
            .unwrap_or(Err(TransportError::Timeout(self.send_timeout)));

        match result {
            Ok(message_id) => {
                log_business_event!(
                    event.category = event::category::NOTIFICATION,
                    event.action = sent_action(target),
                    event.result = event::result::SUCCESS,
                    notification.routing_key = target.routing_key(),
                    notification.category = %target.category(),
                    notification.recipients = %envelope.to_header(),
                    notification.message_id = %message_id,
                    transport.backend = %self.transport.backend(),
                    "メール送信成功"
                );
                DeliveryOutcome::delivered(envelope.to, message_id)
            }
            Err(e) => {
                self.log_failure(target, &envelope.to, &e);
                DeliveryOutcome::failed(envelope.to, &e)
            }
        }
    }

    fn log_failure(
        &self,
        target: &RoutingTarget<'_>,
        recipients: &[Email],
        error: &TransportError,
    ) {
        let failure_kind: &str = error.failure_kind().into();
        log_business_event!(
            event.category = event::category::NOTIFICATION,
            event.action = failed_action(target),
            event.result = event::result::FAILURE,
            event.reason = failure_kind,
            notification.routing_key = target.routing_key(),
            notification.category = %target.category(),
            notification.recipient_count = recipients.len(),
            transport.backend = %self.transport.backend(),
            error.category = error_fields::category::EXTERNAL_SERVICE,
            error = %error,
            "メール送信失敗"
        );
    }

    /// 宛先ゼロの失敗を返す（トランスポートは呼ばない）
    fn reject_empty(&self, target: &RoutingTarget<'_>) -> DeliveryOutcome {
        let outcome = DeliveryOutcome::no_recipients();
        log_business_event!(
            event.category = event::category::NOTIFICATION,
            event.action = failed_action(target),
            event.result = event::result::FAILURE,
            event.reason = outcome.failure_reason().unwrap_or_default(),
            notification.routing_key = target.routing_key(),
            notification.category = %target.category(),
            notification.environment = %self.resolver.mode(),
            transport.backend = %self.transport.backend(),
            error.category = error_fields::category::ROUTING,
            "宛先が解決できないため送信しません"
        );
        outcome
    }
}

fn sent_action(target: &RoutingTarget<'_>) -> &'static str {
    match target {
        RoutingTarget::Customer(_) => event::action::EMAIL_SENT,
        RoutingTarget::Manufacturer(_) | RoutingTarget::AltUsed => {
            event::action::PRICE_REQUEST_SENT
        }
    }
}

fn failed_action(target: &RoutingTarget<'_>) -> &'static str {
    match target {
        RoutingTarget::Customer(_) => event::action::EMAIL_FAILED,
        RoutingTarget::Manufacturer(_) | RoutingTarget::AltUsed => {
            event::action::PRICE_REQUEST_FAILED
        }
    }
}

#[cfg(test)]
mod tests {
    use partsrelay_domain::{
        notification::FailureKind,
        routing::{OverrideRecipients, RoutingTable},
    };
    use partsrelay_infra::mock::MockTransportProvider;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn email(value: &str) -> Email {
        Email::new(value).unwrap()
    }

    fn key(value: &str) -> RoutingKey {
        RoutingKey::new(value).unwrap()
    }

    fn broadcast() -> Vec<Email> {
        vec![
            email("sales@onetimeauto.example.com"),
            email("sales4@partssupport.example.com"),
            email("marcus@partssupport.example.com"),
        ]
    }

    fn overrides() -> OverrideRecipients {
        OverrideRecipients {
            oem:      email("test-oem@partsrelay.example.com"),
            alt_used: email("test-alt@partsrelay.example.com"),
            customer: email("test-customer@partsrelay.example.com"),
        }
    }

    fn make_service(
        transport: MockTransportProvider,
        mode: EnvironmentMode,
        send_timeout: Duration,
    ) -> DispatchService {
        let table = RoutingTable::new()
            .with_route(key("Toyota"), vec![email("sosman@x.co")])
            .with_route(
                key("BMW"),
                vec![email("parts@bmw.example.com"), email("backup@bmw.example.com")],
            );
        let resolver = RecipientResolver::new(table, broadcast(), overrides(), mode);

        DispatchService::new(
            resolver,
            Arc::new(transport),
            TemplateRenderer::new("PartsRelay").unwrap(),
            Mailbox {
                name:    "PartsRelay".to_string(),
                address: email("noreply@partsrelay.example.com"),
            },
            send_timeout,
        )
    }

    fn details() -> PriceRequestDetails {
        PriceRequestDetails {
            job_no:        "J-1".to_string(),
            claim_no:      "C-1".to_string(),
            vehicle_make:  "Toyota".to_string(),
            vehicle_model: "Corolla".to_string(),
            vehicle_year:  2023,
        }
    }

    fn parts() -> Vec<PartLine> {
        vec![PartLine {
            description: "Front Bumper".to_string(),
            quantity:    1,
        }]
    }

    fn pdf() -> Bytes {
        Bytes::from_static(b"%PDF-1.4")
    }

    fn generic_request(to: Vec<Email>) -> NotificationRequest {
        NotificationRequest {
            to,
            subject:     "件名".to_string(),
            html_body:   "<p>本文</p>".to_string(),
            text_body:   None,
            attachments: Vec::new(),
        }
    }

    // =========================================================================
    // メーカー見積依頼
    // =========================================================================

    #[tokio::test]
    async fn test_本番では登録済みメーカーに見積依頼を送信する() {
        let transport = MockTransportProvider::new();
        let service = make_service(
            transport.clone(),
            EnvironmentMode::Production,
            Duration::from_secs(5),
        );

        let outcome = service
            .send_manufacturer_request(&key("BMW"), &details(), &parts(), pdf())
            .await;

        assert!(outcome.is_success());
        assert_eq!(
            outcome.recipients(),
            &[email("parts@bmw.example.com"), email("backup@bmw.example.com")]
        );
        assert_eq!(outcome.provider_message_id().unwrap().as_str(), "mock-1");

        let sent = transport.sent_envelopes();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Parts Price Request - Claim C-1 - Job J-1");
        assert_eq!(sent[0].attachments[0].filename, "Price_Request_J-1.pdf");
        assert_eq!(sent[0].attachments[0].content, pdf());
        assert_eq!(sent[0].from.to_string(), "PartsRelay <noreply@partsrelay.example.com>");
    }

    #[tokio::test]
    async fn test_本番で未登録メーカーは送信せずno_recipientsで失敗する() {
        let transport = MockTransportProvider::new();
        let service = make_service(
            transport.clone(),
            EnvironmentMode::Production,
            Duration::from_secs(5),
        );

        let outcome = service
            .send_manufacturer_request(&key("Haval"), &details(), &parts(), pdf())
            .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.failure_kind(), Some(FailureKind::ResolutionEmpty));
        assert_eq!(outcome.failure_reason(), Some("no recipients"));
        assert!(outcome.recipients().is_empty());
        assert_eq!(transport.send_calls(), 0);
    }

    #[rstest]
    #[case("Toyota")]
    #[case("Haval")]
    #[tokio::test]
    async fn test_非本番ではメーカーに関係なくoemテスト宛先に送信する(#[case] make: &str) {
        let transport = MockTransportProvider::new();
        let service = make_service(
            transport.clone(),
            EnvironmentMode::NonProduction,
            Duration::from_secs(5),
        );

        let outcome = service
            .send_manufacturer_request(&key(make), &details(), &parts(), pdf())
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.recipients(), &[email("test-oem@partsrelay.example.com")]);
        assert_eq!(transport.sent_envelopes()[0].to_header(), "test-oem@partsrelay.example.com");
    }

    // =========================================================================
    // 代替・中古部品の一斉送信
    // =========================================================================

    #[tokio::test]
    async fn test_本番では代替中古の見積依頼を一斉送信リストの順で送る() {
        let transport = MockTransportProvider::new();
        let service = make_service(
            transport.clone(),
            EnvironmentMode::Production,
            Duration::from_secs(5),
        );

        let outcome = service
            .send_alt_used_request(&details(), &parts(), pdf())
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.recipients(), broadcast().as_slice());

        let sent = transport.sent_envelopes();
        assert_eq!(sent[0].to, broadcast());
        assert_eq!(sent[0].subject, "Alternative/Used Parts Request - Job J-1");
        assert_eq!(sent[0].attachments[0].filename, "Alt_Parts_Request_J-1.pdf");
    }

    #[tokio::test]
    async fn test_非本番では代替中古のテスト宛先のみに送る() {
        let transport = MockTransportProvider::new();
        let service = make_service(
            transport.clone(),
            EnvironmentMode::NonProduction,
            Duration::from_secs(5),
        );

        let outcome = service
            .send_alt_used_request(&details(), &parts(), pdf())
            .await;

        assert_eq!(outcome.recipients(), &[email("test-alt@partsrelay.example.com")]);
    }

    // =========================================================================
    // 汎用メール
    // =========================================================================

    #[tokio::test]
    async fn test_本番では汎用メールを指定宛先に送る() {
        let transport = MockTransportProvider::new();
        let service = make_service(
            transport.clone(),
            EnvironmentMode::Production,
            Duration::from_secs(5),
        );

        let outcome = service
            .send_generic(generic_request(vec![email("someone@customer.example.com")]))
            .await;

        assert!(outcome.is_success());
        let sent = transport.sent_envelopes();
        assert_eq!(sent[0].to, vec![email("someone@customer.example.com")]);
        assert_eq!(sent[0].text_body, "");
    }

    #[tokio::test]
    async fn test_非本番では汎用メールを顧客テスト宛先に差し替える() {
        let transport = MockTransportProvider::new();
        let service = make_service(
            transport.clone(),
            EnvironmentMode::NonProduction,
            Duration::from_secs(5),
        );

        let outcome = service
            .send_generic(generic_request(vec![email("someone@customer.example.com")]))
            .await;

        assert_eq!(
            outcome.recipients(),
            &[email("test-customer@partsrelay.example.com")]
        );
    }

    #[tokio::test]
    async fn test_本番で宛先なしの汎用メールは送信しない() {
        let transport = MockTransportProvider::new();
        let service = make_service(
            transport.clone(),
            EnvironmentMode::Production,
            Duration::from_secs(5),
        );

        let outcome = service.send_generic(generic_request(Vec::new())).await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::ResolutionEmpty));
        assert_eq!(transport.send_calls(), 0);
    }

    // =========================================================================
    // 送信失敗
    // =========================================================================

    #[rstest]
    #[case(
        TransportError::RecipientRejected("550 mailbox unavailable".into()),
        FailureKind::TransportRejected
    )]
    #[case(TransportError::AuthenticationRejected("535".into()), FailureKind::TransportRejected)]
    #[case(TransportError::ConnectionRefused("refused".into()), FailureKind::TransportUnavailable)]
    #[case(TransportError::Unexpected("boom".into()), FailureKind::Unknown)]
    #[tokio::test]
    async fn test_送信エラーは失敗結果に変換されて返る(
        #[case] error: TransportError,
        #[case] expected: FailureKind,
    ) {
        let transport = MockTransportProvider::failing(error.clone());
        let service = make_service(
            transport.clone(),
            EnvironmentMode::Production,
            Duration::from_secs(5),
        );

        let outcome = service
            .send_generic(generic_request(vec![email("someone@customer.example.com")]))
            .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.failure_kind(), Some(expected));
        assert_eq!(outcome.failure_reason(), Some(error.to_string().as_str()));
        assert_eq!(outcome.recipients(), &[email("someone@customer.example.com")]);
        assert!(outcome.provider_message_id().is_none());
        assert_eq!(transport.send_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_タイムアウトを超えた送信はtransport_unavailableになる() {
        let transport = MockTransportProvider::new().with_delay(Duration::from_secs(60));
        let service = make_service(
            transport.clone(),
            EnvironmentMode::Production,
            Duration::from_secs(1),
        );

        let outcome = service
            .send_manufacturer_request(&key("Toyota"), &details(), &parts(), pdf())
            .await;

        assert_eq!(outcome.failure_kind(), Some(FailureKind::TransportUnavailable));
        assert!(transport.sent_envelopes().is_empty());
    }

    // =========================================================================
    // 疎通確認
    // =========================================================================

    #[tokio::test]
    async fn test_疎通確認の成否をboolで返す() {
        let ok = MockTransportProvider::new();
        let ng = MockTransportProvider::new()
            .with_verify_error(TransportError::AuthenticationRejected("535".into()));

        let timeout = Duration::from_secs(5);
        let ok_service = make_service(ok.clone(), EnvironmentMode::Production, timeout);
        let ng_service = make_service(ng.clone(), EnvironmentMode::Production, timeout);

        assert!(ok_service.verify_transport().await);
        assert!(!ng_service.verify_transport().await);
        assert_eq!(ok.verify_calls(), 1);
        assert_eq!(ng.verify_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_疎通確認もタイムアウトで打ち切る() {
        let transport = MockTransportProvider::new().with_delay(Duration::from_secs(60));
        let service = make_service(transport, EnvironmentMode::Production, Duration::from_secs(1));

        assert!(!service.verify_transport().await);
    }

    // =========================================================================
    // 並行性
    // =========================================================================

    #[tokio::test]
    async fn test_並行呼び出しでもそれぞれ独立した結果を返す() {
        let transport = MockTransportProvider::new();
        let service = Arc::new(make_service(
            transport.clone(),
            EnvironmentMode::Production,
            Duration::from_secs(5),
        ));

        let handles: Vec<_> = ["Toyota", "BMW", "Haval", "Toyota"]
            .into_iter()
            .map(|make| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .send_manufacturer_request(&key(make), &details(), &parts(), pdf())
                        .await
                })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        let successes = outcomes.iter().filter(|o| o.is_success()).count();
        assert_eq!(successes, 3);
        assert_eq!(outcomes[2].failure_kind(), Some(FailureKind::ResolutionEmpty));
        assert_eq!(transport.send_calls(), 3);
    }

    #[test]
    fn test_アクセサは構築時の設定を返す() {
        let service = make_service(
            MockTransportProvider::new(),
            EnvironmentMode::NonProduction,
            Duration::from_secs(5),
        );

        assert_eq!(service.environment_mode(), EnvironmentMode::NonProduction);
        assert_eq!(service.transport_backend(), TransportBackend::Noop);
    }
}
