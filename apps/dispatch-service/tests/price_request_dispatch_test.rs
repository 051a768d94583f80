//! 見積依頼ディスパッチ統合テスト
//!
//! 組み込みのルーティングテーブルと設定読み込みを通して、
//! 宛先解決から送信・レスポンス生成までを検証する。
//!
//! 実行方法:
//! ```bash
//! cargo test -p partsrelay-dispatch-service --test price_request_dispatch_test
//! ```

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use partsrelay_dispatch_service::{
    config::DispatchConfig,
    response::DispatchResponse,
    usecase::{DispatchService, TemplateRenderer},
};
use partsrelay_domain::{
    notification::{FailureKind, PartLine, PriceRequestDetails, TransportError},
    routing::RecipientResolver,
    value_objects::{Email, RoutingKey},
};
use partsrelay_infra::{TransportBackend, mock::MockTransportProvider};
use pretty_assertions::assert_eq;

/// 指定した環境変数だけで設定を読み込み、モックトランスポートでサービスを組み立てる
fn setup(vars: &[(&str, &str)], transport: MockTransportProvider) -> DispatchService {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    let config = DispatchConfig::from_lookup(|name| vars.get(name).cloned())
        .expect("設定の読み込みに失敗");

    let resolver = RecipientResolver::new(
        config.routing.manufacturers,
        config.routing.alt_used_broadcast,
        config.overrides,
        config.mode,
    );

    DispatchService::new(
        resolver,
        Arc::new(transport),
        TemplateRenderer::new(config.sender.name.clone()).expect("テンプレートの読み込みに失敗"),
        config.sender,
        config.send_timeout,
    )
}

fn toyota_details() -> PriceRequestDetails {
    PriceRequestDetails {
        job_no:        "MPT25-0001".to_string(),
        claim_no:      "TEST-CLAIM-001".to_string(),
        vehicle_make:  "Toyota".to_string(),
        vehicle_model: "Corolla".to_string(),
        vehicle_year:  2023,
    }
}

fn parts() -> Vec<PartLine> {
    vec![
        PartLine {
            description: "Front Bumper".to_string(),
            quantity:    1,
        },
        PartLine {
            description: "Headlight Assembly (Left)".to_string(),
            quantity:    1,
        },
    ]
}

fn pdf() -> Bytes {
    Bytes::from_static(b"Test PDF Content for OEM Request")
}

fn toyota() -> RoutingKey {
    RoutingKey::new("Toyota").unwrap()
}

#[tokio::test]
async fn test_本番でtoyotaの見積依頼がディーラーに届く() {
    let transport = MockTransportProvider::new();
    let service = setup(&[("APP_ENV", "production")], transport.clone());

    let outcome = service
        .send_manufacturer_request(&toyota(), &toyota_details(), &parts(), pdf())
        .await;

    assert!(outcome.is_success());
    assert_eq!(
        outcome.recipients(),
        &[Email::new("parts@toyota.dealer.example.com").unwrap()]
    );

    let sent = transport.sent_envelopes();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].subject,
        "Parts Price Request - Claim TEST-CLAIM-001 - Job MPT25-0001"
    );
    assert_eq!(sent[0].attachments.len(), 1);
    assert_eq!(sent[0].attachments[0].filename, "Price_Request_MPT25-0001.pdf");
    assert_eq!(sent[0].attachments[0].content_type, "application/pdf");
    assert!(sent[0].text_body.contains("Headlight Assembly (Left) x 1"));

    let response = DispatchResponse::from_outcome(&outcome, service.transport_backend());
    assert_eq!(response.provider, TransportBackend::Noop);
    assert_eq!(response.message_id.as_deref(), Some("mock-1"));
}

#[tokio::test]
async fn test_非本番でtoyotaの見積依頼はoemテスト宛先に届く() {
    let transport = MockTransportProvider::new();
    let service = setup(
        &[("APP_ENV", "development"), ("TEST_OEM_EMAIL", "qa-oem@partsrelay.example.com")],
        transport.clone(),
    );

    let outcome = service
        .send_manufacturer_request(&toyota(), &toyota_details(), &parts(), pdf())
        .await;

    assert!(outcome.is_success());
    assert_eq!(
        transport.sent_envelopes()[0].to_header(),
        "qa-oem@partsrelay.example.com"
    );
}

#[tokio::test]
async fn test_本番で未契約メーカーは送信されない() {
    let transport = MockTransportProvider::new();
    let service = setup(&[("APP_ENV", "production")], transport.clone());

    let outcome = service
        .send_manufacturer_request(
            &RoutingKey::new("Lada").unwrap(),
            &toyota_details(),
            &parts(),
            pdf(),
        )
        .await;

    let response = DispatchResponse::from_outcome(&outcome, service.transport_backend());
    assert!(!response.success);
    assert_eq!(response.failure_kind, Some(FailureKind::ResolutionEmpty));
    assert_eq!(response.message, "Failed to send email: no recipients");
    assert_eq!(transport.send_calls(), 0);
}

#[tokio::test]
async fn test_本番で代替中古の見積依頼は一斉送信リストの順に届く() {
    let transport = MockTransportProvider::new();
    let service = setup(&[("APP_ENV", "production")], transport.clone());

    let outcome = service
        .send_alt_used_request(&toyota_details(), &parts(), pdf())
        .await;

    assert!(outcome.is_success());
    assert_eq!(
        transport.sent_envelopes()[0].to_header(),
        [
            "sales@onetimeauto.example.com",
            "sales4@partssupport.example.com",
            "marcus@partssupport.example.com",
        ]
        .join(",")
    );
}

#[tokio::test]
async fn test_リレーが宛先を拒否すると失敗結果が返る() {
    let transport = MockTransportProvider::failing(TransportError::RecipientRejected(
        "550 5.1.1 unknown user".to_string(),
    ));
    let service = setup(&[("APP_ENV", "production")], transport.clone());

    let outcome = service
        .send_manufacturer_request(&toyota(), &toyota_details(), &parts(), pdf())
        .await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.failure_kind(), Some(FailureKind::TransportRejected));
    assert!(outcome.failure_reason().unwrap().contains("550 5.1.1"));
    assert_eq!(transport.send_calls(), 1);
}
