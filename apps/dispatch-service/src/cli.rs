//! # コマンドライン
//!
//! `partsrelay-dispatch` バイナリのサブコマンドを解釈し、ディスパッチサービスを呼び出す。
//!
//! | サブコマンド | 動作 |
//! |------------|------|
//! | `verify`（デフォルト） | トランスポートの疎通を確認する |
//! | `test-email [to [subject [message]]]` | 汎用テストメールを送信する（件名・本文は省略可） |
//! | `test-oem-request [make]` | サンプルのメーカー見積依頼を送信する（デフォルト `Toyota`） |
//! | `test-alt-request` | サンプルの代替・中古部品見積依頼を送信する |

use bytes::Bytes;
use partsrelay_domain::{
    DomainError,
    notification::{NotificationRequest, PartLine, PriceRequestDetails},
    value_objects::{Email, RoutingKey},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    response::{ConnectionStatusResponse, DispatchResponse},
    usecase::DispatchService,
};

const DEFAULT_TEST_MAKE: &str = "Toyota";
const SAMPLE_PDF: &[u8] = b"Test PDF Content for OEM Request";
const DEFAULT_TEST_SUBJECT: &str = "PartsRelay Test Email";
const DEFAULT_TEST_MESSAGE: &str = "This is a test email from PartsRelay.";

/// コマンドライン解釈エラー
#[derive(Debug, Error)]
pub enum CliError {
    #[error("未知のサブコマンドです: {0}（verify, test-email, test-oem-request, test-alt-request）")]
    UnknownCommand(String),

    #[error("引数が不正です: {0}")]
    InvalidArgument(#[from] DomainError),

    #[error("余分な引数があります: {0}")]
    UnexpectedArgument(String),
}

/// サブコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Verify,
    TestEmail {
        to:      Option<Email>,
        subject: Option<String>,
        message: Option<String>,
    },
    TestOemRequest { make: RoutingKey },
    TestAltRequest,
}

impl Command {
    /// プログラム名を除いた引数列からサブコマンドを解釈する
    pub fn parse<I>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let command = match args.next().as_deref() {
            None | Some("verify") => Self::Verify,
            Some("test-email") => Self::TestEmail {
                to:      args.next().map(Email::new).transpose()?,
                subject: args.next(),
                message: args.next(),
            },
            Some("test-oem-request") => {
                let make = args.next().unwrap_or_else(|| DEFAULT_TEST_MAKE.to_string());
                Self::TestOemRequest {
                    make: RoutingKey::new(make)?,
                }
            }
            Some("test-alt-request") => Self::TestAltRequest,
            Some(other) => return Err(CliError::UnknownCommand(other.to_string())),
        };

        match args.next() {
            Some(extra) => Err(CliError::UnexpectedArgument(extra)),
            None => Ok(command),
        }
    }
}

/// サブコマンドの出力
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    Connection(ConnectionStatusResponse),
    Dispatch(DispatchResponse),
}

impl CommandOutput {
    pub fn is_success(&self) -> bool {
        match self {
            Self::Connection(response) => response.success,
            Self::Dispatch(response) => response.success,
        }
    }
}

/// サブコマンドを実行する
///
/// `default_to` は `test-email` で宛先が省略されたときに使う。
pub async fn run(command: Command, service: &DispatchService, default_to: &Email) -> CommandOutput {
    let provider = service.transport_backend();

    match command {
        Command::Verify => {
            let connected = service.verify_transport().await;
            CommandOutput::Connection(ConnectionStatusResponse::new(
                connected,
                provider,
                service.environment_mode().is_test_mode(),
            ))
        }
        Command::TestEmail {
            to,
            subject,
            message,
        } => {
            let request = sample_notification(
                to.unwrap_or_else(|| default_to.clone()),
                subject.as_deref().unwrap_or(DEFAULT_TEST_SUBJECT),
                message.as_deref().unwrap_or(DEFAULT_TEST_MESSAGE),
            );
            let outcome = service.send_generic(request).await;
            CommandOutput::Dispatch(DispatchResponse::from_outcome(&outcome, provider))
        }
        Command::TestOemRequest { make } => {
            let details = sample_details(make.as_str());
            let pdf = Bytes::from_static(SAMPLE_PDF);
            let outcome = service
                .send_manufacturer_request(&make, &details, &sample_parts(), pdf)
                .await;
            CommandOutput::Dispatch(DispatchResponse::from_outcome(&outcome, provider))
        }
        Command::TestAltRequest => {
            let outcome = service
                .send_alt_used_request(
                    &sample_details(DEFAULT_TEST_MAKE),
                    &sample_parts(),
                    Bytes::from_static(SAMPLE_PDF),
                )
                .await;
            CommandOutput::Dispatch(DispatchResponse::from_outcome(&outcome, provider))
        }
    }
}

/// テストメールを組み立てる
///
/// HTML 本文は本文をエスケープして埋め込み、テキスト本文は本文そのまま。
fn sample_notification(to: Email, subject: &str, message: &str) -> NotificationRequest {
    NotificationRequest {
        to:          vec![to],
        subject:     subject.to_string(),
        html_body:   format!(
            "<h1>Test Email</h1><p>{}</p>",
            tera::escape_html(message)
        ),
        text_body:   Some(message.to_string()),
        attachments: Vec::new(),
    }
}

fn sample_details(make: &str) -> PriceRequestDetails {
    PriceRequestDetails {
        job_no:        "MPT25-0001".to_string(),
        claim_no:      "TEST-CLAIM-001".to_string(),
        vehicle_make:  make.to_string(),
        vehicle_model: "Corolla".to_string(),
        vehicle_year:  2023,
    }
}

fn sample_parts() -> Vec<PartLine> {
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
