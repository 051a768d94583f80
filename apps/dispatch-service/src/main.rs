//! # PartsRelay Dispatch
//!
//! 見積依頼メールの送信バックエンドを確認・試験するコマンドラインツール。
//!
//! ## 環境変数
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `APP_ENV` | No | `production` のときだけ本番の宛先に送信する |
//! | `EMAIL_PROVIDER` | No | `mailhog`（デフォルト）/ `smtp` / `resend` / `noop` |
//! | `SMTP_HOST` / `SMTP_PORT` | No | SMTP リレー（デフォルト: `localhost:1025`） |
//! | `SMTP_USER` / `SMTP_PASSWORD` | No | `smtp` で `SMTP_USER` を指定すると認証付きリレー（パスワード必須）。未指定なら認証なし |
//! | `HOSTED_API_KEY` | `resend` 時 | ホスト型 API の Bearer トークン |
//! | `ROUTING_TABLE_PATH` | No | ルーティングテーブル JSON（デフォルト: 組み込み） |
//!
//! ## 起動方法
//!
//! ```bash
//! # 疎通確認
//! cargo run -p partsrelay-dispatch-service -- verify
//!
//! # メーカー見積依頼のテスト送信（非本番ではテスト宛先に届く）
//! cargo run -p partsrelay-dispatch-service -- test-oem-request Toyota
//! ```

use std::process::ExitCode;

use anyhow::Context as _;
use tracing::Instrument as _;
use partsrelay_dispatch_service::{
    cli::{self, Command},
    config::DispatchConfig,
    usecase::{DispatchService, TemplateRenderer},
};
use partsrelay_domain::routing::RecipientResolver;
use partsrelay_infra::build_transport;
use partsrelay_shared::observability::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    let root_span = init_tracing(&TracingConfig::from_env("dispatch-service"));

    run().instrument(root_span).await
}

async fn run() -> anyhow::Result<ExitCode> {
    let command = Command::parse(std::env::args().skip(1))?;
    let config = DispatchConfig::from_env().context("設定の読み込みに失敗しました")?;

    tracing::info!(
        mode = %config.mode,
        backend = %config.transport.backend(),
        manufacturers = config.routing.manufacturers.len(),
        "Dispatch Service を起動します"
    );

    let transport = build_transport(&config.transport, config.send_timeout)
        .context("メール送信トランスポートの初期化に失敗しました")?;

    let resolver = RecipientResolver::new(
        config.routing.manufacturers,
        config.routing.alt_used_broadcast,
        config.overrides.clone(),
        config.mode,
    );
    let renderer = TemplateRenderer::new(config.sender.name.clone())
        .context("メールテンプレートの読み込みに失敗しました")?;
    let service = DispatchService::new(
        resolver,
        transport,
        renderer,
        config.sender,
        config.send_timeout,
    );

    let output = cli::run(command, &service, &config.overrides.customer).await;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(if output.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
