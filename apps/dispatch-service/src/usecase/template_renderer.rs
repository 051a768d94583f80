//! # テンプレートレンダラー
//!
//! tera テンプレートエンジンで見積依頼メールを HTML/plaintext 両形式で生成する。
//!
//! ## 設計方針
//!
//! - **`include_str!` によるコンパイル時埋め込み**: テンプレートはバイナリに埋め込まれる
//! - **件名と添付ファイル名にジョブ番号を含める**: サプライヤーが返信時に照合できるようにする

use partsrelay_domain::notification::{PartLine, PriceRequestDetails};
use tera::{Context, Tera};
use thiserror::Error;

/// テンプレートレンダリングエラー
#[derive(Debug, Error)]
#[error("テンプレートレンダリングに失敗: {0}")]
pub struct RenderError(String);

impl From<tera::Error> for RenderError {
    fn from(err: tera::Error) -> Self {
        Self(err.to_string())
    }
}

/// 見積依頼の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceRequestKind {
    /// メーカー純正部品
    Oem,
    /// 代替・中古部品
    AltUsed,
}

impl PriceRequestKind {
    fn template_name(self) -> &'static str {
        match self {
            Self::Oem => "oem_request",
            Self::AltUsed => "alt_used_request",
        }
    }

    /// 件名
    pub fn subject(self, details: &PriceRequestDetails) -> String {
        match self {
            Self::Oem => format!(
                "Parts Price Request - Claim {} - Job {}",
                details.claim_no, details.job_no
            ),
            Self::AltUsed => format!("Alternative/Used Parts Request - Job {}", details.job_no),
        }
    }

    /// 添付 PDF のファイル名
    pub fn attachment_filename(self, details: &PriceRequestDetails) -> String {
        match self {
            Self::Oem => format!("Price_Request_{}.pdf", details.job_no),
            Self::AltUsed => format!("Alt_Parts_Request_{}.pdf", details.job_no),
        }
    }
}

/// レンダリング結果
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub subject:   String,
    pub html_body: String,
    pub text_body: String,
}

/// テンプレートレンダラー
pub struct TemplateRenderer {
    engine:      Tera,
    sender_name: String,
}

impl TemplateRenderer {
    /// 新しいレンダラーインスタンスを作成
    ///
    /// `sender_name` は本文の署名に使う。
    pub fn new(sender_name: impl Into<String>) -> Result<Self, RenderError> {
        let mut engine = Tera::default();

        engine.add_raw_templates(vec![
            (
                "oem_request.html",
                include_str!("../../templates/price_requests/oem_request.html"),
            ),
            (
                "oem_request.txt",
                include_str!("../../templates/price_requests/oem_request.txt"),
            ),
            (
                "alt_used_request.html",
                include_str!("../../templates/price_requests/alt_used_request.html"),
            ),
            (
                "alt_used_request.txt",
                include_str!("../../templates/price_requests/alt_used_request.txt"),
            ),
        ])?;

        Ok(Self {
            engine,
            sender_name: sender_name.into(),
        })
    }

    /// 見積依頼メールを生成する
    pub fn render_price_request(
        &self,
        kind: PriceRequestKind,
        details: &PriceRequestDetails,
        parts: &[PartLine],
    ) -> Result<RenderedEmail, RenderError> {
        let mut context = Context::new();
        context.insert("job_no", &details.job_no);
        context.insert("claim_no", &details.claim_no);
        context.insert("vehicle_make", &details.vehicle_make);
        context.insert("vehicle_model", &details.vehicle_model);
        context.insert("vehicle_year", &details.vehicle_year);
        context.insert("parts", parts);
        context.insert("sender_name", &self.sender_name);

        let template_name = kind.template_name();
        let html_body = self
            .engine
            .render(&format!("{template_name}.html"), &context)?;
        let text_body = self
            .engine
            .render(&format!("{template_name}.txt"), &context)?;

        Ok(RenderedEmail {
            subject: kind.subject(details),
            html_body,
            text_body,
        })
    }
}
