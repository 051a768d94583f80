//! # ユースケース
//!
//! 見積依頼メールのディスパッチとテンプレートレンダリング。

pub mod dispatch;
pub mod template_renderer;

pub use dispatch::DispatchService;
pub use template_renderer::{PriceRequestKind, RenderError, RenderedEmail, TemplateRenderer};
