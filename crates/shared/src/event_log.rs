//! # ビジネスイベントログの構造化ヘルパー
//!
//! `jq` で効率的に調査できるよう、ログフィールドの命名規約とヘルパーマクロを提供する。
//!
//! ## ビジネスイベント
//!
//! [`log_business_event!`] マクロで出力する。`event.kind = "business_event"` マーカーが
//! 自動付与され、`jq 'select(.["event.kind"] == "business_event")'` でフィルタできる。
//!
//! ## フィールド命名規約
//!
//! ドット記法（`event.category`、`notification.routing_key`）を使用。tracing の
//! `$($field:ident).+` パターンでサポートされ、JSON 出力でフラットなキーになる。
//! 認証情報（SMTP パスワード、API キー）はフィールドに含めない。

/// ビジネスイベントを構造化ログとして出力する。
///
/// `event.kind = "business_event"` マーカーを自動付与し、
/// `tracing::info!` レベルで出力する。
///
/// ## 必須フィールド（慣例）
///
/// - `event.category`: イベントカテゴリ（[`event::category`] の定数を使用）
/// - `event.action`: アクション名（[`event::action`] の定数を使用）
/// - `event.result`: 結果（[`event::result`] の定数を使用）
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

/// イベントフィールドの定数
pub mod event {
    /// イベントカテゴリ
    pub mod category {
        pub const NOTIFICATION: &str = "notification";
        pub const TRANSPORT: &str = "transport";
    }

    /// イベントアクション
    pub mod action {
        // 見積依頼メール
        pub const PRICE_REQUEST_SENT: &str = "price_request.sent";
        pub const PRICE_REQUEST_FAILED: &str = "price_request.failed";

        // 汎用メール
        pub const EMAIL_SENT: &str = "email.sent";
        pub const EMAIL_FAILED: &str = "email.failed";

        // トランスポート
        pub const TRANSPORT_VERIFIED: &str = "transport.verified";
        pub const TRANSPORT_VERIFY_FAILED: &str = "transport.verify_failed";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
    }
}

/// エラーコンテキストフィールドの定数
pub mod error {
    /// エラーカテゴリ
    pub mod category {
        /// 宛先解決
        pub const ROUTING: &str = "routing";
        /// 外部サービス呼び出し（SMTP リレー、ホスト型 API）
        pub const EXTERNAL_SERVICE: &str = "external_service";
    }
}
