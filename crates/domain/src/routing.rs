//! # 宛先ルーティング
//!
//! 通知の宛先（外部サプライヤーのメールアドレス）を決定するドメインロジック。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 説明 |
//! |---|------------|------|
//! | [`RoutingTable`] | ルーティングテーブル | メーカー名 → 宛先アドレス一覧 |
//! | [`EnvironmentMode`] | 環境モード | 本番 / 非本番。非本番ではテスト宛先に差し替える |
//! | [`RecipientCategory`] | 宛先カテゴリ | OEM / 代替・中古部品 / 顧客 |
//! | [`OverrideRecipients`] | テスト宛先 | 非本番で使うカテゴリ別の固定アドレス |
//! | [`RecipientResolver`] | 宛先リゾルバ | 上記スナップショットから宛先を解決する |
//!
//! ## 設計方針
//!
//! - **純粋関数**: [`resolve`] は入力が同じなら常に同じ順序で同じ結果を返す
//! - **非本番のハードオーバーライド**: 非本番では本番のルーティングデータを一切参照しない
//! - **未登録はエラーではない**: テーブルにないメーカーは空の宛先を返す（未契約メーカー）

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value_objects::{Email, RoutingKey};

/// 環境モード
///
/// プロセス起動時に一度だけ決定され、以後変更されない。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnvironmentMode {
    /// 本番: ルーティングテーブルどおりに送信する
    Production,
    /// 非本番: すべての送信をカテゴリ別のテスト宛先に差し替える
    NonProduction,
}

impl EnvironmentMode {
    /// テストモード（宛先差し替えが有効）かどうか
    pub fn is_test_mode(self) -> bool {
        self == Self::NonProduction
    }
}

/// 宛先カテゴリ
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum RecipientCategory {
    /// メーカー純正部品の見積依頼
    Oem,
    /// 代替・中古部品の見積依頼
    AltUsed,
    /// 顧客向け・汎用メール
    Customer,
}

/// 非本番環境で使うカテゴリ別の固定宛先
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideRecipients {
    pub oem:      Email,
    pub alt_used: Email,
    pub customer: Email,
}

impl OverrideRecipients {
    /// カテゴリに対応するテスト宛先を返す
    pub fn for_category(&self, category: RecipientCategory) -> &Email {
        match category {
            RecipientCategory::Oem => &self.oem,
            RecipientCategory::AltUsed => &self.alt_used,
            RecipientCategory::Customer => &self.customer,
        }
    }
}

/// ルーティングテーブル
///
/// メーカー名から宛先アドレス一覧への対応。順序付きマップで保持するため
/// 走査順は決定的で、各キーのアドレス順は設定どおりに保たれる。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTable {
    routes: BTreeMap<RoutingKey, Vec<Email>>,
}

impl RoutingTable {
    /// 空のテーブルを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// ルートを追加したテーブルを返す（起動時の構築用）
    pub fn with_route(mut self, key: RoutingKey, recipients: Vec<Email>) -> Self {
        self.routes.insert(key, recipients);
        self
    }

    /// キーに対応する宛先を返す。未登録の場合は空スライス
    pub fn lookup(&self, key: &RoutingKey) -> &[Email] {
        self.routes.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl FromIterator<(RoutingKey, Vec<Email>)> for RoutingTable {
    fn from_iter<I: IntoIterator<Item = (RoutingKey, Vec<Email>)>>(iter: I) -> Self {
        Self {
            routes: iter.into_iter().collect(),
        }
    }
}

/// 宛先解決の対象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingTarget<'a> {
    /// メーカー別ルーティング（OEM カテゴリ）
    Manufacturer(&'a RoutingKey),
    /// 代替・中古部品サプライヤーへの一斉送信
    AltUsed,
    /// 呼び出し元が指定した宛先（顧客カテゴリ）
    Customer(&'a [Email]),
}

impl RoutingTarget<'_> {
    /// 対象の宛先カテゴリ
    pub fn category(&self) -> RecipientCategory {
        match self {
            Self::Manufacturer(_) => RecipientCategory::Oem,
            Self::AltUsed => RecipientCategory::AltUsed,
            Self::Customer(_) => RecipientCategory::Customer,
        }
    }

    /// ログ用のルーティングキー表現
    pub fn routing_key(&self) -> &str {
        match self {
            Self::Manufacturer(key) => key.as_str(),
            Self::AltUsed => "alternative-parts",
            Self::Customer(_) => "generic",
        }
    }
}

/// 宛先を解決する
///
/// - 非本番: テーブルも呼び出し元の宛先も無視し、カテゴリのテスト宛先 1 件のみを返す
/// - 本番 + メーカー: テーブルを引き、未登録なら空
/// - 本番 + 代替・中古: キーに関係なく一斉送信リストを設定順で返す
/// - 本番 + 顧客: 呼び出し元の宛先をそのまま返す
pub fn resolve(
    target: &RoutingTarget<'_>,
    table: &RoutingTable,
    alt_used_broadcast: &[Email],
    mode: EnvironmentMode,
    overrides: &OverrideRecipients,
) -> Vec<Email> {
    if mode.is_test_mode() {
        return vec![overrides.for_category(target.category()).clone()];
    }

    match target {
        RoutingTarget::Manufacturer(key) => table.lookup(key).to_vec(),
        RoutingTarget::AltUsed => alt_used_broadcast.to_vec(),
        RoutingTarget::Customer(requested) => requested.to_vec(),
    }
}

/// 宛先リゾルバ
///
/// 起動時に構築される不変スナップショット。
/// 並行呼び出しで共有しても状態は変化しない。
#[derive(Debug, Clone)]
pub struct RecipientResolver {
    table:              RoutingTable,
    alt_used_broadcast: Vec<Email>,
    overrides:          OverrideRecipients,
    mode:               EnvironmentMode,
}

impl RecipientResolver {
    pub fn new(
        table: RoutingTable,
        alt_used_broadcast: Vec<Email>,
        overrides: OverrideRecipients,
        mode: EnvironmentMode,
    ) -> Self {
        Self {
            table,
            alt_used_broadcast,
            overrides,
            mode,
        }
    }

    /// 対象の宛先を解決する
    pub fn resolve(&self, target: &RoutingTarget<'_>) -> Vec<Email> {
        resolve(
            target,
            &self.table,
            &self.alt_used_broadcast,
            self.mode,
            &self.overrides,
        )
    }

    pub fn mode(&self) -> EnvironmentMode {
        self.mode
    }
}
