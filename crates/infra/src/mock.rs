//! # テスト用モックトランスポート
//!
//! ディスパッチのテストで使用する、呼び出しを記録するトランスポート。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! partsrelay-infra = { workspace = true, features = ["test-utils"] }
//! ```

use std::{
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use partsrelay_domain::notification::{EmailEnvelope, ProviderMessageId, TransportError};

use crate::transport::{TransportBackend, TransportProvider};

/// 呼び出しを記録するモックトランスポート
///
/// `Clone` は記録を共有する。テストではクローンをサービスに渡し、
/// 元のインスタンスで送信内容と呼び出し回数を検証する。
#[derive(Clone)]
pub struct MockTransportProvider {
    sent:         Arc<Mutex<Vec<EmailEnvelope>>>,
    send_calls:   Arc<AtomicUsize>,
    verify_calls: Arc<AtomicUsize>,
    send_error:   Option<TransportError>,
    verify_error: Option<TransportError>,
    delay:        Option<Duration>,
}

impl Default for MockTransportProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransportProvider {
    /// 常に成功するモックを作成する
    pub fn new() -> Self {
        Self {
            sent:         Arc::new(Mutex::new(Vec::new())),
            send_calls:   Arc::new(AtomicUsize::new(0)),
            verify_calls: Arc::new(AtomicUsize::new(0)),
            send_error:   None,
            verify_error: None,
            delay:        None,
        }
    }

    /// `send` が常に指定エラーで失敗するモックを作成する
    pub fn failing(error: TransportError) -> Self {
        Self {
            send_error: Some(error),
            ..Self::new()
        }
    }

    /// `verify` が指定エラーで失敗するようにする
    pub fn with_verify_error(mut self, error: TransportError) -> Self {
        self.verify_error = Some(error);
        self
    }

    /// `send` / `verify` の応答を遅延させる
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 送信に成功したエンベロープ
    pub fn sent_envelopes(&self) -> Vec<EmailEnvelope> {
        self.sent.lock().unwrap().clone()
    }

    /// `send` の呼び出し回数（失敗を含む）
    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    /// `verify` の呼び出し回数
    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportProvider for MockTransportProvider {
    fn backend(&self) -> TransportBackend {
        TransportBackend::Noop
    }

    async fn verify(&self) -> Result<(), TransportError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.verify_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn send(&self, envelope: &EmailEnvelope) -> Result<ProviderMessageId, TransportError> {
        let call = self.send_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.send_error {
            return Err(error.clone());
        }

        self.sent.lock().unwrap().push(envelope.clone());
        Ok(ProviderMessageId::new(format!("mock-{call}")))
    }
}
