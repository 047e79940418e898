//! RecordingNotifier - 送信内容を記録するだけの通知チャネル（テスト・デモ用）

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::domain::OwnerTarget;
use crate::ports::{NotificationChannel, SendResult};

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub target: OwnerTarget,
    pub text: String,
    pub blocks: Vec<serde_json::Value>,
    pub ts: String,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMessage>>,
    seq: AtomicU64,
    failures: AtomicU32,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Make the next `n` sends report `ok: false`.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationChannel for RecordingNotifier {
    async fn send(
        &self,
        target: &OwnerTarget,
        message: &str,
        blocks: &[serde_json::Value],
    ) -> SendResult {
        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return SendResult::failed("channel_not_found");
        }

        let ts = format!("{}.{:06}", chrono::Utc::now().timestamp(), self.seq.fetch_add(1, Ordering::SeqCst));
        let Ok(mut sent) = self.sent.lock() else {
            return SendResult::failed("recorder poisoned");
        };
        sent.push(SentMessage {
            target: target.clone(),
            text: message.to_string(),
            blocks: blocks.to_vec(),
            ts: ts.clone(),
        });
        SendResult::sent(ts)
    }
}
