//! JobQueue port - 配送キュー
//!
//! JobQueue は `{tenantId, candidateId, attempt}` のみを流します
//! （状態は CandidateStore が正本）。
//!
//! # 設計原則
//! - at-least-once 配送: 同じメッセージが複数回届いてもよい
//!   （ハーネス側がロック + 永続状態で冪等にする）
//! - 受信側は `SignedDelivery` を受け取り、署名検証してから body を信用する
//! - `enqueue` が `None` を返したらキュー未設定。呼び出し側はインライン実行に切り替える

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{JobMessage, MessageId, SignedDelivery};
use crate::error::QueueError;

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Publish a job, visible after `delay`.
    ///
    /// `Ok(None)` means no queue is configured.
    async fn enqueue(&self, job: &JobMessage, delay: Duration)
    -> Result<Option<MessageId>, QueueError>;

    /// Wait up to `timeout` for the next visible delivery.
    async fn receive(&self, timeout: Duration) -> Result<Option<SignedDelivery>, QueueError>;

    /// Confirm a delivery so it is not redelivered.
    async fn ack(&self, message_id: &MessageId) -> Result<(), QueueError>;
}
