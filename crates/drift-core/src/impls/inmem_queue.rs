//! InMemoryJobQueue - 開発用の配送キュー
//!
//! # 学習ポイント
//! - tokio Mutex + Notify による待機付き receive
//! - BinaryHeap（min-heap）で遅延配送
//! - 可視性タイムアウト: ack されなかったメッセージは再配送される（at-least-once）
//!
//! enqueue 時に JobSigner で署名し、受信側は `SignedDelivery` をそのまま受け取る。

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use ulid::Ulid;

use super::signing::JobSigner;
use crate::domain::{JobMessage, MessageId, SignedDelivery};
use crate::error::QueueError;
use crate::ports::JobQueue;

/// Delayed or in-flight entry waiting for its time.
///
/// Reverse ordering so BinaryHeap acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct Timed {
    at: Instant,
    message_id: MessageId,
}

impl PartialOrd for Timed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timed {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.message_id.as_str().cmp(self.message_id.as_str()))
    }
}

#[derive(Default)]
struct QueueState {
    /// Every unacked message.
    messages: HashMap<MessageId, SignedDelivery>,
    ready: VecDeque<MessageId>,
    scheduled: BinaryHeap<Timed>,
    /// Delivered but not acked, with redelivery deadline.
    in_flight: HashMap<MessageId, Instant>,
}

impl QueueState {
    fn promote(&mut self, now: Instant) {
        while let Some(entry) = self.scheduled.peek() {
            if entry.at > now {
                break;
            }
            if let Some(entry) = self.scheduled.pop() {
                self.ready.push_back(entry.message_id);
            }
        }

        let expired: Vec<MessageId> = self
            .in_flight
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.in_flight.remove(&id);
            self.ready.push_back(id);
        }
    }

    fn next_wake(&self) -> Option<Instant> {
        let scheduled = self.scheduled.peek().map(|e| e.at);
        let in_flight = self.in_flight.values().min().copied();
        match (scheduled, in_flight) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

pub struct InMemoryJobQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    signer: JobSigner,
    visibility_timeout: Duration,
}

impl InMemoryJobQueue {
    pub fn new(signer: JobSigner) -> Self {
        Self::with_visibility_timeout(signer, Duration::from_secs(60))
    }

    pub fn with_visibility_timeout(signer: JobSigner, visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            signer,
            visibility_timeout,
        }
    }

    /// Messages not yet acked (ready, delayed or in flight).
    pub async fn pending(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    /// Put an already-signed delivery on the queue as-is.
    pub async fn push_raw(&self, delivery: SignedDelivery) {
        let mut state = self.state.lock().await;
        state.ready.push_back(delivery.message_id.clone());
        state.messages.insert(delivery.message_id.clone(), delivery);
        drop(state);
        self.notify.notify_one();
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(
        &self,
        job: &JobMessage,
        delay: Duration,
    ) -> Result<Option<MessageId>, QueueError> {
        let body = job
            .to_json()
            .map_err(|e| QueueError::Malformed(e.to_string()))?;
        let signature = self.signer.sign(&body)?;
        let message_id = MessageId::new(Ulid::new().to_string());

        let mut state = self.state.lock().await;
        state.messages.insert(
            message_id.clone(),
            SignedDelivery {
                message_id: message_id.clone(),
                body,
                signature,
            },
        );
        if delay.is_zero() {
            state.ready.push_back(message_id.clone());
        } else {
            state.scheduled.push(Timed {
                at: Instant::now() + delay,
                message_id: message_id.clone(),
            });
        }
        drop(state);
        self.notify.notify_one();

        Ok(Some(message_id))
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<SignedDelivery>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            let wake = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.promote(now);

                while let Some(id) = state.ready.pop_front() {
                    // acked while waiting in ready
                    let Some(delivery) = state.messages.get(&id).cloned() else {
                        continue;
                    };
                    state.in_flight.insert(id, now + self.visibility_timeout);
                    return Ok(Some(delivery));
                }

                if now >= deadline {
                    return Ok(None);
                }
                state.next_wake().map_or(deadline, |w| w.min(deadline))
            };

            tokio::select! {
                _ = self.notify.notified() => {},
                _ = tokio::time::sleep_until(wake) => {},
            }
        }
    }

    async fn ack(&self, message_id: &MessageId) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state.in_flight.remove(message_id);
        state.messages.remove(message_id);
        Ok(())
    }
}

/// Stand-in when no broker is configured: enqueue reports `None` so callers
/// run follow-ups inline.
#[derive(Debug, Default)]
pub struct UnconfiguredQueue;

#[async_trait]
impl JobQueue for UnconfiguredQueue {
    async fn enqueue(
        &self,
        _job: &JobMessage,
        _delay: Duration,
    ) -> Result<Option<MessageId>, QueueError> {
        Ok(None)
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<SignedDelivery>, QueueError> {
        tokio::time::sleep(timeout).await;
        Ok(None)
    }

    async fn ack(&self, _message_id: &MessageId) -> Result<(), QueueError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CandidateId, TenantId};

    fn job() -> JobMessage {
        JobMessage::new(TenantId::new("t1"), CandidateId::from_ulid(Ulid::new()), 1)
    }

    fn queue() -> InMemoryJobQueue {
        InMemoryJobQueue::new(JobSigner::new("secret"))
    }

    #[tokio::test]
    async fn enqueue_receive_ack() {
        let queue = queue();
        let job = job();

        let id = queue.enqueue(&job, Duration::ZERO).await.unwrap().unwrap();
        let delivery = queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();

        assert_eq!(delivery.message_id, id);
        assert_eq!(JobSigner::new("secret").verify(&delivery).unwrap(), job);

        queue.ack(&id).await.unwrap();
        assert_eq!(queue.pending().await, 0);
    }

    #[tokio::test]
    async fn receive_times_out_when_empty() {
        let queue = queue();
        let got = queue.receive(Duration::from_millis(50)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_messages_wait_their_turn() {
        let queue = queue();
        queue.enqueue(&job(), Duration::from_secs(10)).await.unwrap();

        assert!(queue.receive(Duration::from_secs(5)).await.unwrap().is_none());
        assert!(queue.receive(Duration::from_secs(10)).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn unacked_messages_are_redelivered() {
        let queue = InMemoryJobQueue::with_visibility_timeout(
            JobSigner::new("secret"),
            Duration::from_secs(30),
        );
        let id = queue.enqueue(&job(), Duration::ZERO).await.unwrap().unwrap();

        let first = queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        assert!(queue.receive(Duration::from_secs(1)).await.unwrap().is_none());

        let again = queue.receive(Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(first.message_id, id);
        assert_eq!(again.message_id, id);
    }

    #[tokio::test]
    async fn enqueue_wakes_waiting_receiver() {
        let queue = std::sync::Arc::new(queue());
        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.receive(Duration::from_secs(5)).await.unwrap() }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.enqueue(&job(), Duration::ZERO).await.unwrap();

        assert!(waiter.await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unconfigured_queue_reports_none() {
        let got = UnconfiguredQueue.enqueue(&job(), Duration::ZERO).await.unwrap();
        assert!(got.is_none());
    }
}
