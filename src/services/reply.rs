use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Produces the assistant's side of a conversation.
#[async_trait]
pub trait ReplySource: Send + Sync {
    async fn reply(&self, prompt: &str) -> String;
}

/// Fills a fixed template with the user's prompt.
pub struct CannedReplySource {
    template: String,
}

impl CannedReplySource {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

#[async_trait]
impl ReplySource for CannedReplySource {
    async fn reply(&self, prompt: &str) -> String {
        self.template.replace("{prompt}", prompt)
    }
}

/// A reply that finished its delay without being cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEvent {
    pub conversation_id: String,
    pub ticket: u64,
    pub content: String,
}

struct PendingReply {
    ticket: u64,
    token: CancellationToken,
}

/// Runs one deferred reply per user message. Several replies may be pending
/// for the same conversation; deleting the conversation must cancel them all.
pub struct ReplyScheduler {
    source: Arc<dyn ReplySource>,
    delay: Duration,
    tx: mpsc::Sender<ReplyEvent>,
    pending: HashMap<String, Vec<PendingReply>>,
    tracker: TaskTracker,
    next_ticket: u64,
}

impl ReplyScheduler {
    pub fn new(
        source: Arc<dyn ReplySource>,
        delay: Duration,
    ) -> (Self, mpsc::Receiver<ReplyEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let scheduler = Self {
            source,
            delay,
            tx,
            pending: HashMap::new(),
            tracker: TaskTracker::new(),
            next_ticket: 0,
        };
        (scheduler, rx)
    }

    /// Spawn the reply task on `handle`. Returns the ticket carried by its event.
    pub fn schedule(&mut self, handle: &Handle, conversation_id: &str, prompt: String) -> u64 {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let token = CancellationToken::new();

        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        let delay = self.delay;
        let cancel = token.clone();
        let conv_id = conversation_id.to_string();

        let task = async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Reply {} for {} cancelled", ticket, conv_id);
                }
                _ = tokio::time::sleep(delay) => {
                    let content = source.reply(&prompt).await;
                    if cancel.is_cancelled() {
                        return;
                    }
                    let event = ReplyEvent {
                        conversation_id: conv_id,
                        ticket,
                        content,
                    };
                    if tx.send(event).await.is_err() {
                        tracing::debug!("Reply receiver dropped, discarding reply {}", ticket);
                    }
                }
            }
        };
        self.tracker.spawn_on(task, handle);

        self.pending
            .entry(conversation_id.to_string())
            .or_default()
            .push(PendingReply { ticket, token });
        ticket
    }

    /// Cancel every pending reply for a conversation. Returns how many were pending.
    pub fn cancel(&mut self, conversation_id: &str) -> usize {
        let pending = self.pending.remove(conversation_id).unwrap_or_default();
        for reply in &pending {
            reply.token.cancel();
        }
        pending.len()
    }

    /// Forget a delivered reply. Other replies for the conversation stay pending.
    pub fn complete(&mut self, conversation_id: &str, ticket: u64) {
        if let Some(pending) = self.pending.get_mut(conversation_id) {
            pending.retain(|p| p.ticket != ticket);
            if pending.is_empty() {
                self.pending.remove(conversation_id);
            }
        }
    }

    pub fn is_pending(&self, conversation_id: &str) -> bool {
        self.pending_count(conversation_id) > 0
    }

    pub fn pending_count(&self, conversation_id: &str) -> usize {
        self.pending.get(conversation_id).map_or(0, Vec::len)
    }

    pub fn cancel_all(&mut self) {
        for reply in self.pending.drain().flat_map(|(_, pending)| pending) {
            reply.token.cancel();
        }
    }

    /// Cancel everything and wait for the spawned tasks to exit.
    pub async fn shutdown(&mut self) {
        self.cancel_all();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Drop for ReplyScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
