use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{RegistryError, Result};
use crate::models::{Conversation, ConversationKind, ConversationPatch, Message, Role};
use crate::services::conversation::truncate_title;
use crate::services::export::export_to_markdown;
use crate::services::{
    derive_view, AppSettings, CannedReplySource, Registry, ReplyEvent, ReplyScheduler,
    ReplySource, ViewFilter,
};

/// Application state container. Owned by the application root; all state
/// changes go through [`App::update`] and [`App::handle_cmd`].
pub struct App {
    registry: Registry,
    filter: ViewFilter,
    replies: ReplyScheduler,
    settings: AppSettings,
    active_conversation: Option<String>,
    last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppMsg {
    NewChat {
        title: Option<String>,
        kind: ConversationKind,
    },
    SelectConversation(String),
    RenameConversation(String, String), // id, new_title
    TogglePin(String),
    ToggleArchive(String),
    DeleteConversation(String),
    /// Schedules the assistant reply on the current tokio runtime; outside a
    /// runtime the message is rejected with an inline error.
    SendMessage(String, String), // id, content
    SetSearch(String),
    SetKindFilter(Option<ConversationKind>),
    SetShowArchived(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppCmd {
    AssistantReply(ReplyEvent),
}

impl From<ReplyEvent> for AppCmd {
    fn from(event: ReplyEvent) -> Self {
        AppCmd::AssistantReply(event)
    }
}

impl App {
    pub fn new(settings: AppSettings) -> (Self, mpsc::Receiver<ReplyEvent>) {
        let source = Arc::new(CannedReplySource::new(settings.reply_template.clone()));
        Self::with_source(settings, source)
    }

    pub fn with_source(
        settings: AppSettings,
        source: Arc<dyn ReplySource>,
    ) -> (Self, mpsc::Receiver<ReplyEvent>) {
        let (replies, rx) =
            ReplyScheduler::new(source, Duration::from_millis(settings.reply_delay_ms));
        let filter = ViewFilter {
            show_archived: settings.show_archived,
            ..Default::default()
        };
        let app = Self {
            registry: Registry::new(),
            filter,
            replies,
            settings,
            active_conversation: None,
            last_error: None,
        };
        (app, rx)
    }

    /// Apply a UI event. Failures are surfaced through [`App::last_error`].
    pub fn update(&mut self, msg: AppMsg) {
        match self.try_update(msg) {
            Ok(()) => self.last_error = None,
            Err(e) => {
                tracing::warn!("{}", e);
                self.last_error = Some(e.to_string());
            }
        }
    }

    fn try_update(&mut self, msg: AppMsg) -> Result<()> {
        match msg {
            AppMsg::NewChat { title, kind } => {
                let title = title.unwrap_or_else(|| self.settings.default_title.clone());
                let conv = Conversation::new(Uuid::new_v4().to_string(), title, kind);
                let id = conv.id.clone();
                self.registry.create(conv)?;
                self.active_conversation = Some(id);
            }
            AppMsg::SelectConversation(id) => {
                if !self.registry.contains(&id) {
                    return Err(RegistryError::NotFound(id));
                }
                self.active_conversation = Some(id);
            }
            AppMsg::RenameConversation(id, title) => {
                self.registry
                    .update(&id, ConversationPatch::title(title.trim()))?;
            }
            AppMsg::TogglePin(id) => {
                let pinned = self.require(&id)?.pinned;
                self.registry.update(&id, ConversationPatch::pinned(!pinned))?;
            }
            AppMsg::ToggleArchive(id) => {
                let archived = self.require(&id)?.archived;
                self.registry
                    .update(&id, ConversationPatch::archived(!archived))?;
            }
            AppMsg::DeleteConversation(id) => {
                self.registry.delete(&id)?;
                let cancelled = self.replies.cancel(&id);
                if cancelled > 0 {
                    tracing::debug!(
                        "Cancelled {} pending replies for deleted conversation {}",
                        cancelled,
                        id
                    );
                }
                if self.active_conversation.as_deref() == Some(id.as_str()) {
                    self.active_conversation = None;
                }
            }
            AppMsg::SendMessage(id, content) => {
                let retitle = {
                    let conv = self.require(&id)?;
                    conv.message_ids.is_empty() && conv.title == self.settings.default_title
                };
                let handle =
                    Handle::try_current().map_err(|e| RegistryError::NoRuntime(e.to_string()))?;
                self.registry
                    .append_message(Message::new(id.clone(), Role::User, content.clone()))?;
                if retitle {
                    let title = truncate_title(&content);
                    if !title.is_empty() {
                        self.registry.update(&id, ConversationPatch::title(title))?;
                    }
                }
                self.replies.schedule(&handle, &id, content);
            }
            AppMsg::SetSearch(term) => self.filter.search = term,
            AppMsg::SetKindFilter(kind) => self.filter.kind = kind,
            AppMsg::SetShowArchived(show) => self.filter.show_archived = show,
        }
        Ok(())
    }

    pub fn handle_cmd(&mut self, cmd: AppCmd) {
        match cmd {
            AppCmd::AssistantReply(event) => {
                self.replies.complete(&event.conversation_id, event.ticket);
                if !self.registry.contains(&event.conversation_id) {
                    tracing::debug!(
                        "Dropping reply for deleted conversation {}",
                        event.conversation_id
                    );
                    return;
                }
                let message = Message::new(event.conversation_id, Role::Assistant, event.content);
                if let Err(e) = self.registry.append_message(message) {
                    tracing::warn!("Failed to store assistant reply: {}", e);
                    self.last_error = Some(e.to_string());
                }
            }
        }
    }

    fn require(&self, id: &str) -> Result<&Conversation> {
        self.registry
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// The sidebar list for the current filter.
    pub fn view(&self) -> Vec<Conversation> {
        derive_view(self.registry.list(), &self.filter)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn filter(&self) -> &ViewFilter {
        &self.filter
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active_conversation
            .as_deref()
            .and_then(|id| self.registry.get(id))
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_reply_pending(&self, id: &str) -> bool {
        self.replies.is_pending(id)
    }

    pub fn pending_replies(&self, id: &str) -> usize {
        self.replies.pending_count(id)
    }

    pub fn export(&self, id: &str) -> Result<String> {
        let conv = self.require(id)?;
        let messages = self.registry.messages(id)?;
        Ok(export_to_markdown(conv, &messages))
    }

    pub async fn shutdown(&mut self) {
        self.replies.shutdown().await;
    }
}
