use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::models::{Conversation, ConversationKind};

/// Sidebar filter state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewFilter {
    pub show_archived: bool,
    pub kind: Option<ConversationKind>,
    pub search: String,
}

impl ViewFilter {
    pub fn matches(&self, conversation: &Conversation) -> bool {
        if conversation.archived && !self.show_archived {
            return false;
        }
        if let Some(kind) = self.kind {
            if conversation.kind != kind {
                return false;
            }
        }
        let term = self.search.trim();
        term.is_empty()
            || conversation
                .title
                .to_lowercase()
                .contains(&term.to_lowercase())
    }
}

/// Pinned first, then most recent activity. Falls back to id so equal keys
/// come out in the same order regardless of input order.
pub fn compare(a: &Conversation, b: &Conversation) -> Ordering {
    b.pinned
        .cmp(&a.pinned)
        .then_with(|| b.activity_at().cmp(&a.activity_at()))
        .then_with(|| a.id.cmp(&b.id))
}

/// Filtered, sorted projection of the registry for display.
pub fn derive_view<'a, I>(conversations: I, filter: &ViewFilter) -> Vec<Conversation>
where
    I: IntoIterator<Item = &'a Conversation>,
{
    let mut view: Vec<Conversation> = conversations
        .into_iter()
        .filter(|c| filter.matches(c))
        .cloned()
        .collect();
    view.sort_by(compare);
    view
}
