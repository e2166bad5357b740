use std::collections::{HashMap, HashSet};

use chrono::Utc;

use crate::error::{RegistryError, Result};
use crate::models::{Conversation, ConversationPatch, Message};

/// In-memory store of conversations and the messages they reference.
///
/// The registry is owned by the application root and lives for the session.
/// Every mutation either fully applies or leaves the collection untouched.
#[derive(Debug, Default)]
pub struct Registry {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Message>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, mut conversation: Conversation) -> Result<()> {
        if self.conversations.contains_key(&conversation.id) {
            return Err(RegistryError::DuplicateId(conversation.id));
        }
        validate_title(&conversation.title)?;

        if let Some(dup) = first_duplicate(&conversation.message_ids) {
            return Err(RegistryError::Validation(format!(
                "message {} listed twice in conversation {}",
                dup, conversation.id
            )));
        }

        if conversation.updated_at < conversation.created_at {
            conversation.updated_at = conversation.created_at;
        }

        tracing::debug!("Created conversation {}", conversation.id);
        self.conversations.insert(conversation.id.clone(), conversation);
        Ok(())
    }

    pub fn update(&mut self, id: &str, patch: ConversationPatch) -> Result<&Conversation> {
        let conversation = self
            .conversations
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }

        if let Some(title) = patch.title {
            conversation.title = title;
        }
        if let Some(kind) = patch.kind {
            conversation.kind = kind;
        }
        if let Some(pinned) = patch.pinned {
            conversation.pinned = pinned;
        }
        if let Some(archived) = patch.archived {
            conversation.archived = archived;
        }
        touch(conversation);

        Ok(conversation)
    }

    /// Remove a conversation and all of its messages. Deleting twice fails.
    pub fn delete(&mut self, id: &str) -> Result<Conversation> {
        let conversation = self
            .conversations
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        for message_id in &conversation.message_ids {
            self.messages.remove(message_id);
        }
        tracing::debug!(
            "Deleted conversation {} ({} messages)",
            id,
            conversation.message_ids.len()
        );
        Ok(conversation)
    }

    /// All conversations, in no particular order.
    pub fn list(&self) -> Vec<&Conversation> {
        self.conversations.values().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.conversations.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn append_message(&mut self, message: Message) -> Result<&Conversation> {
        if message.content.trim().is_empty() {
            return Err(RegistryError::Validation("message content is empty".into()));
        }
        if self.messages.contains_key(&message.id) {
            return Err(RegistryError::DuplicateId(message.id));
        }
        let conversation = self
            .conversations
            .get_mut(&message.conversation_id)
            .ok_or_else(|| RegistryError::NotFound(message.conversation_id.clone()))?;

        conversation.message_ids.push(message.id.clone());
        touch(conversation);
        conversation.last_message_at = Some(conversation.updated_at.max(message.created_at));

        self.messages.insert(message.id.clone(), message);
        Ok(conversation)
    }

    /// Messages of a conversation in append order.
    pub fn messages(&self, id: &str) -> Result<Vec<&Message>> {
        let conversation = self
            .conversations
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        Ok(conversation
            .message_ids
            .iter()
            .filter_map(|mid| self.messages.get(mid))
            .collect())
    }
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(RegistryError::Validation("title must not be empty".into()));
    }
    Ok(())
}

fn first_duplicate(ids: &[String]) -> Option<&String> {
    let mut seen = HashSet::new();
    ids.iter().find(|id| !seen.insert(id.as_str()))
}

fn touch(conversation: &mut Conversation) {
    conversation.updated_at = Utc::now().max(conversation.created_at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationKind, Role};

    fn conv(id: &str) -> Conversation {
        Conversation::new(id, format!("Chat {}", id), ConversationKind::General)
    }

    #[test]
    fn test_create_and_list() {
        let mut registry = Registry::new();
        registry.create(conv("a")).unwrap();
        registry.create(conv("b")).unwrap();

        let ids: HashSet<_> = registry.list().iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("a"));
        assert!(ids.contains("b"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = Registry::new();
        registry.create(conv("a")).unwrap();

        let mut other = conv("a");
        other.title = "Different".to_string();
        let err = registry.create(other).unwrap_err();

        assert_eq!(err, RegistryError::DuplicateId("a".to_string()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().title, "Chat a");
    }

    #[test]
    fn test_create_rejects_blank_title_and_duplicate_messages() {
        let mut registry = Registry::new();

        let blank = Conversation::new("x", "   ", ConversationKind::Topic);
        assert!(matches!(
            registry.create(blank),
            Err(RegistryError::Validation(_))
        ));

        let mut dupes = conv("y");
        dupes.message_ids = vec!["m1".into(), "m2".into(), "m1".into()];
        assert!(matches!(
            registry.create(dupes),
            Err(RegistryError::Validation(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_create_clamps_updated_at() {
        let mut registry = Registry::new();
        let mut c = conv("a");
        c.updated_at = c.created_at - chrono::Duration::hours(1);
        registry.create(c).unwrap();

        let stored = registry.get("a").unwrap();
        assert!(stored.updated_at >= stored.created_at);
    }

    #[test]
    fn test_update_merges_patch() {
        let mut registry = Registry::new();
        let mut c = conv("a");
        c.created_at = Utc::now() - chrono::Duration::days(1);
        c.updated_at = c.created_at;
        registry.create(c).unwrap();

        let before = registry.get("a").unwrap().updated_at;
        let patch = ConversationPatch {
            title: Some("Renamed".into()),
            pinned: Some(true),
            ..Default::default()
        };
        let updated = registry.update("a", patch).unwrap();

        assert_eq!(updated.title, "Renamed");
        assert!(updated.pinned);
        assert!(!updated.archived);
        assert_eq!(updated.kind, ConversationKind::General);
        assert!(updated.updated_at > before);
    }

    #[test]
    fn test_update_missing_leaves_collection_unchanged() {
        let mut registry = Registry::new();
        registry.create(conv("a")).unwrap();
        let snapshot = registry.get("a").unwrap().clone();

        let err = registry
            .update("missing-id", ConversationPatch::pinned(true))
            .unwrap_err();

        assert_eq!(err, RegistryError::NotFound("missing-id".to_string()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap(), &snapshot);
    }

    #[test]
    fn test_update_missing_reports_not_found_before_validation() {
        let mut registry = Registry::new();
        registry.create(conv("a")).unwrap();

        let err = registry
            .update("missing-id", ConversationPatch::title(""))
            .unwrap_err();

        assert_eq!(err, RegistryError::NotFound("missing-id".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_update_rejects_blank_title() {
        let mut registry = Registry::new();
        registry.create(conv("a")).unwrap();
        let snapshot = registry.get("a").unwrap().clone();

        let err = registry.update("a", ConversationPatch::title("")).unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
        assert_eq!(registry.get("a").unwrap(), &snapshot);
    }

    #[test]
    fn test_delete_twice_fails() {
        let mut registry = Registry::new();
        registry.create(conv("a")).unwrap();

        registry.delete("a").unwrap();
        assert!(registry.list().iter().all(|c| c.id != "a"));
        assert_eq!(
            registry.delete("a").unwrap_err(),
            RegistryError::NotFound("a".to_string())
        );
    }

    #[test]
    fn test_ids_stay_unique_across_create_delete() {
        let mut registry = Registry::new();
        for round in 0..3 {
            for id in ["a", "b", "c"] {
                let _ = registry.create(conv(id));
            }
            if round % 2 == 0 {
                registry.delete("b").unwrap();
            }
            let _ = registry.create(conv("a"));

            let mut ids: Vec<_> = registry.list().iter().map(|c| c.id.clone()).collect();
            let total = ids.len();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), total);
        }
    }

    #[test]
    fn test_append_message_updates_timestamps() {
        let mut registry = Registry::new();
        registry.create(conv("a")).unwrap();

        let msg = Message::new("a", Role::User, "Hello!");
        let msg_id = msg.id.clone();
        let updated = registry.append_message(msg).unwrap();

        assert_eq!(updated.message_ids, vec![msg_id.clone()]);
        assert!(updated.last_message_at.is_some());
        assert!(updated.updated_at >= updated.created_at);

        let messages = registry.messages("a").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, msg_id);
        assert_eq!(messages[0].content, "Hello!");
    }

    #[test]
    fn test_append_message_errors() {
        let mut registry = Registry::new();
        registry.create(conv("a")).unwrap();

        let orphan = Message::new("gone", Role::Assistant, "late reply");
        assert_eq!(
            registry.append_message(orphan).unwrap_err(),
            RegistryError::NotFound("gone".to_string())
        );
        assert!(!registry.contains("gone"));

        let empty = Message::new("a", Role::User, "  ");
        assert!(matches!(
            registry.append_message(empty),
            Err(RegistryError::Validation(_))
        ));

        let msg = Message::new("a", Role::User, "hi");
        registry.append_message(msg.clone()).unwrap();
        assert!(matches!(
            registry.append_message(msg),
            Err(RegistryError::DuplicateId(_))
        ));
        assert_eq!(registry.get("a").unwrap().message_ids.len(), 1);
    }

    #[test]
    fn test_delete_drops_messages() {
        let mut registry = Registry::new();
        registry.create(conv("a")).unwrap();
        registry
            .append_message(Message::new("a", Role::User, "hi"))
            .unwrap();

        registry.delete("a").unwrap();
        assert!(registry.messages.is_empty());
        assert!(registry.messages("a").is_err());
    }
}
