pub mod conversation;
pub mod message;

pub use conversation::{Conversation, ConversationKind, ConversationPatch};
pub use message::{Message, Role};
