pub mod conversation;
pub mod export;
pub mod registry;
pub mod reply;
pub mod settings;
pub mod view;

pub use registry::Registry;
pub use reply::{CannedReplySource, ReplyEvent, ReplyScheduler, ReplySource};
pub use settings::{AppSettings, SettingsService};
pub use view::{derive_view, ViewFilter};
