//! PostgreSQL repository implementations

mod community;
mod conversation;
mod directory;
mod error;
mod message;
mod notification;
mod presence;

pub use community::PgCommunityRepository;
pub use conversation::PgConversationRepository;
pub use directory::PgUserDirectory;
pub use error::{map_db_error, map_unique_violation};
pub use message::PgMessageRepository;
pub use notification::PgNotificationStore;
pub use presence::PgPresenceRepository;
