//! In-memory implementations of the repository ports

mod community;
mod conversation;
mod directory;
mod message;
mod notification;
mod presence;

pub use community::MemoryCommunityRepository;
pub use conversation::MemoryConversationRepository;
pub use directory::MemoryUserDirectory;
pub use message::MemoryMessageRepository;
pub use notification::{MemoryNotificationStore, DEFAULT_INBOX_CAPACITY};
pub use presence::MemoryPresenceRepository;
