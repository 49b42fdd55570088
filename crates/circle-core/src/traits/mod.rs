//! Ports implemented by storage and delivery backends

mod clock;
mod feed;
mod repositories;

pub use clock::{Clock, ManualClock, SystemClock};
pub use feed::{ChangeFeed, FeedListener, Subscription};
pub use repositories::{
    CommunityRepository, ConversationRepository, MessageQuery, MessageRepository,
    NotificationRepository, NotificationSink, PresenceRepository, RepoResult, UserDirectory,
};
