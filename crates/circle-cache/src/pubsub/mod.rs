//! Redis Pub/Sub module.
//!
//! Channel naming, the event publisher and the relay that turns remote
//! store events back into local change-feed deliveries.

mod channels;
mod publisher;
mod relay;

pub use channels::{
    PubSubChannel, FEED_CHANNEL_PREFIX, FEED_CHANNEL_PATTERN, NOTIFY_CHANNEL_PREFIX,
};
pub use publisher::{PubSubEvent, Publisher, NOTIFICATION_EVENT};
pub use relay::{RedisChangeFeed, RelayConfig};
