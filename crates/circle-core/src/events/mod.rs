//! Store events and the feed topics they are delivered on

mod store_event;

pub use store_event::{FeedTopic, StoreEvent};
