//! Notification push module.

mod push_sink;

pub use push_sink::RedisNotificationSink;
