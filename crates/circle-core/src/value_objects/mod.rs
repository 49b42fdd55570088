//! Value objects - immutable identifiers used across the domain

mod conversation_id;
mod snowflake;

pub use conversation_id::{ConversationId, ConversationIdParseError};
pub use snowflake::{Snowflake, SnowflakeGenerator, SnowflakeParseError};
