//! Conversation entity <-> model mapper

use std::collections::BTreeMap;

use circle_core::{Conversation, ConversationId, DomainError, Snowflake};

use super::{corrupt, summary_from_columns};
use crate::models::ConversationModel;

impl TryFrom<ConversationModel> for Conversation {
    type Error = DomainError;

    fn try_from(model: ConversationModel) -> Result<Self, Self::Error> {
        let id = ConversationId::parse(&model.id).map_err(|_| corrupt("conversation id", &model.id))?;
        Ok(Conversation {
            id,
            unread: BTreeMap::from([
                (Snowflake::new(model.low_id), model.low_unread),
                (Snowflake::new(model.high_id), model.high_unread),
            ]),
            last_message: summary_from_columns(
                model.last_message_id,
                model.last_message_sender,
                model.last_message_preview,
                model.last_message_kind,
                model.last_message_at,
            ),
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

/// Counter column holding `user_id`'s unread count, if they take part
pub fn unread_column(id: &ConversationId, user_id: Snowflake) -> Option<&'static str> {
    let (low, high) = id.participants()?;
    if user_id == low {
        Some("low_unread")
    } else if user_id == high {
        Some("high_unread")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unread_column_by_position() {
        let id = ConversationId::direct(Snowflake::new(9), Snowflake::new(4)).unwrap();
        assert_eq!(unread_column(&id, Snowflake::new(4)), Some("low_unread"));
        assert_eq!(unread_column(&id, Snowflake::new(9)), Some("high_unread"));
        assert_eq!(unread_column(&id, Snowflake::new(5)), None);
        assert_eq!(unread_column(&ConversationId::community(Snowflake::new(4)), Snowflake::new(4)), None);
    }
}
