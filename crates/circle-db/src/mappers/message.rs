//! Message entity <-> model mapper

use circle_core::{
    ConversationId, DomainError, LinkPreview, Message, MessageKind, MessageStatus, MessageTarget,
    Snowflake,
};
use sqlx::types::Json;

use super::corrupt;
use crate::models::MessageModel;

impl TryFrom<MessageModel> for Message {
    type Error = DomainError;

    fn try_from(model: MessageModel) -> Result<Self, Self::Error> {
        let conversation_id = ConversationId::parse(&model.conversation_id)
            .map_err(|_| corrupt("conversation id", &model.conversation_id))?;
        let target = match (model.recipient_id, model.community_id) {
            (Some(recipient), None) => MessageTarget::Direct(Snowflake::new(recipient)),
            (None, Some(community)) => MessageTarget::Community(Snowflake::new(community)),
            _ => return Err(corrupt("message target", &model.id.to_string())),
        };
        let kind = MessageKind::parse(&model.kind).ok_or_else(|| corrupt("message kind", &model.kind))?;
        let status =
            MessageStatus::parse(&model.status).ok_or_else(|| corrupt("message status", &model.status))?;

        Ok(Message {
            id: Snowflake::new(model.id),
            conversation_id,
            sender_id: Snowflake::new(model.sender_id),
            sender_name: model.sender_name,
            target,
            content: model.content,
            attachments: model.attachments,
            kind,
            link_preview: model.link_preview.map(|Json(preview)| preview),
            status,
            is_read: model.is_read,
            is_delivered: model.is_delivered,
            sequence: model.sequence,
            created_at: model.created_at,
        })
    }
}

/// JSONB binding for an optional link preview
pub type LinkPreviewValue<'a> = Option<Json<&'a LinkPreview>>;
