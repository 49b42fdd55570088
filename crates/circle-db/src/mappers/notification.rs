//! Notification entity <-> model mapper

use circle_core::{DomainError, Notification, NotificationKind, Snowflake};
use sqlx::types::Json;

use super::corrupt;
use crate::models::NotificationModel;

impl TryFrom<NotificationModel> for Notification {
    type Error = DomainError;

    fn try_from(model: NotificationModel) -> Result<Self, Self::Error> {
        let kind = NotificationKind::parse(&model.kind)
            .ok_or_else(|| corrupt("notification kind", &model.kind))?;
        let Json(data) = model.data;
        Ok(Notification {
            id: Snowflake::new(model.id),
            user_id: Snowflake::new(model.user_id),
            title: model.title,
            body: model.body,
            kind,
            data,
            created_at: model.created_at,
            read: model.read,
        })
    }
}
