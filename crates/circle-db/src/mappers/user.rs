//! User profile and presence mappers

use circle_core::{Presence, Snowflake, UserProfile};

use crate::models::{PresenceModel, UserModel};

impl From<UserModel> for UserProfile {
    fn from(model: UserModel) -> Self {
        UserProfile {
            id: Snowflake::new(model.id),
            username: model.username,
            display_name: model.display_name,
            photo_url: model.photo_url,
        }
    }
}

impl From<PresenceModel> for Presence {
    fn from(model: PresenceModel) -> Self {
        Presence {
            user_id: Snowflake::new(model.user_id),
            online: model.online,
            last_seen: model.last_seen,
        }
    }
}
