//! Role resolution and moderation rules over a community snapshot

mod role;

pub use role::{can_moderate, is_authorized_admin, is_muted, role_of, MemberRole};
