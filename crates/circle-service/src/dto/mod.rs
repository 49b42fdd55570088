//! Request DTOs validated at the service boundary
//!
//! Every request implements `Deserialize` and `Validate`; services call
//! `validate()` before touching the store.

pub mod requests;

pub use requests::{
    BanRequest, CreateCommunityRequest, GenerateInviteRequest, HistoryQuery, MuteRequest,
    SendDirectRequest, SendGroupRequest, UpdateCommunityRequest, UpdateSettingsRequest,
};
