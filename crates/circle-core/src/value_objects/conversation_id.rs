//! Conversation identifiers
//!
//! A direct conversation is addressed by its two participants sorted in
//! ascending numeric order, so both sides derive the same id without a lookup.
//! A community conversation is addressed by the community id.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::Snowflake;

const DIRECT_PREFIX: &str = "dm_";
const COMMUNITY_PREFIX: &str = "community_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConversationId {
    Direct { low: Snowflake, high: Snowflake },
    Community(Snowflake),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversationIdParseError {
    #[error("unrecognized conversation id: {0}")]
    Unrecognized(String),

    #[error("a direct conversation needs two distinct participants")]
    SameParticipant,
}

impl ConversationId {
    /// Canonical id for the pair, independent of argument order.
    ///
    /// Participants are ordered by numeric value, not by their decimal text:
    /// users 9 and 10 share `dm_9_10`. The conversations table relies on this
    /// through `CHECK (low_id < high_id)`.
    ///
    /// Returns `None` when both ids are the same user.
    pub fn direct(a: Snowflake, b: Snowflake) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self::Direct { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self::Direct { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub const fn community(id: Snowflake) -> Self {
        Self::Community(id)
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct { .. })
    }

    pub fn participants(&self) -> Option<(Snowflake, Snowflake)> {
        match *self {
            Self::Direct { low, high } => Some((low, high)),
            Self::Community(_) => None,
        }
    }

    pub fn community_id(&self) -> Option<Snowflake> {
        match *self {
            Self::Community(id) => Some(id),
            Self::Direct { .. } => None,
        }
    }

    pub fn includes(&self, user_id: Snowflake) -> bool {
        self.participants()
            .is_some_and(|(low, high)| low == user_id || high == user_id)
    }

    /// The participant on the other side of a direct conversation
    pub fn other_participant(&self, user_id: Snowflake) -> Option<Snowflake> {
        let (low, high) = self.participants()?;
        if user_id == low {
            Some(high)
        } else if user_id == high {
            Some(low)
        } else {
            None
        }
    }

    pub fn parse(s: &str) -> Result<Self, ConversationIdParseError> {
        let unrecognized = || ConversationIdParseError::Unrecognized(s.to_string());

        if let Some(rest) = s.strip_prefix(DIRECT_PREFIX) {
            let (a, b) = rest.split_once('_').ok_or_else(unrecognized)?;
            let a = Snowflake::parse(a).map_err(|_| unrecognized())?;
            let b = Snowflake::parse(b).map_err(|_| unrecognized())?;
            return Self::direct(a, b).ok_or(ConversationIdParseError::SameParticipant);
        }

        if let Some(rest) = s.strip_prefix(COMMUNITY_PREFIX) {
            return Snowflake::parse(rest)
                .map(Self::Community)
                .map_err(|_| unrecognized());
        }

        Err(unrecognized())
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { low, high } => write!(f, "{DIRECT_PREFIX}{low}_{high}"),
            Self::Community(id) => write!(f, "{COMMUNITY_PREFIX}{id}"),
        }
    }
}

impl std::str::FromStr for ConversationId {
    type Err = ConversationIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ConversationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ConversationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: i64) -> Snowflake {
        Snowflake::new(n)
    }

    #[test]
    fn test_direct_is_commutative() {
        assert_eq!(
            ConversationId::direct(id(7), id(3)),
            ConversationId::direct(id(3), id(7))
        );
        assert_eq!(
            ConversationId::direct(id(7), id(3)).unwrap().to_string(),
            "dm_3_7"
        );
    }

    #[test]
    fn test_direct_orders_numerically() {
        let conversation = ConversationId::direct(id(10), id(9)).unwrap();
        assert_eq!(conversation.to_string(), "dm_9_10");
        assert_eq!(conversation.participants(), Some((id(9), id(10))));
        assert_eq!(ConversationId::parse("dm_10_9"), Ok(conversation));
    }

    #[test]
    fn test_direct_rejects_self() {
        assert!(ConversationId::direct(id(5), id(5)).is_none());
        assert_eq!(
            ConversationId::parse("dm_5_5"),
            Err(ConversationIdParseError::SameParticipant)
        );
    }

    #[test]
    fn test_parse_round_trips_display() {
        for conversation in [
            ConversationId::direct(id(10), id(200)).unwrap(),
            ConversationId::community(id(99)),
        ] {
            assert_eq!(ConversationId::parse(&conversation.to_string()), Ok(conversation));
        }
        assert!(ConversationId::parse("group_1").is_err());
        assert!(ConversationId::parse("dm_1").is_err());
    }

    #[test]
    fn test_parse_normalizes_order() {
        let parsed = ConversationId::parse("dm_9_2").unwrap();
        assert_eq!(parsed.participants(), Some((id(2), id(9))));
    }

    #[test]
    fn test_other_participant() {
        let conversation = ConversationId::direct(id(1), id(2)).unwrap();
        assert_eq!(conversation.other_participant(id(1)), Some(id(2)));
        assert_eq!(conversation.other_participant(id(2)), Some(id(1)));
        assert_eq!(conversation.other_participant(id(3)), None);
        assert!(conversation.includes(id(1)));
        assert!(!ConversationId::community(id(1)).includes(id(1)));
    }

    #[test]
    fn test_serde_as_string() {
        let conversation = ConversationId::community(id(4));
        let json = serde_json::to_string(&conversation).unwrap();
        assert_eq!(json, "\"community_4\"");
        let back: ConversationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, conversation);
    }
}
