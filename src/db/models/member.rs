use core::fmt;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct MemberId(pub String);

impl MemberId {
    /// Mints a new opaque member id.
    pub fn fresh() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Base member table model. The ledger owns `points`, `yellow_cards` and
/// `red_cards`; everything else is directory data managed outside the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub points: i64,
    pub yellow_cards: i64,
    pub red_cards: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Member {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(MemberId::fresh(), name)
    }

    pub fn with_id(id: MemberId, name: impl Into<String>) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id,
            name: name.into(),
            points: 0,
            yellow_cards: 0,
            red_cards: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    Yellow,
    Red,
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardKind::Yellow => write!(f, "yellow"),
            CardKind::Red => write!(f, "red"),
        }
    }
}

/// Which counters a bulk reset zeroes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetScope {
    Points,
    Cards,
    All,
}

impl From<String> for MemberId {
    fn from(value: String) -> Self {
        MemberId(value)
    }
}

impl From<&str> for MemberId {
    fn from(value: &str) -> Self {
        MemberId(value.to_string())
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
