use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::member::MemberId;

/// Per-member rotation record. Created on first selection, updated on every
/// subsequent one, never deleted. Absence of a row means "never selected".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SpeakerHistoryEntry {
    pub member_id: MemberId,
    pub last_selected_date: Option<NaiveDate>,
    pub selection_count: i64,
}

/// The committed speaker set for one calendar date. At most one row per
/// `selected_date`; immutable after commit except through an explicit
/// reshuffle, which deletes and reselects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySelection {
    pub selected_date: NaiveDate,
    pub member_ids: Vec<MemberId>,
}

impl DailySelection {
    pub fn new(selected_date: NaiveDate, member_ids: Vec<MemberId>) -> Self {
        Self {
            selected_date,
            member_ids,
        }
    }
}
