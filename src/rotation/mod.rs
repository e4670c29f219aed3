use std::collections::HashMap;

use chrono::NaiveDate;
use rand::Rng;
use rand::seq::IndexedRandom;
use thiserror::Error;
use tracing::instrument;

use crate::clock::Clock;
use crate::constants::{MAX_SELECT_ATTEMPTS, SPEAKERS_PER_DAY};
use crate::db::models::member::Member;
use crate::db::models::speaker::{DailySelection, SpeakerHistoryEntry};
use crate::db::store::{Store, StoreError};


pub type RotationResult<T> = core::result::Result<T, RotationError>;

#[derive(Debug, Error)]
pub enum RotationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The commit/re-read loop hit its cap without either committing or
    /// observing a winner. Not expected under real contention; points at a
    /// misbehaving backing store.
    #[error("daily selection contention persisted after {attempts} attempts")]
    ContentionExhausted { attempts: u32 },
}

/// Daily speaker rotation.
///
/// Selection is idempotent per calendar date: the first committed
/// `DailySelection` wins and every later call returns it. Concurrent first
/// callers race on the storage-level uniqueness of `selected_date`; losers
/// re-read the winner's pair instead of surfacing an error.
#[derive(Clone, Debug)]
pub struct Scheduler<S, C> {
    store: S,
    clock: C,
}

impl<S, C> Scheduler<S, C>
where
    S: Store,
    C: Clock,
{
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub async fn speakers_today(&self) -> RotationResult<Vec<Member>> {
        self.get_or_select_speakers(self.clock.today()).await
    }

    /// Admin override: drop the committed selection for `date` and run the
    /// selection again. The only path that yields more than one selection
    /// for a date over time.
    #[instrument(skip(self))]
    pub async fn reshuffle(&self, date: NaiveDate) -> RotationResult<Vec<Member>> {
        self.store.delete_selection(date).await?;
        self.get_or_select_speakers(date).await
    }

    #[instrument(skip(self))]
    pub async fn get_or_select_speakers(&self, date: NaiveDate) -> RotationResult<Vec<Member>> {
        for attempt in 1..=MAX_SELECT_ATTEMPTS {
            if let Some(existing) = self.store.selection_for(date).await? {
                return Ok(self.store.members_by_id(&existing.member_ids).await?);
            }

            let directory = self.store.list_members().await?;
            if directory.len() < SPEAKERS_PER_DAY {
                // Not enough members to rotate; return whoever exists and
                // write no rotation state.
                return Ok(directory);
            }

            let history = self.store.speaker_history().await?;
            let picked = {
                let mut rng = rand::rng();
                pick_candidates(&directory, &history, &mut rng)
            };

            let selection =
                DailySelection::new(date, picked.iter().map(|m| m.id.clone()).collect());

            match self.store.insert_selection(&selection).await {
                Ok(()) => {
                    self.record_history(&picked, date).await;
                    return Ok(picked);
                }
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(%date, attempt, "lost selection race; re-reading winner");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RotationError::ContentionExhausted {
            attempts: MAX_SELECT_ATTEMPTS,
        })
    }

    /// Best-effort history updates after a committed selection. The
    /// committed row is the source of truth for who speaks today; a failed
    /// history write is logged for out-of-band repair and must not roll the
    /// selection back or block the other member's update.
    async fn record_history(&self, picked: &[Member], date: NaiveDate) {
        for member in picked {
            if let Err(e) = self.store.mark_selected(&member.id, date).await {
                tracing::warn!(error = ?e, member = %member.id, "speaker history update failed");
            }
        }
    }
}

/// Candidate policy, in priority order:
///
/// 1. Two or more never-selected members: two uniform picks from them.
/// 2. Exactly one: pair it with the spoken member holding the smallest
///    `selection_count` (oldest `last_selected_date`, then id, as
///    tiebreaks) -- that pick is deterministic.
/// 3. None: a reset pass, two uniform picks over the full directory.
///
/// Callers guarantee `directory.len() >= 2`. Sampling is without
/// replacement, so the returned pair is always distinct.
fn pick_candidates<R: Rng + ?Sized>(
    directory: &[Member],
    history: &[SpeakerHistoryEntry],
    rng: &mut R,
) -> Vec<Member> {
    let stats: HashMap<&str, (i64, Option<NaiveDate>)> = history
        .iter()
        .map(|h| {
            (
                h.member_id.0.as_str(),
                (h.selection_count, h.last_selected_date),
            )
        })
        .collect();

    let (mut spoken, unspoken): (Vec<Member>, Vec<Member>) = directory
        .iter()
        .cloned()
        .partition(|m| stats.contains_key(m.id.0.as_str()));

    if unspoken.len() >= SPEAKERS_PER_DAY {
        return unspoken
            .choose_multiple(rng, SPEAKERS_PER_DAY)
            .cloned()
            .collect();
    }

    if let [single] = unspoken.as_slice() {
        spoken.sort_by(|a, b| {
            let a_stats = stats.get(a.id.0.as_str()).copied().unwrap_or_default();
            let b_stats = stats.get(b.id.0.as_str()).copied().unwrap_or_default();
            a_stats
                .0
                .cmp(&b_stats.0)
                .then_with(|| a_stats.1.cmp(&b_stats.1))
                .then_with(|| a.id.0.cmp(&b.id.0))
        });

        let mut pair = vec![single.clone()];
        pair.extend(spoken.into_iter().next());
        return pair;
    }

    // Everyone has spoken at least once: keep the rotation live with a
    // uniform pass over the whole directory.
    directory
        .choose_multiple(rng, SPEAKERS_PER_DAY)
        .cloned()
        .collect()
}
