//! Giveaways and raffles: time-boxed activities that collect entries and draw winners.
//!
//! An activity moves `Draft -> Active -> Ended`, or to `Cancelled` from either
//! of the first two. The pure state lives here; Discord side effects (posting,
//! editing the posted message, notifying winners) live in [`lifecycle`].

pub mod entries;
pub mod giveaway;
pub mod lifecycle;
pub mod raffle;
pub mod render;

pub use entries::{Entry, EntryManager};
pub use giveaway::{EntryToggle, Giveaway};
pub use raffle::Raffle;

use crate::api::Resource;
use crate::config::ActivityDefaults;
use crate::guild::GuildData;
use crate::lazy::{LazyChannel, LazyMessage, LazyUser};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serenity::all::{GuildId, MessageId, RoleId, UserId};
use std::collections::{btree_map, BTreeMap};
use std::fmt;
use thiserror::Error;

pub const MAX_WINNERS: u32 = 50;
const MAX_TITLE_CHARS: usize = 256;
const MAX_PRIZE_CHARS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Giveaway,
    Raffle,
}

impl ActivityKind {
    pub fn emoji(self) -> &'static str {
        match self {
            ActivityKind::Giveaway => "🎉",
            ActivityKind::Raffle => "🎟️",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityKind::Giveaway => f.write_str("giveaway"),
            ActivityKind::Raffle => f.write_str("raffle"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Draft,
    Active,
    Ended,
    Cancelled,
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActivityStatus::Draft => "draft",
            ActivityStatus::Active => "active",
            ActivityStatus::Ended => "ended",
            ActivityStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ActivityError {
    #[error("No {0} found with ID `{1}`.")]
    NotFound(ActivityKind, u64),
    #[error("Cannot {action} while it is {status}.")]
    InvalidState {
        action: &'static str,
        status: ActivityStatus,
    },
    #[error("Title must be between 1 and 256 characters.")]
    InvalidTitle,
    #[error("Prize must be between 1 and 1024 characters.")]
    InvalidPrize,
    #[error("Winner count must be between 1 and 50 (got {0}).")]
    InvalidWinnerCount(u32),
    #[error("The end time must be in the future.")]
    EndTimeInPast,
    #[error("Activities can run for at most {0} days.")]
    DurationTooLong(u64),
    #[error("Activities must run for at least {0} seconds.")]
    DurationTooShort(u64),
    #[error("Set a channel before starting.")]
    MissingChannel,
    #[error("Set an end time before starting.")]
    MissingEndTime,
    #[error("Entries are closed.")]
    NotAcceptingEntries,
    #[error("You need the <@&{0}> role to enter.")]
    MissingRequiredRole(RoleId),
    #[error("You are already entered.")]
    AlreadyEntered,
    #[error("<@{0}> has no entry.")]
    NotEntered(UserId),
    #[error("Tickets are capped at {max} per person (currently holding {held}).")]
    TicketLimit { max: u32, held: u32 },
    #[error("Ticket quantity must be at least 1.")]
    InvalidQuantity,
    #[error("Tickets for this raffle are sold by staff.")]
    PaidTickets,
    #[error("Nobody is left to draw from.")]
    NoEligibleEntries,
}

/// State shared by every kind of activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDetails {
    #[serde(default)]
    pub id: u64,
    pub guild_id: GuildId,
    pub title: String,
    pub prize: String,
    #[serde(default)]
    pub description: Option<String>,
    pub host: LazyUser,
    #[serde(default)]
    pub channel: Option<LazyChannel>,
    #[serde(default)]
    pub message: Option<LazyMessage>,
    pub winner_count: u32,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    pub status: ActivityStatus,
    #[serde(default)]
    pub winners: Vec<UserId>,
    /// Everyone who has ever been drawn, so rerolls never pick them again.
    #[serde(default)]
    pub past_winners: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl ActivityDetails {
    pub fn new(
        guild_id: GuildId,
        host: UserId,
        title: &str,
        prize: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, ActivityError> {
        let mut details = Self {
            id: 0,
            guild_id,
            title: String::new(),
            prize: String::new(),
            description: None,
            host: LazyUser(host),
            channel: None,
            message: None,
            winner_count: 1,
            ends_at: None,
            status: ActivityStatus::Draft,
            winners: Vec::new(),
            past_winners: Vec::new(),
            created_at: now,
            ended_at: None,
        };
        details.set_title(title)?;
        details.set_prize(prize)?;
        Ok(details)
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, ActivityStatus::Draft | ActivityStatus::Active)
    }

    fn ensure_open(&self, action: &'static str) -> Result<(), ActivityError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ActivityError::InvalidState {
                action,
                status: self.status,
            })
        }
    }

    pub fn set_title(&mut self, title: &str) -> Result<(), ActivityError> {
        self.ensure_open("edit the title")?;
        let title = title.trim();
        if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
            return Err(ActivityError::InvalidTitle);
        }
        self.title = title.to_string();
        Ok(())
    }

    pub fn set_prize(&mut self, prize: &str) -> Result<(), ActivityError> {
        self.ensure_open("edit the prize")?;
        let prize = prize.trim();
        if prize.is_empty() || prize.chars().count() > MAX_PRIZE_CHARS {
            return Err(ActivityError::InvalidPrize);
        }
        self.prize = prize.to_string();
        Ok(())
    }

    pub fn set_description(&mut self, description: Option<&str>) -> Result<(), ActivityError> {
        self.ensure_open("edit the description")?;
        self.description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        Ok(())
    }

    /// The channel is fixed once the activity has been posted.
    pub fn set_channel(&mut self, channel: LazyChannel) -> Result<(), ActivityError> {
        if self.status != ActivityStatus::Draft {
            return Err(ActivityError::InvalidState {
                action: "move it to another channel",
                status: self.status,
            });
        }
        self.channel = Some(channel);
        Ok(())
    }

    pub fn set_winner_count(&mut self, count: u32) -> Result<(), ActivityError> {
        self.ensure_open("change the winner count")?;
        if count == 0 || count > MAX_WINNERS {
            return Err(ActivityError::InvalidWinnerCount(count));
        }
        self.winner_count = count;
        Ok(())
    }

    pub fn set_end_time(
        &mut self,
        ends_at: DateTime<Utc>,
        now: DateTime<Utc>,
        limits: &ActivityDefaults,
    ) -> Result<(), ActivityError> {
        self.ensure_open("change the end time")?;
        if ends_at <= now {
            return Err(ActivityError::EndTimeInPast);
        }
        let length = ends_at - now;
        if length < Duration::seconds(limits.min_duration_secs as i64) {
            return Err(ActivityError::DurationTooShort(limits.min_duration_secs));
        }
        if length > Duration::days(limits.max_duration_days as i64) {
            return Err(ActivityError::DurationTooLong(limits.max_duration_days));
        }
        self.ends_at = Some(ends_at);
        Ok(())
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), ActivityError> {
        if self.status != ActivityStatus::Draft {
            return Err(ActivityError::InvalidState {
                action: "start it",
                status: self.status,
            });
        }
        if self.channel.is_none() {
            return Err(ActivityError::MissingChannel);
        }
        match self.ends_at {
            None => return Err(ActivityError::MissingEndTime),
            Some(ends_at) if ends_at <= now => return Err(ActivityError::EndTimeInPast),
            Some(_) => {}
        }
        self.status = ActivityStatus::Active;
        Ok(())
    }

    pub fn finish(&mut self, winners: Vec<UserId>, now: DateTime<Utc>) -> Result<(), ActivityError> {
        if self.status != ActivityStatus::Active {
            return Err(ActivityError::InvalidState {
                action: "end it",
                status: self.status,
            });
        }
        self.past_winners.extend(winners.iter().copied());
        self.winners = winners;
        self.status = ActivityStatus::Ended;
        self.ended_at = Some(now);
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), ActivityError> {
        self.ensure_open("cancel it")?;
        self.status = ActivityStatus::Cancelled;
        self.ended_at = Some(now);
        Ok(())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ActivityStatus::Active && self.ends_at.is_some_and(|t| t <= now)
    }

    pub fn accepting_entries(&self, now: DateTime<Utc>) -> bool {
        self.status == ActivityStatus::Active && self.ends_at.is_some_and(|t| now < t)
    }
}

pub trait Activity: Resource {
    const KIND: ActivityKind;

    fn details(&self) -> &ActivityDetails;
    fn details_mut(&mut self) -> &mut ActivityDetails;
    fn entries(&self) -> &EntryManager;

    /// Extra embed fields specific to the kind of activity.
    fn summary_fields(&self) -> Vec<(&'static str, String)>;

    fn manager(guild: &GuildData) -> &ActivityManager<Self>
    where
        Self: Sized;
    fn manager_mut(guild: &mut GuildData) -> &mut ActivityManager<Self>
    where
        Self: Sized;

    fn id(&self) -> u64 {
        self.details().id
    }

    /// Draws winners and moves the activity to `Ended`.
    fn conclude<R: Rng + ?Sized>(
        &mut self,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<Vec<UserId>, ActivityError> {
        let details = self.details();
        if details.status != ActivityStatus::Active {
            return Err(ActivityError::InvalidState {
                action: "end it",
                status: details.status,
            });
        }
        let winners = self
            .entries()
            .draw(details.winner_count as usize, &[], rng);
        self.details_mut().finish(winners.clone(), now)?;
        Ok(winners)
    }

    /// Replaces the current winners with a fresh draw that excludes everyone drawn before.
    fn reroll<R: Rng + ?Sized>(
        &mut self,
        count: Option<u32>,
        rng: &mut R,
    ) -> Result<Vec<UserId>, ActivityError> {
        let details = self.details();
        if details.status != ActivityStatus::Ended {
            return Err(ActivityError::InvalidState {
                action: "reroll it",
                status: details.status,
            });
        }
        let count = count.unwrap_or(details.winner_count);
        if count == 0 || count > MAX_WINNERS {
            return Err(ActivityError::InvalidWinnerCount(count));
        }
        let winners = self
            .entries()
            .draw(count as usize, &details.past_winners, rng);
        if winners.is_empty() {
            return Err(ActivityError::NoEligibleEntries);
        }
        let details = self.details_mut();
        details.past_winners.extend(winners.iter().copied());
        details.winners = winners.clone();
        Ok(winners)
    }
}

/// In-memory owner of one guild's activities of a single kind.
#[derive(Debug, Clone)]
pub struct ActivityManager<A> {
    items: BTreeMap<u64, A>,
}

impl<A> Default for ActivityManager<A> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<A: Activity> ActivityManager<A> {
    pub fn new(items: Vec<A>) -> Self {
        Self {
            items: items.into_iter().map(|a| (a.id(), a)).collect(),
        }
    }

    pub fn insert(&mut self, activity: A) -> &mut A {
        match self.items.entry(activity.id()) {
            btree_map::Entry::Occupied(mut slot) => {
                slot.insert(activity);
                slot.into_mut()
            }
            btree_map::Entry::Vacant(slot) => slot.insert(activity),
        }
    }

    pub fn get(&self, id: u64) -> Option<&A> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut A> {
        self.items.get_mut(&id)
    }

    pub fn require(&self, id: u64) -> Result<&A, ActivityError> {
        self.get(id).ok_or(ActivityError::NotFound(A::KIND, id))
    }

    pub fn require_mut(&mut self, id: u64) -> Result<&mut A, ActivityError> {
        self.get_mut(id).ok_or(ActivityError::NotFound(A::KIND, id))
    }

    pub fn remove(&mut self, id: u64) -> Option<A> {
        self.items.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &A> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn active(&self) -> impl Iterator<Item = &A> {
        self.iter()
            .filter(|a| a.details().status == ActivityStatus::Active)
    }

    /// Ids of active activities whose end time has passed.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<u64> {
        self.iter()
            .filter(|a| a.details().is_due(now))
            .map(|a| a.id())
            .collect()
    }

    pub fn by_message(&self, message_id: MessageId) -> Option<&A> {
        self.iter()
            .find(|a| a.details().message.is_some_and(|m| m.message_id == message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serenity::all::ChannelId;

    fn details(now: DateTime<Utc>) -> ActivityDetails {
        ActivityDetails::new(GuildId::new(1), UserId::new(2), "Summer bash", "A mount", now)
            .unwrap()
    }

    fn ready(now: DateTime<Utc>) -> ActivityDetails {
        let mut details = details(now);
        details.set_channel(LazyChannel(ChannelId::new(3))).unwrap();
        details
            .set_end_time(now + Duration::hours(1), now, &ActivityDefaults::default())
            .unwrap();
        details
    }

    #[test]
    fn rejects_blank_title_and_prize() {
        let now = Utc::now();
        assert_eq!(
            ActivityDetails::new(GuildId::new(1), UserId::new(2), "  ", "x", now),
            Err(ActivityError::InvalidTitle)
        );
        assert_eq!(
            ActivityDetails::new(GuildId::new(1), UserId::new(2), "x", "", now),
            Err(ActivityError::InvalidPrize)
        );
    }

    #[test]
    fn end_time_respects_limits() {
        let now = Utc::now();
        let limits = ActivityDefaults::default();
        let mut details = details(now);

        assert_eq!(
            details.set_end_time(now - Duration::minutes(1), now, &limits),
            Err(ActivityError::EndTimeInPast)
        );
        assert_eq!(
            details.set_end_time(now + Duration::seconds(5), now, &limits),
            Err(ActivityError::DurationTooShort(limits.min_duration_secs))
        );
        assert_eq!(
            details.set_end_time(now + Duration::days(90), now, &limits),
            Err(ActivityError::DurationTooLong(limits.max_duration_days))
        );
        assert!(details
            .set_end_time(now + Duration::days(2), now, &limits)
            .is_ok());
    }

    #[test]
    fn start_requires_channel_and_end_time() {
        let now = Utc::now();
        let mut details = details(now);
        assert_eq!(details.start(now), Err(ActivityError::MissingChannel));

        details.set_channel(LazyChannel(ChannelId::new(3))).unwrap();
        assert_eq!(details.start(now), Err(ActivityError::MissingEndTime));
    }

    #[test]
    fn full_lifecycle() {
        let now = Utc::now();
        let mut details = ready(now);

        details.start(now).unwrap();
        assert!(details.accepting_entries(now));
        assert!(!details.is_due(now));
        assert!(details.is_due(now + Duration::hours(2)));
        assert!(details
            .set_channel(LazyChannel(ChannelId::new(4)))
            .is_err());

        details
            .finish(vec![UserId::new(9)], now + Duration::hours(1))
            .unwrap();
        assert_eq!(details.status, ActivityStatus::Ended);
        assert_eq!(details.past_winners, vec![UserId::new(9)]);
        assert!(!details.accepting_entries(now));
        assert!(matches!(
            details.set_prize("something else"),
            Err(ActivityError::InvalidState { .. })
        ));
        assert!(details.cancel(now).is_err());
    }

    #[test]
    fn cancel_from_draft() {
        let now = Utc::now();
        let mut details = details(now);
        details.cancel(now).unwrap();
        assert_eq!(details.status, ActivityStatus::Cancelled);
        assert!(details.start(now).is_err());
    }

    #[test]
    fn winner_count_bounds() {
        let now = Utc::now();
        let mut details = details(now);
        assert_eq!(
            details.set_winner_count(0),
            Err(ActivityError::InvalidWinnerCount(0))
        );
        assert_eq!(
            details.set_winner_count(51),
            Err(ActivityError::InvalidWinnerCount(51))
        );
        details.set_winner_count(3).unwrap();
        assert_eq!(details.winner_count, 3);
    }

    #[test]
    fn conclude_and_reroll_never_repeat_winners() {
        let now = Utc::now();
        let mut giveaway = Giveaway {
            details: ready(now),
            entries: EntryManager::new(),
            required_role: None,
        };
        giveaway.details.start(now).unwrap();
        for id in 10..13 {
            giveaway
                .toggle_entry(UserId::new(id), &[], now)
                .unwrap();
        }
        let mut rng = StdRng::seed_from_u64(5);

        let first = giveaway.conclude(now, &mut rng).unwrap();
        assert_eq!(first.len(), 1);
        let second = giveaway.reroll(None, &mut rng).unwrap();
        let third = giveaway.reroll(None, &mut rng).unwrap();
        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_ne!(first, third);
        assert_eq!(giveaway.details.winners, third);
        assert_eq!(
            giveaway.reroll(None, &mut rng),
            Err(ActivityError::NoEligibleEntries)
        );
    }

    #[test]
    fn manager_finds_due_and_posted() {
        let now = Utc::now();
        let mut due = Giveaway {
            details: ready(now),
            entries: EntryManager::new(),
            required_role: None,
        };
        due.details.id = 1;
        due.details.start(now).unwrap();
        due.details.message = Some(LazyMessage::new(ChannelId::new(3), MessageId::new(77)));

        let mut draft = due.clone();
        draft.details.id = 2;
        draft.details.status = ActivityStatus::Draft;
        draft.details.message = None;

        let manager = ActivityManager::new(vec![due, draft]);
        assert_eq!(manager.due(now + Duration::hours(2)), vec![1]);
        assert_eq!(manager.active().count(), 1);
        assert_eq!(
            manager.by_message(MessageId::new(77)).map(|g| g.id()),
            Some(1)
        );
        assert_eq!(
            manager.require(3).err(),
            Some(ActivityError::NotFound(ActivityKind::Giveaway, 3))
        );
    }
}
