//! Paid VIP membership tiers with optional expiry.

use crate::api::{assigned_key, KeyKind, Resource};
use crate::lazy::{LazyRole, LazyUser};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serenity::all::{GuildId, UserId};
use std::collections::BTreeMap;
use thiserror::Error;

const MAX_TIER_NAME: usize = 100;

#[derive(Debug, Error, PartialEq)]
pub enum VipError {
    #[error("No VIP tier with id {0}.")]
    TierNotFound(u64),
    #[error("A tier named '{0}' already exists.")]
    DuplicateName(String),
    #[error("Another tier already has rank {0}.")]
    DuplicateRank(u32),
    #[error("Tier names must be 1 to 100 characters.")]
    InvalidName,
    #[error("{name} is still held by {members} member(s). Revoke them first.")]
    TierInUse { name: String, members: usize },
    #[error("<@{0}> has no VIP membership.")]
    NotVip(UserId),
    #[error("Membership length must be positive.")]
    InvalidDuration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VipTier {
    #[serde(default)]
    pub id: u64,
    pub guild_id: GuildId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub role: Option<LazyRole>,
    #[serde(default)]
    pub cost: u64,
    /// Higher ranks are listed first.
    pub rank: u32,
}

impl Resource for VipTier {
    const COLLECTION: &'static str = "vip/tiers";
    const KEY_KIND: KeyKind = KeyKind::Assigned;

    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn key(&self) -> Option<String> {
        assigned_key(self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VipMember {
    pub guild_id: GuildId,
    pub user: LazyUser,
    pub tier_id: u64,
    pub started_at: DateTime<Utc>,
    /// `None` means the membership never lapses.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl VipMember {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl Resource for VipMember {
    const COLLECTION: &'static str = "vip/members";
    const KEY_KIND: KeyKind = KeyKind::Known;

    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn key(&self) -> Option<String> {
        Some(self.user.id().to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrantOutcome {
    pub member: VipMember,
    /// Set when the grant replaced a membership in another tier.
    pub previous_tier: Option<u64>,
    pub extended: bool,
}

#[derive(Debug, Clone, Default)]
pub struct VipManager {
    tiers: BTreeMap<u64, VipTier>,
    members: BTreeMap<UserId, VipMember>,
}

impl VipManager {
    pub fn new(tiers: Vec<VipTier>, members: Vec<VipMember>) -> Self {
        Self {
            tiers: tiers.into_iter().map(|t| (t.id, t)).collect(),
            members: members.into_iter().map(|m| (m.user.id(), m)).collect(),
        }
    }

    pub fn validate_new_tier(&self, name: &str, rank: u32) -> Result<(), VipError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_TIER_NAME {
            return Err(VipError::InvalidName);
        }
        if self.tier_by_name(name).is_some() {
            return Err(VipError::DuplicateName(name.to_string()));
        }
        if self.tiers.values().any(|t| t.rank == rank) {
            return Err(VipError::DuplicateRank(rank));
        }
        Ok(())
    }

    pub fn insert_tier(&mut self, tier: VipTier) {
        self.tiers.insert(tier.id, tier);
    }

    pub fn tier(&self, id: u64) -> Result<&VipTier, VipError> {
        self.tiers.get(&id).ok_or(VipError::TierNotFound(id))
    }

    pub fn tier_by_name(&self, name: &str) -> Option<&VipTier> {
        let name = name.trim();
        self.tiers.values().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn remove_tier(&mut self, id: u64) -> Result<VipTier, VipError> {
        let tier = self.tier(id)?;
        let holders = self.members.values().filter(|m| m.tier_id == id).count();
        if holders > 0 {
            return Err(VipError::TierInUse {
                name: tier.name.clone(),
                members: holders,
            });
        }
        self.tiers.remove(&id).ok_or(VipError::TierNotFound(id))
    }

    pub fn tiers_by_rank(&self) -> Vec<&VipTier> {
        let mut tiers: Vec<_> = self.tiers.values().collect();
        tiers.sort_by(|a, b| b.rank.cmp(&a.rank));
        tiers
    }

    /// Works out what a grant would do without changing anything. Re-granting
    /// the current tier extends from the later of now and the current expiry;
    /// another tier replaces it.
    pub fn plan_grant(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        tier_id: u64,
        duration: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<GrantOutcome, VipError> {
        self.tier(tier_id)?;
        if duration.is_some_and(|d| d <= Duration::zero()) {
            return Err(VipError::InvalidDuration);
        }

        let outcome = match self.members.get(&user_id) {
            Some(current) if current.tier_id == tier_id => {
                let base = current.expires_at.filter(|at| *at > now).unwrap_or(now);
                GrantOutcome {
                    member: VipMember {
                        expires_at: duration.map(|d| base + d),
                        ..current.clone()
                    },
                    previous_tier: None,
                    extended: true,
                }
            }
            Some(current) => GrantOutcome {
                member: VipMember {
                    tier_id,
                    started_at: now,
                    expires_at: duration.map(|d| now + d),
                    ..current.clone()
                },
                previous_tier: Some(current.tier_id),
                extended: false,
            },
            None => GrantOutcome {
                member: VipMember {
                    guild_id,
                    user: LazyUser(user_id),
                    tier_id,
                    started_at: now,
                    expires_at: duration.map(|d| now + d),
                },
                previous_tier: None,
                extended: false,
            },
        };
        Ok(outcome)
    }

    pub fn grant(
        &mut self,
        guild_id: GuildId,
        user_id: UserId,
        tier_id: u64,
        duration: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<GrantOutcome, VipError> {
        let outcome = self.plan_grant(guild_id, user_id, tier_id, duration, now)?;
        self.put_member(outcome.member.clone());
        Ok(outcome)
    }

    /// Stores a membership as-is, replacing any existing one for the user.
    pub fn put_member(&mut self, member: VipMember) {
        self.members.insert(member.user.id(), member);
    }

    pub fn revoke(&mut self, user_id: UserId) -> Result<VipMember, VipError> {
        self.members
            .remove(&user_id)
            .ok_or(VipError::NotVip(user_id))
    }

    pub fn member(&self, user_id: UserId) -> Option<&VipMember> {
        self.members.get(&user_id)
    }

    pub fn members(&self) -> impl Iterator<Item = &VipMember> {
        self.members.values()
    }

    pub fn is_active(&self, user_id: UserId, now: DateTime<Utc>) -> bool {
        self.members
            .get(&user_id)
            .is_some_and(|m| !m.is_expired(now))
    }

    pub fn expired(&self, now: DateTime<Utc>) -> Vec<VipMember> {
        self.members
            .values()
            .filter(|m| m.is_expired(now))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(id: u64, name: &str, rank: u32) -> VipTier {
        VipTier {
            id,
            guild_id: GuildId::new(1),
            name: name.to_string(),
            description: None,
            role: None,
            cost: 1_000_000,
            rank,
        }
    }

    fn manager() -> VipManager {
        VipManager::new(vec![tier(1, "Silver", 1), tier(2, "Gold", 2)], Vec::new())
    }

    #[test]
    fn tiers_need_unique_name_and_rank() {
        let vip = manager();
        assert_eq!(
            vip.validate_new_tier("gold", 5),
            Err(VipError::DuplicateName("gold".into()))
        );
        assert_eq!(
            vip.validate_new_tier("Platinum", 2),
            Err(VipError::DuplicateRank(2))
        );
        assert!(vip.validate_new_tier("Platinum", 3).is_ok());
    }

    #[test]
    fn tiers_sort_by_rank_descending() {
        let names = manager()
            .tiers_by_rank()
            .into_iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(",");
        assert_eq!(names, "Gold,Silver");
    }

    #[test]
    fn regrant_extends_from_current_expiry() {
        let mut vip = manager();
        let now = Utc::now();
        let user = UserId::new(10);
        let month = Duration::days(30);

        let first = vip.grant(GuildId::new(1), user, 1, Some(month), now).unwrap();
        assert!(!first.extended);
        assert_eq!(first.member.expires_at, Some(now + month));

        let later = now + Duration::days(10);
        let second = vip.grant(GuildId::new(1), user, 1, Some(month), later).unwrap();
        assert!(second.extended);
        assert_eq!(second.member.expires_at, Some(now + month + month));
    }

    #[test]
    fn regrant_after_lapse_starts_from_now() {
        let mut vip = manager();
        let now = Utc::now();
        let user = UserId::new(10);
        vip.grant(GuildId::new(1), user, 1, Some(Duration::days(1)), now)
            .unwrap();

        let later = now + Duration::days(5);
        let outcome = vip
            .grant(GuildId::new(1), user, 1, Some(Duration::days(1)), later)
            .unwrap();
        assert_eq!(outcome.member.expires_at, Some(later + Duration::days(1)));
    }

    #[test]
    fn switching_tier_reports_previous() {
        let mut vip = manager();
        let now = Utc::now();
        let user = UserId::new(10);
        vip.grant(GuildId::new(1), user, 1, None, now).unwrap();

        let outcome = vip.grant(GuildId::new(1), user, 2, None, now).unwrap();
        assert_eq!(outcome.previous_tier, Some(1));
        assert_eq!(vip.member(user).unwrap().tier_id, 2);
    }

    #[test]
    fn planning_leaves_members_untouched() {
        let vip = manager();
        let outcome = vip
            .plan_grant(GuildId::new(1), UserId::new(10), 1, None, Utc::now())
            .unwrap();
        assert_eq!(outcome.member.tier_id, 1);
        assert!(vip.member(UserId::new(10)).is_none());
    }

    #[test]
    fn tier_in_use_cannot_be_removed() {
        let mut vip = manager();
        vip.grant(GuildId::new(1), UserId::new(10), 2, None, Utc::now())
            .unwrap();
        assert_eq!(
            vip.remove_tier(2),
            Err(VipError::TierInUse {
                name: "Gold".into(),
                members: 1
            })
        );
        assert!(vip.remove_tier(1).is_ok());
    }

    #[test]
    fn expiry_is_detected() {
        let mut vip = manager();
        let now = Utc::now();
        vip.grant(GuildId::new(1), UserId::new(10), 1, Some(Duration::hours(1)), now)
            .unwrap();
        vip.grant(GuildId::new(1), UserId::new(11), 1, None, now)
            .unwrap();

        let later = now + Duration::hours(2);
        assert!(vip.is_active(UserId::new(11), later));
        assert!(!vip.is_active(UserId::new(10), later));
        let expired = vip.expired(later);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].user.id(), UserId::new(10));
    }

    #[test]
    fn unknown_tier_and_bad_duration_are_rejected() {
        let mut vip = manager();
        let now = Utc::now();
        assert_eq!(
            vip.grant(GuildId::new(1), UserId::new(10), 7, None, now),
            Err(VipError::TierNotFound(7))
        );
        assert_eq!(
            vip.grant(GuildId::new(1), UserId::new(10), 1, Some(Duration::zero()), now),
            Err(VipError::InvalidDuration)
        );
    }
}
