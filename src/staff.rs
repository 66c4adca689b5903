//! Venue staff: named positions (bartender, dancer, security…) and the members
//! who hold them.

use crate::api::{assigned_key, KeyKind, Resource};
use crate::lazy::{LazyRole, LazyUser};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::all::{GuildId, UserId};
use std::collections::BTreeMap;
use thiserror::Error;

const MAX_POSITION_NAME: usize = 100;

#[derive(Debug, Error, PartialEq)]
pub enum StaffError {
    #[error("No staff position with id {0}.")]
    PositionNotFound(u64),
    #[error("A position named '{0}' already exists.")]
    DuplicatePosition(String),
    #[error("Position names must be 1 to 100 characters.")]
    InvalidName,
    #[error("<@{0}> is already on staff.")]
    AlreadyStaff(UserId),
    #[error("<@{0}> is not on staff.")]
    NotStaff(UserId),
    #[error("<@{user}> already holds {position}.")]
    AlreadyAssigned { user: UserId, position: String },
    #[error("<@{user}> does not hold {position}.")]
    NotAssigned { user: UserId, position: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffPosition {
    #[serde(default)]
    pub id: u64,
    pub guild_id: GuildId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub role: Option<LazyRole>,
}

impl StaffPosition {
    pub fn new(
        guild_id: GuildId,
        name: &str,
        description: Option<String>,
        role: Option<LazyRole>,
    ) -> Self {
        Self {
            id: 0,
            guild_id,
            name: name.trim().to_string(),
            description,
            role,
        }
    }
}

impl Resource for StaffPosition {
    const COLLECTION: &'static str = "staff/positions";
    const KEY_KIND: KeyKind = KeyKind::Assigned;

    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn key(&self) -> Option<String> {
        assigned_key(self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffMember {
    pub guild_id: GuildId,
    pub user: LazyUser,
    #[serde(default)]
    pub positions: Vec<u64>,
    pub hired_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl StaffMember {
    pub fn holds(&self, position_id: u64) -> bool {
        self.positions.contains(&position_id)
    }
}

impl Resource for StaffMember {
    const COLLECTION: &'static str = "staff/members";
    const KEY_KIND: KeyKind = KeyKind::Known;

    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn key(&self) -> Option<String> {
        Some(self.user.id().to_string())
    }
}

/// One block of the roster. `position` is `None` for staff without a position.
#[derive(Debug)]
pub struct RosterGroup<'a> {
    pub position: Option<&'a StaffPosition>,
    pub members: Vec<&'a StaffMember>,
}

#[derive(Debug, Clone, Default)]
pub struct StaffManager {
    positions: BTreeMap<u64, StaffPosition>,
    members: BTreeMap<UserId, StaffMember>,
}

impl StaffManager {
    pub fn new(positions: Vec<StaffPosition>, members: Vec<StaffMember>) -> Self {
        Self {
            positions: positions.into_iter().map(|p| (p.id, p)).collect(),
            members: members.into_iter().map(|m| (m.user.id(), m)).collect(),
        }
    }

    /// Checks a name before the position is sent to the API.
    pub fn validate_new_position(&self, name: &str) -> Result<(), StaffError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_POSITION_NAME {
            return Err(StaffError::InvalidName);
        }
        if self.position_by_name(name).is_some() {
            return Err(StaffError::DuplicatePosition(name.to_string()));
        }
        Ok(())
    }

    pub fn insert_position(&mut self, position: StaffPosition) {
        self.positions.insert(position.id, position);
    }

    pub fn position(&self, id: u64) -> Result<&StaffPosition, StaffError> {
        self.positions.get(&id).ok_or(StaffError::PositionNotFound(id))
    }

    pub fn position_by_name(&self, name: &str) -> Option<&StaffPosition> {
        let name = name.trim();
        self.positions
            .values()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn positions(&self) -> impl Iterator<Item = &StaffPosition> {
        self.positions.values()
    }

    /// Removes the position and strips it from every holder. Returns the
    /// position and the members that changed, so they can be persisted.
    pub fn remove_position(
        &mut self,
        id: u64,
    ) -> Result<(StaffPosition, Vec<StaffMember>), StaffError> {
        let position = self
            .positions
            .remove(&id)
            .ok_or(StaffError::PositionNotFound(id))?;
        let mut affected = Vec::new();
        for member in self.members.values_mut() {
            if member.holds(id) {
                member.positions.retain(|p| *p != id);
                affected.push(member.clone());
            }
        }
        Ok((position, affected))
    }

    pub fn hire(
        &mut self,
        guild_id: GuildId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<&StaffMember, StaffError> {
        if self.members.contains_key(&user_id) {
            return Err(StaffError::AlreadyStaff(user_id));
        }
        Ok(self.members.entry(user_id).or_insert(StaffMember {
            guild_id,
            user: LazyUser(user_id),
            positions: Vec::new(),
            hired_at: now,
            notes: None,
        }))
    }

    pub fn fire(&mut self, user_id: UserId) -> Result<StaffMember, StaffError> {
        self.members
            .remove(&user_id)
            .ok_or(StaffError::NotStaff(user_id))
    }

    pub fn assign(&mut self, user_id: UserId, position_id: u64) -> Result<&StaffMember, StaffError> {
        let name = self.position(position_id)?.name.clone();
        let member = self
            .members
            .get_mut(&user_id)
            .ok_or(StaffError::NotStaff(user_id))?;
        if member.holds(position_id) {
            return Err(StaffError::AlreadyAssigned {
                user: user_id,
                position: name,
            });
        }
        member.positions.push(position_id);
        Ok(member)
    }

    pub fn unassign(
        &mut self,
        user_id: UserId,
        position_id: u64,
    ) -> Result<&StaffMember, StaffError> {
        let name = self
            .positions
            .get(&position_id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("position {}", position_id));
        let member = self
            .members
            .get_mut(&user_id)
            .ok_or(StaffError::NotStaff(user_id))?;
        if !member.holds(position_id) {
            return Err(StaffError::NotAssigned {
                user: user_id,
                position: name,
            });
        }
        member.positions.retain(|p| *p != position_id);
        Ok(member)
    }

    pub fn set_notes(
        &mut self,
        user_id: UserId,
        notes: Option<String>,
    ) -> Result<&StaffMember, StaffError> {
        let member = self
            .members
            .get_mut(&user_id)
            .ok_or(StaffError::NotStaff(user_id))?;
        member.notes = notes.filter(|n| !n.trim().is_empty());
        Ok(member)
    }

    /// Inserts or replaces a member record as-is.
    pub fn put_member(&mut self, member: StaffMember) {
        self.members.insert(member.user.id(), member);
    }

    /// Undoes [`remove_position`](Self::remove_position) with the holders as they were before.
    pub fn restore_position(&mut self, position: StaffPosition, holders: Vec<StaffMember>) {
        self.insert_position(position);
        for member in holders {
            self.put_member(member);
        }
    }

    pub fn member(&self, user_id: UserId) -> Option<&StaffMember> {
        self.members.get(&user_id)
    }

    pub fn members(&self) -> Vec<&StaffMember> {
        let mut members: Vec<_> = self.members.values().collect();
        members.sort_by_key(|m| m.hired_at);
        members
    }

    pub fn members_in(&self, position_id: u64) -> Vec<&StaffMember> {
        self.members()
            .into_iter()
            .filter(|m| m.holds(position_id))
            .collect()
    }

    /// Staff grouped by position, in position order, with unplaced staff last.
    /// Empty positions are kept so the roster shows open slots.
    pub fn roster(&self) -> Vec<RosterGroup<'_>> {
        let mut groups: Vec<RosterGroup<'_>> = self
            .positions
            .values()
            .map(|position| RosterGroup {
                position: Some(position),
                members: self.members_in(position.id),
            })
            .collect();
        let unplaced: Vec<_> = self
            .members()
            .into_iter()
            .filter(|m| !m.positions.iter().any(|p| self.positions.contains_key(p)))
            .collect();
        if !unplaced.is_empty() {
            groups.push(RosterGroup {
                position: None,
                members: unplaced,
            });
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn manager() -> StaffManager {
        let mut bartender = StaffPosition::new(GuildId::new(1), "Bartender", None, None);
        bartender.id = 1;
        let mut security = StaffPosition::new(GuildId::new(1), "Security", None, None);
        security.id = 2;
        StaffManager::new(vec![bartender, security], Vec::new())
    }

    #[test]
    fn position_names_are_unique_ignoring_case() {
        let staff = manager();
        assert_eq!(
            staff.validate_new_position("  bartender "),
            Err(StaffError::DuplicatePosition("bartender".into()))
        );
        assert_eq!(staff.validate_new_position(""), Err(StaffError::InvalidName));
        assert!(staff.validate_new_position("Dancer").is_ok());
    }

    #[test]
    fn hire_assign_and_fire() {
        let mut staff = manager();
        let user = UserId::new(10);
        let now = Utc::now();

        staff.hire(GuildId::new(1), user, now).unwrap();
        assert_eq!(
            staff.hire(GuildId::new(1), user, now).unwrap_err(),
            StaffError::AlreadyStaff(user)
        );

        staff.assign(user, 1).unwrap();
        assert_eq!(
            staff.assign(user, 1).unwrap_err(),
            StaffError::AlreadyAssigned {
                user,
                position: "Bartender".into()
            }
        );
        assert_eq!(
            staff.assign(user, 9).unwrap_err(),
            StaffError::PositionNotFound(9)
        );
        assert_eq!(staff.members_in(1).len(), 1);

        let fired = staff.fire(user).unwrap();
        assert_eq!(fired.positions, vec![1]);
        assert!(staff.member(user).is_none());
        assert_eq!(staff.fire(user).unwrap_err(), StaffError::NotStaff(user));
    }

    #[test]
    fn assigning_requires_staff() {
        let mut staff = manager();
        assert_eq!(
            staff.assign(UserId::new(5), 1).unwrap_err(),
            StaffError::NotStaff(UserId::new(5))
        );
    }

    #[test]
    fn removing_position_unassigns_holders() {
        let mut staff = manager();
        let now = Utc::now();
        for id in [10, 11] {
            staff.hire(GuildId::new(1), UserId::new(id), now).unwrap();
        }
        staff.assign(UserId::new(10), 1).unwrap();
        staff.assign(UserId::new(10), 2).unwrap();
        staff.assign(UserId::new(11), 2).unwrap();

        let (removed, affected) = staff.remove_position(2).unwrap();
        assert_eq!(removed.name, "Security");
        assert_eq!(affected.len(), 2);
        assert_eq!(staff.member(UserId::new(10)).unwrap().positions, vec![1]);
        assert!(staff.member(UserId::new(11)).unwrap().positions.is_empty());
    }

    #[test]
    fn removed_position_can_be_restored() {
        let mut staff = manager();
        let now = Utc::now();
        staff.hire(GuildId::new(1), UserId::new(10), now).unwrap();
        staff.assign(UserId::new(10), 2).unwrap();
        let holders: Vec<StaffMember> = staff.members_in(2).into_iter().cloned().collect();

        let (removed, _) = staff.remove_position(2).unwrap();
        staff.restore_position(removed, holders);

        assert_eq!(staff.position(2).unwrap().name, "Security");
        assert_eq!(staff.member(UserId::new(10)).unwrap().positions, vec![2]);
    }

    #[test]
    fn put_member_replaces_the_record() {
        let mut staff = manager();
        let user = UserId::new(10);
        let before = staff.hire(GuildId::new(1), user, Utc::now()).unwrap().clone();
        staff.set_notes(user, Some("late shift".into())).unwrap();

        staff.put_member(before);
        assert_eq!(staff.member(user).unwrap().notes, None);
    }

    #[test]
    fn roster_groups_by_position() {
        let mut staff = manager();
        let now = Utc::now();
        staff.hire(GuildId::new(1), UserId::new(10), now).unwrap();
        staff
            .hire(GuildId::new(1), UserId::new(11), now + Duration::seconds(1))
            .unwrap();
        staff.assign(UserId::new(10), 1).unwrap();

        let roster = staff.roster();
        assert_eq!(roster.len(), 3);
        assert_eq!(roster[0].position.map(|p| p.id), Some(1));
        assert_eq!(roster[0].members.len(), 1);
        assert!(roster[1].members.is_empty());
        assert!(roster[2].position.is_none());
        assert_eq!(roster[2].members[0].user.id(), UserId::new(11));
    }

    #[test]
    fn member_is_keyed_by_user() {
        let mut staff = manager();
        let member = staff.hire(GuildId::new(1), UserId::new(42), Utc::now()).unwrap();
        assert_eq!(member.item_path().unwrap(), "guilds/1/staff/members/42");
    }
}
