use crate::activity::{
    Activity, ActivityDetails, ActivityError, ActivityKind, ActivityManager, EntryManager,
};
use crate::api::{assigned_key, KeyKind, Resource};
use crate::guild::GuildData;
use crate::lazy::LazyRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::all::{GuildId, RoleId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Giveaway {
    #[serde(flatten)]
    pub details: ActivityDetails,
    #[serde(default)]
    pub entries: EntryManager,
    #[serde(default)]
    pub required_role: Option<LazyRole>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryToggle {
    Entered,
    Withdrawn,
}

impl Giveaway {
    pub fn new(
        guild_id: GuildId,
        host: UserId,
        title: &str,
        prize: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, ActivityError> {
        Ok(Self {
            details: ActivityDetails::new(guild_id, host, title, prize, now)?,
            entries: EntryManager::new(),
            required_role: None,
        })
    }

    pub fn set_required_role(&mut self, role: Option<LazyRole>) -> Result<(), ActivityError> {
        if !self.details.is_open() {
            return Err(ActivityError::InvalidState {
                action: "change the required role",
                status: self.details.status,
            });
        }
        self.required_role = role;
        Ok(())
    }

    /// Enters the user, or withdraws them if they already hold an entry.
    pub fn toggle_entry(
        &mut self,
        user_id: UserId,
        member_roles: &[RoleId],
        now: DateTime<Utc>,
    ) -> Result<EntryToggle, ActivityError> {
        if !self.details.accepting_entries(now) {
            return Err(ActivityError::NotAcceptingEntries);
        }
        if self.entries.remove(user_id).is_some() {
            return Ok(EntryToggle::Withdrawn);
        }
        if let Some(role) = self.required_role {
            if !member_roles.contains(&role.role_id) {
                return Err(ActivityError::MissingRequiredRole(role.role_id));
            }
        }
        self.entries.add(user_id, 1, now);
        Ok(EntryToggle::Entered)
    }
}

impl Resource for Giveaway {
    const COLLECTION: &'static str = "giveaways";
    const KEY_KIND: KeyKind = KeyKind::Assigned;

    fn guild_id(&self) -> GuildId {
        self.details.guild_id
    }

    fn key(&self) -> Option<String> {
        assigned_key(self.details.id)
    }
}

impl Activity for Giveaway {
    const KIND: ActivityKind = ActivityKind::Giveaway;

    fn details(&self) -> &ActivityDetails {
        &self.details
    }

    fn details_mut(&mut self) -> &mut ActivityDetails {
        &mut self.details
    }

    fn entries(&self) -> &EntryManager {
        &self.entries
    }

    fn summary_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("Entries", self.entries.len().to_string())];
        if let Some(role) = self.required_role {
            fields.push(("Required role", role.mention()));
        }
        fields
    }

    fn manager(guild: &GuildData) -> &ActivityManager<Self> {
        &guild.giveaways
    }

    fn manager_mut(guild: &mut GuildData) -> &mut ActivityManager<Self> {
        &mut guild.giveaways
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActivityDefaults;
    use crate::lazy::LazyChannel;
    use chrono::Duration;
    use serenity::all::ChannelId;

    fn running(now: DateTime<Utc>) -> Giveaway {
        let mut giveaway =
            Giveaway::new(GuildId::new(1), UserId::new(2), "Friday giveaway", "10m gil", now)
                .unwrap();
        giveaway
            .details
            .set_channel(LazyChannel(ChannelId::new(3)))
            .unwrap();
        giveaway
            .details
            .set_end_time(now + Duration::hours(1), now, &ActivityDefaults::default())
            .unwrap();
        giveaway.details.start(now).unwrap();
        giveaway
    }

    #[test]
    fn toggle_enters_then_withdraws() {
        let now = Utc::now();
        let mut giveaway = running(now);
        let user = UserId::new(10);

        assert_eq!(giveaway.toggle_entry(user, &[], now), Ok(EntryToggle::Entered));
        assert_eq!(giveaway.entries.quantity_of(user), 1);
        assert_eq!(
            giveaway.toggle_entry(user, &[], now),
            Ok(EntryToggle::Withdrawn)
        );
        assert!(giveaway.entries.is_empty());
    }

    #[test]
    fn required_role_is_enforced() {
        let now = Utc::now();
        let mut giveaway = running(now);
        let role = LazyRole::new(GuildId::new(1), RoleId::new(50));
        giveaway.set_required_role(Some(role)).unwrap();

        assert_eq!(
            giveaway.toggle_entry(UserId::new(10), &[RoleId::new(49)], now),
            Err(ActivityError::MissingRequiredRole(RoleId::new(50)))
        );
        assert_eq!(
            giveaway.toggle_entry(UserId::new(10), &[RoleId::new(50)], now),
            Ok(EntryToggle::Entered)
        );
    }

    #[test]
    fn entries_close_at_end_time() {
        let now = Utc::now();
        let mut giveaway = running(now);
        assert_eq!(
            giveaway.toggle_entry(UserId::new(10), &[], now + Duration::hours(2)),
            Err(ActivityError::NotAcceptingEntries)
        );
    }

    #[test]
    fn draft_giveaway_rejects_entries() {
        let now = Utc::now();
        let mut giveaway =
            Giveaway::new(GuildId::new(1), UserId::new(2), "Draft", "Prize", now).unwrap();
        assert_eq!(
            giveaway.toggle_entry(UserId::new(10), &[], now),
            Err(ActivityError::NotAcceptingEntries)
        );
    }

    #[test]
    fn wire_format_is_flat() {
        let now = Utc::now();
        let mut giveaway = running(now);
        giveaway.details.id = 12;
        giveaway.toggle_entry(UserId::new(10), &[], now).unwrap();

        let value = serde_json::to_value(&giveaway).unwrap();
        assert_eq!(value["id"], 12);
        assert_eq!(value["status"], "active");
        assert_eq!(value["entries"][0]["user_id"], "10");

        let back: Giveaway = serde_json::from_value(value).unwrap();
        assert_eq!(back, giveaway);
        assert_eq!(giveaway.item_path().unwrap(), "guilds/1/giveaways/12");
    }
}
