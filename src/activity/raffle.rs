use crate::activity::{
    Activity, ActivityDetails, ActivityError, ActivityKind, ActivityManager, ActivityStatus,
    EntryManager,
};
use crate::api::{assigned_key, KeyKind, Resource};
use crate::guild::GuildData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::all::{GuildId, UserId};

/// A raffle where each ticket is one weighted entry. Paid tickets are recorded
/// by staff; free raffles let members claim a single ticket themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raffle {
    #[serde(flatten)]
    pub details: ActivityDetails,
    #[serde(default)]
    pub entries: EntryManager,
    #[serde(default)]
    pub ticket_cost: u64,
    #[serde(default)]
    pub max_tickets_per_user: Option<u32>,
}

impl Raffle {
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
            ticket_cost: 0,
            max_tickets_per_user: None,
        })
    }

    pub fn is_free(&self) -> bool {
        self.ticket_cost == 0
    }

    /// Ticket pricing can't change once tickets may have been sold.
    pub fn set_ticket_cost(&mut self, cost: u64) -> Result<(), ActivityError> {
        if self.details.status != ActivityStatus::Draft {
            return Err(ActivityError::InvalidState {
                action: "change the ticket price",
                status: self.details.status,
            });
        }
        self.ticket_cost = cost;
        Ok(())
    }

    pub fn set_max_tickets(&mut self, max: Option<u32>) -> Result<(), ActivityError> {
        if !self.details.is_open() {
            return Err(ActivityError::InvalidState {
                action: "change the ticket cap",
                status: self.details.status,
            });
        }
        if max == Some(0) {
            return Err(ActivityError::InvalidQuantity);
        }
        self.max_tickets_per_user = max;
        Ok(())
    }

    /// Records tickets bought from staff. Returns the user's new total.
    pub fn add_tickets(
        &mut self,
        user_id: UserId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<u32, ActivityError> {
        if quantity == 0 {
            return Err(ActivityError::InvalidQuantity);
        }
        if !self.details.accepting_entries(now) {
            return Err(ActivityError::NotAcceptingEntries);
        }
        let held = self.entries.quantity_of(user_id);
        if let Some(max) = self.max_tickets_per_user {
            if held.saturating_add(quantity) > max {
                return Err(ActivityError::TicketLimit { max, held });
            }
        }
        Ok(self.entries.add(user_id, quantity, now))
    }

    /// Staff correction; returns what the user has left.
    pub fn remove_tickets(&mut self, user_id: UserId, quantity: u32) -> Result<u32, ActivityError> {
        if quantity == 0 {
            return Err(ActivityError::InvalidQuantity);
        }
        if !self.details.is_open() {
            return Err(ActivityError::InvalidState {
                action: "remove tickets",
                status: self.details.status,
            });
        }
        self.entries
            .subtract(user_id, quantity)
            .ok_or(ActivityError::NotEntered(user_id))
    }

    pub fn claim_free_ticket(&mut self, user_id: UserId, now: DateTime<Utc>) -> Result<u32, ActivityError> {
        if !self.is_free() {
            return Err(ActivityError::PaidTickets);
        }
        if !self.details.accepting_entries(now) {
            return Err(ActivityError::NotAcceptingEntries);
        }
        if self.entries.contains(user_id) {
            return Err(ActivityError::AlreadyEntered);
        }
        Ok(self.entries.add(user_id, 1, now))
    }

    pub fn pot(&self) -> u64 {
        self.ticket_cost.saturating_mul(self.entries.total_weight())
    }
}

impl Resource for Raffle {
    const COLLECTION: &'static str = "raffles";
    const KEY_KIND: KeyKind = KeyKind::Assigned;

    fn guild_id(&self) -> GuildId {
        self.details.guild_id
    }

    fn key(&self) -> Option<String> {
        assigned_key(self.details.id)
    }
}

impl Activity for Raffle {
    const KIND: ActivityKind = ActivityKind::Raffle;

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
        let mut fields = vec![
            ("Participants", self.entries.len().to_string()),
            ("Tickets", self.entries.total_weight().to_string()),
        ];
        if self.is_free() {
            fields.push(("Ticket price", "Free (one per person)".to_string()));
        } else {
            fields.push(("Ticket price", self.ticket_cost.to_string()));
            fields.push(("Pot", self.pot().to_string()));
        }
        if let Some(max) = self.max_tickets_per_user {
            fields.push(("Max per person", max.to_string()));
        }
        fields
    }

    fn manager(guild: &GuildData) -> &ActivityManager<Self> {
        &guild.raffles
    }

    fn manager_mut(guild: &mut GuildData) -> &mut ActivityManager<Self> {
        &mut guild.raffles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActivityDefaults;
    use crate::lazy::LazyChannel;
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serenity::all::ChannelId;

    fn running(now: DateTime<Utc>, cost: u64) -> Raffle {
        let mut raffle =
            Raffle::new(GuildId::new(1), UserId::new(2), "Weekly raffle", "Housing plot", now)
                .unwrap();
        raffle.set_ticket_cost(cost).unwrap();
        raffle
            .details
            .set_channel(LazyChannel(ChannelId::new(3)))
            .unwrap();
        raffle
            .details
            .set_end_time(now + Duration::days(1), now, &ActivityDefaults::default())
            .unwrap();
        raffle.details.start(now).unwrap();
        raffle
    }

    #[test]
    fn ticket_cap_counts_existing_tickets() {
        let now = Utc::now();
        let mut raffle = running(now, 100_000);
        raffle.set_max_tickets(Some(5)).unwrap();
        let user = UserId::new(10);

        assert_eq!(raffle.add_tickets(user, 3, now), Ok(3));
        assert_eq!(
            raffle.add_tickets(user, 3, now),
            Err(ActivityError::TicketLimit { max: 5, held: 3 })
        );
        assert_eq!(raffle.add_tickets(user, 2, now), Ok(5));
        assert_eq!(raffle.pot(), 500_000);
    }

    #[test]
    fn remove_tickets_drops_entry_at_zero() {
        let now = Utc::now();
        let mut raffle = running(now, 10);
        let user = UserId::new(10);
        raffle.add_tickets(user, 2, now).unwrap();

        assert_eq!(raffle.remove_tickets(user, 1), Ok(1));
        assert_eq!(raffle.remove_tickets(user, 1), Ok(0));
        assert_eq!(
            raffle.remove_tickets(user, 1),
            Err(ActivityError::NotEntered(user))
        );
    }

    #[test]
    fn free_raffle_gives_one_ticket() {
        let now = Utc::now();
        let mut raffle = running(now, 0);
        let user = UserId::new(10);

        assert_eq!(raffle.claim_free_ticket(user, now), Ok(1));
        assert_eq!(
            raffle.claim_free_ticket(user, now),
            Err(ActivityError::AlreadyEntered)
        );
    }

    #[test]
    fn paid_raffle_refuses_free_claims() {
        let now = Utc::now();
        let mut raffle = running(now, 50);
        assert_eq!(
            raffle.claim_free_ticket(UserId::new(10), now),
            Err(ActivityError::PaidTickets)
        );
    }

    #[test]
    fn price_is_locked_after_start() {
        let now = Utc::now();
        let mut raffle = running(now, 50);
        assert!(matches!(
            raffle.set_ticket_cost(10),
            Err(ActivityError::InvalidState { .. })
        ));
    }

    #[test]
    fn conclude_draws_distinct_ticket_holders() {
        let now = Utc::now();
        let mut raffle = running(now, 1);
        raffle.details.set_winner_count(2).unwrap();
        raffle.add_tickets(UserId::new(10), 40, now).unwrap();
        raffle.add_tickets(UserId::new(11), 1, now).unwrap();
        let mut rng = StdRng::seed_from_u64(11);

        let winners = raffle.conclude(now, &mut rng).unwrap();
        assert_eq!(winners.len(), 2);
        assert!(winners.contains(&UserId::new(10)));
        assert!(winners.contains(&UserId::new(11)));
        assert_eq!(
            raffle.add_tickets(UserId::new(12), 1, now),
            Err(ActivityError::NotAcceptingEntries)
        );
    }
}
