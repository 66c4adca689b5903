//! Background sweep over the loaded guilds: ends activities whose time is up
//! and lapses expired VIP memberships.

use crate::activity::giveaway::Giveaway;
use crate::activity::lifecycle;
use crate::activity::raffle::Raffle;
use crate::activity::Activity;
use crate::api::ApiClient;
use crate::config::ActivityDefaults;
use crate::forms::FormSessions;
use crate::guild::{log_event, GuildHandle, GuildRegistry};
use crate::vip::VipMember;
use chrono::{DateTime, Utc};
use serenity::all::{CreateEmbed, CreateMessage, GuildId};
use serenity::http::Http;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const EXPIRED_COLOR: u32 = 0xE67E22;

pub struct Scheduler {
    http: Arc<Http>,
    api: Arc<ApiClient>,
    guilds: Arc<GuildRegistry>,
    form_sessions: Arc<FormSessions>,
    defaults: ActivityDefaults,
    poll_interval: Duration,
}

/// What one sweep did. A failed item is counted and skipped; the rest of the sweep carries on.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub concluded: usize,
    pub expired: usize,
    pub failed: usize,
}

impl Scheduler {
    pub fn new(
        http: Arc<Http>,
        api: Arc<ApiClient>,
        guilds: Arc<GuildRegistry>,
        form_sessions: Arc<FormSessions>,
        defaults: ActivityDefaults,
        poll_interval_secs: u64,
    ) -> Self {
        Self {
            http,
            api,
            guilds,
            form_sessions,
            defaults,
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Scheduler running every {:?}", self.poll_interval);
        loop {
            ticker.tick().await;
            self.sweep(Utc::now()).await;
        }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        for (guild_id, guild) in self.guilds.loaded().await {
            self.conclude_due::<Giveaway>(guild_id, &guild, now, &mut report)
                .await;
            self.conclude_due::<Raffle>(guild_id, &guild, now, &mut report)
                .await;
            self.expire_vips(guild_id, &guild, now, &mut report).await;
        }
        let pruned = self.form_sessions.prune(now);

        if report != SweepReport::default() || pruned > 0 {
            info!(
                "Scheduler sweep: {} activit{} ended, {} VIP(s) expired, {} failure(s), {} stale form session(s) dropped",
                report.concluded,
                if report.concluded == 1 { "y" } else { "ies" },
                report.expired,
                report.failed,
                pruned
            );
        }
        report
    }

    async fn conclude_due<A: Activity>(
        &self,
        guild_id: GuildId,
        guild: &GuildHandle,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) {
        let due = A::manager(&*guild.lock().await).due(now);
        for id in due {
            debug!("Scheduler: {} {} in guild {} is due", A::KIND, id, guild_id);
            match lifecycle::conclude::<A>(&self.http, &self.api, guild, id, &self.defaults).await {
                Ok(_) => report.concluded += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(
                        "Scheduler: failed to end {} {} in guild {}: {}",
                        A::KIND,
                        id,
                        guild_id,
                        e
                    );
                }
            }
        }
    }

    async fn expire_vips(
        &self,
        guild_id: GuildId,
        guild: &GuildHandle,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) {
        let expired = guild.lock().await.vip.expired(now);
        for member in expired {
            match self.expire_vip(guild, &member, now).await {
                Ok(true) => report.expired += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    error!(
                        "Scheduler: failed to expire VIP {} in guild {}: {:#}",
                        member.user.id(),
                        guild_id,
                        e
                    );
                }
            }
        }
    }

    /// Returns `false` if the membership was renewed since it was listed.
    async fn expire_vip(
        &self,
        guild: &GuildHandle,
        member: &VipMember,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let user_id = member.user.id();
        let (tier, settings) = {
            let mut guild = guild.lock().await;
            if !guild
                .vip
                .member(user_id)
                .is_some_and(|m| m.is_expired(now))
            {
                return Ok(false);
            }
            let removed = guild.vip.revoke(user_id)?;
            let tier = guild.vip.tier(removed.tier_id).ok().cloned();
            (tier, guild.settings.clone())
        };

        if let Err(e) = self.api.delete_resource(member).await {
            guild.lock().await.vip.put_member(member.clone());
            return Err(e.into());
        }

        let tier_name = tier
            .as_ref()
            .map(|t| t.name.clone())
            .unwrap_or_else(|| "VIP".to_string());
        if let Some(role) = tier.as_ref().and_then(|t| t.role) {
            if let Err(e) = role.revoke(&self.http, user_id, "VIP membership expired").await {
                warn!("Failed to remove VIP role {} from {}: {}", role.id(), user_id, e);
            }
        }

        let dm = CreateMessage::new().content(format!(
            "Your **{}** membership has expired. Thanks for your support! Ask staff if you'd like to renew.",
            tier_name
        ));
        if let Err(e) = user_id.direct_message(&*self.http, dm).await {
            debug!("Couldn't DM {} about their VIP expiring: {}", user_id, e);
        }

        info!(
            "VIP {} for {} in guild {} expired",
            tier_name, user_id, member.guild_id
        );
        log_event(
            &self.http,
            &settings,
            CreateEmbed::new()
                .title("VIP expired")
                .description(format!("{} · **{}**", member.user.mention(), tier_name))
                .color(EXPIRED_COLOR),
        )
        .await;
        Ok(true)
    }
}
