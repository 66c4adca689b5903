//! One scheduler sweep over a guild loaded from the stub API.

mod common;

use chrono::{Duration, Utc};
use common::{client, discord, login_response, spawn_stub};
use serenity::all::{ChannelId, GuildId, UserId};
use stagehand::activity::{ActivityStatus, Giveaway};
use stagehand::config::ActivityDefaults;
use stagehand::forms::FormSessions;
use stagehand::guild::{GuildRegistry, GuildSettings, GuildSnapshot};
use stagehand::lazy::LazyChannel;
use stagehand::scheduler::Scheduler;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

fn due_giveaway(id: u64) -> Giveaway {
    let now = Utc::now();
    let mut giveaway =
        Giveaway::new(GuildId::new(1), UserId::new(2), "Raffle night", "Drinks", now).unwrap();
    giveaway.details.id = id;
    giveaway
        .details
        .set_channel(LazyChannel(ChannelId::new(3)))
        .unwrap();
    giveaway
        .details
        .set_end_time(now + Duration::hours(1), now, &ActivityDefaults::default())
        .unwrap();
    giveaway.details.start(now).unwrap();
    giveaway.details.channel = None;
    giveaway.details.ends_at = Some(now - Duration::minutes(1));
    giveaway
}

fn snapshot() -> String {
    let snapshot = GuildSnapshot {
        settings: GuildSettings::new(GuildId::new(1)),
        giveaways: vec![due_giveaway(7), due_giveaway(8)],
        raffles: Vec::new(),
        staff_positions: Vec::new(),
        staff_members: Vec::new(),
        vip_tiers: Vec::new(),
        vip_members: Vec::new(),
        forms: Vec::new(),
        embeds: Vec::new(),
        reaction_roles: Vec::new(),
    };
    serde_json::to_string(&snapshot).unwrap()
}

#[tokio::test]
async fn sweep_carries_on_past_a_failed_activity() {
    let logins = Arc::new(AtomicUsize::new(0));
    let broken = Arc::new(AtomicBool::new(true));
    let outage = broken.clone();
    let body = snapshot();
    let base = spawn_stub(move |req| match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/auth/login") => login_response(&logins),
        ("GET", "/guilds/1") => (200, body.clone()),
        ("PUT", "/guilds/1/giveaways/7") if outage.load(Ordering::SeqCst) => {
            (500, String::new())
        }
        ("PUT", _) => (200, String::new()),
        _ => (500, String::new()),
    })
    .await;

    let api = Arc::new(client(&base));
    let guilds = Arc::new(GuildRegistry::new(api.clone()));
    let guild = guilds.get(GuildId::new(1)).await.unwrap();
    let scheduler = Scheduler::new(
        Arc::new(discord(&base)),
        api,
        guilds,
        Arc::new(FormSessions::new()),
        ActivityDefaults::default(),
        60,
    );

    let report = scheduler.sweep(Utc::now()).await;
    assert_eq!(report.concluded, 1);
    assert_eq!(report.failed, 1);
    {
        let guild = guild.lock().await;
        let status = |id| guild.giveaways.get(id).unwrap().details.status;
        assert_eq!(status(7), ActivityStatus::Active);
        assert_eq!(status(8), ActivityStatus::Ended);
    }

    // The failed one is picked up again once the API recovers.
    broken.store(false, Ordering::SeqCst);
    let report = scheduler.sweep(Utc::now()).await;
    assert_eq!(report.concluded, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(
        guild.lock().await.giveaways.get(7).unwrap().details.status,
        ActivityStatus::Ended
    );
}
