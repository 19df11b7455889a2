use std::collections::BTreeMap;

use chrono::Utc;
use rand::{seq::SliceRandom, Rng};

use crate::{
    events::{generate_id, AlertKind, BadgeFlags, ChatEvent, EventKind},
    identity::fallback_avatar_url,
};

const DEMO_USERS: &[&str] = &["NeonHacker", "CyberPunk99", "GlitchQueen", "RetroGamer"];
const DEMO_TEXTS: &[&str] = &[
    "Wow this overlay is sick!",
    "Can you play some synthwave?",
    "PogChamp PogChamp",
    "Is this Windows 95??",
    "ERROR 404: Chill vibes not found.",
    "Alert: Coolness overload.",
];
const DEMO_PRONOUNS: &[&str] = &["He/Him", "She/Her", "They/Them"];

/// Synthetic chat event for previewing the overlay without a channel. Avatar
/// and pronouns come pre-attached so demo traffic never reaches the lookups.
pub fn demo_event<R: Rng + ?Sized>(rng: &mut R) -> ChatEvent {
    let username = DEMO_USERS.choose(rng).copied().unwrap_or("NeonHacker");
    let text = DEMO_TEXTS.choose(rng).copied().unwrap_or_default();

    let mut badges = BTreeMap::new();
    if rng.gen_bool(0.3) {
        badges.insert("subscriber".to_owned(), "1".to_owned());
    }
    if rng.gen_bool(0.1) {
        badges.insert("broadcaster".to_owned(), "1".to_owned());
    }
    if rng.gen_bool(0.2) {
        badges.insert("vip".to_owned(), "1".to_owned());
    }
    let flags = BadgeFlags::from_badges(&badges, false, badges.contains_key("subscriber"));
    let kind = if rng.gen_bool(0.1) {
        EventKind::Alert
    } else {
        EventKind::Message
    };

    ChatEvent {
        id: generate_id(rng),
        username: username.to_owned(),
        text: text.to_owned(),
        color: Some(format!("#{:06x}", rng.gen_range(0..0x00ff_ffffu32))),
        flags,
        badges,
        timestamp_millis: Utc::now().timestamp_millis(),
        kind,
        alert_kind: (kind == EventKind::Alert).then_some(AlertKind::Sub),
        pronouns: DEMO_PRONOUNS.choose(rng).map(|value| (*value).to_owned()),
        avatar_url: Some(fallback_avatar_url(username)),
    }
}
