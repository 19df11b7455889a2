use std::collections::BTreeMap;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const SYSTEM_USERNAME: &str = "System";
pub const SYSTEM_AVATAR_URL: &str = "https://api.dicebear.com/7.x/bottts/svg?seed=system";

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Alert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Sub,
    Follow,
    Raid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeFlags {
    pub is_mod: bool,
    pub is_subscriber: bool,
    pub is_broadcaster: bool,
    pub is_vip: bool,
}

impl BadgeFlags {
    /// Derives broadcaster/vip from the raw badge map; the mod and subscriber
    /// flags come from their own tags and are passed through.
    pub fn from_badges(badges: &BTreeMap<String, String>, is_mod: bool, is_subscriber: bool) -> Self {
        Self {
            is_mod,
            is_subscriber,
            is_broadcaster: badges.get("broadcaster").map(String::as_str) == Some("1"),
            is_vip: badges.get("vip").map(String::as_str) == Some("1"),
        }
    }
}

/// One raw chat event as produced by the transport or the demo generator.
///
/// `pronouns` and `avatar_url` are only set when the source already knows them;
/// the pipeline skips the matching lookup in that case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    pub id: String,
    pub username: String,
    #[serde(rename = "message")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(flatten)]
    pub flags: BadgeFlags,
    #[serde(default)]
    pub badges: BTreeMap<String, String>,
    #[serde(rename = "timestamp")]
    pub timestamp_millis: i64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, rename = "alertType", skip_serializing_if = "Option::is_none")]
    pub alert_kind: Option<AlertKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronouns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ChatEvent {
    pub fn message(id: impl Into<String>, username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            text: text.into(),
            color: None,
            flags: BadgeFlags::default(),
            badges: BTreeMap::new(),
            timestamp_millis: Utc::now().timestamp_millis(),
            kind: EventKind::Message,
            alert_kind: None,
            pronouns: None,
            avatar_url: None,
        }
    }

    /// Notice admitted once the transport has joined a channel.
    pub fn connected_notice(channel: &str, id: String) -> Self {
        Self {
            kind: EventKind::Alert,
            avatar_url: Some(SYSTEM_AVATAR_URL.to_owned()),
            ..Self::message(
                id,
                SYSTEM_USERNAME,
                format!("Connected to #{channel}... Protocol Y2K Initiated."),
            )
        }
    }

    pub fn is_alert(&self) -> bool {
        self.kind == EventKind::Alert
    }

    pub fn is_system(&self) -> bool {
        self.username == SYSTEM_USERNAME
    }

    pub fn age_millis(&self, now_millis: i64) -> i64 {
        now_millis.saturating_sub(self.timestamp_millis)
    }
}

/// A live, display-ready message. Everything but the event is assigned once,
/// at admission, and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedMessage {
    #[serde(flatten)]
    pub event: ChatEvent,
    pub sequence_number: u64,
    pub display_x: f32,
    pub display_y: f32,
    pub display_rotation: f32,
}

impl EnrichedMessage {
    /// Every fifth message gets the highlighted card treatment.
    pub fn is_special(&self) -> bool {
        self.sequence_number > 0 && self.sequence_number % 5 == 0
    }
}

pub fn generate_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ID_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}
