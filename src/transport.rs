use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{tcp::OwnedWriteHalf, TcpStream},
    sync::mpsc::UnboundedSender,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::normalize_channel,
    events::{generate_id, AlertKind, BadgeFlags, ChatEvent, EventKind},
    protocol::{IncomingMessage, TransportEvent},
};

const TWITCH_IRC_HOST: &str = "irc.chat.twitch.tv";
const TWITCH_IRC_PORT: u16 = 6667;
const ANONYMOUS_USERNAME: &str = "Anonymous";

#[derive(Debug, Clone)]
pub struct TwitchTransportConfig {
    pub channel: String,
    pub session: u64,
}

/// Runs one anonymous IRC session for the configured channel. The task ends on
/// disconnect; reconnecting is left to whoever applies the next settings.
pub fn spawn_twitch_transport(
    config: TwitchTransportConfig,
    tx: UnboundedSender<IncomingMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_twitch_transport(config, tx).await;
    })
}

async fn run_twitch_transport(config: TwitchTransportConfig, tx: UnboundedSender<IncomingMessage>) {
    let channel = normalize_channel(&config.channel);
    let session = config.session;
    let emit = |event: TransportEvent| tx.send(IncomingMessage { session, event }).is_ok();
    if channel.is_empty() {
        warn!("twitch transport started without a channel");
        emit(TransportEvent::Disconnected {
            reason: "channel is empty".to_owned(),
        });
        return;
    }

    info!(channel = %channel, session, "connecting to twitch chat");
    let reason = match TcpStream::connect((TWITCH_IRC_HOST, TWITCH_IRC_PORT)).await {
        Ok(stream) => match run_twitch_session(stream, &channel, session, &tx).await {
            Ok(()) => "connection closed".to_owned(),
            Err(err) => {
                warn!(?err, channel = %channel, "twitch session ended with error");
                err.to_string()
            }
        },
        Err(err) => {
            warn!(?err, channel = %channel, "twitch transport failed to connect");
            format!("connect failed: {err}")
        }
    };
    emit(TransportEvent::Disconnected { reason });
}

async fn run_twitch_session(
    stream: TcpStream,
    channel: &str,
    session: u64,
    tx: &UnboundedSender<IncomingMessage>,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let nick = random_justinfan_nick();
    write_line(&mut write_half, "CAP REQ :twitch.tv/tags twitch.tv/commands").await?;
    write_line(&mut write_half, "PASS oauth:kappa").await?;
    write_line(&mut write_half, &format!("NICK {nick}")).await?;
    write_line(&mut write_half, &format!("JOIN #{channel}")).await?;

    let mut lines = BufReader::new(read_half).lines();
    let mut joined = false;
    while let Some(line) = lines.next_line().await.context("failed reading from twitch irc")? {
        let line = line.trim_end_matches('\r');
        if let Some(token) = line.strip_prefix("PING ") {
            write_line(&mut write_half, &format!("PONG {token}")).await?;
            continue;
        }
        if !joined && is_join_confirmation(line, channel) {
            joined = true;
            info!(channel = %channel, nick = %nick, "joined twitch channel");
            if tx
                .send(IncomingMessage {
                    session,
                    event: TransportEvent::Connected {
                        channel: channel.to_owned(),
                    },
                })
                .is_err()
            {
                return Ok(());
            }
            continue;
        }
        let Some(event) = parse_chat_line(line, channel) else {
            continue;
        };
        if tx.send(IncomingMessage::chat(session, event)).is_err() {
            warn!("pipeline intake dropped; stopping twitch transport");
            return Ok(());
        }
    }
    Ok(())
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    Ok(())
}

fn is_join_confirmation(line: &str, channel: &str) -> bool {
    let (_, payload) = parse_irc_tags(line);
    let mut parts = payload.split(' ');
    let (Some(prefix), Some(command), Some(target)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let own_join = prefix.starts_with(":justinfan") && command == "JOIN";
    (own_join || command == "ROOMSTATE") && normalize_channel(target) == channel
}

/// Converts a `PRIVMSG` or subscription `USERNOTICE` line for `expected_channel`
/// into a chat event. Every other line yields `None`.
pub fn parse_chat_line(line: &str, expected_channel: &str) -> Option<ChatEvent> {
    let (tags, payload) = parse_irc_tags(line);
    let mut parts = payload.splitn(4, ' ');
    let prefix = parts.next()?;
    let command = parts.next()?;
    let target = parts.next()?;
    let trailing = parts.next().unwrap_or_default();

    if !prefix.starts_with(':') || normalize_channel(target) != expected_channel {
        return None;
    }
    let is_sub_notice = matches!(
        tags.get("msg-id").map(String::as_str),
        Some("sub") | Some("resub")
    );
    let text = trailing.strip_prefix(':').unwrap_or(trailing).trim();
    let text = match command {
        "PRIVMSG" if !text.is_empty() => text.to_owned(),
        "USERNOTICE" if is_sub_notice => {
            if text.is_empty() {
                tags.get("system-msg").cloned().unwrap_or_default()
            } else {
                text.to_owned()
            }
        }
        _ => return None,
    };

    let login = tags
        .get("login")
        .filter(|value| !value.is_empty())
        .cloned()
        .or_else(|| {
            prefix[1..]
                .split('!')
                .next()
                .map(|nick| nick.trim().to_owned())
                .filter(|nick| !nick.is_empty() && !nick.contains('.'))
        });
    let username = tags
        .get("display-name")
        .filter(|value| !value.is_empty())
        .cloned()
        .or(login)
        .unwrap_or_else(|| ANONYMOUS_USERNAME.to_owned());

    let badges = parse_badges(tags.get("badges").map(String::as_str).unwrap_or_default());
    let flags = BadgeFlags::from_badges(
        &badges,
        tag_is_set(&tags, "mod"),
        tag_is_set(&tags, "subscriber"),
    );
    let timestamp_millis = tags
        .get("tmi-sent-ts")
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or_else(|| Utc::now().timestamp_millis());
    let id = tags
        .get("id")
        .filter(|value| !value.is_empty())
        .cloned()
        .unwrap_or_else(|| generate_id(&mut rand::thread_rng()));

    debug!(id = %id, user = %username, alert = is_sub_notice, "parsed chat line");
    Some(ChatEvent {
        id,
        username,
        text,
        color: tags.get("color").and_then(|value| normalize_twitch_color(value)),
        flags,
        badges,
        timestamp_millis,
        kind: if is_sub_notice {
            EventKind::Alert
        } else {
            EventKind::Message
        },
        alert_kind: is_sub_notice.then_some(AlertKind::Sub),
        pronouns: None,
        avatar_url: None,
    })
}

fn tag_is_set(tags: &HashMap<String, String>, key: &str) -> bool {
    tags.get(key).map(String::as_str) == Some("1")
}

/// `broadcaster/1,subscriber/12` into a name → version map.
fn parse_badges(value: &str) -> BTreeMap<String, String> {
    value
        .split(',')
        .filter_map(|badge| {
            let (name, version) = badge.split_once('/')?;
            (!name.is_empty()).then(|| (name.to_owned(), version.to_owned()))
        })
        .collect()
}

fn normalize_twitch_color(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.len() != 7 || !trimmed.starts_with('#') {
        return None;
    }
    if !trimmed[1..].chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(trimmed.to_ascii_uppercase())
}

fn parse_irc_tags(line: &str) -> (HashMap<String, String>, &str) {
    let Some(stripped) = line.strip_prefix('@') else {
        return (HashMap::new(), line);
    };
    let Some((tags_part, payload)) = stripped.split_once(' ') else {
        return (HashMap::new(), line);
    };

    let tags = tags_part
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_owned(), decode_irc_tag_value(value)))
        .collect();
    (tags, payload)
}

fn decode_irc_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some(':') => out.push(';'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn random_justinfan_nick() -> String {
    format!("justinfan{}", rand::thread_rng().gen_range(10_000..100_000))
}

#[cfg(test)]
mod tests {
    use super::{decode_irc_tag_value, is_join_confirmation, parse_badges, parse_chat_line};
    use crate::events::{AlertKind, EventKind};

    #[test]
    fn parses_privmsg_with_tags() {
        let line = "@badges=broadcaster/1,subscriber/12;color=#1e90ff;display-name=Ahorn;id=abc-123;mod=1;subscriber=1;tmi-sent-ts=1700000000123 :ahorn!ahorn@ahorn.tmi.twitch.tv PRIVMSG #HornGaming :hello world";
        let event = parse_chat_line(line, "horngaming").expect("expected parse");
        assert_eq!(event.id, "abc-123");
        assert_eq!(event.username, "Ahorn");
        assert_eq!(event.text, "hello world");
        assert_eq!(event.color.as_deref(), Some("#1E90FF"));
        assert_eq!(event.timestamp_millis, 1_700_000_000_123);
        assert_eq!(event.kind, EventKind::Message);
        assert!(event.flags.is_mod);
        assert!(event.flags.is_subscriber);
        assert!(event.flags.is_broadcaster);
        assert!(!event.flags.is_vip);
        assert_eq!(event.badges.get("subscriber").map(String::as_str), Some("12"));
    }

    #[test]
    fn falls_back_to_login_and_generated_id() {
        let line = ":retrogamer!retrogamer@retrogamer.tmi.twitch.tv PRIVMSG #chan :yo";
        let event = parse_chat_line(line, "chan").expect("expected parse");
        assert_eq!(event.username, "retrogamer");
        assert_eq!(event.id.len(), 9);
        assert!(event.color.is_none());
        assert!(event.timestamp_millis > 0);
    }

    #[test]
    fn sub_marker_classifies_alert() {
        let line = "@display-name=GlitchQueen;msg-id=resub :glitchqueen!glitchqueen@glitchqueen.tmi.twitch.tv PRIVMSG #chan :12 months!";
        let event = parse_chat_line(line, "chan").expect("expected parse");
        assert_eq!(event.kind, EventKind::Alert);
        assert_eq!(event.alert_kind, Some(AlertKind::Sub));
    }

    #[test]
    fn subscription_usernotice_uses_system_message_when_silent() {
        let line = "@display-name=NeonHacker;login=neonhacker;msg-id=sub;system-msg=NeonHacker\\ssubscribed\\sat\\sTier\\s1. :tmi.twitch.tv USERNOTICE #chan";
        let event = parse_chat_line(line, "chan").expect("expected parse");
        assert_eq!(event.kind, EventKind::Alert);
        assert_eq!(event.username, "NeonHacker");
        assert_eq!(event.text, "NeonHacker subscribed at Tier 1.");
    }

    #[test]
    fn ignores_other_notices_channels_and_commands() {
        let raid = "@msg-id=raid;login=raider :tmi.twitch.tv USERNOTICE #chan";
        assert!(parse_chat_line(raid, "chan").is_none());
        let other = ":foo!foo@foo.tmi.twitch.tv PRIVMSG #other :hello";
        assert!(parse_chat_line(other, "chan").is_none());
        let roomstate = "@emote-only=0 :tmi.twitch.tv ROOMSTATE #chan";
        assert!(parse_chat_line(roomstate, "chan").is_none());
        let empty = ":foo!foo@foo.tmi.twitch.tv PRIVMSG #chan :   ";
        assert!(parse_chat_line(empty, "chan").is_none());
    }

    #[test]
    fn drops_invalid_colors() {
        let line = "@display-name=Ahorn;color=nothex :ahorn!ahorn@ahorn.tmi.twitch.tv PRIVMSG #chan :hello";
        let event = parse_chat_line(line, "chan").expect("expected parse");
        assert!(event.color.is_none());
    }

    #[test]
    fn recognizes_join_confirmation() {
        let line = ":justinfan12345!justinfan12345@justinfan12345.tmi.twitch.tv JOIN #shroud";
        assert!(is_join_confirmation(line, "shroud"));
        assert!(!is_join_confirmation(line, "other"));
        let roomstate = "@emote-only=0;room-id=1 :tmi.twitch.tv ROOMSTATE #shroud";
        assert!(is_join_confirmation(roomstate, "shroud"));
        let privmsg = ":viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #shroud :hi";
        assert!(!is_join_confirmation(privmsg, "shroud"));
    }

    #[test]
    fn decodes_irc_tag_escapes() {
        assert_eq!(decode_irc_tag_value("A\\sB\\:C\\\\D"), "A B;C\\D".to_owned());
    }

    #[test]
    fn parses_badge_lists() {
        let badges = parse_badges("vip/1,subscriber/3,");
        assert_eq!(badges.len(), 2);
        assert_eq!(badges.get("vip").map(String::as_str), Some("1"));
        assert!(parse_badges("").is_empty());
    }
}
