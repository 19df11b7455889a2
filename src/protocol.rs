use serde::{Deserialize, Serialize};

use crate::events::{ChatEvent, EnrichedMessage};

/// What a transport reports into the pipeline's intake channel.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected { channel: String },
    Disconnected { reason: String },
    Chat(ChatEvent),
}

/// Intake envelope. `session` identifies the channel connection that produced
/// the event; intake from an ended session is dropped.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub session: u64,
    pub event: TransportEvent,
}

impl IncomingMessage {
    pub fn chat(session: u64, event: ChatEvent) -> Self {
        Self {
            session,
            event: TransportEvent::Chat(event),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionState {
    pub connected: bool,
    pub channel: Option<String>,
    pub status: String,
}

impl ConnectionState {
    pub fn idle() -> Self {
        Self {
            connected: false,
            channel: None,
            status: "IDLE: no channel configured".to_owned(),
        }
    }
}

/// Published to the presentation layer after every change it should redraw for.
#[derive(Debug, Clone)]
pub enum PipelineUpdate {
    Messages(Vec<EnrichedMessage>),
    Connection(ConnectionState),
}
