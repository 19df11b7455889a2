use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
    },
    time::Duration,
};

use chrono::Utc;
use crossbeam_channel::Sender;
use rand::{rngs::StdRng, SeedableRng};
use tokio::{sync::mpsc, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::{
    events::{generate_id, ChatEvent, EnrichedMessage},
    identity::IdentityResolver,
    position::{assign_card_position, Viewport},
    protocol::{ConnectionState, IncomingMessage, PipelineUpdate, TransportEvent},
};

pub const RETENTION_SWEEP_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub max_messages: usize,
    pub message_timeout: Duration,
    pub show_pronouns: bool,
    pub show_avatars: bool,
    pub viewport: Viewport,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_messages: 10,
            message_timeout: Duration::from_secs(30),
            show_pronouns: true,
            show_avatars: true,
            viewport: Viewport::default(),
        }
    }
}

struct LiveState {
    messages: VecDeque<EnrichedMessage>,
    last_sequence: u64,
    connection: ConnectionState,
    rng: StdRng,
}

struct PipelineInner {
    resolver: IdentityResolver,
    settings: RwLock<PipelineSettings>,
    live: Mutex<LiveState>,
    session: AtomicU64,
    updates: Sender<PipelineUpdate>,
}

/// Turns chat events into the bounded, time-decaying list of live messages.
///
/// Enrichment runs outside the lock. Sequence numbering, positioning, append,
/// capacity eviction, expiry and session changes all happen under the same
/// mutex, so every mutation is atomic with respect to the others and each
/// published snapshot respects `max_messages`.
#[derive(Clone)]
pub struct MessagePipeline {
    inner: Arc<PipelineInner>,
}

impl MessagePipeline {
    pub fn new(
        resolver: IdentityResolver,
        settings: PipelineSettings,
        updates: Sender<PipelineUpdate>,
    ) -> Self {
        Self::with_rng(resolver, settings, updates, StdRng::from_entropy())
    }

    pub fn with_rng(
        resolver: IdentityResolver,
        settings: PipelineSettings,
        updates: Sender<PipelineUpdate>,
        rng: StdRng,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                resolver,
                settings: RwLock::new(settings),
                live: Mutex::new(LiveState {
                    messages: VecDeque::new(),
                    last_sequence: 0,
                    connection: ConnectionState::idle(),
                    rng,
                }),
                session: AtomicU64::new(0),
                updates,
            }),
        }
    }

    pub fn settings(&self) -> PipelineSettings {
        self.inner
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// New limits and toggles apply from the next admission or sweep on.
    pub fn apply_settings(&self, settings: PipelineSettings) {
        *self
            .inner
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
    }

    pub fn session(&self) -> u64 {
        self.inner.session.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<EnrichedMessage> {
        self.lock_live().messages.iter().cloned().collect()
    }

    pub fn connection(&self) -> ConnectionState {
        self.lock_live().connection.clone()
    }

    pub async fn admit(&self, event: ChatEvent) -> Option<u64> {
        let session = self.session();
        self.admit_in_session(session, event).await
    }

    /// Enriches and admits `event`, returning its sequence number. Returns
    /// `None` when `session` ended before enrichment settled.
    pub async fn admit_in_session(&self, session: u64, mut event: ChatEvent) -> Option<u64> {
        let settings = self.settings();
        let resolver = &self.inner.resolver;

        if settings.show_pronouns
            && !event.is_alert()
            && event.pronouns.is_none()
            && !event.is_system()
        {
            if let Some(pronouns) = resolver.resolve_pronouns(&event.username).await {
                event.pronouns = Some(pronouns);
            }
        }

        if settings.show_avatars && !event.is_system() && event.avatar_url.is_none() {
            event.avatar_url = Some(resolver.resolve_avatar(&event.username).await);
        }

        self.insert(session, event)
    }

    pub fn spawn_admission(&self, session: u64, event: ChatEvent) -> JoinHandle<Option<u64>> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.admit_in_session(session, event).await })
    }

    fn insert(&self, session: u64, event: ChatEvent) -> Option<u64> {
        let PipelineSettings {
            max_messages,
            viewport,
            ..
        } = self.settings();
        let max_messages = max_messages.max(1);

        let mut live = self.lock_live();
        if self.session() != session {
            debug!(id = %event.id, session, "session ended during enrichment; dropping message");
            return None;
        }

        live.last_sequence += 1;
        let sequence_number = live.last_sequence;
        let position = assign_card_position(viewport, &mut live.rng);
        live.messages.push_back(EnrichedMessage {
            event,
            sequence_number,
            display_x: position.x,
            display_y: position.y,
            display_rotation: position.rotation_degrees,
        });
        let overflow = live.messages.len().saturating_sub(max_messages);
        live.messages.drain(..overflow);
        self.publish_messages(&live);
        Some(sequence_number)
    }

    /// Drops every message whose age reached the configured timeout.
    pub fn sweep_expired(&self, now_millis: i64) -> usize {
        let timeout_millis =
            i64::try_from(self.settings().message_timeout.as_millis()).unwrap_or(i64::MAX);
        let mut live = self.lock_live();
        let before = live.messages.len();
        live.messages
            .retain(|message| message.event.age_millis(now_millis) < timeout_millis);
        let removed = before - live.messages.len();
        if removed > 0 {
            self.publish_messages(&live);
        }
        removed
    }

    pub async fn run_retention(self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let removed = self.sweep_expired(Utc::now().timestamp_millis());
            if removed > 0 {
                trace!(removed, "expired chat messages");
            }
        }
    }

    pub fn clear(&self) {
        let mut live = self.lock_live();
        live.messages.clear();
        self.publish_messages(&live);
    }

    /// Ends the current session and clears the list. Intake and in-flight
    /// admissions tagged with an older session are discarded from now on.
    pub fn begin_session(&self, channel: Option<&str>) -> u64 {
        let mut live = self.lock_live();
        let session = self.inner.session.fetch_add(1, Ordering::SeqCst) + 1;
        live.messages.clear();
        live.connection = match channel {
            Some(channel) => ConnectionState {
                connected: false,
                channel: Some(channel.to_owned()),
                status: format!("JOINING #{channel}..."),
            },
            None => ConnectionState::idle(),
        };
        self.publish_messages(&live);
        self.publish_connection(&live);
        session
    }

    fn set_connection(&self, session: u64, connected: bool, status: String) {
        let mut live = self.lock_live();
        if self.session() != session {
            return;
        }
        live.connection.connected = connected;
        live.connection.status = status;
        self.publish_connection(&live);
    }

    /// Sole consumer of the intake channel. Each chat event gets its own
    /// admission task so slow lookups never hold up later events.
    pub async fn run_intake(self, mut rx: mpsc::UnboundedReceiver<IncomingMessage>) {
        while let Some(IncomingMessage { session, event }) = rx.recv().await {
            if session != self.session() {
                trace!(session, "dropping intake from ended session");
                continue;
            }
            match event {
                TransportEvent::Connected { channel } => {
                    info!(channel = %channel, "chat transport connected");
                    self.set_connection(session, true, format!("CONNECTED: #{channel}"));
                    let notice =
                        ChatEvent::connected_notice(&channel, generate_id(&mut rand::thread_rng()));
                    self.spawn_admission(session, notice);
                }
                TransportEvent::Disconnected { reason } => {
                    warn!(reason = %reason, "chat transport disconnected");
                    self.set_connection(session, false, format!("DISCONNECTED: {reason}"));
                }
                TransportEvent::Chat(event) => {
                    self.spawn_admission(session, event);
                }
            }
        }
        info!("intake channel closed; pipeline stopped admitting");
    }

    fn lock_live(&self) -> MutexGuard<'_, LiveState> {
        self.inner.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_messages(&self, live: &LiveState) {
        let _ = self.inner.updates.send(PipelineUpdate::Messages(
            live.messages.iter().cloned().collect(),
        ));
    }

    fn publish_connection(&self, live: &LiveState) {
        let _ = self
            .inner
            .updates
            .send(PipelineUpdate::Connection(live.connection.clone()));
    }
}
