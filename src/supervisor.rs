use std::path::PathBuf;

use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{
    config::{normalize_channel, OverlaySettings},
    demo::demo_event,
    pipeline::MessagePipeline,
    protocol::IncomingMessage,
    transport::{spawn_twitch_transport, TwitchTransportConfig},
};

/// Starts a chat transport for one channel session.
pub type TransportSpawner = Box<
    dyn Fn(TwitchTransportConfig, UnboundedSender<IncomingMessage>) -> JoinHandle<()> + Send + Sync,
>;

#[derive(Debug, Clone)]
pub enum ControlMessage {
    ApplySettings(OverlaySettings),
    TriggerDemo,
    Reset,
}

pub struct Supervisor {
    settings: OverlaySettings,
    settings_path: Option<PathBuf>,
    pipeline: MessagePipeline,
    intake: UnboundedSender<IncomingMessage>,
    spawn_transport: TransportSpawner,
    transport: Option<JoinHandle<()>>,
    active_channel: Option<String>,
}

impl Supervisor {
    pub fn new(
        settings: OverlaySettings,
        settings_path: Option<PathBuf>,
        pipeline: MessagePipeline,
        intake: UnboundedSender<IncomingMessage>,
    ) -> Self {
        Self {
            settings: settings.normalized(),
            settings_path,
            pipeline,
            intake,
            spawn_transport: Box::new(spawn_twitch_transport),
            transport: None,
            active_channel: None,
        }
    }

    pub fn with_transport_spawner(mut self, spawner: TransportSpawner) -> Self {
        self.spawn_transport = spawner;
        self
    }

    pub fn settings(&self) -> &OverlaySettings {
        &self.settings
    }

    pub fn active_channel(&self) -> Option<&str> {
        self.active_channel.as_deref()
    }

    /// Applies the startup settings, then serves control messages until every
    /// sender is gone.
    pub async fn run(mut self, mut control_rx: UnboundedReceiver<ControlMessage>) {
        self.pipeline.apply_settings(self.settings.pipeline());
        self.connect(self.settings.channel.clone());
        while let Some(message) = control_rx.recv().await {
            self.handle(message);
        }
        self.disconnect();
        info!("control channel closed; supervisor stopped");
    }

    pub fn handle(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::ApplySettings(next) => self.apply_settings(next),
            ControlMessage::TriggerDemo => {
                let event = demo_event(&mut rand::thread_rng());
                let session = self.pipeline.session();
                if self.intake.send(IncomingMessage::chat(session, event)).is_err() {
                    warn!("pipeline intake closed; demo message dropped");
                }
            }
            ControlMessage::Reset => {
                info!("clearing live messages");
                self.pipeline.clear();
            }
        }
    }

    fn apply_settings(&mut self, next: OverlaySettings) {
        let next = next.normalized();
        self.pipeline.apply_settings(next.pipeline());
        if let Some(path) = &self.settings_path {
            if let Err(err) = next.save(path) {
                warn!(?err, path = %path.display(), "failed persisting overlay settings");
            }
        }
        let channel_changed =
            normalize_channel(&next.channel) != normalize_channel(&self.settings.channel);
        self.settings = next;
        if channel_changed {
            self.connect(self.settings.channel.clone());
        }
    }

    /// Tears down any running transport, starts a fresh session and, for a
    /// non-empty channel, spawns a transport bound to it.
    fn connect(&mut self, channel: String) {
        self.disconnect();
        let channel = normalize_channel(&channel);
        if channel.is_empty() {
            info!("no channel configured; chat intake idle");
            self.pipeline.begin_session(None);
            return;
        }
        let session = self.pipeline.begin_session(Some(&channel));
        info!(channel = %channel, session, "starting twitch transport");
        self.transport = Some((self.spawn_transport)(
            TwitchTransportConfig {
                channel: channel.clone(),
                session,
            },
            self.intake.clone(),
        ));
        self.active_channel = Some(channel);
    }

    fn disconnect(&mut self) {
        if let Some(task) = self.transport.take() {
            task.abort();
        }
        self.active_channel = None;
    }
}
