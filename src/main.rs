use std::{sync::Arc, thread, time::Duration};

use anyhow::Result;
use crossbeam_channel::Receiver;
use tokio::{sync::mpsc, time::sleep};
use tracing::{error, info, warn};

use y2k_chat_overlay::{
    config::OverlaySettings,
    identity::{HttpIdentityService, IdentityCache, IdentityResolver},
    pipeline::{MessagePipeline, RETENTION_SWEEP_PERIOD},
    protocol::{IncomingMessage, PipelineUpdate},
    server::{is_valid_bind, run_http_server},
    supervisor::{ControlMessage, Supervisor},
};

const DEMO_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let demo_mode = std::env::args().any(|arg| arg == "--demo");
    let (settings, settings_path) = OverlaySettings::load_or_create()?;
    info!(path = %settings_path.display(), channel = %settings.channel, "loaded overlay settings");

    let resolver = IdentityResolver::new(
        Arc::new(IdentityCache::new()),
        Arc::new(HttpIdentityService::new(settings.lookup_timeout())?),
    );
    let (update_tx, update_rx) = crossbeam_channel::unbounded::<PipelineUpdate>();
    let pipeline = MessagePipeline::new(resolver, settings.pipeline(), update_tx);

    let (intake_tx, intake_rx) = mpsc::unbounded_channel::<IncomingMessage>();
    tokio::spawn(pipeline.clone().run_intake(intake_rx));
    tokio::spawn(pipeline.clone().run_retention(RETENTION_SWEEP_PERIOD));

    let (control_tx, control_rx) = mpsc::unbounded_channel::<ControlMessage>();
    let http_bind = settings.http_bind.trim().to_owned();
    let supervisor = Supervisor::new(settings, Some(settings_path), pipeline.clone(), intake_tx);
    tokio::spawn(supervisor.run(control_rx));

    thread::spawn(move || log_presentation_updates(update_rx));

    if demo_mode {
        let demo_tx = control_tx.clone();
        info!(interval_ms = DEMO_INTERVAL.as_millis() as u64, "demo mode enabled");
        tokio::spawn(async move {
            while demo_tx.send(ControlMessage::TriggerDemo).is_ok() {
                sleep(DEMO_INTERVAL).await;
            }
        });
    }

    if is_valid_bind(&http_bind) {
        let server_pipeline = pipeline.clone();
        let server_control = control_tx.clone();
        tokio::spawn(async move {
            if let Err(err) = run_http_server(&http_bind, server_pipeline, server_control).await {
                error!(?err, bind = %http_bind, "http server crashed");
            }
        });
    } else {
        warn!(bind = %http_bind, "http_bind is invalid; http surface disabled");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

/// Stand-in renderer: logs every snapshot the pipeline publishes.
fn log_presentation_updates(updates: Receiver<PipelineUpdate>) {
    for update in updates {
        match update {
            PipelineUpdate::Messages(messages) => {
                let newest = messages.last();
                info!(
                    live = messages.len(),
                    newest_seq = ?newest.map(|message| message.sequence_number),
                    newest_user = ?newest.map(|message| message.event.username.as_str()),
                    special = newest.map(|message| message.is_special()).unwrap_or(false),
                    "live messages updated"
                );
            }
            PipelineUpdate::Connection(state) => {
                info!(
                    connected = state.connected,
                    channel = state.channel.as_deref().unwrap_or(""),
                    status = %state.status,
                    "connection state updated"
                );
            }
        }
    }
}
