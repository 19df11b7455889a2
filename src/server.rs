use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tokio::{net::TcpListener, sync::mpsc::UnboundedSender};
use tracing::info;

use crate::{
    config::OverlaySettings,
    events::EnrichedMessage,
    pipeline::MessagePipeline,
    protocol::ConnectionState,
    supervisor::ControlMessage,
};

pub fn is_valid_bind(value: &str) -> bool {
    value.parse::<SocketAddr>().is_ok()
}

/// JSON surface for browser-source renderers and the settings panel.
pub fn router(pipeline: MessagePipeline, control: UnboundedSender<ControlMessage>) -> Router {
    let messages_pipeline = pipeline.clone();
    let status_pipeline = pipeline;
    let demo_control = control.clone();
    let reset_control = control.clone();
    let settings_control = control;

    Router::new()
        .route(
            "/messages",
            get(move || {
                let pipeline = messages_pipeline.clone();
                async move { Json::<Vec<EnrichedMessage>>(pipeline.snapshot()) }
            }),
        )
        .route(
            "/status",
            get(move || {
                let pipeline = status_pipeline.clone();
                async move { Json::<ConnectionState>(pipeline.connection()) }
            }),
        )
        .route(
            "/demo",
            post(move || {
                let control = demo_control.clone();
                async move { dispatch(&control, ControlMessage::TriggerDemo) }
            }),
        )
        .route(
            "/reset",
            post(move || {
                let control = reset_control.clone();
                async move { dispatch(&control, ControlMessage::Reset) }
            }),
        )
        .route(
            "/settings",
            put(move |Json(settings): Json<OverlaySettings>| {
                let control = settings_control.clone();
                async move { dispatch(&control, ControlMessage::ApplySettings(settings)) }
            }),
        )
        .route("/health", get(|| async { "ok" }))
}

fn dispatch(control: &UnboundedSender<ControlMessage>, message: ControlMessage) -> StatusCode {
    if control.send(message).is_ok() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

pub async fn run_http_server(
    bind: &str,
    pipeline: MessagePipeline,
    control: UnboundedSender<ControlMessage>,
) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid http bind address: {bind}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed binding http listener on {addr}"))?;

    info!("live messages available at http://{addr}/messages");
    info!("connection status available at http://{addr}/status");
    axum::serve(listener, router(pipeline, control))
        .await
        .context("axum serve failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::{dispatch, is_valid_bind};
    use crate::supervisor::ControlMessage;

    #[test]
    fn validates_bind_addresses() {
        assert!(is_valid_bind("127.0.0.1:38472"));
        assert!(is_valid_bind("0.0.0.0:9000"));
        assert!(!is_valid_bind("127.0.0.1"));
        assert!(!is_valid_bind("bad:address"));
        assert!(!is_valid_bind(""));
    }

    #[test]
    fn dispatch_reports_closed_control_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert_eq!(
            dispatch(&tx, ControlMessage::TriggerDemo),
            axum::http::StatusCode::ACCEPTED
        );
        assert!(matches!(rx.try_recv(), Ok(ControlMessage::TriggerDemo)));
        drop(rx);
        assert_eq!(
            dispatch(&tx, ControlMessage::Reset),
            axum::http::StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
