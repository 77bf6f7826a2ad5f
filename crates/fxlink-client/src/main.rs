use anyhow::Result;
use fxlink_client::{ClientConfig, SessionBuilder, SessionEvent};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fxlink=debug,fxlink_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting fxlink client...");

    // Load configuration, optionally from the file given as first argument
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = ClientConfig::load(config_path.as_deref())?;

    let (session, mut events) = SessionBuilder::from_config(&config).start()?;
    tracing::info!("Session {} connecting to {}", session.id(), config.signaling_url);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping session");
                session.stop();
            }
        }
    }

    let state = session.closed().await;
    tracing::info!("Session finished in state {}", state);

    Ok(())
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::Stats(sample) => tracing::info!(
            "audio {}/{} kbps, video {}/{} kbps (up/down)",
            sample.audio_up,
            sample.audio_down,
            sample.video_up,
            sample.video_down
        ),
        SessionEvent::Telemetry(change) => tracing::debug!("telemetry: {:?}", change),
        SessionEvent::Error(failure) => tracing::error!("{}: {:?}", event.kind(), failure),
        SessionEvent::Start { remaining_seconds } => {
            tracing::info!("start, {:?}s remaining", remaining_seconds)
        }
        other => tracing::info!("{}", other.kind()),
    }
}
