use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use picam_stream::{
    camera::{StillCamera, StreamCamera},
    config::AppConfig,
    BusEvent,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("picam_stream", log::LevelFilter::Debug)
        .filter_module("capture_bus", log::LevelFilter::Debug)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let config = AppConfig::load()?;

    if let Some(still) = &config.still {
        let image = StillCamera::new(still.clone())?
            .take_image()
            .await
            .context("still capture")?;
        log::info!("still image: {} bytes", image.len());
    }

    let mut builder = StreamCamera::builder(config.stream.clone())
        .signature_provider(config.signature_provider()?)
        .max_buffer(config.max_buffer);
    if let Some(program) = &config.program {
        builder = builder.program(program.clone());
    }
    let camera = builder.build()?;

    let cancel = CancellationToken::new();
    let stats = tokio::spawn(log_throughput(
        camera.create_stream(),
        Duration::from_secs(config.stats_interval_secs.max(1)),
        cancel.clone(),
    ));
    let events = tokio::spawn(log_events(camera.subscribe()));

    camera.start().await.context("starting camera")?;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
        }
    }

    camera.stop().await;
    if let Err(e) = stats.await {
        log::error!("throughput task: {}", e);
    }
    if let Err(e) = events.await {
        log::error!("event log task: {}", e);
    }
    Ok(())
}

/// Periodically logs how much data one consumer stream received.
async fn log_throughput(
    mut stream: picam_stream::ConsumerStream,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    let (mut chunks, mut bytes) = (0u64, 0u64);
    loop {
        tokio::select! {
            chunk = stream.next() => match chunk {
                Some(chunk) => {
                    chunks += 1;
                    bytes += chunk.len() as u64;
                }
                None => break,
            },
            _ = ticker.tick() => {
                log::info!("stream: {} chunks, {} bytes", chunks, bytes);
            },
            _ = cancel.cancelled() => break,
        }
    }
    log::info!("stream ended: {} chunks, {} bytes", chunks, bytes);
}

async fn log_events(mut events: broadcast::Receiver<BusEvent>) {
    let mut frames = 0u64;
    loop {
        match events.recv().await {
            Ok(BusEvent::Frame(frame)) => {
                frames += 1;
                log::debug!("frame #{}: {} bytes", frames, frame.len());
            }
            Ok(BusEvent::Error(e)) => log::warn!("camera: {}", e),
            Ok(BusEvent::Closed) => {
                log::info!("camera output closed after {} frame(s)", frames);
                break;
            }
            Err(RecvError::Lagged(n)) => log::warn!("event log lagged, {} event(s) skipped", n),
            Err(RecvError::Closed) => break,
        }
    }
}
