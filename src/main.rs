use swarm_server::domain::ports::Clock;
use swarm_server::frameworks::{config, server};
use swarm_server::interface_adapters::clock::SystemClock;
use swarm_server::interface_adapters::net::SyncClient;
use swarm_server::interface_adapters::storage::{RecordingDirectory, load_timeline};
use swarm_server::use_cases::ReplayPlayer;

use glam::Vec2;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

const USAGE: &str =
    "usage: swarm_server [server | client <addr> <name> | replay <path> | recordings [dir]]";

// Playback and client status cadence.
const REPLAY_FRAME: Duration = Duration::from_millis(16);
const STATUS_EVERY: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        None | Some("server") => server::run_with_config().await,
        Some("client") => {
            server::init_runtime();
            let (Some(addr), Some(name)) = (args.get(1), args.get(2)) else {
                eprintln!("{USAGE}");
                return Ok(());
            };
            let addr: SocketAddr = addr
                .parse()
                .map_err(|e| std::io::Error::other(format!("invalid address {addr}: {e}")))?;
            run_client(addr, name).await
        }
        Some("replay") => {
            server::init_runtime();
            let Some(path) = args.get(1) else {
                eprintln!("{USAGE}");
                return Ok(());
            };
            run_replay(PathBuf::from(path)).await
        }
        Some("recordings") => {
            server::init_runtime();
            let dir = args
                .get(1)
                .map(PathBuf::from)
                .unwrap_or_else(config::recordings_dir);
            list_recordings(dir).await
        }
        Some(other) => {
            eprintln!("unknown mode {other:?}\n{USAGE}");
            Ok(())
        }
    }
}

async fn run_client(addr: SocketAddr, name: &str) -> std::io::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut client = SyncClient::connect(addr, config::sync_settings(), clock.clone())
        .await
        .map_err(std::io::Error::other)?;

    if let Err(e) = client.join(name, config::join_timeout()).await {
        tracing::error!(error = %e, "join failed");
        client.close().await;
        return Ok(());
    }
    client.start_receive_loop();

    let mut status = tokio::time::interval(STATUS_EVERY);
    status.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = status.tick() => {
                // Circle slowly so the remote entity is visibly moving on the server.
                let phase = clock.now_seconds() as f32 * 0.5;
                let input = Vec2::new(phase.cos(), phase.sin()) * 100.0;
                if let Err(e) = client.send_input(input).await {
                    tracing::warn!(error = %e, "input send failed; closing");
                    break;
                }
                let sample = client.sample_now();
                tracing::info!(
                    entities = sample.len(),
                    received = client.received_frames(),
                    "client status"
                );
            }
        }
    }

    client.close().await;
    Ok(())
}

async fn run_replay(path: PathBuf) -> std::io::Result<()> {
    let timeline = load_timeline(&path)
        .await
        .map_err(std::io::Error::other)?;
    if timeline.is_empty() {
        tracing::warn!(path = %path.display(), "recording has no keyframes");
        return Ok(());
    }

    let mut player = ReplayPlayer::new(timeline);
    tracing::info!(
        entities = player.entities().len(),
        duration = player.duration(),
        "replay started"
    );

    let mut frame = tokio::time::interval(REPLAY_FRAME);
    frame.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut since_status = Duration::ZERO;
    while !player.is_finished() {
        frame.tick().await;
        player.advance(REPLAY_FRAME.as_secs_f64());

        since_status += REPLAY_FRAME;
        if since_status >= STATUS_EVERY {
            since_status = Duration::ZERO;
            let visible = player.entities().iter().filter(|e| e.visible).count();
            tracing::info!(clock = player.clock(), visible, "replay progress");
        }
    }

    tracing::info!("replay finished");
    Ok(())
}

async fn list_recordings(dir: PathBuf) -> std::io::Result<()> {
    let listing = RecordingDirectory::new(&dir)
        .list_recordings()
        .await
        .map_err(std::io::Error::other)?;
    if listing.is_empty() {
        println!("no recordings in {}", dir.display());
    }
    for entry in listing {
        println!("{}\t{} bytes", entry.path.display(), entry.size);
    }
    Ok(())
}
