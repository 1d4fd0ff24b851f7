//! Spectrum Monitor
//!
//! Development consumer: accepts bridge connections on the configured port,
//! decodes every frame and prints it. Malformed frames are dropped and
//! counted; the connection stays up.
//!
//! Usage: spectrum-monitor [--json] [config.toml]

use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spectrum_bridge::{
    analysis::BandLayout, codec::FrameDecoder, constants::DEFAULT_SAMPLE_RATE, AnalysisSnapshot,
    BridgeConfig,
};

struct MonitorState {
    band_count: usize,
    /// Band edges for labelling; independent of the sender's sample rate
    layout: BandLayout,
    json: bool,
    frames: AtomicU64,
    rejected: AtomicU64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut json = false;
    let mut config_path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--json" => json = true,
            path => config_path = Some(PathBuf::from(path)),
        }
    }

    let config = BridgeConfig::load_or_default(config_path.as_deref())?;
    let state = Arc::new(MonitorState {
        band_count: config.analysis.band_count,
        layout: BandLayout::new(
            config.analysis.band_count,
            config.analysis.min_frequency_hz,
            config.analysis.max_frequency_hz,
            DEFAULT_SAMPLE_RATE as f32,
            config.analysis.transform_size,
        ),
        json,
        frames: AtomicU64::new(0),
        rejected: AtomicU64::new(0),
    });

    let app = Router::new()
        .route("/", get(ws_handler))
        .with_state(Arc::clone(&state));

    let addr = config.network.endpoint(config.network.port)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        "Spectrum monitor listening on ws://{} ({} bands)",
        addr,
        state.band_count
    );

    // Periodic stats
    let stats_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        loop {
            interval.tick().await;
            tracing::info!(
                "Stats: {} frames decoded, {} rejected",
                stats_state.frames.load(Ordering::Relaxed),
                stats_state.rejected.load(Ordering::Relaxed)
            );
        }
    });

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down");
    })
    .await?;

    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<MonitorState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

async fn handle_socket(mut socket: WebSocket, peer: SocketAddr, state: Arc<MonitorState>) {
    tracing::info!("Bridge connected from {}", peer);
    let mut decoder = FrameDecoder::new(state.band_count);

    while let Some(message) = socket.next().await {
        match message {
            Ok(Message::Binary(data)) => match decoder.decode(&data) {
                Ok(snapshot) => {
                    state.frames.fetch_add(1, Ordering::Relaxed);
                    print_snapshot(&snapshot, &state);
                }
                Err(e) => {
                    state.rejected.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Dropping frame from {}: {}", peer, e);
                }
            },
            Ok(Message::Close(_)) => break,
            // Pings are answered by axum
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Connection from {} failed: {}", peer, e);
                break;
            }
        }
    }

    let stats = decoder.stats();
    tracing::info!(
        "Bridge {} disconnected after {} frames ({} rejected)",
        peer,
        stats.frames_decoded,
        stats.frames_rejected
    );
}

fn print_snapshot(snapshot: &AnalysisSnapshot, state: &MonitorState) {
    if state.json {
        match serde_json::to_string(snapshot) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::warn!("Cannot serialize snapshot {}: {}", snapshot.sequence, e),
        }
        return;
    }

    let dominant = match (snapshot.is_silent(), snapshot.dominant_band()) {
        (false, Some(band)) => {
            let (low, high) = state.layout.band_range(band).unwrap_or_default();
            format!("{} ({:.0}-{:.0} Hz, {:.1} dB)", band, low, high, snapshot.bands[band])
        }
        _ => "silent".to_string(),
    };

    println!(
        "#{:<6} {:>8} ms  {} ch @ {} Hz  peak {:.3}/{:.3}  rms {:.3}/{:.3}  corr {:+.2}  dominant {}",
        snapshot.sequence,
        snapshot.timestamp_ms,
        snapshot.channels,
        snapshot.sample_rate,
        snapshot.peak[0],
        snapshot.peak[1],
        snapshot.rms[0],
        snapshot.rms[1],
        snapshot.correlation,
        dominant
    );
}
