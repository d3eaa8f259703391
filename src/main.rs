//! riverloop demo binary
//!
//! Plays the configured ambient loop until interrupted. Launching from a
//! terminal is a deliberate act, so it counts as the engagement gesture.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use riverloop::engine::EngagementSignal;
use riverloop::output::CpalBackend;
use riverloop::policy::MutePreference;
use riverloop::{AmbientEngine, EngineConfig};

#[derive(Parser, Debug)]
#[command(name = "riverloop", about = "Looping ambient audio player")]
struct Args {
    /// Override the ambient asset URL
    #[arg(long, env = "RIVERLOOP_URL")]
    url: Option<String>,

    /// Playback volume (0.0-1.0)
    #[arg(long, default_value_t = 0.25)]
    volume: f32,

    /// Where the mute preference is persisted
    #[arg(long, default_value = ".riverloop/audio-muted.json")]
    prefs: PathBuf,

    /// Play even when the persisted preference says muted
    #[arg(long)]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "riverloop=debug,info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = EngineConfig {
        default_volume: args.volume.clamp(0.0, 1.0),
        ..EngineConfig::default()
    };
    if let Some(url) = args.url {
        config.asset_url = url;
    }

    let pref = MutePreference::new(args.prefs);
    if pref.load() && !args.force {
        info!("muted by saved preference; run with --force or store an unmuted preference");
        return Ok(());
    }

    let engine = AmbientEngine::new(config, Arc::new(CpalBackend::new()));
    let gate = EngagementSignal::new(engine.clone());

    // A terminal launch is a user gesture.
    gate.notify().await;
    engine.fade_in(Duration::from_secs(1)).await;

    info!("playing, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("fading out");
    engine.fade_out(Duration::from_secs(1));
    tokio::time::sleep(Duration::from_millis(1200)).await;
    engine.stop();

    Ok(())
}
