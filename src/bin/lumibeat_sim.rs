// lumibeat-sim: feed synthetic amplitudes through the lighting engine
//
// Drives a full session against a logging mock bridge. Useful for eyeballing
// beat detection and effect activity without real audio or real lights.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use futures::future::BoxFuture;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::runtime::Handle;

use lumibeat::{
    BridgeClient, BridgeError, Engine, LightId, LightState, SessionConfig, StopStatus,
};

#[derive(Parser, Debug)]
#[command(name = "lumibeat-sim", about = "Synthetic amplitude session against a mock bridge")]
struct Cli {
    /// Session config JSON file; defaults apply when absent or unreadable.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tempo of the synthetic beat pattern.
    #[arg(long, default_value_t = 128)]
    bpm: u32,

    /// Number of simulated lights.
    #[arg(long, default_value_t = 3)]
    lights: usize,

    /// Session length in seconds.
    #[arg(long, default_value_t = 15)]
    seconds: u64,

    /// Amplitude samples per second.
    #[arg(long, default_value_t = 30)]
    rate: u32,
}

/// Mock bridge that logs every state write instead of talking to hardware.
struct LoggingBridge;

impl BridgeClient for LoggingBridge {
    fn is_connected(&self) -> bool {
        true
    }

    fn write_state(
        &self,
        light: &LightId,
        state: &LightState,
    ) -> BoxFuture<'static, Result<(), BridgeError>> {
        log::info!("[SimBridge] {} <- {:?}", light, state);
        Box::pin(async { Ok(()) })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SessionConfig::load_from_file(path),
        None => SessionConfig::default(),
    };

    let lights = (0..cli.lights)
        .map(|i| (LightId::new(format!("sim-{}", i)), true))
        .collect();
    let engine = Engine::start(
        config,
        Handle::current(),
        Arc::new(LoggingBridge),
        lights,
        cli.rate,
        Instant::now(),
    )?;

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log::info!("[Sim] {:?}", event);
        }
    });

    let interval = Duration::from_millis(1000 / cli.rate.max(1) as u64);
    let samples_per_beat = (cli.rate * 60 / cli.bpm.max(1)).max(1);
    let total_samples = cli.seconds * cli.rate as u64;
    let mut rng = SmallRng::from_entropy();

    log::info!(
        "[Sim] {} bpm over {} lights for {} s",
        cli.bpm,
        cli.lights,
        cli.seconds
    );
    for i in 0..total_samples {
        let amplitude = if i % samples_per_beat as u64 == 0 {
            0.8 + rng.gen::<f64>() * 0.2
        } else {
            0.05 + rng.gen::<f64>() * 0.1
        };
        engine.on_sample(amplitude, Instant::now());
        tokio::time::sleep(interval).await;
    }

    engine.stop(StopStatus::Requested, Duration::from_secs(2)).await;
    Ok(())
}
