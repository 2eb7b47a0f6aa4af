// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use beatlight::config::Rig;
use beatlight::dmx;
use beatlight::lighting::sink::ChannelSink;
use beatlight::lighting::types::FLASH_LAYERS;
use beatlight::lighting::{
    Easing, Effect, EffectOptions, GameEvent, LightingEngine, Rgbio, TrackedLight, Transition,
    WaitCondition,
};
use beatlight::sync::CancelHandle;
use clap::{crate_version, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long the idle color and the shutdown blackout take to fade.
const FADE: Duration = Duration::from_secs(1);
const BEATS_PER_MEASURE: u64 = 4;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A stage lighting engine driven by rhythm game events."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the lights in the rig, optionally filtered by a selector.
    Lights {
        /// The path to the rig config.
        config: String,
        /// A selector such as all, odd, half-1, a group name or a light id.
        selector: Option<String>,
    },
    /// Start runs the lighting engine and sends its output to OLA.
    Start {
        /// The path to the rig config.
        config: String,
        /// Drives beat and measure events at this tempo.
        #[arg[short, long]]
        bpm: Option<f64>,
        /// The idle color, by name or as hex.
        #[arg[short, long]]
        color: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Lights { config, selector } => {
            let inventory = Rig::deserialize(Path::new(&config))?.inventory()?;
            let lights = inventory.select(selector.as_deref().unwrap_or("all"));
            if lights.is_empty() {
                println!("No lights matched.");
                return Ok(());
            }

            println!("Lights (count: {}):", lights.len());
            for light in lights {
                match (light.pan, light.tilt) {
                    (None, None) => println!("- {} (position {})", light.id, light.position),
                    (pan, tilt) => println!(
                        "- {} (position {}, pan {}, tilt {})",
                        light.id,
                        light.position,
                        pan.unwrap_or_default(),
                        tilt.unwrap_or_default()
                    ),
                }
            }
        }
        Commands::Start { config, bpm, color } => {
            let idle = match color.as_deref() {
                Some(name) => {
                    Some(Rgbio::from_name(name).ok_or(format!("unknown color {}", name))?)
                }
                None => None,
            };
            start(Path::new(&config), bpm, idle).await?;
        }
    }

    Ok(())
}

async fn start(path: &Path, bpm: Option<f64>, idle: Option<Rgbio>) -> Result<(), Box<dyn Error>> {
    let rig = Rig::deserialize(path)?;
    let settings = rig.engine_settings()?;
    let inventory = rig.inventory()?;
    let patch = rig.patch()?;

    let client = tokio::task::spawn_blocking({
        let port = rig.ola_port();
        move || dmx::connect(port)
    })
    .await??;

    let cancel = CancelHandle::new();
    let (sink, frames) = ChannelSink::new(inventory.ids(), rig.frame_buffer());
    let mut join_handles = vec![dmx::spawn_output(
        patch,
        frames,
        Box::new(client),
        cancel.clone(),
    )?];

    let engine = LightingEngine::new(Box::new(sink), settings);
    join_handles.push(engine.start_tick_loop(cancel.clone())?);

    if let Some(idle) = idle {
        engine.set_state(inventory.lights(), idle, FADE);
    }
    if let Some(bpm) = bpm.filter(|bpm| *bpm > 0.0) {
        engine.add_effect(
            "beat-pulse",
            beat_pulse(inventory.lights().to_vec()),
            EffectOptions::default().persistent(true),
        );
        join_handles.push(spawn_metronome(engine.clone(), bpm, cancel.clone())?);
    }

    info!(lights = inventory.lights().len(), "Lighting engine running");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    let outcome = engine.blackout_and_wait(FADE).await;
    info!(?outcome, "Blackout finished");

    cancel.cancel();
    for join_handle in join_handles {
        if join_handle.join().is_err() {
            warn!("Error joining thread");
        }
    }
    Ok(())
}

/// Flashes every light on each beat, then fades back to whatever is beneath.
fn beat_pulse(lights: Vec<TrackedLight>) -> Effect {
    let layer = *FLASH_LAYERS.start();
    let flash = Rgbio::new(255, 255, 255, 255).with_opacity(0.5);
    Effect::new("beat-pulse", "Flash on every beat")
        .with_transition(
            Transition::new(lights.clone(), layer, flash, Duration::from_millis(40))
                .with_wait_for(WaitCondition::Event(GameEvent::Beat)),
        )
        .with_transition(
            Transition::new(
                lights,
                layer,
                Rgbio::transparent(),
                Duration::from_millis(250),
            )
            .with_easing(Easing::EaseOut),
        )
}

/// Dispatches beat events at a fixed tempo, and a measure event on every
/// downbeat.
fn spawn_metronome(
    engine: LightingEngine,
    bpm: f64,
    cancel: CancelHandle,
) -> std::io::Result<JoinHandle<()>> {
    let interval = Duration::from_secs_f64(60.0 / bpm);
    thread::Builder::new()
        .name("metronome".to_string())
        .spawn(move || {
            info!(bpm, "Metronome started");
            let mut beat: u64 = 0;
            while !cancel.wait_timeout(interval) {
                if beat % BEATS_PER_MEASURE == 0 {
                    engine.on_measure();
                }
                engine.on_beat();
                beat += 1;
            }
        })
}
