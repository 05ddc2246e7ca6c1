//! Huddle CLI - Lightweight calling client for the Huddle chat service
//!
//! Orchestrates call sessions from the terminal: signaling, media engine
//! lifecycle, and moderation.

mod backend;
mod call;
mod config;
mod error;
mod media;
mod signaling;
mod tui;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::backend::HttpCallBackend;
use crate::call::handle::CallHandle;
use crate::call::machine::{self, LocalIdentity, MachineConfig};
use crate::call::{CallKind, CallState};
use crate::config::Config;
use crate::media::loopback::LoopbackEngine;
use crate::media::DeviceKind;
use crate::signaling::channel;
use crate::signaling::reconciler::Reconciler;

#[derive(Parser)]
#[command(name = "huddle-cli")]
#[command(about = "Lightweight CLI calling client for Huddle", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store service endpoints and identity in the local config
    Setup {
        /// Call session backend base URL
        #[arg(long)]
        backend_url: Option<String>,

        /// Signaling push gateway WebSocket URL
        #[arg(long)]
        signaling_url: Option<String>,

        /// Bearer token for backend and gateway auth
        #[arg(long)]
        token: Option<String>,

        /// This client's participant ID
        #[arg(long)]
        user_id: Option<String>,

        /// This client's display name
        #[arg(long)]
        display_name: Option<String>,
    },

    /// Place an outgoing call
    Call {
        /// Conversation ID to start the call in
        conversation: String,

        /// Peer participant ID (display purposes while ringing)
        #[arg(short, long, default_value = "")]
        peer: String,

        /// Start a group call instead of a direct call
        #[arg(long)]
        group: bool,
    },

    /// Wait for incoming call invites
    Listen {
        /// Automatically accept incoming calls
        #[arg(long)]
        auto_accept: bool,
    },

    /// Run a loopback self-test call (no network required)
    CallTest {
        /// Duration in seconds to keep the call active
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },

    /// List devices, or persist a device selection
    Devices {
        /// Select this camera ID
        #[arg(long)]
        camera: Option<String>,

        /// Select this microphone ID
        #[arg(long)]
        microphone: Option<String>,

        /// Select this speaker ID
        #[arg(long)]
        speaker: Option<String>,
    },

    /// Launch the in-call terminal user interface
    Tui,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Setup {
            backend_url,
            signaling_url,
            token,
            user_id,
            display_name,
        } => {
            let mut config = Config::load()?;
            if let Some(v) = backend_url {
                config.backend_url = Some(v);
            }
            if let Some(v) = signaling_url {
                config.signaling_url = Some(v);
            }
            if let Some(v) = token {
                config.access_token = Some(v);
            }
            if let Some(v) = user_id {
                config.user_id = Some(v);
            }
            if let Some(v) = display_name {
                config.display_name = Some(v);
            }
            config.save()?;
            println!("Configuration saved.");
        }
        Commands::Call {
            conversation,
            peer,
            group,
        } => {
            let config = Config::load()?;
            let handle = build_call_stack(&config)?;
            let kind = if group { CallKind::Group } else { CallKind::Direct };
            run_call(handle, &conversation, &peer, kind).await?;
        }
        Commands::Listen { auto_accept } => {
            let config = Config::load()?;
            let handle = build_call_stack(&config)?;
            run_listen(handle, auto_accept).await?;
        }
        Commands::CallTest { duration } => {
            call::call_test::run_call_test(duration).await?;
        }
        Commands::Devices {
            camera,
            microphone,
            speaker,
        } => {
            run_devices(camera, microphone, speaker)?;
        }
        Commands::Tui => {
            let config = Config::load()?;
            let handle = build_call_stack(&config)?;
            tui::run(handle).await?;
        }
    }

    Ok(())
}

/// Wire backend, engine, state machine, and signaling channel together.
///
/// The loopback engine stands in for a transport engine; swapping in a real
/// one only changes this function.
fn build_call_stack(config: &Config) -> Result<CallHandle> {
    let backend = Arc::new(HttpCallBackend::new(
        config.backend_url()?,
        config.access_token()?,
    ));
    let identity = LocalIdentity {
        participant_id: config.user_id()?.to_string(),
        display_name: config.display_name().to_string(),
    };
    let (engine, engine_events) = LoopbackEngine::new(identity.participant_id.clone());

    let handle = machine::spawn(
        MachineConfig::default(),
        backend,
        engine,
        engine_events,
        identity,
        config.devices.clone(),
    );

    let reconciler = Reconciler::new(handle.tx.clone(), handle.subscribe());
    let gateway_url = config.signaling_url()?.to_string();
    let token = config.access_token()?.to_string();
    tokio::spawn(async move {
        if let Err(e) = channel::connect_and_run(&gateway_url, &token, reconciler).await {
            tracing::warn!("Signaling channel terminated: {:#}", e);
        }
    });

    Ok(handle)
}

/// Place a call and report state changes until it ends.
async fn run_call(
    handle: CallHandle,
    conversation: &str,
    peer: &str,
    kind: CallKind,
) -> Result<()> {
    handle.initiate_call(conversation, peer, peer, kind);
    println!("Calling {}... (Ctrl-C to hang up)", conversation);

    let mut rx = handle.subscribe();
    let mut last_state = CallState::Idle;
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = rx.borrow().clone();
                let state = snap.state();
                if state != last_state {
                    println!("Call state: {:?}", state);
                    last_state = state;
                }
                if state.is_terminal() {
                    if let Some(reason) = snap.session.as_ref().and_then(|s| s.end_reason) {
                        println!("{}", reason.describe());
                    }
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Hanging up...");
                handle.hang_up();
            }
        }
    }
    Ok(())
}

/// Wait for invites, optionally auto-accepting them.
async fn run_listen(handle: CallHandle, auto_accept: bool) -> Result<()> {
    println!("Listening for incoming calls... (Ctrl-C to stop)");

    let mut rx = handle.subscribe();
    let mut last_state = CallState::Idle;
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = rx.borrow().clone();
                let state = snap.state();
                if state == last_state {
                    continue;
                }
                last_state = state;

                match state {
                    CallState::IncomingRinging => {
                        let caller = snap
                            .pending_invite
                            .as_ref()
                            .map(|i| i.peer_display_name.clone())
                            .unwrap_or_else(|| "unknown".to_string());
                        println!("Incoming call from {}", caller);
                        if auto_accept {
                            println!("Auto-accepting...");
                            handle.accept_call();
                        }
                    }
                    CallState::Connected => println!("Call connected"),
                    CallState::Ended | CallState::Failed => {
                        if let Some(reason) = snap.session.as_ref().and_then(|s| s.end_reason) {
                            println!("Call over: {}", reason.describe());
                        }
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                handle.hang_up();
                println!("Shutting down...");
                break;
            }
        }
    }
    Ok(())
}

/// List devices or persist a selection into the config.
fn run_devices(
    camera: Option<String>,
    microphone: Option<String>,
    speaker: Option<String>,
) -> Result<()> {
    let mut config = Config::load()?;

    if camera.is_none() && microphone.is_none() && speaker.is_none() {
        let (engine, _events) = LoopbackEngine::new("local");
        for kind in [DeviceKind::Camera, DeviceKind::Microphone, DeviceKind::Speaker] {
            println!("{}:", kind);
            let selected = match kind {
                DeviceKind::Camera => config.devices.selected_camera_id.as_deref(),
                DeviceKind::Microphone => config.devices.selected_microphone_id.as_deref(),
                DeviceKind::Speaker => config.devices.selected_speaker_id.as_deref(),
            };
            for d in crate::media::MediaEngine::list_devices(engine.as_ref(), kind) {
                let marker = if Some(d.id.as_str()) == selected { "*" } else { " " };
                println!("  {} {} ({})", marker, d.id, d.label);
            }
        }
        return Ok(());
    }

    if let Some(id) = camera {
        config.devices.selected_camera_id = Some(id);
    }
    if let Some(id) = microphone {
        config.devices.selected_microphone_id = Some(id);
    }
    if let Some(id) = speaker {
        config.devices.selected_speaker_id = Some(id);
    }
    config.save()?;
    println!("Device selection saved.");
    Ok(())
}
