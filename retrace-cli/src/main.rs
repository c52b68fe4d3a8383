use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use retrace::{
    default_backend_factory, default_capture_path, Hotkey, InputHook, JsonSettingsStore,
    PlaybackOutcome, PlaybackState, PlaybackStatus, RepeatPolicy, SessionController,
    SettingsStore, Toggle,
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::ctrl_c;
use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Record mouse and keyboard input and replay it
#[derive(Parser, Debug)]
#[command(name = "retrace", version, about)]
struct Cli {
    /// Settings file
    #[arg(long, env = "RETRACE_CONFIG")]
    config: Option<PathBuf>,

    /// Capture file used by record and play
    #[arg(long, env = "RETRACE_CAPTURE")]
    capture: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record input; the recording hotkey starts and stops the recording
    Record,
    /// Replay the current capture
    Play {
        /// Number of passes, overriding the settings
        #[arg(long, conflicts_with = "infinite")]
        repeat: Option<u32>,
        /// Repeat until cancelled
        #[arg(long)]
        infinite: bool,
    },
    /// Install a capture file as the current capture
    Load { path: PathBuf },
    /// Copy the current capture to a file
    Save { path: PathBuf },
    /// Print the current capture
    Show,
    /// Inspect or change settings
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Show,
    Set { key: String, value: String },
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("retrace=info,retrace_cli=info")),
        )
        .with_target(true)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let settings_path = match cli.config {
        Some(path) => path,
        None => JsonSettingsStore::default_path()?,
    };
    let store = JsonSettingsStore::new(settings_path);
    let settings = store
        .load()
        .with_context(|| format!("Failed to load settings from {:?}", store.path()))?;
    debug!(?settings, "Loaded settings");

    let capture_path = cli.capture.unwrap_or_else(default_capture_path);
    let controller = Arc::new(SessionController::new(
        settings,
        capture_path,
        default_backend_factory(),
    ));

    match cli.command {
        Command::Record => record(controller).await,
        Command::Play { repeat, infinite } => {
            let policy = if infinite {
                RepeatPolicy::Infinite
            } else if let Some(n) = repeat {
                RepeatPolicy::Finite(n)
            } else {
                controller.settings().repeat_policy()
            };
            play(controller, policy).await
        }
        Command::Load { path } => {
            controller
                .load_capture(&path)
                .with_context(|| format!("Failed to load {:?}", path))?;
            println!("Loaded {} into {}", path.display(), controller.capture_path().display());
            Ok(())
        }
        Command::Save { path } => {
            controller.save_capture(&path)?;
            println!("Saved capture to {}", path.display());
            Ok(())
        }
        Command::Show => {
            print!("{}", controller.capture_text()?);
            Ok(())
        }
        Command::Config { action } => config(&store, action),
    }
}

/// Install the input hook, forwarding hotkeys to the returned channel
fn install_hook(controller: &Arc<SessionController>) -> Result<(InputHook, mpsc::UnboundedReceiver<Hotkey>)> {
    let (hotkey_tx, hotkey_rx) = mpsc::unbounded_channel();
    let hook_controller = Arc::clone(controller);
    let hook = InputHook::start(move |event| {
        if let Some(hotkey) = hook_controller.handle_event(&event) {
            let _ = hotkey_tx.send(hotkey);
        }
    })?;
    Ok((hook, hotkey_rx))
}

async fn record(controller: Arc<SessionController>) -> Result<()> {
    let (hook, mut hotkeys) = install_hook(&controller)?;
    let mut actions = controller.recorder().action_stream();
    println!(
        "Press {} to start and stop recording, Ctrl-C to abort",
        controller.settings().recording_hotkey
    );

    loop {
        tokio::select! {
            Some(hotkey) = hotkeys.recv() => {
                if hotkey != Hotkey::Record {
                    continue;
                }
                match controller.toggle_recording()? {
                    Toggle::Started => println!("Recording..."),
                    Toggle::Stopped => {
                        println!("Capture saved to {}", controller.capture_path().display());
                        break;
                    }
                }
            }
            Some(action) = actions.next() => println!("{}", action),
            _ = ctrl_c() => {
                if controller.is_recording() {
                    controller.recorder().stop()?;
                    warn!("Recording aborted, capture discarded");
                }
                break;
            }
        }
    }

    hook.stop();
    Ok(())
}

async fn play(controller: Arc<SessionController>, policy: RepeatPolicy) -> Result<()> {
    let hotkeys = match install_hook(&controller) {
        Ok(installed) => Some(installed),
        Err(e) => {
            warn!(error = %e, "Playback hotkey unavailable, use Ctrl-C to stop");
            None
        }
    };
    let (hook, mut hotkeys) = match hotkeys {
        Some((hook, rx)) => (Some(hook), rx),
        None => (None, mpsc::unbounded_channel().1),
    };

    let mut status = controller.playback_status();
    controller.start_playback_with(policy)?;
    info!(?policy, "Playing {}", controller.capture_path().display());

    let interrupt = async {
        if ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let outcome = drive_playback(&controller, &mut status, &mut hotkeys, interrupt).await;

    let waiter = Arc::clone(&controller);
    tokio::task::spawn_blocking(move || waiter.wait_for_playback()).await?;
    if let Some(hook) = hook {
        hook.stop();
    }

    match outcome {
        Some(PlaybackOutcome::Completed) => println!("Playback completed"),
        Some(PlaybackOutcome::Cancelled) => println!("Playback stopped"),
        Some(PlaybackOutcome::Failed(reason)) => bail!("Playback failed: {}", reason),
        None => bail!("Playback ended without an outcome"),
    }
    Ok(())
}

/// Report progress until the session ends, stopping it on the playback
/// hotkey or when `interrupt` resolves
async fn drive_playback(
    controller: &SessionController,
    status: &mut watch::Receiver<PlaybackStatus>,
    hotkeys: &mut mpsc::UnboundedReceiver<Hotkey>,
    interrupt: impl Future<Output = ()>,
) -> Option<PlaybackOutcome> {
    tokio::pin!(interrupt);
    let mut interrupted = false;

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    return None;
                }
                let current = status.borrow_and_update().clone();
                if let Some(outcome) = current.outcome {
                    return Some(outcome);
                }
                if current.state == PlaybackState::Running {
                    println!("Remaining passes: {}", current.remaining);
                }
            }
            Some(hotkey) = hotkeys.recv() => {
                if hotkey == Hotkey::Playback {
                    controller.stop_playback();
                }
            }
            _ = &mut interrupt, if !interrupted => {
                interrupted = true;
                controller.stop_playback();
            }
        }
    }
}

fn config(store: &JsonSettingsStore, action: ConfigCommand) -> Result<()> {
    let mut settings = store.load()?;
    match action {
        ConfigCommand::Show => {
            for (key, value) in settings.entries()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigCommand::Set { key, value } => {
            settings.set(&key, &value)?;
            store.save(&settings)?;
            println!("{} = {}", key, settings.get(&key)?);
        }
    }
    Ok(())
}
