use playbridge::commands::{self, CommandError, ControlAction, PlayOutcome};
use playbridge::config::{BridgeConfig, DEFAULT_CONFIG_FILE};
use playbridge::helpers::catalog::{Catalog, MemoryCatalog};
use playbridge::helpers::presentation::TextPresenter;
use playbridge::helpers::voice::NoopVoiceLink;
use playbridge::logging;
use playbridge::players::SessionHandle;
use playbridge::Track;
use clap::Parser;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use log::{debug, error, info, warn};

/// Requester id used for tracks queued from the console
const CONSOLE_REQUESTER: &str = "console";

#[derive(Parser, Debug)]
#[command(author, version, about = "Queue and playback bridge for a remote media-player client")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Catalog file, overrides catalog.file
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

enum Input {
    Line(String),
    Interrupt,
    Eof,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match BridgeConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::initialize_logging(Some(&config.logging), args.debug || args.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = config.apply_env().and_then(|_| config.validate()) {
        error!("{}", e);
        std::process::exit(1);
    }
    if let Some(catalog) = args.catalog {
        config.catalog.file = Some(catalog);
    }

    let catalog: Arc<dyn Catalog> = match &config.catalog.file {
        Some(path) => match MemoryCatalog::from_file(path) {
            Ok(catalog) => Arc::new(catalog),
            Err(e) => {
                error!("Failed to load catalog {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            warn!("No catalog configured, only play URIs can be queued");
            Arc::new(MemoryCatalog::new())
        }
    };

    info!("playbridge {} starting", env!("CARGO_PKG_VERSION"));
    let presenter = Arc::new(TextPresenter::new());
    let bridge = match playbridge::initialize(&config, presenter, Arc::new(NoopVoiceLink::new())).await {
        Ok(bridge) => bridge,
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    let (input_tx, mut input) = mpsc::unbounded_channel();
    let interrupt_tx = input_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(Input::Interrupt);
    }) {
        warn!("Failed to install Ctrl+C handler: {}", e);
    }

    // stdin is read on a plain thread, blocking reads would stall the runtime
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if input_tx.send(Input::Line(line)).is_err() {
                return;
            }
        }
        let _ = input_tx.send(Input::Eof);
    });

    print_help();
    let session = bridge.session().clone();
    while let Some(next) = input.recv().await {
        match next {
            Input::Line(line) => {
                if !run_console_command(catalog.as_ref(), &session, line.trim()).await {
                    break;
                }
            }
            Input::Interrupt => {
                println!("\nReceived Ctrl+C, shutting down...");
                break;
            }
            Input::Eof => {
                debug!("stdin closed, console disabled");
            }
        }
    }

    bridge.stop().await;
    info!("Exiting application");
}

fn print_help() {
    println!("Console commands:");
    println!("  add <query|link|uri>   queue a track, album or playlist");
    println!("  skip | prev | pause | repeat | shuffle | clear");
    println!("  remove <n|name>        remove a queued track");
    println!("  who [n|name]           show who requested a track, current if omitted");
    println!("  volume <0-100>");
    println!("  react <emoji>          press a summary control");
    println!("  queue                  show the queue");
    println!("  channel <id>           publish the summary to a channel");
    println!("  quit");
}

/// Run one console line; returns false when the daemon should exit
async fn run_console_command(catalog: &dyn Catalog, session: &SessionHandle, line: &str) -> bool {
    let (command, argument) = match line.split_once(' ') {
        Some((command, argument)) => (command, argument.trim()),
        None => (line, ""),
    };

    let result: Result<String, CommandError> = match command {
        "" => return true,
        "quit" | "exit" => return false,
        "help" => {
            print_help();
            return true;
        }
        "add" if argument.starts_with("spotify:track:") => {
            let track = Track::from_uri(argument).with_requester(CONSOLE_REQUESTER);
            session.enqueue(track).await
                .map(|added| if added { "Added to queue".to_string() } else { "Already queued".to_string() })
        }
        "add" => commands::play_request(catalog, session, argument, CONSOLE_REQUESTER).await
            .map(|outcome| match outcome {
                PlayOutcome::Track { track, added: true } => format!("Added {}", track),
                PlayOutcome::Track { track, added: false } => format!("{} is already queued", track),
                PlayOutcome::Album { name, added } => format!("Added {} tracks from {}", added, name),
                PlayOutcome::Playlist { name, stats } => {
                    format!("Added {} tracks from {} ({} skipped)", stats.added, name, stats.dropped())
                }
            }),
        "skip" => session.skip().await.map(|next| match next {
            Some(track) => format!("Now playing {}", track),
            None => "Queue finished".to_string(),
        }),
        "prev" => session.previous().await.map(|track| format!("Back to {}", track)),
        "pause" => session.toggle_pause().await
            .map(|paused| if paused { "Paused".to_string() } else { "Resumed".to_string() }),
        "repeat" => session.toggle_repeat().await
            .map(|on| format!("Repeat {}", if on { "on" } else { "off" })),
        "shuffle" => session.shuffle().await.map(|_| "Queue shuffled".to_string()),
        "clear" => session.clear().await.map(|_| "Queue cleared".to_string()),
        "remove" => commands::remove_entry(session, argument).await.map(|track| format!("Removed {}", track)),
        "who" => commands::who_requested(session, argument).await.map(|track| {
            if track.requester_id.is_empty() {
                format!("Nobody is recorded for {}", track)
            } else {
                format!("{} was requested by {}", track, track.requester_id)
            }
        }),
        "volume" => match argument.parse::<u8>() {
            Ok(volume) => session.set_volume(volume).await.map(|_| format!("Volume set to {}", volume)),
            Err(_) => Err(CommandError::InvalidArgument(format!("'{}' is not a volume", argument))),
        },
        "react" => match ControlAction::from_emoji(argument) {
            Some(action) => commands::apply_control(session, action).await
                .map(|applied| if applied { format!("{:?}", action) } else { "Nothing is playing".to_string() }),
            None => Err(CommandError::InvalidArgument(format!("'{}' is not a control", argument))),
        },
        "queue" => session.snapshot().await.map(|snapshot| {
            let mut lines = vec![match &snapshot.state.current_track {
                Some(track) => format!("Now playing: {} ({})", track, snapshot.phase),
                None => format!("Nothing playing ({})", snapshot.phase),
            }];
            lines.extend(commands::queue_choices(&snapshot.queue, "").into_iter().map(|c| c.label));
            if snapshot.queue.len() > commands::MAX_CHOICES {
                lines.push(format!("... and {} more", snapshot.queue.len() - commands::MAX_CHOICES));
            }
            lines.join("\n")
        }),
        "channel" if !argument.is_empty() => session.set_target_channel(argument).await
            .map(|_| format!("Publishing to channel {}", argument)),
        other => Err(CommandError::InvalidArgument(format!("unknown command '{}'", other))),
    };

    match result {
        Ok(message) => println!("{}", message),
        Err(CommandError::NoSession) => {
            error!("The session has stopped");
            return false;
        }
        Err(e) => println!("Error: {}", e),
    }
    true
}
