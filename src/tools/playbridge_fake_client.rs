use clap::Parser;
use futures::{SinkExt, StreamExt};
use playbridge::data::{BridgeCommand, BridgeEvent, PlayerStateUpdate, Track};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use log::{debug, info, trace, warn};

/// Interval of simulated progress reports
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[clap(author, version, about = "Stand-in remote client for the playbridge bridge", long_about = None)]
struct Args {
    /// Bridge URL
    #[clap(long, default_value = "ws://127.0.0.1:8080")]
    url: String,

    /// Simulated length of every track in milliseconds
    #[clap(long, default_value_t = 30_000)]
    track_ms: u64,

    /// Delay between reconnect attempts in milliseconds
    #[clap(long, default_value_t = 1000)]
    reconnect_ms: u64,

    /// Exit instead of reconnecting when the connection ends
    #[clap(long)]
    once: bool,
}

/// Simulated player of the fake client
#[derive(Debug, Default)]
struct FakePlayer {
    uri: Option<String>,
    position_ms: u64,
    paused: bool,
}

impl FakePlayer {
    fn state_update(&self, track_ms: u64) -> BridgeEvent {
        let item = self.uri.as_deref().map(|uri| {
            let mut track = Track::from_uri(uri);
            track.duration_ms = track_ms;
            track
        });
        BridgeEvent::PlayerState(PlayerStateUpdate {
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
            duration: Some(if item.is_some() { track_ms } else { 0 }),
            position_as_of_timestamp: Some(self.position_ms),
            item,
        })
    }

    /// Apply a command; returns true if the player state changed visibly
    fn apply(&mut self, command: BridgeCommand) -> bool {
        match command {
            BridgeCommand::PlayUri(uri) => {
                info!("Playing {}", uri);
                self.uri = Some(uri);
                self.position_ms = 0;
                self.paused = false;
                true
            }
            BridgeCommand::Pause => {
                self.paused = true;
                false
            }
            BridgeCommand::Play => {
                self.paused = false;
                false
            }
            BridgeCommand::Volume(volume) => {
                info!("Volume {}", volume);
                false
            }
            other => {
                debug!("Ignoring {}", other);
                false
            }
        }
    }

    /// Advance the simulated position; returns the progress to report
    fn advance(&mut self, elapsed: Duration, track_ms: u64) -> Option<u64> {
        if self.paused || self.uri.is_none() {
            return None;
        }
        self.position_ms += elapsed.as_millis() as u64;
        if self.position_ms >= track_ms {
            info!("Track ended");
            self.uri = None;
            self.position_ms = 0;
            return Some(0);
        }
        Some(self.position_ms)
    }
}

async fn run_connection(args: &Args, player: &mut FakePlayer) -> Result<(), Box<dyn std::error::Error>> {
    let (ws, _) = connect_async(args.url.as_str()).await?;
    info!("Connected to {}", args.url);
    let (mut sink, mut stream) = ws.split();

    sink.send(Message::Text(player.state_update(args.track_ms).to_string())).await?;

    let mut ticks = tokio::time::interval(PROGRESS_INTERVAL);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            message = stream.next() => match message {
                Some(Ok(Message::Text(frame))) => {
                    trace!("Received {}", frame);
                    if frame == "ping" {
                        sink.send(Message::Text(BridgeEvent::Pong.to_string())).await?;
                        continue;
                    }
                    match frame.parse::<BridgeCommand>() {
                        Ok(command) => {
                            if player.apply(command) {
                                sink.send(Message::Text(player.state_update(args.track_ms).to_string())).await?;
                            }
                        }
                        Err(e) => warn!("Unexpected frame {:?}: {}", frame, e),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Bridge closed the connection: {:?}", frame);
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            },
            _ = ticks.tick() => {
                if let Some(progress) = player.advance(PROGRESS_INTERVAL, args.track_ms) {
                    sink.send(Message::Text(BridgeEvent::Progress(progress).to_string())).await?;
                }
            }
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
    let args = Args::parse();
    let mut player = FakePlayer::default();

    loop {
        if let Err(e) = run_connection(&args, &mut player).await {
            warn!("Connection to {} failed: {}", args.url, e);
        }
        if args.once {
            break;
        }
        tokio::time::sleep(Duration::from_millis(args.reconnect_ms)).await;
    }
}
