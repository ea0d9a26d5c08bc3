//! peerpaste: connect two peers by pasting payloads
//!
//! Commands are read from stdin, events and diagnostics go to stderr and
//! only exchange payloads are written to stdout.
//!
//! # Usage
//!
//! ```bash
//! # Peer A
//! peerpaste
//! > init
//! > channel chat
//! > offer
//! > commit
//! > export            # paste the printed token to peer B
//!
//! # Peer B
//! peerpaste
//! > init
//! > import <token from A>
//! > answer
//! > commit
//! > export            # paste the printed token back to peer A
//!
//! # Peer A
//! > import <token from B>
//! > send hello
//!
//! # Same network, no STUN
//! peerpaste --local-only
//! ```

use clap::Parser;
use peerpaste_core::config::{DEFAULT_CHANNEL_LABEL, DEFAULT_EVENT_HISTORY_CAPACITY};
use peerpaste_core::{ExchangePayload, MediaTrack, Session, SessionConfig};
use peerpaste_webrtc::command::HELP;
use peerpaste_webrtc::config::parse_turn_server;
use peerpaste_webrtc::{
    Command, CommandError, DataChannelMode, ExportFormat, WebRtcTransportConfig,
    WebRtcTransportFactory,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Peer-to-peer sessions signalled by copy and paste
///
/// Negotiation payloads are exchanged by hand (chat, email, ...) instead of
/// through a signaling server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON transport configuration file; flags override its values
    #[arg(long, env = "PEERPASTE_CONFIG")]
    config: Option<PathBuf>,

    /// STUN server URLs (comma-separated)
    #[arg(long, value_delimiter = ',', env = "PEERPASTE_STUN_SERVERS")]
    stun_servers: Option<Vec<String>>,

    /// TURN servers (format: turn:host:port:username:password, comma-separated)
    #[arg(long, value_delimiter = ',', env = "PEERPASTE_TURN_SERVERS")]
    turn_servers: Vec<String>,

    /// Use no ICE servers at all (host candidates only)
    #[arg(long, env = "PEERPASTE_LOCAL_ONLY")]
    local_only: bool,

    /// Delivery mode of the outbound data channel
    #[arg(long, value_enum, env = "PEERPASTE_CHANNEL_MODE")]
    channel_mode: Option<DataChannelModeArg>,

    /// How long `export` waits for local candidates, in milliseconds
    #[arg(long, env = "PEERPASTE_GATHER_TIMEOUT_MS")]
    gather_timeout_ms: Option<u64>,

    /// Label used by `channel` without an argument
    #[arg(long, default_value = DEFAULT_CHANNEL_LABEL, env = "PEERPASTE_CHANNEL_LABEL")]
    channel_label: String,

    /// Number of events kept for `history`
    #[arg(long, default_value_t = DEFAULT_EVENT_HISTORY_CAPACITY, env = "PEERPASTE_HISTORY")]
    history: usize,
}

/// Data channel mode CLI argument wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum DataChannelModeArg {
    Reliable,
    Unreliable,
}

impl From<DataChannelModeArg> for DataChannelMode {
    fn from(arg: DataChannelModeArg) -> Self {
        match arg {
            DataChannelModeArg::Reliable => DataChannelMode::Reliable,
            DataChannelModeArg::Unreliable => DataChannelMode::Unreliable,
        }
    }
}

/// Build the transport configuration from the config file and CLI overrides
fn build_config(args: &Args) -> anyhow::Result<WebRtcTransportConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "Loading transport configuration");
            WebRtcTransportConfig::from_file(path)?
        }
        None => WebRtcTransportConfig::default(),
    };

    if args.local_only {
        config = WebRtcTransportConfig {
            data_channel_mode: config.data_channel_mode,
            ice_gathering_timeout_ms: config.ice_gathering_timeout_ms,
            ..WebRtcTransportConfig::local_only()
        };
    }
    if let Some(stun_servers) = &args.stun_servers {
        config.stun_servers = stun_servers.clone();
    }
    if !args.turn_servers.is_empty() {
        config.turn_servers = args
            .turn_servers
            .iter()
            .map(|s| parse_turn_server(s))
            .collect::<Result<_, _>>()?;
        for turn in &config.turn_servers {
            info!("Adding TURN server: {} (user: {})", turn.url, turn.username);
        }
    }
    if let Some(mode) = args.channel_mode {
        config.data_channel_mode = mode.into();
    }
    if let Some(timeout_ms) = args.gather_timeout_ms {
        config.ice_gathering_timeout_ms = timeout_ms;
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,peerpaste_core=debug,peerpaste_webrtc=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

enum Flow {
    Continue,
    Quit,
}

struct Repl {
    session: Session,
    config: WebRtcTransportConfig,
    printer: Option<JoinHandle<()>>,
}

impl Repl {
    /// (Re)attach the event printer; `clear` detaches every observer
    fn watch_events(&mut self) {
        if let Some(printer) = self.printer.take() {
            printer.abort();
        }
        let mut events = self.session.subscribe();
        self.printer = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                eprintln!("{}", event);
            }
        }));
    }

    async fn execute(&mut self, command: Command) -> anyhow::Result<Flow> {
        debug!(%command, "Executing command");
        let session = &self.session;

        match command {
            Command::Init => session.initialize().await?,
            Command::Channel(label) => {
                let label = label.unwrap_or_else(|| session.config().default_channel_label.clone());
                let info = session.create_outbound_channel(&label).await?;
                eprintln!("outbound channel {} ({})", info.label, info.id);
            }
            Command::Track(kind) => {
                let track = MediaTrack::generate(kind);
                eprintln!("attaching {} track {}", kind, track.id());
                session.attach_local_track(track).await?;
            }
            Command::Untrack => {
                let count = session.detach_local_tracks().await?;
                eprintln!("detached {} track(s)", count);
            }
            Command::Offer => {
                session.create_offer().await?;
            }
            Command::Answer => {
                session.create_answer().await?;
            }
            Command::Commit => session.set_local_description().await?,
            Command::Remote(payload) => {
                let payload = ExchangePayload::decode(&payload)?;
                session
                    .apply_remote_description(&payload.description)
                    .await?;
            }
            Command::Candidates(payload) => {
                let payload = ExchangePayload::decode(&payload)?;
                let count = session.apply_remote_candidates(&payload.candidates).await?;
                eprintln!("applied {} candidate(s)", count);
            }
            Command::Import(payload) => self.import(&payload).await?,
            Command::Export(format) => self.export(format).await?,
            Command::Send(text) => session.send_message(text).await?,
            Command::CloseChannel => session.close_outbound_channel().await?,
            Command::CloseInbound => session.close_inbound_channel().await?,
            Command::StopRemote => {
                let count = session.stop_remote_tracks().await?;
                eprintln!("stopped {} remote track(s)", count);
            }
            Command::Close => session.close_connection().await?,
            Command::Clear => {
                session.clear().await?;
                self.watch_events();
            }
            Command::Status => self.print_status().await,
            Command::History(limit) => {
                for event in session
                    .event_history()
                    .into_iter()
                    .take(limit.unwrap_or(usize::MAX))
                {
                    eprintln!("{}", event);
                }
            }
            Command::Help => eprintln!("{}", HELP),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    async fn import(&self, payload: &str) -> anyhow::Result<()> {
        let payload = ExchangePayload::decode(payload)?;
        self.session
            .apply_remote_description(&payload.description)
            .await?;

        if self.session.affordances().await.apply_remote_candidates {
            let count = self
                .session
                .apply_remote_candidates(&payload.candidates)
                .await?;
            eprintln!("applied {} candidate(s)", count);
        } else if !payload.candidates.is_empty() {
            eprintln!(
                "skipped {} candidate(s): the peer discovers this side's path",
                payload.candidates.len()
            );
        }
        Ok(())
    }

    async fn export(&self, format: ExportFormat) -> anyhow::Result<()> {
        if self.session.snapshot().await.local_description_committed {
            let wait = Duration::from_millis(self.config.ice_gathering_timeout_ms);
            eprintln!("gathering candidates for {}ms...", wait.as_millis());
            tokio::time::sleep(wait).await;
        }

        let payload = self.session.exchange_payload().await.ok_or_else(|| {
            anyhow::anyhow!("nothing to export yet: create an offer or answer first")
        })?;
        eprintln!(
            "{} with {} candidate(s):",
            payload.description.kind,
            payload.candidates.len()
        );
        match format {
            ExportFormat::Token => println!("{}", payload.encode()?),
            ExportFormat::Json => println!("{}", payload.to_json()?),
        }
        Ok(())
    }

    async fn print_status(&self) {
        let snapshot = self.session.snapshot().await;
        let phase = snapshot
            .phase
            .map(|p| p.to_string())
            .unwrap_or_else(|| "uninitialized".to_string());

        eprintln!("session {}", self.session.id());
        eprintln!("  phase:      {}", phase);
        if let Some(channel) = self.session.outbound_channel().await {
            let state = if snapshot.outbound_channel_open { "open" } else { "pending" };
            eprintln!("  outbound:   {} ({})", channel.label, state);
        }
        if let Some(channel) = self.session.inbound_channel().await {
            eprintln!("  inbound:    {}", channel.label);
        }
        eprintln!(
            "  tracks:     {} local, {} remote",
            snapshot.local_track_count, snapshot.remote_track_count
        );
        eprintln!("  candidates: {} local", snapshot.local_candidate_count);
        if let Some(initiator) = self.session.closed_by().await {
            eprintln!("  closed by:  {:?}", initiator);
        }
        eprintln!(
            "  available:  {}",
            snapshot.affordances().enabled().join(", ")
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "peerpaste starting");

    let config = build_config(&args)?;
    let session_config = SessionConfig::default()
        .with_event_history_capacity(args.history)
        .with_default_channel_label(args.channel_label.clone());
    let factory = WebRtcTransportFactory::new(config.clone());
    let session = Session::try_with_config(Arc::new(factory), session_config)?;

    let mut repl = Repl {
        session,
        config,
        printer: None,
    };
    repl.watch_events();
    eprintln!("type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending: Option<Command> = None;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };
        let Some(line) = line else { break };

        let command = match pending.take() {
            Some(_) if line.trim().is_empty() => {
                eprintln!("payload cancelled");
                continue;
            }
            Some(mut command) => {
                command.extend_payload(&line);
                command
            }
            None => match line.parse::<Command>() {
                Ok(command) => command,
                Err(CommandError::Empty) => continue,
                Err(e) => {
                    eprintln!("error: {}", e);
                    continue;
                }
            },
        };

        if command.awaits_payload() {
            pending = Some(command);
            continue;
        }

        match repl.execute(command).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => eprintln!("error: {}", e),
        }
    }

    if repl.session.snapshot().await.can_close() {
        repl.session.close_connection().await?;
    }
    info!("peerpaste stopped");
    Ok(())
}
