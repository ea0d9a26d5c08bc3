//! Interactive command language of the `peerpaste` binary
//!
//! One command per line. Payload arguments accept either the compact
//! single-line token or JSON; a JSON payload may span several lines.

use std::fmt;
use std::str::FromStr;

use peerpaste_core::TrackKind;

/// Errors produced while parsing a command line
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),

    #[error("'{command}' needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("invalid argument for '{command}': {value}")]
    InvalidArgument { command: &'static str, value: String },
}

/// Output form of `export`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Single-line base64 token
    #[default]
    Token,
    /// Pretty JSON
    Json,
}

/// A parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Init,
    /// Create the outbound channel, optionally with a label
    Channel(Option<String>),
    Track(TrackKind),
    Untrack,
    Offer,
    Answer,
    /// Commit the generated description
    Commit,
    /// Apply only the description of a pasted payload
    Remote(String),
    /// Apply only the candidates of a pasted payload
    Candidates(String),
    /// Apply the description and, when legal, the candidates of a payload
    Import(String),
    Export(ExportFormat),
    Send(String),
    CloseChannel,
    CloseInbound,
    StopRemote,
    Close,
    Clear,
    Status,
    /// Show the newest `n` events (all when absent)
    History(Option<usize>),
    Help,
    Quit,
}

impl Command {
    /// Whether this command takes a payload that may follow on later lines
    pub fn awaits_payload(&self) -> bool {
        match self {
            Command::Remote(p) | Command::Candidates(p) | Command::Import(p) => {
                !payload_complete(p)
            }
            _ => false,
        }
    }

    /// Append a continuation line to a pending payload argument
    pub fn extend_payload(&mut self, line: &str) {
        if let Command::Remote(p) | Command::Candidates(p) | Command::Import(p) = self {
            if !p.is_empty() {
                p.push('\n');
            }
            p.push_str(line);
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Init => "init",
            Command::Channel(_) => "channel",
            Command::Track(_) => "track",
            Command::Untrack => "untrack",
            Command::Offer => "offer",
            Command::Answer => "answer",
            Command::Commit => "commit",
            Command::Remote(_) => "remote",
            Command::Candidates(_) => "candidates",
            Command::Import(_) => "import",
            Command::Export(_) => "export",
            Command::Send(_) => "send",
            Command::CloseChannel => "close-channel",
            Command::CloseInbound => "close-inbound",
            Command::StopRemote => "stop-remote",
            Command::Close => "close",
            Command::Clear => "clear",
            Command::Status => "status",
            Command::History(_) => "history",
            Command::Help => "help",
            Command::Quit => "quit",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "" => return Err(CommandError::Empty),
            "init" => Command::Init,
            "channel" => Command::Channel((!rest.is_empty()).then(|| rest.to_string())),
            "track" => Command::Track(match rest.to_ascii_lowercase().as_str() {
                "audio" => TrackKind::Audio,
                "video" => TrackKind::Video,
                "" => {
                    return Err(CommandError::MissingArgument {
                        command: "track",
                        argument: "a kind (audio or video)",
                    })
                }
                other => {
                    return Err(CommandError::InvalidArgument {
                        command: "track",
                        value: other.to_string(),
                    })
                }
            }),
            "untrack" => Command::Untrack,
            "offer" => Command::Offer,
            "answer" => Command::Answer,
            "commit" => Command::Commit,
            "remote" => Command::Remote(rest.to_string()),
            "candidates" => Command::Candidates(rest.to_string()),
            "import" => Command::Import(rest.to_string()),
            "export" => Command::Export(match rest.to_ascii_lowercase().as_str() {
                "" | "token" => ExportFormat::Token,
                "json" => ExportFormat::Json,
                other => {
                    return Err(CommandError::InvalidArgument {
                        command: "export",
                        value: other.to_string(),
                    })
                }
            }),
            "send" => {
                if rest.is_empty() {
                    return Err(CommandError::MissingArgument {
                        command: "send",
                        argument: "a message",
                    });
                }
                Command::Send(rest.to_string())
            }
            "close-channel" => Command::CloseChannel,
            "close-inbound" => Command::CloseInbound,
            "stop-remote" => Command::StopRemote,
            "close" => Command::Close,
            "clear" => Command::Clear,
            "status" => Command::Status,
            "history" => Command::History(if rest.is_empty() {
                None
            } else {
                Some(rest.parse().map_err(|_| CommandError::InvalidArgument {
                    command: "history",
                    value: rest.to_string(),
                })?)
            }),
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// Whether a pasted payload is complete: a non-empty token, or JSON whose
/// braces balance
pub fn payload_complete(payload: &str) -> bool {
    let payload = payload.trim();
    if payload.is_empty() {
        return false;
    }
    if !payload.starts_with('{') {
        return true;
    }

    let mut depth = 0i64;
    let mut in_string = false;
    let mut escaped = false;
    for c in payload.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
    }
    depth <= 0
}

/// Help text listing every command
pub const HELP: &str = "\
commands:
  init                    create the transport
  channel [label]         create the outbound data channel
  track audio|video       attach a local media track
  untrack                 detach every local track
  offer                   create an offer
  answer                  create an answer
  commit                  commit the created offer/answer
  remote <payload>        apply the peer's description
  candidates <payload>    apply the peer's candidates
  import <payload>        apply description and candidates
  export [token|json]     print the payload for the peer (stdout)
  send <text>             send over the outbound channel
  close-channel           close the outbound channel
  close-inbound           close the inbound channel
  stop-remote             stop the peer's tracks
  close                   close the connection
  clear                   reset after closing
  status                  show phase and available actions
  history [n]             show recent events, newest first
  quit                    leave";
