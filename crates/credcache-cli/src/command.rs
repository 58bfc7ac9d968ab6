//! Shell command parsing

use credential_cache::HostState;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

/// A single shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Prompt for a secret and cache it under a name
    Store(String),
    /// Consume the cached secret for a name
    Retrieve(String),
    /// Record the caching decision
    Enable(bool),
    Status,
    /// Simulate a host state change
    Host(HostState),
    /// Clear the cache directly
    Clear,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Returns `Ok(None)` for blank lines.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();
        if words.next().is_some() {
            return Err(CommandError::Usage(usage(verb)));
        }

        let command = match (verb, arg) {
            ("store", Some(name)) => Command::Store(name.to_string()),
            ("retrieve", Some(name)) => Command::Retrieve(name.to_string()),
            ("enable", Some("yes" | "on" | "true")) => Command::Enable(true),
            ("enable", Some("no" | "off" | "false")) => Command::Enable(false),
            ("status", None) => Command::Status,
            ("active", None) => Command::Host(HostState::Active),
            ("idle", None) => Command::Host(HostState::Idle),
            ("lock", None) => Command::Host(HostState::Locked),
            ("clear", None) => Command::Clear,
            ("help", None) => Command::Help,
            ("quit" | "exit", None) => Command::Quit,
            ("store" | "retrieve" | "enable" | "status" | "active" | "idle" | "lock" | "clear"
            | "help" | "quit" | "exit", _) => return Err(CommandError::Usage(usage(verb))),
            _ => return Err(CommandError::Unknown(verb.to_string())),
        };
        Ok(Some(command))
    }
}

fn usage(verb: &str) -> &'static str {
    match verb {
        "store" => "store <name>",
        "retrieve" => "retrieve <name>",
        "enable" => "enable yes|no",
        "active" => "active",
        "idle" => "idle",
        "lock" => "lock",
        "clear" => "clear",
        "quit" | "exit" => "quit",
        "help" => "help",
        _ => "status",
    }
}

pub const HELP: &str = "\
Commands:
  store <name>      prompt for a secret and cache it
  retrieve <name>   consume the cached secret
  enable yes|no     record the caching decision (first answer wins)
  status            show cache state
  active|idle|lock  report a host state change
  clear             clear the cache now
  quit              exit
";
