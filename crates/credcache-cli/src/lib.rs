//! Interactive shell for the credential cache
//!
//! Reads commands from stdin and drives a [`credential_cache::CredentialSession`],
//! including simulated host lock and idle reports.

pub mod command;
pub mod shell;

pub use command::{Command, CommandError};
pub use shell::{SecretPrompt, Shell, TerminalPrompt};
