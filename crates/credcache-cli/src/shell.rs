//! Line-oriented shell driving a credential session

use std::sync::Arc;

use credential_cache::{
    CredentialSession, Enablement, KeyProvider, OsRandom, RandomSource, SoftwareKeyProvider,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::command::{Command, HELP};

/// Source of secrets typed by the user
pub trait SecretPrompt: Send + Sync {
    fn prompt(&self, label: &str) -> std::io::Result<String>;
}

/// Reads secrets from the terminal without echo
pub struct TerminalPrompt;

impl SecretPrompt for TerminalPrompt {
    fn prompt(&self, label: &str) -> std::io::Result<String> {
        rpassword::prompt_password(label)
    }
}

/// Interactive shell over a credential session
pub struct Shell<P: KeyProvider = SoftwareKeyProvider, R: RandomSource = OsRandom> {
    session: CredentialSession<P, R>,
    prompt: Arc<dyn SecretPrompt>,
}

impl<P, R> Shell<P, R>
where
    P: KeyProvider + 'static,
    R: RandomSource + 'static,
{
    pub fn new(session: CredentialSession<P, R>, prompt: Arc<dyn SecretPrompt>) -> Self {
        Self { session, prompt }
    }

    /// Run until `quit` or end of input, then close the session
    pub async fn run<I, O>(self, input: I, mut output: O) -> anyhow::Result<()>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();

        while let Some(line) = lines.next_line().await? {
            let command = match Command::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    write_line(&mut output, &e.to_string()).await?;
                    continue;
                }
            };

            debug!("Executing {:?}", command);
            if command == Command::Quit {
                break;
            }
            let reply = self.execute(command).await?;
            write_line(&mut output, &reply).await?;
        }

        output.flush().await?;
        self.session.close().await;
        Ok(())
    }

    async fn execute(&self, command: Command) -> anyhow::Result<String> {
        let cache = self.session.cache();

        let reply = match command {
            Command::Store(name) => match cache.is_enabled() {
                Enablement::Enabled => {
                    let mut secret = Zeroizing::new(self.read_secret(&name).await?.into_bytes());
                    match cache.store(&name, &mut secret).await {
                        Ok(()) => format!("cached secret for {}", name),
                        Err(e) if e.is_recoverable() => {
                            warn!("Caching {} failed: {}", name, e);
                            format!("could not cache secret for {} ({})", name, e)
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Enablement::Disabled => "caching is disabled for this session".to_string(),
                Enablement::Undecided => {
                    "caching is undecided; answer with `enable yes|no` first".to_string()
                }
            },
            Command::Retrieve(name) => match cache.retrieve(&name).await {
                Ok(Some(secret)) => {
                    format!("retrieved {} bytes for {} (entry consumed)", secret.len(), name)
                }
                Ok(None) => format!("nothing cached for {}", name),
                Err(e) if e.is_recoverable() => {
                    warn!("Cache lookup for {} failed: {}", name, e);
                    format!("cache unavailable for {} ({}); prompt the user instead", name, e)
                }
                Err(e) => return Err(e.into()),
            },
            Command::Enable(enable) => {
                cache.set_enabled(enable);
                format!("caching {}", cache.is_enabled())
            }
            Command::Status => format!(
                "session {}: epoch {}, {}, {} entries, caching {}",
                self.session.id(),
                cache.epoch(),
                if cache.is_initialized() {
                    "active"
                } else {
                    "uninitialized"
                },
                cache.len(),
                cache.is_enabled()
            ),
            Command::Host(state) => {
                self.session.report_host_state(state);
                tokio::task::yield_now().await;
                format!("host is now {:?}", state)
            }
            Command::Clear => {
                cache.clear();
                "cache cleared".to_string()
            }
            Command::Help => HELP.trim_end().to_string(),
            Command::Quit => String::new(),
        };
        Ok(reply)
    }

    async fn read_secret(&self, name: &str) -> anyhow::Result<String> {
        let prompt = Arc::clone(&self.prompt);
        let label = format!("Secret for {}: ", name);
        let secret = tokio::task::spawn_blocking(move || prompt.prompt(&label)).await??;
        Ok(secret)
    }
}

async fn write_line<O: AsyncWrite + Unpin>(output: &mut O, line: &str) -> std::io::Result<()> {
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await
}
