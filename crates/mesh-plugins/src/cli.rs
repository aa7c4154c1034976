//! Command-line modality.
//!
//! Each line typed on stdin becomes a `dispatch` call for the coordinator's
//! language understanding service. `quit` or end of input stops the runtime.

use async_trait::async_trait;
use mesh_core::ipc::protocol::{to_payload, DispatchArgs, DISPATCH};
use mesh_core::{CommChannel, MeshError, Message, Plugin, PluginSettings};
use std::io::BufRead;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const QUIT: &str = "quit";

type LineSource = Box<dyn BufRead + Send>;

pub struct Cli {
    source: Mutex<Option<LineSource>>,
    lines: tokio::sync::Mutex<Option<mpsc::Receiver<String>>>,
    reply_timeout: Duration,
}

impl std::fmt::Debug for Cli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cli")
            .field("reply_timeout", &self.reply_timeout)
            .finish_non_exhaustive()
    }
}

impl Cli {
    /// Read lines from `source` instead of stdin.
    pub fn from_reader(source: impl BufRead + Send + 'static, reply_timeout: Duration) -> Self {
        Self {
            source: Mutex::new(Some(Box::new(source))),
            lines: tokio::sync::Mutex::new(None),
            reply_timeout,
        }
    }

    /// Stdin-backed CLI. Reads the `replyTimeoutMs` option.
    pub fn from_settings(settings: &PluginSettings) -> Self {
        let timeout = settings
            .option_millis("replyTimeoutMs")
            .unwrap_or(DEFAULT_REPLY_TIMEOUT);
        Self::from_reader(std::io::BufReader::new(std::io::stdin()), timeout)
    }

    /// Start the input thread. Lines arrive trimmed; the channel closes at EOF.
    ///
    /// The thread is detached: a read blocked on a terminal must not hold up
    /// process exit.
    fn start_input(&self) -> std::io::Result<mpsc::Receiver<String>> {
        let source = self
            .source
            .lock()
            .ok()
            .and_then(|mut source| source.take())
            .ok_or_else(|| std::io::Error::other("input already consumed"))?;

        let (tx, rx) = mpsc::channel(16);
        std::thread::Builder::new()
            .name("mesh-cli-input".to_string())
            .spawn(move || {
                for line in source.lines() {
                    let line = match line {
                        Ok(line) => line.trim().to_string(),
                        Err(e) => {
                            warn!("Failed to read input: {}", e);
                            break;
                        }
                    };
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                debug!("Input closed");
            })?;
        Ok(rx)
    }

    async fn next_line(&self) -> Option<String> {
        let mut lines = self.lines.lock().await;
        if lines.is_none() {
            match self.start_input() {
                Ok(rx) => *lines = Some(rx),
                Err(e) => {
                    error!("Failed to start input reader: {}", e);
                    return None;
                }
            }
        }
        lines.as_mut()?.recv().await
    }

    async fn send_dispatch(&self, comm: &CommChannel, text: String) -> mesh_core::Result<()> {
        let args = to_payload(&DispatchArgs { text })?;
        let continuation = comm.send_and_register(Message::with_args(DISPATCH, args))?;

        match comm.await_reply_timeout(continuation, self.reply_timeout).await {
            Ok(reply) => {
                match reply.error_message() {
                    Some(message) => println!("error: {message}"),
                    None => {
                        let response = reply.response.unwrap_or_default();
                        println!("{}", serde_json::Value::Object(response));
                    }
                }
                Ok(())
            }
            Err(MeshError::NoResponse { id }) => {
                debug!("No reply to dispatch {}", id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Plugin for Cli {
    fn name(&self) -> &str {
        "cli"
    }

    async fn tick(&self, comm: &CommChannel) -> bool {
        let Some(line) = self.next_line().await else {
            info!("End of input");
            return false;
        };

        match line.as_str() {
            "" => true,
            QUIT => false,
            _ => match self.send_dispatch(comm, line).await {
                Ok(()) => true,
                Err(e) => {
                    error!("Failed to dispatch input: {}", e);
                    false
                }
            },
        }
    }
}
