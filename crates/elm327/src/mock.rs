//! Scripted Mock Adapter
//!
//! Emulates an ELM327 on an in-memory duplex stream: canned responses keyed
//! by command, `>` prompt framing, and a log of every command received. No
//! hardware required.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tracing::debug;

/// A scripted ELM327 stand-in.
///
/// Responses registered with [`respond`](MockAdapter::respond) are sent with
/// `\r\n\r\n>` framing appended (unless the body already carries a prompt);
/// unknown commands get the adapter's `?` reply. Response tables are shared,
/// so scripts can be extended or overwritten after the channel is handed to
/// a session.
#[derive(Clone, Default)]
pub struct MockAdapter {
    responses: Arc<Mutex<HashMap<String, String>>>,
    verbatim: Arc<Mutex<HashMap<String, String>>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl MockAdapter {
    /// Create a mock pre-seeded with reset and echo-off replies.
    pub fn new() -> Self {
        let mock = Self::default();
        mock.respond("ATZ", "\r\nELM327 v1.5");
        mock.respond("ATE0", "ATE0\r\nOK");
        mock
    }

    /// Register (or overwrite) the reply body for a command.
    pub fn respond(&self, cmd: &str, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(cmd.to_string(), body.to_string());
    }

    /// Register a reply sent on the wire exactly as given, with no prompt
    /// framing added. Useful for simulating a silent or truncated adapter.
    pub fn respond_verbatim(&self, cmd: &str, wire: &str) {
        self.verbatim
            .lock()
            .unwrap()
            .insert(cmd.to_string(), wire.to_string());
    }

    /// Every command received so far, in order.
    pub fn received(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Spawn the responder task and return the session's end of the stream.
    pub fn channel(&self) -> DuplexStream {
        let (client, server) = tokio::io::duplex(1024);
        let responses = self.responses.clone();
        let verbatim = self.verbatim.clone();
        let log = self.log.clone();

        tokio::spawn(async move {
            let (rd, mut wr) = tokio::io::split(server);
            let mut lines = BufReader::new(rd).lines();
            while let Ok(Some(cmd)) = lines.next_line().await {
                if cmd.is_empty() {
                    continue;
                }
                debug!("mock adapter received '{}'", cmd);
                log.lock().unwrap().push(cmd.clone());

                let wire = if let Some(raw) = verbatim.lock().unwrap().get(&cmd) {
                    raw.clone()
                } else {
                    match responses.lock().unwrap().get(&cmd) {
                        Some(body) if body.contains('>') => body.clone(),
                        Some(body) => format!("{body}\r\n\r\n>"),
                        None => "?\r\n\r\n>".to_string(),
                    }
                };
                if wr.write_all(wire.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        client
    }
}
