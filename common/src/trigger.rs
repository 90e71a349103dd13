//! Client side of the Controller mailbox (spec §4.6): a tiny fire-and-forget
//! sender over a Unix datagram socket. Kept here, not in `controller`, so the
//! Broker and callback handlers never link against scheduler internals —
//! they only ever push a trigger, following spec §9's "cyclic references
//! broken by message passing" note.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::net::UnixDatagram;
use tracing::warn;

pub const SCHEDULER_DESTINATION: &str = "scheduler";

#[derive(Serialize)]
struct Trigger<'a> {
    destination: &'a str,
}

#[derive(Clone)]
pub struct TriggerClient {
    socket_path: PathBuf,
}

impl TriggerClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self { socket_path: socket_path.into() }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Best-effort: a dropped trigger costs nothing but latency, since the
    /// Controller's own passes and startup recovery converge on the same
    /// state eventually. Never surfaced as an error to HTTP callers.
    pub async fn trigger_scheduler(&self) {
        let payload = match serde_json::to_vec(&Trigger { destination: SCHEDULER_DESTINATION }) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to encode scheduler trigger");
                return;
            }
        };

        let socket = match UnixDatagram::unbound() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to open mailbox client socket");
                return;
            }
        };

        if let Err(e) = socket.send_to(&payload, &self.socket_path).await {
            warn!(error = %e, path = %self.socket_path.display(), "failed to send scheduler trigger");
        }
    }
}
