//! Coalescing mailbox (spec §4.6): a local Unix datagram socket that the
//! Broker and callback handlers push triggers into, reduced to "at least one
//! pass is pending" via a depth-1 channel. Grounded on
//! `backend/src/execution/executor.rs`'s `PairExecutorRouter` channel
//! pattern (bounded mpsc, single reader loop), adapted from per-pair routing
//! to a single pending-trigger slot: this is the single-writer boundary, not
//! a work-distribution one.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::net::UnixDatagram;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Deserialize)]
struct Trigger {
    #[allow(dead_code)]
    destination: String,
}

pub struct Mailbox {
    rx: mpsc::Receiver<()>,
    tx: mpsc::Sender<()>,
}

impl Mailbox {
    /// Binds `socket_path`, removing any stale socket left by a prior crash,
    /// and spawns the datagram reader task. Mode 0o700 per spec §6.
    pub fn bind(socket_path: &Path) -> Result<Self> {
        if socket_path.exists() {
            fs::remove_file(socket_path)
                .with_context(|| format!("removing stale mailbox socket {}", socket_path.display()))?;
        }
        if let Some(parent) = socket_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating mailbox socket directory {}", parent.display()))?;
        }

        let socket = UnixDatagram::bind(socket_path)
            .with_context(|| format!("binding mailbox socket {}", socket_path.display()))?;
        fs::set_permissions(socket_path, fs::Permissions::from_mode(0o700))
            .with_context(|| format!("setting mailbox socket permissions {}", socket_path.display()))?;

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(read_loop(socket, tx.clone()));

        Ok(Self { rx, tx })
    }

    /// Waits for the next trigger. Triggers that arrived while a pass was in
    /// flight are already coalesced into this single wakeup.
    pub async fn recv(&mut self) {
        let _ = self.rx.recv().await;
    }

    /// Schedules a follow-up pass without a round-trip through the socket —
    /// used by startup recovery and by a pass that needs re-entry.
    pub fn self_trigger(&self) {
        let _ = self.tx.try_send(());
    }
}

async fn read_loop(socket: UnixDatagram, tx: mpsc::Sender<()>) {
    let mut buf = [0u8; 1024];
    loop {
        match socket.recv(&mut buf).await {
            Ok(n) => {
                if serde_json::from_slice::<Trigger>(&buf[..n]).is_ok() {
                    // try_send coalesces: a full channel means a pass is
                    // already pending, so this trigger is redundant.
                    let _ = tx.try_send(());
                } else {
                    warn!("mailbox received malformed trigger, ignoring");
                }
            }
            Err(e) => warn!(error = %e, "mailbox recv failed"),
        }
    }
}
