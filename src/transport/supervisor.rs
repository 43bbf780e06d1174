use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::timeout;

const SPAWN_TIMEOUT: Duration = Duration::from_secs(8);
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to launch transport binary: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport process exited before becoming ready")]
    DiedImmediately,
    #[error("timed out waiting for transport process to start")]
    Timeout,
}

/// Sent to the Room Registry when a supervised transport process dies
/// on its own, so the room can be torn down.
#[derive(Debug, Clone)]
pub struct TransportDied {
    pub room_id: String,
}

/// A handle to one spawned, supervised `jacktrip` process. Every handle
/// is backed by exactly one background task that owns the `Child` and
/// guarantees a `wait()` happens, whether the process dies on its own
/// or is stopped deliberately — no zombies either way.
pub struct TransportHandle {
    room_id: String,
    stop_tx: mpsc::Sender<()>,
    alive: Arc<AtomicBool>,
}

/// Spawns, tracks, and reaps external transport processes bound to
/// allocated ports. Each handle is backed by an async
/// `tokio::process::Child` and a dedicated reaper task rather than a
/// manual `try_wait()` poll loop.
pub struct TransportSupervisor {
    bin: String,
    death_tx: mpsc::UnboundedSender<TransportDied>,
}

impl TransportSupervisor {
    pub fn new(bin: String) -> (Self, mpsc::UnboundedReceiver<TransportDied>) {
        let (death_tx, death_rx) = mpsc::unbounded_channel();
        (Self { bin, death_tx }, death_rx)
    }

    /// Launch the transport binary bound to `port` for `room_id`, with a
    /// distinctive client name so the audio kernel exposes unambiguous
    /// port names, and with auto-patching always disabled — this is
    /// mandatory, never a configuration toggle, per the
    /// no-incident-audio-edges invariant.
    pub async fn spawn(&self, room_id: &str, port: u16, channels: u32) -> Result<TransportHandle, SpawnError> {
        let client_name = format!("jamhub-{room_id}");

        let mut cmd = Command::new(&self.bin);
        cmd.args([
            "-S",
            "-J",
            "--udpport",
            &port.to_string(),
            "--clientname",
            &client_name,
            "--numchans",
            &channels.to_string(),
            "--nojackportsconnect",
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

        let mut child = match timeout(SPAWN_TIMEOUT, async { cmd.spawn() }).await {
            Ok(Ok(child)) => child,
            Ok(Err(e)) => return Err(SpawnError::Io(e)),
            Err(_) => return Err(SpawnError::Timeout),
        };

        // Give the process a moment to fail fast (bad args, port already
        // bound at the OS level, missing library) before declaring the
        // room live.
        match timeout(Duration::from_millis(300), child.wait()).await {
            Ok(Ok(status)) if !status.success() => return Err(SpawnError::DiedImmediately),
            Ok(Err(e)) => return Err(SpawnError::Io(e)),
            _ => {}
        }

        Ok(self.supervise(room_id.to_string(), child))
    }

    /// Take ownership of a freshly-spawned child and install the reaper
    /// task: it waits on the process, reports unexpected death, and
    /// handles deliberate `stop()` requests by sending SIGTERM then
    /// escalating to SIGKILL after a grace window.
    fn supervise(&self, room_id: String, mut child: Child) -> TransportHandle {
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let alive = Arc::new(AtomicBool::new(true));
        let alive_in_task = alive.clone();
        let death_tx = self.death_tx.clone();
        let task_room_id = room_id.clone();

        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    alive_in_task.store(false, Ordering::SeqCst);
                    match status {
                        Ok(status) if status.success() => {
                            tracing::info!(room_id = %task_room_id, "transport process exited cleanly");
                        }
                        other => {
                            tracing::warn!(room_id = %task_room_id, ?other, "transport process died unexpectedly");
                            let _ = death_tx.send(TransportDied { room_id: task_room_id.clone() });
                        }
                    }
                }
                _ = stop_rx.recv() => {
                    terminate(&mut child).await;
                    alive_in_task.store(false, Ordering::SeqCst);
                }
            }
        });

        TransportHandle { room_id, stop_tx, alive }
    }

    pub fn alive(&self, handle: &TransportHandle) -> bool {
        handle.alive.load(Ordering::SeqCst)
    }

    /// Request a graceful stop: the reaper task sends SIGTERM, waits up
    /// to `STOP_GRACE`, then escalates to SIGKILL. Returns once the
    /// process has fully exited (the reaper task always performs the
    /// `wait()`), so callers awaiting cancellation still observe a
    /// collected exit status rather than a leaked child.
    pub async fn stop(&self, handle: TransportHandle) {
        tracing::info!(room_id = %handle.room_id, "stopping transport process");
        let _ = handle.stop_tx.send(()).await;
        // stop_tx being accepted (or already-closed, meaning the reaper
        // already observed exit) both imply termination is underway or
        // done; poll briefly for the alive flag to clear.
        while handle.alive.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let pid = nix::unistd::Pid::from_raw(pid as i32);
            let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
        }
    }

    let graceful = tokio::time::timeout(STOP_GRACE, child.wait()).await;
    if graceful.is_err() {
        tracing::warn!("transport process did not exit within grace window, killing");
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_missing_binary_surfaces_io_error() {
        let (sup, _death_rx) = TransportSupervisor::new("/no/such/jacktrip-binary".to_string());
        let result = sup.spawn("room-1", 61000, 2).await;
        assert!(matches!(result, Err(SpawnError::Io(_))));
    }

    #[tokio::test]
    async fn immediate_nonzero_exit_is_surfaced_as_died_immediately() {
        // `false` exits 1 immediately — exercises the fail-fast probe
        // without depending on `jacktrip` being installed in CI.
        let (sup, _death_rx) = TransportSupervisor::new("false".to_string());
        let result = sup.spawn("room-1", 61000, 2).await;
        assert!(matches!(result, Err(SpawnError::DiedImmediately)));
    }

    #[tokio::test]
    async fn spawn_and_stop_reaps_a_long_lived_process() {
        // Bypasses `spawn()`'s fixed jacktrip-style argument list (`sleep`
        // wouldn't accept them) to exercise `supervise`/`stop` directly
        // against a genuinely long-lived child.
        let (sup, _death_rx) = TransportSupervisor::new("unused".to_string());
        let child = Command::new("sleep").arg("30").kill_on_drop(true).spawn().unwrap();
        let handle = sup.supervise("room-1".to_string(), child);
        assert!(sup.alive(&handle));
        sup.stop(handle).await;
        assert!(!sup.alive(&handle));
    }
}
