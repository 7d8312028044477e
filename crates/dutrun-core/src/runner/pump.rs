//! The I/O pump thread.
//!
//! The pump exclusively owns the connector for the life of a run: it
//! drains the DUT queue into blocking writes, reads bytes with a bounded
//! timeout, buffers them into lines, decodes frames, and performs the
//! sync handshake. Everything it learns flows up the main queue; nothing
//! else touches the transport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::dispatcher::{DispatchSignal, DutMessage};
use crate::protocol::{Frame, KEY_HOST_TEST_NAME, KEY_SYNC, KEY_TIMEOUT, KEY_VERSION};
use crate::transport::Connector;

const READ_CHUNK: usize = 512;

/// Sync handshake and pacing parameters.
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// How many sync packets to send: 0 none, -1 forever, N times.
    pub sync_behavior: i32,
    /// Delay between sync packets.
    pub sync_timeout: Duration,
    /// Idle sleep when a read returns nothing.
    pub idle_sleep: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            sync_behavior: 2,
            sync_timeout: Duration::from_secs(5),
            idle_sleep: Duration::from_millis(10),
        }
    }
}

/// Spawn the pump thread; it owns `connector` until it exits and always
/// calls `finish()` on the way out.
pub fn spawn_pump(
    connector: Box<dyn Connector>,
    main_tx: Sender<DispatchSignal>,
    dut_rx: Receiver<DutMessage>,
    config: PumpConfig,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("dut-io-pump".into())
        .spawn(move || pump_loop(connector, main_tx, dut_rx, config))
        .expect("failed to spawn pump thread")
}

struct SyncState {
    behavior: i32,
    timeout: Duration,
    sent: Vec<String>,
    sends: i32,
    last_send: Option<Instant>,
    synced: bool,
}

impl SyncState {
    fn new(config: &PumpConfig) -> Self {
        Self {
            behavior: config.sync_behavior,
            timeout: config.sync_timeout,
            sent: Vec::new(),
            sends: 0,
            last_send: None,
            synced: false,
        }
    }

    /// Whether another sync packet is due now.
    fn due(&self) -> bool {
        if self.synced || self.behavior == 0 {
            return false;
        }
        if self.behavior > 0 && self.sends >= self.behavior {
            return false;
        }
        match self.last_send {
            None => true,
            Some(at) => at.elapsed() >= self.timeout,
        }
    }

    /// Whether the handshake is exhausted without an acknowledgement.
    fn exhausted(&self) -> bool {
        !self.synced
            && self.behavior > 0
            && self.sends >= self.behavior
            && self
                .last_send
                .is_some_and(|at| at.elapsed() >= self.timeout)
    }

    /// Whether `value` acknowledges a packet we sent.
    fn acknowledge(&mut self, value: &str) -> bool {
        if self.sent.iter().any(|uuid| uuid == value) {
            self.synced = true;
            true
        } else {
            false
        }
    }
}

fn pump_loop(
    mut connector: Box<dyn Connector>,
    main_tx: Sender<DispatchSignal>,
    dut_rx: Receiver<DutMessage>,
    config: PumpConfig,
) {
    let mut sync = SyncState::new(&config);
    let mut line_buffer = String::new();

    connector.flush();

    'run: loop {
        // Outbound first: transmit in send order, single consumer.
        match drain_dut_queue(connector.as_mut(), &dut_rx, &main_tx) {
            QueueOutcome::Continue => {}
            QueueOutcome::Stop => break,
        }

        if sync.due() {
            let uuid = sync_uuid();
            info!(uuid = %uuid, attempt = sync.sends + 1, "sending sync packet");
            if connector.write_kv(KEY_SYNC, &uuid).is_none() {
                let reason = connector
                    .last_error()
                    .unwrap_or_else(|| "sync write failed".into());
                let _ = main_tx.send(DispatchSignal::ConnLost(reason));
                break;
            }
            sync.sent.push(uuid);
            sync.sends += 1;
            sync.last_send = Some(Instant::now());
        } else if sync.exhausted() {
            let _ = main_tx.send(DispatchSignal::SyncFailed(format!(
                "no sync acknowledgement after {} packets",
                sync.sends
            )));
            break;
        }

        let bytes = match connector.read(READ_CHUNK) {
            Ok(bytes) => bytes,
            Err(e) => {
                let reason = connector.last_error().unwrap_or_else(|| e.to_string());
                let _ = main_tx.send(DispatchSignal::ConnLost(reason));
                break;
            }
        };

        if bytes.is_empty() {
            std::thread::sleep(config.idle_sleep);
            continue;
        }

        line_buffer.push_str(&String::from_utf8_lossy(&bytes));
        while let Some(pos) = line_buffer.find('\n') {
            let line: String = line_buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }
            if handle_line(line, &mut sync, &main_tx).is_err() {
                break 'run;
            }
        }
    }

    debug!("pump stopping, releasing connector");
    connector.finish();
}

enum QueueOutcome {
    Continue,
    Stop,
}

fn drain_dut_queue(
    connector: &mut dyn Connector,
    dut_rx: &Receiver<DutMessage>,
    main_tx: &Sender<DispatchSignal>,
) -> QueueOutcome {
    loop {
        match dut_rx.try_recv() {
            Ok(DutMessage::Kv { key, value, .. }) => {
                if connector.write_kv(&key, &value).is_none() {
                    let reason = connector
                        .last_error()
                        .unwrap_or_else(|| "write failed".into());
                    warn!(key = %key, reason = %reason, "outbound write failed");
                    let _ = main_tx.send(DispatchSignal::ConnLost(reason));
                    return QueueOutcome::Stop;
                }
            }
            Ok(DutMessage::Reset) => {
                info!("resetting DUT through connector");
                connector.reset();
            }
            Ok(DutMessage::Finish) => return QueueOutcome::Stop,
            Err(TryRecvError::Empty) => return QueueOutcome::Continue,
            // Runner dropped its sender; nothing left to pump for.
            Err(TryRecvError::Disconnected) => return QueueOutcome::Stop,
        }
    }
}

/// Dispatch one received console line: raw first, then the frame in it.
fn handle_line(
    line: &str,
    sync: &mut SyncState,
    main_tx: &Sender<DispatchSignal>,
) -> Result<(), ()> {
    let send = |signal| main_tx.send(signal).map_err(|_| ());

    send(DispatchSignal::RawLine(line.to_string()))?;

    let Some(frame) = Frame::decode(line) else {
        return Ok(());
    };

    match frame.key.as_str() {
        KEY_SYNC => {
            if sync.acknowledge(&frame.value) {
                info!("sync handshake acknowledged");
                send(DispatchSignal::SyncObserved)?;
            } else {
                debug!(value = %frame.value, "unmatched sync echo ignored");
            }
        }
        KEY_HOST_TEST_NAME => send(DispatchSignal::HostTestName(frame.value))?,
        KEY_VERSION => info!(version = %frame.value, "DUT client version"),
        KEY_TIMEOUT => {
            if let Ok(secs) = frame.value.parse::<u64>() {
                send(DispatchSignal::TimeoutUpdate(secs))?;
            }
        }
        _ => send(DispatchSignal::Frame(frame))?,
    }
    Ok(())
}

/// Run-unique sync token.
fn sync_uuid() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("sync-{n}-{:.0}", crate::protocol::now() * 1000.0)
}
