//! The two-queue concurrency model.
//!
//! `mainQueue` carries signals from the I/O pump and host-test handlers up
//! to the run loop; `dutQueue` carries outbound key-value pairs down to
//! the pump for transmission. Each queue has exactly one consumer, so
//! frames dispatch in decode order and sends transmit in call order.

use std::sync::mpsc::Sender;

use crate::protocol::{Frame, now};

/// Signal flowing up the main queue to the run loop.
#[derive(Debug, Clone)]
pub enum DispatchSignal {
    /// A decoded key-value frame from the DUT.
    Frame(Frame),
    /// A raw console line (no frame found in it).
    RawLine(String),
    /// Log text from a host-test handler.
    Print(String),
    /// Host test finished; `None` means "no verdict yet, keep waiting".
    Complete(Option<bool>),
    /// The transport channel was lost.
    ConnLost(String),
    /// The sync handshake was exhausted without an acknowledgement.
    SyncFailed(String),
    /// The DUT acknowledged the sync handshake.
    SyncObserved,
    /// A host test requests a DUT reset of the given kind.
    ResetRequest(String),
    /// The DUT announced which host test it wants.
    HostTestName(String),
    /// The DUT announced its expected duration in seconds.
    TimeoutUpdate(u64),
}

/// Message flowing down the DUT queue to the I/O pump.
#[derive(Debug, Clone)]
pub enum DutMessage {
    /// Transmit one key-value pair.
    Kv {
        key: String,
        value: String,
        timestamp: f64,
    },
    /// Reset the DUT through the connector.
    Reset,
    /// Stop the pump and release the connector.
    Finish,
}

/// Clonable facade over both queue senders; the surface host tests talk to.
#[derive(Clone)]
pub struct TestHandle {
    main_tx: Sender<DispatchSignal>,
    dut_tx: Sender<DutMessage>,
}

impl TestHandle {
    pub fn new(main_tx: Sender<DispatchSignal>, dut_tx: Sender<DutMessage>) -> Self {
        Self { main_tx, dut_tx }
    }

    /// Enqueue a key-value pair for transmission to the DUT.
    ///
    /// Actual transmission happens on the pump thread; protocol logic
    /// never blocks on the wire.
    pub fn send_kv(&self, key: impl Into<String>, value: impl Into<String>) {
        let _ = self.dut_tx.send(DutMessage::Kv {
            key: key.into(),
            value: value.into(),
            timestamp: now(),
        });
    }

    /// Signal the run loop that the host test finished.
    pub fn notify_complete(&self, result: Option<bool>) {
        let _ = self.main_tx.send(DispatchSignal::Complete(result));
    }

    /// Push a log message onto the main queue.
    pub fn log(&self, text: impl Into<String>) {
        let _ = self.main_tx.send(DispatchSignal::Print(text.into()));
    }

    /// Request a DUT reset of the given kind.
    pub fn reset_dut(&self, kind: impl Into<String>) {
        let _ = self.main_tx.send(DispatchSignal::ResetRequest(kind.into()));
    }

    /// Report a lost connection to the run loop.
    pub fn notify_conn_lost(&self, text: impl Into<String>) {
        let _ = self.main_tx.send(DispatchSignal::ConnLost(text.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn send_order_is_preserved() {
        let (main_tx, main_rx) = channel();
        let (dut_tx, dut_rx) = channel();
        let handle = TestHandle::new(main_tx, dut_tx);

        handle.send_kv("echo", "1");
        handle.send_kv("echo", "2");
        handle.notify_complete(Some(true));

        match dut_rx.recv().unwrap() {
            DutMessage::Kv { value, .. } => assert_eq!(value, "1"),
            other => panic!("unexpected message: {other:?}"),
        }
        match dut_rx.recv().unwrap() {
            DutMessage::Kv { value, .. } => assert_eq!(value, "2"),
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(matches!(
            main_rx.recv().unwrap(),
            DispatchSignal::Complete(Some(true))
        ));
    }
}
