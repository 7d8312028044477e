//! Mock connector for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{Connector, ConnectorError};
use crate::protocol::{Frame, KEY_SYNC};

#[derive(Default)]
struct MockState {
    rx_queue: VecDeque<Vec<u8>>,
    write_log: Vec<Vec<u8>>,
    connected: bool,
    echo_sync: bool,
    last_error: Option<String>,
    finished: bool,
}

/// Mock connector for unit testing dispatch and pump logic.
///
/// Handles out to the same state can be cloned so a test can script rx
/// data and inspect writes while the pump thread owns the connector.
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                connected: true,
                ..MockState::default()
            })),
        }
    }

    /// Queue bytes to be returned on the next read.
    pub fn queue_rx(&self, data: &[u8]) {
        self.state.lock().unwrap().rx_queue.push_back(data.to_vec());
    }

    /// Queue one wire line for a key-value pair.
    pub fn queue_kv(&self, key: &str, value: &str) {
        self.queue_rx(crate::protocol::encode_kv(key, value).as_bytes());
    }

    /// Echo written `__sync` frames back into the rx queue, simulating a
    /// DUT that acknowledges the handshake.
    pub fn set_echo_sync(&self, enabled: bool) {
        self.state.lock().unwrap().echo_sync = enabled;
    }

    /// All captured writes.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().write_log.clone()
    }

    /// Captured writes decoded as wire frames.
    pub fn written_frames(&self) -> Vec<Frame> {
        self.writes()
            .iter()
            .filter_map(|w| Frame::decode(&String::from_utf8_lossy(w)))
            .collect()
    }

    /// Simulate a dropped connection.
    pub fn disconnect(&self) {
        self.state.lock().unwrap().connected = false;
    }

    pub fn reconnect(&self) {
        self.state.lock().unwrap().connected = true;
    }

    /// Whether `finish` has been called.
    pub fn finished(&self) -> bool {
        self.state.lock().unwrap().finished
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for MockConnector {
    fn read(&mut self, _max: usize) -> Result<Vec<u8>, ConnectorError> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(ConnectorError::Disconnected);
        }
        Ok(state.rx_queue.pop_front().unwrap_or_default())
    }

    fn write(&mut self, data: &[u8], _log: bool) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            state.last_error = Some("mock disconnected".into());
            return false;
        }
        state.write_log.push(data.to_vec());
        if state.echo_sync
            && let Some(frame) = Frame::decode(&String::from_utf8_lossy(data))
            && frame.key == KEY_SYNC
        {
            let echo = crate::protocol::encode_kv(&frame.key, &frame.value);
            state.rx_queue.push_back(echo.into_bytes());
        }
        true
    }

    // Queued rx data is the test script; flushing must not discard it.
    fn flush(&mut self) {}

    fn reset(&mut self) {}

    fn connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn last_error(&self) -> Option<String> {
        self.state.lock().unwrap().last_error.clone()
    }

    fn finish(&mut self) {
        self.state.lock().unwrap().finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rx_queue_drains_in_order() {
        let mut mock = MockConnector::new();
        mock.queue_rx(b"first");
        mock.queue_rx(b"second");

        assert_eq!(mock.read(64).unwrap(), b"first");
        assert_eq!(mock.read(64).unwrap(), b"second");
        assert!(mock.read(64).unwrap().is_empty());
    }

    #[test]
    fn write_capture() {
        let mut mock = MockConnector::new();
        assert!(mock.write(b"hello", false));
        mock.write_kv("echo", "abc");

        let writes = mock.writes();
        assert_eq!(writes[0], b"hello");
        assert_eq!(writes[1], b"{{echo;abc}}\n");
    }

    #[test]
    fn disconnect_fails_io() {
        let mut mock = MockConnector::new();
        mock.disconnect();
        assert!(!mock.connected());
        assert!(mock.read(64).is_err());
        assert!(!mock.write(b"test", false));
    }

    #[test]
    fn sync_echo() {
        let mut mock = MockConnector::new();
        mock.set_echo_sync(true);
        mock.write_kv(KEY_SYNC, "uuid-1");

        let echoed = mock.read(64).unwrap();
        let frame = Frame::decode(&String::from_utf8_lossy(&echoed)).unwrap();
        assert_eq!(frame.key, KEY_SYNC);
        assert_eq!(frame.value, "uuid-1");
    }
}
