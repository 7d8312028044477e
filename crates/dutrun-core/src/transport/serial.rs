//! Local serial port connector.

use std::io::{Read, Write};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::traits::{Connector, ConnectorError};

/// Serial backend configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Bounded read timeout; an expired read returns no bytes, not an error.
    pub read_timeout: Duration,
}

/// Connector over a local serial console.
pub struct SerialConnector {
    port_name: String,
    port: Option<Box<dyn serialport::SerialPort>>,
    last_error: Option<String>,
}

impl SerialConnector {
    /// Open the configured port.
    pub fn open(config: &SerialConfig) -> Result<Self, ConnectorError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.read_timeout)
            .open()
            .map_err(|e| ConnectorError::OpenFailed {
                port: config.port.clone(),
                message: e.to_string(),
            })?;

        info!(port = %config.port, baud = config.baud_rate, "serial port opened");
        Ok(Self {
            port_name: config.port.clone(),
            port: Some(port),
            last_error: None,
        })
    }
}

impl Connector for SerialConnector {
    fn read(&mut self, max: usize) -> Result<Vec<u8>, ConnectorError> {
        let Some(port) = self.port.as_mut() else {
            return Err(ConnectorError::Disconnected);
        };

        let mut buffer = vec![0u8; max];
        match port.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                Ok(buffer)
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => {
                self.last_error = Some(format!("serial read error: {e}"));
                Err(ConnectorError::ReadFailed(e.to_string()))
            }
        }
    }

    fn write(&mut self, data: &[u8], log: bool) -> bool {
        let Some(port) = self.port.as_mut() else {
            self.last_error = Some("serial port not open".into());
            return false;
        };

        match port.write_all(data) {
            Ok(()) => {
                if log {
                    debug!(bytes = data.len(), tx = %String::from_utf8_lossy(data).trim_end(), "TX");
                }
                true
            }
            Err(e) => {
                self.last_error = Some(format!("serial write error: {e}"));
                error!(port = %self.port_name, error = %e, "serial write failed");
                false
            }
        }
    }

    fn flush(&mut self) {
        if let Some(port) = self.port.as_mut() {
            let _ = port.clear(serialport::ClearBuffer::All);
        }
    }

    fn reset(&mut self) {
        if let Some(port) = self.port.as_mut() {
            safe_send_break(port.as_mut());
        }
    }

    fn connected(&self) -> bool {
        self.port.is_some()
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }

    fn finish(&mut self) {
        if self.port.take().is_some() {
            info!(port = %self.port_name, "serial port closed");
        }
    }
}

impl Drop for SerialConnector {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Send a break condition, degrading gracefully.
///
/// On some platforms the driver errors out of `send_break` instead of
/// performing it; clearing the break state then still releases the reset
/// signal on the target MCU.
pub fn safe_send_break(port: &mut dyn serialport::SerialPort) -> bool {
    if let Err(e) = port.set_break() {
        warn!(error = %e, "set_break failed, clearing break state instead");
        if let Err(e) = port.clear_break() {
            error!(error = %e, "clear_break failed");
            return false;
        }
        return true;
    }
    std::thread::sleep(Duration::from_millis(100));
    if let Err(e) = port.clear_break() {
        error!(error = %e, "clear_break failed");
        return false;
    }
    true
}
