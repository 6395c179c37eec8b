//! Raspberry Pi UART transport

use super::{SerialTransport, TransportError};
use crate::mapping::mapping_types::{Parity, SerialConfig};
use rppal::uart::{self, Uart};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Serial transport over one or more `/dev/tty*` UARTs
///
/// Ports are opened up front with the framing of the first rule that targets
/// them. Writes run in non-blocking mode and are retried until the timeout.
#[derive(Default)]
pub struct UartTransport {
    ports: HashMap<u8, Mutex<Uart>>,
}

impl UartTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_port(
        &mut self,
        port: u8,
        path: &Path,
        config: &SerialConfig,
    ) -> Result<(), TransportError> {
        let parity = match config.parity {
            Parity::None => uart::Parity::None,
            Parity::Odd => uart::Parity::Odd,
            Parity::Even => uart::Parity::Even,
        };
        let mut device = Uart::with_path(
            path,
            config.baud_rate,
            parity,
            config.data_bits,
            config.stop_bits,
        )
        .map_err(|e| TransportError::Bus(format!("{}: {}", path.display(), e)))?;
        device
            .set_write_mode(false)
            .map_err(|e| TransportError::Bus(e.to_string()))?;

        info!(
            "Opened UART {} as port {} at {} baud",
            path.display(),
            port,
            config.baud_rate
        );
        self.ports.insert(port, Mutex::new(device));
        Ok(())
    }
}

impl SerialTransport for UartTransport {
    fn send(&self, port: u8, payload: &[u8], timeout: Duration) -> Result<(), TransportError> {
        let device = self
            .ports
            .get(&port)
            .ok_or(TransportError::PortUnavailable(port))?;
        let mut device = match device.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("UART port {} lock poisoned, recovering", port);
                poisoned.into_inner()
            }
        };

        let deadline = Instant::now() + timeout;
        let mut written = 0;
        while written < payload.len() {
            written += device
                .write(&payload[written..])
                .map_err(|e| TransportError::Bus(e.to_string()))?;
            if written < payload.len() {
                if Instant::now() >= deadline {
                    return Err(TransportError::Timeout { port, timeout });
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        Ok(())
    }
}
