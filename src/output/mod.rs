//! # Output Transports
//!
//! Serial and CAN drivers are external collaborators. The engine only sees the
//! two traits below and hands every send a bounded timeout, so a stuck port
//! costs one timeout per attempt and never blocks the table lock.
//!
//! Implementations shipped here:
//! - [`LogTransport`]: traces every payload, used when no hardware is attached
//! - [`RecordingTransport`] / [`FailingTransport`]: in-memory doubles
//! - `UartTransport` (feature `uart`): Raspberry Pi UART via `rppal`

pub mod dispatcher;
pub mod log_transport;
pub mod memory;
#[cfg(feature = "uart")]
pub mod uart;

pub use dispatcher::Dispatcher;
pub use log_transport::LogTransport;
pub use memory::{FailingTransport, RecordingTransport, SentMessage};

use crate::mapping::mapping_types::MAX_FIXED_PAYLOAD;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Send on port {port} timed out after {timeout:?}")]
    Timeout { port: u8, timeout: Duration },

    #[error("Port {0} is not available")]
    PortUnavailable(u8),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bus error: {0}")]
    Bus(String),
}

/// Classic CAN frame as handed to a [`CanTransport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    pub id: u32,
    pub extended: bool,
    pub dlc: u8,
    pub data: [u8; MAX_FIXED_PAYLOAD],
}

impl CanFrame {
    /// Builds a frame from up to 8 payload bytes; the rest is zero filled
    pub fn new(id: u32, extended: bool, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_FIXED_PAYLOAD);
        let mut data = [0u8; MAX_FIXED_PAYLOAD];
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            id,
            extended,
            dlc: len as u8,
            data,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }
}

pub trait SerialTransport: Send + Sync {
    fn send(&self, port: u8, payload: &[u8], timeout: Duration) -> Result<(), TransportError>;
}

pub trait CanTransport: Send + Sync {
    fn send(&self, port: u8, frame: &CanFrame, timeout: Duration) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_truncates_and_zero_fills() {
        let frame = CanFrame::new(0x100, false, &[1, 2, 3]);
        assert_eq!(frame.dlc, 3);
        assert_eq!(frame.payload(), &[1, 2, 3]);
        assert_eq!(frame.data[3..], [0; 5]);

        let frame = CanFrame::new(0x1ABC_DEF0, true, &[9; 12]);
        assert_eq!(frame.dlc, 8);
        assert!(frame.extended);
    }
}
