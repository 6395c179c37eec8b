use super::{CanFrame, CanTransport, SerialTransport, TransportError};
use std::time::Duration;
use tracing::info;

/// Transport that writes every payload to the log instead of a wire
///
/// Serves both traits, so a bridge without hardware still shows what it would
/// have sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

impl SerialTransport for LogTransport {
    fn send(&self, port: u8, payload: &[u8], _timeout: Duration) -> Result<(), TransportError> {
        info!(
            "serial[{}] <- {:02X?} ({:?})",
            port,
            payload,
            String::from_utf8_lossy(payload)
        );
        Ok(())
    }
}

impl CanTransport for LogTransport {
    fn send(&self, port: u8, frame: &CanFrame, _timeout: Duration) -> Result<(), TransportError> {
        info!(
            "can[{}] <- id={:#X}{} dlc={} data={:02X?}",
            port,
            frame.id,
            if frame.extended { " ext" } else { "" },
            frame.dlc,
            frame.payload()
        );
        Ok(())
    }
}
