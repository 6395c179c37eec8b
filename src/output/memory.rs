//! In-memory transports for tests and dry runs

use super::{CanFrame, CanTransport, SerialTransport, TransportError};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Serial { port: u8, payload: Vec<u8> },
    Can { port: u8, frame: CanFrame },
}

/// Records every send in order
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        match self.sent.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn can_frames(&self) -> Vec<CanFrame> {
        self.sent()
            .into_iter()
            .filter_map(|msg| match msg {
                SentMessage::Can { frame, .. } => Some(frame),
                SentMessage::Serial { .. } => None,
            })
            .collect()
    }

    pub fn serial_payloads(&self) -> Vec<Vec<u8>> {
        self.sent()
            .into_iter()
            .filter_map(|msg| match msg {
                SentMessage::Serial { payload, .. } => Some(payload),
                SentMessage::Can { .. } => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        match self.sent.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    fn push(&self, msg: SentMessage) {
        match self.sent.lock() {
            Ok(mut guard) => guard.push(msg),
            Err(poisoned) => poisoned.into_inner().push(msg),
        }
    }
}

impl SerialTransport for RecordingTransport {
    fn send(&self, port: u8, payload: &[u8], _timeout: Duration) -> Result<(), TransportError> {
        self.push(SentMessage::Serial {
            port,
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

impl CanTransport for RecordingTransport {
    fn send(&self, port: u8, frame: &CanFrame, _timeout: Duration) -> Result<(), TransportError> {
        self.push(SentMessage::Can {
            port,
            frame: *frame,
        });
        Ok(())
    }
}

/// Times out on every send
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingTransport;

impl SerialTransport for FailingTransport {
    fn send(&self, port: u8, _payload: &[u8], timeout: Duration) -> Result<(), TransportError> {
        Err(TransportError::Timeout { port, timeout })
    }
}

impl CanTransport for FailingTransport {
    fn send(&self, port: u8, _frame: &CanFrame, timeout: Duration) -> Result<(), TransportError> {
        Err(TransportError::Timeout { port, timeout })
    }
}
