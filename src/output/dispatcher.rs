//! Routes formatted payloads to the transport selected by a rule

use super::{CanFrame, CanTransport, SerialTransport, TransportError};
use crate::mapping::mapping_types::{MappingRule, OutputConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct Dispatcher {
    serial: Arc<dyn SerialTransport>,
    can: Arc<dyn CanTransport>,
    serial_timeout: Duration,
    can_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        serial: Arc<dyn SerialTransport>,
        can: Arc<dyn CanTransport>,
        serial_timeout: Duration,
        can_timeout: Duration,
    ) -> Self {
        Self {
            serial,
            can,
            serial_timeout,
            can_timeout,
        }
    }

    /// Sends `payload` on the rule's transport, one attempt, time-boxed
    pub fn dispatch(&self, rule: &MappingRule, payload: &[u8]) -> Result<(), TransportError> {
        match &rule.output {
            OutputConfig::Serial(cfg) => {
                debug!("Dispatching {} bytes to serial port {}", payload.len(), cfg.port);
                self.serial.send(cfg.port, payload, self.serial_timeout)
            }
            OutputConfig::CanBus(cfg) => {
                let len = payload.len().min(rule.can_dlc as usize);
                let frame = CanFrame::new(rule.can_id, cfg.extended_id, &payload[..len]);
                debug!(
                    "Dispatching CAN frame {:#X} dlc {} to bus {}",
                    frame.id, frame.dlc, cfg.port
                );
                self.can.send(cfg.port, &frame, self.can_timeout)
            }
        }
    }
}
