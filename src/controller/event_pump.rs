//! Event pump: feeds host events into the mapping engine
//!
//! The engine is synchronous and its transports may block for up to their
//! timeout, so every `process_event` runs on tokio's blocking pool while the
//! pump itself stays on the async side waiting for the next event.
//!
//! # State Machine
//!
//! ```text
//! Initializing ──► Running ──► Stopping ──► Stopped
//!                     │            ▲
//!                     └────────────┘
//!               (shutdown signal or closed channel)
//! ```

use crate::controller::event::HostEvent;
use crate::mapping::MappingEngine;
use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PumpError {
    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Pump task failed: {0}")]
    TaskFailed(String),
}

#[state]
#[derive(Debug, Clone)]
pub enum PumpState {
    Initializing,
    Running,
    Stopping,
    Stopped,
}

#[machine]
pub struct EventPump<S: PumpState> {
    engine: Arc<MappingEngine>,
    receiver: mpsc::Receiver<HostEvent>,
    stats_interval: Option<Duration>,
    processed: u64,
}

impl<S: PumpState> EventPump<S> {
    /// Host events handled so far
    pub fn processed(&self) -> u64 {
        self.processed
    }

    async fn handle(&mut self, message: HostEvent) {
        self.processed += 1;
        match message {
            HostEvent::Input(event) => {
                let engine = self.engine.clone();
                let device_idx = event.device_idx;
                match tokio::task::spawn_blocking(move || engine.process_event(&event)).await {
                    Ok(Ok(outcome)) => debug!("Device {} event: {:?}", device_idx, outcome),
                    Ok(Err(e)) => warn!("Event from device {} rejected: {}", device_idx, e),
                    Err(e) => error!("Event processing task failed: {}", e),
                }
            }
            HostEvent::Connected {
                device_idx,
                device_type,
            } => {
                info!("Device {} connected ({:?})", device_idx, device_type);
            }
            HostEvent::Disconnected { device_idx } => {
                self.engine.device_disconnected(device_idx);
            }
        }
    }
}

impl EventPump<Initializing> {
    pub fn create(
        engine: Arc<MappingEngine>,
        receiver: mpsc::Receiver<HostEvent>,
        stats_interval: Option<Duration>,
    ) -> Self {
        Self::new(engine, receiver, stats_interval, 0)
    }

    pub fn start(self) -> EventPump<Running> {
        info!(
            "Starting event pump with {} mappings loaded",
            self.engine.count()
        );
        self.transition()
    }
}

impl EventPump<Running> {
    /// Handles events until the shutdown signal fires or every sender is gone
    pub async fn run_until_shutdown(
        mut self,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> EventPump<Stopping> {
        let mut stats_timer = self.stats_interval.map(|period| {
            let mut timer = time::interval_at(time::Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Shutdown signal received by event pump");
                    break;
                }

                message = self.receiver.recv() => {
                    match message {
                        Some(message) => self.handle(message).await,
                        None => {
                            info!("All event sources closed");
                            break;
                        }
                    }
                }

                _ = next_tick(&mut stats_timer) => {
                    info!("Engine stats: {}", self.engine.stats());
                }
            }
        }

        self.transition()
    }
}

impl EventPump<Stopping> {
    /// Handles what is still queued, then stops
    pub async fn drain(mut self) -> EventPump<Stopped> {
        self.receiver.close();
        let mut drained = 0;
        while let Some(message) = self.receiver.recv().await {
            self.handle(message).await;
            drained += 1;
        }
        if drained > 0 {
            debug!("Drained {} queued events", drained);
        }

        info!(
            "Event pump stopped after {} events; {}",
            self.processed,
            self.engine.stats()
        );
        self.transition()
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Runs an [`EventPump`] in a tokio task
#[derive(Debug)]
pub struct EventPumpHandle {
    sender: mpsc::Sender<HostEvent>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<JoinHandle<u64>>,
}

impl EventPumpHandle {
    pub fn spawn(engine: Arc<MappingEngine>) -> Self {
        let settings = engine.settings().clone();
        let (sender, receiver) = mpsc::channel(settings.event_queue_depth.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats_interval = match settings.stats_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let pump = EventPump::create(engine, receiver, stats_interval).start();
        let task_handle = tokio::spawn(async move {
            let stopped = pump.run_until_shutdown(shutdown_rx).await.drain().await;
            stopped.processed()
        });

        info!(
            "Event pump spawned (queue depth {})",
            settings.event_queue_depth
        );
        Self {
            sender,
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
        }
    }

    /// Sender for event sources
    pub fn sender(&self) -> mpsc::Sender<HostEvent> {
        self.sender.clone()
    }

    pub async fn submit(&self, event: impl Into<HostEvent>) -> Result<(), PumpError> {
        self.sender
            .send(event.into())
            .await
            .map_err(|_| PumpError::ChannelClosed)
    }

    /// Stops the pump after the queued events and returns how many it handled
    pub async fn shutdown(&mut self) -> Result<u64, PumpError> {
        if let Some(tx) = self.shutdown_tx.take() {
            if tx.send(()).is_err() {
                warn!("Event pump already terminated");
            }
        }

        match self.task_handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| PumpError::TaskFailed(e.to_string())),
            None => {
                debug!("Event pump already shut down");
                Ok(0)
            }
        }
    }
}
