use color_eyre::{eyre::eyre, Result};
use hidbridge::config::{self, AppConfig};
use hidbridge::controller::EventPumpHandle;
use hidbridge::mapping::{MappingEngine, MappingError};
use hidbridge::output::{CanTransport, LogTransport, SerialTransport};
use hidbridge::persistence::FileStorage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_path);
    config::ensure_default_config(&config_path)
        .map_err(|e| eyre!("Failed to prepare configuration: {}", e))?;
    let app_config = AppConfig::load(&config_path)?;

    let storage = Arc::new(FileStorage::new(app_config.storage.path.clone()));
    let (serial, can) = setup_transports(&app_config)?;
    let engine = Arc::new(MappingEngine::new(
        serial,
        can,
        storage,
        app_config.engine.clone(),
    ));

    match engine.load() {
        Ok(count) => info!("Restored {} mappings", count),
        Err(MappingError::Validation(msg)) => {
            warn!("Stored mapping table rejected, starting empty: {}", msg)
        }
        Err(e) => warn!("Mapping table not restored: {}", e),
    }

    if let Some(path) = &app_config.mappings_file {
        let text = std::fs::read_to_string(path)
            .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
        let slots = engine.import_toml(&text)?;
        info!("{} new mappings from {}", slots.len(), path.display());
    }

    let mut pump = EventPumpHandle::spawn(engine.clone());

    #[cfg(feature = "gamepad")]
    let _collector = hidbridge::controller::gamepad::CollectorHandle::spawn(None, pump.sender());

    info!("hidbridge running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("Failed to listen for Ctrl+C: {}", e))?;

    let processed = pump
        .shutdown()
        .await
        .map_err(|e| eyre!("Event pump failed: {}", e))?;
    let saved = engine.save()?;
    info!(
        "Stopped after {} events, saved {} mappings; {}",
        processed,
        saved,
        engine.stats()
    );

    Ok(())
}

#[cfg(feature = "uart")]
fn setup_transports(
    app_config: &AppConfig,
) -> Result<(Arc<dyn SerialTransport>, Arc<dyn CanTransport>)> {
    use hidbridge::mapping::SerialConfig;
    use hidbridge::output::uart::UartTransport;

    let mut uart = UartTransport::new();
    for port in &app_config.serial_ports {
        let framing = SerialConfig {
            port: port.port,
            ..SerialConfig::default()
        };
        if let Err(e) = uart.open_port(port.port, &port.path, &framing) {
            warn!("Serial port {} unavailable: {}", port.port, e);
        }
    }
    Ok((Arc::new(uart), Arc::new(LogTransport)))
}

#[cfg(not(feature = "uart"))]
fn setup_transports(
    app_config: &AppConfig,
) -> Result<(Arc<dyn SerialTransport>, Arc<dyn CanTransport>)> {
    if !app_config.serial_ports.is_empty() {
        warn!("Built without the uart feature, serial output is only logged");
    }
    Ok((Arc::new(LogTransport), Arc::new(LogTransport)))
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
