use bluefruit_controller::infrastructure::logging::init_logger;
use bluefruit_controller::{
    CompanionBridge, ControllerModuleManager, ManagerNotification, SensorFeed, SettingsService,
    TcpBridge,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = SettingsService::new().into_settings();

    // Keep the guard alive for the whole run so file logs are flushed
    let _log_guard = init_logger(&settings.log_settings)?;
    info!("Starting Bluefruit controller bridge");

    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
    let link = TcpBridge::from_settings(&settings);
    let sensors = Arc::new(SensorFeed::new());
    let companion_socket = settings.companion_socket.clone();

    let mut manager = ControllerModuleManager::new(link, sensors, settings, notify_tx);

    let poll_interval = manager.settings().poll_interval();
    manager.start(poll_interval, || {})?;

    match CompanionBridge::spawn(&companion_socket) {
        Ok((events, _thread)) => manager.attach_command_source(events),
        Err(e) => warn!("Companion bridge unavailable: {}", e),
    }

    manager.attach_module(|text: &str| {
        if let Some(line) = text.lines().last() {
            println!("{}", line);
        }
    });

    loop {
        tokio::select! {
            _ = manager.pump_next() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }

        while let Ok(notification) = notify_rx.try_recv() {
            match notification {
                ManagerNotification::UartReady(Ok(())) => info!("UART ready"),
                ManagerNotification::UartReady(Err(e)) => {
                    error!("Could not open UART: {}", e);
                    return Err(e.into());
                }
                ManagerNotification::DeliveryFailed(e) => warn!("{}", e),
                ManagerNotification::LinkClosed => {
                    info!("Peripheral closed the link");
                    manager.stop();
                    return Ok(());
                }
                ManagerNotification::UartRx => {}
            }
        }
    }

    manager.stop();
    Ok(())
}
