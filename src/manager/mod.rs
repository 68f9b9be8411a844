//! Controller Module Manager
//!
//! Owns the sensor cache, the poll loop, the RX line buffer and the link to
//! one peripheral. All public calls are made from the owner context, and
//! background work only reaches this state through [`pump`] /
//! [`pump_next`], so nothing here is ever mutated from two contexts.
//!
//! [`pump`]: ControllerModuleManager::pump
//! [`pump_next`]: ControllerModuleManager::pump_next

pub mod listeners;

use crate::domain::commands::{ColorComponents, OutboundCommand, Rgb};
use crate::domain::models::{
    ControllerType, ManagerNotification, SensorEnablement, SensorReading,
};
use crate::domain::rx_buffer::{RxLineBuffer, RxNotify};
use crate::domain::sensor_cache::SensorCache;
use crate::domain::settings::ControllerSettings;
use crate::error::{ControllerError, Result};
use crate::infrastructure::companion::CommandSource;
use crate::infrastructure::sensors::SensorSource;
use crate::infrastructure::uart::poll::PollContext;
use crate::infrastructure::uart::protocol::sensor_report_message;
use crate::infrastructure::uart::{link, CoreEvent, FrameCodec, PollLoop, UartLink};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use listeners::{ListenerHandle, UartTextListener};
use listeners::ListenerRegistry;

pub struct ControllerModuleManager<S: SensorSource> {
    settings: ControllerSettings,
    codec: FrameCodec,
    sensors: Arc<S>,

    cache: SensorCache,
    enablement: watch::Sender<SensorEnablement>,
    poll: PollLoop,
    rx_buffer: RxLineBuffer,
    listeners: ListenerRegistry,

    outbound: mpsc::UnboundedSender<Vec<u8>>,
    events_tx: mpsc::UnboundedSender<CoreEvent>,
    events_rx: mpsc::UnboundedReceiver<CoreEvent>,
    notifications: mpsc::UnboundedSender<ManagerNotification>,

    link_task: JoinHandle<()>,
    companion_task: Option<JoinHandle<()>>,
    uart_ready: Option<bool>,
}

impl<S: SensorSource> ControllerModuleManager<S> {
    /// Bind to a peripheral and begin link negotiation.
    ///
    /// Must be called inside a tokio runtime. The outcome of negotiation is
    /// reported once as [`ManagerNotification::UartReady`].
    pub fn new<L: UartLink>(
        link: L,
        sensors: Arc<S>,
        settings: ControllerSettings,
        notifications: mpsc::UnboundedSender<ManagerNotification>,
    ) -> Self {
        let codec = FrameCodec::new(settings.checksum);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (enablement, _) = watch::channel(SensorEnablement::default());

        let link_task = tokio::spawn(link::drive(link, codec, outbound_rx, events_tx.clone()));

        Self {
            rx_buffer: RxLineBuffer::new(settings.rx_cache_capacity, settings.rx_coalesce_window()),
            settings,
            codec,
            sensors,
            cache: SensorCache::new(),
            enablement,
            poll: PollLoop::new(),
            listeners: ListenerRegistry::new(),
            outbound,
            events_tx,
            events_rx,
            notifications,
            link_task,
            companion_task: None,
            uart_ready: None,
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// `None` until negotiation finished, then whether it succeeded
    pub fn is_uart_ready(&self) -> Option<bool> {
        self.uart_ready
    }

    // Poll loop

    /// Start polling enabled sensors. `on_tick` runs from [`Self::pump`]
    /// once per interval, whether or not any value changed.
    pub fn start(&mut self, poll_interval: Duration, on_tick: impl FnMut() + 'static) -> Result<()> {
        let context = PollContext {
            sensors: self.sensors.clone(),
            enablement: self.enablement.subscribe(),
            events: self.events_tx.clone(),
            request_timeout: self.settings.sensor_request_timeout(),
        };
        self.poll.start(poll_interval, Box::new(on_tick), context)
    }

    /// No tick callback fires after this returns
    pub fn stop(&mut self) {
        self.poll.stop();
    }

    pub fn is_running(&self) -> bool {
        self.poll.is_running()
    }

    // Sensors

    pub fn is_sensor_enabled(&self, sensor: ControllerType) -> bool {
        self.cache.is_enabled(sensor)
    }

    /// Returns a user-facing message when the sensor could not be
    /// (un)subscribed; the previous state is kept in that case.
    pub fn set_sensor_enabled(&mut self, enabled: bool, sensor: ControllerType) -> Option<String> {
        match self.cache.set_enabled(sensor, enabled, &*self.sensors) {
            Ok(changed) => {
                if changed {
                    self.enablement.send_replace(self.cache.enablement());
                }
                None
            }
            Err(e) => {
                warn!("{}", e);
                Some(e.to_string())
            }
        }
    }

    pub fn sensor_data(&self, sensor: ControllerType) -> Option<&SensorReading> {
        self.cache.latest(sensor)
    }

    pub fn clear_sensor_data(&mut self, sensor: ControllerType) {
        self.cache.clear(sensor);
    }

    // Outbound

    /// Append the checksum to `data` and queue it for the peripheral.
    /// Never blocks; delivery errors arrive as notifications.
    pub fn send_crc_data(&self, data: &[u8]) {
        self.write_frame(self.codec.encode(&[], data));
    }

    /// Encode and send an intent. Commands that cannot be encoded are
    /// dropped with a warning.
    pub fn send_command(&self, command: &OutboundCommand) {
        match command.encode() {
            Ok(messages) => {
                for message in &messages {
                    self.write_frame(self.codec.encode_message(message));
                }
            }
            Err(e) => warn!("Dropping command {:?}: {}", command, e),
        }
    }

    pub fn send_button(&self, tag: u32, is_pressed: bool) {
        self.send_command(&OutboundCommand::ButtonEvent { tag, is_pressed });
    }

    /// Scaled by the configured brightness
    pub fn send_color(&self, color: Rgb) {
        let components = ColorComponents::from_rgb(color, self.settings.color_brightness);
        self.send_command(&OutboundCommand::ColorSet(components));
    }

    pub fn send_word_assignment(&self, slot: u8, word: &str) {
        self.send_command(&OutboundCommand::WordAssignmentSave {
            slot,
            word: word.to_string(),
        });
    }

    /// One unacknowledged frame per entry
    pub fn send_enable_table(&self, entries: BTreeMap<u32, bool>) {
        self.send_command(&OutboundCommand::EnableTableSave(entries));
    }

    fn write_frame(&self, frame: Vec<u8>) {
        if self.outbound.send(frame).is_err() {
            let error = ControllerError::Delivery("link is not open".to_string());
            warn!("{}", error);
            let _ = self
                .notifications
                .send(ManagerNotification::DeliveryFailed(error));
        }
    }

    // UART RX cache

    pub fn uart_rx_cache_reset(&mut self) {
        self.rx_buffer.reset();
    }

    pub fn uart_text_buffer(&self) -> String {
        self.rx_buffer.snapshot()
    }

    pub fn is_uart_rx_cache_enabled(&self) -> bool {
        self.rx_buffer.is_cache_enabled()
    }

    pub fn set_uart_rx_cache_enabled(&mut self, enabled: bool) {
        debug!("UART RX cache {}", if enabled { "enabled" } else { "disabled" });
        self.rx_buffer.set_cache_enabled(enabled);
    }

    /// Attach a module screen. Starts a fresh RX cache for it.
    pub fn attach_module(&mut self, listener: impl UartTextListener + 'static) -> ListenerHandle {
        self.uart_rx_cache_reset();
        self.set_uart_rx_cache_enabled(true);
        self.listeners.add(Box::new(listener))
    }

    /// Detach a module screen. Caching stops with the last one.
    pub fn detach_module(&mut self, handle: ListenerHandle) {
        if self.listeners.remove(handle) && self.listeners.is_empty() {
            self.set_uart_rx_cache_enabled(false);
        }
    }

    // Companion

    /// Forward events from `source`. They are acted upon only while the
    /// poll loop is running. Replaces any previous source.
    pub fn attach_command_source<C: CommandSource>(&mut self, mut source: C) {
        self.detach_command_source();
        let events = self.events_tx.clone();
        self.companion_task = Some(tokio::spawn(async move {
            while let Some(event) = source.next_event().await {
                if events.send(CoreEvent::Companion(event)).is_err() {
                    break;
                }
            }
            debug!("Companion source exhausted");
        }));
    }

    pub fn detach_command_source(&mut self) {
        if let Some(task) = self.companion_task.take() {
            task.abort();
        }
    }

    // Event pump

    /// Process every queued background event, then any due coalesced RX
    /// notification. Returns the number of events handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        if self.rx_buffer.take_due(Instant::now()) {
            self.raise_uart_rx();
        }
        handled
    }

    /// Wait for the next background event or the pending RX notification
    /// deadline, whichever comes first, and process it.
    pub async fn pump_next(&mut self) {
        let event = match self.rx_buffer.pending_deadline() {
            Some(deadline) => {
                tokio::select! {
                    event = self.events_rx.recv() => event,
                    _ = tokio::time::sleep_until(deadline) => {
                        if self.rx_buffer.take_due(Instant::now()) {
                            self.raise_uart_rx();
                        }
                        return;
                    }
                }
            }
            None => self.events_rx.recv().await,
        };
        if let Some(event) = event {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::UartReady(result) => {
                self.uart_ready = Some(result.is_ok());
                let _ = self
                    .notifications
                    .send(ManagerNotification::UartReady(result));
            }
            CoreEvent::RxBytes(bytes) => {
                if let RxNotify::Now = self.rx_buffer.append(&bytes, Instant::now()) {
                    self.raise_uart_rx();
                }
            }
            CoreEvent::SensorReport(reading) => {
                debug!("Peripheral reported {}", reading.sensor());
                self.cache.update(reading);
            }
            CoreEvent::SensorSample { run_id, reading } => {
                if !self.cache.is_enabled(reading.sensor()) {
                    return;
                }
                if self.settings.stream_sensor_reports && self.poll.is_current(run_id) {
                    let message = sensor_report_message(&reading);
                    self.write_frame(self.codec.encode_message(&message));
                }
                self.cache.update(reading);
            }
            CoreEvent::Tick { run_id } => {
                self.poll.deliver_tick(run_id);
            }
            CoreEvent::DeliveryFailed(error) => {
                let _ = self
                    .notifications
                    .send(ManagerNotification::DeliveryFailed(error));
            }
            CoreEvent::LinkClosed => {
                let _ = self.notifications.send(ManagerNotification::LinkClosed);
            }
            CoreEvent::Companion(event) => {
                if !self.poll.is_running() {
                    debug!("Ignoring companion command {} while stopped", event.command);
                    return;
                }
                info!("Companion command: {}", event.command);
                for command in event.to_commands() {
                    self.send_command(&command);
                }
            }
        }
    }

    fn raise_uart_rx(&mut self) {
        let _ = self.notifications.send(ManagerNotification::UartRx);
        // Only refresh when a module screen shows the text
        if !self.listeners.is_empty() {
            let text = self.rx_buffer.snapshot();
            self.listeners.broadcast(&text);
        }
    }
}

impl<S: SensorSource> Drop for ControllerModuleManager<S> {
    fn drop(&mut self) {
        self.poll.shutdown();
        self.detach_command_source();
        self.link_task.abort();
    }
}
