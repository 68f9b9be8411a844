//! Sensor sources
//!
//! The manager only talks to sensors through [`SensorSource`]. [`SensorFeed`]
//! is an in-memory source that external code publishes samples into.

use crate::domain::models::ControllerType;
use crate::domain::sensor_cache::SensorSubscriber;
use std::future::Future;
use std::sync::Mutex;
use tracing::debug;

/// Readable, subscribable sensor provider.
///
/// `read` is issued once per poll tick for every enabled type and may
/// suspend; the poll loop bounds it with a timeout.
pub trait SensorSource: SensorSubscriber + Send + Sync + 'static {
    fn read(
        &self,
        sensor: ControllerType,
    ) -> impl Future<Output = anyhow::Result<Option<Vec<f32>>>> + Send;
}

#[derive(Debug, Default)]
struct FeedSlot {
    available: bool,
    subscribed: bool,
    sample: Option<Vec<f32>>,
}

/// Thread-safe sensor source backed by the latest published samples
#[derive(Debug, Default)]
pub struct SensorFeed {
    slots: Mutex<[FeedSlot; 5]>,
}

impl SensorFeed {
    /// A feed where no sensor is available
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_available(sensors: &[ControllerType]) -> Self {
        let feed = Self::new();
        for sensor in sensors {
            feed.set_available(*sensor, true);
        }
        feed
    }

    pub fn set_available(&self, sensor: ControllerType, available: bool) {
        if let Ok(mut slots) = self.slots.lock() {
            slots[sensor.index()].available = available;
        }
    }

    /// Store the latest sample for `sensor`, replacing the previous one
    pub fn publish(&self, sensor: ControllerType, components: Vec<f32>) {
        if let Ok(mut slots) = self.slots.lock() {
            slots[sensor.index()].sample = Some(components);
        }
    }

    pub fn is_subscribed(&self, sensor: ControllerType) -> bool {
        self.slots
            .lock()
            .map(|slots| slots[sensor.index()].subscribed)
            .unwrap_or(false)
    }
}

impl SensorSubscriber for SensorFeed {
    fn subscribe(&self, sensor: ControllerType) -> anyhow::Result<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("Lock error"))?;
        let slot = &mut slots[sensor.index()];
        if !slot.available {
            anyhow::bail!("{} is not available on this device", sensor);
        }
        slot.subscribed = true;
        debug!("Subscribed to {}", sensor);
        Ok(())
    }

    fn unsubscribe(&self, sensor: ControllerType) {
        if let Ok(mut slots) = self.slots.lock() {
            slots[sensor.index()].subscribed = false;
        }
    }
}

impl SensorSource for SensorFeed {
    async fn read(&self, sensor: ControllerType) -> anyhow::Result<Option<Vec<f32>>> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("Lock error"))?;
        let slot = &slots[sensor.index()];
        Ok(if slot.subscribed {
            slot.sample.clone()
        } else {
            None
        })
    }
}
