//! Sensor Cache
//!
//! Latest reading and enabled flag for every [`ControllerType`], stored in a
//! table indexed by the type's tag.

use crate::domain::models::{ControllerType, SensorEnablement, SensorReading};
use crate::error::{ControllerError, Result};
use tracing::{debug, info};

/// Subscription side of a sensor source
pub trait SensorSubscriber {
    fn subscribe(&self, sensor: ControllerType) -> anyhow::Result<()>;
    fn unsubscribe(&self, sensor: ControllerType);
}

#[derive(Debug, Default)]
pub struct SensorCache {
    enablement: SensorEnablement,
    latest: [Option<SensorReading>; 5],
}

impl SensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self, sensor: ControllerType) -> bool {
        self.enablement.is_enabled(sensor)
    }

    pub fn enablement(&self) -> SensorEnablement {
        self.enablement
    }

    /// Enable or disable updates for `sensor`.
    ///
    /// Returns whether the flag changed. Requesting the current state is a
    /// no-op that never touches the subscriber. On subscribe failure the flag
    /// keeps its previous value.
    pub fn set_enabled(
        &mut self,
        sensor: ControllerType,
        enabled: bool,
        subscriber: &dyn SensorSubscriber,
    ) -> Result<bool> {
        if self.is_enabled(sensor) == enabled {
            debug!("{} already {}", sensor, if enabled { "enabled" } else { "disabled" });
            return Ok(false);
        }

        if enabled {
            subscriber
                .subscribe(sensor)
                .map_err(|e| ControllerError::SensorSubscribe {
                    sensor,
                    reason: e.to_string(),
                })?;
        } else {
            subscriber.unsubscribe(sensor);
        }

        self.enablement.set(sensor, enabled);
        info!("Sensor {} {}", sensor, if enabled { "enabled" } else { "disabled" });
        Ok(true)
    }

    pub fn latest(&self, sensor: ControllerType) -> Option<&SensorReading> {
        self.latest[sensor.index()].as_ref()
    }

    pub fn update(&mut self, reading: SensorReading) {
        let slot = reading.sensor().index();
        self.latest[slot] = Some(reading);
    }

    pub fn clear(&mut self, sensor: ControllerType) {
        self.latest[sensor.index()] = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSubscriber {
        calls: RefCell<Vec<(ControllerType, bool)>>,
        reject: Option<ControllerType>,
    }

    impl SensorSubscriber for RecordingSubscriber {
        fn subscribe(&self, sensor: ControllerType) -> anyhow::Result<()> {
            if self.reject == Some(sensor) {
                anyhow::bail!("permission denied");
            }
            self.calls.borrow_mut().push((sensor, true));
            Ok(())
        }

        fn unsubscribe(&self, sensor: ControllerType) {
            self.calls.borrow_mut().push((sensor, false));
        }
    }

    #[test]
    fn test_enable_is_idempotent() {
        let subscriber = RecordingSubscriber::default();
        let mut cache = SensorCache::new();

        assert!(cache
            .set_enabled(ControllerType::Gyroscope, true, &subscriber)
            .unwrap());
        assert!(!cache
            .set_enabled(ControllerType::Gyroscope, true, &subscriber)
            .unwrap());
        assert!(!cache
            .set_enabled(ControllerType::Location, false, &subscriber)
            .unwrap());

        assert_eq!(
            *subscriber.calls.borrow(),
            vec![(ControllerType::Gyroscope, true)]
        );
        assert!(cache.is_enabled(ControllerType::Gyroscope));
    }

    #[test]
    fn test_subscribe_failure_keeps_previous_state() {
        let subscriber = RecordingSubscriber {
            reject: Some(ControllerType::Location),
            ..Default::default()
        };
        let mut cache = SensorCache::new();

        let err = cache
            .set_enabled(ControllerType::Location, true, &subscriber)
            .unwrap_err();
        assert_eq!(
            err,
            ControllerError::SensorSubscribe {
                sensor: ControllerType::Location,
                reason: "permission denied".to_string()
            }
        );
        assert!(!cache.is_enabled(ControllerType::Location));
    }

    #[test]
    fn test_disabled_sensor_keeps_last_value() {
        let subscriber = RecordingSubscriber::default();
        let mut cache = SensorCache::new();
        cache
            .set_enabled(ControllerType::Accelerometer, true, &subscriber)
            .unwrap();

        let reading =
            SensorReading::new(ControllerType::Accelerometer, vec![0.0, 0.0, 9.8]).unwrap();
        cache.update(reading.clone());
        cache
            .set_enabled(ControllerType::Accelerometer, false, &subscriber)
            .unwrap();

        assert_eq!(cache.latest(ControllerType::Accelerometer), Some(&reading));
        cache.clear(ControllerType::Accelerometer);
        assert_eq!(cache.latest(ControllerType::Accelerometer), None);
    }

    #[test]
    fn test_latest_has_declared_arity() {
        let mut cache = SensorCache::new();
        for sensor in ControllerType::ALL {
            cache.update(SensorReading::new(sensor, vec![1.0; sensor.arity()]).unwrap());
        }
        for sensor in ControllerType::ALL {
            assert_eq!(cache.latest(sensor).map(|r| r.len()), Some(sensor.arity()));
        }
    }
}
