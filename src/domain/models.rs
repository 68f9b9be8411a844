use crate::error::ControllerError;
use std::fmt;

/// Sensor kinds the controller module can stream to the peripheral.
///
/// The discriminant is the stable tag used as a row key by front ends and as
/// the wire sub-selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControllerType {
    Quaternion = 0,
    Accelerometer = 1,
    Gyroscope = 2,
    Magnetometer = 3,
    Location = 4,
}

impl ControllerType {
    pub const ALL: [ControllerType; 5] = [
        Self::Quaternion,
        Self::Accelerometer,
        Self::Gyroscope,
        Self::Magnetometer,
        Self::Location,
    ];

    /// Number of float components in a reading of this type
    pub fn arity(self) -> usize {
        match self {
            Self::Quaternion => 4,
            Self::Accelerometer | Self::Gyroscope | Self::Magnetometer => 3,
            // lat, long, alt
            Self::Location => 3,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// ASCII selector following `!` in a sensor report frame
    pub fn wire_letter(self) -> u8 {
        match self {
            Self::Quaternion => b'Q',
            Self::Accelerometer => b'A',
            Self::Gyroscope => b'G',
            Self::Magnetometer => b'M',
            Self::Location => b'L',
        }
    }

    pub fn from_wire_letter(letter: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.wire_letter() == letter)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Quaternion => "quaternion",
            Self::Accelerometer => "accelerometer",
            Self::Gyroscope => "gyroscope",
            Self::Magnetometer => "magnetometer",
            Self::Location => "location",
        };
        f.write_str(name)
    }
}

/// Latest decoded vector for one sensor type.
///
/// Can only be built with exactly `sensor.arity()` components.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    sensor: ControllerType,
    components: Vec<f32>,
}

impl SensorReading {
    pub fn new(sensor: ControllerType, components: Vec<f32>) -> Result<Self, ControllerError> {
        if components.len() != sensor.arity() {
            return Err(ControllerError::Arity {
                sensor,
                expected: sensor.arity(),
                actual: components.len(),
            });
        }
        Ok(Self { sensor, components })
    }

    pub fn sensor(&self) -> ControllerType {
        self.sensor
    }

    pub fn components(&self) -> &[f32] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Per-type enabled flags, all false by default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorEnablement([bool; 5]);

impl SensorEnablement {
    pub fn is_enabled(&self, sensor: ControllerType) -> bool {
        self.0[sensor.index()]
    }

    pub(crate) fn set(&mut self, sensor: ControllerType, enabled: bool) {
        self.0[sensor.index()] = enabled;
    }

    pub fn enabled(&self) -> impl Iterator<Item = ControllerType> + '_ {
        ControllerType::ALL
            .into_iter()
            .filter(move |t| self.is_enabled(*t))
    }

    pub fn any(&self) -> bool {
        self.0.iter().any(|e| *e)
    }
}

/// Notifications raised to the manager's owner
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerNotification {
    /// Sent once, after the peripheral link has been negotiated (or failed to)
    UartReady(Result<(), ControllerError>),
    /// The RX cache accumulated new content (coalesced)
    UartRx,
    /// An outbound frame could not be delivered
    DeliveryFailed(ControllerError),
    /// The peripheral closed the link
    LinkClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_per_type() {
        assert_eq!(ControllerType::Quaternion.arity(), 4);
        assert_eq!(ControllerType::Accelerometer.arity(), 3);
        assert_eq!(ControllerType::Gyroscope.arity(), 3);
        assert_eq!(ControllerType::Magnetometer.arity(), 3);
        assert_eq!(ControllerType::Location.arity(), 3);
    }

    #[test]
    fn test_reading_rejects_wrong_length() {
        for sensor in ControllerType::ALL {
            let ok = SensorReading::new(sensor, vec![0.5; sensor.arity()]).unwrap();
            assert_eq!(ok.len(), sensor.arity());

            let err = SensorReading::new(sensor, vec![0.5; sensor.arity() + 1]).unwrap_err();
            assert!(matches!(err, ControllerError::Arity { .. }));
        }
    }

    #[test]
    fn test_tags_and_letters_are_stable() {
        for sensor in ControllerType::ALL {
            assert_eq!(ControllerType::from_tag(sensor.tag()), Some(sensor));
            assert_eq!(
                ControllerType::from_wire_letter(sensor.wire_letter()),
                Some(sensor)
            );
        }
        assert_eq!(ControllerType::from_tag(5), None);
        assert_eq!(ControllerType::from_wire_letter(b'B'), None);
    }

    #[test]
    fn test_enablement_defaults_off() {
        let mut enablement = SensorEnablement::default();
        assert!(!enablement.any());
        enablement.set(ControllerType::Gyroscope, true);
        assert_eq!(
            enablement.enabled().collect::<Vec<_>>(),
            vec![ControllerType::Gyroscope]
        );
    }
}
