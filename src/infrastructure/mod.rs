//! Everything that talks to the outside world: the peripheral link, sensor
//! sources, the companion bridge and logging.

pub mod companion;
pub mod logging;
pub mod sensors;
pub mod uart;
