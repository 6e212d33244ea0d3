pub mod device;
pub mod domain;

pub use device::{DeviceClient, DeviceError, DevicePayload};
pub use domain::{NodeReading, Reading, SensorEntity};
