pub mod device_poll;

pub use device_poll::{DevicePollSource, Schedule};
