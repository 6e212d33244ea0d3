pub mod entity;
pub mod node;
pub mod reading;

pub use entity::SensorEntity;
pub use node::NodeReading;
pub use reading::Reading;
