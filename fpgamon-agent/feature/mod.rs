pub mod lifecycle;
pub mod namespace;
pub mod table;

pub use lifecycle::FeatureDriver;
pub use namespace::{AttrGroup, Attribute, Namespace, ObjectRegistry};
pub use table::{DeviceGuard, FeatureSlot, FeatureTable};
