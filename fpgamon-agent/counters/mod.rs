pub mod events;
pub mod fabric;
pub mod mux;
pub mod tree;

pub use events::{CacheEvent, FabricEvent, PerfBank, VtdEvent};
pub use mux::CounterMux;
pub use tree::{PerfId, PerfObject};
