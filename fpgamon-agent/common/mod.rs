pub mod mmio;
pub mod poll;
pub mod sim;
pub mod text;

pub use mmio::{CsrAccess, MmioRegion, RegisterDomain, RegisterWindow};
pub use poll::{wait_register_field, Delay, NoDelay, ThreadDelay};
pub use sim::{RegKind, SimWindow};
