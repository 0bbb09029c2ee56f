pub mod driver;
pub mod output_engine;
pub mod transport;

pub use driver::{DmxDriver, DriverRegistry, LogDriver, MemoryDriver};
pub use output_engine::{OutputEngine, Universe};
pub use transport::{DmxTransport, TransportMessage};
