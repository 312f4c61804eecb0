pub mod adapter;
pub mod drivers;
pub mod logging;
pub mod transport;
