// health/mod.rs: keep-alive and reconnection
pub mod watchdog;

pub use watchdog::Watchdog;
