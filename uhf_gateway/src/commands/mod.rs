// commands/mod.rs: server-to-radio direction
pub mod handler;

pub use handler::NetworkIngress;
