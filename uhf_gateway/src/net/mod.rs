// net/mod.rs: TCP connection to the server and the frame stream over it
pub mod connection;
pub mod framing;

pub use connection::ConnectionManager;
pub use framing::FrameAssembler;
