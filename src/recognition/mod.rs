pub mod hub;
pub mod server;
pub mod session;
