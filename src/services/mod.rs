pub mod dialer;
pub mod listener;
pub mod memory;
pub mod peers;
pub mod pending;
pub mod session;
pub mod transport;
