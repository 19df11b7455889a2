pub mod config;
pub mod demo;
pub mod events;
pub mod identity;
pub mod pipeline;
pub mod position;
pub mod protocol;
pub mod server;
pub mod supervisor;
pub mod transport;
