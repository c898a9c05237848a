pub mod domain;
pub mod frameworks;
pub mod interface_adapters;
pub mod use_cases;

pub use frameworks::config::server_port;
pub use frameworks::server::{ServerHandle, ServerSettings, run, spawn};
