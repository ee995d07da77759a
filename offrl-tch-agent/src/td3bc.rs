//! TD3 with behavior cloning (TD3+BC).
mod base;
mod config;
pub use base::Td3bc;
pub use config::Td3bcConfig;
