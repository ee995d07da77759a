//! In-sample actor critic (InAC).
mod base;
mod config;
pub use base::{in_sample_weights, Inac};
pub use config::InacConfig;
