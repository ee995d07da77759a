//! SAC with an ensemble of critics (SAC-N) and its diversified extension (EDAC).
mod base;
mod config;
mod ent_coef;
pub use base::Sacn;
pub use config::SacnConfig;
pub use ent_coef::{EntCoef, EntCoefMode};
