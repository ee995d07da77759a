//! Critics.
mod config;
mod ensemble;
mod value;
pub use config::CriticConfig;
pub use ensemble::EnsembleCritic;
pub use value::Value;
