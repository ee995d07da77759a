//! Types and traits for recording training metrics.
//!
//! Agents return a [`Record`] from every optimization step. The
//! [`Trainer`](crate::Trainer) stores them in an [`AggregateRecorder`], which
//! aggregates the values and writes them out at flush.
//!
//! ```rust
//! use offrl_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("loss/critic", 0.25);
//! record.insert("misc/alpha", RecordValue::Scalar(0.1));
//! assert_eq!(record.get_scalar("loss/critic").unwrap(), 0.25);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::{AggregateRecorder, Recorder};
pub use storage::RecordStorage;
