//! Recorder writing scalars of [`Record`]s into TFRecord.
use log::warn;
use offrl_core::record::{AggregateRecorder, Record, RecordStorage, RecordValue, Recorder};
use std::path::Path;
use tensorboard_rs::summary_writer::SummaryWriter;

/// Write records to TFRecord.
///
/// As an [`AggregateRecorder`], stored records are aggregated with
/// [`RecordStorage`] and written at flush with the given step.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
    storage: RecordStorage,
    step_key: String,
}

impl TensorboardRecorder {
    /// Construct a [`TensorboardRecorder`].
    ///
    /// TFRecord will be stored in `logdir`.
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
            storage: RecordStorage::new(),
            step_key: "opt_steps".to_string(),
        }
    }
}

impl Recorder for TensorboardRecorder {
    /// Write a given [`Record`] into a TFRecord.
    ///
    /// The step is taken from the scalar `"opt_steps"` in the record. Only
    /// [`RecordValue::Scalar`] is written, other variants are discarded.
    fn write(&mut self, record: Record) {
        let step = match record.get(&self.step_key) {
            Some(RecordValue::Scalar(v)) => *v as usize,
            _ => {
                warn!("Record without {} is discarded", self.step_key);
                return;
            }
        };

        for (k, v) in record.iter() {
            if *k == self.step_key {
                continue;
            }
            if let RecordValue::Scalar(v) = v {
                self.writer.add_scalar(k, *v, step);
            }
        }
    }
}

impl AggregateRecorder for TensorboardRecorder {
    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        let mut record = self.storage.aggregate();
        record.insert(self.step_key.clone(), RecordValue::Scalar(step as _));
        self.write(record);
        self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_flush_writes_event_file() {
        let dir = TempDir::new("tensorboard").unwrap();
        let mut recorder = TensorboardRecorder::new(dir.path());
        for v in [0.5f32, 1.5] {
            recorder.store(Record::from_scalar("loss/critic", v));
        }
        recorder.flush(2);

        let n_files = std::fs::read_dir(dir.path()).unwrap().count();
        assert!(n_files > 0);
    }
}
