//! Train [`Agent`] with a static dataset.
mod config;
use crate::{
    record::{AggregateRecorder, Record, RecordValue::Scalar},
    Agent, Evaluator, ReplayBufferBase,
};
use anyhow::Result;
pub use config::TrainerConfig;
use log::info;
use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Manages the offline training loop.
///
/// # Training loop
///
/// 0. Given an agent implementing [`Agent`], a buffer holding the offline
///    dataset, a recorder implementing [`AggregateRecorder`] and an evaluator.
/// 1. Reset the counter of optimization steps `opt_steps = 0` and the timer
///    for computing optimization steps per second (OSPS).
/// 2. Do an optimization step. The agent samples a batch from the buffer and
///    updates its networks. `opt_steps += 1`.
///     * If `opt_steps % record_agent_info_interval == 0`, the record returned
///       by the agent is stored in the recorder.
///     * If `opt_steps % record_compute_cost_interval == 0`, OSPS is stored as
///       `"opt_steps_per_sec"`.
/// 3. If `opt_steps % eval_interval == 0`, evaluate the agent and store
///    `"eval_return"`. If it is the best so far, save the agent in
///    `(model_dir)/best`.
/// 4. If `opt_steps % save_interval == 0`, save the agent in
///    `(model_dir)/(opt_steps)`.
/// 5. If `opt_steps % flush_record_interval == 0`, flush the recorder.
/// 6. Finish if `opt_steps == max_opts`, otherwise back to 2.
///
/// ```mermaid
/// graph LR
///     D[ReplayBufferBase]-->|TransitionBatch|A[Agent]
///     A-->|Record|R[AggregateRecorder]
///     A-->|Agent|E[Evaluator]
///     E-->|Record|R
/// ```
///
/// An error from any of the objects aborts the loop and is returned.
pub struct Trainer {
    /// Where to save the trained model.
    model_dir: Option<String>,

    /// Interval of recording computational cost in optimization steps.
    record_compute_cost_interval: usize,

    /// Interval of recording agent information in optimization steps.
    record_agent_info_interval: usize,

    /// Interval of flushing records in optimization steps.
    flush_records_interval: usize,

    /// Interval of evaluation in optimization steps.
    eval_interval: usize,

    /// Interval of saving the model in optimization steps.
    save_interval: usize,

    /// The maximal number of optimization steps.
    max_opts: usize,

    /// Optimization steps for computing optimization steps per second.
    opt_steps_for_ops: usize,

    /// Timer for computing optimization steps per second.
    timer_for_ops: Duration,
}

fn is_multiple(step: usize, interval: usize) -> bool {
    interval > 0 && step % interval == 0
}

impl Trainer {
    /// Constructs a trainer.
    pub fn build(config: TrainerConfig) -> Self {
        Self {
            model_dir: config.model_dir,
            record_compute_cost_interval: config.record_compute_cost_interval,
            record_agent_info_interval: config.record_agent_info_interval,
            flush_records_interval: config.flush_record_interval,
            eval_interval: config.eval_interval,
            save_interval: config.save_interval,
            max_opts: config.max_opts,
            opt_steps_for_ops: 0,
            timer_for_ops: Duration::new(0, 0),
        }
    }

    fn save_model<A, R>(agent: &A, model_dir: PathBuf) -> Result<()>
    where
        A: Agent<R>,
        R: ReplayBufferBase,
    {
        let paths = agent.save_params(&model_dir)?;
        info!("Saved the model in {:?} ({} files).", &model_dir, paths.len());
        Ok(())
    }

    fn model_dir_with(&self, sub: impl AsRef<Path>) -> Option<PathBuf> {
        self.model_dir
            .as_ref()
            .map(|dir| Path::new(dir).join(sub.as_ref()))
    }

    /// Returns optimization steps per second, then reset the internal counter.
    fn opt_steps_per_sec(&mut self) -> f32 {
        let osps = 1000. * self.opt_steps_for_ops as f32 / (self.timer_for_ops.as_millis() as f32);
        self.opt_steps_for_ops = 0;
        self.timer_for_ops = Duration::new(0, 0);
        osps
    }

    /// Performs an optimization step.
    ///
    /// The record of the agent is returned only when the step is a multiple of
    /// `record_agent_info_interval`.
    pub fn train_step<A, R>(
        &mut self,
        agent: &mut A,
        buffer: &mut R,
        opt_steps: &mut usize,
    ) -> Result<Record>
    where
        A: Agent<R>,
        R: ReplayBufferBase,
    {
        let timer = SystemTime::now();
        let record = if is_multiple(*opt_steps + 1, self.record_agent_info_interval) {
            agent.opt_with_record(buffer)?
        } else {
            agent.opt(buffer)?;
            Record::empty()
        };
        *opt_steps += 1;
        self.timer_for_ops += timer.elapsed()?;
        self.opt_steps_for_ops += 1;

        Ok(record)
    }

    /// Trains the agent with batches taken from `buffer`.
    pub fn train_offline<A, R, D>(
        &mut self,
        agent: &mut A,
        buffer: &mut R,
        recorder: &mut dyn AggregateRecorder,
        evaluator: &mut D,
    ) -> Result<()>
    where
        A: Agent<R>,
        R: ReplayBufferBase,
        D: Evaluator<A>,
    {
        let mut max_eval_return = f32::MIN;
        let mut opt_steps: usize = 0;
        agent.train();
        info!("Start offline training for {} steps", self.max_opts);

        while opt_steps < self.max_opts {
            let mut record = self.train_step(agent, buffer, &mut opt_steps)?;

            // Add stats wrt computation cost
            if is_multiple(opt_steps, self.record_compute_cost_interval) {
                record.insert("opt_steps_per_sec", Scalar(self.opt_steps_per_sec()));
            }

            // Evaluation
            if is_multiple(opt_steps, self.eval_interval) {
                info!("Starts evaluation of the trained model");
                agent.eval();
                let eval_record = evaluator.evaluate(agent)?;
                agent.train();
                let eval_return = eval_record.get_scalar("eval_return")?;
                info!("Evaluation at {} steps: eval_return = {}", opt_steps, eval_return);
                record.merge_inplace(eval_record);

                // Save the best model up to the current iteration
                if eval_return > max_eval_return {
                    max_eval_return = eval_return;
                    if let Some(model_dir) = self.model_dir_with("best") {
                        Self::save_model(agent, model_dir)?;
                    }
                }
            }

            // Save the current model
            if is_multiple(opt_steps, self.save_interval) {
                if let Some(model_dir) = self.model_dir_with(format!("{}", opt_steps)) {
                    Self::save_model(agent, model_dir)?;
                }
            }

            if !record.is_empty() {
                recorder.store(record);
            }

            if is_multiple(opt_steps, self.flush_records_interval) {
                recorder.flush(opt_steps as _);
            }
        }

        Ok(())
    }
}
