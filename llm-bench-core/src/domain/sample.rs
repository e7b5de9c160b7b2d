use serde::{Deserialize, Serialize};

use super::ids::TaskId;

/// One generated answer for a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sample {
    pub task_id: TaskId,
    pub text: String,
    pub attempt_index: usize,
}

impl Sample {
    pub fn new(task_id: TaskId, text: impl Into<String>, attempt_index: usize) -> Self {
        Self {
            task_id,
            text: text.into(),
            attempt_index,
        }
    }
}

/// Samples for one task, indexed by request order.
///
/// A `None` slot is a request whose retries were exhausted; it is never
/// represented as an empty string.
pub type SampleSlots = Vec<Option<Sample>>;

/// Iterate over the samples that were actually produced.
pub fn present_samples(slots: &[Option<Sample>]) -> impl Iterator<Item = &Sample> {
    slots.iter().flatten()
}
