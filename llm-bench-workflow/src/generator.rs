use futures::stream::{self, StreamExt};
use llm_bench_core::{GenerationError, Sample, SampleSlots, Task, TextGenerator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// A permanent failure together with the samples drawn before it.
///
/// `slots` still has one entry per request; requests that never completed
/// are `None`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error}")]
pub struct PartialGeneration {
    pub slots: SampleSlots,
    #[source]
    pub error: GenerationError,
}

/// How the `k` requests for one task are issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ExecutionMode {
    /// One request at a time, in index order
    #[default]
    Sequential,
    /// Up to `max_in_flight` requests at once
    Concurrent { max_in_flight: usize },
}

/// Draws `k` samples per task.
///
/// Slot `i` of the result always holds the answer to request `i`, whatever
/// order the requests complete in. A request whose retries were exhausted
/// leaves its slot `None`. A permanent provider failure stops the task; it is
/// returned to the caller along with the samples already drawn.
#[derive(Clone)]
pub struct SampleGenerator {
    generator: Arc<dyn TextGenerator>,
    mode: ExecutionMode,
}

impl SampleGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            mode: ExecutionMode::Sequential,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub async fn generate_samples(
        &self,
        task: &Task,
        k: usize,
    ) -> Result<SampleSlots, PartialGeneration> {
        let prompt = task.render_prompt();
        let in_flight = match self.mode {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Concurrent { max_in_flight } => max_in_flight.max(1),
        };

        // `buffered` yields in request order, so slots fill front to back
        let mut draws = stream::iter(0..k)
            .map(|attempt_index| self.draw(task, &prompt, attempt_index))
            .buffered(in_flight);

        let mut slots = Vec::with_capacity(k);
        while let Some(drawn) = draws.next().await {
            match drawn {
                Ok(slot) => slots.push(slot),
                Err(error) => {
                    slots.resize(k, None);
                    return Err(PartialGeneration { slots, error });
                }
            }
        }

        debug!(
            task_id = %task.id,
            requested = k,
            produced = slots.iter().filter(|s| s.is_some()).count(),
            "Samples generated"
        );
        Ok(slots)
    }

    async fn draw(
        &self,
        task: &Task,
        prompt: &str,
        attempt_index: usize,
    ) -> Result<Option<Sample>, GenerationError> {
        match self.generator.generate(prompt).await {
            Ok(text) => Ok(Some(Sample::new(task.id.clone(), text, attempt_index))),
            Err(e) if e.is_permanent() => Err(e),
            Err(e) => {
                warn!(
                    task_id = %task.id,
                    attempt = attempt_index,
                    error = %e,
                    "Sample absent after retries"
                );
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for SampleGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleGenerator")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
