use serde::{Deserialize, Serialize};
use validator::Validate;

use super::ids::TaskId;
use crate::error::{CoreError, Result};

const CHOICE_INSTRUCTION: &str = "Please select the correct answer by indicating the answer number.";

/// A benchmark question with its accepted answers.
///
/// Tasks are created once by the loader and are read-only afterwards; the
/// constructor enforces that at least one reference answer exists and that,
/// for multiple-choice tasks, every reference answer is one of the choices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Task {
    pub id: TaskId,
    #[validate(length(min = 1))]
    pub prompt: String,
    #[validate(length(min = 1))]
    pub reference_answers: Vec<String>,
    pub choices: Option<Vec<String>>,
}

impl Task {
    pub fn new(
        id: impl Into<TaskId>,
        prompt: impl Into<String>,
        reference_answers: Vec<String>,
    ) -> Result<Self> {
        Self::with_choices(id, prompt, reference_answers, None)
    }

    pub fn with_choices(
        id: impl Into<TaskId>,
        prompt: impl Into<String>,
        reference_answers: Vec<String>,
        choices: Option<Vec<String>>,
    ) -> Result<Self> {
        let task = Self {
            id: id.into(),
            prompt: prompt.into(),
            reference_answers,
            choices,
        };
        task.check()?;
        Ok(task)
    }

    fn check(&self) -> Result<()> {
        self.validate()?;

        if self.reference_answers.iter().any(|a| a.trim().is_empty()) {
            return Err(CoreError::Validation(format!(
                "task {} has a blank reference answer",
                self.id
            )));
        }

        if let Some(choices) = &self.choices {
            if let Some(missing) = self
                .reference_answers
                .iter()
                .find(|answer| !choices.contains(answer))
            {
                return Err(CoreError::Validation(format!(
                    "task {}: reference answer {:?} is not among the choices",
                    self.id, missing
                )));
            }
        }

        Ok(())
    }

    pub fn is_multiple_choice(&self) -> bool {
        self.choices.as_ref().map_or(false, |c| !c.is_empty())
    }

    /// The text sent to the model.
    ///
    /// Free-form tasks send the prompt verbatim. Multiple-choice tasks list the
    /// numbered options and ask for the answer number.
    pub fn render_prompt(&self) -> String {
        match &self.choices {
            Some(choices) if !choices.is_empty() => {
                let mut rendered = format!("Question: {}\nPossible answers:\n", self.prompt);
                for (i, choice) in choices.iter().enumerate() {
                    rendered.push_str(&format!("{}. {}\n", i + 1, choice));
                }
                rendered.push_str(CHOICE_INSTRUCTION);
                rendered
            }
            _ => self.prompt.clone(),
        }
    }
}
