//! Dataset loading.
//!
//! Raw records (CSV rows, JSON objects, JSON Lines) are turned into validated
//! [`Task`]s. A malformed record never fails the load: it is logged, listed in
//! [`LoadOutcome::skipped`] and the next record is read.

use llm_bench_core::{CoreError, Result, Task, TaskId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

const PROMPT_FIELDS: &[&str] = &["question", "prompt"];
const ANSWER_FIELDS: &[&str] = &["answer", "answers", "correct_answer", "label"];
const CHOICE_PREFIX: &str = "possible_answer_";

/// A record with canonical keys.
pub type RawRecord = Map<String, Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    #[default]
    Csv,
    /// A single JSON array of objects
    Json,
    /// One JSON object per line
    Jsonl,
}

impl DatasetFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(DatasetFormat::Csv),
            "json" => Some(DatasetFormat::Json),
            "jsonl" | "ndjson" => Some(DatasetFormat::Jsonl),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Stop after this many accepted tasks
    pub limit: Option<usize>,
    /// Reorder multiple-choice options deterministically
    pub shuffle_seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRecord {
    /// Zero-based position of the record in its source
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub tasks: Vec<Task>,
    pub skipped: Vec<SkippedRecord>,
}

/// Lowercase, trimmed, spaces and hyphens folded to `_`.
pub fn canonical_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

fn canonicalize(record: Map<String, Value>) -> RawRecord {
    record
        .into_iter()
        .map(|(key, value)| (canonical_key(&key), value))
        .collect()
}

/// Text of a scalar value; `None` for null, blank text, arrays and objects.
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Answers from a string, an array of strings, or a SQuAD-style `{"text": [...]}` object.
fn answer_texts(value: &Value) -> Vec<String> {
    let texts: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        Value::Object(map) => map.get("text").map(answer_texts).unwrap_or_default(),
        other => scalar_text(other).into_iter().collect(),
    };

    let mut unique = Vec::with_capacity(texts.len());
    for text in texts {
        if !unique.contains(&text) {
            unique.push(text);
        }
    }
    unique
}

#[derive(Debug, Clone, Default)]
pub struct TaskLoader {
    config: LoaderConfig,
}

impl TaskLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Load a dataset file; the format defaults to the file extension.
    pub fn load_path(&self, path: &Path, format: Option<DatasetFormat>) -> Result<LoadOutcome> {
        let format = format
            .or_else(|| DatasetFormat::from_path(path))
            .ok_or_else(|| {
                CoreError::Dataset(format!("cannot infer dataset format for {}", path.display()))
            })?;
        let source = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dataset")
            .to_string();

        info!(path = %path.display(), ?format, "Loading dataset");

        match format {
            DatasetFormat::Csv => self.load_csv(File::open(path)?, &source),
            DatasetFormat::Json => self.load_json_str(&std::fs::read_to_string(path)?, &source),
            DatasetFormat::Jsonl => self.load_jsonl(BufReader::new(File::open(path)?), &source),
        }
    }

    /// CSV with a header row.
    pub fn load_csv<R: Read>(&self, reader: R, source: &str) -> Result<LoadOutcome> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(canonical_key).collect();
        let mut outcome = LoadOutcome::default();

        for (index, row) in csv_reader.records().enumerate() {
            if self.limit_reached(&outcome) {
                break;
            }

            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    self.skip(&mut outcome, index, format!("unreadable row: {}", e));
                    continue;
                }
            };

            // Short rows leave the missing columns null so required fields are caught
            let record: RawRecord = headers
                .iter()
                .enumerate()
                .map(|(i, key)| {
                    let cell = row
                        .get(i)
                        .map_or(Value::Null, |cell| Value::String(cell.to_string()));
                    (key.clone(), cell)
                })
                .collect();
            self.accept(&mut outcome, &record, index, source);
        }

        self.log_outcome(&outcome, source);
        Ok(outcome)
    }

    /// A JSON array of objects. A document that is not an array is an error.
    pub fn load_json_str(&self, text: &str, source: &str) -> Result<LoadOutcome> {
        let document: Value = serde_json::from_str(text)?;
        let Value::Array(items) = document else {
            return Err(CoreError::Dataset(format!(
                "{}: expected a JSON array of records",
                source
            )));
        };

        let mut outcome = LoadOutcome::default();
        for (index, item) in items.into_iter().enumerate() {
            if self.limit_reached(&outcome) {
                break;
            }
            match item {
                Value::Object(map) => self.accept(&mut outcome, &canonicalize(map), index, source),
                _ => self.skip(&mut outcome, index, "record is not an object".to_string()),
            }
        }

        self.log_outcome(&outcome, source);
        Ok(outcome)
    }

    /// One JSON object per line; blank lines are ignored, bad lines skipped.
    pub fn load_jsonl<R: BufRead>(&self, reader: R, source: &str) -> Result<LoadOutcome> {
        let mut outcome = LoadOutcome::default();

        for (index, bytes) in reader.split(b'\n').enumerate() {
            if self.limit_reached(&outcome) {
                break;
            }

            let line = match String::from_utf8(bytes?) {
                Ok(line) => line,
                Err(e) => {
                    self.skip(&mut outcome, index, format!("invalid UTF-8: {}", e));
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(&line) {
                Ok(Value::Object(map)) => {
                    self.accept(&mut outcome, &canonicalize(map), index, source)
                }
                Ok(_) => self.skip(&mut outcome, index, "record is not an object".to_string()),
                Err(e) => self.skip(&mut outcome, index, format!("invalid JSON: {}", e)),
            }
        }

        self.log_outcome(&outcome, source);
        Ok(outcome)
    }

    /// In-memory records; keys are canonicalized first.
    pub fn load_records<I>(&self, records: I, source: &str) -> LoadOutcome
    where
        I: IntoIterator<Item = Map<String, Value>>,
    {
        let mut outcome = LoadOutcome::default();
        for (index, record) in records.into_iter().enumerate() {
            if self.limit_reached(&outcome) {
                break;
            }
            self.accept(&mut outcome, &canonicalize(record), index, source);
        }

        self.log_outcome(&outcome, source);
        outcome
    }

    /// Build one task from a canonical record.
    pub fn parse_record(&self, record: &RawRecord, index: usize, source: &str) -> Result<Task> {
        let prompt = PROMPT_FIELDS
            .iter()
            .find_map(|field| record.get(*field).and_then(scalar_text))
            .ok_or_else(|| CoreError::Dataset("missing question".to_string()))?;

        let reference_answers = ANSWER_FIELDS
            .iter()
            .filter_map(|field| record.get(*field))
            .map(answer_texts)
            .find(|answers| !answers.is_empty())
            .ok_or_else(|| CoreError::Dataset("missing reference answer".to_string()))?;

        let id = record
            .get("id")
            .and_then(scalar_text)
            .map(TaskId::from)
            .unwrap_or_else(|| TaskId::from_row(source, index));

        let choices = self.choices(record, &reference_answers, index)?;

        Task::with_choices(id, prompt, reference_answers, choices)
    }

    /// Correct answers first, then `possible_answer_*` in numeric order.
    fn choices(
        &self,
        record: &RawRecord,
        reference_answers: &[String],
        index: usize,
    ) -> Result<Option<Vec<String>>> {
        if let Some(Value::Array(items)) = record.get("choices") {
            let choices: Vec<String> = items.iter().filter_map(scalar_text).collect();
            return Ok((!choices.is_empty()).then_some(choices));
        }

        let mut options: Vec<(usize, &str, &Value)> = record
            .iter()
            .filter_map(|(key, value)| {
                let suffix = key.strip_prefix(CHOICE_PREFIX)?;
                Some((suffix.parse::<usize>().unwrap_or(usize::MAX), suffix, value))
            })
            .collect();
        if options.is_empty() {
            return Ok(None);
        }
        options.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

        let mut choices: Vec<String> = reference_answers.to_vec();
        for (_, suffix, value) in options {
            let text = scalar_text(value).ok_or_else(|| {
                CoreError::Dataset(format!("blank {}{}", CHOICE_PREFIX, suffix))
            })?;
            if !choices.contains(&text) {
                choices.push(text);
            }
        }

        if let Some(seed) = self.config.shuffle_seed {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
            choices.shuffle(&mut rng);
        }

        Ok(Some(choices))
    }

    fn accept(&self, outcome: &mut LoadOutcome, record: &RawRecord, index: usize, source: &str) {
        match self.parse_record(record, index, source) {
            Ok(task) => {
                debug!(task_id = %task.id, index, "Loaded task");
                outcome.tasks.push(task);
            }
            Err(e) => self.skip(outcome, index, e.to_string()),
        }
    }

    fn skip(&self, outcome: &mut LoadOutcome, index: usize, reason: String) {
        warn!(index, reason = %reason, "Skipping malformed record");
        outcome.skipped.push(SkippedRecord { index, reason });
    }

    fn limit_reached(&self, outcome: &LoadOutcome) -> bool {
        self.config
            .limit
            .map_or(false, |limit| outcome.tasks.len() >= limit)
    }

    fn log_outcome(&self, outcome: &LoadOutcome, source: &str) {
        info!(
            source,
            loaded = outcome.tasks.len(),
            skipped = outcome.skipped.len(),
            "Dataset loaded"
        );
    }
}
