//! Dataset records and annotated logs
//!
//! Records deserialize the fields the evaluation reads and keep every other
//! field in a flattened map, so the annotated log written back has the input's
//! structure plus the added result fields.

use crate::core::prompt::{split_choices, DemoMode, Demonstration, Schema};
use crate::core::scorer::Gold;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Sentinel answer meaning the question is unanswerable from its context
pub const ABSTAIN_LABEL: &str = "I don't know";

/// Errors reading datasets or writing logs
#[derive(Debug)]
pub enum DataError {
    /// File could not be read or written
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// File contents are not the expected JSON shape
    Parse {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },
}

impl std::fmt::Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            DataError::Parse { path, source } => {
                write!(f, "Invalid dataset {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for DataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataError::Io { source, .. } => Some(source),
            DataError::Parse { source, .. } => Some(source),
        }
    }
}

/// Abstention-task record: `;`-delimited choices, answer may be [`ABSTAIN_LABEL`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstentionRecord {
    /// Supporting passage
    pub context: String,
    /// Question text
    pub question: String,
    /// Candidate answers joined with `;`
    pub choices: String,
    /// Gold choice
    pub answer: String,
    /// Chosen option, set after a successful evaluation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
    /// Softmax over choice scores, set after a successful evaluation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_distribution: Option<Vec<f64>>,
    /// Fields not used by the evaluation
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AbstentionRecord {
    /// Choices split on `;` and trimmed
    pub fn choice_list(&self) -> Vec<String> {
        split_choices(&self.choices)
    }

    /// Whether the gold answer is the abstain label
    pub fn is_unanswerable(&self) -> bool {
        self.answer.trim() == ABSTAIN_LABEL
    }

    /// Render as a demonstration answered with its gold choice
    pub fn to_demonstration(&self) -> Demonstration {
        Demonstration {
            query: self.question.clone(),
            context: self.context.clone(),
            choices: self.choices.clone(),
            answer: self.answer.clone(),
        }
    }
}

/// Demonstration example embedded in a conflict record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictExample {
    /// Question text
    pub question: String,
    /// Supporting passage
    pub context: String,
    /// Answer string or list of acceptable answers
    pub answer: Gold,
    /// Fields not used by the evaluation
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConflictExample {
    /// Render as a demonstration answered with its first acceptable answer
    pub fn to_demonstration(&self) -> Demonstration {
        Demonstration {
            query: self.question.clone(),
            context: self.context.clone(),
            choices: String::new(),
            answer: self.answer.primary().unwrap_or_default().to_string(),
        }
    }
}

/// Counterfactual-dataset record for the knowledge-conflict task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Question text
    pub question: String,
    /// Counterfactual passage
    pub context: String,
    /// Counterfactual answer(s)
    pub answer: Gold,
    /// Demonstrations answered counterfactually
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ic_examples: Vec<ConflictExample>,
    /// Demonstrations answered with original answers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ico_examples: Vec<ConflictExample>,
    /// Generated answer, set after a successful evaluation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
    /// Original-dataset answer for this question
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_answer: Option<Gold>,
    /// Schema used for the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    /// Demonstration mode used for the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demo_mode: Option<DemoMode>,
    /// Fields not used by the evaluation
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConflictRecord {
    /// Demonstrations selected by `mode`
    pub fn demonstrations(&self, mode: DemoMode) -> Vec<Demonstration> {
        let examples: &[ConflictExample] = match mode {
            DemoMode::None => &[],
            DemoMode::Counter => &self.ic_examples,
            DemoMode::Original => &self.ico_examples,
        };
        examples.iter().map(ConflictExample::to_demonstration).collect()
    }
}

/// Original-dataset record; only the answer is read
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OriginalRecord {
    /// Original answer(s); `null` marks a record to skip
    #[serde(default)]
    pub answer: Option<Gold>,
}

/// Load a JSON array of records
pub fn load_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, DataError> {
    let text = fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| DataError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Write annotated records as a JSON array
pub fn write_log<T: Serialize>(path: &Path, records: &[T]) -> Result<(), DataError> {
    let text = serde_json::to_string(records).map_err(|source| DataError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abstention_record_keeps_unknown_fields() {
        let json = r#"{
            "id": 7,
            "context": "c",
            "question": "q?",
            "choices": "a; b; I don't know",
            "answer": "I don't know"
        }"#;
        let mut record: AbstentionRecord = serde_json::from_str(json).unwrap();
        assert!(record.is_unanswerable());
        assert_eq!(record.choice_list(), vec!["a", "b", "I don't know"]);

        record.prediction = Some("b".to_string());
        record.choice_distribution = Some(vec![0.2, 0.5, 0.3]);
        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["id"], 7);
        assert_eq!(out["prediction"], "b");
        assert_eq!(out["choice_distribution"][1], 0.5);
    }

    #[test]
    fn test_unannotated_record_has_no_result_fields() {
        let json = r#"{"context":"c","question":"q","choices":"a;b","answer":"a"}"#;
        let record: AbstentionRecord = serde_json::from_str(json).unwrap();
        let out = serde_json::to_value(&record).unwrap();
        assert!(out.get("prediction").is_none());
        assert!(out.get("choice_distribution").is_none());
    }

    #[test]
    fn test_conflict_record_demonstration_modes() {
        let json = r#"{
            "question": "who?",
            "context": "ctx",
            "answer": ["Alice", "Al"],
            "ic_examples": [{"question": "q1", "context": "c1", "answer": ["x", "y"]}],
            "ico_examples": [
                {"question": "q2", "context": "c2", "answer": "z"},
                {"question": "q3", "context": "c3", "answer": "w", "source": "nq"}
            ]
        }"#;
        let record: ConflictRecord = serde_json::from_str(json).unwrap();
        assert!(record.demonstrations(DemoMode::None).is_empty());
        let counter = record.demonstrations(DemoMode::Counter);
        assert_eq!(counter.len(), 1);
        assert_eq!(counter[0].answer, "x");
        assert_eq!(record.demonstrations(DemoMode::Original).len(), 2);

        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["ico_examples"][1]["source"], "nq");
    }

    #[test]
    fn test_conflict_record_annotation_fields() {
        let json = r#"{"question":"q","context":"c","answer":"a"}"#;
        let mut record: ConflictRecord = serde_json::from_str(json).unwrap();
        record.prediction = Some(" a".to_string());
        record.original_answer = Some(Gold::from("b"));
        record.schema = Some(Schema::InstructionOpinion);
        record.demo_mode = Some(DemoMode::Counter);
        let out = serde_json::to_value(&record).unwrap();
        assert!(out.get("ic_examples").is_none());
        assert!(out.get("ico_examples").is_none());
        assert_eq!(out["original_answer"], "b");
        assert_eq!(out["schema"], "instr+opin");
        assert_eq!(out["demo_mode"], "counter");
    }

    #[test]
    fn test_original_record_null_answer() {
        let records: Vec<OriginalRecord> =
            serde_json::from_str(r#"[{"answer": null, "question": "q"}, {"answer": "x"}]"#).unwrap();
        assert_eq!(records[0].answer, None);
        assert_eq!(records[1].answer, Some(Gold::from("x")));
    }

    #[test]
    fn test_load_and_write_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.json");
        fs::write(&input, r#"[{"context":"c","question":"q","choices":"a;b","answer":"a","k":1}]"#)
            .unwrap();

        let records: Vec<AbstentionRecord> = load_records(&input).unwrap();
        let output = dir.path().join("out.json");
        write_log(&output, &records).unwrap();
        let back: Vec<Value> = load_records(&output).unwrap();
        assert_eq!(back[0]["k"], 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_records::<Value>(Path::new("/nonexistent/faithful-eval.json")).unwrap_err();
        assert!(matches!(err, DataError::Io { .. }));
    }
}
