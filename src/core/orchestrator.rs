//! Evaluation passes
//!
//! Drives one sequential pass over a dataset: build the prompt(s), call the
//! endpoint, accumulate predictions, and annotate the record. Records are
//! processed strictly one after another. Per-record failures are logged and
//! the record is skipped; the accumulators only ever hold fully scored
//! records, so an interim snapshot is always valid.

use crate::core::budget::{ConfigError, LengthBudget};
use crate::core::prompt::{
    choice_suffix, DemoMode, Demonstration, PromptBuilder, PromptRequest, Schema, Task,
};
use crate::core::scorer::{
    brier_score, conflict_rate, split_accuracy, ChoiceDistribution, ConflictRates, Gold,
    SplitAccuracy,
};
use crate::data::{AbstentionRecord, ConflictRecord, OriginalRecord, ABSTAIN_LABEL};
use crate::llm::client::CompletionClient;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// Knobs for one evaluation pass
#[derive(Debug, Clone, PartialEq)]
pub struct EvalSettings {
    /// Template variant
    pub schema: Schema,
    /// Demonstration source
    pub demo_mode: DemoMode,
    /// Upper bound on demonstrations per prompt (conflict task)
    pub max_demonstrations: usize,
    /// Tokens kept free for the completion when checking prompt length
    pub reserved_completion_tokens: usize,
    /// Tokens requested for free-form answers
    pub max_completion_tokens: usize,
    /// Log interim metrics every this many records (0 disables)
    pub report_every: usize,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            schema: Schema::Base,
            demo_mode: DemoMode::None,
            max_demonstrations: 16,
            reserved_completion_tokens: 64,
            max_completion_tokens: 64,
            report_every: 100,
        }
    }
}

impl EvalSettings {
    /// Reject combinations the task cannot run
    pub fn validate(&self, task: Task) -> Result<(), ConfigError> {
        if task == Task::Abstention && self.demo_mode == DemoMode::Counter {
            return Err(ConfigError::InvalidValue {
                field: "demo_mode".to_string(),
                message: "the abstention task supports only 'none' and 'original'".to_string(),
            });
        }
        if self.max_completion_tokens == 0 && task == Task::Conflict {
            return Err(ConfigError::InvalidValue {
                field: "max_completion_tokens".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Why a record was left out of the metrics
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// No prompt within the demonstration range fits the context window
    PromptTooLong,
    /// The endpoint failed on every retry
    EndpointUnavailable,
    /// Fewer choice scores than choices
    IncompleteChoiceSet {
        /// Choices scored before giving up
        scored: usize,
        /// Choices in the record
        expected: usize,
    },
    /// A choice is empty after trimming
    EmptyChoice,
    /// The abstain label is not among the choices
    AbstainChoiceMissing,
    /// The original dataset has no answer for this record
    MissingOriginalAnswer,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PromptTooLong => write!(f, "prompt too long"),
            SkipReason::EndpointUnavailable => write!(f, "endpoint unavailable"),
            SkipReason::IncompleteChoiceSet { scored, expected } => {
                write!(f, "scored {} of {} choices", scored, expected)
            }
            SkipReason::EmptyChoice => write!(f, "empty choice"),
            SkipReason::AbstainChoiceMissing => {
                write!(f, "'{}' is not among the choices", ABSTAIN_LABEL)
            }
            SkipReason::MissingOriginalAnswer => write!(f, "missing original answer"),
        }
    }
}

/// Result of scoring every choice of one abstention record
#[derive(Debug, Clone, PartialEq)]
pub struct AbstentionOutcome {
    /// Highest-scoring choice
    pub prediction: String,
    /// Softmax over the choice scores
    pub distribution: ChoiceDistribution,
    /// Probability assigned to the abstain choice
    pub abstain_probability: f64,
}

fn display_percent(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

/// Abstention metrics at one point of a pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AbstentionMetrics {
    /// Records that contributed
    pub scored: usize,
    /// Records skipped so far
    pub skipped: usize,
    /// Accuracy split by answerable / unanswerable gold
    pub accuracy: SplitAccuracy,
    /// Brier score of the abstain probability
    pub brier: f64,
}

impl fmt::Display for AbstentionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HasAns Acc {}, NoAns Acc {}, Acc {}, Brier {:.4} ({} scored, {} skipped)",
            display_percent(self.accuracy.answerable),
            display_percent(self.accuracy.abstain),
            display_percent(self.accuracy.overall),
            self.brier,
            self.scored,
            self.skipped
        )
    }
}

/// Knowledge-conflict metrics at one point of a pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConflictMetrics {
    /// Records that contributed
    pub scored: usize,
    /// Records skipped so far
    pub skipped: usize,
    /// Match rates against original and counterfactual answers
    #[serde(flatten)]
    pub rates: ConflictRates,
}

impl fmt::Display for ConflictMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ps {:.2}, po {:.2}, mr {:.2}, em {:.2} ({} scored, {} skipped)",
            self.rates.ps, self.rates.po, self.rates.mr, self.rates.em, self.scored, self.skipped
        )
    }
}

#[derive(Debug, Default)]
struct AbstentionAccumulator {
    preds: Vec<String>,
    golds: Vec<String>,
    abstain_gold: Vec<bool>,
    abstain_prob: Vec<f64>,
    skipped: usize,
}

impl AbstentionAccumulator {
    fn push(&mut self, record: &AbstentionRecord, outcome: &AbstentionOutcome) {
        self.preds.push(outcome.prediction.clone());
        self.golds.push(record.answer.clone());
        self.abstain_gold.push(record.is_unanswerable());
        self.abstain_prob.push(outcome.abstain_probability);
    }

    fn snapshot(&self) -> AbstentionMetrics {
        AbstentionMetrics {
            scored: self.preds.len(),
            skipped: self.skipped,
            accuracy: split_accuracy(&self.preds, &self.golds, ABSTAIN_LABEL),
            brier: brier_score(&self.abstain_gold, &self.abstain_prob),
        }
    }
}

#[derive(Debug, Default)]
struct ConflictAccumulator {
    preds: Vec<String>,
    originals: Vec<Gold>,
    counterfactuals: Vec<Gold>,
    skipped: usize,
}

impl ConflictAccumulator {
    fn snapshot(&self) -> ConflictMetrics {
        ConflictMetrics {
            scored: self.preds.len(),
            skipped: self.skipped,
            rates: conflict_rate(&self.preds, &self.originals, &self.counterfactuals),
        }
    }
}

/// Runs evaluation passes against one model
pub struct Evaluator<'a> {
    client: &'a CompletionClient,
    budget: &'a LengthBudget,
    settings: EvalSettings,
}

impl<'a> Evaluator<'a> {
    /// Evaluator over a client and budget for the same model
    pub fn new(client: &'a CompletionClient, budget: &'a LengthBudget, settings: EvalSettings) -> Self {
        Self {
            client,
            budget,
            settings,
        }
    }

    fn should_report(&self, step: usize) -> bool {
        self.settings.report_every > 0 && step % self.settings.report_every == 0
    }

    /// Score every choice of one record and pick the most likely
    ///
    /// Demonstrations are all rendered. Scoring stops at the first choice
    /// whose prompt is oversize or whose call fails, since a partial
    /// distribution is never used.
    pub async fn evaluate_abstention(
        &self,
        record: &AbstentionRecord,
        demonstrations: &[Demonstration],
    ) -> Result<AbstentionOutcome, SkipReason> {
        let choices = record.choice_list();
        if choices.iter().any(|c| c.is_empty()) {
            return Err(SkipReason::EmptyChoice);
        }
        let abstain_index = choices
            .iter()
            .position(|c| c == ABSTAIN_LABEL)
            .ok_or(SkipReason::AbstainChoiceMissing)?;
        if abstain_index + 1 != choices.len() {
            debug!(abstain_index, choices = choices.len(), "Abstain choice is not listed last");
        }

        let request = PromptRequest {
            context: record.context.clone(),
            query: record.question.clone(),
            choices: record.choices.clone(),
            schema: self.settings.schema,
            demonstrations: demonstrations.to_vec(),
        };
        let base = PromptBuilder::new(Task::Abstention).build(&request);

        let mut scores = Vec::with_capacity(choices.len());
        for choice in &choices {
            let suffix = choice_suffix(choice);
            let prompt = format!("{}{}", base, suffix);
            let incomplete = SkipReason::IncompleteChoiceSet {
                scored: scores.len(),
                expected: choices.len(),
            };

            if !self
                .budget
                .fits(&prompt, self.settings.reserved_completion_tokens)
            {
                warn!(choice = %choice, "Choice prompt exceeds the context window");
                return Err(incomplete);
            }

            let suffix_tokens = self.budget.count_tokens(&format!(" {}", suffix));
            match self.client.score_choice(&prompt, suffix_tokens).await {
                Some(score) => scores.push(score),
                None => return Err(incomplete),
            }
        }

        let distribution =
            ChoiceDistribution::from_scores(&scores).ok_or(SkipReason::IncompleteChoiceSet {
                scored: 0,
                expected: choices.len(),
            })?;
        let prediction = choices[distribution.argmax()].clone();
        let abstain_probability = distribution.get(abstain_index).unwrap_or_default();

        Ok(AbstentionOutcome {
            prediction,
            distribution,
            abstain_probability,
        })
    }

    /// Evaluate every record, annotating the ones that were scored
    pub async fn run_abstention(
        &self,
        records: &mut [AbstentionRecord],
        demonstrations: &[Demonstration],
    ) -> AbstentionMetrics {
        let demonstrations = match self.settings.demo_mode {
            DemoMode::None => &[][..],
            _ => demonstrations,
        };
        info!(
            records = records.len(),
            demonstrations = demonstrations.len(),
            schema = %self.settings.schema,
            "Starting abstention pass"
        );

        let mut acc = AbstentionAccumulator::default();
        let total = records.len();
        for (step, record) in records.iter_mut().enumerate() {
            if self.should_report(step) {
                info!(step, total, "{}", acc.snapshot());
            }

            match self.evaluate_abstention(record, demonstrations).await {
                Ok(outcome) => {
                    debug!(step, prediction = %outcome.prediction, gold = %record.answer, "Record scored");
                    acc.push(record, &outcome);
                    record.prediction = Some(outcome.prediction);
                    record.choice_distribution = Some(outcome.distribution.into_vec());
                }
                Err(reason) => {
                    warn!(step, reason = %reason, "Skipping record");
                    acc.skipped += 1;
                }
            }
        }

        let metrics = acc.snapshot();
        info!("{}", metrics);
        metrics
    }

    /// Generate a free-form answer for one counterfactual record
    ///
    /// Returns the prediction and the number of demonstrations used.
    pub async fn evaluate_conflict(
        &self,
        record: &ConflictRecord,
    ) -> Result<(String, usize), SkipReason> {
        let request = PromptRequest {
            context: record.context.clone(),
            query: record.question.clone(),
            choices: String::new(),
            schema: self.settings.schema,
            demonstrations: record.demonstrations(self.settings.demo_mode),
        };

        let fitted = PromptBuilder::new(Task::Conflict)
            .fit(
                &request,
                self.settings.max_demonstrations,
                self.budget,
                self.settings.reserved_completion_tokens,
            )
            .map_err(|e| {
                warn!(error = %e, "No demonstration count fits");
                SkipReason::PromptTooLong
            })?;

        let prediction = self
            .client
            .complete(&fitted.text, self.settings.max_completion_tokens)
            .await
            .ok_or(SkipReason::EndpointUnavailable)?;
        Ok((prediction, fitted.demonstrations))
    }

    /// Evaluate aligned original/counterfactual datasets, annotating the counterfactual records
    pub async fn run_conflict(
        &self,
        originals: &[OriginalRecord],
        records: &mut [ConflictRecord],
    ) -> ConflictMetrics {
        if originals.len() != records.len() {
            warn!(
                originals = originals.len(),
                counterfactuals = records.len(),
                "Dataset lengths differ; evaluating the aligned prefix"
            );
        }
        info!(
            records = records.len(),
            schema = %self.settings.schema,
            demo_mode = %self.settings.demo_mode,
            "Starting knowledge-conflict pass"
        );

        let mut acc = ConflictAccumulator::default();
        let total = originals.len().min(records.len());
        for (step, (original, record)) in originals.iter().zip(records.iter_mut()).enumerate() {
            if self.should_report(step) {
                info!(step, total, "{}", acc.snapshot());
            }

            let Some(original_answer) = original.answer.clone() else {
                warn!(step, reason = %SkipReason::MissingOriginalAnswer, "Skipping record");
                acc.skipped += 1;
                continue;
            };

            match self.evaluate_conflict(record).await {
                Ok((prediction, demonstrations)) => {
                    debug!(step, demonstrations, prediction = %prediction, "Record answered");
                    acc.preds.push(prediction.clone());
                    acc.originals.push(original_answer.clone());
                    acc.counterfactuals.push(record.answer.clone());

                    record.prediction = Some(prediction);
                    record.original_answer = Some(original_answer);
                    record.schema = Some(self.settings.schema);
                    record.demo_mode = Some(self.settings.demo_mode);
                }
                Err(reason) => {
                    warn!(step, reason = %reason, "Skipping record");
                    acc.skipped += 1;
                }
            }
        }

        let metrics = acc.snapshot();
        info!("{}", metrics);
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::budget::{ModelEndpointConfig, WhitespaceTokenizer};
    use crate::llm::retry::RetryPolicy;
    use crate::llm::{Completion, CompletionEndpoint, CompletionRequest, EndpointError, EndpointFuture};
    use serde_json::Map;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Scores a choice by looking up the text after the last "A: " in the prompt
    struct LookupEndpoint {
        scores: Vec<(&'static str, f64)>,
        answer: &'static str,
        prompts: Mutex<Vec<String>>,
    }

    impl CompletionEndpoint for LookupEndpoint {
        fn complete(&self, request: &CompletionRequest) -> EndpointFuture<'_, Completion> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            let result = if request.echo {
                let tail = request.prompt.rsplit("A: ").next().unwrap_or_default();
                match self.scores.iter().find(|(c, _)| format!("{}.", c) == tail) {
                    Some((_, s)) => {
                        // any trailing window sums to `s`
                        let mut token_logprobs = vec![Some(0.0); 8];
                        token_logprobs[7] = Some(*s);
                        Ok(Completion {
                            text: request.prompt.clone(),
                            token_logprobs,
                        })
                    }
                    None => Err(EndpointError::InvalidResponse("unknown choice".to_string())),
                }
            } else {
                Ok(Completion {
                    text: self.answer.to_string(),
                    ..Default::default()
                })
            };
            Box::pin(async move { result })
        }

        fn model_name(&self) -> &str {
            "lookup"
        }
    }

    fn endpoint(scores: Vec<(&'static str, f64)>, answer: &'static str) -> Arc<LookupEndpoint> {
        Arc::new(LookupEndpoint {
            scores,
            answer,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn client(endpoint: Arc<LookupEndpoint>) -> CompletionClient {
        CompletionClient::new(endpoint, RetryPolicy::fixed(2, Duration::from_millis(1)))
    }

    fn budget(limit: usize) -> LengthBudget {
        LengthBudget::new(
            ModelEndpointConfig::with_context_limit("test", limit).unwrap(),
            Box::new(WhitespaceTokenizer),
        )
    }

    fn abstention(choices: &str, answer: &str) -> AbstentionRecord {
        AbstentionRecord {
            context: "Rome is in Italy.".to_string(),
            question: "Where is Rome?".to_string(),
            choices: choices.to_string(),
            answer: answer.to_string(),
            prediction: None,
            choice_distribution: None,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_settings_reject_counter_demos_for_abstention() {
        let settings = EvalSettings {
            demo_mode: DemoMode::Counter,
            ..Default::default()
        };
        assert!(settings.validate(Task::Abstention).is_err());
        assert!(settings.validate(Task::Conflict).is_ok());
    }

    #[tokio::test]
    async fn test_evaluate_abstention_picks_highest_score() {
        let ep = endpoint(vec![("Italy", -0.5), ("France", -3.0), ("I don't know", -2.0)], "");
        let client = client(ep.clone());
        let budget = budget(1000);
        let evaluator = Evaluator::new(&client, &budget, EvalSettings::default());

        let record = abstention("Italy; France; I don't know", "Italy");
        let outcome = evaluator.evaluate_abstention(&record, &[]).await.unwrap();

        assert_eq!(outcome.prediction, "Italy");
        let probs = outcome.distribution.probabilities();
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((outcome.abstain_probability - probs[2]).abs() < 1e-12);
        assert_eq!(ep.prompts.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_evaluate_abstention_abstain_choice_listed_first() {
        let ep = endpoint(vec![("Italy", -0.5), ("France", -3.0), ("I don't know", -2.0)], "");
        let client = client(ep);
        let budget = budget(1000);
        let evaluator = Evaluator::new(&client, &budget, EvalSettings::default());

        let record = abstention("I don't know; Italy; France", "Italy");
        let outcome = evaluator.evaluate_abstention(&record, &[]).await.unwrap();

        assert_eq!(outcome.prediction, "Italy");
        let probs = outcome.distribution.probabilities();
        assert_eq!(outcome.abstain_probability, probs[0]);
        assert!(probs[1] > probs[0] && probs[0] > probs[2]);
    }

    #[test]
    fn test_report_cadence() {
        let ep = endpoint(vec![], "");
        let client = client(ep);
        let budget = budget(1000);

        let every_three = Evaluator::new(
            &client,
            &budget,
            EvalSettings {
                report_every: 3,
                ..Default::default()
            },
        );
        let reported: Vec<usize> = (0..10).filter(|s| every_three.should_report(*s)).collect();
        assert_eq!(reported, vec![0, 3, 6, 9]);

        let disabled = Evaluator::new(
            &client,
            &budget,
            EvalSettings {
                report_every: 0,
                ..Default::default()
            },
        );
        assert!((0..10).all(|s| !disabled.should_report(s)));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_missing_original_answer_is_warned_and_skipped() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();

        let ep = endpoint(vec![], " Paris");
        let client = client(ep.clone());
        let budget = budget(1000);
        let evaluator = Evaluator::new(&client, &budget, EvalSettings::default());

        let originals: Vec<OriginalRecord> =
            serde_json::from_value(serde_json::json!([{"answer": null}])).unwrap();
        let mut records: Vec<ConflictRecord> = serde_json::from_value(serde_json::json!([
            {"question": "q?", "context": "c", "answer": "a"}
        ]))
        .unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let metrics = tracing::subscriber::with_default(subscriber, || {
            runtime.block_on(evaluator.run_conflict(&originals, &mut records))
        });

        assert_eq!(metrics.skipped, 1);
        assert_eq!(metrics.scored, 0);
        assert!(ep.prompts.lock().unwrap().is_empty());
        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"));
        assert!(output.contains("missing original answer"));
    }

    #[tokio::test]
    async fn test_evaluate_abstention_missing_abstain_choice() {
        let ep = endpoint(vec![], "");
        let client = client(ep.clone());
        let budget = budget(1000);
        let evaluator = Evaluator::new(&client, &budget, EvalSettings::default());

        let record = abstention("Italy; France", "Italy");
        assert_eq!(
            evaluator.evaluate_abstention(&record, &[]).await,
            Err(SkipReason::AbstainChoiceMissing)
        );
        assert!(ep.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_evaluate_abstention_empty_choice() {
        let ep = endpoint(vec![], "");
        let client = client(ep);
        let budget = budget(1000);
        let evaluator = Evaluator::new(&client, &budget, EvalSettings::default());
        let record = abstention("Italy; ; I don't know", "Italy");
        assert_eq!(
            evaluator.evaluate_abstention(&record, &[]).await,
            Err(SkipReason::EmptyChoice)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_abstention_incomplete_when_a_choice_fails() {
        // "France" has no score, so its call fails on every attempt
        let ep = endpoint(vec![("Italy", -0.5), ("I don't know", -2.0)], "");
        let client = client(ep);
        let budget = budget(1000);
        let evaluator = Evaluator::new(&client, &budget, EvalSettings::default());

        let record = abstention("Italy; France; I don't know", "Italy");
        assert_eq!(
            evaluator.evaluate_abstention(&record, &[]).await,
            Err(SkipReason::IncompleteChoiceSet {
                scored: 1,
                expected: 3
            })
        );
    }

    #[tokio::test]
    async fn test_evaluate_abstention_oversize_makes_no_call() {
        let ep = endpoint(vec![("Italy", -0.5), ("I don't know", -2.0)], "");
        let client = client(ep.clone());
        let budget = budget(10);
        let evaluator = Evaluator::new(&client, &budget, EvalSettings::default());

        let record = abstention("Italy; I don't know", "Italy");
        assert!(matches!(
            evaluator.evaluate_abstention(&record, &[]).await,
            Err(SkipReason::IncompleteChoiceSet { scored: 0, .. })
        ));
        assert!(ep.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_abstention_ignores_demos_in_none_mode() {
        let ep = endpoint(vec![("Italy", -0.5), ("I don't know", -2.0)], "");
        let client = client(ep.clone());
        let budget = budget(1000);
        let evaluator = Evaluator::new(&client, &budget, EvalSettings::default());

        let demo = Demonstration {
            query: "Demo question?".to_string(),
            context: "Demo context.".to_string(),
            choices: "x".to_string(),
            answer: "x".to_string(),
        };
        let mut records = vec![abstention("Italy; I don't know", "Italy")];
        let metrics = evaluator.run_abstention(&mut records, &[demo]).await;

        assert_eq!(metrics.scored, 1);
        assert!(ep
            .prompts
            .lock()
            .unwrap()
            .iter()
            .all(|p| !p.contains("Demo question?")));
    }

    #[tokio::test]
    async fn test_evaluate_conflict_uses_fitted_demonstrations() {
        let ep = endpoint(vec![], " Paris");
        let client = client(ep.clone());
        let budget = budget(10_000);
        let settings = EvalSettings {
            demo_mode: DemoMode::Counter,
            max_demonstrations: 2,
            ..Default::default()
        };
        let evaluator = Evaluator::new(&client, &budget, settings);

        let record: ConflictRecord = serde_json::from_value(serde_json::json!({
            "question": "Capital of France?",
            "context": "The capital of France is Paris.",
            "answer": "Paris",
            "ic_examples": [
                {"question": "d1?", "context": "c1", "answer": "a1"},
                {"question": "d2?", "context": "c2", "answer": "a2"},
                {"question": "d3?", "context": "c3", "answer": "a3"}
            ]
        }))
        .unwrap();

        let (prediction, demos) = evaluator.evaluate_conflict(&record).await.unwrap();
        assert_eq!(prediction, " Paris");
        assert_eq!(demos, 2);
        let prompts = ep.prompts.lock().unwrap();
        assert!(!prompts[0].contains("d1?"));
        assert!(prompts[0].contains("Q:d3?\nA:a3\n\n"));
    }

    #[test]
    fn test_metrics_display() {
        let metrics = AbstentionMetrics {
            scored: 2,
            skipped: 1,
            accuracy: SplitAccuracy {
                answerable: Some(50.0),
                abstain: None,
                overall: Some(50.0),
            },
            brier: 0.25,
        };
        assert_eq!(
            metrics.to_string(),
            "HasAns Acc 50.00, NoAns Acc n/a, Acc 50.00, Brier 0.2500 (2 scored, 1 skipped)"
        );
    }
}
