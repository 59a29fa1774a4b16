//! Prompt rendering and demonstration fitting
//!
//! A [`PromptRequest`] is rendered under one of five [`Schema`] variants for
//! one of two [`Task`]s. Demonstrations are prepended oldest-first from the
//! tail of the list, and [`PromptBuilder::fit`] shrinks their count until the
//! prompt fits the [`LengthBudget`].
//!
//! # Layout
//!
//! ```text
//! [instruction line\n\n]        (instruction schemas only, once)
//! demo_1 rendered with answer\n\n
//! ...
//! demo_n rendered with answer\n\n
//! target rendered with empty answer slot
//! ```

use crate::core::budget::LengthBudget;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Smallest demonstration count the fitting search backs off to
pub const MIN_DEMONSTRATIONS: usize = 2;

/// Speaker used by the opinion-framed templates
pub const SPEAKER: &str = "Bob";

/// Prompt-rendering template variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Schema {
    /// Context, question, answer slot
    #[serde(rename = "base")]
    Base,
    /// Question asks for the answer "based on the given text"
    #[serde(rename = "attr")]
    Attribution,
    /// Base layout behind a task instruction line
    #[serde(rename = "instr")]
    Instruction,
    /// Context attributed to a speaker, question asks for their opinion
    #[serde(rename = "opin")]
    Opinion,
    /// Opinion layout behind a task instruction line
    #[serde(rename = "instr+opin")]
    InstructionOpinion,
}

impl Schema {
    /// All variants in CLI order
    pub const ALL: [Schema; 5] = [
        Schema::Base,
        Schema::Attribution,
        Schema::Instruction,
        Schema::Opinion,
        Schema::InstructionOpinion,
    ];

    /// Short identifier used on the command line and in logs
    pub fn as_str(self) -> &'static str {
        match self {
            Schema::Base => "base",
            Schema::Attribution => "attr",
            Schema::Instruction => "instr",
            Schema::Opinion => "opin",
            Schema::InstructionOpinion => "instr+opin",
        }
    }

    /// Whether the prompt opens with the task instruction
    pub fn is_instructed(self) -> bool {
        matches!(self, Schema::Instruction | Schema::InstructionOpinion)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Schema {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Schema::ALL
            .into_iter()
            .find(|schema| schema.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown schema '{}', expected one of: base, attr, instr, opin, instr+opin",
                    s
                )
            })
    }
}

/// Which demonstrations to prepend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemoMode {
    /// Zero-shot
    #[default]
    None,
    /// Demonstrations answered with the original answer
    Original,
    /// Demonstrations answered with the counterfactual answer
    Counter,
}

impl DemoMode {
    /// Identifier used on the command line and in logs
    pub fn as_str(self) -> &'static str {
        match self {
            DemoMode::None => "none",
            DemoMode::Original => "original",
            DemoMode::Counter => "counter",
        }
    }
}

impl fmt::Display for DemoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DemoMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(DemoMode::None),
            "original" => Ok(DemoMode::Original),
            "counter" => Ok(DemoMode::Counter),
            other => Err(format!(
                "unknown demo mode '{}', expected one of: none, original, counter",
                other
            )),
        }
    }
}

/// Which evaluation the prompt is for; selects the template family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Multiple-choice with an "I don't know" option, scored per choice
    Abstention,
    /// Free-form answer under counterfactual context
    Conflict,
}

impl Task {
    /// Instruction line for the instruction-framed schemas
    pub fn instruction(self) -> &'static str {
        match self {
            Task::Abstention => {
                "Instruction: answer a question based on the provided input-output pairs."
            }
            Task::Conflict => {
                "Instruction: read the given information and answer the corresponding question."
            }
        }
    }
}

/// A worked example prepended to the prompt
#[derive(Debug, Clone, PartialEq)]
pub struct Demonstration {
    /// Question text
    pub query: String,
    /// Supporting passage
    pub context: String,
    /// Choice line exactly as written in the dataset (empty for free-form)
    pub choices: String,
    /// Answer rendered into the slot
    pub answer: String,
}

/// Everything needed to render one evaluation prompt
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    /// Supporting passage
    pub context: String,
    /// Question text
    pub query: String,
    /// Choice line exactly as written in the dataset (empty for free-form)
    pub choices: String,
    /// Template variant
    pub schema: Schema,
    /// Demonstrations, oldest first
    pub demonstrations: Vec<Demonstration>,
}

/// A prompt that fits the budget
#[derive(Debug, Clone, PartialEq)]
pub struct FittedPrompt {
    /// Rendered text
    pub text: String,
    /// Demonstrations actually included
    pub demonstrations: usize,
}

/// No demonstration count in the search range fits the budget
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTooLong {
    /// Largest demonstration count tried
    pub ceiling: usize,
    /// Smallest demonstration count tried
    pub floor: usize,
    /// Context window of the model
    pub context_limit: usize,
}

impl fmt::Display for PromptTooLong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Prompt exceeds the {}-token context window with {} to {} demonstrations",
            self.context_limit, self.floor, self.ceiling
        )
    }
}

impl std::error::Error for PromptTooLong {}

/// Renders [`PromptRequest`]s for one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBuilder {
    task: Task,
}

impl PromptBuilder {
    /// Builder for `task`
    pub fn new(task: Task) -> Self {
        Self { task }
    }

    /// Render with every demonstration and an empty answer slot
    pub fn build(&self, request: &PromptRequest) -> String {
        self.render(request, request.demonstrations.len())
    }

    /// Render with the last `num_demos` demonstrations and an empty answer slot
    pub fn render(&self, request: &PromptRequest, num_demos: usize) -> String {
        let mut prompt = String::new();
        if request.schema.is_instructed() {
            prompt.push_str(self.task.instruction());
            prompt.push_str("\n\n");
        }

        let demos = &request.demonstrations;
        let skip = demos.len().saturating_sub(num_demos);
        for demo in &demos[skip..] {
            prompt.push_str(&self.render_exchange(
                request.schema,
                &demo.context,
                &demo.query,
                &demo.choices,
                &demo.answer,
            ));
            prompt.push_str("\n\n");
        }

        prompt.push_str(&self.render_exchange(
            request.schema,
            &request.context,
            &request.query,
            &request.choices,
            "",
        ));
        prompt
    }

    /// Find the largest demonstration count in `[min(2, ceiling), ceiling]` that fits
    ///
    /// Counts above the number of available demonstrations render the same
    /// prompt, so each distinct prompt is checked once. Demonstrations are
    /// dropped whole, never truncated.
    pub fn fit(
        &self,
        request: &PromptRequest,
        ceiling: usize,
        budget: &LengthBudget,
        reserved_completion_tokens: usize,
    ) -> Result<FittedPrompt, PromptTooLong> {
        let floor = ceiling.min(MIN_DEMONSTRATIONS);
        let mut last_tried = None;

        for num_demos in (floor..=ceiling).rev() {
            let effective = num_demos.min(request.demonstrations.len());
            if last_tried == Some(effective) {
                continue;
            }
            last_tried = Some(effective);

            let text = self.render(request, effective);
            if budget.fits(&text, reserved_completion_tokens) {
                return Ok(FittedPrompt {
                    text,
                    demonstrations: effective,
                });
            }
        }

        Err(PromptTooLong {
            ceiling,
            floor,
            context_limit: budget.config().context_limit(),
        })
    }

    fn render_exchange(
        &self,
        schema: Schema,
        context: &str,
        query: &str,
        choices: &str,
        answer: &str,
    ) -> String {
        match self.task {
            Task::Abstention => {
                let context = normalize_quotes(context);
                match schema {
                    Schema::Base | Schema::Instruction => format!(
                        "{}\n\nQ: {}\nChoices: {}\nA: {}",
                        context, query, choices, answer
                    ),
                    Schema::Attribution => format!(
                        "{}\n\nQ:{} based on the given text?\nChoices: {}\nA: {}",
                        context,
                        strip_question_mark(query),
                        choices,
                        answer
                    ),
                    Schema::Opinion | Schema::InstructionOpinion => format!(
                        "{} said, \"{}\"\n\nQ: {} in {}'s opinion?\nChoices: {}\nA: {}",
                        SPEAKER,
                        context.replace('"', ""),
                        strip_question_mark(query),
                        SPEAKER,
                        choices,
                        answer
                    ),
                }
            }
            Task::Conflict => match schema {
                Schema::Base | Schema::Instruction => {
                    format!("{}\nQ:{}\nA:{}", context, query, answer)
                }
                Schema::Attribution => format!(
                    "{}\nQ:{} based on the given text?\nA:{}",
                    context,
                    strip_question_mark(query),
                    answer
                ),
                Schema::Opinion | Schema::InstructionOpinion => format!(
                    "{} said \"{}\"\nQ: {} in {}'s opinion?\nA:{}",
                    SPEAKER,
                    context.replace('"', ""),
                    strip_question_mark(query),
                    SPEAKER,
                    answer
                ),
            },
        }
    }
}

/// Candidate text appended after the answer slot when scoring a choice
pub fn choice_suffix(choice: &str) -> String {
    format!("{}.", choice.trim())
}

/// Split a `;`-delimited choice list, trimming each entry
pub fn split_choices(raw: &str) -> Vec<String> {
    raw.split(';').map(|c| c.trim().to_string()).collect()
}

fn normalize_quotes(text: &str) -> String {
    text.replace(['\u{201C}', '\u{201D}'], "\"")
        .replace('\u{2019}', "'")
}

fn strip_question_mark(query: &str) -> &str {
    let trimmed = query.trim_end();
    trimmed.strip_suffix('?').unwrap_or(trimmed)
}
