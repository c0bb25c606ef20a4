//! Prompt assembly: style contract, hardcoded frameworks and labeled evidence.

use std::collections::HashSet;
use std::fmt::Write as _;

use lenny_core::types::{Citation, CompletionRequest, Framework, SearchHit, StratifiedResults};

/// Evidence passages kept per partition.
pub const MAX_EVIDENCE_PER_PARTITION: usize = 3;

pub const IDENTITY: &str = "You are Lenny Rachitsky, a product advisor, writer and podcaster. \
You help product managers, founders and builders make products people love, drawing on your years at Airbnb \
and on hundreds of conversations with product leaders.";

pub const STYLE_CONTRACT: &str = "How you write:
- Talk like a person, not a report. Use contractions.
- Keep paragraphs short, two or three sentences at most.
- Be opinionated, but qualify claims you can't back with data.
- Prefer concrete examples and numbers over abstractions.
- End with one practical takeaway when it fits.";

pub const SUBJECT_BLOCK_LABEL: &str = "From Lenny's own writing (these are your beliefs):";
pub const OTHER_BLOCK_LABEL: &str = "From others' examples (guests on your podcast):";

pub const DEFAULT_OTHERS_INSTRUCTION: &str = "The examples from others are data points you can cite, not your beliefs. \
Never paraphrase them as if you said them. Attribute them to the guest or company, e.g. \"one founder I talked to found...\".";

pub const NO_EVIDENCE_NOTE: &str = "No supporting passages were found for this question. \
Answer from the framework above if there is one, otherwise say plainly that you haven't written about this.";

/// Built-in framework table, most specific first.
pub fn default_frameworks() -> Vec<Framework> {
    vec![
        Framework::new(
            "retention",
            &["retention", "churn", "leaky bucket", "retain"],
            "Good retention benchmarks: SMB products around 60%, enterprise 80%+. If you're below that, fix the leaky bucket before spending on growth.",
        ),
        Framework::new(
            "hiring",
            &["hiring", "hire", "first pm", "recruit"],
            "Don't hire a PM until you have product-market fit. Before that, founders should own product themselves.",
        ),
        Framework::new(
            "pmf",
            &["product-market fit", "product market fit", "pmf"],
            "PMF is when retention curves flatten. Use the Sean Ellis test: 40%+ of users would be very disappointed without the product.",
        ),
    ]
}

/// Owns the style contract and the framework table. Pure: no I/O.
#[derive(Debug, Clone)]
pub struct PersonaPolicy {
    frameworks: Vec<Framework>,
    others_instruction: String,
}

impl Default for PersonaPolicy {
    fn default() -> Self { Self::new(default_frameworks()) }
}

impl PersonaPolicy {
    pub fn new(frameworks: Vec<Framework>) -> Self {
        Self { frameworks, others_instruction: DEFAULT_OTHERS_INSTRUCTION.to_string() }
    }

    /// Replaces the wording that tells the model others' examples are not the subject's views.
    pub fn with_others_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.others_instruction = instruction.into();
        self
    }

    pub fn frameworks(&self) -> &[Framework] { &self.frameworks }

    /// First table entry with a keyword contained in the lowercased question.
    pub fn detect_framework(&self, question: &str) -> Option<&Framework> {
        let lowered = question.to_lowercase();
        self.frameworks.iter().find(|f| f.matches(&lowered))
    }

    pub fn build_prompt(&self, question: &str, results: &StratifiedResults) -> PromptContext {
        let take = |hits: &[SearchHit]| hits.iter().take(MAX_EVIDENCE_PER_PARTITION).cloned().collect::<Vec<_>>();
        PromptContext {
            system_style: STYLE_CONTRACT.to_string(),
            injected_framework: self.detect_framework(question).cloned(),
            subject_evidence: take(results.subject.hits()),
            other_evidence: take(results.other.hits()),
            question: question.to_string(),
            others_instruction: self.others_instruction.clone(),
        }
    }
}

/// Everything one generation call needs. Built once per question.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    pub system_style: String,
    pub injected_framework: Option<Framework>,
    pub subject_evidence: Vec<SearchHit>,
    pub other_evidence: Vec<SearchHit>,
    pub question: String,
    others_instruction: String,
}

impl PromptContext {
    /// `false` is the no-evidence case: not an error, the prompt says so instead.
    pub fn has_evidence(&self) -> bool { !self.subject_evidence.is_empty() || !self.other_evidence.is_empty() }

    pub fn render_system(&self) -> String { format!("{}\n\n{}", IDENTITY, self.system_style) }

    pub fn render_prompt(&self) -> String {
        let mut out = String::new();
        if let Some(framework) = &self.injected_framework {
            let _ = writeln!(out, "A framework you hold (state it as your own view):\n{}\n", framework.content);
        }
        if !self.subject_evidence.is_empty() {
            let _ = writeln!(out, "{}", SUBJECT_BLOCK_LABEL);
            for hit in &self.subject_evidence { let _ = writeln!(out, "- {}", hit.text.trim()); }
            out.push('\n');
        }
        if !self.other_evidence.is_empty() {
            let _ = writeln!(out, "{}", OTHER_BLOCK_LABEL);
            for hit in &self.other_evidence { let _ = writeln!(out, "- {}", hit.text.trim()); }
            let _ = writeln!(out, "\n{}\n", self.others_instruction);
        }
        if !self.has_evidence() {
            let _ = writeln!(out, "{}\n", NO_EVIDENCE_NOTE);
        }
        let _ = write!(out, "Question: {}\n\nAnswer as Lenny.", self.question.trim());
        out
    }

    pub fn to_request(&self, temperature: f32, max_tokens: u32) -> CompletionRequest {
        CompletionRequest { system: self.render_system(), prompt: self.render_prompt(), temperature, max_tokens }
    }

    /// Sources of the evidence actually placed in the prompt, subject first,
    /// one entry per source document.
    pub fn citations(&self) -> Vec<Citation> {
        let mut seen = HashSet::new();
        self.subject_evidence
            .iter()
            .chain(&self.other_evidence)
            .filter(|hit| seen.insert(hit.source_id.as_str()))
            .map(Citation::from)
            .collect()
    }

    /// Every evidence passage, subject first.
    pub fn evidence_texts(&self) -> impl Iterator<Item = &str> {
        self.subject_evidence.iter().chain(&self.other_evidence).map(|h| h.text.as_str())
    }
}
