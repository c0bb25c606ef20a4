//! Offline scoring of generated answers against the persona.

use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

const MARKERS: &[&str] = &[
    r"in my experience",
    r"what i'?ve learned",
    r"the data shows",
    r"here'?s what",
    r"one framework",
    r"let me share",
    r"this is counterintuitive",
    r"the best companies",
];

const PRACTICAL: &[&str] = &[r"\bactionable\b", r"\bpractical\b", r"\bspecific\b", r"\bconcrete\b"];
const DATA_DRIVEN: &[&str] = &[r"\bdata\b", r"\bresearch\b", r"\bstud(y|ies)\b", r"\bevidence\b"];
const HUMBLE: &[&str] = &[r"\bin my view\b", r"\bi think\b", r"\bperhaps\b", r"\bmight\b", r"\bcould\b"];

const EXAMPLE: &str = r"for example|here'?s an example|let me share";
const FRAMEWORK: &str = r"framework|approach|model|method";
const TAKEAWAY: &str = r"takeaway|key point|important|remember";

const CLAIM: &str = r"\b(research|study|studies|data|companies|found)\b";

/// Share of a claim's long words that must appear in one evidence passage.
pub const GROUNDING_OVERLAP: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConsistencyScore {
    pub markers: f32,
    pub tone_practical: f32,
    pub tone_data_driven: f32,
    pub tone_humble: f32,
    pub structure: f32,
    pub overall: f32,
}

pub struct PersonaEvaluator {
    markers: Vec<Regex>,
    practical: Vec<Regex>,
    data_driven: Vec<Regex>,
    humble: Vec<Regex>,
    structure: [Regex; 3],
    claim: Regex,
    word: Regex,
}

fn compile(patterns: &[&str]) -> Result<Vec<Regex>, regex::Error> { patterns.iter().map(|p| Regex::new(p)).collect() }

fn present(patterns: &[Regex], text: &str) -> usize { patterns.iter().filter(|p| p.is_match(text)).count() }

impl PersonaEvaluator {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            markers: compile(MARKERS)?,
            practical: compile(PRACTICAL)?,
            data_driven: compile(DATA_DRIVEN)?,
            humble: compile(HUMBLE)?,
            structure: [Regex::new(EXAMPLE)?, Regex::new(FRAMEWORK)?, Regex::new(TAKEAWAY)?],
            claim: Regex::new(CLAIM)?,
            word: Regex::new(r"[a-z]{5,}")?,
        })
    }

    /// Persona markers, tone and structure, each in `[0, 1]`.
    pub fn consistency(&self, answer: &str) -> ConsistencyScore {
        let text = answer.to_lowercase().replace('\u{2019}', "'");
        let markers = (present(&self.markers, &text) as f32 / 3.0).min(1.0);
        let tone = |patterns: &[Regex]| (present(patterns, &text) as f32 / 2.0).min(1.0);
        let (tone_practical, tone_data_driven, tone_humble) = (tone(self.practical.as_slice()), tone(self.data_driven.as_slice()), tone(self.humble.as_slice()));
        let structure = self.structure.iter().filter(|p| p.is_match(&text)).count() as f32 / 3.0;
        let tone_mean = (tone_practical + tone_data_driven + tone_humble) / 3.0;
        ConsistencyScore {
            markers,
            tone_practical,
            tone_data_driven,
            tone_humble,
            structure,
            overall: (markers + tone_mean + structure) / 3.0,
        }
    }

    /// Fraction of factual-sounding sentences backed by some evidence passage.
    /// An answer that makes no such claims scores 1.0.
    pub fn grounding<'a>(&self, answer: &str, evidence: impl IntoIterator<Item = &'a str>) -> f32 {
        let passages: Vec<HashSet<String>> = evidence.into_iter().map(|p| self.long_words(p)).collect();
        let lowered = answer.to_lowercase();
        let claims: Vec<HashSet<String>> = lowered
            .split(['.', '!', '?'])
            .filter(|s| self.claim.is_match(s))
            .map(|s| self.long_words(s))
            .filter(|w| !w.is_empty())
            .collect();
        if claims.is_empty() { return 1.0; }
        let grounded = claims
            .iter()
            .filter(|claim| passages.iter().any(|p| claim.intersection(p).count() as f32 / claim.len() as f32 >= GROUNDING_OVERLAP))
            .count();
        grounded as f32 / claims.len() as f32
    }

    fn long_words(&self, text: &str) -> HashSet<String> {
        let lowered = text.to_lowercase();
        self.word.find_iter(&lowered).map(|m| m.as_str().to_string()).collect()
    }
}
