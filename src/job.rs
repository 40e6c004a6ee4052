//! The sentence/job façade: the top-level API of the pipeline.
//!
//! A [`Greinir`] owns shared, read-only resources (lexicon, grammar,
//! settings, simplifier configuration) behind `Arc`s and turns token
//! streams into parsed [`Sentence`]s grouped in [`Job`]s. Paragraph marker
//! tokens partition the stream; sentence-end tokens split sentences.
//! Each sentence owns its lattice, chart, forest and tree, so jobs can
//! parse their sentences in parallel with nothing shared but the
//! immutable resources.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::grammar::Grammar;
use crate::lexicon::Lexicon;
use crate::matcher::Matcher;
use crate::parser::{ParseFailure, Parser, ParserOptions};
use crate::reducer::Reducer;
use crate::settings::Settings;
use crate::simplifier::{Simplifier, SimplifierConfig, SimpleTree};
use crate::tokens::{Tok, TokenKind};

/// Pipeline options.
#[derive(Debug, Clone)]
pub struct GreinirOptions {
    pub parser: ParserOptions,
    /// Parse sentences even when most of their words are unknown.
    pub parse_foreign_sentences: bool,
    /// Minimum ratio of lexicon-known word tokens; below it the sentence
    /// is flagged as foreign.
    pub foreign_threshold: f64,
    /// Parse the sentences of a job in parallel.
    pub parallel: bool,
}

impl Default for GreinirOptions {
    fn default() -> Self {
        GreinirOptions {
            parser: ParserOptions::default(),
            parse_foreign_sentences: false,
            foreign_threshold: 0.5,
            parallel: false,
        }
    }
}

/// The parsing engine façade. Cheap to clone; all heavy state is shared.
#[derive(Clone)]
pub struct Greinir {
    lexicon: Arc<Lexicon>,
    grammar: Arc<Grammar>,
    settings: Arc<Settings>,
    simplifier: Arc<SimplifierConfig>,
    options: GreinirOptions,
}

impl Greinir {
    pub fn new(
        lexicon: Arc<Lexicon>,
        grammar: Arc<Grammar>,
        settings: Arc<Settings>,
        simplifier: Arc<SimplifierConfig>,
    ) -> Self {
        Greinir {
            lexicon,
            grammar,
            settings,
            simplifier,
            options: GreinirOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GreinirOptions) -> Self {
        self.options = options;
        self
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Submit a token stream: split into paragraphs and sentences, parse
    /// every sentence, and collect job statistics.
    pub fn submit(&self, tokens: Vec<Tok>) -> Job {
        let paragraphs = split_paragraphs(tokens);
        let mut job = Job::default();
        for sentences in paragraphs {
            let parsed: Vec<Sentence> = if self.options.parallel {
                sentences
                    .into_par_iter()
                    .map(|s| self.parse_sentence(s))
                    .collect()
            } else {
                sentences.into_iter().map(|s| self.parse_sentence(s)).collect()
            };
            for s in &parsed {
                job.add_stats(s);
            }
            job.paragraphs.push(parsed);
        }
        tracing::info!(
            sentences = job.num_sentences(),
            parsed = job.num_parsed(),
            ambiguity = job.ambiguity(),
            "job complete"
        );
        job
    }

    /// Parse a single sentence's tokens through the whole pipeline.
    pub fn parse_sentence(&self, tokens: Vec<Tok>) -> Sentence {
        let t0 = Instant::now();
        if !self.options.parse_foreign_sentences {
            if let Some(ratio) = foreign_ratio(&tokens, &self.lexicon) {
                if ratio < self.foreign_threshold() {
                    return Sentence::failed(
                        tokens,
                        ParseFailure::Foreign { known_ratio: ratio },
                        t0.elapsed(),
                    );
                }
            }
        }
        let lattice = Matcher::new(&self.grammar, &self.settings).build_lattice(&tokens);
        let parsed = Parser::new(&self.grammar).parse(&lattice, &self.options.parser);
        let mut result = match parsed {
            Ok(r) => r,
            Err(failure) => return Sentence::failed(tokens, failure, t0.elapsed()),
        };
        let parse_time = t0.elapsed();
        let combinations = result.forest.num_combinations(result.root);
        let t1 = Instant::now();
        let score = Reducer::new(&self.grammar, &self.settings).reduce(
            &mut result.forest,
            result.root,
            &tokens,
            &lattice,
        );
        let tree = Simplifier::new(&self.grammar, &self.simplifier).simplify(
            &result.forest,
            result.root,
            &tokens,
            &lattice,
        );
        let reduce_time = t1.elapsed();
        Sentence {
            tokens,
            tree: Some(tree),
            score,
            combinations,
            failure: None,
            parse_time: parse_time + reduce_time,
            reduce_time,
        }
    }

    fn foreign_threshold(&self) -> f64 {
        self.options.foreign_threshold
    }
}

/// Ratio of word tokens known to the lexicon; `None` when the sentence
/// has no word tokens at all.
fn foreign_ratio(tokens: &[Tok], lexicon: &Lexicon) -> Option<f64> {
    let words = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Word)
        .count();
    if words == 0 {
        return None;
    }
    let known = tokens
        .iter()
        .filter(|t| {
            t.kind == TokenKind::Word
                && (!t.meanings().is_empty() || lexicon.contains(&t.text.to_lowercase()))
        })
        .count();
    Some(known as f64 / words as f64)
}

/// Split a token stream into paragraphs of sentences. `[[`/`]]` markers
/// open and close paragraphs; sentence-end tokens close sentences.
fn split_paragraphs(tokens: Vec<Tok>) -> Vec<Vec<Vec<Tok>>> {
    let mut paragraphs: Vec<Vec<Vec<Tok>>> = Vec::new();
    let mut sentences: Vec<Vec<Tok>> = Vec::new();
    let mut current: Vec<Tok> = Vec::new();
    for tok in tokens {
        match tok.kind {
            TokenKind::ParagraphBegin => {
                if !current.is_empty() {
                    sentences.push(std::mem::take(&mut current));
                }
                if !sentences.is_empty() {
                    paragraphs.push(std::mem::take(&mut sentences));
                }
            }
            TokenKind::ParagraphEnd => {
                if !current.is_empty() {
                    sentences.push(std::mem::take(&mut current));
                }
                if !sentences.is_empty() {
                    paragraphs.push(std::mem::take(&mut sentences));
                }
            }
            TokenKind::SentenceEnd => {
                if !current.is_empty() {
                    sentences.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(tok),
        }
    }
    if !current.is_empty() {
        sentences.push(current);
    }
    if !sentences.is_empty() {
        paragraphs.push(sentences);
    }
    paragraphs
}

/// One terminal of a parsed sentence, aligned with its token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TerminalInfo {
    pub text: String,
    pub lemma: String,
    pub category: String,
    pub variants: Vec<String>,
}

/// A processed sentence: either a simplified tree with its score, or a
/// failure with its cause.
#[derive(Debug)]
pub struct Sentence {
    pub tokens: Vec<Tok>,
    tree: Option<SimpleTree>,
    score: i64,
    combinations: u64,
    failure: Option<ParseFailure>,
    parse_time: Duration,
    reduce_time: Duration,
}

impl Sentence {
    fn failed(tokens: Vec<Tok>, failure: ParseFailure, elapsed: Duration) -> Self {
        Sentence {
            tokens,
            tree: None,
            score: 0,
            combinations: 0,
            failure: Some(failure),
            parse_time: elapsed,
            reduce_time: Duration::ZERO,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// True when a best derivation was found.
    pub fn parsed(&self) -> bool {
        self.tree.is_some()
    }

    pub fn tree(&self) -> Option<&SimpleTree> {
        self.tree.as_ref()
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    /// Number of derivations in the full parse forest.
    pub fn combinations(&self) -> u64 {
        self.combinations
    }

    pub fn failure(&self) -> Option<&ParseFailure> {
        self.failure.as_ref()
    }

    /// The 0-based token index where parsing stalled, for no-parse
    /// failures.
    pub fn err_index(&self) -> Option<usize> {
        self.failure.as_ref().and_then(|f| f.err_index())
    }

    pub fn parse_time(&self) -> Duration {
        self.parse_time
    }

    pub fn text(&self) -> String {
        self.tokens
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The terminal descriptors aligned with the tokens.
    pub fn terminals(&self) -> Vec<TerminalInfo> {
        let Some(tree) = &self.tree else {
            return Vec::new();
        };
        tree.terminals()
            .into_iter()
            .map(|n| {
                let node = tree.node(n);
                TerminalInfo {
                    text: node.text.clone(),
                    lemma: node.lemma.clone().unwrap_or_else(|| node.text.clone()),
                    category: node
                        .terminal
                        .as_deref()
                        .unwrap_or("")
                        .split('_')
                        .next()
                        .unwrap_or("")
                        .to_string(),
                    variants: node.all_variants.clone(),
                }
            })
            .collect()
    }

    pub fn lemmas(&self) -> Vec<String> {
        self.tree.as_ref().map(|t| t.lemmas()).unwrap_or_default()
    }

    /// The flat-tree serialization, when parsed.
    pub fn flat_tree(&self) -> Option<String> {
        self.tree.as_ref().map(|t| t.flat())
    }

    /// A serializable dump of the sentence.
    pub fn dump(&self) -> SentenceDump {
        SentenceDump {
            text: self.text(),
            terminals: self.terminals(),
            tree: self.flat_tree(),
            score: self.score,
            tokens: self.tokens.clone(),
        }
    }
}

/// The JSON round-trip form of a sentence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentenceDump {
    pub text: String,
    pub terminals: Vec<TerminalInfo>,
    pub tree: Option<String>,
    pub score: i64,
    pub tokens: Vec<Tok>,
}

impl SentenceDump {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("sentence dump serializes")
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A parsing job: the processed paragraphs plus aggregate statistics.
#[derive(Debug, Default)]
pub struct Job {
    pub paragraphs: Vec<Vec<Sentence>>,
    num_sentences: usize,
    num_parsed: usize,
    num_tokens: usize,
    num_combinations: u64,
    total_ambig: f64,
    total_tokens: usize,
    parse_time: Duration,
    reduce_time: Duration,
}

impl Job {
    fn add_stats(&mut self, s: &Sentence) {
        let slen = s.len();
        self.num_sentences += 1;
        self.num_tokens += slen;
        if s.parsed() && s.combinations() > 0 && slen > 0 {
            self.num_parsed += 1;
            self.num_combinations += s.combinations();
            // Geometric-mean-style ambiguity: the sentence's combination
            // count taken to the 1/length power, weighted by length
            let ambig_factor = (s.combinations() as f64).powf(1.0 / slen as f64);
            self.total_ambig += ambig_factor * slen as f64;
            self.total_tokens += slen;
        }
        self.parse_time += s.parse_time;
        self.reduce_time += s.reduce_time;
    }

    /// All sentences in input order.
    pub fn sentences(&self) -> impl Iterator<Item = &Sentence> {
        self.paragraphs.iter().flatten()
    }

    pub fn num_sentences(&self) -> usize {
        self.num_sentences
    }

    pub fn num_parsed(&self) -> usize {
        self.num_parsed
    }

    pub fn num_tokens(&self) -> usize {
        self.num_tokens
    }

    pub fn num_combinations(&self) -> u64 {
        self.num_combinations
    }

    /// Weighted average ambiguity per token across parsed sentences.
    pub fn ambiguity(&self) -> f64 {
        if self.total_tokens > 0 {
            self.total_ambig / self.total_tokens as f64
        } else {
            1.0
        }
    }

    /// Total wall-clock spent parsing (including reduction).
    pub fn parse_time(&self) -> Duration {
        self.parse_time
    }

    /// The part of `parse_time` spent reducing and simplifying.
    pub fn reduce_time(&self) -> Duration {
        self.reduce_time
    }
}
