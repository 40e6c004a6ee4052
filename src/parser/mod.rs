//! The Earley/SPPF chart parser.
//!
//! [`earley::Parser`] recognizes a token lattice under a [`crate::grammar::Grammar`]
//! and builds a binarized shared packed parse forest ([`forest::Forest`]) in a
//! single pass. A failed parse is an ordinary value, [`ParseFailure`], carrying
//! the position where the chart stalled or the resource bound that was hit.

pub mod earley;
pub mod forest;

pub use earley::{ParseResult, Parser, ParserOptions};
pub use forest::{Family, Forest, Node, NodeIx, NodeLabel};

use std::time::Duration;

/// Why a sentence failed to parse. Returned in the sentence object, never
/// raised: parse failure is a first-class outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParseFailure {
    /// No derivation exists; `err_index` is the 0-based token position at
    /// which the chart first stalled.
    NoParse { err_index: usize },
    /// The sentence exceeded the configured token limit.
    TooLong { tokens: usize },
    /// The per-sentence wall-clock cap was hit.
    Timeout { elapsed: Duration },
    /// Too few word tokens were found in the lexicon (produced by the job
    /// façade before parsing; see `JobOptions::foreign_threshold`).
    Foreign { known_ratio: f64 },
}

impl ParseFailure {
    /// The error token index, for failures that have one.
    pub fn err_index(&self) -> Option<usize> {
        match self {
            ParseFailure::NoParse { err_index } => Some(*err_index),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseFailure::NoParse { err_index } => {
                write!(f, "no parse: stalled at token {err_index}")
            }
            ParseFailure::TooLong { tokens } => {
                write!(f, "sentence too long: {tokens} tokens")
            }
            ParseFailure::Timeout { elapsed } => {
                write!(f, "parse timed out after {elapsed:?}")
            }
            ParseFailure::Foreign { known_ratio } => {
                write!(f, "foreign sentence: known-word ratio {known_ratio:.2}")
            }
        }
    }
}
