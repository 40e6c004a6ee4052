//! # greinir
//!
//! A constituency parser for Icelandic. Sentences are parsed under a
//! hand-written context-free grammar against a compressed inflectional
//! lexicon, producing for each sentence either the highest-scoring parse
//! tree with full terminal annotations, or a failure with the token index
//! where parsing stalled.
//!
//! ## Architecture
//!
//! - **Lexicon** (`lexicon`): memory-mapped compressed trie of inflected
//!   word forms, mapping each form to its meaning records
//! - **Grammar** (`grammar`): frozen nonterminals, terminals, productions
//!   and priorities, with a bincode cache sidecar
//! - **Terminal matcher** (`terminal`, `matcher`): decides which terminals
//!   each token can realize, building the per-sentence lattice
//! - **Chart parser** (`parser`): Earley recognizer with single-pass
//!   shared-packed-parse-forest construction
//! - **Reducer** (`reducer`): scores packed alternatives and prunes the
//!   forest to the single best derivation
//! - **Simplifier** (`simplifier`): rewrites the derivation into the
//!   public tree with its closed tag vocabulary
//! - **Job façade** (`job`): paragraphs → sentences → trees, statistics
//!
//! ## Library usage
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use greinir::job::Greinir;
//! use greinir::grammar::Grammar;
//! use greinir::lexicon::Lexicon;
//! use greinir::settings::Settings;
//! use greinir::simplifier::SimplifierConfig;
//!
//! let lexicon = Arc::new(Lexicon::open(Path::new("ord.bin"))?);
//! let grammar = Arc::new(Grammar::load_cache(Path::new("grammar.bin"))?);
//! let greinir = Greinir::new(
//!     lexicon,
//!     grammar,
//!     Arc::new(Settings::new()),
//!     Arc::new(SimplifierConfig::default()),
//! );
//! # Ok::<(), greinir::error::GreinirError>(())
//! ```

pub mod error;
pub mod glock;
pub mod grammar;
pub mod job;
pub mod lexicon;
pub mod matcher;
pub mod parser;
pub mod reducer;
pub mod settings;
pub mod simplifier;
pub mod terminal;
pub mod tokens;

pub use error::{GreinirError, GreinirResult};
pub use grammar::Grammar;
pub use job::{Greinir, GreinirOptions, Job, Sentence};
pub use lexicon::Lexicon;
pub use parser::ParseFailure;
pub use settings::Settings;
pub use simplifier::{SimpleTree, SimplifierConfig};
pub use tokens::{Tok, TokenKind};
