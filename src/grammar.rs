//! In-memory grammar model: nonterminals, terminals, productions, priorities.
//!
//! The grammar is built once (programmatically or by an external grammar
//! compiler), validated, optionally persisted to a bincode cache sidecar,
//! and then shared read-only across all parse jobs. The parser consumes it
//! through index-based accessors; nothing here is mutated after [`Grammar`]
//! construction.
//!
//! Naming convention, inherited from the grammar file format: symbols whose
//! name starts with an uppercase letter are nonterminals, everything else
//! (including quoted literals) is a terminal.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GrammarError;
use crate::glock::GlobalLock;
use crate::terminal::TerminalSpec;

/// Index of a nonterminal within its grammar.
pub type NtIx = usize;
/// Index of a terminal within its grammar.
pub type TermIx = usize;
/// Index of a production within its grammar.
pub type ProdIx = usize;

/// A grammar symbol: either a nonterminal or a terminal, by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sym {
    Nt(NtIx),
    T(TermIx),
}

/// A nonterminal, with the tags and score adjustment that drive the
/// reducer ($tag and $score pragmas in the grammar source).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nonterminal {
    pub name: String,
    pub tags: HashSet<String>,
    pub score_adjustment: i64,
    /// Noun phrases open a fresh preposition-bonus scope in the reducer.
    pub is_noun_phrase: bool,
}

impl Nonterminal {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn has_any_tag(&self, tags: &[&str]) -> bool {
        tags.iter().any(|t| self.tags.contains(*t))
    }
}

/// A production `lhs → rhs`, with a priority for tie-breaking in the
/// reducer. Lower priority values are preferred. An empty `rhs` derives
/// the empty string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Production {
    pub lhs: NtIx,
    pub rhs: Vec<Sym>,
    pub priority: i32,
    pub index: ProdIx,
}

impl Production {
    pub fn len(&self) -> usize {
        self.rhs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rhs.is_empty()
    }
}

/// A frozen grammar.
#[derive(Debug, Serialize, Deserialize)]
pub struct Grammar {
    nonterminals: Vec<Nonterminal>,
    terminals: Vec<TerminalSpec>,
    productions: Vec<Production>,
    by_lhs: Vec<Vec<ProdIx>>,
    root: NtIx,
    nullable: Vec<bool>,
}

impl Grammar {
    /// Start building a grammar.
    pub fn builder() -> GrammarBuilder {
        GrammarBuilder::new()
    }

    /// The root (start) nonterminal.
    pub fn root(&self) -> NtIx {
        self.root
    }

    pub fn nonterminal(&self, ix: NtIx) -> &Nonterminal {
        &self.nonterminals[ix]
    }

    pub fn num_nonterminals(&self) -> usize {
        self.nonterminals.len()
    }

    pub fn terminal(&self, ix: TermIx) -> &TerminalSpec {
        &self.terminals[ix]
    }

    pub fn terminals(&self) -> &[TerminalSpec] {
        &self.terminals
    }

    pub fn production(&self, ix: ProdIx) -> &Production {
        &self.productions[ix]
    }

    pub fn num_productions(&self) -> usize {
        self.productions.len()
    }

    /// Productions whose left-hand side is the given nonterminal.
    pub fn productions_for(&self, nt: NtIx) -> &[ProdIx] {
        &self.by_lhs[nt]
    }

    /// Whether the nonterminal derives the empty string.
    pub fn is_nullable(&self, nt: NtIx) -> bool {
        self.nullable[nt]
    }

    /// Look up a nonterminal by name.
    pub fn nonterminal_by_name(&self, name: &str) -> Option<NtIx> {
        self.nonterminals.iter().position(|n| n.name == name)
    }

    // -- binary cache sidecar ---------------------------------------------

    /// Persist the compiled grammar to a bincode cache file. The write is
    /// guarded by the grammar compilation lock so that concurrent processes
    /// do not interleave partial writes.
    pub fn save_cache(&self, path: &Path) -> Result<(), GrammarError> {
        let _lock = GlobalLock::acquire("greynir-grammar").map_err(|e| GrammarError::BadCache {
            message: e.to_string(),
        })?;
        let file = File::create(path).map_err(|e| GrammarError::CacheIo { source: e })?;
        bincode::serialize_into(BufWriter::new(file), self).map_err(|e| {
            GrammarError::BadCache {
                message: e.to_string(),
            }
        })?;
        tracing::info!(path = %path.display(), "grammar cache written");
        Ok(())
    }

    /// Load a compiled grammar from a bincode cache file.
    pub fn load_cache(path: &Path) -> Result<Self, GrammarError> {
        let file = File::open(path).map_err(|e| GrammarError::CacheIo { source: e })?;
        let g: Grammar =
            bincode::deserialize_from(BufReader::new(file)).map_err(|e| GrammarError::BadCache {
                message: e.to_string(),
            })?;
        tracing::info!(
            path = %path.display(),
            nonterminals = g.nonterminals.len(),
            terminals = g.terminals.len(),
            productions = g.productions.len(),
            "grammar cache loaded"
        );
        Ok(g)
    }
}

/// Incremental grammar construction; see [`Grammar::builder`].
///
/// ```
/// use greinir::grammar::Grammar;
///
/// let g = Grammar::builder()
///     .production("S0", &["Setning", "\".\""])
///     .production("Setning", &["Frumlag", "so_0_et_p3"])
///     .production("Frumlag", &["no_et_nf"])
///     .build("S0")
///     .unwrap();
/// assert_eq!(g.num_productions(), 3);
/// ```
pub struct GrammarBuilder {
    nt_index: HashMap<String, NtIx>,
    nonterminals: Vec<Nonterminal>,
    t_index: HashMap<String, TermIx>,
    terminals: Vec<TerminalSpec>,
    productions: Vec<Production>,
    errors: Vec<GrammarError>,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        GrammarBuilder {
            nt_index: HashMap::new(),
            nonterminals: Vec::new(),
            t_index: HashMap::new(),
            terminals: Vec::new(),
            productions: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn nonterminal_ix(&mut self, name: &str) -> NtIx {
        if let Some(&ix) = self.nt_index.get(name) {
            return ix;
        }
        let ix = self.nonterminals.len();
        self.nonterminals.push(Nonterminal {
            name: name.to_string(),
            tags: HashSet::new(),
            score_adjustment: 0,
            is_noun_phrase: name.starts_with("Nl"),
        });
        self.nt_index.insert(name.to_string(), ix);
        ix
    }

    fn terminal_ix(&mut self, name: &str) -> TermIx {
        if let Some(&ix) = self.t_index.get(name) {
            return ix;
        }
        let ix = self.terminals.len();
        match TerminalSpec::parse(name) {
            Ok(spec) => self.terminals.push(spec),
            Err(e) => {
                self.errors.push(e);
                // Placeholder keeps indices stable; build() reports the error
                self.terminals.push(TerminalSpec::placeholder(name));
            }
        }
        self.t_index.insert(name.to_string(), ix);
        ix
    }

    fn classify(&mut self, name: &str) -> Sym {
        let first = name.chars().next().unwrap_or(' ');
        if first.is_uppercase() {
            Sym::Nt(self.nonterminal_ix(name))
        } else {
            Sym::T(self.terminal_ix(name))
        }
    }

    /// Add a production with priority 0.
    pub fn production(self, lhs: &str, rhs: &[&str]) -> Self {
        self.production_prio(lhs, rhs, 0)
    }

    /// Add a production with an explicit priority (lower wins).
    pub fn production_prio(mut self, lhs: &str, rhs: &[&str], priority: i32) -> Self {
        let lhs_ix = self.nonterminal_ix(lhs);
        let rhs_syms: Vec<Sym> = rhs.iter().map(|s| self.classify(s)).collect();
        let index = self.productions.len();
        self.productions.push(Production {
            lhs: lhs_ix,
            rhs: rhs_syms,
            priority,
            index,
        });
        self
    }

    /// Attach a reducer tag to a nonterminal.
    pub fn tag(mut self, nt: &str, tag: &str) -> Self {
        let ix = self.nonterminal_ix(nt);
        self.nonterminals[ix].tags.insert(tag.to_string());
        self
    }

    /// Attach a score adjustment to a nonterminal ($score pragma).
    pub fn score(mut self, nt: &str, adjustment: i64) -> Self {
        let ix = self.nonterminal_ix(nt);
        self.nonterminals[ix].score_adjustment = adjustment;
        self
    }

    /// Validate and freeze.
    pub fn build(mut self, root: &str) -> Result<Grammar, GrammarError> {
        if let Some(e) = self.errors.into_iter().next() {
            return Err(e);
        }
        if self.productions.is_empty() {
            return Err(GrammarError::Empty);
        }
        let root_ix = *self
            .nt_index
            .get(root)
            .ok_or_else(|| GrammarError::UnknownRoot {
                name: root.to_string(),
            })?;

        let mut by_lhs: Vec<Vec<ProdIx>> = vec![Vec::new(); self.nonterminals.len()];
        for p in &self.productions {
            by_lhs[p.lhs].push(p.index);
        }
        for (ix, prods) in by_lhs.iter().enumerate() {
            if prods.is_empty() {
                return Err(GrammarError::UndefinedNonterminal {
                    name: self.nonterminals[ix].name.clone(),
                });
            }
        }

        // Nullable analysis by fixpoint: a nonterminal is nullable if any
        // of its productions consists solely of nullable nonterminals.
        let mut nullable = vec![false; self.nonterminals.len()];
        let mut changed = true;
        while changed {
            changed = false;
            for p in &self.productions {
                if nullable[p.lhs] {
                    continue;
                }
                let all_nullable = p.rhs.iter().all(|s| match s {
                    Sym::Nt(nt) => nullable[*nt],
                    Sym::T(_) => false,
                });
                if all_nullable {
                    nullable[p.lhs] = true;
                    changed = true;
                }
            }
        }

        self.nonterminals.shrink_to_fit();
        self.terminals.shrink_to_fit();
        Ok(Grammar {
            nonterminals: self.nonterminals,
            terminals: self.terminals,
            productions: self.productions,
            by_lhs,
            root: root_ix,
            nullable,
        })
    }
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Grammar {
        Grammar::builder()
            .production("S0", &["Setning"])
            .production("Setning", &["Frumlag", "so_0_et_p3"])
            .production("Frumlag", &["no_et_nf"])
            .production("Frumlag", &[]) // nullable subject
            .build("S0")
            .unwrap()
    }

    #[test]
    fn indexes_and_lookup() {
        let g = tiny();
        assert_eq!(g.num_productions(), 4);
        let s0 = g.nonterminal_by_name("S0").unwrap();
        assert_eq!(g.root(), s0);
        let frumlag = g.nonterminal_by_name("Frumlag").unwrap();
        assert_eq!(g.productions_for(frumlag).len(), 2);
    }

    #[test]
    fn nullable_propagates() {
        let g = tiny();
        let frumlag = g.nonterminal_by_name("Frumlag").unwrap();
        assert!(g.is_nullable(frumlag));
        // Setning contains a terminal, hence is not nullable
        let setning = g.nonterminal_by_name("Setning").unwrap();
        assert!(!g.is_nullable(setning));
    }

    #[test]
    fn undefined_nonterminal_is_an_error() {
        let err = Grammar::builder()
            .production("S0", &["Vantar"])
            .build("S0")
            .unwrap_err();
        assert!(matches!(err, GrammarError::UndefinedNonterminal { .. }));
    }

    #[test]
    fn unknown_root_is_an_error() {
        let err = Grammar::builder()
            .production("S0", &["no_nf"])
            .build("Rót")
            .unwrap_err();
        assert!(matches!(err, GrammarError::UnknownRoot { .. }));
    }

    #[test]
    fn cache_round_trip() {
        let g = tiny();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("grammar.bin");
        g.save_cache(&path).unwrap();
        let g2 = Grammar::load_cache(&path).unwrap();
        assert_eq!(g2.num_productions(), g.num_productions());
        assert_eq!(g2.root(), g.root());
        assert_eq!(
            g2.nonterminal(g2.root()).name,
            g.nonterminal(g.root()).name
        );
    }
}
