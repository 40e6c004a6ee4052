//! The Earley chart parser with single-pass SPPF construction.
//!
//! An Earley item is `(production, dot, origin, node)` where `node` is the
//! forest node accumulated so far (absent for freshly predicted items).
//! Items are deduplicated per chart column by `(production, dot, origin)`;
//! the node component is functionally determined by those three plus the
//! column, so the dedup loses nothing.
//!
//! Nullable nonterminals are pre-computed by the grammar; the predictor
//! advances over them immediately using an epsilon node, which keeps
//! epsilon and unit chains from stalling the column worklist.

use std::time::{Duration, Instant};

use crate::grammar::{Grammar, Sym};
use crate::matcher::Lattice;

use super::forest::{Forest, NodeIx};
use super::ParseFailure;

/// Chart parsing controls. The token gate refuses pathological sentences
/// up front; the wall-clock cap is enforced at column boundaries.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Maximum sentence length in tokens; 0 disables the gate.
    pub max_tokens: usize,
    /// Optional per-sentence wall-clock cap.
    pub timeout: Option<Duration>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            max_tokens: 90,
            timeout: None,
        }
    }
}

/// A successful parse: the forest and its root symbol node, spanning the
/// whole input under the grammar's start nonterminal.
#[derive(Debug)]
pub struct ParseResult {
    pub forest: Forest,
    pub root: NodeIx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Item {
    prod: usize,
    dot: usize,
    origin: usize,
    node: Option<NodeIx>,
}

/// One chart column: a worklist of items with seen-set dedup.
#[derive(Debug, Default)]
struct Column {
    items: Vec<Item>,
    seen: std::collections::HashSet<(usize, usize, usize)>,
}

impl Column {
    fn add(&mut self, item: Item) {
        if self.seen.insert((item.prod, item.dot, item.origin)) {
            self.items.push(item);
        }
    }
}

/// The chart parser. Stateless apart from its grammar borrow; a fresh
/// chart and forest are built per sentence.
pub struct Parser<'g> {
    grammar: &'g Grammar,
}

impl<'g> Parser<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        Parser { grammar }
    }

    /// Parse the lattice, producing a forest or a failure value.
    pub fn parse(
        &self,
        lattice: &Lattice,
        options: &ParserOptions,
    ) -> Result<ParseResult, ParseFailure> {
        let n = lattice.len();
        if options.max_tokens != 0 && n > options.max_tokens {
            return Err(ParseFailure::TooLong { tokens: n });
        }
        let g = self.grammar;
        let start = Instant::now();
        let mut forest = Forest::new();
        let mut columns: Vec<Column> = (0..=n).map(|_| Column::default()).collect();

        for &prod in g.productions_for(g.root()) {
            columns[0].add(Item {
                prod,
                dot: 0,
                origin: 0,
                node: None,
            });
        }

        let mut last_nonempty = 0usize;
        for k in 0..=n {
            if let Some(cap) = options.timeout {
                let elapsed = start.elapsed();
                if elapsed > cap {
                    return Err(ParseFailure::Timeout { elapsed });
                }
            }
            if !columns[k].items.is_empty() {
                last_nonempty = k;
            }
            let mut ix = 0;
            while ix < columns[k].items.len() {
                let item = columns[k].items[ix];
                ix += 1;
                let p = g.production(item.prod);
                match p.rhs.get(item.dot) {
                    None => self.complete(&mut forest, &mut columns, k, item),
                    Some(&Sym::Nt(nt)) => self.predict(&mut forest, &mut columns, k, item, nt),
                    Some(&Sym::T(term)) => {
                        if k < n {
                            self.scan(&mut forest, &mut columns, k, item, term, lattice);
                        }
                    }
                }
            }
            tracing::trace!(column = k, items = columns[k].items.len(), "chart column done");
        }

        // Success iff a completed start production spans the whole input
        let root_nt = g.root();
        for item in &columns[n].items {
            let p = g.production(item.prod);
            if p.lhs == root_nt && item.origin == 0 && item.dot == p.len() {
                if let Some(root) = item.node {
                    if forest.node(root).start == 0 && forest.node(root).end == n {
                        debug_assert!(forest.check_spans());
                        return Ok(ParseResult { forest, root });
                    }
                }
                if n == 0 && p.is_empty() {
                    let root = forest.empty_production_node(g, item.prod, 0);
                    return Ok(ParseResult { forest, root });
                }
            }
        }
        Err(ParseFailure::NoParse {
            err_index: last_nonempty.min(n.saturating_sub(1)),
        })
    }

    fn predict(
        &self,
        forest: &mut Forest,
        columns: &mut [Column],
        k: usize,
        item: Item,
        nt: usize,
    ) {
        let g = self.grammar;
        for &prod in g.productions_for(nt) {
            columns[k].add(Item {
                prod,
                dot: 0,
                origin: k,
                node: None,
            });
        }
        if g.is_nullable(nt) {
            // Advance over the nullable nonterminal right away, using the
            // epsilon sentinel as the right child
            let eps = forest.epsilon_node(nt, k);
            let node = forest.make_node(g, item.prod, item.dot + 1, item.origin, k, item.node, eps);
            columns[k].add(Item {
                prod: item.prod,
                dot: item.dot + 1,
                origin: item.origin,
                node: Some(node),
            });
        }
    }

    fn scan(
        &self,
        forest: &mut Forest,
        columns: &mut [Column],
        k: usize,
        item: Item,
        term: usize,
        lattice: &Lattice,
    ) {
        if lattice.at(k).iter().any(|e| e.terminal == term) {
            let v = forest.token_node(k, term);
            let node = forest.make_node(
                self.grammar,
                item.prod,
                item.dot + 1,
                item.origin,
                k + 1,
                item.node,
                v,
            );
            columns[k + 1].add(Item {
                prod: item.prod,
                dot: item.dot + 1,
                origin: item.origin,
                node: Some(node),
            });
        }
    }

    fn complete(&self, forest: &mut Forest, columns: &mut [Column], k: usize, item: Item) {
        let g = self.grammar;
        let p = g.production(item.prod);
        let v = match item.node {
            Some(v) => v,
            // An empty production completes into the epsilon sentinel for
            // its left-hand side, shared with the predictor's shortcut
            None => forest.epsilon_node(p.lhs, k),
        };
        let lhs = p.lhs;
        let mut jx = 0;
        while jx < columns[item.origin].items.len() {
            let waiting = columns[item.origin].items[jx];
            jx += 1;
            let wp = g.production(waiting.prod);
            if wp.rhs.get(waiting.dot) == Some(&Sym::Nt(lhs)) {
                let node = forest.make_node(
                    g,
                    waiting.prod,
                    waiting.dot + 1,
                    waiting.origin,
                    k,
                    waiting.node,
                    v,
                );
                columns[k].add(Item {
                    prod: waiting.prod,
                    dot: waiting.dot + 1,
                    origin: waiting.origin,
                    node: Some(node),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;
    use crate::matcher::Matcher;
    use crate::settings::Settings;
    use crate::tokens::{Meaning, Tok};

    fn word(text: &str, rows: &[(&str, &str, &str)]) -> Tok {
        Tok::word(
            text,
            rows.iter()
                .map(|(lemma, class, features)| Meaning::new(lemma, 1, class, "alm", text, features))
                .collect(),
        )
    }

    fn lattice_for(g: &Grammar, s: &Settings, tokens: &[Tok]) -> Lattice {
        Matcher::new(g, s).build_lattice(tokens)
    }

    #[test]
    fn parses_a_simple_sentence() {
        let g = Grammar::builder()
            .production("S0", &["Frumlag", "so_0_et_p3"])
            .production("Frumlag", &["no_et_nf_kvk"])
            .build("S0")
            .unwrap();
        let s = Settings::new();
        let tokens = vec![
            word("sól", &[("sól", "kvk", "NFET")]),
            word("skín", &[("skína", "so", "GM-FH-NT-3P-ET")]),
        ];
        let lattice = lattice_for(&g, &s, &tokens);
        let result = Parser::new(&g).parse(&lattice, &ParserOptions::default()).unwrap();
        assert_eq!(result.forest.node(result.root).start, 0);
        assert_eq!(result.forest.node(result.root).end, 2);
        assert_eq!(result.forest.num_combinations(result.root), 1);
        assert!(result.forest.check_spans());
    }

    #[test]
    fn reports_the_stall_position() {
        let g = Grammar::builder()
            .production("S0", &["no_et_nf_kvk", "so_0_et_p3"])
            .build("S0")
            .unwrap();
        let s = Settings::new();
        let tokens = vec![
            word("sól", &[("sól", "kvk", "NFET")]),
            word("sól", &[("sól", "kvk", "NFET")]), // not a verb: stalls here
        ];
        let lattice = lattice_for(&g, &s, &tokens);
        let err = Parser::new(&g)
            .parse(&lattice, &ParserOptions::default())
            .unwrap_err();
        assert_eq!(err, ParseFailure::NoParse { err_index: 1 });
    }

    #[test]
    fn token_gate_refuses_long_sentences() {
        let g = Grammar::builder()
            .production("S0", &["no_et_nf_kvk"])
            .build("S0")
            .unwrap();
        let s = Settings::new();
        let tokens: Vec<Tok> = (0..5).map(|_| word("sól", &[("sól", "kvk", "NFET")])).collect();
        let lattice = lattice_for(&g, &s, &tokens);
        let err = Parser::new(&g)
            .parse(
                &lattice,
                &ParserOptions {
                    max_tokens: 3,
                    timeout: None,
                },
            )
            .unwrap_err();
        assert_eq!(err, ParseFailure::TooLong { tokens: 5 });
    }

    #[test]
    fn nullable_nonterminals_are_skipped() {
        let g = Grammar::builder()
            .production("S0", &["Atv", "so_0_et_p3"])
            .production("Atv", &["ao"])
            .production("Atv", &[])
            .build("S0")
            .unwrap();
        let s = Settings::new();
        let tokens = vec![word("skín", &[("skína", "so", "GM-FH-NT-3P-ET")])];
        let lattice = lattice_for(&g, &s, &tokens);
        let result = Parser::new(&g).parse(&lattice, &ParserOptions::default()).unwrap();
        assert_eq!(result.forest.node(result.root).end, 1);
    }

    #[test]
    fn ambiguity_shows_as_packed_families() {
        // Two derivations of the same span: Nl → no | Nl → lo-equivalent
        let g = Grammar::builder()
            .production("S0", &["Nl", "so_0_et_p3"])
            .production("Nl", &["no_et_nf_kvk"])
            .production("Nl", &["sérnafn_nf"])
            .build("S0")
            .unwrap();
        let s = Settings::new();
        let tokens = vec![
            word("Sól", &[("sól", "kvk", "NFET")]),
            word("skín", &[("skína", "so", "GM-FH-NT-3P-ET")]),
        ];
        let lattice = lattice_for(&g, &s, &tokens);
        let result = Parser::new(&g).parse(&lattice, &ParserOptions::default()).unwrap();
        assert_eq!(result.forest.num_combinations(result.root), 2);
    }
}
