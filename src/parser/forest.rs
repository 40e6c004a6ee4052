//! The shared packed parse forest (SPPF).
//!
//! Nodes live in an arena and refer to each other by index; the forest is a
//! DAG. Symbol nodes are identified by `(nonterminal, start, end)`,
//! intermediate nodes by `(production, dot, start, end)`, token nodes by
//! `(terminal, position)`. Interning happens in a hash map so that each
//! identity exists exactly once; ambiguity shows up as multiple packed
//! families of children on one node.
//!
//! Families on completed nonterminal nodes are priority-pruned at insertion:
//! a family whose production priority is worse (numerically higher) than the
//! best one already attached is not added, and a better one evicts the rest.

use std::collections::HashMap;

use crate::grammar::{Grammar, NtIx, ProdIx, TermIx};

/// Index of a node within its forest.
pub type NodeIx = usize;

/// Identity of a forest node, excluding its span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeLabel {
    /// A completed nonterminal.
    Nonterminal(NtIx),
    /// A position within a production: `dot` symbols of it have been seen.
    Intermediate { prod: ProdIx, dot: usize },
    /// A token matched to a terminal; spans exactly one position.
    Token { token: usize, terminal: TermIx },
}

/// One packed family of children: an alternative way to derive the node.
/// `left` is absent for unit steps; both child slots absent marks an
/// epsilon derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Family {
    /// The production behind this family, for completed nonterminal nodes.
    pub prod: Option<ProdIx>,
    pub left: Option<NodeIx>,
    pub right: Option<NodeIx>,
}

/// A forest node: label, span, and its packed families.
#[derive(Debug)]
pub struct Node {
    pub label: NodeLabel,
    pub start: usize,
    pub end: usize,
    pub families: Vec<Family>,
    /// Priority of the best family attached so far (lower wins).
    best_prio: i32,
}

impl Node {
    /// True for a nonterminal node spanning no tokens.
    pub fn is_empty_span(&self) -> bool {
        self.start == self.end
    }

    /// True when more than one packed family is attached.
    pub fn is_ambiguous(&self) -> bool {
        self.families.len() > 1
    }

    pub fn nonterminal(&self) -> Option<NtIx> {
        match self.label {
            NodeLabel::Nonterminal(nt) => Some(nt),
            _ => None,
        }
    }

    pub fn token_terminal(&self) -> Option<(usize, TermIx)> {
        match self.label {
            NodeLabel::Token { token, terminal } => Some((token, terminal)),
            _ => None,
        }
    }
}

/// The arena of interned forest nodes for one sentence.
#[derive(Debug, Default)]
pub struct Forest {
    nodes: Vec<Node>,
    index: HashMap<(NodeLabel, usize, usize), NodeIx>,
}

impl Forest {
    pub fn new() -> Self {
        Forest::default()
    }

    pub fn node(&self, ix: NodeIx) -> &Node {
        &self.nodes[ix]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Intern a node by identity, creating it on first sight.
    fn intern(&mut self, label: NodeLabel, start: usize, end: usize) -> NodeIx {
        *self.index.entry((label, start, end)).or_insert_with(|| {
            self.nodes.push(Node {
                label,
                start,
                end,
                families: Vec::new(),
                best_prio: i32::MAX,
            });
            self.nodes.len() - 1
        })
    }

    /// The token node for a scanned (position, terminal) pair.
    pub fn token_node(&mut self, token: usize, terminal: TermIx) -> NodeIx {
        self.intern(NodeLabel::Token { token, terminal }, token, token + 1)
    }

    /// The epsilon node for a nullable nonterminal at a position: a
    /// nonterminal node over the empty span with a single childless family.
    pub fn epsilon_node(&mut self, nt: NtIx, at: usize) -> NodeIx {
        let ix = self.intern(NodeLabel::Nonterminal(nt), at, at);
        if self.nodes[ix].families.is_empty() {
            self.nodes[ix].families.push(Family {
                prod: None,
                left: None,
                right: None,
            });
        }
        ix
    }

    /// The MakeNode operator of the Earley-Scott construction: combine the
    /// item's current node `w` with a freshly derived child `v` after the
    /// dot has advanced to `dot` within `prod`, spanning `[i, k)`.
    ///
    /// A dot position of 1 with more of the production remaining needs no
    /// node at all (`v` itself suffices); a completed production yields the
    /// symbol node of its left-hand side; anything else yields an
    /// intermediate node.
    pub fn make_node(
        &mut self,
        grammar: &Grammar,
        prod: ProdIx,
        dot: usize,
        i: usize,
        k: usize,
        w: Option<NodeIx>,
        v: NodeIx,
    ) -> NodeIx {
        let p = grammar.production(prod);
        if dot == 1 && dot < p.len() {
            return v;
        }
        let (label, fam_prod) = if dot >= p.len() {
            (NodeLabel::Nonterminal(p.lhs), Some(prod))
        } else {
            (NodeLabel::Intermediate { prod, dot }, None)
        };
        let ix = self.intern(label, i, k);
        self.add_family(
            ix,
            Family {
                prod: fam_prod,
                left: w,
                right: Some(v),
            },
            fam_prod.map(|pr| grammar.production(pr).priority),
        );
        ix
    }

    /// The symbol node for a production completed without advancing over
    /// anything (an empty production).
    pub fn empty_production_node(
        &mut self,
        grammar: &Grammar,
        prod: ProdIx,
        at: usize,
    ) -> NodeIx {
        let p = grammar.production(prod);
        let ix = self.intern(NodeLabel::Nonterminal(p.lhs), at, at);
        self.add_family(
            ix,
            Family {
                prod: Some(prod),
                left: None,
                right: None,
            },
            Some(p.priority),
        );
        ix
    }

    /// Attach a packed family, deduplicating and priority-pruning.
    fn add_family(&mut self, ix: NodeIx, family: Family, prio: Option<i32>) {
        let node = &mut self.nodes[ix];
        if let Some(prio) = prio {
            if !node.families.is_empty() && prio > node.best_prio {
                // Worse priority than an existing family: drop it
                return;
            }
            if prio < node.best_prio {
                if !node.families.is_empty() {
                    node.families.clear();
                }
                node.best_prio = prio;
            }
        }
        if !node.families.contains(&family) {
            node.families.push(family);
        }
    }

    /// Keep only the chosen family on a node, dropping the alternatives.
    /// The key step of forest reduction.
    pub fn reduce_to(&mut self, ix: NodeIx, family: usize) {
        let node = &mut self.nodes[ix];
        if family < node.families.len() {
            node.families.swap(0, family);
            node.families.truncate(1);
        }
    }

    /// Count the parse-tree combinations below a node: the sum over packed
    /// families of the product of their children's counts. Memoized, since
    /// highly ambiguous forests share subtrees with counts in the millions.
    pub fn num_combinations(&self, root: NodeIx) -> u64 {
        let mut memo: HashMap<NodeIx, u64> = HashMap::new();
        self.combinations(root, &mut memo)
    }

    fn combinations(&self, ix: NodeIx, memo: &mut HashMap<NodeIx, u64>) -> u64 {
        if let Some(&c) = memo.get(&ix) {
            return c;
        }
        // Provisional entry: a unit-production cycle resolves to 1 rather
        // than recursing forever
        memo.insert(ix, 1);
        let node = &self.nodes[ix];
        let count = match node.label {
            NodeLabel::Token { .. } => 1,
            _ => {
                let mut total: u64 = 0;
                for f in &node.families {
                    let mut prod: u64 = 1;
                    if let Some(l) = f.left {
                        prod = prod.saturating_mul(self.combinations(l, memo));
                    }
                    if let Some(r) = f.right {
                        prod = prod.saturating_mul(self.combinations(r, memo));
                    }
                    total = total.saturating_add(prod);
                }
                total.max(1)
            }
        };
        memo.insert(ix, count);
        count
    }

    /// The ordered child list of the single remaining family of a reduced
    /// nonterminal node: intermediate nodes on the left spine are flattened
    /// away so the children correspond to the production symbols.
    pub fn reduced_children(&self, ix: NodeIx) -> Vec<NodeIx> {
        let mut out = Vec::new();
        if let Some(family) = self.nodes[ix].families.first().copied() {
            self.push_children(&family, &mut out);
        }
        out
    }

    fn push_children(&self, family: &Family, out: &mut Vec<NodeIx>) {
        for child in [family.left, family.right].into_iter().flatten() {
            if let NodeLabel::Intermediate { .. } = self.nodes[child].label {
                let f = self.nodes[child].families.first().copied();
                if let Some(f) = f {
                    self.push_children(&f, out);
                }
            } else {
                out.push(child);
            }
        }
    }

    /// Verify the span consistency of every packed family: the children of
    /// a family partition the node's span exactly. Used by tests and debug
    /// assertions.
    pub fn check_spans(&self) -> bool {
        self.nodes.iter().all(|node| {
            node.families.iter().all(|f| match (f.left, f.right) {
                (Some(l), Some(r)) => {
                    self.nodes[l].start == node.start
                        && self.nodes[l].end == self.nodes[r].start
                        && self.nodes[r].end == node.end
                }
                (None, Some(r)) => {
                    self.nodes[r].start == node.start && self.nodes[r].end == node.end
                }
                (Some(l), None) => {
                    self.nodes[l].start == node.start && self.nodes[l].end == node.end
                }
                (None, None) => node.start == node.end,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;

    fn grammar() -> Grammar {
        Grammar::builder()
            .production("S0", &["Nl", "so_0"])
            .production_prio("Nl", &["no_nf"], 0)
            .production_prio("Nl", &["fn_nf"], 1)
            .build("S0")
            .unwrap()
    }

    #[test]
    fn interning_is_by_identity() {
        let mut f = Forest::new();
        let a = f.token_node(0, 0);
        let b = f.token_node(0, 0);
        assert_eq!(a, b);
        let c = f.token_node(1, 0);
        assert_ne!(a, c);
    }

    #[test]
    fn priority_pruning_on_families() {
        let g = grammar();
        let mut f = Forest::new();
        let tok = f.token_node(0, 0);
        // Worse-priority family (prod 2, prio 1) first, then better (prod 1)
        let n1 = f.make_node(&g, 2, 1, 0, 1, None, tok);
        let n2 = f.make_node(&g, 1, 1, 0, 1, None, tok);
        assert_eq!(n1, n2);
        assert_eq!(f.node(n1).families.len(), 1);
        assert_eq!(f.node(n1).families[0].prod, Some(1));
    }

    #[test]
    fn combinations_count_packed_alternatives() {
        let g = grammar();
        let mut f = Forest::new();
        let t0 = f.token_node(0, 0);
        let t0b = f.token_node(0, 1);
        // Two same-priority families on one symbol node
        let n = f.make_node(&g, 1, 1, 0, 1, None, t0);
        let n2 = f.make_node(&g, 1, 1, 0, 1, None, t0b);
        assert_eq!(n, n2);
        assert_eq!(f.node(n).families.len(), 2);
        assert_eq!(f.num_combinations(n), 2);
        f.reduce_to(n, 1);
        assert_eq!(f.num_combinations(n), 1);
        assert!(f.check_spans());
    }
}
