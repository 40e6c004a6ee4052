//! Rewriting reduced derivations into the public simplified tree.
//!
//! The grammar's internal nonterminals (naming wrappers, agreement variants,
//! list plumbing) are not part of the public contract. A [`SimplifierConfig`]
//! maps the surviving nonterminal names to a closed vocabulary of tags
//! (`S0`, `S-MAIN`, `IP`, `NP-SUBJ`, `VP`, `PP`, …); everything unmapped is
//! collapsed into its parent. Terminal leaves carry the token, a descriptor
//! naming the category and its significant variants, and the full variant
//! set derivable from the winning meaning.
//!
//! Tree nodes live in an arena and refer to parents and children by index,
//! so upward navigation needs no reference cycles.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::grammar::Grammar;
use crate::lexicon::Lexicon;
use crate::matcher::Lattice;
use crate::parser::{Forest, NodeIx, NodeLabel};
use crate::terminal::feature_variants;
use crate::tokens::{Case, Tok, TokenKind};

/// Per-tag adjustment rules.
#[derive(Debug, Clone, Default)]
pub struct IdEntry {
    /// Don't push this tag if the immediate parent already carries one of
    /// these tags.
    pub subject_to: HashSet<String>,
    /// This tag devours a single-child parent carrying one of these tags.
    pub overrides: HashSet<String>,
}

/// The simplification configuration: nonterminal map and tag adjustments.
#[derive(Debug, Clone, Default)]
pub struct SimplifierConfig {
    /// Grammar nonterminal name → public tag(s). Two tags push two nested
    /// nodes, the first outermost.
    pub nt_map: HashMap<String, Vec<String>>,
    pub id_map: HashMap<String, IdEntry>,
    /// Descriptor overrides for literal terminals without a usable
    /// category (`"hans"` → `pfn_kk_et_ef`).
    pub terminal_overrides: HashMap<String, String>,
}

impl SimplifierConfig {
    pub fn map_nt(&mut self, name: &str, tags: &[&str]) {
        self.nt_map
            .insert(name.to_string(), tags.iter().map(|t| t.to_string()).collect());
    }

    pub fn subject_to(&mut self, tag: &str, parents: &[&str]) {
        self.id_map
            .entry(tag.to_string())
            .or_default()
            .subject_to
            .extend(parents.iter().map(|p| p.to_string()));
    }

    pub fn overrides(&mut self, tag: &str, parents: &[&str]) {
        self.id_map
            .entry(tag.to_string())
            .or_default()
            .overrides
            .extend(parents.iter().map(|p| p.to_string()));
    }
}

/// One node of the simplified tree: an inner node with a tag, or a
/// terminal leaf with its token and descriptors.
#[derive(Debug, Clone, Serialize)]
pub struct SimpleNode {
    /// Public tag; `None` on terminal leaves.
    pub tag: Option<String>,
    #[serde(skip)]
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Index of the token within the sentence, for leaves.
    pub token_index: Option<usize>,
    /// Token kind descriptor (`WORD`, `PUNCTUATION`, …) for leaves.
    pub kind: Option<&'static str>,
    /// Terminal descriptor: category plus significant variants.
    pub terminal: Option<String>,
    /// All variants, including those derived from the winning meaning.
    pub all_variants: Vec<String>,
    /// Surface text of the leaf.
    pub text: String,
    pub lemma: Option<String>,
    /// Word class of the winning meaning (`kvk`, `so`, …).
    pub cat: Option<String>,
}

impl SimpleNode {
    fn nonterminal(tag: &str, parent: Option<usize>) -> Self {
        SimpleNode {
            tag: Some(tag.to_string()),
            parent,
            children: Vec::new(),
            token_index: None,
            kind: None,
            terminal: None,
            all_variants: Vec::new(),
            text: String::new(),
            lemma: None,
            cat: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.tag.is_none()
    }
}

/// The simplified constituency tree. Sibling order is token order; the
/// yield of the tree is exactly the input token sequence.
#[derive(Debug, Clone, Serialize)]
pub struct SimpleTree {
    nodes: Vec<SimpleNode>,
    root: usize,
}

/// Builds simplified trees from reduced forests.
pub struct Simplifier<'a> {
    grammar: &'a Grammar,
    config: &'a SimplifierConfig,
}

impl<'a> Simplifier<'a> {
    pub fn new(grammar: &'a Grammar, config: &'a SimplifierConfig) -> Self {
        Simplifier { grammar, config }
    }

    /// Transform a reduced derivation into the public tree.
    pub fn simplify(
        &self,
        forest: &Forest,
        root: NodeIx,
        tokens: &[Tok],
        lattice: &Lattice,
    ) -> SimpleTree {
        let mut tree = SimpleTree {
            nodes: Vec::new(),
            root: 0,
        };
        // The grammar root always maps to a tree root node, even when the
        // configuration omits it
        let root_nt = forest
            .node(root)
            .nonterminal()
            .map(|nt| self.grammar.nonterminal(nt).name.clone())
            .unwrap_or_default();
        let root_tags = self
            .config
            .nt_map
            .get(&root_nt)
            .cloned()
            .unwrap_or_else(|| vec![root_nt.clone()]);
        let root_ix = tree.push(SimpleNode::nonterminal(&root_tags[0], None));
        tree.root = root_ix;
        let mut attach = root_ix;
        for tag in &root_tags[1..] {
            let inner = tree.push(SimpleNode::nonterminal(tag, Some(attach)));
            tree.nodes[attach].children.push(inner);
            attach = inner;
        }
        for child in forest.reduced_children(root) {
            self.walk(forest, child, tokens, lattice, &mut tree, attach);
        }
        self.apply_overrides(&mut tree);
        tree
    }

    fn walk(
        &self,
        forest: &Forest,
        ix: NodeIx,
        tokens: &[Tok],
        lattice: &Lattice,
        tree: &mut SimpleTree,
        parent: usize,
    ) {
        let node = forest.node(ix);
        match node.label {
            NodeLabel::Token { token, terminal } => {
                let leaf = self.make_leaf(token, terminal, tokens, lattice, parent);
                let leaf_ix = tree.push(leaf);
                tree.nodes[parent].children.push(leaf_ix);
            }
            NodeLabel::Nonterminal(nt) => {
                if node.is_empty_span() {
                    // Nullable nonterminal with no yield: nothing to show
                    return;
                }
                let name = &self.grammar.nonterminal(nt).name;
                match self.config.nt_map.get(name) {
                    None => {
                        // Internal nonterminal: splice children into parent
                        for child in forest.reduced_children(ix) {
                            self.walk(forest, child, tokens, lattice, tree, parent);
                        }
                    }
                    Some(tags) => {
                        let mut attach = parent;
                        for tag in tags {
                            if self.subject_to_parent(tree, attach, tag) {
                                continue;
                            }
                            let n = tree.push(SimpleNode::nonterminal(tag, Some(attach)));
                            tree.nodes[attach].children.push(n);
                            attach = n;
                        }
                        for child in forest.reduced_children(ix) {
                            self.walk(forest, child, tokens, lattice, tree, attach);
                        }
                        // A mapped node that ended up with no leaves is noise
                        self.prune_empty(tree, attach, parent);
                    }
                }
            }
            NodeLabel::Intermediate { .. } => {
                // reduced_children flattens these away; nothing to do here
                for child in forest.reduced_children(ix) {
                    self.walk(forest, child, tokens, lattice, tree, parent);
                }
            }
        }
    }

    fn subject_to_parent(&self, tree: &SimpleTree, parent: usize, tag: &str) -> bool {
        let Some(entry) = self.config.id_map.get(tag) else {
            return false;
        };
        tree.nodes[parent]
            .tag
            .as_deref()
            .map(|pt| entry.subject_to.contains(pt))
            .unwrap_or(false)
    }

    fn prune_empty(&self, tree: &mut SimpleTree, node: usize, parent: usize) {
        if node != parent && tree.nodes[node].children.is_empty() {
            // Remove the chain of empty nodes just created
            let mut cur = node;
            while cur != parent && tree.nodes[cur].children.is_empty() {
                let p = tree.nodes[cur].parent.unwrap();
                tree.nodes[p].children.retain(|&c| c != cur);
                cur = p;
            }
        }
    }

    /// Collapse redundant single-child nestings. Three triggers, checked
    /// on every node with exactly one tagged child:
    ///
    /// - the child carries the *same* tag as the node (two grammar
    ///   nonterminals sharing one public tag): the child is spliced away
    ///   and the node keeps its identity — no configuration needed;
    /// - the node's own `overrides` set names the child's tag: same
    ///   splice, the node wins;
    /// - the child's `overrides` set names the node's tag: the child
    ///   devours its parent, taking the node's place.
    fn apply_overrides(&self, tree: &mut SimpleTree) {
        let mut ix = 0;
        while ix < tree.nodes.len() {
            let promote = (|| {
                let node = &tree.nodes[ix];
                if node.children.len() != 1 {
                    return None;
                }
                let child = node.children[0];
                let child_tag = tree.nodes[child].tag.as_deref()?;
                let parent_tag = node.tag.as_deref()?;
                if child_tag == parent_tag {
                    // A tag wrapped in itself is always redundant
                    return Some((child, true));
                }
                if let Some(entry) = self.config.id_map.get(parent_tag) {
                    if entry.overrides.contains(child_tag) {
                        return Some((child, true));
                    }
                }
                let entry = self.config.id_map.get(child_tag)?;
                entry
                    .overrides
                    .contains(parent_tag)
                    .then_some((child, false))
            })();
            if let Some((child, keep_parent_tag)) = promote {
                let grandchildren = std::mem::take(&mut tree.nodes[child].children);
                let tag = tree.nodes[child].tag.take();
                if !keep_parent_tag {
                    // The child replaces its parent in place
                    tree.nodes[ix].tag = tag;
                }
                tree.nodes[ix].children = grandchildren.clone();
                for g in grandchildren {
                    tree.nodes[g].parent = Some(ix);
                }
                // Leave the devoured child empty and orphaned; it is no
                // longer reachable from the root
                continue;
            }
            ix += 1;
        }
    }

    fn make_leaf(
        &self,
        token_ix: usize,
        terminal: usize,
        tokens: &[Tok],
        lattice: &Lattice,
        parent: usize,
    ) -> SimpleNode {
        let tok = &tokens[token_ix];
        let spec = self.grammar.terminal(terminal);
        let meaning_ix = lattice.meaning_for(token_ix, terminal);
        let meaning = meaning_ix.and_then(|m| tok.meanings().get(m));

        // Descriptor: category plus significant variants. Literal
        // terminals translate through their category or an override.
        let descriptor = if let Some(over) = self.config.terminal_overrides.get(&spec.name) {
            over.clone()
        } else if spec.is_literal() {
            match spec.colon_cat.as_deref() {
                Some(cat) => {
                    let mut d = cat.to_string();
                    for v in &spec.variants {
                        d.push('_');
                        d.push_str(v);
                    }
                    d
                }
                None => spec.name.clone(),
            }
        } else {
            spec.name.clone()
        };

        let mut all_variants: Vec<String> = spec.variants.clone();
        if let Some(m) = meaning {
            for v in feature_variants(&m.features) {
                if !all_variants.contains(&v) {
                    all_variants.push(v);
                }
            }
        }

        let lemma = match tok.kind {
            TokenKind::Word => meaning.map(|m| m.lemma.clone()),
            TokenKind::Person => meaning_ix
                .and_then(|ix| tok.person_names().get(ix))
                .map(|pn| pn.name.clone()),
            _ => None,
        }
        .or_else(|| Some(tok.text.clone()));

        SimpleNode {
            tag: None,
            parent: Some(parent),
            children: Vec::new(),
            token_index: Some(token_ix),
            kind: Some(tok.kind.descr()),
            terminal: Some(descriptor),
            all_variants,
            text: tok.text.clone(),
            lemma,
            cat: meaning.map(|m| m.class.clone()),
        }
    }
}

impl SimpleTree {
    fn push(&mut self, node: SimpleNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn node(&self, ix: usize) -> &SimpleNode {
        &self.nodes[ix]
    }

    pub fn children(&self, ix: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes[ix].children.iter().copied()
    }

    /// Depth-first, left-to-right traversal from a node.
    pub fn descendants(&self, ix: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.nodes[ix].children.iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.nodes[n].children.iter().rev());
        }
        out
    }

    /// The terminal leaves in token order.
    pub fn terminals(&self) -> Vec<usize> {
        let mut leaves: Vec<usize> = std::iter::once(self.root)
            .chain(self.descendants(self.root))
            .filter(|&n| self.nodes[n].is_terminal())
            .collect();
        leaves.sort_by_key(|&n| self.nodes[n].token_index);
        leaves
    }

    /// Partial-tag matching: `NP` matches `NP-SUBJ`, `CP-ADV` matches
    /// `CP-ADV-TEMP`, but `NP-S` does not match `NP-SUBJ`.
    pub fn tag_matches(node_tag: &str, query: &str) -> bool {
        let nt: Vec<&str> = node_tag.split('-').collect();
        let q: Vec<&str> = query.split('-').collect();
        q.len() <= nt.len() && q.iter().zip(&nt).all(|(a, b)| a == b)
    }

    /// First child (by token order) whose tag matches the query.
    pub fn child_by_tag(&self, ix: usize, query: &str) -> Option<usize> {
        self.children(ix).find(|&c| {
            self.nodes[c]
                .tag
                .as_deref()
                .map(|t| Self::tag_matches(t, query))
                .unwrap_or(false)
        })
    }

    /// First descendant (depth-first) whose tag matches the query.
    pub fn find_tag(&self, query: &str) -> Option<usize> {
        std::iter::once(self.root)
            .chain(self.descendants(self.root))
            .find(|&n| {
                self.nodes[n]
                    .tag
                    .as_deref()
                    .map(|t| Self::tag_matches(t, query))
                    .unwrap_or(false)
            })
    }

    /// The surface text below a node, space-joined.
    pub fn text_of(&self, ix: usize) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if self.nodes[ix].is_terminal() {
            parts.push(&self.nodes[ix].text);
        }
        for d in self.descendants(ix) {
            if self.nodes[d].is_terminal() {
                parts.push(&self.nodes[d].text);
            }
        }
        parts.join(" ")
    }

    pub fn text(&self) -> String {
        self.text_of(self.root)
    }

    /// Lemmas of all leaves in token order.
    pub fn lemmas(&self) -> Vec<String> {
        self.terminals()
            .into_iter()
            .filter_map(|n| self.nodes[n].lemma.clone())
            .collect()
    }

    /// Noun lemmas (word class kk/kvk/hk).
    pub fn nouns(&self) -> Vec<String> {
        self.lemmas_of(|n| {
            matches!(n.cat.as_deref(), Some("kk") | Some("kvk") | Some("hk"))
        })
    }

    /// Verb lemmas.
    pub fn verbs(&self) -> Vec<String> {
        self.lemmas_of(|n| n.cat.as_deref() == Some("so"))
    }

    /// Person names appearing in the sentence.
    pub fn persons(&self) -> Vec<String> {
        self.lemmas_of(|n| n.kind == Some("PERSON"))
    }

    /// Entity names appearing in the sentence.
    pub fn entities(&self) -> Vec<String> {
        self.lemmas_of(|n| n.kind == Some("ENTITY"))
    }

    fn lemmas_of(&self, pred: impl Fn(&SimpleNode) -> bool) -> Vec<String> {
        self.terminals()
            .into_iter()
            .filter(|&n| pred(&self.nodes[n]))
            .filter_map(|n| self.nodes[n].lemma.clone())
            .collect()
    }

    // -- inflection queries -------------------------------------------------

    /// The subtree text with declinable leaves put in the given case via
    /// the lexicon. `singular` and `indefinite` as in
    /// [`Lexicon::case_forms`].
    pub fn inflected_text(
        &self,
        ix: usize,
        lexicon: &Lexicon,
        case: Case,
        singular: bool,
        indefinite: bool,
    ) -> String {
        let mut leaves: Vec<usize> = if self.nodes[ix].is_terminal() {
            vec![ix]
        } else {
            self.descendants(ix)
                .into_iter()
                .filter(|&n| self.nodes[n].is_terminal())
                .collect()
        };
        leaves.sort_by_key(|&n| self.nodes[n].token_index);
        let parts: Vec<String> = leaves
            .iter()
            .map(|&n| {
                if self.inside_pp(n, ix) {
                    // A preposition governs the case within its phrase
                    self.nodes[n].text.clone()
                } else {
                    self.inflect_leaf(n, lexicon, case, singular, indefinite)
                }
            })
            .collect();
        parts.join(" ")
    }

    /// Whether a leaf sits under a prepositional phrase strictly below
    /// `top`.
    fn inside_pp(&self, leaf: usize, top: usize) -> bool {
        let mut cur = self.nodes[leaf].parent;
        while let Some(p) = cur {
            if p == top {
                return false;
            }
            if let Some(tag) = &self.nodes[p].tag {
                if Self::tag_matches(tag, "PP") {
                    return true;
                }
            }
            cur = self.nodes[p].parent;
        }
        false
    }

    fn inflect_leaf(
        &self,
        n: usize,
        lexicon: &Lexicon,
        case: Case,
        singular: bool,
        indefinite: bool,
    ) -> String {
        let node = &self.nodes[n];
        let declinable = matches!(
            node.cat.as_deref(),
            Some("kk") | Some("kvk") | Some("hk") | Some("lo") | Some("to") | Some("fn")
                | Some("pfn") | Some("gr")
        );
        if !declinable {
            return node.text.clone();
        }
        let forms = lexicon.case_forms(&node.text, case, singular, indefinite, node.cat.as_deref());
        match forms.first() {
            Some(m) => copy_capitalization(&node.text, &m.form),
            None => node.text.clone(),
        }
    }

    /// Nominative rendering of the subtree.
    pub fn nominative_text(&self, ix: usize, lexicon: &Lexicon) -> String {
        self.inflected_text(ix, lexicon, Case::Nom, false, false)
    }

    /// Indefinite nominative rendering.
    pub fn indefinite_text(&self, ix: usize, lexicon: &Lexicon) -> String {
        self.inflected_text(ix, lexicon, Case::Nom, false, true)
    }

    /// Singular indefinite nominative rendering.
    pub fn canonical_text(&self, ix: usize, lexicon: &Lexicon) -> String {
        self.inflected_text(ix, lexicon, Case::Nom, true, true)
    }

    // -- serializations -----------------------------------------------------

    /// The indented one-node-per-line view.
    pub fn view(&self) -> String {
        let mut out = String::new();
        self.view_node(self.root, 0, &mut out);
        out
    }

    fn view_node(&self, ix: usize, level: usize, out: &mut String) {
        if level > 0 {
            out.push('\n');
            out.push_str(&"  ".repeat(level - 1));
            out.push_str("+-");
        }
        let node = &self.nodes[ix];
        if let Some(tag) = &node.tag {
            out.push_str(tag);
            for c in &node.children {
                self.view_node(*c, level + 1, out);
            }
        } else if node.kind == Some("PUNCTUATION") {
            out.push('\'');
            out.push_str(&node.text);
            out.push('\'');
        } else {
            out.push_str(node.terminal.as_deref().unwrap_or("?"));
            out.push_str(": '");
            out.push_str(&node.text);
            out.push('\'');
        }
    }

    /// The flat bracketed form: `TAG … /TAG` with terminal descriptors as
    /// leaves, `p` for punctuation.
    pub fn flat(&self) -> String {
        self.flat_with(&|node| node.terminal.clone().unwrap_or_default())
    }

    /// Flat form with the full variant sets on the terminals.
    pub fn flat_with_all_variants(&self) -> String {
        self.flat_with(&|node| {
            let cat = node
                .terminal
                .as_deref()
                .unwrap_or("")
                .split('_')
                .next()
                .unwrap_or("")
                .to_string();
            let mut d = cat;
            for v in &node.all_variants {
                d.push('_');
                d.push_str(v);
            }
            d
        })
    }

    fn flat_with(&self, describe: &dyn Fn(&SimpleNode) -> String) -> String {
        let mut out = String::new();
        self.flat_node(self.root, describe, &mut out);
        out
    }

    fn flat_node(&self, ix: usize, describe: &dyn Fn(&SimpleNode) -> String, out: &mut String) {
        let node = &self.nodes[ix];
        if let Some(tag) = &node.tag {
            out.push_str(tag);
            for c in &node.children {
                out.push(' ');
                self.flat_node(*c, describe, out);
            }
            out.push_str(" /");
            out.push_str(tag);
            return;
        }
        if node.kind == Some("PUNCTUATION") {
            out.push('p');
            return;
        }
        let descriptor = describe(node);
        let words = node.text.split_whitespace().count();
        if words <= 1 {
            out.push_str(&descriptor);
            return;
        }
        // Multi-word tokens repeat the descriptor per component word,
        // conjunctions rendered as 'st'
        let parts: Vec<&str> = node
            .text
            .split_whitespace()
            .map(|w| {
                if matches!(w, "og" | "eða") {
                    "st"
                } else {
                    descriptor.as_str()
                }
            })
            .collect();
        out.push_str(&parts.join(" "));
    }

    /// A labelled-bracketing form, mostly for corpus comparison.
    pub fn bracket_form(&self) -> String {
        let mut out = String::new();
        self.bracket_node(self.root, &mut out);
        out
    }

    fn bracket_node(&self, ix: usize, out: &mut String) {
        let node = &self.nodes[ix];
        if let Some(tag) = &node.tag {
            out.push('(');
            out.push_str(tag);
            for c in &node.children {
                out.push(' ');
                self.bracket_node(*c, out);
            }
            out.push(')');
        } else if node.kind == Some("PUNCTUATION") {
            if matches!(node.text.as_str(), "." | "," | ";" | ":" | "-" | "—" | "–") {
                out.push_str("(PUNCT ");
                out.push_str(&node.text);
                out.push(')');
            }
        } else {
            out.push_str(&node.text.replace(' ', "_"));
        }
    }

    /// The set of nonterminal tags used in the tree.
    pub fn tag_set(&self) -> HashSet<String> {
        std::iter::once(self.root)
            .chain(self.descendants(self.root))
            .filter_map(|n| self.nodes[n].tag.clone())
            .collect()
    }

    /// The terminal descriptors in token order.
    pub fn terminal_descriptors(&self) -> Vec<String> {
        self.terminals()
            .into_iter()
            .map(|n| {
                if self.nodes[n].kind == Some("PUNCTUATION") {
                    "p".to_string()
                } else {
                    self.nodes[n].terminal.clone().unwrap_or_default()
                }
            })
            .collect()
    }
}

/// Transfer the original token's capitalization onto an inflected form.
fn copy_capitalization(original: &str, form: &str) -> String {
    let upper = original.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
    if !upper {
        return form.to_string();
    }
    let mut chars = form.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_tag_matching() {
        assert!(SimpleTree::tag_matches("NP-SUBJ", "NP"));
        assert!(SimpleTree::tag_matches("NP-SUBJ", "NP-SUBJ"));
        assert!(SimpleTree::tag_matches("CP-ADV-TEMP", "CP-ADV"));
        assert!(!SimpleTree::tag_matches("NP-SUBJ", "NP-S"));
        assert!(!SimpleTree::tag_matches("NP", "NP-SUBJ"));
        assert!(!SimpleTree::tag_matches("VP", "NP"));
    }
}
