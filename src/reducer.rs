//! Forest reduction: score every packed alternative, keep the best.
//!
//! Reduction happens in two passes over the forest. The first pass collects,
//! for every token position, the set of terminals the forest actually uses
//! there, and scores each (token, terminal) option with the matching
//! heuristics. The second pass walks the forest bottom-up with memoization,
//! sums child scores per packed family, applies production priorities and
//! nonterminal adjustments, and prunes every ambiguous node down to its
//! highest-scoring family.
//!
//! Verb/preposition affinity is context-dependent: the same preposition
//! subtree can score differently under different verbs. Subtrees beneath an
//! `enable_prep_bonus` nonterminal are therefore scored under a fresh
//! memoization key, and memoization resumes where a new scope begins
//! (`begin_prep_scope`, noun phrases, empty nodes).

use std::collections::{HashMap, HashSet};

use crate::grammar::{Grammar, TermIx};
use crate::matcher::{mm_verb_stem, Lattice};
use crate::parser::{Forest, NodeIx, NodeLabel};
use crate::settings::Settings;
use crate::tokens::{Tok, TokenKind};

/// A (verb terminal, token position) pair carried up the tree for
/// verb/preposition matching.
type VerbList = Vec<(TermIx, usize)>;

/// Per-node scoring result.
#[derive(Debug, Clone, Default)]
struct ScoreInfo {
    sc: i64,
    /// Verb terminals seen within this subtree.
    so: VerbList,
    /// Verbs picked up for preposition matching in enclosing scopes.
    sl: VerbList,
}

/// Nonterminal tags that delimit preposition-bonus scopes.
const PREP_SCOPE_TAGS: &[&str] = &["begin_prep_scope", "purge_prep", "no_prep", "enable_prep_bonus"];
/// Tags that purge contained-verb information on the way up.
const PURGE_VERB_TAGS: &[&str] = &["begin_prep_scope", "purge_verb"];

/// BÍN categories of person and entity names, penalized as plain nouns.
const NAMED_ENTITY_FL: &[&str] = &["ism", "erm", "gæl", "nafn", "föð", "móð", "ætt", "entity"];

/// Reduces parse forests to a single most likely tree.
pub struct Reducer<'a> {
    grammar: &'a Grammar,
    settings: &'a Settings,
}

impl<'a> Reducer<'a> {
    pub fn new(grammar: &'a Grammar, settings: &'a Settings) -> Self {
        Reducer { grammar, settings }
    }

    /// Score and prune the forest in place; returns the winning derivation's
    /// score. An empty forest reduces to score 0.
    pub fn reduce(
        &self,
        forest: &mut Forest,
        root: NodeIx,
        tokens: &[Tok],
        lattice: &Lattice,
    ) -> i64 {
        if forest.is_empty() {
            return 0;
        }
        let scores = self.terminal_scores(forest, root, tokens);
        let mut walk = Reduction {
            grammar: self.grammar,
            settings: self.settings,
            tokens,
            lattice,
            scores,
            prep_bonus_stack: vec![None],
            current_verb_stack: vec![None],
            memo: HashMap::new(),
            bonus_cache: HashMap::new(),
            next_key: 0,
        };
        walk.calc(forest, root, 0).sc
    }

    // -- first pass: score the (token, terminal) options -------------------

    fn terminal_scores(
        &self,
        forest: &Forest,
        root: NodeIx,
        tokens: &[Tok],
    ) -> Vec<HashMap<TermIx, i64>> {
        // Which terminals does the forest actually use at each position?
        let mut finals: Vec<HashSet<TermIx>> = vec![HashSet::new(); tokens.len()];
        let mut seen: HashSet<NodeIx> = HashSet::new();
        let mut stack = vec![root];
        while let Some(ix) = stack.pop() {
            if !seen.insert(ix) {
                continue;
            }
            let node = forest.node(ix);
            if let Some((pos, term)) = node.token_terminal() {
                finals[pos].insert(term);
                continue;
            }
            for f in &node.families {
                stack.extend([f.left, f.right].into_iter().flatten());
            }
        }

        let mut scores: Vec<HashMap<TermIx, i64>> = finals
            .iter()
            .map(|s| s.iter().map(|&t| (t, 0i64)).collect())
            .collect();

        for i in 0..tokens.len() {
            if finals[i].len() <= 1 {
                // No ambiguity to resolve here
                continue;
            }
            let token = &tokens[i];
            let txt = token.text.to_lowercase();
            // The last part of a composite word ('jaðar-áhrifin' → 'áhrifin')
            let meanings = token.meanings();
            let composite = meanings.first().map(|m| m.lemma.contains('-')).unwrap_or(false);
            let txt_last = if composite {
                meanings[0]
                    .form
                    .rsplit('-')
                    .next()
                    .unwrap_or(&txt)
                    .to_lowercase()
            } else {
                txt.clone()
            };
            let same_first = finals[i]
                .iter()
                .map(|&t| &self.grammar.terminal(t).first)
                .collect::<HashSet<_>>()
                .len()
                == 1;

            // Preference orderings between terminal categories for this word
            if !same_first {
                if let Some(prefs) = self.settings.terminal_preferences.get(&txt_last) {
                    let mut adj_worse: HashMap<TermIx, i64> = HashMap::new();
                    let mut adj_better: HashMap<TermIx, i64> = HashMap::new();
                    for pref in prefs {
                        for &wt in &finals[i] {
                            if !pref.worse.contains(&self.grammar.terminal(wt).first) {
                                continue;
                            }
                            for &bt in &finals[i] {
                                if wt == bt
                                    || !pref.better.contains(&self.grammar.terminal(bt).first)
                                {
                                    continue;
                                }
                                let (adj_w, adj_b) = if self.grammar.terminal(bt).is_literal() {
                                    (-2 * pref.factor, 6 * pref.factor)
                                } else {
                                    (-2 * pref.factor, 4 * pref.factor)
                                };
                                let e = adj_worse.entry(wt).or_insert(0);
                                *e = (*e).min(adj_w);
                                let e = adj_better.entry(bt).or_insert(0);
                                *e = (*e).max(adj_b);
                            }
                        }
                    }
                    for (t, adj) in adj_worse.into_iter().chain(adj_better) {
                        *scores[i].get_mut(&t).unwrap() += adj;
                    }
                }
            }

            let terminal_set: Vec<TermIx> = finals[i].iter().copied().collect();
            for &t in &terminal_set {
                let spec = self.grammar.terminal(t);
                let mut sc = 0i64;
                if spec.is_literal() {
                    // Exact and semi-exact matches are worth something
                    sc += 2;
                }
                match spec.first.as_str() {
                    "ao" | "eo" => sc -= 1,
                    "no" => {
                        if spec.is_singular() {
                            sc += 1;
                        } else if spec.is_abbrev() {
                            sc -= 1;
                        }
                        if token.kind == TokenKind::Word
                            && token.is_upper()
                            && !meanings.is_empty()
                            && meanings
                                .iter()
                                .any(|m| NAMED_ENTITY_FL.contains(&m.category.as_str()))
                        {
                            // This looks like a person or entity name;
                            // discourage the plain-noun reading
                            sc -= 5;
                        }
                        if let (Some(np), Some(gender)) =
                            (self.settings.noun_preferences.get(&txt_last), spec.gender())
                        {
                            sc += np.get(gender).copied().unwrap_or(0);
                        }
                    }
                    "fs" => {
                        if spec.has_variant("nf") {
                            // The 'artificial' nominative prepositions
                            sc -= 10;
                            if txt == "sem" {
                                sc -= 8;
                            }
                        } else if txt == "við" && spec.has_variant("þgf") {
                            sc += 1;
                        } else if txt == "sem" && spec.has_variant("þf") {
                            sc -= 4;
                        } else if txt == "á" && spec.has_variant("þgf") {
                            // Resolves the conflict with the verb 'eiga'
                            sc += 4;
                        } else {
                            sc += 2;
                        }
                    }
                    "lo" => {
                        if composite {
                            sc -= 3;
                        }
                        if txt.ends_with("andi")
                            && meanings.iter().any(|m| {
                                m.class == "so"
                                    && matches!(m.features.as_str(), "LH-NT" | "LHNT")
                            })
                        {
                            // Strongly prefer the present-participle verb
                            sc -= 50;
                        }
                    }
                    "so" => {
                        sc += self.verb_score(i, t, &finals, &mut scores, token);
                    }
                    "tala" => {
                        if spec.has_variant("ef") {
                            sc -= 4;
                        }
                    }
                    "person" => {
                        if spec.has_variant("nf") {
                            sc += 2;
                        }
                    }
                    "sérnafn" => {
                        if meanings.is_empty() {
                            // No lexicon meanings: the proper-name reading
                            // was the only option, ease the grammar penalty
                            sc += 12;
                        } else {
                            sc -= 10;
                            if i == 0 {
                                sc -= 6;
                            }
                        }
                    }
                    "fyrirtæki" => sc += 24,
                    "st" => {
                        if txt == "sem" {
                            // A pure conjunction reading of 'sem' is rare;
                            // the connective (stt) reading is not penalized
                            sc -= 6;
                        }
                    }
                    "sem" => {
                        if spec.colon_cat.as_deref() == Some("st") {
                            sc -= 6;
                        }
                    }
                    "abfn" => {
                        sc += if spec.num_variants() > 1 { 6 } else { 2 };
                    }
                    "gr" => sc += 2,
                    "nhm" => sc += 4,
                    _ => {}
                }
                *scores[i].get_mut(&t).unwrap() += sc;
            }
        }
        scores
    }

    /// Verb-terminal scoring: argument frames, mood and voice preferences,
    /// infinitive adjacency.
    fn verb_score(
        &self,
        i: usize,
        t: TermIx,
        finals: &[HashSet<TermIx>],
        scores: &mut [HashMap<TermIx, i64>],
        token: &Tok,
    ) -> i64 {
        let spec = self.grammar.terminal(t);
        let mut sc = 0i64;
        if let Some(ncases) = spec.verb_arg_count() {
            // The more arguments matched, the better; plus any per-frame
            // adjustment from the verb table
            sc += 2 * ncases as i64;
            let mut adjmax: Option<i64> = None;
            for m in token.meanings() {
                if m.class == "so" {
                    let key = format!("{}{}", m.lemma, spec.verb_cases());
                    if let Some(s) = self.settings.verbs.score(&key) {
                        adjmax = Some(adjmax.map_or(s, |a| a.max(s)));
                    }
                }
            }
            sc += adjmax.unwrap_or(0);
        }
        if spec.is_bh() {
            sc -= 4;
        } else if spec.is_sagnb() {
            // Supine means another piece clicked into place
            sc += 6;
        } else if spec.is_lh() {
            sc += if spec.has_variant("vb") { -2 } else { 3 };
        } else if spec.is_lh_nt() {
            sc += 12;
        } else if spec.is_mm() {
            // Better than a single matched case, so so_0_mm beats so_1_þgf
            sc += 3;
        } else if spec.is_vh() {
            sc += 2;
        }
        if spec.is_subj() {
            sc += if spec.has_variant("none") { -3 } else { 1 };
        }
        if spec.is_nh() {
            if i > 0
                && finals[i - 1]
                    .iter()
                    .any(|&pt| self.grammar.terminal(pt).first == "nhm")
            {
                // Adjacent infinitive marker: prop up both terminals
                sc += 4;
                for (&pt, psc) in scores[i - 1].iter_mut() {
                    if self.grammar.terminal(pt).first == "nhm" {
                        *psc += 2;
                        break;
                    }
                }
            }
            if finals[i].iter().any(|&pt| {
                let p = self.grammar.terminal(pt);
                p.first == "no" && p.has_variant("ef") && p.is_plural()
            }) {
                // Prefer the infinitive over a genitive-plural noun reading
                sc += 4;
            }
        }
        if i > 0 && token.is_upper() {
            // Uppercase mid-sentence: unlikely to be a verb
            sc -= 4;
        }
        sc
    }
}

// -- second pass: the memoized reduction walk -------------------------------

struct Reduction<'a> {
    grammar: &'a Grammar,
    settings: &'a Settings,
    tokens: &'a [Tok],
    lattice: &'a Lattice,
    scores: Vec<HashMap<TermIx, i64>>,
    prep_bonus_stack: Vec<Option<VerbList>>,
    current_verb_stack: Vec<Option<VerbList>>,
    memo: HashMap<(NodeIx, u32), ScoreInfo>,
    bonus_cache: HashMap<(TermIx, usize, TermIx, usize), i64>,
    next_key: u32,
}

impl Reduction<'_> {
    fn calc(&mut self, forest: &mut Forest, ix: NodeIx, key: u32) -> ScoreInfo {
        if let Some(v) = self.memo.get(&(ix, key)) {
            return v.clone();
        }
        let node = forest.node(ix);
        let result = match node.label {
            NodeLabel::Token { token, terminal } => self.visit_token(token, terminal),
            _ if !node.families.is_empty() => self.visit_families(forest, ix, key),
            _ => ScoreInfo::default(),
        };
        self.memo.insert((ix, key), result.clone());
        result
    }

    fn visit_token(&mut self, pos: usize, terminal: TermIx) -> ScoreInfo {
        let mut d = ScoreInfo::default();
        let spec = self.grammar.terminal(terminal);
        let mut sc = self.scores[pos].get(&terminal).copied().unwrap_or(0);
        if spec.matches_category("fs") {
            if let Some(prep_bonus) = self.prep_bonus_stack.last().cloned().flatten() {
                // Inside a preposition bonus zone: reward prepositions
                // matching an enclosing verb, discourage the rest
                let mut final_bonus: Option<i64> = None;
                for (verb_term, verb_pos) in prep_bonus {
                    let cache_key = (terminal, pos, verb_term, verb_pos);
                    let bonus = match self.bonus_cache.get(&cache_key).copied() {
                        Some(b) => b,
                        None => {
                            let b = self.verb_prep_bonus(terminal, pos, verb_term, verb_pos);
                            self.bonus_cache.insert(cache_key, b);
                            b
                        }
                    };
                    final_bonus = Some(final_bonus.map_or(bonus, |f| f.max(bonus)));
                }
                if let Some(b) = final_bonus {
                    sc += b;
                }
            }
        } else if spec.matches_category("so") {
            d.so = vec![(terminal, pos)];
        }
        d.sc = sc;
        d
    }

    fn verb_prep_bonus(
        &self,
        prep_term: TermIx,
        prep_pos: usize,
        verb_term: TermIx,
        verb_pos: usize,
    ) -> i64 {
        let w = &self.settings.weights;
        let verb_spec = self.grammar.terminal(verb_term);
        let Some(meaning_ix) = self.lattice.meaning_for(verb_pos, verb_term) else {
            return w.verb_prep_penalty;
        };
        let m = &self.tokens[verb_pos].meanings()[meaning_ix];
        let verb = if m.features.contains("MM") {
            // Use the middle-voice stem: 'eignast', not 'eigna'
            mm_verb_stem(&m.lemma)
        } else {
            m.lemma.clone()
        };
        let verb_with_cases = format!("{verb}{}", verb_spec.verb_cases());
        let prep_spec = self.grammar.terminal(prep_term);
        let prep_text = self.tokens[prep_pos].text.to_lowercase();
        let prep_with_case = if prep_spec.num_variants() > 0 {
            let case = prep_spec.variant(0);
            if matches!(case, "nf" | "þf" | "þgf" | "ef") {
                format!("{prep_text}_{case}")
            } else {
                prep_text
            }
        } else {
            // Literal terminal such as "á:fs": match all cases
            prep_text
        };
        if self
            .settings
            .verbs
            .matches_preposition(&verb_with_cases, &prep_with_case)
        {
            w.verb_prep_bonus
        } else {
            w.verb_prep_penalty
        }
    }

    fn visit_families(&mut self, forest: &mut Forest, ix: NodeIx, key: u32) -> ScoreInfo {
        let node = forest.node(ix);
        let nt_ix = node.nonterminal();
        let num_families = node.families.len();
        let span = (node.start, node.end);
        let families: Vec<_> = node.families.clone();

        // Scope entry: preposition bonus zones and verb context
        let mut pushed_prep = false;
        let mut verb = self.current_verb_stack.last().cloned().flatten();
        if let Some(nt) = nt_ix.map(|i| self.grammar.nonterminal(i)) {
            if nt.has_tag("enable_prep_bonus") {
                self.prep_bonus_stack.push(verb.clone());
                pushed_prep = true;
            } else if nt.has_tag("begin_prep_scope") || nt.is_noun_phrase {
                self.prep_bonus_stack.push(None);
                pushed_prep = true;
                verb = None;
            }
        }
        self.current_verb_stack.push(verb.clone());
        let start_verb = verb;

        let mut results: Vec<ScoreInfo> = Vec::with_capacity(num_families);
        for family in &families {
            *self.current_verb_stack.last_mut().unwrap() = start_verb.clone();
            let mut fam = ScoreInfo::default();
            if nt_ix.is_some() {
                if let Some(prod) = family.prod {
                    // Higher-priority productions start with a head start
                    fam.sc = self.settings.weights.priority_factor
                        * self.grammar.production(prod).priority as i64;
                }
            }
            for child in [family.left, family.right].into_iter().flatten() {
                let child_key = self.child_key(forest, child, key);
                let rd = self.calc(forest, child, child_key);
                fam.sc += rd.sc;
                if !rd.so.is_empty() {
                    fam.so.extend(rd.so.iter().copied());
                }
                if !rd.sl.is_empty() {
                    fam.sl.extend(rd.sl.iter().copied());
                    *self.current_verb_stack.last_mut().unwrap() = Some(rd.sl.clone());
                }
            }
            results.push(fam);
        }

        // Pick the best-scoring family; ties break toward the lowest index
        let best_ix = results
            .iter()
            .enumerate()
            .max_by(|(ai, a), (bi, b)| a.sc.cmp(&b.sc).then(bi.cmp(ai)))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let mut sc = results.swap_remove(best_ix);
        if num_families > 1 {
            forest.reduce_to(ix, best_ix);
        }

        if let Some(nt) = nt_ix.map(|i| self.grammar.nonterminal(i)) {
            sc.sc += nt.score_adjustment;
            if nt.has_tag("apply_length_bonus") {
                let bonus = (span.1 as i64 - span.0 as i64 - 1)
                    * self.settings.weights.length_bonus_factor;
                sc.sc += bonus;
            }
            if nt.has_tag("apply_prep_bonus")
                && self.prep_bonus_stack.last().cloned().flatten().is_some()
            {
                sc.sc += self.settings.weights.verb_prep_bonus;
            }
            if nt.has_tag("pick_up_verb") && !sc.so.is_empty() {
                sc.sl = sc.so.clone();
            }
            if nt.has_any_tag(PURGE_VERB_TAGS) {
                sc.so.clear();
                sc.sl.clear();
            }
        }

        if pushed_prep {
            self.prep_bonus_stack.pop();
        }
        self.current_verb_stack.pop();
        sc
    }

    /// Memoization key for a child subtree: a fresh key under
    /// `enable_prep_bonus` (context-dependent scores), back to the shared
    /// key where a new scope begins.
    fn child_key(&mut self, forest: &Forest, child: NodeIx, key: u32) -> u32 {
        let node = forest.node(child);
        let Some(nt_ix) = node.nonterminal() else {
            return key;
        };
        let nt = self.grammar.nonterminal(nt_ix);
        if nt.has_tag("enable_prep_bonus") {
            self.next_key += 1;
            return self.next_key;
        }
        if key != 0
            && (nt.has_any_tag(PREP_SCOPE_TAGS) || nt.is_noun_phrase || node.is_empty_span())
        {
            return 0;
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::Matcher;
    use crate::parser::{Parser, ParserOptions};
    use crate::tokens::Meaning;

    fn word(text: &str, rows: &[(&str, &str, &str)]) -> Tok {
        Tok::word(
            text,
            rows.iter()
                .map(|(lemma, class, features)| Meaning::new(lemma, 1, class, "alm", text, features))
                .collect(),
        )
    }

    /// Parse + reduce a sentence with an ambiguous noun-or-verb word and
    /// check the priority mechanism selects the preferred production.
    #[test]
    fn priority_breaks_ties() {
        let g = Grammar::builder()
            .production("S0", &["Liður"])
            .production_prio("Liður", &["no_et_nf_kvk"], 1)
            .production_prio("Liður", &["sérnafn_nf"], 0)
            .build("S0")
            .unwrap();
        let s = Settings::new();
        let tokens = vec![word("Sól", &[("sól", "kvk", "NFET")])];
        let lattice = Matcher::new(&g, &s).build_lattice(&tokens);
        let mut result = Parser::new(&g).parse(&lattice, &ParserOptions::default()).unwrap();
        // Priority pruning keeps only the preferred family
        assert_eq!(result.forest.num_combinations(result.root), 1);
        let reducer = Reducer::new(&g, &s);
        let _ = reducer.reduce(&mut result.forest, result.root, &tokens, &lattice);
        let children = result.forest.reduced_children(result.root);
        let lidur = children[0];
        let leaf = result.forest.reduced_children(lidur)[0];
        let (_, term) = result.forest.node(leaf).token_terminal().unwrap();
        assert_eq!(g.terminal(term).first, "sérnafn");
    }

    /// Terminal-level heuristics: singular nouns beat plural readings of
    /// the same ambiguous form.
    #[test]
    fn singular_noun_preferred() {
        let g = Grammar::builder()
            .production("S0", &["Nl"])
            .production("Nl", &["no_et_nf_kvk"])
            .production("Nl", &["no_ft_nf_kvk"])
            .build("S0")
            .unwrap();
        let s = Settings::new();
        // An artificial form that is both singular and plural nominative
        let tokens = vec![word("lús", &[("lús", "kvk", "NFET"), ("lús", "kvk", "NFFT")])];
        let lattice = Matcher::new(&g, &s).build_lattice(&tokens);
        let mut result = Parser::new(&g).parse(&lattice, &ParserOptions::default()).unwrap();
        assert_eq!(result.forest.num_combinations(result.root), 2);
        let score = Reducer::new(&g, &s).reduce(&mut result.forest, result.root, &tokens, &lattice);
        assert_eq!(result.forest.num_combinations(result.root), 1);
        let nl = result.forest.reduced_children(result.root)[0];
        let leaf = result.forest.reduced_children(nl)[0];
        let (_, term) = result.forest.node(leaf).token_terminal().unwrap();
        assert!(g.terminal(term).is_singular());
        assert!(score >= 1); // the singular bonus survived to the root
    }

    /// The verb/preposition affinity table steers attachment.
    #[test]
    fn verb_preposition_affinity() {
        let g = Grammar::builder()
            .production("S0", &["Setning"])
            .production("Setning", &["SagnRuna", "FsInnskot"])
            .production("SagnRuna", &["so_1_þf_et_p3"])
            .production("FsInnskot", &["Fsliður"])
            .production("Fsliður", &["fs_þf"])
            .production("Fsliður", &["fs_þgf"])
            .tag("Setning", "begin_prep_scope")
            .tag("SagnRuna", "pick_up_verb")
            .tag("FsInnskot", "enable_prep_bonus")
            .build("S0")
            .unwrap();
        let mut s = Settings::new();
        s.verbs.add_frame("horfa_þf");
        s.add_preposition("á", &["þf", "þgf"], false, false);
        s.verbs.add_preposition("horfa_þf", "á_þf");
        let tokens = vec![
            word("horfði", &[("horfa", "so", "GM-FH-ÞT-3P-ET")]),
            word("á", &[("á", "fs", "-")]),
        ];
        let lattice = Matcher::new(&g, &s).build_lattice(&tokens);
        let mut result = Parser::new(&g).parse(&lattice, &ParserOptions::default()).unwrap();
        assert_eq!(result.forest.num_combinations(result.root), 2);
        Reducer::new(&g, &s).reduce(&mut result.forest, result.root, &tokens, &lattice);
        // The accusative attachment wins through the affinity bonus
        let setning = result.forest.reduced_children(result.root)[0];
        let innskot = result.forest.reduced_children(setning)[1];
        let fslidur = result.forest.reduced_children(innskot)[0];
        let leaf = result.forest.reduced_children(fslidur)[0];
        let (_, term) = result.forest.node(leaf).token_terminal().unwrap();
        assert!(g.terminal(term).has_variant("þf"));
    }
}
