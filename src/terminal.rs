//! Grammar terminal specifications and the variant vocabulary.
//!
//! A terminal name is a category followed by underscore-separated variants
//! (`no_et_þf_kvk`, `so_2_þgf_þf_et_p3`), or a quoted literal: `"orð"`
//! matches the surface text, `'lemma'` matches any meaning with that lemma,
//! either optionally carrying a word-class qualifier after a colon
//! (`"á:fs"`, `'sjá:so'_et_p3`).
//!
//! Variants come from a closed vocabulary. Most correspond to a marker that
//! can occur in a lexicon feature string; those are the *feature variants*
//! and participate in bit-mask matching. The rest (`abbrev`, `subj`, the
//! adjective subject cases `sþf`/`sþgf`/`sef`, the ending constraints `x…`/
//! `z…`, and the numeric verb argument counts `0`/`1`/`2`) are interpreted
//! structurally by the matchers.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::GrammarError;

/// The variant vocabulary in bit order. The second column is the marker
/// looked for in lexicon feature strings; `None` marks variants with no
/// lexicon counterpart.
const VARIANTS: &[(&str, Option<&str>)] = &[
    ("nf", Some("NF")),
    ("þf", Some("ÞF")),
    ("þgf", Some("ÞGF")),
    ("ef", Some("EF")),
    ("kk", Some("KK")),
    ("kvk", Some("KVK")),
    ("hk", Some("HK")),
    ("et", Some("ET")),
    ("ft", Some("FT")),
    ("mst", Some("MST")),
    ("est", Some("EST")),
    ("esb", Some("ESB")),
    ("evb", Some("EVB")),
    ("p1", Some("1P")),
    ("p2", Some("2P")),
    ("p3", Some("3P")),
    ("op", Some("OP")),
    ("sp", Some("SP")),
    ("gm", Some("GM")),
    ("mm", Some("MM")),
    ("sb", Some("SB")),
    ("vb", Some("VB")),
    ("nh", Some("NH")),
    ("fh", Some("FH")),
    ("bh", Some("BH")),
    ("lh", Some("LH")),
    ("vh", Some("VH")),
    ("nt", Some("NT")),
    ("sagnb", Some("SAGNB")),
    ("lhþt", Some("LHÞT")),
    ("gr", Some("gr")),
    // Variants without a corresponding lexicon marker
    ("abbrev", None),
    ("subj", None),
    ("sþf", None),
    ("sþgf", None),
    ("sef", None),
    ("x", None),
    ("z", None),
    // Verbs with an expletive: 'það snjóar', 'það rignir'
    ("expl", Some("það")),
];

struct VariantTable {
    bits: HashMap<&'static str, u64>,
    /// (feature marker, bit) for the feature variants.
    markers: Vec<(&'static str, u64)>,
    fbit_mask: u64,
}

fn table() -> &'static VariantTable {
    static TABLE: OnceLock<VariantTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut bits = HashMap::new();
        let mut markers = Vec::new();
        let mut fbit_mask = 0u64;
        for (i, (name, marker)) in VARIANTS.iter().enumerate() {
            let bit = 1u64 << i;
            bits.insert(*name, bit);
            if let Some(m) = marker {
                markers.push((*m, bit));
                fbit_mask |= bit;
            }
        }
        VariantTable {
            bits,
            markers,
            fbit_mask,
        }
    })
}

/// The bit for a variant name, 0 for variants outside the vocabulary.
pub fn vbit(name: &str) -> u64 {
    table().bits.get(name).copied().unwrap_or(0)
}

/// Combined masks used by the matchers.
pub fn cases_mask() -> u64 {
    vbit("nf") | vbit("þf") | vbit("þgf") | vbit("ef")
}

pub fn genders_mask() -> u64 {
    vbit("kk") | vbit("kvk") | vbit("hk")
}

pub fn number_mask() -> u64 {
    vbit("et") | vbit("ft")
}

pub fn scases_mask() -> u64 {
    vbit("sþf") | vbit("sþgf") | vbit("sef")
}

/// Feature bits present in a lexicon feature string.
pub fn feature_bits(features: &str) -> u64 {
    let t = table();
    let mut bits = 0u64;
    for (marker, bit) in &t.markers {
        if features.contains(marker) {
            bits |= bit;
        }
    }
    bits
}

/// The variant names coded in a feature string, in vocabulary order, for
/// the `all_variants` descriptor. Handles the marker overlaps: `LHÞT`
/// subsumes `LH` and `ÞT`, `ESB`/`EVB` subsume `SB`/`VB`, and impersonal
/// forms drop the person variants.
pub fn feature_variants(features: &str) -> Vec<String> {
    if features.is_empty() || features == "-" {
        return Vec::new();
    }
    let mut vset: Vec<&str> = VARIANTS
        .iter()
        .filter_map(|(name, marker)| {
            marker
                .filter(|m| features.contains(m))
                .map(|_| *name)
        })
        .collect();
    // Past tense has no terminal variant but belongs in all_variants
    if features.contains("ÞT") && !features.contains("LHÞT") {
        vset.push("þt");
    }
    let has = |vs: &[&str], v: &str| vs.iter().any(|x| *x == v);
    if has(&vset, "lhþt") {
        vset.retain(|v| *v != "lh" && *v != "nt");
    } else if has(&vset, "esb") {
        vset.retain(|v| *v != "sb");
    } else if has(&vset, "evb") {
        vset.retain(|v| *v != "vb");
    }
    if has(&vset, "op") {
        // For impersonal verbs, all three persons are identical
        vset.retain(|v| !matches!(*v, "p1" | "p2" | "p3"));
    }
    vset.into_iter().map(|v| v.to_string()).collect()
}

/// Literal terminal flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiteralKind {
    /// `"orð"`: matches the surface text, case-neutral.
    Strong,
    /// `'lemma'`: matches any meaning with this lemma, case-neutral.
    Lemma,
}

/// A parsed terminal specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSpec {
    pub name: String,
    /// Category for regular terminals; the quoted text for literals.
    pub first: String,
    /// Word-class qualifier after the colon in literal terminals.
    pub colon_cat: Option<String>,
    pub variants: Vec<String>,
    /// Bits of the known variants present.
    pub vbits: u64,
    /// `vbits` restricted to feature variants; matched against meanings.
    pub fbits: u64,
    pub literal: Option<LiteralKind>,
    /// Lemma ending constraints from `x…` variants (e.g. `xir`).
    pub lemma_endings: Vec<String>,
    /// Form ending constraints from `z…` variants (e.g. `zana`).
    pub form_endings: Vec<String>,
}

impl TerminalSpec {
    /// Parse a terminal name.
    pub fn parse(name: &str) -> Result<TerminalSpec, GrammarError> {
        let bad = |reason: &str| GrammarError::BadTerminal {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        let (first, colon_cat, literal, var_str) = if let Some(q) =
            name.chars().next().filter(|c| *c == '"' || *c == '\'')
        {
            let inner_start = q.len_utf8();
            let close = name[inner_start..]
                .find(q)
                .ok_or_else(|| bad("unterminated literal quote"))?
                + inner_start;
            let inner = &name[inner_start..close];
            if inner.is_empty() {
                return Err(bad("empty literal"));
            }
            let (text, cat) = match inner.split_once(':') {
                Some((t, c)) => (t.to_string(), Some(c.to_string())),
                None => (inner.to_string(), None),
            };
            let kind = if q == '"' {
                LiteralKind::Strong
            } else {
                LiteralKind::Lemma
            };
            (text, cat, Some(kind), &name[close + 1..])
        } else {
            let mut parts = name.splitn(2, '_');
            let first = parts.next().unwrap_or("");
            if first.is_empty() {
                return Err(bad("empty category"));
            }
            (
                first.to_string(),
                None,
                None,
                parts.next().map(|_| &name[first.len()..]).unwrap_or(""),
            )
        };

        let mut variants: Vec<String> = Vec::new();
        let mut vbits = 0u64;
        let mut lemma_endings = Vec::new();
        let mut form_endings = Vec::new();
        for v in var_str.split('_').filter(|v| !v.is_empty()) {
            variants.push(v.to_string());
            let bit = vbit(v);
            if bit != 0 {
                vbits |= bit;
            } else if v.len() > 1 && v.starts_with('x') {
                lemma_endings.push(v[1..].to_string());
                vbits |= vbit("x");
            } else if v.len() > 1 && v.starts_with('z') {
                form_endings.push(v[1..].to_string());
                vbits |= vbit("z");
            }
            // Variants outside the vocabulary (argument counts, 'none',
            // ISO currency codes) are interpreted structurally by the
            // matchers and carry no bits
        }
        let fbits = vbits & table().fbit_mask;
        Ok(TerminalSpec {
            name: name.to_string(),
            first,
            colon_cat,
            variants,
            vbits,
            fbits,
            literal,
            lemma_endings,
            form_endings,
        })
    }

    /// A stand-in for an unparseable terminal, keeping indices stable
    /// while the builder reports the error.
    pub fn placeholder(name: &str) -> TerminalSpec {
        TerminalSpec {
            name: name.to_string(),
            first: String::new(),
            colon_cat: None,
            variants: Vec::new(),
            vbits: 0,
            fbits: 0,
            literal: None,
            lemma_endings: Vec::new(),
            form_endings: Vec::new(),
        }
    }

    /// The grammar category this terminal belongs to: the colon qualifier
    /// for literals, the first name part otherwise.
    pub fn category(&self) -> &str {
        match (&self.literal, &self.colon_cat) {
            (Some(_), Some(c)) => c,
            (Some(_), None) => "",
            _ => &self.first,
        }
    }

    pub fn is_literal(&self) -> bool {
        self.literal.is_some()
    }

    /// True for a lemma literal whose text starts uppercase
    /// (`'Vestur-Þýskaland:hk'_nf`), allowed to match person names.
    pub fn is_uppercase_lemma(&self) -> bool {
        self.literal == Some(LiteralKind::Lemma)
            && self
                .first
                .chars()
                .next()
                .map(|c| c.is_uppercase())
                .unwrap_or(false)
    }

    pub fn matches_category(&self, cat: &str) -> bool {
        self.category() == cat
    }

    pub fn num_variants(&self) -> usize {
        self.variants.len()
    }

    pub fn variant(&self, ix: usize) -> &str {
        &self.variants[ix]
    }

    pub fn variant_last(&self) -> Option<&str> {
        self.variants.last().map(|s| s.as_str())
    }

    pub fn has_variant(&self, v: &str) -> bool {
        self.variants.iter().any(|x| x == v)
    }

    pub fn has_vbits(&self, mask: u64) -> bool {
        self.vbits & mask == mask
    }

    pub fn has_any_vbits(&self, mask: u64) -> bool {
        self.vbits & mask != 0
    }

    /// All feature variants this terminal pins are present in the meaning.
    pub fn fbits_match(&self, meaning_bits: u64) -> bool {
        self.fbits & meaning_bits == self.fbits
    }

    /// Feature match restricted to the given mask (e.g. cases only).
    pub fn fbits_match_mask(&self, mask: u64, meaning_bits: u64) -> bool {
        let wanted = self.fbits & mask;
        wanted & meaning_bits == wanted
    }

    /// Number of argument cases for a verb terminal (`so_2_þgf_þf…` → 2),
    /// or `None` when the terminal has no argument specification.
    pub fn verb_arg_count(&self) -> Option<usize> {
        match self.variants.first().map(|v| v.as_str()) {
            Some("0") => Some(0),
            Some("1") => Some(1),
            Some("2") => Some(2),
            _ => None,
        }
    }

    /// The underscore-joined argument cases of a verb terminal, in the
    /// shape used as a verb-frame key suffix (`_þgf_þf`).
    pub fn verb_cases(&self) -> String {
        let Some(n) = self.verb_arg_count() else {
            return String::new();
        };
        let mut s = String::new();
        for v in self.variants.iter().skip(1).take(n) {
            s.push('_');
            s.push_str(v);
        }
        s
    }

    /// The gender variant, if exactly specified.
    pub fn gender(&self) -> Option<&str> {
        ["kk", "kvk", "hk"]
            .into_iter()
            .find(|g| self.has_variant(g))
    }

    /// The case variant, if exactly specified.
    pub fn case(&self) -> Option<&str> {
        ["nf", "þf", "þgf", "ef"]
            .into_iter()
            .find(|c| self.has_variant(c))
    }

    pub fn is_singular(&self) -> bool {
        self.has_variant("et")
    }

    pub fn is_plural(&self) -> bool {
        self.has_variant("ft")
    }

    pub fn is_abbrev(&self) -> bool {
        self.has_variant("abbrev")
    }

    pub fn is_nh(&self) -> bool {
        self.has_variant("nh")
    }

    pub fn is_mm(&self) -> bool {
        self.has_variant("mm")
    }

    pub fn is_gm(&self) -> bool {
        self.has_variant("gm")
    }

    pub fn is_subj(&self) -> bool {
        self.has_variant("subj")
    }

    pub fn is_sagnb(&self) -> bool {
        self.has_variant("sagnb")
    }

    pub fn is_op(&self) -> bool {
        self.has_variant("op")
    }

    /// Past participle (lhþt).
    pub fn is_lh(&self) -> bool {
        self.has_variant("lhþt")
    }

    /// Present participle: both `lh` and `nt` variants.
    pub fn is_lh_nt(&self) -> bool {
        self.has_variant("lh") && self.has_variant("nt")
    }

    pub fn is_vh(&self) -> bool {
        self.has_variant("vh")
    }

    pub fn is_bh(&self) -> bool {
        self.has_variant("bh")
    }

    pub fn is_expl(&self) -> bool {
        self.has_variant("expl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_regular_terminal() {
        let t = TerminalSpec::parse("no_et_þf_kvk").unwrap();
        assert_eq!(t.category(), "no");
        assert_eq!(t.variants, vec!["et", "þf", "kvk"]);
        assert!(t.is_singular());
        assert_eq!(t.case(), Some("þf"));
        assert_eq!(t.gender(), Some("kvk"));
        assert!(!t.is_literal());
    }

    #[test]
    fn parse_verb_terminal_with_arguments() {
        let t = TerminalSpec::parse("so_2_þgf_þf_et_p3").unwrap();
        assert_eq!(t.verb_arg_count(), Some(2));
        assert_eq!(t.verb_cases(), "_þgf_þf");
        assert!(t.has_variant("p3"));
    }

    #[test]
    fn parse_literals() {
        let strong = TerminalSpec::parse("\"á:fs\"").unwrap();
        assert_eq!(strong.literal, Some(LiteralKind::Strong));
        assert_eq!(strong.first, "á");
        assert_eq!(strong.category(), "fs");

        let lemma = TerminalSpec::parse("'sjá:so'_et_p3").unwrap();
        assert_eq!(lemma.literal, Some(LiteralKind::Lemma));
        assert_eq!(lemma.first, "sjá");
        assert_eq!(lemma.variants, vec!["et", "p3"]);

        let upper = TerminalSpec::parse("'Vagn:kk'_þgf").unwrap();
        assert!(upper.is_uppercase_lemma());
    }

    #[test]
    fn parse_ending_constraints() {
        let t = TerminalSpec::parse("no_xir_et").unwrap();
        assert_eq!(t.lemma_endings, vec!["ir"]);
        let t = TerminalSpec::parse("lo_zlega").unwrap();
        assert_eq!(t.form_endings, vec!["lega"]);
    }

    #[test]
    fn malformed_literals_are_errors() {
        assert!(TerminalSpec::parse("\"unterminated").is_err());
        assert!(TerminalSpec::parse("\"\"").is_err());
        assert!(TerminalSpec::parse("_et").is_err());
    }

    #[test]
    fn feature_bit_matching() {
        let t = TerminalSpec::parse("no_et_nf_kvk").unwrap();
        assert!(t.fbits_match(feature_bits("NFETKVK")));
        assert!(!t.fbits_match(feature_bits("ÞFETKVK")));
        // Mask-restricted match: case only
        assert!(t.fbits_match_mask(cases_mask(), feature_bits("NFFT")));
    }

    #[test]
    fn feature_variant_sets() {
        let has = |v: &[String], x: &str| v.iter().any(|s| s == x);
        let v = feature_variants("GM-FH-ÞT-3P-ET");
        assert!(has(&v, "gm"));
        assert!(has(&v, "þt"));
        assert!(has(&v, "p3"));
        assert!(has(&v, "et"));

        let v = feature_variants("LHÞT-SB-KVK-NFET");
        assert!(has(&v, "lhþt"));
        assert!(!has(&v, "lh"));
        assert!(!has(&v, "nt"));

        let v = feature_variants("OP-ÞGF-GM-FH-NT-3P-ET");
        assert!(has(&v, "op"));
        assert!(!has(&v, "p3"));

        // Deterministic vocabulary order
        assert_eq!(feature_variants("NFET"), feature_variants("NFET"));
        assert!(feature_variants("-").is_empty());
    }
}
