//! Token-to-terminal matching: builds the lattice the parser scans over.
//!
//! For every input position, the matcher decides which grammar terminals the
//! token can realize, and for word tokens records the specific meaning that
//! justified the match. Matching is a pure relation over the token, the
//! terminal specification and the configuration tables; the same inputs
//! always produce the same lattice.

use crate::grammar::{Grammar, TermIx};
use crate::settings::Settings;
use crate::terminal::{
    cases_mask, feature_bits, genders_mask, number_mask, scases_mask, vbit, LiteralKind,
    TerminalSpec,
};
use crate::tokens::{Case, Gender, Meaning, Tok, TokVal, TokenKind};

/// Adverbs that can never be an `eo` (already excluding prepositions
/// and pronouns).
const NOT_EO: &[&str] = &["og", "eða", "sem", "ekkert", "f.h.", "m.v."];

/// Prepositions that must nevertheless be allowed as plain adverbs.
const NOT_NOT_EO: &[&str] = &[
    "um", "nær", "nærri", "meðal", "neðan", "jafnframt", "samt", "því",
];

/// Words never eligible as proper names even when capitalized.
const NOT_PROPER_NAME: &[&str] = &[
    "ég", "þú", "hann", "hún", "það", "við", "þið", "þau", "þeir", "þær", "mér", "mig",
    "mín", "þig", "þér", "þín", "þeim", "þeirra", "þetta", "þessi", "í", "á", "af", "um",
    "að", "með", "til", "frá", "búist", "annars", "samkvæmt", "en", "og", "sem", "ekkert",
    "hæð", "svo", "veggir", "þarna", "allt",
];

/// BÍN categories (`fl`) of person and entity names.
const NAMED_ENTITY_FL: &[&str] = &["ism", "erm", "gæl", "nafn", "föð", "móð", "ætt", "entity"];

/// Variants checked generically against verb forms; cases and number are
/// handled structurally before this list applies.
const VERB_VARIANTS: &[&str] = &[
    "p1", "p2", "p3", "nh", "vh", "lh", "bh", "fh", "sagnb", "lhþt", "nt", "kk", "kvk",
    "hk", "sb", "vb", "gm", "mm", "sp", "expl",
];

/// Variants that must be present in the terminal if present in the form.
const RESTRICTIVE_VARIANTS: &[(&str, &str)] = &[
    ("sagnb", "SAGNB"),
    ("lhþt", "LHÞT"),
    ("bh", "BH"),
    ("op", "OP"),
    ("sp", "SP"),
    ("expl", "það"),
];

/// Map a lexicon word class (`ordfl`) to the grammar category it matches.
fn kind_of(ordfl: &str) -> &str {
    match ordfl {
        "kk" | "kvk" | "hk" => "no",
        other => other,
    }
}

fn marker_of(variant: &str) -> Option<&'static str> {
    match variant {
        "p1" => Some("1P"),
        "p2" => Some("2P"),
        "p3" => Some("3P"),
        "nh" => Some("NH"),
        "vh" => Some("VH"),
        "lh" => Some("LH"),
        "bh" => Some("BH"),
        "fh" => Some("FH"),
        "sagnb" => Some("SAGNB"),
        "lhþt" => Some("LHÞT"),
        "nt" => Some("NT"),
        "kk" => Some("KK"),
        "kvk" => Some("KVK"),
        "hk" => Some("HK"),
        "sb" => Some("SB"),
        "vb" => Some("VB"),
        "gm" => Some("GM"),
        "mm" => Some("MM"),
        "sp" => Some("SP"),
        "expl" => Some("það"),
        _ => None,
    }
}

/// One lattice cell: a terminal the token can realize, with the index of
/// the meaning (word tokens) or person-name reading (person tokens) that
/// justified the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatticeEntry {
    pub terminal: TermIx,
    pub meaning: Option<usize>,
}

/// The per-position sets of (terminal, meaning) pairs.
#[derive(Debug)]
pub struct Lattice {
    entries: Vec<Vec<LatticeEntry>>,
}

impl Lattice {
    /// Entries for the token at `pos`.
    pub fn at(&self, pos: usize) -> &[LatticeEntry] {
        &self.entries[pos]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The meaning index recorded for (pos, terminal), if any.
    pub fn meaning_for(&self, pos: usize, terminal: TermIx) -> Option<usize> {
        self.entries[pos]
            .iter()
            .find(|e| e.terminal == terminal)
            .and_then(|e| e.meaning)
    }
}

/// The matching engine. Holds only borrows; cheap to construct per sentence.
pub struct Matcher<'a> {
    grammar: &'a Grammar,
    settings: &'a Settings,
}

impl<'a> Matcher<'a> {
    pub fn new(grammar: &'a Grammar, settings: &'a Settings) -> Self {
        Matcher { grammar, settings }
    }

    /// Build the token lattice for a sentence.
    pub fn build_lattice(&self, tokens: &[Tok]) -> Lattice {
        let entries = tokens
            .iter()
            .map(|tok| {
                let lower = tok.text.to_lowercase();
                let mut cell = Vec::new();
                for (ix, spec) in self.grammar.terminals().iter().enumerate() {
                    if let Some(meaning) = self.match_token(tok, &lower, spec) {
                        cell.push(LatticeEntry {
                            terminal: ix,
                            meaning,
                        });
                    }
                }
                cell
            })
            .collect();
        Lattice { entries }
    }

    /// Whether the token can realize the terminal; `Some(meaning index)`
    /// on a match justified by a specific meaning record.
    fn match_token(&self, tok: &Tok, lower: &str, spec: &TerminalSpec) -> Option<Option<usize>> {
        match tok.kind {
            TokenKind::Word => self.match_word(tok, lower, spec),
            TokenKind::Person => self.match_person(tok, spec),
            TokenKind::Entity => (spec.first == "entity").then_some(None),
            TokenKind::Company => (spec.first == "fyrirtæki").then_some(None),
            TokenKind::Punctuation => self.match_punctuation(tok, spec),
            TokenKind::Number => self.match_number(tok, spec),
            TokenKind::NumberWithLetter => {
                (spec.first == "talameðbókstaf" || spec.first == "sequence").then_some(None)
            }
            TokenKind::Ordinal => {
                (spec.first == "raðnr" || spec.first == "sequence").then_some(None)
            }
            TokenKind::Percent => (spec.first == "prósenta").then_some(None),
            TokenKind::Year => (spec.first == "ártal" || spec.first == "tala").then_some(None),
            TokenKind::DateAbs => (spec.first == "dagsföst").then_some(None),
            TokenKind::DateRel => (spec.first == "dagsafs").then_some(None),
            TokenKind::Time => (spec.first == "tími").then_some(None),
            TokenKind::TimestampAbs | TokenKind::TimestampRel => {
                (spec.first == "tímapunktur").then_some(None)
            }
            TokenKind::Amount => self.match_amount(tok, spec),
            TokenKind::Currency => self.match_currency(tok, spec),
            TokenKind::Measurement => (spec.first == "mælieining").then_some(None),
            TokenKind::Domain => (spec.first == "lén").then_some(None),
            TokenKind::Hashtag => (spec.first == "myllumerki").then_some(None),
            TokenKind::Email => (spec.first == "tölvupóstfang").then_some(None),
            TokenKind::Url => (spec.first == "vefslóð").then_some(None),
            TokenKind::SerialNumber => (spec.first == "vörunúmer").then_some(None),
            TokenKind::Telno => (spec.first == "símanúmer").then_some(None),
            TokenKind::Ssn => (spec.first == "kennitala").then_some(None),
            TokenKind::Molecule | TokenKind::Username | TokenKind::Unknown => None,
            TokenKind::ParagraphBegin | TokenKind::ParagraphEnd | TokenKind::SentenceEnd => {
                None
            }
        }
    }

    // -- word tokens -------------------------------------------------------

    fn match_word(&self, tok: &Tok, lower: &str, spec: &TerminalSpec) -> Option<Option<usize>> {
        let meanings = tok.meanings();
        match spec.literal {
            Some(LiteralKind::Strong) => {
                if spec.first.to_lowercase() != lower {
                    return None;
                }
                // The word-class qualifier, if present, picks the meaning;
                // the surface match alone decides whether it is a match
                if let Some(cat) = &spec.colon_cat {
                    return Some(meanings.iter().position(|m| kind_of(&m.class) == cat));
                }
                Some(None)
            }
            Some(LiteralKind::Lemma) => {
                for (ix, m) in meanings.iter().enumerate() {
                    if self.lemma_literal_matches(spec, m) {
                        return Some(Some(ix));
                    }
                }
                None
            }
            None => {
                for (ix, m) in meanings.iter().enumerate() {
                    if self.word_matches(tok, lower, spec, m) {
                        return Some(Some(ix));
                    }
                }
                // A proper-name reading does not require lexicon meanings
                if spec.first == "sérnafn" && meanings.is_empty() {
                    return self
                        .sernafn_matches_bare(tok, lower, spec)
                        .then_some(None);
                }
                None
            }
        }
    }

    fn word_matches(&self, tok: &Tok, lower: &str, spec: &TerminalSpec, m: &Meaning) -> bool {
        match spec.first.as_str() {
            "so" => self.matcher_so(spec, m),
            "no" => self.matcher_no(lower, spec, m),
            "lo" => self.matcher_lo(spec, m),
            "fs" => self.matcher_fs(lower, spec, m),
            "ao" => self.matcher_ao(spec, m),
            "eo" => self.matcher_eo(tok, lower, m),
            "abfn" => self.matcher_abfn(spec, m),
            "pfn" => self.matcher_pfn(spec, m),
            "stt" => m.class == "st" && matches!(m.lemma.as_str(), "sem" | "er"),
            "töl" => m.class == "töl",
            "person" => self.matcher_person_word(spec, m),
            "gata" => self.matcher_gata(spec, m),
            "sérnafn" => self.matcher_sernafn(tok, lower, spec, m),
            _ => self.matcher_default(spec, m),
        }
    }

    fn matcher_so(&self, spec: &TerminalSpec, m: &Meaning) -> bool {
        if m.class != "so" {
            return false;
        }
        if m.features == "-" {
            // Abbreviated verb: match all forms except the present participle
            return !spec.is_lh_nt();
        }
        // For unknown composite verbs, frame lookups use the last part only
        let verb = m.lemma.rsplit('-').next().unwrap_or(&m.lemma);
        self.verb_matches(verb, spec, &m.features)
    }

    fn verb_matches(&self, verb: &str, spec: &TerminalSpec, form: &str) -> bool {
        let s = self.settings;
        if spec.is_subj() {
            // Verb with an oblique subject: 'mig langar', 'Páli þykir'
            if spec.is_nh() && !form.contains("NH") {
                return false;
            }
            if spec.is_mm() {
                return form.contains("MM");
            }
            if spec.is_gm() && !form.contains("GM") {
                return false;
            }
            if spec.is_singular() && !form.contains("ET") {
                return false;
            }
            if spec.is_plural() && !form.contains("FT") {
                return false;
            }
            let form_lh = form.contains("LHÞT");
            if spec.is_lh() {
                return form_lh && s.verb_subject_matches(verb, "lhþt");
            }
            if form_lh {
                return false;
            }
            let form_sagnb = form.contains("SAGNB");
            if spec.has_variant("none") {
                if spec.is_sagnb() != form_sagnb {
                    return false;
                }
                return s.verb_subject_matches(verb, "none");
            }
            if form_sagnb && !spec.is_sagnb() {
                return false;
            }
            if spec.has_variant("op") && !form.contains("OP") {
                return false;
            }
            if spec.verb_arg_count() == Some(1) {
                // so_1_þf_subj_…: the single object case follows the count
                let key = format!("{verb}_{}", spec.variant(1));
                if !s.verbs.matches_arguments(&key) {
                    return false;
                }
            }
            // The subject case is always the last variant
            return spec
                .variant_last()
                .map(|v| s.verb_subject_matches(verb, v))
                .unwrap_or(false);
        }

        // Not a _subj terminal: strictly impersonal verbs never match
        if s.strictly_impersonal.contains(verb) {
            return false;
        }
        if spec.is_expl() && !form.contains("það") {
            return false;
        }
        if spec.is_singular() && form.contains("FT") {
            return false;
        }
        if spec.is_plural() && form.contains("ET") {
            return false;
        }
        for v in &spec.variants {
            if let Some(marker) = VERB_VARIANTS
                .contains(&v.as_str())
                .then(|| marker_of(v))
                .flatten()
            {
                if !form.contains(marker) {
                    return false;
                }
            }
        }
        // Refuse meanings carrying restrictive markers the terminal did
        // not ask for
        for (v, marker) in RESTRICTIVE_VARIANTS {
            if form.contains(marker) && !spec.has_variant(v) {
                return false;
            }
        }
        if spec.is_lh() && form.contains("VB") && !spec.has_variant("vb") {
            // Only strong past-participle declensions unless requested
            return false;
        }
        if spec.has_variant("bh") && form.contains("ST") {
            // Clipped imperative ambiguous with the infinitive
            return false;
        }
        let Some(_nargs) = spec.verb_arg_count() else {
            if spec.is_lh() {
                // lhþt may specify a case that is not an argument case
                for c in ["nf", "þf", "þgf", "ef"] {
                    if spec.has_variant(c) {
                        let marker = Case::from_variant(c).map(|cc| cc.feature()).unwrap();
                        if !form.contains(marker) {
                            return false;
                        }
                    }
                }
            }
            return true;
        };
        // Middle-voice forms resolve through the -st stem
        let frame_verb = if form.contains("MM") {
            mm_verb_stem(verb)
        } else {
            verb.to_string()
        };
        let key = format!("{frame_verb}{}", spec.verb_cases());
        if s.verbs.matches_arguments(&key) {
            return true;
        }
        // Unknown verbs are allowed to match zero-argument terminals
        spec.verb_cases().is_empty() && !s.verbs.known(&frame_verb)
    }

    fn matcher_no(&self, lower: &str, spec: &TerminalSpec, m: &Meaning) -> bool {
        if !m.is_noun() {
            return false;
        }
        let no_info = m.features == "-";
        if spec.is_abbrev() {
            return no_info;
        }
        if m.category == "nafn" || m.category == "ætt" {
            // Person and family names only match person terminals
            return false;
        }
        for v in &spec.variants {
            if matches!(v.as_str(), "kk" | "kvk" | "hk") {
                if m.class != *v {
                    return false;
                }
            } else if let Some(suffix) = v.strip_prefix('x').filter(|s| !s.is_empty()) {
                if vbit(v) == 0 && !m.lemma.ends_with(suffix) {
                    return false;
                }
            } else if let Some(suffix) = v.strip_prefix('z').filter(|s| !s.is_empty()) {
                if vbit(v) == 0 && !lower.ends_with(suffix) {
                    return false;
                }
            } else if no_info {
                // No inflection info (foreign word): match anything but
                // a demand for the attached article
                if v == "gr" {
                    return false;
                }
            } else if let Some(marker) = variant_marker(v) {
                if !m.features.contains(marker) {
                    return false;
                }
            }
        }
        true
    }

    fn matcher_lo(&self, spec: &TerminalSpec, m: &Meaning) -> bool {
        if m.class != "lo" {
            return false;
        }
        if spec.has_any_vbits(scases_mask()) {
            // The adjective must accept a subject in the given case
            let scase = if spec.has_variant("sþf") {
                "þf"
            } else if spec.has_variant("sþgf") {
                "þgf"
            } else {
                "ef"
            };
            let last = m.lemma.rsplit('-').next().unwrap_or(&m.lemma);
            let ok = self
                .settings
                .adjective_predicates
                .get(last)
                .map(|cs| cs.contains(scase))
                .unwrap_or(false);
            if !ok {
                return false;
            }
        }
        for suffix in &spec.form_endings {
            if !m.form.ends_with(suffix.as_str()) {
                return false;
            }
        }
        for suffix in &spec.lemma_endings {
            if !m.lemma.ends_with(suffix.as_str()) {
                return false;
            }
        }
        if m.features == "-" {
            // Abbreviated adjectives carry no declension info
            return true;
        }
        spec.fbits_match(feature_bits(&m.features))
    }

    fn matcher_fs(&self, lower: &str, spec: &TerminalSpec, m: &Meaning) -> bool {
        if spec.num_variants() == 0 {
            return false;
        }
        // Abbreviated prepositions ('skv.') carry the expansion as lemma
        let fs = if lower.contains('.') {
            m.lemma.as_str()
        } else {
            lower
        };
        let Some(entry) = self.settings.prepositions.get(fs) else {
            return false;
        };
        let var0 = spec.variant(0);
        if var0 == "nh" {
            return entry.nh;
        }
        if !entry.cases.contains(var0) {
            return false;
        }
        if entry.common && m.class != "fs" {
            return false;
        }
        true
    }

    fn matcher_ao(&self, spec: &TerminalSpec, m: &Meaning) -> bool {
        if m.class != "ao" {
            return false;
        }
        for suffix in &spec.form_endings {
            if !m.form.ends_with(suffix.as_str()) {
                return false;
            }
        }
        for suffix in &spec.lemma_endings {
            if !m.lemma.ends_with(suffix.as_str()) {
                return false;
            }
        }
        spec.fbits_match(feature_bits(&m.features))
    }

    fn matcher_eo(&self, tok: &Tok, lower: &str, m: &Meaning) -> bool {
        // An 'eo' is an adverb that cannot double as a preposition or
        // pronoun, and may therefore prefix a noun unambiguously
        if !m.class.ends_with("ao") {
            return false;
        }
        if NOT_EO.contains(&lower) {
            return false;
        }
        if NOT_NOT_EO.contains(&lower) {
            return true;
        }
        !(self.settings.prepositions.contains_key(lower)
            || tok.meanings().iter().any(|mm| mm.class == "fn"))
    }

    fn matcher_abfn(&self, spec: &TerminalSpec, m: &Meaning) -> bool {
        if m.class != "abfn" {
            return false;
        }
        // Case only; gender is not recorded for reflexive pronouns
        spec.fbits_match_mask(cases_mask(), feature_bits(&m.features))
    }

    fn matcher_pfn(&self, spec: &TerminalSpec, m: &Meaning) -> bool {
        if m.class != "pfn" {
            return false;
        }
        spec.fbits_match_mask(cases_mask() | number_mask(), feature_bits(&m.features))
    }

    fn matcher_person_word(&self, spec: &TerminalSpec, m: &Meaning) -> bool {
        if m.category == "ætt" {
            // Single family names are allowed
            return true;
        }
        if m.category != "nafn" {
            return false;
        }
        if spec.has_vbits(vbit("hk")) {
            return false;
        }
        if m.features != "-" {
            for c in Case::ALL {
                if m.features.contains(c.feature()) && !spec.has_variant(c.variant()) {
                    return false;
                }
            }
        }
        if spec.has_vbits(vbit("kk")) && m.class != "kk" {
            return false;
        }
        if spec.has_vbits(vbit("kvk")) && m.class != "kvk" {
            return false;
        }
        true
    }

    fn matcher_gata(&self, spec: &TerminalSpec, m: &Meaning) -> bool {
        // Street names; place names are allowed since they overlap
        if !matches!(m.category.as_str(), "göt" | "örn" | "bær" | "þor") {
            return false;
        }
        if kind_of(&m.class) != "no" {
            return false;
        }
        for v in &spec.variants {
            if matches!(v.as_str(), "kk" | "kvk" | "hk") {
                if m.class != *v {
                    return false;
                }
            } else if let Some(marker) = variant_marker(v) {
                if !m.features.contains(marker) {
                    return false;
                }
            }
        }
        true
    }

    fn matcher_sernafn(&self, tok: &Tok, lower: &str, spec: &TerminalSpec, m: &Meaning) -> bool {
        if !self.sernafn_allowed(tok, lower) {
            return false;
        }
        if spec.num_variants() == 0 {
            // Bare 'sérnafn' only for tokens without absolute lexicon
            // matches (compound meanings carry a hyphen in the lemma)
            return tok.meanings().is_empty() || tok.meanings()[0].lemma.contains('-');
        }
        // sérnafn_case: nouns or adjectives in the given case
        let case_bits = feature_bits(&m.features) & cases_mask();
        matches!(kind_of(&m.class), "no" | "lo") && spec.fbits_match_mask(cases_mask(), case_bits)
    }

    fn sernafn_matches_bare(&self, tok: &Tok, lower: &str, spec: &TerminalSpec) -> bool {
        self.sernafn_allowed(tok, lower) && spec.num_variants() == 0
    }

    fn sernafn_allowed(&self, tok: &Tok, lower: &str) -> bool {
        tok.is_upper() && !NOT_PROPER_NAME.contains(&lower) && !lower.contains(' ')
    }

    fn matcher_default(&self, spec: &TerminalSpec, m: &Meaning) -> bool {
        if spec.first != kind_of(&m.class) && spec.first != m.class {
            return false;
        }
        if m.features == "-" {
            if m.class == "lo" || m.class == "so" {
                // Abbreviations match irrespective of variants
                return true;
            }
            if m.is_noun() {
                // Gender is coded in the class; permit singular forms only
                let bits = vbit(&m.class) | vbit("et");
                return spec.fbits_match_mask(genders_mask() | number_mask(), bits);
            }
            return spec.fbits_match(0);
        }
        // Nouns carry their gender in the class; fold it into the features
        let mut bits = feature_bits(&m.features);
        if m.is_noun() {
            bits |= vbit(&m.class);
        }
        spec.fbits_match(bits)
    }

    fn lemma_literal_matches(&self, spec: &TerminalSpec, m: &Meaning) -> bool {
        if m.lemma.to_lowercase() != spec.first.to_lowercase() {
            return false;
        }
        if let Some(cat) = &spec.colon_cat {
            if kind_of(&m.class) != cat && &m.class != cat {
                return false;
            }
        }
        if m.features == "-" {
            return true;
        }
        let mut bits = feature_bits(&m.features);
        if m.is_noun() {
            bits |= vbit(&m.class);
        }
        if !spec.fbits_match(bits) {
            return false;
        }
        // Verb lemma literals refuse middle-voice meanings unless the
        // _mm variant is explicit ('hafa' must not match 'hafast')
        if spec.colon_cat.as_deref() == Some("so") && !spec.is_mm() {
            return !m.features.contains("MM");
        }
        true
    }

    // -- typed tokens ------------------------------------------------------

    fn match_person(&self, tok: &Tok, spec: &TerminalSpec) -> Option<Option<usize>> {
        let names = tok.person_names();
        if spec.first == "sérnafn" {
            if !tok.is_upper() || tok.text.contains(' ') || spec.num_variants() == 0 {
                return None;
            }
            let case = spec.variant(0);
            let ix = names
                .iter()
                .position(|pn| pn.case.map(|c| c.variant() == case).unwrap_or(false))?;
            return Some(Some(ix));
        }
        if spec.first != "person" {
            // Uppercase lemma literals may match person names
            if spec.is_uppercase_lemma() {
                let ix = names.iter().position(|pn| pn.name == spec.first)?;
                return Some(Some(ix));
            }
            return None;
        }
        if spec.num_variants() == 0 {
            return Some(names.first().map(|_| 0));
        }
        let case = spec.variant(0);
        let gender = (spec.num_variants() > 1).then(|| spec.variant(1));
        let ix = names.iter().position(|pn| {
            pn.case.map(|c| c.variant() == case).unwrap_or(false)
                && gender
                    .map(|g| pn.gender.map(|pg| pg.variant() == g).unwrap_or(false))
                    .unwrap_or(true)
        })?;
        Some(Some(ix))
    }

    fn match_punctuation(&self, tok: &Tok, spec: &TerminalSpec) -> Option<Option<usize>> {
        if spec.first == "grm" {
            return Some(None);
        }
        if spec.literal == Some(LiteralKind::Strong) && spec.first == tok.text {
            return Some(None);
        }
        None
    }

    fn match_number(&self, tok: &Tok, spec: &TerminalSpec) -> Option<Option<usize>> {
        let TokVal::Number {
            value,
            cases,
            genders,
        } = &tok.val
        else {
            return None;
        };
        match spec.first.as_str() {
            "tala" => self
                .singular_plural_ok(*value, spec)
                .then_some(None),
            "ártal" => {
                let digits = tok.text.len();
                let is_int = *value == value.trunc();
                (is_int && (3..=4).contains(&digits) && (874.0..=2199.0).contains(value))
                    .then_some(None)
            }
            "töl" | "to" => {
                if cases.is_empty() && genders.is_empty() {
                    // Without case/gender info the token only matches 'tala'
                    return None;
                }
                if !self.singular_plural_ok(*value, spec) {
                    return None;
                }
                if spec.first == "to" {
                    if cases.is_empty() || genders.is_empty() {
                        return None;
                    }
                    for g in [Gender::Masc, Gender::Fem, Gender::Neut] {
                        if spec.has_variant(g.variant()) && !genders.contains(&g) {
                            return None;
                        }
                    }
                }
                for c in Case::ALL {
                    if spec.has_variant(c.variant()) && !cases.is_empty() && !cases.contains(&c)
                    {
                        return None;
                    }
                }
                Some(None)
            }
            _ => None,
        }
    }

    /// Integers congruent to 1 mod 10 are singular in Icelandic, except
    /// those congruent to 11 mod 100.
    fn singular_plural_ok(&self, value: f64, spec: &TerminalSpec) -> bool {
        let singular = if value == value.trunc() {
            let i = (value.abs() as i64) % 100;
            i != 11 && i % 10 == 1
        } else {
            false
        };
        if spec.is_singular() && !singular {
            return false;
        }
        if spec.is_plural() && singular {
            return false;
        }
        true
    }

    fn match_amount(&self, tok: &Tok, spec: &TerminalSpec) -> Option<Option<usize>> {
        let TokVal::Amount {
            iso, cases, genders, ..
        } = &tok.val
        else {
            return None;
        };
        if spec.first == "amount" {
            if spec.num_variants() >= 1 && !spec.variant(0).eq_ignore_ascii_case(iso) {
                return None;
            }
            return Some(None);
        }
        self.noun_like_typed(spec, cases, genders)
    }

    fn match_currency(&self, tok: &Tok, spec: &TerminalSpec) -> Option<Option<usize>> {
        let TokVal::Currency { iso, cases, genders } = &tok.val else {
            return None;
        };
        if spec.first == "currency" {
            if spec.num_variants() >= 1 && !spec.variant(0).eq_ignore_ascii_case(iso) {
                return None;
            }
            if spec.num_variants() >= 2 {
                let c = Case::from_variant(spec.variant(1))?;
                if !cases.contains(&c) {
                    return None;
                }
            }
            return Some(None);
        }
        self.noun_like_typed(spec, cases, genders)
    }

    /// Currency and amount tokens can stand in for noun terminals, filtered
    /// by the token's allowed cases and genders.
    fn noun_like_typed(
        &self,
        spec: &TerminalSpec,
        cases: &[Case],
        genders: &[Gender],
    ) -> Option<Option<usize>> {
        if spec.first != "no" || spec.is_abbrev() {
            return None;
        }
        if !cases.is_empty() {
            for c in Case::ALL {
                if spec.has_variant(c.variant()) && !cases.contains(&c) {
                    return None;
                }
            }
        }
        if genders.is_empty() {
            // Match only the neutral gender when none is given
            if spec.has_any_vbits(vbit("kk") | vbit("kvk")) {
                return None;
            }
        } else {
            for g in [Gender::Masc, Gender::Fem, Gender::Neut] {
                if spec.has_variant(g.variant()) && !genders.contains(&g) {
                    return None;
                }
            }
        }
        Some(None)
    }
}

/// The middle-voice stem of a verb: formed by appending "st" to the
/// nominal form unless it already ends that way.
pub fn mm_verb_stem(verb: &str) -> String {
    if verb.ends_with("st") {
        verb.to_string()
    } else {
        format!("{verb}st")
    }
}

fn variant_marker(v: &str) -> Option<&'static str> {
    match v {
        "nf" => Some("NF"),
        "þf" => Some("ÞF"),
        "þgf" => Some("ÞGF"),
        "ef" => Some("EF"),
        "et" => Some("ET"),
        "ft" => Some("FT"),
        "gr" => Some("gr"),
        "mst" => Some("MST"),
        "est" => Some("EST"),
        "esb" => Some("ESB"),
        "evb" => Some("EVB"),
        "sb" => Some("SB"),
        "vb" => Some("VB"),
        other => marker_of(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Grammar;

    fn grammar_with(terminals: &[&str]) -> Grammar {
        let mut b = Grammar::builder();
        b = b.production("S0", terminals);
        b.build("S0").unwrap()
    }

    fn word(text: &str, rows: &[(&str, &str, &str, &str)]) -> Tok {
        Tok::word(
            text,
            rows.iter()
                .map(|(lemma, class, cat, features)| {
                    Meaning::new(lemma, 1, class, cat, text, features)
                })
                .collect(),
        )
    }

    #[test]
    fn noun_terminal_matching() {
        let g = grammar_with(&["no_et_nf_kvk", "no_et_þf_kvk", "no_ft_nf_kvk"]);
        let s = Settings::new();
        let m = Matcher::new(&g, &s);
        let lattice = m.build_lattice(&[word("sól", &[("sól", "kvk", "alm", "NFET")])]);
        let terms: Vec<usize> = lattice.at(0).iter().map(|e| e.terminal).collect();
        assert_eq!(terms, vec![0]); // nominative singular only
        assert_eq!(lattice.meaning_for(0, 0), Some(0));
    }

    #[test]
    fn verb_argument_frames() {
        let g = grammar_with(&["so_1_þf_et_p3", "so_2_þgf_þf_et_p3", "so_0_et_p3"]);
        let mut s = Settings::new();
        s.verbs.add_frame("sjá_þf");
        let m = Matcher::new(&g, &s);
        let lattice = m.build_lattice(&[word(
            "sá",
            &[("sjá", "so", "alm", "GM-FH-ÞT-3P-ET")],
        )]);
        let terms: Vec<usize> = lattice.at(0).iter().map(|e| e.terminal).collect();
        // One accusative argument is described; two are not. The verb is
        // known, so the zero-argument reading is excluded as well.
        assert_eq!(terms, vec![0]);
    }

    #[test]
    fn unknown_verbs_match_zero_argument_terminals() {
        let g = grammar_with(&["so_0_et_p3", "so_1_þf_et_p3"]);
        let s = Settings::new();
        let m = Matcher::new(&g, &s);
        let lattice = m.build_lattice(&[word(
            "veipaði",
            &[("veipa", "so", "alm", "GM-FH-ÞT-3P-ET")],
        )]);
        let terms: Vec<usize> = lattice.at(0).iter().map(|e| e.terminal).collect();
        assert_eq!(terms, vec![0]);
    }

    #[test]
    fn restrictive_variants_block_supine() {
        let g = grammar_with(&["so_et_p3", "so_sagnb"]);
        let s = Settings::new();
        let m = Matcher::new(&g, &s);
        let lattice = m.build_lattice(&[word("fjölgað", &[("fjölga", "so", "alm", "GM-SAGNB")])]);
        let terms: Vec<usize> = lattice.at(0).iter().map(|e| e.terminal).collect();
        assert_eq!(terms, vec![1]); // supine only matches so_sagnb
    }

    #[test]
    fn preposition_case_government() {
        let g = grammar_with(&["fs_þf", "fs_þgf", "fs_ef"]);
        let mut s = Settings::new();
        s.add_preposition("á", &["þf", "þgf"], false, false);
        let m = Matcher::new(&g, &s);
        let lattice = m.build_lattice(&[word("á", &[("á", "fs", "alm", "-")])]);
        let terms: Vec<usize> = lattice.at(0).iter().map(|e| e.terminal).collect();
        assert_eq!(terms, vec![0, 1]);
    }

    #[test]
    fn literal_terminals() {
        let g = grammar_with(&["\".\"", "'sjá:so'_et_p3", "\",\""]);
        let s = Settings::new();
        let m = Matcher::new(&g, &s);
        let lattice = m.build_lattice(&[
            Tok::punctuation("."),
            word("sá", &[("sjá", "so", "alm", "GM-FH-ÞT-3P-ET")]),
        ]);
        assert_eq!(lattice.at(0).len(), 1);
        assert_eq!(lattice.at(0)[0].terminal, 0);
        assert_eq!(lattice.at(1)[0].terminal, 1);
        assert_eq!(lattice.meaning_for(1, 1), Some(0));
    }

    #[test]
    fn lemma_literal_refuses_middle_voice() {
        let g = grammar_with(&["'hafa:so'_et_p3"]);
        let s = Settings::new();
        let m = Matcher::new(&g, &s);
        let lattice = m.build_lattice(&[word(
            "hafðist",
            &[("hafa", "so", "alm", "MM-FH-ÞT-3P-ET")],
        )]);
        assert!(lattice.at(0).is_empty());
    }

    #[test]
    fn person_token_case_and_gender() {
        let g = grammar_with(&["person_nf_kvk", "person_þf_kvk", "person_nf_kk"]);
        let s = Settings::new();
        let m = Matcher::new(&g, &s);
        let tok = Tok::person(
            "Ása",
            vec![crate::tokens::PersonName {
                name: "Ása".into(),
                gender: Some(Gender::Fem),
                case: Some(Case::Nom),
            }],
        );
        let lattice = m.build_lattice(&[tok]);
        let terms: Vec<usize> = lattice.at(0).iter().map(|e| e.terminal).collect();
        assert_eq!(terms, vec![0]);
    }

    #[test]
    fn number_singular_plural() {
        let g = grammar_with(&["tala_et", "tala_ft", "ártal"]);
        let s = Settings::new();
        let m = Matcher::new(&g, &s);
        let lattice = m.build_lattice(&[
            Tok::number("21", 21.0, vec![], vec![]),
            Tok::number("11", 11.0, vec![], vec![]),
            Tok::number("1984", 1984.0, vec![], vec![]),
        ]);
        let t0: Vec<usize> = lattice.at(0).iter().map(|e| e.terminal).collect();
        assert_eq!(t0, vec![0]); // 21 is singular
        let t1: Vec<usize> = lattice.at(1).iter().map(|e| e.terminal).collect();
        assert_eq!(t1, vec![1]); // 11 is plural
        let t2: Vec<usize> = lattice.at(2).iter().map(|e| e.terminal).collect();
        assert_eq!(t2, vec![1, 2]); // 1984: plural number, and a year
    }
}
