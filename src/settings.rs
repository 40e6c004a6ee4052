//! Scoring and matching configuration tables.
//!
//! The terminal matcher and the forest reducer are parameterized by a set of
//! tables: prepositions and the cases they govern, verb argument frames with
//! optional score adjustments, verb/preposition affinities, verb subject
//! cases, adjective predicate cases, static and ambiguous phrases, noun
//! gender preferences and terminal preference orderings. [`Settings`] is an
//! explicit value passed into the pipeline — there is no global state.
//!
//! Tables load from tabular text files: one entry per line, columns
//! separated by whitespace, `#` starting a comment, sections introduced by
//! `[section]` headers. Everything can equally be populated
//! programmatically, which is what the tests do.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::SettingsError;

/// A preposition entry: the cases it governs and its flags.
#[derive(Debug, Clone, Default)]
pub struct PrepEntry {
    /// Case variants (`nf`/`þf`/`þgf`/`ef`) this preposition can govern.
    pub cases: HashSet<String>,
    /// Can govern an infinitive phrase (`til að …`).
    pub nh: bool,
    /// A common, 'plain' preposition: the lexicon reading must agree.
    pub common: bool,
}

/// One terminal preference row: terminals in `worse` are discouraged in
/// favor of terminals in `better`, scaled by `factor`.
#[derive(Debug, Clone)]
pub struct TerminalPref {
    pub worse: HashSet<String>,
    pub better: HashSet<String>,
    pub factor: i64,
}

/// Verb argument frames and affinities.
#[derive(Debug, Clone, Default)]
pub struct VerbFrames {
    /// Verb + argument cases keys, e.g. `greiða_þgf_þf`, `sjá_þf`, `fjölga`.
    frames: HashSet<String>,
    /// All verbs that have any frame at all.
    known: HashSet<String>,
    /// Score adjustments per frame key ($score pragmas).
    scores: HashMap<String, i64>,
    /// (verb-with-cases, preposition-with-case) affinity pairs.
    prepositions: HashSet<(String, String)>,
}

impl VerbFrames {
    /// Register a frame key such as `greiða_þgf_þf`.
    pub fn add_frame(&mut self, key: &str) {
        let verb = key.split('_').next().unwrap_or(key);
        self.known.insert(verb.to_string());
        self.frames.insert(key.to_string());
    }

    pub fn add_score(&mut self, key: &str, score: i64) {
        self.add_frame(key);
        self.scores.insert(key.to_string(), score);
    }

    pub fn add_preposition(&mut self, verb_with_cases: &str, prep_with_case: &str) {
        self.prepositions
            .insert((verb_with_cases.to_string(), prep_with_case.to_string()));
    }

    /// Whether the verb + argument case combination is described.
    pub fn matches_arguments(&self, key: &str) -> bool {
        self.frames.contains(key)
    }

    /// Whether the verb appears in the table at all.
    pub fn known(&self, verb: &str) -> bool {
        self.known.contains(verb)
    }

    /// Score adjustment for a frame key, if any.
    pub fn score(&self, key: &str) -> Option<i64> {
        self.scores.get(key).copied()
    }

    /// Whether the verb (with its argument cases) clicks with the given
    /// preposition (with its case).
    pub fn matches_preposition(&self, verb_with_cases: &str, prep_with_case: &str) -> bool {
        self.prepositions
            .contains(&(verb_with_cases.to_string(), prep_with_case.to_string()))
    }
}

/// Scalar score weights. The exact numbers are implementation-tuned;
/// only the orderings they induce are contractual.
#[derive(Debug, Clone)]
pub struct ScoreWeights {
    /// Bonus for a preposition matching an enclosing verb.
    pub verb_prep_bonus: i64,
    /// Penalty for a preposition not matching any enclosing verb.
    pub verb_prep_penalty: i64,
    /// Per-token multiplier for `apply_length_bonus` nonterminals.
    pub length_bonus_factor: i64,
    /// Multiplier applied to production priorities when a family of
    /// children starts scoring.
    pub priority_factor: i64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            verb_prep_bonus: 7,
            verb_prep_penalty: -2,
            length_bonus_factor: 10,
            priority_factor: -10,
        }
    }
}

/// The full configuration value consumed by the matcher and the reducer.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub prepositions: HashMap<String, PrepEntry>,
    pub verbs: VerbFrames,
    /// Verb → allowed oblique subject cases (plus `lhþt`/`none` markers).
    pub verb_subjects: HashMap<String, HashSet<String>>,
    /// Verbs that never take a nominative subject.
    pub strictly_impersonal: HashSet<String>,
    /// Adjective lemma → subject cases it accepts (`samþykkur Páli`).
    pub adjective_predicates: HashMap<String, HashSet<String>>,
    /// Fixed phrases → score bonus; idioms outweigh their decompositions.
    pub static_phrases: HashMap<String, i64>,
    /// Phrases whose word-by-word readings are restricted to the listed
    /// word-class sequences.
    pub ambiguous_phrases: Vec<(Vec<String>, Vec<String>)>,
    /// Word → gender → score, discriminating same-form stems.
    pub noun_preferences: HashMap<String, HashMap<String, i64>>,
    /// Word → preference orderings between terminal categories.
    pub terminal_preferences: HashMap<String, Vec<TerminalPref>>,
    pub weights: ScoreWeights,
}

impl Settings {
    pub fn new() -> Self {
        Settings::default()
    }

    // -- programmatic construction ----------------------------------------

    pub fn add_preposition(&mut self, prep: &str, cases: &[&str], nh: bool, common: bool) {
        let e = self.prepositions.entry(prep.to_string()).or_default();
        e.cases.extend(cases.iter().map(|c| c.to_string()));
        e.nh |= nh;
        e.common |= common;
    }

    pub fn add_verb_subject(&mut self, verb: &str, subject: &str) {
        self.verb_subjects
            .entry(verb.to_string())
            .or_default()
            .insert(subject.to_string());
    }

    pub fn add_adjective_predicate(&mut self, adjective: &str, case: &str) {
        self.adjective_predicates
            .entry(adjective.to_string())
            .or_default()
            .insert(case.to_string());
    }

    pub fn add_noun_preference(&mut self, word: &str, gender: &str, score: i64) {
        self.noun_preferences
            .entry(word.to_string())
            .or_default()
            .insert(gender.to_string(), score);
    }

    pub fn add_terminal_preference(
        &mut self,
        word: &str,
        worse: &[&str],
        better: &[&str],
        factor: i64,
    ) {
        self.terminal_preferences
            .entry(word.to_string())
            .or_default()
            .push(TerminalPref {
                worse: worse.iter().map(|s| s.to_string()).collect(),
                better: better.iter().map(|s| s.to_string()).collect(),
                factor,
            });
    }

    /// Whether a verb is allowed the given oblique subject.
    pub fn verb_subject_matches(&self, verb: &str, subject: &str) -> bool {
        self.verb_subjects
            .get(verb)
            .map(|s| s.contains(subject))
            .unwrap_or(false)
    }

    // -- file loading ------------------------------------------------------

    /// Load settings from a tabular configuration file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path).map_err(|e| SettingsError::Io { source: e })?;
        let mut s = Settings::new();
        s.read(&text)?;
        Ok(s)
    }

    /// Parse configuration text into this value (sections accumulate).
    pub fn read(&mut self, text: &str) -> Result<(), SettingsError> {
        let mut section = String::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = match raw.find('#') {
                Some(ix) => &raw[..ix],
                None => raw,
            }
            .trim();
            if line.is_empty() {
                continue;
            }
            let lineno = lineno + 1;
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].to_string();
                continue;
            }
            let cols: Vec<&str> = line.split_whitespace().collect();
            match section.as_str() {
                "prepositions" => {
                    // prep case... [nh]
                    let prep = cols[0];
                    let nh = cols[1..].contains(&"nh");
                    let common = cols[1..].contains(&"common");
                    let cases: Vec<&str> = cols[1..]
                        .iter()
                        .copied()
                        .filter(|c| matches!(*c, "nf" | "þf" | "þgf" | "ef"))
                        .collect();
                    self.add_preposition(prep, &cases, nh, common);
                }
                "verbs" => {
                    // verb [case [case]] [score]
                    let mut key = cols[0].to_string();
                    let mut score: Option<i64> = None;
                    for c in &cols[1..] {
                        if matches!(*c, "nf" | "þf" | "þgf" | "ef") {
                            key.push('_');
                            key.push_str(c);
                        } else if let Ok(n) = c.parse::<i64>() {
                            score = Some(n);
                        } else {
                            return Err(SettingsError::Syntax {
                                line: lineno,
                                message: format!("unexpected column {c:?} in [verbs]"),
                            });
                        }
                    }
                    match score {
                        Some(n) => self.verbs.add_score(&key, n),
                        None => self.verbs.add_frame(&key),
                    }
                }
                "verb_prepositions" => {
                    // verb_with_cases prep_with_case
                    if cols.len() != 2 {
                        return Err(SettingsError::Syntax {
                            line: lineno,
                            message: "expected: verb_with_cases prep_with_case".into(),
                        });
                    }
                    self.verbs.add_preposition(cols[0], cols[1]);
                }
                "verb_subjects" => {
                    let strict = cols[1..].contains(&"strict");
                    for c in &cols[1..] {
                        if *c != "strict" {
                            self.add_verb_subject(cols[0], c);
                        }
                    }
                    if strict {
                        self.strictly_impersonal.insert(cols[0].to_string());
                    }
                }
                "adjective_predicates" => {
                    for c in &cols[1..] {
                        self.add_adjective_predicate(cols[0], c);
                    }
                }
                "static_phrases" => {
                    // "phrase text" score
                    let (phrase, rest) = parse_quoted(line).ok_or(SettingsError::Syntax {
                        line: lineno,
                        message: "expected a quoted phrase".into(),
                    })?;
                    let score = rest.trim().parse::<i64>().unwrap_or(0);
                    self.static_phrases.insert(phrase, score);
                }
                "ambiguous_phrases" => {
                    // "word word ..." cat cat ...
                    let (phrase, rest) = parse_quoted(line).ok_or(SettingsError::Syntax {
                        line: lineno,
                        message: "expected a quoted phrase".into(),
                    })?;
                    let words: Vec<String> =
                        phrase.split_whitespace().map(|w| w.to_string()).collect();
                    let cats: Vec<String> =
                        rest.split_whitespace().map(|c| c.to_string()).collect();
                    if words.len() != cats.len() {
                        return Err(SettingsError::Syntax {
                            line: lineno,
                            message: "word and category counts differ".into(),
                        });
                    }
                    self.ambiguous_phrases.push((words, cats));
                }
                "noun_preferences" => {
                    // word gender score
                    if cols.len() != 3 {
                        return Err(SettingsError::Syntax {
                            line: lineno,
                            message: "expected: word gender score".into(),
                        });
                    }
                    let score = cols[2].parse::<i64>().map_err(|_| SettingsError::Syntax {
                        line: lineno,
                        message: format!("bad score {:?}", cols[2]),
                    })?;
                    self.add_noun_preference(cols[0], cols[1], score);
                }
                "terminal_preferences" => {
                    // word worse<cat,cat> better<cat,cat> factor
                    if cols.len() != 4 {
                        return Err(SettingsError::Syntax {
                            line: lineno,
                            message: "expected: word worse better factor".into(),
                        });
                    }
                    let worse: Vec<&str> = cols[1].split(',').collect();
                    let better: Vec<&str> = cols[2].split(',').collect();
                    let factor = cols[3].parse::<i64>().map_err(|_| SettingsError::Syntax {
                        line: lineno,
                        message: format!("bad factor {:?}", cols[3]),
                    })?;
                    self.add_terminal_preference(cols[0], &worse, &better, factor);
                }
                "" => {
                    return Err(SettingsError::Syntax {
                        line: lineno,
                        message: "entry before any [section] header".into(),
                    })
                }
                other => {
                    return Err(SettingsError::UnknownSection {
                        section: other.to_string(),
                        line: lineno,
                    })
                }
            }
        }
        Ok(())
    }
}

/// Split a line of the form `"quoted text" rest` into its parts.
fn parse_quoted(line: &str) -> Option<(String, &str)> {
    let rest = line.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some((rest[..end].to_string(), &rest[end + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sections() {
        let mut s = Settings::new();
        s.read(
            r#"
# test configuration
[prepositions]
á þf þgf common
til ef nh

[verbs]
greiða þgf þf
fjölga
dreyma þf 2

[verb_prepositions]
greiða_þgf_þf á_þf

[verb_subjects]
fjölga þgf strict

[adjective_predicates]
samþykkur þgf

[noun_preferences]
ára kvk -2

[terminal_preferences]
sem stt,fs st 2
"#,
        )
        .unwrap();
        assert!(s.prepositions["á"].cases.contains("þgf"));
        assert!(s.prepositions["á"].common);
        assert!(s.prepositions["til"].nh);
        assert!(s.verbs.matches_arguments("greiða_þgf_þf"));
        assert!(s.verbs.known("fjölga"));
        assert!(!s.verbs.matches_arguments("greiða_þf"));
        assert_eq!(s.verbs.score("dreyma_þf"), Some(2));
        assert!(s.verbs.matches_preposition("greiða_þgf_þf", "á_þf"));
        assert!(s.verb_subject_matches("fjölga", "þgf"));
        assert!(s.strictly_impersonal.contains("fjölga"));
        assert!(s.adjective_predicates["samþykkur"].contains("þgf"));
        assert_eq!(s.noun_preferences["ára"]["kvk"], -2);
        assert_eq!(s.terminal_preferences["sem"].len(), 1);
    }

    #[test]
    fn unknown_section_is_an_error() {
        let mut s = Settings::new();
        let err = s.read("[nonsense]\nfoo bar\n").unwrap_err();
        assert!(matches!(err, SettingsError::UnknownSection { .. }));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let mut s = Settings::new();
        s.read("\n# only a comment\n\n[verbs]\nsjá þf # trailing\n")
            .unwrap();
        assert!(s.verbs.matches_arguments("sjá_þf"));
    }
}
