//! The compressed inflectional lexicon.
//!
//! A [`Lexicon`] memory-maps the packed blob once per process and serves
//! read-only lookups of inflected word forms, returning [`Meaning`] records
//! (lemma, word class, feature string). The blob layout and the trie
//! traversal live in [`blob`]; a format-compatible packer for tooling and
//! tests lives in [`builder`].
//!
//! The lexicon is shared behind an `Arc` across all parse jobs. Construction
//! and teardown are explicit: `Lexicon::open` maps the file, dropping the
//! value releases the mapping. There is no process-global instance and no
//! implicit re-initialization.

pub mod blob;
pub mod builder;

use std::path::{Path, PathBuf};

pub use blob::LexiconBlob;
pub use builder::LexiconBuilder;

use crate::error::LexiconError;
use crate::tokens::{Case, Meaning};

/// Read-only lexicon facade over the compressed blob.
pub struct Lexicon {
    blob: LexiconBlob,
    path: Option<PathBuf>,
}

impl Lexicon {
    /// Memory-map and validate a packed lexicon file.
    pub fn open(path: &Path) -> Result<Self, LexiconError> {
        let blob = LexiconBlob::open(path)?;
        tracing::info!(
            path = %path.display(),
            bytes = blob.len(),
            alphabet = blob.alphabet().len(),
            "lexicon mapped"
        );
        Ok(Lexicon {
            blob,
            path: Some(path.to_path_buf()),
        })
    }

    /// Wrap an in-memory blob (tools and tests).
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, LexiconError> {
        Ok(Lexicon {
            blob: LexiconBlob::from_bytes(bytes)?,
            path: None,
        })
    }

    /// The backing file, if the lexicon was opened from one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Release the memory mapping. Consuming the value makes the teardown
    /// explicit at the call site; there is no way to look anything up in a
    /// closed lexicon.
    pub fn close(self) {
        if let Some(path) = &self.path {
            tracing::info!(path = %path.display(), "lexicon unmapped");
        }
    }

    /// True if the trie contains the given word form.
    pub fn contains(&self, form: &str) -> bool {
        self.blob.mapping(form).is_some()
    }

    /// All meaning records for a word form, in blob order (the order is the
    /// meaning rank: earlier records are more frequent readings). Unknown
    /// forms yield an empty vector; lookups never fail.
    pub fn lookup(&self, form: &str) -> Vec<Meaning> {
        self.lookup_filtered(form, None, None, None, |_| true)
    }

    /// Lookup constrained by word class, lemma and/or word id, plus an
    /// arbitrary filter over the feature string.
    ///
    /// A class constraint of `"no"` accepts any of the three noun genders.
    pub fn lookup_filtered(
        &self,
        form: &str,
        class: Option<&str>,
        lemma: Option<&str>,
        word_id: Option<i32>,
        feature_filter: impl Fn(&str) -> bool,
    ) -> Vec<Meaning> {
        let mut result = Vec::new();
        for (stem_ix, meaning_ix) in self.blob.raw_lookup(form) {
            let Some((ordfl, fl, beyging)) = self.blob.meaning(meaning_ix) else {
                continue;
            };
            match class {
                Some("no") if !matches!(ordfl.as_str(), "kk" | "kvk" | "hk") => continue,
                Some(c) if c != "no" && c != ordfl => continue,
                _ => {}
            }
            let Some((stofn, utg)) = self.blob.stem(stem_ix) else {
                continue;
            };
            if let Some(l) = lemma {
                if l != stofn {
                    continue;
                }
            }
            if let Some(id) = word_id {
                if id != utg {
                    continue;
                }
            }
            if !feature_filter(&beyging) {
                continue;
            }
            result.push(Meaning {
                lemma: stofn,
                word_id: utg,
                class: ordfl,
                category: fl,
                form: form.to_string(),
                features: beyging,
            });
        }
        result
    }

    /// Meanings in the requested case derived from the stems of the given
    /// word form, matching the source form's feature string except for case
    /// (and optionally number and definiteness).
    ///
    /// `singular` forces singular results even for a plural input;
    /// `indefinite` strips the attached article and weak adjective
    /// declensions. This is the primitive behind the simplified tree's
    /// `nominative`, `indefinite` and `canonical` text queries.
    pub fn case_forms(
        &self,
        form: &str,
        case: Case,
        singular: bool,
        indefinite: bool,
        class: Option<&str>,
    ) -> Vec<Meaning> {
        let mut result: Vec<Meaning> = Vec::new();
        for (stem_ix, meaning_ix) in self.blob.raw_lookup(form) {
            let Some((ordfl, _fl, beyging)) = self.blob.meaning(meaning_ix) else {
                continue;
            };
            match class {
                Some("no") if !matches!(ordfl.as_str(), "kk" | "kvk" | "hk") => continue,
                Some(c) if c != "no" && c != ordfl => continue,
                _ => {}
            }
            let Some((stofn, utg)) = self.blob.stem(stem_ix) else {
                continue;
            };
            let wanted = simplify_features(&beyging, singular, indefinite);
            for candidate in self.blob.case_variants(stem_ix, case) {
                for m in self.lookup_filtered(
                    &candidate,
                    Some(&ordfl),
                    Some(&stofn),
                    Some(utg),
                    |b| {
                        if !b.contains(case.feature()) {
                            return false;
                        }
                        if singular && !b.contains("ET") {
                            return false;
                        }
                        if indefinite
                            && (b.contains("gr") || b.contains("FVB") || b.contains("EVB"))
                        {
                            return false;
                        }
                        simplify_features(b, singular, indefinite) == wanted
                    },
                ) {
                    if !result.contains(&m) {
                        result.push(m);
                    }
                }
            }
        }
        result
    }

    /// Nominative forms of the stems of the given word form.
    pub fn nominative(&self, form: &str, class: Option<&str>) -> Vec<Meaning> {
        self.case_forms(form, Case::Nom, false, false, class)
    }

    /// Indefinite nominative forms (no attached article, strong declension).
    pub fn indefinite(&self, form: &str, class: Option<&str>) -> Vec<Meaning> {
        self.case_forms(form, Case::Nom, false, true, class)
    }

    /// Singular indefinite nominative forms: the citation shape.
    pub fn canonical(&self, form: &str, class: Option<&str>) -> Vec<Meaning> {
        self.case_forms(form, Case::Nom, true, true, class)
    }
}

impl std::fmt::Debug for Lexicon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lexicon")
            .field("path", &self.path)
            .field("bytes", &self.blob.len())
            .finish()
    }
}

/// Remove case-related information (and optionally number and definiteness
/// markers) from a feature string, so that feature strings of different
/// inflections of the same reading compare equal.
fn simplify_features(features: &str, singular: bool, indefinite: bool) -> String {
    let mut s = features.to_string();
    // '2' and '3' mark alternate declension forms such as ÞGF2
    for marker in ["NF", "ÞF", "ÞGF", "EF", "2", "3"] {
        s = s.replace(marker, "");
    }
    if singular {
        for marker in ["ET", "FT"] {
            s = s.replace(marker, "");
        }
    }
    if indefinite {
        s = s.replace("gr", "");
        // Neutralize weak vs strong declension but keep the degree
        s = s.replace("EVB", "ESB").replace("FVB", "FSB");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mini() -> Lexicon {
        let mut b = LexiconBuilder::new();
        // A feminine noun with a full singular paradigm, with and without
        // the attached article
        b.add("poki", "poki", 10, "kk", "alm", "NFET");
        b.add("poka", "poki", 10, "kk", "alm", "ÞFET");
        b.add("poka", "poki", 10, "kk", "alm", "ÞGFET");
        b.add("pokar", "poki", 10, "kk", "alm", "NFFT");
        b.add("poka", "poki", 10, "kk", "alm", "ÞFFT");
        b.add("pokum", "poki", 10, "kk", "alm", "ÞGFFT");
        b.add("pokinn", "poki", 10, "kk", "alm", "NFETgr");
        b.add("hæna", "hæna", 11, "kvk", "alm", "NFET");
        b.add("hænan", "hæna", 11, "kvk", "alm", "NFETgr");
        b.add("hænu", "hæna", 11, "kvk", "alm", "ÞFET");
        Lexicon::from_bytes(b.build().unwrap()).unwrap()
    }

    #[test]
    fn lookup_is_deterministic() {
        let lex = mini();
        let a = lex.lookup("poka");
        let b = lex.lookup("poka");
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn filtered_lookup() {
        let lex = mini();
        let acc = lex.lookup_filtered("poka", Some("no"), None, None, |b| b.contains("ÞF"));
        assert_eq!(acc.len(), 2); // ÞFET and ÞFFT
        assert!(lex
            .lookup_filtered("poka", Some("so"), None, None, |_| true)
            .is_empty());
    }

    #[test]
    fn case_transfer_plural() {
        let lex = mini();
        // "pokar" (nom pl) -> dative plural "pokum"
        let dat = lex.case_forms("pokar", Case::Dat, false, false, Some("no"));
        assert_eq!(dat.len(), 1);
        assert_eq!(dat[0].form, "pokum");
    }

    #[test]
    fn indefinite_strips_article() {
        let lex = mini();
        // "hænan" (with article) -> indefinite nominative "hæna"
        let indef = lex.indefinite("hænan", Some("no"));
        assert_eq!(indef.len(), 1);
        assert_eq!(indef[0].form, "hæna");
    }

    #[test]
    fn canonical_forces_singular() {
        let lex = mini();
        let canon = lex.canonical("pokum", Some("no"));
        assert_eq!(canon.len(), 1);
        assert_eq!(canon[0].form, "poki");
    }
}
