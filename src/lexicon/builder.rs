//! Minimal lexicon packer: builds the compressed blob format read by
//! [`super::blob::LexiconBlob`].
//!
//! The production lexicon is packed offline from the full inflectional
//! database; this builder implements the same binary format for tooling and
//! for tests that need small, self-contained lexicons. Entries are added one
//! inflected form at a time; stems and meanings are interned, the forms trie
//! is built as a radix tree with children sorted by Latin-1 byte order, and
//! per-stem case-variant sets are derived from the added entries.

use std::collections::{BTreeMap, HashMap};

use crate::error::LexiconError;
use crate::tokens::Case;

use super::blob::{latin1_encode, HEADER_SIZE, NO_VALUE, SIGNATURE};

const SINGLE_FLAG: u32 = 0x8000_0000;
const CHILDLESS_FLAG: u32 = 0x4000_0000;

#[derive(Default)]
struct TrieNode {
    fragment: Vec<u8>,
    value: Option<u32>,
    children: Vec<TrieNode>,
}

impl TrieNode {
    fn insert(&mut self, key: &[u8], value: u32) {
        if key.is_empty() {
            self.value = Some(value);
            return;
        }
        for i in 0..self.children.len() {
            let common = common_prefix(&self.children[i].fragment, key);
            if common == 0 {
                continue;
            }
            if common == self.children[i].fragment.len() {
                // Full child fragment consumed: descend
                self.children[i].insert(&key[common..], value);
                return;
            }
            // Split the child at the divergence point
            let child = &mut self.children[i];
            let tail = child.fragment.split_off(common);
            let grandchild = TrieNode {
                fragment: tail,
                value: child.value.take(),
                children: std::mem::take(&mut child.children),
            };
            child.children.push(grandchild);
            child.insert(&key[common..], value);
            child.children.sort_by(|a, b| a.fragment[0].cmp(&b.fragment[0]));
            return;
        }
        self.children.push(TrieNode {
            fragment: key.to_vec(),
            value: Some(value),
            children: Vec::new(),
        });
        self.children.sort_by(|a, b| a.fragment[0].cmp(&b.fragment[0]));
    }

    /// Serialized size of this node alone (children excluded), u32-aligned.
    fn node_size(&self) -> usize {
        let mut size = 4;
        if !self.children.is_empty() {
            size += 4 + 4 * self.children.len();
        }
        if self.fragment.len() != 1 {
            // Multi-character (or root) node: NUL-terminated fragment
            let flen = self.fragment.len() + 1;
            size += flen + (4 - flen % 4) % 4;
        }
        size
    }
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Builds a compressed lexicon blob in memory.
///
/// ```
/// use greinir::lexicon::LexiconBuilder;
///
/// let mut b = LexiconBuilder::new();
/// b.add("sól", "sól", 1, "kvk", "alm", "NFET");
/// b.add("sól", "sól", 1, "kvk", "alm", "ÞFET");
/// let blob = b.build().unwrap();
/// ```
pub struct LexiconBuilder {
    // form (Latin-1 bytes) -> list of (stem index, meaning index)
    forms: BTreeMap<Vec<u8>, Vec<(u32, u32)>>,
    stems: Vec<(String, i32)>,
    stem_index: HashMap<(String, i32), u32>,
    meanings: Vec<String>,
    meaning_index: HashMap<String, u32>,
    // (stem index, case) -> forms in insertion order
    case_forms: BTreeMap<(u32, u8), Vec<Vec<u8>>>,
}

impl LexiconBuilder {
    pub fn new() -> Self {
        LexiconBuilder {
            forms: BTreeMap::new(),
            stems: Vec::new(),
            stem_index: HashMap::new(),
            meanings: Vec::new(),
            meaning_index: HashMap::new(),
            case_forms: BTreeMap::new(),
        }
    }

    /// Add one inflected form with its meaning record. Characters outside
    /// Latin-1 in any field are rejected by ignoring the entry (the blob
    /// cannot hold them, exactly as in the production artifact).
    pub fn add(
        &mut self,
        form: &str,
        lemma: &str,
        word_id: i32,
        class: &str,
        category: &str,
        features: &str,
    ) {
        let Some(form_latin) = latin1_encode(form) else {
            return;
        };
        if form_latin.is_empty() || latin1_encode(lemma).is_none() {
            return;
        }
        if latin1_encode(class).is_none()
            || latin1_encode(category).is_none()
            || latin1_encode(features).is_none()
        {
            return;
        }
        let stem_key = (lemma.to_string(), word_id);
        let stem_ix = *self.stem_index.entry(stem_key.clone()).or_insert_with(|| {
            self.stems.push(stem_key);
            (self.stems.len() - 1) as u32
        });
        let meaning_text = format!("{class} {category} {features}");
        let meaning_ix = *self
            .meaning_index
            .entry(meaning_text.clone())
            .or_insert_with(|| {
                self.meanings.push(meaning_text);
                (self.meanings.len() - 1) as u32
            });
        let pairs = self.forms.entry(form_latin.clone()).or_default();
        if !pairs.contains(&(stem_ix, meaning_ix)) {
            pairs.push((stem_ix, meaning_ix));
        }
        // Derive the case-variant sets from the feature string. ÞGF before
        // ÞF: the latter is a substring of the former.
        let case = if features.contains("ÞGF") {
            Some(Case::Dat)
        } else if features.contains("ÞF") {
            Some(Case::Acc)
        } else if features.contains("NF") {
            Some(Case::Nom)
        } else if features.contains("EF") {
            Some(Case::Gen)
        } else {
            None
        };
        if let Some(c) = case {
            let list = self.case_forms.entry((stem_ix, c as u8)).or_default();
            if !list.contains(&form_latin) {
                list.push(form_latin);
            }
        }
    }

    /// Emit the blob.
    pub fn build(&self) -> Result<Vec<u8>, LexiconError> {
        // Alphabet: all distinct bytes used by forms, in byte order, so that
        // alphabet-index order coincides with Latin-1 byte order.
        let mut present = [false; 256];
        for form in self.forms.keys() {
            for &b in form {
                present[b as usize] = true;
            }
        }
        let alphabet: Vec<u8> = (0u16..256)
            .filter(|&b| present[b as usize])
            .map(|b| b as u8)
            .collect();
        let alpha_ix: HashMap<u8, u8> = alphabet
            .iter()
            .enumerate()
            .map(|(i, &b)| (b, i as u8))
            .collect();

        // Mappings table, and trie values pointing into it
        let mut mappings: Vec<u32> = Vec::new();
        let mut trie = TrieNode::default();
        for (form, pairs) in &self.forms {
            let first = mappings.len() as u32;
            if first >= NO_VALUE {
                return Err(LexiconError::MappingsOverflow {
                    size: mappings.len(),
                });
            }
            for (i, &(stem_ix, meaning_ix)) in pairs.iter().enumerate() {
                let mut v = (stem_ix << 11) | (meaning_ix & 0x07FF);
                if i == pairs.len() - 1 {
                    v |= 0x8000_0000;
                }
                mappings.push(v);
            }
            trie.insert(form, first);
        }

        // Lay out the trie: assign offsets depth-first
        let forms_size = Self::trie_size(&trie);

        // Meanings region: offset table + records
        let mut meaning_records: Vec<u8> = Vec::new();
        let mut meaning_offsets: Vec<u32> = Vec::new();
        for m in &self.meanings {
            meaning_offsets.push(meaning_records.len() as u32);
            meaning_records
                .extend_from_slice(&latin1_encode(m).expect("meanings are Latin-1"));
            meaning_records.push(0);
        }
        while meaning_records.len() % 4 != 0 {
            meaning_records.push(0);
        }

        // Case-variants region: per stem with any forms, four front-coded
        // sets based on the lemma
        let mut variants: Vec<u8> = Vec::new();
        let mut variant_offsets: HashMap<u32, u32> = HashMap::new();
        for (stem_ix, (lemma, _)) in self.stems.iter().enumerate() {
            let stem_ix = stem_ix as u32;
            let has_any = Case::ALL
                .iter()
                .any(|&c| self.case_forms.contains_key(&(stem_ix, c as u8)));
            if !has_any {
                continue;
            }
            variant_offsets.insert(stem_ix, variants.len() as u32);
            let base = latin1_encode(lemma).expect("lemmas are Latin-1");
            for c in Case::ALL {
                let empty = Vec::new();
                let forms = self
                    .case_forms
                    .get(&(stem_ix, c as u8))
                    .unwrap_or(&empty);
                Self::write_front_coded(&mut variants, &base, forms);
            }
        }
        while variants.len() % 4 != 0 {
            variants.push(0);
        }

        // Stems region: offset table + records
        let mut stem_records: Vec<u8> = Vec::new();
        let mut stem_offsets: Vec<u32> = Vec::new();
        for (stem_ix, (lemma, word_id)) in self.stems.iter().enumerate() {
            stem_offsets.push(stem_records.len() as u32);
            let mut wid = (word_id + 1) as u32 & 0x7FFF_FFFF;
            let var_off = variant_offsets.get(&(stem_ix as u32));
            if var_off.is_some() {
                wid |= 0x8000_0000;
            }
            stem_records.extend_from_slice(&wid.to_le_bytes());
            let lb = latin1_encode(lemma).expect("lemmas are Latin-1");
            stem_records.push(lb.len() as u8);
            stem_records.extend_from_slice(&lb);
            let mut skip = lb.len() + 1;
            while skip % 4 != 0 {
                stem_records.push(0);
                skip += 1;
            }
            stem_records.extend_from_slice(&var_off.copied().unwrap_or(0).to_le_bytes());
        }

        // Final layout: header, mappings, forms trie, stems, variants,
        // meanings, alphabet
        let mappings_offset = HEADER_SIZE as u32;
        let forms_offset = mappings_offset + (mappings.len() * 4) as u32;
        let stems_offset = forms_offset + forms_size as u32;
        let stems_table = (self.stems.len() * 4) as u32;
        let variants_offset = stems_offset + stems_table + stem_records.len() as u32;
        let meanings_offset = variants_offset + variants.len() as u32;
        let meanings_table = (self.meanings.len() * 4) as u32;
        let alphabet_offset = meanings_offset + meanings_table + meaning_records.len() as u32;

        let mut blob: Vec<u8> = Vec::new();
        blob.extend_from_slice(SIGNATURE);
        for o in [
            mappings_offset,
            forms_offset,
            stems_offset,
            variants_offset,
            meanings_offset,
            alphabet_offset,
        ] {
            blob.extend_from_slice(&o.to_le_bytes());
        }
        for v in &mappings {
            blob.extend_from_slice(&v.to_le_bytes());
        }
        debug_assert_eq!(blob.len(), forms_offset as usize);
        Self::write_trie(&mut blob, &trie, forms_offset as usize, &alpha_ix);
        debug_assert_eq!(blob.len(), stems_offset as usize);
        // Stem offsets are relative to the end of the offset table
        let stem_base = stems_offset + stems_table;
        for o in &stem_offsets {
            blob.extend_from_slice(&(stem_base + o).to_le_bytes());
        }
        blob.extend_from_slice(&stem_records);
        debug_assert_eq!(blob.len(), variants_offset as usize);
        blob.extend_from_slice(&variants);
        debug_assert_eq!(blob.len(), meanings_offset as usize);
        let meaning_base = meanings_offset + meanings_table;
        for o in &meaning_offsets {
            blob.extend_from_slice(&(meaning_base + o).to_le_bytes());
        }
        blob.extend_from_slice(&meaning_records);
        debug_assert_eq!(blob.len(), alphabet_offset as usize);
        blob.extend_from_slice(&(alphabet.len() as u32).to_le_bytes());
        blob.extend_from_slice(&alphabet);
        Ok(blob)
    }

    /// Front-code a string set against `base`: per string, the number of
    /// trailing characters to cut from the previous one, the suffix length,
    /// and the suffix; terminated with a 255 cut marker.
    fn write_front_coded(out: &mut Vec<u8>, base: &[u8], forms: &[Vec<u8>]) {
        let mut last: &[u8] = base;
        for w in forms {
            let common = common_prefix(last, w);
            out.push((last.len() - common) as u8);
            out.push((w.len() - common) as u8);
            out.extend_from_slice(&w[common..]);
            last = w;
        }
        out.push(255);
    }

    fn trie_size(node: &TrieNode) -> usize {
        node.node_size() + node.children.iter().map(Self::trie_size).sum::<usize>()
    }

    /// Serialize a trie node at the current end of `blob` (which must equal
    /// `offset`), then its children depth-first.
    fn write_trie(blob: &mut Vec<u8>, node: &TrieNode, offset: usize, alpha_ix: &HashMap<u8, u8>) {
        // Child offsets: laid out depth-first after this node
        let mut child_offsets = Vec::with_capacity(node.children.len());
        let mut next = offset + node.node_size();
        for ch in &node.children {
            child_offsets.push(next as u32);
            next += Self::trie_size(ch);
        }

        let mut hdr = node.value.unwrap_or(NO_VALUE) & NO_VALUE;
        if node.children.is_empty() {
            hdr |= CHILDLESS_FLAG;
        }
        if node.fragment.len() == 1 {
            let ix = *alpha_ix
                .get(&node.fragment[0])
                .expect("fragment bytes are in the alphabet");
            hdr |= SINGLE_FLAG | ((ix as u32 & 0x7F) << 23);
        }
        blob.extend_from_slice(&hdr.to_le_bytes());
        if !node.children.is_empty() {
            blob.extend_from_slice(&(node.children.len() as u32).to_le_bytes());
            for o in &child_offsets {
                blob.extend_from_slice(&o.to_le_bytes());
            }
        }
        if node.fragment.len() != 1 {
            blob.extend_from_slice(&node.fragment);
            blob.push(0);
            let mut flen = node.fragment.len() + 1;
            while flen % 4 != 0 {
                blob.push(0);
                flen += 1;
            }
        }
        for ch in &node.children {
            Self::write_trie(blob, ch, blob.len(), alpha_ix);
        }
    }
}

impl Default for LexiconBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::blob::LexiconBlob;

    fn mini() -> LexiconBlob {
        let mut b = LexiconBuilder::new();
        b.add("sól", "sól", 1, "kvk", "alm", "NFET");
        b.add("sól", "sól", 1, "kvk", "alm", "ÞFET");
        b.add("sólin", "sól", 1, "kvk", "alm", "NFETgr");
        b.add("sá", "sjá", 2, "so", "alm", "GM-FH-ÞT-3P-ET");
        b.add("sá", "sá", 3, "fn", "alm", "KK-NFET");
        b.add("sæng", "sæng", 4, "kvk", "alm", "NFET");
        LexiconBlob::from_bytes(b.build().unwrap()).unwrap()
    }

    #[test]
    fn round_trip_lookup() {
        let blob = mini();
        let pairs = blob.raw_lookup("sól");
        assert_eq!(pairs.len(), 2);
        let (lemma, wid) = blob.stem(pairs[0].0).unwrap();
        assert_eq!(lemma, "sól");
        assert_eq!(wid, 1);
        let (ordfl, fl, beyging) = blob.meaning(pairs[0].1).unwrap();
        assert_eq!((ordfl.as_str(), fl.as_str()), ("kvk", "alm"));
        assert!(beyging.contains("NF") || beyging.contains("ÞF"));
    }

    #[test]
    fn ambiguous_form_yields_all_meanings() {
        let blob = mini();
        let pairs = blob.raw_lookup("sá");
        assert_eq!(pairs.len(), 2);
        let classes: Vec<String> = pairs
            .iter()
            .map(|&(_, m)| blob.meaning(m).unwrap().0)
            .collect();
        assert!(classes.contains(&"so".to_string()));
        assert!(classes.contains(&"fn".to_string()));
    }

    #[test]
    fn interim_nodes_and_misses_return_empty() {
        let blob = mini();
        // "só" is a prefix shared by sól/sólin but not a form itself
        assert!(blob.raw_lookup("só").is_empty());
        assert!(blob.raw_lookup("tungl").is_empty());
        assert!(blob.raw_lookup("").is_empty());
        // Outside the Latin-1 alphabet entirely
        assert!(blob.raw_lookup("日本語").is_empty());
    }

    #[test]
    fn case_variants_decode() {
        let blob = mini();
        let pairs = blob.raw_lookup("sólin");
        let stem_ix = pairs[0].0;
        let nf = blob.case_variants(stem_ix, crate::tokens::Case::Nom);
        assert!(nf.contains(&"sól".to_string()));
        assert!(nf.contains(&"sólin".to_string()));
        let tf = blob.case_variants(stem_ix, crate::tokens::Case::Acc);
        assert_eq!(tf, vec!["sól".to_string()]);
    }

    #[test]
    fn non_latin1_entries_are_ignored() {
        let mut b = LexiconBuilder::new();
        b.add("日本", "日本", 1, "hk", "alm", "NFET");
        b.add("orð", "日本", 1, "hk", "alm", "NFET");
        b.add("orð", "orð", 1, "日本", "alm", "NFET");
        b.add("orð", "orð", 1, "hk", "日本", "NFET");
        b.add("orð", "orð", 1, "hk", "alm", "日本");
        // Only entries that are Latin-1 throughout survive
        b.add("orð", "orð", 1, "hk", "alm", "NFET");
        let blob = LexiconBlob::from_bytes(b.build().unwrap()).unwrap();
        let pairs = blob.raw_lookup("orð");
        assert_eq!(pairs.len(), 1);
        assert_eq!(blob.meaning(pairs[0].1).unwrap().2, "NFET");
        assert!(blob.raw_lookup("日本").is_empty());
    }

    #[test]
    fn fuzzed_bytes_never_panic() {
        let blob = mini();
        // Probe with every single byte and some longer garbage
        for b in 0u8..=255 {
            let s: String = (b as char).to_string();
            let _ = blob.raw_lookup(&s);
        }
        let _ = blob.raw_lookup("\u{fe}\u{fe}\u{fe}\u{fe}");
        let _ = blob.raw_lookup("sóóóóóóóóól");
    }
}
