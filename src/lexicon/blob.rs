//! Compressed lexicon blob: layout and raw lookup.
//!
//! The blob is a single read-only byte buffer with a fixed header and six
//! cross-referenced tables:
//!
//! ```text
//! 0..16    16-byte signature
//! 16..40   six little-endian u32 offsets:
//!          mappings, forms, stems, case variants, meanings, alphabet
//! ```
//!
//! *Alphabet*: u32 length followed by the byte-ordered Latin-1 alphabet.
//!
//! *Forms*: a radix trie of word forms. Each node starts with a u32 header:
//! bit 31 = single-character node (alphabet index in bits 23..30),
//! bit 30 = childless, bits 0..23 = value or the all-ones sentinel for
//! interim nodes. Nodes with children continue with a u32 child count and
//! that many absolute u32 child offsets, sorted by first character. A
//! multi-character node's NUL-terminated fragment follows the child array
//! (or the header, when childless).
//!
//! *Mappings*: u32 records; bits 11..31 = stem index, bits 0..11 = meaning
//! index, bit 31 = last-record marker. A trie value is an index into this
//! table; consecutive records up to the marker belong to the same form.
//!
//! *Stems*: a u32 offset table. Each stem record is a u32 word id (stored
//! +1 in the low 31 bits, bit 31 = has case variants), a length byte, the
//! Latin-1 lemma, padding to u32 alignment, and a u32 offset into the case
//! variants region.
//!
//! *Case variants*: per stem, four front-coded string sets in case order
//! (nf, þf, þgf, ef), sharing the lemma as the base string.
//!
//! *Meanings*: a u32 offset table; each record is a NUL-terminated Latin-1
//! string `ordfl fl beyging`.
//!
//! All reads are bounds-checked: a corrupt or adversarial buffer makes a
//! lookup come back empty, never read out of bounds.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::LexiconError;
use crate::tokens::Case;

/// Signature identifying a compatible blob, exactly 16 bytes.
pub const SIGNATURE: &[u8; 16] = b"greinir-lex 1.00";

/// Header size: signature plus six u32 table offsets.
pub const HEADER_SIZE: usize = 16 + 6 * 4;

/// The all-ones 23-bit value marking an interim trie node.
pub const NO_VALUE: u32 = 0x007F_FFFF;

const SINGLE_FLAG: u32 = 0x8000_0000;
const CHILDLESS_FLAG: u32 = 0x4000_0000;

/// Encode a string as Latin-1 bytes; `None` if any character is outside
/// the 256-symbol alphabet.
pub fn latin1_encode(s: &str) -> Option<Vec<u8>> {
    s.chars()
        .map(|c| {
            let cp = c as u32;
            if cp <= 0xFF {
                Some(cp as u8)
            } else {
                None
            }
        })
        .collect()
}

/// Decode Latin-1 bytes into a string. Total: every byte is a code point.
pub fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Mapped(m) => m,
            Backing::Owned(v) => v,
        }
    }
}

/// A loaded, validated lexicon blob. Immutable; lookups are pure functions
/// over the byte buffer and may run concurrently.
pub struct LexiconBlob {
    backing: Backing,
    mappings_offset: u32,
    forms_offset: u32,
    stems_offset: u32,
    variants_offset: u32,
    meanings_offset: u32,
    alphabet: Vec<u8>,
}

impl LexiconBlob {
    /// Memory-map and validate a blob file.
    pub fn open(path: &Path) -> Result<Self, LexiconError> {
        let file = File::open(path).map_err(|e| LexiconError::Io { source: e })?;
        // Safety: the file is opened read-only and the map is never written
        // through; concurrent external modification of the file is documented
        // as unsupported for lexicon artifacts.
        let mmap = unsafe {
            Mmap::map(&file).map_err(|e| LexiconError::Mmap {
                message: e.to_string(),
            })?
        };
        Self::from_backing(Backing::Mapped(mmap))
    }

    /// Validate a blob held in an owned buffer (used by tools and tests).
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, LexiconError> {
        Self::from_backing(Backing::Owned(bytes))
    }

    fn from_backing(backing: Backing) -> Result<Self, LexiconError> {
        let b = backing.bytes();
        if b.len() < HEADER_SIZE {
            return Err(LexiconError::Truncated {
                needed: HEADER_SIZE,
                actual: b.len(),
            });
        }
        if &b[..16] != SIGNATURE {
            return Err(LexiconError::BadSignature);
        }
        let off = |i: usize| -> u32 {
            let p = 16 + i * 4;
            u32::from_le_bytes([b[p], b[p + 1], b[p + 2], b[p + 3]])
        };
        let (mappings, forms, stems, variants, meanings, alphabet_off) =
            (off(0), off(1), off(2), off(3), off(4), off(5));
        for (name, o) in [
            ("mappings", mappings),
            ("forms", forms),
            ("stems", stems),
            ("case variants", variants),
            ("meanings", meanings),
            ("alphabet", alphabet_off),
        ] {
            if (o as usize) >= b.len() {
                return Err(LexiconError::BadOffset { table: name, offset: o });
            }
        }
        // The mappings region must be addressable by 23-bit trie values
        // without colliding with the interim-node sentinel.
        let mappings_len = forms.saturating_sub(mappings) as usize / 4;
        if mappings_len >= NO_VALUE as usize {
            return Err(LexiconError::MappingsOverflow { size: mappings_len });
        }
        let alen_pos = alphabet_off as usize;
        if alen_pos + 4 > b.len() {
            return Err(LexiconError::Truncated {
                needed: alen_pos + 4,
                actual: b.len(),
            });
        }
        let alen = u32::from_le_bytes([b[alen_pos], b[alen_pos + 1], b[alen_pos + 2], b[alen_pos + 3]])
            as usize;
        if alen_pos + 4 + alen > b.len() || alen > 256 {
            return Err(LexiconError::BadOffset {
                table: "alphabet",
                offset: alphabet_off,
            });
        }
        let alphabet = b[alen_pos + 4..alen_pos + 4 + alen].to_vec();
        Ok(LexiconBlob {
            backing,
            mappings_offset: mappings,
            forms_offset: forms,
            stems_offset: stems,
            variants_offset: variants,
            meanings_offset: meanings,
            alphabet,
        })
    }

    fn bytes(&self) -> &[u8] {
        self.backing.bytes()
    }

    fn u32_at(&self, offset: usize) -> Option<u32> {
        let b = self.bytes();
        let end = offset.checked_add(4)?;
        if end > b.len() {
            return None;
        }
        Some(u32::from_le_bytes([
            b[offset],
            b[offset + 1],
            b[offset + 2],
            b[offset + 3],
        ]))
    }

    fn byte_at(&self, offset: usize) -> Option<u8> {
        self.bytes().get(offset).copied()
    }

    /// Index of a byte within the alphabet.
    fn alphabet_index(&self, ch: u8) -> Option<u8> {
        self.alphabet.iter().position(|&a| a == ch).map(|i| i as u8)
    }

    // -- trie traversal ----------------------------------------------------

    /// Outcome of matching a lookup fragment against a trie node: the number
    /// of characters matched (> 0), or an ordering hint for binary search.
    fn node_matches(
        &self,
        node_offset: usize,
        hdr: u32,
        word: &[u8],
        encoded: &[u8],
        frag_index: usize,
    ) -> Option<i32> {
        if hdr & SINGLE_FLAG != 0 {
            // Single-character node: compare by alphabet index
            let chix = ((hdr >> 23) & 0x7F) as u8;
            let wix = *encoded.get(frag_index)?;
            return Some(if chix == wix {
                1
            } else if chix > wix {
                0
            } else {
                -1
            });
        }
        // Multi-character node: the fragment follows the child array
        let frag_start = if hdr & CHILDLESS_FLAG != 0 {
            node_offset + 4
        } else {
            let n = self.u32_at(node_offset + 4)? as usize;
            node_offset + 8 + 4 * n
        };
        let mut matched = 0usize;
        loop {
            let fb = self.byte_at(frag_start + matched)?;
            if fb == 0 {
                // Matched the entire fragment
                return Some(matched as i32);
            }
            match word.get(frag_index + matched) {
                None => return Some(0), // node longer, thus greater
                Some(&wb) => {
                    if fb != wb {
                        return Some(if fb > wb { 0 } else { -1 });
                    }
                }
            }
            matched += 1;
        }
    }

    /// Walk the trie for `word` (Latin-1 bytes), returning the mappings
    /// index stored at the exact-match node.
    fn trie_lookup(&self, word: &[u8], encoded: &[u8]) -> Option<u32> {
        let mut node_offset = self.forms_offset as usize;
        let mut hdr = self.u32_at(node_offset)?;
        let mut frag_index = 0usize;
        loop {
            if frag_index >= word.len() {
                // Arrived at the destination node
                let value = hdr & NO_VALUE;
                return if value == NO_VALUE { None } else { Some(value) };
            }
            if hdr & CHILDLESS_FLAG != 0 {
                return None;
            }
            let num_children = self.u32_at(node_offset + 4)? as usize;
            let child_array = node_offset + 8;
            let mut lo = 0usize;
            let mut hi = num_children;
            loop {
                if lo >= hi {
                    return None;
                }
                let mid = (lo + hi) / 2;
                let mid_offset = self.u32_at(child_array + mid * 4)? as usize;
                let mid_hdr = self.u32_at(mid_offset)?;
                let m = self.node_matches(mid_offset, mid_hdr, word, encoded, frag_index)?;
                if m > 0 {
                    node_offset = mid_offset;
                    hdr = mid_hdr;
                    frag_index += m as usize;
                    break;
                }
                if m < 0 {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
        }
    }

    /// Locate a word form in the trie, returning its mappings index.
    /// Words with characters outside the alphabet are simply absent.
    pub fn mapping(&self, word: &str) -> Option<u32> {
        let latin = latin1_encode(word)?;
        if latin.is_empty() {
            return None;
        }
        let encoded: Option<Vec<u8>> =
            latin.iter().map(|&b| self.alphabet_index(b)).collect();
        self.trie_lookup(&latin, &encoded?)
    }

    /// All (stem index, meaning index) pairs for a word form.
    pub fn raw_lookup(&self, word: &str) -> Vec<(u32, u32)> {
        let mut result = Vec::new();
        let Some(mut mapping) = self.mapping(word) else {
            return result;
        };
        loop {
            let Some(v) = self.u32_at(self.mappings_offset as usize + mapping as usize * 4)
            else {
                break;
            };
            let stem_ix = (v >> 11) & 0x000F_FFFF;
            let meaning_ix = v & 0x07FF;
            result.push((stem_ix, meaning_ix));
            if v & 0x8000_0000 != 0 {
                break; // Last mapping for this form
            }
            mapping += 1;
        }
        result
    }

    /// Decode a meaning record: (word class, category, feature string).
    pub fn meaning(&self, ix: u32) -> Option<(String, String, String)> {
        let off = self.u32_at(self.meanings_offset as usize + ix as usize * 4)? as usize;
        let b = self.bytes();
        let end = b[off..].iter().position(|&c| c == 0)? + off;
        let text = latin1_decode(&b[off..end]);
        let mut parts = text.splitn(3, ' ');
        let ordfl = parts.next()?.to_string();
        let fl = parts.next()?.to_string();
        let beyging = parts.next()?.to_string();
        Some((ordfl, fl, beyging))
    }

    /// Decode a stem record: (lemma, word id). A stored id of 0 means the
    /// source row had none, decoded as -1.
    pub fn stem(&self, ix: u32) -> Option<(String, i32)> {
        let off = self.u32_at(self.stems_offset as usize + ix as usize * 4)? as usize;
        let wid = self.u32_at(off)?;
        let word_id = (wid & 0x7FFF_FFFF) as i32 - 1;
        let lw = self.byte_at(off + 4)? as usize;
        let b = self.bytes();
        if off + 5 + lw > b.len() {
            return None;
        }
        Some((latin1_decode(&b[off + 5..off + 5 + lw]), word_id))
    }

    /// All word forms of the given stem in the given case, via the
    /// front-coded case-variants table. Empty if the stem carries none.
    pub fn case_variants(&self, stem_ix: u32, case: Case) -> Vec<String> {
        let Some(off) = self
            .u32_at(self.stems_offset as usize + stem_ix as usize * 4)
            .map(|o| o as usize)
        else {
            return Vec::new();
        };
        let Some(wid) = self.u32_at(off) else {
            return Vec::new();
        };
        if wid & 0x8000_0000 == 0 {
            // No case variants associated with this stem
            return Vec::new();
        }
        let Some(lw) = self.byte_at(off + 4).map(|l| l as usize) else {
            return Vec::new();
        };
        let b = self.bytes();
        if off + 5 + lw > b.len() {
            return Vec::new();
        }
        let stem_bytes = b[off + 5..off + 5 + lw].to_vec();
        // Skip past the length byte + lemma, padded to u32 alignment
        let mut skip = lw + 1;
        if skip % 4 != 0 {
            skip += 4 - skip % 4;
        }
        let Some(rel) = self.u32_at(off + 4 + skip) else {
            return Vec::new();
        };
        let mut p = self.variants_offset as usize + rel as usize;
        // The four sets are stored in case order; decode until ours
        for this_case in Case::ALL {
            let (set, next) = match self.read_front_coded(p, &stem_bytes) {
                Some(r) => r,
                None => return Vec::new(),
            };
            if this_case == case {
                return set.iter().map(|w| latin1_decode(w)).collect();
            }
            p = next;
        }
        Vec::new()
    }

    /// Decompress one front-coded string set starting at `p`, using `base`
    /// as the initial string. Returns the set and the next read position.
    fn read_front_coded(&self, mut p: usize, base: &[u8]) -> Option<(Vec<Vec<u8>>, usize)> {
        let mut last: Vec<u8> = base.to_vec();
        let mut out: Vec<Vec<u8>> = Vec::new();
        loop {
            let cut = self.byte_at(p)? as usize;
            p += 1;
            if cut == 255 {
                return Some((out, p));
            }
            if cut > last.len() {
                return None;
            }
            let common = last.len() - cut;
            let lw = self.byte_at(p)? as usize;
            p += 1;
            let b = self.bytes();
            if p + lw > b.len() {
                return None;
            }
            let mut w = last[..common].to_vec();
            w.extend_from_slice(&b[p..p + lw]);
            p += lw;
            out.push(w.clone());
            last = w;
        }
    }

    /// Length of the backing buffer in bytes.
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    /// The byte-ordered alphabet of the blob.
    pub fn alphabet(&self) -> &[u8] {
        &self.alphabet
    }
}

impl std::fmt::Debug for LexiconBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexiconBlob")
            .field("len", &self.len())
            .field("alphabet_len", &self.alphabet.len())
            .finish()
    }
}
