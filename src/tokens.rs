//! Token records at the tokenizer boundary.
//!
//! The upstream tokenizer turns raw UTF-8 text into a stream of typed [`Tok`]
//! records; this module defines the shape of those records as the parser
//! consumes them. Tokens are immutable after construction. Word tokens carry
//! the candidate [`Meaning`] list already drawn from the lexicon; typed tokens
//! (numbers, dates, persons, …) carry their kind-specific payload instead.

use serde::{Deserialize, Serialize};

/// Grammatical case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Case {
    /// Nefnifall (nominative), variant `nf`.
    Nom,
    /// Þolfall (accusative), variant `þf`.
    Acc,
    /// Þágufall (dative), variant `þgf`.
    Dat,
    /// Eignarfall (genitive), variant `ef`.
    Gen,
}

impl Case {
    /// The variant name used in terminal descriptors.
    pub fn variant(self) -> &'static str {
        match self {
            Case::Nom => "nf",
            Case::Acc => "þf",
            Case::Dat => "þgf",
            Case::Gen => "ef",
        }
    }

    /// The marker used in lexicon feature strings.
    pub fn feature(self) -> &'static str {
        match self {
            Case::Nom => "NF",
            Case::Acc => "ÞF",
            Case::Dat => "ÞGF",
            Case::Gen => "EF",
        }
    }

    /// Parse a variant name (`nf`/`þf`/`þgf`/`ef`).
    pub fn from_variant(v: &str) -> Option<Case> {
        match v {
            "nf" => Some(Case::Nom),
            "þf" => Some(Case::Acc),
            "þgf" => Some(Case::Dat),
            "ef" => Some(Case::Gen),
            _ => None,
        }
    }

    /// All four cases in canonical order.
    pub const ALL: [Case; 4] = [Case::Nom, Case::Acc, Case::Dat, Case::Gen];
}

/// Grammatical gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    /// Karlkyn (masculine), variant `kk`.
    Masc,
    /// Kvenkyn (feminine), variant `kvk`.
    Fem,
    /// Hvorugkyn (neuter), variant `hk`.
    Neut,
}

impl Gender {
    pub fn variant(self) -> &'static str {
        match self {
            Gender::Masc => "kk",
            Gender::Fem => "kvk",
            Gender::Neut => "hk",
        }
    }

    pub fn from_variant(v: &str) -> Option<Gender> {
        match v {
            "kk" => Some(Gender::Masc),
            "kvk" => Some(Gender::Fem),
            "hk" => Some(Gender::Neut),
            _ => None,
        }
    }
}

/// A single lexicon meaning record for a word form.
///
/// Mirrors one row of the inflectional database: the lemma (`stofn`), its
/// numeric id, the word class (`ordfl`: `kk`/`kvk`/`hk` for nouns by gender,
/// `so`, `lo`, `ao`, `fs`, …), a semantic category (`fl`: `alm`, `ism`,
/// `örn`, …), the surface form this record belongs to, and the feature
/// string encoding case/number/person/tense/mood/voice/degree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Meaning {
    pub lemma: String,
    /// Lexicon word id, or -1 when the source row had none.
    pub word_id: i32,
    /// Word class (`ordfl`).
    pub class: String,
    /// Semantic category (`fl`).
    pub category: String,
    /// The inflected surface form.
    pub form: String,
    /// Feature string, e.g. `NFET`, `GM-FH-NT-3P-ET`, or `-` when absent.
    pub features: String,
}

impl Meaning {
    pub fn new(
        lemma: &str,
        word_id: i32,
        class: &str,
        category: &str,
        form: &str,
        features: &str,
    ) -> Self {
        Meaning {
            lemma: lemma.to_string(),
            word_id,
            class: class.to_string(),
            category: category.to_string(),
            form: form.to_string(),
            features: features.to_string(),
        }
    }

    /// True when the word class is one of the noun genders.
    pub fn is_noun(&self) -> bool {
        matches!(self.class.as_str(), "kk" | "kvk" | "hk")
    }
}

/// One candidate reading of a person-name token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    pub name: String,
    pub gender: Option<Gender>,
    pub case: Option<Case>,
}

/// Kind of a token, assigned by the upstream tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Word,
    Number,
    NumberWithLetter,
    Ordinal,
    Percent,
    Year,
    DateAbs,
    DateRel,
    Time,
    TimestampAbs,
    TimestampRel,
    Amount,
    Currency,
    Measurement,
    Person,
    Entity,
    Company,
    Domain,
    Hashtag,
    Email,
    Url,
    SerialNumber,
    Telno,
    Molecule,
    Username,
    Ssn,
    Punctuation,
    /// `[[` surrounded by whitespace: start of an explicitly marked paragraph.
    ParagraphBegin,
    /// `]]` surrounded by whitespace: end of an explicitly marked paragraph.
    ParagraphEnd,
    /// End of sentence, emitted by the tokenizer's sentence splitter.
    SentenceEnd,
    Unknown,
}

impl TokenKind {
    /// Descriptor used in dumps and the JSON form, mirroring the
    /// tokenizer's own naming.
    pub fn descr(self) -> &'static str {
        match self {
            TokenKind::Word => "WORD",
            TokenKind::Number => "NUMBER",
            TokenKind::NumberWithLetter => "NUMWLETTER",
            TokenKind::Ordinal => "ORDINAL",
            TokenKind::Percent => "PERCENT",
            TokenKind::Year => "YEAR",
            TokenKind::DateAbs => "DATEABS",
            TokenKind::DateRel => "DATEREL",
            TokenKind::Time => "TIME",
            TokenKind::TimestampAbs => "TIMESTAMPABS",
            TokenKind::TimestampRel => "TIMESTAMPREL",
            TokenKind::Amount => "AMOUNT",
            TokenKind::Currency => "CURRENCY",
            TokenKind::Measurement => "MEASUREMENT",
            TokenKind::Person => "PERSON",
            TokenKind::Entity => "ENTITY",
            TokenKind::Company => "COMPANY",
            TokenKind::Domain => "DOMAIN",
            TokenKind::Hashtag => "HASHTAG",
            TokenKind::Email => "EMAIL",
            TokenKind::Url => "URL",
            TokenKind::SerialNumber => "SERIALNUMBER",
            TokenKind::Telno => "TELNO",
            TokenKind::Molecule => "MOLECULE",
            TokenKind::Username => "USERNAME",
            TokenKind::Ssn => "SSN",
            TokenKind::Punctuation => "PUNCTUATION",
            TokenKind::ParagraphBegin => "P_BEGIN",
            TokenKind::ParagraphEnd => "P_END",
            TokenKind::SentenceEnd => "S_END",
            TokenKind::Unknown => "UNKNOWN",
        }
    }
}

/// Kind-specific token payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokVal {
    /// No auxiliary information.
    None,
    /// Candidate lexicon meanings of a word token (possibly empty for an
    /// unknown word).
    Word(Vec<Meaning>),
    /// Candidate readings of a person-name token.
    Person(Vec<PersonName>),
    /// A number with the cases and genders it can stand in.
    Number {
        value: f64,
        cases: Vec<Case>,
        genders: Vec<Gender>,
    },
    /// A monetary amount with ISO currency code.
    Amount {
        value: f64,
        iso: String,
        cases: Vec<Case>,
        genders: Vec<Gender>,
    },
    /// A currency name with ISO code.
    Currency {
        iso: String,
        cases: Vec<Case>,
        genders: Vec<Gender>,
    },
    /// A date: year, month, day; zero fields are unspecified (relative dates).
    Date { y: i32, m: u32, d: u32 },
    /// A time of day.
    Time { h: u32, m: u32, s: u32 },
    /// A timestamp; zero date fields are unspecified.
    Timestamp {
        y: i32,
        mo: u32,
        d: u32,
        h: u32,
        mi: u32,
        s: u32,
    },
    /// A year number.
    Year(i32),
    /// An ordinal number.
    Ordinal(i64),
    /// A percentage value.
    Percent(f64),
}

/// A token produced by the upstream tokenizer. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tok {
    pub kind: TokenKind,
    /// The original surface text (for punctuation, the normalized form).
    pub text: String,
    pub val: TokVal,
}

impl Tok {
    pub fn new(kind: TokenKind, text: &str, val: TokVal) -> Self {
        Tok {
            kind,
            text: text.to_string(),
            val,
        }
    }

    /// A word token with its candidate meanings.
    pub fn word(text: &str, meanings: Vec<Meaning>) -> Self {
        Tok::new(TokenKind::Word, text, TokVal::Word(meanings))
    }

    /// A punctuation token.
    pub fn punctuation(text: &str) -> Self {
        Tok::new(TokenKind::Punctuation, text, TokVal::None)
    }

    /// A person-name token with its candidate readings.
    pub fn person(text: &str, names: Vec<PersonName>) -> Self {
        Tok::new(TokenKind::Person, text, TokVal::Person(names))
    }

    /// A plain number token.
    pub fn number(text: &str, value: f64, cases: Vec<Case>, genders: Vec<Gender>) -> Self {
        Tok::new(
            TokenKind::Number,
            text,
            TokVal::Number {
                value,
                cases,
                genders,
            },
        )
    }

    /// The candidate meanings of a word token; empty for other kinds.
    pub fn meanings(&self) -> &[Meaning] {
        match &self.val {
            TokVal::Word(m) => m,
            _ => &[],
        }
    }

    /// The candidate person-name readings; empty for other kinds.
    pub fn person_names(&self) -> &[PersonName] {
        match &self.val {
            TokVal::Person(p) => p,
            _ => &[],
        }
    }

    /// True if the token starts with an uppercase letter.
    pub fn is_upper(&self) -> bool {
        self.text
            .chars()
            .next()
            .map(|c| c.is_uppercase())
            .unwrap_or(false)
    }
}
