//! Rich diagnostic error types for the greinir parsing pipeline.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains. Note that a failed parse
//! is *not* an error: it is an ordinary value (see [`crate::job::ParseFailure`]).
//! Only unrecoverable conditions — a corrupt lexicon blob, a malformed grammar,
//! a held compilation lock — surface through these types.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the greinir pipeline.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum GreinirError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lexicon(#[from] LexiconError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Lock(#[from] LockError),
}

/// Convenience alias used throughout the crate.
pub type GreinirResult<T> = std::result::Result<T, GreinirError>;

// ---------------------------------------------------------------------------
// Lexicon errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LexiconError {
    #[error("I/O error while opening lexicon: {source}")]
    #[diagnostic(
        code(greinir::lexicon::io),
        help(
            "Check that the compressed lexicon file exists, is readable, \
             and that the path passed to Lexicon::open() is correct."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("invalid lexicon signature")]
    #[diagnostic(
        code(greinir::lexicon::signature),
        help(
            "The file does not start with the expected 16-byte signature. \
             It is either not a compressed lexicon or was built by an \
             incompatible packer version."
        )
    )]
    BadSignature,

    #[error("lexicon blob truncated: need at least {needed} bytes, have {actual}")]
    #[diagnostic(
        code(greinir::lexicon::truncated),
        help("The file is shorter than its header demands; re-fetch or rebuild it.")
    )]
    Truncated { needed: usize, actual: usize },

    #[error("lexicon table offset out of bounds: {table} at {offset:#x}")]
    #[diagnostic(
        code(greinir::lexicon::offset),
        help(
            "A table offset in the header points outside the file. \
             The blob is corrupt and must be rebuilt."
        )
    )]
    BadOffset { table: &'static str, offset: u32 },

    #[error("mappings table too large for 23-bit trie values ({size} bytes)")]
    #[diagnostic(
        code(greinir::lexicon::mappings_overflow),
        help(
            "Trie node values are 23-bit offsets into the mappings table, with \
             the all-ones pattern reserved as the no-value sentinel. A mappings \
             table this large cannot be addressed unambiguously."
        )
    )]
    MappingsOverflow { size: usize },

    #[error("memory map error: {message}")]
    #[diagnostic(
        code(greinir::lexicon::mmap),
        help("Failed to memory-map the lexicon file. Check available virtual memory.")
    )]
    Mmap { message: String },
}

// ---------------------------------------------------------------------------
// Grammar errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GrammarError {
    #[error("grammar has no productions")]
    #[diagnostic(
        code(greinir::grammar::empty),
        help("At least one production for the root nonterminal is required.")
    )]
    Empty,

    #[error("root nonterminal {name:?} is not defined")]
    #[diagnostic(
        code(greinir::grammar::unknown_root),
        help("The root must appear on the left-hand side of at least one production.")
    )]
    UnknownRoot { name: String },

    #[error("nonterminal {name:?} has no productions")]
    #[diagnostic(
        code(greinir::grammar::undefined_nonterminal),
        help(
            "Every nonterminal referenced on a right-hand side must also \
             appear on a left-hand side. Add productions for it or remove \
             the reference."
        )
    )]
    UndefinedNonterminal { name: String },

    #[error("malformed terminal name {name:?}: {reason}")]
    #[diagnostic(
        code(greinir::grammar::bad_terminal),
        help(
            "Terminal names are a category followed by underscore-separated \
             variants from the closed variant vocabulary, or a quoted literal."
        )
    )]
    BadTerminal { name: String, reason: String },

    #[error("failed to read grammar cache: {message}")]
    #[diagnostic(
        code(greinir::grammar::cache),
        help(
            "The binary grammar cache is unreadable or was written by an \
             incompatible version. Delete the cache file; it will be rebuilt."
        )
    )]
    BadCache { message: String },

    #[error("I/O error on grammar cache: {source}")]
    #[diagnostic(
        code(greinir::grammar::cache_io),
        help("Check permissions on the cache directory.")
    )]
    CacheIo {
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Settings errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SettingsError {
    #[error("I/O error reading configuration: {source}")]
    #[diagnostic(
        code(greinir::settings::io),
        help("Check that the configuration file exists and is readable.")
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("syntax error in configuration, line {line}: {message}")]
    #[diagnostic(
        code(greinir::settings::syntax),
        help(
            "Configuration files are tabular: one entry per line, columns \
             separated by whitespace, comments starting with '#', sections \
             introduced by [section] headers."
        )
    )]
    Syntax { line: usize, message: String },

    #[error("unknown configuration section [{section}], line {line}")]
    #[diagnostic(
        code(greinir::settings::section),
        help("See the Settings documentation for the list of valid sections.")
    )]
    UnknownSection { section: String, line: usize },
}

// ---------------------------------------------------------------------------
// Lock errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LockError {
    #[error("lock {name:?} is held by another process")]
    #[diagnostic(
        code(greinir::lock::held),
        help(
            "Another process is compiling the grammar. If you are sure no other \
             process is running (e.g. after a crash), delete the lock file shown \
             in the error and retry."
        )
    )]
    Held { name: String, path: String },

    #[error("I/O error on lock file: {source}")]
    #[diagnostic(
        code(greinir::lock::io),
        help("Check permissions on the system temp directory.")
    )]
    Io {
        #[source]
        source: std::io::Error,
    },
}
