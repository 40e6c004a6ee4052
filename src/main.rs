//! greinir CLI: parse pre-tokenized sentences from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use greinir::grammar::Grammar;
use greinir::job::{Greinir, GreinirOptions};
use greinir::lexicon::Lexicon;
use greinir::parser::ParserOptions;
use greinir::settings::Settings;
use greinir::simplifier::SimplifierConfig;
use greinir::tokens::{Tok, TokenKind, TokVal};

#[derive(Parser)]
#[command(name = "greinir", version, about = "Icelandic constituency parser")]
struct Cli {
    /// Path to the compressed lexicon blob.
    #[arg(long, global = true)]
    lexicon: Option<PathBuf>,

    /// Path to the compiled grammar cache.
    #[arg(long, global = true)]
    grammar: Option<PathBuf>,

    /// Path to the configuration tables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse text read from stdin, one sentence per line.
    Parse {
        /// Print the indented tree view instead of the flat form.
        #[arg(long)]
        view: bool,

        /// Maximum tokens per sentence (0 disables the gate).
        #[arg(long, default_value = "90")]
        max_tokens: usize,
    },

    /// Look up a word form in the lexicon.
    Lookup {
        /// The word form to look up.
        form: String,
    },

    /// Show grammar statistics.
    Info,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let lexicon_path = cli
        .lexicon
        .ok_or_else(|| miette::miette!("--lexicon is required"))?;
    let lexicon = Arc::new(Lexicon::open(&lexicon_path)?);

    match cli.command {
        Commands::Lookup { form } => {
            for m in lexicon.lookup(&form) {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    m.lemma, m.word_id, m.class, m.category, m.features
                );
            }
            Ok(())
        }
        Commands::Info => {
            let grammar = load_grammar(cli.grammar)?;
            println!("nonterminals: {}", grammar.num_nonterminals());
            println!("terminals:    {}", grammar.terminals().len());
            println!("productions:  {}", grammar.num_productions());
            Ok(())
        }
        Commands::Parse { view, max_tokens } => {
            let grammar = Arc::new(load_grammar(cli.grammar)?);
            let settings = Arc::new(match cli.config {
                Some(path) => Settings::load(&path)?,
                None => Settings::new(),
            });
            let greinir = Greinir::new(
                lexicon.clone(),
                grammar,
                settings,
                Arc::new(SimplifierConfig::default()),
            )
            .with_options(GreinirOptions {
                parser: ParserOptions {
                    max_tokens,
                    timeout: None,
                },
                ..GreinirOptions::default()
            });

            let mut line = String::new();
            loop {
                line.clear();
                if std::io::stdin().read_line(&mut line).into_diagnostic()? == 0 {
                    break;
                }
                let tokens = naive_tokenize(&line, &lexicon);
                if tokens.is_empty() {
                    continue;
                }
                let sentence = greinir.parse_sentence(tokens);
                match sentence.tree() {
                    Some(tree) => {
                        if view {
                            println!("{}", tree.view());
                        } else {
                            println!("{}", tree.flat());
                        }
                        println!("# score {}", sentence.score());
                    }
                    None => {
                        println!("# no parse: {}", sentence.failure().unwrap());
                    }
                }
            }
            Ok(())
        }
    }
}

fn load_grammar(path: Option<PathBuf>) -> Result<Grammar> {
    let path = path.ok_or_else(|| miette::miette!("--grammar is required"))?;
    Ok(Grammar::load_cache(&path)?)
}

/// A deliberately simple whitespace tokenizer for the CLI: word tokens
/// with lexicon meanings, punctuation split off at the end of words. The
/// real pipeline consumes tokens from a proper tokenizer.
fn naive_tokenize(line: &str, lexicon: &Lexicon) -> Vec<Tok> {
    let mut tokens = Vec::new();
    for raw in line.split_whitespace() {
        let (word, punct) = match raw.strip_suffix(['.', ',', '?', '!', ':', ';']) {
            Some(w) => (w, Some(&raw[w.len()..])),
            None => (raw, None),
        };
        if !word.is_empty() {
            let mut meanings = lexicon.lookup(word);
            if meanings.is_empty() && word.chars().next().is_some_and(|c| c.is_uppercase()) {
                meanings = lexicon.lookup(&word.to_lowercase());
            }
            tokens.push(Tok::word(word, meanings));
        }
        if let Some(p) = punct {
            tokens.push(Tok::new(TokenKind::Punctuation, p, TokVal::None));
        }
    }
    tokens
}
