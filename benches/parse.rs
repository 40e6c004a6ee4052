//! Parse throughput benchmark over a small grammar and lexicon.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use greinir::grammar::Grammar;
use greinir::job::Greinir;
use greinir::lexicon::{Lexicon, LexiconBuilder};
use greinir::settings::Settings;
use greinir::simplifier::SimplifierConfig;
use greinir::tokens::Tok;

fn engine() -> Greinir {
    let mut b = LexiconBuilder::new();
    b.add("Ása", "Ása", 1, "kvk", "ism", "NFET");
    b.add("sá", "sjá", 2, "so", "alm", "GM-FH-ÞT-3P-ET");
    b.add("sól", "sól", 3, "kvk", "alm", "NFET");
    b.add("sól", "sól", 3, "kvk", "alm", "ÞFET");
    let lexicon = Arc::new(Lexicon::from_bytes(b.build().unwrap()).unwrap());

    let grammar = Arc::new(
        Grammar::builder()
            .production("S0", &["Setning", "\".\""])
            .production("Setning", &["Frumlag", "So", "Andlag"])
            .production("Frumlag", &["no_et_nf_kvk"])
            .production("So", &["so_1_þf_et_p3"])
            .production("Andlag", &["no_et_þf_kvk"])
            .build("S0")
            .unwrap(),
    );
    let mut settings = Settings::new();
    settings.verbs.add_frame("sjá_þf");
    let mut config = SimplifierConfig::default();
    config.map_nt("S0", &["S0"]);
    config.map_nt("Setning", &["S-MAIN", "IP"]);
    config.map_nt("Frumlag", &["NP-SUBJ"]);
    config.map_nt("So", &["VP"]);
    config.map_nt("Andlag", &["NP-OBJ"]);
    Greinir::new(lexicon, grammar, Arc::new(settings), Arc::new(config))
}

fn bench_parse(c: &mut Criterion) {
    let g = engine();
    let tokens: Vec<Tok> = {
        let lex = g.lexicon();
        let mut t: Vec<Tok> = ["Ása", "sá", "sól"]
            .iter()
            .map(|w| Tok::word(w, lex.lookup(w)))
            .collect();
        t.push(Tok::punctuation("."));
        t
    };
    c.bench_function("parse_short_sentence", |b| {
        b.iter(|| {
            let s = g.parse_sentence(black_box(tokens.clone()));
            black_box(s.score())
        })
    });
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
