//! End-to-end pipeline tests: tokens through lattice, chart, forest,
//! reduction and simplification, against a miniature grammar and lexicon.

use std::sync::Arc;

use greinir::grammar::Grammar;
use greinir::job::{Greinir, GreinirOptions};
use greinir::lexicon::{Lexicon, LexiconBuilder};
use greinir::parser::{ParseFailure, ParserOptions};
use greinir::settings::Settings;
use greinir::simplifier::SimplifierConfig;
use greinir::tokens::{Case, Gender, Tok, TokenKind, TokVal};

/// A miniature inflectional lexicon covering the test sentences.
fn lexicon() -> Arc<Lexicon> {
    let mut b = LexiconBuilder::new();
    let rows: &[(&str, &str, i32, &str, &str, &str)] = &[
        ("ása", "Ása", 1, "kvk", "ism", "NFET"),
        ("sá", "sjá", 2, "so", "alm", "GM-FH-ÞT-3P-ET"),
        ("sá", "sá", 3, "fn", "alm", "KK-NFET"),
        ("sól", "sól", 4, "kvk", "alm", "NFET"),
        ("sól", "sól", 4, "kvk", "alm", "ÞFET"),
        ("litla", "lítill", 5, "lo", "alm", "FVB-KVK-NFET"),
        ("gula", "gulur", 6, "lo", "alm", "FVB-KVK-NFET"),
        ("hænan", "hæna", 7, "kvk", "alm", "NFETgr"),
        ("hæna", "hæna", 7, "kvk", "alm", "NFET"),
        ("fann", "finna", 8, "so", "alm", "GM-FH-ÞT-3P-ET"),
        ("fræ", "fræ", 9, "hk", "alm", "NFET"),
        ("fræ", "fræ", 9, "hk", "alm", "ÞFET"),
        ("jón", "Jón", 10, "kk", "ism", "NFET"),
        ("greiddi", "greiða", 11, "so", "alm", "GM-FH-ÞT-3P-ET"),
        ("bænum", "bær", 12, "kk", "alm", "ÞGFETgr"),
        ("milljónir", "milljón", 13, "kvk", "alm", "NFFT"),
        ("milljónir", "milljón", 13, "kvk", "alm", "ÞFFT"),
        ("króna", "króna", 14, "kvk", "alm", "NFET"),
        ("króna", "króna", 14, "kvk", "alm", "EFFT"),
        ("seldum", "seldur", 15, "lo", "alm", "SB-KVK-ÞGFFT"),
        ("fasteignum", "fasteign", 16, "kvk", "alm", "ÞGFFT"),
        ("hefur", "hafa", 17, "so", "alm", "GM-FH-NT-3P-ET"),
        ("fjölgað", "fjölga", 18, "so", "alm", "GM-SAGNB"),
        // Noun-phrase inflection material
        ("brimsaltir", "brimsaltur", 19, "lo", "alm", "SB-KK-NFFT"),
        ("brimsalta", "brimsaltur", 19, "lo", "alm", "SB-KK-ÞFFT"),
        ("brimsöltum", "brimsaltur", 19, "lo", "alm", "SB-KK-ÞGFFT"),
        ("pokar", "poki", 20, "kk", "alm", "NFFT"),
        ("poka", "poki", 20, "kk", "alm", "ÞFFT"),
        ("pokum", "poki", 20, "kk", "alm", "ÞGFFT"),
        ("af", "af", 21, "fs", "alm", "-"),
        ("poppi", "popp", 22, "hk", "alm", "ÞGFET"),
    ];
    for (form, lemma, id, class, cat, features) in rows {
        b.add(form, lemma, *id, class, cat, features);
        // Capitalized forms share the lowercase entry's meanings
        let mut chars = form.chars();
        if let Some(first) = chars.next() {
            let cap: String = first.to_uppercase().collect::<String>() + chars.as_str();
            if &cap != form {
                b.add(&cap, lemma, *id, class, cat, features);
            }
        }
    }
    Arc::new(Lexicon::from_bytes(b.build().unwrap()).unwrap())
}

/// The miniature sentence grammar used by the scenario tests.
fn grammar() -> Arc<Grammar> {
    Arc::new(
        Grammar::builder()
            .production("S0", &["Setning", "\".\""])
            .production("Setning", &["Frumlag", "Sagnliður"])
            .production("Setning", &["FrumlagÞgf", "SögnSagnbBreyting"])
            .production("Frumlag", &["NlNf"])
            .production("NlNf", &["no_et_nf_kvk"])
            .production("NlNf", &["no_et_nf_kk"])
            .production("NlNf", &["LoNf", "NlNf"])
            .production("LoNf", &["lo_nf_et_kvk"])
            .production("FrumlagÞgf", &["lo_þgf_ft_kvk", "no_ft_þgf_kvk"])
            .production("Sagnliður", &["Andlagssagnliður"])
            .production("Andlagssagnliður", &["So", "NlBeintAndlag"])
            .production("Andlagssagnliður", &["So2", "NlÓbeintAndlag", "NlBeintAndlag"])
            .production("So", &["so_1_þf_et_p3"])
            .production("So2", &["so_2_þgf_þf_et_p3"])
            .production("SögnSagnbBreyting", &["HjSögn", "SoSagnb"])
            .production("HjSögn", &["so_et_p3"])
            .production("SoSagnb", &["so_sagnb"])
            .production("NlBeintAndlag", &["no_et_þf_kvk"])
            .production("NlBeintAndlag", &["no_et_þf_hk"])
            .production(
                "NlBeintAndlag",
                &["tala_ft_þf_kvk", "no_ft_þf_kvk", "EfLiður"],
            )
            .production("NlÓbeintAndlag", &["no_et_þgf_kk"])
            .production("EfLiður", &["no_ft_ef_kvk"])
            .build("S0")
            .unwrap(),
    )
}

fn simplifier_config() -> Arc<SimplifierConfig> {
    let mut c = SimplifierConfig::default();
    c.map_nt("S0", &["S0"]);
    c.map_nt("Setning", &["S-MAIN", "IP"]);
    c.map_nt("Frumlag", &["NP-SUBJ"]);
    c.map_nt("FrumlagÞgf", &["NP-SUBJ"]);
    c.map_nt("Andlagssagnliður", &["VP"]);
    c.map_nt("So", &["VP"]);
    c.map_nt("So2", &["VP"]);
    c.map_nt("SögnSagnbBreyting", &["VP"]);
    c.map_nt("HjSögn", &["VP-AUX"]);
    c.map_nt("SoSagnb", &["VP"]);
    c.map_nt("NlBeintAndlag", &["NP-OBJ"]);
    c.map_nt("NlÓbeintAndlag", &["NP-IOBJ"]);
    c.map_nt("EfLiður", &["NP-POSS"]);
    Arc::new(c)
}

fn settings() -> Arc<Settings> {
    let mut s = Settings::new();
    s.verbs.add_frame("sjá_þf");
    s.verbs.add_frame("finna_þf");
    s.verbs.add_frame("greiða_þgf_þf");
    s.add_preposition("af", &["þgf"], false, false);
    Arc::new(s)
}

fn engine() -> Greinir {
    Greinir::new(lexicon(), grammar(), settings(), simplifier_config())
}

/// A word token carrying its lexicon meanings, as the tokenizer would
/// produce it.
fn word(lex: &Lexicon, text: &str) -> Tok {
    let mut meanings = lex.lookup(text);
    if meanings.is_empty() {
        meanings = lex.lookup(&text.to_lowercase());
    }
    // Meanings belong to the surface form actually seen
    for m in &mut meanings {
        m.form = text.to_string();
    }
    Tok::word(text, meanings)
}

fn sentence_tokens(lex: &Lexicon, words: &[&str]) -> Vec<Tok> {
    let mut tokens: Vec<Tok> = words.iter().map(|w| word(lex, w)).collect();
    tokens.push(Tok::punctuation("."));
    tokens
}

// -- scenario tests ---------------------------------------------------------

#[test]
fn simple_transitive_sentence() {
    // "Ása sá sól."
    let g = engine();
    let tokens = sentence_tokens(g.lexicon(), &["Ása", "sá", "sól"]);
    let s = g.parse_sentence(tokens);
    assert!(s.parsed(), "failure: {:?}", s.failure());
    let tree = s.tree().unwrap();
    assert_eq!(
        tree.flat(),
        "S0 S-MAIN IP NP-SUBJ no_et_nf_kvk /NP-SUBJ VP VP so_1_þf_et_p3 /VP \
         NP-OBJ no_et_þf_kvk /NP-OBJ /VP /IP /S-MAIN p /S0"
    );
    assert_eq!(tree.nouns(), vec!["Ása", "sól"]);
    assert_eq!(tree.verbs(), vec!["sjá"]);
    assert_eq!(tree.lemmas(), vec!["Ása", "sjá", "sól", "."]);
}

#[test]
fn adjective_chain_in_subject() {
    // "Litla gula hænan fann fræ."
    let g = engine();
    let tokens = sentence_tokens(g.lexicon(), &["Litla", "gula", "hænan", "fann", "fræ"]);
    let s = g.parse_sentence(tokens);
    assert!(s.parsed(), "failure: {:?}", s.failure());
    let tree = s.tree().unwrap();
    // The subject holds exactly three leaves: two adjectives and the noun
    let subj = tree.find_tag("NP-SUBJ").unwrap();
    let kids: Vec<_> = tree.children(subj).collect();
    assert_eq!(kids.len(), 3);
    assert_eq!(
        kids.iter()
            .map(|&k| tree.node(k).terminal.clone().unwrap())
            .collect::<Vec<_>>(),
        vec!["lo_nf_et_kvk", "lo_nf_et_kvk", "no_et_nf_kvk"]
    );
    let obj = tree.find_tag("NP-OBJ").unwrap();
    assert_eq!(
        tree.node(tree.children(obj).next().unwrap()).terminal.as_deref(),
        Some("no_et_þf_hk")
    );
    assert_eq!(
        tree.lemmas(),
        vec!["lítill", "gulur", "hæna", "finna", "fræ", "."]
    );
}

#[test]
fn ditransitive_with_amount_object() {
    // "Jón greiddi bænum 10 milljónir króna."
    let g = engine();
    let lex = g.lexicon();
    let mut tokens = vec![
        word(lex, "Jón"),
        word(lex, "greiddi"),
        word(lex, "bænum"),
        Tok::number("10", 10.0, vec![Case::Acc], vec![Gender::Fem]),
        word(lex, "milljónir"),
        word(lex, "króna"),
    ];
    tokens.push(Tok::punctuation("."));
    let s = g.parse_sentence(tokens);
    assert!(s.parsed(), "failure: {:?}", s.failure());
    let tree = s.tree().unwrap();
    let vp = tree.find_tag("VP").unwrap();
    let verb_leaf = tree
        .descendants(vp)
        .into_iter()
        .find(|&n| tree.node(n).terminal.as_deref() == Some("so_2_þgf_þf_et_p3"));
    assert!(verb_leaf.is_some());
    let iobj = tree.find_tag("NP-IOBJ").unwrap();
    assert_eq!(
        tree.node(tree.children(iobj).next().unwrap()).terminal.as_deref(),
        Some("no_et_þgf_kk")
    );
    let obj = tree.find_tag("NP-OBJ").unwrap();
    let obj_terms: Vec<String> = tree
        .children(obj)
        .filter_map(|k| tree.node(k).terminal.clone())
        .collect();
    assert_eq!(obj_terms, vec!["tala_ft_þf_kvk", "no_ft_þf_kvk"]);
    let poss = tree.child_by_tag(obj, "NP-POSS").unwrap();
    assert_eq!(
        tree.node(tree.children(poss).next().unwrap()).terminal.as_deref(),
        Some("no_ft_ef_kvk")
    );
}

#[test]
fn auxiliary_verb_chain() {
    // "Seldum fasteignum hefur fjölgað."
    let g = engine();
    let tokens = sentence_tokens(g.lexicon(), &["Seldum", "fasteignum", "hefur", "fjölgað"]);
    let s = g.parse_sentence(tokens);
    assert!(s.parsed(), "failure: {:?}", s.failure());
    assert_eq!(
        s.flat_tree().as_deref(),
        Some(
            "S0 S-MAIN IP NP-SUBJ lo_þgf_ft_kvk no_ft_þgf_kvk /NP-SUBJ \
             VP VP-AUX so_et_p3 /VP-AUX VP so_sagnb /VP /VP /IP /S-MAIN p /S0"
        )
    );
}

// -- invariants -------------------------------------------------------------

#[test]
fn terminal_token_alignment() {
    let g = engine();
    let tokens = sentence_tokens(g.lexicon(), &["Ása", "sá", "sól"]);
    let s = g.parse_sentence(tokens.clone());
    let tree = s.tree().unwrap();
    let leaves = tree.terminals();
    assert_eq!(leaves.len(), tokens.len());
    for (i, &leaf) in leaves.iter().enumerate() {
        assert_eq!(tree.node(leaf).token_index, Some(i));
        assert_eq!(tree.node(leaf).text, tokens[i].text);
    }
    // The tree's yield is the input text
    assert_eq!(tree.text(), "Ása sá sól .");
}

#[test]
fn parse_is_idempotent() {
    let g = engine();
    let tokens = sentence_tokens(g.lexicon(), &["Litla", "gula", "hænan", "fann", "fræ"]);
    let a = g.parse_sentence(tokens.clone());
    let b = g.parse_sentence(tokens);
    assert_eq!(a.flat_tree(), b.flat_tree());
    assert_eq!(a.score(), b.score());
    assert_eq!(a.combinations(), b.combinations());
}

#[test]
fn flat_and_view_carry_the_same_symbols() {
    let g = engine();
    let tokens = sentence_tokens(g.lexicon(), &["Ása", "sá", "sól"]);
    let s = g.parse_sentence(tokens);
    let tree = s.tree().unwrap();
    let view = tree.view();
    for tag in tree.tag_set() {
        assert!(view.contains(&tag), "view lacks tag {tag}");
    }
    let flat = tree.flat();
    for descr in tree.terminal_descriptors() {
        assert!(flat.contains(&descr), "flat lacks terminal {descr}");
    }
}

#[test]
fn failed_parse_reports_the_stall_index() {
    let g = engine();
    // "Ása sá Ása." stalls at the object: nominative-only 'Ása' cannot
    // fill an accusative object slot
    let tokens = sentence_tokens(g.lexicon(), &["Ása", "sá", "Ása"]);
    let s = g.parse_sentence(tokens);
    assert!(!s.parsed());
    assert_eq!(s.err_index(), Some(2));
}

#[test]
fn token_limit_is_a_distinct_failure() {
    let g = engine().with_options(GreinirOptions {
        parser: ParserOptions {
            max_tokens: 2,
            timeout: None,
        },
        ..GreinirOptions::default()
    });
    let tokens = sentence_tokens(g.lexicon(), &["Ása", "sá", "sól"]);
    let s = g.parse_sentence(tokens);
    assert_eq!(s.failure(), Some(&ParseFailure::TooLong { tokens: 4 }));
}

#[test]
fn foreign_sentences_are_flagged() {
    let g = engine();
    let tokens: Vec<Tok> = ["lorem", "ipsum", "dolor"]
        .iter()
        .map(|w| Tok::word(w, vec![]))
        .collect();
    let s = g.parse_sentence(tokens.clone());
    assert!(matches!(
        s.failure(),
        Some(ParseFailure::Foreign { known_ratio }) if *known_ratio == 0.0
    ));
    // The flag turns detection off; the parse then fails normally instead
    let g2 = engine().with_options(GreinirOptions {
        parse_foreign_sentences: true,
        ..GreinirOptions::default()
    });
    let s2 = g2.parse_sentence(tokens);
    assert!(matches!(s2.failure(), Some(ParseFailure::NoParse { .. })));
}

#[test]
fn job_statistics_and_paragraphs() {
    let g = engine();
    let lex = g.lexicon();
    let mut tokens = sentence_tokens(lex, &["Ása", "sá", "sól"]);
    tokens.push(Tok::new(TokenKind::SentenceEnd, "", TokVal::None));
    tokens.extend(sentence_tokens(lex, &["Litla", "gula", "hænan", "fann", "fræ"]));
    let job = g.submit(tokens);
    assert_eq!(job.num_sentences(), 2);
    assert_eq!(job.num_parsed(), 2);
    assert_eq!(job.num_tokens(), 10);
    assert!(job.ambiguity() >= 1.0);
    assert!(job.parse_time() > std::time::Duration::ZERO);
    let texts: Vec<String> = job.sentences().map(|s| s.text()).collect();
    assert_eq!(texts[0], "Ása sá sól .");
}

#[test]
fn parallel_jobs_preserve_input_order() {
    let g = engine().with_options(GreinirOptions {
        parallel: true,
        ..GreinirOptions::default()
    });
    let lex = g.lexicon();
    let mut tokens = Vec::new();
    for _ in 0..4 {
        tokens.extend(sentence_tokens(lex, &["Ása", "sá", "sól"]));
        tokens.push(Tok::new(TokenKind::SentenceEnd, "", TokVal::None));
        tokens.extend(sentence_tokens(lex, &["Seldum", "fasteignum", "hefur", "fjölgað"]));
        tokens.push(Tok::new(TokenKind::SentenceEnd, "", TokVal::None));
    }
    let job = g.submit(tokens);
    assert_eq!(job.num_sentences(), 8);
    assert_eq!(job.num_parsed(), 8);
    let texts: Vec<String> = job.sentences().map(|s| s.text()).collect();
    for pair in texts.chunks(2) {
        assert_eq!(pair[0], "Ása sá sól .");
        assert_eq!(pair[1], "Seldum fasteignum hefur fjölgað .");
    }
}

#[test]
fn sentence_json_dump_round_trips() {
    let g = engine();
    let tokens = sentence_tokens(g.lexicon(), &["Ása", "sá", "sól"]);
    let s = g.parse_sentence(tokens);
    let dump = s.dump();
    let back = greinir::job::SentenceDump::from_json(&dump.to_json()).unwrap();
    assert_eq!(back, dump);
    assert_eq!(back.score, s.score());
    assert_eq!(back.tree, s.flat_tree());
}

// -- noun-phrase inflection -------------------------------------------------

#[test]
fn noun_phrase_inflection_through_the_lexicon() {
    // "brimsaltir pokar af poppi" in accusative and dative; the PP keeps
    // its own case
    let lex = lexicon();
    let grammar = Arc::new(
        Grammar::builder()
            .production("S0", &["Nafnliður"])
            .production("Nafnliður", &["lo_nf_ft_kk", "no_ft_nf_kk", "FsLiður"])
            .production("FsLiður", &["fs_þgf", "no_et_þgf_hk"])
            .build("S0")
            .unwrap(),
    );
    let mut config = SimplifierConfig::default();
    config.map_nt("S0", &["S0"]);
    config.map_nt("Nafnliður", &["NP"]);
    config.map_nt("FsLiður", &["PP"]);
    let mut settings = Settings::new();
    settings.add_preposition("af", &["þgf"], false, false);
    let g = Greinir::new(lex.clone(), grammar, Arc::new(settings), Arc::new(config));
    let tokens: Vec<Tok> = ["brimsaltir", "pokar", "af", "poppi"]
        .iter()
        .map(|w| word(&lex, w))
        .collect();
    let s = g.parse_sentence(tokens);
    assert!(s.parsed(), "failure: {:?}", s.failure());
    let tree = s.tree().unwrap();
    let np = tree.find_tag("NP").unwrap();
    assert_eq!(
        tree.inflected_text(np, &lex, Case::Acc, false, false),
        "brimsalta poka af poppi"
    );
    assert_eq!(
        tree.inflected_text(np, &lex, Case::Dat, false, false),
        "brimsöltum pokum af poppi"
    );
    assert_eq!(tree.nominative_text(np, &lex), "brimsaltir pokar af poppi");
}

#[test]
fn tag_adjustments_subject_to_and_overrides() {
    let lex = lexicon();
    let grammar = Arc::new(
        Grammar::builder()
            .production("S0", &["Yfirsetning"])
            .production("Yfirsetning", &["Undirsetning"])
            .production("Undirsetning", &["Spurning"])
            .production("Spurning", &["no_et_nf_kvk"])
            .build("S0")
            .unwrap(),
    );
    // Undirsetning maps to the same tag as its parent and is subject to
    // it, so only one S-MAIN appears; the question tag then devours the
    // single-child S-MAIN above it
    let mut config = SimplifierConfig::default();
    config.map_nt("S0", &["S0"]);
    config.map_nt("Yfirsetning", &["S-MAIN"]);
    config.map_nt("Undirsetning", &["S-MAIN"]);
    config.map_nt("Spurning", &["S-QUE"]);
    config.subject_to("S-MAIN", &["S-MAIN"]);
    config.overrides("S-QUE", &["S-MAIN"]);
    let g = Greinir::new(lex.clone(), grammar, Arc::new(Settings::new()), Arc::new(config));
    let tokens = vec![word(&lex, "sól")];
    let s = g.parse_sentence(tokens);
    assert!(s.parsed(), "failure: {:?}", s.failure());
    let tree = s.tree().unwrap();
    assert_eq!(tree.flat(), "S0 S-QUE no_et_nf_kvk /S-QUE /S0");
}

#[test]
fn redundant_same_tag_nesting_collapses() {
    // Two grammar nonterminals (categorial variants of one phrase type)
    // share a public tag; nesting them must not render as NP > NP
    let lex = lexicon();
    let grammar = Arc::new(
        Grammar::builder()
            .production("S0", &["NlYtri"])
            .production("NlYtri", &["NlInnri"])
            .production("NlInnri", &["no_et_nf_kvk"])
            .build("S0")
            .unwrap(),
    );
    let mut config = SimplifierConfig::default();
    config.map_nt("S0", &["S0"]);
    config.map_nt("NlYtri", &["NP"]);
    config.map_nt("NlInnri", &["NP"]);
    let g = Greinir::new(lex.clone(), grammar, Arc::new(Settings::new()), Arc::new(config));
    let s = g.parse_sentence(vec![word(&lex, "sól")]);
    assert!(s.parsed(), "failure: {:?}", s.failure());
    assert_eq!(s.flat_tree().as_deref(), Some("S0 NP no_et_nf_kvk /NP /S0"));
}

#[test]
fn parent_override_devours_sole_child() {
    // The parent-wins direction: a tag whose overrides set names its sole
    // child's tag absorbs the child and keeps its own identity
    let lex = lexicon();
    let grammar = Arc::new(
        Grammar::builder()
            .production("S0", &["Yfirsetning"])
            .production("Yfirsetning", &["Beygingarliður"])
            .production("Beygingarliður", &["no_et_nf_kvk"])
            .build("S0")
            .unwrap(),
    );
    let mut config = SimplifierConfig::default();
    config.map_nt("S0", &["S0"]);
    config.map_nt("Yfirsetning", &["S-MAIN"]);
    config.map_nt("Beygingarliður", &["IP"]);
    config.overrides("S-MAIN", &["IP"]);
    let g = Greinir::new(lex.clone(), grammar, Arc::new(Settings::new()), Arc::new(config));
    let s = g.parse_sentence(vec![word(&lex, "sól")]);
    assert!(s.parsed(), "failure: {:?}", s.failure());
    assert_eq!(
        s.flat_tree().as_deref(),
        Some("S0 S-MAIN no_et_nf_kvk /S-MAIN /S0")
    );
}

// -- ambiguity and scoring --------------------------------------------------

#[test]
fn higher_scoring_derivations_win() {
    // A deliberately ambiguous object: both no_et_þf_kvk and no_et_þf_hk
    // could fit if the word had both readings; verify the reducer picks a
    // single family and the reported score bounds every derivation
    let g = engine();
    let tokens = sentence_tokens(g.lexicon(), &["Ása", "sá", "sól"]);
    let s = g.parse_sentence(tokens);
    assert!(s.combinations() >= 1);
    assert!(s.parsed());
    // Reparsing with the same inputs can't do better than the reported
    // score (property 5 in the small: idempotence of the maximum)
    let tokens2 = sentence_tokens(g.lexicon(), &["Ása", "sá", "sól"]);
    let s2 = g.parse_sentence(tokens2);
    assert_eq!(s.score(), s2.score());
}
