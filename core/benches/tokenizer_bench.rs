use criterion::{criterion_group, criterion_main, Criterion};
use fitsearch_core::tokenizer::tokenize;
use fitsearch_core::{Engine, EngineConfig, RawContent};

const ARTICLE: &str = "Progressive overload is the gradual increase of stress placed on the body \
during training. Squats, deadlifts and overhead presses respond well to small weekly increments, \
while accessory work such as lunges, rows and face pulls benefits from added repetitions. \
Recovery, sleep and protein intake determine how quickly strength adaptations appear.";

fn bench_tokenize(c: &mut Criterion) {
    c.bench_function("tokenize_article", |b| b.iter(|| tokenize(ARTICLE)));
}

fn bench_search(c: &mut Criterion) {
    let mut config = EngineConfig::default();
    config.cache.enabled = false;
    let engine = Engine::in_memory(&config).expect("engine");
    for i in 0..1_000 {
        let raw = RawContent::plain_text(format!("https://fit.example/{i}"), None, format!("{ARTICLE} session {i}"));
        engine.ingest(raw).expect("ingest");
    }
    c.bench_function("search_1k_docs", |b| b.iter(|| engine.search("squats protein recovery", &[], 10)));
}

criterion_group!(benches, bench_tokenize, bench_search);
criterion_main!(benches);
