#[macro_use]
extern crate criterion;

use criterion::Criterion;
use hero_proto::{Flag, FragmentEngine};
use std::time::Instant;

fn split_and_reassemble(c: &mut Criterion) {
    let payload = vec![0x41u8; 250_000];

    c.bench_function("fragment split", {
        let payload = payload.clone();
        move |b| {
            b.iter(|| {
                let mut engine = FragmentEngine::new();
                engine.split(Flag::Give, &payload)
            })
        }
    });

    c.bench_function("fragment reassemble", move |b| {
        b.iter_with_setup(
            || {
                let mut sender = FragmentEngine::new();
                sender.split(Flag::Give, &payload)
            },
            |packets| {
                let mut receiver = FragmentEngine::new();
                let now = Instant::now();
                for packet in &packets {
                    receiver.feed(packet, now);
                }
            },
        )
    });
}

criterion_group!(benches, split_and_reassemble);
criterion_main!(benches);
