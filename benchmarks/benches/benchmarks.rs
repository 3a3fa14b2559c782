use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::SeedableRng;
use rand_chacha::ChaChaRng;

use anamorph::{KeySet, NistP256, SearchPolicy, StepTable, Strategy};

fn bench_encrypt(c: &mut Criterion) {
    let mut rng = ChaChaRng::seed_from_u64(0xDEADBEEF);
    let keys = KeySet::generate(&mut rng);
    let pk = keys.dictator.public_key();

    let mut encrypt = c.benchmark_group("encrypt");
    for n in [0, KB, 8 * KB, 64 * KB] {
        let plaintext = vec![0u8; n];
        encrypt.throughput(Throughput::Bytes(n as u64));
        encrypt.bench_with_input(BenchmarkId::from_parameter(n), &plaintext, |b, plaintext| {
            b.iter(|| pk.encrypt(&mut rng, &keys.shared, black_box(42), plaintext).unwrap());
        });
    }
    encrypt.finish();
}

fn bench_decrypt(c: &mut Criterion) {
    let mut rng = ChaChaRng::seed_from_u64(0xDEADBEEF);
    let keys = KeySet::generate(&mut rng);
    let pk = keys.dictator.public_key();

    let mut decrypt = c.benchmark_group("decrypt");
    for n in [0, KB, 8 * KB, 64 * KB] {
        let token = pk.encrypt(&mut rng, &keys.shared, 42, &vec![0u8; n]).unwrap();
        decrypt.throughput(Throughput::Bytes(n as u64));
        decrypt.bench_with_input(BenchmarkId::from_parameter(n), &token, |b, token| {
            b.iter(|| keys.dictator.decrypt(black_box(token)).unwrap());
        });
    }
    decrypt.finish();
}

fn bench_recover(c: &mut Criterion) {
    let mut rng = ChaChaRng::seed_from_u64(0xDEADBEEF);
    let keys = KeySet::generate(&mut rng);
    let pk = keys.dictator.public_key();

    let mut recover = c.benchmark_group("recover");
    for cm in [10, 1_000, 100_000] {
        let token = pk.encrypt(&mut rng, &keys.shared, cm, b"cover").unwrap();
        for strategy in [Strategy::Linear, Strategy::Parallel, Strategy::BabySteps] {
            let policy = SearchPolicy::new().with_max(cm).with_strategy(strategy);
            let id = BenchmarkId::new(format!("{strategy:?}"), cm);
            recover.bench_with_input(id, &token, |b, token| {
                b.iter(|| keys.shared.recover_with(token, &policy).unwrap());
            });
        }

        let table = StepTable::<NistP256>::new(cm);
        recover.bench_with_input(BenchmarkId::new("StepTable", cm), &token, |b, token| {
            b.iter(|| keys.shared.recover_with_table(token, &table).unwrap());
        });
    }
    recover.finish();
}

const KB: usize = 1024;

criterion_group!(external, bench_encrypt, bench_decrypt, bench_recover);

criterion_main!(external);
