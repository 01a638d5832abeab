use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use augur::dependence::{KernelSettings, search_optimal_lag, transfer_entropy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Predictor with sparse gaps, and an outcome that follows it three days later.
fn coupled_series(len: usize) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let mut rng = StdRng::seed_from_u64(0x1A6 + len as u64);
    let source: Vec<f64> = (0..len).map(|_| rng.gen_range(0.0..1.0)).collect();
    let dest = (0..len)
        .map(|t| {
            let lead = if t >= 3 { source[t - 3] } else { 0.5 };
            Some(0.8 * lead + 0.2 * rng.gen_range(0.0..1.0))
        })
        .collect();
    let source = source
        .into_iter()
        .map(|v| if rng.gen_range(0.0..1.0) < 0.05 { None } else { Some(v) })
        .collect();
    (source, dest)
}

fn benchmark_lag_search(c: &mut Criterion) {
    let settings = KernelSettings::new(0.5);
    let mut group = c.benchmark_group("lag_search");
    for len in [90_usize, 180, 365] {
        let (source, dest) = coupled_series(len);
        group.throughput(Throughput::Elements(len as u64));

        group.bench_with_input(BenchmarkId::new("mutual_information", len), &len, |b, _| {
            b.iter(|| {
                let search = search_optimal_lag(black_box(&source), black_box(&dest), 14, &settings);
                black_box(search.ok());
            });
        });

        group.bench_with_input(BenchmarkId::new("transfer_entropy", len), &len, |b, _| {
            b.iter(|| {
                let te = transfer_entropy(black_box(&source), black_box(&dest), 3, &settings);
                black_box(te.ok());
            });
        });
    }
    group.finish();
}

criterion_group!(lag_search, benchmark_lag_search);
criterion_main!(lag_search);
