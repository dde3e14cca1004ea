use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use sampleset::neighbors::find_nn;
use sampleset::prelude::*;
use sampleset::tools::create_test_samples;

fn create_matrix(n_rows: usize, n_features: usize) -> Array2<f32> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
    Array2::from_shape_fn((n_rows, n_features), |_| rng.gen::<f32>())
}

fn bench_find_nn(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_nn");

    for n_rows in [1000, 10000, 50000].iter() {
        let matrix = create_matrix(*n_rows, 16);
        let query: Vec<f32> = matrix.row(0).to_vec();

        group.bench_with_input(BenchmarkId::new("k5", n_rows), &matrix, |b, m| {
            b.iter(|| find_nn(black_box(&query), m.view(), 5).unwrap())
        });
    }

    group.finish();
}

fn bench_smote(c: &mut Criterion) {
    let mut group = c.benchmark_group("smote");
    group.sample_size(10);

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
    let mut list = SampleList::new();
    let distr = [[0.3, 0.3, 0.2], [0.6, 0.6, 0.2]];
    create_test_samples(&mut list, 2, 500, 1, &distr, "user", &mut rng).unwrap();

    for count in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("over", count), count, |b, &count| {
            b.iter(|| {
                let mut view = OverSample::new(&list).unwrap().with_seed(1).unwrap();
                view.set_over(0, count, OverStrategy::Smote).unwrap();
                black_box(view.len())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_find_nn, bench_smote);
criterion_main!(benches);
