use criterion::{Criterion, criterion_group, criterion_main};
use mvsolve::Multivariate;
use rand::{Rng as _, SeedableRng as _};
use std::hint::black_box;

fn make_scalar(lengths: &[usize]) -> Multivariate {
    let seed = [1u8; 32];
    let mut rng = rand::rngs::SmallRng::from_seed(seed);
    let rows: Vec<[f64; 1]> = (0..lengths.iter().product::<usize>())
        .map(|_| [rng.random_range(-5.0..5.0)])
        .collect();
    Multivariate::bezier_from_rows(lengths, &rows).unwrap()
}

fn samples<const N: usize>() -> Vec<[f64; N]> {
    let mut rng = rand::rng();
    (0..1000)
        .map(|_| std::array::from_fn(|_| rng.random_range(0.0..1.0)))
        .collect()
}

fn eval_deg2(c: &mut Criterion) {
    let mv = make_scalar(&[3, 3]);
    let samples = samples::<2>();
    c.bench_function("eval_deg2", |b| {
        b.iter(|| {
            for p in &samples {
                black_box(mv.eval(black_box(p)).unwrap());
            }
        })
    });
}

fn eval_deg7(c: &mut Criterion) {
    let mv = make_scalar(&[8, 8]);
    let samples = samples::<2>();
    c.bench_function("eval_deg7", |b| {
        b.iter(|| {
            for p in &samples {
                black_box(mv.eval(black_box(p)).unwrap());
            }
        })
    });
}

fn gradient_deg7(c: &mut Criterion) {
    let mv = make_scalar(&[8, 8]);
    let samples = samples::<2>();
    c.bench_function("gradient_deg7", |b| {
        b.iter(|| {
            for p in &samples {
                black_box(mv.gradient(black_box(p)).unwrap());
            }
        })
    });
}

fn eval_deg7_dim3(c: &mut Criterion) {
    let mv = make_scalar(&[8, 8, 8]);
    let samples = samples::<3>();
    c.bench_function("eval_deg7_dim3", |b| {
        b.iter(|| {
            for p in &samples {
                black_box(mv.eval(black_box(p)).unwrap());
            }
        })
    });
}

criterion_group!(
    benches,
    eval_deg2,
    eval_deg7,
    gradient_deg7,
    eval_deg7_dim3
);
criterion_main!(benches);
