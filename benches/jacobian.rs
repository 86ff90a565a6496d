use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use jacquard::{
    attach_jacobian_hooks, calc_jacobian, GradGuard, HookPoint, HookedNetwork, Linear, Network,
    TanhLayer, Tensor,
};

fn dense(rows: usize, cols: usize, salt: usize) -> Tensor<f64> {
    let data = (0..rows * cols)
        .map(|i| ((i * 31 + salt * 7 + 11) % 17) as f64 / 17.0 - 0.5)
        .collect();
    Tensor::from_vec(data, &[rows, cols]).unwrap()
}

fn make_net(width: usize) -> Network<f64> {
    Network::new()
        .with_layer("input", Linear::identity(width))
        .with_layer(
            "hidden",
            Linear::new(dense(width, width, 1), Tensor::zeros(&[width])).unwrap(),
        )
        .with_layer("act", TanhLayer::new(width))
        .with_layer(
            "out",
            Linear::new(dense(width, width, 2), Tensor::zeros(&[width])).unwrap(),
        )
}

fn make_tokens(width: usize) -> Tensor<f64> {
    let data = (0..width).map(|i| ((i * 7) % 13) as f64 / 13.0 - 0.5).collect();
    Tensor::from_vec(data, &[1, width]).unwrap()
}

fn bench_jacobian_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("jacobian_extraction");
    let up = HookPoint::from("input");
    let down = HookPoint::from("out");

    for n in [4, 16, 64] {
        // One identity-seeded backward pass for all n outputs.
        group.bench_with_input(BenchmarkId::new("batched_seed", n), &n, |bench, &n| {
            let mut net = make_net(n);
            let tokens = make_tokens(n);
            bench.iter(|| {
                black_box(calc_jacobian(&mut net, &up, &down, black_box(&tokens), None).unwrap())
            })
        });

        // Naive baseline: one attach/evaluate/backward cycle per output index.
        group.bench_with_input(BenchmarkId::new("per_output_loop", n), &n, |bench, &n| {
            let mut net = make_net(n);
            let tokens = make_tokens(n);
            let _guard = GradGuard::enable();
            bench.iter(|| {
                for j in 0..n {
                    let hooks = attach_jacobian_hooks(&mut net, &up, &down, j..j + 1).unwrap();
                    net.evaluate(&tokens).unwrap();
                    black_box(hooks.jacobian().unwrap());
                    hooks.detach(&mut net).unwrap();
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_jacobian_extraction);
criterion_main!(benches);
