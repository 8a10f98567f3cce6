use criterion::{black_box, criterion_group, criterion_main, Criterion};

const ADD_KERNEL: &str = r#"
@numthreads(8, 1, 1)
class AddVectors {
    @in @out vectorA: float[];
    @in vectorB: float[];

    @main
    run() {
        let i: uint = globalInvocationID.x;
        vectorA[i] = vectorA[i] + vectorB[i];
    }
}
"#;

const RELAX_KERNEL: &str = r#"
const INF = 1000000.0;

@numthreads(64, 1, 1)
@iterations(16)
class Relax {
    @in @out dist: float[];
    @in edges: vec4[];
    @in edgeCount: uint;

    @main
    run() {
        let i: uint = globalInvocationID.x;
        let mine: float = dist[i];
        let mut_best: float = mine;
        for (let e = 0; e < int(edgeCount); e += 1) {
            let edge: vec4 = edges[e];
            if (uint(edge.y) == i) {
                let candidate: float = dist[uint(edge.x)] + edge.z;
                if (candidate < mut_best) {
                    mut_best = candidate;
                }
            }
        }
        dist[i] = mut_best;
    }
}
"#;

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_add_kernel", |b| {
        b.iter(|| riptide::compile(black_box(ADD_KERNEL)).unwrap())
    });
    c.bench_function("compile_relax_kernel", |b| {
        b.iter(|| riptide::compile(black_box(RELAX_KERNEL)).unwrap())
    });
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);
