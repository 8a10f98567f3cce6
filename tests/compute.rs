//! End-to-end compute tests, run against both backends when a GPU adapter
//! is present. Every test skips politely on machines without one.

use std::sync::Arc;

use riptide::runtime::ComputeRuntime;
use riptide::Backend;

fn runtime(backend: Backend) -> Option<ComputeRuntime> {
    match ComputeRuntime::with_backend(backend) {
        Ok(rt) => Some(rt),
        Err(_) => {
            eprintln!("No GPU available, skipping test");
            None
        }
    }
}

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

const ACCUMULATE_KERNEL: &str = r#"
const STEP = 1.5;

@numthreads(8, 1, 1)
class Accumulate {
    @in @out values: float[];

    @main
    run() {
        let i: uint = globalInvocationID.x;
        values[i] = values[i] + STEP;
    }
}
"#;

const SAXPY_KERNEL: &str = r#"
const BIAS: float;

@numthreads(8, 1, 1)
class Saxpy {
    @in alpha: float;
    @in x: float[];
    @out(8) result: float[];

    @main
    run() {
        let i: uint = globalInvocationID.x;
        result[i] = alpha * x[i] + BIAS;
    }
}
"#;

// ── The concrete scenario: identical results on both backends ──────

#[test]
fn test_vector_add_on_both_backends() {
    for backend in Backend::all() {
        let Some(rt) = runtime(backend) else { return };
        let bundle = rt.compile(ADD_KERNEL).expect("compiles");
        let kernel = rt.create_kernel(&bundle);
        kernel
            .set_binding("vectorA", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0])
            .unwrap();
        kernel
            .set_binding("vectorB", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0])
            .unwrap();
        kernel.set_dispatch(1, 1, 1);

        let output = pollster::block_on(async {
            kernel.execute(1).await?;
            kernel.get_output().await
        })
        .expect("executes");

        assert_eq!(
            output,
            vec![2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0],
            "{} backend",
            backend
        );
        kernel.destroy();
    }
}

// ── In-place iteration (ping-pong correctness) ─────────────────────

#[test]
fn test_in_place_iteration() {
    for backend in Backend::all() {
        let Some(rt) = runtime(backend) else { return };
        let bundle = rt.compile(ACCUMULATE_KERNEL).expect("compiles");
        assert!(bundle.context.need_pingpong);

        let kernel = rt.create_kernel(&bundle);
        kernel.set_binding("values", vec![0.0; 8]).unwrap();
        kernel.set_dispatch(1, 1, 1);

        let output = pollster::block_on(async {
            kernel.execute(4).await?;
            kernel.get_output().await
        })
        .expect("executes");

        assert_eq!(output, vec![6.0; 8], "{} backend", backend);
        kernel.destroy();
    }
}

#[test]
fn test_iteration_accumulates_across_execute_calls() {
    for backend in Backend::all() {
        let Some(rt) = runtime(backend) else { return };
        let bundle = rt.compile(ACCUMULATE_KERNEL).expect("compiles");
        let kernel = rt.create_kernel(&bundle);
        kernel.set_binding("values", vec![0.0; 8]).unwrap();
        kernel.set_dispatch(1, 1, 1);

        let output = pollster::block_on(async {
            kernel.execute(2).await?;
            kernel.execute(1).await?;
            kernel.get_output().await
        })
        .expect("executes");

        assert_eq!(output, vec![4.5; 8], "{} backend", backend);
        kernel.destroy();
    }
}

// ── Pipelining: A → B → C without a CPU round trip ─────────────────

#[test]
fn test_three_kernel_pipeline() {
    let increments: Vec<f32> = (1..=8).map(|v| v as f32).collect();
    for backend in Backend::all() {
        let Some(rt) = runtime(backend) else { return };
        let bundle = rt.compile(ADD_KERNEL).expect("compiles");

        let a = rt.create_kernel(&bundle);
        let b = rt.create_kernel(&bundle);
        let c = rt.create_kernel(&bundle);

        a.set_binding("vectorA", increments.clone()).unwrap();
        a.set_binding("vectorB", increments.clone()).unwrap();
        b.set_binding("vectorA", &a).unwrap();
        b.set_binding("vectorB", increments.clone()).unwrap();
        c.set_binding("vectorA", &b).unwrap();
        c.set_binding("vectorB", increments.clone()).unwrap();
        for kernel in [&a, &b, &c] {
            kernel.set_dispatch(1, 1, 1);
        }

        let output = pollster::block_on(async {
            a.execute(1).await?;
            b.execute(1).await?;
            c.execute(1).await?;
            c.get_output().await
        })
        .expect("pipeline executes");

        let expected: Vec<f32> = increments.iter().map(|v| v * 4.0).collect();
        assert_eq!(output, expected, "{} backend", backend);

        c.destroy();
        b.destroy();
        a.destroy();
    }
}

// ── Scalars, runtime defines, and rebinding ────────────────────────

#[test]
fn test_scalar_uniforms_and_runtime_defines() {
    for backend in Backend::all() {
        let Some(rt) = runtime(backend) else { return };
        let bundle = rt.compile(SAXPY_KERNEL).expect("compiles");
        let kernel = rt.create_kernel(&bundle);
        kernel.set_binding("alpha", 3.0f32).unwrap();
        kernel.set_binding("BIAS", 0.5f32).unwrap();
        kernel
            .set_binding("x", (1..=8).map(|v| v as f32).collect::<Vec<f32>>())
            .unwrap();
        kernel.set_dispatch(1, 1, 1);

        let output = pollster::block_on(async {
            kernel.execute(1).await?;
            kernel.get_output().await
        })
        .expect("executes");

        let expected: Vec<f32> = (1..=8).map(|v| v as f32 * 3.0 + 0.5).collect();
        assert_eq!(output, expected, "{} backend", backend);

        // rebinding a scalar re-uploads in place
        kernel.set_binding("alpha", 1.0f32).unwrap();
        let output = pollster::block_on(async {
            kernel.execute(1).await?;
            kernel.get_output().await
        })
        .expect("re-executes");
        let expected: Vec<f32> = (1..=8).map(|v| v as f32 + 0.5).collect();
        assert_eq!(output, expected, "{} backend after rebind", backend);

        kernel.destroy();
    }
}

// ── Vector element arrays ──────────────────────────────────────────

#[test]
fn test_vec4_elements_round_trip_through_kernel() {
    let source = r#"
@numthreads(4, 1, 1)
class Scale {
    @in @out points: vec4[];

    @main
    run() {
        let i: uint = globalInvocationID.x;
        points[i] = points[i] * 2.0;
    }
}
"#;
    for backend in Backend::all() {
        let Some(rt) = runtime(backend) else { return };
        let bundle = rt.compile(source).expect("compiles");
        let kernel = rt.create_kernel(&bundle);
        let data: Vec<f32> = (0..16).map(|v| v as f32).collect();
        kernel.set_binding("points", data.clone()).unwrap();
        kernel.set_dispatch(1, 1, 1);

        let output = pollster::block_on(async {
            kernel.execute(1).await?;
            kernel.get_output().await
        })
        .expect("executes");

        let expected: Vec<f32> = data.iter().map(|v| v * 2.0).collect();
        assert_eq!(output, expected, "{} backend", backend);
        kernel.destroy();
    }
}

// ── State machine edges ────────────────────────────────────────────

#[test]
fn test_get_output_before_execute_reads_initial_zeros() {
    for backend in Backend::all() {
        let Some(rt) = runtime(backend) else { return };
        let bundle = rt.compile(SAXPY_KERNEL).expect("compiles");
        let kernel = rt.create_kernel(&bundle);
        kernel.set_binding("alpha", 3.0f32).unwrap();
        kernel.set_binding("BIAS", 0.5f32).unwrap();
        kernel.set_binding("x", vec![1.0; 8]).unwrap();

        // a caller mistake, but well-defined: the pre-allocated output
        // resource is zero-valued
        let output = pollster::block_on(kernel.get_output()).expect("reads");
        assert_eq!(output, vec![0.0; 8], "{} backend", backend);
        kernel.destroy();
    }
}

#[test]
fn test_use_after_destroy_panics() {
    let Some(rt) = runtime(Backend::Native) else { return };
    let bundle = rt.compile(ADD_KERNEL).expect("compiles");
    let kernel = rt.create_kernel(&bundle);
    kernel.set_binding("vectorA", vec![0.0; 8]).unwrap();
    kernel.destroy();

    let kernel2 = kernel.clone();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
        let _ = kernel2.set_binding("vectorB", vec![0.0; 8]);
    }));
    assert!(result.is_err(), "using a destroyed kernel must panic");
}

// ── Binding validation (no GPU dispatch needed, but a device is) ───

#[test]
fn test_binding_errors() {
    let Some(rt) = runtime(Backend::Native) else { return };
    let bundle = rt.compile(SAXPY_KERNEL).expect("compiles");
    let kernel = rt.create_kernel(&bundle);

    // unknown name
    assert!(kernel.set_binding("nope", vec![1.0]).is_err());
    // fixed-length @out rejects mismatched lengths
    assert!(kernel.set_binding("result", vec![0.0; 4]).is_err());
    // scalar slot rejects arrays
    assert!(kernel.set_binding("alpha", vec![1.0, 2.0]).is_err());
    // the write-only output cannot consume an upstream kernel
    let other = rt.create_kernel(&bundle);
    assert!(kernel.set_binding("result", &other).is_err());
    // a kernel cannot feed itself
    assert!(kernel.set_binding("x", &kernel).is_err());
    // execute without the required array binding fails
    let err = pollster::block_on(kernel.execute(1));
    assert!(err.is_err());
}

// ── Bundle cache and serialized round trip ─────────────────────────

#[test]
fn test_runtime_bundle_cache_hits() {
    let Some(rt) = runtime(Backend::Native) else { return };
    let first = rt.compile(ADD_KERNEL).expect("compiles");
    let second = rt.compile(ADD_KERNEL).expect("compiles");
    assert!(Arc::ptr_eq(&first, &second));
    rt.clear_cache();
    let third = rt.compile(ADD_KERNEL).expect("compiles");
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(*first, *third);
}

#[test]
fn test_deserialized_bundle_executes_identically() {
    for backend in Backend::all() {
        let Some(rt) = runtime(backend) else { return };
        let bundle = riptide::compile(ADD_KERNEL).expect("compiles");
        let json = bundle.to_json().expect("serializes");

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("add.bundle.json");
        std::fs::write(&path, &json).unwrap();
        let restored = riptide::CompiledBundle::from_json(
            &std::fs::read_to_string(&path).unwrap(),
        )
        .expect("deserializes");
        assert_eq!(bundle, restored);

        let kernel = rt.create_kernel(&Arc::new(restored));
        kernel.set_binding("vectorA", vec![1.0; 8]).unwrap();
        kernel.set_binding("vectorB", vec![2.0; 8]).unwrap();
        kernel.set_dispatch(1, 1, 1);
        let output = pollster::block_on(async {
            kernel.execute(1).await?;
            kernel.get_output().await
        })
        .expect("executes");
        assert_eq!(output, vec![3.0; 8], "{} backend", backend);
        kernel.destroy();
    }
}
