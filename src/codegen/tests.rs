use super::*;
use crate::analyze::analyze;
use crate::lexer::Lexer;
use crate::parser::Parser;

fn lower(source: &str, backend: Backend) -> String {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
    let module = Parser::new(tokens).parse_module().expect("parse failed");
    let analysis = analyze(&module).unwrap_or_else(|errs| {
        panic!(
            "analysis failed: {:?}",
            errs.iter().map(|e| &e.message).collect::<Vec<_>>()
        )
    });
    create_lowering(backend).lower(&analysis.program, &analysis.context)
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

const MIXED_KERNEL: &str = r#"
const SCALE = 2.0;
const BIAS: float;

@numthreads(4, 1, 1)
@dispatch(2, 1, 1)
class Saxpy {
    @in alpha: float;
    @in x: float[];
    @in y: float[];
    @out(8) result: float[];

    @main
    run() {
        let i: uint = globalInvocationID.x;
        result[i] = alpha * x[i] * SCALE + y[i] + BIAS;
    }
}
"#;

const SHARED_KERNEL: &str = r#"
@numthreads(64, 1, 1)
class BlockSum {
    @in @out data: float[];
    @shared(64) tile: float[];

    @main
    run() {
        let lane: uint = localInvocationID.x;
        tile[lane] = data[globalInvocationID.x];
        barrier();
        data[globalInvocationID.x] = tile[lane];
    }
}
"#;

// ── Literal formatting ─────────────────────────────────────────────

#[test]
fn test_int_literal_in_float_context_gains_fraction() {
    let wgsl = lower(
        "@numthreads(1,1,1) class K { @in @out o: float[]; @main run() { o[0] = o[0] + 100; } }",
        Backend::Native,
    );
    assert!(wgsl.contains("100.0"), "emitted:\n{}", wgsl);
    assert!(!wgsl.contains("+ 100)"), "bare int in float context:\n{}", wgsl);
}

#[test]
fn test_uint_literal_gets_suffix() {
    let wgsl = lower(
        "@numthreads(1,1,1) class K { @in @out o: float[]; @main run() { let i: uint = 3; o[i] = 1.0; } }",
        Backend::Native,
    );
    assert!(wgsl.contains("var i: u32 = 3u;"), "emitted:\n{}", wgsl);
}

// ── Layout determinism ─────────────────────────────────────────────

#[test]
fn test_recompile_is_byte_identical() {
    for backend in Backend::all() {
        let first = lower(MIXED_KERNEL, backend);
        let second = lower(MIXED_KERNEL, backend);
        assert_eq!(first, second, "{} backend text diverged", backend);
    }
}

// ── Binding-slot invariant ─────────────────────────────────────────

#[test]
fn test_native_binding_layout() {
    let wgsl = lower(MIXED_KERNEL, Backend::Native);
    // one uniform block at binding 0 carrying every scalar
    assert_eq!(wgsl.matches("var<uniform>").count(), 1);
    assert!(wgsl.contains("@group(0) @binding(0) var<uniform> params: Params;"));
    assert!(wgsl.contains("@align(16) alpha: f32,"));
    assert!(wgsl.contains("@align(16) BIAS: f32,"));
    // one storage buffer per array, slots counting up from 1
    assert!(wgsl.contains("@group(0) @binding(1) var<storage, read> x: array<f32>;"));
    assert!(wgsl.contains("@group(0) @binding(2) var<storage, read> y: array<f32>;"));
    assert!(wgsl.contains("@group(0) @binding(3) var<storage, read_write> result: array<f32>;"));
    assert_eq!(wgsl.matches("var<storage").count(), 3);
}

#[test]
fn test_native_inout_is_read_write() {
    let wgsl = lower(ADD_KERNEL, Backend::Native);
    assert!(wgsl.contains("@group(0) @binding(1) var<storage, read_write> vectorA: array<f32>;"));
    assert!(wgsl.contains("@group(0) @binding(2) var<storage, read> vectorB: array<f32>;"));
}

#[test]
fn test_native_no_uniform_block_without_scalars() {
    let wgsl = lower(ADD_KERNEL, Backend::Native);
    assert!(!wgsl.contains("var<uniform>"));
}

// ── Builtin aliases and workgroup attributes ───────────────────────

#[test]
fn test_native_entry_point_shape() {
    let wgsl = lower(ADD_KERNEL, Backend::Native);
    assert!(wgsl.contains("@compute @workgroup_size(8, 1, 1)"));
    assert!(wgsl.contains("@builtin(global_invocation_id) globalInvocationID: vec3<u32>"));
    assert!(wgsl.contains("@builtin(local_invocation_id) localInvocationID: vec3<u32>"));
    assert!(wgsl.contains("@builtin(workgroup_id) workGroupID: vec3<u32>"));
    assert!(wgsl.contains("const workGroupSize: vec3<u32> = vec3<u32>(8u, 1u, 1u);"));
}

#[test]
fn test_native_shared_and_barrier() {
    let wgsl = lower(SHARED_KERNEL, Backend::Native);
    assert!(wgsl.contains("var<workgroup> tile: array<f32, 64>;"));
    assert!(wgsl.contains("workgroupBarrier();"));
}

// ── Texture backend shape ──────────────────────────────────────────

#[test]
fn test_texture_fragment_shape() {
    let wgsl = lower(ADD_KERNEL, Backend::Texture);
    assert!(wgsl.contains("@fragment"));
    assert!(wgsl.contains("fn fs_main(@builtin(position) riptide_pos: vec4<f32>)"));
    assert!(wgsl.contains("discard;"));
    assert!(wgsl.contains("fn riptide_fetch(tex: texture_2d<f32>, side: u32, index: u32)"));
    // one texture per input array
    assert!(wgsl.contains("@group(0) @binding(1) var vectorA_tex: texture_2d<f32>;"));
    assert!(wgsl.contains("@group(0) @binding(2) var vectorB_tex: texture_2d<f32>;"));
}

#[test]
fn test_texture_reads_route_through_fetch() {
    let wgsl = lower(ADD_KERNEL, Backend::Texture);
    assert!(wgsl.contains("riptide_fetch(vectorA_tex, params.vectorA_side, u32(i)).x"));
    assert!(wgsl.contains("riptide_fetch(vectorB_tex, params.vectorB_side, u32(i)).x"));
}

#[test]
fn test_texture_output_write_becomes_fragment_color() {
    let wgsl = lower(ADD_KERNEL, Backend::Texture);
    assert!(wgsl.contains("riptide_out = vec4<f32>("));
    assert!(wgsl.contains("return riptide_out;"));
}

#[test]
fn test_texture_inout_accumulator_starts_from_committed_state() {
    let wgsl = lower(ADD_KERNEL, Backend::Texture);
    assert!(
        wgsl.contains("var riptide_out = riptide_fetch(vectorA_tex, params.vectorA_side, riptide_index);")
    );
}

#[test]
fn test_texture_out_only_accumulator_starts_zero() {
    let wgsl = lower(MIXED_KERNEL, Backend::Texture);
    assert!(wgsl.contains("var riptide_out = vec4<f32>(0.0, 0.0, 0.0, 0.0);"));
}

#[test]
fn test_texture_barrier_is_inert() {
    let wgsl = lower(SHARED_KERNEL, Backend::Texture);
    assert!(wgsl.contains("// barrier() has no effect on the texture backend"));
    assert!(!wgsl.contains("workgroupBarrier"));
    // shared scratch degrades to a function-local array
    assert!(wgsl.contains("var tile: array<f32, 64>;"));
}

#[test]
fn test_texture_params_carry_sides_and_lengths() {
    let wgsl = lower(MIXED_KERNEL, Backend::Texture);
    assert!(wgsl.contains("@align(16) x_side: u32,"));
    assert!(wgsl.contains("@align(16) x_len: u32,"));
    assert!(wgsl.contains("@align(16) y_side: u32,"));
    assert!(wgsl.contains("@align(16) riptide_out_side: u32,"));
    assert!(wgsl.contains("@align(16) riptide_out_len: u32,"));
}

#[test]
fn test_texture_params_member_order_matches_model_packing() {
    let (tokens, _) = Lexer::new(MIXED_KERNEL).tokenize();
    let module = Parser::new(tokens).parse_module().unwrap();
    let analysis = analyze(&module).unwrap();
    let members: Vec<String> = texture::params_members(&analysis.context)
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(
        members,
        vec![
            "alpha",
            "BIAS",
            "x_side",
            "x_len",
            "y_side",
            "y_len",
            "riptide_out_side",
            "riptide_out_len",
        ]
    );
}

// ── Defines and vector constructors ────────────────────────────────

#[test]
fn test_compile_time_define_emitted_as_const() {
    for backend in Backend::all() {
        let wgsl = lower(MIXED_KERNEL, backend);
        assert!(wgsl.contains("const SCALE: f32 = 2.0;"), "{}:\n{}", backend, wgsl);
    }
}

#[test]
fn test_array_literal_becomes_vector_constructor() {
    let wgsl = lower(
        "@numthreads(1,1,1) class K { @in @out o: vec4[]; @main run() { o[0] = [1.0, 2.0, 3.0, 4.0]; } }",
        Backend::Native,
    );
    assert!(wgsl.contains("vec4<f32>(1.0, 2.0, 3.0, 4.0)"));
}

#[test]
fn test_helper_method_emitted_as_function() {
    let source = "@numthreads(1,1,1) class K { @in @out o: float[]; scale(v: float): float { return v * 2.0; } @main run() { o[0] = this.scale(o[0]); } }";
    for backend in Backend::all() {
        let wgsl = lower(source, backend);
        assert!(wgsl.contains("fn scale(v: f32) -> f32 {"), "{}:\n{}", backend, wgsl);
        assert!(wgsl.contains("scale("), "{}:\n{}", backend, wgsl);
    }
}

// ── Snapshots ──────────────────────────────────────────────────────

#[test]
fn test_snapshot_add_kernel_native() {
    insta::assert_snapshot!(lower(ADD_KERNEL, Backend::Native));
}

#[test]
fn test_snapshot_add_kernel_texture() {
    insta::assert_snapshot!(lower(ADD_KERNEL, Backend::Texture));
}

#[test]
fn test_snapshot_mixed_kernel_native() {
    insta::assert_snapshot!(lower(MIXED_KERNEL, Backend::Native));
}
