//! riptide — a kernel dialect compiler with a dual-backend GPU compute
//! runtime.
//!
//! A kernel is a small decorated class: `@numthreads` fixes the thread
//! group shape, `@in`/`@out` fields declare the data the kernel reads and
//! writes, and the `@main` method is the per-thread body. One compile
//! produces a [`CompiledBundle`] carrying shader text for both backends:
//!
//! ```text
//! source → Lexer → Parser → Analyzer → KIR + Context ─→ native lowering  (WGSL compute)
//!                                                    └→ texture lowering (WGSL fragment pass)
//! ```
//!
//! The [`runtime::ComputeRuntime`] picks a backend once, at creation, and
//! executes bundles on it: storage buffers and real workgroups on the
//! native path, square-texture emulation with one fragment invocation per
//! output texel on the fallback path. The caller never changes a line.

pub mod analyze;
pub mod ast;
pub mod bundle;
pub mod codegen;
pub mod diagnostic;
pub mod kir;
pub mod lexeme;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod span;

use std::collections::BTreeMap;

pub use bundle::CompiledBundle;
pub use codegen::Backend;
pub use diagnostic::{render_diagnostics, Diagnostic};
pub use runtime::{Binding, ComputeRuntime, Kernel, RuntimeError};

use lexer::Lexer;
use parser::Parser;

/// Parse kernel source text into the surface tree.
pub fn parse_source(source: &str) -> Result<ast::Module, Vec<Diagnostic>> {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    if !lex_errors.is_empty() {
        return Err(lex_errors);
    }
    Parser::new(tokens).parse_module()
}

/// Compile kernel source into a bundle with shader text for every backend.
/// A failing compile yields no bundle; non-fatal diagnostics (e.g.
/// `barrier()` under the texture backend) ride on the bundle as warnings.
pub fn compile(source: &str) -> Result<CompiledBundle, Vec<Diagnostic>> {
    let module = parse_source(source)?;
    let analysis = analyze::analyze(&module)?;
    let mut shaders = BTreeMap::new();
    for backend in Backend::all() {
        let lowering = codegen::create_lowering(backend);
        shaders.insert(
            backend,
            lowering.lower(&analysis.program, &analysis.context),
        );
    }
    Ok(CompiledBundle::from_parts(
        shaders,
        analysis.context,
        &analysis.warnings,
    ))
}

/// Compile and render any diagnostics to stderr.
pub fn compile_with_diagnostics(
    source: &str,
    filename: &str,
) -> Result<CompiledBundle, Vec<Diagnostic>> {
    match compile(source) {
        Ok(bundle) => Ok(bundle),
        Err(errors) => {
            render_diagnostics(&errors, filename, source);
            Err(errors)
        }
    }
}
