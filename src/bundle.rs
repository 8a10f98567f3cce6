//! The compiled bundle: the reusable artifact one kernel source compiles to.
//!
//! A bundle carries the shader text for every backend plus the compilation
//! context, so a kernel compiled once can be executed many times, cached on
//! disk, or shipped to a machine that only has the runtime. Serialization
//! round-trips through JSON; the cache key is a content hash of the kernel
//! source.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codegen::Backend;
use crate::diagnostic::{Diagnostic, Severity};
use crate::kir::CompilationContext;

/// Shader text per backend plus everything the runtime needs to bind and
/// dispatch. Pure data: clone/share freely.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompiledBundle {
    pub shaders: BTreeMap<Backend, String>,
    pub context: CompilationContext,
    /// Non-fatal diagnostics from compilation (e.g. barrier() under the
    /// texture backend). Messages only; spans do not survive serialization.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl CompiledBundle {
    pub fn shader(&self, backend: Backend) -> &str {
        self.shaders
            .get(&backend)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn from_parts(
        shaders: BTreeMap<Backend, String>,
        context: CompilationContext,
        warnings: &[Diagnostic],
    ) -> Self {
        Self {
            shaders,
            context,
            warnings: warnings
                .iter()
                .filter(|d| d.severity == Severity::Warning)
                .map(|d| d.message.clone())
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Cache key for a kernel source string.
pub fn source_hash(source: &str) -> [u8; 32] {
    *blake3::hash(source.as_bytes()).as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

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

    #[test]
    fn test_bundle_has_both_backends() {
        let bundle = compile(ADD_KERNEL).expect("compiles");
        assert!(bundle.shaders.contains_key(&Backend::Native));
        assert!(bundle.shaders.contains_key(&Backend::Texture));
        assert!(!bundle.shader(Backend::Native).is_empty());
        assert!(!bundle.shader(Backend::Texture).is_empty());
    }

    #[test]
    fn test_json_round_trip_is_identical() {
        let bundle = compile(ADD_KERNEL).expect("compiles");
        let json = bundle.to_json().expect("serializes");
        let back = CompiledBundle::from_json(&json).expect("deserializes");
        assert_eq!(bundle, back);
    }

    #[test]
    fn test_source_hash_is_stable_and_content_sensitive() {
        let a = source_hash(ADD_KERNEL);
        let b = source_hash(ADD_KERNEL);
        assert_eq!(a, b);
        let c = source_hash("@numthreads(1,1,1) class Other { }");
        assert_ne!(a, c);
    }

    #[test]
    fn test_warnings_survive_round_trip() {
        let bundle = compile(
            "@numthreads(8,1,1) class K { @in @out o: float[]; @main run() { barrier(); o[0] = 1.0; } }",
        )
        .expect("compiles with a warning");
        assert_eq!(bundle.warnings.len(), 1);
        let json = bundle.to_json().unwrap();
        let back = CompiledBundle::from_json(&json).unwrap();
        assert_eq!(back.warnings, bundle.warnings);
    }
}
