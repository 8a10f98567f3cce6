//! Code generators: KIR + context → backend shader source text.
//!
//! Each backend implements `KernelLowering` and emits a complete WGSL
//! module for one kernel:
//!
//! ```text
//! KernelProgram + CompilationContext ─→ NativeLowering  → compute shader
//!                                    └→ TextureLowering → fragment pass over square textures
//! ```
//!
//! Output is deterministic for identical input — the bundle cache and the
//! snapshot tests rely on byte-identical shader text across recompiles.

pub mod native;
pub mod texture;

#[cfg(test)]
mod tests;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kir::{CompilationContext, GlobalDefine, KernelProgram, Type};

/// The two compute backends.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Native compute: storage buffers, workgroup shared memory, barriers.
    Native,
    /// Texture emulation: values packed into square textures, one fragment
    /// invocation per output texel, no shared memory.
    Texture,
}

impl Backend {
    pub fn all() -> [Backend; 2] {
        [Backend::Native, Backend::Texture]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Native => "native",
            Backend::Texture => "texture",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lowers an analyzed kernel into shader source for one backend.
pub trait KernelLowering {
    fn backend(&self) -> Backend;

    /// Emit a complete, compilable shader module.
    fn lower(&self, program: &KernelProgram, ctx: &CompilationContext) -> String;
}

/// Create the lowering for a backend.
pub fn create_lowering(backend: Backend) -> Box<dyn KernelLowering> {
    match backend {
        Backend::Native => Box::new(native::NativeLowering::new()),
        Backend::Texture => Box::new(texture::TextureLowering::new()),
    }
}

// ─── Shared formatting helpers ─────────────────────────────────────

/// WGSL spelling of a value type.
pub(crate) fn wgsl_type(ty: Type) -> &'static str {
    match ty {
        Type::Bool => "bool",
        Type::I32 => "i32",
        Type::U32 => "u32",
        Type::F32 => "f32",
        Type::Vec2 => "vec2<f32>",
        Type::Vec3 => "vec3<f32>",
        Type::Vec4 => "vec4<f32>",
        Type::UVec3 => "vec3<u32>",
        // abstract ints are resolved by the analyzer; Void never names a value
        Type::AbstractInt | Type::Void => "i32",
    }
}

/// Format a float so the shading language accepts it as a float literal
/// (`2` → `2.0`, exponents pass through).
pub(crate) fn format_float(v: f64) -> String {
    let text = format!("{:?}", v);
    if text.contains('.') || text.contains('e') || text.contains("inf") || text.contains("NaN") {
        text
    } else {
        format!("{}.0", text)
    }
}

/// Format an integer literal for its resolved type. In a float context the
/// literal gains a fractional part; in a uint context the `u` suffix.
pub(crate) fn format_int(value: i64, ty: Type) -> String {
    match ty {
        Type::F32 | Type::Vec2 | Type::Vec3 | Type::Vec4 => format!("{}.0", value),
        Type::U32 => format!("{}u", value),
        _ => format!("{}", value),
    }
}

/// A compile-time define as a module-level constant.
pub(crate) fn format_define(d: &GlobalDefine) -> String {
    let value = match d.ty {
        Type::F32 => format_float(d.value),
        Type::U32 => format!("{}u", d.value as i64),
        _ => format!("{}", d.value as i64),
    };
    format!("const {}: {} = {};", d.name, wgsl_type(d.ty), value)
}

/// The `workGroupSize` builtin has no backend intrinsic; both generators
/// emit it as a module constant from `@numthreads`.
pub(crate) fn workgroup_size_const(ctx: &CompilationContext) -> String {
    let [x, y, z] = ctx.thread_group_size;
    format!(
        "const workGroupSize: vec3<u32> = vec3<u32>({}u, {}u, {}u);",
        x, y, z
    )
}

/// Members of the slot-0 uniform block shared by both backends: every
/// scalar/vector descriptor (fields first, then runtime-bound defines),
/// in declaration order.
pub fn scalar_params_members(ctx: &CompilationContext) -> Vec<(String, Type)> {
    ctx.scalars().map(|u| (u.name.clone(), u.ty)).collect()
}

#[cfg(test)]
mod format_tests {
    use super::*;

    #[test]
    fn test_format_float_gains_fraction() {
        assert_eq!(format_float(100.0), "100.0");
        assert_eq!(format_float(0.5), "0.5");
        assert_eq!(format_float(-3.0), "-3.0");
    }

    #[test]
    fn test_format_float_keeps_exponent() {
        assert_eq!(format_float(1e20), "1e20");
    }

    #[test]
    fn test_format_int_by_context() {
        assert_eq!(format_int(100, Type::F32), "100.0");
        assert_eq!(format_int(7, Type::U32), "7u");
        assert_eq!(format_int(-7, Type::I32), "-7");
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(Backend::Native.name(), "native");
        assert_eq!(Backend::Texture.name(), "texture");
        assert_eq!(create_lowering(Backend::Native).backend(), Backend::Native);
        assert_eq!(
            create_lowering(Backend::Texture).backend(),
            Backend::Texture
        );
    }
}
