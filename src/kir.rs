//! KIR — the backend-neutral kernel IR.
//!
//! The analyzer turns the surface tree into a `KernelProgram` (typed
//! statements and expressions) plus a `CompilationContext` (dispatch shape,
//! descriptors, binding slots, defines). Each backend implements a lowering
//! that consumes both and produces shader source text:
//!
//! ```text
//! AST → KernelProgram + CompilationContext ─→ NativeLowering  → WGSL compute shader
//!                                          └→ TextureLowering → WGSL fragment pass
//! ```

use serde::{Deserialize, Serialize};

use crate::span::Span;

// ─── Types ─────────────────────────────────────────────────────────

/// The value types kernels compute with. `AbstractInt` is the type of an
/// integer literal before context pins it down; the analyzer resolves every
/// abstract type before codegen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Bool,
    I32,
    U32,
    F32,
    Vec2,
    Vec3,
    Vec4,
    /// Builtin thread ids are 3-component unsigned vectors.
    UVec3,
    AbstractInt,
    #[default]
    Void,
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::I32 | Type::U32 | Type::F32 | Type::AbstractInt
        )
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Type::Vec2 | Type::Vec3 | Type::Vec4 | Type::UVec3)
    }

    pub fn vector_size(&self) -> Option<u32> {
        match self {
            Type::Vec2 => Some(2),
            Type::Vec3 | Type::UVec3 => Some(3),
            Type::Vec4 => Some(4),
            _ => None,
        }
    }

    pub fn vector_of(n: u32) -> Option<Type> {
        match n {
            2 => Some(Type::Vec2),
            3 => Some(Type::Vec3),
            4 => Some(Type::Vec4),
            _ => None,
        }
    }

    /// Component type of a vector, or the type itself for scalars.
    pub fn component(&self) -> Type {
        match self {
            Type::Vec2 | Type::Vec3 | Type::Vec4 => Type::F32,
            Type::UVec3 => Type::U32,
            other => *other,
        }
    }

    /// Floats a texel can carry for this element type (vec4→4 … scalar→1).
    pub fn elements_per_texel(&self) -> u32 {
        self.vector_size().unwrap_or(1)
    }
}

// ─── Field descriptors ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldDirection {
    In,
    Out,
    InOut,
}

impl FieldDirection {
    pub fn readable(&self) -> bool {
        matches!(self, FieldDirection::In | FieldDirection::InOut)
    }

    pub fn writable(&self) -> bool {
        matches!(self, FieldDirection::Out | FieldDirection::InOut)
    }
}

/// What a class field is, as decided by its decorators and declared type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    Scalar(Type),
    Vector(Type),
    /// `elem` is the array element type (scalar or float vector).
    Array { elem: Type },
    /// Workgroup-shared scratch; never bound as a GPU resource.
    Shared { elem: Type, size: u32 },
}

#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    pub name: String,
    pub direction: FieldDirection,
    pub kind: FieldKind,
    pub fixed_length: Option<u32>,
    pub binding_slot: u32,
    pub span: Span,
}

impl FieldDescriptor {
    pub fn is_array(&self) -> bool {
        matches!(self.kind, FieldKind::Array { .. })
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.kind, FieldKind::Shared { .. })
    }

    pub fn elem_type(&self) -> Type {
        match &self.kind {
            FieldKind::Scalar(t) | FieldKind::Vector(t) => *t,
            FieldKind::Array { elem } => *elem,
            FieldKind::Shared { elem, .. } => *elem,
        }
    }
}

// ─── Compilation context ───────────────────────────────────────────

/// One buffer/uniform descriptor as seen by the runtime. Scalar and vector
/// uniforms all share binding slot 0 (one synthesized uniform block);
/// arrays get their own slots `1..=k` in field declaration order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UniformDescriptor {
    pub name: String,
    pub ty: Type,
    pub is_array: bool,
    pub readonly: bool,
    pub writeonly: bool,
    pub binding_slot: u32,
    pub fixed_length: Option<u32>,
    pub elements_per_texel: u32,
}

/// Identifies the descriptor read back after execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputDescriptor {
    pub name: String,
    /// Fixed length when declared via `@out(n)`; otherwise resolved from
    /// the bound input at execute time.
    pub length: Option<u32>,
    pub elements_per_texel: u32,
}

/// A global `const`. With a value it is substituted at compile time;
/// without one it becomes a runtime-bound scalar uniform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalDefine {
    pub name: String,
    pub ty: Type,
    pub value: f64,
}

/// Everything the runtime needs to execute a compiled kernel, independent
/// of the shader text. Serialized as part of the bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompilationContext {
    pub dispatch: [u32; 3],
    pub thread_group_size: [u32; 3],
    pub uniforms: Vec<UniformDescriptor>,
    pub output: OutputDescriptor,
    pub max_iteration: u32,
    pub need_pingpong: bool,
    pub global_defines: Vec<GlobalDefine>,
}

impl CompilationContext {
    pub fn uniform(&self, name: &str) -> Option<&UniformDescriptor> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    /// Array descriptors in binding-slot order.
    pub fn arrays(&self) -> impl Iterator<Item = &UniformDescriptor> {
        self.uniforms.iter().filter(|u| u.is_array)
    }

    /// Scalar/vector descriptors (the slot-0 uniform block members),
    /// in declaration order.
    pub fn scalars(&self) -> impl Iterator<Item = &UniformDescriptor> {
        self.uniforms.iter().filter(|u| !u.is_array)
    }

    /// Input arrays: everything the kernel reads from a texture/buffer
    /// upload (direction In or InOut).
    pub fn input_arrays(&self) -> impl Iterator<Item = &UniformDescriptor> {
        self.arrays().filter(|u| !u.writeonly)
    }
}

// ─── Typed program ─────────────────────────────────────────────────

/// Builtin values available inside kernel bodies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinValue {
    GlobalInvocationId,
    LocalInvocationId,
    WorkGroupId,
    WorkGroupSize,
}

impl BuiltinValue {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "globalInvocationID" => Some(Self::GlobalInvocationId),
            "localInvocationID" => Some(Self::LocalInvocationId),
            "workGroupID" => Some(Self::WorkGroupId),
            "workGroupSize" => Some(Self::WorkGroupSize),
            _ => None,
        }
    }

    /// The dialect-visible name, used verbatim in generated shaders.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GlobalInvocationId => "globalInvocationID",
            Self::LocalInvocationId => "localInvocationID",
            Self::WorkGroupId => "workGroupID",
            Self::WorkGroupSize => "workGroupSize",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Callee {
    /// A builtin free function (`sqrt`, `barrier`, `float`, …).
    Builtin(String),
    /// A helper method of the kernel class.
    Helper(String),
}

/// A typed expression.
#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    Local(String),
    /// Reference to a class field (array, shared array, or scalar uniform).
    Field(String),
    /// Reference to a compile-time define.
    Define(String),
    Builtin(BuiltinValue),
    Member {
        base: Box<Expr>,
        member: String,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Callee,
        args: Vec<Expr>,
    },
    Unary {
        op: crate::ast::UnOp,
        operand: Box<Expr>,
    },
    Binary {
        op: crate::ast::BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `[a, b, c]` — emitted as a vector constructor.
    VectorLit(Vec<Expr>),
}

/// Assignment targets. Compound assignments are desugared by the analyzer,
/// so lowering only ever sees plain `=`.
#[derive(Clone, Debug)]
pub enum Place {
    Local(String),
    Field(String),
    Index { base: Box<Place>, index: Expr },
    Member { base: Box<Place>, member: String },
}

impl Place {
    /// The field name at the root of this place, if any.
    pub fn root_field(&self) -> Option<&str> {
        match self {
            Place::Field(name) => Some(name),
            Place::Local(_) => None,
            Place::Index { base, .. } | Place::Member { base, .. } => base.root_field(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Stmt {
    Let {
        name: String,
        ty: Type,
        init: Expr,
    },
    Assign {
        place: Place,
        value: Expr,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    For {
        init: Box<Stmt>,
        cond: Expr,
        step: Box<Stmt>,
        body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Expr(Expr),
}

#[derive(Clone, Debug)]
pub struct Helper {
    pub name: String,
    pub params: Vec<(String, Type)>,
    pub return_ty: Type,
    pub body: Vec<Stmt>,
}

/// The analyzed kernel: descriptors plus typed method bodies.
#[derive(Clone, Debug)]
pub struct KernelProgram {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub helpers: Vec<Helper>,
    pub main_body: Vec<Stmt>,
}

impl KernelProgram {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elements_per_texel() {
        assert_eq!(Type::F32.elements_per_texel(), 1);
        assert_eq!(Type::Vec2.elements_per_texel(), 2);
        assert_eq!(Type::Vec3.elements_per_texel(), 3);
        assert_eq!(Type::Vec4.elements_per_texel(), 4);
    }

    #[test]
    fn test_direction_flags() {
        assert!(FieldDirection::In.readable());
        assert!(!FieldDirection::In.writable());
        assert!(FieldDirection::InOut.readable());
        assert!(FieldDirection::InOut.writable());
        assert!(!FieldDirection::Out.readable());
    }

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(
            BuiltinValue::from_name("globalInvocationID"),
            Some(BuiltinValue::GlobalInvocationId)
        );
        assert_eq!(BuiltinValue::from_name("gl_FragCoord"), None);
    }

    #[test]
    fn test_place_root_field() {
        let place = Place::Index {
            base: Box::new(Place::Field("vectorA".into())),
            index: Expr {
                kind: ExprKind::IntLit(0),
                ty: Type::I32,
            },
        };
        assert_eq!(place.root_field(), Some("vectorA"));
        assert_eq!(Place::Local("i".into()).root_field(), None);
    }
}
