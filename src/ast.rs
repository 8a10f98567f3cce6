use crate::span::Spanned;

/// A parsed kernel source file: global constants plus class declarations.
#[derive(Clone, Debug)]
pub struct Module {
    pub items: Vec<Spanned<Item>>,
}

#[derive(Clone, Debug)]
pub enum Item {
    Const(ConstDef),
    Class(ClassDef),
}

/// A global `const` declaration. With an initializer it is a compile-time
/// define; without one it is bound at runtime like a scalar uniform.
#[derive(Clone, Debug)]
pub struct ConstDef {
    pub name: Spanned<String>,
    pub ty: Option<Spanned<Type>>,
    pub value: Option<Spanned<Expr>>,
}

/// A decorator such as `@numthreads(8, 1, 1)` or `@in`.
#[derive(Clone, Debug)]
pub struct Decorator {
    pub name: Spanned<String>,
    pub args: Vec<Spanned<Expr>>,
}

#[derive(Clone, Debug)]
pub struct ClassDef {
    pub decorators: Vec<Decorator>,
    pub name: Spanned<String>,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
}

#[derive(Clone, Debug)]
pub struct FieldDef {
    pub decorators: Vec<Decorator>,
    pub name: Spanned<String>,
    pub ty: Spanned<Type>,
}

#[derive(Clone, Debug)]
pub struct MethodDef {
    pub decorators: Vec<Decorator>,
    pub name: Spanned<String>,
    pub params: Vec<Param>,
    pub return_ty: Option<Spanned<Type>>,
    pub body: Spanned<Block>,
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: Spanned<String>,
    pub ty: Spanned<Type>,
}

/// Syntactic types (as written in source).
#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Float,
    Int,
    Uint,
    Bool,
    Vec2,
    Vec3,
    Vec4,
    /// `T[]` — unsized array, or `T[N]` with a fixed length.
    Array(Box<Type>, Option<u32>),
}

#[derive(Clone, Debug)]
pub struct Block {
    pub stmts: Vec<Spanned<Stmt>>,
}

#[derive(Clone, Debug)]
pub enum Stmt {
    Let {
        name: Spanned<String>,
        ty: Option<Spanned<Type>>,
        init: Spanned<Expr>,
    },
    Assign {
        target: Spanned<Expr>,
        op: AssignOp,
        value: Spanned<Expr>,
    },
    If {
        cond: Spanned<Expr>,
        then_block: Spanned<Block>,
        else_block: Option<Spanned<Block>>,
    },
    For {
        init: Box<Spanned<Stmt>>,
        cond: Spanned<Expr>,
        step: Box<Spanned<Stmt>>,
        body: Spanned<Block>,
    },
    While {
        cond: Spanned<Expr>,
        body: Spanned<Block>,
    },
    Return(Option<Spanned<Expr>>),
    Expr(Spanned<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Assign, // =
    Add,    // +=
    Sub,    // -=
    Mul,    // *=
    Div,    // /=
}

#[derive(Clone, Debug)]
pub enum Expr {
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    Var(String),
    This,
    Member {
        base: Box<Spanned<Expr>>,
        member: Spanned<String>,
    },
    Index {
        base: Box<Spanned<Expr>>,
        index: Box<Spanned<Expr>>,
    },
    Call {
        callee: Box<Spanned<Expr>>,
        args: Vec<Spanned<Expr>>,
    },
    Unary {
        op: UnOp,
        operand: Box<Spanned<Expr>>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Spanned<Expr>>,
        rhs: Box<Spanned<Expr>>,
    },
    /// `[a, b, c]` — lowered to a vector constructor by the analyzer.
    ArrayLit(Vec<Spanned<Expr>>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg, // -
    Not, // !
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add, // +
    Sub, // -
    Mul, // *
    Div, // /
    Rem, // %
    Eq,  // ==
    Ne,  // !=
    Lt,  // <
    Le,  // <=
    Gt,  // >
    Ge,  // >=
    And, // &&
    Or,  // ||
}

impl BinOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    /// True for comparison and logical operators (result type is bool).
    pub fn is_boolean(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::And | BinOp::Or
        )
    }
}

impl AssignOp {
    /// The arithmetic operator a compound assignment desugars to.
    pub fn binary_op(&self) -> Option<BinOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinOp::Add),
            AssignOp::Sub => Some(BinOp::Sub),
            AssignOp::Mul => Some(BinOp::Mul),
            AssignOp::Div => Some(BinOp::Div),
        }
    }
}
