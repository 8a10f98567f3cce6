//! Native-compute lowering — emits a WGSL compute shader.
//!
//! Layout rules:
//! - every scalar/vector uniform lands in one synthesized uniform block at
//!   binding 0, one 16-byte-aligned member per descriptor, declaration order
//! - one storage buffer per array descriptor at its context slot, `read`
//!   for @in fields and `read_write` otherwise
//! - builtin thread ids are entry-point parameters named exactly as the
//!   dialect spells them; `workGroupSize` is a module constant
//! - shared fields become `var<workgroup>` arrays, `barrier()` becomes
//!   `workgroupBarrier()`

use super::{
    format_define, format_float, format_int, scalar_params_members, wgsl_type, workgroup_size_const,
    Backend, KernelLowering,
};
use crate::ast::UnOp;
use crate::kir::{
    Callee, CompilationContext, Expr, ExprKind, FieldKind, Helper, KernelProgram, Place, Stmt,
    Type,
};

pub struct NativeLowering;

impl NativeLowering {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeLowering {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelLowering for NativeLowering {
    fn backend(&self) -> Backend {
        Backend::Native
    }

    fn lower(&self, program: &KernelProgram, ctx: &CompilationContext) -> String {
        let mut e = Emitter {
            program,
            ctx,
            out: Vec::new(),
            indent: 0,
        };
        e.emit_module();
        let mut text = e.out.join("\n");
        text.push('\n');
        text
    }
}

struct Emitter<'a> {
    program: &'a KernelProgram,
    ctx: &'a CompilationContext,
    out: Vec<String>,
    indent: usize,
}

impl<'a> Emitter<'a> {
    fn line(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            self.out.push(String::new());
        } else {
            self.out.push(format!("{}{}", "    ".repeat(self.indent), text));
        }
    }

    fn emit_module(&mut self) {
        let ctx = self.ctx;
        for define in &ctx.global_defines {
            self.line(format_define(define));
        }
        self.line(workgroup_size_const(self.ctx));
        self.line("");

        self.emit_params();
        self.emit_storage();
        self.emit_shared();

        let helpers = self.program.helpers.clone();
        for helper in &helpers {
            self.emit_helper(helper);
        }

        self.emit_main();
    }

    fn emit_params(&mut self) {
        let members = scalar_params_members(self.ctx);
        if members.is_empty() {
            return;
        }
        self.line("struct Params {");
        self.indent += 1;
        for (name, ty) in &members {
            self.line(format!("@align(16) {}: {},", name, wgsl_type(*ty)));
        }
        self.indent -= 1;
        self.line("}");
        self.line("@group(0) @binding(0) var<uniform> params: Params;");
        self.line("");
    }

    fn emit_storage(&mut self) {
        let arrays: Vec<_> = self
            .ctx
            .arrays()
            .map(|u| (u.name.clone(), u.ty, u.readonly, u.binding_slot))
            .collect();
        for (name, ty, readonly, slot) in &arrays {
            let access = if *readonly { "read" } else { "read_write" };
            self.line(format!(
                "@group(0) @binding({}) var<storage, {}> {}: array<{}>;",
                slot,
                access,
                name,
                wgsl_type(*ty)
            ));
        }
        if !arrays.is_empty() {
            self.line("");
        }
    }

    fn emit_shared(&mut self) {
        let shared: Vec<_> = self
            .program
            .fields
            .iter()
            .filter_map(|f| match &f.kind {
                FieldKind::Shared { elem, size } => Some((f.name.clone(), *elem, *size)),
                _ => None,
            })
            .collect();
        for (name, elem, size) in &shared {
            self.line(format!(
                "var<workgroup> {}: array<{}, {}>;",
                name,
                wgsl_type(*elem),
                size
            ));
        }
        if !shared.is_empty() {
            self.line("");
        }
    }

    fn emit_helper(&mut self, helper: &Helper) {
        let params = helper
            .params
            .iter()
            .map(|(name, ty)| format!("{}: {}", name, wgsl_type(*ty)))
            .collect::<Vec<_>>()
            .join(", ");
        let signature = if helper.return_ty == Type::Void {
            format!("fn {}({}) {{", helper.name, params)
        } else {
            format!(
                "fn {}({}) -> {} {{",
                helper.name,
                params,
                wgsl_type(helper.return_ty)
            )
        };
        self.line(signature);
        self.indent += 1;
        self.emit_body(&helper.body);
        self.indent -= 1;
        self.line("}");
        self.line("");
    }

    fn emit_main(&mut self) {
        let [x, y, z] = self.ctx.thread_group_size;
        self.line(format!("@compute @workgroup_size({}, {}, {})", x, y, z));
        self.line("fn main(");
        self.indent += 1;
        self.line("@builtin(global_invocation_id) globalInvocationID: vec3<u32>,");
        self.line("@builtin(local_invocation_id) localInvocationID: vec3<u32>,");
        self.line("@builtin(workgroup_id) workGroupID: vec3<u32>,");
        self.indent -= 1;
        self.line(") {");
        self.indent += 1;
        let body = self.program.main_body.clone();
        self.emit_body(&body);
        self.indent -= 1;
        self.line("}");
    }

    fn emit_body(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.emit_stmt(stmt);
        }
    }

    fn emit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, ty, init } => {
                let init = self.expr(init);
                self.line(format!("var {}: {} = {};", name, wgsl_type(*ty), init));
            }
            Stmt::Assign { place, value } => {
                let place = self.place(place);
                let value = self.expr(value);
                self.line(format!("{} = {};", place, value));
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let cond = self.expr(cond);
                self.line(format!("if ({}) {{", cond));
                self.indent += 1;
                self.emit_body(then_body);
                self.indent -= 1;
                match else_body {
                    Some(else_body) => {
                        self.line("} else {");
                        self.indent += 1;
                        self.emit_body(else_body);
                        self.indent -= 1;
                        self.line("}");
                    }
                    None => self.line("}"),
                }
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                let init = self.stmt_inline(init);
                let cond = self.expr(cond);
                let step = self.stmt_inline(step);
                self.line(format!("for ({}; {}; {}) {{", init, cond, step));
                self.indent += 1;
                self.emit_body(body);
                self.indent -= 1;
                self.line("}");
            }
            Stmt::While { cond, body } => {
                let cond = self.expr(cond);
                self.line(format!("while ({}) {{", cond));
                self.indent += 1;
                self.emit_body(body);
                self.indent -= 1;
                self.line("}");
            }
            Stmt::Return(value) => match value {
                Some(v) => {
                    let v = self.expr(v);
                    self.line(format!("return {};", v));
                }
                None => self.line("return;"),
            },
            Stmt::Expr(expr) => {
                let text = self.expr(expr);
                self.line(format!("{};", text));
            }
        }
    }

    /// A statement rendered without its trailing semicolon, for `for` headers.
    fn stmt_inline(&mut self, stmt: &Stmt) -> String {
        match stmt {
            Stmt::Let { name, ty, init } => {
                format!("var {}: {} = {}", name, wgsl_type(*ty), self.expr(init))
            }
            Stmt::Assign { place, value } => {
                format!("{} = {}", self.place(place), self.expr(value))
            }
            _ => String::new(),
        }
    }

    fn place(&mut self, place: &Place) -> String {
        match place {
            Place::Local(name) => name.clone(),
            Place::Field(name) => self.field_ref(name),
            Place::Index { base, index } => {
                format!("{}[{}]", self.place(base), self.expr(index))
            }
            Place::Member { base, member } => format!("{}.{}", self.place(base), member),
        }
    }

    fn field_ref(&self, name: &str) -> String {
        match self.program.field(name).map(|f| &f.kind) {
            Some(FieldKind::Array { .. }) | Some(FieldKind::Shared { .. }) => name.to_string(),
            // scalar fields and runtime-bound defines live in the uniform block
            _ => format!("params.{}", name),
        }
    }

    fn expr(&mut self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::IntLit(n) => format_int(*n, expr.ty),
            ExprKind::FloatLit(v) => format_float(*v),
            ExprKind::BoolLit(b) => format!("{}", b),
            ExprKind::Local(name) => name.clone(),
            ExprKind::Field(name) => self.field_ref(name),
            ExprKind::Define(name) => name.clone(),
            ExprKind::Builtin(b) => b.name().to_string(),
            ExprKind::Member { base, member } => {
                format!("{}.{}", self.expr(base), member)
            }
            ExprKind::Index { base, index } => {
                format!("{}[{}]", self.expr(base), self.expr(index))
            }
            ExprKind::Call { callee, args } => self.call(callee, args),
            ExprKind::Unary { op, operand } => {
                let operand = self.expr(operand);
                match op {
                    UnOp::Neg => format!("(-{})", operand),
                    UnOp::Not => format!("(!{})", operand),
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                format!("({} {} {})", self.expr(lhs), op.as_str(), self.expr(rhs))
            }
            ExprKind::VectorLit(elems) => {
                let elems = elems
                    .iter()
                    .map(|e| self.expr(e))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}({})", wgsl_type(expr.ty), elems)
            }
        }
    }

    fn call(&mut self, callee: &Callee, args: &[Expr]) -> String {
        let args_text = args
            .iter()
            .map(|a| self.expr(a))
            .collect::<Vec<_>>()
            .join(", ");
        match callee {
            Callee::Helper(name) => format!("{}({})", name, args_text),
            Callee::Builtin(name) => match name.as_str() {
                "barrier" => "workgroupBarrier()".to_string(),
                "float" => format!("f32({})", args_text),
                "int" => format!("i32({})", args_text),
                "uint" => format!("u32({})", args_text),
                "vec2" => format!("vec2<f32>({})", args_text),
                "vec3" => format!("vec3<f32>({})", args_text),
                "vec4" => format!("vec4<f32>({})", args_text),
                // WGSL has no mod(); % is defined on both ints and floats
                "mod" => {
                    let a = self.expr(&args[0]);
                    let b = self.expr(&args[1]);
                    format!("({} % {})", a, b)
                }
                other => format!("{}({})", other, args_text),
            },
        }
    }
}
