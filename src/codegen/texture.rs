//! Texture-emulation lowering — emits a WGSL fragment pass.
//!
//! The fallback platform has no storage buffers, shared memory, or compute
//! entry points, so every array lives in a square rgba32float texture and
//! the kernel runs as a fullscreen pass writing one output texel per
//! fragment invocation:
//!
//! - texel count = ceil(len / elements_per_texel), side = ceil(sqrt(texels)),
//!   zero-padded tail; one logical element per texel
//! - the thread id is the fragment's normalized coordinate times the output
//!   side length, truncated; padding texels discard before any side effect
//! - every texture read goes through one emitted helper that turns an
//!   element index into a normalized sample coordinate (own texel and
//!   arbitrary index alike)
//! - writes to the output array accumulate into a local that becomes the
//!   fragment color; reads of an in/out array sample its input-side texture,
//!   which is what keeps ping-pong iteration correct
//! - `@shared` becomes a function-local scratch array and `barrier()` a
//!   no-op comment; the analyzer attaches a warning because a single
//!   invocation per texel cannot synchronize threads

use super::{
    format_define, format_float, format_int, scalar_params_members, wgsl_type, workgroup_size_const,
    Backend, KernelLowering,
};
use crate::ast::UnOp;
use crate::kir::{
    Callee, CompilationContext, Expr, ExprKind, FieldDirection, FieldKind, Helper, KernelProgram,
    Place, Stmt, Type,
};

pub struct TextureLowering;

impl TextureLowering {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextureLowering {
    fn default() -> Self {
        Self::new()
    }
}

/// Members of the fragment pass's uniform block, in deterministic order:
/// user scalars and runtime defines first, then a `side`/`len` pair per
/// input array, then the output side/len the thread id derives from. The
/// texture compute model packs its uniform buffer in exactly this order.
pub fn params_members(ctx: &CompilationContext) -> Vec<(String, Type)> {
    let mut members = scalar_params_members(ctx);
    for u in ctx.input_arrays() {
        members.push((format!("{}_side", u.name), Type::U32));
        members.push((format!("{}_len", u.name), Type::U32));
    }
    members.push(("riptide_out_side".to_string(), Type::U32));
    members.push(("riptide_out_len".to_string(), Type::U32));
    members
}

/// Texture binding slot for the i-th input array (binding 0 is the
/// uniform block).
pub fn texture_binding(input_index: usize) -> u32 {
    input_index as u32 + 1
}

impl KernelLowering for TextureLowering {
    fn backend(&self) -> Backend {
        Backend::Texture
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
        self.emit_textures();
        self.emit_fetch_helper();

        let helpers = self.program.helpers.clone();
        for helper in &helpers {
            self.emit_helper(helper);
        }

        self.emit_main();
    }

    fn emit_params(&mut self) {
        let members = params_members(self.ctx);
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

    fn emit_textures(&mut self) {
        let inputs: Vec<String> = self.ctx.input_arrays().map(|u| u.name.clone()).collect();
        for (i, name) in inputs.iter().enumerate() {
            self.line(format!(
                "@group(0) @binding({}) var {}_tex: texture_2d<f32>;",
                texture_binding(i),
                name
            ));
        }
        if !inputs.is_empty() {
            self.line("");
        }
    }

    /// One helper serves every read: element index → normalized sample
    /// coordinate → texel.
    fn emit_fetch_helper(&mut self) {
        self.line("fn riptide_fetch(tex: texture_2d<f32>, side: u32, index: u32) -> vec4<f32> {");
        self.indent += 1;
        self.line("let row = index / side;");
        self.line("let col = index - (row * side);");
        self.line("let uv = (vec2<f32>(f32(col), f32(row)) + vec2<f32>(0.5, 0.5)) / f32(side);");
        self.line("let texel = vec2<i32>(uv * f32(side));");
        self.line("return textureLoad(tex, texel, 0);");
        self.indent -= 1;
        self.line("}");
        self.line("");
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
        self.line("@fragment");
        self.line("fn fs_main(@builtin(position) riptide_pos: vec4<f32>) -> @location(0) vec4<f32> {");
        self.indent += 1;
        self.line("let riptide_side = params.riptide_out_side;");
        self.line("let riptide_norm = riptide_pos.xy / f32(riptide_side);");
        self.line(
            "let riptide_index = (u32(riptide_norm.y * f32(riptide_side)) * riptide_side) + u32(riptide_norm.x * f32(riptide_side));",
        );
        self.line("if (riptide_index >= params.riptide_out_len) {");
        self.indent += 1;
        self.line("discard;");
        self.indent -= 1;
        self.line("}");

        // The output accumulator starts from the in/out array's committed
        // state so a kernel that skips its own element behaves like the
        // native in-place path.
        let out_name = self.ctx.output.name.clone();
        if self.is_input_array(&out_name) {
            self.line(format!(
                "var riptide_out = riptide_fetch({}_tex, params.{}_side, riptide_index);",
                out_name, out_name
            ));
        } else {
            self.line("var riptide_out = vec4<f32>(0.0, 0.0, 0.0, 0.0);");
        }

        self.line("let globalInvocationID = vec3<u32>(riptide_index, 0u, 0u);");
        self.line("let localInvocationID = vec3<u32>(0u, 0u, 0u);");
        self.line("let workGroupID = vec3<u32>(0u, 0u, 0u);");

        // Shared scratch degrades to per-invocation locals here.
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
                "var {}: array<{}, {}>;",
                name,
                wgsl_type(*elem),
                size
            ));
        }

        let body = self.program.main_body.clone();
        self.emit_body(&body);

        self.line("return riptide_out;");
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
                if let Some(text) = self.output_assign(place, value) {
                    self.line(text);
                } else {
                    let place = self.place(place);
                    let value = self.expr(value);
                    self.line(format!("{} = {};", place, value));
                }
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
                // a bare return in @main still produces this fragment's texel
                None => self.line("return riptide_out;"),
            },
            Stmt::Expr(expr) => {
                if let ExprKind::Call {
                    callee: Callee::Builtin(name),
                    ..
                } = &expr.kind
                {
                    if name == "barrier" {
                        self.line("// barrier() has no effect on the texture backend");
                        return;
                    }
                }
                let text = self.expr(expr);
                self.line(format!("{};", text));
            }
        }
    }

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

    // ── Field classification ───────────────────────────────────────

    fn is_output_array(&self, name: &str) -> bool {
        name == self.ctx.output.name
            && matches!(
                self.program.field(name).map(|f| &f.kind),
                Some(FieldKind::Array { .. })
            )
    }

    fn is_input_array(&self, name: &str) -> bool {
        self.program
            .field(name)
            .map(|f| f.is_array() && f.direction.readable())
            .unwrap_or(false)
    }

    /// Writes into the output array land in the fragment's accumulator.
    /// The fallback computes one texel per invocation, so the write index
    /// is this invocation's own element; scatter writes are outside the
    /// emulation's model.
    fn output_assign(&mut self, place: &Place, value: &Expr) -> Option<String> {
        match place {
            Place::Index { base, .. } => match &**base {
                Place::Field(name) if self.is_output_array(name) => {
                    let packed = self.pack_output(value);
                    Some(format!("riptide_out = {};", packed))
                }
                _ => None,
            },
            Place::Member { base, member } => match &**base {
                Place::Index { base: inner, .. } => match &**inner {
                    Place::Field(name) if self.is_output_array(name) => {
                        let value = self.expr(value);
                        Some(format!("riptide_out.{} = {};", member, value))
                    }
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        }
    }

    /// Widen an element value to the vec4 fragment color.
    fn pack_output(&mut self, value: &Expr) -> String {
        let text = self.expr(value);
        match value.ty {
            Type::Vec4 => text,
            Type::Vec3 => format!("vec4<f32>({}, 0.0)", text),
            Type::Vec2 => format!("vec4<f32>({}, 0.0, 0.0)", text),
            _ => format!("vec4<f32>({}, 0.0, 0.0, 0.0)", text),
        }
    }

    /// Channel suffix extracting an element from its texel.
    fn fetch_suffix(elem: Type) -> &'static str {
        match elem {
            Type::Vec4 => "",
            Type::Vec3 => ".xyz",
            Type::Vec2 => ".xy",
            _ => ".x",
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
            Some(FieldKind::Shared { .. }) => name.to_string(),
            Some(FieldKind::Array { .. }) => name.to_string(),
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
            ExprKind::Index { base, index } => self.index_expr(base, index),
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

    fn index_expr(&mut self, base: &Expr, index: &Expr) -> String {
        if let ExprKind::Field(name) = &base.kind {
            let field = self.program.field(name);
            if let Some(field) = field {
                match &field.kind {
                    FieldKind::Shared { .. } => {
                        let idx = self.expr(index);
                        return format!("{}[{}]", name, idx);
                    }
                    FieldKind::Array { elem } => {
                        let elem = *elem;
                        if field.direction == FieldDirection::Out {
                            // write-only array: nothing to sample
                            return match elem {
                                Type::Vec2 => "vec2<f32>(0.0)".to_string(),
                                Type::Vec3 => "vec3<f32>(0.0)".to_string(),
                                Type::Vec4 => "vec4<f32>(0.0)".to_string(),
                                _ => "0.0".to_string(),
                            };
                        }
                        let idx = self.expr(index);
                        return format!(
                            "riptide_fetch({}_tex, params.{}_side, u32({})){}",
                            name,
                            name,
                            idx,
                            Self::fetch_suffix(elem)
                        );
                    }
                    _ => {}
                }
            }
        }
        format!("{}[{}]", self.expr(base), self.expr(index))
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
                "float" => format!("f32({})", args_text),
                "int" => format!("i32({})", args_text),
                "uint" => format!("u32({})", args_text),
                "vec2" => format!("vec2<f32>({})", args_text),
                "vec3" => format!("vec3<f32>({})", args_text),
                "vec4" => format!("vec4<f32>({})", args_text),
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
