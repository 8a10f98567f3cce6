//! Dialect analyzer: turns the generic syntax tree into a typed kernel.
//!
//! This is the single place that interprets decorator syntax. Class fields
//! become `FieldDescriptor`s, global consts become defines, method bodies
//! are type-checked into KIR statements, and binding slots are assigned
//! deterministically (scalars share slot 0, arrays count up from 1 in
//! declaration order). One error aborts compilation; there is no recovery.

use std::collections::HashMap;

use crate::ast::{self, BinOp, UnOp};
use crate::diagnostic::Diagnostic;
use crate::kir::{
    BuiltinValue, Callee, CompilationContext, Expr, ExprKind, FieldDescriptor, FieldDirection,
    FieldKind, GlobalDefine, Helper, KernelProgram, OutputDescriptor, Place, Stmt, Type,
    UniformDescriptor,
};
use crate::span::{Span, Spanned};

/// The analyzer's product: a typed program, its execution context, and any
/// non-fatal warnings (e.g. barrier use, which the texture backend cannot
/// honor).
pub struct Analysis {
    pub program: KernelProgram,
    pub context: CompilationContext,
    pub warnings: Vec<Diagnostic>,
}

pub fn analyze(module: &ast::Module) -> Result<Analysis, Vec<Diagnostic>> {
    Analyzer::default().run(module)
}

#[derive(Default)]
struct Analyzer {
    diagnostics: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
    fields: Vec<FieldDescriptor>,
    defines: Vec<GlobalDefine>,
    runtime_defines: Vec<(String, Type)>,
    helper_sigs: HashMap<String, (Vec<Type>, Type)>,
    scopes: Vec<HashMap<String, Type>>,
    in_main: bool,
    return_ty: Type,
    uses_barrier: Option<Span>,
}

impl Analyzer {
    fn run(mut self, module: &ast::Module) -> Result<Analysis, Vec<Diagnostic>> {
        let mut classes = Vec::new();
        for item in &module.items {
            match &item.node {
                ast::Item::Const(c) => self.collect_const(c),
                ast::Item::Class(c) => classes.push((c, item.span)),
            }
        }

        let class = match classes.len() {
            0 => {
                self.error(
                    "source contains no kernel class".to_string(),
                    Span::dummy(),
                    Some("declare a class with a @main method".to_string()),
                );
                return Err(self.diagnostics);
            }
            1 => classes[0].0,
            _ => {
                self.error(
                    "source contains more than one kernel class".to_string(),
                    classes[1].1,
                    Some("a kernel source compiles exactly one class".to_string()),
                );
                return Err(self.diagnostics);
            }
        };

        let (thread_group_size, dispatch, max_iteration) = self.class_decorators(class);
        self.collect_fields(class);
        let output = self.resolve_output(class);

        // Helper signatures first, so helpers can call each other and
        // main can call helpers regardless of declaration order.
        let mut mains = Vec::new();
        let mut helper_defs = Vec::new();
        for method in &class.methods {
            let is_main = method.decorators.iter().any(|d| d.name.node == "main");
            for d in &method.decorators {
                if d.name.node != "main" {
                    self.error(
                        format!("unknown method decorator '@{}'", d.name.node),
                        d.name.span,
                        Some("the only method decorator is @main".to_string()),
                    );
                }
            }
            if is_main {
                mains.push(method);
            } else {
                let params: Vec<Type> = method
                    .params
                    .iter()
                    .map(|p| self.value_type(&p.ty))
                    .collect();
                let ret = method
                    .return_ty
                    .as_ref()
                    .map(|t| self.value_type(t))
                    .unwrap_or(Type::Void);
                self.helper_sigs
                    .insert(method.name.node.clone(), (params, ret));
                helper_defs.push(method);
            }
        }

        let main = match mains.len() {
            1 => mains[0],
            0 => {
                self.error(
                    format!("class '{}' has no @main method", class.name.node),
                    class.name.span,
                    Some("annotate exactly one method with @main".to_string()),
                );
                return Err(self.diagnostics);
            }
            _ => {
                self.error(
                    format!("class '{}' has more than one @main method", class.name.node),
                    mains[1].name.span,
                    None,
                );
                return Err(self.diagnostics);
            }
        };
        if !main.params.is_empty() {
            self.error(
                "the @main method takes no parameters".to_string(),
                main.name.span,
                Some("thread ids come from builtins like globalInvocationID".to_string()),
            );
        }

        let helpers: Vec<Helper> = helper_defs
            .iter()
            .map(|m| self.check_helper(m))
            .collect();
        let main_body = self.check_main(main);

        if crate::diagnostic::has_errors(&self.diagnostics) {
            return Err(self.diagnostics);
        }

        // Shared memory and barriers only exist on the native backend.
        if let Some(span) = self.shared_or_barrier_span() {
            self.warnings.push(
                Diagnostic::warning(
                    "kernel uses workgroup shared memory or barrier()".to_string(),
                    span,
                )
                .with_note(
                    "the texture backend runs one invocation per texel and cannot \
                     synchronize threads; results will diverge there"
                        .to_string(),
                ),
            );
        }

        let uniforms = self.build_uniforms();
        let need_pingpong = self
            .fields
            .iter()
            .any(|f| f.name == output.name && f.direction == FieldDirection::InOut);

        let context = CompilationContext {
            dispatch,
            thread_group_size,
            uniforms,
            output,
            max_iteration,
            need_pingpong,
            global_defines: self.defines.clone(),
        };

        let program = KernelProgram {
            name: class.name.node.clone(),
            fields: self.fields.clone(),
            helpers,
            main_body,
        };

        Ok(Analysis {
            program,
            context,
            warnings: self.warnings,
        })
    }

    // ── Declarations ───────────────────────────────────────────────

    fn collect_const(&mut self, c: &ast::ConstDef) {
        let annotated = c.ty.as_ref().map(|t| self.value_type(t));
        match &c.value {
            Some(value) => {
                let (literal, literal_ty) = match self.const_literal(value) {
                    Some(v) => v,
                    None => return,
                };
                let ty = annotated.unwrap_or(literal_ty);
                self.defines.push(GlobalDefine {
                    name: c.name.node.clone(),
                    ty,
                    value: literal,
                });
            }
            None => {
                // No initializer: bound at runtime like a scalar uniform.
                let ty = annotated.unwrap_or(Type::F32);
                if !ty.is_numeric() && ty != Type::Bool {
                    self.error(
                        format!("runtime const '{}' must be scalar-typed", c.name.node),
                        c.name.span,
                        None,
                    );
                }
                self.runtime_defines.push((c.name.node.clone(), ty));
            }
        }
    }

    fn const_literal(&mut self, expr: &Spanned<ast::Expr>) -> Option<(f64, Type)> {
        match &expr.node {
            ast::Expr::IntLit(n) => Some((*n as f64, Type::I32)),
            ast::Expr::FloatLit(v) => Some((*v, Type::F32)),
            ast::Expr::Unary {
                op: UnOp::Neg,
                operand,
            } => {
                let (v, ty) = self.const_literal(operand)?;
                Some((-v, ty))
            }
            _ => {
                self.error(
                    "const initializer must be a numeric literal".to_string(),
                    expr.span,
                    None,
                );
                None
            }
        }
    }

    fn class_decorators(&mut self, class: &ast::ClassDef) -> ([u32; 3], [u32; 3], u32) {
        let mut numthreads = None;
        let mut dispatch = [1u32, 1, 1];
        let mut max_iteration = 1u32;

        for d in &class.decorators {
            match d.name.node.as_str() {
                "numthreads" => numthreads = self.triple(d),
                "dispatch" => {
                    if let Some(t) = self.triple(d) {
                        dispatch = t;
                    }
                }
                "iterations" => {
                    if let Some(n) = self.single(d) {
                        max_iteration = n;
                    }
                }
                other => self.error(
                    format!("unknown class decorator '@{}'", other),
                    d.name.span,
                    Some("class decorators are @numthreads, @dispatch, and @iterations".to_string()),
                ),
            }
        }

        let thread_group_size = match numthreads {
            Some(t) => t,
            None => {
                self.error(
                    format!("class '{}' is missing @numthreads", class.name.node),
                    class.name.span,
                    Some("declare the thread group shape, e.g. @numthreads(8, 1, 1)".to_string()),
                );
                [1, 1, 1]
            }
        };
        (thread_group_size, dispatch, max_iteration)
    }

    fn triple(&mut self, d: &ast::Decorator) -> Option<[u32; 3]> {
        if d.args.len() != 3 {
            self.error(
                format!("@{} takes exactly three integer arguments", d.name.node),
                d.name.span,
                None,
            );
            return None;
        }
        let mut out = [0u32; 3];
        for (i, arg) in d.args.iter().enumerate() {
            out[i] = self.decorator_int(arg)?;
        }
        Some(out)
    }

    fn single(&mut self, d: &ast::Decorator) -> Option<u32> {
        if d.args.len() != 1 {
            self.error(
                format!("@{} takes exactly one integer argument", d.name.node),
                d.name.span,
                None,
            );
            return None;
        }
        self.decorator_int(&d.args[0])
    }

    fn decorator_int(&mut self, expr: &Spanned<ast::Expr>) -> Option<u32> {
        match &expr.node {
            ast::Expr::IntLit(n) if *n >= 0 => Some(*n as u32),
            _ => {
                self.error(
                    "decorator argument must be a non-negative integer literal".to_string(),
                    expr.span,
                    None,
                );
                None
            }
        }
    }

    fn collect_fields(&mut self, class: &ast::ClassDef) {
        let mut next_array_slot = 1u32;
        for field in &class.fields {
            let mut has_in = false;
            let mut has_out = false;
            let mut out_length = None;
            let mut shared_size = None;
            let mut has_shared = false;

            for d in &field.decorators {
                match d.name.node.as_str() {
                    "in" => has_in = true,
                    "out" => {
                        has_out = true;
                        if let Some(arg) = d.args.first() {
                            out_length = self.decorator_int(arg);
                        }
                    }
                    "shared" => {
                        has_shared = true;
                        if let Some(arg) = d.args.first() {
                            shared_size = self.decorator_int(arg);
                        }
                    }
                    other => self.error(
                        format!("unknown field decorator '@{}'", other),
                        d.name.span,
                        Some("field decorators are @in, @out(length?), and @shared(size)".to_string()),
                    ),
                }
            }

            if has_shared && (has_in || has_out) {
                self.error(
                    format!("field '{}' combines @shared with @in/@out", field.name.node),
                    field.name.span,
                    Some("shared scratch is never bound as a GPU resource".to_string()),
                );
                continue;
            }
            if !has_shared && !has_in && !has_out {
                self.error(
                    format!("field '{}' has no decorator", field.name.node),
                    field.name.span,
                    Some("every field is @in, @out, or @shared".to_string()),
                );
                continue;
            }

            let (declared_len, elem) = match &field.ty.node {
                ast::Type::Array(elem, len) => (*len, Some(self.array_elem_type(elem, field))),
                _ => (None, None),
            };

            if has_shared {
                let Some(elem) = elem else {
                    self.error(
                        format!("@shared field '{}' must be an array", field.name.node),
                        field.name.span,
                        None,
                    );
                    continue;
                };
                let size = match shared_size.or(declared_len) {
                    Some(s) => s,
                    None => {
                        self.error(
                            format!("@shared field '{}' needs a size", field.name.node),
                            field.name.span,
                            Some("write @shared(64) or declare the array as float[64]".to_string()),
                        );
                        continue;
                    }
                };
                self.fields.push(FieldDescriptor {
                    name: field.name.node.clone(),
                    direction: FieldDirection::In,
                    kind: FieldKind::Shared { elem, size },
                    fixed_length: Some(size),
                    binding_slot: 0,
                    span: field.name.span,
                });
                continue;
            }

            let direction = match (has_in, has_out) {
                (true, true) => FieldDirection::InOut,
                (true, false) => FieldDirection::In,
                (false, true) => FieldDirection::Out,
                (false, false) => unreachable!(),
            };

            match elem {
                Some(elem) => {
                    let fixed_length = out_length.or(declared_len);
                    if direction == FieldDirection::Out && fixed_length.is_none() {
                        self.error(
                            format!(
                                "@out field '{}' needs an explicit length",
                                field.name.node
                            ),
                            field.name.span,
                            Some(
                                "no CPU-side data exists to infer it from; write @out(1024) \
                                 or declare float[1024]"
                                    .to_string(),
                            ),
                        );
                        continue;
                    }
                    self.fields.push(FieldDescriptor {
                        name: field.name.node.clone(),
                        direction,
                        kind: FieldKind::Array { elem },
                        fixed_length,
                        binding_slot: next_array_slot,
                        span: field.name.span,
                    });
                    next_array_slot += 1;
                }
                None => {
                    if direction != FieldDirection::In {
                        self.error(
                            format!("field '{}' cannot be @out", field.name.node),
                            field.name.span,
                            Some("the kernel output must be an array field".to_string()),
                        );
                        continue;
                    }
                    let ty = self.value_type(&field.ty);
                    let kind = if ty.is_vector() {
                        FieldKind::Vector(ty)
                    } else {
                        FieldKind::Scalar(ty)
                    };
                    self.fields.push(FieldDescriptor {
                        name: field.name.node.clone(),
                        direction,
                        kind,
                        fixed_length: None,
                        binding_slot: 0,
                        span: field.name.span,
                    });
                }
            }
        }
    }

    fn array_elem_type(&mut self, elem: &ast::Type, field: &ast::FieldDef) -> Type {
        match elem {
            ast::Type::Float => Type::F32,
            ast::Type::Int => Type::I32,
            ast::Type::Uint => Type::U32,
            ast::Type::Vec2 => Type::Vec2,
            ast::Type::Vec3 => Type::Vec3,
            ast::Type::Vec4 => Type::Vec4,
            _ => {
                self.error(
                    format!(
                        "field '{}' has an unsupported array element type",
                        field.name.node
                    ),
                    field.ty.span,
                    Some("array elements are float, int, uint, or vec2/3/4".to_string()),
                );
                Type::F32
            }
        }
    }

    fn value_type(&mut self, ty: &Spanned<ast::Type>) -> Type {
        match &ty.node {
            ast::Type::Float => Type::F32,
            ast::Type::Int => Type::I32,
            ast::Type::Uint => Type::U32,
            ast::Type::Bool => Type::Bool,
            ast::Type::Vec2 => Type::Vec2,
            ast::Type::Vec3 => Type::Vec3,
            ast::Type::Vec4 => Type::Vec4,
            ast::Type::Array(..) => {
                self.error(
                    "array types are only valid on class fields".to_string(),
                    ty.span,
                    None,
                );
                Type::F32
            }
        }
    }

    fn resolve_output(&mut self, class: &ast::ClassDef) -> OutputDescriptor {
        let outputs: Vec<(String, Option<u32>, u32, Span)> = self
            .fields
            .iter()
            .filter(|f| f.direction.writable())
            .map(|f| {
                (
                    f.name.clone(),
                    f.fixed_length,
                    f.elem_type().elements_per_texel(),
                    f.span,
                )
            })
            .collect();
        match outputs.len() {
            1 => {
                let (name, length, elements_per_texel, _) = outputs.into_iter().next().unwrap();
                OutputDescriptor {
                    name,
                    length,
                    elements_per_texel,
                }
            }
            0 => {
                self.error(
                    format!("class '{}' has no @out field", class.name.node),
                    class.name.span,
                    Some("exactly one array field must carry @out".to_string()),
                );
                OutputDescriptor {
                    name: String::new(),
                    length: None,
                    elements_per_texel: 1,
                }
            }
            _ => {
                let (name, _, _, span) = outputs[1].clone();
                self.error(
                    format!("field '{}' is a second @out", name),
                    span,
                    Some("a kernel reads back exactly one output".to_string()),
                );
                OutputDescriptor {
                    name,
                    length: None,
                    elements_per_texel: 1,
                }
            }
        }
    }

    fn build_uniforms(&self) -> Vec<UniformDescriptor> {
        let mut uniforms = Vec::new();
        for f in &self.fields {
            match &f.kind {
                FieldKind::Shared { .. } => {}
                FieldKind::Scalar(ty) | FieldKind::Vector(ty) => uniforms.push(UniformDescriptor {
                    name: f.name.clone(),
                    ty: *ty,
                    is_array: false,
                    readonly: true,
                    writeonly: false,
                    binding_slot: 0,
                    fixed_length: None,
                    elements_per_texel: 1,
                }),
                FieldKind::Array { elem } => uniforms.push(UniformDescriptor {
                    name: f.name.clone(),
                    ty: *elem,
                    is_array: true,
                    readonly: f.direction == FieldDirection::In,
                    writeonly: f.direction == FieldDirection::Out,
                    binding_slot: f.binding_slot,
                    fixed_length: f.fixed_length,
                    elements_per_texel: elem.elements_per_texel(),
                }),
            }
        }
        for (name, ty) in &self.runtime_defines {
            uniforms.push(UniformDescriptor {
                name: name.clone(),
                ty: *ty,
                is_array: false,
                readonly: true,
                writeonly: false,
                binding_slot: 0,
                fixed_length: None,
                elements_per_texel: 1,
            });
        }
        uniforms
    }

    fn shared_or_barrier_span(&self) -> Option<Span> {
        if let Some(span) = self.uses_barrier {
            return Some(span);
        }
        self.fields.iter().find(|f| f.is_shared()).map(|f| f.span)
    }

    // ── Method bodies ──────────────────────────────────────────────

    fn check_helper(&mut self, method: &ast::MethodDef) -> Helper {
        let (param_tys, ret) = self.helper_sigs[&method.name.node].clone();
        self.in_main = false;
        self.return_ty = ret;
        self.scopes.clear();
        let mut scope = HashMap::new();
        let mut params = Vec::new();
        for (p, ty) in method.params.iter().zip(&param_tys) {
            scope.insert(p.name.node.clone(), *ty);
            params.push((p.name.node.clone(), *ty));
        }
        self.scopes.push(scope);
        let body = self.check_block(&method.body.node);
        self.scopes.pop();
        Helper {
            name: method.name.node.clone(),
            params,
            return_ty: ret,
            body,
        }
    }

    fn check_main(&mut self, method: &ast::MethodDef) -> Vec<Stmt> {
        self.in_main = true;
        self.return_ty = Type::Void;
        self.scopes.clear();
        self.scopes.push(HashMap::new());
        let body = self.check_block(&method.body.node);
        self.scopes.pop();
        body
    }

    fn check_block(&mut self, block: &ast::Block) -> Vec<Stmt> {
        self.scopes.push(HashMap::new());
        let stmts = block
            .stmts
            .iter()
            .map(|s| self.check_stmt(s))
            .collect();
        self.scopes.pop();
        stmts
    }

    fn check_stmt(&mut self, stmt: &Spanned<ast::Stmt>) -> Stmt {
        match &stmt.node {
            ast::Stmt::Let { name, ty, init } => {
                let mut value = self.infer(init);
                let ty = match ty {
                    Some(annotation) => {
                        let target = self.value_type(annotation);
                        value = self.coerce(value, target, init.span);
                        target
                    }
                    None => {
                        finalize(&mut value);
                        value.ty
                    }
                };
                finalize(&mut value);
                self.declare_local(&name.node, ty, name.span);
                Stmt::Let {
                    name: name.node.clone(),
                    ty,
                    init: value,
                }
            }
            ast::Stmt::Assign { target, op, value } => {
                let Some((place, place_ty)) = self.build_place(target) else {
                    return Stmt::Expr(Expr {
                        kind: ExprKind::IntLit(0),
                        ty: Type::I32,
                    });
                };
                if let Place::Field(fname) = &place {
                    let is_array = self
                        .fields
                        .iter()
                        .any(|f| &f.name == fname && (f.is_array() || f.is_shared()));
                    if is_array {
                        self.error(
                            format!("assign to an element of '{}', not the whole array", fname),
                            target.span,
                            None,
                        );
                    }
                }
                let rhs = self.infer(value);
                let mut rhs = self.coerce(rhs, place_ty, value.span);
                let mut full = match op.binary_op() {
                    None => rhs,
                    Some(bin) => {
                        // Desugar `place += v` to `place = place + v` so the
                        // lowerings only see plain assignment.
                        finalize(&mut rhs);
                        Expr {
                            kind: ExprKind::Binary {
                                op: bin,
                                lhs: Box::new(place_to_expr(&place, place_ty)),
                                rhs: Box::new(rhs),
                            },
                            ty: place_ty,
                        }
                    }
                };
                finalize(&mut full);
                Stmt::Assign { place, value: full }
            }
            ast::Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.check_cond(cond);
                let then_body = self.check_block(&then_block.node);
                let else_body = else_block.as_ref().map(|b| self.check_block(&b.node));
                Stmt::If {
                    cond,
                    then_body,
                    else_body,
                }
            }
            ast::Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                // The loop variable scopes over cond/step/body.
                self.scopes.push(HashMap::new());
                let init = self.check_stmt(init);
                let cond = self.check_cond(cond);
                let step = self.check_stmt(step);
                let body = self.check_block(&body.node);
                self.scopes.pop();
                Stmt::For {
                    init: Box::new(init),
                    cond,
                    step: Box::new(step),
                    body,
                }
            }
            ast::Stmt::While { cond, body } => {
                let cond = self.check_cond(cond);
                let body = self.check_block(&body.node);
                Stmt::While { cond, body }
            }
            ast::Stmt::Return(value) => match (value, self.return_ty) {
                (None, _) => Stmt::Return(None),
                (Some(v), Type::Void) => {
                    self.error(
                        "this method does not return a value".to_string(),
                        v.span,
                        None,
                    );
                    Stmt::Return(None)
                }
                (Some(v), ret) => {
                    let value = self.infer(v);
                    let mut value = self.coerce(value, ret, v.span);
                    finalize(&mut value);
                    Stmt::Return(Some(value))
                }
            },
            ast::Stmt::Expr(e) => {
                let mut value = self.infer(e);
                finalize(&mut value);
                Stmt::Expr(value)
            }
        }
    }

    fn check_cond(&mut self, cond: &Spanned<ast::Expr>) -> Expr {
        let value = self.infer(cond);
        let mut value = self.coerce(value, Type::Bool, cond.span);
        finalize(&mut value);
        value
    }

    fn declare_local(&mut self, name: &str, ty: Type, span: Span) {
        if self.lookup_local(name).is_some() {
            self.error(format!("'{}' is already defined", name), span, None);
        }
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.to_string(), ty);
    }

    fn lookup_local(&self, name: &str) -> Option<Type> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    // ── Places ─────────────────────────────────────────────────────

    fn build_place(&mut self, target: &Spanned<ast::Expr>) -> Option<(Place, Type)> {
        match &target.node {
            ast::Expr::Var(name) => {
                if let Some(ty) = self.lookup_local(name) {
                    return Some((Place::Local(name.clone()), ty));
                }
                self.field_place(name, target.span)
            }
            ast::Expr::Member { base, member } => {
                if matches!(base.node, ast::Expr::This) {
                    return self.field_place(&member.node, member.span);
                }
                let (base_place, base_ty) = self.build_place(base)?;
                let component = self.swizzle_type(base_ty, &member.node, member.span)?;
                if member.node.len() != 1 {
                    self.error(
                        "cannot assign to a multi-component swizzle".to_string(),
                        member.span,
                        None,
                    );
                    return None;
                }
                Some((
                    Place::Member {
                        base: Box::new(base_place),
                        member: member.node.clone(),
                    },
                    component,
                ))
            }
            ast::Expr::Index { base, index } => {
                let (base_place, base_ty) = self.build_place(base)?;
                let mut idx = self.infer(index);
                finalize(&mut idx);
                if !idx.ty.is_numeric() {
                    self.error("array index must be an integer".to_string(), index.span, None);
                }
                // Indexing the field itself yields the element type (already
                // carried on the place); indexing a vector yields a component.
                let elem_ty = match &base_place {
                    Place::Field(_) => base_ty,
                    _ => base_ty.component(),
                };
                Some((
                    Place::Index {
                        base: Box::new(base_place),
                        index: idx,
                    },
                    elem_ty,
                ))
            }
            _ => {
                self.error("invalid assignment target".to_string(), target.span, None);
                None
            }
        }
    }

    fn field_place(&mut self, name: &str, span: Span) -> Option<(Place, Type)> {
        if !self.in_main {
            self.error(
                format!("field '{}' can only be written inside @main", name),
                span,
                Some("helpers compute values; the @main method owns all field writes".to_string()),
            );
            return None;
        }
        let Some((kind, direction)) = self
            .fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| (f.kind.clone(), f.direction))
        else {
            self.error(format!("unknown name '{}'", name), span, None);
            return None;
        };
        match kind {
            FieldKind::Scalar(_) | FieldKind::Vector(_) => {
                self.error(
                    format!("cannot assign to uniform field '{}'", name),
                    span,
                    Some("scalar and vector fields are read-only inputs".to_string()),
                );
                None
            }
            FieldKind::Array { elem } => {
                if direction == FieldDirection::In {
                    self.error(
                        format!("cannot write to @in field '{}'", name),
                        span,
                        Some("add @out to make the field writable".to_string()),
                    );
                    return None;
                }
                Some((Place::Field(name.to_string()), elem))
            }
            FieldKind::Shared { elem, .. } => Some((Place::Field(name.to_string()), elem)),
        }
    }

    // ── Expressions ────────────────────────────────────────────────

    fn infer(&mut self, expr: &Spanned<ast::Expr>) -> Expr {
        match &expr.node {
            ast::Expr::IntLit(n) => Expr {
                kind: ExprKind::IntLit(*n),
                ty: Type::AbstractInt,
            },
            ast::Expr::FloatLit(v) => Expr {
                kind: ExprKind::FloatLit(*v),
                ty: Type::F32,
            },
            ast::Expr::BoolLit(b) => Expr {
                kind: ExprKind::BoolLit(*b),
                ty: Type::Bool,
            },
            ast::Expr::This => {
                self.error(
                    "'this' is only valid as 'this.field' or 'this.method(..)'".to_string(),
                    expr.span,
                    None,
                );
                Expr {
                    kind: ExprKind::IntLit(0),
                    ty: Type::I32,
                }
            }
            ast::Expr::Var(name) => self.resolve_name(name, expr.span),
            ast::Expr::Member { base, member } => {
                if matches!(base.node, ast::Expr::This) {
                    return self.resolve_field(&member.node, member.span);
                }
                let base = self.infer(base);
                let Some(ty) = self.swizzle_type(base.ty, &member.node, member.span) else {
                    return base;
                };
                Expr {
                    kind: ExprKind::Member {
                        base: Box::new(base),
                        member: member.node.clone(),
                    },
                    ty,
                }
            }
            ast::Expr::Index { base, index } => {
                let base = self.infer(base);
                let mut idx = self.infer(index);
                finalize(&mut idx);
                if !idx.ty.is_numeric() {
                    self.error("array index must be an integer".to_string(), index.span, None);
                }
                let ty = match &base.kind {
                    ExprKind::Field(name) => self
                        .fields
                        .iter()
                        .find(|f| &f.name == name)
                        .map(|f| f.elem_type())
                        .unwrap_or(Type::F32),
                    _ => base.ty.component(),
                };
                Expr {
                    kind: ExprKind::Index {
                        base: Box::new(base),
                        index: Box::new(idx),
                    },
                    ty,
                }
            }
            ast::Expr::Call { callee, args } => self.infer_call(callee, args, expr.span),
            ast::Expr::Unary { op, operand } => {
                let inner = self.infer(operand);
                let ty = match op {
                    UnOp::Neg => {
                        if inner.ty == Type::Bool {
                            self.error("cannot negate a bool".to_string(), operand.span, None);
                        }
                        inner.ty
                    }
                    UnOp::Not => {
                        let coerced = self.coerce(inner, Type::Bool, operand.span);
                        return Expr {
                            kind: ExprKind::Unary {
                                op: *op,
                                operand: Box::new(coerced),
                            },
                            ty: Type::Bool,
                        };
                    }
                };
                Expr {
                    kind: ExprKind::Unary {
                        op: *op,
                        operand: Box::new(inner),
                    },
                    ty,
                }
            }
            ast::Expr::Binary { op, lhs, rhs } => self.infer_binary(*op, lhs, rhs, expr.span),
            ast::Expr::ArrayLit(elems) => {
                let n = elems.len();
                if !(2..=4).contains(&n) {
                    self.error(
                        format!("vector literal needs 2 to 4 components, has {}", n),
                        expr.span,
                        None,
                    );
                }
                let elems: Vec<Expr> = elems
                    .iter()
                    .map(|e| {
                        let v = self.infer(e);
                        self.coerce(v, Type::F32, e.span)
                    })
                    .collect();
                Expr {
                    kind: ExprKind::VectorLit(elems),
                    ty: Type::vector_of(n as u32).unwrap_or(Type::Vec4),
                }
            }
        }
    }

    fn resolve_name(&mut self, name: &str, span: Span) -> Expr {
        if let Some(ty) = self.lookup_local(name) {
            return Expr {
                kind: ExprKind::Local(name.to_string()),
                ty,
            };
        }
        if self.fields.iter().any(|f| f.name == name) {
            return self.resolve_field(name, span);
        }
        if let Some(def) = self.defines.iter().find(|d| d.name == name) {
            return Expr {
                kind: ExprKind::Define(name.to_string()),
                ty: def.ty,
            };
        }
        if let Some((_, ty)) = self.runtime_defines.iter().find(|(n, _)| n == name) {
            return Expr {
                kind: ExprKind::Field(name.to_string()),
                ty: *ty,
            };
        }
        if let Some(builtin) = BuiltinValue::from_name(name) {
            if !self.in_main {
                self.error(
                    format!("'{}' is only available inside the @main method", name),
                    span,
                    Some("pass the value into the helper as a parameter".to_string()),
                );
            }
            return Expr {
                kind: ExprKind::Builtin(builtin),
                ty: Type::UVec3,
            };
        }
        self.error(format!("unknown name '{}'", name), span, None);
        Expr {
            kind: ExprKind::Local(name.to_string()),
            ty: Type::F32,
        }
    }

    fn resolve_field(&mut self, name: &str, span: Span) -> Expr {
        let Some((elem_ty, is_shared)) = self
            .fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| (f.elem_type(), f.is_shared()))
        else {
            self.error(format!("unknown field '{}'", name), span, None);
            return Expr {
                kind: ExprKind::Field(name.to_string()),
                ty: Type::F32,
            };
        };
        if is_shared && !self.in_main {
            self.error(
                format!("shared field '{}' is only accessible inside @main", name),
                span,
                Some("pass values into the helper as parameters".to_string()),
            );
        }
        // An array field expression carries its element type; it only
        // appears under an index.
        Expr {
            kind: ExprKind::Field(name.to_string()),
            ty: elem_ty,
        }
    }

    fn swizzle_type(&mut self, base: Type, pattern: &str, span: Span) -> Option<Type> {
        let Some(size) = base.vector_size() else {
            self.error(
                format!("'.{}' needs a vector, found {:?}", pattern, base),
                span,
                None,
            );
            return None;
        };
        let valid = pattern.chars().all(|c| {
            let lane = match c {
                'x' => 0,
                'y' => 1,
                'z' => 2,
                'w' => 3,
                _ => return false,
            };
            lane < size
        });
        if !valid || pattern.is_empty() || pattern.len() > 4 {
            self.error(format!("invalid swizzle '.{}'", pattern), span, None);
            return None;
        }
        if pattern.len() == 1 {
            return Some(base.component());
        }
        if base == Type::UVec3 {
            self.error(
                "multi-component swizzles are only supported on float vectors".to_string(),
                span,
                None,
            );
            return None;
        }
        Type::vector_of(pattern.len() as u32)
    }

    fn infer_binary(
        &mut self,
        op: BinOp,
        lhs: &Spanned<ast::Expr>,
        rhs: &Spanned<ast::Expr>,
        span: Span,
    ) -> Expr {
        let left = self.infer(lhs);
        let right = self.infer(rhs);

        match op {
            BinOp::And | BinOp::Or => {
                let left = self.coerce(left, Type::Bool, lhs.span);
                let right = self.coerce(right, Type::Bool, rhs.span);
                Expr {
                    kind: ExprKind::Binary {
                        op,
                        lhs: Box::new(left),
                        rhs: Box::new(right),
                    },
                    ty: Type::Bool,
                }
            }
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let (left, right) = self.unify_pair(left, right, span);
                Expr {
                    kind: ExprKind::Binary {
                        op,
                        lhs: Box::new(left),
                        rhs: Box::new(right),
                    },
                    ty: Type::Bool,
                }
            }
            _ => {
                // vec ⊕ scalar keeps the vector type (WGSL mixed operators)
                if left.ty.is_vector() && (right.ty == Type::F32 || right.ty == Type::AbstractInt) {
                    let ty = left.ty;
                    let right = self.coerce(right, Type::F32, rhs.span);
                    return Expr {
                        kind: ExprKind::Binary {
                            op,
                            lhs: Box::new(left),
                            rhs: Box::new(right),
                        },
                        ty,
                    };
                }
                if right.ty.is_vector() && (left.ty == Type::F32 || left.ty == Type::AbstractInt) {
                    let ty = right.ty;
                    let left = self.coerce(left, Type::F32, lhs.span);
                    return Expr {
                        kind: ExprKind::Binary {
                            op,
                            lhs: Box::new(left),
                            rhs: Box::new(right),
                        },
                        ty,
                    };
                }
                let (left, right) = self.unify_pair(left, right, span);
                let ty = left.ty;
                Expr {
                    kind: ExprKind::Binary {
                        op,
                        lhs: Box::new(left),
                        rhs: Box::new(right),
                    },
                    ty,
                }
            }
        }
    }

    fn unify_pair(&mut self, left: Expr, right: Expr, span: Span) -> (Expr, Expr) {
        if left.ty == right.ty {
            return (left, right);
        }
        if left.ty == Type::AbstractInt {
            let l = self.coerce(left, right.ty, span);
            return (l, right);
        }
        if right.ty == Type::AbstractInt {
            let r = self.coerce(right, left.ty, span);
            return (left, r);
        }
        self.error(
            format!("mismatched operand types {:?} and {:?}", left.ty, right.ty),
            span,
            Some("use float(), int(), or uint() to convert explicitly".to_string()),
        );
        (left, right)
    }

    fn infer_call(
        &mut self,
        callee: &Spanned<ast::Expr>,
        args: &[Spanned<ast::Expr>],
        span: Span,
    ) -> Expr {
        let name = match &callee.node {
            ast::Expr::Var(name) => name.clone(),
            ast::Expr::Member { base, member } if matches!(base.node, ast::Expr::This) => {
                member.node.clone()
            }
            _ => {
                self.error("only named functions can be called".to_string(), callee.span, None);
                return Expr {
                    kind: ExprKind::IntLit(0),
                    ty: Type::I32,
                };
            }
        };

        if let Some((param_tys, ret)) = self.helper_sigs.get(&name).cloned() {
            if args.len() != param_tys.len() {
                self.error(
                    format!(
                        "'{}' takes {} argument(s), found {}",
                        name,
                        param_tys.len(),
                        args.len()
                    ),
                    span,
                    None,
                );
            }
            let args: Vec<Expr> = args
                .iter()
                .zip(param_tys.iter().chain(std::iter::repeat(&Type::F32)))
                .map(|(a, ty)| {
                    let v = self.infer(a);
                    let mut v = self.coerce(v, *ty, a.span);
                    finalize(&mut v);
                    v
                })
                .collect();
            return Expr {
                kind: ExprKind::Call {
                    callee: Callee::Helper(name),
                    args,
                },
                ty: ret,
            };
        }

        self.infer_builtin_call(&name, args, span)
    }

    fn infer_builtin_call(
        &mut self,
        name: &str,
        args: &[Spanned<ast::Expr>],
        span: Span,
    ) -> Expr {
        let mut inferred: Vec<Expr> = args.iter().map(|a| self.infer(a)).collect();

        let check_arity = |analyzer: &mut Self, n: usize| {
            if args.len() != n {
                analyzer.error(
                    format!("'{}' takes {} argument(s), found {}", name, n, args.len()),
                    span,
                    None,
                );
                false
            } else {
                true
            }
        };

        let ty = match name {
            "barrier" => {
                check_arity(self, 0);
                if !self.in_main {
                    self.error(
                        "barrier() is only available inside the @main method".to_string(),
                        span,
                        None,
                    );
                }
                self.uses_barrier.get_or_insert(span);
                Type::Void
            }
            "float" | "int" | "uint" => {
                check_arity(self, 1);
                for a in &mut inferred {
                    finalize(a);
                }
                match name {
                    "float" => Type::F32,
                    "int" => Type::I32,
                    _ => Type::U32,
                }
            }
            "vec2" | "vec3" | "vec4" => {
                let n = match name {
                    "vec2" => 2,
                    "vec3" => 3,
                    _ => 4,
                };
                if args.len() != n && args.len() != 1 {
                    self.error(
                        format!("'{}' takes {} components or one splat value", name, n),
                        span,
                        None,
                    );
                }
                inferred = inferred
                    .into_iter()
                    .map(|a| self.coerce(a, Type::F32, span))
                    .collect();
                Type::vector_of(n as u32).unwrap()
            }
            "abs" | "floor" | "ceil" | "fract" | "sqrt" | "exp" | "log" | "sin" | "cos"
            | "normalize" => {
                check_arity(self, 1);
                let v = inferred.remove(0);
                let v = if v.ty.is_vector() {
                    v
                } else {
                    self.coerce(v, Type::F32, span)
                };
                let ty = v.ty;
                inferred.insert(0, v);
                ty
            }
            "min" | "max" | "pow" | "mod" | "step" => {
                check_arity(self, 2);
                let b = inferred.pop();
                let a = inferred.pop();
                if let (Some(a), Some(b)) = (a, b) {
                    let (a, b) = self.unify_pair(a, b, span);
                    let mut a = a;
                    let mut b = b;
                    if a.ty == Type::AbstractInt {
                        a = self.coerce(a, Type::F32, span);
                        b = self.coerce(b, Type::F32, span);
                    }
                    let ty = a.ty;
                    inferred = vec![a, b];
                    ty
                } else {
                    Type::F32
                }
            }
            "clamp" | "mix" => {
                check_arity(self, 3);
                inferred = inferred
                    .into_iter()
                    .map(|a| {
                        if a.ty.is_vector() {
                            a
                        } else {
                            self.coerce(a, Type::F32, span)
                        }
                    })
                    .collect();
                inferred.first().map(|a| a.ty).unwrap_or(Type::F32)
            }
            "dot" => {
                check_arity(self, 2);
                Type::F32
            }
            "length" => {
                check_arity(self, 1);
                Type::F32
            }
            _ => {
                self.error(
                    format!("unknown function '{}'", name),
                    span,
                    Some("kernels can call builtins or this.helper(..) methods".to_string()),
                );
                Type::F32
            }
        };

        for a in &mut inferred {
            finalize(a);
        }
        Expr {
            kind: ExprKind::Call {
                callee: Callee::Builtin(name.to_string()),
                args: inferred,
            },
            ty,
        }
    }

    // ── Coercion ───────────────────────────────────────────────────

    fn coerce(&mut self, expr: Expr, target: Type, span: Span) -> Expr {
        if expr.ty == target {
            return expr;
        }
        if expr.ty == Type::AbstractInt && (target.is_numeric() || target == Type::F32) {
            let mut expr = expr;
            retype_abstract(&mut expr, target);
            return expr;
        }
        self.error(
            format!("type mismatch: expected {:?}, found {:?}", target, expr.ty),
            span,
            Some("use float(), int(), or uint() to convert explicitly".to_string()),
        );
        Expr {
            kind: expr.kind,
            ty: target,
        }
    }

    fn error(&mut self, message: String, span: Span, help: Option<String>) {
        let mut d = Diagnostic::error(message, span);
        if let Some(h) = help {
            d = d.with_help(h);
        }
        self.diagnostics.push(d);
    }
}

/// Rewrite an abstract-int literal tree to a concrete type.
fn retype_abstract(expr: &mut Expr, target: Type) {
    if expr.ty != Type::AbstractInt {
        return;
    }
    expr.ty = target;
    match &mut expr.kind {
        ExprKind::Unary { operand, .. } => retype_abstract(operand, target),
        ExprKind::Binary { lhs, rhs, .. } => {
            retype_abstract(lhs, target);
            retype_abstract(rhs, target);
        }
        _ => {}
    }
}

/// Default any remaining abstract ints to i32.
fn finalize(expr: &mut Expr) {
    if expr.ty == Type::AbstractInt {
        retype_abstract(expr, Type::I32);
    }
    match &mut expr.kind {
        ExprKind::Member { base, .. } => finalize(base),
        ExprKind::Index { base, index } => {
            finalize(base);
            finalize(index);
        }
        ExprKind::Call { args, .. } => args.iter_mut().for_each(finalize),
        ExprKind::Unary { operand, .. } => finalize(operand),
        ExprKind::Binary { lhs, rhs, .. } => {
            finalize(lhs);
            finalize(rhs);
        }
        ExprKind::VectorLit(elems) => elems.iter_mut().for_each(finalize),
        _ => {}
    }
}

fn place_to_expr(place: &Place, ty: Type) -> Expr {
    match place {
        Place::Local(name) => Expr {
            kind: ExprKind::Local(name.clone()),
            ty,
        },
        Place::Field(name) => Expr {
            kind: ExprKind::Field(name.clone()),
            ty,
        },
        Place::Index { base, index } => Expr {
            kind: ExprKind::Index {
                base: Box::new(place_to_expr(base, ty)),
                index: Box::new(index.clone()),
            },
            ty,
        },
        Place::Member { base, member } => Expr {
            kind: ExprKind::Member {
                base: Box::new(place_to_expr(base, ty)),
                member: member.clone(),
            },
            ty,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn analyze_source(source: &str) -> Result<Analysis, Vec<Diagnostic>> {
        let (tokens, lex_errors) = Lexer::new(source).tokenize();
        assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
        let module = Parser::new(tokens).parse_module().expect("parse failed");
        analyze(&module)
    }

    fn analyze_ok(source: &str) -> Analysis {
        analyze_source(source).unwrap_or_else(|errs| {
            panic!(
                "analysis failed: {:?}",
                errs.iter().map(|e| &e.message).collect::<Vec<_>>()
            )
        })
    }

    fn analyze_err(source: &str) -> Vec<Diagnostic> {
        analyze_source(source).err().expect("expected analysis errors")
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

    #[test]
    fn test_binding_slots_are_deterministic() {
        let a = analyze_ok(ADD_KERNEL);
        let slots: Vec<(String, u32)> = a
            .context
            .uniforms
            .iter()
            .map(|u| (u.name.clone(), u.binding_slot))
            .collect();
        assert_eq!(
            slots,
            vec![("vectorA".to_string(), 1), ("vectorB".to_string(), 2)]
        );
    }

    #[test]
    fn test_pingpong_detected() {
        let a = analyze_ok(ADD_KERNEL);
        assert!(a.context.need_pingpong);
        assert_eq!(a.context.output.name, "vectorA");
        assert_eq!(a.context.output.elements_per_texel, 1);
        assert_eq!(a.context.thread_group_size, [8, 1, 1]);
    }

    #[test]
    fn test_out_without_length_rejected() {
        let errs = analyze_err(
            "@numthreads(1,1,1) class K { @in a: float[]; @out b: float[]; @main run() { b[0] = a[0]; } }",
        );
        assert!(errs
            .iter()
            .any(|e| e.message.contains("needs an explicit length")));
    }

    #[test]
    fn test_out_with_fixed_length_accepted() {
        let a = analyze_ok(
            "@numthreads(1,1,1) class K { @in a: float[]; @out(16) b: float[]; @main run() { b[0] = a[0]; } }",
        );
        assert_eq!(a.context.output.length, Some(16));
        assert!(!a.context.need_pingpong);
    }

    #[test]
    fn test_shared_with_in_rejected() {
        let errs = analyze_err(
            "@numthreads(1,1,1) class K { @in @shared(8) t: float[]; @in @out o: float[]; @main run() { o[0] = 0.0; } }",
        );
        assert!(errs.iter().any(|e| e.message.contains("@shared")));
    }

    #[test]
    fn test_shared_never_gets_binding_slot() {
        let a = analyze_ok(
            "@numthreads(8,1,1) class K { @shared(64) tile: float[]; @in @out o: float[]; @main run() { tile[0] = o[0]; o[0] = tile[0]; } }",
        );
        assert_eq!(a.context.uniforms.len(), 1);
        assert_eq!(a.context.uniforms[0].name, "o");
        assert_eq!(a.context.uniforms[0].binding_slot, 1);
        // shared memory triggers the backend-divergence warning
        assert_eq!(a.warnings.len(), 1);
    }

    #[test]
    fn test_no_main_rejected() {
        let errs = analyze_err(
            "@numthreads(1,1,1) class K { @in @out o: float[]; helper(x: float): float { return x; } }",
        );
        assert!(errs.iter().any(|e| e.message.contains("no @main")));
    }

    #[test]
    fn test_two_mains_rejected() {
        let errs = analyze_err(
            "@numthreads(1,1,1) class K { @in @out o: float[]; @main a() { } @main b() { } }",
        );
        assert!(errs
            .iter()
            .any(|e| e.message.contains("more than one @main")));
    }

    #[test]
    fn test_scalar_uniforms_share_slot_zero() {
        let a = analyze_ok(
            "@numthreads(1,1,1) class K { @in alpha: float; @in @out o: float[]; @in beta: uint; @main run() { o[0] = alpha; } }",
        );
        let scalars: Vec<&UniformDescriptor> = a.context.scalars().collect();
        assert_eq!(scalars.len(), 2);
        assert!(scalars.iter().all(|u| u.binding_slot == 0));
        let arrays: Vec<&UniformDescriptor> = a.context.arrays().collect();
        assert_eq!(arrays.len(), 1);
        assert_eq!(arrays[0].binding_slot, 1);
    }

    #[test]
    fn test_global_defines() {
        let a = analyze_ok(
            "const SCALE = 2.0;\nconst N = 4;\nconst BIAS: float;\n@numthreads(1,1,1) class K { @in @out o: float[]; @main run() { o[0] = o[0] * SCALE + BIAS; } }",
        );
        assert_eq!(a.context.global_defines.len(), 2);
        assert_eq!(a.context.global_defines[0].name, "SCALE");
        assert_eq!(a.context.global_defines[0].ty, Type::F32);
        assert_eq!(a.context.global_defines[1].ty, Type::I32);
        // BIAS becomes a runtime-bound scalar uniform
        assert!(a
            .context
            .scalars()
            .any(|u| u.name == "BIAS" && u.ty == Type::F32));
    }

    #[test]
    fn test_write_to_in_only_field_rejected() {
        let errs = analyze_err(
            "@numthreads(1,1,1) class K { @in a: float[]; @in @out o: float[]; @main run() { a[0] = 1.0; } }",
        );
        assert!(errs.iter().any(|e| e.message.contains("@in field")));
    }

    #[test]
    fn test_int_literal_coerces_to_float() {
        let a = analyze_ok(
            "@numthreads(1,1,1) class K { @in @out o: float[]; @main run() { o[0] = o[0] + 100; } }",
        );
        let Stmt::Assign { value, .. } = &a.program.main_body[0] else {
            panic!()
        };
        let ExprKind::Binary { rhs, .. } = &value.kind else {
            panic!()
        };
        assert_eq!(rhs.ty, Type::F32);
        assert!(matches!(rhs.kind, ExprKind::IntLit(100)));
    }

    #[test]
    fn test_compound_assign_desugars() {
        let a = analyze_ok(
            "@numthreads(1,1,1) class K { @in @out o: float[]; @main run() { o[0] += 1.0; } }",
        );
        let Stmt::Assign { value, .. } = &a.program.main_body[0] else {
            panic!()
        };
        assert!(matches!(
            value.kind,
            ExprKind::Binary {
                op: BinOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn test_helper_and_builtin_restriction() {
        let errs = analyze_err(
            "@numthreads(1,1,1) class K { @in @out o: float[]; sq(x: float): float { return x * float(globalInvocationID.x); } @main run() { o[0] = this.sq(2.0); } }",
        );
        assert!(errs
            .iter()
            .any(|e| e.message.contains("only available inside the @main")));
    }

    #[test]
    fn test_vector_literal_types() {
        let a = analyze_ok(
            "@numthreads(1,1,1) class K { @in @out o: vec4[]; @main run() { o[0] = [1.0, 2.0, 3.0, 4.0]; } }",
        );
        let Stmt::Assign { value, .. } = &a.program.main_body[0] else {
            panic!()
        };
        assert_eq!(value.ty, Type::Vec4);
        assert_eq!(a.context.output.elements_per_texel, 4);
    }

    #[test]
    fn test_unknown_function_rejected() {
        let errs = analyze_err(
            "@numthreads(1,1,1) class K { @in @out o: float[]; @main run() { o[0] = frobnicate(1.0); } }",
        );
        assert!(errs.iter().any(|e| e.message.contains("unknown function")));
    }

    #[test]
    fn test_barrier_warning() {
        let a = analyze_ok(
            "@numthreads(8,1,1) class K { @in @out o: float[]; @main run() { barrier(); o[0] = 1.0; } }",
        );
        assert_eq!(a.warnings.len(), 1);
        assert!(a.warnings[0].message.contains("barrier"));
    }
}
