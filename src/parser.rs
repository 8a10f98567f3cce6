use crate::ast::*;
use crate::diagnostic::Diagnostic;
use crate::lexeme::Lexeme;
use crate::span::{Span, Spanned};

const MAX_NESTING_DEPTH: u32 = 256;

pub struct Parser {
    tokens: Vec<Spanned<Lexeme>>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
    depth: u32,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned<Lexeme>>) -> Self {
        Self {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
            depth: 0,
        }
    }

    pub fn parse_module(mut self) -> Result<Module, Vec<Diagnostic>> {
        let mut items = Vec::new();
        while !self.at(&Lexeme::Eof) {
            let start = self.current_span();
            if self.at(&Lexeme::Const) {
                let item = self.parse_const();
                items.push(Spanned::new(Item::Const(item), start.merge(self.prev_span())));
            } else if self.at(&Lexeme::At) || self.at(&Lexeme::Class) {
                let item = self.parse_class();
                items.push(Spanned::new(Item::Class(item), start.merge(self.prev_span())));
            } else {
                self.error_with_help(
                    "expected a `const` declaration or a kernel class",
                    "a kernel source file contains global consts and one decorated class",
                );
                break;
            }
            if !self.diagnostics.is_empty() {
                break;
            }
        }

        if !self.diagnostics.is_empty() {
            return Err(self.diagnostics);
        }
        Ok(Module { items })
    }

    /// `const NAME: type? (= expr)? ;`
    fn parse_const(&mut self) -> ConstDef {
        self.expect(&Lexeme::Const);
        let name = self.expect_ident();
        let ty = if self.eat(&Lexeme::Colon) {
            Some(self.parse_type())
        } else {
            None
        };
        let value = if self.eat(&Lexeme::Eq) {
            Some(self.parse_expr())
        } else {
            None
        };
        self.expect(&Lexeme::Semicolon);
        ConstDef { name, ty, value }
    }

    fn parse_class(&mut self) -> ClassDef {
        let decorators = self.parse_decorators();
        self.expect(&Lexeme::Class);
        let name = self.expect_ident();
        self.expect(&Lexeme::LBrace);

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.at(&Lexeme::RBrace) && !self.at(&Lexeme::Eof) {
            let member_decorators = self.parse_decorators();
            let member_name = self.expect_ident();
            if self.at(&Lexeme::Colon) {
                self.advance();
                let ty = self.parse_type();
                self.expect(&Lexeme::Semicolon);
                fields.push(FieldDef {
                    decorators: member_decorators,
                    name: member_name,
                    ty,
                });
            } else if self.at(&Lexeme::LParen) {
                methods.push(self.parse_method(member_decorators, member_name));
            } else {
                self.error_with_help(
                    "expected ':' (field) or '(' (method) after member name",
                    "class members are `name: type;` fields or `name(params) { .. }` methods",
                );
                break;
            }
        }
        self.expect(&Lexeme::RBrace);

        ClassDef {
            decorators,
            name,
            fields,
            methods,
        }
    }

    fn parse_decorators(&mut self) -> Vec<Decorator> {
        let mut decorators = Vec::new();
        while self.at(&Lexeme::At) {
            self.advance();
            let name = self.expect_ident();
            let mut args = Vec::new();
            if self.eat(&Lexeme::LParen) {
                while !self.at(&Lexeme::RParen) && !self.at(&Lexeme::Eof) {
                    args.push(self.parse_expr());
                    if !self.eat(&Lexeme::Comma) {
                        break;
                    }
                }
                self.expect(&Lexeme::RParen);
            }
            decorators.push(Decorator { name, args });
        }
        decorators
    }

    fn parse_method(&mut self, decorators: Vec<Decorator>, name: Spanned<String>) -> MethodDef {
        self.expect(&Lexeme::LParen);
        let mut params = Vec::new();
        while !self.at(&Lexeme::RParen) && !self.at(&Lexeme::Eof) {
            let pname = self.expect_ident();
            self.expect(&Lexeme::Colon);
            let ty = self.parse_type();
            params.push(Param { name: pname, ty });
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        self.expect(&Lexeme::RParen);

        let return_ty = if self.eat(&Lexeme::Colon) {
            Some(self.parse_type())
        } else {
            None
        };

        let body = self.parse_block();

        MethodDef {
            decorators,
            name,
            params,
            return_ty,
            body,
        }
    }

    fn parse_type(&mut self) -> Spanned<Type> {
        let start = self.current_span();
        let tok = self.advance();
        let mut ty = match tok.node {
            Lexeme::FloatTy => Type::Float,
            Lexeme::IntTy => Type::Int,
            Lexeme::UintTy => Type::Uint,
            Lexeme::BoolTy => Type::Bool,
            Lexeme::Vec2Ty => Type::Vec2,
            Lexeme::Vec3Ty => Type::Vec3,
            Lexeme::Vec4Ty => Type::Vec4,
            other => {
                self.diagnostics.push(
                    Diagnostic::error(
                        format!("expected a type, found {}", other.describe()),
                        tok.span,
                    )
                    .with_help(
                        "types are float, int, uint, bool, vec2, vec3, vec4, or T[] arrays"
                            .to_string(),
                    ),
                );
                Type::Float
            }
        };

        // array suffixes: `float[]` or `float[64]`
        while self.at(&Lexeme::LBracket) {
            self.advance();
            let len = if let Lexeme::Integer(n) = self.current().node {
                self.advance();
                Some(n as u32)
            } else {
                None
            };
            self.expect(&Lexeme::RBracket);
            ty = Type::Array(Box::new(ty), len);
        }

        Spanned::new(ty, start.merge(self.prev_span()))
    }

    fn parse_block(&mut self) -> Spanned<Block> {
        let start = self.current_span();
        self.expect(&Lexeme::LBrace);
        let mut stmts = Vec::new();
        while !self.at(&Lexeme::RBrace) && !self.at(&Lexeme::Eof) {
            if !self.enter_nesting() {
                break;
            }
            let stmt = self.parse_stmt();
            self.exit_nesting();
            stmts.push(stmt);
            if !self.diagnostics.is_empty() {
                break;
            }
        }
        self.expect(&Lexeme::RBrace);
        Spanned::new(Block { stmts }, start.merge(self.prev_span()))
    }

    fn parse_stmt(&mut self) -> Spanned<Stmt> {
        let start = self.current_span();
        let stmt = match self.current().node {
            Lexeme::Let => {
                let s = self.parse_let();
                self.expect(&Lexeme::Semicolon);
                s
            }
            Lexeme::If => self.parse_if(),
            Lexeme::For => self.parse_for(),
            Lexeme::While => self.parse_while(),
            Lexeme::Return => {
                self.advance();
                let value = if self.at(&Lexeme::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr())
                };
                self.expect(&Lexeme::Semicolon);
                Stmt::Return(value)
            }
            _ => {
                let s = self.parse_expr_or_assign();
                self.expect(&Lexeme::Semicolon);
                s
            }
        };
        Spanned::new(stmt, start.merge(self.prev_span()))
    }

    /// `let name (: type)? = expr` — semicolon handled by the caller so
    /// this also serves as a `for` initializer.
    fn parse_let(&mut self) -> Stmt {
        self.expect(&Lexeme::Let);
        let name = self.expect_ident();
        let ty = if self.eat(&Lexeme::Colon) {
            Some(self.parse_type())
        } else {
            None
        };
        self.expect(&Lexeme::Eq);
        let init = self.parse_expr();
        Stmt::Let { name, ty, init }
    }

    fn parse_if(&mut self) -> Stmt {
        self.expect(&Lexeme::If);
        self.expect(&Lexeme::LParen);
        let cond = self.parse_expr();
        self.expect(&Lexeme::RParen);
        let then_block = self.parse_block();
        let else_block = if self.eat(&Lexeme::Else) {
            if self.at(&Lexeme::If) {
                // `else if` — wrap the nested if in a block
                let start = self.current_span();
                let nested = self.parse_if();
                let span = start.merge(self.prev_span());
                Some(Spanned::new(
                    Block {
                        stmts: vec![Spanned::new(nested, span)],
                    },
                    span,
                ))
            } else {
                Some(self.parse_block())
            }
        } else {
            None
        };
        Stmt::If {
            cond,
            then_block,
            else_block,
        }
    }

    /// C-style: `for (let i = 0; i < n; i += 1) { .. }`
    fn parse_for(&mut self) -> Stmt {
        self.expect(&Lexeme::For);
        self.expect(&Lexeme::LParen);
        let init_start = self.current_span();
        let init = if self.at(&Lexeme::Let) {
            self.parse_let()
        } else {
            self.parse_expr_or_assign()
        };
        let init = Spanned::new(init, init_start.merge(self.prev_span()));
        self.expect(&Lexeme::Semicolon);
        let cond = self.parse_expr();
        self.expect(&Lexeme::Semicolon);
        let step_start = self.current_span();
        let step = self.parse_expr_or_assign();
        let step = Spanned::new(step, step_start.merge(self.prev_span()));
        self.expect(&Lexeme::RParen);
        let body = self.parse_block();
        Stmt::For {
            init: Box::new(init),
            cond,
            step: Box::new(step),
            body,
        }
    }

    fn parse_while(&mut self) -> Stmt {
        self.expect(&Lexeme::While);
        self.expect(&Lexeme::LParen);
        let cond = self.parse_expr();
        self.expect(&Lexeme::RParen);
        let body = self.parse_block();
        Stmt::While { cond, body }
    }

    /// An expression statement, or an assignment if followed by `=`/`+=`/…
    fn parse_expr_or_assign(&mut self) -> Stmt {
        let target = self.parse_expr();
        let op = match self.current().node {
            Lexeme::Eq => Some(AssignOp::Assign),
            Lexeme::PlusEq => Some(AssignOp::Add),
            Lexeme::MinusEq => Some(AssignOp::Sub),
            Lexeme::StarEq => Some(AssignOp::Mul),
            Lexeme::SlashEq => Some(AssignOp::Div),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let value = self.parse_expr();
                Stmt::Assign { target, op, value }
            }
            None => Stmt::Expr(target),
        }
    }

    // ── Expressions (precedence ladder) ──

    pub(crate) fn parse_expr(&mut self) -> Spanned<Expr> {
        if !self.enter_nesting() {
            return Spanned::new(Expr::IntLit(0), self.current_span());
        }
        let expr = self.parse_or();
        self.exit_nesting();
        expr
    }

    fn parse_or(&mut self) -> Spanned<Expr> {
        let mut lhs = self.parse_and();
        while self.at(&Lexeme::PipePipe) {
            self.advance();
            let rhs = self.parse_and();
            lhs = binary(BinOp::Or, lhs, rhs);
        }
        lhs
    }

    fn parse_and(&mut self) -> Spanned<Expr> {
        let mut lhs = self.parse_equality();
        while self.at(&Lexeme::AmpAmp) {
            self.advance();
            let rhs = self.parse_equality();
            lhs = binary(BinOp::And, lhs, rhs);
        }
        lhs
    }

    fn parse_equality(&mut self) -> Spanned<Expr> {
        let mut lhs = self.parse_comparison();
        loop {
            let op = match self.current().node {
                Lexeme::EqEq => BinOp::Eq,
                Lexeme::BangEq => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_comparison();
            lhs = binary(op, lhs, rhs);
        }
        lhs
    }

    fn parse_comparison(&mut self) -> Spanned<Expr> {
        let mut lhs = self.parse_additive();
        loop {
            let op = match self.current().node {
                Lexeme::Lt => BinOp::Lt,
                Lexeme::Le => BinOp::Le,
                Lexeme::Gt => BinOp::Gt,
                Lexeme::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive();
            lhs = binary(op, lhs, rhs);
        }
        lhs
    }

    fn parse_additive(&mut self) -> Spanned<Expr> {
        let mut lhs = self.parse_multiplicative();
        loop {
            let op = match self.current().node {
                Lexeme::Plus => BinOp::Add,
                Lexeme::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative();
            lhs = binary(op, lhs, rhs);
        }
        lhs
    }

    fn parse_multiplicative(&mut self) -> Spanned<Expr> {
        let mut lhs = self.parse_unary();
        loop {
            let op = match self.current().node {
                Lexeme::Star => BinOp::Mul,
                Lexeme::Slash => BinOp::Div,
                Lexeme::Percent => BinOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary();
            lhs = binary(op, lhs, rhs);
        }
        lhs
    }

    fn parse_unary(&mut self) -> Spanned<Expr> {
        let start = self.current_span();
        let op = match self.current().node {
            Lexeme::Minus => Some(UnOp::Neg),
            Lexeme::Bang => Some(UnOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary();
            let span = start.merge(operand.span);
            return Spanned::new(
                Expr::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            );
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Spanned<Expr> {
        let mut expr = self.parse_primary();
        loop {
            match self.current().node {
                Lexeme::Dot => {
                    self.advance();
                    let member = self.expect_ident();
                    let span = expr.span.merge(member.span);
                    expr = Spanned::new(
                        Expr::Member {
                            base: Box::new(expr),
                            member,
                        },
                        span,
                    );
                }
                Lexeme::LBracket => {
                    self.advance();
                    let index = self.parse_expr();
                    self.expect(&Lexeme::RBracket);
                    let span = expr.span.merge(self.prev_span());
                    expr = Spanned::new(
                        Expr::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                Lexeme::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    while !self.at(&Lexeme::RParen) && !self.at(&Lexeme::Eof) {
                        args.push(self.parse_expr());
                        if !self.eat(&Lexeme::Comma) {
                            break;
                        }
                    }
                    self.expect(&Lexeme::RParen);
                    let span = expr.span.merge(self.prev_span());
                    expr = Spanned::new(
                        Expr::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_primary(&mut self) -> Spanned<Expr> {
        let tok = self.advance();
        let span = tok.span;
        match tok.node {
            Lexeme::Integer(n) => Spanned::new(Expr::IntLit(n), span),
            Lexeme::Float(v) => Spanned::new(Expr::FloatLit(v), span),
            Lexeme::True => Spanned::new(Expr::BoolLit(true), span),
            Lexeme::False => Spanned::new(Expr::BoolLit(false), span),
            Lexeme::This => Spanned::new(Expr::This, span),
            Lexeme::Ident(name) => Spanned::new(Expr::Var(name), span),
            // type keywords double as conversion functions: float(x), uint(i)
            Lexeme::FloatTy => Spanned::new(Expr::Var("float".to_string()), span),
            Lexeme::IntTy => Spanned::new(Expr::Var("int".to_string()), span),
            Lexeme::UintTy => Spanned::new(Expr::Var("uint".to_string()), span),
            Lexeme::Vec2Ty => Spanned::new(Expr::Var("vec2".to_string()), span),
            Lexeme::Vec3Ty => Spanned::new(Expr::Var("vec3".to_string()), span),
            Lexeme::Vec4Ty => Spanned::new(Expr::Var("vec4".to_string()), span),
            Lexeme::LParen => {
                let inner = self.parse_expr();
                self.expect(&Lexeme::RParen);
                Spanned::new(inner.node, span.merge(self.prev_span()))
            }
            Lexeme::LBracket => {
                let mut elems = Vec::new();
                while !self.at(&Lexeme::RBracket) && !self.at(&Lexeme::Eof) {
                    elems.push(self.parse_expr());
                    if !self.eat(&Lexeme::Comma) {
                        break;
                    }
                }
                self.expect(&Lexeme::RBracket);
                Spanned::new(Expr::ArrayLit(elems), span.merge(self.prev_span()))
            }
            other => {
                self.diagnostics.push(Diagnostic::error(
                    format!("expected an expression, found {}", other.describe()),
                    span,
                ));
                Spanned::new(Expr::IntLit(0), span)
            }
        }
    }

    // ── Cursor helpers ──

    fn current(&self) -> &Spanned<Lexeme> {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_span(&self) -> Span {
        self.current().span
    }

    fn prev_span(&self) -> Span {
        if self.pos == 0 {
            return self.current_span();
        }
        self.tokens[self.pos - 1].span
    }

    fn at(&self, lexeme: &Lexeme) -> bool {
        &self.current().node == lexeme
    }

    fn advance(&mut self) -> Spanned<Lexeme> {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, lexeme: &Lexeme) -> bool {
        if self.at(lexeme) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, lexeme: &Lexeme) {
        if !self.eat(lexeme) {
            let found = self.current().node.describe();
            self.diagnostics.push(Diagnostic::error(
                format!("expected {}, found {}", lexeme.describe(), found),
                self.current_span(),
            ));
        }
    }

    fn expect_ident(&mut self) -> Spanned<String> {
        if let Lexeme::Ident(name) = self.current().node.clone() {
            let span = self.current_span();
            self.advance();
            Spanned::new(name, span)
        } else {
            let found = self.current().node.describe();
            self.diagnostics.push(Diagnostic::error(
                format!("expected an identifier, found {}", found),
                self.current_span(),
            ));
            Spanned::new(String::new(), self.current_span())
        }
    }

    fn error_with_help(&mut self, message: &str, help: &str) {
        self.diagnostics.push(
            Diagnostic::error(message.to_string(), self.current_span())
                .with_help(help.to_string()),
        );
    }

    fn enter_nesting(&mut self) -> bool {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.error_with_help(
                "nesting depth exceeded (maximum 256 levels)",
                "split deeply nested code into helper methods",
            );
            return false;
        }
        true
    }

    fn exit_nesting(&mut self) {
        self.depth -= 1;
    }
}

fn binary(op: BinOp, lhs: Spanned<Expr>, rhs: Spanned<Expr>) -> Spanned<Expr> {
    let span = lhs.span.merge(rhs.span);
    Spanned::new(
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> Module {
        let (tokens, lex_errors) = Lexer::new(source).tokenize();
        assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
        Parser::new(tokens).parse_module().unwrap_or_else(|errs| {
            panic!(
                "parse failed: {:?}",
                errs.iter().map(|e| &e.message).collect::<Vec<_>>()
            )
        })
    }

    fn parse_err(source: &str) -> Vec<Diagnostic> {
        let (tokens, _) = Lexer::new(source).tokenize();
        Parser::new(tokens)
            .parse_module()
            .err()
            .expect("expected parse errors")
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
    fn test_parse_kernel_class() {
        let module = parse(ADD_KERNEL);
        assert_eq!(module.items.len(), 1);
        let Item::Class(class) = &module.items[0].node else {
            panic!("expected a class item");
        };
        assert_eq!(class.name.node, "AddVectors");
        assert_eq!(class.decorators.len(), 1);
        assert_eq!(class.decorators[0].name.node, "numthreads");
        assert_eq!(class.decorators[0].args.len(), 3);
        assert_eq!(class.fields.len(), 2);
        assert_eq!(class.fields[0].decorators.len(), 2);
        assert_eq!(class.methods.len(), 1);
        assert_eq!(class.methods[0].decorators[0].name.node, "main");
        assert_eq!(class.methods[0].body.node.stmts.len(), 2);
    }

    #[test]
    fn test_parse_array_types() {
        let module = parse("@numthreads(1,1,1) class K { @shared(64) tile: float[64]; @in v: vec4[]; @main run() { } }");
        let Item::Class(class) = &module.items[0].node else {
            panic!()
        };
        assert_eq!(
            class.fields[0].ty.node,
            Type::Array(Box::new(Type::Float), Some(64))
        );
        assert_eq!(
            class.fields[1].ty.node,
            Type::Array(Box::new(Type::Vec4), None)
        );
    }

    #[test]
    fn test_parse_global_consts() {
        let module = parse("const SCALE = 2.0;\nconst BIAS: float;\n@numthreads(1,1,1) class K { @in @out o: float[]; @main run() { } }");
        let Item::Const(scale) = &module.items[0].node else {
            panic!()
        };
        assert!(scale.value.is_some());
        let Item::Const(bias) = &module.items[1].node else {
            panic!()
        };
        assert!(bias.value.is_none());
        assert!(bias.ty.is_some());
    }

    #[test]
    fn test_precedence() {
        let module =
            parse("@numthreads(1,1,1) class K { @in @out o: float[]; @main run() { let x: float = 1.0 + 2.0 * 3.0; } }");
        let Item::Class(class) = &module.items[0].node else {
            panic!()
        };
        let Stmt::Let { init, .. } = &class.methods[0].body.node.stmts[0].node else {
            panic!()
        };
        let Expr::Binary { op: BinOp::Add, rhs, .. } = &init.node else {
            panic!("expected + at the top");
        };
        assert!(matches!(rhs.node, Expr::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn test_parse_for_loop() {
        let module = parse(
            "@numthreads(1,1,1) class K { @in @out o: float[]; @main run() { for (let i = 0; i < 8; i += 1) { o[i] = 0.0; } } }",
        );
        let Item::Class(class) = &module.items[0].node else {
            panic!()
        };
        let Stmt::For { init, step, .. } = &class.methods[0].body.node.stmts[0].node else {
            panic!("expected for");
        };
        assert!(matches!(init.node, Stmt::Let { .. }));
        assert!(matches!(
            step.node,
            Stmt::Assign {
                op: AssignOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_this_member() {
        let module = parse(
            "@numthreads(1,1,1) class K { @in @out o: float[]; @main run() { o[0] = this.scale(1.0); } scale(x: float): float { return x; } }",
        );
        let Item::Class(class) = &module.items[0].node else {
            panic!()
        };
        assert_eq!(class.methods.len(), 2);
    }

    #[test]
    fn test_array_literal() {
        let module = parse(
            "@numthreads(1,1,1) class K { @in @out o: vec4[]; @main run() { o[0] = [1.0, 2.0, 3.0, 4.0]; } }",
        );
        let Item::Class(class) = &module.items[0].node else {
            panic!()
        };
        let Stmt::Assign { value, .. } = &class.methods[0].body.node.stmts[0].node else {
            panic!()
        };
        let Expr::ArrayLit(elems) = &value.node else {
            panic!("expected array literal")
        };
        assert_eq!(elems.len(), 4);
    }

    #[test]
    fn test_else_if_chain() {
        parse(
            "@numthreads(1,1,1) class K { @in @out o: float[]; @main run() { if (1 < 2) { } else if (2 < 3) { } else { } } }",
        );
    }

    #[test]
    fn test_missing_semicolon_reported() {
        let errs = parse_err("@numthreads(1,1,1) class K { @in v: float[] @main run() { } }");
        assert!(errs.iter().any(|e| e.message.contains("expected ';'")));
    }

    #[test]
    fn test_conversion_call_parses() {
        parse("@numthreads(1,1,1) class K { @in @out o: float[]; @main run() { o[0] = float(3) / 2.0; } }");
    }
}
