//! Solar expression AST, parser, and evaluator.
//!
//! Operator precedence (lowest → highest):
//!   or  →  and  →  comparison  →  additive  →  multiplicative  →
//!   unary  →  postfix (call, index, member)  →  primary
//!
//! Besides full expressions the parser offers a *command argument* entry
//! point, which stops at the unary level so that space-separated arguments
//! such as `at 10 -5` read as two values.

use std::fmt;

use super::error::{Pos, Result, SolarError};
use super::lexer::{Keyword, Op, Token, TokenKind};
use super::stack::ensure_sufficient_stack;
use super::value::{dict_set, Value};

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Dependency-injection interface used by the expression evaluator.
///
/// The [`Interpreter`](super::interp::Interpreter) implements this trait to
/// give the evaluator access to variables and callable functions.
pub trait EvalContext {
    /// Resolve an identifier used as a value: a variable, else a registered
    /// function (as [`Value::Func`]).
    fn lookup(&self, name: &str) -> Option<Value>;

    /// Call `name`: a variable holding a function, else a registry entry.
    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value>;
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
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
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `callee(args)`; the callee is a `Var` or `Member` in practice.
    Call(Box<Expr>, Vec<Expr>),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Index(Box<Expr>, Box<Expr>),
    Member(Box<Expr>, String),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
            for (i, e) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{e}")?;
            }
            Ok(())
        }
        match self {
            Expr::Literal(v) => write!(f, "{}", v.repr()),
            Expr::Var(name) => write!(f, "{name}"),
            Expr::Unary(UnaryOp::Neg, e) => write!(f, "(-{e})"),
            Expr::Unary(UnaryOp::Not, e) => write!(f, "(not {e})"),
            Expr::Binary(op, l, r) => write!(f, "({l} {} {r})", op.as_str()),
            Expr::Call(callee, args) => {
                write!(f, "{callee}(")?;
                list(f, args)?;
                write!(f, ")")
            }
            Expr::List(items) => {
                write!(f, "[")?;
                list(f, items)?;
                write!(f, "]")
            }
            Expr::Dict(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Expr::Index(e, i) => write!(f, "{e}[{i}]"),
            Expr::Member(e, m) => write!(f, "{e}.{m}"),
        }
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Token cursor plus the expression grammar.  The statement parser drives
/// one of these.
#[derive(Debug)]
pub struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
    /// Current bracket/unary nesting, capped at [`MAX_NESTING`].
    depth: usize,
}

/// Deepest expression nesting the parser accepts.
pub const MAX_NESTING: usize = 256;

impl ExprParser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last(), Some(t) if t.kind == TokenKind::Eof) {
            let pos = tokens.last().map(|t| t.pos).unwrap_or_default();
            tokens.push(Token { kind: TokenKind::Eof, text: String::new(), pos });
        }
        ExprParser { tokens, pos: 0, depth: 0 }
    }

    pub fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    pub fn peek_nth(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)]
    }

    pub fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    pub fn check_op(&self, op: Op) -> bool {
        self.peek().is_op(op)
    }

    pub fn check_keyword(&self, k: Keyword) -> bool {
        self.peek().is_keyword(k)
    }

    pub fn eat_op(&mut self, op: Op) -> bool {
        if self.check_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn eat_keyword(&mut self, k: Keyword) -> bool {
        if self.check_keyword(k) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Error at the current token.
    pub fn error(&self, msg: impl fmt::Display) -> SolarError {
        let tok = self.peek();
        SolarError::parse(tok.pos, format!("{msg}, found {}", tok.kind))
    }

    pub fn expect_op(&mut self, op: Op, context: &str) -> Result<Token> {
        if self.check_op(op) {
            Ok(self.advance())
        } else {
            Err(self.error(format_args!("expected `{}` {context}", op.as_str())))
        }
    }

    pub fn expect_ident(&mut self, what: &str) -> Result<(String, Pos)> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let out = (name.clone(), self.peek().pos);
                self.pos += 1;
                Ok(out)
            }
            _ => Err(self.error(format_args!("expected {what}"))),
        }
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.nested(Self::parse_or)
    }

    /// Run a recursive step one level deeper, refusing to go past
    /// [`MAX_NESTING`].
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format_args!("expression nested more than {MAX_NESTING} levels")));
        }
        self.depth += 1;
        let out = ensure_sufficient_stack(|| f(self));
        self.depth -= 1;
        out
    }

    /// A unary-level expression: no binary operators outside parentheses,
    /// and a `(` or `[` only applies to the previous value when written
    /// directly against it (`f(x)` is a call, `f (x)` is two arguments).
    pub fn parse_command_arg(&mut self) -> Result<Expr> {
        self.parse_unary_in(true)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword(Keyword::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_comparison()?;
        while self.eat_keyword(Keyword::And) {
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Op(Op::EqEq) => BinOp::Eq,
                TokenKind::Op(Op::Ne) => BinOp::Ne,
                TokenKind::Op(Op::Lt) => BinOp::Lt,
                TokenKind::Op(Op::Le) => BinOp::Le,
                TokenKind::Op(Op::Gt) => BinOp::Gt,
                TokenKind::Op(Op::Ge) => BinOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Op(Op::Plus) => BinOp::Add,
                TokenKind::Op(Op::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Op(Op::Star) => BinOp::Mul,
                TokenKind::Op(Op::Slash) => BinOp::Div,
                TokenKind::Op(Op::Percent) => BinOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        self.parse_unary_in(false)
    }

    fn parse_unary_in(&mut self, command: bool) -> Result<Expr> {
        if self.eat_op(Op::Minus) {
            let e = self.nested(|p| p.parse_unary_in(command))?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(e)));
        }
        if self.eat_keyword(Keyword::Not) {
            let e = self.nested(|p| p.parse_unary_in(command))?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(e)));
        }
        self.parse_postfix(command)
    }

    /// The current token starts exactly where the previous one ended.
    pub fn touches_previous(&self) -> bool {
        let Some(prev) = self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) else {
            return false;
        };
        let cur = self.peek();
        prev.pos.line == cur.pos.line && prev.pos.column + prev.text.chars().count() == cur.pos.column
    }

    fn parse_postfix(&mut self, command: bool) -> Result<Expr> {
        let mut e = self.parse_primary()?;
        loop {
            if command
                && (self.check_op(Op::LParen) || self.check_op(Op::LBracket))
                && !self.touches_previous()
            {
                return Ok(e);
            }
            if self.check_op(Op::LParen) {
                let open = self.advance();
                let args = self.parse_comma_list(Op::RParen, &open)?;
                e = Expr::Call(Box::new(e), args);
            } else if self.check_op(Op::LBracket) {
                let open = self.advance();
                let idx = self.parse_expr()?;
                self.expect_closing(Op::RBracket, &open)?;
                e = Expr::Index(Box::new(e), Box::new(idx));
            } else if self.eat_op(Op::Dot) {
                let (member, _) = self.expect_ident("a member name after `.`")?;
                e = Expr::Member(Box::new(e), member);
            } else {
                return Ok(e);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let tok = self.peek().clone();
        let e = match tok.kind {
            TokenKind::Int(n) => Expr::Literal(Value::Int(n)),
            TokenKind::Float(x) => Expr::Literal(Value::Float(x)),
            TokenKind::Str(s) => Expr::Literal(Value::Str(s)),
            TokenKind::Keyword(Keyword::True) => Expr::Literal(Value::Bool(true)),
            TokenKind::Keyword(Keyword::False) => Expr::Literal(Value::Bool(false)),
            TokenKind::Keyword(Keyword::Nil) => Expr::Literal(Value::Nil),
            TokenKind::Ident(name) => Expr::Var(name),
            TokenKind::Op(Op::LParen) => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect_closing(Op::RParen, &tok)?;
                return Ok(inner);
            }
            TokenKind::Op(Op::LBracket) => {
                self.pos += 1;
                return Ok(Expr::List(self.parse_comma_list(Op::RBracket, &tok)?));
            }
            TokenKind::Op(Op::LBrace) => {
                self.pos += 1;
                return self.parse_dict(&tok);
            }
            _ => return Err(self.error("expected an expression")),
        };
        self.pos += 1;
        Ok(e)
    }

    /// `(a, b, ...)` starting at the current `(`.
    pub fn parse_paren_args(&mut self) -> Result<Vec<Expr>> {
        let open = self.expect_op(Op::LParen, "to open the argument list")?;
        self.parse_comma_list(Op::RParen, &open)
    }

    fn expect_closing(&mut self, close: Op, open: &Token) -> Result<()> {
        if self.eat_op(close) {
            Ok(())
        } else {
            Err(self.error(format_args!(
                "expected `{}` to close `{}` at {}",
                close.as_str(),
                open.text,
                open.pos
            )))
        }
    }

    /// `a, b, c` up to `close`; a trailing comma is allowed.
    fn parse_comma_list(&mut self, close: Op, open: &Token) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        loop {
            if self.eat_op(close) {
                return Ok(items);
            }
            items.push(self.parse_expr()?);
            if !self.eat_op(Op::Comma) {
                self.expect_closing(close, open)?;
                return Ok(items);
            }
        }
    }

    fn parse_dict(&mut self, open: &Token) -> Result<Expr> {
        let mut pairs = Vec::new();
        loop {
            if self.eat_op(Op::RBrace) {
                return Ok(Expr::Dict(pairs));
            }
            let key = self.parse_expr()?;
            self.expect_op(Op::Colon, "between dictionary key and value")?;
            let value = self.parse_expr()?;
            pairs.push((key, value));
            if !self.eat_op(Op::Comma) {
                self.expect_closing(Op::RBrace, open)?;
                return Ok(Expr::Dict(pairs));
            }
        }
    }
}

/// Parse a single standalone expression.
pub fn parse_expr(src: &str) -> Result<Expr> {
    let tokens = super::lexer::tokenize(src)?;
    let mut p = ExprParser::new(tokens);
    let e = p.parse_expr()?;
    while p.peek().kind == TokenKind::Newline {
        p.advance();
    }
    if p.peek().kind != TokenKind::Eof {
        return Err(p.error("unexpected input after expression"));
    }
    Ok(e)
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

pub fn eval_expr(expr: &Expr, ctx: &mut dyn EvalContext) -> Result<Value> {
    ensure_sufficient_stack(|| eval_inner(expr, ctx))
}

fn eval_inner(expr: &Expr, ctx: &mut dyn EvalContext) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(name) => ctx.lookup(name).ok_or_else(|| SolarError::name(name.as_str())),
        Expr::Unary(UnaryOp::Neg, e) => eval_expr(e, ctx)?.arith_neg(),
        Expr::Unary(UnaryOp::Not, e) => Ok(Value::Bool(!eval_expr(e, ctx)?.truthy())),
        Expr::Binary(BinOp::And, l, r) => {
            if !eval_expr(l, ctx)?.truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval_expr(r, ctx)?.truthy()))
        }
        Expr::Binary(BinOp::Or, l, r) => {
            if eval_expr(l, ctx)?.truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval_expr(r, ctx)?.truthy()))
        }
        Expr::Binary(op, l, r) => {
            let lv = eval_expr(l, ctx)?;
            let rv = eval_expr(r, ctx)?;
            eval_binop(*op, &lv, &rv)
        }
        Expr::Call(callee, args) => {
            let args = args.iter().map(|a| eval_expr(a, ctx)).collect::<Result<Vec<_>>>()?;
            call_value(callee, args, ctx)
        }
        Expr::List(items) => Ok(Value::List(
            items.iter().map(|e| eval_expr(e, ctx)).collect::<Result<_>>()?,
        )),
        Expr::Dict(pairs) => {
            let mut out = Vec::with_capacity(pairs.len());
            for (k, v) in pairs {
                let k = eval_expr(k, ctx)?;
                let v = eval_expr(v, ctx)?;
                dict_set(&mut out, k, v);
            }
            Ok(Value::Dict(out))
        }
        Expr::Index(e, i) => {
            let base = eval_expr(e, ctx)?;
            let idx = eval_expr(i, ctx)?;
            base.index(&idx)
        }
        Expr::Member(e, member) => match eval_expr(e, ctx)? {
            Value::Host(h) => h
                .get_member(member)
                .ok_or_else(|| SolarError::name(format!("{}.{member}", h.name()))),
            other => Err(SolarError::type_err(format!(
                "{} has no member `{member}`",
                other.type_name()
            ))),
        },
    }
}

fn call_value(callee: &Expr, args: Vec<Value>, ctx: &mut dyn EvalContext) -> Result<Value> {
    match callee {
        Expr::Var(name) => ctx.call(name, args),
        Expr::Member(obj, member) => match eval_expr(obj, ctx)? {
            Value::Host(h) => Ok(h.call_member(member, &args)?),
            other => Err(SolarError::type_err(format!(
                "{} has no member `{member}`",
                other.type_name()
            ))),
        },
        other => match eval_expr(other, ctx)? {
            Value::Func(name) => ctx.call(&name, args),
            v => Err(SolarError::type_err(format!("{} is not callable", v.type_name()))),
        },
    }
}

fn eval_binop(op: BinOp, l: &Value, r: &Value) -> Result<Value> {
    use std::cmp::Ordering::*;
    Ok(match op {
        BinOp::Add => l.arith_add(r)?,
        BinOp::Sub => l.arith_sub(r)?,
        BinOp::Mul => l.arith_mul(r)?,
        BinOp::Div => l.arith_div(r)?,
        BinOp::Rem => l.arith_rem(r)?,
        BinOp::Eq => Value::Bool(l == r),
        BinOp::Ne => Value::Bool(l != r),
        BinOp::Lt => Value::Bool(l.compare(r)? == Less),
        BinOp::Le => Value::Bool(l.compare(r)? != Greater),
        BinOp::Gt => Value::Bool(l.compare(r)? == Greater),
        BinOp::Ge => Value::Bool(l.compare(r)? != Less),
        BinOp::And => Value::Bool(l.truthy() && r.truthy()),
        BinOp::Or => Value::Bool(l.truthy() || r.truthy()),
    })
}

/// Convenience: parse and evaluate a standalone expression.
pub fn eval_str(src: &str, ctx: &mut dyn EvalContext) -> Result<Value> {
    let expr = parse_expr(src)?;
    eval_expr(&expr, ctx)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
