//! Solar statement AST and program parser.
//!
//! A program is a sequence of statements separated by newlines or `;`.
//! Blocks open with a keyword and a `:` and close with `end`; `elif` and
//! `else` continue an open `if`.  Nesting is tracked on an explicit stack of
//! open blocks so an unterminated block is reported against the line that
//! opened it.

use std::rc::Rc;

use super::error::{Pos, Result, SolarError};
use super::expr::{Expr, ExprParser, MAX_NESTING};
use super::lexer::{tokenize, Keyword, Op, Token, TokenKind};
use super::stack::ensure_sufficient_stack;

/// A parsed statement and the line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `let name = expr`
    Let { name: String, value: Expr },
    /// `print a, b, ...`
    Print(Vec<Expr>),
    /// `if cond: ... [elif ...] [else: ...] end`; `elif` nests in `else_block`.
    If {
        cond: Expr,
        then_block: Vec<Stmt>,
        else_block: Vec<Stmt>,
    },
    /// `while cond: ... end`
    While { cond: Expr, body: Vec<Stmt> },
    /// `for var in iterable: ... end`
    For { var: String, iter: Expr, body: Vec<Stmt> },
    /// `solar_def name(params): ... end`
    Def {
        name: String,
        params: Vec<String>,
        body: Rc<Vec<Stmt>>,
    },
    /// A call used as a statement; always an [`Expr::Call`].
    Call(Expr),
    /// `return [expr]`
    Return(Option<Expr>),
    Break,
    Continue,
    /// `contain a.b.c`
    Import(String),
    /// A fenced `python:` / `lua:` block.
    Passthrough { language: String, code: String },
    /// `ui ...` / `game ...`
    Frontend(FrontendStmt),
}

// ── Frontend commands ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Ui,
    Game,
}

impl Surface {
    pub fn as_str(self) -> &'static str {
        match self {
            Surface::Ui => "ui",
            Surface::Game => "game",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    At,
    From,
    To,
    Color,
    Title,
    Size,
    Frames,
    Into,
    Do,
}

impl ClauseKind {
    fn from_word(s: &str) -> Option<ClauseKind> {
        Some(match s {
            "at" => ClauseKind::At,
            "from" => ClauseKind::From,
            "to" => ClauseKind::To,
            "color" => ClauseKind::Color,
            "title" => ClauseKind::Title,
            "size" => ClauseKind::Size,
            "frames" => ClauseKind::Frames,
            "into" => ClauseKind::Into,
            "do" => ClauseKind::Do,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClauseKind::At => "at",
            ClauseKind::From => "from",
            ClauseKind::To => "to",
            ClauseKind::Color => "color",
            ClauseKind::Title => "title",
            ClauseKind::Size => "size",
            ClauseKind::Frames => "frames",
            ClauseKind::Into => "into",
            ClauseKind::Do => "do",
        }
    }

    /// Number of expression arguments for value clauses.
    fn value_count(self) -> usize {
        match self {
            ClauseKind::At | ClauseKind::Size => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Positional {
    /// A literal name (window, widget, key).
    Name(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Value(ClauseKind, Vec<Expr>),
    /// `into var`
    Into(String),
    /// `do func arg...`
    Do { func: String, args: Vec<Expr> },
}

impl Clause {
    pub fn kind(&self) -> ClauseKind {
        match self {
            Clause::Value(k, _) => *k,
            Clause::Into(_) => ClauseKind::Into,
            Clause::Do { .. } => ClauseKind::Do,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrontendStmt {
    pub surface: Surface,
    pub verb: String,
    pub positionals: Vec<Positional>,
    pub clauses: Vec<Clause>,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Name,
    Expr,
}

struct VerbSpec {
    surface: Surface,
    verb: &'static str,
    slots: &'static [Slot],
    required: &'static [ClauseKind],
    optional: &'static [ClauseKind],
}

const fn verb(
    surface: Surface,
    verb: &'static str,
    slots: &'static [Slot],
    required: &'static [ClauseKind],
    optional: &'static [ClauseKind],
) -> VerbSpec {
    VerbSpec { surface, verb, slots, required, optional }
}

use ClauseKind as C;
use Slot::{Expr as E, Name as N};
use Surface::{Game, Ui};

static VERBS: &[VerbSpec] = &[
    verb(Ui, "window", &[N], &[], &[C::Title, C::Size]),
    verb(Ui, "title", &[N, E], &[], &[]),
    verb(Ui, "size", &[N, E, E], &[], &[]),
    verb(Ui, "bg", &[N, E], &[], &[]),
    verb(Ui, "fg", &[N, E], &[], &[]),
    verb(Ui, "label", &[N, N, E], &[C::At], &[C::Color]),
    verb(Ui, "button", &[N, N, E], &[C::At, C::Do], &[C::Color]),
    verb(Ui, "entry", &[N, N], &[C::At], &[]),
    verb(Ui, "slider", &[N, N], &[C::From, C::To, C::At], &[]),
    verb(Ui, "checkbox", &[N, N, E], &[C::At], &[C::Color]),
    verb(Ui, "bind", &[N, N], &[C::Do], &[]),
    verb(Ui, "text", &[N, E], &[], &[]),
    verb(Ui, "set", &[N, E], &[], &[]),
    verb(Ui, "get", &[N], &[C::Into], &[]),
    verb(Ui, "run", &[N], &[], &[]),
    verb(Game, "window", &[E, E], &[], &[C::Title]),
    verb(Game, "clear", &[], &[], &[C::Color]),
    verb(Game, "rect", &[E, E, E, E], &[], &[C::Color]),
    verb(Game, "circle", &[E, E, E], &[], &[C::Color]),
    verb(Game, "line", &[E, E, E, E], &[], &[C::Color]),
    verb(Game, "text", &[E], &[C::At], &[C::Color]),
    verb(Game, "sound", &[E], &[], &[]),
    verb(Game, "key", &[N], &[C::Do], &[]),
    verb(Game, "tick", &[], &[C::Do], &[]),
    verb(Game, "run", &[], &[], &[C::Frames]),
    verb(Game, "quit", &[], &[], &[]),
];

// ── Parser ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    If,
    While,
    For,
    Def,
}

impl BlockKind {
    fn keyword(self) -> &'static str {
        match self {
            BlockKind::If => "if",
            BlockKind::While => "while",
            BlockKind::For => "for",
            BlockKind::Def => "solar_def",
        }
    }
}

#[derive(Debug)]
struct OpenBlock {
    kind: BlockKind,
    pos: Pos,
}

struct Parser {
    ts: ExprParser,
    blocks: Vec<OpenBlock>,
    fn_depth: usize,
    loop_depth: usize,
}

/// Parse a Solar program.
pub fn parse_program(src: &str) -> Result<Vec<Stmt>> {
    parse_tokens(tokenize(src)?)
}

/// Parse an already tokenized program.
pub fn parse_tokens(tokens: Vec<Token>) -> Result<Vec<Stmt>> {
    let mut parser = Parser { ts: ExprParser::new(tokens), blocks: Vec::new(), fn_depth: 0, loop_depth: 0 };
    parser.parse_top()
}

impl Parser {
    fn peek(&self) -> &Token {
        self.ts.peek()
    }

    fn skip_newlines(&mut self) {
        while self.peek().kind == TokenKind::Newline {
            self.ts.advance();
        }
    }

    /// End of a simple statement: newline, `;`, end of input, or a block
    /// keyword that closes or continues the enclosing block.
    fn at_separator(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline
                | TokenKind::Eof
                | TokenKind::End
                | TokenKind::Keyword(Keyword::Elif | Keyword::Else)
        )
    }

    fn expect_separator(&mut self) -> Result<()> {
        if !self.at_separator() {
            return Err(self.ts.error("expected end of statement"));
        }
        if self.peek().kind == TokenKind::Newline {
            self.ts.advance();
        }
        Ok(())
    }

    fn parse_top(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            let tok = self.peek();
            match tok.kind {
                TokenKind::Eof => return Ok(stmts),
                TokenKind::End => {
                    return Err(SolarError::parse(tok.pos, "`end` without an open block"));
                }
                TokenKind::Keyword(k @ (Keyword::Elif | Keyword::Else)) => {
                    return Err(SolarError::parse(
                        tok.pos,
                        format!("`{}` without an open `if`", k.as_str()),
                    ));
                }
                _ => {
                    stmts.push(self.parse_statement()?);
                    self.expect_separator()?;
                }
            }
        }
    }

    /// Statements up to the terminator of the innermost open block.  Returns
    /// the terminator token (`end`, `elif` or `else`), already consumed.
    fn parse_block(&mut self) -> Result<(Vec<Stmt>, Token)> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek().kind {
                TokenKind::End | TokenKind::Keyword(Keyword::Elif | Keyword::Else) => {
                    return Ok((stmts, self.ts.advance()));
                }
                TokenKind::Eof => {
                    let (kind, pos) = match self.blocks.last() {
                        Some(b) => (b.kind, b.pos),
                        None => return Err(self.ts.error("unexpected end of block")),
                    };
                    return Err(SolarError::parse(
                        pos,
                        format!("`{}` block is missing its `end`", kind.keyword()),
                    ));
                }
                _ => {
                    stmts.push(self.parse_statement()?);
                    self.expect_separator()?;
                }
            }
        }
    }

    /// Parse inside a newly opened block, refusing to nest past
    /// [`MAX_NESTING`].
    fn in_block<T>(
        &mut self,
        kind: BlockKind,
        pos: Pos,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if self.blocks.len() >= MAX_NESTING {
            return Err(SolarError::parse(
                pos,
                format!("blocks nested more than {MAX_NESTING} levels"),
            ));
        }
        self.blocks.push(OpenBlock { kind, pos });
        let result = ensure_sufficient_stack(|| f(self));
        self.blocks.pop();
        result
    }

    /// A block that must be closed by `end` (anything but `if`).
    fn parse_plain_block(&mut self, kind: BlockKind, pos: Pos) -> Result<Vec<Stmt>> {
        let (body, term) = self.in_block(kind, pos, Self::parse_block)?;
        if term.kind != TokenKind::End {
            return Err(SolarError::parse(
                term.pos,
                format!("`{}` without an open `if`", term.text),
            ));
        }
        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        let tok = self.peek().clone();
        let line = tok.pos.line;
        let kind = match &tok.kind {
            TokenKind::Keyword(Keyword::Let) => {
                self.ts.advance();
                let (name, _) = self.ts.expect_ident("a variable name after `let`")?;
                self.ts.expect_op(Op::Assign, "after the variable name")?;
                StmtKind::Let { name, value: self.ts.parse_expr()? }
            }
            TokenKind::Keyword(Keyword::Print) => {
                self.ts.advance();
                StmtKind::Print(self.parse_print_args()?)
            }
            TokenKind::Keyword(Keyword::If) => {
                self.ts.advance();
                self.in_block(BlockKind::If, tok.pos, Self::parse_if_chain)?
            }
            TokenKind::Keyword(Keyword::While) => {
                self.ts.advance();
                let cond = self.ts.parse_expr()?;
                self.ts.expect_op(Op::Colon, "after the `while` condition")?;
                let body = self.parse_loop_body(BlockKind::While, tok.pos)?;
                StmtKind::While { cond, body }
            }
            TokenKind::Keyword(Keyword::For) => {
                self.ts.advance();
                let (var, _) = self.ts.expect_ident("a loop variable after `for`")?;
                if !self.ts.eat_keyword(Keyword::In) {
                    return Err(self.ts.error("expected `in` after the loop variable"));
                }
                let iter = self.ts.parse_expr()?;
                self.ts.expect_op(Op::Colon, "after the `for` iterable")?;
                let body = self.parse_loop_body(BlockKind::For, tok.pos)?;
                StmtKind::For { var, iter, body }
            }
            TokenKind::Keyword(Keyword::SolarDef) => {
                self.ts.advance();
                self.parse_def(tok.pos)?
            }
            TokenKind::Keyword(Keyword::Return) => {
                if self.fn_depth == 0 {
                    return Err(SolarError::parse(tok.pos, "`return` outside of a function"));
                }
                self.ts.advance();
                let value = if self.at_separator() { None } else { Some(self.ts.parse_expr()?) };
                StmtKind::Return(value)
            }
            TokenKind::Keyword(k @ (Keyword::Break | Keyword::Continue)) => {
                if self.loop_depth == 0 {
                    return Err(SolarError::parse(
                        tok.pos,
                        format!("`{}` outside of a loop", k.as_str()),
                    ));
                }
                self.ts.advance();
                if *k == Keyword::Break { StmtKind::Break } else { StmtKind::Continue }
            }
            TokenKind::Keyword(Keyword::Contain) => {
                self.ts.advance();
                let (mut path, _) = self.ts.expect_ident("a package name after `contain`")?;
                while self.ts.eat_op(Op::Dot) {
                    let (part, _) = self.ts.expect_ident("a name after `.`")?;
                    path.push('.');
                    path.push_str(&part);
                }
                StmtKind::Import(path)
            }
            TokenKind::Passthrough { language, code } => {
                let kind = StmtKind::Passthrough { language: language.clone(), code: code.clone() };
                self.ts.advance();
                kind
            }
            TokenKind::Keyword(Keyword::Call) => {
                self.ts.advance();
                self.parse_call_command()?
            }
            TokenKind::Keyword(Keyword::Ui) => {
                self.ts.advance();
                StmtKind::Frontend(self.parse_frontend(Surface::Ui)?)
            }
            TokenKind::Keyword(Keyword::Game) => {
                self.ts.advance();
                StmtKind::Frontend(self.parse_frontend(Surface::Game)?)
            }
            TokenKind::Ident(name) => {
                if self.ts.peek_nth(1).is_op(Op::Assign) {
                    return Err(SolarError::parse(
                        tok.pos,
                        format!("assignment needs `let`: write `let {name} = ...`"),
                    ));
                }
                self.parse_expr_statement(tok.pos)?
            }
            _ => return Err(self.ts.error("expected a statement")),
        };
        Ok(Stmt { kind, line })
    }

    fn parse_print_args(&mut self) -> Result<Vec<Expr>> {
        if self.ts.check_op(Op::LParen) && self.ts.touches_previous() {
            return self.ts.parse_paren_args();
        }
        let mut args = Vec::new();
        while !self.at_separator() {
            args.push(self.ts.parse_expr()?);
            self.ts.eat_op(Op::Comma);
        }
        Ok(args)
    }

    fn parse_if_chain(&mut self) -> Result<StmtKind> {
        let cond = self.ts.parse_expr()?;
        self.ts.expect_op(Op::Colon, "after the `if` condition")?;
        let (then_block, term) = self.parse_block()?;
        let else_block = match term.kind {
            TokenKind::Keyword(Keyword::Elif) => {
                let kind = ensure_sufficient_stack(|| self.parse_if_chain())?;
                vec![Stmt { kind, line: term.pos.line }]
            }
            TokenKind::Keyword(Keyword::Else) => {
                self.ts.expect_op(Op::Colon, "after `else`")?;
                let (block, end) = self.parse_block()?;
                if end.kind != TokenKind::End {
                    return Err(SolarError::parse(
                        end.pos,
                        format!("`{}` after `else`; expected `end`", end.text),
                    ));
                }
                block
            }
            _ => Vec::new(),
        };
        Ok(StmtKind::If { cond, then_block, else_block })
    }

    fn parse_loop_body(&mut self, kind: BlockKind, pos: Pos) -> Result<Vec<Stmt>> {
        self.loop_depth += 1;
        let body = self.parse_plain_block(kind, pos);
        self.loop_depth -= 1;
        body
    }

    fn parse_def(&mut self, pos: Pos) -> Result<StmtKind> {
        let (name, _) = self.ts.expect_ident("a function name after `solar_def`")?;
        let mut params: Vec<String> = Vec::new();
        if self.ts.eat_op(Op::LParen) {
            loop {
                if self.ts.eat_op(Op::RParen) {
                    break;
                }
                let (param, ppos) = self.ts.expect_ident("a parameter name")?;
                if params.contains(&param) {
                    return Err(SolarError::parse(
                        ppos,
                        format!("duplicate parameter `{param}` in `{name}`"),
                    ));
                }
                params.push(param);
                if !self.ts.eat_op(Op::Comma) {
                    self.ts.expect_op(Op::RParen, "after the parameter list")?;
                    break;
                }
            }
        }
        self.ts.expect_op(Op::Colon, "after the function signature")?;

        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.fn_depth += 1;
        let body = self.parse_plain_block(BlockKind::Def, pos);
        self.fn_depth -= 1;
        self.loop_depth = saved_loops;

        Ok(StmtKind::Def { name, params, body: Rc::new(body?) })
    }

    /// Space-separated command arguments up to the end of the statement.
    fn parse_command_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.at_separator() {
            args.push(self.ts.parse_command_arg()?);
            self.ts.eat_op(Op::Comma);
        }
        Ok(args)
    }

    /// `call f a b` or `call f(a, b)`.
    fn parse_call_command(&mut self) -> Result<StmtKind> {
        let callee = if self.ts.eat_keyword(Keyword::Print) {
            Expr::Var("print".into())
        } else {
            self.ts.parse_command_arg()?
        };
        if matches!(callee, Expr::Call(..)) && self.at_separator() {
            return Ok(StmtKind::Call(callee));
        }
        let args = self.parse_command_args()?;
        Ok(StmtKind::Call(Expr::Call(Box::new(callee), args)))
    }

    /// A statement starting with an identifier: `f(x)`, `m.f(x)`, or the
    /// command form `f x y`.
    fn parse_expr_statement(&mut self, pos: Pos) -> Result<StmtKind> {
        let e = self.ts.parse_command_arg()?;
        if self.at_separator() {
            return match e {
                Expr::Call(..) => Ok(StmtKind::Call(e)),
                Expr::Var(_) | Expr::Member(..) => Ok(StmtKind::Call(Expr::Call(Box::new(e), Vec::new()))),
                _ => Err(SolarError::parse(pos, "only function calls can be used as statements")),
            };
        }
        if matches!(e, Expr::Var(_) | Expr::Member(..)) && starts_command_arg(&self.peek().kind) {
            let args = self.parse_command_args()?;
            return Ok(StmtKind::Call(Expr::Call(Box::new(e), args)));
        }
        Err(SolarError::parse(pos, "only function calls can be used as statements"))
    }

    fn parse_frontend(&mut self, surface: Surface) -> Result<FrontendStmt> {
        let (verb_name, vpos) = match &self.peek().kind {
            TokenKind::Ident(v) => (v.clone(), self.peek().pos),
            _ => return Err(self.ts.error(format_args!("expected a `{}` command", surface.as_str()))),
        };
        let spec = VERBS
            .iter()
            .find(|s| s.surface == surface && s.verb == verb_name)
            .ok_or_else(|| {
                SolarError::parse(vpos, format!("unknown {} command `{verb_name}`", surface.as_str()))
            })?;
        self.ts.advance();
        let full = format!("{} {}", surface.as_str(), spec.verb);
        let allowed = |k: ClauseKind| spec.required.contains(&k) || spec.optional.contains(&k);

        let mut positionals = Vec::with_capacity(spec.slots.len());
        for (i, slot) in spec.slots.iter().enumerate() {
            let clause_next = matches!(&self.peek().kind, TokenKind::Ident(w) if ClauseKind::from_word(w).is_some_and(allowed));
            if self.at_separator() || clause_next {
                return Err(self.ts.error(format_args!(
                    "`{full}` expects {} argument(s), missing argument {}",
                    spec.slots.len(),
                    i + 1
                )));
            }
            positionals.push(match slot {
                Slot::Name => Positional::Name(self.parse_name()?),
                Slot::Expr => Positional::Expr(self.ts.parse_command_arg()?),
            });
        }

        let mut clauses: Vec<Clause> = Vec::new();
        while !self.at_separator() {
            let tok = self.peek().clone();
            let kind = match &tok.kind {
                TokenKind::Ident(w) => ClauseKind::from_word(w),
                _ => None,
            };
            let Some(kind) = kind else {
                return Err(self.ts.error(format_args!("unexpected argument to `{full}`")));
            };
            if !allowed(kind) {
                return Err(SolarError::parse(
                    tok.pos,
                    format!("`{full}` does not take `{}`", kind.as_str()),
                ));
            }
            if clauses.iter().any(|c| c.kind() == kind) {
                return Err(SolarError::parse(
                    tok.pos,
                    format!("duplicate `{}` in `{full}`", kind.as_str()),
                ));
            }
            self.ts.advance();
            let clause = match kind {
                ClauseKind::Into => Clause::Into(self.ts.expect_ident("a variable name after `into`")?.0),
                ClauseKind::Do => {
                    let (func, _) = self.ts.expect_ident("a function name after `do`")?;
                    let mut args = Vec::new();
                    while !self.at_separator() && !self.at_clause_word() {
                        args.push(self.ts.parse_command_arg()?);
                    }
                    Clause::Do { func, args }
                }
                _ => {
                    let mut values = Vec::new();
                    for _ in 0..kind.value_count() {
                        if self.at_separator() {
                            return Err(self.ts.error(format_args!(
                                "`{}` expects {} value(s)",
                                kind.as_str(),
                                kind.value_count()
                            )));
                        }
                        values.push(self.ts.parse_command_arg()?);
                    }
                    Clause::Value(kind, values)
                }
            };
            clauses.push(clause);
        }

        if let Some(missing) = spec.required.iter().find(|k| !clauses.iter().any(|c| c.kind() == **k)) {
            return Err(self.ts.error(format_args!("`{full}` requires `{}`", missing.as_str())));
        }

        Ok(FrontendStmt { surface, verb: spec.verb.to_owned(), positionals, clauses })
    }

    fn at_clause_word(&self) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(w) if ClauseKind::from_word(w).is_some())
    }

    /// A literal name: identifier, string, or integer.
    fn parse_name(&mut self) -> Result<String> {
        let tok = self.peek();
        let name = match &tok.kind {
            TokenKind::Ident(s) | TokenKind::Str(s) => s.clone(),
            TokenKind::Int(_) => tok.text.clone(),
            _ => return Err(self.ts.error("expected a name")),
        };
        self.ts.advance();
        Ok(name)
    }
}

fn starts_command_arg(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Ident(_)
            | TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::Keyword(Keyword::True | Keyword::False | Keyword::Nil | Keyword::Not)
            | TokenKind::Op(Op::LParen | Op::LBracket | Op::LBrace | Op::Minus)
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
