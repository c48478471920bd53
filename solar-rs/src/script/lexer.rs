//! Solar tokenizer.
//!
//! [`Lexer`] is a restartable iterator over `Result<Token, SolarError>`.  It
//! always finishes with exactly one [`TokenKind::Eof`] unless it hits an error,
//! after which it yields nothing more.
//!
//! Newlines are statement separators, so they are tokens, with two exceptions:
//! runs of blank lines collapse into one, and newlines inside `()`, `[]` or
//! `{}` are skipped so long argument lists can wrap.  `;` is an explicit
//! separator and lexes as a newline.

use std::fmt;

use super::error::{Pos, Result, SolarError};

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Let,
    Print,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    SolarDef,
    Return,
    Break,
    Continue,
    Contain,
    Call,
    Ui,
    Game,
    And,
    Or,
    Not,
    True,
    False,
    Nil,
}

impl Keyword {
    pub fn from_ident(s: &str) -> Option<Keyword> {
        Some(match s {
            "let" => Keyword::Let,
            "print" => Keyword::Print,
            "if" => Keyword::If,
            "elif" => Keyword::Elif,
            "else" => Keyword::Else,
            "while" => Keyword::While,
            "for" => Keyword::For,
            "in" => Keyword::In,
            "solar_def" => Keyword::SolarDef,
            "return" => Keyword::Return,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "contain" => Keyword::Contain,
            "call" => Keyword::Call,
            "ui" => Keyword::Ui,
            "game" => Keyword::Game,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "not" => Keyword::Not,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "nil" => Keyword::Nil,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Let => "let",
            Keyword::Print => "print",
            Keyword::If => "if",
            Keyword::Elif => "elif",
            Keyword::Else => "else",
            Keyword::While => "while",
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::SolarDef => "solar_def",
            Keyword::Return => "return",
            Keyword::Break => "break",
            Keyword::Continue => "continue",
            Keyword::Contain => "contain",
            Keyword::Call => "call",
            Keyword::Ui => "ui",
            Keyword::Game => "game",
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::Not => "not",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::Nil => "nil",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Plus => "+",
            Op::Minus => "-",
            Op::Star => "*",
            Op::Slash => "/",
            Op::Percent => "%",
            Op::EqEq => "==",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Assign => "=",
            Op::LParen => "(",
            Op::RParen => ")",
            Op::LBracket => "[",
            Op::RBracket => "]",
            Op::LBrace => "{",
            Op::RBrace => "}",
            Op::Comma => ",",
            Op::Colon => ":",
            Op::Dot => ".",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(Op),
    Keyword(Keyword),
    /// `end`
    End,
    Newline,
    /// A fenced foreign-language block, dedented.
    Passthrough { language: String, code: String },
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "identifier `{s}`"),
            TokenKind::Int(n) => write!(f, "number `{n}`"),
            TokenKind::Float(x) => write!(f, "number `{x}`"),
            TokenKind::Str(s) => write!(f, "string {s:?}"),
            TokenKind::Op(op) => write!(f, "`{}`", op.as_str()),
            TokenKind::Keyword(k) => write!(f, "keyword `{}`", k.as_str()),
            TokenKind::End => write!(f, "`end`"),
            TokenKind::Newline => write!(f, "end of line"),
            TokenKind::Passthrough { language, .. } => write!(f, "{language} block"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// The source text the token was read from.
    pub text: String,
    pub pos: Pos,
}

impl Token {
    pub fn is_keyword(&self, k: Keyword) -> bool {
        self.kind == TokenKind::Keyword(k)
    }

    pub fn is_op(&self, op: Op) -> bool {
        self.kind == TokenKind::Op(op)
    }
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

const FENCES: &[(&str, &str, &str)] = &[
    ("python:", "end_python", "python"),
    ("lua:", "end_lua", "lua"),
];

#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    /// Open `(`/`[`/`{` count.
    depth: usize,
    at_line_start: bool,
    /// Last emitted token was a separator (or nothing emitted yet).
    after_newline: bool,
    done: bool,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            pos: 0,
            line: 1,
            column: 1,
            depth: 0,
            at_line_start: true,
            after_newline: true,
            done: false,
        }
    }

    fn here(&self) -> Pos {
        Pos::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek2(&self) -> Option<char> {
        let mut it = self.src[self.pos..].chars();
        it.next();
        it.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn rest_of_line(&self) -> &'a str {
        let rest = &self.src[self.pos..];
        rest.split('\n').next().unwrap_or("")
    }

    fn skip_to_eol(&mut self) {
        while matches!(self.peek(), Some(c) if c != '\n') {
            self.bump();
        }
    }

    fn token(&self, kind: TokenKind, start: usize, pos: Pos) -> Token {
        Token { kind, text: self.src[start..self.pos].to_owned(), pos }
    }

    /// Try to read a fenced passthrough block starting on the current line.
    fn passthrough(&mut self) -> Option<Result<Token>> {
        let opener = self.rest_of_line().trim();
        let &(_, close, language) = FENCES.iter().find(|(open, _, _)| *open == opener)?;
        let pos = Pos::new(self.line, self.column + self.rest_of_line().find(opener).unwrap_or(0));
        let start = self.pos;
        self.skip_to_eol();

        let mut body: Vec<&str> = Vec::new();
        loop {
            if self.bump().is_none() {
                return Some(Err(SolarError::lex(
                    pos,
                    format!("`{opener}` block is missing its closing `{close}`"),
                )));
            }
            let line = self.rest_of_line();
            if line.trim() == close {
                self.skip_to_eol();
                break;
            }
            body.push(line);
            self.skip_to_eol();
        }

        let code = dedent(&body);
        Some(Ok(self.token(
            TokenKind::Passthrough { language: language.to_owned(), code },
            start,
            pos,
        )))
    }

    fn malformed(&self, start: usize, pos: Pos) -> SolarError {
        SolarError::lex(pos, format!("malformed number `{}`", &self.src[start..self.pos]))
    }

    fn number(&mut self, start: usize, pos: Pos) -> Result<Token> {
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        let mut is_float = false;
        if self.peek() == Some('.') {
            match self.peek2() {
                Some(c) if c.is_ascii_digit() => {
                    is_float = true;
                    self.bump();
                    while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                        self.bump();
                    }
                    if self.peek() == Some('.') && matches!(self.peek2(), Some(c) if c.is_ascii_digit()) {
                        self.bump();
                        while matches!(self.peek(), Some(c) if is_ident_char(c) || c == '.') {
                            self.bump();
                        }
                        return Err(self.malformed(start, pos));
                    }
                }
                Some(c) if is_ident_char(c) => {}
                _ => {
                    is_float = true;
                    self.bump();
                }
            }
        }
        if matches!(self.peek(), Some(c) if is_ident_char(c)) {
            while matches!(self.peek(), Some(c) if is_ident_char(c)) {
                self.bump();
            }
            return Err(self.malformed(start, pos));
        }

        let text = &self.src[start..self.pos];
        let kind = if is_float {
            TokenKind::Float(text.parse().map_err(|_| self.malformed(start, pos))?)
        } else {
            TokenKind::Int(text.parse().map_err(|_| self.malformed(start, pos))?)
        };
        Ok(self.token(kind, start, pos))
    }

    fn string(&mut self, quote: char, start: usize, pos: Pos) -> Result<Token> {
        let mut s = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(SolarError::lex(pos, "unterminated string")),
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('0') => s.push('\0'),
                    Some('\n') | None => {
                        return Err(SolarError::lex(pos, "unterminated string"));
                    }
                    Some(c) => s.push(c),
                },
                Some(c) if c == quote => break,
                Some(c) => s.push(c),
            }
        }
        Ok(self.token(TokenKind::Str(s), start, pos))
    }

    fn operator(&mut self, c: char, pos: Pos) -> Result<Op> {
        let two = |lx: &mut Self, op: Op| {
            lx.bump();
            op
        };
        Ok(match c {
            '+' => Op::Plus,
            '-' => Op::Minus,
            '*' => Op::Star,
            '/' => Op::Slash,
            '%' => Op::Percent,
            '=' if self.peek() == Some('=') => two(self, Op::EqEq),
            '=' => Op::Assign,
            '!' if self.peek() == Some('=') => two(self, Op::Ne),
            '<' if self.peek() == Some('=') => two(self, Op::Le),
            '<' => Op::Lt,
            '>' if self.peek() == Some('=') => two(self, Op::Ge),
            '>' => Op::Gt,
            '(' => Op::LParen,
            ')' => Op::RParen,
            '[' => Op::LBracket,
            ']' => Op::RBracket,
            '{' => Op::LBrace,
            '}' => Op::RBrace,
            ',' => Op::Comma,
            ':' => Op::Colon,
            '.' => Op::Dot,
            other => {
                return Err(SolarError::lex(pos, format!("unexpected character `{other}`")));
            }
        })
    }

    fn next_token(&mut self) -> Result<Token> {
        loop {
            if self.at_line_start {
                self.at_line_start = false;
                if self.depth == 0 {
                    if let Some(tok) = self.passthrough() {
                        return tok;
                    }
                }
            }

            let pos = self.here();
            let start = self.pos;
            let Some(c) = self.bump() else {
                return Ok(self.token(TokenKind::Eof, start, pos));
            };

            match c {
                ' ' | '\t' | '\r' => continue,
                '#' => self.skip_to_eol(),
                '\n' => {
                    self.at_line_start = true;
                    if self.depth == 0 && !self.after_newline {
                        return Ok(self.token(TokenKind::Newline, start, pos));
                    }
                }
                ';' => {
                    if !self.after_newline {
                        return Ok(self.token(TokenKind::Newline, start, pos));
                    }
                }
                '"' | '\'' => return self.string(c, start, pos),
                c if c.is_ascii_digit() => return self.number(start, pos),
                c if is_ident_start(c) => {
                    while matches!(self.peek(), Some(c) if is_ident_char(c)) {
                        self.bump();
                    }
                    let word = &self.src[start..self.pos];
                    let kind = if word == "end" {
                        TokenKind::End
                    } else if let Some(k) = Keyword::from_ident(word) {
                        TokenKind::Keyword(k)
                    } else {
                        TokenKind::Ident(word.to_owned())
                    };
                    return Ok(self.token(kind, start, pos));
                }
                c => {
                    let op = self.operator(c, pos)?;
                    match op {
                        Op::LParen | Op::LBracket | Op::LBrace => self.depth += 1,
                        Op::RParen | Op::RBracket | Op::RBrace => {
                            self.depth = self.depth.saturating_sub(1)
                        }
                        _ => {}
                    }
                    return Ok(self.token(TokenKind::Op(op), start, pos));
                }
            }
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.next_token();
        match &result {
            Ok(tok) => {
                self.done = tok.kind == TokenKind::Eof;
                self.after_newline = tok.kind == TokenKind::Newline;
            }
            Err(_) => self.done = true,
        }
        Some(result)
    }
}

/// Remove the common leading indentation from a block of lines.
fn dedent(lines: &[&str]) -> String {
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);
    let mut out = String::new();
    for line in lines {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.len() >= indent {
            out.push_str(&line[indent..]);
        } else {
            out.push_str(line.trim_start());
        }
        out.push('\n');
    }
    out
}

/// Tokenize a whole source text.
pub fn tokenize(src: &str) -> Result<Vec<Token>> {
    Lexer::new(src).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::error::ErrorKind;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).expect("lex failed").into_iter().map(|t| t.kind).collect()
    }

    fn ident(s: &str) -> TokenKind {
        TokenKind::Ident(s.into())
    }

    #[test]
    fn let_statement() {
        assert_eq!(
            kinds("let x = 5"),
            vec![
                TokenKind::Keyword(Keyword::Let),
                ident("x"),
                TokenKind::Op(Op::Assign),
                TokenKind::Int(5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn positions_are_one_based() {
        let toks = tokenize("let x = 5\n  print x").unwrap();
        assert_eq!(toks[0].pos, Pos::new(1, 1));
        assert_eq!(toks[3].pos, Pos::new(1, 9));
        // toks[4] is the newline
        assert_eq!(toks[5].pos, Pos::new(2, 3));
        assert_eq!(toks[5].text, "print");
    }

    #[test]
    fn blank_lines_collapse() {
        assert_eq!(
            kinds("\n\na\n\n\n# note\nb\n"),
            vec![ident("a"), TokenKind::Newline, ident("b"), TokenKind::Newline, TokenKind::Eof]
        );
    }

    #[test]
    fn newlines_inside_brackets_are_skipped() {
        assert_eq!(
            kinds("f(1,\n 2)\n"),
            vec![
                ident("f"),
                TokenKind::Op(Op::LParen),
                TokenKind::Int(1),
                TokenKind::Op(Op::Comma),
                TokenKind::Int(2),
                TokenKind::Op(Op::RParen),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn semicolon_is_a_separator() {
        assert_eq!(
            kinds("a; b"),
            vec![ident("a"), TokenKind::Newline, ident("b"), TokenKind::Eof]
        );
    }

    #[test]
    fn keywords_inside_strings_are_not_tokens() {
        assert_eq!(
            kinds("print \"if x: end # not a comment\""),
            vec![
                TokenKind::Keyword(Keyword::Print),
                TokenKind::Str("if x: end # not a comment".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#"'a\n\t\'b\\' "q\"""#),
            vec![
                TokenKind::Str("a\n\t'b\\".into()),
                TokenKind::Str("q\"".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string() {
        let e = tokenize("print \"abc\nprint 1").unwrap_err();
        assert!(matches!(e.kind, ErrorKind::Lex(ref m) if m.contains("unterminated")));
        assert_eq!(e.line(), Some(1));
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("3 3.25 5."),
            vec![TokenKind::Int(3), TokenKind::Float(3.25), TokenKind::Float(5.0), TokenKind::Eof]
        );
    }

    #[test]
    fn malformed_numbers() {
        for src in ["12abc", "1.2.3", "99999999999999999999"] {
            let e = tokenize(src).unwrap_err();
            assert!(
                matches!(e.kind, ErrorKind::Lex(ref m) if m.contains("malformed number")),
                "{src}: {e}"
            );
        }
    }

    #[test]
    fn member_access_after_identifier() {
        assert_eq!(
            kinds("math.pi"),
            vec![ident("math"), TokenKind::Op(Op::Dot), ident("pi"), TokenKind::Eof]
        );
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(
            kinds("a <= b != c"),
            vec![
                ident("a"),
                TokenKind::Op(Op::Le),
                ident("b"),
                TokenKind::Op(Op::Ne),
                ident("c"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unknown_character() {
        let e = tokenize("let x = 5 $").unwrap_err();
        assert!(matches!(e.kind, ErrorKind::Lex(_)));
        assert_eq!(e.location, crate::script::error::Location::At(Pos::new(1, 11)));
    }

    #[test]
    fn end_is_a_terminator() {
        assert_eq!(kinds("end"), vec![TokenKind::End, TokenKind::Eof]);
        assert_eq!(kinds("ending"), vec![ident("ending"), TokenKind::Eof]);
    }

    #[test]
    fn passthrough_block_is_dedented() {
        let src = "let a = 1\n  python:\n    z = a + 4\n    if z:\n        y = 1\n  end_python\nprint z\n";
        let toks = tokenize(src).unwrap();
        let block = toks
            .iter()
            .find(|t| matches!(t.kind, TokenKind::Passthrough { .. }))
            .expect("no passthrough token");
        assert_eq!(block.pos, Pos::new(2, 3));
        assert_eq!(
            block.kind,
            TokenKind::Passthrough {
                language: "python".into(),
                code: "z = a + 4\nif z:\n    y = 1\n".into(),
            }
        );
        // the statement after the fence is still lexed normally
        assert!(toks.iter().any(|t| t.is_keyword(Keyword::Print) && t.pos.line == 7));
    }

    #[test]
    fn passthrough_contents_are_verbatim() {
        let toks = tokenize("lua:\nx = \"unterminated\nend_lua").unwrap();
        assert_eq!(
            toks[0].kind,
            TokenKind::Passthrough { language: "lua".into(), code: "x = \"unterminated\n".into() }
        );
    }

    #[test]
    fn passthrough_missing_fence() {
        let e = tokenize("python:\nx = 1\n").unwrap_err();
        assert!(matches!(e.kind, ErrorKind::Lex(ref m) if m.contains("end_python")));
    }

    #[test]
    fn lexer_is_restartable() {
        let lx = Lexer::new("let a = [1, 2]");
        let first: Vec<_> = lx.clone().collect();
        let second: Vec<_> = lx.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn stops_after_error() {
        let mut lx = Lexer::new("$ x");
        assert!(matches!(lx.next(), Some(Err(_))));
        assert!(lx.next().is_none());
    }
}
