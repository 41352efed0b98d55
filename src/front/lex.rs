//! The lexer: a table of regexes tried in order at the current position,
//! first match wins. Keyword patterns are listed ahead of the identifier
//! pattern and anchored with a word boundary so `iffy` lexes as one
//! identifier, not `if` followed by `fy`.

use derive_more::Display;
use regex::Regex;

use crate::common::Line;

/// Token classes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum TokenKind {
    #[display("identifier")]
    Ident,
    #[display("integer literal")]
    Num,
    #[display("'int'")]
    KwInt,
    #[display("'void'")]
    KwVoid,
    #[display("'if'")]
    KwIf,
    #[display("'else'")]
    KwElse,
    #[display("'while'")]
    KwWhile,
    #[display("'break'")]
    KwBreak,
    #[display("'continue'")]
    KwContinue,
    #[display("'return'")]
    KwReturn,
    #[display("'('")]
    LParen,
    #[display("')'")]
    RParen,
    #[display("'{{'")]
    LBrace,
    #[display("'}}'")]
    RBrace,
    #[display("'['")]
    LBracket,
    #[display("']'")]
    RBracket,
    #[display("','")]
    Comma,
    #[display("';'")]
    Semi,
    #[display("'='")]
    Assign,
    #[display("'+'")]
    Plus,
    #[display("'-'")]
    Minus,
    #[display("'*'")]
    Star,
    #[display("'/'")]
    Slash,
    #[display("'%'")]
    Percent,
    #[display("'<='")]
    Le,
    #[display("'<'")]
    Lt,
    #[display("'>='")]
    Ge,
    #[display("'>'")]
    Gt,
    #[display("'=='")]
    EqEq,
    #[display("'!='")]
    Ne,
    #[display("'&&'")]
    AndAnd,
    #[display("'||'")]
    OrOr,
    #[display("'!'")]
    Bang,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{kind} '{text}'")]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    pub line: Line,
}

pub struct LexError(pub usize, pub Line, pub char);

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: unexpected character {:?} at byte {}", self.1, self.2, self.0)
    }
}

impl std::fmt::Debug for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

pub struct Lexer<'input> {
    input: &'input str,
    pos: usize,
    line: Line,
    whitespace: Regex,
    matchers: Vec<(Regex, TokenKind)>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        let kw = |word: &str| format!(r"\A{word}\b");
        let matchers = vec![
            (Regex::new(&kw("int")).unwrap(), TokenKind::KwInt),
            (Regex::new(&kw("void")).unwrap(), TokenKind::KwVoid),
            (Regex::new(&kw("if")).unwrap(), TokenKind::KwIf),
            (Regex::new(&kw("else")).unwrap(), TokenKind::KwElse),
            (Regex::new(&kw("while")).unwrap(), TokenKind::KwWhile),
            (Regex::new(&kw("break")).unwrap(), TokenKind::KwBreak),
            (Regex::new(&kw("continue")).unwrap(), TokenKind::KwContinue),
            (Regex::new(&kw("return")).unwrap(), TokenKind::KwReturn),
            (Regex::new(r"\A[A-Za-z_][A-Za-z0-9_]*").unwrap(), TokenKind::Ident),
            (Regex::new(r"\A[0-9]+").unwrap(), TokenKind::Num),
            (Regex::new(r"\A\(").unwrap(), TokenKind::LParen),
            (Regex::new(r"\A\)").unwrap(), TokenKind::RParen),
            (Regex::new(r"\A\{").unwrap(), TokenKind::LBrace),
            (Regex::new(r"\A\}").unwrap(), TokenKind::RBrace),
            (Regex::new(r"\A\[").unwrap(), TokenKind::LBracket),
            (Regex::new(r"\A\]").unwrap(), TokenKind::RBracket),
            (Regex::new(r"\A,").unwrap(), TokenKind::Comma),
            (Regex::new(r"\A;").unwrap(), TokenKind::Semi),
            (Regex::new(r"\A==").unwrap(), TokenKind::EqEq),
            (Regex::new(r"\A=").unwrap(), TokenKind::Assign),
            (Regex::new(r"\A\+").unwrap(), TokenKind::Plus),
            (Regex::new(r"\A-").unwrap(), TokenKind::Minus),
            (Regex::new(r"\A\*").unwrap(), TokenKind::Star),
            (Regex::new(r"\A/").unwrap(), TokenKind::Slash),
            (Regex::new(r"\A%").unwrap(), TokenKind::Percent),
            (Regex::new(r"\A<=").unwrap(), TokenKind::Le),
            (Regex::new(r"\A<").unwrap(), TokenKind::Lt),
            (Regex::new(r"\A>=").unwrap(), TokenKind::Ge),
            (Regex::new(r"\A>").unwrap(), TokenKind::Gt),
            (Regex::new(r"\A!=").unwrap(), TokenKind::Ne),
            (Regex::new(r"\A&&").unwrap(), TokenKind::AndAnd),
            (Regex::new(r"\A\|\|").unwrap(), TokenKind::OrOr),
            (Regex::new(r"\A!").unwrap(), TokenKind::Bang),
        ];
        Lexer {
            input,
            pos: 0,
            line: 1,
            whitespace: Regex::new(r"\A(?:[ \t\f\r\n\v]|(?://[^\n]*))*").unwrap(),
            matchers,
        }
    }

    pub fn end_of_input(&self) -> bool {
        self.pos == self.input.len()
    }

    fn advance(&mut self, len: usize) {
        self.line += self.input[self.pos..self.pos + len].matches('\n').count() as Line;
        self.pos += len;
    }

    fn skip_whitespace(&mut self) {
        if let Some(m) = self.whitespace.find(&self.input[self.pos..]) {
            self.advance(m.end());
        }
    }

    /// Get the next token if possible.
    ///
    /// The return type distinguishes between end-of-input and lexer error.
    pub fn next(&mut self) -> Result<Option<Token<'input>>, LexError> {
        self.skip_whitespace();
        if self.end_of_input() {
            return Ok(None);
        }
        let rest = &self.input[self.pos..];
        for (re, kind) in &self.matchers {
            if let Some(m) = re.find(rest) {
                let text = m.as_str();
                let line = self.line;
                self.advance(text.len());
                return Ok(Some(Token { kind: *kind, text, line }));
            }
        }
        let bad = rest.chars().next().expect("not at end of input");
        Err(LexError(self.pos, self.line, bad))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        while let Some(tok) = lexer.next().unwrap() {
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn keywords_are_not_lexed_as_identifiers() {
        assert_eq!(kinds("if iffy"), vec![TokenKind::KwIf, TokenKind::Ident]);
    }

    #[test]
    fn tracks_line_numbers_across_newlines_and_comments() {
        let mut lexer = Lexer::new("int x; // comment\nint y;");
        let mut lines = Vec::new();
        while let Some(tok) = lexer.next().unwrap() {
            lines.push(tok.line);
        }
        assert_eq!(lines, vec![1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn operators_prefer_the_longest_match() {
        assert_eq!(
            kinds("<= < == = != !"),
            vec![
                TokenKind::Le,
                TokenKind::Lt,
                TokenKind::EqEq,
                TokenKind::Assign,
                TokenKind::Ne,
                TokenKind::Bang,
            ]
        );
    }

    #[test]
    fn rejects_unknown_characters() {
        let mut lexer = Lexer::new("int x = 1 @ 2;");
        loop {
            match lexer.next() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected a lex error"),
                Err(e) => {
                    assert_eq!(e.2, '@');
                    break;
                }
            }
        }
    }
}
