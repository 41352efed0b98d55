//! The parser: hand-written recursive descent over the token stream,
//! producing the `middle::lower`-facing `ast::Node` tree directly (no
//! separate concrete syntax tree).

use std::fmt::Debug;

use derive_more::derive::Display;

use crate::common::{intern, Line};

use super::ast::{Node, NodeKind, PrimType};
use super::lex::{LexError, Lexer, Token, TokenKind};

#[derive(Display)]
#[display("Parse error: {}", self.0)]
pub struct ParseError(String);

impl Debug for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError(e.to_string())
    }
}

pub fn parse(input: &str) -> Result<Node, ParseError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    while let Some(tok) = lexer.next()? {
        tokens.push(tok);
    }
    let mut p = Parser { tokens, pos: 0 };
    let unit = p.parse_compile_unit()?;
    if !p.at_end() {
        return Err(p.error_here("expected end of input"));
    }
    Ok(unit)
}

struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token<'src>> {
        self.tokens.get(self.pos + offset)
    }

    fn current_line(&self) -> Line {
        self.peek().or_else(|| self.tokens.last()).map(|t| t.line).unwrap_or(1)
    }

    fn advance(&mut self) -> Token<'src> {
        let t = self.tokens[self.pos];
        self.pos += 1;
        t
    }

    fn error_here(&self, what: &str) -> ParseError {
        match self.peek() {
            Some(t) => ParseError(format!("line {}: {what}, found {t}", t.line)),
            None => ParseError(format!("{what}, found end of input")),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'src>, ParseError> {
        match self.peek_kind() {
            Some(k) if k == kind => Ok(self.advance()),
            _ => Err(self.error_here(&format!("expected {kind}"))),
        }
    }

    fn expect_ident(&mut self) -> Result<Token<'src>, ParseError> {
        self.expect(TokenKind::Ident)
    }

    // -- top level --------------------------------------------------------

    fn parse_compile_unit(&mut self) -> Result<Node, ParseError> {
        let line = self.current_line();
        let mut items = Vec::new();
        while !self.at_end() {
            items.push(self.parse_top_level_item()?);
        }
        Ok(Node::new(NodeKind::CompileUnit, line, items))
    }

    fn parse_top_level_item(&mut self) -> Result<Node, ParseError> {
        let line = self.current_line();
        let ty = self.parse_type()?;
        let name_tok = self.expect_ident()?;
        let name = intern(name_tok.text);

        if self.peek_kind() == Some(TokenKind::LParen) {
            self.parse_func_def_rest(line, ty, name)
        } else {
            let decls = self.parse_declarator_list_rest(ty, name, name_tok.line)?;
            self.expect(TokenKind::Semi)?;
            Ok(Node::new(NodeKind::DeclStmt, line, decls))
        }
    }

    fn parse_type(&mut self) -> Result<Node, ParseError> {
        let line = self.current_line();
        match self.peek_kind() {
            Some(TokenKind::KwInt) => {
                self.advance();
                Ok(Node::leaf_type(PrimType::Int, line))
            }
            Some(TokenKind::KwVoid) => {
                self.advance();
                Ok(Node::leaf_type(PrimType::Void, line))
            }
            _ => Err(self.error_here("expected a type")),
        }
    }

    fn parse_func_def_rest(&mut self, line: Line, ret_ty: Node, name: crate::common::Id) -> Result<Node, ParseError> {
        self.expect(TokenKind::LParen)?;
        let params = self.parse_formal_params()?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(Node::new(
            NodeKind::FuncDef,
            line,
            vec![ret_ty, Node::leaf_var(name, line), params, body],
        ))
    }

    fn parse_formal_params(&mut self) -> Result<Node, ParseError> {
        let line = self.current_line();
        let mut params = Vec::new();
        if self.peek_kind() != Some(TokenKind::RParen) {
            params.push(self.parse_formal_param()?);
            while self.peek_kind() == Some(TokenKind::Comma) {
                self.advance();
                params.push(self.parse_formal_param()?);
            }
        }
        Ok(Node::new(NodeKind::FuncFormalParams, line, params))
    }

    fn parse_formal_param(&mut self) -> Result<Node, ParseError> {
        let line = self.current_line();
        let ty = self.parse_type()?;
        let name_tok = self.expect_ident()?;
        let name = intern(name_tok.text);
        let mut children = vec![ty, Node::leaf_var(name, line)];
        let mut first_bracket = true;
        while self.peek_kind() == Some(TokenKind::LBracket) {
            let dim_line = self.current_line();
            self.advance();
            if first_bracket && self.peek_kind() == Some(TokenKind::RBracket) {
                // Elided leading dimension: `int a[]`. A real dimension is
                // never 0 (see `array_global_type`), so 0 doubles as the
                // marker that this bracket was present but unsized, keeping
                // `int a[]` distinguishable downstream from a bare scalar.
                self.advance();
                children.push(Node::leaf_uint(0, 10, dim_line));
            } else {
                let num = self.expect(TokenKind::Num)?;
                self.expect(TokenKind::RBracket)?;
                children.push(Node::leaf_uint(parse_uint(&num)?, 10, dim_line));
            }
            first_bracket = false;
        }
        Ok(Node::new(NodeKind::FuncFormalParam, line, children))
    }

    /// Parses the remainder of a declarator list whose type and first name
    /// have already been consumed by the caller (used both for globals and
    /// for `type name ...;` local declarations).
    fn parse_declarator_list_rest(
        &mut self,
        ty: Node,
        first_name: crate::common::Id,
        first_line: Line,
    ) -> Result<Vec<Node>, ParseError> {
        let mut decls = vec![self.parse_one_declarator(ty.clone(), first_name, first_line)?];
        while self.peek_kind() == Some(TokenKind::Comma) {
            self.advance();
            let line = self.current_line();
            let name_tok = self.expect_ident()?;
            decls.push(self.parse_one_declarator(ty.clone(), intern(name_tok.text), line)?);
        }
        Ok(decls)
    }

    fn parse_one_declarator(&mut self, ty: Node, name: crate::common::Id, line: Line) -> Result<Node, ParseError> {
        if self.peek_kind() == Some(TokenKind::LBracket) {
            let mut dims = Vec::new();
            while self.peek_kind() == Some(TokenKind::LBracket) {
                self.advance();
                let dim_line = self.current_line();
                let num = self.expect(TokenKind::Num)?;
                self.expect(TokenKind::RBracket)?;
                dims.push(Node::leaf_uint(parse_uint(&num)?, 10, dim_line));
            }
            let mut children = vec![ty, Node::leaf_var(name, line)];
            children.extend(dims);
            Ok(Node::new(NodeKind::ArrayDef, line, children))
        } else if self.peek_kind() == Some(TokenKind::Assign) {
            self.advance();
            let init = self.parse_expr()?;
            Ok(Node::new(NodeKind::VarDecl, line, vec![ty, Node::leaf_var(name, line), init]))
        } else {
            Ok(Node::new(NodeKind::VarDecl, line, vec![ty, Node::leaf_var(name, line)]))
        }
    }

    // -- statements ---------------------------------------------------------

    fn parse_block(&mut self) -> Result<Node, ParseError> {
        let line = self.current_line();
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while self.peek_kind() != Some(TokenKind::RBrace) {
            if self.at_end() {
                return Err(self.error_here("expected '}'"));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Node::new(NodeKind::Block, line, stmts))
    }

    fn parse_stmt(&mut self) -> Result<Node, ParseError> {
        let line = self.current_line();
        match self.peek_kind() {
            Some(TokenKind::KwInt) | Some(TokenKind::KwVoid) => {
                let ty = self.parse_type()?;
                let name_tok = self.expect_ident()?;
                let decls = self.parse_declarator_list_rest(ty, intern(name_tok.text), name_tok.line)?;
                self.expect(TokenKind::Semi)?;
                Ok(Node::new(NodeKind::DeclStmt, line, decls))
            }
            Some(TokenKind::KwReturn) => {
                self.advance();
                if self.peek_kind() == Some(TokenKind::Semi) {
                    self.advance();
                    Ok(Node::new(NodeKind::Return, line, vec![]))
                } else {
                    let e = self.parse_expr()?;
                    self.expect(TokenKind::Semi)?;
                    Ok(Node::new(NodeKind::Return, line, vec![e]))
                }
            }
            Some(TokenKind::KwIf) => self.parse_if(),
            Some(TokenKind::KwWhile) => self.parse_while(),
            Some(TokenKind::KwBreak) => {
                self.advance();
                self.expect(TokenKind::Semi)?;
                Ok(Node::new(NodeKind::Break, line, vec![]))
            }
            Some(TokenKind::KwContinue) => {
                self.advance();
                self.expect(TokenKind::Semi)?;
                Ok(Node::new(NodeKind::Continue, line, vec![]))
            }
            Some(TokenKind::LBrace) => self.parse_block(),
            Some(TokenKind::Ident) => self.parse_ident_stmt(),
            _ => Err(self.error_here("expected a statement")),
        }
    }

    fn parse_ident_stmt(&mut self) -> Result<Node, ParseError> {
        let line = self.current_line();
        let name_tok = self.advance();
        let name = intern(name_tok.text);

        if self.peek_kind() == Some(TokenKind::LParen) {
            self.advance();
            let args = self.parse_arg_list()?;
            self.expect(TokenKind::RParen)?;
            self.expect(TokenKind::Semi)?;
            let mut children = vec![Node::leaf_var(name, line)];
            children.push(Node::new(NodeKind::FuncRealParams, line, args));
            return Ok(Node::new(NodeKind::FuncCall, line, children));
        }

        let lvalue = self.parse_lvalue_tail(name, line)?;
        self.expect(TokenKind::Assign)?;
        let rhs = self.parse_expr()?;
        self.expect(TokenKind::Semi)?;
        Ok(Node::new(NodeKind::Assign, line, vec![lvalue, rhs]))
    }

    fn parse_lvalue_tail(&mut self, name: crate::common::Id, line: Line) -> Result<Node, ParseError> {
        if self.peek_kind() != Some(TokenKind::LBracket) {
            return Ok(Node::leaf_var(name, line));
        }
        let mut children = vec![Node::leaf_var(name, line)];
        while self.peek_kind() == Some(TokenKind::LBracket) {
            self.advance();
            children.push(self.parse_expr()?);
            self.expect(TokenKind::RBracket)?;
        }
        Ok(Node::new(NodeKind::ArrayAccess, line, children))
    }

    fn parse_if(&mut self) -> Result<Node, ParseError> {
        let line = self.current_line();
        self.advance();
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_block = self.parse_block()?;
        if self.peek_kind() == Some(TokenKind::KwElse) {
            self.advance();
            let else_block = if self.peek_kind() == Some(TokenKind::KwIf) {
                let nested_line = self.current_line();
                let nested = self.parse_if()?;
                Node::new(NodeKind::Block, nested_line, vec![nested])
            } else {
                self.parse_block()?
            };
            Ok(Node::new(NodeKind::IfElse, line, vec![cond, then_block, else_block]))
        } else {
            Ok(Node::new(NodeKind::If, line, vec![cond, then_block]))
        }
    }

    fn parse_while(&mut self) -> Result<Node, ParseError> {
        let line = self.current_line();
        self.advance();
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(Node::new(NodeKind::While, line, vec![cond, body]))
    }

    fn parse_arg_list(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut args = Vec::new();
        if self.peek_kind() != Some(TokenKind::RParen) {
            args.push(self.parse_expr()?);
            while self.peek_kind() == Some(TokenKind::Comma) {
                self.advance();
                args.push(self.parse_expr()?);
            }
        }
        Ok(args)
    }

    // -- expressions, precedence climbing from lowest to highest ------------

    fn parse_expr(&mut self) -> Result<Node, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_and()?;
        while self.peek_kind() == Some(TokenKind::OrOr) {
            let line = self.advance().line;
            let right = self.parse_and()?;
            left = Node::new(NodeKind::LogicalOr, line, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_equality()?;
        while self.peek_kind() == Some(TokenKind::AndAnd) {
            let line = self.advance().line;
            let right = self.parse_equality()?;
            left = Node::new(NodeKind::LogicalAnd, line, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_relational()?;
        loop {
            let kind = match self.peek_kind() {
                Some(TokenKind::EqEq) => NodeKind::Eq,
                Some(TokenKind::Ne) => NodeKind::Ne,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.parse_relational()?;
            left = Node::new(kind, line, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let kind = match self.peek_kind() {
                Some(TokenKind::Lt) => NodeKind::Lt,
                Some(TokenKind::Le) => NodeKind::Le,
                Some(TokenKind::Gt) => NodeKind::Gt,
                Some(TokenKind::Ge) => NodeKind::Ge,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.parse_additive()?;
            left = Node::new(kind, line, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            let kind = match self.peek_kind() {
                Some(TokenKind::Plus) => NodeKind::Add,
                Some(TokenKind::Minus) => NodeKind::Sub,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.parse_term()?;
            left = Node::new(kind, line, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let kind = match self.peek_kind() {
                Some(TokenKind::Star) => NodeKind::Mul,
                Some(TokenKind::Slash) => NodeKind::Div,
                Some(TokenKind::Percent) => NodeKind::Mod,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.parse_unary()?;
            left = Node::new(kind, line, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Minus) => {
                let line = self.advance().line;
                let operand = self.parse_unary()?;
                Ok(Node::new(NodeKind::Neg, line, vec![operand]))
            }
            Some(TokenKind::Bang) => {
                let line = self.advance().line;
                let operand = self.parse_unary()?;
                Ok(Node::new(NodeKind::LogicalNot, line, vec![operand]))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        let line = self.current_line();
        match self.peek_kind() {
            Some(TokenKind::Num) => {
                let tok = self.advance();
                Ok(Node::leaf_uint(parse_uint(&tok)?, 10, line))
            }
            Some(TokenKind::LParen) => {
                self.advance();
                let e = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(e)
            }
            Some(TokenKind::Ident) => {
                let tok = self.advance();
                let name = intern(tok.text);
                match self.peek_kind() {
                    Some(TokenKind::LParen) => {
                        self.advance();
                        let args = self.parse_arg_list()?;
                        self.expect(TokenKind::RParen)?;
                        Ok(Node::new(
                            NodeKind::FuncCall,
                            line,
                            vec![Node::leaf_var(name, line), Node::new(NodeKind::FuncRealParams, line, args)],
                        ))
                    }
                    Some(TokenKind::LBracket) => self.parse_lvalue_tail(name, line),
                    _ => Ok(Node::leaf_var(name, line)),
                }
            }
            _ => Err(self.error_here("expected an expression")),
        }
    }
}

fn parse_uint(tok: &Token) -> Result<u64, ParseError> {
    tok.text
        .parse::<u64>()
        .map_err(|_| ParseError(format!("line {}: integer literal '{}' out of range", tok.line, tok.text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must_parse(src: &str) -> Node {
        parse(src).unwrap_or_else(|e| panic!("expected {src:?} to parse, got {e}"))
    }

    #[test]
    fn parses_a_minimal_function() {
        let unit = must_parse("int main() { return 0; }");
        assert_eq!(unit.kind, NodeKind::CompileUnit);
        assert_eq!(unit.children.len(), 1);
        assert_eq!(unit.children[0].kind, NodeKind::FuncDef);
    }

    #[test]
    fn parses_global_and_array_declarations() {
        let unit = must_parse("int counter; int board[8][8]; int main() { return 0; }");
        assert_eq!(unit.children[0].kind, NodeKind::DeclStmt);
        assert_eq!(unit.children[0].children[0].kind, NodeKind::VarDecl);
        assert_eq!(unit.children[1].children[0].kind, NodeKind::ArrayDef);
    }

    #[test]
    fn respects_operator_precedence() {
        let unit = must_parse("int main() { return 1 + 2 * 3; }");
        let ret = &unit.children[0].children[3].children[0];
        assert_eq!(ret.kind, NodeKind::Return);
        assert_eq!(ret.children[0].kind, NodeKind::Add);
        assert_eq!(ret.children[0].children[1].kind, NodeKind::Mul);
    }

    #[test]
    fn parses_array_parameter_with_elided_leading_dimension() {
        let unit = must_parse("int sum(int a[], int n) { return 0; }");
        let params = &unit.children[0].children[2];
        // type, name, and a single 0-sentinel standing in for the elided
        // leading dimension.
        assert_eq!(params.children[0].children.len(), 3);
        assert_eq!(params.children[0].children[2].int_literal(), 0);
    }

    #[test]
    fn parses_array_parameter_with_elided_leading_and_fixed_trailing_dimension() {
        let unit = must_parse("int sum(int a[][4], int n) { return 0; }");
        let params = &unit.children[0].children[2];
        assert_eq!(params.children[0].children.len(), 4);
        assert_eq!(params.children[0].children[2].int_literal(), 0);
        assert_eq!(params.children[0].children[3].int_literal(), 4);
    }

    #[test]
    fn parses_else_if_chains() {
        let unit = must_parse(
            "int f(int x) { if (x < 0) { return 0; } else if (x == 0) { return 1; } else { return 2; } }",
        );
        let body = &unit.children[0].children[3];
        assert_eq!(body.children[0].kind, NodeKind::IfElse);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse("int main( { return 0; }").is_err());
    }
}
