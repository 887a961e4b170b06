//! Pratt parser over [`Tokenizer`] output.
//!
//! Binding power, weakest first: comparisons, `&`, `+ -`, `* /`, `^`, postfix
//! `%`, prefix `+ -`. Prefix minus binds tighter than `^`, so `=-2^2` is 4 as in
//! Excel.

use std::fmt;

use sheetgraph_common::{Address, ExcelError, ExcelErrorKind, LiteralValue};

use crate::error::ParserError;
use crate::tokenizer::{Token, TokenSubType, TokenType, Tokenizer};

const PREFIX_BP: u8 = 13;
const POSTFIX_BP: u8 = 11;

#[derive(Debug, Clone, PartialEq)]
pub enum ASTNodeType {
    Literal(LiteralValue),
    Reference {
        /// Reference text as written in the formula.
        original: String,
        address: Address,
    },
    UnaryOp {
        op: String,
        expr: Box<ASTNode>,
    },
    BinaryOp {
        op: String,
        left: Box<ASTNode>,
        right: Box<ASTNode>,
    },
    Function {
        name: String,
        args: Vec<ASTNode>,
    },
    Array(Vec<Vec<ASTNode>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ASTNode {
    pub node_type: ASTNodeType,
}

impl ASTNode {
    pub fn new(node_type: ASTNodeType) -> Self {
        Self { node_type }
    }

    /// References appearing in the tree, left to right.
    pub fn references(&self) -> Vec<&Address> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match &node.node_type {
                ASTNodeType::Literal(_) => {}
                ASTNodeType::Reference { address, .. } => out.push(address),
                ASTNodeType::UnaryOp { expr, .. } => stack.push(expr),
                ASTNodeType::BinaryOp { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
                ASTNodeType::Function { args, .. } => stack.extend(args.iter().rev()),
                ASTNodeType::Array(rows) => {
                    stack.extend(rows.iter().rev().flat_map(|row| row.iter().rev()))
                }
            }
        }
        out
    }
}

impl fmt::Display for ASTNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node_type {
            ASTNodeType::Literal(LiteralValue::Text(s)) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            ASTNodeType::Literal(v) => write!(f, "{v}"),
            ASTNodeType::Reference { original, .. } => f.write_str(original),
            ASTNodeType::UnaryOp { op, expr } if op == "%" => write!(f, "{expr}%"),
            ASTNodeType::UnaryOp { op, expr } => write!(f, "{op}{expr}"),
            ASTNodeType::BinaryOp { op, left, right } => write!(f, "({left}{op}{right})"),
            ASTNodeType::Function { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            ASTNodeType::Array(rows) => {
                f.write_str("{")?;
                for (r, row) in rows.iter().enumerate() {
                    if r > 0 {
                        f.write_str(";")?;
                    }
                    for (c, item) in row.iter().enumerate() {
                        if c > 0 {
                            f.write_str(",")?;
                        }
                        write!(f, "{item}")?;
                    }
                }
                f.write_str("}")
            }
        }
    }
}

fn infix_binding_power(op: &str) -> Option<(u8, u8)> {
    match op {
        "=" | "<" | ">" | "<=" | ">=" | "<>" => Some((1, 2)),
        "&" => Some((3, 4)),
        "+" | "-" => Some((5, 6)),
        "*" | "/" => Some((7, 8)),
        "^" => Some((9, 10)),
        _ => None,
    }
}

/// Parse formula text (with its leading `=`) into an AST.
pub fn parse(formula: &str) -> Result<ASTNode, ParserError> {
    let tokenizer = Tokenizer::new(formula)?;
    let mut parser = Parser::new(tokenizer.items);
    parser.parse()
}

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            position: 0,
        }
    }

    pub fn parse(&mut self) -> Result<ASTNode, ParserError> {
        let ast = self.parse_expression(0)?;
        if let Some(tok) = self.peek() {
            return Err(ParserError::new(
                format!("unexpected token '{}'", tok.value),
                Some(tok.start),
            ));
        }
        Ok(ast)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.position).cloned();
        if tok.is_some() {
            self.position += 1;
        }
        tok
    }

    fn eof_error(&self) -> ParserError {
        let end = self.tokens.last().map(|t| t.end);
        ParserError::new("unexpected end of formula", end)
    }

    fn parse_expression(&mut self, min_bp: u8) -> Result<ASTNode, ParserError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let Some(tok) = self.peek() else { break };
            match tok.token_type {
                TokenType::OpPostfix => {
                    if POSTFIX_BP < min_bp {
                        break;
                    }
                    let op = tok.value.clone();
                    self.position += 1;
                    lhs = ASTNode::new(ASTNodeType::UnaryOp {
                        op,
                        expr: Box::new(lhs),
                    });
                }
                TokenType::OpInfix => {
                    let op = tok.value.clone();
                    let start = tok.start;
                    let (lbp, rbp) = infix_binding_power(&op).ok_or_else(|| {
                        ParserError::new(format!("unsupported operator '{op}'"), Some(start))
                    })?;
                    if lbp < min_bp {
                        break;
                    }
                    self.position += 1;
                    let rhs = self.parse_expression(rbp)?;
                    lhs = ASTNode::new(ASTNodeType::BinaryOp {
                        op,
                        left: Box::new(lhs),
                        right: Box::new(rhs),
                    });
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<ASTNode, ParserError> {
        let tok = self.next().ok_or_else(|| self.eof_error())?;
        match (tok.token_type, tok.subtype) {
            (TokenType::OpPrefix, _) => {
                let expr = self.parse_expression(PREFIX_BP)?;
                Ok(ASTNode::new(ASTNodeType::UnaryOp {
                    op: tok.value,
                    expr: Box::new(expr),
                }))
            }
            (TokenType::Operand, _) => self.parse_operand(tok),
            (TokenType::Paren, TokenSubType::Open) => {
                let inner = self.parse_expression(0)?;
                self.expect_close(TokenType::Paren)?;
                Ok(inner)
            }
            (TokenType::Func, TokenSubType::Open) => self.parse_function(tok),
            (TokenType::Array, TokenSubType::Open) => self.parse_array(),
            _ => Err(ParserError::new(
                format!("unexpected token '{}'", tok.value),
                Some(tok.start),
            )),
        }
    }

    fn parse_operand(&self, tok: Token) -> Result<ASTNode, ParserError> {
        let literal = match tok.subtype {
            TokenSubType::Number => {
                let n = tok.value.parse::<f64>().map_err(|_| {
                    ParserError::new(format!("invalid number '{}'", tok.value), Some(tok.start))
                })?;
                LiteralValue::Number(n)
            }
            TokenSubType::Text => {
                let inner = &tok.value[1..tok.value.len() - 1];
                LiteralValue::Text(inner.replace("\"\"", "\""))
            }
            TokenSubType::Logical => LiteralValue::Boolean(tok.value.eq_ignore_ascii_case("TRUE")),
            TokenSubType::Error => {
                let code = tok.value.rsplit('!').find(|s| !s.is_empty()).unwrap_or("");
                let kind = ExcelErrorKind::parse(&tok.value)
                    .or_else(|| ExcelErrorKind::parse(&format!("{code}!")))
                    .unwrap_or(ExcelErrorKind::Ref);
                LiteralValue::Error(ExcelError::new(kind))
            }
            _ => {
                let address = Address::parse(&tok.value).map_err(|e| {
                    ParserError::new(format!("unsupported reference: {e}"), Some(tok.start))
                })?;
                return Ok(ASTNode::new(ASTNodeType::Reference {
                    original: tok.value,
                    address,
                }));
            }
        };
        Ok(ASTNode::new(ASTNodeType::Literal(literal)))
    }

    fn expect_close(&mut self, kind: TokenType) -> Result<(), ParserError> {
        match self.next() {
            Some(t) if t.token_type == kind && t.subtype == TokenSubType::Close => Ok(()),
            Some(t) => Err(ParserError::new(
                format!("expected closing {kind}, found '{}'", t.value),
                Some(t.start),
            )),
            None => Err(self.eof_error()),
        }
    }

    fn at_argument_end(&self) -> bool {
        matches!(
            self.peek(),
            Some(t) if t.token_type == TokenType::Sep
                || (t.token_type == TokenType::Func && t.subtype == TokenSubType::Close)
        )
    }

    fn parse_function(&mut self, open: Token) -> Result<ASTNode, ParserError> {
        let name = open.value;
        let mut args = Vec::new();

        if let Some(t) = self.peek() {
            if t.token_type == TokenType::Func && t.subtype == TokenSubType::Close {
                self.position += 1;
                return Ok(ASTNode::new(ASTNodeType::Function { name, args }));
            }
        }

        loop {
            if self.at_argument_end() {
                args.push(ASTNode::new(ASTNodeType::Literal(LiteralValue::Empty)));
            } else {
                args.push(self.parse_expression(0)?);
            }
            match self.next() {
                Some(t) if t.token_type == TokenType::Sep && t.subtype == TokenSubType::Arg => {}
                Some(t) if t.token_type == TokenType::Func && t.subtype == TokenSubType::Close => {
                    break;
                }
                Some(t) => {
                    return Err(ParserError::new(
                        format!("unexpected '{}' in arguments of {name}", t.value),
                        Some(t.start),
                    ));
                }
                None => return Err(self.eof_error()),
            }
        }
        Ok(ASTNode::new(ASTNodeType::Function { name, args }))
    }

    fn parse_array(&mut self) -> Result<ASTNode, ParserError> {
        let mut rows = vec![Vec::new()];
        loop {
            let item = self.parse_expression(0)?;
            if let Some(row) = rows.last_mut() {
                row.push(item);
            }
            match self.next() {
                Some(t) if t.token_type == TokenType::Sep && t.subtype == TokenSubType::Arg => {}
                Some(t) if t.token_type == TokenType::Sep && t.subtype == TokenSubType::Row => {
                    rows.push(Vec::new());
                }
                Some(t) if t.token_type == TokenType::Array && t.subtype == TokenSubType::Close => {
                    break;
                }
                Some(t) => {
                    return Err(ParserError::new(
                        format!("unexpected '{}' in array constant", t.value),
                        Some(t.start),
                    ));
                }
                None => return Err(self.eof_error()),
            }
        }
        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(ParserError::new("array constant rows differ in length", None));
        }
        Ok(ASTNode::new(ASTNodeType::Array(rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(formula: &str) -> String {
        parse(formula).unwrap().to_string()
    }

    #[test]
    fn precedence_matches_excel() {
        assert_eq!(render("=1+2*3"), "(1+(2*3))");
        assert_eq!(render("=-2^2"), "(-2^2)");
        assert_eq!(render("=1&2=\"12\""), "((1&2)=\"12\")");
        assert_eq!(render("=2^3^2"), "((2^3)^2)");
        assert_eq!(render("=50%*2"), "(50%*2)");
    }

    #[test]
    fn functions_with_empty_and_nested_args() {
        assert_eq!(render("=IF(A1,,SUM(B1:B3))"), "IF(A1,,SUM(B1:B3))");
        assert_eq!(render("=NOW()"), "NOW()");
    }

    #[test]
    fn references_in_source_order() {
        let ast = parse("=SUM(B1:B2)+A1*Sheet2!C3").unwrap();
        let refs: Vec<String> = ast.references().iter().map(|a| a.to_string()).collect();
        assert_eq!(refs, vec!["B1:B2", "A1", "Sheet2!C3"]);
    }

    #[test]
    fn array_constants() {
        let ast = parse("={1,2;3,4}").unwrap();
        let ASTNodeType::Array(rows) = ast.node_type else {
            panic!("expected array");
        };
        assert_eq!(rows.len(), 2);
        assert!(parse("={1,2;3}").is_err());
    }

    #[test]
    fn reports_bad_input() {
        assert!(parse("=1+").is_err());
        assert!(parse("=(1").is_err());
        assert!(parse("=1 2").is_err());
        assert!(parse("=MyName+1").is_err());
    }
}
