use std::fmt::{self, Display};

use crate::error::TokenizerError;

const TOKEN_ENDERS: &str = ",;}) +-*/^&=><%";

const fn build_token_enders() -> [bool; 256] {
    let mut tbl = [false; 256];
    let bytes = TOKEN_ENDERS.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        tbl[bytes[i] as usize] = true;
        i += 1;
    }
    tbl
}
static TOKEN_ENDERS_TABLE: [bool; 256] = build_token_enders();

#[inline(always)]
fn is_token_ender(c: u8) -> bool {
    TOKEN_ENDERS_TABLE[c as usize]
}

static ERROR_CODES: &[&str] = &[
    "#NULL!", "#DIV/0!", "#VALUE!", "#REF!", "#NAME?", "#NUM!", "#N/A", "#ERROR!", "#N/IMPL!",
    "#CALC!", "#CIRC!",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Operand,
    Func,
    Array,
    Paren,
    Sep,
    OpPrefix,
    OpInfix,
    OpPostfix,
}

impl Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenSubType {
    None,
    Text,
    Number,
    Logical,
    Error,
    Range,
    Open,
    Close,
    Arg,
    Row,
}

/// A token in an Excel formula, with its byte span in the source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub value: String,
    pub token_type: TokenType,
    pub subtype: TokenSubType,
    pub start: usize,
    pub end: usize,
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} subtype: {:?} value: {}>",
            self.token_type, self.subtype, self.value
        )
    }
}

impl Token {
    fn from_slice(
        source: &str,
        token_type: TokenType,
        subtype: TokenSubType,
        start: usize,
        end: usize,
    ) -> Self {
        Token {
            value: source[start..end].to_string(),
            token_type,
            subtype,
            start,
            end,
        }
    }

    fn operand_from_slice(source: &str, start: usize, end: usize) -> Self {
        let value = &source[start..end];
        let subtype = if value.starts_with('"') {
            TokenSubType::Text
        } else if value.starts_with('#') {
            TokenSubType::Error
        } else if value.eq_ignore_ascii_case("TRUE") || value.eq_ignore_ascii_case("FALSE") {
            TokenSubType::Logical
        } else if value.parse::<f64>().is_ok() {
            TokenSubType::Number
        } else {
            TokenSubType::Range
        };
        Token::from_slice(source, TokenType::Operand, subtype, start, end)
    }

    pub fn is_operator(&self) -> bool {
        matches!(
            self.token_type,
            TokenType::OpPrefix | TokenType::OpInfix | TokenType::OpPostfix
        )
    }

    fn closes_operand(&self) -> bool {
        self.subtype == TokenSubType::Close
            || self.token_type == TokenType::OpPostfix
            || self.token_type == TokenType::Operand
    }
}

/// Splits a formula (text starting with `=`) into tokens. Whitespace between
/// tokens is dropped.
pub struct Tokenizer {
    formula: String,
    pub items: Vec<Token>,
    token_stack: Vec<Token>,
    offset: usize,
    token_start: usize,
    token_end: usize,
}

impl Tokenizer {
    pub fn new(formula: &str) -> Result<Self, TokenizerError> {
        let mut tokenizer = Tokenizer {
            formula: formula.to_string(),
            items: Vec::with_capacity(formula.len() / 2),
            token_stack: Vec::with_capacity(8),
            offset: 0,
            token_start: 0,
            token_end: 0,
        };
        tokenizer.parse()?;
        Ok(tokenizer)
    }

    fn err(&self, message: impl Into<String>) -> TokenizerError {
        TokenizerError {
            message: message.into(),
            pos: self.offset,
        }
    }

    #[inline]
    fn byte_at(&self, pos: usize) -> Option<u8> {
        self.formula.as_bytes().get(pos).copied()
    }

    #[inline]
    fn has_token(&self) -> bool {
        self.token_end > self.token_start
    }

    #[inline]
    fn start_token(&mut self) {
        self.token_start = self.offset;
        self.token_end = self.offset;
    }

    fn parse(&mut self) -> Result<(), TokenizerError> {
        if self.byte_at(0) != Some(b'=') {
            return Err(self.err("formula must start with '='"));
        }
        self.offset = 1;
        self.start_token();

        while self.offset < self.formula.len() {
            if self.check_scientific_notation() {
                continue;
            }

            let curr_byte = self.formula.as_bytes()[self.offset];
            if is_token_ender(curr_byte) && self.has_token() {
                self.save_token();
                self.start_token();
            }

            match curr_byte {
                b'"' | b'\'' => self.parse_string()?,
                b'#' => self.parse_error()?,
                b' ' | b'\n' | b'\t' | b'\r' => {
                    self.save_token();
                    self.offset += 1;
                    self.start_token();
                }
                b'+' | b'-' | b'*' | b'/' | b'^' | b'&' | b'=' | b'>' | b'<' | b'%' => {
                    self.parse_operator()
                }
                b'{' | b'(' => self.parse_opener(),
                b')' | b'}' => self.parse_closer()?,
                b';' | b',' => self.parse_separator(),
                _ => {
                    if !self.has_token() {
                        self.start_token();
                    }
                    self.offset += 1;
                    self.token_end = self.offset;
                }
            }
        }

        self.save_token();
        if !self.token_stack.is_empty() {
            return Err(self.err("unmatched opening parenthesis or brace"));
        }
        if self.items.is_empty() {
            return Err(self.err("empty formula"));
        }
        Ok(())
    }

    /// A `+`/`-` right after `1.5E` belongs to the number.
    fn check_scientific_notation(&mut self) -> bool {
        let Some(curr_byte) = self.byte_at(self.offset) else {
            return false;
        };
        if (curr_byte == b'+' || curr_byte == b'-') && self.is_scientific_notation_base() {
            self.offset += 1;
            self.token_end = self.offset;
            return true;
        }
        false
    }

    fn is_scientific_notation_base(&self) -> bool {
        if !self.has_token() {
            return false;
        }
        let slice = &self.formula.as_bytes()[self.token_start..self.token_end];
        if slice.len() < 2 || !slice[0].is_ascii_digit() {
            return false;
        }
        if !matches!(slice[slice.len() - 1], b'E' | b'e') {
            return false;
        }
        let mut dot_seen = false;
        for &ch in &slice[1..slice.len() - 1] {
            match ch {
                b'0'..=b'9' => {}
                b'.' if !dot_seen => dot_seen = true,
                _ => return false,
            }
        }
        true
    }

    fn save_token(&mut self) {
        if self.has_token() {
            let token = Token::operand_from_slice(&self.formula, self.token_start, self.token_end);
            self.items.push(token);
        }
    }

    /// Double-quoted strings become Text operands. Single quotes delimit a sheet
    /// name and stay part of the surrounding reference token.
    fn parse_string(&mut self) -> Result<(), TokenizerError> {
        let delim = self.formula.as_bytes()[self.offset];

        if delim == b'"' && self.has_token() {
            self.save_token();
            self.start_token();
        }
        if delim == b'\'' && !self.has_token() {
            self.start_token();
        }

        let string_start = self.offset;
        self.offset += 1;
        while self.offset < self.formula.len() {
            if self.formula.as_bytes()[self.offset] == delim {
                self.offset += 1;
                if self.byte_at(self.offset) == Some(delim) {
                    self.offset += 1;
                    continue;
                }
                if delim == b'"' {
                    let token = Token::operand_from_slice(&self.formula, string_start, self.offset);
                    self.items.push(token);
                    self.start_token();
                } else {
                    self.token_end = self.offset;
                }
                return Ok(());
            }
            self.offset += 1;
        }
        Err(self.err("reached end of formula while parsing string"))
    }

    fn parse_error(&mut self) -> Result<(), TokenizerError> {
        // `Sheet1!#REF!` keeps the sheet prefix.
        if self.has_token() && self.formula.as_bytes()[self.token_end - 1] != b'!' {
            self.save_token();
            self.start_token();
        }
        let error_start = if self.has_token() {
            self.token_start
        } else {
            self.offset
        };

        let rest = &self.formula.as_bytes()[self.offset..];
        for &code in ERROR_CODES {
            if rest.len() >= code.len() && rest[..code.len()].eq_ignore_ascii_case(code.as_bytes())
            {
                self.offset += code.len();
                let token = Token::operand_from_slice(&self.formula, error_start, self.offset);
                self.items.push(token);
                self.start_token();
                return Ok(());
            }
        }
        Err(self.err(format!("invalid error code at position {}", self.offset)))
    }

    fn parse_operator(&mut self) {
        self.save_token();

        if let Some(next) = self.byte_at(self.offset + 1) {
            let pair = [self.formula.as_bytes()[self.offset], next];
            if &pair == b">=" || &pair == b"<=" || &pair == b"<>" {
                self.items.push(Token::from_slice(
                    &self.formula,
                    TokenType::OpInfix,
                    TokenSubType::None,
                    self.offset,
                    self.offset + 2,
                ));
                self.offset += 2;
                self.start_token();
                return;
            }
        }

        let token_type = match self.formula.as_bytes()[self.offset] {
            b'%' => TokenType::OpPostfix,
            b'+' | b'-' => match self.items.last() {
                Some(prev) if prev.closes_operand() => TokenType::OpInfix,
                _ => TokenType::OpPrefix,
            },
            _ => TokenType::OpInfix,
        };
        self.items.push(Token::from_slice(
            &self.formula,
            token_type,
            TokenSubType::None,
            self.offset,
            self.offset + 1,
        ));
        self.offset += 1;
        self.start_token();
    }

    /// `(` right after an accumulated name opens a function call; the token
    /// value is the upper-cased name.
    fn parse_opener(&mut self) {
        let curr_byte = self.formula.as_bytes()[self.offset];
        let token = if curr_byte == b'{' {
            self.save_token();
            Token::from_slice(
                &self.formula,
                TokenType::Array,
                TokenSubType::Open,
                self.offset,
                self.offset + 1,
            )
        } else if self.has_token() {
            Token {
                value: self.formula[self.token_start..self.token_end].to_ascii_uppercase(),
                token_type: TokenType::Func,
                subtype: TokenSubType::Open,
                start: self.token_start,
                end: self.offset + 1,
            }
        } else {
            Token::from_slice(
                &self.formula,
                TokenType::Paren,
                TokenSubType::Open,
                self.offset,
                self.offset + 1,
            )
        };

        self.items.push(token.clone());
        self.token_stack.push(token);
        self.offset += 1;
        self.start_token();
    }

    fn parse_closer(&mut self) -> Result<(), TokenizerError> {
        self.save_token();
        let curr_byte = self.formula.as_bytes()[self.offset];
        let Some(open_token) = self.token_stack.pop() else {
            return Err(self.err(format!(
                "no matching opener for closer at position {}",
                self.offset
            )));
        };
        let expected = if open_token.token_type == TokenType::Array {
            b'}'
        } else {
            b')'
        };
        if curr_byte != expected {
            return Err(self.err("mismatched ( and { pair"));
        }
        self.items.push(Token::from_slice(
            &self.formula,
            open_token.token_type,
            TokenSubType::Close,
            self.offset,
            self.offset + 1,
        ));
        self.offset += 1;
        self.start_token();
        Ok(())
    }

    fn parse_separator(&mut self) {
        self.save_token();
        let subtype = if self.formula.as_bytes()[self.offset] == b';' {
            TokenSubType::Row
        } else {
            TokenSubType::Arg
        };
        self.items.push(Token::from_slice(
            &self.formula,
            TokenType::Sep,
            subtype,
            self.offset,
            self.offset + 1,
        ));
        self.offset += 1;
        self.start_token();
    }
}

impl TryFrom<&str> for Tokenizer {
    type Error = TokenizerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Tokenizer::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(formula: &str) -> Vec<(TokenType, TokenSubType, String)> {
        Tokenizer::new(formula)
            .unwrap()
            .items
            .into_iter()
            .map(|t| (t.token_type, t.subtype, t.value))
            .collect()
    }

    #[test]
    fn splits_operands_and_operators() {
        let toks = kinds("=A1*3 + -B2");
        let values: Vec<&str> = toks.iter().map(|t| t.2.as_str()).collect();
        assert_eq!(values, vec!["A1", "*", "3", "+", "-", "B2"]);
        assert_eq!(toks[3].0, TokenType::OpInfix);
        assert_eq!(toks[4].0, TokenType::OpPrefix);
    }

    #[test]
    fn quoted_sheet_stays_in_reference() {
        let toks = kinds("='My Sheet'!A1:B2+1");
        assert_eq!(toks[0].2, "'My Sheet'!A1:B2");
        assert_eq!(toks[0].1, TokenSubType::Range);
    }

    #[test]
    fn functions_strings_and_errors() {
        let toks = kinds("=sum(\"a\"\"b\", #DIV/0!, 1.5E+3)");
        assert_eq!(toks[0].0, TokenType::Func);
        assert_eq!(toks[0].2, "SUM");
        assert_eq!(toks[1].1, TokenSubType::Text);
        assert_eq!(toks[1].2, "\"a\"\"b\"");
        assert_eq!(toks[3].1, TokenSubType::Error);
        assert_eq!(toks[5].2, "1.5E+3");
        assert_eq!(toks[5].1, TokenSubType::Number);
        assert_eq!(toks.last().unwrap().1, TokenSubType::Close);
    }

    #[test]
    fn two_char_comparisons() {
        let toks = kinds("=A1<>B1");
        assert_eq!(toks[1].2, "<>");
    }

    #[test]
    fn rejects_unbalanced() {
        assert!(Tokenizer::new("=SUM(A1").is_err());
        assert!(Tokenizer::new("=A1)").is_err());
        assert!(Tokenizer::new("={1,2)").is_err());
        assert!(Tokenizer::new("A1+1").is_err());
        assert!(Tokenizer::new("=\"open").is_err());
    }
}
