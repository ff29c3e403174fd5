//! Constant-expression evaluation for `#if`/`#elif`.
//!
//! Operates on the directive's expression after macro expansion and
//! `defined(...)` substitution; any identifier still present evaluates to 0,
//! matching the standard's rules for conditional inclusion.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Int(i64),
    Ident,
    LParen,
    RParen,
    Not,
    BitNot,
    Minus,
    Plus,
    Star,
    Slash,
    Percent,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    BitAnd,
    BitXor,
    BitOr,
    AndAnd,
    OrOr,
    Question,
    Colon,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// Evaluates a conditional-inclusion expression; `true` means the branch is taken.
///
/// Malformed expressions evaluate to `false` rather than erroring: a broken
/// `#if` should skip its branch, not abort indexing.
pub(crate) fn evaluate(expr: &str) -> bool {
    let Some(tokens) = tokenize(expr) else {
        return false;
    };
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.ternary();
    // Trailing garbage means we mis-parsed; treat as false.
    if parser.pos != parser.tokens.len() {
        return false;
    }
    value.map(|v| v != 0).unwrap_or(false)
}

fn tokenize(expr: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let bytes = expr.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '~' => {
                tokens.push(Token::BitNot);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '<' => match bytes.get(i + 1) {
                Some(&b'<') => {
                    tokens.push(Token::Shl);
                    i += 2;
                }
                Some(&b'=') => {
                    tokens.push(Token::Le);
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            },
            '>' => match bytes.get(i + 1) {
                Some(&b'>') => {
                    tokens.push(Token::Shr);
                    i += 2;
                }
                Some(&b'=') => {
                    tokens.push(Token::Ge);
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            },
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return None;
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    tokens.push(Token::BitAnd);
                    i += 1;
                }
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    tokens.push(Token::BitOr);
                    i += 1;
                }
            }
            '^' => {
                tokens.push(Token::BitXor);
                i += 1;
            }
            '?' => {
                tokens.push(Token::Question);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '0'..='9' => {
                let start = i;
                let (value, next) = if c == '0' && matches!(bytes.get(i + 1), Some(b'x') | Some(b'X')) {
                    let mut j = i + 2;
                    while j < bytes.len() && (bytes[j] as char).is_ascii_hexdigit() {
                        j += 1;
                    }
                    (i64::from_str_radix(&expr[start + 2..j], 16).ok()?, j)
                } else {
                    let mut j = i;
                    while j < bytes.len() && bytes[j].is_ascii_digit() {
                        j += 1;
                    }
                    (expr[start..j].parse::<i64>().ok()?, j)
                };
                // Skip integer suffixes (1u, 0x10UL, ...).
                let mut j = next;
                while j < bytes.len() && matches!(bytes[j], b'u' | b'U' | b'l' | b'L') {
                    j += 1;
                }
                tokens.push(Token::Int(value));
                i = j;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut j = i + 1;
                while j < bytes.len()
                    && ((bytes[j] as char).is_ascii_alphanumeric() || bytes[j] == b'_')
                {
                    j += 1;
                }
                tokens.push(Token::Ident);
                i = j;
            }
            _ => return None,
        }
    }
    Some(tokens)
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn eat(&mut self, token: Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ternary(&mut self) -> Option<i64> {
        let cond = self.binary(0)?;
        if !self.eat(Token::Question) {
            return Some(cond);
        }
        let then = self.ternary()?;
        if !self.eat(Token::Colon) {
            return None;
        }
        let otherwise = self.ternary()?;
        Some(if cond != 0 { then } else { otherwise })
    }

    fn binary(&mut self, min_prec: u8) -> Option<i64> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek() {
            let Some(prec) = precedence(op) else { break };
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let rhs = self.binary(prec + 1)?;
            lhs = apply(op, lhs, rhs);
        }
        Some(lhs)
    }

    fn unary(&mut self) -> Option<i64> {
        match self.bump()? {
            Token::Int(value) => Some(value),
            // Identifiers that survive macro expansion are not defined.
            Token::Ident => Some(0),
            Token::Not => Some((self.unary()? == 0) as i64),
            Token::BitNot => Some(!self.unary()?),
            Token::Minus => Some(self.unary()?.wrapping_neg()),
            Token::Plus => self.unary(),
            Token::LParen => {
                let value = self.ternary()?;
                if self.eat(Token::RParen) {
                    Some(value)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

fn precedence(op: Token) -> Option<u8> {
    Some(match op {
        Token::OrOr => 1,
        Token::AndAnd => 2,
        Token::BitOr => 3,
        Token::BitXor => 4,
        Token::BitAnd => 5,
        Token::EqEq | Token::NotEq => 6,
        Token::Lt | Token::Gt | Token::Le | Token::Ge => 7,
        Token::Shl | Token::Shr => 8,
        Token::Plus | Token::Minus => 9,
        Token::Star | Token::Slash | Token::Percent => 10,
        _ => return None,
    })
}

fn apply(op: Token, lhs: i64, rhs: i64) -> i64 {
    match op {
        Token::OrOr => (lhs != 0 || rhs != 0) as i64,
        Token::AndAnd => (lhs != 0 && rhs != 0) as i64,
        Token::BitOr => lhs | rhs,
        Token::BitXor => lhs ^ rhs,
        Token::BitAnd => lhs & rhs,
        Token::EqEq => (lhs == rhs) as i64,
        Token::NotEq => (lhs != rhs) as i64,
        Token::Lt => (lhs < rhs) as i64,
        Token::Gt => (lhs > rhs) as i64,
        Token::Le => (lhs <= rhs) as i64,
        Token::Ge => (lhs >= rhs) as i64,
        Token::Shl => lhs.wrapping_shl(rhs as u32 & 63),
        Token::Shr => lhs.wrapping_shr(rhs as u32 & 63),
        Token::Plus => lhs.wrapping_add(rhs),
        Token::Minus => lhs.wrapping_sub(rhs),
        Token::Star => lhs.wrapping_mul(rhs),
        Token::Slash => {
            if rhs == 0 {
                0
            } else {
                lhs.wrapping_div(rhs)
            }
        }
        Token::Percent => {
            if rhs == 0 {
                0
            } else {
                lhs.wrapping_rem(rhs)
            }
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_and_precedence() {
        assert!(evaluate("1 + 2 * 3 == 7"));
        assert!(evaluate("(1 + 2) * 3 == 9"));
        assert!(!evaluate("0"));
        assert!(evaluate("10 / 3 == 3"));
    }

    #[test]
    fn logic_and_comparison() {
        assert!(evaluate("1 && !0"));
        assert!(!evaluate("1 && 0"));
        assert!(evaluate("0 || 2 > 1"));
        assert!(evaluate("1 << 4 == 0x10"));
    }

    #[test]
    fn unknown_identifiers_are_zero() {
        assert!(!evaluate("SOME_UNDEFINED_THING"));
        assert!(evaluate("SOME_UNDEFINED_THING == 0"));
    }

    #[test]
    fn integer_suffixes_are_skipped() {
        assert!(evaluate("1u == 1"));
        assert!(evaluate("0x10UL == 16"));
    }

    #[test]
    fn ternary() {
        assert!(evaluate("1 ? 2 : 0"));
        assert!(!evaluate("0 ? 2 : 0"));
    }

    #[test]
    fn malformed_is_false() {
        assert!(!evaluate("1 +"));
        assert!(!evaluate("= ="));
        assert!(!evaluate(""));
    }
}
