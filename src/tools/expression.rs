//! Arithmetic expression evaluator for the `calculate` tool.
//!
//! Supports `+ - * / // ** ^`, unary signs and parentheses over f64 with
//! Python precedence: `**` is right-associative and binds tighter than a
//! unary minus on its left (`-2**2 == -4`).

use crate::core::error::ToolError;

/// Characters allowed once spaces are removed.
const VALID_CHARS: &str = "0123456789+-*/().,^";

/// Maximum nesting of parentheses and unary signs.
const MAX_DEPTH: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    /// Literal value and whether it was written as an integer.
    Num(f64, bool),
    Plus,
    Minus,
    Star,
    Slash,
    FloorDiv,
    Pow,
    LParen,
    RParen,
    Comma,
}

/// Intermediate value. Integer-ness follows Python: it survives `+ - * //`
/// and non-negative `**` between integers, and is lost on `/`.
#[derive(Debug, Clone, Copy)]
struct Num {
    value: f64,
    int: bool,
}

impl Num {
    fn new(value: f64, int: bool) -> Self {
        Self { value, int }
    }
}

/// Validate and evaluate an expression.
pub fn safe_eval(expression: &str) -> Result<f64, ToolError> {
    let expr: String = expression.chars().filter(|c| *c != ' ').collect();
    if !expr.chars().all(|c| VALID_CHARS.contains(c)) {
        return Err(ToolError::InvalidCharacters(expression.to_string()));
    }

    let tokens = tokenize(&expr).map_err(ToolError::InvalidExpression)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let result = parser.expr().map_err(ToolError::InvalidExpression)?;
    if parser.pos != tokens.len() {
        return Err(ToolError::InvalidExpression(match tokens[parser.pos] {
            Token::Comma => "tuples are not supported".to_string(),
            _ => "invalid syntax".to_string(),
        }));
    }
    if result.value.is_infinite() || result.value.is_nan() {
        return Err(ToolError::InvalidExpression(if result.int {
            "int too large to convert to float".to_string()
        } else {
            "Numerical result out of range".to_string()
        }));
    }
    Ok(result.value)
}

fn tokenize(expr: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let token = match c {
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                if literal == "." || literal.matches('.').count() > 1 {
                    return Err("invalid syntax".to_string());
                }
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| "invalid syntax".to_string())?;
                tokens.push(Token::Num(value, !literal.contains('.')));
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 1;
                Token::Pow
            }
            '*' => Token::Star,
            '/' if chars.get(i + 1) == Some(&'/') => {
                i += 1;
                Token::FloorDiv
            }
            '/' => Token::Slash,
            '^' => Token::Pow,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            other => return Err(format!("unexpected character '{other}'")),
        };
        tokens.push(token);
        i += 1;
    }
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<Num, String> {
        let mut lhs = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            let value = if op == Token::Plus {
                lhs.value + rhs.value
            } else {
                lhs.value - rhs.value
            };
            lhs = Num::new(value, lhs.int && rhs.int);
        }
        Ok(lhs)
    }

    // term := factor (('*' | '/' | '//') factor)*
    fn term(&mut self) -> Result<Num, String> {
        let mut lhs = self.factor()?;
        while let Some(op @ (Token::Star | Token::Slash | Token::FloorDiv)) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            let ints = lhs.int && rhs.int;
            if op != Token::Star && rhs.value == 0.0 {
                return Err(match (op, ints) {
                    (Token::Slash, true) => "division by zero",
                    (Token::Slash, false) => "float division by zero",
                    (_, true) => "integer division or modulo by zero",
                    (_, false) => "float floor division by zero",
                }
                .to_string());
            }
            lhs = match op {
                Token::Star => Num::new(lhs.value * rhs.value, ints),
                Token::Slash => Num::new(lhs.value / rhs.value, false),
                _ => Num::new((lhs.value / rhs.value).floor(), ints),
            };
        }
        Ok(lhs)
    }

    // factor := ('+' | '-') factor | power
    fn factor(&mut self) -> Result<Num, String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err("too many nested parentheses".to_string());
        }
        let result = match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                self.factor()
            }
            Some(Token::Minus) => {
                self.pos += 1;
                self.factor().map(|n| Num::new(-n.value, n.int))
            }
            _ => self.power(),
        };
        self.depth -= 1;
        result
    }

    // power := atom ['**' factor]
    fn power(&mut self) -> Result<Num, String> {
        let base = self.atom()?;
        if self.peek() != Some(Token::Pow) {
            return Ok(base);
        }
        self.pos += 1;
        let exponent = self.factor()?;
        if base.value == 0.0 && exponent.value < 0.0 {
            return Err("0.0 cannot be raised to a negative power".to_string());
        }
        if base.value < 0.0 && exponent.value.fract() != 0.0 {
            return Err("result is a complex number".to_string());
        }
        let int = base.int && exponent.int && exponent.value >= 0.0;
        Ok(Num::new(base.value.powf(exponent.value), int))
    }

    // atom := NUMBER | '(' expr ')'
    fn atom(&mut self) -> Result<Num, String> {
        match self.advance() {
            Some(Token::Num(value, int)) => Ok(Num::new(value, int)),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    Some(Token::Comma) => Err("tuples are not supported".to_string()),
                    _ => Err("'(' was never closed".to_string()),
                }
            }
            _ => Err("invalid syntax".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &str) -> f64 {
        safe_eval(expr).unwrap()
    }

    #[test]
    fn precedence_and_grouping() {
        assert_eq!(eval("2 + 3 * 4"), 14.0);
        assert_eq!(eval("(10 - 5) / 2"), 2.5);
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("7 // 2"), 3.0);
        assert_eq!(eval("-7 // 2"), -4.0);
        assert_eq!(eval(".5 + 1."), 1.5);
    }

    #[test]
    fn power_is_right_associative_and_binds_tighter_than_unary_minus() {
        assert_eq!(eval("2 ** 3 ** 2"), 512.0);
        assert_eq!(eval("-2 ** 2"), -4.0);
        assert_eq!(eval("2 ** -1"), 0.5);
        assert_eq!(eval("2^10"), 1024.0);
        assert_eq!(eval("--3"), 3.0);
    }

    #[test]
    fn rejects_invalid_characters() {
        assert_eq!(
            safe_eval("2 + x"),
            Err(ToolError::InvalidCharacters("2 + x".into()))
        );
        assert!(matches!(safe_eval("sqrt(4)"), Err(ToolError::InvalidCharacters(_))));
    }

    #[test]
    fn reports_evaluation_failures() {
        assert_eq!(
            safe_eval("1/0"),
            Err(ToolError::InvalidExpression("division by zero".into()))
        );
        assert!(matches!(safe_eval("(1+2"), Err(ToolError::InvalidExpression(_))));
        assert!(matches!(safe_eval("1,2"), Err(ToolError::InvalidExpression(_))));
        assert!(matches!(safe_eval("1..2"), Err(ToolError::InvalidExpression(_))));
        assert!(matches!(safe_eval(""), Err(ToolError::InvalidExpression(_))));
        assert!(matches!(safe_eval("2 +"), Err(ToolError::InvalidExpression(_))));
        assert!(matches!(safe_eval("10 ** 400"), Err(ToolError::InvalidExpression(_))));
    }

    #[test]
    fn zero_division_messages_follow_operand_types() {
        let reason = |expr: &str| match safe_eval(expr) {
            Err(ToolError::InvalidExpression(reason)) => reason,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(reason("1.0/0"), "float division by zero");
        assert_eq!(reason("1/(2-2.0)"), "float division by zero");
        assert_eq!(reason("7//0"), "integer division or modulo by zero");
        assert_eq!(reason("7//0."), "float floor division by zero");
        assert_eq!(reason("(4/2)//0"), "float floor division by zero");
        assert_eq!(reason("2**3//(1-1)"), "integer division or modulo by zero");
        assert_eq!(reason("2**-1//0"), "float floor division by zero");
    }

    #[test]
    fn deep_nesting_is_rejected_not_overflowed() {
        let nested = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(
            safe_eval(&nested),
            Err(ToolError::InvalidExpression("too many nested parentheses".into()))
        );
        let signs = format!("{}1", "-".repeat(200_000));
        assert!(matches!(safe_eval(&signs), Err(ToolError::InvalidExpression(_))));

        let shallow = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(safe_eval(&shallow).unwrap(), 1.0);
    }
}
