//! Recursive-descent parser for condition expressions.
//!
//! The grammar only admits literals, comparisons, boolean connectives,
//! arithmetic, array literals, the `length` property and a fixed set of
//! string/array methods. Identifiers must be declared up front, so nothing
//! in an expression can name an ambient binding.

use std::collections::HashSet;

use super::lexer::{tokenize, Token};
use super::value::Value;
use super::ExpressionError;

/// Methods callable with `receiver.method(args)`.
pub const ALLOWED_METHODS: &[&str] = &[
    "includes",
    "startsWith",
    "endsWith",
    "indexOf",
    "toLowerCase",
    "toUpperCase",
    "trim",
    "toString",
];

/// Properties readable with `receiver.property`.
pub const ALLOWED_PROPERTIES: &[&str] = &["length"];

/// Nesting limit for the parsed tree. Every parenthesis, unary operator,
/// chained binary operator and member access counts one level.
const MAX_DEPTH: usize = 64;

/// Longest expression accepted, in bytes.
pub const MAX_EXPRESSION_LEN: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    StrictEq,
    NotEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    /// Unresolved cross-step reference, only legal before substitution
    Reference(String),
    Array(Vec<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Property {
        object: Box<Expr>,
        name: String,
    },
    Call {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
}

/// What bare names and reference tokens may appear.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    /// Raw text as authored: reference tokens allowed, no identifiers.
    References,
    /// Substituted text: only the given variables, no reference tokens.
    Variables(&'a HashSet<String>),
}

/// Parses an expression under the given scope.
pub fn parse(source: &str, scope: Scope<'_>) -> Result<Expr, ExpressionError> {
    if source.trim().is_empty() {
        return Err(ExpressionError::Empty);
    }
    if source.len() > MAX_EXPRESSION_LEN {
        return Err(ExpressionError::TooLong {
            length: source.len(),
            max: MAX_EXPRESSION_LEN,
        });
    }

    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        scope,
    };
    let expr = parser.expression()?;

    if let Some(token) = parser.peek() {
        return Err(ExpressionError::UnexpectedToken(token.describe()));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    scope: Scope<'a>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(ExpressionError::UnexpectedToken(token.describe())),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }

    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn expression(&mut self) -> Result<Expr, ExpressionError> {
        self.enter()?;
        let expr = self.or();
        self.leave();
        expr
    }

    /// Left-nested chains grow the tree one level per operator, so each
    /// iteration enters once and the whole chain leaves together.
    fn or(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.and()?;
        while self.eat(&Token::OrOr) {
            self.enter()?;
            let right = self.and()?;
            left = logical(LogicalOp::Or, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.equality()?;
        while self.eat(&Token::AndAnd) {
            self.enter()?;
            let right = self.equality()?;
            left = logical(LogicalOp::And, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::EqEqEq) => BinaryOp::StrictEq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                Some(Token::NotEqEq) => BinaryOp::StrictNotEq,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            let right = self.relational()?;
            left = binary(op, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn relational(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            let right = self.additive()?;
            left = binary(op, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            let right = self.unary()?;
            left = binary(op, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        let op = match self.peek() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Negate,
            Some(Token::Plus) => UnaryOp::Plus,
            _ => return self.postfix(),
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.unary();
        self.leave();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn postfix(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut expr = self.primary()?;

        while self.eat(&Token::Dot) {
            self.enter()?;
            let name = match self.advance() {
                Some(Token::Ident(name)) => name,
                Some(token) => return Err(ExpressionError::UnexpectedToken(token.describe())),
                None => return Err(ExpressionError::UnexpectedEnd),
            };

            if self.eat(&Token::LParen) {
                if !ALLOWED_METHODS.contains(&name.as_str()) {
                    return Err(ExpressionError::MethodNotAllowed(name));
                }
                let args = self.arguments(Token::RParen)?;
                expr = Expr::Call {
                    object: Box::new(expr),
                    method: name,
                    args,
                };
            } else {
                if !ALLOWED_PROPERTIES.contains(&name.as_str()) {
                    return Err(ExpressionError::PropertyNotAllowed(name));
                }
                expr = Expr::Property {
                    object: Box::new(expr),
                    name,
                };
            }
        }

        if let Some(Token::LParen) | Some(Token::LBracket) = self.peek() {
            return Err(ExpressionError::UnexpectedToken(
                "call or index on a non-method".to_string(),
            ));
        }
        self.depth = base;
        Ok(expr)
    }

    /// Comma-separated expressions up to `close`, which is consumed.
    fn arguments(&mut self, close: Token) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();
        if self.eat(&close) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(&close) {
                return Ok(args);
            }
            self.expect(Token::Comma)?;
        }
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::LParen) => {
                let expr = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some(Token::LBracket) => {
                self.enter()?;
                let items = self.arguments(Token::RBracket);
                self.leave();
                Ok(Expr::Array(items?))
            }
            Some(Token::Reference(text)) => match self.scope {
                Scope::References => Ok(Expr::Reference(text)),
                Scope::Variables(_) => Err(ExpressionError::UnresolvedReference(text)),
            },
            Some(Token::Ident(name)) => self.identifier(name),
            Some(token) => Err(ExpressionError::UnexpectedToken(token.describe())),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }

    fn identifier(&self, name: String) -> Result<Expr, ExpressionError> {
        let literal = match name.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            "null" => Some(Value::Null),
            "undefined" => Some(Value::Undefined),
            _ => None,
        };
        if let Some(value) = literal {
            return Ok(Expr::Literal(value));
        }

        match self.scope {
            Scope::Variables(declared) if declared.contains(&name) => Ok(Expr::Variable(name)),
            _ => Err(ExpressionError::UnknownIdentifier(name)),
        }
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr::Logical {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_precedence() {
        let expr = parse("1 + 2 * 3 > 6 && true", Scope::References).unwrap();
        match expr {
            Expr::Logical {
                op: LogicalOp::And,
                left,
                ..
            } => match *left {
                Expr::Binary {
                    op: BinaryOp::Gt, ..
                } => {}
                other => panic!("unexpected left side: {:?}", other),
            },
            other => panic!("unexpected expression: {:?}", other),
        }
    }

    #[test]
    fn test_references_allowed_in_raw_scope() {
        let expr = parse("{{@a:A.x}} === 'ok'", Scope::References).unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::StrictEq, .. }));
    }

    #[test]
    fn test_references_rejected_after_substitution() {
        let declared = vars(&["__v0"]);
        let err = parse("{{@a:A.x}} === __v0", Scope::Variables(&declared)).unwrap_err();
        assert!(matches!(err, ExpressionError::UnresolvedReference(_)));
    }

    #[test]
    fn test_undeclared_identifiers_rejected() {
        assert!(matches!(
            parse("process", Scope::References),
            Err(ExpressionError::UnknownIdentifier(_))
        ));

        let declared = vars(&["__v0"]);
        assert!(parse("__v0 > 1", Scope::Variables(&declared)).is_ok());
        assert!(parse("__v1 > 1", Scope::Variables(&declared)).is_err());
    }

    #[test]
    fn test_method_whitelist() {
        let declared = vars(&["__v0"]);
        assert!(parse("__v0.includes('a')", Scope::Variables(&declared)).is_ok());
        assert!(parse("__v0.trim().length > 0", Scope::Variables(&declared)).is_ok());
        assert!(matches!(
            parse("__v0.constructor('x')", Scope::Variables(&declared)),
            Err(ExpressionError::MethodNotAllowed(_))
        ));
        assert!(matches!(
            parse("__v0.constructor", Scope::Variables(&declared)),
            Err(ExpressionError::PropertyNotAllowed(_))
        ));
    }

    #[test]
    fn test_rejects_calls_and_indexing_on_values() {
        let declared = vars(&["__v0"]);
        assert!(parse("__v0('x')", Scope::Variables(&declared)).is_err());
        assert!(parse("__v0[0]", Scope::Variables(&declared)).is_err());
    }

    #[test]
    fn test_keywords_are_not_identifiers() {
        assert!(parse("function() {}", Scope::References).is_err());
        assert!(parse("new Date()", Scope::References).is_err());
        assert!(parse("this", Scope::References).is_err());
    }

    #[test]
    fn test_array_literal() {
        let expr = parse("[1, 'a'].includes('a')", Scope::References).unwrap();
        assert!(matches!(expr, Expr::Call { .. }));
        assert!(parse("[]", Scope::References).is_ok());
        assert!(parse("[1,]", Scope::References).is_err());
    }

    #[test]
    fn test_empty_and_trailing() {
        assert!(matches!(parse("  ", Scope::References), Err(ExpressionError::Empty)));
        assert!(parse("1 2", Scope::References).is_err());
        assert!(parse("(1", Scope::References).is_err());
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert!(matches!(
            parse(&deep, Scope::References),
            Err(ExpressionError::TooDeep(_))
        ));
        let bangs = format!("{}true", "!".repeat(100));
        assert!(parse(&bangs, Scope::References).is_err());
    }

    #[test]
    fn test_operator_chains_count_toward_depth() {
        let sum = "1+".repeat(4900) + "1 > 0";
        assert!(sum.len() < MAX_EXPRESSION_LEN);
        assert!(matches!(
            parse(&sum, Scope::References),
            Err(ExpressionError::TooDeep(_))
        ));

        for op in ["&&", "||", "===", "<", "*"] {
            let chain = vec!["1"; 500].join(op);
            assert!(
                matches!(parse(&chain, Scope::References), Err(ExpressionError::TooDeep(_))),
                "{} chain accepted",
                op
            );
        }

        let calls = format!("'a'{}", ".trim()".repeat(500));
        assert!(matches!(
            parse(&calls, Scope::References),
            Err(ExpressionError::TooDeep(_))
        ));

        // Short chains and siblings at the same level stay within the limit
        let short = vec!["1"; 40].join(" + ");
        assert!(parse(&short, Scope::References).is_ok());
        let grouped = vec!["(1 + 2 + 3)"; 40].join(" * ");
        assert!(parse(&grouped, Scope::References).is_ok());
        let flat_args = format!("[{}].includes(1)", vec!["1 + 1"; 200].join(", "));
        assert!(parse(&flat_args, Scope::References).is_ok());
    }

    #[test]
    fn test_length_limit() {
        let long = "1 + ".repeat(MAX_EXPRESSION_LEN) + "1";
        assert!(matches!(
            parse(&long, Scope::References),
            Err(ExpressionError::TooLong { .. })
        ));
    }
}
