//! Recursive-descent parser for the condition language.
//!
//! ```text
//! expr       := or
//! or         := and ( "||" and )*
//! and        := equality ( "&&" equality )*
//! equality   := relational ( ("==" | "!=") relational )*
//! relational := additive ( ("<" | "<=" | ">" | ">=") additive )?
//! additive   := unary ( ("+" | "-") unary )*
//! unary      := "!" unary | "-" unary | postfix
//! postfix    := primary ( "." method "(" args ")" )*
//! primary    := STRING | NUMBER | "true" | "false" | "(" expr ")" | "[" args "]"
//!             | ("resource" | "subject") "." ("attributes" | "uriVariable") "(" args ")"
//!             | "match" "." ("any" | "single") "(" args ")"
//! ```
//!
//! Identifiers other than the three bound objects and the boolean literals
//! are rejected, as are methods outside [`Method`].

use warrant_types::EntityKind;

use crate::ast::{BinaryOp, Expr, Method};
use crate::error::{ConditionError, Result};
use crate::lexer::{Token, TokenKind, tokenize};

/// Maximum accepted length of condition text, in bytes.
pub const MAX_EXPRESSION_LENGTH: usize = 4096;

/// Maximum nesting depth of a parsed condition.
pub const MAX_EXPRESSION_DEPTH: usize = 64;

/// Parses condition text into an expression tree.
///
/// # Errors
///
/// - [`ConditionError::BlankExpression`] for empty or whitespace-only text
/// - [`ConditionError::ExpressionTooLong`] / [`ConditionError::ExpressionTooDeep`]
///   when a size limit is exceeded
/// - [`ConditionError::Parsing`] for anything outside the grammar
pub fn parse(source: &str) -> Result<Expr> {
    if source.trim().is_empty() {
        return Err(ConditionError::BlankExpression);
    }
    if source.len() > MAX_EXPRESSION_LENGTH {
        return Err(ConditionError::ExpressionTooLong {
            length: source.len(),
            max: MAX_EXPRESSION_LENGTH,
        });
    }

    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
        end: source.len(),
    };
    let expr = parser.parse_expr()?;
    if let Some(token) = parser.current() {
        return Err(ConditionError::parsing(
            token.position,
            format!("unexpected {} after expression", token.kind.describe()),
        ));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    /// Byte length of the source, reported for errors at end of input.
    end: usize,
}

impl Parser<'_> {
    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn current_kind(&self) -> Option<&TokenKind> {
        self.current().map(|t| &t.kind)
    }

    fn position(&self) -> usize {
        self.current().map_or(self.end, |t| t.position)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.current_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<()> {
        if self.eat(kind) {
            return Ok(());
        }
        Err(self.unexpected(&format!("expected {}", kind.describe())))
    }

    fn expect_identifier(&mut self, context: &str) -> Result<(String, usize)> {
        match self.current() {
            Some(Token {
                kind: TokenKind::Identifier(name),
                position,
            }) => {
                let found = (name.clone(), *position);
                self.pos += 1;
                Ok(found)
            }
            _ => Err(self.unexpected(&format!("expected {context}"))),
        }
    }

    fn unexpected(&self, expected: &str) -> ConditionError {
        let found = self
            .current_kind()
            .map_or_else(|| "end of expression".to_string(), TokenKind::describe);
        ConditionError::parsing(self.position(), format!("{expected}, found {found}"))
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_EXPRESSION_DEPTH {
            return Err(ConditionError::ExpressionTooDeep {
                max: MAX_EXPRESSION_DEPTH,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // expr := or
    fn parse_expr(&mut self) -> Result<Expr> {
        self.enter()?;
        let expr = self.parse_or()?;
        self.leave();
        Ok(expr)
    }

    // or := and ( "||" and )*
    fn parse_or(&mut self) -> Result<Expr> {
        let first = self.parse_and()?;
        let mut operands = vec![first];
        while self.eat(&TokenKind::OrOr) {
            operands.push(self.parse_and()?);
        }
        Ok(if operands.len() == 1 {
            operands.remove(0)
        } else {
            Expr::Or(operands)
        })
    }

    // and := equality ( "&&" equality )*
    fn parse_and(&mut self) -> Result<Expr> {
        let first = self.parse_equality()?;
        let mut operands = vec![first];
        while self.eat(&TokenKind::AndAnd) {
            operands.push(self.parse_equality()?);
        }
        Ok(if operands.len() == 1 {
            operands.remove(0)
        } else {
            Expr::And(operands)
        })
    }

    // equality := relational ( ("==" | "!=") relational )*
    fn parse_equality(&mut self) -> Result<Expr> {
        let mut left = self.parse_relational()?;
        let mut chained = 0;
        loop {
            let op = match self.current_kind() {
                Some(TokenKind::EqualEqual) => BinaryOp::Equal,
                Some(TokenKind::NotEqual) => BinaryOp::NotEqual,
                _ => break,
            };
            self.pos += 1;
            // Each operator nests the tree built so far one level deeper.
            self.enter()?;
            chained += 1;
            let right = self.parse_relational()?;
            left = binary(op, left, right);
        }
        self.depth -= chained;
        Ok(left)
    }

    // relational := additive ( ("<" | "<=" | ">" | ">=") additive )?
    fn parse_relational(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;
        let op = match self.current_kind() {
            Some(TokenKind::Less) => BinaryOp::Less,
            Some(TokenKind::LessEqual) => BinaryOp::LessEqual,
            Some(TokenKind::Greater) => BinaryOp::Greater,
            Some(TokenKind::GreaterEqual) => BinaryOp::GreaterEqual,
            _ => return Ok(left),
        };
        self.pos += 1;
        self.enter()?;
        let right = self.parse_additive()?;
        self.leave();
        Ok(binary(op, left, right))
    }

    // additive := unary ( ("+" | "-") unary )*
    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        let mut chained = 0;
        loop {
            let op = match self.current_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Subtract,
                _ => break,
            };
            self.pos += 1;
            self.enter()?;
            chained += 1;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        self.depth -= chained;
        Ok(left)
    }

    // unary := "!" unary | "-" unary | postfix
    fn parse_unary(&mut self) -> Result<Expr> {
        let wrap: fn(Box<Expr>) -> Expr = match self.current_kind() {
            Some(TokenKind::Bang) => Expr::Not,
            Some(TokenKind::Minus) => Expr::Negate,
            _ => return self.parse_postfix(),
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.parse_unary()?;
        self.leave();
        Ok(wrap(Box::new(operand)))
    }

    // postfix := primary ( "." method "(" args ")" )*
    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        let mut chained = 0;
        while self.eat(&TokenKind::Dot) {
            let (name, position) = self.expect_identifier("method name")?;
            let method = Method::from_name(&name).ok_or_else(|| {
                ConditionError::parsing(position, format!("method '{name}' is not allowed"))
            })?;
            self.enter()?;
            chained += 1;
            let args = self.parse_call_args(method.name(), method.arity(), position)?;
            expr = Expr::Method {
                receiver: Box::new(expr),
                method,
                args,
            };
        }
        self.depth -= chained;
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let Some(token) = self.current() else {
            return Err(self.unexpected("expected expression"));
        };
        let position = token.position;

        match token.kind.clone() {
            TokenKind::StringLiteral(value) => {
                self.pos += 1;
                Ok(Expr::String(value))
            }
            TokenKind::Number(value) => {
                self.pos += 1;
                Ok(Expr::Number(value))
            }
            TokenKind::LeftParen => {
                self.pos += 1;
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expr)
            }
            TokenKind::LeftBracket => {
                self.pos += 1;
                let items = self.parse_list(&TokenKind::RightBracket)?;
                Ok(Expr::List(items))
            }
            TokenKind::Identifier(name) => {
                self.pos += 1;
                match name.as_str() {
                    "true" => Ok(Expr::Bool(true)),
                    "false" => Ok(Expr::Bool(false)),
                    "resource" => self.parse_entity_call(EntityKind::Resource),
                    "subject" => self.parse_entity_call(EntityKind::Subject),
                    "match" => self.parse_match_call(),
                    _ => Err(ConditionError::parsing(
                        position,
                        format!(
                            "unknown identifier '{name}', only resource, subject and match are available"
                        ),
                    )),
                }
            }
            other => Err(ConditionError::parsing(
                position,
                format!("expected expression, found {}", other.describe()),
            )),
        }
    }

    fn parse_entity_call(&mut self, entity: EntityKind) -> Result<Expr> {
        self.expect(&TokenKind::Dot)?;
        let (member, position) = self.expect_identifier("member name")?;
        match member.as_str() {
            "attributes" => {
                let mut args = self.parse_call_args(&member, 2, position)?.into_iter();
                match (args.next(), args.next()) {
                    (Some(issuer), Some(name)) => Ok(Expr::Attributes {
                        entity,
                        issuer: Box::new(issuer),
                        name: Box::new(name),
                    }),
                    _ => Err(ConditionError::parsing(position, "attributes takes 2 arguments")),
                }
            }
            "uriVariable" => {
                let mut args = self.parse_call_args(&member, 1, position)?.into_iter();
                match args.next() {
                    Some(name) => Ok(Expr::UriVariable {
                        entity,
                        name: Box::new(name),
                    }),
                    None => Err(ConditionError::parsing(position, "uriVariable takes 1 argument")),
                }
            }
            _ => Err(ConditionError::parsing(
                position,
                format!("'{entity}' has no member '{member}'"),
            )),
        }
    }

    fn parse_match_call(&mut self) -> Result<Expr> {
        self.expect(&TokenKind::Dot)?;
        let (member, position) = self.expect_identifier("member name")?;
        let build: fn(Box<Expr>, Box<Expr>) -> Expr = match member.as_str() {
            "any" => Expr::MatchAny,
            "single" => Expr::MatchSingle,
            _ => {
                return Err(ConditionError::parsing(
                    position,
                    format!("'match' has no member '{member}'"),
                ));
            }
        };
        let mut args = self.parse_call_args(&member, 2, position)?.into_iter();
        match (args.next(), args.next()) {
            (Some(first), Some(second)) => Ok(build(Box::new(first), Box::new(second))),
            _ => Err(ConditionError::parsing(position, format!("{member} takes 2 arguments"))),
        }
    }

    /// Parses `"(" args ")"` and checks the argument count.
    fn parse_call_args(&mut self, name: &str, arity: usize, position: usize) -> Result<Vec<Expr>> {
        self.expect(&TokenKind::LeftParen)?;
        let args = self.parse_list(&TokenKind::RightParen)?;
        if args.len() != arity {
            return Err(ConditionError::parsing(
                position,
                format!("{name} takes {arity} argument(s), {} given", args.len()),
            ));
        }
        Ok(args)
    }

    /// Parses a comma-separated list up to and including `close`.
    fn parse_list(&mut self, close: &TokenKind) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(&TokenKind::Comma)?;
        }
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
    use test_case::test_case;

    #[test]
    fn parses_role_condition() {
        let expr = parse(r#"match.single(subject.attributes("issuer1", "role"), "admin")"#).unwrap();
        assert_eq!(
            expr,
            Expr::MatchSingle(
                Box::new(Expr::Attributes {
                    entity: EntityKind::Subject,
                    issuer: Box::new(Expr::String("issuer1".into())),
                    name: Box::new(Expr::String("role".into())),
                }),
                Box::new(Expr::String("admin".into())),
            )
        );
    }

    #[test]
    fn boolean_chains_are_flattened() {
        let expr = parse("true && false && true || false").unwrap();
        match expr {
            Expr::Or(operands) => {
                assert_eq!(operands.len(), 2);
                assert!(matches!(&operands[0], Expr::And(inner) if inner.len() == 3));
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn method_chain_on_bound_call() {
        let expr = parse(r#"resource.uriVariable("site").toLowerCase().startsWith("san")"#).unwrap();
        let Expr::Method { receiver, method, args } = expr else {
            panic!("expected method call");
        };
        assert_eq!(method, Method::StartsWith);
        assert_eq!(args.len(), 1);
        assert!(matches!(*receiver, Expr::Method { method: Method::ToLowerCase, .. }));
    }

    #[test]
    fn additive_is_left_associative() {
        let expr = parse("1 - 2 - 3 == -4").unwrap();
        let Expr::Binary { op: BinaryOp::Equal, left, .. } = expr else {
            panic!("expected equality");
        };
        let Expr::Binary { op: BinaryOp::Subtract, left: inner, .. } = *left else {
            panic!("expected subtraction");
        };
        assert!(matches!(*inner, Expr::Binary { op: BinaryOp::Subtract, .. }));
    }

    #[test_case("System.exit(0)"; "process control")]
    #[test_case("Runtime.getRuntime().exec('ls')"; "runtime exec")]
    #[test_case("this.getClass()"; "reflection through this")]
    #[test_case("subject.getClass()"; "reflection on bound object")]
    #[test_case("subject.attributes('i', 'r').getClass()"; "reflection on value")]
    #[test_case("new File('/etc/passwd')"; "constructor")]
    #[test_case("resource.attributes"; "property access")]
    #[test_case("resource.attributes('i')"; "wrong arity")]
    #[test_case("match.all([], [])"; "unknown helper")]
    #[test_case("'a'.execute()"; "unknown method")]
    #[test_case("1 < 2 < 3"; "chained relational")]
    #[test_case("(true"; "unclosed paren")]
    #[test_case("true false"; "trailing tokens")]
    #[test_case("resource"; "bare bound object")]
    fn rejects_outside_grammar(source: &str) {
        assert!(
            matches!(parse(source), Err(ConditionError::Parsing { .. })),
            "{source} should fail to parse"
        );
    }

    #[test_case(""; "empty")]
    #[test_case("   \n\t"; "whitespace")]
    fn blank_is_argument_error(source: &str) {
        assert_eq!(parse(source), Err(ConditionError::BlankExpression));
    }

    #[test]
    fn length_limit() {
        let long = format!("'{}'", "a".repeat(MAX_EXPRESSION_LENGTH));
        assert!(matches!(parse(&long), Err(ConditionError::ExpressionTooLong { .. })));
    }

    #[test]
    fn depth_limit() {
        let nested = format!("{}true{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(
            parse(&nested),
            Err(ConditionError::ExpressionTooDeep { max: MAX_EXPRESSION_DEPTH })
        );

        let negated = format!("{}true", "!".repeat(100));
        assert!(matches!(parse(&negated), Err(ConditionError::ExpressionTooDeep { .. })));

        let shallow = format!("{}true{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(parse(&shallow), Ok(Expr::Bool(true)));
    }

    #[test_case("+" ; "addition")]
    #[test_case("-" ; "subtraction")]
    #[test_case("==" ; "equality")]
    #[test_case("!=" ; "inequality")]
    fn operator_chains_count_toward_depth(op: &str) {
        let chain = |terms: usize| format!("1{}", format!("{op}1").repeat(terms));

        let deep = chain(MAX_EXPRESSION_DEPTH + 1);
        assert_eq!(
            parse(&deep),
            Err(ConditionError::ExpressionTooDeep { max: MAX_EXPRESSION_DEPTH })
        );
        assert!(parse(&chain(10)).is_ok());
    }

    #[test]
    fn chain_at_length_limit_is_too_deep() {
        let source = format!("1{}==1", "+1".repeat(2045));
        assert!(source.len() <= MAX_EXPRESSION_LENGTH);
        assert!(matches!(parse(&source), Err(ConditionError::ExpressionTooDeep { .. })));
    }

    #[test]
    fn error_positions_point_at_offender() {
        match parse("true && System.exit(0)") {
            Err(ConditionError::Parsing { position, .. }) => assert_eq!(position, 8),
            other => panic!("unexpected {other:?}"),
        }
    }
}
