//! Parser implementation using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::ParseError;

use super::ast::*;
use super::lexer::Token;

/// Postfix operations applied after an atom
#[derive(Debug, Clone)]
enum PostfixOp {
    Field(Spanned<String>),
    Index(Spanned<Expr>),
}

/// Parse expression source into an AST
pub fn parse(input: &str) -> Result<Spanned<Expr>, Vec<ParseError>> {
    // logos drops unknown characters; report them instead of parsing around them
    let invalid = super::lexer::invalid_spans(input);
    if !invalid.is_empty() {
        return Err(invalid
            .into_iter()
            .map(|span| ParseError::Syntax {
                message: format!("Unexpected character '{}'", &input[span.clone()]),
                span,
                expected: vec![],
            })
            .collect());
    }

    let len = input.len();

    // Create a logos lexer and convert to token stream
    let token_iter = super::lexer::lex(input).map(|(tok, span)| (tok, span.into()));

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    expression_parser()
        .then_ignore(end())
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

fn expression_parser<'a, I>(
) -> impl Parser<'a, I, Spanned<Expr>, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let identifier = select! {
        Token::Ident(s) => s,
    }
    .map_with(|s, e| Spanned::new(s, span_range(&e.span())));

    recursive(|expr| {
        let literal = select! {
            Token::Number(n) => Literal::Number(n),
            Token::String(s) => Literal::String(s),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Null => Literal::Null,
        }
        .map_with(|lit, e| Spanned::new(Expr::Literal(lit), span_range(&e.span())));

        let items = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>();

        // Function call: name(args) - must be tried before plain variables
        let call = identifier
            .clone()
            .then(
                items
                    .clone()
                    .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
            )
            .map_with(|(name, args), e| Spanned::new(Expr::Call(name, args), span_range(&e.span())));

        let variable = identifier
            .clone()
            .map(|name| Spanned::new(Expr::Variable(name.node), name.span));

        let list = items
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
            .map_with(|items, e| Spanned::new(Expr::List(items), span_range(&e.span())));

        let parenthesized = expr
            .clone()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

        // Conditional: if cond then a else b
        let conditional = just(Token::If)
            .ignore_then(expr.clone())
            .then_ignore(just(Token::Then))
            .then(expr.clone())
            .then_ignore(just(Token::Else))
            .then(expr.clone())
            .map_with(|((condition, then_branch), else_branch), e| {
                Spanned::new(
                    Expr::If {
                        condition: Box::new(condition),
                        then_branch: Box::new(then_branch),
                        else_branch: Box::new(else_branch),
                    },
                    span_range(&e.span()),
                )
            });

        let atom = choice((literal, conditional, call, variable, list, parenthesized)).boxed();

        // Postfix: field access and indexing, left to right
        let postfix_op = choice((
            just(Token::Dot)
                .ignore_then(identifier.clone())
                .map(PostfixOp::Field),
            expr.clone()
                .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
                .map(PostfixOp::Index),
        ))
        .map_with(|op, e| (op, span_range(&e.span())));

        let postfix = atom
            .foldl(postfix_op.repeated(), |base, (op, op_span)| {
                let span = base.span.start..op_span.end;
                match op {
                    PostfixOp::Field(name) => Spanned::new(Expr::Field(Box::new(base), name), span),
                    PostfixOp::Index(index) => {
                        Spanned::new(Expr::Index(Box::new(base), Box::new(index)), span)
                    }
                }
            })
            .boxed();

        // Prefix: -x, !x
        let unary = recursive(|unary| {
            choice((
                just(Token::Minus).to(UnaryOp::Neg),
                just(Token::Bang).to(UnaryOp::Not),
            ))
            .map_with(|op, e| (op, span_range(&e.span())))
            .then(unary)
            .map(|((op, op_span), rhs): ((UnaryOp, Span), Spanned<Expr>)| {
                let span = op_span.start..rhs.span.end;
                Spanned::new(Expr::Unary(op, Box::new(rhs)), span)
            })
            .or(postfix.clone())
        })
        .boxed();

        let product = unary
            .clone()
            .foldl(
                choice((
                    just(Token::Star).to(BinaryOp::Mul),
                    just(Token::Slash).to(BinaryOp::Div),
                    just(Token::Percent).to(BinaryOp::Rem),
                ))
                .then(unary)
                .repeated(),
                |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
            )
            .boxed();

        let sum = product
            .clone()
            .foldl(
                choice((
                    just(Token::Plus).to(BinaryOp::Add),
                    just(Token::Minus).to(BinaryOp::Sub),
                ))
                .then(product)
                .repeated(),
                |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
            )
            .boxed();

        // Comparisons do not chain: `a < b < c` is a syntax error
        let comparison = sum
            .clone()
            .then(
                choice((
                    just(Token::EqEq).to(BinaryOp::Eq),
                    just(Token::NotEq).to(BinaryOp::NotEq),
                    just(Token::LessOrEqual).to(BinaryOp::LessOrEqual),
                    just(Token::GreaterOrEqual).to(BinaryOp::GreaterOrEqual),
                    just(Token::Less).to(BinaryOp::Less),
                    just(Token::Greater).to(BinaryOp::Greater),
                    just(Token::In).to(BinaryOp::In),
                ))
                .then(sum)
                .or_not(),
            )
            .map(|(lhs, rhs)| match rhs {
                Some((op, rhs)) => Expr::binary(op, lhs, rhs),
                None => lhs,
            })
            .boxed();

        // Keyword `not` binds looser than comparisons: `not value in ["H"]`
        let negation = recursive(|negation| {
            just(Token::Not)
                .map_with(|_, e| span_range(&e.span()))
                .then(negation)
                .map(|(op_span, rhs): (Span, Spanned<Expr>)| {
                    let span = op_span.start..rhs.span.end;
                    Spanned::new(Expr::Unary(UnaryOp::Not, Box::new(rhs)), span)
                })
                .or(comparison.clone())
        })
        .boxed();

        let conjunction = negation
            .clone()
            .foldl(
                choice((just(Token::And), just(Token::AndAnd)))
                    .to(BinaryOp::And)
                    .then(negation)
                    .repeated(),
                |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
            )
            .boxed();

        conjunction
            .clone()
            .foldl(
                choice((just(Token::Or), just(Token::OrOr)))
                    .to(BinaryOp::Or)
                    .then(conjunction)
                    .repeated(),
                |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
            )
            .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Expr {
        parse(input).expect("Should parse").node
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_ok("42"), Expr::Literal(Literal::Number(42.0)));
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        match parse_ok("1 + 2 * 3") {
            Expr::Binary(BinaryOp::Add, lhs, rhs) => {
                assert_eq!(lhs.node, Expr::Literal(Literal::Number(1.0)));
                assert!(matches!(rhs.node, Expr::Binary(BinaryOp::Mul, _, _)));
            }
            other => panic!("Expected addition, got {:?}", other),
        }
    }

    #[test]
    fn test_left_associative_subtraction() {
        match parse_ok("5 - 2 - 1") {
            Expr::Binary(BinaryOp::Sub, lhs, _) => {
                assert!(matches!(lhs.node, Expr::Binary(BinaryOp::Sub, _, _)));
            }
            other => panic!("Expected subtraction, got {:?}", other),
        }
    }

    #[test]
    fn test_field_access_chain() {
        match parse_ok("current.width") {
            Expr::Field(base, field) => {
                assert_eq!(base.node, Expr::Variable("current".to_string()));
                assert_eq!(field.node, "width");
            }
            other => panic!("Expected field access, got {:?}", other),
        }
    }

    #[test]
    fn test_index_and_call() {
        match parse_ok("lower(context[0])") {
            Expr::Call(name, args) => {
                assert_eq!(name.node, "lower");
                assert_eq!(args.len(), 1);
                assert!(matches!(args[0].node, Expr::Index(_, _)));
            }
            other => panic!("Expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_not_binds_looser_than_in() {
        match parse_ok(r#"not value in ["H", "W"]"#) {
            Expr::Unary(UnaryOp::Not, inner) => {
                assert!(matches!(inner.node, Expr::Binary(BinaryOp::In, _, _)));
            }
            other => panic!("Expected negation, got {:?}", other),
        }
    }

    #[test]
    fn test_conditional() {
        let expr = parse_ok(r#"if value == "Announced Date" then "Release Date" else value"#);
        assert!(matches!(expr, Expr::If { .. }));
    }

    #[test]
    fn test_span_covers_binary() {
        let expr = parse("a + bb").expect("Should parse");
        assert_eq!(expr.span, 0..6);
    }

    #[test]
    fn test_trailing_garbage_is_error() {
        assert!(parse("1 2").is_err());
    }

    #[test]
    fn test_unknown_character_is_error() {
        let errs = parse("value # 1").unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(errs[0].to_string().contains("'#'"));
    }
}
