//! # FHIRPath Expression Parser
//!
//! Turns FHIRPath text into an [`Expression`] tree. Every node of the tree
//! records the byte range of the source text it was parsed from, so that the
//! evaluator and the diagnostics tree can report the sub-expression behind
//! each intermediate result.
//!
//! ## Operator precedence (high to low)
//!
//! 1. Postfix: member access and function invocation (`.`), indexer (`[]`)
//! 2. Prefix polarity: `+`, `-`
//! 3. Multiplicative: `*`, `/`, `div`, `mod`
//! 4. Additive: `+`, `-`, `&`
//! 5. Union: `|`
//! 6. Inequality: `<`, `<=`, `>`, `>=`
//! 7. Type: `is`, `as`
//! 8. Equality: `=`, `~`, `!=`, `!~`
//! 9. Membership: `in`, `contains`
//! 10. `and`
//! 11. `or`, `xor`
//! 12. `implies`
//!
//! ```rust
//! use atrius_fhir_path::parser::{parse, SyntaxKind};
//!
//! let parsed = parse("Patient.name.where(use = 'official')").unwrap();
//! assert_eq!(parsed.root.syntax_kind(), SyntaxKind::FunctionCall);
//! assert_eq!(parsed.text(&parsed.root), "Patient.name.where(use = 'official')");
//! ```

use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::sync::Arc;

use atrius_fhir_model::{PrecisionDate, PrecisionDateTime, PrecisionTime};
use chumsky::Parser;
use chumsky::error::Rich;
use chumsky::prelude::*;
use rust_decimal::Decimal;

use crate::error::FhirPathError;

/// A literal value in an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `{}`
    Null,
    Boolean(bool),
    String(String),
    /// A number with a decimal point.
    Number(Decimal),
    Integer(i64),
    Date(PrecisionDate),
    DateTime(PrecisionDateTime),
    Time(PrecisionTime),
    /// A number followed by a calendar keyword or a quoted UCUM unit.
    Quantity(Decimal, String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "{{}}"),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::String(s) => write!(f, "'{}'", s),
            Literal::Number(d) => write!(f, "{}", d),
            Literal::Integer(n) => write!(f, "{}", n),
            Literal::Date(d) => write!(f, "@{}", d.original_string()),
            Literal::DateTime(dt) => write!(f, "@{}", dt.original_string()),
            Literal::Time(t) => write!(f, "@T{}", t.original_string()),
            Literal::Quantity(d, u) => write!(f, "{} '{}'", d, u),
        }
    }
}

/// A type name after `is`/`as`, optionally namespace-qualified.
///
/// - `FHIR.Patient` -> `QualifiedIdentifier("FHIR", Some("Patient"))`
/// - `Boolean` -> `QualifiedIdentifier("Boolean", None)`
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpecifier {
    QualifiedIdentifier(String, Option<String>),
}

impl TypeSpecifier {
    /// `Namespace.Name` or the bare name.
    pub fn qualified_name(&self) -> String {
        match self {
            TypeSpecifier::QualifiedIdentifier(ns, Some(name)) => format!("{}.{}", ns, name),
            TypeSpecifier::QualifiedIdentifier(name, None) => name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Invocation(Invocation),
    Literal(Literal),
    /// `%name` or `%'name'`.
    ExternalConstant(String),
    Parenthesized(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Member(String),
    Function(String, Vec<Expression>),
    This,
    Index,
    Total,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Term(Term),
    /// `left.member` or `left.function(args)`
    Invocation(Box<Expression>, Invocation),
    Indexer(Box<Expression>, Box<Expression>),
    Polarity(char, Box<Expression>),
    Multiplicative(Box<Expression>, String, Box<Expression>),
    Additive(Box<Expression>, String, Box<Expression>),
    Type(Box<Expression>, String, TypeSpecifier),
    Union(Box<Expression>, Box<Expression>),
    Inequality(Box<Expression>, String, Box<Expression>),
    Equality(Box<Expression>, String, Box<Expression>),
    Membership(Box<Expression>, String, Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    /// `or` / `xor`
    Or(Box<Expression>, String, Box<Expression>),
    Implies(Box<Expression>, Box<Expression>),
}

/// A node of the parse tree together with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub span: Range<usize>,
}

/// Syntactic category of a parse-tree node; drives evaluation dispatch and
/// the diagnostics filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxKind {
    Literal,
    ExternalConstant,
    Parenthesized,
    MemberAccess,
    FunctionCall,
    ContextVariable,
    Indexer,
    Polarity,
    Multiplicative,
    Additive,
    TypeOperation,
    Union,
    Inequality,
    Equality,
    Membership,
    And,
    Or,
    Implies,
}

impl Expression {
    pub fn new(kind: ExprKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }

    pub fn syntax_kind(&self) -> SyntaxKind {
        let invocation_kind = |invocation: &Invocation| match invocation {
            Invocation::Member(_) => SyntaxKind::MemberAccess,
            Invocation::Function(..) => SyntaxKind::FunctionCall,
            Invocation::This | Invocation::Index | Invocation::Total => SyntaxKind::ContextVariable,
        };
        match &self.kind {
            ExprKind::Term(Term::Invocation(invocation)) => invocation_kind(invocation),
            ExprKind::Term(Term::Literal(_)) => SyntaxKind::Literal,
            ExprKind::Term(Term::ExternalConstant(_)) => SyntaxKind::ExternalConstant,
            ExprKind::Term(Term::Parenthesized(_)) => SyntaxKind::Parenthesized,
            ExprKind::Invocation(_, invocation) => invocation_kind(invocation),
            ExprKind::Indexer(..) => SyntaxKind::Indexer,
            ExprKind::Polarity(..) => SyntaxKind::Polarity,
            ExprKind::Multiplicative(..) => SyntaxKind::Multiplicative,
            ExprKind::Additive(..) => SyntaxKind::Additive,
            ExprKind::Type(..) => SyntaxKind::TypeOperation,
            ExprKind::Union(..) => SyntaxKind::Union,
            ExprKind::Inequality(..) => SyntaxKind::Inequality,
            ExprKind::Equality(..) => SyntaxKind::Equality,
            ExprKind::Membership(..) => SyntaxKind::Membership,
            ExprKind::And(..) => SyntaxKind::And,
            ExprKind::Or(..) => SyntaxKind::Or,
            ExprKind::Implies(..) => SyntaxKind::Implies,
        }
    }

    /// Name of the invoked function, if this node is a function call.
    pub fn function_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Term(Term::Invocation(Invocation::Function(name, _)))
            | ExprKind::Invocation(_, Invocation::Function(name, _)) => Some(name),
            _ => None,
        }
    }

    /// Identifier text of a bare member or a dotted member chain, as used for
    /// type names passed to `is()`, `as()` and `ofType()`.
    pub fn as_type_name(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Term(Term::Invocation(Invocation::Member(name))) => Some(name.clone()),
            ExprKind::Invocation(left, Invocation::Member(name)) => {
                Some(format!("{}.{}", left.as_type_name()?, name))
            }
            _ => None,
        }
    }
}

/// A parse tree paired with the text it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExpression {
    pub source: Arc<str>,
    pub root: Expression,
}

impl ParsedExpression {
    /// Source text of a node of this tree, without surrounding whitespace.
    pub fn text(&self, expression: &Expression) -> &str {
        self.source
            .get(expression.span.clone())
            .map(str::trim)
            .unwrap_or_default()
    }
}

/// Parses a complete expression.
pub fn parse(source: &str) -> Result<ParsedExpression, FhirPathError> {
    let root = parser()
        .parse(source)
        .into_result()
        .map_err(|errors| FhirPathError::Parse {
            expression: source.to_string(),
            message: errors
                .iter()
                .map(|e| format!("{} at {}..{}", e, e.span().start, e.span().end))
                .collect::<Vec<_>>()
                .join("; "),
        })?;
    Ok(ParsedExpression {
        source: Arc::from(source),
        root,
    })
}

fn spanned(kind: ExprKind, span: SimpleSpan) -> Expression {
    Expression::new(kind, span.start..span.end)
}

fn binary(
    left: Expression,
    right: Expression,
    make: impl FnOnce(Box<Expression>, Box<Expression>) -> ExprKind,
) -> Expression {
    let span = left.span.start..right.span.end;
    Expression::new(make(Box::new(left), Box::new(right)), span)
}

enum Postfix {
    Invoke(Invocation, usize),
    Index(Expression, usize),
}

/// Wraps a parser so that it skips whitespace and comments on both sides.
fn custom_padded<'src, T, P>(
    parser: P,
) -> impl Parser<'src, &'src str, T, extra::Err<Rich<'src, char>>> + Clone
where
    P: Parser<'src, &'src str, T, extra::Err<Rich<'src, char>>> + Clone,
    T: Clone,
{
    let ws_or_comment = choice((
        text::whitespace().at_least(1).ignored(),
        just("//")
            .then(any().and_is(text::newline().or(end()).not()).repeated())
            .ignored(),
        just("/*")
            .then(any().and_is(just("*/").not()).repeated())
            .then(just("*/"))
            .ignored(),
    ))
    .repeated()
    .ignored();

    ws_or_comment
        .then(parser)
        .map(|(_, result)| result)
        .then_ignore(ws_or_comment)
}

fn clean_backtick_identifier(id: &str) -> String {
    if id.starts_with('`') && id.ends_with('`') && id.len() >= 3 {
        id[1..id.len() - 1].to_string()
    } else {
        id.to_string()
    }
}

pub fn parser<'src>()
-> impl Parser<'src, &'src str, Expression, extra::Err<Rich<'src, char>>> + Clone + 'src {
    let esc = just('\\').ignore_then(choice((
        just('`').to('`'),
        just('\'').to('\''),
        just('\\').to('\\'),
        just('/').to('/'),
        just('f').to('\u{000C}'),
        just('n').to('\n'),
        just('r').to('\r'),
        just('t').to('\t'),
        just('"').to('"'),
        just('u').ignore_then(
            any()
                .filter(|c: &char| c.is_ascii_hexdigit())
                .repeated()
                .exactly(4)
                .collect::<String>()
                .try_map(
                    |digits: String, span| match u32::from_str_radix(&digits, 16) {
                        Ok(code) => match char::from_u32(code) {
                            Some(c) => Ok(c),
                            None => Err(Rich::custom(span, "Invalid Unicode code point")),
                        },
                        Err(_) => Err(Rich::custom(span, "Invalid hex digits")),
                    },
                ),
        ),
    )));

    macro_rules! padded {
        ($p:expr) => {
            custom_padded($p)
        };
    }

    let digits = || {
        any()
            .filter(|c: &char| c.is_ascii_digit())
            .repeated()
            .at_least(1)
            .collect::<String>()
    };
    let fixed_digits = |n: usize| {
        any()
            .filter(|c: &char| c.is_ascii_digit())
            .repeated()
            .exactly(n)
            .collect::<String>()
    };

    let null = just('{').then(just('}')).to(Literal::Null);

    let boolean = choice((
        text::keyword("true").to(Literal::Boolean(true)),
        text::keyword("false").to(Literal::Boolean(false)),
    ))
    .boxed();

    let quoted = just('\'')
        .ignore_then(none_of("\\\'").or(esc).repeated().collect::<String>())
        .then_ignore(just('\''))
        .boxed();

    let string = quoted.clone().map(Literal::String);

    let integer_value = digits().try_map(|digits: String, span| {
        i64::from_str(&digits).map_err(|_| Rich::custom(span, format!("Invalid integer: {}", digits)))
    });

    let decimal_value = digits()
        .then_ignore(just('.'))
        .then(digits())
        .try_map(|(whole, fraction), span| {
            let text = format!("{}.{}", whole, fraction);
            Decimal::from_str(&text).map_err(|_| Rich::custom(span, format!("Invalid number: {}", text)))
        });

    let integer = padded!(integer_value.clone().map(Literal::Integer));
    let number = padded!(decimal_value.clone().map(Literal::Number));

    // HH(:mm(:ss(.fff)?)?)?
    let time_format = fixed_digits(2)
        .then(
            just(':')
                .ignore_then(fixed_digits(2))
                .then(
                    just(':')
                        .ignore_then(fixed_digits(2))
                        .then(
                            just('.')
                                .ignore_then(
                                    any()
                                        .filter(|c: &char| c.is_ascii_digit())
                                        .repeated()
                                        .at_least(1)
                                        .at_most(3)
                                        .collect::<String>(),
                                )
                                .or_not(),
                        )
                        .or_not(),
                )
                .or_not(),
        )
        .map(|(hours, rest)| {
            let mut text = hours;
            if let Some((minutes, seconds_part)) = rest {
                text.push(':');
                text.push_str(&minutes);
                if let Some((seconds, fraction)) = seconds_part {
                    text.push(':');
                    text.push_str(&seconds);
                    if let Some(fraction) = fraction {
                        text.push('.');
                        text.push_str(&fraction);
                    }
                }
            }
            text
        })
        .boxed();

    let timezone_format = just('Z').to("Z".to_string()).or(one_of("+-")
        .then(fixed_digits(2))
        .then_ignore(just(':'))
        .then(fixed_digits(2))
        .map(|((sign, hour), minute): ((char, String), String)| {
            format!("{}{}:{}", sign, hour, minute)
        }));

    // YYYY(-MM(-DD)?)?
    let date_format = fixed_digits(4)
        .then(
            just('-')
                .ignore_then(fixed_digits(2))
                .then(just('-').ignore_then(fixed_digits(2)).or_not())
                .or_not(),
        )
        .map(|(year, month_part)| {
            let mut text = year;
            if let Some((month, day)) = month_part {
                text.push('-');
                text.push_str(&month);
                if let Some(day) = day {
                    text.push('-');
                    text.push_str(&day);
                }
            }
            text
        })
        .boxed();

    let unit_keyword = choice((
        text::keyword("year"),
        text::keyword("month"),
        text::keyword("week"),
        text::keyword("day"),
        text::keyword("hour"),
        text::keyword("minute"),
        text::keyword("second"),
        text::keyword("millisecond"),
        text::keyword("years"),
        text::keyword("months"),
        text::keyword("weeks"),
        text::keyword("days"),
        text::keyword("hours"),
        text::keyword("minutes"),
        text::keyword("seconds"),
        text::keyword("milliseconds"),
    ))
    .to_slice()
    .map(|unit: &str| unit.to_string());

    let unit = choice((unit_keyword, quoted.clone())).boxed();

    // A quantity needs whitespace between the number and its unit.
    let quantity = padded!(
        choice((
            decimal_value,
            integer_value.map(Decimal::from),
        ))
        .then_ignore(text::whitespace().at_least(1))
        .then(unit)
        .map(|(value, unit)| Literal::Quantity(value, unit))
    );

    let datetime_literal = just('@')
        .ignore_then(date_format.clone())
        .then_ignore(just('T'))
        .then(time_format.clone())
        .then(timezone_format.clone().or_not())
        .try_map(|((date, time), tz), span| {
            let text = format!("{}T{}{}", date, time, tz.unwrap_or_default());
            PrecisionDateTime::parse(&text)
                .ok_or_else(|| Rich::custom(span, format!("Invalid datetime format: {}", text)))
                .map(Literal::DateTime)
        });

    let partial_datetime_literal = just('@')
        .ignore_then(date_format.clone())
        .then_ignore(just('T'))
        .try_map(|date, span| {
            let text = format!("{}T", date);
            PrecisionDateTime::parse(&text)
                .ok_or_else(|| Rich::custom(span, format!("Invalid partial datetime format: {}", text)))
                .map(Literal::DateTime)
        });

    let time_literal = just('@')
        .ignore_then(just('T').ignore_then(time_format).then(timezone_format.or_not()))
        .try_map(|(time, tz), span| {
            if tz.is_some() {
                return Err(Rich::custom(span, "Time literal cannot have a timezone offset"));
            }
            PrecisionTime::parse(&time)
                .ok_or_else(|| Rich::custom(span, format!("Invalid time format: {}", time)))
                .map(Literal::Time)
        });

    let date_literal = just('@').ignore_then(date_format).try_map(|date, span| {
        PrecisionDate::parse(&date)
            .ok_or_else(|| Rich::custom(span, format!("Invalid date format: {}", date)))
            .map(Literal::Date)
    });

    // Quantity before plain numbers, specific temporal forms before general ones.
    let literal = choice((
        padded!(null),
        padded!(boolean),
        padded!(string),
        quantity,
        number,
        integer,
        padded!(datetime_literal),
        padded!(partial_datetime_literal),
        padded!(time_literal),
        padded!(date_literal),
    ))
    .map(Term::Literal)
    .boxed();

    // IDENTIFIER: ([A-Za-z] | '_')([A-Za-z0-9] | '_')*
    let standard_identifier = any()
        .filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .then(
            any()
                .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_')
                .repeated(),
        )
        .to_slice()
        .map(|s: &str| s.to_string());

    // DELIMITEDIDENTIFIER: '`' (ESC | .)*? '`'
    let delimited_identifier = just('`')
        .ignore_then(none_of("`").or(esc).repeated().collect::<String>())
        .then_ignore(just('`'));

    let identifier = padded!(choice((standard_identifier, delimited_identifier))).boxed();

    let qualified_identifier = padded!(
        identifier
            .clone()
            .then(just('.').ignore_then(identifier.clone()).or_not())
            .map(|(first, second)| match second {
                Some(name) => TypeSpecifier::QualifiedIdentifier(
                    clean_backtick_identifier(&first),
                    Some(clean_backtick_identifier(&name)),
                ),
                None => TypeSpecifier::QualifiedIdentifier(clean_backtick_identifier(&first), None),
            })
    )
    .boxed();

    let external_constant = padded!(just('%').ignore_then(choice((identifier.clone(), quoted.clone()))))
        .map(Term::ExternalConstant)
        .boxed();

    recursive(|expr| {
        let arguments = expr
            .clone()
            .separated_by(padded!(just(',')))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(padded!(just('(')), padded!(just(')')))
            .boxed();

        let atom = choice((
            literal.clone().map_with(|term, e| spanned(ExprKind::Term(term), e.span())),
            external_constant
                .clone()
                .map_with(|term, e| spanned(ExprKind::Term(term), e.span())),
            identifier
                .clone()
                .then(arguments.clone())
                .map_with(|(name, args), e| {
                    spanned(
                        ExprKind::Term(Term::Invocation(Invocation::Function(name, args))),
                        e.span(),
                    )
                }),
            choice((
                padded!(just("$this")).to(Invocation::This),
                padded!(just("$index")).to(Invocation::Index),
                padded!(just("$total")).to(Invocation::Total),
                identifier.clone().map(Invocation::Member),
            ))
            .map_with(|invocation, e| spanned(ExprKind::Term(Term::Invocation(invocation)), e.span())),
            expr.clone()
                .delimited_by(padded!(just('(')), padded!(just(')')))
                .map_with(|inner: Expression, e| {
                    spanned(ExprKind::Term(Term::Parenthesized(Box::new(inner))), e.span())
                }),
        ))
        .boxed();

        let postfix = choice((
            padded!(just('.'))
                .ignore_then(identifier.clone().then(arguments.clone().or_not()))
                .map_with(|(name, args), e| {
                    let invocation = match args {
                        Some(args) => Invocation::Function(name, args),
                        None => Invocation::Member(name),
                    };
                    Postfix::Invoke(invocation, e.span().end)
                }),
            expr.clone()
                .delimited_by(padded!(just('[')), padded!(just(']')))
                .map_with(|index, e| Postfix::Index(index, e.span().end)),
        ))
        .boxed();

        let atom_with_postfix = atom
            .then(postfix.repeated().collect::<Vec<_>>())
            .map(|(left, ops)| {
                ops.into_iter().fold(left, |acc, op| {
                    let start = acc.span.start;
                    match op {
                        Postfix::Invoke(invocation, end) => {
                            Expression::new(ExprKind::Invocation(Box::new(acc), invocation), start..end)
                        }
                        Postfix::Index(index, end) => {
                            Expression::new(ExprKind::Indexer(Box::new(acc), Box::new(index)), start..end)
                        }
                    }
                })
            })
            .boxed();

        let prefix_op = padded!(choice((just('+').to('+'), just('-').to('-'))))
            .map_with(|op, e| (op, e.span().start));

        let term_with_polarity = prefix_op
            .repeated()
            .collect::<Vec<_>>()
            .then(atom_with_postfix)
            .map(|(ops, operand)| {
                ops.into_iter().rev().fold(operand, |acc, (op, start)| {
                    let end = acc.span.end;
                    Expression::new(ExprKind::Polarity(op, Box::new(acc)), start..end)
                })
            })
            .boxed();

        let op_mul = padded!(choice((
            just("*").to("*"),
            just("/").to("/"),
            text::keyword("div").to("div"),
            text::keyword("mod").to("mod"),
        )));
        let multiplicative = term_with_polarity
            .clone()
            .then(op_mul.then(term_with_polarity).repeated().collect::<Vec<_>>())
            .map(|(left, ops)| {
                ops.into_iter().fold(left, |acc, (op, right)| {
                    binary(acc, right, |l, r| ExprKind::Multiplicative(l, op.to_string(), r))
                })
            })
            .boxed();

        let op_add = padded!(choice((just('+').to("+"), just('-').to("-"), just('&').to("&"))));
        let additive = multiplicative
            .clone()
            .then(op_add.then(multiplicative).repeated().collect::<Vec<_>>())
            .map(|(left, ops)| {
                ops.into_iter().fold(left, |acc, (op, right)| {
                    binary(acc, right, |l, r| ExprKind::Additive(l, op.to_string(), r))
                })
            })
            .boxed();

        let union = additive
            .clone()
            .then(padded!(just('|')).ignore_then(additive).repeated().collect::<Vec<_>>())
            .map(|(left, rights)| {
                rights
                    .into_iter()
                    .fold(left, |acc, right| binary(acc, right, ExprKind::Union))
            })
            .boxed();

        let op_ineq = padded!(choice((
            just("<=").to("<="),
            just("<").to("<"),
            just(">=").to(">="),
            just(">").to(">"),
        )));
        let inequality = union
            .clone()
            .then(op_ineq.then(union).repeated().collect::<Vec<_>>())
            .map(|(left, ops)| {
                ops.into_iter().fold(left, |acc, (op, right)| {
                    binary(acc, right, |l, r| ExprKind::Inequality(l, op.to_string(), r))
                })
            })
            .boxed();

        let op_type = padded!(choice((text::keyword("is").to("is"), text::keyword("as").to("as"))));
        let type_expr = inequality
            .then(
                op_type
                    .then(qualified_identifier.clone().map_with(|spec, e| (spec, e.span().end)))
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(left, ops)| {
                ops.into_iter().fold(left, |acc, (op, (spec, end))| {
                    let start = acc.span.start;
                    Expression::new(ExprKind::Type(Box::new(acc), op.to_string(), spec), start..end)
                })
            })
            .boxed();

        let op_eq = padded!(choice((
            just("=").to("="),
            just("~").to("~"),
            just("!=").to("!="),
            just("!~").to("!~"),
        )));
        let equality = type_expr
            .clone()
            .then(op_eq.then(type_expr).repeated().collect::<Vec<_>>())
            .map(|(left, ops)| {
                ops.into_iter().fold(left, |acc, (op, right)| {
                    binary(acc, right, |l, r| ExprKind::Equality(l, op.to_string(), r))
                })
            })
            .boxed();

        let op_mem = padded!(choice((
            text::keyword("in").to("in"),
            text::keyword("contains").to("contains"),
        )));
        let membership = equality
            .clone()
            .then(op_mem.then(equality).repeated().collect::<Vec<_>>())
            .map(|(left, ops)| {
                ops.into_iter().fold(left, |acc, (op, right)| {
                    binary(acc, right, |l, r| ExprKind::Membership(l, op.to_string(), r))
                })
            })
            .boxed();

        let logical_and = membership
            .clone()
            .then(padded!(text::keyword("and")).ignore_then(membership).repeated().collect::<Vec<_>>())
            .map(|(left, rights)| {
                rights
                    .into_iter()
                    .fold(left, |acc, right| binary(acc, right, ExprKind::And))
            })
            .boxed();

        let op_or = padded!(choice((text::keyword("or").to("or"), text::keyword("xor").to("xor"))));
        let logical_or = logical_and
            .clone()
            .then(op_or.then(logical_and).repeated().collect::<Vec<_>>())
            .map(|(left, ops)| {
                ops.into_iter().fold(left, |acc, (op, right)| {
                    binary(acc, right, |l, r| ExprKind::Or(l, op.to_string(), r))
                })
            })
            .boxed();

        logical_or
            .clone()
            .then(padded!(text::keyword("implies")).ignore_then(logical_or).repeated().collect::<Vec<_>>())
            .map(|(left, rights)| {
                rights
                    .into_iter()
                    .fold(left, |acc, right| binary(acc, right, ExprKind::Implies))
            })
            .boxed()
    })
    .then_ignore(end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(source: &str) -> Expression {
        parse(source).unwrap().root
    }

    #[test]
    fn spans_cover_sub_expressions() {
        let parsed = parse("Patient.name.given.first() = 'Peter'").unwrap();
        let ExprKind::Equality(left, op, right) = &parsed.root.kind else {
            panic!("expected equality, got {:?}", parsed.root.kind);
        };
        assert_eq!(op, "=");
        assert_eq!(parsed.text(left), "Patient.name.given.first()");
        assert_eq!(parsed.text(right), "'Peter'");
        assert_eq!(left.syntax_kind(), SyntaxKind::FunctionCall);
        assert_eq!(left.function_name(), Some("first"));
    }

    #[test]
    fn precedence_binds_multiplication_tighter() {
        let expr = root("1 + 2 * 3");
        let ExprKind::Additive(_, op, right) = expr.kind else {
            panic!("expected additive");
        };
        assert_eq!(op, "+");
        assert_eq!(right.syntax_kind(), SyntaxKind::Multiplicative);
    }

    #[test]
    fn literals() {
        let literal = |source: &str| match root(source).kind {
            ExprKind::Term(Term::Literal(l)) => l,
            other => panic!("not a literal: {:?}", other),
        };
        assert_eq!(literal("42"), Literal::Integer(42));
        assert_eq!(literal("3.50"), Literal::Number(Decimal::new(350, 2)));
        assert_eq!(literal("'it\\'s'"), Literal::String("it's".into()));
        assert_eq!(literal("4 days"), Literal::Quantity(Decimal::from(4), "days".into()));
        assert_eq!(literal("2.5 'mg'"), Literal::Quantity(Decimal::new(25, 1), "mg".into()));
        assert!(matches!(literal("@2019"), Literal::Date(_)));
        assert!(matches!(literal("@2019-06-01T10:30:00Z"), Literal::DateTime(_)));
        assert!(matches!(literal("@2019-06T"), Literal::DateTime(_)));
        assert!(matches!(literal("@T14:30"), Literal::Time(_)));
        assert_eq!(literal("{}"), Literal::Null);
    }

    #[test]
    fn type_operators_and_constants() {
        let expr = root("%resource.value as FHIR.Quantity");
        let ExprKind::Type(left, op, spec) = &expr.kind else {
            panic!("expected type operation");
        };
        assert_eq!(op, "as");
        assert_eq!(spec.qualified_name(), "FHIR.Quantity");
        let ExprKind::Invocation(base, Invocation::Member(member)) = &left.kind else {
            panic!("expected member access");
        };
        assert_eq!(member, "value");
        assert_eq!(base.syntax_kind(), SyntaxKind::ExternalConstant);
        assert!(matches!(
            root("%`vs-observation-status`").kind,
            ExprKind::Term(Term::ExternalConstant(ref name)) if name == "vs-observation-status"
        ));
    }

    #[test]
    fn comments_and_parentheses() {
        let expr = root("(1 + 2) // trailing\n * 3");
        let ExprKind::Multiplicative(left, _, _) = expr.kind else {
            panic!("expected multiplicative");
        };
        assert_eq!(left.syntax_kind(), SyntaxKind::Parenthesized);
    }

    #[test]
    fn type_names_from_member_chains() {
        let expr = root("ofType(FHIR.Patient)");
        let ExprKind::Term(Term::Invocation(Invocation::Function(_, args))) = expr.kind else {
            panic!("expected function");
        };
        assert_eq!(args[0].as_type_name().as_deref(), Some("FHIR.Patient"));
    }

    #[test]
    fn syntax_errors_are_reported() {
        let err = parse("Patient.name.where(").unwrap_err();
        assert!(matches!(err, FhirPathError::Parse { .. }));
        assert!(parse("1 +").is_err());
    }
}
