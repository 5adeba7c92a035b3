//! Filter query language for subscription `where` clauses.
//!
//! A KQL subset:
//! - Field match: `event.a:x`, `event.a:"quoted value"`, `event.a:(x or y)`
//! - Existence: `event.a:*`
//! - Wildcards: `event.ref:refs/heads/*`
//! - Ranges: `event.count > 5`, `<`, `>=`, `<=` (numeric, else lexicographic)
//! - Logical: `and`, `or`, `not` (case-insensitive), parentheses
//!
//! Paths descend through arrays, and an array field matches when any
//! element matches. Missing fields never match and are not an error. An
//! empty query matches everything.

use serde_json::Value;

use crate::errors::QueryError;
use crate::traits::FilterEvaluator;

/// Deepest nesting of parentheses, value groups and `not` the parser accepts.
pub const MAX_NESTING: usize = 64;

/// Longest query, in tokens, the parser accepts.
pub const MAX_TOKENS: usize = 2048;

/// Parse and evaluate `query` against `data`.
pub fn evaluate(query: &str, data: &Value) -> Result<bool, QueryError> {
    Ok(Query::parse(query)?.matches(data))
}

/// Field paths referenced by `query`, in first-seen order, without
/// duplicates.
pub fn referenced_fields(query: &str) -> Result<Vec<String>, QueryError> {
    Ok(Query::parse(query)?.fields())
}

/// The default [`FilterEvaluator`], backed by this module.
#[derive(Debug, Default, Clone, Copy)]
pub struct KqlEvaluator;

impl FilterEvaluator for KqlEvaluator {
    fn evaluate(&self, query: &str, context: &Value) -> Result<bool, QueryError> {
        evaluate(query, context)
    }

    fn referenced_fields(&self, query: &str) -> Result<Vec<String>, QueryError> {
        referenced_fields(query)
    }
}

/// A parsed query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    expr: Option<Expr>,
}

impl Query {
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Ok(Self { expr: None });
        }
        let (expr, rest) = parse_or(&tokens, 0)?;
        if let Some(tok) = rest.first() {
            return Err(parse_err(format!("unexpected token: {tok:?}")));
        }
        Ok(Self { expr: Some(expr) })
    }

    pub fn matches(&self, data: &Value) -> bool {
        self.expr.as_ref().is_none_or(|e| e.eval(data))
    }

    pub fn fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(expr) = &self.expr {
            expr.collect_fields(&mut out);
        }
        out
    }
}

fn parse_err(message: impl Into<String>) -> QueryError {
    QueryError::Parse {
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),   // field name or unquoted value
    Quoted(String), // "quoted value"
    Colon,
    Gt,
    Lt,
    Ge,
    Le,
    LParen,
    RParen,
    And,
    Or,
    Not,
}

fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if tokens.len() >= MAX_TOKENS {
            return Err(parse_err(format!("query exceeds {MAX_TOKENS} tokens")));
        }
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '>' if peek(&chars, i + 1) == Some('=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '<' if peek(&chars, i + 1) == Some('=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '"' => {
                i += 1;
                let mut s = String::new();
                loop {
                    match peek(&chars, i) {
                        None => return Err(parse_err("unterminated string literal")),
                        Some('"') => break,
                        Some('\\') => {
                            let escaped = peek(&chars, i + 1)
                                .ok_or_else(|| parse_err("unterminated string literal"))?;
                            s.push(escaped);
                            i += 2;
                        }
                        Some(c) => {
                            s.push(c);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Quoted(s));
                i += 1; // closing quote
            }
            _ => {
                let start = i;
                while i < chars.len() && !is_delimiter(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Word(word),
                };
                tokens.push(token);
            }
        }
    }
    Ok(tokens)
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, ':' | '(' | ')' | '<' | '>' | '"')
}

fn peek(chars: &[char], idx: usize) -> Option<char> {
    chars.get(idx).copied()
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Match { field: String, value: ValueMatch },
    Range { field: String, op: RangeOp, bound: String },
}

#[derive(Debug, Clone, PartialEq)]
enum ValueMatch {
    Exists,
    Exact(String),
    Wildcard(String),
    AnyOf(Vec<ValueMatch>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RangeOp {
    Gt,
    Lt,
    Ge,
    Le,
}

// ---------------------------------------------------------------------------
// Recursive descent parser. Precedence: not > and > or
// ---------------------------------------------------------------------------

type ParseResult<'a, T> = Result<(T, &'a [Token]), QueryError>;

fn descend(depth: usize) -> Result<usize, QueryError> {
    if depth >= MAX_NESTING {
        return Err(parse_err(format!(
            "query nests deeper than {MAX_NESTING} levels"
        )));
    }
    Ok(depth + 1)
}

/// or_expr = and_expr ( "or" and_expr )*
fn parse_or(tokens: &[Token], depth: usize) -> ParseResult<'_, Expr> {
    let (mut left, mut rest) = parse_and(tokens, depth)?;
    while rest.first() == Some(&Token::Or) {
        let (right, r) = parse_and(&rest[1..], depth)?;
        left = Expr::Or(Box::new(left), Box::new(right));
        rest = r;
    }
    Ok((left, rest))
}

/// and_expr = not_expr ( "and" not_expr )*
fn parse_and(tokens: &[Token], depth: usize) -> ParseResult<'_, Expr> {
    let (mut left, mut rest) = parse_not(tokens, depth)?;
    while rest.first() == Some(&Token::And) {
        let (right, r) = parse_not(&rest[1..], depth)?;
        left = Expr::And(Box::new(left), Box::new(right));
        rest = r;
    }
    Ok((left, rest))
}

/// not_expr = "not" not_expr | primary
fn parse_not(tokens: &[Token], depth: usize) -> ParseResult<'_, Expr> {
    if tokens.first() == Some(&Token::Not) {
        let (inner, rest) = parse_not(&tokens[1..], descend(depth)?)?;
        return Ok((Expr::Not(Box::new(inner)), rest));
    }
    parse_primary(tokens, depth)
}

/// primary = "(" or_expr ")" | field ":" value | field range_op bound
fn parse_primary(tokens: &[Token], depth: usize) -> ParseResult<'_, Expr> {
    let Some(first) = tokens.first() else {
        return Err(parse_err("unexpected end of query"));
    };
    match first {
        Token::LParen => {
            let (inner, rest) = parse_or(&tokens[1..], descend(depth)?)?;
            match rest.first() {
                Some(Token::RParen) => Ok((inner, &rest[1..])),
                _ => Err(parse_err("missing closing parenthesis")),
            }
        }
        Token::Word(field) => {
            let field = field.clone();
            let rest = &tokens[1..];
            let op = match rest.first() {
                Some(Token::Colon) => {
                    let (value, rest) = parse_value(&rest[1..], depth)?;
                    return Ok((Expr::Match { field, value }, rest));
                }
                Some(Token::Gt) => RangeOp::Gt,
                Some(Token::Lt) => RangeOp::Lt,
                Some(Token::Ge) => RangeOp::Ge,
                Some(Token::Le) => RangeOp::Le,
                _ => {
                    return Err(parse_err(format!(
                        "expected ':' or a comparison after field {field}"
                    )));
                }
            };
            match rest.get(1) {
                Some(Token::Word(b) | Token::Quoted(b)) => Ok((
                    Expr::Range {
                        field,
                        op,
                        bound: b.clone(),
                    },
                    &rest[2..],
                )),
                _ => Err(parse_err(format!("expected a value to compare {field} with"))),
            }
        }
        other => Err(parse_err(format!("expected field, got {other:?}"))),
    }
}

/// value = Quoted | Word | "(" value ( "or" value )* ")"
fn parse_value(tokens: &[Token], depth: usize) -> ParseResult<'_, ValueMatch> {
    match tokens.first() {
        Some(Token::Quoted(s)) => Ok((ValueMatch::Exact(s.clone()), &tokens[1..])),
        Some(Token::Word(w)) if w == "*" => Ok((ValueMatch::Exists, &tokens[1..])),
        Some(Token::Word(w)) if w.contains('*') => {
            Ok((ValueMatch::Wildcard(w.clone()), &tokens[1..]))
        }
        Some(Token::Word(w)) => Ok((ValueMatch::Exact(w.clone()), &tokens[1..])),
        Some(Token::LParen) => {
            let depth = descend(depth)?;
            let mut options = Vec::new();
            let mut rest = &tokens[1..];
            loop {
                let (value, r) = parse_value(rest, depth)?;
                options.push(value);
                match r.first() {
                    Some(Token::Or) => rest = &r[1..],
                    Some(Token::RParen) => return Ok((ValueMatch::AnyOf(options), &r[1..])),
                    _ => return Err(parse_err("expected 'or' or ')' in value list")),
                }
            }
        }
        Some(other) => Err(parse_err(format!("expected value, got {other:?}"))),
        None => Err(parse_err("expected value after ':'")),
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

impl Expr {
    fn eval(&self, data: &Value) -> bool {
        match self {
            Self::And(l, r) => l.eval(data) && r.eval(data),
            Self::Or(l, r) => l.eval(data) || r.eval(data),
            Self::Not(inner) => !inner.eval(data),
            Self::Match { field, value } => lookup(data, field)
                .into_iter()
                .any(|v| value.matches(v)),
            Self::Range { field, op, bound } => lookup(data, field)
                .into_iter()
                .any(|v| compare(v, *op, bound)),
        }
    }

    fn collect_fields(&self, out: &mut Vec<String>) {
        match self {
            Self::And(l, r) | Self::Or(l, r) => {
                l.collect_fields(out);
                r.collect_fields(out);
            }
            Self::Not(inner) => inner.collect_fields(out),
            Self::Match { field, .. } | Self::Range { field, .. } => {
                if !out.contains(field) {
                    out.push(field.clone());
                }
            }
        }
    }
}

impl ValueMatch {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Exists => !value.is_null(),
            Self::Exact(expected) => match value {
                Value::String(s) => s == expected,
                Value::Number(n) => match (n.as_f64(), expected.parse::<f64>()) {
                    (Some(l), Ok(r)) => (l - r).abs() < f64::EPSILON,
                    _ => false,
                },
                Value::Bool(b) => expected.eq_ignore_ascii_case(if *b { "true" } else { "false" }),
                _ => false,
            },
            Self::Wildcard(pattern) => match value {
                Value::String(s) => wildcard_match(pattern, s),
                Value::Number(n) => wildcard_match(pattern, &n.to_string()),
                _ => false,
            },
            Self::AnyOf(options) => options.iter().any(|o| o.matches(value)),
        }
    }
}

/// Collect every value at `path`. Arrays are flattened at each step so
/// `labels.name` reaches the `name` of every element.
fn lookup<'a>(data: &'a Value, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    collect(data, &segments, &mut out);
    out
}

fn collect<'a>(current: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    if let Value::Array(items) = current {
        for item in items {
            collect(item, segments, out);
        }
        return;
    }
    let Some((head, tail)) = segments.split_first() else {
        out.push(current);
        return;
    };
    if let Some(next) = current.get(*head) {
        collect(next, tail, out);
    }
}

fn compare(value: &Value, op: RangeOp, bound: &str) -> bool {
    if let (Some(l), Ok(r)) = (value.as_f64(), bound.parse::<f64>()) {
        return match op {
            RangeOp::Gt => l > r,
            RangeOp::Lt => l < r,
            RangeOp::Ge => l >= r,
            RangeOp::Le => l <= r,
        };
    }
    // Lexicographic for strings, which orders ISO-8601 timestamps correctly.
    if let Value::String(l) = value {
        let l = l.as_str();
        return match op {
            RangeOp::Gt => l > bound,
            RangeOp::Lt => l < bound,
            RangeOp::Ge => l >= bound,
            RangeOp::Le => l <= bound,
        };
    }
    false
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let [first, middle @ .., last] = parts.as_slice() else {
        return pattern == text;
    };
    if !text.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    for part in middle {
        match text[pos..].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false,
        }
    }
    text.len() >= pos + last.len() && text[pos..].ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "event": {
                "a": "x",
                "count": 7,
                "ratio": 1.0,
                "draft": false,
                "ref": "refs/heads/main",
                "labels": [{"name": "bug"}, {"name": "p1"}],
                "tags": ["alpha", "beta"],
                "created": "2024-03-01T10:00:00Z",
                "nothing": null
            }
        })
    }

    #[test]
    fn test_field_equality() {
        assert!(evaluate(r#"event.a:"x""#, &ctx()).unwrap());
        assert!(evaluate("event.a:x", &ctx()).unwrap());
        assert!(!evaluate(r#"event.a:"y""#, &ctx()).unwrap());
    }

    #[test]
    fn test_numeric_and_bool_values() {
        assert!(evaluate("event.count:7", &ctx()).unwrap());
        assert!(evaluate("event.ratio:1", &ctx()).unwrap());
        assert!(evaluate("event.draft:false", &ctx()).unwrap());
        assert!(!evaluate("event.draft:true", &ctx()).unwrap());
    }

    #[test]
    fn test_ranges() {
        assert!(evaluate("event.count > 5", &ctx()).unwrap());
        assert!(evaluate("event.count >= 7", &ctx()).unwrap());
        assert!(!evaluate("event.count < 7", &ctx()).unwrap());
        assert!(evaluate("event.count <= 7", &ctx()).unwrap());
        assert!(evaluate(r#"event.created > "2024-01-01""#, &ctx()).unwrap());
    }

    #[test]
    fn test_exists_and_missing() {
        assert!(evaluate("event.a:*", &ctx()).unwrap());
        assert!(!evaluate("event.nothing:*", &ctx()).unwrap());
        assert!(!evaluate("event.missing:*", &ctx()).unwrap());
        assert!(!evaluate("event.missing:x", &ctx()).unwrap());
        assert!(!evaluate("event.missing > 1", &ctx()).unwrap());
    }

    #[test]
    fn test_wildcard() {
        assert!(evaluate("event.ref:refs/heads/*", &ctx()).unwrap());
        assert!(evaluate("event.ref:*main", &ctx()).unwrap());
        assert!(evaluate("event.ref:refs*ma*", &ctx()).unwrap());
        assert!(!evaluate("event.ref:refs/tags/*", &ctx()).unwrap());
        // quoted asterisks are literal
        assert!(!evaluate(r#"event.ref:"refs/heads/*""#, &ctx()).unwrap());
    }

    #[test]
    fn test_arrays_match_any_element() {
        assert!(evaluate("event.tags:beta", &ctx()).unwrap());
        assert!(evaluate("event.labels.name:p1", &ctx()).unwrap());
        assert!(!evaluate("event.labels.name:p2", &ctx()).unwrap());
    }

    #[test]
    fn test_logical_operators() {
        assert!(evaluate("event.a:x and event.count > 1", &ctx()).unwrap());
        assert!(!evaluate("event.a:x AND event.count > 10", &ctx()).unwrap());
        assert!(evaluate("event.a:y or event.count:7", &ctx()).unwrap());
        assert!(evaluate("not event.a:y", &ctx()).unwrap());
        assert!(evaluate("NOT (event.a:y or event.draft:true)", &ctx()).unwrap());
    }

    #[test]
    fn test_precedence() {
        // and binds tighter than or
        assert!(evaluate("event.a:y and event.a:z or event.a:x", &ctx()).unwrap());
        assert!(!evaluate("event.a:y and (event.a:z or event.a:x)", &ctx()).unwrap());
    }

    #[test]
    fn test_value_group() {
        assert!(evaluate("event.a:(y or x)", &ctx()).unwrap());
        assert!(!evaluate(r#"event.a:("y" or z)"#, &ctx()).unwrap());
    }

    #[test]
    fn test_empty_query_matches_all() {
        assert!(evaluate("", &ctx()).unwrap());
        assert!(evaluate("   ", &json!(null)).unwrap());
        assert!(referenced_fields("").unwrap().is_empty());
    }

    #[test]
    fn test_referenced_fields() {
        let fields =
            referenced_fields("event.a:x and (event.count > 1 or not event.a:y)").unwrap();
        assert_eq!(fields, vec!["event.a", "event.count"]);
    }

    #[test]
    fn test_syntax_errors() {
        for bad in [
            "event.a",
            "event.a:",
            "(event.a:x",
            "event.a:x and",
            ":x",
            "event.a >",
            r#"event.a:"open"#,
            "event.a:(x and y)",
        ] {
            assert!(evaluate(bad, &ctx()).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_nesting_limit() {
        let ok = format!("{}event.a:x{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(evaluate(&ok, &ctx()).unwrap());

        let too_deep = MAX_NESTING + 1;
        let deep = format!("{}event.a:x{}", "(".repeat(too_deep), ")".repeat(too_deep));
        assert!(matches!(
            evaluate(&deep, &ctx()),
            Err(QueryError::Parse { .. })
        ));

        let nots = format!("{}event.a:x", "not ".repeat(too_deep));
        assert!(evaluate(&nots, &ctx()).is_err());

        let group = format!("event.a:{}x{}", "(".repeat(too_deep), ")".repeat(too_deep));
        assert!(evaluate(&group, &ctx()).is_err());
    }

    #[test]
    fn test_oversized_input_is_rejected() {
        // deep enough to overflow the stack without the limits
        let parens = format!("event.a:{}", "(".repeat(200_000));
        assert!(matches!(
            evaluate(&parens, &ctx()),
            Err(QueryError::Parse { .. })
        ));

        let chain = vec!["event.a:x"; MAX_TOKENS].join(" and ");
        let err = referenced_fields(&chain).unwrap_err();
        assert!(err.to_string().contains("tokens"));
    }

    #[test]
    fn test_escaped_quote() {
        let data = json!({"msg": "say \"hi\""});
        assert!(evaluate(r#"msg:"say \"hi\"""#, &data).unwrap());
    }
}
