//! Storage-condition compiler and interpreter.
//!
//! Authors describe client-state predicates as a flat list of
//! `(key, operator, value, datatype)` tuples. At render time the list is
//! *compiled* into a compact textual expression that travels inside the chain
//! payload; at view time the expression is *parsed* back into an [`Expr`] and
//! evaluated against a [`StorageReader`]. Nothing is ever executed as code:
//! the grammar is closed and tiny.
//!
//! ```text
//! expr   := "true" | "false" | clause ( "&&" clause )*
//! clause := "true" | "false" | datatype ":" op "(" json-string "," json-string ")"
//! op     := eq | ne | gt | lt | ge | le | contains
//!
//! [visits > 3, ref contains "news"]
//!     └─ compile ─▶ numeric:gt("visits","3") && string:contains("ref","news")
//!                        └─ parse ─▶ Expr ─ evaluate(reader) ─▶ bool
//! ```
//!
//! ## Evaluation rules
//!
//! - Clauses are AND-ed left to right. No clause has side effects, so an
//!   expression can be evaluated any number of times.
//! - An absent key fails every operator except `ne`, which succeeds.
//! - Coercion failures (non-numeric value, unparsable date, invalid pattern)
//!   fail the clause. They never panic and never surface as errors.
//! - An operator that the datatype does not support compiles to `false`.
//!
//! Only [`Expr::parse`] can fail: a corrupt payload is an evaluation fault and
//! callers treat it as "this candidate failed".

use crate::engine::storage::StorageReader;
use crate::model::{Datatype, Operator, StorageCondition};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::RegexBuilder;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Upper bound on the compiled size of author-supplied patterns.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Errors produced while parsing a compiled expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("empty condition expression")]
    Empty,
    #[error("unexpected end of expression at byte {0}")]
    UnexpectedEnd(usize),
    #[error("expected {expected} at byte {at}")]
    Expected { expected: &'static str, at: usize },
    #[error("unknown datatype `{0}`")]
    UnknownDatatype(String),
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),
    #[error("invalid string literal at byte {0}")]
    InvalidLiteral(usize),
}

/// Everything a clause may look at while evaluating.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub storage: &'a dyn StorageReader,
    /// Reference time for relative date literals such as `"7 days ago"`.
    pub now: DateTime<Utc>,
}

impl<'a> EvalContext<'a> {
    pub fn new(storage: &'a dyn StorageReader, now: DateTime<Utc>) -> Self {
        Self { storage, now }
    }
}

impl fmt::Debug for EvalContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext").field("storage", &"<reader>").field("now", &self.now).finish()
    }
}

/// A single predicate of a compiled expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    Const(bool),
    Compare { datatype: Datatype, op: Operator, key: String, literal: String },
}

/// A conjunction of clauses. An empty conjunction is `true`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expr {
    clauses: Vec<Clause>,
}

/// Compile an ordered list of storage conditions into an expression.
pub fn compile(conditions: &[StorageCondition]) -> Expr {
    let clauses = conditions
        .iter()
        .map(|c| {
            if c.datatype.allows(c.operator) {
                Clause::Compare {
                    datatype: c.datatype,
                    op: c.operator,
                    key: c.key.clone(),
                    literal: c.value.clone(),
                }
            } else {
                tracing::warn!(
                    key = %c.key,
                    datatype = c.datatype.name(),
                    operator = c.operator.mnemonic(),
                    "operator not supported for datatype, condition compiled to false"
                );
                Clause::Const(false)
            }
        })
        .collect();
    Expr { clauses }
}

impl Expr {
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// True when the expression can never fail (no clauses, or only `true`).
    pub fn is_unconditional(&self) -> bool {
        self.clauses.iter().all(|c| matches!(c, Clause::Const(true)))
    }

    /// Parse the textual form produced by `Display`.
    pub fn parse(src: &str) -> Result<Self, ConditionError> {
        if src.trim().is_empty() {
            return Err(ConditionError::Empty);
        }

        let mut cursor = Cursor { src, pos: 0 };
        let mut clauses = Vec::new();
        loop {
            cursor.skip_ws();
            clauses.push(cursor.clause()?);
            cursor.skip_ws();
            if cursor.at_end() {
                break;
            }
            cursor.expect("&&", "`&&`")?;
        }

        // A lone `true` is the canonical unconditional expression.
        if clauses == [Clause::Const(true)] {
            clauses.clear();
        }
        Ok(Expr { clauses })
    }

    /// Evaluate against client storage.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        let mut result = true;
        for clause in &self.clauses {
            // Evaluation is pure, so short-circuiting is only an optimization.
            if !eval_clause(clause, ctx) {
                result = false;
                break;
            }
        }
        result
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return f.write_str("true");
        }
        for (idx, clause) in self.clauses.iter().enumerate() {
            if idx > 0 {
                f.write_str(" && ")?;
            }
            match clause {
                Clause::Const(v) => write!(f, "{v}")?,
                Clause::Compare { datatype, op, key, literal } => {
                    write!(f, "{}:{}({},{})", datatype.name(), op.mnemonic(), json_string(key), json_string(literal))?
                }
            }
        }
        Ok(())
    }
}

fn json_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

// --- Parsing -----------------------------------------------------------------

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn expect(&mut self, token: &str, expected: &'static str) -> Result<(), ConditionError> {
        if self.at_end() {
            return Err(ConditionError::UnexpectedEnd(self.pos));
        }
        if self.rest().starts_with(token) {
            self.pos += token.len();
            Ok(())
        } else {
            Err(ConditionError::Expected { expected, at: self.pos })
        }
    }

    fn ident(&mut self) -> Result<&'a str, ConditionError> {
        let rest = self.rest();
        let len = rest.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).unwrap_or(rest.len());
        if len == 0 {
            return if rest.is_empty() {
                Err(ConditionError::UnexpectedEnd(self.pos))
            } else {
                Err(ConditionError::Expected { expected: "identifier", at: self.pos })
            };
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    /// Read one JSON string literal, delegating escapes to serde_json.
    fn literal(&mut self) -> Result<String, ConditionError> {
        self.skip_ws();
        let start = self.pos;
        if !self.rest().starts_with('"') {
            return Err(ConditionError::Expected { expected: "string literal", at: start });
        }
        let mut stream = serde_json::Deserializer::from_str(self.rest()).into_iter::<String>();
        match stream.next() {
            Some(Ok(value)) => {
                self.pos += stream.byte_offset();
                Ok(value)
            }
            _ => Err(ConditionError::InvalidLiteral(start)),
        }
    }

    fn clause(&mut self) -> Result<Clause, ConditionError> {
        let head = self.ident()?;
        match head {
            "true" => return Ok(Clause::Const(true)),
            "false" => return Ok(Clause::Const(false)),
            _ => {}
        }
        let datatype = Datatype::from_name(head).ok_or_else(|| ConditionError::UnknownDatatype(head.to_string()))?;
        self.expect(":", "`:`")?;
        let op_name = self.ident()?;
        let op = Operator::from_mnemonic(op_name).ok_or_else(|| ConditionError::UnknownOperator(op_name.to_string()))?;
        self.skip_ws();
        self.expect("(", "`(`")?;
        let key = self.literal()?;
        self.skip_ws();
        self.expect(",", "`,`")?;
        let literal = self.literal()?;
        self.skip_ws();
        self.expect(")", "`)`")?;

        if !datatype.allows(op) {
            return Ok(Clause::Const(false));
        }
        Ok(Clause::Compare { datatype, op, key, literal })
    }
}

// --- Evaluation --------------------------------------------------------------

fn eval_clause(clause: &Clause, ctx: &EvalContext<'_>) -> bool {
    let (datatype, op, key, literal) = match clause {
        Clause::Const(v) => return *v,
        Clause::Compare { datatype, op, key, literal } => (*datatype, *op, key, literal),
    };

    let Some(stored) = ctx.storage.read(key) else {
        return op == Operator::Ne;
    };

    let outcome = match datatype {
        Datatype::Numeric => compare_numeric(&stored, literal, op),
        Datatype::Boolean => compare_boolean(&stored, literal, op),
        Datatype::String => compare_string(&stored, literal, op),
        Datatype::Date => compare_date(&stored, literal, op, ctx.now),
        Datatype::Regex => compare_regex(&stored, literal, op),
    };

    tracing::trace!(key = %key, datatype = datatype.name(), op = op.mnemonic(), stored = %stored, outcome, "clause");
    outcome
}

fn relate(op: Operator, ord: Ordering) -> bool {
    match op {
        Operator::Eq => ord == Ordering::Equal,
        Operator::Ne => ord != Ordering::Equal,
        Operator::Gt => ord == Ordering::Greater,
        Operator::Lt => ord == Ordering::Less,
        Operator::Ge => ord != Ordering::Less,
        Operator::Le => ord != Ordering::Greater,
        Operator::Contains => false,
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let v: f64 = s.trim().parse().ok()?;
    v.is_finite().then_some(v)
}

fn compare_numeric(stored: &str, literal: &str, op: Operator) -> bool {
    match (parse_number(stored), parse_number(literal)) {
        (Some(a), Some(b)) => a.partial_cmp(&b).is_some_and(|ord| relate(op, ord)),
        _ => false,
    }
}

fn coerce_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn compare_boolean(stored: &str, literal: &str, op: Operator) -> bool {
    let (Some(a), Some(b)) = (coerce_bool(stored), coerce_bool(literal)) else {
        return false;
    };
    match op {
        Operator::Eq => a == b,
        Operator::Ne => a != b,
        _ => false,
    }
}

fn compare_string(stored: &str, literal: &str, op: Operator) -> bool {
    match op {
        Operator::Eq => stored == literal,
        Operator::Ne => stored != literal,
        Operator::Contains => stored.contains(literal),
        _ => false,
    }
}

/// Parse a timestamp in any of the accepted forms.
///
/// ```text
/// "1700000000000"            -> epoch milliseconds
/// "2024-05-01T10:00:00Z"     -> RFC 3339
/// "2024-05-01 10:00:00"      -> naive, taken as UTC
/// "2024-05-01"               -> midnight UTC
/// "3 days ago", "now"        -> relative to `now`
/// ```
///
/// Any digits-only value is epoch milliseconds: a seconds timestamp such as
/// `"1716206400"` or a bare year such as `"2024"` lands in January 1970.
///
/// Relative phrases whose amounts run to six digits or more are rejected
/// outright, so hostile stored values cannot push date arithmetic out of range.
pub fn parse_timestamp(s: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if regex!(r"^-?\d+$").is_match(s) {
        return s.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    if s.eq_ignore_ascii_case("now") {
        return Some(now);
    }
    if regex!(r"\d{6,}").is_match(s) {
        return None;
    }
    chrono_english::parse_date_string(s, now, chrono_english::Dialect::Us).ok()
}

fn compare_date(stored: &str, literal: &str, op: Operator, now: DateTime<Utc>) -> bool {
    match (parse_timestamp(stored, now), parse_timestamp(literal, now)) {
        (Some(a), Some(b)) => relate(op, a.cmp(&b)),
        _ => false,
    }
}

fn compare_regex(stored: &str, pattern: &str, op: Operator) -> bool {
    let re = match RegexBuilder::new(pattern).size_limit(REGEX_SIZE_LIMIT).build() {
        Ok(re) => re,
        Err(err) => {
            tracing::debug!(pattern, %err, "invalid pattern, condition fails");
            return false;
        }
    };
    match op {
        Operator::Eq => re.is_match(stored),
        Operator::Ne => !re.is_match(stored),
        _ => false,
    }
}

#[cfg(test)]
#[path = "tests/condition.rs"]
mod tests;
