//! Where clauses.

use super::path::ValuePath;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a where clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Equal,
    /// `!=` or `<>`
    NotEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
}

impl Operator {
    /// Canonical textual form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
        }
    }

    /// Returns true for the ordering operators.
    #[must_use]
    pub const fn is_ordering(self) -> bool {
        matches!(
            self,
            Self::Greater | Self::GreaterOrEqual | Self::Less | Self::LessOrEqual
        )
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Equal => ordering == Ordering::Equal,
            Self::NotEqual => ordering != Ordering::Equal,
            Self::Greater => ordering == Ordering::Greater,
            Self::GreaterOrEqual => ordering != Ordering::Less,
            Self::Less => ordering == Ordering::Less,
            Self::LessOrEqual => ordering != Ordering::Greater,
        }
    }
}

impl FromStr for Operator {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "=" | "==" => Ok(Self::Equal),
            "!=" | "<>" => Ok(Self::NotEqual),
            ">" => Ok(Self::Greater),
            ">=" => Ok(Self::GreaterOrEqual),
            "<" => Ok(Self::Less),
            "<=" => Ok(Self::LessOrEqual),
            other => Err(CoreError::invalid_query(format!(
                "unknown operator '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combination tag carried by a clause.
///
/// The tag round-trips through encoding but does not change evaluation:
/// every clause of a query must match, whatever its tag says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BooleanOp {
    /// Logical AND.
    #[default]
    And,
    /// Logical OR. Reserved; evaluated like `And`.
    Or,
}

impl BooleanOp {
    /// Textual form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

impl FromStr for BooleanOp {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            other => Err(CoreError::invalid_query(format!(
                "unknown boolean operator '{other}'"
            ))),
        }
    }
}

/// A predicate over entity data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawClause", into = "RawClause")]
pub enum WhereClause {
    /// Compares the value at `path` with a constant.
    Basic {
        /// Where to look in the document.
        path: ValuePath,
        /// Comparison.
        operator: Operator,
        /// Constant to compare against.
        value: Value,
        /// Combination with preceding clauses.
        boolean: BooleanOp,
    },
}

impl WhereClause {
    /// Builds a basic clause from typed parts.
    #[must_use]
    pub fn basic(path: ValuePath, operator: Operator, value: Value) -> Self {
        Self::Basic {
            path,
            operator,
            value,
            boolean: BooleanOp::And,
        }
    }

    /// Builds a basic clause from a textual path and operator.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for an empty path step or an unknown operator.
    pub fn parse(path: &str, operator: &str, value: Value) -> CoreResult<Self> {
        Ok(Self::basic(
            ValuePath::parse(path)?,
            operator.parse()?,
            value,
        ))
    }

    /// Replaces the combination tag.
    #[must_use]
    pub fn with_boolean(self, tag: BooleanOp) -> Self {
        match self {
            Self::Basic {
                path,
                operator,
                value,
                ..
            } => Self::Basic {
                path,
                operator,
                value,
                boolean: tag,
            },
        }
    }

    /// Evaluates the clause against entity data. The combination tag is not
    /// consulted.
    #[must_use]
    pub fn matches(&self, data: &Value) -> bool {
        match self {
            Self::Basic {
                path,
                operator,
                value,
                ..
            } => compare(path.resolve(data), *operator, value),
        }
    }
}

/// Compares an extracted value with a clause constant.
///
/// Numbers compare by value. Ordering operators against a numeric constant
/// never match a non-numeric value; other orderings compare string forms.
fn compare(extracted: &Value, operator: Operator, constant: &Value) -> bool {
    if let (Some(a), Some(b)) = (extracted.as_f64(), constant.as_f64()) {
        return a.partial_cmp(&b).is_some_and(|ord| operator.accepts(ord));
    }

    if !operator.is_ordering() {
        let equal = values_equal(extracted, constant);
        return match operator {
            Operator::Equal => equal,
            _ => !equal,
        };
    }

    if constant.is_number() {
        return false;
    }

    operator.accepts(string_form(extracted).cmp(&string_form(constant)))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Serialize, Deserialize)]
struct RawClause {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    operator: String,
    #[serde(default)]
    value: Value,
    #[serde(default = "default_boolean")]
    boolean: String,
}

fn default_boolean() -> String {
    BooleanOp::And.as_str().to_string()
}

impl TryFrom<RawClause> for WhereClause {
    type Error = CoreError;

    fn try_from(raw: RawClause) -> CoreResult<Self> {
        match raw.kind.as_str() {
            "Basic" => Ok(Self::Basic {
                path: ValuePath::parse(&raw.path)?,
                operator: raw.operator.parse()?,
                value: raw.value,
                boolean: raw.boolean.parse()?,
            }),
            other => Err(CoreError::invalid_query(format!(
                "unknown where clause type '{other}'"
            ))),
        }
    }
}

impl From<WhereClause> for RawClause {
    fn from(clause: WhereClause) -> Self {
        match clause {
            WhereClause::Basic {
                path,
                operator,
                value,
                boolean,
            } => Self {
                kind: "Basic".to_string(),
                path: path.as_str().to_string(),
                operator: operator.as_str().to_string(),
                value,
                boolean: boolean.as_str().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clause(path: &str, op: &str, value: Value) -> WhereClause {
        WhereClause::parse(path, op, value).unwrap()
    }

    #[test]
    fn equality_on_strings() {
        let doc = json!({ "Name": "John" });
        assert!(clause("Name", "=", json!("John")).matches(&doc));
        assert!(!clause("Name", "=", json!("Peter")).matches(&doc));
        assert!(clause("Name", "<>", json!("Peter")).matches(&doc));
    }

    #[test]
    fn numbers_compare_by_value() {
        let doc = json!({ "score": 42 });
        assert!(clause("score", "=", json!(42.0)).matches(&doc));
        assert!(clause("score", ">=", json!(42)).matches(&doc));
        assert!(!clause("score", "!=", json!(42.0)).matches(&doc));
    }

    #[test]
    fn nested_numeric_ordering() {
        let low = json!({ "Foo": { "Bar": 42 } });
        let high = json!({ "Foo": { "Bar": 80 } });
        for path in ["Foo.Bar", "Foo->Bar"] {
            let c = clause(path, "<", json!(50));
            assert!(c.matches(&low));
            assert!(!c.matches(&high));
        }
    }

    #[test]
    fn numeric_constant_never_matches_non_numbers() {
        let doc = json!({ "level": "9" });
        assert!(!clause("level", "<", json!(50)).matches(&doc));
        assert!(!clause("level", ">", json!(1)).matches(&doc));
        assert!(!clause("missing", "<", json!(1)).matches(&doc));
    }

    #[test]
    fn lexicographic_ordering_for_non_numeric_constants() {
        let doc = json!({ "name": "banana" });
        assert!(clause("name", ">", json!("apple")).matches(&doc));
        assert!(clause("name", "<", json!("cherry")).matches(&doc));
        // numbers fall back to their JSON text against a string constant
        assert!(clause("n", "<", json!("5")).matches(&json!({ "n": 10 })));
    }

    #[test]
    fn structural_equality() {
        let doc = json!({ "tags": [1, "a", { "x": 2.0 }] });
        assert!(clause("tags", "=", json!([1.0, "a", { "x": 2 }])).matches(&doc));
        assert!(clause("missing", "=", Value::Null).matches(&doc));
    }

    #[test]
    fn decode_rejects_unknown_tags() {
        let bad_type = json!({ "type": "Nested", "path": "a", "operator": "=", "value": 1 });
        assert!(serde_json::from_value::<WhereClause>(bad_type).is_err());

        let bad_op = json!({ "type": "Basic", "path": "a", "operator": "~", "value": 1 });
        assert!(serde_json::from_value::<WhereClause>(bad_op).is_err());

        let bad_boolean = json!({
            "type": "Basic", "path": "a", "operator": "=", "value": 1, "boolean": "xor"
        });
        assert!(serde_json::from_value::<WhereClause>(bad_boolean).is_err());
    }

    #[test]
    fn or_tag_is_carried_without_effect() {
        assert_eq!("OR".parse::<BooleanOp>().unwrap(), BooleanOp::Or);
        assert_eq!("AND".parse::<BooleanOp>().unwrap(), BooleanOp::And);

        let raw = json!({
            "type": "Basic", "path": "a", "operator": "=", "value": 1, "boolean": "or"
        });
        let decoded: WhereClause = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&decoded).unwrap(), raw);
        assert!(decoded.matches(&json!({ "a": 1 })));
        assert!(!decoded.matches(&json!({ "a": 2 })));
    }

    #[test]
    fn json_form() {
        let c = clause("Foo->Bar", "<>", json!("x"));
        let value = serde_json::to_value(&c).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "Basic",
                "path": "Foo->Bar",
                "operator": "!=",
                "value": "x",
                "boolean": "and"
            })
        );
        let back: WhereClause = serde_json::from_value(value).unwrap();
        assert_eq!(back, c);
    }
}
