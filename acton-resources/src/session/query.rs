//! Query, filter and pagination types for session queries
//!
//! An [`EntityQuery`] describes which rows of one entity table a session should
//! return: a conjunction of [`FilterCondition`]s, an optional relation scope
//! (only members of one parent's relation collection), ordering and
//! pagination. Sessions translate it to their native query language; the
//! in-memory store evaluates it directly with [`FilterCondition::matches`].
//!
//! # Example
//!
//! ```rust
//! use acton_resources::session::{EntityQuery, FilterCondition, OrderDirection, Pagination};
//!
//! let query = EntityQuery::new()
//!     .filter(FilterCondition::eq("status", "active"))
//!     .filter(FilterCondition::gte("age", 18))
//!     .order_by("created_at", OrderDirection::Descending)
//!     .paginate(Pagination::page(2, 20));
//!
//! assert_eq!(query.filters.len(), 2);
//! assert_eq!(query.pagination, Some(Pagination::new(20, 20)));
//! ```

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use serde_json::Value;

use crate::serialization::Document;

/// Direction for ordering results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// Pagination parameters for limiting query results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Number of results to skip
    pub offset: u64,
    /// Maximum number of results to return
    pub limit: u64,
}

impl Pagination {
    /// Create new pagination parameters
    #[must_use]
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Create pagination for a specific page number (1-indexed)
    ///
    /// ```rust
    /// use acton_resources::session::Pagination;
    ///
    /// let page3 = Pagination::page(3, 20);
    /// assert_eq!(page3.offset, 40);
    /// ```
    #[must_use]
    pub const fn page(page_number: u64, page_size: u64) -> Self {
        let offset = page_number.saturating_sub(1) * page_size;
        Self {
            offset,
            limit: page_size,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
        }
    }
}

/// Comparison operators for filter conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equal to (=)
    Equal,
    /// Not equal to (!=)
    NotEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal to (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal to (<=)
    LessThanOrEqual,
    /// Pattern matching (LIKE, `%` and `_` wildcards)
    Like,
    /// Value is in a list (IN)
    In,
    /// Value is null or absent (IS NULL)
    IsNull,
    /// Value is present and not null (IS NOT NULL)
    IsNotNull,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::NotEqual => write!(f, "!="),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanOrEqual => write!(f, ">="),
            Self::LessThan => write!(f, "<"),
            Self::LessThanOrEqual => write!(f, "<="),
            Self::Like => write!(f, "LIKE"),
            Self::In => write!(f, "IN"),
            Self::IsNull => write!(f, "IS NULL"),
            Self::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// A value that can be used in filter conditions
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// String value
    String(String),
    /// 64-bit integer value
    Integer(i64),
    /// 64-bit floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// List of string values (for IN operator)
    StringList(Vec<String>),
    /// List of integer values (for IN operator)
    IntegerList(Vec<i64>),
    /// Null value (for IS NULL / IS NOT NULL)
    Null,
}

impl FilterValue {
    /// Infer a typed value from raw query-string text
    ///
    /// ```rust
    /// use acton_resources::session::FilterValue;
    ///
    /// assert_eq!(FilterValue::infer("42"), FilterValue::Integer(42));
    /// assert_eq!(FilterValue::infer("true"), FilterValue::Boolean(true));
    /// assert_eq!(FilterValue::infer("alice"), FilterValue::String("alice".into()));
    /// ```
    pub fn infer(raw: &str) -> Self {
        if let Ok(n) = raw.parse::<i64>() {
            return Self::Integer(n);
        }
        if let Ok(n) = raw.parse::<f64>() {
            if n.is_finite() {
                return Self::Float(n);
            }
        }
        match raw {
            "true" => Self::Boolean(true),
            "false" => Self::Boolean(false),
            "null" => Self::Null,
            _ => Self::String(raw.to_string()),
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Integer(n) => Some(n.to_string()),
            Self::Float(n) => Some(n.to_string()),
            Self::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for FilterValue {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(list: Vec<String>) -> Self {
        Self::StringList(list)
    }
}

impl From<Vec<i64>> for FilterValue {
    fn from(list: Vec<i64>) -> Self {
        Self::IntegerList(list)
    }
}

/// A single filter condition on one document field
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    /// The field name to filter on
    pub field: String,
    /// The comparison operator
    pub operator: FilterOperator,
    /// The value to compare against
    pub value: FilterValue,
}

impl FilterCondition {
    /// Create a new filter condition
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Create an equality filter (field = value)
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::Equal, value.into())
    }

    /// Create a not-equal filter (field != value)
    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::NotEqual, value.into())
    }

    /// Create a greater-than filter (field > value)
    pub fn gt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::GreaterThan, value.into())
    }

    /// Create a greater-than-or-equal filter (field >= value)
    pub fn gte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::GreaterThanOrEqual, value.into())
    }

    /// Create a less-than filter (field < value)
    pub fn lt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::LessThan, value.into())
    }

    /// Create a less-than-or-equal filter (field <= value)
    pub fn lte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::LessThanOrEqual, value.into())
    }

    /// Create a LIKE pattern filter
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Like, FilterValue::String(pattern.into()))
    }

    /// Create an IN list filter for strings
    pub fn in_strings(field: impl Into<String>, values: Vec<String>) -> Self {
        Self::new(field, FilterOperator::In, FilterValue::StringList(values))
    }

    /// Create an IN list filter for integers
    pub fn in_integers(field: impl Into<String>, values: Vec<i64>) -> Self {
        Self::new(field, FilterOperator::In, FilterValue::IntegerList(values))
    }

    /// Create an IS NULL filter
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNull, FilterValue::Null)
    }

    /// Create an IS NOT NULL filter
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNotNull, FilterValue::Null)
    }

    /// Evaluate the condition against a dumped entity document
    ///
    /// Comparisons between mismatched types never match, except that numbers
    /// and numeric strings compare numerically.
    ///
    /// ```rust
    /// use acton_resources::session::FilterCondition;
    /// use serde_json::json;
    ///
    /// let doc = json!({"name": "Alice", "age": 31}).as_object().cloned().unwrap();
    /// assert!(FilterCondition::gte("age", 18).matches(&doc));
    /// assert!(FilterCondition::like("name", "Al%").matches(&doc));
    /// assert!(FilterCondition::is_null("deleted_at").matches(&doc));
    /// ```
    pub fn matches(&self, document: &Document) -> bool {
        let field = document.get(&self.field).filter(|v| !v.is_null());

        match self.operator {
            FilterOperator::IsNull => field.is_none(),
            FilterOperator::IsNotNull => field.is_some(),
            _ => {
                let Some(actual) = field else {
                    return false;
                };
                match self.operator {
                    FilterOperator::Equal => compare(actual, &self.value) == Some(Ordering::Equal),
                    FilterOperator::NotEqual => {
                        compare(actual, &self.value) != Some(Ordering::Equal)
                    }
                    FilterOperator::GreaterThan => {
                        compare(actual, &self.value) == Some(Ordering::Greater)
                    }
                    FilterOperator::GreaterThanOrEqual => matches!(
                        compare(actual, &self.value),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    FilterOperator::LessThan => compare(actual, &self.value) == Some(Ordering::Less),
                    FilterOperator::LessThanOrEqual => matches!(
                        compare(actual, &self.value),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                    FilterOperator::Like => like(actual, &self.value),
                    FilterOperator::In => match &self.value {
                        FilterValue::StringList(items) => items.iter().any(|item| {
                            compare(actual, &FilterValue::String(item.clone()))
                                == Some(Ordering::Equal)
                        }),
                        FilterValue::IntegerList(items) => items.iter().any(|item| {
                            compare(actual, &FilterValue::Integer(*item)) == Some(Ordering::Equal)
                        }),
                        other => compare(actual, other) == Some(Ordering::Equal),
                    },
                    FilterOperator::IsNull | FilterOperator::IsNotNull => false,
                }
            }
        }
    }
}

fn compare(actual: &Value, expected: &FilterValue) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(n), FilterValue::Integer(e)) => n.as_f64()?.partial_cmp(&(*e as f64)),
        (Value::Number(n), FilterValue::Float(e)) => n.as_f64()?.partial_cmp(e),
        (Value::Number(n), FilterValue::String(e)) => n.as_f64()?.partial_cmp(&e.parse::<f64>().ok()?),
        (Value::String(s), FilterValue::String(e)) => Some(s.as_str().cmp(e.as_str())),
        (Value::String(s), FilterValue::Integer(_) | FilterValue::Float(_)) => {
            let e = expected.as_text()?.parse::<f64>().ok()?;
            s.parse::<f64>().ok()?.partial_cmp(&e)
        }
        (Value::String(s), FilterValue::Boolean(_)) => {
            Some(s.as_str().cmp(expected.as_text()?.as_str()))
        }
        (Value::Bool(b), FilterValue::Boolean(e)) => Some(b.cmp(e)),
        _ => None,
    }
}

fn like(actual: &Value, pattern: &FilterValue) -> bool {
    let (Value::String(text), Some(pattern)) = (actual, pattern.as_text()) else {
        return false;
    };
    let mut expression = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => expression.push_str(".*"),
            '_' => expression.push('.'),
            c => expression.push_str(&regex::escape(&c.to_string())),
        }
    }
    expression.push('$');
    Regex::new(&expression).is_ok_and(|re| re.is_match(text))
}

/// Ordering of two document values for `ORDER BY`
///
/// Nulls sort first; values of different JSON types compare by type rank.
pub fn order_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Restricts a query to the members of one parent's relation collection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationScope {
    /// Entity name of the parent
    pub parent: &'static str,
    /// Name of the relation on the parent
    pub relation: &'static str,
    /// Primary key of the parent, in text form
    pub parent_key: String,
}

impl RelationScope {
    /// Create a scope for `parent[parent_key].relation`
    pub fn new(parent: &'static str, relation: &'static str, parent_key: impl Into<String>) -> Self {
        Self {
            parent,
            relation,
            parent_key: parent_key.into(),
        }
    }
}

impl fmt::Display for RelationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}].{}", self.parent, self.parent_key, self.relation)
    }
}

/// A query against a single entity table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityQuery {
    /// Conditions that must all hold
    pub filters: Vec<FilterCondition>,
    /// Optional relation membership restriction
    pub scope: Option<RelationScope>,
    /// Optional ordering as (field, direction)
    pub order_by: Option<(String, OrderDirection)>,
    /// Optional pagination
    pub pagination: Option<Pagination>,
}

impl EntityQuery {
    /// Create an unrestricted query
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter condition
    #[must_use]
    pub fn filter(mut self, condition: FilterCondition) -> Self {
        self.filters.push(condition);
        self
    }

    /// Restrict to members of a relation collection
    #[must_use]
    pub fn within(mut self, scope: RelationScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Set the ordering
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    /// Set the pagination
    #[must_use]
    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Check a document against every filter (the scope is not evaluated here)
    pub fn matches(&self, document: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(document))
    }
}
