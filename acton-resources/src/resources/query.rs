//! Listing queries built from the request query string
//!
//! [`query_from_request`] turns `?page=2&per_page=10&sort=name&order=desc`
//! plus any number of `filter=` expressions into an [`EntityQuery`], runs it
//! through the session and returns one page of dumped documents.
//!
//! Filter expressions have the form `field[__op]=value`:
//!
//! | expression | condition |
//! |---|---|
//! | `status=active` | `status = 'active'` |
//! | `age__gte=18` | `age >= 18` (also `ne`, `gt`, `lt`, `lte`) |
//! | `name__like=%al%` | `name LIKE '%al%'` |
//! | `role__in=admin,staff` | `role IN ('admin', 'staff')` |
//! | `deleted_at__isnull` | `deleted_at IS NULL` |
//! | `email__notnull` | `email IS NOT NULL` |
//!
//! # Example
//!
//! ```rust
//! use acton_resources::resources::{ListQuery, SortOrder};
//!
//! let query = ListQuery::parse("page=2&per_page=50&sort=created_at&order=desc&filter=status%3Dactive")
//!     .unwrap();
//!
//! assert_eq!(query.page_number(), 2);
//! assert_eq!(query.items_per_page(), 50);
//! assert_eq!(query.offset(), 50);
//! assert_eq!(query.sort_order(), SortOrder::Desc);
//! assert_eq!(query.filter, vec!["status=active".to_string()]);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{ResourceError, ResourceResult};
use super::request::ResourceRequest;
use super::response::{ListResponse, PaginationMeta};
use crate::serialization::{Document, EntitySerializer};
use crate::session::{
    Entity, EntityQuery, FilterCondition, FilterOperator, FilterValue, OrderDirection, Pagination,
    Session,
};

/// Default number of items per page
pub const DEFAULT_PER_PAGE: u32 = 20;

/// Maximum allowed items per page
pub const MAX_PER_PAGE: u32 = 100;

/// Page size policy applied to listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListLimits {
    /// Page size when the request does not ask for one
    pub default_per_page: u32,
    /// Largest page size a request may ask for
    pub max_per_page: u32,
}

impl Default for ListLimits {
    fn default() -> Self {
        Self {
            default_per_page: DEFAULT_PER_PAGE,
            max_per_page: MAX_PER_PAGE,
        }
    }
}

/// Sort direction for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Sort in ascending order (A-Z, 0-9, oldest first)
    #[default]
    Asc,
    /// Sort in descending order (Z-A, 9-0, newest first)
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

impl From<SortOrder> for OrderDirection {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::Asc => OrderDirection::Ascending,
            SortOrder::Desc => OrderDirection::Descending,
        }
    }
}

/// Query parameters for list operations
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Page number (1-indexed). None defaults to 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Number of items per page. None defaults to the configured default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,

    /// Field name to sort by
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,

    /// Sort direction (asc or desc)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,

    /// Filter expressions (e.g., "status=active", "age__gte=18")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<String>,

    /// Page size policy
    #[serde(skip)]
    pub limits: ListLimits,
}

impl ListQuery {
    /// Create a new empty query
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string
    ///
    /// Unknown parameters are ignored. `filter` may repeat.
    pub fn parse(raw: &str) -> ResourceResult<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw)
            .map_err(|e| ResourceError::BadRequest(format!("Invalid query string: {}", e)))?;

        let mut query = Self::new();
        for (key, value) in pairs {
            match key.as_str() {
                "page" => query.page = Some(parse_number(&key, &value)?),
                "per_page" => query.per_page = Some(parse_number(&key, &value)?),
                "sort" => query.sort = Some(value),
                "order" => {
                    query.order = Some(match value.to_ascii_lowercase().as_str() {
                        "asc" => SortOrder::Asc,
                        "desc" => SortOrder::Desc,
                        _ => {
                            return Err(ResourceError::BadRequest(format!(
                                "Invalid sort order '{}'",
                                value
                            )))
                        }
                    })
                }
                "filter" => query.filter.push(value),
                _ => {}
            }
        }
        Ok(query)
    }

    /// Set the page number
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Set the number of items per page
    #[must_use]
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page);
        self
    }

    /// Set the sort field
    #[must_use]
    pub fn with_sort(mut self, sort: String) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the sort order
    #[must_use]
    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }

    /// Add a filter expression
    #[must_use]
    pub fn with_filter(mut self, filter: String) -> Self {
        self.filter.push(filter);
        self
    }

    /// Apply a page size policy
    #[must_use]
    pub fn with_limits(mut self, limits: ListLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Get the 1-indexed page number, defaulting to 1
    ///
    /// ```rust
    /// use acton_resources::resources::ListQuery;
    ///
    /// // Page 0 is treated as page 1
    /// assert_eq!(ListQuery::new().with_page(0).page_number(), 1);
    /// ```
    #[must_use]
    pub fn page_number(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Get the number of items per page, with defaults and limits applied
    ///
    /// ```rust
    /// use acton_resources::resources::ListQuery;
    ///
    /// assert_eq!(ListQuery::new().items_per_page(), 20);
    /// assert_eq!(ListQuery::new().with_per_page(500).items_per_page(), 100);
    /// assert_eq!(ListQuery::new().with_per_page(0).items_per_page(), 1);
    /// ```
    #[must_use]
    pub fn items_per_page(&self) -> u32 {
        let max = self.limits.max_per_page.max(1);
        self.per_page
            .unwrap_or(self.limits.default_per_page)
            .clamp(1, max)
    }

    /// Number of rows to skip
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page_number().saturating_sub(1)) * u64::from(self.items_per_page())
    }

    /// Get the sort order, defaulting to ascending if not specified
    #[must_use]
    pub fn sort_order(&self) -> SortOrder {
        self.order.unwrap_or_default()
    }

    /// Check if sorting is specified
    #[must_use]
    pub fn has_sort(&self) -> bool {
        self.sort.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// Check if any filters are present
    #[must_use]
    pub fn has_filters(&self) -> bool {
        !self.filter.is_empty()
    }

    /// Parse every filter expression
    pub fn conditions(&self) -> ResourceResult<Vec<FilterCondition>> {
        self.filter.iter().map(|f| parse_filter(f)).collect()
    }

    /// Layer this query's filters, ordering and pagination onto `base`
    pub fn apply(&self, base: EntityQuery) -> ResourceResult<EntityQuery> {
        let mut query = self
            .conditions()?
            .into_iter()
            .fold(base, EntityQuery::filter);
        if let Some(sort) = self.sort.as_ref().filter(|s| !s.is_empty()) {
            query = query.order_by(sort.clone(), self.sort_order().into());
        }
        Ok(query.paginate(Pagination::new(
            self.offset(),
            u64::from(self.items_per_page()),
        )))
    }
}

fn parse_number(key: &str, value: &str) -> ResourceResult<u32> {
    value
        .parse()
        .map_err(|_| ResourceError::BadRequest(format!("'{}' must be a positive integer", key)))
}

/// Parse one `field[__op][=value]` expression
///
/// ```rust
/// use acton_resources::resources::parse_filter;
/// use acton_resources::session::{FilterOperator, FilterValue};
///
/// let condition = parse_filter("age__gte=18").unwrap();
/// assert_eq!(condition.field, "age");
/// assert_eq!(condition.operator, FilterOperator::GreaterThanOrEqual);
/// assert_eq!(condition.value, FilterValue::Integer(18));
/// ```
pub fn parse_filter(expression: &str) -> ResourceResult<FilterCondition> {
    let invalid = || ResourceError::BadRequest(format!("Invalid filter expression '{}'", expression));

    let (lhs, value) = match expression.split_once('=') {
        Some((lhs, value)) => (lhs, Some(value)),
        None => (expression, None),
    };
    let (field, op) = match lhs.rsplit_once("__") {
        Some((field, op)) => (field, op),
        None => (lhs, "eq"),
    };
    if field.is_empty() {
        return Err(invalid());
    }

    let operator = match op {
        "eq" => FilterOperator::Equal,
        "ne" => FilterOperator::NotEqual,
        "gt" => FilterOperator::GreaterThan,
        "gte" => FilterOperator::GreaterThanOrEqual,
        "lt" => FilterOperator::LessThan,
        "lte" => FilterOperator::LessThanOrEqual,
        "like" => FilterOperator::Like,
        "in" => FilterOperator::In,
        "isnull" => return Ok(FilterCondition::is_null(field)),
        "notnull" => return Ok(FilterCondition::is_not_null(field)),
        _ => return Err(invalid()),
    };
    let value = value.ok_or_else(invalid)?;

    let value = match operator {
        FilterOperator::Like => FilterValue::String(value.to_string()),
        FilterOperator::In => {
            let items: Vec<&str> = value.split(',').map(str::trim).collect();
            match items
                .iter()
                .map(|item| item.parse::<i64>())
                .collect::<Result<Vec<_>, _>>()
            {
                Ok(integers) => FilterValue::IntegerList(integers),
                Err(_) => FilterValue::StringList(items.into_iter().map(String::from).collect()),
            }
        }
        _ => FilterValue::infer(value),
    };
    Ok(FilterCondition::new(field, operator, value))
}

/// Run a filtered, paginated listing for the current request
///
/// `base` carries any restriction the resource imposes (a relation scope, a
/// property query); the request's filters are added on top of it.
pub async fn query_from_request<E: Entity, S: Session>(
    session: &mut S,
    serializer: &dyn EntitySerializer<E>,
    request: &ResourceRequest,
    base: Option<EntityQuery>,
) -> ResourceResult<ListResponse<Document>> {
    let list = ListQuery::parse(request.query.as_deref().unwrap_or_default())?
        .with_limits(request.limits);
    let query = list.apply(base.unwrap_or_default())?;

    let page = session.query::<E>(&query).await?;
    tracing::debug!(
        entity = E::NAME,
        total = page.total,
        returned = page.items.len(),
        "Listed entities"
    );

    let data = page
        .items
        .iter()
        .map(|entity| serializer.dump(entity))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ListResponse::new(
        data,
        PaginationMeta::new(list.page_number(), list.items_per_page(), page.total),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_query() {
        let query = ListQuery::parse("page=3&per_page=5&sort=name&order=DESC&filter=a%3D1&filter=b__like%3D%25x%25")
            .unwrap();
        assert_eq!(query.page_number(), 3);
        assert_eq!(query.items_per_page(), 5);
        assert_eq!(query.offset(), 10);
        assert_eq!(query.sort.as_deref(), Some("name"));
        assert_eq!(query.sort_order(), SortOrder::Desc);
        assert_eq!(query.filter, vec!["a=1".to_string(), "b__like=%x%".to_string()]);
    }

    #[test]
    fn test_parse_empty_and_unknown() {
        let query = ListQuery::parse("").unwrap();
        assert_eq!(query, ListQuery::new());
        let query = ListQuery::parse("search=bob&x=1").unwrap();
        assert!(!query.has_filters());
    }

    #[test]
    fn test_parse_rejects_bad_numbers_and_order() {
        assert!(ListQuery::parse("page=-1").is_err());
        assert!(ListQuery::parse("per_page=many").is_err());
        assert!(ListQuery::parse("order=sideways").is_err());
    }

    #[test]
    fn test_limits_are_applied() {
        let limits = ListLimits {
            default_per_page: 5,
            max_per_page: 10,
        };
        assert_eq!(ListQuery::new().with_limits(limits).items_per_page(), 5);
        assert_eq!(
            ListQuery::new().with_per_page(50).with_limits(limits).items_per_page(),
            10
        );
    }

    #[test]
    fn test_parse_filters() {
        assert_eq!(
            parse_filter("status=active").unwrap(),
            FilterCondition::eq("status", "active")
        );
        assert_eq!(
            parse_filter("deleted_at__isnull").unwrap(),
            FilterCondition::is_null("deleted_at")
        );
        assert_eq!(
            parse_filter("email__notnull").unwrap(),
            FilterCondition::is_not_null("email")
        );
        assert_eq!(
            parse_filter("name__like=%al%").unwrap(),
            FilterCondition::like("name", "%al%")
        );
        assert_eq!(
            parse_filter("id__in=1, 2,3").unwrap(),
            FilterCondition::in_integers("id", vec![1, 2, 3])
        );
        assert_eq!(
            parse_filter("role__in=admin,staff").unwrap(),
            FilterCondition::in_strings("role", vec!["admin".to_string(), "staff".to_string()])
        );
        // field names may contain single underscores
        assert_eq!(
            parse_filter("created_by__ne=7").unwrap(),
            FilterCondition::ne("created_by", 7)
        );
    }

    #[test]
    fn test_parse_filter_errors() {
        for expression in ["", "=5", "age__between=1", "age__gte", "__eq=1"] {
            assert!(
                matches!(parse_filter(expression), Err(ResourceError::BadRequest(_))),
                "{expression} should be rejected"
            );
        }
    }

    #[test]
    fn test_apply_layers_on_base() {
        let base = EntityQuery::new().filter(FilterCondition::eq("owner", 1));
        let query = ListQuery::parse("filter=age__lt%3D30&sort=age&page=2&per_page=10")
            .unwrap()
            .apply(base)
            .unwrap();
        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.order_by, Some(("age".to_string(), OrderDirection::Ascending)));
        assert_eq!(query.pagination, Some(Pagination::new(10, 10)));
    }
}
