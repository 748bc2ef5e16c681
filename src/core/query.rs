//! Query expressions, options and pagination utilities

use crate::core::error::{AppError, Result};
use crate::core::parser::{parse_filter_expr, parse_order_expr};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operator of a filter leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    Like,
}

impl Operator {
    /// Case-insensitive parse of the textual operator
    pub fn parse(raw: &str) -> Option<Operator> {
        match raw.to_ascii_lowercase().as_str() {
            "eq" => Some(Operator::Eq),
            "ne" => Some(Operator::Ne),
            "lt" => Some(Operator::Lt),
            "gt" => Some(Operator::Gt),
            "lte" => Some(Operator::Lte),
            "gte" => Some(Operator::Gte),
            "like" => Some(Operator::Like),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Lt => "lt",
            Operator::Gt => "gt",
            Operator::Lte => "lte",
            Operator::Gte => "gte",
            Operator::Like => "like",
        }
    }

    /// SQL comparison token
    pub fn sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Lte => "<=",
            Operator::Gte => ">=",
            Operator::Like => "LIKE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical connector between a filter and its predecessor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Join {
    #[default]
    And,
    Or,
}

impl Join {
    pub fn parse(raw: &str) -> Option<Join> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "and" => Some(Join::And),
            "or" => Some(Join::Or),
            _ => None,
        }
    }
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Join::And => "AND",
            Join::Or => "OR",
        })
    }
}

/// One parsed filter leaf plus the connector to the previous leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterExpr {
    field: String,
    operator: Operator,
    value: String,
    join: Join,
}

impl FilterExpr {
    pub fn new(
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<String>,
        join: Join,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            join,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn join(&self) -> Join {
        self.join
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(raw: &str) -> Option<Direction> {
        match raw.to_ascii_uppercase().as_str() {
            "ASC" => Some(Direction::Asc),
            "DESC" => Some(Direction::Desc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// One parsed order term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExpr {
    pub field: String,
    pub direction: Direction,
}

impl OrderExpr {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Everything a list operation needs besides the entity's own conditions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub limit: i64,
    pub offset: i64,
    pub filters: Vec<FilterExpr>,
    pub orders: Vec<OrderExpr>,
}

/// Raw list request as extracted by the transport layer
///
/// # Example
/// ```rust,ignore
/// // GET /models?filter=name like 'ax' and status eq ENABLE&orderBy=name ASC&limit=20
/// let request: ListRequest = serde_json::from_value(json!({
///     "filter": "name like 'ax' and status eq ENABLE",
///     "orderBy": "name ASC",
///     "limit": 20
/// }))?;
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListRequest {
    /// Raw filter expression
    pub filter: Option<String>,

    /// Raw order expression, e.g. `name ASC, created_at DESC`
    #[serde(alias = "orderBy")]
    pub order_by: Option<String>,

    #[serde(default = "default_limit")]
    pub limit: i64,

    pub offset: i64,
}

fn default_limit() -> i64 {
    10
}

impl Default for ListRequest {
    fn default() -> Self {
        Self {
            filter: None,
            order_by: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl ListRequest {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit,
            offset,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_order(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    /// Run both expression parsers
    pub fn to_options(&self) -> Result<QueryOptions> {
        let filters = parse_filter_expr(self.filter.as_deref().unwrap_or_default())?;
        let orders = parse_order_expr(self.order_by.as_deref().unwrap_or_default())?;
        Ok(QueryOptions {
            limit: self.limit,
            offset: self.offset,
            filters,
            orders,
        })
    }
}

/// Paginated response structure
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: PageMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub limit: i64,
    pub offset: i64,
    /// Total number of rows matching the filters
    pub total: u64,
    pub has_next: bool,
}

impl PageMeta {
    pub fn new(limit: i64, offset: i64, total: u64) -> Self {
        let seen = u64::try_from(offset.saturating_add(limit)).unwrap_or(0);
        Self {
            limit,
            offset,
            total,
            has_next: seen < total,
        }
    }
}

/// Reject pagination outside `limit ∈ [1, 100]`, `offset ≥ 0`
pub fn validate_pagination(limit: i64, offset: i64) -> Result<()> {
    if !(1..=100).contains(&limit) {
        return Err(AppError::invalid("limit", "limit must be between 1 and 100"));
    }
    if offset < 0 {
        return Err(AppError::invalid(
            "offset",
            "offset must be greater than or equal to 0",
        ));
    }
    Ok(())
}
