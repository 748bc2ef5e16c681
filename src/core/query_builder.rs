//! Per-entity query builder
//!
//! Wraps the specification layer with the rules every list and export
//! shares: a column allow-list, pagination bounds, the hidden `DELETE`
//! status and a default sort.

use crate::core::condition::Condition;
use crate::core::entity::{Column, Status};
use crate::core::error::{AppError, Result};
use crate::core::query::{Direction, FilterExpr, Join, Operator, OrderExpr, QueryOptions, validate_pagination};
use crate::core::specification::{
    CompositeSpecification, ConditionSpecification, FilterSpecification, OrderSpecification,
    PaginationSpecification, SelectQuery,
};

/// Logical field names accepted from callers, mapped to columns
///
/// Several names may map to the same column (aliases).
pub type AllowList<C> = &'static [(&'static str, C)];

/// Builds a [`SelectQuery`] for one entity from caller-supplied options
#[derive(Debug, Clone)]
pub struct EntityQueryBuilder<C: Column> {
    allowed: AllowList<C>,
    limit: i64,
    offset: i64,
    paged: bool,
    conditions: Vec<Condition<C>>,
    filters: Vec<FilterExpr>,
    orders: Vec<OrderExpr>,
}

impl<C: Column> EntityQueryBuilder<C> {
    pub fn new(allowed: AllowList<C>) -> Self {
        Self {
            allowed,
            limit: 10,
            offset: 0,
            paged: true,
            conditions: Vec::new(),
            filters: Vec::new(),
            orders: Vec::new(),
        }
    }

    /// Map a logical field name to its column, ignoring case
    pub fn resolve(&self, field: &str) -> Option<C> {
        self.allowed
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(field))
            .map(|(_, column)| *column)
    }

    pub fn set_pagination(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self.paged = true;
        self
    }

    /// Return every matching row; used by exports
    pub fn unpaged(mut self) -> Self {
        self.paged = false;
        self
    }

    /// Add a typed base condition, ANDed before the filter groups
    pub fn add_condition(mut self, condition: Condition<C>) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn add_filter(mut self, field: &str, operator: &str, value: &str, join: &str) -> Result<Self> {
        let operator = Operator::parse(operator)
            .ok_or_else(|| AppError::invalid(field, format!("invalid filter operator: {}", operator)))?;
        let join = Join::parse(join)
            .ok_or_else(|| AppError::invalid(field, format!("invalid filter join: {}", join)))?;
        self.filters.push(FilterExpr::new(field, operator, value, join));
        Ok(self)
    }

    pub fn add_order(mut self, field: &str, direction: &str) -> Result<Self> {
        let direction = Direction::parse(direction).ok_or_else(|| {
            AppError::invalid("orderBy", format!("invalid order direction: {}", direction))
        })?;
        self.orders.push(OrderExpr::new(field, direction));
        Ok(self)
    }

    /// Take pagination, filters and orders from parsed request options
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.limit = options.limit;
        self.offset = options.offset;
        self.filters.extend(options.filters);
        self.orders.extend(options.orders);
        self
    }

    pub fn build(&self) -> Result<SelectQuery<C>> {
        if self.paged {
            validate_pagination(self.limit, self.offset)?;
        }

        for filter in &self.filters {
            if self.resolve(filter.field()).is_none() {
                return Err(AppError::invalid(
                    filter.field(),
                    format!("invalid filter field: {}", filter.field()),
                ));
            }
        }
        let orders = self
            .orders
            .iter()
            .map(|order| {
                self.resolve(&order.field)
                    .map(|column| (column, order.direction))
                    .ok_or_else(|| {
                        AppError::invalid("orderBy", format!("invalid order field: {}", order.field))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let targets_status = |filter: &&FilterExpr| self.resolve(filter.field()) == Some(C::STATUS);
        if self.filters.iter().filter(targets_status).any(|filter| {
            filter.operator() == Operator::Eq
                && filter.value().eq_ignore_ascii_case(Status::Delete.as_str())
        }) {
            return Err(AppError::invalid("status", "cannot list items with DELETE status"));
        }

        let mut conditions = self.conditions.clone();
        let status_constrained = self.filters.iter().any(|filter| targets_status(&filter))
            || conditions.iter().any(|condition| condition.column() == C::STATUS);
        if !status_constrained {
            conditions.push(Condition::listable());
        }

        let orders = if orders.is_empty() {
            vec![(C::UPDATED_AT, Direction::Desc)]
        } else {
            orders
        };

        let filter = FilterSpecification::from_filters(&self.filters, |field| self.resolve(field))?;
        let mut composite = CompositeSpecification::new()
            .with(ConditionSpecification::new(conditions))
            .with(filter)
            .with(OrderSpecification::new(orders));
        if self.paged {
            composite = composite.with(PaginationSpecification {
                limit: self.limit,
                offset: self.offset,
            });
        }

        let query = composite.build();
        tracing::debug!(
            conditions = query.conditions().len(),
            groups = query.groups().len(),
            limit = ?query.limit(),
            offset = query.offset(),
            "built entity query"
        );
        Ok(query)
    }
}
