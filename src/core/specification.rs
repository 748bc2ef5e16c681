//! Composable query specifications
//!
//! A [`SelectQuery`] is the pending, backend-neutral query. Specifications
//! mutate it in sequence:
//!
//! - [`ConditionSpecification`]: typed base conditions (`=` / `IN`)
//! - [`FilterSpecification`]: parsed filter leaves, regrouped by join
//! - [`OrderSpecification`]: `ORDER BY`
//! - [`PaginationSpecification`]: `LIMIT` / `OFFSET`
//! - [`CompositeSpecification`]: applies a list of the above left to right
//!
//! # Grouping
//!
//! Filters are regrouped in one flattening pass: a filter joined with `OR`
//! extends the current group, a filter joined with `AND` opens a new one.
//! Groups render as `(c1 OR c2 ...)` and are ANDed in order, so
//! `[a AND, b OR, c AND]` becomes `(a OR b) AND (c)`. Deeper boolean
//! structure is not represented.

use crate::core::condition::{Comparison, Condition, SqlArgs};
use crate::core::entity::{Column, Record};
use crate::core::error::{AppError, Result};
use crate::core::query::{Direction, FilterExpr, Join};
use std::cmp::Ordering;

/// A pending SELECT over one table
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery<C> {
    conditions: Vec<Condition<C>>,
    groups: Vec<Vec<Comparison<C>>>,
    orders: Vec<(C, Direction)>,
    limit: Option<i64>,
    offset: i64,
}

impl<C: Column> Default for SelectQuery<C> {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            groups: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: 0,
        }
    }
}

impl<C: Column> SelectQuery<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conditions(conditions: Vec<Condition<C>>) -> Self {
        Self {
            conditions,
            ..Self::default()
        }
    }

    pub fn where_condition(mut self, condition: Condition<C>) -> Self {
        self.conditions.push(condition);
        self
    }

    /// AND one OR-group onto the query
    pub fn where_group(mut self, group: Vec<Comparison<C>>) -> Self {
        if !group.is_empty() {
            self.groups.push(group);
        }
        self
    }

    pub fn order_by(mut self, column: C, direction: Direction) -> Self {
        self.orders.push((column, direction));
        self
    }

    pub fn paginate(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    pub fn conditions(&self) -> &[Condition<C>] {
        &self.conditions
    }

    pub fn groups(&self) -> &[Vec<Comparison<C>>] {
        &self.groups
    }

    pub fn orders(&self) -> &[(C, Direction)] {
        &self.orders
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Same predicates, no ordering or window (for counting)
    pub fn unpaged(&self) -> Self {
        Self {
            conditions: self.conditions.clone(),
            groups: self.groups.clone(),
            orders: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    // ---------------------------------------------------------------------------
    // SQL rendering
    // ---------------------------------------------------------------------------

    /// `WHERE` body, or `None` when unconstrained
    pub fn where_sql(&self, args: &mut SqlArgs) -> Option<String> {
        let mut clauses: Vec<String> = self
            .conditions
            .iter()
            .map(|condition| condition.to_sql(args))
            .collect();

        for group in &self.groups {
            let members: Vec<String> = group.iter().map(|leaf| leaf.to_sql(args)).collect();
            clauses.push(format!("({})", members.join(" OR ")));
        }

        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" AND "))
        }
    }

    /// Full statement returning each row as one JSON document column `doc`
    pub fn select_sql(&self, table: &str, args: &mut SqlArgs) -> String {
        let mut sql = format!("SELECT to_jsonb(t) AS doc FROM {} t", table);
        if let Some(clause) = self.where_sql(args) {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        if !self.orders.is_empty() {
            let terms: Vec<String> = self
                .orders
                .iter()
                .map(|(column, direction)| format!("{} {}", column.name(), direction.as_str()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, self.offset));
        }
        sql
    }

    pub fn count_sql(&self, table: &str, args: &mut SqlArgs) -> String {
        let mut sql = format!("SELECT COUNT(*) FROM {}", table);
        if let Some(clause) = self.where_sql(args) {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        sql
    }

    // ---------------------------------------------------------------------------
    // In-memory evaluation
    // ---------------------------------------------------------------------------

    pub fn matches<R: Record<Column = C>>(&self, record: &R) -> bool {
        self.conditions.iter().all(|condition| condition.matches(record))
            && self
                .groups
                .iter()
                .all(|group| group.iter().any(|leaf| leaf.matches(record)))
    }

    /// Stable sort by the order terms
    pub fn sort<R: Record<Column = C>>(&self, rows: &mut [R]) {
        if self.orders.is_empty() {
            return;
        }
        rows.sort_by(|a, b| {
            for (column, direction) in &self.orders {
                let ordering = a
                    .value_of(*column)
                    .compare(&b.value_of(*column))
                    .unwrap_or(Ordering::Equal);
                let ordering = match direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    /// Apply `LIMIT` / `OFFSET` to already sorted rows
    pub fn window<R>(&self, rows: Vec<R>) -> Vec<R> {
        let offset = usize::try_from(self.offset).unwrap_or(0);
        let rows = rows.into_iter().skip(offset);
        match self.limit.and_then(|limit| usize::try_from(limit).ok()) {
            Some(limit) => rows.take(limit).collect(),
            None => rows.collect(),
        }
    }
}

/// Anything carrying the connector to its predecessor
pub trait Joined {
    fn join(&self) -> Join;
}

impl Joined for FilterExpr {
    fn join(&self) -> Join {
        FilterExpr::join(self)
    }
}

/// Regroup a flat sequence: `OR` continues the current group, `AND` opens a new one
pub fn group_by_join<T: Joined>(items: &[T]) -> Vec<Vec<&T>> {
    let mut groups: Vec<Vec<&T>> = Vec::new();
    for item in items {
        match (item.join(), groups.last_mut()) {
            (Join::Or, Some(current)) => current.push(item),
            _ => groups.push(vec![item]),
        }
    }
    groups
}

/// Capability to mutate a pending query
pub trait Specification<C: Column>: Send + Sync {
    fn apply(&self, query: SelectQuery<C>) -> SelectQuery<C>;
}

/// Typed base conditions, ANDed
#[derive(Debug, Clone)]
pub struct ConditionSpecification<C> {
    conditions: Vec<Condition<C>>,
}

impl<C: Column> ConditionSpecification<C> {
    pub fn new(conditions: Vec<Condition<C>>) -> Self {
        Self { conditions }
    }
}

impl<C: Column> Specification<C> for ConditionSpecification<C> {
    fn apply(&self, query: SelectQuery<C>) -> SelectQuery<C> {
        self.conditions
            .iter()
            .cloned()
            .fold(query, SelectQuery::where_condition)
    }
}

/// A filter leaf resolved to a column, keeping its join
#[derive(Debug, Clone, PartialEq)]
pub struct FilterTerm<C> {
    pub join: Join,
    pub comparison: Comparison<C>,
}

impl<C> Joined for FilterTerm<C> {
    fn join(&self) -> Join {
        self.join
    }
}

#[derive(Debug, Clone)]
pub struct FilterSpecification<C> {
    terms: Vec<FilterTerm<C>>,
}

impl<C: Column> FilterSpecification<C> {
    pub fn new(terms: Vec<FilterTerm<C>>) -> Self {
        Self { terms }
    }

    /// Resolve each filter's field through `resolve` and type its operand
    pub fn from_filters(
        filters: &[FilterExpr],
        resolve: impl Fn(&str) -> Option<C>,
    ) -> Result<Self> {
        let terms = filters
            .iter()
            .map(|filter| {
                let column = resolve(filter.field()).ok_or_else(|| {
                    AppError::invalid(
                        filter.field(),
                        format!("invalid filter field: {}", filter.field()),
                    )
                })?;
                Ok(FilterTerm {
                    join: filter.join(),
                    comparison: Comparison::build(column, filter.operator(), filter.value())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { terms })
    }

    pub fn terms(&self) -> &[FilterTerm<C>] {
        &self.terms
    }
}

impl<C: Column> Specification<C> for FilterSpecification<C> {
    fn apply(&self, query: SelectQuery<C>) -> SelectQuery<C> {
        group_by_join(&self.terms)
            .into_iter()
            .fold(query, |query, group| {
                query.where_group(group.into_iter().map(|term| term.comparison.clone()).collect())
            })
    }
}

#[derive(Debug, Clone)]
pub struct OrderSpecification<C> {
    orders: Vec<(C, Direction)>,
}

impl<C: Column> OrderSpecification<C> {
    pub fn new(orders: Vec<(C, Direction)>) -> Self {
        Self { orders }
    }
}

impl<C: Column> Specification<C> for OrderSpecification<C> {
    fn apply(&self, query: SelectQuery<C>) -> SelectQuery<C> {
        self.orders
            .iter()
            .fold(query, |query, (column, direction)| query.order_by(*column, *direction))
    }
}

/// `LIMIT n OFFSET m`; a non-positive limit leaves the query unpaged
#[derive(Debug, Clone, Copy)]
pub struct PaginationSpecification {
    pub limit: i64,
    pub offset: i64,
}

impl<C: Column> Specification<C> for PaginationSpecification {
    fn apply(&self, query: SelectQuery<C>) -> SelectQuery<C> {
        if self.limit > 0 {
            query.paginate(self.limit, self.offset)
        } else {
            query
        }
    }
}

pub struct CompositeSpecification<C> {
    specifications: Vec<Box<dyn Specification<C>>>,
}

impl<C: Column> CompositeSpecification<C> {
    pub fn new() -> Self {
        Self {
            specifications: Vec::new(),
        }
    }

    pub fn with(mut self, specification: impl Specification<C> + 'static) -> Self {
        self.specifications.push(Box::new(specification));
        self
    }

    /// Apply every specification to a fresh query
    pub fn build(&self) -> SelectQuery<C> {
        self.apply(SelectQuery::new())
    }
}

impl<C: Column> Default for CompositeSpecification<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Column> Specification<C> for CompositeSpecification<C> {
    fn apply(&self, query: SelectQuery<C>) -> SelectQuery<C> {
        self.specifications
            .iter()
            .fold(query, |query, specification| specification.apply(query))
    }
}
