//! Typed predicates over record columns
//!
//! - [`Condition`]: equality or membership lookups used by `find`, scoped
//!   lists and counts
//! - [`Comparison`]: a single `(column, operator, value)` filter leaf
//! - [`Changes`]: the column assignments of an update
//!
//! Each renders to a parameterized PostgreSQL fragment and evaluates against a
//! record in memory, so both stores share one definition of what matches.

use crate::core::entity::{Column, Record, Status};
use crate::core::error::{AppError, Result};
use crate::core::field::{FieldKind, FieldValue};
use crate::core::query::Operator;
use regex::Regex;
use std::cmp::Ordering;

/// Positional arguments collected while rendering SQL
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SqlArgs {
    values: Vec<(FieldValue, FieldKind)>,
}

impl SqlArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value and return its `$n` placeholder
    pub fn push(&mut self, value: FieldValue, kind: FieldKind) -> String {
        self.values.push((value, kind));
        format!("${}", self.values.len())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[(FieldValue, FieldKind)] {
        &self.values
    }

    pub fn into_values(self) -> Vec<(FieldValue, FieldKind)> {
        self.values
    }
}

// =============================================================================
// Lookup conditions
// =============================================================================

/// Equality or membership on one column
#[derive(Debug, Clone, PartialEq)]
pub enum Condition<C> {
    Eq(C, FieldValue),
    In(C, Vec<FieldValue>),
}

impl<C: Column> Condition<C> {
    pub fn eq(column: C, value: impl Into<FieldValue>) -> Self {
        Condition::Eq(column, value.into())
    }

    pub fn any<V: Into<FieldValue>>(column: C, values: impl IntoIterator<Item = V>) -> Self {
        Condition::In(column, values.into_iter().map(Into::into).collect())
    }

    /// `status IN (ENABLE, DISABLE)`
    pub fn listable() -> Self {
        Condition::any(C::STATUS, Status::LISTABLE)
    }

    pub fn column(&self) -> C {
        match self {
            Condition::Eq(column, _) | Condition::In(column, _) => *column,
        }
    }

    pub fn to_sql(&self, args: &mut SqlArgs) -> String {
        match self {
            Condition::Eq(column, FieldValue::Null) => format!("{} IS NULL", column.name()),
            Condition::Eq(column, value) => {
                let placeholder = args.push(value.clone(), column.kind());
                format!("{} = {}", column.name(), placeholder)
            }
            Condition::In(_, values) if values.is_empty() => "FALSE".to_string(),
            Condition::In(column, values) => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|value| args.push(value.clone(), column.kind()))
                    .collect();
                format!("{} IN ({})", column.name(), placeholders.join(", "))
            }
        }
    }

    pub fn matches<R: Record<Column = C>>(&self, record: &R) -> bool {
        match self {
            Condition::Eq(column, value) => record.value_of(*column) == *value,
            Condition::In(column, values) => {
                let actual = record.value_of(*column);
                values.iter().any(|value| *value == actual)
            }
        }
    }
}

/// True when every condition holds
pub fn all_match<R: Record>(conditions: &[Condition<R::Column>], record: &R) -> bool {
    conditions.iter().all(|condition| condition.matches(record))
}

// =============================================================================
// Filter comparisons
// =============================================================================

/// One `(column, operator, value)` filter leaf with a typed operand
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison<C> {
    column: C,
    operator: Operator,
    value: FieldValue,
}

impl<C: Column> Comparison<C> {
    /// Convert the raw operand to the column's type
    ///
    /// `like` always takes a text operand wrapped as `%value%`. Ordering
    /// operators are refused on list columns.
    pub fn build(column: C, operator: Operator, raw: &str) -> Result<Self> {
        let kind = column.kind();
        let value = match operator {
            Operator::Like => FieldValue::String(format!("%{}%", raw)),
            Operator::Eq | Operator::Ne => FieldValue::parse(kind, raw)
                .map_err(|message| AppError::invalid(column.name(), message))?,
            _ if kind == FieldKind::TextList => {
                return Err(AppError::invalid(
                    column.name(),
                    format!("operator {} is not supported on {}", operator, column.name()),
                ));
            }
            _ => FieldValue::parse(kind, raw)
                .map_err(|message| AppError::invalid(column.name(), message))?,
        };
        Ok(Self {
            column,
            operator,
            value,
        })
    }

    pub fn column(&self) -> C {
        self.column
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn to_sql(&self, args: &mut SqlArgs) -> String {
        let name = self.column.name();
        let kind = self.column.kind();
        match (kind, self.operator) {
            (FieldKind::TextList, Operator::Like) => {
                let placeholder = args.push(self.value.clone(), FieldKind::Text);
                format!("array_to_string({}, ',') LIKE {}", name, placeholder)
            }
            (FieldKind::TextList, Operator::Ne) => {
                let placeholder = args.push(self.value.clone(), FieldKind::Text);
                format!("NOT ({} = ANY({}))", placeholder, name)
            }
            (FieldKind::TextList, _) => {
                let placeholder = args.push(self.value.clone(), FieldKind::Text);
                format!("{} = ANY({})", placeholder, name)
            }
            (_, Operator::Like) if !kind.is_textual() => {
                let placeholder = args.push(self.value.clone(), FieldKind::Text);
                format!("CAST({} AS TEXT) LIKE {}", name, placeholder)
            }
            (_, operator) => {
                let placeholder = args.push(self.value.clone(), kind);
                format!("{} {} {}", name, operator.sql(), placeholder)
            }
        }
    }

    pub fn matches<R: Record<Column = C>>(&self, record: &R) -> bool {
        let actual = record.value_of(self.column);
        if let FieldValue::List(items) = &actual {
            return match self.operator {
                Operator::Like => like_matches(&items.join(","), self.value.render().as_str()),
                Operator::Ne => !items.iter().any(|item| FieldValue::String(item.clone()) == self.value),
                _ => items.iter().any(|item| FieldValue::String(item.clone()) == self.value),
            };
        }

        match self.operator {
            Operator::Like => like_matches(&actual.render(), &self.value.render()),
            Operator::Eq => actual == self.value,
            Operator::Ne => actual != self.value,
            Operator::Lt => actual.compare(&self.value) == Some(Ordering::Less),
            Operator::Gt => actual.compare(&self.value) == Some(Ordering::Greater),
            Operator::Lte => matches!(
                actual.compare(&self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Gte => matches!(
                actual.compare(&self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

/// SQL `LIKE` semantics: `%` any run, `_` any single character, case-sensitive
fn like_matches(text: &str, pattern: &str) -> bool {
    let mut translated = String::with_capacity(pattern.len() + 2);
    translated.push_str("(?s)^");
    for ch in pattern.chars() {
        match ch {
            '%' => translated.push_str(".*"),
            '_' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');

    Regex::new(&translated)
        .map(|regex| regex.is_match(text))
        .unwrap_or(false)
}

// =============================================================================
// Change sets
// =============================================================================

/// Column assignments applied by an update
#[derive(Debug, Clone, PartialEq)]
pub struct Changes<C> {
    assignments: Vec<(C, FieldValue)>,
}

impl<C: Column> Default for Changes<C> {
    fn default() -> Self {
        Self {
            assignments: Vec::new(),
        }
    }
}

impl<C: Column> Changes<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: C, value: impl Into<FieldValue>) -> Self {
        self.push(column, value.into());
        self
    }

    /// Assign only when a value is present
    pub fn set_opt<V: Into<FieldValue>>(mut self, column: C, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.push(column, value.into());
        }
        self
    }

    fn push(&mut self, column: C, value: FieldValue) {
        match self.assignments.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.assignments.push((column, value)),
        }
    }

    pub fn get(&self, column: C) -> Option<&FieldValue> {
        self.assignments
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, value)| value)
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(C, FieldValue)> {
        self.assignments.iter()
    }
}
