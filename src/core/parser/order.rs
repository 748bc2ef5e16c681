//! Order expression parser: `field [ASC|DESC], ...`

use crate::core::error::{AppError, Result};
use crate::core::query::{Direction, OrderExpr};

/// Parse a comma-separated order list
///
/// A term without a direction sorts descending. Empty terms are skipped.
pub fn parse_order_expr(raw: &str) -> Result<Vec<OrderExpr>> {
    let mut orders = Vec::new();

    for term in raw.split(',') {
        let mut tokens = term.split_whitespace();
        let Some(field) = tokens.next() else {
            continue;
        };

        let direction = match tokens.next() {
            None => Direction::Desc,
            Some(token) => Direction::parse(token).ok_or_else(|| {
                AppError::invalid("orderBy", format!("invalid order direction: {}", token))
            })?,
        };
        if let Some(extra) = tokens.next() {
            return Err(AppError::invalid(
                "orderBy",
                format!("invalid order direction: {} {}", direction.as_str(), extra),
            ));
        }

        orders.push(OrderExpr::new(field, direction));
    }

    Ok(orders)
}
