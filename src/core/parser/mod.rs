//! Parsers for the textual `filter` and `orderBy` request parameters

pub mod filter;
pub mod order;

pub use filter::parse_filter_expr;
pub use order::parse_order_expr;
