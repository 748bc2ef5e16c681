//! Filter expression parser
//!
//! Grammar, two levels deep:
//!
//! ```text
//! filter  := group ( (" and " | " or ") group )*
//! group   := "(" leaf ( (" and " | " or ") leaf )* ")" | leaf
//! leaf    := field op value
//! op      := eq | ne | lt | gt | lte | gte | like        (case-insensitive)
//! value   := 'quoted' | "quoted" | bare
//! ```
//!
//! The result is a flat list of [`FilterExpr`]; each leaf records the
//! connector to the leaf before it. Grouping deeper than two levels cannot be
//! expressed: `a eq 1 or (b eq 2 and c eq 3)` flattens to the joins
//! `[AND, OR, AND]`, which the specification layer regroups as
//! `(a OR b) AND (c)`. Existing filter strings depend on this shape, so it
//! must not be turned into a full boolean expression tree.

use crate::core::error::{AppError, Result};
use crate::core::field::cached_regex;
use crate::core::query::{FilterExpr, Join, Operator};
use regex::Regex;
use std::sync::OnceLock;

const LEAF_PATTERN: &str = r"(?i)^\s*([a-zA-Z0-9_.]+)\s+(eq|ne|lt|gt|lte|gte|like)\s+(.+?)\s*$";

/// Parse a raw filter string
///
/// An empty or blank string yields no filters.
pub fn parse_filter_expr(raw: &str) -> Result<Vec<FilterExpr>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    check_balanced(raw)?;

    let (segments, top_joins) = split_top_level(strip_outer_parens(raw));
    if segments.is_empty() {
        return Err(AppError::invalid("filter", "invalid filter expression"));
    }

    let mut filters = Vec::new();
    for (si, segment) in segments.iter().enumerate() {
        let (leaves, inner_joins) = split_top_level(strip_outer_parens(segment));
        if leaves.is_empty() {
            return Err(AppError::invalid(
                "filter",
                format!("invalid filter segment: {}", segment),
            ));
        }

        for (pi, leaf) in leaves.iter().enumerate() {
            let (field, operator, value) = parse_condition(leaf)?;
            let join = match (si, pi) {
                (0, 0) => Join::And,
                (_, 0) => top_joins[si - 1],
                _ => inner_joins[pi - 1],
            };
            filters.push(FilterExpr::new(field, operator, value, join));
        }
    }

    tracing::debug!(count = filters.len(), "parsed filter expression");
    Ok(filters)
}

/// Parentheses must balance and single quotes must close
fn check_balanced(raw: &str) -> Result<()> {
    let mut depth = 0i32;
    let mut in_quote = false;
    for byte in raw.bytes() {
        match byte {
            b'\'' => in_quote = !in_quote,
            b'(' if !in_quote => depth += 1,
            b')' if !in_quote => {
                depth -= 1;
                if depth < 0 {
                    return Err(AppError::invalid("filter", "unbalanced parentheses in filter"));
                }
            }
            _ => {}
        }
    }
    if in_quote {
        return Err(AppError::invalid("filter", "unterminated quote in filter"));
    }
    if depth != 0 {
        return Err(AppError::invalid("filter", "unbalanced parentheses in filter"));
    }
    Ok(())
}

/// Remove one pair of parentheses wrapping the whole input
///
/// `(a) and (b)` is left alone: its first parenthesis closes before the end.
fn strip_outer_parens(raw: &str) -> &str {
    let s = raw.trim();
    let bytes = s.as_bytes();
    if bytes.len() < 2 || bytes[0] != b'(' || bytes[bytes.len() - 1] != b')' {
        return s;
    }

    let mut depth = 0i32;
    let mut in_quote = false;
    for (i, byte) in bytes.iter().enumerate() {
        match byte {
            b'\'' => in_quote = !in_quote,
            b'(' if !in_quote => depth += 1,
            b')' if !in_quote => {
                depth -= 1;
                if depth == 0 && i != bytes.len() - 1 {
                    return s;
                }
            }
            _ => {}
        }
    }
    s[1..s.len() - 1].trim()
}

/// Split on ` and ` / ` or ` outside quotes and parentheses
///
/// Returns the trimmed segments and, for each boundary, the keyword found.
fn split_top_level(expr: &str) -> (Vec<&str>, Vec<Join>) {
    let expr = expr.trim();
    let mut segments = Vec::new();
    let mut joins = Vec::new();
    if expr.is_empty() {
        return (segments, joins);
    }

    // ASCII lowering keeps byte offsets aligned with `expr`
    let lower = expr.to_ascii_lowercase();
    let bytes = expr.as_bytes();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_quote = !in_quote,
            b'(' if !in_quote => depth += 1,
            b')' if !in_quote => depth = (depth - 1).max(0),
            b' ' if !in_quote && depth == 0 => {
                let keyword = if lower[i..].starts_with(" and ") {
                    Some((Join::And, " and ".len()))
                } else if lower[i..].starts_with(" or ") {
                    Some((Join::Or, " or ".len()))
                } else {
                    None
                };
                if let Some((join, width)) = keyword {
                    segments.push(expr[start..i].trim());
                    joins.push(join);
                    i += width;
                    start = i;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }

    let tail = expr[start..].trim();
    if !tail.is_empty() {
        segments.push(tail);
    }
    (segments, joins)
}

/// Parse `<field> <operator> <value>`
fn parse_condition(leaf: &str) -> Result<(String, Operator, String)> {
    static LEAF_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = cached_regex(&LEAF_REGEX, LEAF_PATTERN)
        .ok_or_else(|| AppError::Internal("filter grammar failed to compile".to_string()))?;

    let invalid = || AppError::invalid("filter", format!("invalid filter condition: {}", leaf));
    let captures = regex.captures(leaf).ok_or_else(invalid)?;
    let field = captures.get(1).map(|m| m.as_str().trim()).ok_or_else(invalid)?;
    let operator = captures
        .get(2)
        .and_then(|m| Operator::parse(m.as_str()))
        .ok_or_else(invalid)?;
    let value = captures.get(3).map(|m| clean_value(m.as_str())).ok_or_else(invalid)?;

    Ok((field.to_string(), operator, value))
}

fn clean_value(raw: &str) -> String {
    let v = strip_outer_parens(raw.trim());
    let bytes = v.as_bytes();
    let quoted = bytes.len() >= 2
        && ((bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
            || (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"'));
    let v = if quoted { &v[1..v.len() - 1] } else { v };
    v.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joins(filters: &[FilterExpr]) -> Vec<Join> {
        filters.iter().map(FilterExpr::join).collect()
    }

    #[test]
    fn test_empty_input_yields_no_filters() {
        assert!(parse_filter_expr("").unwrap().is_empty());
        assert!(parse_filter_expr("   ").unwrap().is_empty());
    }

    #[test]
    fn test_and_joins() {
        let filters = parse_filter_expr("field1 eq 'a' and field2 eq 'b'").unwrap();
        assert_eq!(joins(&filters), vec![Join::And, Join::And]);
        assert_eq!(filters[0].field(), "field1");
        assert_eq!(filters[0].value(), "a");
        assert_eq!(filters[1].value(), "b");
    }

    #[test]
    fn test_or_joins() {
        let filters = parse_filter_expr("field1 eq 'a' or field2 eq 'b'").unwrap();
        assert_eq!(joins(&filters), vec![Join::And, Join::Or]);
    }

    #[test]
    fn test_grouped_inner_joins() {
        let filters =
            parse_filter_expr("name eq 'foo' and (status eq ENABLE or status eq DISABLE)").unwrap();
        assert_eq!(filters.len(), 3);
        assert_eq!(joins(&filters), vec![Join::And, Join::And, Join::Or]);
        assert_eq!(filters[1].value(), "ENABLE");
        assert_eq!(filters[2].value(), "DISABLE");
    }

    #[test]
    fn test_group_first_leaf_takes_outer_join() {
        let filters = parse_filter_expr("(a eq 1 and b eq 2) or (c eq 3 and d eq 4)").unwrap();
        assert_eq!(
            joins(&filters),
            vec![Join::And, Join::And, Join::Or, Join::And]
        );
    }

    #[test]
    fn test_whole_expression_wrapped_in_parens() {
        let wrapped = parse_filter_expr("(a eq 1 or b eq 2)").unwrap();
        let bare = parse_filter_expr("a eq 1 or b eq 2").unwrap();
        assert_eq!(wrapped, bare);
    }

    #[test]
    fn test_keywords_inside_quotes_are_not_separators() {
        let filters = parse_filter_expr("description like 'salt and pepper' or name eq x").unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].value(), "salt and pepper");
        assert_eq!(filters[0].operator(), Operator::Like);
    }

    #[test]
    fn test_parens_inside_quotes_are_ignored() {
        let filters = parse_filter_expr("(name eq 'a)b' and path eq 'Device.(1)')").unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].value(), "a)b");
        assert_eq!(filters[1].value(), "Device.(1)");
    }

    #[test]
    fn test_keywords_and_operators_are_case_insensitive() {
        let filters = parse_filter_expr("name EQ 'a' OR vendor_name LiKe b AND status Eq ENABLE").unwrap();
        assert_eq!(joins(&filters), vec![Join::And, Join::Or, Join::And]);
        assert_eq!(filters[0].operator(), Operator::Eq);
        assert_eq!(filters[1].operator(), Operator::Like);
    }

    #[test]
    fn test_double_quoted_and_bare_values() {
        let filters = parse_filter_expr("path eq \"Device.WiFi.\" and max_depth gte 2").unwrap();
        assert_eq!(filters[0].value(), "Device.WiFi.");
        assert_eq!(filters[1].value(), "2");
        assert_eq!(filters[1].operator(), Operator::Gte);
    }

    #[test]
    fn test_lt_is_not_confused_with_lte() {
        let filters = parse_filter_expr("max_depth lte 3 and msg_type lt 5").unwrap();
        assert_eq!(filters[0].operator(), Operator::Lte);
        assert_eq!(filters[1].operator(), Operator::Lt);
    }

    #[test]
    fn test_unsupported_operator_is_rejected() {
        let err = parse_filter_expr("name between 'a'").unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest { .. }));
    }

    #[test]
    fn test_malformed_leaf_is_rejected() {
        assert!(parse_filter_expr("name eq").is_err());
        assert!(parse_filter_expr("eq 'a'").is_err());
        assert!(parse_filter_expr("name = 'a'").is_err());
    }

    #[test]
    fn test_unbalanced_input_is_rejected() {
        assert!(parse_filter_expr("(name eq 'a'").is_err());
        assert!(parse_filter_expr("name eq 'a')").is_err());
        assert!(parse_filter_expr("name eq 'a").is_err());
    }

    #[test]
    fn test_deeper_nesting_flattens_to_two_levels() {
        // The inner group of the second segment is kept as one leaf group;
        // anything beyond that cannot be parsed as a leaf.
        assert!(parse_filter_expr("a eq 1 and (b eq 2 or (c eq 3 and d eq 4))").is_err());

        let filters = parse_filter_expr("a eq 1 or (b eq 2 and c eq 3)").unwrap();
        assert_eq!(joins(&filters), vec![Join::And, Join::Or, Join::And]);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let inputs = [
            "name eq 'foo' and (status eq ENABLE or status eq DISABLE)",
            "(a eq 1 or b eq 2) and c like 'x y'",
            "path like \"Device.\" or data_type eq string",
        ];
        for input in inputs {
            assert_eq!(parse_filter_expr(input).unwrap(), parse_filter_expr(input).unwrap());
        }
    }

    #[test]
    fn test_strip_outer_parens() {
        assert_eq!(strip_outer_parens("(a eq 1)"), "a eq 1");
        assert_eq!(strip_outer_parens("(a eq 1) and (b eq 2)"), "(a eq 1) and (b eq 2)");
        assert_eq!(strip_outer_parens("a eq 1"), "a eq 1");
    }

    #[test]
    fn test_split_top_level_records_joins() {
        let (segments, joins) = split_top_level("a eq 1 and (b eq 2 or c eq 3) or d eq 4");
        assert_eq!(segments, vec!["a eq 1", "(b eq 2 or c eq 3)", "d eq 4"]);
        assert_eq!(joins, vec![Join::And, Join::Or]);
    }
}
