//! # Column Abstraction
//!
//! A column is a named, typed view over a row: it can extract a value
//! for output and build a leaf filter for a `(kind, operator, literal)`
//! triple. The set of shapes is closed: text, integer (usually derived
//! through a lambda over the row), membership list, and the `NullColumn`
//! placeholder used for unknown names on `Columns:` lines.

use std::sync::Arc;

use regex::Regex;

use super::filter::{ColumnFilter, Filter, Predicate};
use super::ops::RelationalOperator;
use super::{FilterKind, ParseError, QueryContext};
use crate::tables::Row;

pub type TextGetter = Arc<dyn Fn(Row<'_>, &QueryContext<'_>) -> String + Send + Sync>;
pub type IntGetter = Arc<dyn Fn(Row<'_>, &QueryContext<'_>) -> i64 + Send + Sync>;
/// List elements are part vectors: plain lists have one part per
/// element, member lists have `[host, description, …]` parts that the
/// renderer joins with the host-service separator.
pub type ListGetter = Arc<dyn Fn(Row<'_>, &QueryContext<'_>) -> Vec<Vec<String>> + Send + Sync>;

/// A value extracted from a row, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(String),
    Int(i64),
    Float(f64),
    List(Vec<Vec<String>>),
    Null,
}

enum ColumnType {
    Text(TextGetter),
    Int(IntGetter),
    List(ListGetter),
    Null,
}

/// A named column of one table.
pub struct Column {
    name: String,
    description: String,
    ctype: ColumnType,
}

impl Column {
    pub fn text<F>(name: &str, description: &str, get: F) -> Arc<Column>
    where
        F: Fn(Row<'_>, &QueryContext<'_>) -> String + Send + Sync + 'static,
    {
        Arc::new(Column {
            name: name.to_string(),
            description: description.to_string(),
            ctype: ColumnType::Text(Arc::new(get)),
        })
    }

    pub fn int<F>(name: &str, description: &str, get: F) -> Arc<Column>
    where
        F: Fn(Row<'_>, &QueryContext<'_>) -> i64 + Send + Sync + 'static,
    {
        Arc::new(Column {
            name: name.to_string(),
            description: description.to_string(),
            ctype: ColumnType::Int(Arc::new(get)),
        })
    }

    pub fn list<F>(name: &str, description: &str, get: F) -> Arc<Column>
    where
        F: Fn(Row<'_>, &QueryContext<'_>) -> Vec<Vec<String>> + Send + Sync + 'static,
    {
        Arc::new(Column {
            name: name.to_string(),
            description: description.to_string(),
            ctype: ColumnType::List(Arc::new(get)),
        })
    }

    /// Placeholder for a column name the table does not know. Emits
    /// empty values and refuses filter creation.
    pub fn null(name: &str) -> Arc<Column> {
        Arc::new(Column {
            name: name.to_string(),
            description: "non-existing column".to_string(),
            ctype: ColumnType::Null,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[allow(dead_code)]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether `Stats: <agg> <column>` may fold this column.
    pub fn is_numeric(&self) -> bool {
        matches!(self.ctype, ColumnType::Int(_))
    }

    /// Extract this column's value from a row.
    pub fn value(&self, row: Row<'_>, ctx: &QueryContext<'_>) -> ColumnValue {
        match &self.ctype {
            ColumnType::Text(get) => ColumnValue::Text(get(row, ctx)),
            ColumnType::Int(get) => ColumnValue::Int(get(row, ctx)),
            ColumnType::List(get) => ColumnValue::List(get(row, ctx)),
            ColumnType::Null => ColumnValue::Null,
        }
    }

    /// The value as a double, for aggregation folds.
    pub fn numeric_value(&self, row: Row<'_>, ctx: &QueryContext<'_>) -> f64 {
        match &self.ctype {
            ColumnType::Int(get) => get(row, ctx) as f64,
            _ => 0.0,
        }
    }

    /// Build a leaf filter comparing this column against `rhs`. The
    /// column parses the literal according to its own value type.
    pub fn create_filter(
        &self,
        kind: FilterKind,
        op: RelationalOperator,
        rhs: &str,
    ) -> Result<Filter, ParseError> {
        let predicate = match &self.ctype {
            ColumnType::Text(get) => {
                let pattern = match op {
                    RelationalOperator::Matches | RelationalOperator::DoesntMatch => {
                        Some(compile_pattern(rhs, false)?)
                    }
                    RelationalOperator::MatchesIcase | RelationalOperator::DoesntMatchIcase => {
                        Some(compile_pattern(rhs, true)?)
                    }
                    _ => None,
                };
                Predicate::Text {
                    get: get.clone(),
                    rhs: rhs.to_string(),
                    pattern,
                }
            }
            ColumnType::Int(get) => {
                match op {
                    RelationalOperator::Equal
                    | RelationalOperator::NotEqual
                    | RelationalOperator::Less
                    | RelationalOperator::GreaterOrEqual
                    | RelationalOperator::Greater
                    | RelationalOperator::LessOrEqual => {}
                    _ => {
                        return Err(ParseError::UnsupportedOperator {
                            op,
                            column: self.name.clone(),
                        })
                    }
                }
                let value = rhs
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| ParseError::InvalidIntValue(rhs.to_string()))?;
                Predicate::Int {
                    get: get.clone(),
                    rhs: value,
                }
            }
            ColumnType::List(get) => {
                match op {
                    RelationalOperator::Equal | RelationalOperator::NotEqual => {
                        if !rhs.is_empty() {
                            return Err(ParseError::ListOpNeedsEmptyValue(op));
                        }
                    }
                    RelationalOperator::GreaterOrEqual
                    | RelationalOperator::Less
                    | RelationalOperator::LessOrEqual
                    | RelationalOperator::Greater => {}
                    _ => {
                        return Err(ParseError::UnsupportedOperator {
                            op,
                            column: self.name.clone(),
                        })
                    }
                }
                Predicate::List {
                    get: get.clone(),
                    rhs: rhs.to_string(),
                }
            }
            ColumnType::Null => return Err(ParseError::Unfilterable(self.name.clone())),
        };
        Ok(Filter::Leaf(ColumnFilter {
            kind,
            column_name: self.name.clone(),
            op,
            predicate,
        }))
    }
}

fn compile_pattern(rhs: &str, icase: bool) -> Result<Regex, ParseError> {
    let source = if icase {
        format!("(?i){rhs}")
    } else {
        rhs.to_string()
    };
    Regex::new(&source).map_err(|e| ParseError::InvalidRegex(e.to_string()))
}
