//! # Filter Tree
//!
//! Boolean predicates over rows, built as a tagged tree: a leaf compares
//! one column against a literal, `And`/`Or` combine subtrees, and
//! negation is total (De Morgan at the connectives, operator complement
//! at the leaves).

use regex::Regex;

use super::column::{IntGetter, ListGetter, TextGetter};
use super::ops::RelationalOperator;
use super::{FilterKind, QueryContext};
use crate::tables::Row;

/// The typed comparison a leaf performs. The getter was bound by the
/// column that created the filter; the operator picks the semantics.
#[derive(Clone)]
pub enum Predicate {
    Text {
        get: TextGetter,
        rhs: String,
        /// Compiled pattern, present only for the regex operators.
        pattern: Option<Regex>,
    },
    Int {
        get: IntGetter,
        rhs: i64,
    },
    List {
        get: ListGetter,
        rhs: String,
    },
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Text { rhs, pattern, .. } => f
                .debug_struct("Predicate::Text")
                .field("rhs", rhs)
                .field("pattern", pattern)
                .finish(),
            Predicate::Int { rhs, .. } => {
                f.debug_struct("Predicate::Int").field("rhs", rhs).finish()
            }
            Predicate::List { rhs, .. } => {
                f.debug_struct("Predicate::List").field("rhs", rhs).finish()
            }
        }
    }
}

/// A leaf filter: one column, one operator, one right-hand side.
#[derive(Clone, Debug)]
pub struct ColumnFilter {
    pub kind: FilterKind,
    #[allow(dead_code)]
    pub column_name: String,
    pub op: RelationalOperator,
    pub predicate: Predicate,
}

impl ColumnFilter {
    pub fn accepts(&self, row: Row<'_>, ctx: &QueryContext<'_>) -> bool {
        match &self.predicate {
            Predicate::Text { get, rhs, pattern } => {
                let value = get(row, ctx);
                match self.op {
                    RelationalOperator::Equal => value == *rhs,
                    RelationalOperator::NotEqual => value != *rhs,
                    RelationalOperator::Matches | RelationalOperator::MatchesIcase => {
                        pattern.as_ref().is_some_and(|re| re.is_match(&value))
                    }
                    RelationalOperator::DoesntMatch | RelationalOperator::DoesntMatchIcase => {
                        !pattern.as_ref().is_some_and(|re| re.is_match(&value))
                    }
                    RelationalOperator::EqualIcase => value.to_lowercase() == rhs.to_lowercase(),
                    RelationalOperator::NotEqualIcase => value.to_lowercase() != rhs.to_lowercase(),
                    RelationalOperator::Less => value < *rhs,
                    RelationalOperator::GreaterOrEqual => value >= *rhs,
                    RelationalOperator::Greater => value > *rhs,
                    RelationalOperator::LessOrEqual => value <= *rhs,
                }
            }
            Predicate::Int { get, rhs } => {
                let value = get(row, ctx);
                match self.op {
                    RelationalOperator::Equal => value == *rhs,
                    RelationalOperator::NotEqual => value != *rhs,
                    RelationalOperator::Less => value < *rhs,
                    RelationalOperator::GreaterOrEqual => value >= *rhs,
                    RelationalOperator::Greater => value > *rhs,
                    RelationalOperator::LessOrEqual => value <= *rhs,
                    // Pattern operators are rejected at construction.
                    _ => false,
                }
            }
            Predicate::List { get, rhs } => {
                let elements = get(row, ctx);
                let contains = |icase: bool| {
                    elements.iter().any(|parts| {
                        let joined = parts.join("|");
                        if icase {
                            joined.to_lowercase() == rhs.to_lowercase()
                        } else {
                            joined == *rhs
                        }
                    })
                };
                match self.op {
                    RelationalOperator::Equal => elements.is_empty(),
                    RelationalOperator::NotEqual => !elements.is_empty(),
                    RelationalOperator::GreaterOrEqual => contains(false),
                    RelationalOperator::Less => !contains(false),
                    RelationalOperator::LessOrEqual => contains(true),
                    RelationalOperator::Greater => !contains(true),
                    // Everything else is rejected at construction.
                    _ => false,
                }
            }
        }
    }

    pub fn negate(mut self) -> Self {
        self.op = self.op.negate();
        self
    }
}

/// A filter tree node. `And` over no subfilters accepts everything,
/// `Or` over no subfilters accepts nothing.
#[derive(Clone, Debug)]
pub enum Filter {
    Leaf(ColumnFilter),
    And { kind: FilterKind, subs: Vec<Filter> },
    Or { kind: FilterKind, subs: Vec<Filter> },
}

impl Filter {
    /// Smart constructor: empty input yields the identity element, a
    /// single subfilter passes through unchanged.
    pub fn make_and(kind: FilterKind, mut subs: Vec<Filter>) -> Filter {
        if subs.len() == 1 {
            subs.remove(0)
        } else {
            Filter::And { kind, subs }
        }
    }

    /// `Or` counterpart of [`Filter::make_and`].
    pub fn make_or(kind: FilterKind, mut subs: Vec<Filter>) -> Filter {
        if subs.len() == 1 {
            subs.remove(0)
        } else {
            Filter::Or { kind, subs }
        }
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            Filter::Leaf(f) => f.kind,
            Filter::And { kind, .. } | Filter::Or { kind, .. } => *kind,
        }
    }

    /// Pure evaluation against one row.
    pub fn accepts(&self, row: Row<'_>, ctx: &QueryContext<'_>) -> bool {
        match self {
            Filter::Leaf(f) => f.accepts(row, ctx),
            Filter::And { subs, .. } => subs.iter().all(|f| f.accepts(row, ctx)),
            Filter::Or { subs, .. } => subs.iter().any(|f| f.accepts(row, ctx)),
        }
    }

    /// A semantically equivalent negation of this tree.
    pub fn negate(self) -> Filter {
        match self {
            Filter::Leaf(f) => Filter::Leaf(f.negate()),
            Filter::And { kind, subs } => Filter::Or {
                kind,
                subs: subs.into_iter().map(Filter::negate).collect(),
            },
            Filter::Or { kind, subs } => Filter::And {
                kind,
                subs: subs.into_iter().map(Filter::negate).collect(),
            },
        }
    }

    /// True when this filter accepts every row by construction.
    pub fn is_tautology(&self) -> bool {
        match self {
            Filter::And { subs, .. } => subs.iter().all(Filter::is_tautology),
            _ => false,
        }
    }

    /// True when this filter can never accept a row, whatever the data.
    pub fn is_contradiction(&self) -> bool {
        match self {
            Filter::Leaf(_) => false,
            Filter::And { subs, .. } => subs.iter().any(Filter::is_contradiction),
            Filter::Or { subs, .. } => subs.iter().all(Filter::is_contradiction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::column::Column;
    use vg_core::{Host, World};

    fn host(name: &str, alias: &str) -> Host {
        Host {
            name: name.into(),
            alias: alias.into(),
            address: String::new(),
            state: Default::default(),
            plugin_output: String::new(),
            contacts: vec![],
        }
    }

    fn name_column() -> std::sync::Arc<Column> {
        Column::text("name", "host name", |row, _| match row {
            Row::Host(h) => h.name.clone(),
            _ => String::new(),
        })
    }

    fn leaf(op: &str, rhs: &str) -> Filter {
        name_column()
            .create_filter(
                FilterKind::Row,
                RelationalOperator::from_name(op).unwrap(),
                rhs,
            )
            .unwrap()
    }

    fn ctx(world: &World) -> QueryContext<'_> {
        QueryContext {
            world,
            timezone_offset: chrono::Duration::zero(),
        }
    }

    #[test]
    fn test_and_identity_accepts_everything() {
        let world = World::default();
        let h = host("web01", "");
        let f = Filter::make_and(FilterKind::Row, vec![]);
        assert!(f.accepts(Row::Host(&h), &ctx(&world)));
        assert!(f.is_tautology());
    }

    #[test]
    fn test_or_identity_accepts_nothing() {
        let world = World::default();
        let h = host("web01", "");
        let f = Filter::make_or(FilterKind::Row, vec![]);
        assert!(!f.accepts(Row::Host(&h), &ctx(&world)));
        assert!(f.is_contradiction());
    }

    #[test]
    fn test_single_subfilter_passes_through() {
        let f = Filter::make_and(FilterKind::Row, vec![leaf("=", "web01")]);
        assert!(matches!(f, Filter::Leaf(_)));
    }

    #[test]
    fn test_and_or_evaluation() {
        let world = World::default();
        let h = host("web01", "");
        let both = Filter::make_and(FilterKind::Row, vec![leaf("=", "web01"), leaf("!=", "db01")]);
        assert!(both.accepts(Row::Host(&h), &ctx(&world)));

        let either = Filter::make_or(FilterKind::Row, vec![leaf("=", "db01"), leaf("=", "web01")]);
        assert!(either.accepts(Row::Host(&h), &ctx(&world)));

        let neither = Filter::make_or(FilterKind::Row, vec![leaf("=", "db01"), leaf("=", "db02")]);
        assert!(!neither.accepts(Row::Host(&h), &ctx(&world)));
    }

    #[test]
    fn test_negation_uses_de_morgan() {
        let world = World::default();
        let matching = host("web01", "");
        let other = host("db01", "");
        let f = Filter::make_and(FilterKind::Row, vec![leaf("=", "web01"), leaf("~", "^web")]);
        let negated = f.negate();
        assert!(matches!(&negated, Filter::Or { subs, .. } if subs.len() == 2));
        assert!(!negated.accepts(Row::Host(&matching), &ctx(&world)));
        assert!(negated.accepts(Row::Host(&other), &ctx(&world)));
    }

    #[test]
    fn test_double_negation_is_equivalent() {
        let world = World::default();
        let hosts = [host("web01", ""), host("db01", ""), host("Web02", "")];
        let f = Filter::make_or(FilterKind::Row, vec![leaf("~~", "web"), leaf("=", "db01")]);
        let roundtrip = f.clone().negate().negate();
        for h in &hosts {
            assert_eq!(
                f.accepts(Row::Host(h), &ctx(&world)),
                roundtrip.accepts(Row::Host(h), &ctx(&world))
            );
        }
    }

    #[test]
    fn test_regex_operators() {
        let world = World::default();
        let h = host("web01", "");
        assert!(leaf("~", "eb0").accepts(Row::Host(&h), &ctx(&world)));
        assert!(!leaf("~", "^eb").accepts(Row::Host(&h), &ctx(&world)));
        assert!(leaf("~~", "WEB").accepts(Row::Host(&h), &ctx(&world)));
        assert!(leaf("!~", "db").accepts(Row::Host(&h), &ctx(&world)));
    }

    #[test]
    fn test_case_insensitive_equality() {
        let world = World::default();
        let h = host("Web01", "");
        assert!(leaf("=~", "web01").accepts(Row::Host(&h), &ctx(&world)));
        assert!(!leaf("=", "web01").accepts(Row::Host(&h), &ctx(&world)));
    }

    #[test]
    fn test_lexicographic_ordering_on_text() {
        let world = World::default();
        let h = host("bbb", "");
        assert!(leaf("<", "ccc").accepts(Row::Host(&h), &ctx(&world)));
        assert!(leaf(">=", "bbb").accepts(Row::Host(&h), &ctx(&world)));
        assert!(!leaf(">", "bbb").accepts(Row::Host(&h), &ctx(&world)));
    }

    #[test]
    fn test_filter_kind_is_preserved() {
        let f = Filter::make_and(
            FilterKind::WaitCondition,
            vec![
                leaf("=", "a"), // kind Row on the leaf, but the node keeps its own
                leaf("=", "b"),
            ],
        );
        assert_eq!(f.kind(), FilterKind::WaitCondition);
    }
}
