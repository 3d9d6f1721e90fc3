//! # Query Processing Core
//!
//! Turns the header lines of one request into an immutable [`ParsedQuery`]
//! plan and executes that plan against a table. The protocol is
//! stack-based: `Filter:` lines push predicates, `And:`/`Or:`/`Negate:`
//! combine them postfix, `Stats:` lines build the aggregation vector,
//! and the `Wait*` headers drive the optional pre-scan barrier.

pub mod column;
pub mod executor;
pub mod filter;
pub mod ops;
pub mod parser;
pub mod stats;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use vg_core::World;

use crate::auth::User;
use crate::output::{OutputFormat, ResponseHeader, Separators};
use crate::triggers::TriggerKind;
use column::Column;
use filter::Filter;
use ops::RelationalOperator;
use stats::StatsColumn;

/// Which stack a filter was built for. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Row,
    Stats,
    WaitCondition,
}

/// A failure while parsing one request header line.
///
/// These are caught at the header-dispatch boundary: the offending line
/// is reported as a `bad_request` and parsing continues.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("missing argument")]
    MissingArgument,
    #[error("expected non-negative integer")]
    ExpectedNonNegativeInteger,
    #[error("superfluous argument(s)")]
    SuperfluousArguments,
    #[error("undefined request header")]
    UndefinedHeader,
    #[error("invalid relational operator '{0}'")]
    UnknownOperator(String),
    #[error("table has no column '{0}'")]
    UnknownColumn(String),
    #[error("cannot combine filters: expecting {expected} filter(s), but only {actual} on stack")]
    StackUnderflow { expected: usize, actual: usize },
    #[error("cannot combine stats columns: aggregation columns have no filter")]
    StatsCombination,
    #[error("invalid value '{0}' for integer column")]
    InvalidIntValue(String),
    #[error("invalid regular expression: {0}")]
    InvalidRegex(String),
    #[error("operator {op} not supported on column '{column}'")]
    UnsupportedOperator {
        op: RelationalOperator,
        column: String,
    },
    #[error("operator {0} on a list column works only with an empty value")]
    ListOpNeedsEmptyValue(RelationalOperator),
    #[error("filtering on column '{0}' is not supported")]
    Unfilterable(String),
    #[error("cannot aggregate over non-numeric column '{0}'")]
    CannotAggregate(String),
    #[error("expected 'on' or 'off'")]
    ExpectedOnOff,
    #[error("missing/invalid output format, use one of 'CSV', 'csv', 'json', 'python', 'python3'")]
    InvalidOutputFormat,
    #[error("expected 'off' or 'fixed16'")]
    ExpectedResponseHeaderMode,
    #[error("unknown user '{0}'")]
    UnknownUser(String),
    #[error("unknown trigger '{0}'")]
    UnknownTrigger(String),
    #[error("primary key '{0}' not found or not supported by this table")]
    WaitObjectNotFound(String),
    #[error("timezone difference greater than or equal to 24 hours")]
    TimezoneTooLarge,
}

/// Evaluation context handed to column extractors and filters: the
/// world snapshot the reader lock currently protects, plus query-level
/// rendering parameters.
pub struct QueryContext<'w> {
    pub world: &'w World,
    pub timezone_offset: chrono::Duration,
}

/// The immutable plan produced from one request's header lines.
///
/// Built once by [`parser`], then only read: by the answerer, by the
/// output layer, and by the connection loop (`keepalive`).
pub struct ParsedQuery {
    /// Output columns, in request order.
    pub columns: Vec<Arc<Column>>,
    /// Aggregation slots, in request order. Non-empty switches the
    /// answerer into stats mode.
    pub stats_columns: Vec<StatsColumn>,
    /// Every column name the request touched anywhere.
    pub all_column_names: BTreeSet<String>,
    /// Root of the row filter (the `And` of the leftover filter stack).
    pub filter: Filter,
    /// Root of the wait-condition filter.
    pub wait_condition: Filter,
    pub user: User,
    /// Maximum number of emitted records; `None` is unbounded.
    pub limit: Option<usize>,
    /// Requested duration and the absolute deadline derived from it.
    pub time_limit: Option<(Duration, Instant)>,
    pub wait_timeout: Option<Duration>,
    pub wait_trigger: Option<TriggerKind>,
    /// Primary key of the wait object, validated at parse time and
    /// re-resolved under the reader lock by the answerer.
    pub wait_object: Option<String>,
    pub separators: Separators,
    pub output_format: OutputFormat,
    pub response_header: ResponseHeader,
    pub show_column_headers: bool,
    pub keepalive: bool,
    /// Client clock offset, quantized to half-hour steps.
    pub timezone_offset: chrono::Duration,
}
