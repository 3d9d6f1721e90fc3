//! # Request Header Parser
//!
//! Consumes the header lines of one request and produces the immutable
//! [`ParsedQuery`] plan. Each line is dispatched on its header name; a
//! failing line is recorded as a `bad_request` on the output buffer and
//! parsing continues, so the plan is always usable.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use vg_core::World;

use super::column::Column;
use super::filter::Filter;
use super::ops::RelationalOperator;
use super::stats::{AggregationKind, StatsColumn};
use super::{FilterKind, ParseError, ParsedQuery};
use crate::auth::User;
use crate::output::{OutputBuffer, OutputFormat, ResponseCode, ResponseHeader, Separators};
use crate::tables::Table;
use crate::triggers::TriggerKind;

/// The protocol's whitespace set.
const WHITESPACE: &[char] = &[' ', '\t', '\n', '\x0b', '\x0c', '\r'];

// =============================================================================
// Lexical helpers
// =============================================================================

/// Skip leading whitespace and take the next maximal non-whitespace run,
/// advancing `line` past it.
fn next_string_argument<'a>(line: &mut &'a str) -> Result<&'a str, ParseError> {
    *line = line.trim_start_matches(WHITESPACE);
    if line.is_empty() {
        return Err(ParseError::MissingArgument);
    }
    let end = line.find(WHITESPACE).unwrap_or(line.len());
    let (argument, rest) = line.split_at(end);
    *line = rest;
    Ok(argument)
}

/// Like [`next_string_argument`], parsed as a base-10 non-negative
/// integer. Signs and trailing junk are rejected.
fn next_non_negative_integer_argument(line: &mut &str) -> Result<i64, ParseError> {
    let argument = next_string_argument(line)?;
    if argument.starts_with('+') {
        return Err(ParseError::ExpectedNonNegativeInteger);
    }
    match argument.parse::<i64>() {
        Ok(value) if value >= 0 => Ok(value),
        _ => Err(ParseError::ExpectedNonNegativeInteger),
    }
}

fn check_no_arguments(line: &str) -> Result<(), ParseError> {
    if line.trim_matches(WHITESPACE).is_empty() {
        Ok(())
    } else {
        Err(ParseError::SuperfluousArguments)
    }
}

// =============================================================================
// Stack combinators
// =============================================================================

type Connective = fn(FilterKind, Vec<Filter>) -> Filter;

fn parse_and_or_line(
    mut line: &str,
    kind: FilterKind,
    connective: Connective,
    filters: &mut Vec<Filter>,
) -> Result<(), ParseError> {
    let number = next_non_negative_integer_argument(&mut line)? as usize;
    let mut subfilters = Vec::with_capacity(number);
    for i in 0..number {
        match filters.pop() {
            Some(f) => subfilters.push(f),
            None => {
                return Err(ParseError::StackUnderflow {
                    expected: number,
                    actual: i,
                })
            }
        }
    }
    // Popping reversed them; restore push order as child order.
    subfilters.reverse();
    filters.push(connective(kind, subfilters));
    Ok(())
}

fn parse_negate_line(line: &str, filters: &mut Vec<Filter>) -> Result<(), ParseError> {
    check_no_arguments(line)?;
    match filters.pop() {
        Some(top) => {
            filters.push(top.negate());
            Ok(())
        }
        None => Err(ParseError::StackUnderflow {
            expected: 1,
            actual: 0,
        }),
    }
}

fn parse_filter_line(
    mut line: &str,
    kind: FilterKind,
    filters: &mut Vec<Filter>,
    all_column_names: &mut BTreeSet<String>,
    table: &Table,
) -> Result<(), ParseError> {
    let column_name = next_string_argument(&mut line)?;
    let rel_op = RelationalOperator::from_name(next_string_argument(&mut line)?)?;
    let rhs = line.trim_start_matches(WHITESPACE);
    let column = table
        .column(column_name)
        .ok_or_else(|| ParseError::UnknownColumn(column_name.to_string()))?;
    filters.push(column.create_filter(kind, rel_op, rhs)?);
    all_column_names.insert(column_name.to_string());
    Ok(())
}

// =============================================================================
// The builder
// =============================================================================

struct Builder {
    columns: Vec<Arc<Column>>,
    stats_columns: Vec<StatsColumn>,
    all_column_names: BTreeSet<String>,
    filters: Vec<Filter>,
    wait_conditions: Vec<Filter>,
    user: User,
    limit: Option<usize>,
    time_limit: Option<(Duration, Instant)>,
    wait_timeout: Option<Duration>,
    wait_trigger: Option<TriggerKind>,
    wait_object: Option<String>,
    separators: Separators,
    output_format: OutputFormat,
    response_header: ResponseHeader,
    show_column_headers: bool,
    keepalive: bool,
    timezone_offset: chrono::Duration,
}

impl Builder {
    fn new() -> Self {
        Self {
            columns: Vec::new(),
            stats_columns: Vec::new(),
            all_column_names: BTreeSet::new(),
            filters: Vec::new(),
            wait_conditions: Vec::new(),
            user: User::NoAuth,
            limit: None,
            time_limit: None,
            wait_timeout: None,
            wait_trigger: None,
            wait_object: None,
            separators: Separators::default(),
            output_format: OutputFormat::BrokenCsv,
            response_header: ResponseHeader::Off,
            show_column_headers: true,
            keepalive: false,
            timezone_offset: chrono::Duration::zero(),
        }
    }

    fn parse_stats_and_or_line(
        &mut self,
        mut line: &str,
        connective: Connective,
    ) -> Result<(), ParseError> {
        let number = next_non_negative_integer_argument(&mut line)? as usize;
        let mut subfilters = Vec::with_capacity(number);
        for i in 0..number {
            match self.stats_columns.pop() {
                Some(sc) => subfilters.push(sc.steal_filter()?),
                None => {
                    return Err(ParseError::StackUnderflow {
                        expected: number,
                        actual: i,
                    })
                }
            }
        }
        subfilters.reverse();
        self.stats_columns
            .push(StatsColumn::Count(connective(FilterKind::Stats, subfilters)));
        Ok(())
    }

    fn parse_stats_negate_line(&mut self, line: &str) -> Result<(), ParseError> {
        check_no_arguments(line)?;
        match self.stats_columns.pop() {
            Some(sc) => {
                let filter = sc.steal_filter()?;
                self.stats_columns.push(StatsColumn::Count(filter.negate()));
                Ok(())
            }
            None => Err(ParseError::StackUnderflow {
                expected: 1,
                actual: 0,
            }),
        }
    }

    fn parse_stats_line(&mut self, mut line: &str, table: &Table) -> Result<(), ParseError> {
        // First token is either an aggregation operator or a column name.
        let col_or_op = next_string_argument(&mut line)?;
        let column_name;
        let sc = match AggregationKind::from_name(col_or_op) {
            Some(kind) => {
                column_name = next_string_argument(&mut line)?.to_string();
                let column = table
                    .column(&column_name)
                    .ok_or_else(|| ParseError::UnknownColumn(column_name.clone()))?;
                if !column.is_numeric() {
                    return Err(ParseError::CannotAggregate(column_name.clone()));
                }
                StatsColumn::Op { kind, column }
            }
            None => {
                column_name = col_or_op.to_string();
                let rel_op = RelationalOperator::from_name(next_string_argument(&mut line)?)?;
                let rhs = line.trim_start_matches(WHITESPACE);
                let column = table
                    .column(&column_name)
                    .ok_or_else(|| ParseError::UnknownColumn(column_name.clone()))?;
                StatsColumn::Count(column.create_filter(FilterKind::Stats, rel_op, rhs)?)
            }
        };
        self.stats_columns.push(sc);
        self.all_column_names.insert(column_name);
        // Stats queries suppress the header row unless asked for later.
        self.show_column_headers = false;
        Ok(())
    }

    fn parse_columns_line(&mut self, line: &str, table: &Table) -> Result<(), ParseError> {
        for column_name in line.split(WHITESPACE).filter(|t| !t.is_empty()) {
            let column = table
                .column(column_name)
                .unwrap_or_else(|| Column::null(column_name));
            self.columns.push(column);
            self.all_column_names.insert(column_name.to_string());
        }
        self.show_column_headers = false;
        Ok(())
    }

    fn parse_column_headers_line(&mut self, mut line: &str) -> Result<(), ParseError> {
        self.show_column_headers = parse_on_off(next_string_argument(&mut line)?)?;
        Ok(())
    }

    fn parse_limit_line(&mut self, mut line: &str) -> Result<(), ParseError> {
        self.limit = Some(next_non_negative_integer_argument(&mut line)? as usize);
        Ok(())
    }

    fn parse_timelimit_line(&mut self, mut line: &str) -> Result<(), ParseError> {
        let duration = Duration::from_secs(next_non_negative_integer_argument(&mut line)? as u64);
        self.time_limit = Some((duration, Instant::now() + duration));
        Ok(())
    }

    fn parse_auth_user_line(&mut self, line: &str, world: &World) -> Result<(), ParseError> {
        self.user = User::find(line, world)?;
        Ok(())
    }

    fn parse_separators_line(&mut self, mut line: &str) -> Result<(), ParseError> {
        let dataset = next_non_negative_integer_argument(&mut line)? as u8;
        let field = next_non_negative_integer_argument(&mut line)? as u8;
        let list = next_non_negative_integer_argument(&mut line)? as u8;
        let host_service = next_non_negative_integer_argument(&mut line)? as u8;
        self.separators = Separators {
            dataset,
            field,
            list,
            host_service,
        };
        Ok(())
    }

    fn parse_output_format_line(&mut self, mut line: &str) -> Result<(), ParseError> {
        self.output_format = match next_string_argument(&mut line)? {
            "CSV" => OutputFormat::Csv,
            "csv" => OutputFormat::BrokenCsv,
            "json" => OutputFormat::Json,
            // "python" is an alias kept for older clients.
            "python" | "python3" => OutputFormat::Python3,
            _ => return Err(ParseError::InvalidOutputFormat),
        };
        Ok(())
    }

    fn parse_response_header_line(&mut self, mut line: &str) -> Result<(), ParseError> {
        self.response_header = match next_string_argument(&mut line)? {
            "off" => ResponseHeader::Off,
            "fixed16" => ResponseHeader::Fixed16,
            _ => return Err(ParseError::ExpectedResponseHeaderMode),
        };
        Ok(())
    }

    fn parse_keep_alive_line(&mut self, mut line: &str) -> Result<(), ParseError> {
        self.keepalive = parse_on_off(next_string_argument(&mut line)?)?;
        Ok(())
    }

    fn parse_wait_timeout_line(&mut self, mut line: &str) -> Result<(), ParseError> {
        self.wait_timeout = Some(Duration::from_millis(
            next_non_negative_integer_argument(&mut line)? as u64,
        ));
        Ok(())
    }

    fn parse_wait_trigger_line(&mut self, mut line: &str) -> Result<(), ParseError> {
        let name = next_string_argument(&mut line)?;
        self.wait_trigger = Some(
            TriggerKind::from_name(name).ok_or_else(|| ParseError::UnknownTrigger(name.to_string()))?,
        );
        Ok(())
    }

    fn parse_wait_object_line(
        &mut self,
        line: &str,
        table: &Table,
        world: &World,
    ) -> Result<(), ParseError> {
        if table.get(world, line).is_none() {
            return Err(ParseError::WaitObjectNotFound(line.to_string()));
        }
        self.wait_object = Some(line.to_string());
        Ok(())
    }

    fn parse_localtime_line(&mut self, mut line: &str) -> Result<(), ParseError> {
        // Compute the offset between the client clock and ours, rounded
        // to half-hour steps: the clocks are assumed synchronized and
        // the difference attributed to time zones.
        let client_time = next_non_negative_integer_argument(&mut line)?;
        let offset = client_time - chrono::Utc::now().timestamp();
        let quantized = (offset as f64 / 1800.0).round() as i64 * 1800;
        if quantized.abs() >= 24 * 3600 {
            return Err(ParseError::TimezoneTooLarge);
        }
        self.timezone_offset = chrono::Duration::seconds(quantized);
        Ok(())
    }

    fn finish(mut self, table: &Table) -> ParsedQuery {
        if self.columns.is_empty() && self.stats_columns.is_empty() {
            for column in table.columns() {
                self.all_column_names.insert(column.name().to_string());
                self.columns.push(column.clone());
            }
            // A projection-less query always gets its header row, even
            // when an earlier ColumnHeaders: line turned it off.
            self.show_column_headers = true;
        }
        if self.filters.len() > 1 {
            tracing::debug!(
                leftover = self.filters.len(),
                "implicitly combining leftover row filters with And"
            );
        }
        let filter = Filter::make_and(FilterKind::Row, self.filters);
        let wait_condition = Filter::make_and(FilterKind::WaitCondition, self.wait_conditions);
        ParsedQuery {
            columns: self.columns,
            stats_columns: self.stats_columns,
            all_column_names: self.all_column_names,
            filter,
            wait_condition,
            user: self.user,
            limit: self.limit,
            time_limit: self.time_limit,
            wait_timeout: self.wait_timeout,
            wait_trigger: self.wait_trigger,
            wait_object: self.wait_object,
            separators: self.separators,
            output_format: self.output_format,
            response_header: self.response_header,
            show_column_headers: self.show_column_headers,
            keepalive: self.keepalive,
            timezone_offset: self.timezone_offset,
        }
    }
}

fn parse_on_off(value: &str) -> Result<bool, ParseError> {
    match value {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(ParseError::ExpectedOnOff),
    }
}

impl ParsedQuery {
    /// Build a plan from one request's header lines. Per-line failures
    /// are recorded on `out` as `bad_request` and do not stop parsing.
    pub fn parse(lines: &[String], table: &Table, world: &World, out: &mut OutputBuffer) -> Self {
        let mut b = Builder::new();
        for line_str in lines {
            let line = line_str.as_str();
            let (header, rest) = match line.split_once(':') {
                Some((header, rest)) => (header, rest),
                None => (line, ""),
            };
            let rest = rest.trim_start_matches(WHITESPACE);
            let result = match header {
                "Filter" => parse_filter_line(
                    rest,
                    FilterKind::Row,
                    &mut b.filters,
                    &mut b.all_column_names,
                    table,
                ),
                "And" => parse_and_or_line(rest, FilterKind::Row, Filter::make_and, &mut b.filters),
                "Or" => parse_and_or_line(rest, FilterKind::Row, Filter::make_or, &mut b.filters),
                "Negate" => parse_negate_line(rest, &mut b.filters),
                "Stats" => b.parse_stats_line(rest, table),
                "StatsAnd" => b.parse_stats_and_or_line(rest, Filter::make_and),
                "StatsOr" => b.parse_stats_and_or_line(rest, Filter::make_or),
                "StatsNegate" => b.parse_stats_negate_line(rest),
                "Columns" => b.parse_columns_line(rest, table),
                "ColumnHeaders" => b.parse_column_headers_line(rest),
                "Limit" => b.parse_limit_line(rest),
                "Timelimit" => b.parse_timelimit_line(rest),
                "AuthUser" => b.parse_auth_user_line(rest, world),
                "Separators" => b.parse_separators_line(rest),
                "OutputFormat" => b.parse_output_format_line(rest),
                "ResponseHeader" => b.parse_response_header_line(rest),
                "KeepAlive" => b.parse_keep_alive_line(rest),
                "WaitCondition" => parse_filter_line(
                    rest,
                    FilterKind::WaitCondition,
                    &mut b.wait_conditions,
                    &mut b.all_column_names,
                    table,
                ),
                "WaitConditionAnd" => parse_and_or_line(
                    rest,
                    FilterKind::WaitCondition,
                    Filter::make_and,
                    &mut b.wait_conditions,
                ),
                "WaitConditionOr" => parse_and_or_line(
                    rest,
                    FilterKind::WaitCondition,
                    Filter::make_or,
                    &mut b.wait_conditions,
                ),
                "WaitConditionNegate" => parse_negate_line(rest, &mut b.wait_conditions),
                "WaitTrigger" => b.parse_wait_trigger_line(rest),
                "WaitObject" => b.parse_wait_object_line(rest, table, world),
                "WaitTimeout" => b.parse_wait_timeout_line(rest),
                "Localtime" => b.parse_localtime_line(rest),
                _ => Err(ParseError::UndefinedHeader),
            };
            if let Err(err) = result {
                out.set_error(
                    ResponseCode::BadRequest,
                    format!(
                        "while processing header '{}' for table '{}': {}",
                        header,
                        table.name(),
                        err
                    ),
                );
            }
        }
        b.finish(table)
    }
}
