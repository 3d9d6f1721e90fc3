//! # Answerer
//!
//! Executes a plan against one table: the optional wait barrier first,
//! then a single scan over the table's rows, dropping unauthorized and
//! filtered rows, emitting records or folding aggregations, and
//! stopping at the limit or the time limit.

use std::time::Instant;

use vg_core::World;

use super::column::{Column, ColumnValue};
use super::filter::Filter;
use super::stats::{Aggregation, StatsColumn};
use super::{ParsedQuery, QueryContext};
use crate::auth::AuthPolicies;
use crate::output::{cell_text, OutputBuffer, ResponseCode, ResultWriter};
use crate::state::Monitor;
use crate::tables::{Row, Table};
use crate::triggers::TriggerKind;

/// Per-group accumulator state for one stats column.
enum StatsSlot<'p> {
    Count { filter: &'p Filter, matched: u64 },
    Fold { column: &'p Column, agg: Aggregation },
}

impl<'p> StatsSlot<'p> {
    fn update(&mut self, row: Row<'_>, ctx: &QueryContext<'_>) {
        match self {
            StatsSlot::Count { filter, matched } => {
                if filter.accepts(row, ctx) {
                    *matched += 1;
                }
            }
            StatsSlot::Fold { column, agg } => agg.update(column.numeric_value(row, ctx)),
        }
    }

    fn value(&self) -> ColumnValue {
        match self {
            StatsSlot::Count { matched, .. } => ColumnValue::Int(*matched as i64),
            StatsSlot::Fold { agg, .. } => ColumnValue::Float(agg.value()),
        }
    }
}

fn make_slots(plan: &ParsedQuery) -> Vec<StatsSlot<'_>> {
    plan.stats_columns
        .iter()
        .map(|sc| match sc {
            StatsColumn::Count(filter) => StatsSlot::Count { filter, matched: 0 },
            StatsColumn::Op { kind, column } => StatsSlot::Fold {
                column: column.as_ref(),
                agg: Aggregation::new(*kind),
            },
        })
        .collect()
}

/// Run the plan and append the rendered result to `out`.
pub fn answer_query(plan: &ParsedQuery, table: &Table, monitor: &Monitor, out: &mut OutputBuffer) {
    if !wait_barrier(plan, table, monitor, out) {
        return;
    }

    let world = monitor.read();
    let ctx = QueryContext {
        world: &world,
        timezone_offset: plan.timezone_offset,
    };
    let mut writer = ResultWriter::new(plan.output_format, plan.separators);

    if plan.stats_columns.is_empty() {
        scan_rows(plan, table, &world, &ctx, monitor.policies, &mut writer);
    } else {
        scan_stats(plan, table, &world, &ctx, monitor.policies, &mut writer);
    }
    out.append(&writer.finish());
}

fn scan_rows(
    plan: &ParsedQuery,
    table: &Table,
    world: &World,
    ctx: &QueryContext<'_>,
    policies: AuthPolicies,
    writer: &mut ResultWriter,
) {
    if plan.show_column_headers {
        writer.add_row(
            plan.columns
                .iter()
                .map(|c| ColumnValue::Text(c.name().to_string()))
                .collect(),
        );
    }
    let mut emitted = 0usize;
    for row in table.rows(world) {
        if time_limit_reached(plan) {
            break;
        }
        if plan.limit.is_some_and(|limit| emitted >= limit) {
            break;
        }
        if !table.is_authorized(row, &plan.user, world, policies) {
            continue;
        }
        if !plan.filter.accepts(row, ctx) {
            continue;
        }
        writer.add_row(plan.columns.iter().map(|c| c.value(row, ctx)).collect());
        emitted += 1;
    }
}

fn scan_stats(
    plan: &ParsedQuery,
    table: &Table,
    world: &World,
    ctx: &QueryContext<'_>,
    policies: AuthPolicies,
    writer: &mut ResultWriter,
) {
    // With output columns present, rows group by their rendered column
    // values and every group folds its own aggregation vector.
    let grouped = !plan.columns.is_empty();
    let mut groups: Vec<(Vec<String>, Vec<ColumnValue>, Vec<StatsSlot<'_>>)> = Vec::new();
    if !grouped {
        groups.push((Vec::new(), Vec::new(), make_slots(plan)));
    }

    let mut matched = 0usize;
    for row in table.rows(world) {
        if time_limit_reached(plan) {
            break;
        }
        if plan.limit.is_some_and(|limit| matched >= limit) {
            break;
        }
        if !table.is_authorized(row, &plan.user, world, policies) {
            continue;
        }
        if !plan.filter.accepts(row, ctx) {
            continue;
        }
        let slot_index = if grouped {
            let cells: Vec<ColumnValue> = plan.columns.iter().map(|c| c.value(row, ctx)).collect();
            let key: Vec<String> = cells.iter().map(|c| cell_text(c, &plan.separators)).collect();
            match groups.iter().position(|(k, _, _)| *k == key) {
                Some(i) => i,
                None => {
                    groups.push((key, cells, make_slots(plan)));
                    groups.len() - 1
                }
            }
        } else {
            0
        };
        for slot in &mut groups[slot_index].2 {
            slot.update(row, ctx);
        }
        matched += 1;
    }

    if plan.show_column_headers {
        let mut header: Vec<ColumnValue> = plan
            .columns
            .iter()
            .map(|c| ColumnValue::Text(c.name().to_string()))
            .collect();
        header.extend(
            (0..plan.stats_columns.len()).map(|i| ColumnValue::Text(format!("stats_{}", i + 1))),
        );
        writer.add_row(header);
    }
    for (_, cells, slots) in groups {
        let mut row_cells = cells;
        row_cells.extend(slots.iter().map(StatsSlot::value));
        writer.add_row(row_cells);
    }
}

fn time_limit_reached(plan: &ParsedQuery) -> bool {
    match plan.time_limit {
        Some((duration, deadline)) if Instant::now() >= deadline => {
            tracing::warn!(
                limit_secs = duration.as_secs(),
                "time limit reached, truncating result"
            );
            true
        }
        _ => false,
    }
}

/// Block until the wait condition holds, the trigger times out, or the
/// condition turns out unsatisfiable. Returns false when the query must
/// not proceed.
fn wait_barrier(
    plan: &ParsedQuery,
    table: &Table,
    monitor: &Monitor,
    out: &mut OutputBuffer,
) -> bool {
    if plan.wait_trigger.is_none() && plan.wait_condition.is_tautology() {
        return true;
    }
    if plan.wait_condition.is_contradiction() {
        out.set_error(
            ResponseCode::BadRequest,
            "waiting for a condition that can never become true".to_string(),
        );
        return false;
    }
    let trigger = plan.wait_trigger.unwrap_or(TriggerKind::All);
    let deadline = plan.wait_timeout.map(|timeout| Instant::now() + timeout);
    loop {
        let baseline = monitor.triggers.generation(trigger);
        {
            let world = monitor.read();
            let ctx = QueryContext {
                world: &world,
                timezone_offset: plan.timezone_offset,
            };
            if wait_condition_holds(plan, table, &world, &ctx) {
                return true;
            }
        }
        if !monitor.triggers.wait_until_changed(trigger, baseline, deadline) {
            // Timeout is non-fatal: the scan proceeds regardless.
            tracing::debug!(trigger = trigger.name(), "wait timed out");
            return true;
        }
    }
}

fn wait_condition_holds(
    plan: &ParsedQuery,
    table: &Table,
    world: &World,
    ctx: &QueryContext<'_>,
) -> bool {
    if plan.wait_condition.is_tautology() {
        return true;
    }
    match &plan.wait_object {
        Some(key) => table
            .get(world, key)
            .is_some_and(|row| plan.wait_condition.accepts(row, ctx)),
        None => table
            .rows(world)
            .into_iter()
            .any(|row| plan.wait_condition.accepts(row, ctx)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ResponseHeader;
    use crate::tables::TableRegistry;
    use std::sync::Arc;
    use std::time::Duration;
    use vg_core::{Host, Service, ServiceGroup, ServiceKey, ServiceState};

    fn key(host: &str, desc: &str) -> ServiceKey {
        ServiceKey {
            host_name: host.into(),
            description: desc.into(),
        }
    }

    fn test_world() -> World {
        let svc = |host: &str, desc: &str, state: ServiceState, contacts: &[&str]| Service {
            host_name: host.into(),
            description: desc.into(),
            state,
            plugin_output: String::new(),
            contacts: contacts.iter().map(|c| c.to_string()).collect(),
            has_been_checked: true,
            last_state_change: 0,
        };
        World {
            hosts: vec![Host {
                name: "web01".into(),
                alias: "Webserver".into(),
                address: "10.0.0.1".into(),
                state: Default::default(),
                plugin_output: String::new(),
                contacts: vec!["alice".into()],
            }],
            services: vec![
                svc("web01", "HTTP", ServiceState::Ok, &["alice"]),
                svc("web01", "HTTPS", ServiceState::Crit, &["alice"]),
                svc("web01", "Disk /", ServiceState::Warn, &["bob"]),
            ],
            service_groups: vec![
                ServiceGroup {
                    name: "foo".into(),
                    alias: "barbican".into(),
                    notes: String::new(),
                    notes_url: String::new(),
                    action_url: String::new(),
                    members: vec![key("web01", "HTTP"), key("web01", "HTTPS")],
                },
                ServiceGroup {
                    name: "other".into(),
                    alias: "plain".into(),
                    notes: String::new(),
                    notes_url: String::new(),
                    action_url: String::new(),
                    members: vec![key("web01", "Disk /")],
                },
            ],
            contacts: vec!["alice".into(), "bob".into()],
        }
    }

    fn run_on(monitor: &Monitor, lines: &[&str]) -> (String, Option<ResponseCode>) {
        let registry = TableRegistry::new();
        let table = registry.get("servicegroups").unwrap();
        let mut out = OutputBuffer::new();
        let lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        let plan = {
            let world = monitor.read();
            ParsedQuery::parse(&lines, table, &world, &mut out)
        };
        if out.error().is_none() {
            answer_query(&plan, table, monitor, &mut out);
        }
        let code = out.error().map(|(c, _)| *c);
        let payload = String::from_utf8(out.render_response(ResponseHeader::Off)).unwrap();
        (payload, code)
    }

    fn run(lines: &[&str]) -> (String, Option<ResponseCode>) {
        let monitor = Monitor::new(test_world(), AuthPolicies::default());
        run_on(&monitor, lines)
    }

    #[test]
    fn test_simple_projection() {
        let (payload, code) = run(&["Columns: name num_services"]);
        assert_eq!(code, None);
        assert_eq!(payload, "foo;2\nother;1\n");
    }

    #[test]
    fn test_default_query_emits_all_columns_with_header() {
        let (payload, code) = run(&[]);
        assert_eq!(code, None);
        let mut lines = payload.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with(
            "name;alias;notes;notes_url;action_url;members;members_with_state;worst_service_state;num_services;"
        ));
        let first = lines.next().unwrap();
        assert!(first.starts_with("foo;barbican;;;;web01|HTTP,web01|HTTPS;"));
    }

    #[test]
    fn test_filter_with_negation() {
        let (payload, code) = run(&[
            "Columns: name",
            "Filter: name = foo",
            "Filter: alias ~ bar",
            "Negate:",
            "And: 2",
        ]);
        assert_eq!(code, None);
        assert_eq!(payload, "");
    }

    #[test]
    fn test_filter_matches_one_group() {
        let (payload, _) = run(&["Columns: name", "Filter: num_services_crit > 0"]);
        assert_eq!(payload, "foo\n");
    }

    #[test]
    fn test_stats_count_and_sum() {
        let (payload, code) = run(&["Stats: num_services_crit > 0", "Stats: sum num_services"]);
        assert_eq!(code, None);
        assert_eq!(payload, "1;3\n");
    }

    #[test]
    fn test_stats_or_combination() {
        let (payload, _) = run(&[
            "Stats: num_services_warn > 0",
            "Stats: num_services_crit > 0",
            "StatsOr: 2",
        ]);
        assert_eq!(payload, "2\n");
    }

    #[test]
    fn test_stats_respects_row_filter() {
        let (payload, _) = run(&["Filter: name = nosuch", "Stats: num_services_crit > 0"]);
        assert_eq!(payload, "0\n");
    }

    #[test]
    fn test_stats_avg() {
        let (payload, _) = run(&["Stats: avg num_services"]);
        assert_eq!(payload, "1.5\n");
    }

    #[test]
    fn test_stats_grouped_by_columns() {
        let (payload, code) = run(&["Columns: name", "Stats: sum num_services"]);
        assert_eq!(code, None);
        assert_eq!(payload, "foo;2\nother;1\n");
    }

    #[test]
    fn test_stats_header_row_when_forced_on() {
        let (payload, _) = run(&[
            "Columns: name",
            "Stats: sum num_services",
            "ColumnHeaders: on",
        ]);
        assert!(payload.starts_with("name;stats_1\n"));
    }

    #[test]
    fn test_limit_truncates() {
        let (payload, code) = run(&["Columns: name", "Limit: 1"]);
        assert_eq!(code, None);
        assert_eq!(payload, "foo\n");
    }

    #[test]
    fn test_limit_zero_emits_nothing() {
        let (payload, _) = run(&["Columns: name", "Limit: 0"]);
        assert_eq!(payload, "");
    }

    #[test]
    fn test_limit_larger_than_result_is_harmless() {
        let (payload, _) = run(&["Columns: name", "Limit: 99"]);
        assert_eq!(payload, "foo\nother\n");
    }

    #[test]
    fn test_expired_time_limit_truncates() {
        let (payload, code) = run(&["Columns: name", "Timelimit: 0"]);
        // Truncation by time is a success, not an error.
        assert_eq!(code, None);
        assert_eq!(payload, "");
    }

    #[test]
    fn test_unknown_output_column_renders_empty() {
        let (payload, code) = run(&["Columns: name bogus"]);
        assert_eq!(code, None);
        assert_eq!(payload, "foo;\nother;\n");
    }

    #[test]
    fn test_unauthorized_rows_are_dropped_silently() {
        // bob only reaches "other" through its Disk / membership.
        let (payload, code) = run(&["Columns: name", "AuthUser: bob"]);
        assert_eq!(code, None);
        assert_eq!(payload, "other\n");
    }

    #[test]
    fn test_json_output() {
        let (payload, _) = run(&["Columns: name num_services", "OutputFormat: json"]);
        let parsed: serde_json::Value = serde_json::from_str(payload.trim_end()).unwrap();
        assert_eq!(parsed, serde_json::json!([["foo", 2], ["other", 1]]));
    }

    #[test]
    fn test_wait_condition_already_true_does_not_block() {
        let (payload, code) = run(&[
            "Columns: name",
            "WaitObject: foo",
            "WaitCondition: num_services_crit > 0",
            "Filter: name = foo",
        ]);
        assert_eq!(code, None);
        assert_eq!(payload, "foo\n");
    }

    #[test]
    fn test_wait_timeout_is_non_fatal() {
        let start = std::time::Instant::now();
        let (payload, code) = run(&[
            "Columns: name",
            "WaitObject: other",
            "WaitCondition: num_services_crit > 0",
            "WaitTimeout: 50",
            "Filter: name = other",
        ]);
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(code, None);
        assert_eq!(payload, "other\n");
    }

    #[test]
    fn test_wait_wakes_on_trigger() {
        let monitor = Arc::new(Monitor::new(test_world(), AuthPolicies::default()));
        let writer = {
            let monitor = monitor.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                {
                    let mut world = monitor.write();
                    let disk = world
                        .services
                        .iter_mut()
                        .find(|s| s.description == "Disk /")
                        .unwrap();
                    disk.state = ServiceState::Crit;
                }
                monitor.triggers.notify(crate::triggers::TriggerKind::Check);
            })
        };
        let (payload, code) = run_on(
            &monitor,
            &[
                "Columns: name num_services_crit",
                "WaitObject: other",
                "WaitTrigger: check",
                "WaitTimeout: 5000",
                "WaitCondition: num_services_crit > 0",
                "Filter: name = other",
            ],
        );
        writer.join().unwrap();
        assert_eq!(code, None);
        assert_eq!(payload, "other;1\n");
    }

    #[test]
    fn test_unsatisfiable_wait_condition_is_rejected() {
        let (payload, code) = run(&["Columns: name", "WaitConditionOr: 0"]);
        assert_eq!(code, Some(ResponseCode::BadRequest));
        assert!(payload.contains("can never become true"));
    }
}
