//! # The services table

use vg_core::Service;

use super::{Entity, Row, Table};
use crate::query::column::Column;

fn service<'a>(row: Row<'a>) -> Option<&'a Service> {
    match row {
        Row::Service(s) => Some(s),
        _ => None,
    }
}

pub fn table() -> Table {
    let text = |name: &str, description: &str, get: fn(&Service) -> &String| {
        Column::text(name, description, move |row, _| {
            service(row).map(|s| get(s).clone()).unwrap_or_default()
        })
    };

    let columns = vec![
        text("host_name", "The host this service runs on", |s| {
            &s.host_name
        }),
        text("description", "The description of the service", |s| {
            &s.description
        }),
        Column::int(
            "state",
            "The current state of the service (OK=0, WARN=1, CRIT=2, UNKNOWN=3)",
            |row, _| service(row).map(|s| s.state.as_int()).unwrap_or(0),
        ),
        text(
            "plugin_output",
            "Output of the last service check",
            |s| &s.plugin_output,
        ),
        Column::int(
            "has_been_checked",
            "Whether the service has been checked at least once (0/1)",
            |row, _| service(row).map(|s| i64::from(s.has_been_checked)).unwrap_or(0),
        ),
        Column::int(
            "last_state_change",
            "Unix timestamp of the last state change of the service",
            // Time-typed output is shifted into the client's time zone.
            |row, ctx| {
                service(row)
                    .map(|s| s.last_state_change + ctx.timezone_offset.num_seconds())
                    .unwrap_or(0)
            },
        ),
        Column::list(
            "contacts",
            "A list of all contacts of this service",
            |row, _| {
                service(row)
                    .map(|s| s.contacts.iter().map(|c| vec![c.clone()]).collect())
                    .unwrap_or_default()
            },
        ),
    ];

    Table {
        name: "services",
        prefix: "service_",
        entity: Entity::Services,
        columns,
    }
}
