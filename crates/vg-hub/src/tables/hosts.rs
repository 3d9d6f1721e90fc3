//! # The hosts table

use vg_core::{fold_service_list, Host, ServiceListFold};

use super::{Entity, Row, Table};
use crate::query::column::Column;

fn host<'a>(row: Row<'a>) -> Option<&'a Host> {
    match row {
        Row::Host(h) => Some(h),
        _ => None,
    }
}

pub fn table() -> Table {
    let text = |name: &str, description: &str, get: fn(&Host) -> &String| {
        Column::text(name, description, move |row, _| {
            host(row).map(|h| get(h).clone()).unwrap_or_default()
        })
    };
    let fold = |name: &str, description: &str, what: ServiceListFold| {
        Column::int(name, description, move |row, ctx| {
            host(row)
                .map(|h| fold_service_list(ctx.world.services_of_host(&h.name), what))
                .unwrap_or(0)
        })
    };

    let columns = vec![
        text("name", "The name of the host", |h| &h.name),
        text("alias", "An alias of the host", |h| &h.alias),
        text("address", "The address of the host", |h| &h.address),
        Column::int(
            "state",
            "The current state of the host (UP=0, DOWN=1, UNREACHABLE=2)",
            |row, _| host(row).map(|h| h.state.as_int()).unwrap_or(0),
        ),
        text(
            "plugin_output",
            "Output of the last host check",
            |h| &h.plugin_output,
        ),
        Column::list("contacts", "A list of all contacts of this host", |row, _| {
            host(row)
                .map(|h| h.contacts.iter().map(|c| vec![c.clone()]).collect())
                .unwrap_or_default()
        }),
        fold(
            "num_services",
            "The total number of services of the host",
            ServiceListFold::Num,
        ),
        fold(
            "num_services_ok",
            "The number of the host's services that are OK",
            ServiceListFold::NumOk,
        ),
        fold(
            "num_services_warn",
            "The number of the host's services that are WARN",
            ServiceListFold::NumWarn,
        ),
        fold(
            "num_services_crit",
            "The number of the host's services that are CRIT",
            ServiceListFold::NumCrit,
        ),
        fold(
            "worst_service_state",
            "The worst state of all of the host's services (OK <= WARN <= UNKNOWN <= CRIT)",
            ServiceListFold::WorstState,
        ),
    ];

    Table {
        name: "hosts",
        prefix: "host_",
        entity: Entity::Hosts,
        columns,
    }
}
