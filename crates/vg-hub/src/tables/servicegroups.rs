//! # The servicegroups table

use vg_core::{fold_service_list, ServiceGroup, ServiceListFold};

use super::{Entity, Row, Table};
use crate::query::column::Column;

fn group<'a>(row: Row<'a>) -> Option<&'a ServiceGroup> {
    match row {
        Row::ServiceGroup(g) => Some(g),
        _ => None,
    }
}

pub fn table() -> Table {
    let text = |name: &str,
                description: &str,
                get: fn(&ServiceGroup) -> &String| {
        Column::text(name, description, move |row, _| {
            group(row).map(|g| get(g).clone()).unwrap_or_default()
        })
    };
    let fold = |name: &str, description: &str, what: ServiceListFold| {
        Column::int(name, description, move |row, ctx| {
            group(row)
                .map(|g| fold_service_list(ctx.world.members_of(g), what))
                .unwrap_or(0)
        })
    };

    let columns = vec![
        text("name", "The name of the service group", |g| &g.name),
        text("alias", "An alias of the service group", |g| &g.alias),
        text(
            "notes",
            "Optional additional notes about the service group",
            |g| &g.notes,
        ),
        text(
            "notes_url",
            "An optional URL to further notes on the service group",
            |g| &g.notes_url,
        ),
        text(
            "action_url",
            "An optional URL to custom notes or actions on the service group",
            |g| &g.action_url,
        ),
        Column::list(
            "members",
            "A list of all members of the service group as host/service pairs",
            |row, _| {
                group(row)
                    .map(|g| {
                        g.members
                            .iter()
                            .map(|m| vec![m.host_name.clone(), m.description.clone()])
                            .collect()
                    })
                    .unwrap_or_default()
            },
        ),
        Column::list(
            "members_with_state",
            "A list of all members of the service group with state and has_been_checked",
            |row, ctx| {
                group(row)
                    .map(|g| {
                        ctx.world
                            .members_of(g)
                            .map(|s| {
                                vec![
                                    s.host_name.clone(),
                                    s.description.clone(),
                                    s.state.as_int().to_string(),
                                    i64::from(s.has_been_checked).to_string(),
                                ]
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            },
        ),
        fold(
            "worst_service_state",
            "The worst soft state of all of the groups services (OK <= WARN <= UNKNOWN <= CRIT)",
            ServiceListFold::WorstState,
        ),
        fold(
            "num_services",
            "The total number of services in the group",
            ServiceListFold::Num,
        ),
        fold(
            "num_services_ok",
            "The number of services in the group that are OK",
            ServiceListFold::NumOk,
        ),
        fold(
            "num_services_warn",
            "The number of services in the group that are WARN",
            ServiceListFold::NumWarn,
        ),
        fold(
            "num_services_crit",
            "The number of services in the group that are CRIT",
            ServiceListFold::NumCrit,
        ),
        fold(
            "num_services_unknown",
            "The number of services in the group that are UNKNOWN",
            ServiceListFold::NumUnknown,
        ),
        fold(
            "num_services_pending",
            "The number of services in the group that are PENDING",
            ServiceListFold::NumPending,
        ),
    ];

    Table {
        name: "servicegroups",
        prefix: "servicegroup_",
        entity: Entity::ServiceGroups,
        columns,
    }
}
