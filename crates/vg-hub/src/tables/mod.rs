//! # Tables
//!
//! Each table names one entity kind, registers its columns in a fixed
//! order, resolves primary keys, and decides row visibility for a
//! principal. Rows are borrowed views into the world snapshot; the
//! reader lock held while answering keeps them alive.

pub mod hosts;
pub mod servicegroups;
pub mod services;

use std::sync::Arc;

use vg_core::{Host, Service, ServiceGroup, World};

use crate::auth::{AuthPolicies, User};
use crate::query::column::Column;

/// A borrowed view of one entity of some table.
#[derive(Clone, Copy)]
pub enum Row<'a> {
    Host(&'a Host),
    Service(&'a Service),
    ServiceGroup(&'a ServiceGroup),
}

enum Entity {
    Hosts,
    Services,
    ServiceGroups,
    /// A table with no rows, used to keep parsing a request addressed
    /// to an unknown table.
    Empty,
}

pub struct Table {
    name: &'static str,
    /// Column alias prefix: `servicegroup_name` resolves to `name`.
    prefix: &'static str,
    entity: Entity,
    columns: Vec<Arc<Column>>,
}

impl Table {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    /// Look up a column, also accepting the table's prefixed alias.
    pub fn column(&self, name: &str) -> Option<Arc<Column>> {
        let find = |n: &str| self.columns.iter().find(|c| c.name() == n).cloned();
        find(name).or_else(|| name.strip_prefix(self.prefix).and_then(find))
    }

    /// All rows, in the world's registration order.
    pub fn rows<'w>(&self, world: &'w World) -> Vec<Row<'w>> {
        match self.entity {
            Entity::Hosts => world.hosts.iter().map(Row::Host).collect(),
            Entity::Services => world.services.iter().map(Row::Service).collect(),
            Entity::ServiceGroups => world.service_groups.iter().map(Row::ServiceGroup).collect(),
            Entity::Empty => Vec::new(),
        }
    }

    /// Resolve a primary key to a single row.
    pub fn get<'w>(&self, world: &'w World, primary_key: &str) -> Option<Row<'w>> {
        match self.entity {
            Entity::Hosts => world.host(primary_key).map(Row::Host),
            Entity::Services => {
                let (host, description) = primary_key.split_once(';')?;
                world.service(host, description).map(Row::Service)
            }
            Entity::ServiceGroups => world.service_group(primary_key).map(Row::ServiceGroup),
            Entity::Empty => None,
        }
    }

    pub fn is_authorized(
        &self,
        row: Row<'_>,
        user: &User,
        world: &World,
        policies: AuthPolicies,
    ) -> bool {
        match row {
            Row::Host(h) => user.is_authorized_for_host(h),
            Row::Service(s) => user.is_authorized_for_service(s, world, policies),
            Row::ServiceGroup(g) => user.is_authorized_for_group(g, world, policies),
        }
    }

    /// The fallback for requests naming a table we do not have.
    pub fn empty() -> Table {
        Table {
            name: "",
            prefix: "",
            entity: Entity::Empty,
            columns: Vec::new(),
        }
    }
}

/// The fixed set of tables the hub serves.
pub struct TableRegistry {
    tables: Vec<Table>,
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TableRegistry {
    pub fn new() -> Self {
        Self {
            tables: vec![hosts::table(), services::table(), servicegroups::table()],
        }
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}
