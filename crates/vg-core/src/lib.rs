//! # vg-core — The data model of VIGILIA
//!
//! Defines the monitored universe: hosts, the services running on them,
//! and named service groups. These are plain records; the hub borrows
//! them for the duration of a query and never mutates them from the
//! query path.
//!
//! The [`World`] is the root snapshot. Everything a query can see hangs
//! off one `World`, and all cross-entity lookups (group members, the
//! services of a host) go through it.

use serde::{Deserialize, Serialize};

/// Host check state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    #[default]
    Up,
    Down,
    Unreachable,
}

impl HostState {
    /// Protocol integer for this state (UP=0, DOWN=1, UNREACHABLE=2).
    pub fn as_int(self) -> i64 {
        match self {
            Self::Up => 0,
            Self::Down => 1,
            Self::Unreachable => 2,
        }
    }
}

/// Service check state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    #[default]
    Ok,
    Warn,
    Crit,
    Unknown,
}

impl ServiceState {
    /// Protocol integer for this state (OK=0, WARN=1, CRIT=2, UNKNOWN=3).
    pub fn as_int(self) -> i64 {
        match self {
            Self::Ok => 0,
            Self::Warn => 1,
            Self::Crit => 2,
            Self::Unknown => 3,
        }
    }

    /// Badness rank used by "worst state" folds: OK < WARN < UNKNOWN < CRIT.
    pub fn severity(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Warn => 1,
            Self::Unknown => 2,
            Self::Crit => 3,
        }
    }
}

/// A monitored host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub state: HostState,
    #[serde(default)]
    pub plugin_output: String,
    /// Contacts allowed to see this host.
    #[serde(default)]
    pub contacts: Vec<String>,
}

/// A monitored service, keyed by `(host_name, description)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub host_name: String,
    pub description: String,
    #[serde(default)]
    pub state: ServiceState,
    #[serde(default)]
    pub plugin_output: String,
    #[serde(default)]
    pub contacts: Vec<String>,
    /// False while the service is still PENDING its first check.
    #[serde(default = "default_checked")]
    pub has_been_checked: bool,
    /// Unix time of the last state change, 0 if never.
    #[serde(default)]
    pub last_state_change: i64,
}

fn default_checked() -> bool {
    true
}

/// Reference to a service from a group member list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceKey {
    pub host_name: String,
    pub description: String,
}

/// A named group of services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceGroup {
    pub name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub notes_url: String,
    #[serde(default)]
    pub action_url: String,
    #[serde(default)]
    pub members: Vec<ServiceKey>,
}

/// The complete monitored universe, as one consistent snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct World {
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub service_groups: Vec<ServiceGroup>,
    /// Known contact names, for authorization lookups.
    #[serde(default)]
    pub contacts: Vec<String>,
}

impl World {
    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.name == name)
    }

    pub fn service(&self, host_name: &str, description: &str) -> Option<&Service> {
        self.services
            .iter()
            .find(|s| s.host_name == host_name && s.description == description)
    }

    pub fn service_group(&self, name: &str) -> Option<&ServiceGroup> {
        self.service_groups.iter().find(|g| g.name == name)
    }

    pub fn services_of_host<'a>(&'a self, host_name: &'a str) -> impl Iterator<Item = &'a Service> {
        self.services.iter().filter(move |s| s.host_name == host_name)
    }

    /// Resolve a group's member keys to live services. Dangling members
    /// (keys without a matching service) are skipped.
    pub fn members_of<'a>(&'a self, group: &'a ServiceGroup) -> impl Iterator<Item = &'a Service> {
        group
            .members
            .iter()
            .filter_map(move |m| self.service(&m.host_name, &m.description))
    }

    pub fn has_contact(&self, name: &str) -> bool {
        self.contacts.iter().any(|c| c == name)
    }
}

// =============================================================================
// Service-list folds
// =============================================================================

/// What to compute over a list of services (a group's members, or all
/// services of a host).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceListFold {
    Num,
    NumOk,
    NumWarn,
    NumCrit,
    NumUnknown,
    NumPending,
    WorstState,
}

/// Fold a service list down to one integer.
///
/// `WorstState` over an empty list is OK (0). Pending services do not
/// count toward any per-state bucket.
pub fn fold_service_list<'a>(
    services: impl Iterator<Item = &'a Service>,
    fold: ServiceListFold,
) -> i64 {
    let mut n: i64 = 0;
    let mut worst = ServiceState::Ok;
    for svc in services {
        let pending = !svc.has_been_checked;
        let counted = match fold {
            ServiceListFold::Num => true,
            ServiceListFold::NumOk => !pending && svc.state == ServiceState::Ok,
            ServiceListFold::NumWarn => !pending && svc.state == ServiceState::Warn,
            ServiceListFold::NumCrit => !pending && svc.state == ServiceState::Crit,
            ServiceListFold::NumUnknown => !pending && svc.state == ServiceState::Unknown,
            ServiceListFold::NumPending => pending,
            ServiceListFold::WorstState => {
                if !pending && svc.state.severity() > worst.severity() {
                    worst = svc.state;
                }
                false
            }
        };
        if counted {
            n += 1;
        }
    }
    match fold {
        ServiceListFold::WorstState => worst.as_int(),
        _ => n,
    }
}
