//! # Monitoring State
//!
//! The world snapshot behind a single-writer / many-readers lock, the
//! state-file loader, and the optional background simulator that keeps
//! a demo world moving (and wait triggers firing).

use std::io;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use vg_core::{Host, HostState, Service, ServiceGroup, ServiceKey, ServiceState, World};

use crate::auth::AuthPolicies;
use crate::triggers::{TriggerKind, Triggers};

/// Shared monitoring state: the world, its wait triggers, and the
/// authorization policies that apply to it.
pub struct Monitor {
    world: RwLock<World>,
    pub triggers: Triggers,
    pub policies: AuthPolicies,
}

impl Monitor {
    pub fn new(world: World, policies: AuthPolicies) -> Self {
        Self {
            world: RwLock::new(world),
            triggers: Triggers::new(),
            policies,
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, World> {
        self.world.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, World> {
        self.world.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Load a world snapshot from a JSON state file.
pub fn load_world(path: &Path) -> io::Result<World> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// The built-in demo world used when no state file is given.
pub fn demo_world() -> World {
    let host = |name: &str, alias: &str, address: &str, contacts: &[&str]| Host {
        name: name.into(),
        alias: alias.into(),
        address: address.into(),
        state: HostState::Up,
        plugin_output: "PING OK - Packet loss = 0%".into(),
        contacts: contacts.iter().map(|c| c.to_string()).collect(),
    };
    let service = |host: &str, desc: &str, state: ServiceState, output: &str| Service {
        host_name: host.into(),
        description: desc.into(),
        state,
        plugin_output: output.into(),
        contacts: vec!["alice".into()],
        has_been_checked: true,
        last_state_change: 0,
    };
    let key = |host: &str, desc: &str| ServiceKey {
        host_name: host.into(),
        description: desc.into(),
    };

    World {
        hosts: vec![
            host("web01", "Webserver 1", "10.0.0.10", &["alice"]),
            host("web02", "Webserver 2", "10.0.0.11", &["alice"]),
            host("db01", "Database 1", "10.0.0.20", &["bob"]),
        ],
        services: vec![
            service("web01", "HTTP", ServiceState::Ok, "HTTP OK: 200 in 0.012s"),
            service("web01", "HTTPS", ServiceState::Ok, "HTTP OK: 200 in 0.015s"),
            service("web01", "Disk /", ServiceState::Warn, "DISK WARNING - 81% used"),
            service("web02", "HTTP", ServiceState::Ok, "HTTP OK: 200 in 0.011s"),
            service("web02", "Load", ServiceState::Crit, "CRITICAL - load 14.2"),
            service("db01", "MySQL", ServiceState::Ok, "Uptime: 8123456"),
            service("db01", "Replication", ServiceState::Ok, "Lag: 0s"),
        ],
        service_groups: vec![
            ServiceGroup {
                name: "web".into(),
                alias: "Web frontends".into(),
                notes: String::new(),
                notes_url: String::new(),
                action_url: String::new(),
                members: vec![
                    key("web01", "HTTP"),
                    key("web01", "HTTPS"),
                    key("web02", "HTTP"),
                    key("web02", "Load"),
                ],
            },
            ServiceGroup {
                name: "db".into(),
                alias: "Databases".into(),
                notes: "Primary database tier".into(),
                notes_url: String::new(),
                action_url: String::new(),
                members: vec![key("db01", "MySQL"), key("db01", "Replication")],
            },
        ],
        contacts: vec!["alice".into(), "bob".into()],
    }
}

/// Periodically advance one service through the state cycle and fire
/// the check/state triggers. Runs on its own thread; the write lock is
/// held only for the mutation itself.
pub fn spawn_simulator(monitor: Arc<Monitor>, interval: Duration) {
    std::thread::spawn(move || {
        let mut tick: usize = 0;
        loop {
            std::thread::sleep(interval);
            let changed = {
                let mut world = monitor.write();
                let len = world.services.len();
                if len == 0 {
                    false
                } else {
                    let service = &mut world.services[tick % len];
                    service.state = match service.state {
                        ServiceState::Ok => ServiceState::Warn,
                        ServiceState::Warn => ServiceState::Crit,
                        ServiceState::Crit => ServiceState::Ok,
                        ServiceState::Unknown => ServiceState::Ok,
                    };
                    service.last_state_change = chrono::Utc::now().timestamp();
                    tracing::debug!(
                        host = %service.host_name,
                        service = %service.description,
                        state = service.state.as_int(),
                        "simulator advanced service state"
                    );
                    true
                }
            };
            if changed {
                monitor.triggers.notify(TriggerKind::Check);
                monitor.triggers.notify(TriggerKind::State);
            }
            tick += 1;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_world_is_consistent() {
        let world = demo_world();
        assert!(!world.hosts.is_empty());
        for service in &world.services {
            assert!(world.host(&service.host_name).is_some(), "{}", service.host_name);
        }
        for group in &world.service_groups {
            for member in &group.members {
                assert!(
                    world.service(&member.host_name, &member.description).is_some(),
                    "{}/{}",
                    member.host_name,
                    member.description
                );
            }
        }
        for contact in ["alice", "bob"] {
            assert!(world.has_contact(contact));
        }
    }

    #[test]
    fn test_load_world_from_json_file() {
        let world = demo_world();
        let path = std::env::temp_dir().join("vg-hub-state-test.json");
        std::fs::write(&path, serde_json::to_string(&world).unwrap()).unwrap();
        let loaded = load_world(&path).unwrap();
        assert_eq!(loaded.hosts.len(), world.hosts.len());
        assert_eq!(loaded.service_groups.len(), world.service_groups.len());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_world_rejects_garbage() {
        let path = std::env::temp_dir().join("vg-hub-garbage-test.json");
        std::fs::write(&path, "not json at all").unwrap();
        assert!(load_world(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
