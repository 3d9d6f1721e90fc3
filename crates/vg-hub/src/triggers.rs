//! # Wait Triggers
//!
//! Named wakeup channels for `WaitTrigger:`. State writers fire a
//! trigger after changing the world; blocked queries re-check their wait
//! condition on every firing. `all` additionally fires whenever any
//! other trigger does.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Instant;

const TRIGGER_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    All,
    Check,
    State,
    Log,
    Downtime,
    Comment,
    Command,
    Program,
}

impl TriggerKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "all" => Some(Self::All),
            "check" => Some(Self::Check),
            "state" => Some(Self::State),
            "log" => Some(Self::Log),
            "downtime" => Some(Self::Downtime),
            "comment" => Some(Self::Comment),
            "command" => Some(Self::Command),
            "program" => Some(Self::Program),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Check => "check",
            Self::State => "state",
            Self::Log => "log",
            Self::Downtime => "downtime",
            Self::Comment => "comment",
            Self::Command => "command",
            Self::Program => "program",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::All => 0,
            Self::Check => 1,
            Self::State => 2,
            Self::Log => 3,
            Self::Downtime => 4,
            Self::Comment => 5,
            Self::Command => 6,
            Self::Program => 7,
        }
    }
}

/// Condvar-backed trigger set. Each trigger carries a generation
/// counter; waiting means blocking until the counter moves past an
/// observed baseline.
pub struct Triggers {
    generations: Mutex<[u64; TRIGGER_COUNT]>,
    cond: Condvar,
}

impl Default for Triggers {
    fn default() -> Self {
        Self::new()
    }
}

impl Triggers {
    pub fn new() -> Self {
        Self {
            generations: Mutex::new([0; TRIGGER_COUNT]),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, [u64; TRIGGER_COUNT]> {
        self.generations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fire a trigger, waking all waiters on it and on `all`.
    pub fn notify(&self, kind: TriggerKind) {
        {
            let mut generations = self.lock();
            generations[kind.index()] += 1;
            if kind != TriggerKind::All {
                generations[TriggerKind::All.index()] += 1;
            }
        }
        self.cond.notify_all();
    }

    /// Current generation of a trigger, to use as a wait baseline.
    pub fn generation(&self, kind: TriggerKind) -> u64 {
        self.lock()[kind.index()]
    }

    /// Block until `kind` fires past `baseline` or `deadline` passes.
    /// Returns false on timeout.
    pub fn wait_until_changed(
        &self,
        kind: TriggerKind,
        baseline: u64,
        deadline: Option<Instant>,
    ) -> bool {
        let mut generations = self.lock();
        loop {
            if generations[kind.index()] != baseline {
                return true;
            }
            match deadline {
                None => {
                    generations = self
                        .cond
                        .wait(generations)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (guard, _) = self
                        .cond
                        .wait_timeout(generations, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    generations = guard;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_trigger_names_roundtrip() {
        for kind in [
            TriggerKind::All,
            TriggerKind::Check,
            TriggerKind::State,
            TriggerKind::Log,
            TriggerKind::Downtime,
            TriggerKind::Comment,
            TriggerKind::Command,
            TriggerKind::Program,
        ] {
            assert_eq!(TriggerKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(TriggerKind::from_name("everything"), None);
    }

    #[test]
    fn test_wait_times_out_without_notification() {
        let triggers = Triggers::new();
        let baseline = triggers.generation(TriggerKind::Check);
        let woken = triggers.wait_until_changed(
            TriggerKind::Check,
            baseline,
            Some(Instant::now() + Duration::from_millis(20)),
        );
        assert!(!woken);
    }

    #[test]
    fn test_notification_wakes_waiter() {
        let triggers = Arc::new(Triggers::new());
        let baseline = triggers.generation(TriggerKind::State);
        let t = {
            let triggers = triggers.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                triggers.notify(TriggerKind::State);
            })
        };
        let woken = triggers.wait_until_changed(
            TriggerKind::State,
            baseline,
            Some(Instant::now() + Duration::from_secs(5)),
        );
        assert!(woken);
        t.join().unwrap();
    }

    #[test]
    fn test_any_trigger_fires_all() {
        let triggers = Triggers::new();
        let baseline = triggers.generation(TriggerKind::All);
        triggers.notify(TriggerKind::Downtime);
        assert_ne!(triggers.generation(TriggerKind::All), baseline);
    }

    #[test]
    fn test_stale_baseline_returns_immediately() {
        let triggers = Triggers::new();
        let baseline = triggers.generation(TriggerKind::Check);
        triggers.notify(TriggerKind::Check);
        // Notification happened before the wait: no blocking.
        assert!(triggers.wait_until_changed(TriggerKind::Check, baseline, None));
    }
}
