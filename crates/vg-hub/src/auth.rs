//! # Authorization
//!
//! Queries run as a principal: the unrestricted default, or a named
//! contact selected by `AuthUser:`. Row visibility is decided per table
//! against the configured loose/strict policies. Authorization never
//! surfaces as an error: unauthorized rows are silently dropped.

use serde::Deserialize;
use vg_core::{Host, Service, ServiceGroup, World};

use crate::query::ParseError;

/// Who may see a service: its own contacts, or (loosely) also the
/// contacts of its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceAuthorization {
    #[default]
    Loose,
    Strict,
}

/// Who may see a group: anyone authorized for at least one member
/// (loose), or only those authorized for every member (strict).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupAuthorization {
    #[default]
    Loose,
    Strict,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AuthPolicies {
    pub service: ServiceAuthorization,
    pub group: GroupAuthorization,
}

/// The authorization principal of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum User {
    /// Sees everything. The default when no `AuthUser:` line is given.
    NoAuth,
    Contact(String),
}

impl User {
    /// Resolve an `AuthUser:` name against the known contacts.
    pub fn find(name: &str, world: &World) -> Result<User, ParseError> {
        if world.has_contact(name) {
            Ok(User::Contact(name.to_string()))
        } else {
            Err(ParseError::UnknownUser(name.to_string()))
        }
    }

    pub fn is_authorized_for_host(&self, host: &Host) -> bool {
        match self {
            User::NoAuth => true,
            User::Contact(name) => host.contacts.iter().any(|c| c == name),
        }
    }

    pub fn is_authorized_for_service(
        &self,
        service: &Service,
        world: &World,
        policies: AuthPolicies,
    ) -> bool {
        let name = match self {
            User::NoAuth => return true,
            User::Contact(name) => name,
        };
        if service.contacts.iter().any(|c| c == name) {
            return true;
        }
        policies.service == ServiceAuthorization::Loose
            && world
                .host(&service.host_name)
                .is_some_and(|h| h.contacts.iter().any(|c| c == name))
    }

    pub fn is_authorized_for_group(
        &self,
        group: &ServiceGroup,
        world: &World,
        policies: AuthPolicies,
    ) -> bool {
        if matches!(self, User::NoAuth) {
            return true;
        }
        let mut members = world.members_of(group).peekable();
        match policies.group {
            GroupAuthorization::Loose => {
                members.any(|s| self.is_authorized_for_service(s, world, policies))
            }
            GroupAuthorization::Strict => {
                members.peek().is_some()
                    && members.all(|s| self.is_authorized_for_service(s, world, policies))
            }
        }
    }
}
