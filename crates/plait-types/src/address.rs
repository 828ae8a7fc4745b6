//! Federation addresses.
//!
//! An address names an actor in the federation: a user at a domain,
//! optionally narrowed to a single session resource. The canonical string
//! form defined here is the one used everywhere a string form is needed
//! (mutation ordering tie-breaks, member keys, logging) and must be
//! computed identically on every node.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a node, user, or session in the federation.
///
/// All parts are optional: a bare domain names a server, `domain/userId`
/// names a user, and `domain/userId:resource` names one session of that
/// user.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl Address {
    /// Address of a user at a domain, with no resource.
    pub fn new(user_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            domain: Some(domain.into()),
            resource: None,
        }
    }

    /// Address of a server.
    pub fn server(domain: impl Into<String>) -> Self {
        Self {
            user_id: None,
            domain: Some(domain.into()),
            resource: None,
        }
    }

    /// Narrow this address to a single session resource.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// The same address with the resource stripped.
    ///
    /// Member descriptors are stored bare so that all of a user's sessions
    /// resolve to the same membership entry.
    pub fn bare(&self) -> Self {
        Self {
            user_id: self.user_id.clone(),
            domain: self.domain.clone(),
            resource: None,
        }
    }

    /// Canonical string form: `domain "/" userId ":" resource`, omitting
    /// absent parts.
    ///
    /// Mutation ordering across nodes tie-breaks on this string, so its
    /// construction is fixed here and nowhere else.
    pub fn canonical_string(&self) -> String {
        let mut out = String::new();
        match (&self.domain, &self.user_id) {
            (Some(domain), Some(user_id)) => {
                out.push_str(domain);
                out.push('/');
                out.push_str(user_id);
            }
            (Some(domain), None) => out.push_str(domain),
            (None, Some(user_id)) => out.push_str(user_id),
            (None, None) => {}
        }
        if let Some(resource) = &self.resource {
            out.push(':');
            out.push_str(resource);
        }
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_string())
    }
}
