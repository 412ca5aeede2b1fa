//! Privilege and resource definitions
//!
//! A privilege binds one resource to a set of permitted actions. For a
//! collection resource an empty collection name addresses every collection
//! in the database.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The `find` action, the only action the report roles grant
pub const ACTION_FIND: &str = "find";

/// Addressable resource of a privilege.
///
/// The report roles only grant on collections; cluster-wide and
/// any-resource entries appear in server replies for built-in roles.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(untagged)]
pub enum Resource {
    Collection {
        db: String,
        collection: String,
    },
    Cluster {
        cluster: bool,
    },
    AnyResource {
        #[serde(rename = "anyResource")]
        any_resource: bool,
    },
}

impl Resource {
    pub fn collection(db: impl Into<String>, collection: impl Into<String>) -> Self {
        Resource::Collection {
            db: db.into(),
            collection: collection.into(),
        }
    }

    /// Every collection in `db`
    pub fn database(db: impl Into<String>) -> Self {
        Self::collection(db, "")
    }

    pub fn cluster() -> Self {
        Resource::Cluster { cluster: true }
    }

    /// Database part of a collection resource
    pub fn db(&self) -> Option<&str> {
        match self {
            Resource::Collection { db, .. } => Some(db),
            _ => None,
        }
    }

    /// Collection part of a collection resource; empty for a whole database
    pub fn collection_name(&self) -> Option<&str> {
        match self {
            Resource::Collection { collection, .. } => Some(collection),
            _ => None,
        }
    }
}

/// A permission tuple embedded in a role
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Privilege {
    pub resource: Resource,
    pub actions: Vec<String>,
}

impl Privilege {
    pub fn new<I, S>(resource: Resource, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resource,
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }

    /// `find` only, on a single collection
    pub fn find_on(db: &str, collection: &str) -> Self {
        Self::new(Resource::collection(db, collection), [ACTION_FIND])
    }

    pub fn action_set(&self) -> BTreeSet<&str> {
        self.actions.iter().map(String::as_str).collect()
    }

    /// Same resource and same actions, ignoring action order and repeats
    pub fn same_grant(&self, other: &Privilege) -> bool {
        self.resource == other.resource && self.action_set() == other.action_set()
    }
}

/// Compare two privilege lists as sets of grants.
pub fn same_grants(expected: &[Privilege], actual: &[Privilege]) -> bool {
    expected.len() == actual.len()
        && expected
            .iter()
            .all(|e| actual.iter().any(|a| e.same_grant(a)))
        && actual
            .iter()
            .all(|a| expected.iter().any(|e| e.same_grant(a)))
}
