//! Object metadata and the `Resource` trait implemented by every stored kind.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Namespace used when an object does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// The kinds of objects held by the cluster store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Release,
    Policy,
    Workload,
    Task,
    RoutingRule,
}

impl Kind {
    pub const ALL: [Kind; 5] = [
        Kind::Release,
        Kind::Policy,
        Kind::Workload,
        Kind::Task,
        Kind::RoutingRule,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Release => "release",
            Kind::Policy => "policy",
            Kind::Workload => "workload",
            Kind::Task => "task",
            Kind::RoutingRule => "routingrule",
        }
    }

    /// Collection name used in API paths.
    pub fn plural(&self) -> &'static str {
        match self {
            Kind::Release => "releases",
            Kind::Policy => "policies",
            Kind::Workload => "workloads",
            Kind::Task => "tasks",
            Kind::RoutingRule => "routingrules",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and bookkeeping shared by every stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Incremented by the store on every write; used for conditional updates.
    #[serde(default)]
    pub resource_version: u64,
    /// Unix timestamp (seconds) set by the store on create.
    #[serde(default)]
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl ObjectMeta {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    /// Build the `{namespace}/{name}` store key.
    pub fn key(&self) -> String {
        object_key(&self.namespace, &self.name)
    }
}

/// Build the `{namespace}/{name}` store key without an object at hand.
pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// A kind of object the store can hold.
///
/// Kinds with a status subresource override [`Resource::copy_status_from`]
/// so that spec writes and status writes never clobber each other.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: Kind;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Replace this object's status with the status of `other`.
    fn copy_status_from(&mut self, _other: &Self) {}

    fn name(&self) -> &str {
        &self.meta().name
    }

    fn namespace(&self) -> &str {
        &self.meta().namespace
    }
}

/// Implement [`Resource`] for a `{ metadata, .. }` struct, optionally with a
/// `status` field treated as a status subresource.
macro_rules! impl_resource {
    ($ty:ty, $kind:expr) => {
        impl $crate::meta::Resource for $ty {
            const KIND: $crate::meta::Kind = $kind;

            fn meta(&self) -> &$crate::meta::ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut $crate::meta::ObjectMeta {
                &mut self.metadata
            }
        }
    };
    ($ty:ty, $kind:expr, status) => {
        impl $crate::meta::Resource for $ty {
            const KIND: $crate::meta::Kind = $kind;

            fn meta(&self) -> &$crate::meta::ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut $crate::meta::ObjectMeta {
                &mut self.metadata
            }

            fn copy_status_from(&mut self, other: &Self) {
                self.status = other.status.clone();
            }
        }
    };
}

pub(crate) use impl_resource;
