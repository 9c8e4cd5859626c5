//! redb table definitions for the Krane object store.
//!
//! Each table uses `&str` keys of the form `{namespace}/{name}` and `&[u8]`
//! values holding the JSON-serialized object.

use krane_core::Kind;
use redb::TableDefinition;

pub const RELEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("releases");

pub const POLICIES: TableDefinition<&str, &[u8]> = TableDefinition::new("policies");

pub const WORKLOADS: TableDefinition<&str, &[u8]> = TableDefinition::new("workloads");

pub const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");

pub const ROUTING_RULES: TableDefinition<&str, &[u8]> = TableDefinition::new("routing_rules");

/// Table holding objects of the given kind.
pub fn table_for(kind: Kind) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match kind {
        Kind::Release => RELEASES,
        Kind::Policy => POLICIES,
        Kind::Workload => WORKLOADS,
        Kind::Task => TASKS,
        Kind::RoutingRule => ROUTING_RULES,
    }
}
