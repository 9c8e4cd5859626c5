//! StateStore: redb-backed object persistence for Krane.
//!
//! Provides typed CRUD operations over every [`Resource`] kind through the
//! [`ObjectStore`] capability trait. Writes are conditional on the caller's
//! `resource_version`, checked inside the same write transaction that
//! applies them. The store supports both on-disk and in-memory backends
//! (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use krane_core::meta::object_key;
use krane_core::Resource;
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::table_for;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Capability interface over the cluster store, parameterized by kind.
///
/// All calls are synchronous round trips. `update` and `update_status`
/// fail with [`StateError::Conflict`] when the stored object's version no
/// longer matches the caller's copy.
pub trait ObjectStore: Send + Sync {
    fn get<R: Resource>(&self, namespace: &str, name: &str) -> StateResult<R>;

    /// List objects of a kind, optionally restricted to one namespace.
    fn list<R: Resource>(&self, namespace: Option<&str>) -> StateResult<Vec<R>>;

    /// Create a new object. Returns the stored copy (version 1).
    fn create<R: Resource>(&self, object: &R) -> StateResult<R>;

    /// Replace an object's spec and metadata, keeping its stored status.
    fn update<R: Resource>(&self, object: &R) -> StateResult<R>;

    /// Replace only the status of an object.
    fn update_status<R: Resource>(&self, object: &R) -> StateResult<R>;

    fn delete<R: Resource>(&self, namespace: &str, name: &str) -> StateResult<()>;

    /// Like [`ObjectStore::get`], mapping `NotFound` to `None`.
    fn find<R: Resource>(&self, namespace: &str, name: &str) -> StateResult<Option<R>> {
        match self.get(namespace, name) {
            Ok(object) => Ok(Some(object)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// What a transaction closure wants written back.
enum Mutation<R> {
    Put(R),
    Remove,
}

/// Thread-safe object store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        for kind in krane_core::Kind::ALL {
            txn.open_table(table_for(kind)).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Run `f` against the current value of `key` inside one write
    /// transaction and apply the mutation it returns.
    fn transact<R, T>(
        &self,
        key: &str,
        f: impl FnOnce(Option<R>) -> StateResult<(Option<Mutation<R>>, T)>,
    ) -> StateResult<T>
    where
        R: Resource,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let out = {
            let mut table = txn.open_table(table_for(R::KIND)).map_err(map_err!(Table))?;
            let current: Option<R> = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            let (mutation, out) = f(current)?;
            match mutation {
                Some(Mutation::Put(object)) => {
                    let value = serde_json::to_vec(&object).map_err(map_err!(Serialize))?;
                    table
                        .insert(key, value.as_slice())
                        .map_err(map_err!(Write))?;
                }
                Some(Mutation::Remove) => {
                    table.remove(key).map_err(map_err!(Write))?;
                }
                None => {}
            }
            out
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(out)
    }

    /// Shared body of `update` and `update_status`.
    fn conditional_write<R: Resource>(
        &self,
        object: &R,
        merge: impl FnOnce(R, &R) -> R,
    ) -> StateResult<R> {
        let key = object.meta().key();
        let expected = object.meta().resource_version;
        let written = self.transact::<R, R>(&key, |current| {
            let stored = current.ok_or_else(|| StateError::NotFound {
                kind: R::KIND,
                key: key.clone(),
            })?;
            let found = stored.meta().resource_version;
            if found != expected {
                return Err(StateError::Conflict {
                    kind: R::KIND,
                    key: key.clone(),
                    expected,
                    found,
                });
            }
            let created_at = stored.meta().created_at;
            let mut next = merge(stored, object);
            next.meta_mut().resource_version = found + 1;
            next.meta_mut().created_at = created_at;
            Ok((Some(Mutation::Put(next.clone())), next))
        })?;
        debug!(kind = %R::KIND, %key, version = written.meta().resource_version, "object updated");
        Ok(written)
    }
}

impl ObjectStore for StateStore {
    fn get<R: Resource>(&self, namespace: &str, name: &str) -> StateResult<R> {
        let key = object_key(namespace, name);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_for(R::KIND)).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => decode(guard.value()),
            None => Err(StateError::NotFound {
                kind: R::KIND,
                key: key.clone(),
            }),
        }
    }

    fn list<R: Resource>(&self, namespace: Option<&str>) -> StateResult<Vec<R>> {
        let prefix = namespace.map(|ns| format!("{ns}/"));
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_for(R::KIND)).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if let Some(prefix) = &prefix {
                if !key.value().starts_with(prefix.as_str()) {
                    continue;
                }
            }
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    fn create<R: Resource>(&self, object: &R) -> StateResult<R> {
        let key = object.meta().key();
        let created = self.transact::<R, R>(&key, |current| {
            if current.is_some() {
                return Err(StateError::AlreadyExists {
                    kind: R::KIND,
                    key: key.clone(),
                });
            }
            let mut next = object.clone();
            next.meta_mut().resource_version = 1;
            next.meta_mut().created_at = epoch_secs();
            Ok((Some(Mutation::Put(next.clone())), next))
        })?;
        debug!(kind = %R::KIND, %key, "object created");
        Ok(created)
    }

    fn update<R: Resource>(&self, object: &R) -> StateResult<R> {
        self.conditional_write(object, |stored, incoming| {
            let mut next = incoming.clone();
            next.copy_status_from(&stored);
            next
        })
    }

    fn update_status<R: Resource>(&self, object: &R) -> StateResult<R> {
        self.conditional_write(object, |mut stored, incoming| {
            stored.copy_status_from(incoming);
            stored
        })
    }

    fn delete<R: Resource>(&self, namespace: &str, name: &str) -> StateResult<()> {
        let key = object_key(namespace, name);
        self.transact::<R, ()>(&key, |current| match current {
            Some(_) => Ok((Some(Mutation::Remove), ())),
            None => Err(StateError::NotFound {
                kind: R::KIND,
                key: key.clone(),
            }),
        })?;
        debug!(kind = %R::KIND, %key, "object deleted");
        Ok(())
    }
}

fn decode<R: Resource>(bytes: &[u8]) -> StateResult<R> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use krane_core::*;

    fn test_release(name: &str) -> Release {
        Release::new(
            "default",
            name,
            ReleaseSpec {
                policy: "policy".to_string(),
                deployments: Deployments {
                    canary: format!("{name}-canary"),
                    baseline: format!("{name}-baseline"),
                    base: "api".to_string(),
                },
            },
        )
    }

    // ── CRUD ───────────────────────────────────────────────────────

    #[test]
    fn create_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let created = store.create(&test_release("r1")).unwrap();
        assert_eq!(created.metadata.resource_version, 1);

        let fetched: Release = store.get("default", "r1").unwrap();
        assert_eq!(fetched, created);
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store.get::<Release>("default", "nope").unwrap_err();
        assert!(err.is_not_found());
        assert!(store.find::<Release>("default", "nope").unwrap().is_none());
    }

    #[test]
    fn create_twice_fails() {
        let store = StateStore::open_in_memory().unwrap();
        store.create(&test_release("r1")).unwrap();
        let err = store.create(&test_release("r1")).unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists { .. }));
    }

    #[test]
    fn kinds_are_isolated() {
        let store = StateStore::open_in_memory().unwrap();
        store.create(&Workload::new("default", "r1", 1)).unwrap();
        assert!(store.find::<Release>("default", "r1").unwrap().is_none());
        assert!(store.find::<Workload>("default", "r1").unwrap().is_some());
    }

    #[test]
    fn list_filters_by_namespace() {
        let store = StateStore::open_in_memory().unwrap();
        store.create(&Workload::new("ns1", "a", 1)).unwrap();
        store.create(&Workload::new("ns1", "b", 1)).unwrap();
        store.create(&Workload::new("ns2", "c", 1)).unwrap();

        assert_eq!(store.list::<Workload>(None).unwrap().len(), 3);
        assert_eq!(store.list::<Workload>(Some("ns1")).unwrap().len(), 2);
        assert!(store.list::<Workload>(Some("ns3")).unwrap().is_empty());
    }

    #[test]
    fn delete_then_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        store.create(&Workload::new("default", "w", 1)).unwrap();
        store.delete::<Workload>("default", "w").unwrap();
        let err = store.delete::<Workload>("default", "w").unwrap_err();
        assert!(err.is_not_found());
    }

    // ── Optimistic concurrency ─────────────────────────────────────

    #[test]
    fn update_bumps_version() {
        let store = StateStore::open_in_memory().unwrap();
        let mut rule = store
            .create(&RoutingRule::new("default", "vs", Vec::new()))
            .unwrap();
        rule.spec.hosts.push("svc".to_string());

        let updated = store.update(&rule).unwrap();
        assert_eq!(updated.metadata.resource_version, 2);
        assert_eq!(updated.spec.hosts, vec!["svc".to_string()]);
    }

    #[test]
    fn stale_update_conflicts() {
        let store = StateStore::open_in_memory().unwrap();
        let original = store
            .create(&RoutingRule::new("default", "vs", Vec::new()))
            .unwrap();

        let mut first = original.clone();
        first.spec.hosts.push("a".to_string());
        store.update(&first).unwrap();

        let mut stale = original;
        stale.spec.hosts.push("b".to_string());
        let err = store.update(&stale).unwrap_err();
        assert!(err.is_conflict());
        match err {
            StateError::Conflict { expected, found, .. } => {
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error: {other}"),
        }

        let stored: RoutingRule = store.get("default", "vs").unwrap();
        assert_eq!(stored.spec.hosts, vec!["a".to_string()]);
    }

    #[test]
    fn update_status_only_writes_status() {
        let store = StateStore::open_in_memory().unwrap();
        let mut release = store.create(&test_release("r1")).unwrap();

        release.spec.policy = "other".to_string();
        release.status.progress = Some(Progress::Testing);
        let updated = store.update_status(&release).unwrap();

        assert_eq!(updated.spec.policy, "policy");
        assert_eq!(updated.status.progress, Some(Progress::Testing));
        assert_eq!(updated.metadata.resource_version, 2);
    }

    #[test]
    fn update_keeps_stored_status() {
        let store = StateStore::open_in_memory().unwrap();
        let mut workload = Workload::new("default", "w", 1);
        workload.status.available_replicas = 1;
        let mut stored = store.create(&workload).unwrap();

        stored.spec.replicas = 4;
        stored.status.available_replicas = 0;
        let updated = store.update(&stored).unwrap();

        assert_eq!(updated.spec.replicas, 4);
        assert_eq!(updated.status.available_replicas, 1);
    }

    #[test]
    fn update_missing_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store.update(&Workload::new("default", "ghost", 1)).unwrap_err();
        assert!(err.is_not_found());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("krane.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.create(&test_release("r1")).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        let release: Release = store.get("default", "r1").unwrap();
        assert_eq!(release.spec.deployments.canary, "r1-canary");
    }
}
