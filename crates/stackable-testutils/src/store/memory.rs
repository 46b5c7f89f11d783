use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use kube::Resource;
use serde::{Serialize, de::DeserializeOwned};
use snafu::ResultExt;

use super::{DeriveKeySnafu, DeserializeObjectSnafu, Error, FetchOutcome, SerializeObjectSnafu, Store};
use crate::key::ObjectKey;

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
struct TypedKey {
    api_version: String,
    kind: String,
    key: ObjectKey,
}

impl TypedKey {
    fn new<K>(key: ObjectKey) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            key,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    objects: Mutex<BTreeMap<TypedKey, serde_json::Value>>,
    pending_failures: AtomicUsize,
    reads: AtomicUsize,
}

/// An in-memory [`Store`] holding serialized objects.
///
/// Cloning the store returns another handle to the same objects, so a test
/// can keep changing the contents while an assertion polls it.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `obj` and returns its key.
    pub fn insert<K>(&self, obj: &K) -> Result<ObjectKey, Error>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let key = ObjectKey::from_resource(obj).context(DeriveKeySnafu)?;
        let value = serde_json::to_value(obj).context(SerializeObjectSnafu { key: key.clone() })?;

        tracing::trace!(%key, kind = %K::kind(&()), "inserting object");
        self.objects().insert(TypedKey::new::<K>(key.clone()), value);

        Ok(key)
    }

    /// Removes the object of type `K` with `key`. Returns whether it existed.
    pub fn remove<K>(&self, key: &ObjectKey) -> bool
    where
        K: Resource<DynamicType = ()>,
    {
        tracing::trace!(%key, kind = %K::kind(&()), "removing object");
        self.objects()
            .remove(&TypedKey::new::<K>(key.clone()))
            .is_some()
    }

    /// Makes the next `count` reads fail with [`Error::Unavailable`].
    pub fn fail_next(&self, count: usize) {
        self.inner.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of reads served so far, including failed ones.
    pub fn reads(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<TypedKey, serde_json::Value>> {
        self.inner
            .objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn take_failure(&self) -> bool {
        self.inner
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| {
                pending.checked_sub(1)
            })
            .is_ok()
    }

    fn read<K>(&self, key: &ObjectKey) -> Result<Option<K>, Error>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        self.inner.reads.fetch_add(1, Ordering::SeqCst);

        if self.take_failure() {
            return Err(Error::Unavailable);
        }

        let value = self.objects().get(&TypedKey::new::<K>(key.clone())).cloned();
        value
            .map(serde_json::from_value)
            .transpose()
            .context(DeserializeObjectSnafu { key: key.clone() })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get<K>(&self, key: &ObjectKey) -> FetchOutcome<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Send + 'static,
    {
        self.read(key).into()
    }
}
