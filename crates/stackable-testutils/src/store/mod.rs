//! Read access to the external state store the assertions observe.
//!
//! The [`Store`] trait is implemented for [`kube::Client`], which talks to a
//! real (or envtest-like) API server, and for [`MemoryStore`], which keeps
//! objects in memory and is mainly useful to test code built on top of this
//! crate.
use async_trait::async_trait;
use kube::{
    Resource,
    api::GetParams,
    core::{Request, request},
};
use serde::de::DeserializeOwned;
use snafu::{ResultExt, Snafu};

use crate::key::{self, ObjectKey};

mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to build get request for {key}"))]
    BuildRequest {
        source: request::Error,
        key: ObjectKey,
    },

    #[snafu(display("failed to get object {key}"))]
    GetObject { source: kube::Error, key: ObjectKey },

    #[snafu(display("failed to derive object key"))]
    DeriveKey { source: key::Error },

    #[snafu(display("failed to serialize object {key}"))]
    SerializeObject {
        source: serde_json::Error,
        key: ObjectKey,
    },

    #[snafu(display("failed to deserialize object {key}"))]
    DeserializeObject {
        source: serde_json::Error,
        key: ObjectKey,
    },

    #[snafu(display("store is unavailable"))]
    Unavailable,
}

/// The result of reading one object from a [`Store`].
///
/// A missing object ([`FetchOutcome::NotFound`]) is deliberately kept apart
/// from a failed read ([`FetchOutcome::Failed`]). Whether either of them
/// satisfies a check is decided by each caller.
#[derive(Debug)]
pub enum FetchOutcome<K> {
    Found(K),
    NotFound,
    Failed(Error),
}

impl<K> FetchOutcome<K> {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Returns `true` only if the store positively reported the object as
    /// missing. A failed read is not a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub fn found(&self) -> Option<&K> {
        match self {
            Self::Found(obj) => Some(obj),
            Self::NotFound | Self::Failed(_) => None,
        }
    }

    pub fn into_found(self) -> Option<K> {
        match self {
            Self::Found(obj) => Some(obj),
            Self::NotFound | Self::Failed(_) => None,
        }
    }

    /// Returns the object if it was found, and the outcome itself otherwise.
    pub fn try_into_found(self) -> Result<K, Self> {
        match self {
            Self::Found(obj) => Ok(obj),
            other @ (Self::NotFound | Self::Failed(_)) => Err(other),
        }
    }
}

impl<K> From<Result<Option<K>, Error>> for FetchOutcome<K> {
    fn from(result: Result<Option<K>, Error>) -> Self {
        match result {
            Ok(Some(obj)) => Self::Found(obj),
            Ok(None) => Self::NotFound,
            Err(err) => Self::Failed(err),
        }
    }
}

/// Read-only access to objects, addressed by [`ObjectKey`].
///
/// Implementations must never mutate the store as part of a read.
#[async_trait]
pub trait Store: Send + Sync {
    /// Reads the object of type `K` identified by `key`.
    async fn get<K>(&self, key: &ObjectKey) -> FetchOutcome<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Send + 'static;
}

#[async_trait]
impl Store for kube::Client {
    async fn get<K>(&self, key: &ObjectKey) -> FetchOutcome<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Send + 'static,
    {
        get_object(self, key).await.into()
    }
}

/// Issues a plain GET against the API server.
///
/// Building the request from [`Resource::url_path`] works for namespaced and
/// cluster-scoped resources alike, which [`kube::Api`] would need to know
/// upfront.
async fn get_object<K>(client: &kube::Client, key: &ObjectKey) -> Result<Option<K>, Error>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let request = Request::new(K::url_path(&(), key.namespace.as_deref()))
        .get(&key.name, &GetParams::default())
        .context(BuildRequestSnafu { key: key.clone() })?;

    match client.request::<K>(request).await {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(None),
        Err(source) => Err(source).context(GetObjectSnafu { key: key.clone() }),
    }
}
