//! Resource references used to address a single object in a [`Store`](crate::store::Store).
use std::fmt::Display;

use kube::Resource;
use snafu::{OptionExt, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("object of kind {kind:?} has no name"))]
    MissingName { kind: String },
}

/// Identifies one object by its (optional) namespace and name.
///
/// Cluster-scoped objects don't carry a namespace. The key is derived once per
/// poll target and never changes afterwards.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Derives the key of `obj` from its metadata.
    ///
    /// Fails if the object has no name. Objects created with `generateName`
    /// only get their name assigned by the API server, so callers have to use
    /// the object returned by the create call.
    pub fn from_resource<K>(obj: &K) -> Result<Self, Error>
    where
        K: Resource<DynamicType = ()>,
    {
        let meta = obj.meta();
        let name = meta.name.clone().with_context(|| MissingNameSnafu {
            kind: K::kind(&()).into_owned(),
        })?;

        Ok(Self {
            namespace: meta.namespace.clone(),
            name,
        })
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}/{name}", name = self.name),
            None => f.write_str(&self.name),
        }
    }
}
