//! Test helpers for asserting on the eventual state of Kubernetes resources
//! managed by an operator.
//!
//! Reconciliation is asynchronous, so a test can't check the cluster right
//! after applying a change. Instead, the helpers in [`assertions`] poll the
//! API server until a resource appears, stays absent or gets the expected
//! content. The polling itself lives in [`probe`] and works with any
//! [`store::Store`].

pub mod assertions;
pub mod crd;
pub mod json;
pub mod key;
pub mod logging;
pub mod options;
pub mod probe;
pub mod readiness;
pub mod report;
pub mod store;

pub use assertions::ResourceAssertions;
pub use key::ObjectKey;
pub use probe::{Schedule, consistently, eventually};

// External re-exports
pub use k8s_openapi;
pub use kube;
