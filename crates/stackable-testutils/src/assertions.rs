//! Assertions on the eventual state of Kubernetes resources.
//!
//! All polling functions take a [`Schedule`] which determines how long and how
//! often the [`Store`] is polled. Each check decides explicitly how a missing
//! object and a failed read are treated:
//!
//! - [`ResourceAssertions::wait_for_resource`] and
//!   [`ResourceAssertions::wait_for_label`] retry both until the timeout
//!   expires.
//! - [`ResourceAssertions::ensure_no_resource`] and
//!   [`ResourceAssertions::ensure_no_resources`] accept only "not found". A
//!   failed read is a violation, as the object might still be there.
use std::{fmt::Debug, sync::Arc, time::Duration};

use kube::Resource;
use serde::de::DeserializeOwned;
use snafu::{ResultExt, Snafu};
use tracing::instrument;

use crate::{
    crd::alertmanager_config::AlertmanagerConfig,
    key::{self, ObjectKey},
    probe::{self, Schedule},
    report::Reporter,
    store::{FetchOutcome, Store},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to derive object key in {operation}"))]
    DeriveKey {
        source: key::Error,
        operation: &'static str,
    },

    #[snafu(display("resource {key} did not appear"))]
    WaitForResource {
        source: probe::Error,
        key: ObjectKey,
    },

    #[snafu(display("resource {key} is still present"))]
    ResourceStillPresent {
        source: probe::Error,
        key: ObjectKey,
    },

    #[snafu(display("at least one of {count} resources is still present"))]
    ResourcesStillPresent { source: probe::Error, count: usize },

    #[snafu(display("resource {key} did not get label {label_key}={label_value}"))]
    WaitForLabel {
        source: probe::Error,
        key: ObjectKey,
        label_key: String,
        label_value: String,
    },

    #[snafu(display(
        "receiver {receiver:?} of AlertmanagerConfig {key} did not get email recipients {expected:?}"
    ))]
    WaitForReceiverEmails {
        source: probe::Error,
        key: ObjectKey,
        receiver: String,
        expected: String,
    },
}

impl Error {
    /// Time spent polling before the assertion failed.
    ///
    /// Returns [`None`] for failures which happened before polling started.
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            Self::DeriveKey { .. } => None,
            Self::WaitForResource { source, .. }
            | Self::ResourceStillPresent { source, .. }
            | Self::ResourcesStillPresent { source, .. }
            | Self::WaitForLabel { source, .. }
            | Self::WaitForReceiverEmails { source, .. } => source.elapsed(),
        }
    }
}

/// A resource observed during an absence check.
#[derive(Debug)]
pub struct Present<K> {
    pub key: ObjectKey,
    pub outcome: FetchOutcome<K>,
}

/// Runs assertions against a [`Store`] and hands every failure to a
/// [`Reporter`].
///
/// Failures are reported first and then returned, so with a
/// [`PanicReporter`](crate::report::PanicReporter) the test fails right at the
/// assertion, while other reporters leave the decision to the caller.
///
/// ```no_run
/// # use std::time::Duration;
/// # use k8s_openapi::api::core::v1::ConfigMap;
/// use stackable_testutils::{
///     assertions::ResourceAssertions, probe::Schedule, report::PanicReporter,
/// };
///
/// # #[tokio::main]
/// # async fn main() {
/// # let config_map = ConfigMap::default();
/// let client = kube::Client::try_default().await.unwrap();
/// let assertions = ResourceAssertions::new(client, PanicReporter);
///
/// let schedule = Schedule::new(Duration::from_secs(30), Duration::from_millis(250)).unwrap();
/// assertions.wait_for_resource(&config_map, &schedule).await.unwrap();
/// # }
/// ```
pub struct ResourceAssertions<S> {
    store: S,
    reporter: Arc<dyn Reporter>,
}

impl<S> ResourceAssertions<S>
where
    S: Store,
{
    pub fn new(store: S, reporter: impl Reporter + 'static) -> Self {
        Self {
            store,
            reporter: Arc::new(reporter),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Derives the [`ObjectKey`] of `obj`.
    pub fn get_resource_key<K>(&self, obj: &K) -> Result<ObjectKey, Error>
    where
        K: Resource<DynamicType = ()>,
    {
        self.derive_key(obj, "get_resource_key")
    }

    /// Waits until the object identified by `obj` exists and returns it.
    #[instrument(skip_all, fields(kind = %K::kind(&())))]
    pub async fn wait_for_resource<K>(&self, obj: &K, schedule: &Schedule) -> Result<K, Error>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Debug + Send + 'static,
    {
        let key = &self.derive_key(obj, "wait_for_resource")?;
        tracing::debug!(%key, "waiting for resource");

        let result = probe::eventually_map(
            schedule,
            move || self.store.get::<K>(key),
            FetchOutcome::try_into_found,
        )
        .await
        .context(WaitForResourceSnafu { key: key.clone() });

        self.checked(result).map(|satisfied| satisfied.observed)
    }

    /// Ensures that the object identified by `obj` does not exist for the
    /// whole timeout.
    ///
    /// Only a "not found" answer counts as absent. A failed read is a
    /// violation.
    #[instrument(skip_all, fields(kind = %K::kind(&())))]
    pub async fn ensure_no_resource<K>(&self, obj: &K, schedule: &Schedule) -> Result<(), Error>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Debug + Send + 'static,
    {
        let key = &self.derive_key(obj, "ensure_no_resource")?;
        tracing::debug!(%key, "ensuring resource stays absent");

        let result = probe::consistently(
            schedule,
            move || self.store.get::<K>(key),
            FetchOutcome::is_not_found,
        )
        .await
        .context(ResourceStillPresentSnafu { key: key.clone() });

        self.checked(result).map(|_| ())
    }

    /// Ensures that none of the objects identified by `objs` exist for the
    /// whole timeout.
    ///
    /// All keys are derived upfront. Each sample reads the objects in order
    /// and stops at the first one which is not reported as missing.
    #[instrument(skip_all, fields(kind = %K::kind(&()), count = objs.len()))]
    pub async fn ensure_no_resources<K>(&self, objs: &[K], schedule: &Schedule) -> Result<(), Error>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Debug + Send + 'static,
    {
        let keys = &objs
            .iter()
            .map(|obj| self.derive_key(obj, "ensure_no_resources"))
            .collect::<Result<Vec<_>, _>>()?;
        let store = &self.store;

        let result = probe::consistently(
            schedule,
            move || async move {
                for key in keys {
                    let outcome = store.get::<K>(key).await;
                    if !outcome.is_not_found() {
                        return Some(Present {
                            key: key.clone(),
                            outcome,
                        });
                    }
                }
                None
            },
            Option::is_none,
        )
        .await
        .context(ResourcesStillPresentSnafu { count: keys.len() });

        self.checked(result).map(|_| ())
    }

    /// Reads the object identified by `obj` once and checks whether it carries
    /// the label `label_key` with `label_value`.
    ///
    /// Returns `false` if the object can't be read. Only a failure to derive
    /// the key is an error.
    #[instrument(skip(self, obj), fields(kind = %K::kind(&())))]
    pub async fn resource_has_label<K>(
        &self,
        obj: &K,
        label_key: &str,
        label_value: &str,
    ) -> Result<bool, Error>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Debug + Send + 'static,
    {
        let key = self.derive_key(obj, "resource_has_label")?;
        let outcome = self.store.get::<K>(&key).await;

        Ok(has_label(&outcome, label_key, label_value))
    }

    /// Waits until the object identified by `obj` exists and carries the label
    /// `label_key` with `label_value`, then returns it.
    #[instrument(skip(self, obj, schedule), fields(kind = %K::kind(&())))]
    pub async fn wait_for_label<K>(
        &self,
        obj: &K,
        label_key: &str,
        label_value: &str,
        schedule: &Schedule,
    ) -> Result<K, Error>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Debug + Send + 'static,
    {
        let key = &self.derive_key(obj, "wait_for_label")?;

        let result = probe::eventually_map(
            schedule,
            move || self.store.get::<K>(key),
            |outcome| {
                if has_label(&outcome, label_key, label_value) {
                    outcome.try_into_found()
                } else {
                    Err(outcome)
                }
            },
        )
        .await
        .context(WaitForLabelSnafu {
            key: key.clone(),
            label_key,
            label_value,
        });

        self.checked(result).map(|satisfied| satisfied.observed)
    }

    /// Waits until the first email config of the receiver `receiver_name` in
    /// the `AlertmanagerConfig` identified by `key` sends to exactly
    /// `addresses`, joined by `", "`.
    ///
    /// The object has to be read successfully: a missing or unreadable object
    /// never matches, not even an empty list of `addresses`. A missing receiver
    /// or email config is observed as no recipients.
    #[instrument(skip(self, key, addresses, schedule), fields(%key))]
    pub async fn wait_for_alertmanager_receiver_emails<A>(
        &self,
        key: &ObjectKey,
        addresses: &[A],
        receiver_name: &str,
        schedule: &Schedule,
    ) -> Result<(), Error>
    where
        A: AsRef<str>,
    {
        let expected = &addresses
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(", ");

        let result = probe::eventually(
            schedule,
            move || async move {
                self.store
                    .get::<AlertmanagerConfig>(key)
                    .await
                    .into_found()
                    .map(|config| config.spec.email_recipients(receiver_name))
            },
            |recipients| recipients.as_deref() == Some(expected.as_str()),
        )
        .await
        .context(WaitForReceiverEmailsSnafu {
            key: key.clone(),
            receiver: receiver_name,
            expected: expected.clone(),
        });

        self.checked(result).map(|_| ())
    }

    fn derive_key<K>(&self, obj: &K, operation: &'static str) -> Result<ObjectKey, Error>
    where
        K: Resource<DynamicType = ()>,
    {
        let result = ObjectKey::from_resource(obj).context(DeriveKeySnafu { operation });
        self.checked(result)
    }

    /// Reports the failure, if any, and passes the result on.
    fn checked<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
        result.inspect_err(|failure| self.reporter.report(failure))
    }
}

fn has_label<K>(outcome: &FetchOutcome<K>, label_key: &str, label_value: &str) -> bool
where
    K: Resource,
{
    outcome
        .found()
        .and_then(|obj| obj.meta().labels.as_ref())
        .and_then(|labels| labels.get(label_key))
        .is_some_and(|value| value == label_value)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::{
        api::core::v1::ConfigMap, apimachinery::pkg::apis::meta::v1::ObjectMeta,
    };
    use rstest::rstest;

    use super::*;
    use crate::{
        crd::alertmanager_config::{AlertmanagerConfigSpec, EmailConfig, Receiver},
        report::RecordingReporter,
        store::MemoryStore,
    };

    fn config_map(name: &str, labels: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some("default".to_owned()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        }
    }

    fn assertions() -> (
        ResourceAssertions<MemoryStore>,
        MemoryStore,
        Arc<RecordingReporter>,
    ) {
        let store = MemoryStore::new();
        let reporter = Arc::new(RecordingReporter::new());
        let assertions = ResourceAssertions::new(store.clone(), reporter.clone());
        (assertions, store, reporter)
    }

    fn schedule(timeout_ms: u64, interval_ms: u64) -> Schedule {
        Schedule::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(interval_ms),
        )
        .expect("valid schedule")
    }

    #[rstest]
    #[case(&[("env", "prod")], "env", "prod", true)]
    #[case(&[("env", "dev")], "env", "prod", false)]
    #[case(&[], "env", "prod", false)]
    #[tokio::test]
    async fn resource_has_label_checks_key_and_value(
        #[case] labels: &[(&str, &str)],
        #[case] label_key: &str,
        #[case] label_value: &str,
        #[case] expected: bool,
    ) {
        let (assertions, store, reporter) = assertions();
        let config_map = config_map("zookeeper", labels);
        store.insert(&config_map).unwrap();

        let has_label = assertions
            .resource_has_label(&config_map, label_key, label_value)
            .await
            .unwrap();

        assert_eq!(has_label, expected);
        assert!(reporter.failures().is_empty());
    }

    #[tokio::test]
    async fn resource_has_label_is_false_for_failed_read() {
        let (assertions, store, _) = assertions();
        let config_map = config_map("zookeeper", &[("env", "prod")]);
        store.insert(&config_map).unwrap();
        store.fail_next(1);

        assert!(
            !assertions
                .resource_has_label(&config_map, "env", "prod")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn key_derivation_failure_is_reported_immediately() {
        let (assertions, store, reporter) = assertions();

        let error = assertions
            .wait_for_resource(&ConfigMap::default(), &schedule(5000, 100))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            Error::DeriveKey {
                operation: "wait_for_resource",
                ..
            }
        ));
        assert_eq!(store.reads(), 0, "nothing is polled without a key");
        assert_eq!(
            reporter.failures(),
            vec![
                "failed to derive object key in wait_for_resource: object of kind \"ConfigMap\" has no name"
                    .to_owned()
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_resource_retries_failed_reads() {
        let (assertions, store, reporter) = assertions();
        let config_map = config_map("zookeeper", &[]);
        store.insert(&config_map).unwrap();
        store.fail_next(3);

        let fetched = assertions
            .wait_for_resource(&config_map, &schedule(5000, 100))
            .await
            .unwrap();

        assert_eq!(fetched.metadata.name, config_map.metadata.name);
        assert_eq!(store.reads(), 4);
        assert!(reporter.failures().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_resource_times_out() {
        let (assertions, store, reporter) = assertions();
        let config_map = config_map("zookeeper", &[]);

        let error = assertions
            .wait_for_resource(&config_map, &schedule(1000, 100))
            .await
            .unwrap_err();

        assert_eq!(error.elapsed(), Some(Duration::from_secs(1)));
        assert_eq!(store.reads(), 11);

        let failures = reporter.failures();
        assert_eq!(failures.len(), 1);
        assert!(
            failures[0].starts_with("resource default/zookeeper did not appear: condition was not met within 1s"),
            "{failures:?}"
        );
        assert!(failures[0].ends_with("last observed: NotFound"), "{failures:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_no_resource_treats_failed_read_as_violation() {
        let (assertions, store, reporter) = assertions();
        let config_map = config_map("zookeeper", &[]);
        store.fail_next(1);

        let error = assertions
            .ensure_no_resource(&config_map, &schedule(1000, 100))
            .await
            .unwrap_err();

        assert!(matches!(error, Error::ResourceStillPresent { .. }));
        assert_eq!(error.elapsed(), Some(Duration::ZERO));
        assert_eq!(reporter.failures().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_alertmanager_receiver_emails() {
        let (assertions, store, reporter) = assertions();
        let key = ObjectKey::namespaced("monitoring", "alerts");

        let mut config = AlertmanagerConfig::new("alerts", AlertmanagerConfigSpec {
            receivers: vec![Receiver {
                name: "smtp".to_owned(),
                email_configs: vec![EmailConfig {
                    to: Some("ops@example.com".to_owned()),
                }],
            }],
        });
        config.meta_mut().namespace = Some("monitoring".to_owned());
        store.insert(&config).unwrap();

        let updater = tokio::spawn({
            let store = store.clone();
            let mut config = config.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                config.spec.receivers[0].email_configs[0].to =
                    Some("ops@example.com, oncall@example.com".to_owned());
                store.insert(&config).unwrap();
            }
        });

        assertions
            .wait_for_alertmanager_receiver_emails(
                &key,
                &["ops@example.com", "oncall@example.com"],
                "smtp",
                &schedule(5000, 100),
            )
            .await
            .unwrap();
        updater.await.unwrap();

        let error = assertions
            .wait_for_alertmanager_receiver_emails(
                &key,
                &["ops@example.com"],
                "webhook",
                &schedule(1000, 100),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, Error::WaitForReceiverEmails { .. }));
        assert_eq!(reporter.failures().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_receiver_emails_require_an_existing_config() {
        let (assertions, store, reporter) = assertions();
        let key = ObjectKey::namespaced("monitoring", "does-not-exist");

        let error = assertions
            .wait_for_alertmanager_receiver_emails(&key, &[] as &[&str], "smtp", &schedule(1000, 100))
            .await
            .unwrap_err();

        assert!(matches!(error, Error::WaitForReceiverEmails { .. }));
        assert_eq!(store.reads(), 11);

        let failures = reporter.failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].ends_with("last observed: None"), "{failures:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn no_receiver_emails_match_a_config_without_the_receiver() {
        let (assertions, store, reporter) = assertions();
        let key = ObjectKey::namespaced("monitoring", "alerts");

        let mut config = AlertmanagerConfig::new("alerts", AlertmanagerConfigSpec {
            receivers: Vec::new(),
        });
        config.meta_mut().namespace = Some("monitoring".to_owned());
        store.insert(&config).unwrap();

        assertions
            .wait_for_alertmanager_receiver_emails(&key, &[] as &[&str], "smtp", &schedule(1000, 100))
            .await
            .unwrap();

        assert_eq!(store.reads(), 1);
        assert!(reporter.failures().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_label_returns_labelled_object() {
        let (assertions, store, reporter) = assertions();
        let config_map = config_map("zookeeper", &[("env", "dev")]);
        store.insert(&config_map).unwrap();

        let relabelled = self::config_map("zookeeper", &[("env", "prod")]);
        let updater = tokio::spawn({
            let store = store.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                store.insert(&relabelled).unwrap();
            }
        });

        let fetched = assertions
            .wait_for_label(&config_map, "env", "prod", &schedule(1000, 100))
            .await
            .unwrap();
        updater.await.unwrap();

        assert_eq!(
            fetched.metadata.labels.unwrap().get("env").map(String::as_str),
            Some("prod")
        );
        assert_eq!(store.reads(), 4);
        assert!(reporter.failures().is_empty());
    }
}
