//! Applies desired objects one at a time and decides whether the pass may continue.
//!
//! Every object goes through the same pipeline: build, variant specific hook, owner reference,
//! create or update. A write that changed something requeues the cluster, so dependent objects
//! are only applied once the platform had a chance to act on the change.

pub mod conditions;

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use snafu::{OptionExt, ResultExt, Snafu};
use stackable_operator::{
    k8s_openapi::{
        api::{apps::v1::StatefulSet, core::v1::ConfigMap},
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    },
    kube::{Resource, ResourceExt},
    kvp::LabelError,
};
use tracing::{debug, info};

use crate::{
    config::{self, RoleGroupConfigFiles},
    crd::{ConfigOverrides, TrinoCluster},
    platform::{self, ManagedObject, ObjectKind, Platform},
    reconciler::conditions::{
        StatusTracker, CONDITION_AVAILABLE, REASON_DEPLOYMENT_NOT_SATISFIED,
        REASON_DEPLOYMENT_SATISFIED,
    },
    statefulset::WorkloadOverrides,
};

pub const GENERAL_REQUEUE_AFTER: Duration = Duration::from_millis(500);
pub const WORKLOAD_REQUEUE_AFTER: Duration = Duration::from_secs(20);
pub const PODS_NOT_READY_REQUEUE_AFTER: Duration = Duration::from_secs(10);

pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to build desired object"))]
    BuildObject { source: BoxedError },

    #[snafu(display("failed to render configuration files for {name}"))]
    RenderConfiguration { source: config::Error, name: String },

    #[snafu(display("{kind} has no name"))]
    ObjectHasNoName { kind: ObjectKind },

    #[snafu(display("object is missing metadata to build owner reference"))]
    ObjectMissingMetadataForOwnerRef,

    #[snafu(display("failed to apply {kind} {name}"))]
    ApplyObject {
        source: platform::Error,
        kind: ObjectKind,
        name: String,
    },

    #[snafu(display("failed to list pods of {name}"))]
    ListPods {
        source: platform::Error,
        name: String,
    },

    #[snafu(display("failed to build the cluster labels"))]
    ClusterLabels { source: LabelError },

    #[snafu(display("failed to list {kind} objects for cleanup"))]
    ListOrphans {
        source: platform::Error,
        kind: ObjectKind,
    },

    #[snafu(display("failed to delete orphaned {kind} {name}"))]
    DeleteOrphan {
        source: platform::Error,
        kind: ObjectKind,
        name: String,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// An object as a builder describes it, before overrides and ownership are applied.
#[derive(Clone, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum DesiredObject {
    General(ManagedObject),
    Configuration {
        metadata: ObjectMeta,
        files: RoleGroupConfigFiles,
        overrides: ConfigOverrides,
    },
    Workload {
        statefulset: StatefulSet,
        overrides: WorkloadOverrides,
    },
}

pub trait ResourceBuilder: Send + Sync {
    fn build(&self) -> Result<DesiredObject, BoxedError>;
}

/// Builds a set of objects that are applied together, in order.
pub trait MultiResourceBuilder: Send + Sync {
    fn build(&self) -> Result<Vec<Box<dyn ResourceBuilder + '_>>, BoxedError>;
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReconcileResult {
    pub requeue_after: Option<Duration>,
}

impl ReconcileResult {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }

    pub fn is_requeue(&self) -> bool {
        self.requeue_after.is_some()
    }
}

/// Makes `owner` the controller of the object, so it is garbage collected with the cluster.
pub fn set_owner_reference(owner: &TrinoCluster, metadata: &mut ObjectMeta) -> Result<()> {
    let owner_ref = owner
        .controller_owner_ref(&())
        .context(ObjectMissingMetadataForOwnerRefSnafu)?;
    metadata.owner_references = Some(vec![owner_ref]);
    Ok(())
}

pub struct Reconciler<'a> {
    platform: &'a dyn Platform,
    owner: &'a TrinoCluster,
    pub status: StatusTracker,
    applied: BTreeSet<(ObjectKind, String)>,
}

impl<'a> Reconciler<'a> {
    pub fn new(platform: &'a dyn Platform, owner: &'a TrinoCluster) -> Self {
        Self {
            platform,
            owner,
            status: StatusTracker::new(owner),
            applied: BTreeSet::new(),
        }
    }

    pub async fn reconcile(&mut self, builder: &dyn ResourceBuilder) -> Result<ReconcileResult> {
        let desired = builder.build().context(BuildObjectSnafu)?;

        let (mut object, requeue_after) = match desired {
            DesiredObject::General(object) => (object, GENERAL_REQUEUE_AFTER),
            DesiredObject::Configuration {
                metadata,
                mut files,
                overrides,
            } => {
                files.apply_overrides(&overrides);
                let data = files.render().context(RenderConfigurationSnafu {
                    name: metadata.name.clone().unwrap_or_default(),
                })?;
                let config_map = ConfigMap {
                    metadata,
                    data: Some(data),
                    ..ConfigMap::default()
                };
                (ManagedObject::ConfigMap(config_map), GENERAL_REQUEUE_AFTER)
            }
            DesiredObject::Workload {
                mut statefulset,
                overrides,
            } => {
                overrides.apply(&mut statefulset);
                (
                    ManagedObject::StatefulSet(statefulset),
                    WORKLOAD_REQUEUE_AFTER,
                )
            }
        };

        set_owner_reference(self.owner, object.meta_mut())?;

        let kind = object.kind();
        let name = object
            .meta()
            .name
            .clone()
            .context(ObjectHasNoNameSnafu { kind })?;
        self.applied.insert((kind, name.clone()));

        let mutated = self
            .platform
            .create_or_update(&object)
            .await
            .context(ApplyObjectSnafu {
                kind,
                name: &name,
            })?;
        if mutated {
            debug!(%kind, name, ?requeue_after, "object changed, requeueing");
            return Ok(ReconcileResult::requeue(requeue_after));
        }

        match &object {
            ManagedObject::StatefulSet(statefulset) => self.check_workload(statefulset).await,
            _ => Ok(ReconcileResult::done()),
        }
    }

    /// Applies all objects of `builder` and stops at the first one that requires a requeue.
    pub async fn reconcile_multi(
        &mut self,
        builder: &dyn MultiResourceBuilder,
    ) -> Result<ReconcileResult> {
        for resource_builder in builder.build().context(BuildObjectSnafu)? {
            let result = self.reconcile(resource_builder.as_ref()).await?;
            if result.is_requeue() {
                return Ok(result);
            }
        }
        Ok(ReconcileResult::done())
    }

    async fn check_workload(&mut self, statefulset: &StatefulSet) -> Result<ReconcileResult> {
        let name = statefulset.name_any();
        let namespace = statefulset.namespace().unwrap_or_default();
        let spec = statefulset.spec.as_ref();
        let selector = spec
            .and_then(|spec| spec.selector.match_labels.clone())
            .unwrap_or_default();
        let desired_replicas = spec.and_then(|spec| spec.replicas).unwrap_or(1);

        let pods = self
            .platform
            .list_pods(&namespace, &selector)
            .await
            .context(ListPodsSnafu { name: &name })?;
        let running = pods
            .iter()
            .filter(|pod| {
                pod.status
                    .as_ref()
                    .and_then(|status| status.phase.as_deref())
                    == Some("Running")
            })
            .count();

        if running as i32 >= desired_replicas {
            self.status.set(
                CONDITION_AVAILABLE,
                true,
                REASON_DEPLOYMENT_SATISFIED,
                &format!("{name} has {running} running pods"),
            );
            Ok(ReconcileResult::done())
        } else {
            self.status.set(
                CONDITION_AVAILABLE,
                false,
                REASON_DEPLOYMENT_NOT_SATISFIED,
                &format!("{name} has {running} of {desired_replicas} pods running"),
            );
            Ok(ReconcileResult::requeue(PODS_NOT_READY_REQUEUE_AFTER))
        }
    }

    /// Deletes objects carrying the cluster labels that were not applied in this pass.
    pub async fn delete_orphans(&self) -> Result<()> {
        let namespace = self.owner.namespace().unwrap_or_default();
        let selector: BTreeMap<String, String> = self
            .owner
            .cluster_labels()
            .context(ClusterLabelsSnafu)?
            .into();

        for kind in ObjectKind::cleanup_kinds() {
            let names = self
                .platform
                .list_owned(kind, &namespace, &selector)
                .await
                .context(ListOrphansSnafu { kind })?;
            for name in names {
                if self.applied.contains(&(kind, name.clone())) {
                    continue;
                }
                info!(%kind, name, "deleting orphaned object");
                self.platform
                    .delete(kind, &namespace, &name)
                    .await
                    .context(DeleteOrphanSnafu { kind, name: &name })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use stackable_operator::k8s_openapi::api::core::v1::Secret;

    use crate::platform::memory::InMemoryPlatform;

    fn trino() -> TrinoCluster {
        let input = r#"
        apiVersion: trino.stackable.tech/v1alpha1
        kind: TrinoCluster
        metadata:
          name: simple-trino
          namespace: default
          uid: 6f3f2b1c-0000-4000-8000-000000000001
        spec: {}
        "#;
        serde_yaml::from_str(input).expect("illegal test input")
    }

    struct SecretBuilder(String);

    impl ResourceBuilder for SecretBuilder {
        fn build(&self) -> Result<DesiredObject, BoxedError> {
            Ok(DesiredObject::General(ManagedObject::Secret(Secret {
                metadata: ObjectMeta {
                    name: Some(self.0.clone()),
                    namespace: Some("default".to_string()),
                    labels: Some(trino().cluster_labels().expect("valid labels").into()),
                    ..ObjectMeta::default()
                },
                string_data: Some(BTreeMap::from([("key".to_string(), "value".to_string())])),
                ..Secret::default()
            })))
        }
    }

    struct ConfigBuilder;

    impl ResourceBuilder for ConfigBuilder {
        fn build(&self) -> Result<DesiredObject, BoxedError> {
            Ok(DesiredObject::Configuration {
                metadata: ObjectMeta {
                    name: Some("simple-trino-config".to_string()),
                    namespace: Some("default".to_string()),
                    labels: Some(trino().cluster_labels().expect("valid labels").into()),
                    ..ObjectMeta::default()
                },
                files: RoleGroupConfigFiles {
                    properties: BTreeMap::from([(
                        "config.properties".to_string(),
                        BTreeMap::from([("a".to_string(), Some("1".to_string()))]),
                    )]),
                    jvm_config: "-server\n".to_string(),
                    vector_config: None,
                },
                overrides: ConfigOverrides {
                    config_properties: BTreeMap::from([("a".to_string(), "2".to_string())]),
                    ..ConfigOverrides::default()
                },
            })
        }
    }

    struct Pair;

    impl MultiResourceBuilder for Pair {
        fn build(&self) -> Result<Vec<Box<dyn ResourceBuilder + '_>>, BoxedError> {
            Ok(vec![
                Box::new(SecretBuilder("first".to_string())),
                Box::new(SecretBuilder("second".to_string())),
            ])
        }
    }

    struct Failing;

    impl ResourceBuilder for Failing {
        fn build(&self) -> Result<DesiredObject, BoxedError> {
            Err("no can do".into())
        }
    }

    #[tokio::test]
    async fn test_idempotent_apply() {
        let platform = InMemoryPlatform::new();
        let trino = trino();
        let mut reconciler = Reconciler::new(&platform, &trino);

        let first = reconciler
            .reconcile(&SecretBuilder("secret".to_string()))
            .await
            .expect("apply works");
        assert_eq!(first, ReconcileResult::requeue(GENERAL_REQUEUE_AFTER));

        let second = reconciler
            .reconcile(&SecretBuilder("secret".to_string()))
            .await
            .expect("apply works");
        assert_eq!(second, ReconcileResult::done());
        assert_eq!(platform.writes(), 1);

        let Some(ManagedObject::Secret(secret)) =
            platform.get(ObjectKind::Secret, "default", "secret")
        else {
            panic!("secret must exist");
        };
        let owner_refs = secret.metadata.owner_references.expect("owner reference set");
        assert_eq!(owner_refs[0].name, "simple-trino");
        assert_eq!(owner_refs[0].controller, Some(true));
    }

    #[tokio::test]
    async fn test_configuration_hook() {
        let platform = InMemoryPlatform::new();
        let trino = trino();
        let mut reconciler = Reconciler::new(&platform, &trino);
        reconciler
            .reconcile(&ConfigBuilder)
            .await
            .expect("apply works");

        let Some(ManagedObject::ConfigMap(config_map)) =
            platform.get(ObjectKind::ConfigMap, "default", "simple-trino-config")
        else {
            panic!("config map must exist");
        };
        let data = config_map.data.expect("data is set");
        assert_eq!(data.get("config.properties").map(String::as_str), Some("a=2\n"));
        assert_eq!(data.get("jvm.config").map(String::as_str), Some("-server\n"));
    }

    #[tokio::test]
    async fn test_multi_stops_at_first_requeue() {
        let platform = InMemoryPlatform::new();
        let trino = trino();
        let mut reconciler = Reconciler::new(&platform, &trino);

        let result = reconciler.reconcile_multi(&Pair).await.expect("apply works");
        assert!(result.is_requeue());
        assert_eq!(platform.names(ObjectKind::Secret), vec!["first"]);

        let result = reconciler.reconcile_multi(&Pair).await.expect("apply works");
        assert!(result.is_requeue());
        let result = reconciler.reconcile_multi(&Pair).await.expect("apply works");
        assert_eq!(result, ReconcileResult::done());
        assert_eq!(platform.names(ObjectKind::Secret), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_build_error_aborts() {
        let platform = InMemoryPlatform::new();
        let trino = trino();
        let mut reconciler = Reconciler::new(&platform, &trino);
        assert!(matches!(
            reconciler.reconcile(&Failing).await,
            Err(Error::BuildObject { .. })
        ));
        assert_eq!(platform.writes(), 0);
    }

    #[tokio::test]
    async fn test_delete_orphans() {
        let platform = InMemoryPlatform::new();
        let trino = trino();

        let mut reconciler = Reconciler::new(&platform, &trino);
        reconciler.reconcile(&ConfigBuilder).await.expect("apply works");

        platform.insert(ManagedObject::ConfigMap(ConfigMap {
            metadata: ObjectMeta {
                name: Some("simple-trino-worker-removed".to_string()),
                namespace: Some("default".to_string()),
                labels: Some(trino.cluster_labels().expect("valid labels").into()),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        }));
        platform.insert(ManagedObject::ConfigMap(ConfigMap {
            metadata: ObjectMeta {
                name: Some("unrelated".to_string()),
                namespace: Some("default".to_string()),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        }));

        reconciler.delete_orphans().await.expect("cleanup works");
        assert_eq!(
            platform.names(ObjectKind::ConfigMap),
            vec!["simple-trino-config", "unrelated"]
        );
    }
}
