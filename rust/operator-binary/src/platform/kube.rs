use std::{collections::BTreeMap, fmt::Debug};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use snafu::{OptionExt, ResultExt};
use stackable_operator::{
    client::{Client, GetApi},
    commons::authentication::AuthenticationClass,
    k8s_openapi::{
        api::{
            apps::v1::StatefulSet,
            core::v1::{ConfigMap, Pod, Secret, Service},
            policy::v1::PodDisruptionBudget,
        },
        NamespaceResourceScope,
    },
    kube::{
        self,
        api::{DeleteParams, ListParams},
        Resource, ResourceExt,
    },
};
use tracing::debug;

use crate::{
    crd::{TrinoCluster, TrinoClusterStatus, CONTROLLER_NAME, OPERATOR_NAME},
    platform::{
        ApplyObjectSnafu, DeleteObjectSnafu, GetAuthenticationClassSnafu, GetObjectSnafu,
        ListObjectsSnafu, ListPodsSnafu, ManagedObject, ObjectHasNoNameSnafu,
        ObjectHasNoNamespaceSnafu, ObjectKind, Platform, Result, UpdateStatusSnafu,
    },
};

/// [`Platform`] backed by the Kubernetes API server through the operator [`Client`], writing
/// with server-side apply.
pub struct KubePlatform {
    client: Client,
}

impl KubePlatform {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Applies an object our controller owns. It counts as mutated if it did not exist before or
    /// its resourceVersion moved.
    async fn apply_owned<K>(&self, kind: ObjectKind, obj: &K) -> Result<bool>
    where
        K: Resource<DynamicType = ()>
            + GetApi<Namespace = str>
            + Serialize
            + DeserializeOwned
            + Clone
            + Debug,
    {
        let name = obj.meta().name.as_deref().context(ObjectHasNoNameSnafu { kind })?;
        let namespace = obj
            .meta()
            .namespace
            .as_deref()
            .context(ObjectHasNoNamespaceSnafu { kind, name })?;

        let before = self
            .client
            .get_opt::<K>(name, namespace)
            .await
            .context(GetObjectSnafu { kind, name })?;
        let after = self
            .client
            .apply_patch(CONTROLLER_NAME, obj, obj)
            .await
            .context(ApplyObjectSnafu { kind, name })?;

        let mutated = before.map(|b| b.resource_version()) != Some(after.resource_version());
        debug!(%kind, name, mutated, "applied object");
        Ok(mutated)
    }

    async fn list_names<K>(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>>
    where
        K: Resource<DynamicType = ()> + GetApi<Namespace = str> + DeserializeOwned + Clone + Debug,
    {
        let objects = self
            .client
            .list::<K>(
                namespace,
                &ListParams::default().labels(&label_selector(selector)),
            )
            .await
            .context(ListObjectsSnafu { kind })?;
        Ok(objects.iter().map(|obj| obj.name_any()).collect())
    }

    async fn delete_named<K>(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<()>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + DeserializeOwned
            + Clone
            + Debug,
    {
        let api = kube::Api::<K>::namespaced(self.client.as_kube_client(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(err) => Err(err).context(DeleteObjectSnafu { kind, name }),
        }
    }
}

/// Renders a label map as a `key=value,...` selector.
fn label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl Platform for KubePlatform {
    async fn get_authentication_class(&self, name: &str) -> Result<Option<AuthenticationClass>> {
        self.client
            .get_opt::<AuthenticationClass>(name, &())
            .await
            .context(GetAuthenticationClassSnafu { name })
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        self.client
            .get_opt::<ConfigMap>(name, namespace)
            .await
            .context(GetObjectSnafu {
                kind: ObjectKind::ConfigMap,
                name,
            })
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        self.client
            .get_opt::<Secret>(name, namespace)
            .await
            .context(GetObjectSnafu {
                kind: ObjectKind::Secret,
                name,
            })
    }

    async fn create_or_update(&self, object: &ManagedObject) -> Result<bool> {
        let kind = object.kind();
        match object {
            ManagedObject::ConfigMap(obj) => self.apply_owned(kind, obj).await,
            ManagedObject::Service(obj) => self.apply_owned(kind, obj).await,
            ManagedObject::StatefulSet(obj) => self.apply_owned(kind, obj).await,
            ManagedObject::Secret(obj) => self.apply_owned(kind, obj).await,
            ManagedObject::PodDisruptionBudget(obj) => self.apply_owned(kind, obj).await,
        }
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        self.client
            .list::<Pod>(
                namespace,
                &ListParams::default().labels(&label_selector(selector)),
            )
            .await
            .context(ListPodsSnafu)
    }

    async fn list_owned(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        match kind {
            ObjectKind::ConfigMap => self.list_names::<ConfigMap>(kind, namespace, selector).await,
            ObjectKind::Service => self.list_names::<Service>(kind, namespace, selector).await,
            ObjectKind::StatefulSet => {
                self.list_names::<StatefulSet>(kind, namespace, selector)
                    .await
            }
            ObjectKind::Secret => self.list_names::<Secret>(kind, namespace, selector).await,
            ObjectKind::PodDisruptionBudget => {
                self.list_names::<PodDisruptionBudget>(kind, namespace, selector)
                    .await
            }
        }
    }

    async fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<()> {
        match kind {
            ObjectKind::ConfigMap => self.delete_named::<ConfigMap>(kind, namespace, name).await,
            ObjectKind::Service => self.delete_named::<Service>(kind, namespace, name).await,
            ObjectKind::StatefulSet => {
                self.delete_named::<StatefulSet>(kind, namespace, name)
                    .await
            }
            ObjectKind::Secret => self.delete_named::<Secret>(kind, namespace, name).await,
            ObjectKind::PodDisruptionBudget => {
                self.delete_named::<PodDisruptionBudget>(kind, namespace, name)
                    .await
            }
        }
    }

    async fn update_status(
        &self,
        trino: &TrinoCluster,
        status: &TrinoClusterStatus,
    ) -> Result<()> {
        self.client
            .apply_patch_status(OPERATOR_NAME, trino, status)
            .await
            .context(UpdateStatusSnafu {
                name: trino.name_any(),
            })?;
        Ok(())
    }
}
