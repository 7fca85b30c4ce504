//! The narrow surface the reconciler needs from the cluster it runs against.

pub mod kube;
#[cfg(test)]
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use snafu::Snafu;
use stackable_operator::{
    k8s_openapi::{
        api::{
            apps::v1::StatefulSet,
            core::v1::{ConfigMap, Pod, Secret, Service},
            policy::v1::PodDisruptionBudget,
        },
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    },
    client,
    commons::authentication::AuthenticationClass,
    kube::{self, Resource},
};
use strum::{Display, EnumIter};

use crate::crd::{TrinoCluster, TrinoClusterStatus};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to get {kind} {name}"))]
    GetObject {
        source: client::Error,
        kind: ObjectKind,
        name: String,
    },

    #[snafu(display("failed to get AuthenticationClass {name}"))]
    GetAuthenticationClass {
        source: client::Error,
        name: String,
    },

    #[snafu(display("failed to apply {kind} {name}"))]
    ApplyObject {
        source: client::Error,
        kind: ObjectKind,
        name: String,
    },

    #[snafu(display("failed to list {kind} objects"))]
    ListObjects {
        source: client::Error,
        kind: ObjectKind,
    },

    #[snafu(display("failed to list pods"))]
    ListPods {
        source: client::Error,
    },

    #[snafu(display("failed to delete {kind} {name}"))]
    DeleteObject {
        source: kube::Error,
        kind: ObjectKind,
        name: String,
    },

    #[snafu(display("failed to update status of {name}"))]
    UpdateStatus {
        source: client::Error,
        name: String,
    },

    #[snafu(display("{kind} has no name"))]
    ObjectHasNoName { kind: ObjectKind },

    #[snafu(display("{kind} {name} has no namespace"))]
    ObjectHasNoNamespace { kind: ObjectKind, name: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Kinds of objects the operator creates and cleans up.
#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ObjectKind {
    ConfigMap,
    Service,
    StatefulSet,
    Secret,
    PodDisruptionBudget,
}

impl ObjectKind {
    /// Kinds that are derived per role group and removed once no longer desired.
    pub fn cleanup_kinds() -> [ObjectKind; 4] {
        [
            ObjectKind::ConfigMap,
            ObjectKind::Service,
            ObjectKind::StatefulSet,
            ObjectKind::PodDisruptionBudget,
        ]
    }
}

/// A fully built object ready to be written.
#[derive(Clone, Debug, PartialEq)]
pub enum ManagedObject {
    ConfigMap(ConfigMap),
    Service(Service),
    StatefulSet(StatefulSet),
    Secret(Secret),
    PodDisruptionBudget(PodDisruptionBudget),
}

impl ManagedObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ManagedObject::ConfigMap(_) => ObjectKind::ConfigMap,
            ManagedObject::Service(_) => ObjectKind::Service,
            ManagedObject::StatefulSet(_) => ObjectKind::StatefulSet,
            ManagedObject::Secret(_) => ObjectKind::Secret,
            ManagedObject::PodDisruptionBudget(_) => ObjectKind::PodDisruptionBudget,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            ManagedObject::ConfigMap(obj) => obj.meta(),
            ManagedObject::Service(obj) => obj.meta(),
            ManagedObject::StatefulSet(obj) => obj.meta(),
            ManagedObject::Secret(obj) => obj.meta(),
            ManagedObject::PodDisruptionBudget(obj) => obj.meta(),
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ManagedObject::ConfigMap(obj) => obj.meta_mut(),
            ManagedObject::Service(obj) => obj.meta_mut(),
            ManagedObject::StatefulSet(obj) => obj.meta_mut(),
            ManagedObject::Secret(obj) => obj.meta_mut(),
            ManagedObject::PodDisruptionBudget(obj) => obj.meta_mut(),
        }
    }

    pub fn name(&self) -> Result<&str> {
        self.meta()
            .name
            .as_deref()
            .ok_or(Error::ObjectHasNoName { kind: self.kind() })
    }
}

#[async_trait]
pub trait Platform: Send + Sync {
    /// AuthenticationClasses are cluster scoped. `None` if it does not exist.
    async fn get_authentication_class(&self, name: &str) -> Result<Option<AuthenticationClass>>;

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    /// Writes the object. Returns `true` if the stored object changed.
    async fn create_or_update(&self, object: &ManagedObject) -> Result<bool>;

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>>;

    /// Names of all objects of `kind` matching the label selector.
    async fn list_owned(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>>;

    /// Deleting an object that does not exist is not an error.
    async fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<()>;

    async fn update_status(&self, trino: &TrinoCluster, status: &TrinoClusterStatus)
        -> Result<()>;
}
