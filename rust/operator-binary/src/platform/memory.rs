//! In-process [`Platform`] for tests. StatefulSets are treated as healthy, so listing pods yields
//! one running pod per replica unless pods are marked as not ready.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use stackable_operator::{
    commons::authentication::AuthenticationClass,
    k8s_openapi::{
        api::core::v1::{ConfigMap, Pod, PodStatus, Secret},
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    },
    kube::ResourceExt,
};

use crate::{
    crd::{TrinoCluster, TrinoClusterStatus},
    platform::{ManagedObject, ObjectKind, Platform, Result},
};

type ObjectKey = (ObjectKind, String, String);

#[derive(Default)]
pub struct InMemoryPlatform {
    objects: Mutex<BTreeMap<ObjectKey, ManagedObject>>,
    authentication_classes: Mutex<BTreeMap<String, AuthenticationClass>>,
    statuses: Mutex<BTreeMap<String, TrinoClusterStatus>>,
    pods_not_ready: AtomicBool,
    writes: AtomicUsize,
    status_writes: AtomicUsize,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_authentication_class(&self, class: AuthenticationClass) {
        if let Ok(mut classes) = self.authentication_classes.lock() {
            classes.insert(class.name_any(), class);
        }
    }

    /// Stores an object without counting it as a write.
    pub fn insert(&self, object: ManagedObject) {
        let key = key_of(&object);
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(key, object);
        }
    }

    pub fn set_pods_ready(&self, ready: bool) {
        self.pods_not_ready.store(!ready, Ordering::SeqCst);
    }

    pub fn get(&self, kind: ObjectKind, namespace: &str, name: &str) -> Option<ManagedObject> {
        self.objects.lock().ok().and_then(|objects| {
            objects
                .get(&(kind, namespace.to_string(), name.to_string()))
                .cloned()
        })
    }

    pub fn names(&self, kind: ObjectKind) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| {
                objects
                    .keys()
                    .filter(|(k, _, _)| *k == kind)
                    .map(|(_, _, name)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn status(&self, name: &str) -> Option<TrinoClusterStatus> {
        self.statuses
            .lock()
            .ok()
            .and_then(|statuses| statuses.get(name).cloned())
    }

    /// Number of object writes that changed something.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }
}

fn key_of(object: &ManagedObject) -> ObjectKey {
    let meta = object.meta();
    (
        object.kind(),
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

fn serialized(object: &ManagedObject) -> serde_json::Value {
    let value = match object {
        ManagedObject::ConfigMap(obj) => serde_json::to_value(obj),
        ManagedObject::Service(obj) => serde_json::to_value(obj),
        ManagedObject::StatefulSet(obj) => serde_json::to_value(obj),
        ManagedObject::Secret(obj) => serde_json::to_value(obj),
        ManagedObject::PodDisruptionBudget(obj) => serde_json::to_value(obj),
    };
    value.unwrap_or_default()
}

fn matches_selector(meta: &ObjectMeta, selector: &BTreeMap<String, String>) -> bool {
    let labels = meta.labels.clone().unwrap_or_default();
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

#[async_trait]
impl Platform for InMemoryPlatform {
    async fn get_authentication_class(&self, name: &str) -> Result<Option<AuthenticationClass>> {
        Ok(self
            .authentication_classes
            .lock()
            .ok()
            .and_then(|classes| classes.get(name).cloned()))
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        Ok(match self.get(ObjectKind::ConfigMap, namespace, name) {
            Some(ManagedObject::ConfigMap(cm)) => Some(cm),
            _ => None,
        })
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(match self.get(ObjectKind::Secret, namespace, name) {
            Some(ManagedObject::Secret(secret)) => Some(secret),
            _ => None,
        })
    }

    async fn create_or_update(&self, object: &ManagedObject) -> Result<bool> {
        let key = key_of(object);
        let mut objects = match self.objects.lock() {
            Ok(objects) => objects,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mutated = objects
            .get(&key)
            .map(|existing| serialized(existing) != serialized(object))
            .unwrap_or(true);
        if mutated {
            objects.insert(key, object.clone());
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(mutated)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        if self.pods_not_ready.load(Ordering::SeqCst) {
            return Ok(vec![]);
        }
        let objects = match self.objects.lock() {
            Ok(objects) => objects,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut pods = vec![];
        for ((_, ns, name), object) in objects.iter() {
            let ManagedObject::StatefulSet(sts) = object else {
                continue;
            };
            let Some(spec) = &sts.spec else {
                continue;
            };
            let template_meta = spec.template.metadata.clone().unwrap_or_default();
            if ns != namespace || !matches_selector(&template_meta, selector) {
                continue;
            }
            for ordinal in 0..spec.replicas.unwrap_or(1) {
                pods.push(Pod {
                    metadata: ObjectMeta {
                        name: Some(format!("{name}-{ordinal}")),
                        namespace: Some(ns.clone()),
                        labels: template_meta.labels.clone(),
                        ..ObjectMeta::default()
                    },
                    spec: None,
                    status: Some(PodStatus {
                        phase: Some("Running".to_string()),
                        ..PodStatus::default()
                    }),
                });
            }
        }
        Ok(pods)
    }

    async fn list_owned(
        &self,
        kind: ObjectKind,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>> {
        let objects = match self.objects.lock() {
            Ok(objects) => objects,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(objects
            .iter()
            .filter(|((k, ns, _), object)| {
                *k == kind && ns == namespace && matches_selector(object.meta(), selector)
            })
            .map(|((_, _, name), _)| name.clone())
            .collect())
    }

    async fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<()> {
        if let Ok(mut objects) = self.objects.lock() {
            objects.remove(&(kind, namespace.to_string(), name.to_string()));
        }
        Ok(())
    }

    async fn update_status(
        &self,
        trino: &TrinoCluster,
        status: &TrinoClusterStatus,
    ) -> Result<()> {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.insert(trino.name_any(), status.clone());
        }
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
