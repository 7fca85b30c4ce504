pub mod affinity;
pub mod authentication;

use std::{collections::BTreeMap, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::{OptionExt, Snafu};
use stackable_operator::{
    commons::{
        affinity::StackableAffinity,
        cluster_operation::ClusterOperation,
        resources::{NoRuntimeLimits, PvcConfig, Resources},
    },
    config::{fragment::Fragment, merge::Merge},
    k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition,
    kube::{runtime::reflector::ObjectRef, CustomResource, ResourceExt},
    kvp::{Label, LabelError, Labels, ObjectLabels},
    product_logging::spec::Logging,
    role_utils::{GenericRoleConfig, RoleGroupRef},
    schemars::{self, JsonSchema},
    time::Duration,
};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::crd::authentication::TrinoAuthenticationRef;

pub const APP_NAME: &str = "trino";
pub const OPERATOR_NAME: &str = "trino.stackable.tech";
pub const CONTROLLER_NAME: &str = "trinocluster";

pub const HTTP_PORT_NAME: &str = "http";
pub const HTTP_PORT: u16 = 8080;
pub const HTTPS_PORT_NAME: &str = "https";
pub const HTTPS_PORT: u16 = 8443;
pub const METRICS_PORT_NAME: &str = "metrics";
pub const METRICS_PORT: u16 = 8081;

// Files of a role group ConfigMap
pub const CONFIG_PROPERTIES: &str = "config.properties";
pub const NODE_PROPERTIES: &str = "node.properties";
pub const LOG_PROPERTIES: &str = "log.properties";
pub const EXCHANGE_MANAGER_PROPERTIES: &str = "exchange-manager.properties";
pub const JVM_SECURITY_PROPERTIES: &str = "security.properties";
pub const JVM_CONFIG: &str = "jvm.config";
pub const VECTOR_CONFIG_FILE: &str = "vector.yaml";

// Mount points inside the Trino container
pub const CONFIG_DIR_NAME: &str = "/stackable/config";
pub const RW_CONFIG_DIR_NAME: &str = "/stackable/rwconfig";
pub const CATALOG_DIR_NAME: &str = "/stackable/catalog";
pub const SCHEMA_DIR_NAME: &str = "/stackable/schema";
pub const DATA_DIR_NAME: &str = "/stackable/data";
pub const STACKABLE_LOG_DIR: &str = "/stackable/log";
pub const STACKABLE_SERVER_TLS_DIR: &str = "/stackable/server_tls";
pub const STACKABLE_CLIENT_TLS_DIR: &str = "/stackable/client_tls";
pub const STACKABLE_INTERNAL_TLS_DIR: &str = "/stackable/internal_tls";
pub const STACKABLE_SECRETS_DIR: &str = "/stackable/secrets";
pub const STACKABLE_AUTH_SECRETS_DIR: &str = "/stackable/auth-secrets";
pub const STACKABLE_USERS_DIR: &str = "/stackable/users";

/// Java truststore shipped with the image. Its password is the JDK default.
pub const SYSTEM_TRUST_STORE: &str = "/etc/pki/java/cacerts";
pub const SYSTEM_TRUST_STORE_PASSWORD: &str = "changeit";
/// Password of the PKCS#12 stores the secret operator writes.
pub const STACKABLE_TLS_STORE_PASSWORD: &str = "changeit";

pub const ENV_INTERNAL_SHARED_SECRET: &str = "INTERNAL_SHARED_SECRET";

pub const DEFAULT_IMAGE_REPOSITORY: &str = "trinodb/trino";
pub const DEFAULT_IMAGE_TAG: &str = "458";
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "IfNotPresent";
pub const DEFAULT_LISTENER_CLASS: &str = "cluster-internal";
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";
pub const DEFAULT_SECRET_CLASS: &str = "tls";
pub const DEFAULT_QUERY_MAX_MEMORY: &str = "5GB";
pub const DEFAULT_EXCHANGE_MANAGER_NAME: &str = "filesystem";
pub const DEFAULT_EXCHANGE_BASE_DIRECTORIES: &str = "/tmp/trino-local-file-system-exchange-manager";
pub const DEFAULT_STORAGE_CAPACITY: &str = "1Gi";
pub const DEFAULT_JVM_HEAP_FACTOR: f32 = 0.8;
pub const DEFAULT_COORDINATOR_GRACEFUL_SHUTDOWN_TIMEOUT: Duration =
    Duration::from_minutes_unchecked(15);
pub const DEFAULT_WORKER_GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_minutes_unchecked(60);

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("object has no namespace associated"))]
    NoNamespace,

    #[snafu(display("object has no name"))]
    NoName,

    #[snafu(display("unknown role {role}. Should be one of {roles:?}"))]
    UnknownTrinoRole {
        source: strum::ParseError,
        role: String,
        roles: Vec<String>,
    },

    #[snafu(display("the role group {role_group} is not defined for role {role}"))]
    CannotRetrieveTrinoRoleGroup { role: String, role_group: String },

    #[snafu(display(
        "exactly one coordinator role group is required to derive the discovery URI, found {count}"
    ))]
    CoordinatorRoleGroupCount { count: usize },
}

/// A Trino cluster. The operator derives ConfigMaps, Services and StatefulSets for every
/// coordinator and worker role group from this resource.
#[derive(Clone, CustomResource, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "trino.stackable.tech",
    version = "v1alpha1",
    kind = "TrinoCluster",
    plural = "trinoclusters",
    shortname = "trino",
    status = "TrinoClusterStatus",
    namespaced,
    crates(
        kube_core = "stackable_operator::kube::core",
        k8s_openapi = "stackable_operator::k8s_openapi",
        schemars = "stackable_operator::schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct TrinoClusterSpec {
    #[serde(default)]
    pub image: TrinoImage,

    /// Settings that affect all roles and role groups.
    #[serde(default)]
    pub cluster_config: TrinoClusterConfig,

    // no doc - it's in the struct.
    #[serde(default)]
    pub cluster_operation: ClusterOperation,

    #[serde(default)]
    pub coordinators: TrinoRoleSpec,

    #[serde(default)]
    pub workers: TrinoRoleSpec,
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrinoImage {
    #[serde(default = "default_image_repository")]
    pub repository: String,
    #[serde(default = "default_image_tag")]
    pub tag: String,
    #[serde(default = "default_image_pull_policy")]
    pub pull_policy: String,
}

impl Default for TrinoImage {
    fn default() -> Self {
        TrinoImage {
            repository: default_image_repository(),
            tag: default_image_tag(),
            pull_policy: default_image_pull_policy(),
        }
    }
}

impl TrinoImage {
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

fn default_image_repository() -> String {
    DEFAULT_IMAGE_REPOSITORY.to_string()
}

fn default_image_tag() -> String {
    DEFAULT_IMAGE_TAG.to_string()
}

fn default_image_pull_policy() -> String {
    DEFAULT_IMAGE_PULL_POLICY.to_string()
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrinoClusterConfig {
    /// Authentication classes Trino authenticates clients against, in the order Trino tries them.
    #[serde(default)]
    pub authentication: Vec<TrinoAuthenticationRef>,

    /// TLS for client and internal communication. TLS is disabled if this is not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TrinoTls>,

    /// Controls how the coordinator is exposed: `cluster-internal`, `external-unstable` or
    /// `external-stable`.
    #[serde(default = "default_listener_class")]
    pub listener_class: String,

    /// Additional catalogs, keyed by catalog name. The value is the content of the
    /// `<name>.properties` catalog file.
    #[serde(default)]
    pub catalogs: BTreeMap<String, String>,

    /// Whether workers take all query work. Derived from the presence of worker role groups
    /// when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_mode: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_manager: Option<ExchangeManager>,

    /// Name of the Vector aggregator discovery ConfigMap.
    /// It must contain the key `ADDRESS` with the address of the Vector aggregator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_aggregator_config_map_name: Option<String>,
}

impl Default for TrinoClusterConfig {
    fn default() -> Self {
        TrinoClusterConfig {
            authentication: vec![],
            tls: None,
            listener_class: default_listener_class(),
            catalogs: BTreeMap::new(),
            cluster_mode: None,
            exchange_manager: None,
            vector_aggregator_config_map_name: None,
        }
    }
}

fn default_listener_class() -> String {
    DEFAULT_LISTENER_CLASS.to_string()
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrinoTls {
    /// SecretClass providing the certificate the servers use towards clients.
    #[serde(default = "tls_secret_class_default")]
    pub server_secret_class: String,
    /// SecretClass providing the certificate used between Trino nodes.
    #[serde(default = "tls_secret_class_default")]
    pub internal_secret_class: String,
}

impl Default for TrinoTls {
    fn default() -> Self {
        TrinoTls {
            server_secret_class: tls_secret_class_default(),
            internal_secret_class: tls_secret_class_default(),
        }
    }
}

fn tls_secret_class_default() -> String {
    DEFAULT_SECRET_CLASS.to_string()
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeManager {
    #[serde(default = "default_exchange_manager_name")]
    pub name: String,
    #[serde(default = "default_exchange_base_directories")]
    pub base_directories: String,
}

impl Default for ExchangeManager {
    fn default() -> Self {
        ExchangeManager {
            name: default_exchange_manager_name(),
            base_directories: default_exchange_base_directories(),
        }
    }
}

fn default_exchange_manager_name() -> String {
    DEFAULT_EXCHANGE_MANAGER_NAME.to_string()
}

fn default_exchange_base_directories() -> String {
    DEFAULT_EXCHANGE_BASE_DIRECTORIES.to_string()
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrinoRoleSpec {
    #[serde(flatten)]
    pub config: TrinoCommonConfig,

    /// Replica count for role groups that do not set their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u16>,

    #[serde(default)]
    pub role_config: GenericRoleConfig,

    #[serde(default)]
    pub role_groups: BTreeMap<String, TrinoRoleGroupSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrinoRoleGroupSpec {
    #[serde(flatten)]
    pub config: TrinoCommonConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u16>,
}

/// Settings shared by roles and role groups. The role group level wins over the role level,
/// which wins over the operator defaults.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrinoCommonConfig {
    #[serde(default)]
    pub config: TrinoConfigFragment,
    #[serde(default)]
    pub config_overrides: ConfigOverrides,
    #[serde(default)]
    pub env_overrides: BTreeMap<String, String>,
    /// Replaces the arguments of the Trino container if not empty.
    #[serde(default)]
    pub command_args_overrides: Vec<String>,
    /// Share of the memory limit given to the JVM heap, greater than 0 and at most 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jvm_heap_factor: Option<f32>,
}

#[derive(Clone, Debug, Default, Fragment, JsonSchema, PartialEq)]
#[fragment_attrs(
    derive(
        Clone,
        Debug,
        Default,
        Deserialize,
        Merge,
        JsonSchema,
        PartialEq,
        Serialize
    ),
    serde(rename_all = "camelCase")
)]
pub struct TrinoConfig {
    pub query_max_memory: Option<String>,
    /// Left out of `config.properties` when not set, Trino then picks its own default.
    pub query_max_memory_per_node: Option<String>,
    #[fragment_attrs(serde(default))]
    pub logging: Logging<Container>,
    #[fragment_attrs(serde(default))]
    pub resources: Resources<TrinoStorageConfig, NoRuntimeLimits>,
    #[fragment_attrs(serde(default))]
    pub affinity: StackableAffinity,
    /// Time period Pods have to gracefully shut down, e.g. `30m`, `1h` or `2d`.
    #[fragment_attrs(serde(default))]
    pub graceful_shutdown_timeout: Option<Duration>,
}

#[derive(Clone, Debug, Default, Fragment, JsonSchema, PartialEq)]
#[fragment_attrs(
    derive(
        Clone,
        Debug,
        Default,
        Deserialize,
        Merge,
        JsonSchema,
        PartialEq,
        Serialize
    ),
    serde(rename_all = "camelCase")
)]
pub struct TrinoStorageConfig {
    #[fragment_attrs(serde(default))]
    pub data: PvcConfig,
}

/// Per-file overrides. Properties files are merged key by key, `jvm.config` is replaced as a
/// whole since it is a flag list.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub struct ConfigOverrides {
    #[serde(rename = "node.properties", default)]
    pub node_properties: BTreeMap<String, String>,
    #[serde(rename = "config.properties", default)]
    pub config_properties: BTreeMap<String, String>,
    #[serde(rename = "log.properties", default)]
    pub log_properties: BTreeMap<String, String>,
    #[serde(rename = "exchange-manager.properties", default)]
    pub exchange_manager_properties: BTreeMap<String, String>,
    #[serde(rename = "security.properties", default)]
    pub security_properties: BTreeMap<String, String>,
    #[serde(
        rename = "jvm.config",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub jvm_config: Option<String>,
}

impl ConfigOverrides {
    /// The key/value overrides for a properties file, if the file accepts any.
    pub fn properties_for(&self, file_name: &str) -> Option<&BTreeMap<String, String>> {
        match file_name {
            NODE_PROPERTIES => Some(&self.node_properties),
            CONFIG_PROPERTIES => Some(&self.config_properties),
            LOG_PROPERTIES => Some(&self.log_properties),
            EXCHANGE_MANAGER_PROPERTIES => Some(&self.exchange_manager_properties),
            JVM_SECURITY_PROPERTIES => Some(&self.security_properties),
            _ => None,
        }
    }
}

#[derive(Clone, Default, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrinoClusterStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    EnumIter,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    EnumString,
)]
pub enum TrinoRole {
    #[strum(serialize = "coordinator")]
    Coordinator,
    #[strum(serialize = "worker")]
    Worker,
}

impl TrinoRole {
    /// Metadata about a rolegroup
    pub fn rolegroup_ref(
        &self,
        trino: &TrinoCluster,
        group_name: impl Into<String>,
    ) -> RoleGroupRef<TrinoCluster> {
        RoleGroupRef {
            cluster: ObjectRef::from_obj(trino),
            role: self.to_string(),
            role_group: group_name.into(),
        }
    }

    pub fn roles() -> Vec<String> {
        Self::iter().map(|role| role.to_string()).collect()
    }
}

#[derive(
    Clone,
    Debug,
    Deserialize,
    Display,
    Eq,
    EnumIter,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Container {
    // sidecar
    Vector,
    // main
    Trino,
}

impl TrinoCluster {
    /// Returns the name of the cluster and raises an Error if the name is not set.
    pub fn name_r(&self) -> Result<String, Error> {
        self.metadata.name.to_owned().context(NoNameSnafu)
    }

    /// Returns the namespace of the cluster and raises an Error if the name is not set.
    pub fn namespace_r(&self) -> Result<String, Error> {
        self.metadata.namespace.to_owned().context(NoNamespaceSnafu)
    }

    pub fn role(&self, role: &TrinoRole) -> &TrinoRoleSpec {
        match role {
            TrinoRole::Coordinator => &self.spec.coordinators,
            TrinoRole::Worker => &self.spec.workers,
        }
    }

    /// Returns the role group referenced by `rolegroup_ref`. Raises an error if it is not defined.
    pub fn rolegroup(
        &self,
        rolegroup_ref: &RoleGroupRef<TrinoCluster>,
    ) -> Result<&TrinoRoleGroupSpec, Error> {
        let trino_role =
            TrinoRole::from_str(&rolegroup_ref.role).with_context(|_| UnknownTrinoRoleSnafu {
                role: rolegroup_ref.role.to_owned(),
                roles: TrinoRole::roles(),
            })?;

        self.role(&trino_role)
            .role_groups
            .get(&rolegroup_ref.role_group)
            .with_context(|| CannotRetrieveTrinoRoleGroupSnafu {
                role: rolegroup_ref.role.to_owned(),
                role_group: rolegroup_ref.role_group.to_owned(),
            })
    }

    /// The single coordinator role group. Workers derive their discovery URI from it, so zero
    /// or several coordinator role groups are rejected.
    pub fn coordinator_rolegroup_ref(&self) -> Result<RoleGroupRef<TrinoCluster>, Error> {
        let groups = &self.spec.coordinators.role_groups;
        match groups.keys().next() {
            Some(name) if groups.len() == 1 => Ok(TrinoRole::Coordinator.rolegroup_ref(self, name)),
            _ => CoordinatorRoleGroupCountSnafu {
                count: groups.len(),
            }
            .fail(),
        }
    }

    pub fn role_service_name(&self, role: &TrinoRole) -> Result<String, Error> {
        Ok(format!("{}-{}", self.name_r()?, role))
    }

    pub fn rolegroup_service_fqdn(
        &self,
        rolegroup_ref: &RoleGroupRef<TrinoCluster>,
        cluster_domain: &str,
    ) -> Result<String, Error> {
        Ok(format!(
            "{service}.{namespace}.svc.{cluster_domain}",
            service = rolegroup_ref.object_name(),
            namespace = self.namespace_r()?,
        ))
    }

    pub fn catalog_config_map_name(&self) -> Result<String, Error> {
        Ok(format!("{}-catalog", self.name_r()?))
    }

    pub fn schema_config_map_name(&self) -> Result<String, Error> {
        Ok(format!("{}-schema", self.name_r()?))
    }

    pub fn shared_secret_name(&self) -> Result<String, Error> {
        Ok(format!("{}-internal-shared-secret", self.name_r()?))
    }

    /// Workers take all query work when the cluster runs in cluster mode.
    pub fn cluster_mode(&self) -> bool {
        self.spec
            .cluster_config
            .cluster_mode
            .unwrap_or_else(|| !self.spec.workers.role_groups.is_empty())
    }

    /// Sum of the worker replicas over all role groups, saturating at `u16::MAX`.
    pub fn num_workers(&self) -> u16 {
        let role_replicas = self.spec.workers.replicas;
        let total = self
            .spec
            .workers
            .role_groups
            .values()
            .map(|rg| u32::from(rg.replicas.or(role_replicas).unwrap_or(1)))
            .fold(0u32, u32::saturating_add);
        u16::try_from(total).unwrap_or(u16::MAX)
    }

    /// Returns the minimal gracefulShutdownTimeout of all the worker rolegroups.
    pub fn min_worker_graceful_shutdown_timeout(&self) -> Duration {
        let role_timeout = self.spec.workers.config.config.graceful_shutdown_timeout;
        self.spec
            .workers
            .role_groups
            .values()
            .map(|role_group| {
                role_group
                    .config
                    .config
                    .graceful_shutdown_timeout
                    .unwrap_or(role_timeout.unwrap_or(DEFAULT_WORKER_GRACEFUL_SHUTDOWN_TIMEOUT))
            })
            .min()
            .unwrap_or(DEFAULT_WORKER_GRACEFUL_SHUTDOWN_TIMEOUT)
    }

    /// Check if any authentication settings are provided
    pub fn authentication_enabled(&self) -> bool {
        !self.spec.cluster_config.authentication.is_empty()
    }

    /// Return user provided TLS settings
    pub fn get_tls(&self) -> Option<&TrinoTls> {
        self.spec.cluster_config.tls.as_ref()
    }

    pub fn tls_enabled(&self) -> bool {
        self.get_tls().is_some()
    }

    pub fn exposed_port(&self) -> u16 {
        if self.tls_enabled() {
            HTTPS_PORT
        } else {
            HTTP_PORT
        }
    }

    pub fn exposed_protocol(&self) -> &'static str {
        if self.tls_enabled() {
            HTTPS_PORT_NAME
        } else {
            HTTP_PORT_NAME
        }
    }

    pub fn exchange_manager(&self) -> ExchangeManager {
        self.spec
            .cluster_config
            .exchange_manager
            .clone()
            .unwrap_or_default()
    }

    /// Labels every object of this cluster carries, used to find orphaned objects.
    pub fn cluster_labels(&self) -> Result<Labels, LabelError> {
        let mut labels = Labels::common(APP_NAME, &self.name_any())?;
        labels.insert(Label::managed_by(OPERATOR_NAME, CONTROLLER_NAME)?);
        Ok(labels)
    }

    pub fn role_selector_labels(&self, role: &TrinoRole) -> Result<Labels, LabelError> {
        Labels::role_selector(self, APP_NAME, &role.to_string())
    }

    pub fn rolegroup_selector_labels(
        &self,
        rolegroup_ref: &RoleGroupRef<TrinoCluster>,
    ) -> Result<Labels, LabelError> {
        Labels::role_group_selector(
            self,
            APP_NAME,
            &rolegroup_ref.role,
            &rolegroup_ref.role_group,
        )
    }

    /// Input for the recommended label set of an object, which includes the product version.
    pub fn object_labels<'a>(
        &'a self,
        role: &'a str,
        role_group: &'a str,
    ) -> ObjectLabels<'a, TrinoCluster> {
        ObjectLabels {
            owner: self,
            app_name: APP_NAME,
            app_version: &self.spec.image.tag,
            operator_name: OPERATOR_NAME,
            controller_name: CONTROLLER_NAME,
            role,
            role_group,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let input = r#"
        apiVersion: trino.stackable.tech/v1alpha1
        kind: TrinoCluster
        metadata:
          name: simple-trino
          namespace: default
        spec:
          coordinators:
            roleGroups:
              default:
                replicas: 1
        "#;
        let trino: TrinoCluster = serde_yaml::from_str(input).expect("illegal test input");
        assert_eq!(trino.spec.image.image_ref(), "trinodb/trino:458");
        assert_eq!(trino.spec.cluster_config.listener_class, "cluster-internal");
        assert!(!trino.tls_enabled());
        assert_eq!(trino.exposed_port(), HTTP_PORT);
        assert!(!trino.cluster_mode());
        assert!(!trino.spec.cluster_operation.stopped);
        assert_eq!(
            trino.exchange_manager().base_directories,
            DEFAULT_EXCHANGE_BASE_DIRECTORIES
        );
    }

    #[test]
    fn test_tls() {
        let input = r#"
        apiVersion: trino.stackable.tech/v1alpha1
        kind: TrinoCluster
        metadata:
          name: simple-trino
        spec:
          clusterConfig:
            tls:
              internalSecretClass: simple-trino-internal-tls
        "#;
        let trino: TrinoCluster = serde_yaml::from_str(input).expect("illegal test input");
        let tls = trino.get_tls().expect("tls must be enabled");
        assert_eq!(tls.server_secret_class, DEFAULT_SECRET_CLASS);
        assert_eq!(tls.internal_secret_class, "simple-trino-internal-tls");
        assert_eq!(trino.exposed_port(), HTTPS_PORT);
        assert_eq!(trino.exposed_protocol(), HTTPS_PORT_NAME);
    }

    #[test]
    fn test_coordinator_rolegroup_count() {
        let input = r#"
        apiVersion: trino.stackable.tech/v1alpha1
        kind: TrinoCluster
        metadata:
          name: simple-trino
        spec:
          coordinators:
            roleGroups:
              a: {}
              b: {}
          workers:
            roleGroups:
              default:
                replicas: 3
        "#;
        let trino: TrinoCluster = serde_yaml::from_str(input).expect("illegal test input");
        assert!(matches!(
            trino.coordinator_rolegroup_ref(),
            Err(Error::CoordinatorRoleGroupCount { count: 2 })
        ));
        assert!(trino.cluster_mode());
        assert_eq!(trino.num_workers(), 3);

        let input = r#"
        apiVersion: trino.stackable.tech/v1alpha1
        kind: TrinoCluster
        metadata:
          name: simple-trino
        spec: {}
        "#;
        let trino: TrinoCluster = serde_yaml::from_str(input).expect("illegal test input");
        assert!(matches!(
            trino.coordinator_rolegroup_ref(),
            Err(Error::CoordinatorRoleGroupCount { count: 0 })
        ));
    }

    #[rstest]
    #[case(&[3], 3)]
    #[case(&[2, 5], 7)]
    #[case(&[40000, 40000], u16::MAX)]
    #[case(&[u16::MAX, 1], u16::MAX)]
    fn test_num_workers(#[case] replicas: &[u16], #[case] expected: u16) {
        let mut trino: TrinoCluster = serde_yaml::from_str(
            r#"
        apiVersion: trino.stackable.tech/v1alpha1
        kind: TrinoCluster
        metadata:
          name: simple-trino
        spec: {}
        "#,
        )
        .expect("illegal test input");
        for (index, replicas) in replicas.iter().enumerate() {
            trino.spec.workers.role_groups.insert(
                format!("group-{index}"),
                TrinoRoleGroupSpec {
                    replicas: Some(*replicas),
                    ..TrinoRoleGroupSpec::default()
                },
            );
        }
        assert_eq!(trino.num_workers(), expected);
    }

    #[test]
    fn test_labels() {
        let input = r#"
        apiVersion: trino.stackable.tech/v1alpha1
        kind: TrinoCluster
        metadata:
          name: simple-trino
          namespace: default
        spec:
          workers:
            roleGroups:
              default: {}
        "#;
        let trino: TrinoCluster = serde_yaml::from_str(input).expect("illegal test input");

        let cluster_labels: BTreeMap<String, String> =
            trino.cluster_labels().expect("valid labels").into();
        assert_eq!(
            cluster_labels,
            BTreeMap::from([
                ("app.kubernetes.io/instance".to_string(), "simple-trino".to_string()),
                (
                    "app.kubernetes.io/managed-by".to_string(),
                    "trino.stackable.tech_trinocluster".to_string()
                ),
                ("app.kubernetes.io/name".to_string(), "trino".to_string()),
            ])
        );

        let rolegroup_ref = TrinoRole::Worker.rolegroup_ref(&trino, "default");
        let selector: BTreeMap<String, String> = trino
            .rolegroup_selector_labels(&rolegroup_ref)
            .expect("valid labels")
            .into();
        assert_eq!(
            selector.get("app.kubernetes.io/component").map(String::as_str),
            Some("worker")
        );
        assert_eq!(
            selector.get("app.kubernetes.io/role-group").map(String::as_str),
            Some("default")
        );

        let recommended: BTreeMap<String, String> =
            Labels::recommended(trino.object_labels("worker", "default"))
                .expect("valid labels")
                .into();
        assert_eq!(
            recommended.get("app.kubernetes.io/version").map(String::as_str),
            Some("458")
        );
        assert!(cluster_labels
            .iter()
            .all(|(key, value)| recommended.get(key) == Some(value)));
    }

    #[test]
    fn test_config_overrides() {
        let input = r#"
        apiVersion: trino.stackable.tech/v1alpha1
        kind: TrinoCluster
        metadata:
          name: simple-trino
        spec:
          coordinators:
            configOverrides:
              config.properties:
                query.max-history: "100"
              jvm.config: |
                -server
            roleGroups:
              default: {}
        "#;
        let trino: TrinoCluster = serde_yaml::from_str(input).expect("illegal test input");
        let overrides = &trino.spec.coordinators.config.config_overrides;
        assert_eq!(
            overrides
                .properties_for(CONFIG_PROPERTIES)
                .and_then(|props| props.get("query.max-history")),
            Some(&"100".to_string())
        );
        assert_eq!(overrides.jvm_config.as_deref(), Some("-server\n"));
        assert!(overrides.properties_for(JVM_CONFIG).is_none());
    }

    #[test]
    fn test_min_worker_graceful_shutdown_timeout() {
        let input = r#"
        apiVersion: trino.stackable.tech/v1alpha1
        kind: TrinoCluster
        metadata:
          name: simple-trino
        spec:
          workers:
            config:
              gracefulShutdownTimeout: 2h
            roleGroups:
              default: {}
              fast:
                config:
                  gracefulShutdownTimeout: 15m
        "#;
        let trino: TrinoCluster = serde_yaml::from_str(input).expect("illegal test input");
        assert_eq!(
            trino.min_worker_graceful_shutdown_timeout(),
            Duration::from_minutes_unchecked(15)
        );
    }
}
