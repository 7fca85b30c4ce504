//! The rolegroup [`StatefulSet`] runs the Trino nodes of a role group.

use std::collections::BTreeMap;

use snafu::{ResultExt, Snafu};
use stackable_operator::{
    builder::{
        self, ContainerBuilder, ObjectMetaBuilder, PodBuilder, PodSecurityContextBuilder,
        SecretFormat, SecretOperatorVolumeSourceBuilder, VolumeBuilder,
    },
    k8s_openapi::{
        api::{
            apps::v1::{StatefulSet, StatefulSetSpec},
            core::v1::{EnvVar, HTTPGetAction, Probe},
        },
        apimachinery::pkg::{apis::meta::v1::LabelSelector, util::intstr::IntOrString},
    },
    kvp::LabelError,
    role_utils::RoleGroupRef,
};

use crate::{
    authentication::TrinoAuthenticators,
    command,
    crd::{
        self, Container as TrinoContainer, TrinoCluster, TrinoRole, CATALOG_DIR_NAME,
        CONFIG_DIR_NAME, DATA_DIR_NAME, ENV_INTERNAL_SHARED_SECRET, METRICS_PORT,
        METRICS_PORT_NAME, RW_CONFIG_DIR_NAME, SCHEMA_DIR_NAME, STACKABLE_CLIENT_TLS_DIR,
        STACKABLE_INTERNAL_TLS_DIR, STACKABLE_LOG_DIR, STACKABLE_SERVER_TLS_DIR,
        STACKABLE_TLS_STORE_PASSWORD,
    },
    merge::EffectiveConfig,
    operations::graceful_shutdown::{self, add_graceful_shutdown_config},
    product_logging::{self, CONFIG_VOLUME_NAME, LOG_VOLUME_NAME},
    reconciler::{BoxedError, DesiredObject, ResourceBuilder},
};

const APP_CONTAINER_NAME: &str = "trino";

const CATALOG_VOLUME_NAME: &str = "catalog";
const SCHEMA_VOLUME_NAME: &str = "schema";
const RW_CONFIG_VOLUME_NAME: &str = "rwconfig";
const DATA_VOLUME_NAME: &str = "data";
const CLIENT_TLS_VOLUME_NAME: &str = "client-tls";
const SERVER_TLS_VOLUME_NAME: &str = "server-tls";
const INTERNAL_TLS_VOLUME_NAME: &str = "internal-tls";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to build metadata of StatefulSet for {rolegroup}"))]
    StatefulSetMetadata {
        source: crd::Error,
        rolegroup: RoleGroupRef<TrinoCluster>,
    },

    #[snafu(display("failed to build recommended labels for {rolegroup}"))]
    RecommendedLabels {
        source: builder::meta::Error,
        rolegroup: RoleGroupRef<TrinoCluster>,
    },

    #[snafu(display("failed to build selector labels for {rolegroup}"))]
    SelectorLabels {
        source: LabelError,
        rolegroup: RoleGroupRef<TrinoCluster>,
    },

    #[snafu(display("failed to create container builder for {name}"))]
    ContainerBuilderCreation {
        source: builder::pod::container::Error,
        name: String,
    },

    #[snafu(display("failed to build TLS volume {volume}"))]
    TlsVolume {
        source: builder::pod::volume::SecretOperatorVolumeSourceBuilderError,
        volume: String,
    },

    #[snafu(display("failed to configure graceful shutdown for {rolegroup}"))]
    GracefulShutdown {
        source: graceful_shutdown::Error,
        rolegroup: RoleGroupRef<TrinoCluster>,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Env and argument overrides of the Trino container. They are applied after the StatefulSet is
/// built, so they win over everything the operator generates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkloadOverrides {
    pub env: BTreeMap<String, String>,
    pub args: Vec<String>,
}

impl WorkloadOverrides {
    pub fn apply(&self, statefulset: &mut StatefulSet) {
        let trino_container = TrinoContainer::Trino.to_string();
        let containers = statefulset
            .spec
            .iter_mut()
            .filter_map(|spec| spec.template.spec.as_mut())
            .flat_map(|pod_spec| pod_spec.containers.iter_mut())
            .filter(|container| container.name == trino_container);

        for container in containers {
            let env = container.env.get_or_insert_with(Vec::new);
            for (name, value) in &self.env {
                env.retain(|var| &var.name != name);
                env.push(EnvVar {
                    name: name.clone(),
                    value: Some(value.clone()),
                    ..EnvVar::default()
                });
            }
            if !self.args.is_empty() {
                container.args = Some(self.args.clone());
            }
        }
    }
}

pub struct StatefulSetBuilder<'a> {
    pub trino: &'a TrinoCluster,
    pub role: TrinoRole,
    pub rolegroup_ref: &'a RoleGroupRef<TrinoCluster>,
    pub effective: &'a EffectiveConfig,
    pub authenticators: &'a TrinoAuthenticators,
    pub vector_aggregator_address: Option<&'a str>,
}

impl StatefulSetBuilder<'_> {
    fn metadata_error(&self) -> StatefulSetMetadataSnafu<RoleGroupRef<TrinoCluster>> {
        StatefulSetMetadataSnafu {
            rolegroup: self.rolegroup_ref.clone(),
        }
    }

    fn vector_enabled(&self) -> bool {
        self.effective.config.logging.enable_vector_agent
            && self.vector_aggregator_address.is_some()
    }

    fn build_statefulset(&self) -> Result<StatefulSet> {
        let trino = self.trino;
        let rolegroup_ref = self.rolegroup_ref;
        let config = &self.effective.config;
        let object_labels =
            || trino.object_labels(&rolegroup_ref.role, &rolegroup_ref.role_group);

        let mut pb = PodBuilder::new();
        let mut cb_trino = ContainerBuilder::new(APP_CONTAINER_NAME).with_context(|_| {
            ContainerBuilderCreationSnafu {
                name: APP_CONTAINER_NAME,
            }
        })?;

        self.add_config_volumes_and_mounts(&mut cb_trino, &mut pb)?;
        add_tls_volumes_and_mounts(trino, &mut cb_trino, &mut pb)?;
        cb_trino.add_volume_mounts(self.authenticators.volume_mounts());
        pb.add_volumes(self.authenticators.volumes());

        let exposed_port_name = trino.exposed_protocol();
        cb_trino
            .image(trino.spec.image.image_ref())
            .image_pull_policy(trino.spec.image.pull_policy.clone())
            .command(command::container_trino_command())
            .args(command::container_trino_args(trino, self.authenticators))
            .add_env_var_from_secret(
                ENV_INTERNAL_SHARED_SECRET,
                trino
                    .shared_secret_name()
                    .with_context(|_| self.metadata_error())?,
                ENV_INTERNAL_SHARED_SECRET,
            )
            .add_env_vars(self.authenticators.env_vars())
            .add_container_port(exposed_port_name, trino.exposed_port().into())
            .add_container_port(METRICS_PORT_NAME, METRICS_PORT.into())
            .liveness_probe(http_get_check(trino, "/v1/info", 30, 3))
            .readiness_probe(http_get_check(trino, "/v1/info", 10, 5))
            .resources(config.resources.clone().into());

        add_graceful_shutdown_config(trino, &self.role, config, &mut pb, &mut cb_trino)
            .with_context(|_| GracefulShutdownSnafu {
                rolegroup: rolegroup_ref.clone(),
            })?;

        pb.metadata(
            ObjectMetaBuilder::new()
                .with_recommended_labels(object_labels())
                .with_context(|_| RecommendedLabelsSnafu {
                    rolegroup: rolegroup_ref.clone(),
                })?
                .build(),
        )
        .affinity(&config.affinity)
        // secret-operator volumes need the group
        .security_context(PodSecurityContextBuilder::new().fs_group(1000).build())
        .add_container(cb_trino.build());

        if self.vector_enabled() {
            pb.add_container(product_logging::vector_sidecar(trino, &config.logging));
        }

        Ok(StatefulSet {
            metadata: ObjectMetaBuilder::new()
                .name_and_namespace(trino)
                .name(rolegroup_ref.object_name())
                .with_recommended_labels(object_labels())
                .with_context(|_| RecommendedLabelsSnafu {
                    rolegroup: rolegroup_ref.clone(),
                })?
                .build(),
            spec: Some(StatefulSetSpec {
                pod_management_policy: Some("Parallel".to_string()),
                replicas: Some(self.effective.replicas.into()),
                selector: LabelSelector {
                    match_labels: Some(
                        trino
                            .rolegroup_selector_labels(rolegroup_ref)
                            .with_context(|_| SelectorLabelsSnafu {
                                rolegroup: rolegroup_ref.clone(),
                            })?
                            .into(),
                    ),
                    ..LabelSelector::default()
                },
                service_name: rolegroup_ref.object_name(),
                template: pb.build_template(),
                volume_claim_templates: Some(vec![config
                    .resources
                    .storage
                    .data
                    .build_pvc(DATA_VOLUME_NAME, Some(vec!["ReadWriteOnce"]))]),
                ..StatefulSetSpec::default()
            }),
            status: None,
        })
    }

    fn add_config_volumes_and_mounts(
        &self,
        cb_trino: &mut ContainerBuilder,
        pb: &mut PodBuilder,
    ) -> Result<()> {
        let trino = self.trino;
        cb_trino
            .add_volume_mount(CONFIG_VOLUME_NAME, CONFIG_DIR_NAME)
            .add_volume_mount(CATALOG_VOLUME_NAME, CATALOG_DIR_NAME)
            .add_volume_mount(SCHEMA_VOLUME_NAME, SCHEMA_DIR_NAME)
            .add_volume_mount(RW_CONFIG_VOLUME_NAME, RW_CONFIG_DIR_NAME)
            .add_volume_mount(LOG_VOLUME_NAME, STACKABLE_LOG_DIR)
            .add_volume_mount(DATA_VOLUME_NAME, DATA_DIR_NAME)
            .add_volume_mount(CLIENT_TLS_VOLUME_NAME, STACKABLE_CLIENT_TLS_DIR);

        pb.add_volume(
            VolumeBuilder::new(CONFIG_VOLUME_NAME)
                .with_config_map(self.rolegroup_ref.object_name())
                .build(),
        )
        .add_volume(
            VolumeBuilder::new(CATALOG_VOLUME_NAME)
                .with_config_map(
                    trino
                        .catalog_config_map_name()
                        .with_context(|_| self.metadata_error())?,
                )
                .build(),
        )
        .add_volume(
            VolumeBuilder::new(SCHEMA_VOLUME_NAME)
                .with_config_map(
                    trino
                        .schema_config_map_name()
                        .with_context(|_| self.metadata_error())?,
                )
                .build(),
        );
        for name in [RW_CONFIG_VOLUME_NAME, LOG_VOLUME_NAME, CLIENT_TLS_VOLUME_NAME] {
            pb.add_volume(
                VolumeBuilder::new(name)
                    .with_empty_dir(None::<String>, None)
                    .build(),
            );
        }
        Ok(())
    }
}

impl ResourceBuilder for StatefulSetBuilder<'_> {
    fn build(&self) -> Result<DesiredObject, BoxedError> {
        Ok(DesiredObject::Workload {
            statefulset: self.build_statefulset()?,
            overrides: WorkloadOverrides {
                env: self.effective.env_overrides.clone(),
                args: self.effective.command_args_overrides.clone(),
            },
        })
    }
}

/// Server certificates are valid for the Pod and node addresses, the internal ones only for the
/// Pod since nodes talk to each other through the headless Service.
fn add_tls_volumes_and_mounts(
    trino: &TrinoCluster,
    cb_trino: &mut ContainerBuilder,
    pb: &mut PodBuilder,
) -> Result<()> {
    let Some(tls) = trino.get_tls() else {
        return Ok(());
    };

    let server_tls = SecretOperatorVolumeSourceBuilder::new(&tls.server_secret_class)
        .with_pod_scope()
        .with_node_scope()
        .with_format(SecretFormat::TlsPkcs12)
        .with_tls_pkcs12_password(STACKABLE_TLS_STORE_PASSWORD)
        .build()
        .context(TlsVolumeSnafu {
            volume: SERVER_TLS_VOLUME_NAME,
        })?;
    let internal_tls = SecretOperatorVolumeSourceBuilder::new(&tls.internal_secret_class)
        .with_pod_scope()
        .with_format(SecretFormat::TlsPkcs12)
        .with_tls_pkcs12_password(STACKABLE_TLS_STORE_PASSWORD)
        .build()
        .context(TlsVolumeSnafu {
            volume: INTERNAL_TLS_VOLUME_NAME,
        })?;

    pb.add_volume(
        VolumeBuilder::new(SERVER_TLS_VOLUME_NAME)
            .ephemeral(server_tls)
            .build(),
    )
    .add_volume(
        VolumeBuilder::new(INTERNAL_TLS_VOLUME_NAME)
            .ephemeral(internal_tls)
            .build(),
    );
    cb_trino
        .add_volume_mount(SERVER_TLS_VOLUME_NAME, STACKABLE_SERVER_TLS_DIR)
        .add_volume_mount(INTERNAL_TLS_VOLUME_NAME, STACKABLE_INTERNAL_TLS_DIR);
    Ok(())
}

/// HTTP check against the client port, speaking TLS whenever the cluster does.
fn http_get_check(
    trino: &TrinoCluster,
    path: &str,
    initial_delay_seconds: i32,
    failure_threshold: i32,
) -> Probe {
    let port_name = trino.exposed_protocol();
    Probe {
        http_get: Some(HTTPGetAction {
            port: IntOrString::String(port_name.to_string()),
            path: Some(path.to_string()),
            scheme: Some(port_name.to_uppercase()),
            ..HTTPGetAction::default()
        }),
        initial_delay_seconds: Some(initial_delay_seconds),
        period_seconds: Some(10),
        timeout_seconds: Some(1),
        failure_threshold: Some(failure_threshold),
        ..Probe::default()
    }
}
