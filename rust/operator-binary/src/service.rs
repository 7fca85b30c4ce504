use snafu::{ResultExt, Snafu};
use stackable_operator::{
    builder::{self, ObjectMetaBuilder},
    k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec},
    kvp::LabelError,
    role_utils::RoleGroupRef,
};

use crate::{
    crd::{self, TrinoCluster, TrinoRole, METRICS_PORT, METRICS_PORT_NAME},
    platform::ManagedObject,
    reconciler::{BoxedError, DesiredObject, ResourceBuilder},
};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to build metadata of Service for {rolegroup}"))]
    RoleGroupServiceMetadata {
        source: crd::Error,
        rolegroup: RoleGroupRef<TrinoCluster>,
    },

    #[snafu(display("failed to build labels of Service for {rolegroup}"))]
    RoleGroupServiceLabels {
        source: builder::meta::Error,
        rolegroup: RoleGroupRef<TrinoCluster>,
    },

    #[snafu(display("failed to build selector labels of Service for {rolegroup}"))]
    RoleGroupSelectorLabels {
        source: LabelError,
        rolegroup: RoleGroupRef<TrinoCluster>,
    },

    #[snafu(display("failed to build metadata of Service for role {role}"))]
    RoleServiceMetadata { source: crd::Error, role: TrinoRole },

    #[snafu(display("failed to build labels of Service for role {role}"))]
    RoleServiceLabels {
        source: builder::meta::Error,
        role: TrinoRole,
    },

    #[snafu(display("failed to build selector labels of Service for role {role}"))]
    RoleSelectorLabels { source: LabelError, role: TrinoRole },
}

/// Role group name the recommended labels carry for objects spanning the whole role.
const ROLE_WIDE_GROUP: &str = "global";

/// The rolegroup headless [`Service`] allows direct access to the instances of a certain
/// rolegroup. Its name is the one used in the discovery URI.
pub struct RoleGroupServiceBuilder<'a> {
    trino: &'a TrinoCluster,
    rolegroup_ref: &'a RoleGroupRef<TrinoCluster>,
}

impl<'a> RoleGroupServiceBuilder<'a> {
    pub fn new(trino: &'a TrinoCluster, rolegroup_ref: &'a RoleGroupRef<TrinoCluster>) -> Self {
        Self {
            trino,
            rolegroup_ref,
        }
    }

    fn build_service(&self) -> Result<Service, Error> {
        let rolegroup = || self.rolegroup_ref.clone();
        Ok(Service {
            metadata: ObjectMetaBuilder::new()
                .name(self.rolegroup_ref.object_name())
                .namespace(
                    self.trino
                        .namespace_r()
                        .with_context(|_| RoleGroupServiceMetadataSnafu {
                            rolegroup: rolegroup(),
                        })?,
                )
                .with_recommended_labels(self.trino.object_labels(
                    &self.rolegroup_ref.role,
                    &self.rolegroup_ref.role_group,
                ))
                .with_context(|_| RoleGroupServiceLabelsSnafu {
                    rolegroup: rolegroup(),
                })?
                .build(),
            spec: Some(ServiceSpec {
                // Internal communication does not need to be exposed
                type_: Some("ClusterIP".to_string()),
                cluster_ip: Some("None".to_string()),
                ports: Some(service_ports(self.trino, true)),
                selector: Some(
                    self.trino
                        .rolegroup_selector_labels(self.rolegroup_ref)
                        .with_context(|_| RoleGroupSelectorLabelsSnafu {
                            rolegroup: rolegroup(),
                        })?
                        .into(),
                ),
                publish_not_ready_addresses: Some(true),
                ..ServiceSpec::default()
            }),
            status: None,
        })
    }
}

impl ResourceBuilder for RoleGroupServiceBuilder<'_> {
    fn build(&self) -> Result<DesiredObject, BoxedError> {
        Ok(DesiredObject::General(ManagedObject::Service(
            self.build_service()?,
        )))
    }
}

/// The role [`Service`] is the entry point for clients. It is only built for coordinators and its
/// type follows the listener class.
pub struct RoleServiceBuilder<'a> {
    trino: &'a TrinoCluster,
    role: TrinoRole,
}

impl<'a> RoleServiceBuilder<'a> {
    pub fn new(trino: &'a TrinoCluster, role: TrinoRole) -> Self {
        Self { trino, role }
    }

    fn build_service(&self) -> Result<Service, Error> {
        let role = self.role.to_string();
        Ok(Service {
            metadata: ObjectMetaBuilder::new()
                .name(
                    self.trino
                        .role_service_name(&self.role)
                        .context(RoleServiceMetadataSnafu { role: self.role })?,
                )
                .namespace(
                    self.trino
                        .namespace_r()
                        .context(RoleServiceMetadataSnafu { role: self.role })?,
                )
                .with_recommended_labels(self.trino.object_labels(&role, ROLE_WIDE_GROUP))
                .context(RoleServiceLabelsSnafu { role: self.role })?
                .build(),
            spec: Some(ServiceSpec {
                type_: Some(
                    service_type_for_listener_class(&self.trino.spec.cluster_config.listener_class)
                        .to_string(),
                ),
                ports: Some(service_ports(self.trino, false)),
                selector: Some(
                    self.trino
                        .role_selector_labels(&self.role)
                        .context(RoleSelectorLabelsSnafu { role: self.role })?
                        .into(),
                ),
                ..ServiceSpec::default()
            }),
            status: None,
        })
    }
}

impl ResourceBuilder for RoleServiceBuilder<'_> {
    fn build(&self) -> Result<DesiredObject, BoxedError> {
        Ok(DesiredObject::General(ManagedObject::Service(
            self.build_service()?,
        )))
    }
}

/// Unknown listener classes fall back to a cluster internal Service.
pub fn service_type_for_listener_class(listener_class: &str) -> &'static str {
    match listener_class {
        "external-unstable" => "NodePort",
        "external-stable" => "LoadBalancer",
        _ => "ClusterIP",
    }
}

fn service_ports(trino: &TrinoCluster, with_metrics: bool) -> Vec<ServicePort> {
    let mut ports = vec![ServicePort {
        name: Some(trino.exposed_protocol().to_string()),
        port: trino.exposed_port().into(),
        protocol: Some("TCP".to_string()),
        ..ServicePort::default()
    }];
    if with_metrics {
        ports.push(ServicePort {
            name: Some(METRICS_PORT_NAME.to_string()),
            port: METRICS_PORT.into(),
            protocol: Some("TCP".to_string()),
            ..ServicePort::default()
        });
    }
    ports
}
