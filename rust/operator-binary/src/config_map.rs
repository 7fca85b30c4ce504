use std::collections::BTreeMap;

use snafu::{ResultExt, Snafu};
use stackable_operator::{
    builder::{self, ObjectMetaBuilder},
    k8s_openapi::{api::core::v1::ConfigMap, apimachinery::pkg::apis::meta::v1::ObjectMeta},
    kvp::LabelError,
    role_utils::RoleGroupRef,
};

use crate::{
    authentication::TrinoAuthenticators,
    config,
    crd::{self, TrinoCluster, TrinoRole},
    merge::EffectiveConfig,
    platform::ManagedObject,
    reconciler::{BoxedError, DesiredObject, MultiResourceBuilder, ResourceBuilder},
};

const TPCH_CATALOG: &str = "connector.name=tpch\ntpch.splits-per-node=4\n";
const TPCDS_CATALOG: &str = "connector.name=tpcds\ntpcds.splits-per-node=4\n";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to build metadata of ConfigMap for {rolegroup}"))]
    RoleGroupMetadata {
        source: crd::Error,
        rolegroup: RoleGroupRef<TrinoCluster>,
    },

    #[snafu(display("failed to build recommended labels for {rolegroup}"))]
    RoleGroupLabels {
        source: builder::meta::Error,
        rolegroup: RoleGroupRef<TrinoCluster>,
    },

    #[snafu(display("failed to generate configuration files for {rolegroup}"))]
    RoleGroupConfig {
        source: config::Error,
        rolegroup: RoleGroupRef<TrinoCluster>,
    },

    #[snafu(display("failed to build metadata of the cluster ConfigMaps"))]
    ClusterMetadata { source: crd::Error },

    #[snafu(display("failed to build labels of the cluster ConfigMaps"))]
    ClusterLabels { source: LabelError },
}

/// The rolegroup [`ConfigMap`] holding all Trino configuration files of a role group.
pub struct RoleGroupConfigBuilder<'a> {
    pub trino: &'a TrinoCluster,
    pub role: TrinoRole,
    pub rolegroup_ref: &'a RoleGroupRef<TrinoCluster>,
    pub effective: &'a EffectiveConfig,
    pub authenticators: &'a TrinoAuthenticators,
    pub vector_aggregator_address: Option<&'a str>,
    pub cluster_domain: &'a str,
}

impl RoleGroupConfigBuilder<'_> {
    fn build_configuration(&self) -> Result<DesiredObject, Error> {
        let files = config::role_group_config_files(
            self.trino,
            &self.role,
            self.rolegroup_ref,
            self.effective,
            self.authenticators,
            self.vector_aggregator_address,
            self.cluster_domain,
        )
        .with_context(|_| RoleGroupConfigSnafu {
            rolegroup: self.rolegroup_ref.clone(),
        })?;

        Ok(DesiredObject::Configuration {
            metadata: ObjectMetaBuilder::new()
                .name(self.rolegroup_ref.object_name())
                .namespace(self.trino.namespace_r().with_context(|_| {
                    RoleGroupMetadataSnafu {
                        rolegroup: self.rolegroup_ref.clone(),
                    }
                })?)
                .with_recommended_labels(self.trino.object_labels(
                    &self.rolegroup_ref.role,
                    &self.rolegroup_ref.role_group,
                ))
                .with_context(|_| RoleGroupLabelsSnafu {
                    rolegroup: self.rolegroup_ref.clone(),
                })?
                .build(),
            files,
            overrides: self.effective.config_overrides.clone(),
        })
    }
}

impl ResourceBuilder for RoleGroupConfigBuilder<'_> {
    fn build(&self) -> Result<DesiredObject, BoxedError> {
        Ok(self.build_configuration()?)
    }
}

/// ConfigMaps shared by all role groups: the catalogs and the (empty) schema directory.
pub struct ClusterConfigMapsBuilder<'a> {
    trino: &'a TrinoCluster,
}

impl<'a> ClusterConfigMapsBuilder<'a> {
    pub fn new(trino: &'a TrinoCluster) -> Self {
        Self { trino }
    }
}

impl MultiResourceBuilder for ClusterConfigMapsBuilder<'_> {
    fn build(&self) -> Result<Vec<Box<dyn ResourceBuilder + '_>>, BoxedError> {
        Ok(vec![
            Box::new(StaticConfigMapBuilder {
                name: self
                    .trino
                    .catalog_config_map_name()
                    .context(ClusterMetadataSnafu)?,
                trino: self.trino,
                data: catalog_data(&self.trino.spec.cluster_config.catalogs),
            }),
            Box::new(StaticConfigMapBuilder {
                name: self
                    .trino
                    .schema_config_map_name()
                    .context(ClusterMetadataSnafu)?,
                trino: self.trino,
                data: BTreeMap::new(),
            }),
        ])
    }
}

struct StaticConfigMapBuilder<'a> {
    name: String,
    trino: &'a TrinoCluster,
    data: BTreeMap<String, String>,
}

impl ResourceBuilder for StaticConfigMapBuilder<'_> {
    fn build(&self) -> Result<DesiredObject, BoxedError> {
        Ok(DesiredObject::General(ManagedObject::ConfigMap(ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.trino.namespace_r().context(ClusterMetadataSnafu)?),
                labels: Some(
                    self.trino
                        .cluster_labels()
                        .context(ClusterLabelsSnafu)?
                        .into(),
                ),
                ..ObjectMeta::default()
            },
            data: Some(self.data.clone()),
            ..ConfigMap::default()
        })))
    }
}

/// Built-in benchmark catalogs plus the user catalogs, one `<name>.properties` file each.
/// User catalogs with the same name replace the built-in ones.
fn catalog_data(catalogs: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut data = BTreeMap::from([
        ("tpch.properties".to_string(), TPCH_CATALOG.to_string()),
        ("tpcds.properties".to_string(), TPCDS_CATALOG.to_string()),
    ]);
    for (name, properties) in catalogs {
        let content: String = properties
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| format!("{line}\n"))
            .collect();
        data.insert(format!("{name}.properties"), content);
    }
    data
}
