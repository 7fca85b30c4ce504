//! Resolves the operator default, role and role group levels into one [`EffectiveConfig`] per
//! role group.

use std::collections::BTreeMap;

use snafu::{ResultExt, Snafu};
use stackable_operator::{
    commons::resources::{
        CpuLimitsFragment, MemoryLimitsFragment, NoRuntimeLimitsFragment, PvcConfigFragment,
        ResourcesFragment,
    },
    config::{
        fragment::{self, ValidationError},
        merge::Merge,
    },
    k8s_openapi::apimachinery::pkg::api::resource::Quantity,
    product_logging,
    role_utils::RoleGroupRef,
};

use crate::crd::{
    self, affinity::default_affinity, ConfigOverrides, TrinoCluster, TrinoCommonConfig,
    TrinoConfig, TrinoConfigFragment, TrinoRole, TrinoStorageConfigFragment,
    DEFAULT_COORDINATOR_GRACEFUL_SHUTDOWN_TIMEOUT, DEFAULT_JVM_HEAP_FACTOR,
    DEFAULT_QUERY_MAX_MEMORY, DEFAULT_STORAGE_CAPACITY, DEFAULT_WORKER_GRACEFUL_SHUTDOWN_TIMEOUT,
};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("fragment validation failure"))]
    FragmentValidationFailure { source: ValidationError },

    #[snafu(display("jvmHeapFactor must be in (0, 1], got {factor}"))]
    InvalidHeapFactor { factor: f32 },

    #[snafu(display("failed to look up role group"))]
    RoleGroupLookup { source: crd::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

impl TrinoConfig {
    pub fn default_config(cluster_name: &str, role: &TrinoRole) -> TrinoConfigFragment {
        let (cpu_min, cpu_max, graceful_shutdown_timeout) = match role {
            TrinoRole::Coordinator => ("500m", "2", DEFAULT_COORDINATOR_GRACEFUL_SHUTDOWN_TIMEOUT),
            TrinoRole::Worker => ("1", "4", DEFAULT_WORKER_GRACEFUL_SHUTDOWN_TIMEOUT),
        };

        TrinoConfigFragment {
            query_max_memory: Some(DEFAULT_QUERY_MAX_MEMORY.to_string()),
            query_max_memory_per_node: None,
            logging: product_logging::spec::default_logging(),
            resources: ResourcesFragment {
                cpu: CpuLimitsFragment {
                    min: Some(Quantity(cpu_min.to_owned())),
                    max: Some(Quantity(cpu_max.to_owned())),
                },
                memory: MemoryLimitsFragment {
                    limit: Some(Quantity("4Gi".to_owned())),
                    runtime_limits: NoRuntimeLimitsFragment {},
                },
                storage: TrinoStorageConfigFragment {
                    data: PvcConfigFragment {
                        capacity: Some(Quantity(DEFAULT_STORAGE_CAPACITY.to_owned())),
                        storage_class: None,
                        selectors: None,
                    },
                },
            },
            affinity: default_affinity(cluster_name, role),
            graceful_shutdown_timeout: Some(graceful_shutdown_timeout),
        }
    }
}

/// Everything a role group needs to render its configuration files and workload.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectiveConfig {
    pub replicas: u16,
    pub config: TrinoConfig,
    pub jvm_heap_factor: f32,
    pub config_overrides: ConfigOverrides,
    pub env_overrides: BTreeMap<String, String>,
    pub command_args_overrides: Vec<String>,
}

/// The more specific level keeps its value unless it left the field unset, in which case the
/// general value is taken as a whole.
fn take_whole<T: Default + PartialEq>(specific: &mut T, general: &mut T) {
    let general = std::mem::take(general);
    if *specific == T::default() {
        *specific = general;
    }
}

fn merge_map<V: Clone>(map: &mut BTreeMap<String, V>, general: &BTreeMap<String, V>) {
    for (key, value) in general {
        map.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

fn merge_overrides(specific: &mut ConfigOverrides, general: &ConfigOverrides) {
    merge_map(&mut specific.node_properties, &general.node_properties);
    merge_map(&mut specific.config_properties, &general.config_properties);
    merge_map(&mut specific.log_properties, &general.log_properties);
    merge_map(
        &mut specific.exchange_manager_properties,
        &general.exchange_manager_properties,
    );
    merge_map(&mut specific.security_properties, &general.security_properties);
    if specific.jvm_config.is_none() {
        specific.jvm_config.clone_from(&general.jvm_config);
    }
}

/// Merges the three levels, the role group being the most specific one.
/// `replicas` is the (role group, role) pair and falls back to 1.
pub fn resolve(
    defaults: &TrinoConfigFragment,
    role: &TrinoCommonConfig,
    role_group: &TrinoCommonConfig,
    replicas: (Option<u16>, Option<u16>),
) -> Result<EffectiveConfig> {
    let mut role_config = role.config.clone();
    let mut config = role_group.config.clone();
    // resources, affinity and logging are taken from a single level before the defaults fill
    // the remaining leaves
    take_whole(&mut config.resources, &mut role_config.resources);
    take_whole(&mut config.affinity, &mut role_config.affinity);
    take_whole(&mut config.logging, &mut role_config.logging);
    config.merge(&role_config);
    config.merge(defaults);
    let config = fragment::validate::<TrinoConfig>(config).context(FragmentValidationFailureSnafu)?;

    let jvm_heap_factor = role_group
        .jvm_heap_factor
        .or(role.jvm_heap_factor)
        .unwrap_or(DEFAULT_JVM_HEAP_FACTOR);
    if !(jvm_heap_factor > 0.0 && jvm_heap_factor <= 1.0) {
        return InvalidHeapFactorSnafu {
            factor: jvm_heap_factor,
        }
        .fail();
    }

    let mut config_overrides = role_group.config_overrides.clone();
    merge_overrides(&mut config_overrides, &role.config_overrides);
    let mut env_overrides = role_group.env_overrides.clone();
    merge_map(&mut env_overrides, &role.env_overrides);
    let command_args_overrides = if role_group.command_args_overrides.is_empty() {
        role.command_args_overrides.clone()
    } else {
        role_group.command_args_overrides.clone()
    };

    let (group_replicas, role_replicas) = replicas;
    Ok(EffectiveConfig {
        replicas: group_replicas.or(role_replicas).unwrap_or(1),
        config,
        jvm_heap_factor,
        config_overrides,
        env_overrides,
        command_args_overrides,
    })
}

impl TrinoCluster {
    /// Resolves the effective configuration of a role group. A stopped cluster runs no pods.
    pub fn effective_config(
        &self,
        role: &TrinoRole,
        rolegroup_ref: &RoleGroupRef<TrinoCluster>,
    ) -> Result<EffectiveConfig> {
        let role_spec = self.role(role);
        let role_group = self.rolegroup(rolegroup_ref).context(RoleGroupLookupSnafu)?;

        let mut effective = resolve(
            &TrinoConfig::default_config(&rolegroup_ref.cluster.name, role),
            &role_spec.config,
            &role_group.config,
            (role_group.replicas, role_spec.replicas),
        )?;
        if self.spec.cluster_operation.stopped {
            effective.replicas = 0;
        }
        Ok(effective)
    }
}
