use std::collections::BTreeMap;

use snafu::{OptionExt, ResultExt, Snafu};
use stackable_operator::{
    builder::resources::ResourceRequirementsBuilder,
    commons::product_image_selection::ResolvedProductImage,
    k8s_openapi::api::core::v1::Container as K8sContainer,
    kube::ResourceExt,
    product_logging::{
        framework::{create_vector_config, vector_container},
        spec::{
            AutomaticContainerLogConfig, ContainerLogConfig, ContainerLogConfigChoice, LogLevel,
            Logging,
        },
    },
    role_utils::RoleGroupRef,
};
use tracing::warn;

use crate::{
    crd::{Container, TrinoCluster},
    platform::{self, Platform},
};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("object has no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("failed to retrieve the ConfigMap {cm_name}"))]
    ConfigMapRetrieval {
        source: platform::Error,
        cm_name: String,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;

pub const VECTOR_AGGREGATOR_CM_ENTRY: &str = "ADDRESS";
pub const VECTOR_IMAGE: &str = "timberio/vector:0.38.0-debian";

/// Logger the ROOT entry of the logging config applies to.
const TRINO_ROOT_LOGGER: &str = "io.trino";

pub const CONFIG_VOLUME_NAME: &str = "config";
pub const LOG_VOLUME_NAME: &str = "log";

/// Return the address of the Vector aggregator if the corresponding ConfigMap name is given in the
/// cluster spec. A missing ConfigMap or entry disables log aggregation.
pub async fn resolve_vector_aggregator_address(
    trino: &TrinoCluster,
    platform: &dyn Platform,
) -> Result<Option<String>> {
    let Some(cm_name) = &trino.spec.cluster_config.vector_aggregator_config_map_name else {
        return Ok(None);
    };
    let namespace = trino.namespace().context(ObjectHasNoNamespaceSnafu)?;

    let config_map = platform
        .get_config_map(&namespace, cm_name)
        .await
        .context(ConfigMapRetrievalSnafu {
            cm_name: cm_name.to_string(),
        })?;

    let address = config_map
        .and_then(|cm| cm.data)
        .and_then(|mut data| data.remove(VECTOR_AGGREGATOR_CM_ENTRY));
    if address.is_none() {
        warn!(
            cm_name,
            entry = VECTOR_AGGREGATOR_CM_ENTRY,
            "vector aggregator address not found, log aggregation is disabled"
        );
    }
    Ok(address)
}

/// Trino knows fewer levels than the logging framework, the finer ones collapse.
fn trino_log_level(level: LogLevel) -> &'static str {
    match level {
        LogLevel::TRACE | LogLevel::DEBUG => "DEBUG",
        LogLevel::INFO => "INFO",
        LogLevel::WARN => "WARN",
        LogLevel::ERROR | LogLevel::FATAL => "ERROR",
        LogLevel::NONE => "OFF",
    }
}

fn automatic_log_config<'a>(
    logging: &'a Logging<Container>,
    container: &Container,
) -> Option<&'a AutomaticContainerLogConfig> {
    match logging.containers.get(container) {
        Some(ContainerLogConfig {
            choice: Some(ContainerLogConfigChoice::Automatic(log_config)),
        }) => Some(log_config),
        _ => None,
    }
}

/// Return the `log.properties` entries, for example:
/// ```text
/// io.trino=INFO
/// io.trino.server=DEBUG
/// ```
/// Custom log configs leave the file empty, it is expected to come from the ConfigMap then.
pub fn log_properties(logging: &Logging<Container>) -> BTreeMap<String, Option<String>> {
    let Some(log_config) = automatic_log_config(logging, &Container::Trino) else {
        return BTreeMap::new();
    };
    log_config
        .loggers
        .iter()
        .map(|(logger, config)| {
            let logger = if logger == AutomaticContainerLogConfig::ROOT_LOGGER {
                TRINO_ROOT_LOGGER
            } else {
                logger.as_str()
            };
            (
                logger.to_string(),
                Some(trino_log_level(config.level).to_string()),
            )
        })
        .collect()
}

/// Vector agent configuration shipping the Trino log files to the aggregator. `None` unless the
/// agent is enabled and an aggregator is known.
pub fn vector_config(
    rolegroup: &RoleGroupRef<TrinoCluster>,
    aggregator_address: Option<&str>,
    logging: &Logging<Container>,
) -> Option<String> {
    match aggregator_address {
        Some(address) if logging.enable_vector_agent => Some(create_vector_config(
            rolegroup,
            address,
            automatic_log_config(logging, &Container::Vector),
        )),
        _ => None,
    }
}

/// The Vector sidecar, reading its config from the role group ConfigMap.
pub fn vector_sidecar(trino: &TrinoCluster, logging: &Logging<Container>) -> K8sContainer {
    let image = ResolvedProductImage {
        product_version: trino.spec.image.tag.clone(),
        app_version_label: trino.spec.image.tag.clone(),
        image: VECTOR_IMAGE.to_string(),
        image_pull_policy: trino.spec.image.pull_policy.clone(),
        pull_secrets: None,
    };
    vector_container(
        &image,
        CONFIG_VOLUME_NAME,
        LOG_VOLUME_NAME,
        logging.containers.get(&Container::Vector),
        ResourceRequirementsBuilder::new()
            .with_cpu_request("250m")
            .with_cpu_limit("500m")
            .with_memory_request("128Mi")
            .with_memory_limit("128Mi")
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use indoc::indoc;
    use stackable_operator::k8s_openapi::{
        api::core::v1::ConfigMap, apimachinery::pkg::apis::meta::v1::ObjectMeta,
    };

    use crate::{
        crd::TrinoRole,
        platform::{memory::InMemoryPlatform, ManagedObject},
    };

    fn trino_with_vector() -> TrinoCluster {
        let input = r#"
        apiVersion: trino.stackable.tech/v1alpha1
        kind: TrinoCluster
        metadata:
          name: simple-trino
          namespace: default
        spec:
          clusterConfig:
            vectorAggregatorConfigMapName: vector-aggregator-discovery
        "#;
        serde_yaml::from_str(input).expect("illegal test input")
    }

    /// Resolved logging of the default worker group, `logging` is nested below `config`.
    fn logging(logging: &str) -> Logging<Container> {
        let logging = logging
            .lines()
            .map(|line| format!("                {line}"))
            .collect::<Vec<_>>()
            .join("\n");
        let input = format!(
            r#"
        apiVersion: trino.stackable.tech/v1alpha1
        kind: TrinoCluster
        metadata:
          name: simple-trino
          namespace: default
        spec:
          workers:
            config:
              logging:
{logging}
            roleGroups:
              default: {{}}
        "#
        );
        let trino: TrinoCluster = serde_yaml::from_str(&input).expect("illegal test input");
        let rolegroup_ref = TrinoRole::Worker.rolegroup_ref(&trino, "default");
        trino
            .effective_config(&TrinoRole::Worker, &rolegroup_ref)
            .expect("valid configuration")
            .config
            .logging
    }

    #[tokio::test]
    async fn test_missing_vector_config_map_disables_aggregation() {
        let platform = InMemoryPlatform::new();
        let address = resolve_vector_aggregator_address(&trino_with_vector(), &platform)
            .await
            .expect("lookup must not fail");
        assert_eq!(address, None);
    }

    #[tokio::test]
    async fn test_vector_address() {
        let platform = InMemoryPlatform::new();
        platform.insert(ManagedObject::ConfigMap(ConfigMap {
            metadata: ObjectMeta {
                name: Some("vector-aggregator-discovery".to_string()),
                namespace: Some("default".to_string()),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                VECTOR_AGGREGATOR_CM_ENTRY.to_string(),
                "vector-aggregator:6000".to_string(),
            )])),
            ..ConfigMap::default()
        }));

        let trino = trino_with_vector();
        let address = resolve_vector_aggregator_address(&trino, &platform)
            .await
            .expect("lookup must not fail");
        assert_eq!(address.as_deref(), Some("vector-aggregator:6000"));

        let rolegroup = TrinoRole::Worker.rolegroup_ref(&trino, "default");
        let enabled = logging("enableVectorAgent: true");
        let config = vector_config(&rolegroup, address.as_deref(), &enabled)
            .expect("vector is enabled");
        assert!(config.contains("vector-aggregator:6000"));

        let disabled = logging("enableVectorAgent: false");
        assert_eq!(vector_config(&rolegroup, address.as_deref(), &disabled), None);
        assert_eq!(vector_config(&rolegroup, None, &enabled), None);
    }

    #[test]
    fn test_log_properties() {
        let logging = logging(indoc! {"
            containers:
              trino:
                loggers:
                  ROOT:
                    level: WARN
                  io.trino.server:
                    level: TRACE
                  io.trino.security:
                    level: NONE
        "});
        assert_eq!(
            log_properties(&logging),
            BTreeMap::from([
                ("io.trino".to_string(), Some("WARN".to_string())),
                ("io.trino.server".to_string(), Some("DEBUG".to_string())),
                ("io.trino.security".to_string(), Some("OFF".to_string())),
            ])
        );
    }

    #[test]
    fn test_custom_log_config_has_no_properties() {
        let logging = logging(indoc! {"
            containers:
              trino:
                custom:
                  configMap: my-log-config
        "});
        assert!(log_properties(&logging).is_empty());
    }

    #[test]
    fn test_vector_sidecar() {
        let trino = trino_with_vector();
        let container = vector_sidecar(&trino, &logging("enableVectorAgent: true"));
        assert_eq!(container.name, "vector");
        assert_eq!(container.image.as_deref(), Some(VECTOR_IMAGE));
    }
}
