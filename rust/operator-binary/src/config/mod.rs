//! Renders the configuration files of a role group: `config.properties`, `node.properties`,
//! `log.properties`, `exchange-manager.properties`, `security.properties` and `jvm.config`.

pub mod jvm;

use std::collections::BTreeMap;

use product_config::writer::{to_java_properties_string, PropertiesWriterError};
use snafu::{ResultExt, Snafu};
use stackable_operator::role_utils::RoleGroupRef;

use crate::{
    authentication::TrinoAuthenticators,
    crd::{
        ConfigOverrides, TrinoCluster, TrinoRole, CONFIG_PROPERTIES, DATA_DIR_NAME,
        DEFAULT_EXCHANGE_MANAGER_NAME, ENV_INTERNAL_SHARED_SECRET, EXCHANGE_MANAGER_PROPERTIES,
        HTTPS_PORT, HTTP_PORT, JVM_CONFIG, JVM_SECURITY_PROPERTIES, LOG_PROPERTIES,
        NODE_PROPERTIES, STACKABLE_INTERNAL_TLS_DIR, STACKABLE_LOG_DIR, STACKABLE_SERVER_TLS_DIR,
        STACKABLE_TLS_STORE_PASSWORD, VECTOR_CONFIG_FILE,
    },
    discovery,
    merge::EffectiveConfig,
    operations::graceful_shutdown::graceful_shutdown_config_properties,
    product_logging,
};

// config.properties
const COORDINATOR: &str = "coordinator";
const DISCOVERY_URI: &str = "discovery.uri";
const NODE_SCHEDULER_INCLUDE_COORDINATOR: &str = "node-scheduler.include-coordinator";
const NODE_INTERNAL_ADDRESS_SOURCE: &str = "node.internal-address-source";
const QUERY_MAX_MEMORY: &str = "query.max-memory";
const QUERY_MAX_MEMORY_PER_NODE: &str = "query.max-memory-per-node";
const HTTP_SERVER_HTTP_PORT: &str = "http-server.http.port";
const HTTP_SERVER_HTTPS_ENABLED: &str = "http-server.https.enabled";
const HTTP_SERVER_HTTPS_PORT: &str = "http-server.https.port";
const HTTP_SERVER_HTTPS_KEYSTORE_PATH: &str = "http-server.https.keystore.path";
const HTTP_SERVER_HTTPS_KEYSTORE_KEY: &str = "http-server.https.keystore.key";
const HTTP_SERVER_HTTPS_TRUSTSTORE_PATH: &str = "http-server.https.truststore.path";
const HTTP_SERVER_HTTPS_TRUSTSTORE_KEY: &str = "http-server.https.truststore.key";
const HTTP_SERVER_LOG_ENABLED: &str = "http-server.log.enabled";
const INTERNAL_COMMUNICATION_SHARED_SECRET: &str = "internal-communication.shared-secret";
const INTERNAL_COMMUNICATION_HTTPS_REQUIRED: &str = "internal-communication.https.required";
const INTERNAL_COMMUNICATION_HTTPS_KEYSTORE_PATH: &str =
    "internal-communication.https.keystore.path";
const INTERNAL_COMMUNICATION_HTTPS_KEYSTORE_KEY: &str = "internal-communication.https.keystore.key";
const INTERNAL_COMMUNICATION_HTTPS_TRUSTSTORE_PATH: &str =
    "internal-communication.https.truststore.path";
const INTERNAL_COMMUNICATION_HTTPS_TRUSTSTORE_KEY: &str =
    "internal-communication.https.truststore.key";
const LOG_FORMAT: &str = "log.format";
const LOG_PATH: &str = "log.path";
const LOG_COMPRESSION: &str = "log.compression";
const LOG_MAX_SIZE: &str = "log.max-size";
const LOG_MAX_TOTAL_SIZE: &str = "log.max-total-size";

// node.properties
const NODE_ENVIRONMENT: &str = "node.environment";
const NODE_DATA_DIR: &str = "node.data-dir";

// exchange-manager.properties
const EXCHANGE_MANAGER_NAME: &str = "exchange-manager.name";
const EXCHANGE_BASE_DIRECTORIES: &str = "exchange.base-directories";

/// Trino rotates uncompressed log files of this size, keeping two of them.
const LOG_FILE_SIZE_MB: u32 = 5;
const LOG_FILE_COUNT: u32 = 2;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to build the discovery URI"))]
    DiscoveryUri { source: discovery::Error },

    #[snafu(display("failed to build the JVM config"))]
    JvmConfig { source: jvm::Error },

    #[snafu(display("failed to write {file_name}"))]
    WriteProperties {
        source: PropertiesWriterError,
        file_name: String,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;

pub type Properties = BTreeMap<String, Option<String>>;

/// The generated files of one role group, before they are written into its ConfigMap.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoleGroupConfigFiles {
    /// Properties files keyed by file name.
    pub properties: BTreeMap<String, Properties>,
    pub jvm_config: String,
    pub vector_config: Option<String>,
}

impl RoleGroupConfigFiles {
    /// Properties files take the overrides key by key, `jvm.config` is replaced.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        for (file_name, properties) in self.properties.iter_mut() {
            if let Some(file_overrides) = overrides.properties_for(file_name) {
                for (key, value) in file_overrides {
                    properties.insert(key.clone(), Some(value.clone()));
                }
            }
        }
        if let Some(jvm_config) = &overrides.jvm_config {
            self.jvm_config.clone_from(jvm_config);
        }
    }

    /// ConfigMap data for the role group.
    pub fn render(&self) -> Result<BTreeMap<String, String>> {
        let mut data = BTreeMap::new();
        for (file_name, properties) in &self.properties {
            let content = to_java_properties_string(properties.iter())
                .context(WritePropertiesSnafu { file_name })?;
            data.insert(file_name.clone(), content);
        }
        data.insert(JVM_CONFIG.to_string(), self.jvm_config.clone());
        if let Some(vector_config) = &self.vector_config {
            data.insert(VECTOR_CONFIG_FILE.to_string(), vector_config.clone());
        }
        Ok(data)
    }
}

fn insert(properties: &mut Properties, key: &str, value: impl Into<String>) {
    properties.insert(key.to_string(), Some(value.into()));
}

pub fn config_properties(
    trino: &TrinoCluster,
    role: &TrinoRole,
    effective: &EffectiveConfig,
    authenticators: &TrinoAuthenticators,
    cluster_domain: &str,
) -> Result<Properties> {
    let mut config = Properties::new();

    insert(
        &mut config,
        COORDINATOR,
        (role == &TrinoRole::Coordinator).to_string(),
    );
    insert(
        &mut config,
        NODE_SCHEDULER_INCLUDE_COORDINATOR,
        (!trino.cluster_mode()).to_string(),
    );
    if let Some(query_max_memory) = &effective.config.query_max_memory {
        insert(&mut config, QUERY_MAX_MEMORY, query_max_memory);
    }
    if let Some(per_node) = &effective.config.query_max_memory_per_node {
        insert(&mut config, QUERY_MAX_MEMORY_PER_NODE, per_node);
    }
    insert(
        &mut config,
        DISCOVERY_URI,
        discovery::discovery_uri(trino, cluster_domain).context(DiscoveryUriSnafu)?,
    );
    insert(&mut config, NODE_INTERNAL_ADDRESS_SOURCE, "FQDN");
    insert(&mut config, HTTP_SERVER_LOG_ENABLED, "false");

    // logging
    insert(&mut config, LOG_FORMAT, "json");
    insert(
        &mut config,
        LOG_PATH,
        format!("{STACKABLE_LOG_DIR}/trino/server.airlift.json"),
    );
    insert(&mut config, LOG_COMPRESSION, "none");
    // Trino reads "MB" as MiB
    insert(&mut config, LOG_MAX_SIZE, format!("{LOG_FILE_SIZE_MB}MB"));
    insert(
        &mut config,
        LOG_MAX_TOTAL_SIZE,
        format!("{}MB", LOG_FILE_SIZE_MB * LOG_FILE_COUNT),
    );

    insert(
        &mut config,
        INTERNAL_COMMUNICATION_SHARED_SECRET,
        format!("${{ENV:{ENV_INTERNAL_SHARED_SECRET}}}"),
    );

    config.extend(graceful_shutdown_config_properties(trino, role));

    if trino.tls_enabled() {
        insert(&mut config, HTTP_SERVER_HTTPS_ENABLED, "true");
        insert(&mut config, HTTP_SERVER_HTTPS_PORT, HTTPS_PORT.to_string());
        insert(
            &mut config,
            HTTP_SERVER_HTTPS_KEYSTORE_PATH,
            format!("{STACKABLE_SERVER_TLS_DIR}/keystore.p12"),
        );
        insert(
            &mut config,
            HTTP_SERVER_HTTPS_KEYSTORE_KEY,
            STACKABLE_TLS_STORE_PASSWORD,
        );
        insert(
            &mut config,
            HTTP_SERVER_HTTPS_TRUSTSTORE_PATH,
            format!("{STACKABLE_SERVER_TLS_DIR}/truststore.p12"),
        );
        insert(
            &mut config,
            HTTP_SERVER_HTTPS_TRUSTSTORE_KEY,
            STACKABLE_TLS_STORE_PASSWORD,
        );

        insert(&mut config, INTERNAL_COMMUNICATION_HTTPS_REQUIRED, "true");
        insert(
            &mut config,
            INTERNAL_COMMUNICATION_HTTPS_KEYSTORE_PATH,
            format!("{STACKABLE_INTERNAL_TLS_DIR}/keystore.p12"),
        );
        insert(
            &mut config,
            INTERNAL_COMMUNICATION_HTTPS_KEYSTORE_KEY,
            STACKABLE_TLS_STORE_PASSWORD,
        );
        insert(
            &mut config,
            INTERNAL_COMMUNICATION_HTTPS_TRUSTSTORE_PATH,
            format!("{STACKABLE_INTERNAL_TLS_DIR}/truststore.p12"),
        );
        insert(
            &mut config,
            INTERNAL_COMMUNICATION_HTTPS_TRUSTSTORE_KEY,
            STACKABLE_TLS_STORE_PASSWORD,
        );
    } else {
        insert(&mut config, HTTP_SERVER_HTTP_PORT, HTTP_PORT.to_string());
    }

    for (key, value) in authenticators.config_properties() {
        config.insert(key, Some(value));
    }

    Ok(config)
}

pub fn node_properties(trino: &TrinoCluster) -> Properties {
    let mut node = Properties::new();
    insert(
        &mut node,
        NODE_ENVIRONMENT,
        trino.metadata.name.clone().unwrap_or_default().replace('-', "_"),
    );
    insert(&mut node, NODE_DATA_DIR, DATA_DIR_NAME);
    node
}

pub fn exchange_manager_properties(trino: &TrinoCluster) -> Properties {
    let exchange_manager = trino.exchange_manager();
    let mut properties = Properties::new();
    insert(&mut properties, EXCHANGE_MANAGER_NAME, &exchange_manager.name);
    if exchange_manager.name == DEFAULT_EXCHANGE_MANAGER_NAME {
        insert(
            &mut properties,
            EXCHANGE_BASE_DIRECTORIES,
            &exchange_manager.base_directories,
        );
    }
    properties
}

/// The JVM caches DNS lookups forever by default, which breaks on rescheduled pods.
pub fn security_properties() -> Properties {
    let mut properties = Properties::new();
    insert(&mut properties, "networkaddress.cache.ttl", "30");
    insert(&mut properties, "networkaddress.cache.negative.ttl", "0");
    properties
}

/// All files of a role group without the user overrides applied.
pub fn role_group_config_files(
    trino: &TrinoCluster,
    role: &TrinoRole,
    rolegroup_ref: &RoleGroupRef<TrinoCluster>,
    effective: &EffectiveConfig,
    authenticators: &TrinoAuthenticators,
    vector_aggregator_address: Option<&str>,
    cluster_domain: &str,
) -> Result<RoleGroupConfigFiles> {
    let mut properties = BTreeMap::from([
        (
            CONFIG_PROPERTIES.to_string(),
            config_properties(trino, role, effective, authenticators, cluster_domain)?,
        ),
        (NODE_PROPERTIES.to_string(), node_properties(trino)),
        (
            LOG_PROPERTIES.to_string(),
            product_logging::log_properties(&effective.config.logging),
        ),
        (
            EXCHANGE_MANAGER_PROPERTIES.to_string(),
            exchange_manager_properties(trino),
        ),
        (JVM_SECURITY_PROPERTIES.to_string(), security_properties()),
    ]);

    for (file_name, file_properties) in authenticators.config_files() {
        properties.insert(
            file_name,
            file_properties
                .into_iter()
                .map(|(key, value)| (key, Some(value)))
                .collect(),
        );
    }

    Ok(RoleGroupConfigFiles {
        properties,
        jvm_config: jvm::jvm_config(&effective.config, effective.jvm_heap_factor)
            .context(JvmConfigSnafu)?,
        vector_config: product_logging::vector_config(
            rolegroup_ref,
            vector_aggregator_address,
            &effective.config.logging,
        ),
    })
}
