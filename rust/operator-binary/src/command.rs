use crate::{
    authentication::TrinoAuthenticators,
    crd::{
        TrinoCluster, CATALOG_DIR_NAME, CONFIG_DIR_NAME, DATA_DIR_NAME, RW_CONFIG_DIR_NAME,
        STACKABLE_CLIENT_TLS_DIR, STACKABLE_INTERNAL_TLS_DIR, STACKABLE_SERVER_TLS_DIR,
        STACKABLE_TLS_STORE_PASSWORD, SYSTEM_TRUST_STORE, SYSTEM_TRUST_STORE_PASSWORD,
    },
};

pub const SHELL_COMMAND: [&str; 5] = ["/bin/bash", "-x", "-euo", "pipefail", "-c"];

pub fn container_trino_command() -> Vec<String> {
    SHELL_COMMAND.iter().map(|arg| arg.to_string()).collect()
}

pub fn container_trino_args(
    trino: &TrinoCluster,
    authenticators: &TrinoAuthenticators,
) -> Vec<String> {
    let mut args = vec![
        // copy config files to a writeable empty folder
        format!("echo copying {CONFIG_DIR_NAME} to {RW_CONFIG_DIR_NAME}"),
        format!("mkdir -p {RW_CONFIG_DIR_NAME}/catalog"),
        format!("cp -RL {CONFIG_DIR_NAME}/* {RW_CONFIG_DIR_NAME}"),
        format!("cp -RL {CATALOG_DIR_NAME}/* {RW_CONFIG_DIR_NAME}/catalog"),
        // Copy system truststore to stackable truststore
        format!("keytool -importkeystore -srckeystore {SYSTEM_TRUST_STORE} -srcstoretype jks -srcstorepass {SYSTEM_TRUST_STORE_PASSWORD} -destkeystore {STACKABLE_CLIENT_TLS_DIR}/truststore.p12 -deststoretype pkcs12 -deststorepass {STACKABLE_TLS_STORE_PASSWORD} -noprompt"),
    ];

    if trino.tls_enabled() {
        args.extend(import_truststore(STACKABLE_SERVER_TLS_DIR));
        args.extend(import_truststore(STACKABLE_INTERNAL_TLS_DIR));
    }

    args.extend(authenticators.commands());

    // start command
    args.push(format!(
        "bin/launcher run --etc-dir={RW_CONFIG_DIR_NAME} --data-dir={DATA_DIR_NAME}"
    ));

    vec![args.join(" && ")]
}

/// Adds the CAs of a secret-operator provided truststore to the client truststore, so Trino
/// trusts its own certificates.
fn import_truststore(directory: &str) -> Vec<String> {
    vec![
        format!("echo [{directory}] Importing truststore"),
        format!("keytool -importkeystore -srckeystore {directory}/truststore.p12 -srcstoretype pkcs12 -srcstorepass {STACKABLE_TLS_STORE_PASSWORD} -destkeystore {STACKABLE_CLIENT_TLS_DIR}/truststore.p12 -deststoretype pkcs12 -deststorepass {STACKABLE_TLS_STORE_PASSWORD} -noprompt"),
    ]
}

/// Imports a PEM CA certificate into the client truststore under the given alias.
pub fn add_cert_to_truststore(cert_file: &str, alias: &str) -> Vec<String> {
    vec![
        format!("echo Adding cert from {cert_file} to truststore as {alias}"),
        format!("keytool -importcert -file {cert_file} -alias {alias} -keystore {STACKABLE_CLIENT_TLS_DIR}/truststore.p12 -storetype pkcs12 -storepass {STACKABLE_TLS_STORE_PASSWORD} -noprompt"),
    ]
}
