use std::collections::BTreeMap;

use snafu::{ResultExt, Snafu};
use stackable_operator::{
    builder::{
        pod::volume::SecretOperatorVolumeSourceBuilderError, SecretOperatorVolumeSourceBuilder,
        VolumeBuilder, VolumeMountBuilder,
    },
    commons::{authentication::ldap, secret_class::SecretClassVolume},
    k8s_openapi::api::core::v1::{Volume, VolumeMount},
};

use crate::{
    authentication::password::{PasswordAuthenticator, PASSWORD_AUTHENTICATOR_NAME},
    crd::STACKABLE_SECRETS_DIR,
};

const PASSWORD_AUTHENTICATOR_NAME_LDAP: &str = "ldap";
const LDAP_URL: &str = "ldap.url";
const LDAP_USER_BASE_DN: &str = "ldap.user-base-dn";
const LDAP_GROUP_AUTH_PATTERN: &str = "ldap.group-auth-pattern";
const LDAP_BIND_DN: &str = "ldap.bind-dn";
const LDAP_BIND_PASSWORD: &str = "ldap.bind-password";
const LDAP_ALLOW_INSECURE: &str = "ldap.allow-insecure";
const LDAP_SSL_TRUST_STORE_PATH: &str = "ldap.ssl.truststore.path";
const LDAP_USER_ENV: &str = "LDAP_USER";
const LDAP_PASSWORD_ENV: &str = "LDAP_PASSWORD";

const BIND_CREDENTIALS_VOLUME_NAME: &str = "ldap-bind-credentials";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("Trino does not support unverified TLS connections to LDAP"))]
    UnverifiedLdapTlsConnectionNotSupported,

    #[snafu(display("failed to build the bind credentials volume of {authentication_class}"))]
    BindCredentialsVolume {
        source: SecretOperatorVolumeSourceBuilderError,
        authentication_class: String,
    },
}

#[derive(Clone, Debug)]
pub struct LdapAuthenticator {
    name: String,
    ldap: ldap::AuthenticationProvider,
    bind_credentials_volume: Option<Volume>,
}

impl LdapAuthenticator {
    pub fn new(name: String, provider: ldap::AuthenticationProvider) -> Result<Self, Error> {
        if provider.tls.use_tls() && !provider.tls.use_tls_verification() {
            return UnverifiedLdapTlsConnectionNotSupportedSnafu.fail();
        }
        let bind_credentials_volume = provider
            .bind_credentials
            .as_ref()
            .map(|credentials| bind_credentials_volume(credentials))
            .transpose()
            .context(BindCredentialsVolumeSnafu {
                authentication_class: &name,
            })?;

        Ok(Self {
            name,
            ldap: provider,
            bind_credentials_volume,
        })
    }

    /// `LDAP_USER_MY_LDAP` style names, unique per AuthenticationClass.
    fn env_name(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.name.replace('-', "_")).to_uppercase()
    }

    fn bind_credentials_mount_path(&self, credentials: &SecretClassVolume) -> String {
        format!("{STACKABLE_SECRETS_DIR}/{}", credentials.secret_class)
    }

    pub fn endpoint_url(&self) -> String {
        let use_tls = self.ldap.tls.use_tls();
        let scheme = if use_tls { "ldaps" } else { "ldap" };
        let port = self.ldap.port.unwrap_or(if use_tls { 636 } else { 389 });
        format!("{scheme}://{}:{port}", self.ldap.hostname)
    }

    /// Shell commands exporting the bind credentials from the mounted secret.
    pub fn commands(&self) -> Vec<String> {
        let Some(credentials) = &self.ldap.bind_credentials else {
            return vec![];
        };
        let mount_path = self.bind_credentials_mount_path(credentials);
        vec![
            "set +x".to_string(),
            format!(
                "export {user_env}=\"$(cat {mount_path}/user)\"",
                user_env = self.env_name(LDAP_USER_ENV)
            ),
            format!(
                "export {password_env}=\"$(cat {mount_path}/password)\"",
                password_env = self.env_name(LDAP_PASSWORD_ENV)
            ),
            "set -x".to_string(),
        ]
    }

    pub fn volumes(&self) -> Vec<Volume> {
        let (mut volumes, _) = self.ldap.tls.volumes_and_mounts();
        volumes.extend(self.bind_credentials_volume.clone());
        volumes
    }

    pub fn volume_mounts(&self) -> Vec<VolumeMount> {
        let (_, mut mounts) = self.ldap.tls.volumes_and_mounts();
        if let Some(credentials) = &self.ldap.bind_credentials {
            mounts.push(
                VolumeMountBuilder::new(
                    BIND_CREDENTIALS_VOLUME_NAME,
                    self.bind_credentials_mount_path(credentials),
                )
                .build(),
            );
        }
        mounts
    }
}

impl PasswordAuthenticator for LdapAuthenticator {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn config_file_name(&self) -> String {
        format!("{}-password-ldap-auth.properties", self.name)
    }

    fn config_file_properties(&self) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::from([
            (
                PASSWORD_AUTHENTICATOR_NAME.to_string(),
                PASSWORD_AUTHENTICATOR_NAME_LDAP.to_string(),
            ),
            (LDAP_URL.to_string(), self.endpoint_url()),
            (LDAP_USER_BASE_DN.to_string(), self.ldap.search_base.clone()),
            (
                LDAP_GROUP_AUTH_PATTERN.to_string(),
                format!("(&({id}=${{USER}}))", id = self.ldap.ldap_field_names.uid),
            ),
        ]);

        if self.ldap.bind_credentials.is_some() {
            properties.insert(
                LDAP_BIND_DN.to_string(),
                format!("${{ENV:{}}}", self.env_name(LDAP_USER_ENV)),
            );
            properties.insert(
                LDAP_BIND_PASSWORD.to_string(),
                format!("${{ENV:{}}}", self.env_name(LDAP_PASSWORD_ENV)),
            );
        }

        match self.ldap.tls.tls_ca_cert_mount_path() {
            Some(ca_cert) if self.ldap.tls.use_tls() => {
                properties.insert(LDAP_SSL_TRUST_STORE_PATH.to_string(), ca_cert);
            }
            // verified against the system truststore
            _ if self.ldap.tls.use_tls() => {}
            _ => {
                properties.insert(LDAP_ALLOW_INSECURE.to_string(), "true".to_string());
            }
        }
        properties
    }
}

fn bind_credentials_volume(
    credentials: &SecretClassVolume,
) -> Result<Volume, SecretOperatorVolumeSourceBuilderError> {
    let mut source = SecretOperatorVolumeSourceBuilder::new(&credentials.secret_class);
    if let Some(scope) = &credentials.scope {
        if scope.pod {
            source.with_pod_scope();
        }
        if scope.node {
            source.with_node_scope();
        }
        for service in &scope.services {
            source.with_service_scope(service);
        }
    }
    Ok(VolumeBuilder::new(BIND_CREDENTIALS_VOLUME_NAME)
        .ephemeral(source.build()?)
        .build())
}
