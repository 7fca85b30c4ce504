//! This module computes all resources required for Trino OAUTH2 authentication.

use std::collections::BTreeMap;

use snafu::{ResultExt, Snafu};
use stackable_operator::{
    commons::authentication::oidc,
    k8s_openapi::api::core::v1::{EnvVar, Volume, VolumeMount},
};

use crate::command;

// Trino properties
const HTTP_SERVER_AUTHENTICATION_OAUTH2_CLIENT_ID: &str =
    "http-server.authentication.oauth2.client-id";
const HTTP_SERVER_AUTHENTICATION_OAUTH2_CLIENT_SECRET: &str =
    "http-server.authentication.oauth2.client-secret";
const HTTP_SERVER_AUTHENTICATION_OAUTH2_ISSUER: &str = "http-server.authentication.oauth2.issuer";
const HTTP_SERVER_AUTHENTICATION_OAUTH2_SCOPES: &str = "http-server.authentication.oauth2.scopes";
const HTTP_SERVER_AUTHENTICATION_OAUTH2_PRINCIPAL_FIELD: &str =
    "http-server.authentication.oauth2.principal-field";

const DEFAULT_SCOPES: [&str; 3] = ["openid", "email", "profile"];

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to create the issuer endpoint url"))]
    IssuerEndpointUrl { source: oidc::Error },

    #[snafu(display("Trino does not support unverified TLS connections to OIDC"))]
    UnverifiedOidcTlsConnectionNotSupported,
}

#[derive(Clone, Debug)]
pub struct OidcAuthenticator {
    name: String,
    oidc: oidc::AuthenticationProvider,
    client: oidc::ClientAuthenticationOptions,
    issuer: String,
}

impl OidcAuthenticator {
    pub fn new(
        name: String,
        provider: oidc::AuthenticationProvider,
        client: oidc::ClientAuthenticationOptions,
    ) -> Result<Self, Error> {
        if provider.tls.use_tls() && !provider.tls.use_tls_verification() {
            return UnverifiedOidcTlsConnectionNotSupportedSnafu.fail();
        }
        let issuer = provider
            .endpoint_url()
            .context(IssuerEndpointUrlSnafu)?
            .to_string();
        Ok(Self {
            name,
            oidc: provider,
            client,
            issuer,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect();
        for scope in self.oidc.scopes.iter().chain(&self.client.extra_scopes) {
            if !scopes.contains(scope) {
                scopes.push(scope.clone());
            }
        }
        scopes
    }

    pub fn env_vars(&self) -> Vec<EnvVar> {
        oidc::AuthenticationProvider::client_credentials_env_var_mounts(
            self.client.client_credentials_secret_ref.clone(),
        )
    }

    /// Imports the CA of the identity provider into the client truststore.
    pub fn commands(&self) -> Vec<String> {
        match self.oidc.tls.tls_ca_cert_mount_path() {
            Some(ca_cert) => {
                command::add_cert_to_truststore(&ca_cert, &format!("oidc-{}", self.name))
            }
            None => vec![],
        }
    }

    pub fn volumes(&self) -> Vec<Volume> {
        self.oidc.tls.volumes_and_mounts().0
    }

    pub fn volume_mounts(&self) -> Vec<VolumeMount> {
        self.oidc.tls.volumes_and_mounts().1
    }

    pub fn config_properties(&self) -> BTreeMap<String, String> {
        let (client_id_env, client_secret_env) =
            oidc::AuthenticationProvider::client_credentials_env_names(
                &self.client.client_credentials_secret_ref,
            );
        BTreeMap::from([
            (
                HTTP_SERVER_AUTHENTICATION_OAUTH2_CLIENT_ID.to_string(),
                format!("${{ENV:{client_id_env}}}"),
            ),
            (
                HTTP_SERVER_AUTHENTICATION_OAUTH2_CLIENT_SECRET.to_string(),
                format!("${{ENV:{client_secret_env}}}"),
            ),
            (
                HTTP_SERVER_AUTHENTICATION_OAUTH2_ISSUER.to_string(),
                self.issuer.clone(),
            ),
            (
                HTTP_SERVER_AUTHENTICATION_OAUTH2_SCOPES.to_string(),
                self.scopes().join(","),
            ),
            (
                HTTP_SERVER_AUTHENTICATION_OAUTH2_PRINCIPAL_FIELD.to_string(),
                self.oidc.principal_claim.clone(),
            ),
        ])
    }
}
