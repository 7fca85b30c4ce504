//! Composes the AuthenticationClasses referenced by a TrinoCluster into the properties, env vars,
//! volumes and commands Trino needs. At most one authenticator per kind is supported.

pub mod oidc;
pub mod password;

use std::collections::BTreeMap;

use snafu::{OptionExt, ResultExt, Snafu};
use stackable_operator::{
    commons::authentication::AuthenticationClassProvider,
    k8s_openapi::api::core::v1::{EnvVar, Volume, VolumeMount},
    kube::ResourceExt,
};
use strum::{Display, EnumDiscriminants};
use tracing::debug;

use crate::{
    authentication::{
        oidc::OidcAuthenticator,
        password::{
            file::FileAuthenticator, ldap::LdapAuthenticator, PasswordAuthenticator,
            PASSWORD_AUTHENTICATOR_CONFIG_FILES,
        },
    },
    crd::authentication::TrinoAuthenticationRef,
    platform::{self, Platform},
};

const HTTP_SERVER_AUTHENTICATION_TYPE: &str = "http-server.authentication.type";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to retrieve AuthenticationClass {authentication_class}"))]
    AuthenticationClassRetrieval {
        source: platform::Error,
        authentication_class: String,
    },

    #[snafu(display("AuthenticationClass {authentication_class} does not exist"))]
    AuthenticationClassNotFound { authentication_class: String },

    #[snafu(display(
        "the provider of AuthenticationClass {authentication_class} is not supported by Trino"
    ))]
    AuthenticationClassProviderNotSupported { authentication_class: String },

    #[snafu(display(
        "multiple {kind} authenticators are not supported, found another one in AuthenticationClass {authentication_class}"
    ))]
    DuplicateAuthenticator {
        kind: TrinoAuthenticatorKind,
        authentication_class: String,
    },

    #[snafu(display(
        "the OIDC AuthenticationClass {authentication_class} requires an oidc client configuration with a clientCredentialsSecretRef"
    ))]
    MissingOidcClientOptions { authentication_class: String },

    #[snafu(display("invalid OIDC AuthenticationClass {authentication_class}"))]
    InvalidOidcProvider {
        source: oidc::Error,
        authentication_class: String,
    },

    #[snafu(display("invalid LDAP AuthenticationClass {authentication_class}"))]
    InvalidLdapProvider {
        source: password::ldap::Error,
        authentication_class: String,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Debug, EnumDiscriminants)]
#[strum_discriminants(name(TrinoAuthenticatorKind), derive(Display))]
#[allow(clippy::large_enum_variant)]
pub enum TrinoAuthenticator {
    Oidc(OidcAuthenticator),
    Ldap(LdapAuthenticator),
    Static(FileAuthenticator),
}

impl TrinoAuthenticator {
    /// The value this authenticator contributes to `http-server.authentication.type`.
    pub fn authentication_type(&self) -> &'static str {
        match self {
            TrinoAuthenticator::Oidc(_) => "OAUTH2",
            TrinoAuthenticator::Ldap(_) | TrinoAuthenticator::Static(_) => "PASSWORD",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TrinoAuthenticator::Oidc(oidc) => oidc.name(),
            TrinoAuthenticator::Ldap(ldap) => ldap.name(),
            TrinoAuthenticator::Static(file) => file.name(),
        }
    }

    fn password_authenticator(&self) -> Option<&dyn PasswordAuthenticator> {
        match self {
            TrinoAuthenticator::Oidc(_) => None,
            TrinoAuthenticator::Ldap(ldap) => Some(ldap),
            TrinoAuthenticator::Static(file) => Some(file),
        }
    }
}

/// All authenticators of a cluster, in the order the AuthenticationClasses were referenced.
/// This is the order Trino tries them in as well.
#[derive(Clone, Debug, Default)]
pub struct TrinoAuthenticators {
    authenticators: Vec<TrinoAuthenticator>,
}

impl TrinoAuthenticators {
    pub fn new(authenticators: Vec<TrinoAuthenticator>) -> Result<Self> {
        let mut kinds: Vec<TrinoAuthenticatorKind> = vec![];
        for authenticator in &authenticators {
            let kind = TrinoAuthenticatorKind::from(authenticator);
            if kinds.contains(&kind) {
                return DuplicateAuthenticatorSnafu {
                    kind,
                    authentication_class: authenticator.name(),
                }
                .fail();
            }
            kinds.push(kind);
        }
        Ok(Self { authenticators })
    }

    pub fn is_empty(&self) -> bool {
        self.authenticators.is_empty()
    }

    fn password_authenticators(&self) -> impl Iterator<Item = &dyn PasswordAuthenticator> {
        self.authenticators
            .iter()
            .filter_map(TrinoAuthenticator::password_authenticator)
    }

    pub fn env_vars(&self) -> Vec<EnvVar> {
        self.authenticators
            .iter()
            .flat_map(|authenticator| match authenticator {
                TrinoAuthenticator::Oidc(oidc) => oidc.env_vars(),
                TrinoAuthenticator::Ldap(_) | TrinoAuthenticator::Static(_) => vec![],
            })
            .collect()
    }

    /// Volumes of all authenticators, each name at most once.
    pub fn volumes(&self) -> Vec<Volume> {
        let mut volumes: Vec<Volume> = vec![];
        let all = self
            .authenticators
            .iter()
            .flat_map(|authenticator| match authenticator {
                TrinoAuthenticator::Oidc(oidc) => oidc.volumes(),
                TrinoAuthenticator::Ldap(ldap) => ldap.volumes(),
                TrinoAuthenticator::Static(file) => file.volumes(),
            });
        for volume in all {
            if !volumes.iter().any(|known| known.name == volume.name) {
                volumes.push(volume);
            }
        }
        volumes
    }

    pub fn volume_mounts(&self) -> Vec<VolumeMount> {
        let mut mounts: Vec<VolumeMount> = vec![];
        let all = self
            .authenticators
            .iter()
            .flat_map(|authenticator| match authenticator {
                TrinoAuthenticator::Oidc(oidc) => oidc.volume_mounts(),
                TrinoAuthenticator::Ldap(ldap) => ldap.volume_mounts(),
                TrinoAuthenticator::Static(file) => file.volume_mounts(),
            });
        for mount in all {
            if !mounts.iter().any(|known| known.mount_path == mount.mount_path) {
                mounts.push(mount);
            }
        }
        mounts
    }

    pub fn commands(&self) -> Vec<String> {
        self.authenticators
            .iter()
            .flat_map(|authenticator| match authenticator {
                TrinoAuthenticator::Oidc(oidc) => oidc.commands(),
                TrinoAuthenticator::Ldap(ldap) => ldap.commands(),
                TrinoAuthenticator::Static(file) => file.commands(),
            })
            .collect()
    }

    /// One properties file per password authenticator, keyed by file name.
    pub fn config_files(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        self.password_authenticators()
            .map(|password| {
                (
                    password.config_file_name(),
                    password.config_file_properties(),
                )
            })
            .collect()
    }

    /// Properties for `config.properties`, including the joined `http-server.authentication.type`.
    pub fn config_properties(&self) -> BTreeMap<String, String> {
        let mut config = BTreeMap::new();
        // unique types, in the order of the referenced classes
        let mut http_server_authentication_types: Vec<&str> = vec![];

        for authenticator in &self.authenticators {
            let authentication_type = authenticator.authentication_type();
            if !http_server_authentication_types.contains(&authentication_type) {
                http_server_authentication_types.push(authentication_type);
            }
            if let TrinoAuthenticator::Oidc(oidc) = authenticator {
                config.extend(oidc.config_properties());
            }
        }

        let password_files = self
            .password_authenticators()
            .map(|password| password.config_file_path())
            .collect::<Vec<_>>();
        if !password_files.is_empty() {
            config.insert(
                PASSWORD_AUTHENTICATOR_CONFIG_FILES.to_string(),
                password_files.join(","),
            );
        }

        if !http_server_authentication_types.is_empty() {
            debug!(
                "Final [{HTTP_SERVER_AUTHENTICATION_TYPE}]: {:?}.",
                http_server_authentication_types
            );
            config.insert(
                HTTP_SERVER_AUTHENTICATION_TYPE.to_string(),
                http_server_authentication_types.join(","),
            );
        }
        config
    }
}

/// Retrieve all referenced AuthenticationClasses and turn them into authenticators.
pub async fn compose(
    platform: &dyn Platform,
    references: &[TrinoAuthenticationRef],
) -> Result<TrinoAuthenticators> {
    let mut authenticators = vec![];

    for reference in references {
        let class_name = &reference.authentication_class;
        let auth_class = platform
            .get_authentication_class(class_name)
            .await
            .context(AuthenticationClassRetrievalSnafu {
                authentication_class: class_name,
            })?
            .context(AuthenticationClassNotFoundSnafu {
                authentication_class: class_name,
            })?;
        let auth_class_name = auth_class.name_any();

        let authenticator = match auth_class.spec.provider {
            AuthenticationClassProvider::Oidc(provider) => {
                let client = reference
                    .oidc
                    .clone()
                    .context(MissingOidcClientOptionsSnafu {
                        authentication_class: &auth_class_name,
                    })?;
                TrinoAuthenticator::Oidc(
                    OidcAuthenticator::new(auth_class_name.clone(), provider, client).context(
                        InvalidOidcProviderSnafu {
                            authentication_class: &auth_class_name,
                        },
                    )?,
                )
            }
            AuthenticationClassProvider::Ldap(provider) => TrinoAuthenticator::Ldap(
                LdapAuthenticator::new(auth_class_name.clone(), provider).context(
                    InvalidLdapProviderSnafu {
                        authentication_class: &auth_class_name,
                    },
                )?,
            ),
            AuthenticationClassProvider::Static(provider) => {
                TrinoAuthenticator::Static(FileAuthenticator::new(auth_class_name, provider))
            }
            _ => {
                return AuthenticationClassProviderNotSupportedSnafu {
                    authentication_class: auth_class_name,
                }
                .fail()
            }
        };
        debug!(
            authentication_class = %class_name,
            kind = %TrinoAuthenticatorKind::from(&authenticator),
            "resolved authenticator"
        );
        authenticators.push(authenticator);
    }

    TrinoAuthenticators::new(authenticators)
}
