//! Trino PASSWORD authentication, backed by LDAP or by static users from a Secret.
//!
//! Every password authenticator gets its own properties file, Trino reads all of them from
//! `password-authenticator.config-files` and tries them in that order.

pub mod file;
pub mod ldap;

use std::collections::BTreeMap;

use crate::crd::RW_CONFIG_DIR_NAME;

pub(crate) const PASSWORD_AUTHENTICATOR_NAME: &str = "password-authenticator.name";
pub(crate) const PASSWORD_AUTHENTICATOR_CONFIG_FILES: &str = "password-authenticator.config-files";

/// A backend of the Trino PASSWORD authentication type.
pub trait PasswordAuthenticator {
    /// Name of the AuthenticationClass this authenticator was built from.
    fn name(&self) -> &str;

    /// Name of the properties file below the Trino config directory.
    fn config_file_name(&self) -> String;

    fn config_file_properties(&self) -> BTreeMap<String, String>;

    fn config_file_path(&self) -> String {
        format!("{RW_CONFIG_DIR_NAME}/{}", self.config_file_name())
    }
}
