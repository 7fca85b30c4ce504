use std::collections::BTreeMap;

use stackable_operator::{
    builder::{VolumeBuilder, VolumeMountBuilder},
    commons::authentication::static_,
    k8s_openapi::api::core::v1::{Volume, VolumeMount},
};

use crate::{
    authentication::password::{PasswordAuthenticator, PASSWORD_AUTHENTICATOR_NAME},
    crd::{STACKABLE_AUTH_SECRETS_DIR, STACKABLE_USERS_DIR},
};

const PASSWORD_AUTHENTICATOR_NAME_FILE: &str = "file";
const FILE_PASSWORD_FILE: &str = "file.password-file";

pub const USERS_VOLUME_NAME: &str = "users";

/// Static users from a Secret. Every key of the Secret is a user name, its value the password.
/// The users are hashed into a password file before Trino starts.
#[derive(Clone, Debug)]
pub struct FileAuthenticator {
    name: String,
    file: static_::AuthenticationProvider,
}

impl FileAuthenticator {
    pub fn new(name: String, provider: static_::AuthenticationProvider) -> Self {
        Self {
            name,
            file: provider,
        }
    }

    fn secret_volume_name(&self) -> String {
        format!("auth-secrets-{}", self.name)
    }

    fn secret_mount_path(&self) -> String {
        format!("{STACKABLE_AUTH_SECRETS_DIR}/{}", self.name)
    }

    fn password_file_path(&self) -> String {
        format!("{STACKABLE_USERS_DIR}/{}.db", self.name)
    }

    pub fn volumes(&self) -> Vec<Volume> {
        vec![
            VolumeBuilder::new(self.secret_volume_name())
                .with_secret(&self.file.user_credentials_secret.name, false)
                .build(),
            VolumeBuilder::new(USERS_VOLUME_NAME)
                .with_empty_dir(None::<String>, None)
                .build(),
        ]
    }

    pub fn volume_mounts(&self) -> Vec<VolumeMount> {
        vec![
            VolumeMountBuilder::new(self.secret_volume_name(), self.secret_mount_path()).build(),
            VolumeMountBuilder::new(USERS_VOLUME_NAME, STACKABLE_USERS_DIR).build(),
        ]
    }

    /// Writes one bcrypt `user:hash` line per Secret key into the password file.
    pub fn commands(&self) -> Vec<String> {
        vec![
            "set +x".to_string(),
            format!(
                "for user in {secrets}/*; do htpasswd -nbBC 10 \"$(basename \"$user\")\" \"$(cat \"$user\")\"; done > {db}",
                secrets = self.secret_mount_path(),
                db = self.password_file_path(),
            ),
            "set -x".to_string(),
        ]
    }
}

impl PasswordAuthenticator for FileAuthenticator {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn config_file_name(&self) -> String {
        format!("{}-password-file-auth.properties", self.name)
    }

    fn config_file_properties(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                PASSWORD_AUTHENTICATOR_NAME.to_string(),
                PASSWORD_AUTHENTICATOR_NAME_FILE.to_string(),
            ),
            (FILE_PASSWORD_FILE.to_string(), self.password_file_path()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> FileAuthenticator {
        let input = r#"
        userCredentialsSecret:
          name: simple-users-secret
        "#;
        let deserializer = serde_yaml::Deserializer::from_str(input);
        let provider: static_::AuthenticationProvider =
            serde_yaml::with::singleton_map_recursive::deserialize(deserializer)
                .expect("illegal test input");
        FileAuthenticator::new("simple-users".to_string(), provider)
    }

    #[test]
    fn test_file_volumes() {
        let file = authenticator();
        let volumes = file.volumes();
        assert_eq!(volumes.len(), 2);
        assert_eq!(volumes[0].name, "auth-secrets-simple-users");
        assert_eq!(
            volumes[0]
                .secret
                .as_ref()
                .and_then(|s| s.secret_name.as_deref()),
            Some("simple-users-secret")
        );
        assert!(volumes[1].empty_dir.is_some());

        let mounts = file.volume_mounts();
        assert_eq!(mounts[0].mount_path, "/stackable/auth-secrets/simple-users");
        assert_eq!(mounts[1].mount_path, "/stackable/users");
    }

    #[test]
    fn test_file_authenticator_config() {
        let file = authenticator();
        assert_eq!(
            file.config_file_name(),
            "simple-users-password-file-auth.properties"
        );
        assert_eq!(
            file.config_file_path(),
            "/stackable/rwconfig/simple-users-password-file-auth.properties"
        );
        let properties = file.config_file_properties();
        assert_eq!(
            properties.get(PASSWORD_AUTHENTICATOR_NAME),
            Some(&"file".to_string())
        );
        assert_eq!(
            properties.get(FILE_PASSWORD_FILE),
            Some(&"/stackable/users/simple-users.db".to_string())
        );

        let commands = file.commands();
        assert_eq!(commands.len(), 3);
        assert!(commands[1].starts_with("for user in /stackable/auth-secrets/simple-users/*;"));
        assert!(commands[1].ends_with("> /stackable/users/simple-users.db"));
    }
}
