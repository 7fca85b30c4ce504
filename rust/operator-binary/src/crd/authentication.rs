use serde::{Deserialize, Serialize};
use stackable_operator::{
    commons::authentication::oidc,
    schemars::{self, JsonSchema},
};

/// Reference from a TrinoCluster to an AuthenticationClass.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrinoAuthenticationRef {
    pub authentication_class: String,
    /// Client credentials and extra scopes. Required if the referenced class is an OIDC provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc: Option<oidc::ClientAuthenticationOptions>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oidc_client_options() {
        let input = r#"
        authenticationClass: keycloak
        oidc:
          clientCredentialsSecretRef: trino-oidc-client
          extraScopes: [groups]
        "#;
        let auth_ref: TrinoAuthenticationRef =
            serde_yaml::from_str(input).expect("illegal test input");
        let options = auth_ref.oidc.expect("oidc options are set");
        assert_eq!(options.client_credentials_secret_ref, "trino-oidc-client");
        assert_eq!(options.extra_scopes, vec!["groups".to_string()]);

        let auth_ref: TrinoAuthenticationRef =
            serde_yaml::from_str("authenticationClass: ldap").expect("illegal test input");
        assert!(auth_ref.oidc.is_none());
    }
}
