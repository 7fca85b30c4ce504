use snafu::{ResultExt, Snafu};

use crate::crd::{self, TrinoCluster, DEFAULT_CLUSTER_DOMAIN};

pub const KUBERNETES_CLUSTER_DOMAIN_ENV: &str = "KUBERNETES_CLUSTER_DOMAIN";

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to determine the coordinator role group"))]
    CoordinatorRoleGroup { source: crd::Error },

    #[snafu(display("failed to build the coordinator FQDN"))]
    CoordinatorFqdn { source: crd::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// The cluster domain used in service FQDNs, read once at startup.
pub fn cluster_domain() -> String {
    std::env::var(KUBERNETES_CLUSTER_DOMAIN_ENV)
        .ok()
        .filter(|domain| !domain.is_empty())
        .unwrap_or_else(|| DEFAULT_CLUSTER_DOMAIN.to_string())
}

/// URI workers and coordinator use to announce themselves, pointing at the coordinator role
/// group service.
pub fn discovery_uri(trino: &TrinoCluster, cluster_domain: &str) -> Result<String> {
    let coordinator = trino
        .coordinator_rolegroup_ref()
        .context(CoordinatorRoleGroupSnafu)?;
    let host = trino
        .rolegroup_service_fqdn(&coordinator, cluster_domain)
        .context(CoordinatorFqdnSnafu)?;
    Ok(format!(
        "{protocol}://{host}:{port}",
        protocol = trino.exposed_protocol(),
        port = trino.exposed_port(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(
        "listenerClass: cluster-internal",
        "http://simple-trino-coordinator-default.default.svc.cluster.local:8080"
    )]
    #[case(
        "tls: {}",
        "https://simple-trino-coordinator-default.default.svc.cluster.local:8443"
    )]
    fn test_discovery_uri(#[case] cluster_config: &str, #[case] expected: &str) {
        let input = format!(
            r#"
            apiVersion: trino.stackable.tech/v1alpha1
            kind: TrinoCluster
            metadata:
              name: simple-trino
              namespace: default
            spec:
              clusterConfig:
                {cluster_config}
              coordinators:
                roleGroups:
                  default: {{}}
            "#
        );
        let trino: TrinoCluster = serde_yaml::from_str(&input).expect("illegal test input");
        assert_eq!(
            discovery_uri(&trino, DEFAULT_CLUSTER_DOMAIN).expect("valid cluster"),
            expected
        );
    }
}
