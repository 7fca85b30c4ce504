//! Coordinators get their timeout as termination grace period. Workers are told to drain through
//! the Trino REST API from a preStop hook and get the drain phases on top of their timeout.
use std::collections::BTreeMap;

use snafu::{ResultExt, Snafu};
use stackable_operator::{
    builder::{ContainerBuilder, PodBuilder},
    k8s_openapi::api::core::v1::{ExecAction, LifecycleHandler},
    time::Duration,
};

use crate::{
    command::container_trino_command,
    crd::{
        TrinoCluster, TrinoConfig, TrinoRole, DEFAULT_COORDINATOR_GRACEFUL_SHUTDOWN_TIMEOUT,
        DEFAULT_WORKER_GRACEFUL_SHUTDOWN_TIMEOUT,
    },
};

/// Trino waits this long before it stops accepting tasks, and again after the last task is done.
const WORKER_DRAIN_PHASE: Duration = Duration::from_secs(30);
/// Slack for the preStop hook on top of the drain.
const WORKER_HOOK_SLACK: Duration = Duration::from_secs(10);

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to set terminationGracePeriod"))]
    SetTerminationGracePeriod {
        source: stackable_operator::builder::pod::Error,
    },
}

pub fn graceful_shutdown_config_properties(
    trino: &TrinoCluster,
    role: &TrinoRole,
) -> BTreeMap<String, Option<String>> {
    let (key, period) = match role {
        // a query outliving the shortest worker timeout dies with that worker anyway
        TrinoRole::Coordinator => (
            "query.max-execution-time",
            trino.min_worker_graceful_shutdown_timeout(),
        ),
        TrinoRole::Worker => ("shutdown.grace-period", WORKER_DRAIN_PHASE),
    };
    BTreeMap::from([(key.to_string(), Some(format!("{}s", period.as_secs())))])
}

/// The Pod termination grace period of a role group.
pub fn termination_grace_period(role: &TrinoRole, config: &TrinoConfig) -> Duration {
    match role {
        TrinoRole::Coordinator => config
            .graceful_shutdown_timeout
            .unwrap_or(DEFAULT_COORDINATOR_GRACEFUL_SHUTDOWN_TIMEOUT),
        TrinoRole::Worker => {
            config
                .graceful_shutdown_timeout
                .unwrap_or(DEFAULT_WORKER_GRACEFUL_SHUTDOWN_TIMEOUT)
                + 2 * WORKER_DRAIN_PHASE
                + WORKER_HOOK_SLACK
        }
    }
}

/// The hook only triggers the drain. It has to stay alive for the whole grace period, the Pod is
/// killed as soon as it returns.
fn worker_shutdown_script(trino: &TrinoCluster, sleep_seconds: u64) -> String {
    let state_url = format!(
        "{protocol}://127.0.0.1:{port}/v1/info/state",
        protocol = trino.exposed_protocol(),
        port = trino.exposed_port(),
    );
    [
        format!("curl -v --fail --insecure -X PUT -d '\"SHUTTING_DOWN\"' -H 'Content-type: application/json' -H 'X-Trino-User: admin' {state_url} >> /proc/1/fd/1 2>&1"),
        "echo 'Worker is shutting down' >> /proc/1/fd/1 2>&1".to_string(),
        format!("echo 'Waiting {sleep_seconds} seconds for the drain' >> /proc/1/fd/1 2>&1"),
        format!("sleep {sleep_seconds}"),
    ]
    .join("\n")
}

pub fn add_graceful_shutdown_config(
    trino: &TrinoCluster,
    role: &TrinoRole,
    config: &TrinoConfig,
    pod_builder: &mut PodBuilder,
    trino_container: &mut ContainerBuilder,
) -> Result<(), Error> {
    let period = termination_grace_period(role, config);
    pod_builder
        .termination_grace_period(&period)
        .context(SetTerminationGracePeriodSnafu)?;

    if role == &TrinoRole::Worker {
        let mut command = container_trino_command();
        command.push(worker_shutdown_script(trino, period.as_secs()));
        trino_container.lifecycle_pre_stop(LifecycleHandler {
            exec: Some(ExecAction {
                command: Some(command),
            }),
            ..LifecycleHandler::default()
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use stackable_operator::k8s_openapi::api::core::v1::{Container, PodSpec};

    use super::*;

    fn trino(tls: bool) -> TrinoCluster {
        let cluster_config = if tls { "tls: {}" } else { "listenerClass: cluster-internal" };
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
              workers:
                config:
                  gracefulShutdownTimeout: 2m
                roleGroups:
                  default: {{}}
            "#
        );
        serde_yaml::from_str(&input).expect("illegal test input")
    }

    fn apply(trino: &TrinoCluster, role: TrinoRole) -> (PodSpec, Container) {
        let rolegroup_ref = role.rolegroup_ref(trino, "default");
        let effective = trino
            .effective_config(&role, &rolegroup_ref)
            .expect("valid configuration");
        let mut pod_builder = PodBuilder::new();
        let mut container_builder = ContainerBuilder::new("trino").expect("valid container name");
        add_graceful_shutdown_config(
            trino,
            &role,
            &effective.config,
            &mut pod_builder,
            &mut container_builder,
        )
        .expect("valid grace period");
        let container = container_builder.build();
        let pod_spec = pod_builder
            .add_container(container.clone())
            .build_template()
            .spec
            .expect("pod spec is set");
        (pod_spec, container)
    }

    #[test]
    fn test_coordinator() {
        let trino = trino(false);
        let (pod_spec, container) = apply(&trino, TrinoRole::Coordinator);
        assert_eq!(pod_spec.termination_grace_period_seconds, Some(15 * 60));
        assert!(container.lifecycle.is_none());
        assert_eq!(
            graceful_shutdown_config_properties(&trino, &TrinoRole::Coordinator)
                .get("query.max-execution-time"),
            Some(&Some("120s".to_string()))
        );
    }

    #[test]
    fn test_worker() {
        let trino = trino(true);
        let (pod_spec, container) = apply(&trino, TrinoRole::Worker);
        assert_eq!(pod_spec.termination_grace_period_seconds, Some(120 + 60 + 10));
        assert_eq!(
            graceful_shutdown_config_properties(&trino, &TrinoRole::Worker)
                .get("shutdown.grace-period"),
            Some(&Some("30s".to_string()))
        );

        let command = container
            .lifecycle
            .and_then(|lifecycle| lifecycle.pre_stop)
            .and_then(|pre_stop| pre_stop.exec)
            .and_then(|exec| exec.command)
            .expect("preStop command is set");
        let script = command.last().expect("script is set");
        assert!(script.contains("https://127.0.0.1:8443/v1/info/state"));
        assert!(script.ends_with("sleep 190"));
    }
}
