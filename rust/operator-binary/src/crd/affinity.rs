use stackable_operator::{
    commons::affinity::{
        affinity_between_cluster_pods, affinity_between_role_pods, StackableAffinityFragment,
    },
    k8s_openapi::api::core::v1::{PodAffinity, PodAntiAffinity},
};

use crate::crd::{TrinoRole, APP_NAME};

/// Pods of one cluster prefer to share nodes, while pods of the same role prefer to spread.
pub fn default_affinity(cluster_name: &str, role: &TrinoRole) -> StackableAffinityFragment {
    StackableAffinityFragment {
        pod_affinity: Some(PodAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                affinity_between_cluster_pods(APP_NAME, cluster_name, 20),
            ]),
            required_during_scheduling_ignored_during_execution: None,
        }),
        pod_anti_affinity: Some(PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                affinity_between_role_pods(APP_NAME, cluster_name, &role.to_string(), 70),
            ]),
            required_during_scheduling_ignored_during_execution: None,
        }),
        node_affinity: None,
        node_selector: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;
    use std::collections::BTreeMap;

    use stackable_operator::commons::affinity::StackableAffinity;

    use crate::crd::TrinoCluster;

    #[rstest]
    #[case(TrinoRole::Coordinator)]
    #[case(TrinoRole::Worker)]
    fn test_affinity_defaults(#[case] role: TrinoRole) {
        let input = r#"
        apiVersion: trino.stackable.tech/v1alpha1
        kind: TrinoCluster
        metadata:
          name: simple-trino
          namespace: default
        spec:
          coordinators:
            roleGroups:
              default: {}
          workers:
            roleGroups:
              default: {}
        "#;
        let trino: TrinoCluster = serde_yaml::from_str(input).expect("illegal test input");
        let rolegroup_ref = role.rolegroup_ref(&trino, "default");
        let affinity: StackableAffinity = trino
            .effective_config(&role, &rolegroup_ref)
            .expect("default config must be valid")
            .config
            .affinity;

        let anti_affinity = affinity
            .pod_anti_affinity
            .and_then(|paa| paa.preferred_during_scheduling_ignored_during_execution)
            .expect("pod anti affinity must be set");
        assert_eq!(anti_affinity.len(), 1);
        assert_eq!(anti_affinity[0].weight, 70);
        let term = &anti_affinity[0].pod_affinity_term;
        assert_eq!(term.topology_key, "kubernetes.io/hostname");
        assert_eq!(
            term.label_selector
                .as_ref()
                .and_then(|selector| selector.match_labels.clone()),
            Some(BTreeMap::from([
                ("app.kubernetes.io/name".to_string(), "trino".to_string()),
                (
                    "app.kubernetes.io/instance".to_string(),
                    "simple-trino".to_string(),
                ),
                ("app.kubernetes.io/component".to_string(), role.to_string()),
            ]))
        );

        let pod_affinity = affinity
            .pod_affinity
            .and_then(|pa| pa.preferred_during_scheduling_ignored_during_execution)
            .expect("pod affinity must be set");
        assert_eq!(pod_affinity.len(), 1);
        assert_eq!(pod_affinity[0].weight, 20);
        assert!(affinity.node_affinity.is_none());
    }
}
