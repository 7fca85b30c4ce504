//! Kubernetes-standard status conditions of a [`TrinoCluster`].

use stackable_operator::k8s_openapi::{
    apimachinery::pkg::apis::meta::v1::{Condition, Time},
    chrono::Utc,
};

use crate::crd::{TrinoCluster, TrinoClusterStatus};

pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";

pub const CONDITION_PROGRESSING: &str = "Progressing";
pub const CONDITION_AVAILABLE: &str = "Available";

pub const REASON_RECONCILING: &str = "Reconciling";
pub const REASON_RECONCILE_COMPLETE: &str = "ReconcileComplete";
pub const REASON_RECONCILE_FAILED: &str = "ReconcileFailed";
pub const REASON_DEPLOYMENT_SATISFIED: &str = "DeploymentSatisfied";
pub const REASON_DEPLOYMENT_NOT_SATISFIED: &str = "DeploymentNotSatisfied";

/// Collects condition updates during a reconcile pass. The status only needs to be written if
/// [`StatusTracker::changed`] says so.
#[derive(Clone, Debug)]
pub struct StatusTracker {
    generation: Option<i64>,
    original: Vec<Condition>,
    conditions: Vec<Condition>,
}

impl StatusTracker {
    pub fn new(trino: &TrinoCluster) -> Self {
        let conditions = trino
            .status
            .as_ref()
            .map(|status| status.conditions.clone())
            .unwrap_or_default();
        Self {
            generation: trino.metadata.generation,
            original: conditions.clone(),
            conditions,
        }
    }

    pub fn get(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|condition| condition.type_ == condition_type)
    }

    /// Whether the current generation has not been observed by a finished reconcile yet.
    pub fn is_new_generation(&self) -> bool {
        self.get(CONDITION_PROGRESSING)
            .map_or(true, |condition| {
                condition.observed_generation != self.generation
            })
    }

    /// Sets or updates a condition, preserving lastTransitionTime when the status didn't change.
    pub fn set(&mut self, condition_type: &str, status: bool, reason: &str, message: &str) {
        let status = if status {
            CONDITION_TRUE
        } else {
            CONDITION_FALSE
        };
        let generation = self.generation;

        match self
            .conditions
            .iter_mut()
            .find(|condition| condition.type_ == condition_type)
        {
            Some(existing) => {
                if existing.status != status {
                    existing.status = status.to_string();
                    existing.last_transition_time = Time(Utc::now());
                }
                existing.reason = reason.to_string();
                existing.message = message.to_string();
                existing.observed_generation = generation;
            }
            None => self.conditions.push(Condition {
                type_: condition_type.to_string(),
                status: status.to_string(),
                reason: reason.to_string(),
                message: message.to_string(),
                observed_generation: generation,
                last_transition_time: Time(Utc::now()),
            }),
        }
    }

    /// Whether the last pass stopped with an error.
    pub fn last_pass_failed(&self) -> bool {
        self.get(CONDITION_PROGRESSING)
            .is_some_and(|condition| condition.reason == REASON_RECONCILE_FAILED)
    }

    pub fn changed(&self) -> bool {
        self.conditions != self.original
    }

    pub fn status(&self) -> TrinoClusterStatus {
        TrinoClusterStatus {
            conditions: self.conditions.clone(),
        }
    }
}
