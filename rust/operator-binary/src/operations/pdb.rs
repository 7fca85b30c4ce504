use snafu::{ResultExt, Snafu};
use stackable_operator::{
    builder::pdb::PodDisruptionBudgetBuilder, commons::pdb::PdbConfig,
    k8s_openapi::api::policy::v1::PodDisruptionBudget,
};

use crate::{
    crd::{TrinoCluster, TrinoRole, APP_NAME, CONTROLLER_NAME, OPERATOR_NAME},
    platform::ManagedObject,
    reconciler::{BoxedError, DesiredObject, ResourceBuilder},
};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("cannot create PodDisruptionBudget for role [{role}]"))]
    CreatePdb {
        source: stackable_operator::builder::pdb::Error,
        role: TrinoRole,
    },
}

/// One PodDisruptionBudget per role, unless disabled.
pub struct PdbBuilder<'a> {
    trino: &'a TrinoCluster,
    role: TrinoRole,
    pdb: &'a PdbConfig,
}

impl<'a> PdbBuilder<'a> {
    /// `None` if the role opted out of a PodDisruptionBudget.
    pub fn new(trino: &'a TrinoCluster, role: TrinoRole) -> Option<Self> {
        let pdb = &trino.role(&role).role_config.pod_disruption_budget;
        pdb.enabled.then_some(Self { trino, role, pdb })
    }

    fn build_pdb(&self) -> Result<PodDisruptionBudget, Error> {
        let max_unavailable = self
            .pdb
            .max_unavailable
            .unwrap_or_else(|| default_max_unavailable(self.role, self.trino.num_workers()));

        Ok(PodDisruptionBudgetBuilder::new_with_role(
            self.trino,
            APP_NAME,
            &self.role.to_string(),
            OPERATOR_NAME,
            CONTROLLER_NAME,
        )
        .context(CreatePdbSnafu { role: self.role })?
        .with_max_unavailable(max_unavailable)
        .build())
    }
}

impl ResourceBuilder for PdbBuilder<'_> {
    fn build(&self) -> Result<DesiredObject, BoxedError> {
        Ok(DesiredObject::General(ManagedObject::PodDisruptionBudget(
            self.build_pdb()?,
        )))
    }
}

/// A single coordinator may be down. For workers a tenth of them, but never zero so nodes can
/// still be drained.
fn default_max_unavailable(role: TrinoRole, num_workers: u16) -> u16 {
    match role {
        TrinoRole::Coordinator => 1,
        TrinoRole::Worker => (num_workers / 10).max(1),
    }
}
