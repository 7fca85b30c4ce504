//! Ensures that `Pod`s are configured and running for each [`TrinoCluster`]
use std::{sync::Arc, time::Duration};

use snafu::{ResultExt, Snafu};
use stackable_operator::{
    kube::{runtime::controller::Action, ResourceExt},
    logging::controller::ReconcilerError,
    role_utils::RoleGroupRef,
};
use strum::{EnumDiscriminants, IntoEnumIterator, IntoStaticStr};
use tracing::info;

use crate::{
    authentication::{self, TrinoAuthenticators},
    config_map::{ClusterConfigMapsBuilder, RoleGroupConfigBuilder},
    crd::{self, TrinoCluster, TrinoRole},
    merge,
    operations::pdb::PdbBuilder,
    platform::{self, Platform},
    product_logging,
    reconciler::{
        self,
        conditions::{
            CONDITION_PROGRESSING, REASON_RECONCILE_COMPLETE, REASON_RECONCILE_FAILED,
            REASON_RECONCILING,
        },
        ReconcileResult, Reconciler, ResourceBuilder,
    },
    secret,
    service::{RoleGroupServiceBuilder, RoleServiceBuilder},
    statefulset::StatefulSetBuilder,
};

pub struct Ctx {
    pub platform: Box<dyn Platform>,
    pub cluster_domain: String,
}

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    #[snafu(display("failed to compose the authentication configuration"))]
    ComposeAuthentication { source: authentication::Error },

    #[snafu(display("authentication requires TLS to be enabled on the cluster"))]
    AuthenticationWithoutTls,

    #[snafu(display("failed to resolve the vector aggregator address"))]
    ResolveVectorAggregatorAddress { source: product_logging::Error },

    #[snafu(display("invalid coordinator configuration"))]
    InvalidCoordinators { source: crd::Error },

    #[snafu(display("failed to reconcile the internal shared secret"))]
    ReconcileSharedSecret { source: secret::Error },

    #[snafu(display("failed to apply the catalog and schema ConfigMaps"))]
    ApplyClusterConfigMaps { source: reconciler::Error },

    #[snafu(display("failed to resolve the configuration of {rolegroup}"))]
    ResolveConfig {
        source: merge::Error,
        rolegroup: RoleGroupRef<TrinoCluster>,
    },

    #[snafu(display("failed to apply objects of {rolegroup}"))]
    ApplyRoleGroup {
        source: reconciler::Error,
        rolegroup: RoleGroupRef<TrinoCluster>,
    },

    #[snafu(display("failed to apply the {role} Service"))]
    ApplyRoleService {
        source: reconciler::Error,
        role: TrinoRole,
    },

    #[snafu(display("failed to apply the {role} PodDisruptionBudget"))]
    ApplyPdb {
        source: reconciler::Error,
        role: TrinoRole,
    },

    #[snafu(display("failed to delete orphaned objects"))]
    DeleteOrphanedObjects { source: reconciler::Error },

    #[snafu(display("failed to update status"))]
    ApplyStatus { source: platform::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

impl ReconcilerError for Error {
    fn category(&self) -> &'static str {
        ErrorDiscriminants::from(self).into()
    }
}

pub async fn reconcile_trino(trino: Arc<TrinoCluster>, ctx: Arc<Ctx>) -> Result<Action> {
    tracing::info!("Starting reconcile");

    let result = reconcile_cluster(&trino, ctx.platform.as_ref(), &ctx.cluster_domain).await?;
    Ok(match result.requeue_after {
        Some(requeue_after) => Action::requeue(requeue_after),
        None => Action::await_change(),
    })
}

pub fn error_policy(_trino: Arc<TrinoCluster>, _error: &Error, _ctx: Arc<Ctx>) -> Action {
    Action::requeue(Duration::from_secs(5))
}

/// One reconcile pass over all objects of the cluster. Stops at the first object that needs the
/// cluster to be requeued, and only cleans up orphans after a pass that got through completely.
#[tracing::instrument(skip_all, fields(trino = %trino.name_any()))]
pub async fn reconcile_cluster(
    trino: &TrinoCluster,
    platform: &dyn Platform,
    cluster_domain: &str,
) -> Result<ReconcileResult> {
    if trino.spec.cluster_operation.reconciliation_paused {
        info!("reconciliation is paused, nothing to do");
        return Ok(ReconcileResult::done());
    }

    let mut reconciler = Reconciler::new(platform, trino);
    if reconciler.status.is_new_generation() {
        reconciler.status.set(
            CONDITION_PROGRESSING,
            true,
            REASON_RECONCILING,
            "reconciling the cluster",
        );
    }

    let outcome = reconcile_objects(&mut reconciler, platform, trino, cluster_domain).await;
    if let Err(error) = &outcome {
        reconciler.status.set(
            CONDITION_PROGRESSING,
            false,
            REASON_RECONCILE_FAILED,
            &error_message(error),
        );
    }

    if reconciler.status.changed() {
        platform
            .update_status(trino, &reconciler.status.status())
            .await
            .context(ApplyStatusSnafu)?;
    }
    outcome
}

/// Applies everything and cleans up orphans once a pass got through without a requeue.
async fn reconcile_objects(
    reconciler: &mut Reconciler<'_>,
    platform: &dyn Platform,
    trino: &TrinoCluster,
    cluster_domain: &str,
) -> Result<ReconcileResult> {
    let result = apply_objects(reconciler, platform, trino, cluster_domain).await?;
    if result.is_requeue() {
        if reconciler.status.last_pass_failed() {
            reconciler.status.set(
                CONDITION_PROGRESSING,
                true,
                REASON_RECONCILING,
                "reconciling the cluster",
            );
        }
    } else {
        reconciler
            .delete_orphans()
            .await
            .context(DeleteOrphanedObjectsSnafu)?;
        reconciler.status.set(
            CONDITION_PROGRESSING,
            false,
            REASON_RECONCILE_COMPLETE,
            "all objects are up to date",
        );
    }
    Ok(result)
}

/// The error and all of its causes, the status is the only place users see them.
fn error_message(error: &Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

async fn apply_objects(
    reconciler: &mut Reconciler<'_>,
    platform: &dyn Platform,
    trino: &TrinoCluster,
    cluster_domain: &str,
) -> Result<ReconcileResult> {
    if trino.authentication_enabled() && !trino.tls_enabled() {
        return AuthenticationWithoutTlsSnafu.fail();
    }
    let authenticators =
        authentication::compose(platform, &trino.spec.cluster_config.authentication)
            .await
            .context(ComposeAuthenticationSnafu)?;

    let vector_aggregator_address =
        product_logging::resolve_vector_aggregator_address(trino, platform)
            .await
            .context(ResolveVectorAggregatorAddressSnafu)?;

    trino
        .coordinator_rolegroup_ref()
        .context(InvalidCoordinatorsSnafu)?;

    let result = secret::reconcile_internal_shared_secret(reconciler, platform, trino)
        .await
        .context(ReconcileSharedSecretSnafu)?;
    if result.is_requeue() {
        return Ok(result);
    }

    let result = reconciler
        .reconcile_multi(&ClusterConfigMapsBuilder::new(trino))
        .await
        .context(ApplyClusterConfigMapsSnafu)?;
    if result.is_requeue() {
        return Ok(result);
    }

    for role in TrinoRole::iter() {
        for role_group in trino.role(&role).role_groups.keys() {
            let rolegroup_ref = role.rolegroup_ref(trino, role_group);
            let result = apply_role_group(
                reconciler,
                trino,
                role,
                &rolegroup_ref,
                &authenticators,
                vector_aggregator_address.as_deref(),
                cluster_domain,
            )
            .await?;
            if result.is_requeue() {
                return Ok(result);
            }
        }
    }

    let result = reconciler
        .reconcile(&RoleServiceBuilder::new(trino, TrinoRole::Coordinator))
        .await
        .context(ApplyRoleServiceSnafu {
            role: TrinoRole::Coordinator,
        })?;
    if result.is_requeue() {
        return Ok(result);
    }

    for role in TrinoRole::iter() {
        if trino.role(&role).role_groups.is_empty() {
            continue;
        }
        let Some(pdb) = PdbBuilder::new(trino, role) else {
            continue;
        };
        let result = reconciler
            .reconcile(&pdb)
            .await
            .context(ApplyPdbSnafu { role })?;
        if result.is_requeue() {
            return Ok(result);
        }
    }

    Ok(ReconcileResult::done())
}

/// Configuration, headless Service and StatefulSet of a role group, in this order.
async fn apply_role_group(
    reconciler: &mut Reconciler<'_>,
    trino: &TrinoCluster,
    role: TrinoRole,
    rolegroup_ref: &RoleGroupRef<TrinoCluster>,
    authenticators: &TrinoAuthenticators,
    vector_aggregator_address: Option<&str>,
    cluster_domain: &str,
) -> Result<ReconcileResult> {
    let effective = trino
        .effective_config(&role, rolegroup_ref)
        .with_context(|_| ResolveConfigSnafu {
            rolegroup: rolegroup_ref.clone(),
        })?;

    let builders: Vec<Box<dyn ResourceBuilder + '_>> = vec![
        Box::new(RoleGroupConfigBuilder {
            trino,
            role,
            rolegroup_ref,
            effective: &effective,
            authenticators,
            vector_aggregator_address,
            cluster_domain,
        }),
        Box::new(RoleGroupServiceBuilder::new(trino, rolegroup_ref)),
        Box::new(StatefulSetBuilder {
            trino,
            role,
            rolegroup_ref,
            effective: &effective,
            authenticators,
            vector_aggregator_address,
        }),
    ];

    for builder in &builders {
        let result = reconciler
            .reconcile(builder.as_ref())
            .await
            .with_context(|_| ApplyRoleGroupSnafu {
                rolegroup: rolegroup_ref.clone(),
            })?;
        if result.is_requeue() {
            return Ok(result);
        }
    }
    Ok(ReconcileResult::done())
}
