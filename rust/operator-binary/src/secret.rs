//! The secret Trino nodes use to authenticate each other. It is generated once and never rotated.

use std::collections::BTreeMap;

use openssl::{base64, rand::rand_bytes};
use snafu::{ResultExt, Snafu};
use stackable_operator::{
    k8s_openapi::{api::core::v1::Secret, apimachinery::pkg::apis::meta::v1::ObjectMeta},
    kvp::LabelError,
};
use tracing::debug;

use crate::{
    crd::{self, TrinoCluster, ENV_INTERNAL_SHARED_SECRET},
    platform::{self, ManagedObject, Platform},
    reconciler::{self, BoxedError, DesiredObject, ReconcileResult, Reconciler, ResourceBuilder},
};

const SHARED_SECRET_LENGTH: usize = 512;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("failed to build metadata of the internal shared secret"))]
    SecretMetadata { source: crd::Error },

    #[snafu(display("failed to build labels of the internal shared secret"))]
    SecretLabels { source: LabelError },

    #[snafu(display("failed to generate random bytes"))]
    GenerateRandom { source: openssl::error::ErrorStack },

    #[snafu(display("failed to look up the internal shared secret {name}"))]
    GetSecret {
        source: platform::Error,
        name: String,
    },

    #[snafu(display("failed to create the internal shared secret"))]
    CreateSecret { source: reconciler::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

pub struct SharedSecretBuilder<'a> {
    trino: &'a TrinoCluster,
}

impl<'a> SharedSecretBuilder<'a> {
    pub fn new(trino: &'a TrinoCluster) -> Self {
        Self { trino }
    }

    fn build_secret(&self) -> Result<Secret> {
        Ok(Secret {
            metadata: ObjectMeta {
                name: Some(self.trino.shared_secret_name().context(SecretMetadataSnafu)?),
                namespace: Some(self.trino.namespace_r().context(SecretMetadataSnafu)?),
                labels: Some(self.trino.cluster_labels().context(SecretLabelsSnafu)?.into()),
                ..ObjectMeta::default()
            },
            string_data: Some(BTreeMap::from([(
                ENV_INTERNAL_SHARED_SECRET.to_string(),
                random_secret()?,
            )])),
            ..Secret::default()
        })
    }
}

impl ResourceBuilder for SharedSecretBuilder<'_> {
    fn build(&self) -> Result<DesiredObject, BoxedError> {
        Ok(DesiredObject::General(ManagedObject::Secret(
            self.build_secret()?,
        )))
    }
}

fn random_secret() -> Result<String> {
    let mut buf = [0u8; SHARED_SECRET_LENGTH];
    rand_bytes(&mut buf).context(GenerateRandomSnafu)?;
    Ok(base64::encode_block(&buf))
}

/// Creates the shared secret unless it already exists. An existing secret is left untouched, so
/// running nodes keep talking to each other.
pub async fn reconcile_internal_shared_secret(
    reconciler: &mut Reconciler<'_>,
    platform: &dyn Platform,
    trino: &TrinoCluster,
) -> Result<ReconcileResult> {
    let name = trino.shared_secret_name().context(SecretMetadataSnafu)?;
    let namespace = trino.namespace_r().context(SecretMetadataSnafu)?;

    let existing = platform
        .get_secret(&namespace, &name)
        .await
        .context(GetSecretSnafu { name: &name })?;
    if existing.is_some() {
        debug!(name, "internal shared secret exists");
        return Ok(ReconcileResult::done());
    }

    reconciler
        .reconcile(&SharedSecretBuilder::new(trino))
        .await
        .context(CreateSecretSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{platform::memory::InMemoryPlatform, platform::ObjectKind};

    fn trino() -> TrinoCluster {
        let input = r#"
        apiVersion: trino.stackable.tech/v1alpha1
        kind: TrinoCluster
        metadata:
          name: simple-trino
          namespace: default
          uid: 6f3f2b1c-0000-4000-8000-000000000001
        spec: {}
        "#;
        serde_yaml::from_str(input).expect("illegal test input")
    }

    fn secret_value(platform: &InMemoryPlatform) -> String {
        let Some(ManagedObject::Secret(secret)) = platform.get(
            ObjectKind::Secret,
            "default",
            "simple-trino-internal-shared-secret",
        ) else {
            panic!("secret must exist");
        };
        secret
            .string_data
            .and_then(|mut data| data.remove(ENV_INTERNAL_SHARED_SECRET))
            .expect("secret has a value")
    }

    #[test]
    fn test_random_secret() {
        let first = random_secret().expect("random bytes");
        let second = random_secret().expect("random bytes");
        assert_ne!(first, second);
        // 512 bytes are 684 base64 characters
        assert_eq!(first.len(), 684);
    }

    #[tokio::test]
    async fn test_created_only_once() {
        let platform = InMemoryPlatform::new();
        let trino = trino();
        let mut reconciler = Reconciler::new(&platform, &trino);

        let result = reconcile_internal_shared_secret(&mut reconciler, &platform, &trino)
            .await
            .expect("secret is created");
        assert!(result.is_requeue());
        let value = secret_value(&platform);

        let result = reconcile_internal_shared_secret(&mut reconciler, &platform, &trino)
            .await
            .expect("secret exists");
        assert_eq!(result, ReconcileResult::done());
        assert_eq!(secret_value(&platform), value);
        let Some(ManagedObject::Secret(secret)) = platform.get(
            ObjectKind::Secret,
            "default",
            "simple-trino-internal-shared-secret",
        ) else {
            panic!("secret must exist");
        };
        assert_eq!(
            secret
                .metadata
                .labels
                .unwrap_or_default()
                .get("app.kubernetes.io/instance")
                .map(String::as_str),
            Some("simple-trino")
        );
        assert_eq!(platform.writes(), 1);
    }
}
