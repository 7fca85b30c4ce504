use snafu::{OptionExt, ResultExt, Snafu};
use stackable_operator::{
    k8s_openapi::apimachinery::pkg::api::resource::Quantity,
    memory::{BinaryMultiple, MemoryQuantity},
};

use crate::crd::{
    TrinoConfig, JVM_SECURITY_PROPERTIES, RW_CONFIG_DIR_NAME, STACKABLE_CLIENT_TLS_DIR,
    STACKABLE_TLS_STORE_PASSWORD,
};

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("no memory limit configured"))]
    MissingMemoryLimit,

    #[snafu(display("failed to parse memory limit {value:?}, a binary suffix like Mi or Gi is required"))]
    InvalidMemoryLimit {
        source: stackable_operator::error::Error,
        value: String,
    },

    #[snafu(display("memory limit {value:?} is too small for a JVM heap, at least 1Ki is required"))]
    MemoryLimitTooSmall { value: String },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Units of the heap size, largest first, with the smallest limit in KiB that selects them.
const HEAP_UNITS: [(BinaryMultiple, f32, &str); 3] = [
    (BinaryMultiple::Gibi, 1024.0 * 1024.0 * 1024.0, "G"),
    (BinaryMultiple::Mebi, 1024.0 * 1024.0, "M"),
    (BinaryMultiple::Kibi, 1.0, "K"),
];

fn parse_memory_limit(limit: &Quantity) -> Result<MemoryQuantity> {
    // a plain number is a byte count
    if let Ok(bytes) = limit.0.trim().parse::<f32>() {
        return Ok(MemoryQuantity {
            value: bytes / 1024.0,
            unit: BinaryMultiple::Kibi,
        });
    }
    MemoryQuantity::try_from(limit).context(InvalidMemoryLimitSnafu { value: &limit.0 })
}

/// Heap size in the format of `-Xmx`. The unit follows the size of the memory limit, the value
/// is floored and at least 1.
pub fn heap_size(memory_limit: &Quantity, heap_factor: f32) -> Result<String> {
    let limit = parse_memory_limit(memory_limit)?.scale_to(BinaryMultiple::Kibi);
    let (unit, _, suffix) = HEAP_UNITS
        .iter()
        .find(|(_, threshold, _)| limit.value >= *threshold)
        .context(MemoryLimitTooSmallSnafu {
            value: &memory_limit.0,
        })?;

    let heap = (limit.scale_to(*unit).value * heap_factor).floor().max(1.0) as u64;
    Ok(format!("{heap}{suffix}"))
}

pub fn jvm_config(config: &TrinoConfig, heap_factor: f32) -> Result<String> {
    let memory_limit = config
        .resources
        .memory
        .limit
        .as_ref()
        .context(MissingMemoryLimitSnafu)?;
    let heap = heap_size(memory_limit, heap_factor)?;

    let heap_flags = [format!("-Xms{heap}"), format!("-Xmx{heap}")];
    let vm_flags = [
        "-XX:InitialRAMPercentage=80",
        "-XX:MaxRAMPercentage=80",
        "-XX:G1HeapRegionSize=32M",
        "-XX:+ExplicitGCInvokesConcurrent",
        "-XX:+ExitOnOutOfMemoryError",
        "-XX:+HeapDumpOnOutOfMemoryError",
        "-XX:-OmitStackTraceInFastThrow",
        "-XX:ReservedCodeCacheSize=512M",
        "-XX:PerMethodRecompilationCutoff=10000",
        "-XX:PerBytecodeRecompilationCutoff=10000",
    ];
    let system_properties = [
        ("jdk.attach.allowAttachSelf", "true".to_string()),
        ("jdk.nio.maxCachedBufferSize", "2000000".to_string()),
        ("file.encoding", "UTF-8".to_string()),
        (
            "javax.net.ssl.trustStore",
            format!("{STACKABLE_CLIENT_TLS_DIR}/truststore.p12"),
        ),
        (
            "javax.net.ssl.trustStorePassword",
            STACKABLE_TLS_STORE_PASSWORD.to_string(),
        ),
        ("javax.net.ssl.trustStoreType", "pkcs12".to_string()),
        (
            "java.security.properties",
            format!("{RW_CONFIG_DIR_NAME}/{JVM_SECURITY_PROPERTIES}"),
        ),
    ];

    let mut lines = vec!["-server".to_string()];
    lines.extend(heap_flags);
    lines.extend(vm_flags.iter().map(|flag| flag.to_string()));
    lines.extend(
        system_properties
            .iter()
            .map(|(key, value)| format!("-D{key}={value}")),
    );
    Ok(lines.into_iter().map(|line| line + "\n").collect())
}
