use metascrape_core::models::{Extraction, Field};

/// Fields that recorded at least one failure, in order of occurrence.
pub fn failed_fields(extraction: &Extraction) -> Vec<Field> {
    extraction.failures.iter().map(|f| f.field).collect()
}

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("metascrape=debug")
        .with_test_writer()
        .try_init();
}
