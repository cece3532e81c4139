pub mod config;
pub mod models;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

pub use config::{ConfigError, DoctriageConfig};
pub use models::{CategoryLabel, DecisionSource, ExtractionMethod, ExtractionOutcome};
pub use pipeline::classification::{
    load_classifier, ClassificationArbiter, ClassificationResult, DocumentModel, KeywordTable,
};
pub use pipeline::extraction::{ExtractedText, ExtractionPipeline};
pub use pipeline::processor::{DocumentProcessor, ProcessedDocument, ProcessingError};

/// Install the fmt subscriber. `RUST_LOG` wins over the built-in filter.
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();

    tracing::debug!("{} v{} logging initialized", config::APP_NAME, config::APP_VERSION);
}
