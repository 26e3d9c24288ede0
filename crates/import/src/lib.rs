pub mod csv;
pub mod dedup;
pub mod normalizer;
pub mod pipeline;
pub mod rules;

pub use csv::{import_csv, CsvColumnMapping, CsvError, CsvImportProfile};
pub use dedup::{filter_duplicates, DedupOutcome, DedupPolicy};
pub use normalizer::{normalize, RemittanceField};
pub use pipeline::{IngestError, IngestOutcome, IngestSource, IngestionPipeline};
pub use rules::{match_rate, RuleApplication, RuleMatchingEngine, RuleRunSummary, RuleSetError};
