//! Lookup pipeline services

pub mod batch_scheduler;
pub mod bulk_remark;
pub mod export;
pub mod lookup_orchestrator;
pub mod normalizer;
pub mod query_engine;
pub mod record_transformer;
pub mod remote_fetcher;
pub mod summary;

pub use batch_scheduler::{partition, Batch, BatchOutcome, BatchProgress, BatchScheduler, SchedulerConfig};
pub use bulk_remark::{canonical_remark, parse_bulk_remarks, BulkRemarkError, RemarkEdit};
pub use export::{export_columns, write_csv, ExportError, ExportFormat};
pub use lookup_orchestrator::{
    BulkRemarkLine, BulkRemarkReport, BulkRemarkStatus, LookupError, LookupService, SharedSession,
    StartedLookup,
};
pub use normalizer::{clean_identifier, normalize, IdentifierSet};
pub use query_engine::{FacetValue, QueryEngine};
pub use record_transformer::{transform, RecordTransformer};
pub use remote_fetcher::{BatchFetcher, FetchError, MonitoringClient, RemarkWriter};
pub use summary::{summarize, LookupSummary};
