pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod family;
pub mod index;
pub mod model;
pub mod mutation;
pub mod progress;
pub mod scanner;
pub mod session;
pub mod storage;

pub use classify::{Classifier, MatchLevel, MatchResult, Verdict};
pub use config::{AppConfig, ClassifyConfig};
pub use engine::{SessionStats, TriageEngine};
pub use error::{Error, Result};
pub use extract::{ExtractError, Extractor, SfntExtractor};
pub use family::{group_by_family, summarize_families, summarize_group, FamilySummary};
pub use index::{BuildReport, IndexMeta, IndexStore, ReferenceIndex};
pub use model::{CandidateId, CandidateRecord, FontFormat, FontMetadata, ReferenceRecord};
pub use mutation::{
    ApplyReport, FsPermissionBroker, ItemOutcome, MutationQueue, Permission, PermissionBroker,
};
pub use progress::{CancelToken, Phase, ProgressEvent, ProgressReporter, SilentReporter};
pub use session::TriageSession;
pub use storage::{RecordStore, SqliteStore};
