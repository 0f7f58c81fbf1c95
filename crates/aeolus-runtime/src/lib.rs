//! Design-option evaluation: geometry cache, collaborator contracts and the run loop.
#![forbid(unsafe_code)]

mod cache;
mod error;
mod option;
mod orchestrator;
pub mod retry;
pub mod score;
mod services;

pub use cache::{GeometryCache, GeometryCacheStats, GeometryKey};
pub use error::{
    AnalysisServiceError, FetchError, GenerationServiceError, OptionError, RunError, Stage,
    StageError, StorageError,
};
pub use option::{DesignOption, GeometryParams, OptionResult};
pub use orchestrator::{
    Collaborators, FailurePolicy, Orchestrator, RunReport, RunSettings, default_workers, place,
};
pub use retry::RetryPolicy;
pub use score::ScoreOrder;
pub use services::{
    AnalysisRequest, AssetKind, FullResultsSink, GeometryGenerationService, Heatmap,
    MeshBlob, MeshFetchService, TopNSink, WindComfortAnalysisService, WindDirection, WindRose,
};
