//! Revue Color - Cached colour pipeline computation.
//!
//! Turns resolved frame descriptors into the colour data a renderer needs:
//! - Backends that build shader operations and LUTs (`ColourBackend`)
//! - A bounded, shared cache keyed by content and colour parameters
//! - Round-robin worker pools for the expensive setup and for thumbnails
//! - A per-viewport coordinator with builtin-backend fallback

pub mod backend;
pub mod builtin;
pub mod cache;
pub mod coordinator;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod registry;
pub mod transfer;

pub use backend::{ColourBackend, SharedBackend};
pub use builtin::{BackendStats, BuiltinBackend};
pub use cache::{ColourCache, ColourCacheActor, ColourCacheHandle};
pub use coordinator::{ColourCoordinatorHandle, ColourPipelineCoordinator};
pub use data::{
    ColourLut, ColourOperation, ColourPipelineData, OperationStage, SharedColourData,
    ThumbnailBuffer,
};
pub use error::{ColourError, ColourResult};
pub use pipeline::{ColourPipeline, ColourPipelineHandle};
pub use pool::WorkerPool;
pub use registry::{BackendInit, BackendRegistry, StaticBackendRegistry};
pub use transfer::{Direction, TransferFunction};
