//! Revue Timeline - Edit list resolution
//!
//! Turns an ordered set of media sources into one logical timeline:
//! - Flattened edit lists with frame and time arithmetic
//! - Media source collaborators and per-source resolver tasks
//! - Frame/time map aggregation with blank-frame substitution
//! - The edit list actor and its cloneable handle

pub mod actor;
pub mod aggregate;
pub mod edit_list;
pub mod source;
pub mod synthetic;

pub use actor::{EditListActor, EditListHandle, TimelineEvent};
pub use aggregate::{BuildStep, FrameMapBuilder, SourceTable};
pub use edit_list::{EditList, EditListSection};
pub use source::{MediaSource, SourceResolver, SourceResolverHandle};
pub use synthetic::{SyntheticSource, SyntheticSourceBuilder, SyntheticStats};
