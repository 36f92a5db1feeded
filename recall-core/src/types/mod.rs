//! Common types used across the engine.

mod contradiction;
mod entity;
mod foreshadow;
mod record;
mod relation;

pub use contradiction::{Contradiction, ContradictionKind, ResolutionStrategy};
pub use entity::{Entity, EntityType};
pub use foreshadow::{ForeshadowDetector, ForeshadowStatus, Foreshadowing};
pub use record::{ContentType, MemoryRecord, RecordMetadata};
pub use relation::{BitemporalStamp, Relation, RelationType, TimeRange};
