pub mod artifacts;
pub mod io;

pub use artifacts::{ArtifactStore, ExecutionMarker, RunSummary, StagedArtifacts};
