//! Review database repositories
//!
//! Single-statement reads and writes accept any `SqliteExecutor` so they run
//! against the pool or inside a unit of work. Multi-step operations take a
//! `&mut SqliteConnection`.

pub mod annotations;
pub mod artifacts;
pub mod cases;
pub mod labels;
pub mod model_runs;
pub mod predictions;
pub mod reviewers;
pub mod subjects;

pub use annotations::{Annotation, AnnotationUpsert};
pub use artifacts::{Artifact, NewArtifact};
pub use cases::Case;
pub use labels::{EnsureLabel, Label};
pub use model_runs::{ModelRun, ModelRunByName};
pub use predictions::{Prediction, PredictionUpsert};
pub use reviewers::{Reviewer, ReviewerByEmail};
pub use subjects::Subject;
