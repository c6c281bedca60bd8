//! HTTP API handlers
//!
//! Handlers only parse requests and shape responses; the work happens in
//! `services`.

pub mod annotations;
pub mod health;
pub mod metadata;
pub mod predictions;
pub mod subjects;

pub use annotations::annotation_routes;
pub use health::health_routes;
pub use metadata::metadata_routes;
pub use predictions::prediction_routes;
pub use subjects::subject_routes;
