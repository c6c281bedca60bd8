//! Review workflow services

pub mod annotation_service;
pub mod ingest;
pub mod prediction_store;
pub mod read_models;
pub mod review_state;
pub mod seed_loader;

pub use annotation_service::{
    AnnotationOutcome, AnnotationService, AnnotationSubmission, ReviewerIdentity,
};
pub use ingest::{validate_image, CreatedCase, IngestService, ScoredArtifact, UploadOptions};
pub use review_state::{ReviewEvent, ReviewStatus};
pub use seed_loader::{load_seed_dir, CollectionReport, SeedReport};
