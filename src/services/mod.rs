pub mod artifact_fetcher;
pub mod assignment_resolver;
pub mod document_assembler;
pub mod export_cache;
pub mod meta_review_service;

pub use artifact_fetcher::ArtifactFetcher;
pub use assignment_resolver::AssignmentResolver;
pub use document_assembler::DocumentAssembler;
pub use export_cache::ExportCache;
pub use meta_review_service::{
    extract_recommendation, Evaluation, GenerationOptions, MetaReviewMode, MetaReviewService, Recommendation,
};
