pub mod export_flow;
pub mod submission_ctx;

pub use export_flow::ExportFlow;
pub use submission_ctx::SubmissionCtx;
