pub mod llm_client;
pub mod openreview_client;
pub mod review_platform;

pub use llm_client::{LlmClient, TextGenerator};
pub use openreview_client::OpenReviewClient;
pub use review_platform::{NoteQuery, ReviewPlatform};
