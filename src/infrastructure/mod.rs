pub mod pdf_text;
pub mod retry_policy;

pub use pdf_text::{PdfExtractor, PdfText, TextExtractor};
pub use retry_policy::RetryPolicy;
