pub mod artifact;
pub mod bundle;
pub mod manifest;
pub mod note;
pub mod role;
pub mod submission;

pub use artifact::{ArtifactSet, DecisionRecord, RebuttalRecord, ReviewRecord, SubmissionMetadata};
pub use bundle::{BundleSection, DocumentBundle, SectionLabel};
pub use manifest::{ExportManifest, ExportOutcome, FailureKind, ManifestCounts, ManifestEntry, TaskOutcome};
pub use note::{Edge, Group, Note, Profile};
pub use role::{AcceptanceStatus, ArtifactKind, AssignmentSource, Role, RoleProfile};
pub use submission::{ResolveFilters, SubmissionRef};
