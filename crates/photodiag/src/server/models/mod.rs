//! Domain models shared by the services and the REST layer

pub mod context;
pub mod feedback;
pub mod photo;

pub use context::DiagnosticContext;
pub use feedback::{
  DiagnosisSummary, ExemplarUse, FeedbackMetadata, FeedbackRecord, Origin, RecordScope, Severity,
  SummaryUpdate,
};
pub use photo::PhotoReference;
