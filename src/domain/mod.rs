pub mod error;
pub mod model;
pub mod workflow;

pub use error::AppError;
pub use model::{DownloadPlan, DownloadRequest, Format, Metadata, Thumbnail};
pub use workflow::{DownloadWorkflow, RequestToken, Selection, WorkflowState};
