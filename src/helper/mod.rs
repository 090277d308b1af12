pub mod admin_helpers;
pub mod approval_helpers;
pub mod generation_helpers;
pub mod public_helpers;
pub mod sanitization_helpers;
pub mod scheduler_helpers;
pub mod topic_helpers;
pub mod workflow_helpers;
