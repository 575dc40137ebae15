pub mod workflow;

pub use workflow::{InMemoryWorkflowStore, WorkflowStore};
