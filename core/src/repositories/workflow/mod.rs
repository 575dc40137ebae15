pub mod r#trait {
    pub use super::trait_::*;
}
#[path = "trait.rs"]
mod trait_;
pub mod memory;

pub use memory::InMemoryWorkflowStore;
pub use r#trait::WorkflowStore;

#[cfg(test)]
mod tests;
