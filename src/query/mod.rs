// Query execution: the storage-aware slice of an iterator-pipeline
// executor tree, plus the minimal physical planner it needs.

pub mod executor;
pub mod planner;
