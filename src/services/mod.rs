pub mod dataset;
pub mod extraction;
pub mod file_registry;
pub mod object_store;
pub mod worker;
