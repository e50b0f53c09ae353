pub mod catalog;
pub mod sources;
