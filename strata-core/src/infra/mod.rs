//! Default adapters for the engine ports: local filesystem crawl and probe,
//! in-memory persistence and registry.

pub mod fs;
pub mod memory;

pub use fs::{FsCrawler, FsProbe, classify_file};
pub use memory::{
    InMemoryRegistry, InMemoryRepository, NoopMetadataPipeline,
    StaticLibraryRoots,
};
