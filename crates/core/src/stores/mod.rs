pub mod local;
pub mod qdrant;

pub use local::LocalIndexStore;
pub use qdrant::QdrantStore;
