pub mod flat;
pub mod qdrant;

pub use flat::FlatIndex;
pub use qdrant::QdrantIndex;
