pub mod embeddings;
pub mod indexer;
pub mod vector_store;
