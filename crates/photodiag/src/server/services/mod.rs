//! Business logic services for the diagnosis engine

pub mod embeddings;
pub mod generator;
pub mod grounding;
#[cfg(feature = "lancedb")]
pub mod lancedb;
pub mod ledger;
pub mod openai;
pub mod reconciler;
pub mod similarity_index;
pub mod storage;
pub mod vision;
