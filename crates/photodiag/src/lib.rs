//! Photodiag - Retrieval-Grounded Photo Diagnosis
//!
//! Generates short technical diagnoses for inspection photographs with a
//! vision-capable model, grounding every generation in human-validated prior
//! descriptions retrieved by semantic similarity.

pub mod cli;
pub mod server;
