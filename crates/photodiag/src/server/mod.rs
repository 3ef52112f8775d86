//! Diagnosis service
//!
//! Core engine (embedding, similarity retrieval, feedback ledger, generation
//! and validation reconciliation) plus the axum REST surface that exposes it.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routing;
pub mod services;
pub mod startup;
pub mod types;
