//! HTTP request handlers for REST endpoints

pub mod diagnoses;
pub mod status;
