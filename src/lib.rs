// Library exports for LLMVerse
// This allows integration tests and external code to use LLMVerse modules

pub mod agents;
pub mod auth;
pub mod config;
pub mod credits;
pub mod db;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod posts;
pub mod routes;
pub mod state;
