//! # Ainstein Library
//!
//! Multi-tenant AI content generation platform: tenants manage pages and
//! prompt templates, and generate SEO content through an LLM provider with
//! per-tenant token accounting.

pub mod ai;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod generation_executor;
pub mod handlers;
pub mod mail;
pub mod models;
pub mod repositories;
pub mod seeds;
pub mod server;
pub mod settings;
pub mod telemetry;
pub mod templating;
pub mod usage_reset;
pub mod validation;
pub use migration;
