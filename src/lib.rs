//! Islamic Finance Advisor
//!
//! Advisory backend for personal finance under Islamic principles:
//! - Classifies transactions and investments for Sharia compliance
//! - Computes budgets, savings metrics and zakat deterministically
//! - Ranks Islamic banking products against goals and risk appetite
//! - Allocates limited savings across goals by priority
//! - Narrates advice through a remote model, with template fallback
//!
//! ADVISORY LOOP:
//! PROFILE → METRICS → OPTIMIZE → NARRATE (REMOTE | FALLBACK) → PRODUCTS

pub mod advisor;
pub mod api;
pub mod budget;
pub mod catalog;
pub mod classifier;
pub mod compliance;
pub mod config;
pub mod error;
pub mod gemini;
pub mod memory;
pub mod metrics;
pub mod models;
pub mod optimizer;
pub mod remote;
pub mod store;

pub use error::{AdvisorError, Result};

// Re-export common types
pub use advisor::Advisor;
pub use classifier::{Intent, IntentClassifier};
pub use config::AdvisorConfig;
pub use models::*;
