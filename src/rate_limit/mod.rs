//! Quota-Aware Rate Limiting Module
//!
//! This module gates calls to external marketing, CRM and ad platforms behind
//! per-customer quotas.
//!
//! # Features
//!
//! - Quota windows per `(platform, endpoint, customer)` with lazy expiry
//! - Atomic admission (reserve-then-release) safe under concurrent callers
//! - Strategy-based pacing (aggressive / balanced / conservative)
//! - Detection of platform throttling errors with retry hints
//! - Sequential batch execution with per-item failure isolation
//! - In-memory and JSON-file quota stores
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Rate Limiting Service                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐         │
//! │  │ Admission   │  │ Pacer       │  │ Error       │         │
//! │  │ (reserve)   │  │ (strategy)  │  │ Classifier  │         │
//! │  └─────────────┘  └─────────────┘  └─────────────┘         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │        Quota Store (In-Memory / JSON File)           │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod batch;
pub mod classifier;
pub mod config;
pub mod error;
pub mod file_store;
pub mod overview;
pub mod pacing;
pub mod report;
pub mod service;
pub mod store;
pub mod strategy;
pub mod timeout;
pub mod tracker;

pub use batch::{BatchItemResult, BatchResult, FailedRequest};
pub use config::{PlatformQuota, RateLimitConfig};
pub use error::{QuotaError, StoreError};
pub use file_store::JsonFileQuotaStore;
pub use overview::{CustomerOverview, CustomerQuotaStatus, OverviewBuilder};
pub use report::{ServiceStatus, TimingPlan, TimingRecommendation};
pub use service::RateLimitingService;
pub use store::{MemoryQuotaStore, QuotaStore, Reservation};
pub use strategy::Strategy;
pub use tracker::{QuotaTracker, TrackerKey};
