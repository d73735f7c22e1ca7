//! Runme Engine - Identity Lifecycle & Save Orchestration
//!
//! Drives a notebook save end to end:
//! - Policy evaluation against the lifecycle identity setting
//! - Identity assignment with collision checks
//! - Save orchestration with per-document in-flight tracking
//! - Async storage edge and session outputs documents
//! - Environment configuration and tracing setup
//!
//! Architecture:
//! ```text
//! Save trigger (text or DocumentStore)
//!     ↓
//! Parser (runme-markdown)
//!     ↓
//! Policy Evaluator (LifecycleSetting → IdentityPlan)
//!     ↓
//! Identity Assignment (IdentityGenerator, collision check)
//!     ↓
//! Printer (runme-markdown)
//!     ↓
//! SaveOutcome → DocumentStore::write (only when changed)
//! ```

pub mod assign;
pub mod config;
pub mod orchestrator;
pub mod policy;
pub mod store;
pub mod telemetry;

pub use assign::{apply_plan, AssignedIdentities, MAX_GENERATION_ATTEMPTS};
pub use config::{ConfigError, EngineConfig, LogFormat};
pub use orchestrator::{SaveError, SaveOrchestrator, SaveOutcome, SaveState};
pub use policy::{evaluate, IdentityPlan};
pub use store::{
    outputs_path, relative_path, DocumentKey, DocumentStore, FsDocumentStore, MemoryDocumentStore, StoreError,
};
pub use telemetry::{init_tracing, TelemetryConfig, TelemetryError};
