//! # Upsell Advisor Core
//!
//! Runtime-agnostic logic for Upsell Advisor: record models, the data
//! summarizer, prompt construction, the completion-client trait, the
//! LLM response recovery pipeline, record normalization, and the
//! record-store trait.
//!
//! Nothing here depends on an HTTP stack or an async runtime. The
//! `upsell-advisor` crate supplies the concrete collaborators (Supabase,
//! OpenAI-compatible completions) and the transport layer.
//!
//! ## Data Flow
//!
//! ```text
//! RecordSet ──▶ summarize ──▶ build_prompt ──▶ CompletionClient
//!                                                   │
//!                    caller ◀── normalize ◀── RecoveryPipeline
//! ```

pub mod analysis;
pub mod completion;
pub mod error;
pub mod models;
pub mod normalize;
pub mod prompt;
pub mod recovery;
pub mod store;
pub mod summarize;
