//! # Upsell Advisor
//!
//! An LLM-backed analysis service for e-commerce stores.
//!
//! Upsell Advisor loads a store owner's products, orders, cart events,
//! campaigns, and upsell rules from Supabase, asks a hosted language model
//! for insights, rule suggestions, campaign suggestions, and priority
//! actions, and returns them as strictly-shaped JSON over HTTP and a CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────────────────────┐   ┌───────────┐
//! │  Supabase    │──▶│ upsell-advisor-core             │◀──│ Groq /    │
//! │  (PostgREST) │   │ summarize → prompt → recover →  │   │ OpenAI    │
//! └──────────────┘   │ normalize                       │   └───────────┘
//!                    └───────────────┬─────────────────┘
//!                      ┌─────────────┤
//!                      ▼             ▼
//!                 ┌──────────┐  ┌──────────┐
//!                 │   CLI    │  │   HTTP   │
//!                 │(advisor) │  │  (axum)  │
//!                 └──────────┘  └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! advisor status                               # check collaborators
//! advisor analyze --user-id u1 --data demo.json
//! advisor serve                                # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`logging`] | Tracing subscriber setup |
//! | [`context`] | Start-up collaborator wiring |
//! | [`llm`] | OpenAI-compatible chat completion client |
//! | [`supabase`] | Supabase REST record store |
//! | [`analyze`] | Request validation and analysis entry point |
//! | [`server`] | HTTP server |
//! | [`status`] | `advisor status` table |

pub mod analyze;
pub mod config;
pub mod context;
pub mod llm;
pub mod logging;
pub mod server;
pub mod status;
pub mod supabase;
