//! # Ad Censor
//!
//! Checks advertising materials (text and images) against Russian
//! advertising law using retrieval-augmented generation over a
//! user-curated knowledge base of regulation documents.
//!
//! Regulation documents (PDF, DOCX, TXT) are uploaded to a remote knowledge
//! service and indexed there. An assistant with a search tool over that
//! index answers compliance queries in a fixed report format. Images are
//! first described in text by a remote vision model.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────────┐
//! │  Documents  │──▶│ Index manager │──▶│ Knowledge svc  │
//! │ PDF/DOCX/TXT│   │  (upload)     │   │ files + index  │
//! └─────────────┘   └──────┬───────┘   └───────┬────────┘
//!                          │ dirty              │
//!                          ▼                    ▼
//! ┌─────────────┐   ┌──────────────┐   ┌────────────────┐
//! │  Ad image   │──▶│ Vision model  │──▶│   Assistant    │──▶ report
//! └─────────────┘   └──────────────┘   └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! adcensor docs add law/38-FZ.pdf law/koap.docx
//! adcensor analyze --text "Лучший кофе в городе!"
//! adcensor analyze --image banner.png
//! adcensor check
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment credentials |
//! | [`models`] | Core data types and remote id newtypes |
//! | [`extract`] | PDF, DOCX, and plain-text loading |
//! | [`chunk`] | Boundary-snapping text chunker |
//! | [`retry`] | Rate-limit backoff |
//! | [`poll`] | Waiting on long-running remote jobs |
//! | [`remote`] | Knowledge-service and vision-model ports and clients |
//! | [`index`] | Knowledge index lifecycle |
//! | [`agent`] | Assistant lifecycle and queries |
//! | [`vision`] | Image description |
//! | [`engine`] | Analysis orchestration |
//! | [`prompts`] | Fixed prompts and report parsing |
//! | [`diagnostics`] | Remediation hints and connection report |
//! | [`logging`] | Tracing subscriber setup |

pub mod agent;
pub mod chunk;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod extract;
pub mod index;
pub mod logging;
pub mod models;
pub mod poll;
pub mod prompts;
pub mod remote;
pub mod retry;
pub mod vision;
