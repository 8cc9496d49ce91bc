//! # kb-orchestrator
//!
//! Idempotent provisioning and teardown of a managed retrieval knowledge
//! base and the cloud resources behind it.
//!
//! A knowledge base is a small graph of dependent resources: an execution
//! role with its policies, source buckets, a vector collection (or a graph,
//! or a warehouse), an optional transform function, the knowledge base
//! entity with its log delivery, and one connector per data source. The
//! orchestrator creates each of them exactly once, adopts them when they
//! already exist, and deletes them again in safe reverse order.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────────────────────────────┐
//! │  kb.toml     │──▶│ ResourceSpec (validated once)              │
//! └──────────────┘   └──────────────────┬─────────────────────────┘
//!                                       ▼
//!                    ┌────────────────────────────────────────────┐
//!                    │ Orchestrator + ProvisionContext            │
//!                    │ identity ▶ storage ▶ index ▶ transform ▶   │
//!                    │ knowledge ▶ (ingestion)   teardown ◀       │
//!                    └──────────────────┬─────────────────────────┘
//!                                       ▼
//!                    ┌──────────────────┴─────────┐
//!                    ▼                            ▼
//!              ┌───────────┐               ┌────────────┐
//!              │ aws (HTTP │               │ memory     │
//!              │ + SigV4)  │               │ (in-proc)  │
//!              └───────────┘               └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kbctl validate                 # check kb.toml without touching the cloud
//! kbctl provision                # create or adopt everything
//! kbctl upload ./docs            # put documents into the source bucket
//! kbctl ingest                   # sync every connector
//! kbctl id --json                # identifiers for the agent
//! kbctl teardown --delete-storage
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`spec`] | Validated deployment description |
//! | [`catalog`] | Model allow-lists, dimensions and ARNs |
//! | [`naming`] | Deterministic resource names |
//! | [`clients`] | Provider facade traits |
//! | [`aws`] | Signed HTTP implementation of the facade |
//! | [`memory`] | In-memory implementation of the facade |
//! | [`identity`], [`policy_docs`] | Execution role and permission documents |
//! | [`storage`] | Buckets, uploads and emptying |
//! | [`index`] | Vector collection, graph or warehouse handle |
//! | [`transform`] | Custom chunking function |
//! | [`knowledge`] | Knowledge base entity, log delivery, connectors |
//! | [`ingestion`] | Connector sync jobs |
//! | [`teardown`] | Reverse-order deletion |
//! | [`orchestrator`] | Public operations |

pub mod adopt;
pub mod aws;
pub mod catalog;
pub mod clients;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod index;
pub mod ingestion;
pub mod knowledge;
pub mod memory;
pub mod models;
pub mod naming;
pub mod orchestrator;
pub mod policy_docs;
pub mod progress;
pub mod retry;
pub mod sigv4;
pub mod spec;
pub mod storage;
pub mod teardown;
pub mod transform;
pub mod xml;

pub use error::{KbError, ProviderError};
pub use orchestrator::Orchestrator;
pub use spec::ResourceSpec;
pub use teardown::TeardownOptions;
