//! mgmt-gateway - One bridge over every management registry of a process
//!
//! This crate provides the BridgeHandler that composes the registries found
//! at startup into a single logical registry, detects the hosting server
//! product and routes wire commands to the right place.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         BridgeHandler                            │
//! │                                                                  │
//! │  ┌──────────────────┐   ┌──────────────────────────────────┐    │
//! │  │ ServerDetectors  │──▶│ RequestDispatcher                │    │
//! │  │ (first match +   │   │  - pre-dispatch hook             │    │
//! │  │  fallback)       │   │  - all-at-once vs single-registry│    │
//! │  └──────────────────┘   └────────────────┬─────────────────┘    │
//! │                                          │                      │
//! │                          ┌───────────────▼──────────────┐       │
//! │                          │       AggregateRegistry      │       │
//! │                          └───────┬──────────────┬───────┘       │
//! │                                  ▼              ▼               │
//! │                          ┌──────────────┐ ┌──────────────┐      │
//! │                          │   platform   │ │  app / ...   │      │
//! │                          └──────────────┘ └──────────────┘      │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use mgmt_gateway::{BridgeConfig, BridgeHandler, LocalConnection};
//!
//! let handler = BridgeHandler::new(
//!     BridgeConfig::default().with_qualifier("name=main"),
//!     vec![platform, app],
//!     detectors,
//!     Arc::new(TracingLogHandler),
//! )
//! .await?;
//!
//! let conn = LocalConnection::new(handler.clone());
//! let count = conn.object_count().await?;
//!
//! handler.destroy().await?;
//! ```

mod aggregate;
mod connection;
mod detector;
mod dispatch;
mod handler;

pub use aggregate::AggregateRegistry;
pub use connection::{LocalConnection, LOCAL_ID_SUFFIX};
pub use detector::{
    detect_server, FallbackDetector, NoHooks, PresenceDetector, ServerDetector, ServerHandle,
    ServerHooks, UnavailableAttribute, UnavailableAttributeHooks,
};
pub use dispatch::RequestDispatcher;
pub use handler::{BridgeConfig, BridgeHandler, BridgeState, HANDLER_OBJECT_NAME};

// Re-export core types for convenience
pub use mgmt_core::{Command, LogHandler, ManagementConnection, MgmtError, MgmtResult, Registry};
