//! Bridged management connection
//!
//! Provides a [`ManagementConnection`](mgmt_core::ManagementConnection) that
//! talks to a remote bridge over its JSON wire protocol.
//!
//! # Example
//!
//! ```rust,no_run
//! use mgmt_client::{BridgeConnector, ServiceUrl};
//! use mgmt_core::ManagementConnection;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mgmt_core::MgmtError> {
//!     let url: ServiceUrl = "bridge://localhost:8778/bridge".parse()?;
//!     let connector = BridgeConnector::new(&url)?;
//!     connector.connect().await?;
//!
//!     let conn = connector.connection()?;
//!     let names = conn.query_names(None, None).await?;
//!     println!("{} objects on {}", names.len(), conn.id());
//!
//!     connector.close();
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module serves a router on a free port:
//!
//! ```rust,ignore
//! use mgmt_client::testing::TestServer;
//! use mgmt_api::{create_router, AppState};
//!
//! let server = TestServer::start(create_router(state)).await?;
//! let conn = server.connect().await?;
//! ```

mod connector;
mod error;
mod remote;
pub mod testing;
mod transport;

pub use connector::{
    BridgeConnector, ServiceUrl, CONNECTION_CLOSED, CONNECTION_OPENED, DEFAULT_PATH, DEFAULT_PORT,
};
pub use error::{Result, TransportError};
pub use remote::{map_error, QueryMode, RemoteConnection, BRIDGED_ID_SUFFIX};
pub use transport::{HttpTransport, Transport};
