//! mgmt-core - Object model, registry abstraction and wire types for the
//! management bridge
//!
//! This crate provides the pieces shared by the server side (aggregation and
//! dispatch) and the client side (protocol-translating connection).

pub mod connection;
pub mod error;
pub mod local;
pub mod log;
pub mod models;
pub mod name;
pub mod query;
pub mod registry;
pub mod wire;

pub use connection::{ManagementConnection, Notification, NotificationFilter, NotificationListener};
pub use error::{ErrorKind, MgmtError, MgmtResult};
pub use local::{LocalRegistry, SimpleObject, SimpleObjectBuilder};
pub use log::{LogHandler, TracingLogHandler};
pub use models::*;
pub use name::ObjectName;
pub use query::{QueryExp, QueryTarget, Selector};
pub use registry::{
    ListenerId, ManagedObject, ObjectView, Registry, RegistrationListener, RegistryEvent,
};
pub use wire::{Command, Routing, ServerInfo, VersionInfo, WireResponse, PROTOCOL_VERSION};
