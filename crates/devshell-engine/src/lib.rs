//! Devshell Engine
//!
//! Hosted-mode loader for a development shell. Types compiled by an external
//! compiler are loaded into a per-session loader on demand, and embedded
//! native-method bodies are wired to a native host that refers back to the
//! loaded types through compact dispatch handles.
//!
//! # Architecture
//!
//! - `loader`: [`HostedSession`], on-demand type loading and deferred wiring
//! - `rewrite`: marker hierarchy rewriting of type images
//! - `dispatch`: dispatch ids and per-type member tables
//! - `jsni`: reference syntax used inside native bodies
//! - `identity`: weak identity caches between host values and native objects
//! - `host`: the native host seam
//! - `types`, `unit`: metadata and compiled-unit collaborators
//! - `options`: session configuration
//!
//! # Example
//!
//! ```ignore
//! use devshell_engine::{DispatchIdOracle, HostedSession, TypeCatalog, UnitStore};
//! use std::sync::Arc;
//!
//! let session = HostedSession::builder(Arc::new(UnitStore::new()), Arc::new(TypeCatalog::new()))
//!     .build()?;
//! let handle = session.resolve_handle("@a.Widget::size()")?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod dispatch;
pub mod error;
pub mod host;
pub mod identity;
pub mod jsni;
pub mod loader;
pub mod options;
pub mod rewrite;
pub mod types;
pub mod unit;

pub use dispatch::{DispatchHandle, DispatchIdOracle, TypeDescriptor};
pub use error::{BridgeError, BridgeResult};
pub use host::{NativeHost, ResolvingHost, WiredMethod};
pub use identity::{HostValueId, IdentityCacheBridge, SessionIdentityCache};
pub use jsni::{JsniRef, MalformedReference};
pub use loader::{
    DirectoryResources, HostedSession, InjectionState, ResourceLocator, RuntimeType,
    SessionBuilder, StaticResources, TypeHandle, TypeOrigin,
};
pub use options::BridgeOptions;
pub use rewrite::{InstanceMethodOracle, MarkerRewriter, RewriteCache, RewriteError};
pub use types::{MethodInfo, TypeCatalog, TypeInfo, TypeOracle};
pub use unit::{CompiledClass, CompiledUnit, NativeMethod, UnitRegistry, UnitStore};
