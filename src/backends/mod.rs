//! Acquisition backends
//!
//! Each resolved source type maps to one strategy:
//!
//! - [`DirectFetch`] - streaming HTTP download for plain file URLs
//! - [`ExtractorDelegate`] - page-hosted media through the extraction engine
//! - [`SwarmTransfer`] - magnet links and `.torrent` files through the swarm engine
//!
//! [`Dispatcher`] picks the strategy, merges its settings through
//! [`crate::config::BackendResolver`] and converts the outcome into an
//! [`crate::report::AcquisitionResult`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use mediafetch::backends::{BackendRegistry, Dispatcher};
//!
//! let registry = BackendRegistry::with_defaults(&config, http);
//! let dispatcher = Dispatcher::new(registry, config, output);
//! let result = dispatcher.dispatch(&target, &cancel).await;
//! ```

mod direct;
mod dispatch;
mod extractor;
mod registry;
mod swarm;
mod traits;

pub use direct::{DirectFetch, extension_for, file_name_for};
pub use dispatch::{Dispatcher, validate_url};
pub use extractor::ExtractorDelegate;
pub use registry::{BackendKind, BackendRegistry, RegistryError};
pub use swarm::SwarmTransfer;
pub use traits::{AcquireContext, Acquired, Backend};
