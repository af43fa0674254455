//! Transfer handles and everything that flows through them
//!
//! # Key Features
//!
//! - **Identity-cached handles**: one live [`Transfer`] per resource and provider
//! - **Boxed streams**: providers and decorators exchange [`ContentReader`] /
//!   [`ContentWriter`] trait objects
//! - **Decorator chain**: ordered hooks around exists/read/write/delete/list/mkdirs
//! - **Events**: stored, deleted, failed, not-found and published notifications
//!
//! # Module Organization
//!
//! - [`handle`] - The transfer handle
//! - [`registry`] - Weak identity map handing out handles
//! - [`stream`] - Reader/writer traits and simple implementations
//! - [`decorator`] - Decorator trait and the checksum sidecar decorator
//! - [`event`] - Event types and dispatchers

pub mod decorator;
pub mod event;
pub mod handle;
pub mod registry;
pub mod stream;

pub use decorator::{ChecksumDecorator, TransferDecorator};
pub use event::{ChannelEventDispatcher, EventDispatcher, NoOpEventDispatcher, TransferEvent};
pub use handle::Transfer;
pub use registry::TransferRegistry;
pub use stream::{BytesReader, ContentReader, ContentWriter, FileReader};
