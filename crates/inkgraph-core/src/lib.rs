//! InkGraph Core Library
//!
//! Platform-agnostic scene graph for the InkGraph editor: affine matrices,
//! the element tree and its store, the viewport, pointer tools and snapshot
//! persistence.

pub mod color;
pub mod element;
pub mod error;
pub mod matrix;
pub mod snapshot;
pub mod storage;
pub mod store;
pub mod tools;
pub mod viewport;

pub use color::{Rgba, parse_color};
pub use element::{DrawContext, Element, ElementId, ElementKind, ElementResolver, Fill, ROOT_ID};
pub use error::SceneError;
pub use matrix::MatrixError;
pub use snapshot::{ElementRecord, SNAPSHOT_VERSION, Snapshot, SnapshotError};
pub use storage::{DEFAULT_SNAPSHOT_KEY, MemoryStorage, Persistence, Storage, StorageError};
pub use store::{ElementStore, ListenerId, StoreEvent};
pub use tools::{ToolKind, ToolManager, ToolState};
pub use viewport::{RESIZE_DEBOUNCE, Viewport, ViewportEvent};
