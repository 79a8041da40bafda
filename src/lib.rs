//! Common-root inference over Unix and Windows style path strings, and the
//! app-root hints built on it for debugging deployed containers.

pub mod debug;
pub mod paths;
pub mod roots;
pub mod sync_map;

pub use debug::{Artifact, ImageConfiguration, infer_app_roots};
pub use paths::{Dialect, Unix, Windows, common_prefix};
pub use roots::{OrderedRootSet, compute_common_roots};
pub use sync_map::{ArtifactConfig, CsvSyncMapResolver, SyncMap, SyncMapError, SyncMapResolver};
