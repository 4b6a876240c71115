//! Client-side query layer: key registry, shared cache and the view-side
//! handles that observe it.

pub mod cache;
pub mod handle;
pub mod infinite;
pub mod keys;
pub mod observer;
pub mod online;
pub mod options;

pub use cache::{AnyData, EntrySnapshot, EntrySummary, FetchStatus, QueryCache};
pub use handle::Query;
pub use infinite::{InfiniteData, InfiniteQuery};
pub use observer::ErrorObserver;
pub use online::OnlineManager;
pub use options::{MutationOptions, QueryOptions};
