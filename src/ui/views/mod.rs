mod cache_inspector;
mod infinite_posts;
mod post_detail;
mod post_form;
mod post_list;

pub use cache_inspector::CacheInspectorView;
pub use infinite_posts::InfinitePostsView;
pub use post_detail::PostDetailView;
pub use post_form::PostFormView;
pub use post_list::PostListView;
