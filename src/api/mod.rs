//! REST client for the blog backend and its payload types.

pub mod client;
pub mod error;
pub mod types;

pub use client::{BlogClient, DEFAULT_BASE_URL};
pub use error::RemoteError;
pub use types::{Comment, ListPostsParams, NewPost, PaginatedResponse, Post, PostUpdate, User};
