//! Story runtime: traversal, layout, content rendering, checks and storage.

pub mod autoplay;
pub mod layout;
pub mod lint;
pub mod playthrough;
pub mod repository;
pub mod template;
