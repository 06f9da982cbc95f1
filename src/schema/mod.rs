//! The story data model: scenes, choices, variables and their invariants.

pub mod condition;
pub mod scene;
pub mod story;
pub mod validate;
pub mod variable;
