/// Authoring-time checks for scene ids and choice targets.
use thiserror::Error;

use super::scene::{is_terminal, Choice};
use super::story::Story;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("scene id is required")]
    EmptySceneId,
    #[error("scene id '{0}' can only contain lowercase letters, numbers, hyphens, and underscores")]
    MalformedSceneId(String),
    #[error("scene id '{0}' already exists")]
    DuplicateSceneId(String),
    #[error("choice '{choice}' has no next scene")]
    EmptyTarget { choice: String },
    #[error("choice '{choice}' points to scene '{target}', which does not exist")]
    DanglingTarget { choice: String, target: String },
}

/// Returns true if `id` matches `^[a-z0-9-_]+$`.
pub fn is_well_formed_scene_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// Check a new scene id: non-empty, well-formed, and unused in `story`.
pub fn validate_scene_id(id: &str, story: &Story) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::EmptySceneId);
    }
    if !is_well_formed_scene_id(id) {
        return Err(ValidationError::MalformedSceneId(id.to_string()));
    }
    if story.scenes.contains_key(id) {
        return Err(ValidationError::DuplicateSceneId(id.to_string()));
    }
    Ok(())
}

/// Check that every choice targets an existing scene, `"end"`, or the scene
/// being edited (`own_id`). Returns the first failure.
pub fn validate_choice_targets(
    choices: &[Choice],
    story: &Story,
    own_id: &str,
) -> Result<(), ValidationError> {
    for choice in choices {
        let target = choice.next_scene.as_str();
        if target.is_empty() {
            return Err(ValidationError::EmptyTarget {
                choice: choice.id.clone(),
            });
        }
        if !is_terminal(target) && target != own_id && !story.scenes.contains_key(target) {
            return Err(ValidationError::DanglingTarget {
                choice: choice.id.clone(),
                target: target.to_string(),
            });
        }
    }
    Ok(())
}
