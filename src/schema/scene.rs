use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::condition::Conditions;
use super::variable::VariableRange;

/// Scene identifiers are unique within a story and immutable once created.
pub type SceneId = String;

/// Sentinel target meaning "the playthrough is over".
pub const END_SCENE: &str = "end";

/// Choice id used to follow a scene's `nextScene` fallback edge.
pub const CONTINUE: &str = "continue";

/// What a choice changes when taken.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consequences {
    /// Deltas added to variable values.
    #[serde(default)]
    pub variables: BTreeMap<String, i64>,
    /// Achievement ids unlocked.
    #[serde(default)]
    pub achievements: Vec<String>,
}

/// A directed, labeled edge out of a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub id: String,
    pub text: String,
    pub next_scene: SceneId,
    #[serde(default)]
    pub consequences: Option<Consequences>,
    #[serde(default)]
    pub conditions: Option<Conditions>,
}

impl Choice {
    pub fn new(id: &str, text: &str, next_scene: &str) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            next_scene: next_scene.to_string(),
            consequences: None,
            conditions: None,
        }
    }

    /// Adds a variable delta to this choice's consequences.
    pub fn with_delta(mut self, variable: &str, delta: i64) -> Self {
        self.consequences
            .get_or_insert_with(Consequences::default)
            .variables
            .insert(variable.to_string(), delta);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Neutral,
    Tense,
    Peaceful,
    Mysterious,
    Dramatic,
}

/// Presentation hints carried as data; the engine does not interpret them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Atmosphere {
    #[serde(default)]
    pub mood: Option<Mood>,
    #[serde(default)]
    pub music: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
}

/// One conditional alternative for a content variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentVariant {
    #[serde(default)]
    pub variables: BTreeMap<String, VariableRange>,
    pub text: String,
}

/// Variant text substituted for a `{key}` placeholder in scene content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentVariable {
    pub default_text: String,
    #[serde(default)]
    pub conditions: Vec<ContentVariant>,
}

/// A node of the story graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: SceneId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Fallback single edge, followed only when `choices` is empty.
    #[serde(default)]
    pub next_scene: Option<SceneId>,
    #[serde(default)]
    pub conditions: Option<Conditions>,
    #[serde(default)]
    pub content_variables: BTreeMap<String, ContentVariable>,
    #[serde(default)]
    pub atmosphere: Option<Atmosphere>,
}

impl Scene {
    pub fn new(id: &str, title: &str, content: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            choices: Vec::new(),
            next_scene: None,
            conditions: None,
            content_variables: BTreeMap::new(),
            atmosphere: None,
        }
    }

    pub fn with_choice(mut self, choice: Choice) -> Self {
        self.choices.push(choice);
        self
    }

    pub fn with_next(mut self, next_scene: &str) -> Self {
        self.next_scene = Some(next_scene.to_string());
        self
    }

    pub fn find_choice(&self, choice_id: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.id == choice_id)
    }

    /// The fallback target, ignoring an empty string.
    pub fn fallback_target(&self) -> Option<&str> {
        self.next_scene.as_deref().filter(|s| !s.is_empty())
    }

    pub fn outgoing(&self) -> Vec<OutgoingEdge<'_>> {
        resolve_outgoing(self)
    }
}

/// One effective edge out of a scene. `choice` is `None` for the
/// `nextScene` fallback edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutgoingEdge<'a> {
    pub choice: Option<&'a Choice>,
    pub target: &'a str,
}

impl<'a> OutgoingEdge<'a> {
    pub fn choice_id(&self) -> Option<&'a str> {
        self.choice.map(|c| c.id.as_str())
    }

    /// Label shown on the edge: the choice text, or "Continue".
    pub fn label(&self) -> &'a str {
        self.choice.map_or("Continue", |c| c.text.as_str())
    }
}

/// A scene's effective edges: its choices if any, else its `nextScene`
/// fallback, else nothing (a dead end).
pub fn resolve_outgoing(scene: &Scene) -> Vec<OutgoingEdge<'_>> {
    if !scene.choices.is_empty() {
        return scene
            .choices
            .iter()
            .map(|choice| OutgoingEdge {
                choice: Some(choice),
                target: choice.next_scene.as_str(),
            })
            .collect();
    }
    match scene.fallback_target() {
        Some(target) => vec![OutgoingEdge {
            choice: None,
            target,
        }],
        None => Vec::new(),
    }
}

/// Returns true iff `target` is the end-of-story sentinel.
pub fn is_terminal(target: &str) -> bool {
    target == END_SCENE
}
