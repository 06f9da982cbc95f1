use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use super::condition::Conditions;
use super::scene::{Scene, SceneId};
use super::variable::VariableMap;

pub type StoryId = String;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Popularity counters. Displayed only; the engine never mutates them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryStats {
    pub rating: f64,
    pub plays: u64,
    pub completions: u64,
    /// Minutes.
    pub average_play_time: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hidden: bool,
}

/// A named outcome selected when the playthrough reaches `"end"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ending {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub conditions: Conditions,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryConfig {
    pub start_scene: SceneId,
    #[serde(default)]
    pub default_variables: VariableMap,
    #[serde(default)]
    pub achievements: Vec<Achievement>,
    /// Checked in declaration order; the first match wins.
    #[serde(default)]
    pub endings: Vec<Ending>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeRating {
    Everyone,
    Teen,
    Mature,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryMetadata {
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub version: String,
    /// Minutes.
    #[serde(default)]
    pub estimated_read_time: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub genre: Vec<String>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub content_warnings: Vec<String>,
    #[serde(default)]
    pub age_rating: Option<AgeRating>,
}

/// The aggregate root: a directed graph of scenes plus its configuration.
///
/// `scenes` is unordered. Traversal order comes from the graph structure;
/// `scene_order` is only the author's display order for the scene list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: StoryId,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cover_image: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub stats: StoryStats,
    pub config: StoryConfig,
    #[serde(default)]
    pub scenes: HashMap<SceneId, Scene>,
    #[serde(default)]
    pub metadata: StoryMetadata,
    #[serde(default)]
    pub scene_order: Vec<SceneId>,
}

impl Story {
    /// An empty story whose id is derived from `title`.
    pub fn new(title: &str, start_scene: &str) -> Self {
        Self {
            id: story_id_from_title(title),
            title: title.to_string(),
            author: String::new(),
            description: String::new(),
            cover_image: String::new(),
            category: String::new(),
            tags: Vec::new(),
            stats: StoryStats::default(),
            config: StoryConfig {
                start_scene: start_scene.to_string(),
                ..StoryConfig::default()
            },
            scenes: HashMap::new(),
            metadata: StoryMetadata::default(),
            scene_order: Vec::new(),
        }
    }

    /// Inserts `scene` under its own id, replacing any scene with that id.
    pub fn with_scene(mut self, scene: Scene) -> Self {
        self.scenes.insert(scene.id.clone(), scene);
        self
    }

    pub fn with_variable(mut self, name: &str, value: i64) -> Self {
        self.config.default_variables.insert(
            name.to_string(),
            super::variable::StoryVariable::with_value(value),
        );
        self
    }

    pub fn scene(&self, id: &str) -> Option<&Scene> {
        self.scenes.get(id)
    }

    pub fn start_scene(&self) -> Option<&Scene> {
        self.scenes.get(&self.config.start_scene)
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn achievement(&self, id: &str) -> Option<&Achievement> {
        self.config.achievements.iter().find(|a| a.id == id)
    }

    /// Scene ids for the authoring list: the stored display order first
    /// (skipping ids that no longer exist), then any remaining ids sorted.
    pub fn ordered_scene_ids(&self) -> Vec<&str> {
        let mut ordered: Vec<&str> = Vec::with_capacity(self.scenes.len());
        for id in &self.scene_order {
            if self.scenes.contains_key(id) && !ordered.contains(&id.as_str()) {
                ordered.push(id);
            }
        }
        let mut rest: Vec<&str> = self
            .scenes
            .keys()
            .map(String::as_str)
            .filter(|id| !ordered.contains(id))
            .collect();
        rest.sort_unstable();
        ordered.extend(rest);
        ordered
    }

    /// Load a story from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<Story, LoadError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a story from a RON string.
    pub fn parse_ron(input: &str) -> Result<Story, LoadError> {
        Ok(ron::from_str(input)?)
    }
}

/// Derive a story id from its title: lowercased, with every run of
/// characters outside `[a-z0-9]` collapsed into a single hyphen.
pub fn story_id_from_title(title: &str) -> StoryId {
    let mut id = String::with_capacity(title.len());
    let mut in_run = false;
    for c in title.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            id.push(c);
            in_run = false;
        } else if !in_run {
            id.push('-');
            in_run = true;
        }
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::scene::Scene;

    #[test]
    fn id_from_title() {
        assert_eq!(story_id_from_title("Digital Whispers"), "digital-whispers");
        assert_eq!(story_id_from_title("Crown of Destiny"), "crown-of-destiny");
        assert_eq!(story_id_from_title("What?! No -- way"), "what-no-way");
        assert_eq!(story_id_from_title("  Padded  "), "-padded-");
        assert_eq!(story_id_from_title("Chapter 2"), "chapter-2");
    }

    #[test]
    fn new_story_is_empty() {
        let story = Story::new("Digital Whispers", "start");
        assert_eq!(story.id, "digital-whispers");
        assert_eq!(story.config.start_scene, "start");
        assert_eq!(story.scene_count(), 0);
        assert!(story.start_scene().is_none());
    }

    #[test]
    fn ordered_scene_ids_respects_display_order() {
        let mut story = Story::new("Order", "a")
            .with_scene(Scene::new("a", "A", ""))
            .with_scene(Scene::new("b", "B", ""))
            .with_scene(Scene::new("c", "C", ""))
            .with_scene(Scene::new("d", "D", ""));
        story.scene_order = vec!["c".into(), "gone".into(), "a".into(), "c".into()];
        assert_eq!(story.ordered_scene_ids(), vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn parse_minimal_story() {
        let story = Story::parse_ron(
            r#"(
                id: "tiny",
                title: "Tiny",
                config: (startScene: "start"),
                scenes: {
                    "start": (id: "start", title: "Start", content: "Hello", nextScene: Some("end")),
                },
            )"#,
        )
        .unwrap();
        assert_eq!(story.id, "tiny");
        assert_eq!(story.metadata.difficulty, Difficulty::Medium);
        assert_eq!(story.start_scene().map(|s| s.content.as_str()), Some("Hello"));
    }

    #[test]
    fn parse_error_is_reported() {
        assert!(matches!(
            Story::parse_ron("(id: \"broken\""),
            Err(LoadError::Ron(_))
        ));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let result = Story::load_from_ron(Path::new("tests/fixtures/does_not_exist.ron"));
        assert!(matches!(result, Err(LoadError::Io(_))));
    }
}
