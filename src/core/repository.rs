/// Story storage behind a trait, with an in-memory implementation that can
/// be seeded from a directory of RON story files.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::schema::condition::Conditions;
use crate::schema::scene::{is_terminal, Atmosphere, Choice, ContentVariable, Scene, SceneId, CONTINUE};
use crate::schema::story::{
    story_id_from_title, LoadError, Story, StoryConfig, StoryId, StoryMetadata, StoryStats,
};
use crate::schema::validate::{validate_choice_targets, validate_scene_id, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Story,
    Scene,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Story => write!(f, "story"),
            EntityKind::Scene => write!(f, "scene"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("a {kind} with id '{id}' already exists")]
    DuplicateId { kind: EntityKind, id: String },
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

impl From<LoadError> for RepositoryError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::Io(e) => RepositoryError::Io(e),
            LoadError::Ron(e) => RepositoryError::Ron(e),
        }
    }
}

fn story_not_found(id: &str) -> RepositoryError {
    RepositoryError::NotFound {
        kind: EntityKind::Story,
        id: id.to_string(),
    }
}

fn scene_not_found(id: &str) -> RepositoryError {
    RepositoryError::NotFound {
        kind: EntityKind::Scene,
        id: id.to_string(),
    }
}

/// Everything needed to create a story. The id is derived from the title.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryDraft {
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
    #[serde(default)]
    pub config: StoryConfig,
    #[serde(default)]
    pub metadata: StoryMetadata,
    #[serde(default)]
    pub scenes: HashMap<SceneId, Scene>,
}

impl StoryDraft {
    pub fn new(title: &str, start_scene: &str) -> Self {
        Self {
            title: title.to_string(),
            config: StoryConfig {
                start_scene: start_scene.to_string(),
                ..StoryConfig::default()
            },
            ..Self::default()
        }
    }

    fn into_story(self) -> Story {
        Story {
            id: story_id_from_title(&self.title),
            title: self.title,
            author: self.author,
            description: self.description,
            cover_image: self.cover_image,
            category: self.category,
            tags: self.tags,
            stats: self.stats,
            config: self.config,
            scenes: self.scenes,
            metadata: self.metadata,
            scene_order: Vec::new(),
        }
    }
}

/// Partial story update. `None` fields are left as they are; the id never
/// changes, even when the title does.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub config: Option<StoryConfig>,
    #[serde(default)]
    pub metadata: Option<StoryMetadata>,
}

impl StoryPatch {
    fn apply(self, story: &mut Story) {
        if let Some(v) = self.title {
            story.title = v;
        }
        if let Some(v) = self.author {
            story.author = v;
        }
        if let Some(v) = self.description {
            story.description = v;
        }
        if let Some(v) = self.cover_image {
            story.cover_image = v;
        }
        if let Some(v) = self.category {
            story.category = v;
        }
        if let Some(v) = self.tags {
            story.tags = v;
        }
        if let Some(v) = self.config {
            story.config = v;
        }
        if let Some(v) = self.metadata {
            story.metadata = v;
        }
    }
}

/// A scene without its id; the id is given separately on creation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub next_scene: Option<SceneId>,
    #[serde(default)]
    pub conditions: Option<Conditions>,
    #[serde(default)]
    pub content_variables: BTreeMap<String, ContentVariable>,
    #[serde(default)]
    pub atmosphere: Option<Atmosphere>,
}

impl SceneDraft {
    pub fn new(title: &str, content: &str) -> Self {
        Self {
            title: title.to_string(),
            content: content.to_string(),
            ..Self::default()
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

    fn into_scene(self, id: &str) -> Scene {
        Scene {
            id: id.to_string(),
            title: self.title,
            content: self.content,
            choices: self.choices,
            next_scene: self.next_scene,
            conditions: self.conditions,
            content_variables: self.content_variables,
            atmosphere: self.atmosphere,
        }
    }
}

/// Partial scene update. Empty values clear optional fields: an empty
/// `nextScene` string removes the fallback, and empty `conditions` or
/// `atmosphere` remove those.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenePatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub choices: Option<Vec<Choice>>,
    #[serde(default)]
    pub next_scene: Option<SceneId>,
    #[serde(default)]
    pub conditions: Option<Conditions>,
    #[serde(default)]
    pub content_variables: Option<BTreeMap<String, ContentVariable>>,
    #[serde(default)]
    pub atmosphere: Option<Atmosphere>,
}

impl ScenePatch {
    fn apply(self, scene: &mut Scene) {
        if let Some(v) = self.title {
            scene.title = v;
        }
        if let Some(v) = self.content {
            scene.content = v;
        }
        if let Some(v) = self.choices {
            scene.choices = v;
        }
        if let Some(v) = self.next_scene {
            scene.next_scene = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = self.conditions {
            scene.conditions = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = self.content_variables {
            scene.content_variables = v;
        }
        if let Some(v) = self.atmosphere {
            scene.atmosphere = if v == Atmosphere::default() { None } else { Some(v) };
        }
    }
}

/// The storage capability the engine consumes. Implementations decide how
/// stories are kept; callers only see snapshots and validated writes.
pub trait StoryRepository {
    fn get_story(&self, id: &str) -> Option<&Story>;

    /// Most recently updated first.
    fn list_stories(&self) -> Vec<&Story>;

    fn create_story(&mut self, draft: StoryDraft) -> Result<&Story, RepositoryError>;

    fn update_story(&mut self, id: &str, patch: StoryPatch) -> Result<&Story, RepositoryError>;

    fn delete_story(&mut self, id: &str) -> Result<(), RepositoryError>;

    /// Fails if `scene_id` is malformed or already used, or if any choice
    /// targets a scene that does not exist.
    fn create_scene(
        &mut self,
        story_id: &str,
        scene_id: &str,
        draft: SceneDraft,
    ) -> Result<Scene, RepositoryError>;

    fn update_scene(
        &mut self,
        story_id: &str,
        scene_id: &str,
        patch: ScenePatch,
    ) -> Result<Scene, RepositoryError>;

    fn delete_scene(&mut self, story_id: &str, scene_id: &str) -> Result<(), RepositoryError>;

    /// Store the author's display order. Has no effect on traversal or layout.
    fn update_scene_order(
        &mut self,
        story_id: &str,
        order: Vec<SceneId>,
    ) -> Result<&Story, RepositoryError>;
}

/// The fallback edge follows the same target rules as choices.
fn validate_fallback(scene: &Scene, story: &Story) -> Result<(), ValidationError> {
    match scene.fallback_target() {
        Some(target)
            if !is_terminal(target) && target != scene.id && !story.scenes.contains_key(target) =>
        {
            Err(ValidationError::DanglingTarget {
                choice: CONTINUE.to_string(),
                target: target.to_string(),
            })
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone)]
struct StoredStory {
    story: Story,
    revision: u64,
}

/// Stories kept in a map. Every write stamps the story with the next value
/// of a repository-wide counter, which orders `list_stories`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStoryRepository {
    stories: HashMap<StoryId, StoredStory>,
    clock: u64,
}

impl InMemoryStoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryStoryRepositoryBuilder {
        InMemoryStoryRepositoryBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.stories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }

    /// Revision of the last write to story `id`.
    pub fn revision(&self, id: &str) -> Option<u64> {
        self.stories.get(id).map(|s| s.revision)
    }

    /// Store a complete story under its own id.
    pub fn insert_story(&mut self, story: Story) -> Result<&Story, RepositoryError> {
        if self.stories.contains_key(&story.id) {
            return Err(RepositoryError::DuplicateId {
                kind: EntityKind::Story,
                id: story.id,
            });
        }
        let id = story.id.clone();
        let revision = self.tick();
        debug!(story = %id, scenes = story.scene_count(), "story stored");
        let stored = self
            .stories
            .entry(id)
            .or_insert(StoredStory { story, revision });
        Ok(&stored.story)
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn stored_mut(&mut self, id: &str) -> Result<&mut StoredStory, RepositoryError> {
        let revision = self.clock + 1;
        let stored = self.stories.get_mut(id).ok_or_else(|| story_not_found(id))?;
        // Only stamped once the story is known to exist
        self.clock = revision;
        stored.revision = revision;
        Ok(stored)
    }
}

impl StoryRepository for InMemoryStoryRepository {
    fn get_story(&self, id: &str) -> Option<&Story> {
        self.stories.get(id).map(|s| &s.story)
    }

    fn list_stories(&self) -> Vec<&Story> {
        let mut stored: Vec<&StoredStory> = self.stories.values().collect();
        stored.sort_by(|a, b| b.revision.cmp(&a.revision));
        stored.into_iter().map(|s| &s.story).collect()
    }

    fn create_story(&mut self, draft: StoryDraft) -> Result<&Story, RepositoryError> {
        let story = draft.into_story();
        info!(story = %story.id, title = %story.title, "creating story");
        self.insert_story(story)
    }

    fn update_story(&mut self, id: &str, patch: StoryPatch) -> Result<&Story, RepositoryError> {
        let stored = self.stored_mut(id)?;
        patch.apply(&mut stored.story);
        info!(story = %id, revision = stored.revision, "story updated");
        Ok(&stored.story)
    }

    fn delete_story(&mut self, id: &str) -> Result<(), RepositoryError> {
        self.stories.remove(id).ok_or_else(|| story_not_found(id))?;
        info!(story = %id, "story deleted");
        Ok(())
    }

    fn create_scene(
        &mut self,
        story_id: &str,
        scene_id: &str,
        draft: SceneDraft,
    ) -> Result<Scene, RepositoryError> {
        let story = self.get_story(story_id).ok_or_else(|| story_not_found(story_id))?;
        match validate_scene_id(scene_id, story) {
            Err(ValidationError::DuplicateSceneId(id)) => {
                return Err(RepositoryError::DuplicateId {
                    kind: EntityKind::Scene,
                    id,
                })
            }
            other => other?,
        }
        let scene = draft.into_scene(scene_id);
        validate_choice_targets(&scene.choices, story, scene_id)?;
        validate_fallback(&scene, story)?;

        let stored = self.stored_mut(story_id)?;
        stored.story.scenes.insert(scene.id.clone(), scene.clone());
        info!(story = %story_id, scene = %scene_id, "scene created");
        Ok(scene)
    }

    fn update_scene(
        &mut self,
        story_id: &str,
        scene_id: &str,
        patch: ScenePatch,
    ) -> Result<Scene, RepositoryError> {
        let story = self.get_story(story_id).ok_or_else(|| story_not_found(story_id))?;
        let mut scene = story
            .scene(scene_id)
            .cloned()
            .ok_or_else(|| scene_not_found(scene_id))?;
        patch.apply(&mut scene);
        validate_choice_targets(&scene.choices, story, scene_id)?;
        validate_fallback(&scene, story)?;

        let stored = self.stored_mut(story_id)?;
        stored.story.scenes.insert(scene_id.to_string(), scene.clone());
        info!(story = %story_id, scene = %scene_id, "scene updated");
        Ok(scene)
    }

    fn delete_scene(&mut self, story_id: &str, scene_id: &str) -> Result<(), RepositoryError> {
        let story = self.get_story(story_id).ok_or_else(|| story_not_found(story_id))?;
        if story.scene(scene_id).is_none() {
            return Err(scene_not_found(scene_id));
        }
        let referrers = story
            .scenes
            .values()
            .filter(|s| s.id != scene_id && s.outgoing().iter().any(|e| e.target == scene_id))
            .count();

        let stored = self.stored_mut(story_id)?;
        stored.story.scenes.remove(scene_id);
        stored.story.scene_order.retain(|id| id != scene_id);
        if referrers > 0 {
            warn!(story = %story_id, scene = %scene_id, referrers, "deleted scene is still referenced");
        }
        info!(story = %story_id, scene = %scene_id, "scene deleted");
        Ok(())
    }

    fn update_scene_order(
        &mut self,
        story_id: &str,
        order: Vec<SceneId>,
    ) -> Result<&Story, RepositoryError> {
        let stored = self.stored_mut(story_id)?;
        stored.story.scene_order = order;
        debug!(story = %story_id, "scene order updated");
        Ok(&stored.story)
    }
}

/// Builder for constructing an `InMemoryStoryRepository`.
#[derive(Debug, Default)]
pub struct InMemoryStoryRepositoryBuilder {
    stories_dir: Option<PathBuf>,
    stories: Vec<Story>,
}

impl InMemoryStoryRepositoryBuilder {
    /// Load every `.ron` file in `dir`. A missing directory is skipped.
    pub fn stories_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.stories_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_story(mut self, story: Story) -> Self {
        self.stories.push(story);
        self
    }

    pub fn build(self) -> Result<InMemoryStoryRepository, RepositoryError> {
        let mut repo = InMemoryStoryRepository::new();

        if let Some(ref dir) = self.stories_dir {
            if dir.exists() {
                load_ron_files_from_dir(dir, |path| {
                    let story = Story::load_from_ron(path)?;
                    info!(story = %story.id, path = %path.display(), "loaded story");
                    repo.insert_story(story)?;
                    Ok(())
                })?;
            } else {
                warn!(dir = %dir.display(), "stories directory does not exist");
            }
        }

        for story in self.stories {
            repo.insert_story(story)?;
        }

        Ok(repo)
    }
}

/// Calls `loader` for each `.ron` file in `dir`, in file name order.
fn load_ron_files_from_dir<F>(dir: &Path, mut loader: F) -> Result<(), RepositoryError>
where
    F: FnMut(&Path) -> Result<(), RepositoryError>,
{
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            paths.push(path);
        }
    }
    paths.sort();
    for path in paths {
        loader(&path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> InMemoryStoryRepository {
        let story = Story::new("Test Tale", "start")
            .with_scene(Scene::new("start", "Start", "").with_next("end"));
        InMemoryStoryRepository::builder()
            .with_story(story)
            .build()
            .unwrap()
    }

    #[test]
    fn create_story_derives_id() {
        let mut repo = InMemoryStoryRepository::new();
        let story = repo
            .create_story(StoryDraft::new("The Lost  City!", "start"))
            .unwrap();
        assert_eq!(story.id, "the-lost-city-");
        assert!(repo.get_story("the-lost-city-").is_some());
    }

    #[test]
    fn duplicate_story_rejected() {
        let mut repo = repo();
        let err = repo
            .create_story(StoryDraft::new("Test Tale", "start"))
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::DuplicateId {
                kind: EntityKind::Story,
                ..
            }
        ));
    }

    #[test]
    fn list_most_recent_first() {
        let mut repo = repo();
        repo.create_story(StoryDraft::new("Second", "start")).unwrap();
        let ids: Vec<&str> = repo.list_stories().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["second", "test-tale"]);

        repo.update_story(
            "test-tale",
            StoryPatch {
                author: Some("Someone".to_string()),
                ..StoryPatch::default()
            },
        )
        .unwrap();
        let ids: Vec<&str> = repo.list_stories().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["test-tale", "second"]);
    }

    #[test]
    fn update_story_keeps_id() {
        let mut repo = repo();
        let story = repo
            .update_story(
                "test-tale",
                StoryPatch {
                    title: Some("Renamed".to_string()),
                    ..StoryPatch::default()
                },
            )
            .unwrap();
        assert_eq!(story.id, "test-tale");
        assert_eq!(story.title, "Renamed");
    }

    #[test]
    fn create_scene_validates_id() {
        let mut repo = repo();
        let err = repo
            .create_scene("test-tale", "Bad Id", SceneDraft::new("Bad", ""))
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Validation(ValidationError::MalformedSceneId(_))
        ));
        let err = repo
            .create_scene("test-tale", "", SceneDraft::new("Empty", ""))
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Validation(ValidationError::EmptySceneId)
        ));
        let err = repo
            .create_scene("test-tale", "start", SceneDraft::new("Again", ""))
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::DuplicateId {
                kind: EntityKind::Scene,
                ..
            }
        ));
    }

    #[test]
    fn create_scene_validates_targets() {
        let mut repo = repo();
        let draft = SceneDraft::new("Hall", "").with_choice(Choice::new("go", "Go", "nowhere"));
        let err = repo.create_scene("test-tale", "hall", draft).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Validation(ValidationError::DanglingTarget { .. })
        ));

        let err = repo
            .create_scene("test-tale", "hall", SceneDraft::new("Hall", "").with_next("nowhere"))
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Validation(ValidationError::DanglingTarget { .. })
        ));

        let draft = SceneDraft::new("Hall", "")
            .with_choice(Choice::new("stay", "Stay", "hall"))
            .with_choice(Choice::new("back", "Back", "start"))
            .with_choice(Choice::new("leave", "Leave", "end"));
        let scene = repo.create_scene("test-tale", "hall", draft).unwrap();
        assert_eq!(scene.id, "hall");
        assert_eq!(repo.get_story("test-tale").unwrap().scene_count(), 2);
    }

    #[test]
    fn update_and_delete_scene() {
        let mut repo = repo();
        let scene = repo
            .update_scene(
                "test-tale",
                "start",
                ScenePatch {
                    content: Some("Rewritten.".to_string()),
                    next_scene: Some(String::new()),
                    ..ScenePatch::default()
                },
            )
            .unwrap();
        assert_eq!(scene.content, "Rewritten.");
        assert_eq!(scene.next_scene, None);
        assert_eq!(scene.id, "start");

        assert!(matches!(
            repo.update_scene("test-tale", "missing", ScenePatch::default()),
            Err(RepositoryError::NotFound {
                kind: EntityKind::Scene,
                ..
            })
        ));

        repo.delete_scene("test-tale", "start").unwrap();
        assert!(matches!(
            repo.delete_scene("test-tale", "start"),
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[test]
    fn empty_patch_values_clear_scene_fields() {
        let mut repo = repo();
        let gated = ScenePatch {
            conditions: Some(Conditions {
                required_achievements: vec!["key".to_string()],
                ..Conditions::default()
            }),
            atmosphere: Some(Atmosphere {
                music: Some("rain.ogg".to_string()),
                ..Atmosphere::default()
            }),
            ..ScenePatch::default()
        };
        let scene = repo.update_scene("test-tale", "start", gated).unwrap();
        assert!(scene.conditions.is_some());
        assert!(scene.atmosphere.is_some());

        let cleared = ScenePatch {
            conditions: Some(Conditions::default()),
            atmosphere: Some(Atmosphere::default()),
            ..ScenePatch::default()
        };
        let scene = repo.update_scene("test-tale", "start", cleared).unwrap();
        assert_eq!(scene.conditions, None);
        assert_eq!(scene.atmosphere, None);
    }

    #[test]
    fn missing_story_errors() {
        let mut repo = repo();
        assert!(repo.get_story("nope").is_none());
        assert!(matches!(
            repo.delete_story("nope"),
            Err(RepositoryError::NotFound {
                kind: EntityKind::Story,
                ..
            })
        ));
        assert!(repo.update_scene_order("nope", Vec::new()).is_err());
        assert!(repo
            .create_scene("nope", "scene", SceneDraft::default())
            .is_err());
    }

    #[test]
    fn failed_write_does_not_bump_revision() {
        let mut repo = repo();
        let before = repo.revision("test-tale");
        assert!(repo
            .create_scene("test-tale", "BAD", SceneDraft::default())
            .is_err());
        assert_eq!(repo.revision("test-tale"), before);
        assert!(repo.update_story("nope", StoryPatch::default()).is_err());
        repo.update_scene_order("test-tale", vec!["start".to_string()])
            .unwrap();
        assert!(repo.revision("test-tale") > before);
    }

    #[test]
    fn scene_order_is_cosmetic() {
        let mut repo = repo();
        repo.create_scene("test-tale", "b", SceneDraft::new("B", "").with_next("end"))
            .unwrap();
        repo.create_scene("test-tale", "a", SceneDraft::new("A", "").with_next("b"))
            .unwrap();
        let story = repo
            .update_scene_order(
                "test-tale",
                vec!["b".to_string(), "gone".to_string(), "start".to_string()],
            )
            .unwrap();
        assert_eq!(story.ordered_scene_ids(), vec!["b", "start", "a"]);

        repo.delete_scene("test-tale", "b").unwrap();
        let story = repo.get_story("test-tale").unwrap();
        assert_eq!(story.scene_order, vec!["gone".to_string(), "start".to_string()]);
    }

    #[test]
    fn delete_story() {
        let mut repo = repo();
        repo.delete_story("test-tale").unwrap();
        assert!(repo.is_empty());
    }
}
