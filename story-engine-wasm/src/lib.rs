//! WASM bindings for story-engine — the reader and authoring views call
//! into these over JSON.

use serde::Serialize;
use wasm_bindgen::prelude::*;

use story_engine::core::autoplay::Autoplayer;
use story_engine::core::layout::{layout_story, LayoutOptions};
use story_engine::core::lint::lint_story;
use story_engine::core::playthrough::{PlayState, PlayStatus, Playthrough};
use story_engine::schema::story::Story;
use story_engine::schema::validate::validate_scene_id;

// ---------------------------------------------------------------------------
// Bundled stories — compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const DIGITAL_WHISPERS: &str = include_str!("../../stories/digital_whispers.ron");
    pub const CROWN_OF_DESTINY: &str = include_str!("../../stories/crown_of_destiny.ron");

    pub const STORIES: [(&str, &str); 2] = [
        ("digital-whispers", DIGITAL_WHISPERS),
        ("crown-of-destiny", CROWN_OF_DESTINY),
    ];
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChoiceView {
    id: String,
    text: String,
    next_scene: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SceneView {
    status: PlayStatus,
    id: String,
    title: String,
    content: String,
    choices: Vec<ChoiceView>,
    locked_choices: usize,
    /// Target of the continue button, when the scene has no choices.
    continue_to: Option<String>,
    can_retreat: bool,
    progress: f64,
    /// Shown on the error view when the scene is missing.
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VariableView {
    name: String,
    label: String,
    value: i64,
    fill: f64,
    rank: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EndingView {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    achievements: Vec<String>,
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

fn parse_story_json(story_json: &str) -> Result<Story, JsError> {
    serde_json::from_str(story_json).map_err(|e| JsError::new(&format!("Invalid story JSON: {e}")))
}

fn bundled_story(id: &str) -> Result<Story, JsError> {
    let (_, src) = data::STORIES
        .iter()
        .find(|(story_id, _)| *story_id == id)
        .ok_or_else(|| JsError::new(&format!("Unknown story: {id}")))?;
    Story::parse_ron(src).map_err(|e| JsError::new(&format!("Story parse error: {e}")))
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// A playthrough owned across calls. The story is kept alongside the state
/// and a `Playthrough` is rebuilt around them for each operation.
#[wasm_bindgen]
pub struct StoryPlayer {
    story: Story,
    state: PlayState,
}

#[wasm_bindgen]
impl StoryPlayer {
    /// Start a bundled story by id.
    #[wasm_bindgen(constructor)]
    pub fn new(story_id: &str) -> Result<StoryPlayer, JsError> {
        Ok(Self::for_story(bundled_story(story_id)?))
    }

    /// Start a story given as JSON (the shape the authoring view saves).
    pub fn from_json(story_json: &str) -> Result<StoryPlayer, JsError> {
        Ok(Self::for_story(parse_story_json(story_json)?))
    }

    /// Ids of the bundled stories as a JSON array.
    pub fn available_stories() -> String {
        let ids: Vec<&str> = data::STORIES.iter().map(|(id, _)| *id).collect();
        serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn story_json(&self) -> Result<String, JsError> {
        to_json(&self.story)
    }

    /// The current scene, rendered, with its available choices.
    pub fn scene(&self) -> Result<String, JsError> {
        let play = Playthrough::resume(&self.story, self.state.clone());
        let status = play.status();
        let view = match play.current_content() {
            Ok(scene) => {
                let available = play.available_choices().unwrap_or_default();
                SceneView {
                    status,
                    id: scene.id.clone(),
                    title: scene.title.clone(),
                    content: play.rendered_content().unwrap_or_default(),
                    locked_choices: scene.choices.len() - available.len(),
                    choices: available
                        .into_iter()
                        .map(|c| ChoiceView {
                            id: c.id.clone(),
                            text: c.text.clone(),
                            next_scene: c.next_scene.clone(),
                        })
                        .collect(),
                    continue_to: if scene.choices.is_empty() {
                        scene.fallback_target().map(str::to_string)
                    } else {
                        None
                    },
                    can_retreat: play.can_retreat(),
                    progress: play.progress(),
                    error: None,
                }
            }
            Err(e) => SceneView {
                status,
                id: play.current_scene_id().to_string(),
                title: String::new(),
                content: String::new(),
                choices: Vec::new(),
                locked_choices: 0,
                continue_to: None,
                can_retreat: play.can_retreat(),
                progress: play.progress(),
                error: Some(e.to_string()),
            },
        };
        to_json(&view)
    }

    /// Take a choice (or `"continue"`) in one step. Returns the step as JSON.
    pub fn advance(&mut self, choice_id: &str, target: &str) -> Result<String, JsError> {
        let step = self
            .with_play(|play| play.advance(choice_id, target))
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_json(&step)
    }

    /// Start a move; call `finish_transition` when the animation ends.
    pub fn begin_advance(&mut self, choice_id: &str, target: &str) -> Result<(), JsError> {
        self.with_play(|play| play.begin_advance(choice_id, target))
            .map_err(|e| JsError::new(&e.to_string()))
    }

    /// Start a step back. Returns false when already at the first scene.
    pub fn begin_retreat(&mut self) -> Result<bool, JsError> {
        self.with_play(|play| play.begin_retreat())
            .map_err(|e| JsError::new(&e.to_string()))
    }

    /// Commit the pending move. Returns the step as JSON, or `null`.
    pub fn finish_transition(&mut self) -> Result<String, JsError> {
        let step = self.with_play(|play| play.finish_transition());
        to_json(&step)
    }

    pub fn retreat(&mut self) -> Result<String, JsError> {
        let step = self
            .with_play(|play| play.retreat())
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_json(&step)
    }

    pub fn is_transitioning(&self) -> bool {
        self.state.pending.is_some()
    }

    pub fn restart(&mut self) {
        self.state = PlayState::initial(&self.story);
    }

    /// Visible variables with display label, bar fill and rank.
    pub fn variables(&self) -> Result<String, JsError> {
        let play = Playthrough::resume(&self.story, self.state.clone());
        let vars: Vec<VariableView> = play
            .visible_variables()
            .into_iter()
            .map(|(name, var)| VariableView {
                name: name.to_string(),
                label: var.label(name).to_string(),
                value: var.value,
                fill: var.fill_fraction(),
                rank: var.rank().label(),
            })
            .collect();
        to_json(&vars)
    }

    /// The resolved ending and unlocked achievements, for the end view.
    pub fn ending(&self) -> Result<String, JsError> {
        let play = Playthrough::resume(&self.story, self.state.clone());
        let ending = play.ending();
        to_json(&EndingView {
            id: ending.map(|e| e.id.clone()),
            name: ending.map(|e| e.name.clone()),
            description: ending.map(|e| e.description.clone()),
            achievements: self.state.achievements.clone(),
        })
    }

    /// Save the session state as JSON.
    pub fn save_state(&self) -> Result<String, JsError> {
        to_json(&self.state)
    }

    /// Restore a session saved with `save_state`.
    pub fn load_state(&mut self, state_json: &str) -> Result<(), JsError> {
        self.state = serde_json::from_str(state_json)
            .map_err(|e| JsError::new(&format!("Invalid state JSON: {e}")))?;
        Ok(())
    }

    /// Layout of this story with the current scene selected.
    pub fn layout(&self) -> Result<String, JsError> {
        let layout = layout_story(
            &self.story,
            Some(&self.state.current_scene),
            &LayoutOptions::default(),
        );
        to_json(&layout)
    }

    pub fn lint(&self) -> Result<String, JsError> {
        to_json(&lint_story(&self.story))
    }

    pub fn autoplay(&self, runs: usize, seed: u64) -> Result<String, JsError> {
        to_json(&Autoplayer::new().seed(seed).run_many(&self.story, runs))
    }
}

impl StoryPlayer {
    fn for_story(story: Story) -> Self {
        let state = PlayState::initial(&story);
        Self { story, state }
    }

    fn with_play<R>(&mut self, f: impl FnOnce(&mut Playthrough<'_>) -> R) -> R {
        let state = std::mem::take(&mut self.state);
        let mut play = Playthrough::resume(&self.story, state);
        let result = f(&mut play);
        self.state = play.into_state();
        result
    }
}

// ---------------------------------------------------------------------------
// Authoring view helpers
// ---------------------------------------------------------------------------

/// Graph layout for a story given as JSON. `selected` highlights one scene.
#[wasm_bindgen]
pub fn layout_json(story_json: &str, selected: Option<String>) -> Result<String, JsError> {
    let story = parse_story_json(story_json)?;
    to_json(&layout_story(&story, selected.as_deref(), &LayoutOptions::default()))
}

/// Lint report for a story given as JSON.
#[wasm_bindgen]
pub fn lint_json(story_json: &str) -> Result<String, JsError> {
    let story = parse_story_json(story_json)?;
    to_json(&lint_story(&story))
}

/// Check a new scene id against a story. Returns the error message, or an
/// empty string when the id can be used.
#[wasm_bindgen]
pub fn check_scene_id(story_json: &str, scene_id: &str) -> Result<String, JsError> {
    let story = parse_story_json(story_json)?;
    Ok(validate_scene_id(scene_id, &story)
        .err()
        .map(|e| e.to_string())
        .unwrap_or_default())
}
