/// Playthrough state machine — progression, back-navigation, variable
/// accumulation, choice gating and ending resolution over a story snapshot.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::template::render_content;
use crate::schema::scene::{is_terminal, Choice, Consequences, Scene, SceneId, CONTINUE};
use crate::schema::story::{Ending, Story};
use crate::schema::variable::{StoryVariable, VariableMap};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaythroughError {
    #[error("Scene {0} is referenced but not found in the story.")]
    SceneNotFound(SceneId),
    #[error("a transition is already in progress")]
    TransitionInProgress,
    #[error("the playthrough is already complete")]
    Completed,
    #[error("scene '{scene}' has no choice '{choice}'")]
    UnknownChoice { scene: SceneId, choice: String },
    #[error("scene '{scene}' has no edge to '{target}'")]
    UnknownEdge { scene: SceneId, target: SceneId },
    #[error("choice '{0}' is not available")]
    ChoiceUnavailable(String),
}

/// A validated move waiting to be committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// `choice` is `None` when following the `nextScene` fallback.
    Advance {
        choice: Option<String>,
        target: SceneId,
    },
    Retreat,
}

/// What a committed transition did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    Entered(SceneId),
    Retreated(SceneId),
    /// The `"end"` sentinel was reached. Carries the resolved ending id.
    Completed { ending: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayStatus {
    Playing,
    Transitioning,
    /// The current scene has no outgoing edges.
    DeadEnd,
    Complete,
    /// The current scene id has no matching scene.
    Broken(SceneId),
}

/// Per-session state. Never written back to the story.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayState {
    pub variables: VariableMap,
    pub current_scene: SceneId,
    /// Visited scenes, oldest first. Its last entry is always `current_scene`.
    pub history: Vec<SceneId>,
    /// Unlocked achievement ids in unlock order.
    pub achievements: Vec<String>,
    pub completed: bool,
    pub ending: Option<String>,
    pub pending: Option<Transition>,
}

impl PlayState {
    /// Fresh state for `story`: default variables copied, history at the start scene.
    pub fn initial(story: &Story) -> Self {
        let start = story.config.start_scene.clone();
        Self {
            variables: story.config.default_variables.clone(),
            current_scene: start.clone(),
            history: vec![start],
            achievements: Vec::new(),
            completed: false,
            ending: None,
            pending: None,
        }
    }
}

/// A reader's walk through one story.
///
/// Moves are two-phase: `begin_advance` / `begin_retreat` validate and park
/// a transition, `finish_transition` commits it. While a transition is
/// parked every other move is rejected. `advance` / `retreat` do both
/// phases at once for hosts without a transition animation.
///
/// Variable changes are never rolled back by `retreat`.
#[derive(Debug, Clone)]
pub struct Playthrough<'a> {
    story: &'a Story,
    state: PlayState,
}

impl<'a> Playthrough<'a> {
    pub fn new(story: &'a Story) -> Self {
        debug!(story = %story.id, start = %story.config.start_scene, "starting playthrough");
        Self {
            story,
            state: PlayState::initial(story),
        }
    }

    /// Continue from a previously saved state.
    pub fn resume(story: &'a Story, state: PlayState) -> Self {
        Self { story, state }
    }

    pub fn into_state(self) -> PlayState {
        self.state
    }

    pub fn state(&self) -> &PlayState {
        &self.state
    }

    pub fn story(&self) -> &'a Story {
        self.story
    }

    /// Discard all progress and start over from the story's defaults.
    pub fn restart(&mut self) {
        self.state = PlayState::initial(self.story);
    }

    pub fn current_scene_id(&self) -> &str {
        &self.state.current_scene
    }

    pub fn history(&self) -> &[SceneId] {
        &self.state.history
    }

    pub fn variables(&self) -> &VariableMap {
        &self.state.variables
    }

    pub fn achievements(&self) -> &[String] {
        &self.state.achievements
    }

    pub fn is_transitioning(&self) -> bool {
        self.state.pending.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.state.completed
    }

    /// The ending resolved when the playthrough completed.
    pub fn ending(&self) -> Option<&'a Ending> {
        let id = self.state.ending.as_deref()?;
        self.story.config.endings.iter().find(|e| e.id == id)
    }

    /// The scene the reader is on.
    pub fn current_content(&self) -> Result<&'a Scene, PlaythroughError> {
        self.story
            .scene(&self.state.current_scene)
            .ok_or_else(|| PlaythroughError::SceneNotFound(self.state.current_scene.clone()))
    }

    /// The current scene's content with content variables substituted.
    pub fn rendered_content(&self) -> Result<String, PlaythroughError> {
        let scene = self.current_content()?;
        Ok(render_content(scene, &self.state.variables))
    }

    /// Choices of the current scene that pass their gating conditions.
    pub fn available_choices(&self) -> Result<Vec<&'a Choice>, PlaythroughError> {
        let scene = self.current_content()?;
        Ok(scene
            .choices
            .iter()
            .filter(|choice| self.is_choice_available(choice))
            .collect())
    }

    /// A choice is available when its own conditions hold and, if it leads
    /// to a real scene with conditions, that scene's conditions hold too.
    pub fn is_choice_available(&self, choice: &Choice) -> bool {
        let vars = &self.state.variables;
        let achievements = &self.state.achievements;
        let own = choice
            .conditions
            .as_ref()
            .map_or(true, |c| c.is_met(vars, achievements));
        let target = self
            .story
            .scene(&choice.next_scene)
            .and_then(|scene| scene.conditions.as_ref())
            .map_or(true, |c| c.is_met(vars, achievements));
        own && target
    }

    pub fn can_retreat(&self) -> bool {
        !self.state.completed && !self.is_transitioning() && self.state.history.len() > 1
    }

    /// `history.len() / scene count`. Cycles and unreachable scenes are not
    /// accounted for, so this is only a display hint.
    pub fn progress(&self) -> f64 {
        let total = self.story.scene_count();
        if total == 0 {
            return 0.0;
        }
        self.state.history.len() as f64 / total as f64
    }

    pub fn status(&self) -> PlayStatus {
        if self.state.completed {
            return PlayStatus::Complete;
        }
        if self.is_transitioning() {
            return PlayStatus::Transitioning;
        }
        match self.current_content() {
            Ok(scene) if scene.outgoing().is_empty() => PlayStatus::DeadEnd,
            Ok(_) => PlayStatus::Playing,
            Err(_) => PlayStatus::Broken(self.state.current_scene.clone()),
        }
    }

    /// Non-hidden variables in name order.
    pub fn visible_variables(&self) -> Vec<(&str, &StoryVariable)> {
        self.state
            .variables
            .iter()
            .filter(|(_, var)| !var.hidden)
            .map(|(name, var)| (name.as_str(), var))
            .collect()
    }

    /// Validate a move along `choice_id` (or `"continue"`) to `target` and
    /// park it until `finish_transition`.
    pub fn begin_advance(&mut self, choice_id: &str, target: &str) -> Result<(), PlaythroughError> {
        let transition = self.prepare_advance(choice_id, target)?;
        self.state.pending = Some(transition);
        Ok(())
    }

    /// Park a step back. Returns `false` (and parks nothing) when already at
    /// the first scene.
    pub fn begin_retreat(&mut self) -> Result<bool, PlaythroughError> {
        self.check_idle()?;
        if self.state.history.len() <= 1 {
            return Ok(false);
        }
        self.state.pending = Some(Transition::Retreat);
        Ok(true)
    }

    /// Commit the parked transition, if any.
    pub fn finish_transition(&mut self) -> Option<Step> {
        let transition = self.state.pending.take()?;
        Some(self.commit(transition))
    }

    /// Validate and commit a move in one call.
    pub fn advance(&mut self, choice_id: &str, target: &str) -> Result<Step, PlaythroughError> {
        let transition = self.prepare_advance(choice_id, target)?;
        Ok(self.commit(transition))
    }

    /// Step back one scene. `Ok(None)` when already at the first scene.
    pub fn retreat(&mut self) -> Result<Option<Step>, PlaythroughError> {
        if self.begin_retreat()? {
            Ok(self.finish_transition())
        } else {
            Ok(None)
        }
    }

    fn check_idle(&self) -> Result<(), PlaythroughError> {
        if self.state.completed {
            return Err(PlaythroughError::Completed);
        }
        if self.is_transitioning() {
            return Err(PlaythroughError::TransitionInProgress);
        }
        Ok(())
    }

    fn prepare_advance(&self, choice_id: &str, target: &str) -> Result<Transition, PlaythroughError> {
        self.check_idle()?;
        let scene = self.current_content()?;

        if scene.choices.is_empty() {
            if choice_id != CONTINUE {
                return Err(PlaythroughError::UnknownChoice {
                    scene: scene.id.clone(),
                    choice: choice_id.to_string(),
                });
            }
            if scene.fallback_target() != Some(target) {
                return Err(PlaythroughError::UnknownEdge {
                    scene: scene.id.clone(),
                    target: target.to_string(),
                });
            }
            return Ok(Transition::Advance {
                choice: None,
                target: target.to_string(),
            });
        }

        let choice = scene
            .find_choice(choice_id)
            .ok_or_else(|| PlaythroughError::UnknownChoice {
                scene: scene.id.clone(),
                choice: choice_id.to_string(),
            })?;
        if choice.next_scene != target {
            return Err(PlaythroughError::UnknownEdge {
                scene: scene.id.clone(),
                target: target.to_string(),
            });
        }
        if !self.is_choice_available(choice) {
            return Err(PlaythroughError::ChoiceUnavailable(choice.id.clone()));
        }

        Ok(Transition::Advance {
            choice: Some(choice.id.clone()),
            target: target.to_string(),
        })
    }

    fn commit(&mut self, transition: Transition) -> Step {
        let story = self.story;
        match transition {
            Transition::Advance { choice, target } => {
                let consequences = choice.as_deref().and_then(|id| {
                    story
                        .scene(&self.state.current_scene)
                        .and_then(|scene| scene.find_choice(id))
                        .and_then(|c| c.consequences.as_ref())
                });
                if let Some(consequences) = consequences {
                    self.apply_consequences(consequences);
                }

                if is_terminal(&target) {
                    self.state.completed = true;
                    self.state.ending = self.resolve_ending().map(|e| e.id.clone());
                    info!(
                        story = %self.story.id,
                        ending = ?self.state.ending,
                        steps = self.state.history.len(),
                        "playthrough complete"
                    );
                    return Step::Completed {
                        ending: self.state.ending.clone(),
                    };
                }

                if self.story.scene(&target).is_none() {
                    warn!(story = %self.story.id, scene = %target, "entered a scene that does not exist");
                } else {
                    debug!(story = %self.story.id, scene = %target, "entered scene");
                }
                self.state.current_scene = target.clone();
                self.state.history.push(target.clone());
                Step::Entered(target)
            }
            Transition::Retreat => {
                self.state.history.pop();
                if let Some(last) = self.state.history.last() {
                    self.state.current_scene = last.clone();
                }
                debug!(story = %self.story.id, scene = %self.state.current_scene, "retreated");
                Step::Retreated(self.state.current_scene.clone())
            }
        }
    }

    /// Deltas are additive. A variable missing from the state is created at
    /// `0 + delta`, even if the story never declared it.
    fn apply_consequences(&mut self, consequences: &Consequences) {
        for (name, delta) in &consequences.variables {
            let var = self
                .state
                .variables
                .entry(name.clone())
                .or_insert_with(|| StoryVariable::with_value(0));
            var.value = var.value.saturating_add(*delta);
        }
        for achievement in &consequences.achievements {
            if !self.state.achievements.contains(achievement) {
                debug!(achievement = %achievement, "achievement unlocked");
                self.state.achievements.push(achievement.clone());
            }
        }
    }

    fn resolve_ending(&self) -> Option<&'a Ending> {
        self.story
            .config
            .endings
            .iter()
            .find(|e| e.conditions.is_met(&self.state.variables, &self.state.achievements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::condition::Conditions;
    use crate::schema::scene::Choice;
    use crate::schema::variable::VariableRange;
    use std::collections::BTreeMap;

    fn branching_story() -> Story {
        Story::new("Branches", "start")
            .with_variable("trust", 0)
            .with_scene(
                Scene::new("start", "Start", "A fork.")
                    .with_choice(Choice::new("left", "Go left", "left").with_delta("trust", 1))
                    .with_choice(Choice::new("right", "Go right", "right").with_delta("trust", 2)),
            )
            .with_scene(
                Scene::new("left", "Left", "Left path.")
                    .with_choice(Choice::new("on", "Onward", "right").with_delta("trust", 2)),
            )
            .with_scene(Scene::new("right", "Right", "Right path.").with_next("end"))
    }

    #[test]
    fn initial_state() {
        let story = branching_story();
        let play = Playthrough::new(&story);
        assert_eq!(play.current_scene_id(), "start");
        assert_eq!(play.history(), &["start".to_string()]);
        assert_eq!(play.variables()["trust"].value, 0);
        assert_eq!(play.status(), PlayStatus::Playing);
    }

    #[test]
    fn default_variables_are_copied() {
        let story = branching_story();
        let mut play = Playthrough::new(&story);
        play.advance("left", "left").unwrap();
        assert_eq!(play.variables()["trust"].value, 1);
        assert_eq!(story.config.default_variables["trust"].value, 0);

        let fresh = Playthrough::new(&story);
        assert_eq!(fresh.variables()["trust"].value, 0);
    }

    #[test]
    fn history_grows_by_one_per_advance() {
        let story = branching_story();
        let mut play = Playthrough::new(&story);
        for (choice, target) in [("left", "left"), ("on", "right")] {
            let before = play.history().len();
            play.advance(choice, target).unwrap();
            assert_eq!(play.history().len(), before + 1);
            assert_eq!(play.history().last().map(String::as_str), Some(play.current_scene_id()));
        }
    }

    #[test]
    fn retreat_at_start_is_noop() {
        let story = branching_story();
        let mut play = Playthrough::new(&story);
        let before = play.state().clone();
        assert_eq!(play.retreat().unwrap(), None);
        assert_eq!(play.state(), &before);
        assert!(!play.can_retreat());
    }

    #[test]
    fn retreat_keeps_variables() {
        let story = branching_story();
        let mut play = Playthrough::new(&story);
        play.advance("left", "left").unwrap();
        assert_eq!(
            play.retreat().unwrap(),
            Some(Step::Retreated("start".to_string()))
        );
        assert_eq!(play.current_scene_id(), "start");
        assert_eq!(play.history().len(), 1);
        play.advance("right", "right").unwrap();
        assert_eq!(play.variables()["trust"].value, 3);
    }

    #[test]
    fn continue_into_end_completes() {
        let story = branching_story();
        let mut play = Playthrough::new(&story);
        play.advance("right", "right").unwrap();
        let step = play.advance(CONTINUE, "end").unwrap();
        assert_eq!(step, Step::Completed { ending: None });
        assert!(play.is_complete());
        assert_eq!(play.current_scene_id(), "right");
        assert_eq!(play.status(), PlayStatus::Complete);
        assert_eq!(
            play.advance(CONTINUE, "end"),
            Err(PlaythroughError::Completed)
        );
        assert_eq!(play.retreat(), Err(PlaythroughError::Completed));
    }

    #[test]
    fn rejects_edges_not_in_scene() {
        let story = branching_story();
        let mut play = Playthrough::new(&story);
        assert!(matches!(
            play.advance("nope", "left"),
            Err(PlaythroughError::UnknownChoice { .. })
        ));
        assert!(matches!(
            play.advance("left", "right"),
            Err(PlaythroughError::UnknownEdge { .. })
        ));
        assert!(matches!(
            play.advance(CONTINUE, "left"),
            Err(PlaythroughError::UnknownChoice { .. })
        ));
        play.advance("right", "right").unwrap();
        assert!(matches!(
            play.advance(CONTINUE, "start"),
            Err(PlaythroughError::UnknownEdge { .. })
        ));
        assert_eq!(play.history().len(), 2);
    }

    #[test]
    fn pending_transition_blocks_other_moves() {
        let story = branching_story();
        let mut play = Playthrough::new(&story);
        play.begin_advance("left", "left").unwrap();
        assert!(play.is_transitioning());
        assert_eq!(play.status(), PlayStatus::Transitioning);
        // Nothing committed yet
        assert_eq!(play.current_scene_id(), "start");
        assert_eq!(play.variables()["trust"].value, 0);

        assert_eq!(
            play.begin_advance("left", "left"),
            Err(PlaythroughError::TransitionInProgress)
        );
        assert_eq!(
            play.advance("right", "right"),
            Err(PlaythroughError::TransitionInProgress)
        );
        assert_eq!(
            play.begin_retreat(),
            Err(PlaythroughError::TransitionInProgress)
        );

        assert_eq!(
            play.finish_transition(),
            Some(Step::Entered("left".to_string()))
        );
        assert_eq!(play.history().len(), 2);
        assert_eq!(play.variables()["trust"].value, 1);
        assert_eq!(play.finish_transition(), None);
    }

    #[test]
    fn deferred_retreat() {
        let story = branching_story();
        let mut play = Playthrough::new(&story);
        play.advance("left", "left").unwrap();
        assert!(play.begin_retreat().unwrap());
        assert_eq!(play.current_scene_id(), "left");
        assert_eq!(
            play.finish_transition(),
            Some(Step::Retreated("start".to_string()))
        );
        assert!(!play.begin_retreat().unwrap());
        assert!(!play.is_transitioning());
    }

    #[test]
    fn dangling_target_reports_scene_not_found() {
        let story = Story::new("Dangling", "start").with_scene(
            Scene::new("start", "Start", "").with_choice(Choice::new("go", "Go", "missing")),
        );
        let mut play = Playthrough::new(&story);
        play.advance("go", "missing").unwrap();
        assert_eq!(
            play.current_content(),
            Err(PlaythroughError::SceneNotFound("missing".to_string()))
        );
        assert_eq!(play.status(), PlayStatus::Broken("missing".to_string()));
        let message = play.current_content().unwrap_err().to_string();
        assert!(message.contains("missing"));
        // Back-navigation still works from a broken scene
        play.retreat().unwrap();
        assert_eq!(play.current_scene_id(), "start");
    }

    #[test]
    fn missing_start_scene_is_reported() {
        let story = Story::new("Empty", "start");
        let mut play = Playthrough::new(&story);
        assert_eq!(play.status(), PlayStatus::Broken("start".to_string()));
        assert!(matches!(
            play.advance(CONTINUE, "end"),
            Err(PlaythroughError::SceneNotFound(_))
        ));
        assert_eq!(play.progress(), 0.0);
    }

    #[test]
    fn undeclared_variable_is_created() {
        let story = Story::new("Auto", "start").with_scene(
            Scene::new("start", "Start", "")
                .with_choice(Choice::new("doubt", "Doubt", "end").with_delta("trust", -1)),
        );
        let mut play = Playthrough::new(&story);
        assert!(play.variables().is_empty());
        play.advance("doubt", "end").unwrap();
        assert_eq!(play.variables()["trust"].value, -1);
        assert!(!play.variables()["trust"].hidden);
    }

    #[test]
    fn dead_end_status() {
        let story = Story::new("Dead", "start")
            .with_scene(Scene::new("start", "Start", "").with_next("stuck"))
            .with_scene(Scene::new("stuck", "Stuck", ""));
        let mut play = Playthrough::new(&story);
        play.advance(CONTINUE, "stuck").unwrap();
        assert_eq!(play.status(), PlayStatus::DeadEnd);
    }

    #[test]
    fn gated_choices() {
        let gate = Conditions {
            required_variables: BTreeMap::from([(
                "trust".to_string(),
                VariableRange {
                    min: Some(2),
                    max: None,
                },
            )]),
            required_achievements: Vec::new(),
        };
        let mut secret = Choice::new("secret", "Share the secret", "end");
        secret.conditions = Some(gate.clone());
        let mut vault = Scene::new("vault", "Vault", "");
        vault.conditions = Some(gate);

        let story = Story::new("Gates", "start")
            .with_variable("trust", 0)
            .with_scene(
                Scene::new("start", "Start", "")
                    .with_choice(Choice::new("talk", "Talk", "start").with_delta("trust", 1))
                    .with_choice(secret)
                    .with_choice(Choice::new("open", "Open the vault", "vault")),
            )
            .with_scene(vault);

        let mut play = Playthrough::new(&story);
        let ids: Vec<&str> = play
            .available_choices()
            .unwrap()
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["talk"]);
        assert_eq!(
            play.advance("secret", "end"),
            Err(PlaythroughError::ChoiceUnavailable("secret".to_string()))
        );

        play.advance("talk", "start").unwrap();
        play.advance("talk", "start").unwrap();
        assert_eq!(play.available_choices().unwrap().len(), 3);
        assert_eq!(play.advance("open", "vault").unwrap(), Step::Entered("vault".to_string()));
    }

    #[test]
    fn endings_and_achievements() {
        let mut ally = Choice::new("ally", "Join them", "end").with_delta("trust", 2);
        if let Some(c) = ally.consequences.as_mut() {
            c.achievements.push("ally".to_string());
        }
        let mut story = Story::new("Endings", "start")
            .with_variable("trust", 0)
            .with_scene(
                Scene::new("start", "Start", "")
                    .with_choice(ally)
                    .with_choice(Choice::new("leave", "Leave", "end")),
            );
        story.config.endings = vec![
            Ending {
                id: "alliance".to_string(),
                name: "Alliance".to_string(),
                description: String::new(),
                conditions: Conditions {
                    required_variables: BTreeMap::new(),
                    required_achievements: vec!["ally".to_string()],
                },
            },
            Ending {
                id: "alone".to_string(),
                name: "Alone".to_string(),
                description: String::new(),
                conditions: Conditions::default(),
            },
        ];

        let mut play = Playthrough::new(&story);
        let step = play.advance("ally", "end").unwrap();
        assert_eq!(
            step,
            Step::Completed {
                ending: Some("alliance".to_string())
            }
        );
        assert_eq!(play.achievements(), &["ally".to_string()]);
        assert_eq!(play.ending().map(|e| e.name.as_str()), Some("Alliance"));

        play.restart();
        assert!(!play.is_complete());
        assert!(play.achievements().is_empty());
        let step = play.advance("leave", "end").unwrap();
        assert_eq!(
            step,
            Step::Completed {
                ending: Some("alone".to_string())
            }
        );
    }

    #[test]
    fn progress_and_visible_variables() {
        let mut story = branching_story();
        story
            .config
            .default_variables
            .insert("secret".to_string(), StoryVariable {
                value: 7,
                hidden: true,
                ..StoryVariable::default()
            });
        let mut play = Playthrough::new(&story);
        assert!((play.progress() - 1.0 / 3.0).abs() < 1e-9);
        play.advance("left", "left").unwrap();
        assert!((play.progress() - 2.0 / 3.0).abs() < 1e-9);

        let visible: Vec<&str> = play.visible_variables().iter().map(|(k, _)| *k).collect();
        assert_eq!(visible, vec!["trust"]);
    }

    #[test]
    fn resume_from_saved_state() {
        let story = branching_story();
        let mut play = Playthrough::new(&story);
        play.advance("left", "left").unwrap();
        let saved = play.into_state();

        let resumed = Playthrough::resume(&story, saved.clone());
        assert_eq!(resumed.current_scene_id(), "left");
        assert_eq!(resumed.state(), &saved);
    }
}
