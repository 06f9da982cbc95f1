/// Autoplay — seeded random walks through a story for authors to exercise
/// every branch and find broken references before readers do.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::core::playthrough::{PlayStatus, Playthrough, Step};
use crate::schema::scene::{SceneId, CONTINUE};
use crate::schema::story::Story;
use crate::schema::variable::VariableMap;

/// How a single walk ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Completed { ending: Option<String> },
    /// Reached a scene with no outgoing edges.
    DeadEnd(SceneId),
    /// Reached an id with no matching scene.
    Broken(SceneId),
    /// Every choice of the scene was gated off.
    Stuck(SceneId),
    /// The engine refused a move.
    Rejected(String),
    StepLimit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoplayRun {
    pub seed: u64,
    pub path: Vec<SceneId>,
    pub outcome: Outcome,
    pub variables: VariableMap,
    pub achievements: Vec<String>,
}

/// Aggregate over many walks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutoplaySummary {
    pub runs: usize,
    pub completions: usize,
    pub dead_ends: usize,
    pub broken: usize,
    pub stuck: usize,
    pub rejected: usize,
    pub step_limits: usize,
    /// Ending id (or "(none)") → runs that reached it.
    pub endings: BTreeMap<String, usize>,
    /// Missing scene id → runs that hit it.
    pub broken_references: BTreeMap<SceneId, usize>,
    pub visited: BTreeSet<SceneId>,
    /// Scenes of the story no run entered.
    pub unvisited: Vec<SceneId>,
}

impl AutoplaySummary {
    pub fn completion_rate(&self) -> f64 {
        if self.runs == 0 {
            return 0.0;
        }
        self.completions as f64 / self.runs as f64
    }
}

/// Label used in `AutoplaySummary::endings` for completions without a
/// matching ending.
pub const NO_ENDING: &str = "(none)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Autoplayer {
    seed: u64,
    max_steps: usize,
}

impl Default for Autoplayer {
    fn default() -> Self {
        Self {
            seed: 0,
            max_steps: 500,
        }
    }
}

impl Autoplayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Moves allowed per walk before it is cut off. Guards against cycles.
    pub fn max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    /// One walk using the configured seed.
    pub fn run(&self, story: &Story) -> AutoplayRun {
        self.run_seeded(story, self.seed)
    }

    /// `runs` walks, each with its own seed derived from the configured one.
    pub fn run_many(&self, story: &Story, runs: usize) -> AutoplaySummary {
        let mut summary = AutoplaySummary::default();
        for i in 0..runs {
            // prime offset per run
            let seed = self.seed.wrapping_add(i as u64 * 7919);
            let run = self.run_seeded(story, seed);

            summary.runs += 1;
            summary.visited.extend(run.path.iter().cloned());
            match run.outcome {
                Outcome::Completed { ending } => {
                    summary.completions += 1;
                    let key = ending.unwrap_or_else(|| NO_ENDING.to_string());
                    *summary.endings.entry(key).or_insert(0) += 1;
                }
                Outcome::DeadEnd(_) => summary.dead_ends += 1,
                Outcome::Broken(id) => {
                    summary.broken += 1;
                    *summary.broken_references.entry(id).or_insert(0) += 1;
                }
                Outcome::Stuck(_) => summary.stuck += 1,
                Outcome::Rejected(_) => summary.rejected += 1,
                Outcome::StepLimit => summary.step_limits += 1,
            }
        }

        let mut unvisited: Vec<SceneId> = story
            .scenes
            .keys()
            .filter(|id| !summary.visited.contains(*id))
            .cloned()
            .collect();
        unvisited.sort_unstable();
        summary.unvisited = unvisited;
        // Broken ids are recorded in paths but are not scenes
        let missing: Vec<SceneId> = summary.broken_references.keys().cloned().collect();
        for id in missing {
            summary.visited.remove(&id);
        }

        debug!(
            story = %story.id,
            runs = summary.runs,
            completions = summary.completions,
            broken = summary.broken,
            "autoplay finished"
        );
        summary
    }

    fn run_seeded(&self, story: &Story, seed: u64) -> AutoplayRun {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut play = Playthrough::new(story);
        let outcome = self.walk(&mut play, &mut rng);
        let state = play.into_state();
        AutoplayRun {
            seed,
            path: state.history,
            outcome,
            variables: state.variables,
            achievements: state.achievements,
        }
    }

    fn walk(&self, play: &mut Playthrough<'_>, rng: &mut StdRng) -> Outcome {
        for _ in 0..self.max_steps {
            match play.status() {
                PlayStatus::Playing => {}
                PlayStatus::DeadEnd => return Outcome::DeadEnd(play.current_scene_id().to_string()),
                PlayStatus::Broken(id) => return Outcome::Broken(id),
                // Neither is reachable from a fresh playthrough driven here
                PlayStatus::Complete | PlayStatus::Transitioning => {
                    return Outcome::Rejected("playthrough was not idle".to_string())
                }
            }

            let result = match play.current_content() {
                Ok(scene) if scene.choices.is_empty() => match scene.fallback_target() {
                    Some(target) => play.advance(CONTINUE, target),
                    None => return Outcome::DeadEnd(scene.id.clone()),
                },
                Ok(scene) => {
                    let available = match play.available_choices() {
                        Ok(choices) => choices,
                        Err(e) => return Outcome::Rejected(e.to_string()),
                    };
                    if available.is_empty() {
                        return Outcome::Stuck(scene.id.clone());
                    }
                    let choice = available[rng.gen_range(0..available.len())];
                    play.advance(&choice.id, &choice.next_scene)
                }
                Err(e) => return Outcome::Rejected(e.to_string()),
            };

            match result {
                Ok(Step::Completed { ending }) => return Outcome::Completed { ending },
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "autoplay move rejected");
                    return Outcome::Rejected(e.to_string());
                }
            }
        }
        Outcome::StepLimit
    }
}
