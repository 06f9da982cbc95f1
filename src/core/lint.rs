/// Whole-story static checks: broken references, unreachable scenes,
/// dead ends and malformed content.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::layout::assign_levels;
use crate::core::template::Template;
use crate::schema::condition::Conditions;
use crate::schema::scene::{is_terminal, Scene};
use crate::schema::story::Story;
use crate::schema::validate::is_well_formed_scene_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintIssue {
    pub severity: Severity,
    /// The scene the issue was found in, if any.
    pub scene: Option<String>,
    pub message: String,
}

impl fmt::Display for LintIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        };
        match &self.scene {
            Some(scene) => write!(f, "{}: [{}] {}", level, scene, self.message),
            None => write!(f, "{}: {}", level, self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LintReport {
    pub issues: Vec<LintIssue>,
}

impl LintReport {
    pub fn errors(&self) -> impl Iterator<Item = &LintIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &LintIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    fn error(&mut self, scene: Option<&str>, message: String) {
        self.push(Severity::Error, scene, message);
    }

    fn warn(&mut self, scene: Option<&str>, message: String) {
        self.push(Severity::Warning, scene, message);
    }

    fn push(&mut self, severity: Severity, scene: Option<&str>, message: String) {
        self.issues.push(LintIssue {
            severity,
            scene: scene.map(str::to_string),
            message,
        });
    }
}

/// Run every check over `story`. Scenes are visited in id order so the
/// report is stable.
pub fn lint_story(story: &Story) -> LintReport {
    let mut report = LintReport::default();

    let start = story.config.start_scene.as_str();
    if start.is_empty() {
        report.error(None, "story has no start scene".to_string());
    } else if story.scene(start).is_none() {
        report.error(
            None,
            format!("start scene '{}' does not exist", start),
        );
    }

    let mut ids: Vec<&str> = story.scenes.keys().map(String::as_str).collect();
    ids.sort_unstable();

    let produced = produced_variables(story);
    let declared_achievements: FxHashSet<&str> =
        story.config.achievements.iter().map(|a| a.id.as_str()).collect();

    for &id in &ids {
        let scene = &story.scenes[id];
        check_scene(story, id, scene, &mut report);
        if let Some(conditions) = &scene.conditions {
            check_conditions(conditions, Some(id), &produced, &declared_achievements, &mut report);
        }
        for choice in &scene.choices {
            if let Some(conditions) = &choice.conditions {
                check_conditions(conditions, Some(id), &produced, &declared_achievements, &mut report);
            }
            if let Some(consequences) = &choice.consequences {
                for achievement in &consequences.achievements {
                    if !declared_achievements.is_empty()
                        && !declared_achievements.contains(achievement.as_str())
                    {
                        report.warn(
                            Some(id),
                            format!(
                                "choice '{}' unlocks undeclared achievement '{}'",
                                choice.id, achievement
                            ),
                        );
                    }
                }
            }
        }
    }

    for ending in &story.config.endings {
        check_conditions(&ending.conditions, None, &produced, &declared_achievements, &mut report);
    }

    let levels = assign_levels(story);
    if levels.slot_count() > 0 {
        for &id in &ids {
            if !levels.contains(id) {
                report.warn(
                    Some(id),
                    "scene is not reachable from the start scene".to_string(),
                );
            }
        }

        let reaches_end = levels.levels().iter().flatten().any(|id| {
            story
                .scene(id)
                .map_or(false, |scene| scene.outgoing().iter().any(|e| is_terminal(e.target)))
        });
        if !reaches_end {
            report.warn(None, "no reachable scene leads to the end".to_string());
        }
    }

    report
}

fn check_scene(story: &Story, id: &str, scene: &Scene, report: &mut LintReport) {
    if scene.id != id {
        report.error(
            Some(id),
            format!("scene is stored under '{}' but its id is '{}'", id, scene.id),
        );
    }
    if !is_well_formed_scene_id(id) {
        report.warn(
            Some(id),
            "scene id should only contain lowercase letters, numbers, hyphens, and underscores"
                .to_string(),
        );
    }

    let mut seen_choices: FxHashSet<&str> = FxHashSet::default();
    for choice in &scene.choices {
        if !seen_choices.insert(choice.id.as_str()) {
            report.error(Some(id), format!("duplicate choice id '{}'", choice.id));
        }
        if choice.text.trim().is_empty() {
            report.warn(Some(id), format!("choice '{}' has no text", choice.id));
        }
    }

    if !scene.choices.is_empty() && scene.fallback_target().is_some() {
        report.warn(
            Some(id),
            "nextScene is ignored because the scene has choices".to_string(),
        );
    }

    let outgoing = scene.outgoing();
    if outgoing.is_empty() {
        report.warn(Some(id), "scene is a dead end".to_string());
    }
    for edge in &outgoing {
        let via = match edge.choice_id() {
            Some(choice) => format!("choice '{}'", choice),
            None => "nextScene".to_string(),
        };
        if edge.target.is_empty() {
            report.error(Some(id), format!("{} has no next scene", via));
        } else if !is_terminal(edge.target) && story.scene(edge.target).is_none() {
            report.error(
                Some(id),
                format!("{} points to scene '{}', which does not exist", via, edge.target),
            );
        }
    }

    check_content(id, scene, report);
}

fn check_content(id: &str, scene: &Scene, report: &mut LintReport) {
    if scene.content_variables.is_empty() {
        return;
    }
    let template = match Template::parse(&scene.content) {
        Ok(t) => t,
        Err(e) => {
            report.error(Some(id), format!("content does not parse: {}", e));
            return;
        }
    };

    let mut used: FxHashSet<&str> = FxHashSet::default();
    for key in template.placeholders() {
        if used.insert(key) && !scene.content_variables.contains_key(key) {
            report.warn(Some(id), format!("placeholder '{{{}}}' has no content variable", key));
        }
    }
    for key in scene.content_variables.keys() {
        if !used.contains(key.as_str()) {
            report.warn(Some(id), format!("content variable '{}' is never used", key));
        }
    }
}

fn check_conditions(
    conditions: &Conditions,
    scene: Option<&str>,
    produced: &FxHashSet<&str>,
    achievements: &FxHashSet<&str>,
    report: &mut LintReport,
) {
    for name in conditions.required_variables.keys() {
        if !produced.contains(name.as_str()) {
            report.warn(
                scene,
                format!("condition reads variable '{}', which is never declared or changed", name),
            );
        }
    }
    for achievement in &conditions.required_achievements {
        if !achievements.is_empty() && !achievements.contains(achievement.as_str()) {
            report.warn(
                scene,
                format!("condition requires undeclared achievement '{}'", achievement),
            );
        }
    }
}

/// Variables that exist by default or are written by some consequence.
fn produced_variables(story: &Story) -> FxHashSet<&str> {
    let mut names: FxHashSet<&str> = story
        .config
        .default_variables
        .keys()
        .map(String::as_str)
        .collect();
    for scene in story.scenes.values() {
        for choice in &scene.choices {
            if let Some(consequences) = &choice.consequences {
                names.extend(consequences.variables.keys().map(String::as_str));
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::scene::{Choice, ContentVariable};
    use crate::schema::variable::VariableRange;
    use std::collections::BTreeMap;

    fn messages(report: &LintReport, severity: Severity) -> Vec<String> {
        report
            .issues
            .iter()
            .filter(|i| i.severity == severity)
            .map(|i| i.to_string())
            .collect()
    }

    #[test]
    fn clean_story() {
        let story = Story::new("Clean", "start")
            .with_scene(
                Scene::new("start", "Start", "")
                    .with_choice(Choice::new("go", "Go", "mid").with_delta("trust", 1)),
            )
            .with_scene(Scene::new("mid", "Mid", "").with_next("end"));
        let report = lint_story(&story);
        assert!(report.is_clean(), "unexpected issues: {:?}", report.issues);
    }

    #[test]
    fn missing_start_scene() {
        let story = Story::new("Broken", "start").with_scene(Scene::new("other", "O", "").with_next("end"));
        let report = lint_story(&story);
        assert!(report.has_errors());
        assert!(messages(&report, Severity::Error)[0].contains("'start' does not exist"));
    }

    #[test]
    fn dangling_and_empty_targets() {
        let story = Story::new("Dangling", "start").with_scene(
            Scene::new("start", "Start", "")
                .with_choice(Choice::new("a", "A", "missing"))
                .with_choice(Choice::new("b", "B", ""))
                .with_choice(Choice::new("c", "C", "end")),
        );
        let errors = messages(&lint_story(&story), Severity::Error);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("'missing'"));
        assert!(errors[1].contains("choice 'b' has no next scene"));
    }

    #[test]
    fn key_mismatch_and_duplicate_choices() {
        let mut story = Story::new("Mismatch", "start").with_scene(
            Scene::new("start", "Start", "")
                .with_choice(Choice::new("a", "A", "end"))
                .with_choice(Choice::new("a", "Again", "end")),
        );
        story
            .scenes
            .insert("alias".to_string(), Scene::new("real", "R", "").with_next("end"));
        let errors = messages(&lint_story(&story), Severity::Error);
        assert!(errors.iter().any(|e| e.contains("stored under 'alias'")));
        assert!(errors.iter().any(|e| e.contains("duplicate choice id 'a'")));
    }

    #[test]
    fn unreachable_and_dead_end_warnings() {
        let story = Story::new("Warnings", "start")
            .with_scene(Scene::new("start", "Start", "").with_next("stuck"))
            .with_scene(Scene::new("stuck", "Stuck", ""))
            .with_scene(Scene::new("orphan", "Orphan", "").with_next("end"));
        let report = lint_story(&story);
        assert!(!report.has_errors());
        let warnings = messages(&report, Severity::Warning);
        assert!(warnings.iter().any(|w| w.contains("[orphan] scene is not reachable")));
        assert!(warnings.iter().any(|w| w.contains("[stuck] scene is a dead end")));
        assert!(warnings.iter().any(|w| w.contains("no reachable scene leads to the end")));
    }

    #[test]
    fn content_variable_checks() {
        let mut scene = Scene::new("start", "Start", "The {crowd} {unknown}.").with_next("end");
        scene.content_variables.insert(
            "crowd".to_string(),
            ContentVariable {
                default_text: "crowd".to_string(),
                conditions: Vec::new(),
            },
        );
        scene.content_variables.insert(
            "spare".to_string(),
            ContentVariable {
                default_text: "spare".to_string(),
                conditions: Vec::new(),
            },
        );
        let story = Story::new("Content", "start").with_scene(scene.clone());
        let warnings = messages(&lint_story(&story), Severity::Warning);
        assert!(warnings.iter().any(|w| w.contains("'{unknown}'")));
        assert!(warnings.iter().any(|w| w.contains("'spare' is never used")));

        scene.content = "Broken {crowd".to_string();
        let story = Story::new("Content", "start").with_scene(scene);
        assert!(lint_story(&story).has_errors());
    }

    #[test]
    fn conditions_on_unknown_variables() {
        let mut choice = Choice::new("go", "Go", "end");
        choice.conditions = Some(Conditions {
            required_variables: BTreeMap::from([(
                "courage".to_string(),
                VariableRange {
                    min: Some(1),
                    max: None,
                },
            )]),
            required_achievements: Vec::new(),
        });
        let story = Story::new("Cond", "start").with_scene(Scene::new("start", "Start", "").with_choice(choice));
        let warnings = messages(&lint_story(&story), Severity::Warning);
        assert!(warnings.iter().any(|w| w.contains("'courage'")));
    }

    #[test]
    fn issue_display() {
        let issue = LintIssue {
            severity: Severity::Warning,
            scene: Some("mid".to_string()),
            message: "scene is a dead end".to_string(),
        };
        assert_eq!(issue.to_string(), "WARNING: [mid] scene is a dead end");
    }
}
