/// Leveled graph layout for visualizing a story.
///
/// Two breadth-first passes from the start scene: the first assigns each
/// reachable scene a level and a slot within it, the second emits positioned
/// nodes and labeled edges. Both walk `resolve_outgoing`, so `nextScene`
/// fallbacks are laid out like single choices.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::schema::scene::{is_terminal, END_SCENE};
use crate::schema::story::Story;

pub const END_NODE_LABEL: &str = "END";

/// Spacing and sizing knobs for the layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutOptions {
    /// Horizontal distance between levels.
    pub level_spacing: f64,
    /// Vertical distance between nodes in one level.
    pub row_spacing: f64,
    /// Characters of scene content shown in a node label.
    pub preview_chars: usize,
    pub node_width: f64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            level_spacing: 300.0,
            row_spacing: 150.0,
            preview_chars: 50,
            node_width: 200.0,
        }
    }
}

impl LayoutOptions {
    pub fn level_spacing(mut self, spacing: f64) -> Self {
        self.level_spacing = spacing;
        self
    }

    pub fn row_spacing(mut self, spacing: f64) -> Self {
        self.row_spacing = spacing;
        self
    }

    pub fn preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    pub fn node_width(mut self, width: f64) -> Self {
        self.node_width = width;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Scene,
    /// The synthetic node standing in for the `"end"` sentinel.
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutNode {
    pub id: String,
    pub label: String,
    pub position: Position,
    pub level: usize,
    pub kind: NodeKind,
    /// Highlight flag; never affects position.
    pub selected: bool,
    pub width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeMarker {
    ArrowClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutEdge {
    /// `"{source}-{target}-{index}"`, index being the edge's position in
    /// the source scene's outgoing list.
    pub id: String,
    pub source: String,
    pub target: String,
    pub label: String,
    /// `None` for a `nextScene` fallback edge.
    pub choice_id: Option<String>,
    pub marker: EdgeMarker,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphLayout {
    pub nodes: Vec<LayoutNode>,
    pub edges: Vec<LayoutEdge>,
}

impl GraphLayout {
    pub fn node(&self, id: &str) -> Option<&LayoutNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Edges whose target has no node: references to missing scenes.
    pub fn dangling_edges(&self) -> Vec<&LayoutEdge> {
        let ids: FxHashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        self.edges
            .iter()
            .filter(|e| !ids.contains(e.target.as_str()))
            .collect()
    }
}

/// Result of the level-assignment pass.
#[derive(Debug, Clone, Default)]
pub struct LevelAssignment<'a> {
    /// Scene ids per level, in discovery order.
    levels: Vec<Vec<&'a str>>,
    slots: FxHashMap<&'a str, (usize, usize)>,
}

impl<'a> LevelAssignment<'a> {
    /// `(level, index within level)` for a reachable scene.
    pub fn slot(&self, id: &str) -> Option<(usize, usize)> {
        self.slots.get(id).copied()
    }

    pub fn level_of(&self, id: &str) -> Option<usize> {
        self.slot(id).map(|(level, _)| level)
    }

    pub fn levels(&self) -> &[Vec<&'a str>] {
        &self.levels
    }

    pub fn max_level(&self) -> Option<usize> {
        self.levels.len().checked_sub(1)
    }

    /// Number of levelled ids, dangling targets included.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }
}

/// First pass: breadth-first from the start scene. A scene keeps the level
/// at which it was first discovered. `"end"` is not levelled. An id with no
/// scene still takes a slot, so it shifts its siblings and counts toward the
/// last level, but nothing is expanded from it. Unreachable scenes are left
/// out.
pub fn assign_levels(story: &Story) -> LevelAssignment<'_> {
    let mut assignment = LevelAssignment::default();
    let start = story.config.start_scene.as_str();
    if story.scene(start).is_none() {
        return assignment;
    }

    let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(start, 0)]);
    while let Some((id, level)) = queue.pop_front() {
        if assignment.slots.contains_key(id) {
            continue;
        }

        if assignment.levels.len() <= level {
            assignment.levels.resize_with(level + 1, Vec::new);
        }
        let index = assignment.levels[level].len();
        assignment.levels[level].push(id);
        assignment.slots.insert(id, (level, index));

        let Some(scene) = story.scene(id) else {
            continue;
        };

        for edge in scene.outgoing() {
            let target = edge.target;
            if target.is_empty() || is_terminal(target) || assignment.slots.contains_key(target) {
                continue;
            }
            queue.push_back((target, level + 1));
        }
    }
    assignment
}

/// Lay out every scene reachable from the start scene.
///
/// Pure: the same story and selection always give the same layout, and the
/// selection only sets the `selected` flag.
pub fn layout_story(story: &Story, selected: Option<&str>, options: &LayoutOptions) -> GraphLayout {
    let levels = assign_levels(story);
    let mut layout = GraphLayout::default();

    let mut visited: FxHashSet<&str> = FxHashSet::default();
    let mut queue: VecDeque<&str> = VecDeque::new();
    if levels.contains(&story.config.start_scene) {
        queue.push_back(story.config.start_scene.as_str());
    }

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let (Some(scene), Some((level, index))) = (story.scene(id), levels.slot(id)) else {
            continue;
        };

        let count = levels.levels()[level].len();
        layout.nodes.push(LayoutNode {
            id: id.to_string(),
            label: preview(&scene.content, options.preview_chars),
            position: Position {
                x: level as f64 * options.level_spacing,
                y: (index as f64 - (count as f64 - 1.0) / 2.0) * options.row_spacing,
            },
            level,
            kind: NodeKind::Scene,
            selected: selected == Some(id),
            width: options.node_width,
        });

        for (i, edge) in scene.outgoing().into_iter().enumerate() {
            let target = edge.target;
            if target.is_empty() {
                continue;
            }
            layout.edges.push(LayoutEdge {
                id: format!("{}-{}-{}", id, target, i),
                source: id.to_string(),
                target: target.to_string(),
                label: edge.label().to_string(),
                choice_id: edge.choice_id().map(str::to_string),
                marker: EdgeMarker::ArrowClosed,
            });
            if !is_terminal(target) && !visited.contains(target) {
                queue.push_back(target);
            }
        }
    }

    if layout.edges.iter().any(|e| is_terminal(&e.target)) {
        let end_level = levels.max_level().map_or(0, |max| max + 1);
        layout.nodes.push(LayoutNode {
            id: END_SCENE.to_string(),
            label: END_NODE_LABEL.to_string(),
            position: Position {
                x: end_level as f64 * options.level_spacing,
                y: 0.0,
            },
            level: end_level,
            kind: NodeKind::End,
            selected: false,
            width: options.node_width,
        });
    }

    debug!(
        story = %story.id,
        nodes = layout.nodes.len(),
        edges = layout.edges.len(),
        "laid out story graph"
    );
    layout
}

/// The first `chars` characters of `content` followed by an ellipsis.
fn preview(content: &str, chars: usize) -> String {
    let mut label: String = content.chars().take(chars).collect();
    label.push_str("...");
    label
}
