/// Scene content templates — `{key}` placeholders filled from content variables.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::schema::condition::ranges_hold;
use crate::schema::scene::{ContentVariable, Scene};
use crate::schema::variable::VariableMap;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template parse error: {0}")]
    Parse(String),
}

/// A segment of parsed scene content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateSegment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// Reference to a content variable: `{key}`.
    Placeholder(String),
}

/// Parsed scene content — a sequence of segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub segments: Vec<TemplateSegment>,
}

impl Template {
    /// Parse content into literal text and placeholders.
    ///
    /// Syntax:
    /// - `{key}` → `Placeholder`
    /// - `{{` / `}}` → literal `{` / `}`
    /// - Everything else → `Literal`
    pub fn parse(input: &str) -> Result<Template, TemplateError> {
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            match chars[i] {
                '{' if i + 1 < len && chars[i + 1] == '{' => {
                    literal_buf.push('{');
                    i += 2;
                }
                '{' => {
                    let start = i + 1;
                    let mut end = start;
                    while end < len && chars[end] != '}' {
                        if chars[end] == '{' {
                            return Err(TemplateError::Parse(
                                "nested braces are not allowed".to_string(),
                            ));
                        }
                        end += 1;
                    }
                    if end == len {
                        return Err(TemplateError::Parse("unclosed brace".to_string()));
                    }

                    let key: String = chars[start..end].iter().collect();
                    let key = key.trim();
                    if key.is_empty() {
                        return Err(TemplateError::Parse("empty braces".to_string()));
                    }

                    if !literal_buf.is_empty() {
                        segments.push(TemplateSegment::Literal(std::mem::take(&mut literal_buf)));
                    }
                    segments.push(TemplateSegment::Placeholder(key.to_string()));
                    i = end + 1;
                }
                '}' if i + 1 < len && chars[i + 1] == '}' => {
                    literal_buf.push('}');
                    i += 2;
                }
                '}' => {
                    return Err(TemplateError::Parse(
                        "unmatched closing brace".to_string(),
                    ));
                }
                c => {
                    literal_buf.push(c);
                    i += 1;
                }
            }
        }

        if !literal_buf.is_empty() {
            segments.push(TemplateSegment::Literal(literal_buf));
        }

        Ok(Template { segments })
    }

    /// Placeholder keys in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|seg| match seg {
            TemplateSegment::Placeholder(key) => Some(key.as_str()),
            TemplateSegment::Literal(_) => None,
        })
    }
}

/// The text of the first variant whose ranges all hold, else the default.
pub fn select_variant<'a>(var: &'a ContentVariable, variables: &VariableMap) -> &'a str {
    var.conditions
        .iter()
        .find(|variant| ranges_hold(&variant.variables, variables))
        .map_or(var.default_text.as_str(), |variant| variant.text.as_str())
}

/// Render a scene's content against the current variables.
///
/// Placeholders without a matching content variable are kept verbatim.
/// Content that fails to parse is returned unchanged.
pub fn render_content(scene: &Scene, variables: &VariableMap) -> String {
    if scene.content_variables.is_empty() {
        return scene.content.clone();
    }

    let template = match Template::parse(&scene.content) {
        Ok(t) => t,
        Err(e) => {
            warn!(scene = %scene.id, error = %e, "rendering scene content verbatim");
            return scene.content.clone();
        }
    };

    let mut out = String::with_capacity(scene.content.len());
    for segment in &template.segments {
        match segment {
            TemplateSegment::Literal(text) => out.push_str(text),
            TemplateSegment::Placeholder(key) => match scene.content_variables.get(key) {
                Some(var) => out.push_str(select_variant(var, variables)),
                None => {
                    out.push('{');
                    out.push_str(key);
                    out.push('}');
                }
            },
        }
    }
    out
}
