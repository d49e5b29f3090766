//! Rendering of ranked hits into a prompt-ready context block.
//!
//! Formatting is pure. When the rendered items exceed the budget, whole items
//! are dropped from the lowest rank upward and reported in
//! [`FormattedContext::omitted`]; an item is never cut in the middle.
use ragctx_core::config::ContextSettings;
use ragctx_core::types::{ChunkId, QueryResult, ScoredChunk};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextTemplate {
    /// Per-item template. Placeholders: `{rank}`, `{score}`, `{id}`,
    /// `{source}`, `{kind}`, `{text}`. Unknown placeholders are kept verbatim.
    pub item: String,
    pub separator: String,
    /// Character budget for the whole block; 0 disables the limit.
    pub max_chars: usize,
}

impl Default for ContextTemplate {
    fn default() -> Self {
        Self { item: "[{rank}] ({source}, {kind}) {text}".into(), separator: "\n\n".into(), max_chars: 12_000 }
    }
}

impl ContextTemplate {
    pub fn from_settings(settings: &ContextSettings) -> Self {
        Self { max_chars: settings.max_chars, ..Self::default() }
    }

    pub fn with_item(mut self, item: impl Into<String>) -> Self { self.item = item.into(); self }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormattedContext {
    pub text: String,
    pub included: Vec<ChunkId>,
    pub omitted: Vec<ChunkId>,
}

impl FormattedContext {
    pub fn is_empty(&self) -> bool { self.included.is_empty() }
}

pub fn format_context(result: &QueryResult, template: &ContextTemplate) -> FormattedContext {
    let mut out = FormattedContext::default();
    let sep_len = template.separator.chars().count();
    let mut used = 0usize;
    let mut full = false;
    for hit in result.iter() {
        if full {
            out.omitted.push(hit.chunk.id.clone());
            continue;
        }
        let item = render_item(&template.item, hit);
        let cost = item.chars().count() + if out.included.is_empty() { 0 } else { sep_len };
        if template.max_chars > 0 && used + cost > template.max_chars {
            full = true;
            out.omitted.push(hit.chunk.id.clone());
            continue;
        }
        if !out.included.is_empty() {
            out.text.push_str(&template.separator);
        }
        out.text.push_str(&item);
        used += cost;
        out.included.push(hit.chunk.id.clone());
    }
    out
}

/// Single pass, so placeholder text inside a chunk body is never expanded.
fn render_item(template: &str, hit: &ScoredChunk) -> String {
    let mut out = String::with_capacity(template.len() + hit.chunk.text.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        match &after[..close] {
            "rank" => out.push_str(&hit.rank.to_string()),
            "score" => out.push_str(&format!("{:.3}", hit.score)),
            "id" => out.push_str(&hit.chunk.id),
            "source" => out.push_str(&hit.chunk.source),
            "kind" => out.push_str(hit.chunk.kind.as_str()),
            "text" => out.push_str(&hit.chunk.text),
            other => {
                out.push('{');
                out.push_str(other);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}
