use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::PipelineResult;

/// One knowledge record. Files are JSONL, one record per line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Snippet {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(alias = "text")]
    pub content: String,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

impl Snippet {
    /// Context line handed to the generator.
    pub fn render(&self) -> String {
        let mut meta = Vec::new();
        if let Some(title) = &self.title {
            meta.push(title.clone());
        }
        if let Some(speaker) = &self.speaker {
            meta.push(format!("speaker: {}", speaker));
        }
        if let Some(date) = &self.date {
            meta.push(format!("date: {}", date));
        }
        if meta.is_empty() {
            self.content.clone()
        } else {
            format!("[{}] {}", meta.join(", "), self.content)
        }
    }
}

pub trait Retriever: Send + Sync {
    fn search(&self, query: &str, top_k: usize) -> Vec<Snippet>;
}

/// Keyword-overlap search (Jaccard over word tokens). No index, no model.
#[derive(Debug, Default)]
pub struct KeywordRetriever {
    entries: Vec<(Snippet, HashSet<String>)>,
}

impl KeywordRetriever {
    pub fn new(snippets: Vec<Snippet>) -> Self {
        let entries = snippets
            .into_iter()
            .map(|s| {
                let tokens = tokenize(&s.content);
                (s, tokens)
            })
            .collect();
        Self { entries }
    }

    /// Load every `*.json` / `*.jsonl` file in `dir`. Bad lines are skipped
    /// with a warning; a missing directory yields an empty retriever.
    pub fn load(dir: &Path) -> PipelineResult<Self> {
        if !dir.exists() {
            warn!("[RAG] Knowledge directory not found: {}", dir.display());
            return Ok(Self::default());
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("json") | Some("jsonl")))
            .collect();
        paths.sort();

        let mut snippets = Vec::new();
        for path in paths {
            let raw = match std::fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("[RAG] Failed to read {}: {}", path.display(), e);
                    continue;
                }
            };
            for (line_num, line) in raw.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Snippet>(line) {
                    Ok(snippet) => snippets.push(snippet),
                    Err(e) => warn!("[RAG] {}:{} parse error: {}", path.display(), line_num + 1, e),
                }
            }
        }

        info!("[RAG] Knowledge base loaded: {} entries", snippets.len());
        Ok(Self::new(snippets))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Retriever for KeywordRetriever {
    fn search(&self, query: &str, top_k: usize) -> Vec<Snippet> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(f32, usize)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, (_, tokens))| {
                let shared = query_tokens.intersection(tokens).count();
                if shared == 0 {
                    return None;
                }
                let union = query_tokens.union(tokens).count();
                Some((shared as f32 / union as f32, i))
            })
            .collect();

        // Highest score first; file order breaks ties.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(top_k);

        if let (Some(best), Some(worst)) = (scored.first(), scored.last()) {
            debug!("[RAG] {} hits (score {:.3}..{:.3})", scored.len(), best.0, worst.0);
        }

        scored.into_iter().map(|(_, i)| self.entries[i].0.clone()).collect()
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_on_non_word_characters() {
        let tokens = tokenize("Hello, World! hello_there");
        assert!(tokens.contains("hello"));
        assert!(tokens.contains("world"));
        assert!(tokens.contains("hello_there"));
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn render_includes_metadata() {
        let snippet = Snippet {
            title: Some("FAQ".into()),
            content: "Opening hours are nine to five.".into(),
            speaker: None,
            date: Some("2024-04-01".into()),
        };
        assert_eq!(snippet.render(), "[FAQ, date: 2024-04-01] Opening hours are nine to five.");
    }
}
