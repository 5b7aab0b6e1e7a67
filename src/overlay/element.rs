//! Read-only view of the host page's rendered element tree.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

fn full_opacity() -> f64 {
    1.0
}

fn shown() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    /// Identity that survives re-renders (DOM path, node id, ...).
    pub key: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    /// Computed stacking order; `None` for `auto`.
    #[serde(default)]
    pub z_index: Option<i64>,
    #[serde(default = "full_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default = "shown")]
    pub visible: bool,
    #[serde(default)]
    pub children: Vec<ElementNode>,
}

impl ElementNode {
    pub fn new(key: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            tag: tag.into(),
            id: None,
            classes: Vec::new(),
            z_index: None,
            opacity: 1.0,
            width: 0.0,
            height: 0.0,
            visible: true,
            children: Vec::new(),
        }
    }

    /// `tag#id.class-a.class-b`
    pub fn descriptor(&self) -> String {
        let mut descriptor = if self.tag.is_empty() {
            "element".to_string()
        } else {
            self.tag.to_ascii_lowercase()
        };
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            descriptor.push('#');
            descriptor.push_str(id);
        }
        for class in self.classes.iter().filter(|class| !class.is_empty()) {
            descriptor.push('.');
            descriptor.push_str(class);
        }
        descriptor
    }

    /// Id and class names, the tokens the heuristics match against.
    pub fn identifying_tokens(&self) -> impl Iterator<Item = &str> {
        self.id
            .as_deref()
            .into_iter()
            .chain(self.classes.iter().map(String::as_str))
            .filter(|token| !token.is_empty())
    }
}

/// Source of the current element tree. Implementations return the roots;
/// callers walk `children` themselves.
pub trait ElementTree: Send + Sync {
    fn snapshot(&self) -> Result<Vec<ElementNode>>;
}

/// In-memory tree the host replaces wholesale on every change.
#[derive(Debug, Default)]
pub struct StaticElementTree {
    roots: RwLock<Vec<ElementNode>>,
}

impl StaticElementTree {
    pub fn new(roots: Vec<ElementNode>) -> Self {
        Self {
            roots: RwLock::new(roots),
        }
    }

    pub fn replace(&self, roots: Vec<ElementNode>) {
        let mut guard = match self.roots.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = roots;
    }
}

impl ElementTree for StaticElementTree {
    fn snapshot(&self) -> Result<Vec<ElementNode>> {
        let guard = match self.roots.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard.clone())
    }
}

/// Tree exported by the host as a JSON array of root nodes; re-read on every
/// snapshot so the file can be rewritten underneath us.
pub struct JsonFileElementTree {
    path: PathBuf,
}

impl JsonFileElementTree {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ElementTree for JsonFileElementTree {
    fn snapshot(&self) -> Result<Vec<ElementNode>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read element tree {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("malformed element tree {}", self.path.display()))
    }
}
