//! Document storage: resolving references to raw YAML mappings.
//!
//! [`FileStore`] reads documents from disk and expands `!include` tags;
//! [`MemoryStore`] holds documents in memory, mostly for tests and tools
//! that assemble specifications programmatically.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{Result, SpecError};

/// Tag that splices another file into a document.
pub const INCLUDE_TAG: &str = "include";

/// Backing storage for specification documents.
pub trait DocumentStore {
    /// Identifier of `reference` as written inside document `referenced_by`.
    ///
    /// Identifiers are what cycle detection compares, so two spellings of
    /// the same document must resolve to the same identifier.
    fn locate(&self, reference: &str, referenced_by: Option<&str>) -> String;

    /// Loads a document by identifier. `Ok(None)` means it does not exist.
    fn load(&self, id: &str) -> Result<Option<Mapping>>;
}

/// Documents on the local filesystem, resolved relative to the referencing
/// document's directory.
#[derive(Debug, Clone, Default)]
pub struct FileStore {
    base_dir: Option<PathBuf>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves top-level relative references against `dir`.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }
}

impl DocumentStore for FileStore {
    fn locate(&self, reference: &str, referenced_by: Option<&str>) -> String {
        let reference = Path::new(reference);
        let joined = if reference.is_absolute() {
            reference.to_path_buf()
        } else {
            match referenced_by {
                Some(parent) => Path::new(parent)
                    .parent()
                    .unwrap_or_else(|| Path::new(""))
                    .join(reference),
                None => match &self.base_dir {
                    Some(base) => base.join(reference),
                    None => reference.to_path_buf(),
                },
            }
        };
        normalize(&joined).to_string_lossy().into_owned()
    }

    fn load(&self, id: &str) -> Result<Option<Mapping>> {
        let path = PathBuf::from(id);
        if !path.is_file() {
            return Ok(None);
        }
        let mut stack = Vec::new();
        let value = read_yaml_file(&path, &mut stack)?;
        match value {
            Value::Mapping(mapping) => Ok(Some(mapping)),
            Value::Null => Ok(Some(Mapping::new())),
            other => Err(SpecError::InvalidDocument {
                document: id.to_string(),
                message: format!("expected a mapping at the top level, found {}", kind_of(&other)),
            }),
        }
    }
}

/// Lexically normalizes `.` and `..` components without touching the
/// filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn read_yaml_file(path: &Path, stack: &mut Vec<PathBuf>) -> Result<Value> {
    let text = fs::read_to_string(path).map_err(|source| SpecError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_yaml::from_str(&text).map_err(|source| SpecError::YamlParse {
        document: path.display().to_string(),
        source,
    })?;
    stack.push(path.to_path_buf());
    let dir = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
    let expanded = expand_includes(value, &dir, stack);
    stack.pop();
    expanded
}

/// Replaces every `!include <file>` node with the parsed contents of that
/// file. An include inside a sequence whose target is itself a sequence is
/// spliced into the surrounding sequence.
pub fn expand_includes(value: Value, dir: &Path, stack: &mut Vec<PathBuf>) -> Result<Value> {
    match value {
        Value::Tagged(tagged) if tagged.tag == INCLUDE_TAG => {
            let target = match &tagged.value {
                Value::String(target) => target.clone(),
                other => {
                    return Err(SpecError::Include {
                        path: dir.to_path_buf(),
                        message: format!("expected a file name, found {}", kind_of(other)),
                    });
                }
            };
            let path = normalize(&dir.join(&target));
            if stack.contains(&path) {
                return Err(SpecError::Include {
                    path,
                    message: "file includes itself".to_string(),
                });
            }
            if !path.is_file() {
                return Err(SpecError::Include {
                    path,
                    message: "file not found".to_string(),
                });
            }
            debug!(include = %path.display(), "expanding include");
            read_yaml_file(&path, stack)
        }
        Value::Tagged(mut tagged) => {
            tagged.value = expand_includes(tagged.value, dir, stack)?;
            Ok(Value::Tagged(tagged))
        }
        Value::Mapping(mapping) => {
            let mut out = Mapping::with_capacity(mapping.len());
            for (key, value) in mapping {
                out.insert(key, expand_includes(value, dir, stack)?);
            }
            Ok(Value::Mapping(out))
        }
        Value::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let splice = is_include(&item);
                match expand_includes(item, dir, stack)? {
                    Value::Sequence(inner) if splice => out.extend(inner),
                    other => out.push(other),
                }
            }
            Ok(Value::Sequence(out))
        }
        other => Ok(other),
    }
}

fn is_include(value: &Value) -> bool {
    matches!(value, Value::Tagged(tagged) if tagged.tag == INCLUDE_TAG)
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// In-memory documents keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: HashMap<String, Mapping>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, document: Mapping) {
        self.documents.insert(id.into(), document);
    }

    /// Parses `yaml` and stores it under `id`.
    pub fn insert_yaml(&mut self, id: impl Into<String>, yaml: &str) -> Result<()> {
        let id = id.into();
        let value: Value = serde_yaml::from_str(yaml).map_err(|source| SpecError::YamlParse {
            document: id.clone(),
            source,
        })?;
        match value {
            Value::Mapping(mapping) => {
                self.documents.insert(id, mapping);
                Ok(())
            }
            other => Err(SpecError::InvalidDocument {
                document: id,
                message: format!("expected a mapping at the top level, found {}", kind_of(&other)),
            }),
        }
    }
}

impl DocumentStore for MemoryStore {
    fn locate(&self, reference: &str, _referenced_by: Option<&str>) -> String {
        reference.to_string()
    }

    fn load(&self, id: &str) -> Result<Option<Mapping>> {
        Ok(self.documents.get(id).cloned())
    }
}
