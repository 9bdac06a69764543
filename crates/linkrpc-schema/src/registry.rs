use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::config::SchemaConfig;
use crate::error::{Result, SchemaError};
use crate::validator::MethodSchema;

const SCHEMA_SUFFIX: &str = ".schema.json";

/// Argument descriptors keyed by method name.
///
/// Names compare case-insensitively, like handler patterns. Methods without
/// a descriptor accept any arguments unless
/// [`SchemaConfig::fail_on_missing_schema`] is set.
pub struct SchemaRegistry {
    schemas: HashMap<String, MethodSchema>,
    order: Vec<String>,
    config: SchemaConfig,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::with_config(SchemaConfig::default())
    }

    pub fn with_config(config: SchemaConfig) -> Self {
        Self {
            schemas: HashMap::new(),
            order: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &SchemaConfig {
        &self.config
    }

    /// Register a descriptor given as JSON text.
    pub fn register(&mut self, method: &str, descriptor: &str) -> Result<()> {
        let descriptor: Value = serde_json::from_str(descriptor)?;
        self.register_value(method, &descriptor)
    }

    /// Register a descriptor, replacing any earlier one for `method`.
    pub fn register_value(&mut self, method: &str, descriptor: &Value) -> Result<()> {
        let compiled = MethodSchema::compile(method, descriptor, self.config.strict_mode)?;
        let key = method.to_ascii_lowercase();
        if self.schemas.insert(key.clone(), compiled).is_none() {
            self.order.push(key);
        }
        debug!(method, "args schema registered");
        Ok(())
    }

    /// Register every `<Method>.schema.json` file in `dir`, in name order.
    ///
    /// Symlinked schema files and files over the configured size are refused.
    /// Returns the number of schemas loaded.
    pub fn load_directory(&mut self, dir: &Path) -> Result<usize> {
        let files = schema_files(dir)?;
        if files.len() > self.config.max_schemas_from_directory {
            return Err(SchemaError::LoadFailed(format!(
                "{}: {} schema files, limit is {}",
                dir.display(),
                files.len(),
                self.config.max_schemas_from_directory
            )));
        }
        for (method, path) in &files {
            let text = read_limited(path, self.config.max_schema_file_size)?;
            self.register(method, &text)?;
        }
        debug!(dir = %dir.display(), loaded = files.len(), "schema directory read");
        Ok(files.len())
    }

    /// Check call arguments; absent arguments are checked as `null`.
    pub fn validate(&self, method: &str, args: Option<&Value>) -> Result<()> {
        match self.schemas.get(&method.to_ascii_lowercase()) {
            Some(schema) => schema.check(args.unwrap_or(&Value::Null)),
            None if self.config.fail_on_missing_schema => {
                Err(SchemaError::NoSchema(method.to_string()))
            }
            None => Ok(()),
        }
    }

    /// The descriptor registered for `method`, as given.
    pub fn schema(&self, method: &str) -> Option<&Value> {
        self.schemas
            .get(&method.to_ascii_lowercase())
            .map(|schema| &schema.descriptor)
    }

    /// Method names with a descriptor, in registration order.
    pub fn methods(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter_map(|key| self.schemas.get(key))
            .map(|schema| schema.method.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("methods", &self.methods())
            .field("config", &self.config)
            .finish()
    }
}

fn load_error(path: &Path, what: impl std::fmt::Display) -> SchemaError {
    SchemaError::LoadFailed(format!("{}: {what}", path.display()))
}

/// `(method, path)` for each schema file in `dir`, sorted by method.
fn schema_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|err| load_error(dir, err))? {
        let entry = entry.map_err(|err| load_error(dir, err))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(stem) = name.strip_suffix(SCHEMA_SUFFIX) else {
            continue;
        };
        let path = entry.path();
        // `DirEntry::file_type` does not follow symlinks.
        let file_type = entry.file_type().map_err(|err| load_error(&path, err))?;
        if file_type.is_symlink() {
            return Err(load_error(&path, "schema files may not be symlinks"));
        }
        if !file_type.is_file() {
            continue;
        }
        if !is_method_name(stem) {
            return Err(load_error(&path, "file name is not a method name"));
        }
        files.push((stem.to_string(), path));
    }
    files.sort();
    Ok(files)
}

fn read_limited(path: &Path, limit: usize) -> Result<String> {
    let file = fs::File::open(path).map_err(|err| load_error(path, err))?;
    let mut text = String::new();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    file.take(cap)
        .read_to_string(&mut text)
        .map_err(|err| load_error(path, err))?;
    if text.len() > limit {
        return Err(load_error(path, format!("larger than {limit} bytes")));
    }
    Ok(text)
}

fn is_method_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
