//! Pipeline sources backed by Lua documents

use std::path::{Path, PathBuf};

use gantry_core::domain::pipeline::PipelineDefinition;
use gantry_core::{DefinitionError, PipelineSource};

use crate::parser::parse_pipeline_definition;

/// Reads and parses a pipeline document from disk on every load
///
/// Edits to the file take effect on the next submitted run.
#[derive(Debug, Clone)]
pub struct LuaFileSource {
    path: PathBuf,
}

impl LuaFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PipelineSource for LuaFileSource {
    fn load(&self) -> Result<PipelineDefinition, DefinitionError> {
        let source = std::fs::read_to_string(&self.path).map_err(|e| {
            DefinitionError::invalid(format!(
                "failed to read pipeline file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        parse_pipeline_definition(&source)
    }

    fn describe(&self) -> String {
        format!("lua file {}", self.path.display())
    }
}

/// An in-memory Lua document
#[derive(Debug, Clone)]
pub struct LuaSource {
    source: String,
}

impl LuaSource {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl PipelineSource for LuaSource {
    fn load(&self) -> Result<PipelineDefinition, DefinitionError> {
        parse_pipeline_definition(&self.source)
    }

    fn describe(&self) -> String {
        "inline lua document".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DOC: &str = r#"
        return { name = "from-file", stages = { { name = "a", steps = { "true" } } } }
    "#;

    #[test]
    fn test_file_source_reloads_on_every_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOC.as_bytes()).unwrap();

        let source = LuaFileSource::new(file.path());
        assert_eq!(source.load().unwrap().name, "from-file");

        std::fs::write(
            file.path(),
            r#"return { name = "edited", stages = { { name = "a", steps = { "true" } } } }"#,
        )
        .unwrap();
        assert_eq!(source.load().unwrap().name, "edited");
    }

    #[test]
    fn test_missing_file_is_invalid_definition() {
        let source = LuaFileSource::new("/nonexistent/pipeline.lua");
        let err = source.load().unwrap_err();
        assert!(matches!(err, DefinitionError::Invalid(_)));
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn test_inline_source() {
        assert_eq!(LuaSource::new(DOC).load().unwrap().name, "from-file");
    }
}
