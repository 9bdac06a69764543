/// Limits and policy for argument descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaConfig {
    /// Object schemas reject properties they do not declare.
    pub strict_mode: bool,
    /// Methods without a descriptor fail validation with `NoSchema`.
    pub fail_on_missing_schema: bool,
    pub max_schemas_from_directory: usize,
    /// Per-file byte limit for `load_directory`.
    pub max_schema_file_size: usize,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            fail_on_missing_schema: false,
            max_schemas_from_directory: 128,
            max_schema_file_size: 32 * 1024,
        }
    }
}
