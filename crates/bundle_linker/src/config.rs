//! Immutable configuration threaded through every phase (spec.md §9: "no
//! phase may mutate it"). Field set and `camelCase` rename convention mirror
//! `unused_finder::cfg::UnusedFinderJSONConfig` — this workspace's existing
//! template for a JSON/schema-shaped config struct.

use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    Passthrough,
    ConvertFormat,
    #[default]
    Bundle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Preserve,
    Iife,
    Commonjs,
    #[default]
    Esm,
}

impl From<OutputFormat> for crate::model::OutputFormat {
    fn from(value: OutputFormat) -> Self {
        match value {
            OutputFormat::Preserve => crate::model::OutputFormat::Preserve,
            OutputFormat::Iife => crate::model::OutputFormat::Iife,
            OutputFormat::Commonjs => crate::model::OutputFormat::CommonJs,
            OutputFormat::Esm => crate::model::OutputFormat::Esm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub enum SourceMapMode {
    #[default]
    None,
    Inline,
    LinkedWithComment,
    ExternalWithoutComment,
}

/// A `Defines` entry: an identifier substitution, optionally marked as a
/// pure call so `/* @__PURE__ */`-style removal applies to it even without
/// an explicit annotation.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Define {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub call_can_be_unwrapped_if_unused: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkerConfig {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub output_format: OutputFormat,
    /// Single-file output path. Mutually exclusive with `abs_output_dir`
    /// (code splitting requires a directory).
    #[serde(default)]
    pub abs_output_file: Option<String>,
    #[serde(default)]
    pub abs_output_dir: Option<String>,
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub defines: Vec<Define>,
    #[serde(default)]
    pub mangle_syntax: bool,
    #[serde(default)]
    pub minify_identifiers: bool,
    #[serde(default)]
    pub remove_whitespace: bool,
    #[serde(default)]
    pub ignore_dce_annotations: bool,
    #[serde(default = "default_true")]
    pub tree_shaking: bool,
    #[serde(default)]
    pub code_splitting: bool,
    #[serde(default)]
    pub source_map: SourceMapMode,
    #[serde(default)]
    pub abs_metadata_file: Option<String>,
    #[serde(default)]
    pub omit_runtime_for_tests: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            output_format: OutputFormat::default(),
            abs_output_file: None,
            abs_output_dir: None,
            module_name: None,
            defines: Vec::new(),
            mangle_syntax: false,
            minify_identifiers: false,
            remove_whitespace: false,
            ignore_dce_annotations: false,
            tree_shaking: true,
            code_splitting: false,
            source_map: SourceMapMode::default(),
            abs_metadata_file: None,
            omit_runtime_for_tests: false,
        }
    }
}
