//! Manifest parsing, validation, and template rendering for brewline.
//!
//! This crate defines the schema layer: TOML manifest parsing with
//! collect-all validation (`Manifest`, `ManifestError`), serialization back to
//! TOML, `{{key}}` template rendering for templated manifests, and version
//! inference from source URLs.

pub mod manifest;
pub mod template;
pub mod types;
pub mod version;

pub use manifest::{
    parse_manifest_file, parse_manifest_str, to_toml_string, FieldIssue, InstallMapping,
    Manifest, ManifestError, OutputMatcher, SmokeTest, DEFAULT_ARTIFACT_DIRS,
};
pub use template::{contains_placeholder, placeholders, render_template, TemplateError};
pub use types::{ArtifactName, Checksum, DigestAlgorithm, PackageName};
pub use version::infer_version;
