use crate::template::contains_placeholder;
use crate::types::{ArtifactName, Checksum, PackageName};
use crate::version::infer_version;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Component, Path};
use std::sync::LazyLock;
use thiserror::Error;

/// Artifact directories searched when a manifest does not name any.
pub const DEFAULT_ARTIFACT_DIRS: &[&str] = &["target/release"];

static HEX_CHECKSUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{32,128}$").expect("valid checksum regex"));

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid manifest: {}", FieldIssues(.0))]
    Invalid(Vec<FieldIssue>),
}

impl ManifestError {
    /// Every field problem found, empty for I/O and syntax errors.
    pub fn issues(&self) -> &[FieldIssue] {
        match self {
            Self::Invalid(issues) => issues,
            _ => &[],
        }
    }
}

/// One missing or malformed manifest field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub problem: String,
}

impl FieldIssue {
    fn new(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: problem.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

struct FieldIssues<'a>(&'a [FieldIssue]);

impl fmt::Display for FieldIssues<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

/// Validated, immutable package manifest.
///
/// Field order matters for TOML output: plain keys first, then the
/// array of install tables, then the smoke test table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub name: PackageName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    pub source_url: String,
    pub checksum: Checksum,
    pub license: String,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub build_dependencies: BTreeSet<String>,
    pub build_command: Vec<String>,
    pub artifact_dirs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub install_mappings: Vec<InstallMapping>,
    /// Run in order after install; written back as `[[smoke_test]]`.
    #[serde(rename = "smoke_test", skip_serializing_if = "Vec::is_empty")]
    pub smoke_tests: Vec<SmokeTest>,
}

impl Manifest {
    /// Declared version, or the one inferred from `source_url`.
    pub fn resolved_version(&self) -> Option<String> {
        self.version
            .clone()
            .or_else(|| infer_version(&self.source_url))
    }
}

/// Install a produced artifact under an alias, optionally as a symlink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallMapping {
    pub artifact: ArtifactName,
    pub alias: ArtifactName,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub symlink: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmokeTest {
    pub command: Vec<String>,
    #[serde(flatten)]
    pub matcher: OutputMatcher,
}

/// How smoke test output is judged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OutputMatcher {
    /// Output must contain this substring (after variable substitution).
    #[serde(rename = "expect")]
    Contains(String),
    /// Output must match this regular expression.
    #[serde(rename = "pattern")]
    Pattern(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestDocument {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    homepage: Option<String>,
    source_url: Option<String>,
    checksum: Option<String>,
    license: Option<String>,
    #[serde(default)]
    build_dependencies: Vec<String>,
    build_command: Option<Vec<String>>,
    artifact_dirs: Option<Vec<String>>,
    #[serde(default)]
    install_mappings: Vec<MappingDocument>,
    smoke_test: Option<SmokeTestEntries>,
}

/// A single `[smoke_test]` table or an array of `[[smoke_test]]` tables.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SmokeTestEntries {
    One(SmokeTestDocument),
    Many(Vec<SmokeTestDocument>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingDocument {
    artifact: String,
    alias: Option<String>,
    #[serde(default)]
    symlink: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SmokeTestDocument {
    #[serde(default)]
    command: Vec<String>,
    expect: Option<String>,
    pattern: Option<String>,
}

pub fn parse_manifest_str(input: &str) -> Result<Manifest, ManifestError> {
    let doc: ManifestDocument = toml::from_str(input)?;
    validate(doc)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}

/// Serialize a manifest back to TOML; parsing the output yields an equal value.
pub fn to_toml_string(manifest: &Manifest) -> Result<String, ManifestError> {
    Ok(toml::to_string(manifest)?)
}

/// Collects every problem instead of stopping at the first one.
#[derive(Default)]
struct Validator {
    issues: Vec<FieldIssue>,
}

impl Validator {
    fn push(&mut self, field: impl Into<String>, problem: impl Into<String>) {
        self.issues.push(FieldIssue::new(field, problem));
    }

    /// Check a present string value for emptiness and template markers.
    /// Returns the trimmed value when it is usable.
    fn text(&mut self, field: &str, value: &str) -> Option<String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self.push(field, "must not be empty");
            return None;
        }
        if contains_placeholder(trimmed) {
            self.push(field, format!("unresolved template placeholder in '{trimmed}'"));
            return None;
        }
        Some(trimmed.to_owned())
    }

    fn required(&mut self, field: &str, value: Option<&String>) -> Option<String> {
        match value {
            Some(v) => self.text(field, v),
            None => {
                self.push(field, "missing required field");
                None
            }
        }
    }

    fn optional(&mut self, field: &str, value: Option<&String>) -> Option<String> {
        value.and_then(|v| self.text(field, v))
    }

    fn file_name(&mut self, field: &str, value: &str) -> Option<ArtifactName> {
        let name = self.text(field, value)?;
        if name.contains('/') || name == "." || name == ".." {
            self.push(field, format!("'{name}' must be a plain file name"));
            return None;
        }
        Some(ArtifactName::new(name))
    }
}

#[allow(clippy::too_many_lines)]
fn validate(doc: ManifestDocument) -> Result<Manifest, ManifestError> {
    let mut v = Validator::default();

    let name = v.required("name", doc.name.as_ref()).and_then(|n| {
        let parsed = PackageName::parse(&n);
        if parsed.is_none() {
            v.push("name", format!("'{n}' is not a valid package name"));
        }
        parsed
    });
    let version = v.optional("version", doc.version.as_ref());
    let description = v.optional("description", doc.description.as_ref());
    let homepage = v.optional("homepage", doc.homepage.as_ref());
    let license = v.required("license", doc.license.as_ref());

    let source_url = v
        .required("source_url", doc.source_url.as_ref())
        .and_then(|raw| match check_source_url(&raw) {
            Ok(()) => Some(raw),
            Err(problem) => {
                v.push("source_url", problem);
                None
            }
        });

    let checksum = v
        .required("checksum", doc.checksum.as_ref())
        .and_then(|raw| {
            if !HEX_CHECKSUM.is_match(&raw) {
                v.push(
                    "checksum",
                    format!("'{raw}' is not a hex digest of 32 to 128 digits"),
                );
                return None;
            }
            let parsed = Checksum::parse(&raw);
            if parsed.is_none() {
                v.push(
                    "checksum",
                    format!(
                        "{} hex digits does not match md5, sha256, sha384, or sha512",
                        raw.len()
                    ),
                );
            }
            parsed
        });

    let mut build_dependencies = BTreeSet::new();
    for (i, dep) in doc.build_dependencies.iter().enumerate() {
        if let Some(dep) = v.text(&format!("build_dependencies[{i}]"), dep) {
            build_dependencies.insert(dep);
        }
    }

    let build_command = match doc.build_command {
        None => {
            v.push("build_command", "missing required field");
            None
        }
        Some(tokens) if tokens.is_empty() => {
            v.push("build_command", "must not be empty");
            None
        }
        Some(tokens) => {
            let before = v.issues.len();
            let checked: Vec<String> = tokens
                .iter()
                .enumerate()
                .filter_map(|(i, t)| v.text(&format!("build_command[{i}]"), t))
                .collect();
            (v.issues.len() == before).then_some(checked)
        }
    };

    let artifact_dirs = match doc.artifact_dirs {
        None => DEFAULT_ARTIFACT_DIRS.iter().map(|d| (*d).to_owned()).collect(),
        Some(dirs) => {
            if dirs.is_empty() {
                v.push("artifact_dirs", "must not be empty when given");
            }
            dirs.iter()
                .enumerate()
                .filter_map(|(i, d)| {
                    let field = format!("artifact_dirs[{i}]");
                    let dir = v.text(&field, d)?;
                    if is_confined_relative(&dir) {
                        Some(dir)
                    } else {
                        v.push(field, format!("'{dir}' must be a relative path inside the source tree"));
                        None
                    }
                })
                .collect()
        }
    };

    let mut install_mappings = Vec::with_capacity(doc.install_mappings.len());
    for (i, m) in doc.install_mappings.iter().enumerate() {
        let artifact = v.file_name(&format!("install_mappings[{i}].artifact"), &m.artifact);
        let alias = match &m.alias {
            Some(a) => v.file_name(&format!("install_mappings[{i}].alias"), a),
            None => artifact.clone(),
        };
        if let (Some(artifact), Some(alias)) = (artifact, alias) {
            if m.symlink && artifact == alias {
                v.push(
                    format!("install_mappings[{i}]"),
                    "a symlink alias must differ from its artifact name",
                );
                continue;
            }
            install_mappings.push(InstallMapping {
                artifact,
                alias,
                symlink: m.symlink,
            });
        }
    }

    let smoke_tests: Vec<SmokeTest> = match doc.smoke_test {
        None => Vec::new(),
        Some(SmokeTestEntries::One(st)) => validate_smoke_test(&mut v, "smoke_test", st)
            .into_iter()
            .collect(),
        Some(SmokeTestEntries::Many(entries)) => {
            if entries.is_empty() {
                v.push("smoke_test", "must not be an empty array");
            }
            entries
                .into_iter()
                .enumerate()
                .filter_map(|(i, st)| validate_smoke_test(&mut v, &format!("smoke_test[{i}]"), st))
                .collect()
        }
    };

    if !v.issues.is_empty() {
        return Err(ManifestError::Invalid(v.issues));
    }

    // Every required value is Some when no issue was recorded.
    match (name, source_url, checksum, license, build_command) {
        (Some(name), Some(source_url), Some(checksum), Some(license), Some(build_command)) => {
            Ok(Manifest {
                name,
                version,
                description,
                homepage,
                source_url,
                checksum,
                license,
                build_dependencies,
                build_command,
                artifact_dirs,
                install_mappings,
                smoke_tests,
            })
        }
        _ => Err(ManifestError::Invalid(vec![FieldIssue::new(
            "manifest",
            "incomplete after validation",
        )])),
    }
}

fn validate_smoke_test(v: &mut Validator, field: &str, st: SmokeTestDocument) -> Option<SmokeTest> {
    let before = v.issues.len();
    if st.command.is_empty() {
        v.push(format!("{field}.command"), "must not be empty");
    }
    let command: Vec<String> = st
        .command
        .iter()
        .enumerate()
        .filter_map(|(i, t)| v.text(&format!("{field}.command[{i}]"), t))
        .collect();

    let matcher = match (st.expect, st.pattern) {
        (Some(expect), None) => v
            .text(&format!("{field}.expect"), &expect)
            .map(OutputMatcher::Contains),
        (None, Some(pattern)) => v.text(&format!("{field}.pattern"), &pattern).and_then(|p| {
            if let Err(e) = Regex::new(&p) {
                v.push(format!("{field}.pattern"), format!("invalid regular expression: {e}"));
                None
            } else {
                Some(OutputMatcher::Pattern(p))
            }
        }),
        (Some(_), Some(_)) => {
            v.push(field, "set either 'expect' or 'pattern', not both");
            None
        }
        (None, None) => {
            v.push(field, "missing 'expect' or 'pattern'");
            None
        }
    };

    if v.issues.len() != before {
        return None;
    }
    matcher.map(|matcher| SmokeTest { command, matcher })
}

fn check_source_url(raw: &str) -> Result<(), String> {
    let url = url::Url::parse(raw).map_err(|e| format!("'{raw}' is not a well-formed URI: {e}"))?;
    match url.scheme() {
        "http" | "https" => {
            if url.host_str().is_none_or(str::is_empty) {
                return Err(format!("'{raw}' has no host"));
            }
            Ok(())
        }
        "file" => Ok(()),
        other => Err(format!("unsupported URI scheme '{other}' (expected http, https, or file)")),
    }
}

fn is_confined_relative(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
