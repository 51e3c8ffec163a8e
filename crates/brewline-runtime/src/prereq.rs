use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fmt;

/// A declared build dependency whose tool is not on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    pub name: String,
    pub binary: String,
}

impl MissingDependency {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            binary: binary_for(name).to_owned(),
        }
    }
}

impl fmt::Display for MissingDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  - {}: `{}` not found on PATH", self.name, self.binary)
    }
}

/// The executable that proves a dependency is present.
pub fn binary_for(dependency: &str) -> &str {
    match dependency {
        "rust" => "cargo",
        "golang" => "go",
        "nodejs" => "node",
        other => other,
    }
}

/// Check every declared build dependency. Empty result means all are present.
pub fn check_build_dependencies(dependencies: &BTreeSet<String>) -> Vec<MissingDependency> {
    check_with(dependencies, |binary| which::which(binary).is_ok())
}

/// Like [`check_build_dependencies`], searching `search_path` instead of `PATH`.
pub fn check_build_dependencies_in(
    dependencies: &BTreeSet<String>,
    search_path: &OsStr,
) -> Vec<MissingDependency> {
    let cwd = std::env::current_dir().unwrap_or_default();
    check_with(dependencies, |binary| {
        which::which_in(binary, Some(search_path), &cwd).is_ok()
    })
}

fn check_with(
    dependencies: &BTreeSet<String>,
    exists: impl Fn(&str) -> bool,
) -> Vec<MissingDependency> {
    dependencies
        .iter()
        .filter(|dep| !exists(binary_for(dep)))
        .map(|dep| MissingDependency::new(dep))
        .collect()
}

/// Format missing dependencies into one readable message.
pub fn format_missing(missing: &[MissingDependency]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing build dependencies:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nInstall them, or set check_build_dependencies to false in the config.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| (*n).to_owned()).collect()
    }

    #[test]
    fn rust_maps_to_cargo() {
        assert_eq!(binary_for("rust"), "cargo");
        assert_eq!(binary_for("cmake"), "cmake");
    }

    #[test]
    fn collects_all_missing() {
        let missing = check_with(&deps(&["rust", "cmake", "make"]), |bin| bin == "make");
        let names: Vec<&str> = missing.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["cmake", "rust"]);
        assert_eq!(missing[1].binary, "cargo");
    }

    #[test]
    fn nothing_missing() {
        assert!(check_with(&deps(&["rust"]), |_| true).is_empty());
        assert!(check_build_dependencies(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn sh_is_found_on_path() {
        assert!(check_build_dependencies(&deps(&["sh"])).is_empty());
        assert_eq!(
            check_build_dependencies(&deps(&["brewline-no-such-tool"])).len(),
            1
        );
    }

    #[test]
    fn finds_tool_on_a_path_with_nothing_else() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cargo = dir.path().join("cargo");
        std::fs::write(&cargo, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&cargo, std::fs::Permissions::from_mode(0o755)).unwrap();

        let path = dir.path().as_os_str();
        assert!(check_build_dependencies_in(&deps(&["rust"]), path).is_empty());
        let missing = check_build_dependencies_in(&deps(&["rust", "cmake"]), path);
        assert_eq!(missing, vec![MissingDependency::new("cmake")]);
    }

    #[test]
    fn format_missing_produces_readable_output() {
        let output = format_missing(&[MissingDependency::new("rust")]);
        assert!(output.contains("missing build dependencies:"));
        assert!(output.contains("rust: `cargo` not found"));
    }
}
