//! Third-party license report compiler.
//!
//! Reads a JSON manifest of package metadata, resolves missing license
//! text from the local packages directory or by scraping the package's
//! repository page, and renders everything into a single Markdown report.

pub mod github;
pub mod render;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use github::GithubScraper;
use meeplesync_shared::{MeeplesyncError, Result};

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// One package entry from the manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageEntry {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// License type identifier (e.g. "MIT"). `type` in the JSON.
    #[serde(default, rename = "type")]
    pub license_type: Option<String>,
    /// Pre-filled license text; resolution is skipped when present.
    #[serde(default)]
    pub content: Option<String>,
    /// Source file name(s) the content came from.
    #[serde(default)]
    pub file: Option<String>,
}

/// The manifest: package key → entry. A `BTreeMap` keeps report order
/// stable and sorted by key.
pub type Manifest = BTreeMap<String, PackageEntry>;

/// Load the manifest JSON from disk.
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path).map_err(|e| MeeplesyncError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        MeeplesyncError::License(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Resolve a manifest URL against the configured prefix. Absolute http(s)
/// URLs pass through; a leading slash joins directly, anything else gets a
/// separator.
pub fn make_link(text: &str, prefix: &str) -> String {
    if text.starts_with("http://") || text.starts_with("https://") {
        text.to_string()
    } else if text.starts_with('/') {
        format!("{prefix}{text}")
    } else {
        format!("{prefix}/{text}")
    }
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Configuration for one report compilation.
#[derive(Debug, Clone)]
pub struct CompileConfig {
    /// Path to the manifest JSON.
    pub manifest: PathBuf,
    /// Path the Markdown report is written to.
    pub output: PathBuf,
    /// Directory holding installed packages (`node_modules`).
    pub packages_dir: PathBuf,
    /// Prefix for resolving relative repository URLs.
    pub url_prefix: String,
}

/// Result of a completed compilation.
#[derive(Debug)]
pub struct CompileResult {
    /// Packages rendered into the report.
    pub packages: usize,
    /// Packages whose license came from the local packages directory.
    pub resolved_local: usize,
    /// Packages whose license was scraped from the repository page.
    pub resolved_remote: usize,
    /// Manifest keys for which no license text could be found.
    pub failures: Vec<String>,
}

/// Compile the license report.
///
/// Sections are appended to the output file as they are resolved, in
/// manifest-key order, so a failed remote lookup still leaves every
/// earlier section on disk.
#[instrument(skip_all, fields(manifest = %config.manifest.display()))]
pub async fn compile_licenses(config: &CompileConfig) -> Result<CompileResult> {
    let manifest = load_manifest(&config.manifest)?;
    let scraper = GithubScraper::new(&config.url_prefix)?;

    let mut output =
        File::create(&config.output).map_err(|e| MeeplesyncError::io(&config.output, e))?;

    let mut resolved_local = 0usize;
    let mut resolved_remote = 0usize;
    let mut failures: Vec<String> = Vec::new();

    for (key, entry) in &manifest {
        info!(package = %entry.name, "compiling");
        let mut entry = entry.clone();

        if entry.content.as_deref().unwrap_or("").is_empty() {
            let package_dir = config.packages_dir.join(&entry.name);
            if let Some((content, file)) = licenses_from_dir(&package_dir)? {
                entry.content = Some(content);
                entry.file = Some(file);
                resolved_local += 1;
            } else if let Some(url) = entry.url.clone() {
                match scraper.license_from_repo(&url).await? {
                    Some(license) => {
                        entry.content = Some(license.content);
                        entry.file = Some(license.file);
                        resolved_remote += 1;
                    }
                    None => {
                        warn!(package = %key, url, "no license found in repository");
                        failures.push(key.clone());
                    }
                }
            } else {
                warn!(package = %key, "no license content and no repository URL");
                failures.push(key.clone());
            }
        }

        output
            .write_all(render::package_section(&entry).as_bytes())
            .map_err(|e| MeeplesyncError::io(&config.output, e))?;
    }

    let result = CompileResult {
        packages: manifest.len(),
        resolved_local,
        resolved_remote,
        failures,
    };

    info!(
        packages = result.packages,
        local = result.resolved_local,
        remote = result.resolved_remote,
        failures = result.failures.len(),
        "license report written"
    );

    Ok(result)
}

/// Concatenate every `*LICENSE*` file in a package directory. Returns the
/// joined text and the comma-joined file names, or `None` when the
/// directory has no matching files (or does not exist).
fn licenses_from_dir(dir: &Path) -> Result<Option<(String, String)>> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(None);
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.contains("LICENSE"))
        .collect();
    if names.is_empty() {
        return Ok(None);
    }
    names.sort();

    let mut contents = Vec::with_capacity(names.len());
    for name in &names {
        let path = dir.join(name);
        let text = std::fs::read_to_string(&path).map_err(|e| MeeplesyncError::io(&path, e))?;
        contents.push(text);
    }

    Ok(Some((contents.join("\n\n"), names.join(", "))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_link_resolution() {
        let prefix = "https://github.com";
        assert_eq!(
            make_link("https://github.com/facebook/react-native", prefix),
            "https://github.com/facebook/react-native"
        );
        assert_eq!(
            make_link("/facebook/react-native", prefix),
            "https://github.com/facebook/react-native"
        );
        assert_eq!(
            make_link("facebook/react-native", prefix),
            "https://github.com/facebook/react-native"
        );
    }

    #[test]
    fn manifest_parses_and_sorts_by_key() {
        let dir = tmp("manifest");
        let path = dir.join("licenses.json");
        std::fs::write(
            &path,
            r#"{
              "zlib@1.0.0": {"name": "zlib", "version": "1.0.0"},
              "abbrev@2.0.0": {"name": "abbrev", "version": "2.0.0", "type": "ISC"}
            }"#,
        )
        .unwrap();

        let manifest = load_manifest(&path).unwrap();
        let keys: Vec<_> = manifest.keys().collect();
        assert_eq!(keys, ["abbrev@2.0.0", "zlib@1.0.0"]);
        assert_eq!(manifest["abbrev@2.0.0"].license_type.as_deref(), Some("ISC"));
    }

    #[test]
    fn local_license_files_are_concatenated_in_name_order() {
        let dir = tmp("local").join("some-pkg");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("LICENSE-MIT"), "mit text").unwrap();
        std::fs::write(dir.join("LICENSE-APACHE"), "apache text").unwrap();
        std::fs::write(dir.join("index.js"), "module.exports = {}").unwrap();

        let (content, file) = licenses_from_dir(&dir).unwrap().unwrap();
        assert_eq!(content, "apache text\n\nmit text");
        assert_eq!(file, "LICENSE-APACHE, LICENSE-MIT");
    }

    #[test]
    fn missing_package_dir_is_none() {
        assert!(licenses_from_dir(Path::new("/nonexistent/pkg")).unwrap().is_none());
    }

    #[tokio::test]
    async fn compile_renders_all_entries_and_reports_failures() {
        let dir = tmp("compile");
        let packages_dir = dir.join("node_modules");
        std::fs::create_dir_all(packages_dir.join("local-pkg")).unwrap();
        std::fs::write(packages_dir.join("local-pkg/LICENSE"), "local license text").unwrap();

        let manifest_path = dir.join("licenses.json");
        std::fs::write(
            &manifest_path,
            r#"{
              "inline-pkg@1.0.0": {"name": "inline-pkg", "version": "1.0.0",
                                   "content": "inline text", "type": "MIT"},
              "local-pkg@2.0.0": {"name": "local-pkg", "version": "2.0.0"},
              "missing-pkg@3.0.0": {"name": "missing-pkg", "version": "3.0.0"}
            }"#,
        )
        .unwrap();

        let config = CompileConfig {
            manifest: manifest_path,
            output: dir.join("licenses.md"),
            packages_dir,
            url_prefix: "https://github.com".into(),
        };
        let result = compile_licenses(&config).await.unwrap();

        assert_eq!(result.packages, 3);
        assert_eq!(result.resolved_local, 1);
        assert_eq!(result.resolved_remote, 0);
        assert_eq!(result.failures, ["missing-pkg@3.0.0"]);

        let report = std::fs::read_to_string(&config.output).unwrap();
        assert!(report.contains("## inline-pkg"));
        assert!(report.contains("inline text"));
        assert!(report.contains("local license text"));
        // The failed package still gets a section, just without content.
        assert!(report.contains("## missing-pkg"));
    }

    fn tmp(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "meeplesync-licenses-{}-{}",
            tag,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
