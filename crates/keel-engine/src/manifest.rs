//! Manifest discovery, classification and rendering
//!
//! A manifest is one source file (or inline string) holding one or more
//! cluster resources. The file name decides how it is handled:
//! - `*.tmpl` is rendered with the template engine before use
//! - a name containing `.patch` is merge-patched onto an existing object
//!   instead of being created
//!
//! Both flags are independent, so `namespace.patch.tmpl` is a templated patch.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// Substring marking a manifest as a patch
pub const PATCH_MARKER: &str = ".patch";

/// Extension marking a manifest as a template
pub const TEMPLATE_EXTENSION: &str = "tmpl";

static DOCUMENT_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^---[ \t]*$").expect("static regex"));

/// Where a manifest's raw content comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    /// File on disk, read on every render
    File(PathBuf),
    /// Content compiled into the binary or built in memory
    Inline(String),
}

#[derive(Debug, Clone)]
pub struct Manifest {
    /// Path relative to the discovery root, or the given name for inline content
    pub name: String,
    pub source: ManifestSource,
    pub is_template: bool,
    pub is_patch: bool,
    rendered_content: Option<String>,
}

impl Manifest {
    /// Manifest backed by a file; `name` is used for identification only
    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (is_patch, is_template) = classify(&path);
        Self {
            name: name.into(),
            source: ManifestSource::File(path),
            is_template,
            is_patch,
            rendered_content: None,
        }
    }

    /// Manifest with inline content, classified by `name` like a file would be
    pub fn inline(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        let (is_patch, is_template) = classify(Path::new(&name));
        Self {
            name,
            source: ManifestSource::Inline(content.into()),
            is_template,
            is_patch,
            rendered_content: None,
        }
    }

    /// Source path, if the manifest lives on disk
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            ManifestSource::File(path) => Some(path),
            ManifestSource::Inline(_) => None,
        }
    }

    /// Human readable origin used in error messages
    pub fn origin(&self) -> String {
        match &self.source {
            ManifestSource::File(path) => path.display().to_string(),
            ManifestSource::Inline(_) => format!("<inline:{}>", self.name),
        }
    }

    pub fn raw_content(&self) -> Result<String> {
        match &self.source {
            ManifestSource::File(path) => {
                std::fs::read_to_string(path).map_err(|source| EngineError::Read {
                    path: path.clone(),
                    source,
                })
            }
            ManifestSource::Inline(content) => Ok(content.clone()),
        }
    }

    /// Produce the content to apply. Templates are rendered against `context`,
    /// static manifests pass through. Any previous result is discarded first so
    /// nothing is carried over between applies.
    pub fn render<C: Serialize>(&mut self, engine: &Engine, context: &C) -> Result<&str> {
        self.rendered_content = None;

        let raw = self.raw_content()?;
        let content = if self.is_template {
            engine.render_string(&raw, context, &self.name)?
        } else {
            raw
        };

        Ok(self.rendered_content.insert(content))
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered_content.is_some()
    }

    pub fn rendered_content(&self) -> Option<&str> {
        self.rendered_content.as_deref()
    }
}

/// Classify a manifest file name as `(is_patch, is_template)`
pub fn classify(path: &Path) -> (bool, bool) {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let is_patch = file_name.contains(PATCH_MARKER);
    let is_template = path
        .extension()
        .is_some_and(|ext| ext == TEMPLATE_EXTENSION);
    (is_patch, is_template)
}

/// Discover every file under `root` as a manifest, in path order.
///
/// `root` may also be a single file. Directories are skipped.
pub fn discover(root: impl AsRef<Path>) -> Result<Vec<Manifest>> {
    let root = root.as_ref();
    if !root.exists() {
        return Err(EngineError::PathNotFound {
            path: root.to_path_buf(),
        });
    }

    let mut manifests = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let name = match path.strip_prefix(root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy().into_owned(),
            _ => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        manifests.push(Manifest::from_file(name, path));
    }

    Ok(manifests)
}

/// Split rendered content on `---` lines, dropping documents that hold only
/// whitespace or comments.
pub fn split_documents(content: &str) -> Vec<&str> {
    DOCUMENT_SEPARATOR
        .split(content)
        .map(str::trim)
        .filter(|doc| {
            doc.lines()
                .any(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{FeatureContext, InstallerSpec};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_classify() {
        assert_eq!(classify(Path::new("namespace.patch.tmpl")), (true, true));
        assert_eq!(classify(Path::new("base.yaml")), (false, false));
        assert_eq!(classify(Path::new("dir/smcp.patch.yaml")), (true, false));
        assert_eq!(classify(Path::new("gateway.tmpl")), (false, true));
    }

    #[test]
    fn test_discover_sorted_and_recursive() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("b/nested")).unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("b/nested/z.yaml"), "kind: A").unwrap();
        fs::write(dir.path().join("a/ns.patch.tmpl"), "kind: B").unwrap();
        fs::write(dir.path().join("00-root.yaml"), "kind: C").unwrap();

        let manifests = discover(dir.path()).unwrap();
        let names: Vec<&str> = manifests.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["00-root.yaml", "a/ns.patch.tmpl", "b/nested/z.yaml"]);
        assert!(manifests[1].is_patch && manifests[1].is_template);
    }

    #[test]
    fn test_discover_missing_path() {
        let err = discover("/definitely/not/here").unwrap_err();
        assert!(matches!(err, EngineError::PathNotFound { .. }));
    }

    #[test]
    fn test_discover_single_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("only.yaml");
        fs::write(&file, "kind: A").unwrap();

        let manifests = discover(&file).unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].name, "only.yaml");
    }

    #[test]
    fn test_render_is_fresh_each_time() {
        let engine = Engine::default();
        let mut ctx = FeatureContext::from_spec(&InstallerSpec::default());
        let mut manifest = Manifest::inline("cm.tmpl", "domain: {{ domain }}");
        assert!(!manifest.is_rendered());

        ctx.domain = "one.example.com".to_string();
        manifest.render(&engine, &ctx).unwrap();
        assert_eq!(manifest.rendered_content(), Some("domain: one.example.com"));

        ctx.domain = "two.example.com".to_string();
        manifest.render(&engine, &ctx).unwrap();
        assert_eq!(manifest.rendered_content(), Some("domain: two.example.com"));
    }

    #[test]
    fn test_render_failure_clears_previous_output() {
        let engine = Engine::default();
        let ctx = FeatureContext::from_spec(&InstallerSpec::default());
        let mut manifest = Manifest::inline("cm.tmpl", "a: {{ domain }}");
        manifest.render(&engine, &ctx).unwrap();

        manifest.source = ManifestSource::Inline("a: {{ nope.nested }}".to_string());
        assert!(manifest.render(&engine, &ctx).is_err());
        assert!(!manifest.is_rendered());
    }

    #[test]
    fn test_static_manifest_passthrough() {
        let engine = Engine::default();
        let ctx = FeatureContext::default();
        let mut manifest = Manifest::inline("raw.yaml", "value: '{{ not rendered }}'");
        let out = manifest.render(&engine, &ctx).unwrap();
        assert_eq!(out, "value: '{{ not rendered }}'");
    }

    #[test]
    fn test_split_documents() {
        let content = "# header only\n---\nkind: A\n---  \nkind: B\n---\n\n";
        assert_eq!(split_documents(content), vec!["kind: A", "kind: B"]);

        // a separator inside a value is not a document boundary
        let content = "kind: A\ndata:\n  x: \"---\"\n";
        assert_eq!(split_documents(content).len(), 1);
    }

    #[test]
    fn test_render_snapshot() {
        let engine = Engine::default();
        let mut ctx = FeatureContext::from_spec(&InstallerSpec::default());
        ctx.domain = "apps.example.com".to_string();
        let mut manifest = Manifest::inline(
            "gateway.tmpl",
            "apiVersion: v1\nkind: Secret\nmetadata:\n  name: {{ mesh.certificate.name }}\n  namespace: {{ mesh.namespace }}\nstringData:\n  host: {{ replace_char(domain, '.', '-') }}\n",
        );
        let out = manifest.render(&engine, &ctx).unwrap();
        insta::assert_snapshot!(out.trim_end(), @r"
        apiVersion: v1
        kind: Secret
        metadata:
          name: opendatahub-dashboard-cert
          namespace: istio-system
        stringData:
          host: apps-example-com
        ");
    }
}
