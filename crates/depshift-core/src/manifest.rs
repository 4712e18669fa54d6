//! `package.json` access: lookup and in-place version rewrite.
//!
//! Key order is preserved (serde_json `preserve_order`), output is two-space
//! indented with a trailing newline, matching what npm writes.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::domain::{DepshiftError, Result};
use crate::package_manager::MANIFEST_FILE;

/// Sections searched for a package, in order. First match wins.
pub const SEARCHED_SECTIONS: [&str; 2] = ["dependencies", "devDependencies"];

/// A parsed manifest bound to its file.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    doc: Value,
}

impl Manifest {
    /// Load `<project>/package.json`.
    pub fn load(project: &Path) -> Result<Self> {
        Self::load_file(&project.join(MANIFEST_FILE))
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DepshiftError::Manifest(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(path, &raw)
    }

    pub fn parse(path: &Path, raw: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(raw).map_err(|e| {
            DepshiftError::Manifest(format!("failed to parse {}: {e}", path.display()))
        })?;
        if !doc.is_object() {
            return Err(DepshiftError::Manifest(format!(
                "{} is not a JSON object",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            doc,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn section(&self, name: &str) -> Option<&Map<String, Value>> {
        self.doc.get(name).and_then(Value::as_object)
    }

    /// Declared range for `package` and the section it was found in.
    pub fn declared(&self, package: &str) -> Option<(&'static str, &str)> {
        SEARCHED_SECTIONS.iter().find_map(|section| {
            self.section(section)
                .and_then(|deps| deps.get(package))
                .and_then(Value::as_str)
                .map(|version| (*section, version))
        })
    }

    pub fn declared_version(&self, package: &str) -> Option<&str> {
        self.declared(package).map(|(_, v)| v)
    }

    /// Set the declared version of `package` to `target`, keeping a leading
    /// `^` or `~` operator. Returns the previous declaration.
    ///
    /// Fails with [`DepshiftError::PackageNotFound`] when the package is in
    /// neither searched section; it is never added.
    pub fn set_version(&mut self, package: &str, target: &str) -> Result<String> {
        let (section, previous) = self
            .declared(package)
            .map(|(s, v)| (s, v.to_string()))
            .ok_or_else(|| DepshiftError::PackageNotFound {
                package: package.to_string(),
            })?;

        let declared = format!("{}{}", range_operator(&previous), target.trim());
        let deps = self
            .doc
            .get_mut(section)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| DepshiftError::Manifest(format!("section {section} vanished")))?;
        deps.insert(package.to_string(), Value::String(declared));
        Ok(previous)
    }

    /// All declared packages across `dependencies`, `devDependencies` and
    /// `peerDependencies`. Earlier sections win on duplicates.
    pub fn all_declared(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for section in ["dependencies", "devDependencies", "peerDependencies"] {
            if let Some(deps) = self.section(section) {
                for (name, value) in deps {
                    if let Some(v) = value.as_str() {
                        out.entry(name.clone()).or_insert_with(|| v.to_string());
                    }
                }
            }
        }
        out
    }

    pub fn render(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(&self.doc)?;
        text.push('\n');
        Ok(text)
    }

    /// Write back atomically (temp file in the same directory, then rename),
/// keeping the existing file's permissions.
    pub fn save(&self) -> Result<()> {
        let text = self.render()?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(text.as_bytes())?;
        // the temp file is created 0600; keep the manifest's own mode
        if let Ok(existing) = std::fs::metadata(&self.path) {
            tmp.as_file().set_permissions(existing.permissions())?;
        }
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// `^` or `~` prefix of a declared range, or empty.
fn range_operator(declared: &str) -> &'static str {
    let trimmed = declared.trim_start();
    if trimmed.starts_with('^') {
        "^"
    } else if trimmed.starts_with('~') && !trimmed.starts_with("~>") {
        "~"
    } else {
        ""
    }
}
