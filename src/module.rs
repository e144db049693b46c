//! Module directory collaborator: file enumeration and encoded I/O.
//!
//! Everything the migration core needs from the filesystem goes through this
//! module, so encoding fallback and atomic writes stay out of the passes.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Manifest file names, in discovery order.
pub const MANIFEST_NAMES: [&str; 2] = ["__manifest__.py", "__openerp__.py"];

/// Source extensions (without dot) a migration step visits.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["py", "xml", "js", "csv"];

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("'{}' is not a valid directory", path.display())]
    NotADirectory { path: PathBuf },

    #[error("no __manifest__.py or __openerp__.py found in '{}'", path.display())]
    NoManifest { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A validated module root: the directory plus its discovered manifest.
#[derive(Debug, Clone)]
pub struct ModuleDir {
    root: PathBuf,
    manifest: PathBuf,
}

impl ModuleDir {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ModuleError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ModuleError::NotADirectory { path: root });
        }
        let manifest = MANIFEST_NAMES
            .iter()
            .map(|name| root.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| ModuleError::NoManifest { path: root.clone() })?;
        Ok(Self { root, manifest })
    }

    /// The technical module name, i.e. the directory name.
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest
    }

    /// All files under the module with one of `extensions`, in a stable
    /// sorted order.
    pub fn list_files(&self, extensions: &[&str]) -> Result<Vec<PathBuf>, ModuleError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| ModuleError::Io {
                path: self.root.clone(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let matches = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| extensions.contains(&ext));
            if matches {
                files.push(entry.path().to_path_buf());
            }
        }
        Ok(files)
    }
}

/// Read a text file as UTF-8, stripping a BOM when present. Files that are
/// not valid UTF-8 are decoded as Latin-1, which accepts every byte sequence.
pub fn read_text(path: &Path) -> Result<String, ModuleError> {
    let bytes = fs::read(path).map_err(|e| ModuleError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let bytes = bytes
        .strip_prefix(&[0xEF, 0xBB, 0xBF])
        .unwrap_or(&bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(_) => {
            debug!(file = %path.display(), "not valid UTF-8; decoding as Latin-1");
            Ok(bytes.iter().map(|&b| b as char).collect())
        }
    }
}

/// Write a text file atomically: tempfile in the same directory, fsync, then
/// rename over the original.
pub fn write_text(path: &Path, text: &str) -> Result<(), ModuleError> {
    let io_err = |source| ModuleError::Io {
        path: path.to_path_buf(),
        source,
    };
    let parent = path.parent().ok_or_else(|| {
        io_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        ))
    })?;
    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    temp.write_all(text.as_bytes()).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn module_with_manifest() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("__manifest__.py"), "{'name': 'Test'}\n").unwrap();
        dir
    }

    #[test]
    fn open_requires_a_manifest() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ModuleDir::open(dir.path()),
            Err(ModuleError::NoManifest { .. })
        ));
        assert!(matches!(
            ModuleDir::open(dir.path().join("missing")),
            Err(ModuleError::NotADirectory { .. })
        ));
    }

    #[test]
    fn open_finds_legacy_manifest_name() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("__openerp__.py"), "{}\n").unwrap();
        let module = ModuleDir::open(dir.path()).unwrap();
        assert!(module.manifest_path().ends_with("__openerp__.py"));
    }

    #[test]
    fn list_files_filters_by_extension_in_sorted_order() {
        let dir = module_with_manifest();
        fs::create_dir(dir.path().join("views")).unwrap();
        fs::write(dir.path().join("views/b.xml"), "<odoo/>").unwrap();
        fs::write(dir.path().join("views/a.xml"), "<odoo/>").unwrap();
        fs::write(dir.path().join("models.py"), "").unwrap();
        fs::write(dir.path().join("README.rst"), "").unwrap();

        let module = ModuleDir::open(dir.path()).unwrap();
        let files = module.list_files(&["xml"]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("views/a.xml"));
        assert!(files[1].ends_with("views/b.xml"));

        let py = module.list_files(&["py"]).unwrap();
        assert_eq!(py.len(), 2); // manifest counts too
    }

    #[test]
    fn read_text_strips_bom() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bom.xml");
        fs::write(&path, b"\xEF\xBB\xBF<odoo/>").unwrap();
        assert_eq!(read_text(&path).unwrap(), "<odoo/>");
    }

    #[test]
    fn read_text_falls_back_to_latin1() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.py");
        fs::write(&path, b"# caf\xe9\n").unwrap();
        assert_eq!(read_text(&path).unwrap(), "# café\n");
    }

    #[test]
    fn write_text_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.xml");
        write_text(&path, "<odoo/>\n").unwrap();
        assert_eq!(read_text(&path).unwrap(), "<odoo/>\n");
        write_text(&path, "<data/>\n").unwrap();
        assert_eq!(read_text(&path).unwrap(), "<data/>\n");
    }
}
