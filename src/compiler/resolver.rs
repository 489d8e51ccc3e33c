//! Import resolution
//!
//! Each `import "path.lr"` is read relative to the importing file, parsed, and
//! reduced to a [`Pack`]: the resource IDs the file declares and the module
//! path its bindings live at. Imports of imports are never followed.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::parser::{self, Lr, Pack};

/// Default option naming the module of an imported file's bindings
pub const DEFAULT_PACKAGE_OPTION: &str = "go_package";

/// Read, parse and resolve the LR file at `path`.
///
/// `read_file` is used for the file itself and for each of its imports, so
/// callers can resolve from memory as well as from disk.
pub fn resolve<F>(path: &Path, read_file: F, package_option: &str) -> Result<Lr>
where
    F: Fn(&Path) -> std::io::Result<String>,
{
    let source = read_file(path).map_err(|e| Error::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let mut lr = parser::parse_named(&source, &path.display().to_string())?;

    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    resolve_imports(&mut lr, &base_dir, read_file, package_option)?;
    Ok(lr)
}

/// Resolve the LR file at `path` from disk with the default package option
pub fn resolve_file(path: impl AsRef<Path>) -> Result<Lr> {
    resolve(path.as_ref(), |p| std::fs::read_to_string(p), DEFAULT_PACKAGE_OPTION)
}

/// Absorb the imports of an already parsed file into `lr.packs`, reading
/// each import relative to `base_dir`. Clears `lr.imports` on success.
pub fn resolve_imports<F>(
    lr: &mut Lr,
    base_dir: &Path,
    read_file: F,
    package_option: &str,
) -> Result<()>
where
    F: Fn(&Path) -> std::io::Result<String>,
{
    for import in &lr.imports {
        let import_path: PathBuf = base_dir.join(import);
        let name = pack_name(import);

        let source = read_file(&import_path).map_err(|e| Error::ImportError {
            path: import.clone(),
            reason: e.to_string(),
        })?;
        let child = parser::parse_named(&source, &import_path.display().to_string()).map_err(
            |e| Error::ImportError {
                path: import.clone(),
                reason: e.to_string(),
            },
        )?;

        let module_path = child
            .options
            .get(package_option)
            .cloned()
            .ok_or_else(|| Error::MissingPackageOption {
                path: import.clone(),
                option: package_option.to_string(),
            })?;

        let resources = child.resources.iter().map(|r| r.id.clone()).collect();
        debug!(import = %import, pack = %name, module = %module_path, "resolved import");

        lr.packs.insert(
            name,
            Pack {
                resources,
                module_path,
            },
        );
    }

    lr.imports.clear();
    Ok(())
}

/// Pack name of an import: its file name without the `.lr` extension
fn pack_name(import: &str) -> String {
    let base = Path::new(import)
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| import.to_string());
    base.strip_suffix(".lr").unwrap_or(&base).to_string()
}
