use crate::error::DiscoveryError;
use crate::model::MigrationScript;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub const MIGRATION_SUFFIX: &str = ".sql";

/// Lists the migration scripts in `dir`, ordered byte-wise by file name.
///
/// Entries that are not regular files or do not end in [`MIGRATION_SUFFIX`] are
/// ignored. File contents are not touched here; an unreadable script fails when
/// the executor reaches it.
pub fn discover_migrations(dir: impl AsRef<Path>) -> Result<Vec<MigrationScript>, DiscoveryError> {
    let dir = dir.as_ref();
    let dir_display = dir.display().to_string();

    let entries = fs::read_dir(dir).map_err(|e| match e.kind() {
        ErrorKind::NotFound => DiscoveryError::NotFound {
            dir: dir_display.clone(),
        },
        _ => DiscoveryError::NotReadable {
            dir: dir_display.clone(),
            message: e.to_string(),
        },
    })?;

    let mut scripts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DiscoveryError::NotReadable {
            dir: dir_display.clone(),
            message: e.to_string(),
        })?;

        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let filename = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                tracing::warn!(dir = %dir_display, name = ?raw, "skipping migration with non UTF-8 file name");
                continue;
            }
        };

        if !filename.ends_with(MIGRATION_SUFFIX) {
            tracing::trace!(file = %filename, "ignoring non-migration file");
            continue;
        }

        scripts.push(MigrationScript::new(filename, path));
    }

    scripts.sort_by(|a, b| a.identity().as_bytes().cmp(b.identity().as_bytes()));

    tracing::debug!(dir = %dir_display, count = scripts.len(), "discovered migrations");
    Ok(scripts)
}
