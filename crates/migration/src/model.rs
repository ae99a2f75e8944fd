use crate::checksum::sha256_hex;
use crate::error::ScriptReadError;
use std::fs;
use std::path::{Path, PathBuf};

/// A migration file found on disk. The file name is both its identity and its
/// sort key; content stays on disk until the script is about to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    identity: String,
    path: PathBuf,
}

impl MigrationScript {
    pub fn new(identity: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            identity: identity.into(),
            path: path.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<ScriptContent, ScriptReadError> {
        let bytes = fs::read(&self.path).map_err(|e| ScriptReadError {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;

        let checksum = sha256_hex(&bytes);
        let sql = String::from_utf8(bytes).map_err(|e| ScriptReadError {
            path: self.path.display().to_string(),
            message: format!("file is not valid UTF-8: {e}"),
        })?;

        Ok(ScriptContent { sql, checksum })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptContent {
    pub sql: String,
    pub checksum: String,
}

#[cfg(test)]
mod tests {
    use super::MigrationScript;
    use crate::checksum::sha256_hex;
    use crate::error::ScriptReadError;
    use std::fs;

    #[test]
    fn read_returns_text_and_checksum_of_raw_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("001_init.sql");
        fs::write(&path, b"create table a (id int);").unwrap();

        let script = MigrationScript::new("001_init.sql", &path);
        let content = script.read().unwrap();

        assert_eq!(content.sql, "create table a (id int);");
        assert_eq!(content.checksum, sha256_hex(b"create table a (id int);"));
    }

    #[test]
    fn read_of_missing_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let script = MigrationScript::new("001_gone.sql", tmp.path().join("001_gone.sql"));
        let err: ScriptReadError = script.read().unwrap_err();
        assert!(err.path.ends_with("001_gone.sql"));
    }

    #[test]
    fn read_rejects_non_utf8_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("001_bin.sql");
        fs::write(&path, [0xff_u8, 0xfe, 0x00]).unwrap();

        let err = MigrationScript::new("001_bin.sql", &path).read().unwrap_err();
        assert!(err.message.contains("UTF-8"));
    }
}
