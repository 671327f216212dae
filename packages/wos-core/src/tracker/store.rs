use std::{
    collections::BTreeSet,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use tempfile::NamedTempFile;

/// The last observed codes, one per line in a flat file
#[derive(Debug, Clone)]
pub struct TrackedCodes {
    path: PathBuf,
}

impl TrackedCodes {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file reads as an empty set
    pub fn load(&self) -> anyhow::Result<BTreeSet<String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {:?}", self.path))
            }
        };
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Replace the whole file: written to a temp file next to it, then
    /// renamed over it
    pub fn save(&self, codes: &BTreeSet<String>) -> anyhow::Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).with_context(|| format!("failed to create {dir:?}"))?;

        let mut file = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create a temp file in {dir:?}"))?;
        for code in codes {
            writeln!(file, "{code}")?;
        }
        file.as_file().sync_all()?;
        file.persist(&self.path)
            .with_context(|| format!("failed to replace {:?}", self.path))?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn set(codes: &[&str]) -> BTreeSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrackedCodes::new(dir.path().join("wos_codes.txt"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrackedCodes::new(dir.path().join("nested").join("wos_codes.txt"));
        store.save(&set(&["XYZ999", "ABC123"])).unwrap();

        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "ABC123\nXYZ999\n"
        );
        assert_eq!(store.load().unwrap(), set(&["ABC123", "XYZ999"]));

        store.save(&BTreeSet::new()).unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_load_trims() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wos_codes.txt");
        fs::write(&path, "  ABC123 \n\n\r\nXYZ999\r\n").unwrap();
        assert_eq!(
            TrackedCodes::new(path).load().unwrap(),
            set(&["ABC123", "XYZ999"])
        );
    }
}
