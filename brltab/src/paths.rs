//! Where tables live on disk.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Attributes,
    Contraction,
}

impl TableKind {
    pub fn subdirectory(self) -> &'static str {
        match self {
            TableKind::Attributes => "Attributes",
            TableKind::Contraction => "Contraction",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            TableKind::Attributes => "atb",
            TableKind::Contraction => "ctb",
        }
    }

    /// Extension of sub-tables pulled in with `include`.
    pub fn include_extension(self) -> &'static str {
        match self {
            TableKind::Attributes => "ati",
            TableKind::Contraction => "cti",
        }
    }
}

impl std::str::FromStr for TableKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attributes" | "atb" => Ok(TableKind::Attributes),
            "contraction" | "ctb" => Ok(TableKind::Contraction),
            other => Err(format!("unknown table kind `{}`", other)),
        }
    }
}

/// Path of a table without touching its extension.
pub fn resolve(root: &Path, kind: TableKind, name: &str) -> PathBuf {
    let name = Path::new(name);
    if name.is_absolute() {
        name.to_path_buf()
    } else {
        root.join(kind.subdirectory()).join(name)
    }
}

/// Path of the table `name` of the given kind under `root`.
///
/// Names without an extension get the kind's primary extension.
pub fn path_for(root: &Path, kind: TableKind, name: &str) -> PathBuf {
    with_default_extension(resolve(root, kind, name), kind.extension())
}

pub(crate) fn with_default_extension(path: PathBuf, extension: &str) -> PathBuf {
    if path.extension().is_some() {
        path
    } else {
        path.with_extension(extension)
    }
}

/// All installed tables of one kind, sorted by path.
pub fn list_tables(root: &Path, kind: TableKind) -> Vec<PathBuf> {
    let base = root.join(kind.subdirectory());
    let pattern = format!("*.{}", kind.extension());

    let walker = match globwalk::GlobWalkerBuilder::new(&base, &pattern).build() {
        Ok(v) => v,
        Err(e) => {
            log::debug!("cannot search {}: {}", base.display(), e);
            return vec![];
        }
    };

    let mut paths: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(Result::ok)
        .map(|x| x.path().to_path_buf())
        .collect();
    paths.sort();
    paths
}

#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_paths() {
        let root = Path::new("/etc/brltty");
        assert_eq!(
            path_for(root, TableKind::Attributes, "left_right"),
            PathBuf::from("/etc/brltty/Attributes/left_right.atb")
        );
        assert_eq!(
            path_for(root, TableKind::Contraction, "en-us-g2.ctb"),
            PathBuf::from("/etc/brltty/Contraction/en-us-g2.ctb")
        );
        assert_eq!(
            path_for(root, TableKind::Contraction, "/tmp/mine"),
            PathBuf::from("/tmp/mine.ctb")
        );
        assert_eq!(
            resolve(root, TableKind::Contraction, "helper"),
            PathBuf::from("/etc/brltty/Contraction/helper")
        );
    }

    #[test]
    fn listing() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("Contraction");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("b.ctb"), "").unwrap();
        std::fs::write(sub.join("a.ctb"), "").unwrap();
        std::fs::write(sub.join("common.cti"), "").unwrap();

        let found = list_tables(dir.path(), TableKind::Contraction);
        assert_eq!(found, vec![sub.join("a.ctb"), sub.join("b.ctb")]);
        assert!(list_tables(dir.path(), TableKind::Attributes).is_empty());
    }

    #[test]
    fn kind_names() {
        assert_eq!("atb".parse::<TableKind>(), Ok(TableKind::Attributes));
        assert_eq!("contraction".parse::<TableKind>(), Ok(TableKind::Contraction));
        assert!("text".parse::<TableKind>().is_err());
    }
}
