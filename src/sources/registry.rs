//! Known browsers and where they keep their history

use super::sqlite::{BrowserKind, SqliteExtractor};
use super::Extractor;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// One browser we know how to find and read
pub struct BrowserSource {
    pub name: &'static str,
    /// Candidate profile roots, relative to the home directory
    pub paths: &'static [&'static str],
    /// Finds history databases under a root
    pub finder: fn(&Path) -> Vec<PathBuf>,
    pub constructor: fn(&str, PathBuf) -> Box<dyn Extractor>,
}

pub const BROWSER_SOURCES: &[BrowserSource] = &[
    BrowserSource {
        name: "chrome",
        paths: &[
            "Library/Application Support/Google/Chrome",
            ".config/google-chrome",
        ],
        finder: find_chromium_dbs,
        constructor: chromium,
    },
    BrowserSource {
        name: "brave",
        paths: &[
            "Library/Application Support/BraveSoftware/Brave-Browser",
            ".config/BraveSoftware/Brave-Browser",
        ],
        finder: find_chromium_dbs,
        constructor: chromium,
    },
    BrowserSource {
        name: "brave-beta",
        paths: &[
            "Library/Application Support/BraveSoftware/Brave-Browser-Beta",
            ".config/BraveSoftware/Brave-Browser-Beta",
        ],
        finder: find_chromium_dbs,
        constructor: chromium,
    },
    BrowserSource {
        name: "arc",
        paths: &["Library/Application Support/Arc/User Data"],
        finder: find_chromium_dbs,
        constructor: chromium,
    },
    BrowserSource {
        name: "vivaldi",
        paths: &["Library/Application Support/Vivaldi", ".config/vivaldi"],
        finder: find_chromium_dbs,
        constructor: chromium,
    },
    BrowserSource {
        name: "sidekick",
        paths: &["Library/Application Support/Sidekick"],
        finder: find_chromium_dbs,
        constructor: chromium,
    },
    BrowserSource {
        name: "edge",
        paths: &[
            "Library/Application Support/Microsoft Edge",
            ".config/microsoft-edge",
        ],
        finder: find_chromium_dbs,
        constructor: chromium,
    },
    BrowserSource {
        name: "chromium",
        paths: &[".config/chromium"],
        finder: find_chromium_dbs,
        constructor: chromium,
    },
    BrowserSource {
        name: "firefox",
        paths: &[
            "Library/Application Support/Firefox/Profiles",
            ".mozilla/firefox",
        ],
        finder: find_firefox_dbs,
        constructor: firefox,
    },
    BrowserSource {
        name: "safari",
        paths: &["Library/Safari"],
        finder: find_safari_db,
        constructor: safari,
    },
    BrowserSource {
        name: "orion",
        paths: &["Library/Application Support/Orion/Defaults"],
        finder: find_orion_db,
        constructor: orion,
    },
    BrowserSource {
        name: "sigmaos",
        paths: &[
            "Library/Containers/com.sigmaos.sigmaos.macos/Data/Library/Application Support/SigmaOS",
        ],
        finder: find_sigmaos_db,
        constructor: sigmaos,
    },
];

fn chromium(name: &str, path: PathBuf) -> Box<dyn Extractor> {
    Box::new(SqliteExtractor::new(name, path, BrowserKind::Chromium))
}

fn firefox(name: &str, path: PathBuf) -> Box<dyn Extractor> {
    Box::new(SqliteExtractor::new(name, path, BrowserKind::Firefox))
}

fn safari(name: &str, path: PathBuf) -> Box<dyn Extractor> {
    Box::new(SqliteExtractor::new(name, path, BrowserKind::Safari))
}

fn orion(name: &str, path: PathBuf) -> Box<dyn Extractor> {
    Box::new(SqliteExtractor::new(name, path, BrowserKind::Orion))
}

fn sigmaos(name: &str, path: PathBuf) -> Box<dyn Extractor> {
    Box::new(SqliteExtractor::new(name, path, BrowserKind::SigmaOs))
}

fn find_files_named(root: &Path, file_name: &str) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == file_name)
        .map(|e| e.into_path())
        .collect()
}

/// Every profile's `History` file
pub fn find_chromium_dbs(root: &Path) -> Vec<PathBuf> {
    find_files_named(root, "History")
}

pub fn find_firefox_dbs(root: &Path) -> Vec<PathBuf> {
    find_files_named(root, "places.sqlite")
}

/// Browsers with a single store directly under the root
fn single_file(root: &Path, file_name: &str) -> Vec<PathBuf> {
    let path = root.join(file_name);
    if path.is_file() {
        vec![path]
    } else {
        Vec::new()
    }
}

pub fn find_safari_db(root: &Path) -> Vec<PathBuf> {
    single_file(root, "History.db")
}

pub fn find_orion_db(root: &Path) -> Vec<PathBuf> {
    single_file(root, "history")
}

pub fn find_sigmaos_db(root: &Path) -> Vec<PathBuf> {
    single_file(root, "Model.sqlite")
}

/// Build extractors for every history database found under `home`.
/// `only` restricts discovery to one browser name.
pub fn discover_extractors(home: &Path, only: Option<&str>) -> Vec<Box<dyn Extractor>> {
    let mut extractors = Vec::new();

    for source in BROWSER_SOURCES {
        if only.is_some_and(|name| name != source.name) {
            continue;
        }

        for relative in source.paths {
            let root = home.join(relative);
            if !root.exists() {
                debug!("[{}] not found, skipping: {:?}", source.name, root);
                continue;
            }

            for db_path in (source.finder)(&root) {
                debug!("[{}] found history database: {:?}", source.name, db_path);
                extractors.push((source.constructor)(source.name, db_path));
            }
        }
    }

    extractors
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_registry_names_are_unique() {
        let mut names: Vec<&str> = BROWSER_SOURCES.iter().map(|s| s.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), BROWSER_SOURCES.len());
    }

    #[test]
    fn test_discovers_every_profile() {
        let home = TempDir::new().unwrap();
        let chrome = home.path().join(".config/google-chrome");
        touch(&chrome.join("Default/History"));
        touch(&chrome.join("Profile 1/History"));
        touch(&chrome.join("Default/History-journal"));
        touch(&home.path().join(".mozilla/firefox/abc.default/places.sqlite"));

        let found = discover_extractors(home.path(), None);
        let mut names: Vec<&str> = found.iter().map(|e| e.name()).collect();
        names.sort();
        assert_eq!(names, vec!["chrome", "chrome", "firefox"]);
    }

    #[test]
    fn test_only_filter() {
        let home = TempDir::new().unwrap();
        touch(&home.path().join(".config/google-chrome/Default/History"));
        touch(&home.path().join("Library/Safari/History.db"));

        let found = discover_extractors(home.path(), Some("safari"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "safari");
        assert!(found[0].source_path().ends_with("History.db"));
    }

    #[test]
    fn test_discovers_macos_only_browsers() {
        let home = TempDir::new().unwrap();
        let orion = home.path().join("Library/Application Support/Orion/Defaults");
        touch(&orion.join("history"));
        touch(&orion.join("history-wal"));
        touch(&home.path().join(
            "Library/Containers/com.sigmaos.sigmaos.macos/Data/Library/Application Support/SigmaOS/Model.sqlite",
        ));

        let found = discover_extractors(home.path(), None);
        let mut names: Vec<&str> = found.iter().map(|e| e.name()).collect();
        names.sort();
        assert_eq!(names, vec!["orion", "sigmaos"]);

        let found = discover_extractors(home.path(), Some("orion"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source_path(), orion.join("history").as_path());
    }
}
