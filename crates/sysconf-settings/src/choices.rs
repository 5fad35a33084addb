//! ---
//! scs_section: "04-configuration-orchestration"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Lazily computed timezone and keyboard map choice lists."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
//! Choice lists backing the `timezone` and `kbdmap` settings.
//!
//! Both lists are scanned from the host filesystem on first use and then
//! memoized for the lifetime of the [`ChoiceCache`]. Concurrent first callers
//! share a single scan: one thread computes while the others block on the
//! same cell and observe the finished value.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Machine code plus human readable label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Choice {
    pub code: String,
    pub label: String,
}

impl Choice {
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            label: label.into(),
        }
    }
}

/// Raw inputs for the choice lists.
pub trait ChoiceSource: Send + Sync {
    /// Timezone codes in any order. Unreadable entries are skipped.
    fn scan_timezones(&self) -> Vec<String>;
    /// Contents of the keyboard map index.
    fn read_keymap_index(&self) -> io::Result<Vec<u8>>;
}

/// Reads zoneinfo and the console keymap index from disk.
#[derive(Debug, Clone)]
pub struct FilesystemChoiceSource {
    zoneinfo_root: PathBuf,
    keymap_index: PathBuf,
}

impl FilesystemChoiceSource {
    pub fn new(zoneinfo_root: impl Into<PathBuf>, keymap_index: impl Into<PathBuf>) -> Self {
        Self {
            zoneinfo_root: zoneinfo_root.into(),
            keymap_index: keymap_index.into(),
        }
    }
}

impl ChoiceSource for FilesystemChoiceSource {
    fn scan_timezones(&self) -> Vec<String> {
        WalkDir::new(&self.zoneinfo_root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(root = %self.zoneinfo_root.display(), error = %err, "skipping unreadable zoneinfo entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| timezone_code(&self.zoneinfo_root, entry.path()))
            .collect()
    }

    fn read_keymap_index(&self) -> io::Result<Vec<u8>> {
        std::fs::read(&self.keymap_index)
    }
}

/// Zone name for a file under `root`, or `None` for metadata and `Etc/GMT*` aliases.
pub fn timezone_code(root: &Path, path: &Path) -> Option<String> {
    if path.file_name()? == "zone.tab" {
        return None;
    }
    let relative = path.strip_prefix(root).ok()?;
    let code = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?
        .join("/");
    if code.is_empty() || format!("/{code}").contains("/Etc/GMT") {
        return None;
    }
    Some(code)
}

static KEYMAP_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(?P<name>[^#\s]+?)\.kbd:en:(?P<desc>.+)$").expect("valid keymap index regex")
});

/// Extract `(name, english description)` pairs from an `INDEX.keymaps` file.
pub fn parse_keymap_index(text: &str) -> Vec<Choice> {
    KEYMAP_LINE
        .captures_iter(text)
        .map(|caps| Choice::new(&caps["name"], caps["desc"].trim_end_matches('\r')))
        .collect()
}

/// Sorted, de-duplicated timezone list.
pub fn normalize_timezones(mut zones: Vec<String>) -> Vec<String> {
    zones.sort();
    zones.dedup();
    zones
}

/// Single-flight memo that can be reset.
struct Memo<T> {
    cell: RwLock<Arc<OnceCell<Arc<T>>>>,
}

impl<T> Memo<T> {
    fn new() -> Self {
        Self {
            cell: RwLock::new(Arc::new(OnceCell::new())),
        }
    }

    fn get_or_init(&self, init: impl FnOnce() -> T) -> Arc<T> {
        // Clone the cell out so the lock is not held across the scan.
        let cell = self.cell.read().clone();
        Arc::clone(cell.get_or_init(|| Arc::new(init())))
    }

    fn is_initialized(&self) -> bool {
        self.cell.read().get().is_some()
    }

    fn reset(&self) {
        *self.cell.write() = Arc::new(OnceCell::new());
    }
}

/// Memoized timezone and keyboard map lists.
pub struct ChoiceCache {
    source: Arc<dyn ChoiceSource>,
    timezones: Memo<Vec<String>>,
    keyboard_maps: Memo<Vec<Choice>>,
}

impl ChoiceCache {
    pub fn new(source: Arc<dyn ChoiceSource>) -> Self {
        Self {
            source,
            timezones: Memo::new(),
            keyboard_maps: Memo::new(),
        }
    }

    pub fn timezones(&self) -> Arc<Vec<String>> {
        self.timezones.get_or_init(|| {
            let zones = normalize_timezones(self.source.scan_timezones());
            debug!(count = zones.len(), "timezone choices computed");
            zones
        })
    }

    /// Keyboard maps; a missing or unreadable index yields an empty list.
    pub fn keyboard_maps(&self) -> Arc<Vec<Choice>> {
        self.keyboard_maps.get_or_init(|| match self.source.read_keymap_index() {
            Ok(bytes) => {
                let maps = parse_keymap_index(&String::from_utf8_lossy(&bytes));
                debug!(count = maps.len(), "keyboard map choices computed");
                maps
            }
            Err(err) => {
                debug!(error = %err, "keyboard map index unavailable");
                Vec::new()
            }
        })
    }

    pub fn has_timezone(&self, code: &str) -> bool {
        self.timezones()
            .binary_search_by(|zone| zone.as_str().cmp(code))
            .is_ok()
    }

    pub fn has_keyboard_map(&self, code: &str) -> bool {
        self.keyboard_maps().iter().any(|choice| choice.code == code)
    }

    /// Whether both lists have been computed.
    pub fn is_warm(&self) -> bool {
        self.timezones.is_initialized() && self.keyboard_maps.is_initialized()
    }

    /// Drop both lists; the next access rescans the source.
    pub fn invalidate(&self) {
        self.timezones.reset();
        self.keyboard_maps.reset();
    }
}

impl std::fmt::Debug for ChoiceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChoiceCache")
            .field("timezones", &self.timezones.is_initialized())
            .field("keyboard_maps", &self.keyboard_maps.is_initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        zones: Vec<String>,
        index: Option<&'static str>,
        scans: AtomicUsize,
    }

    impl ChoiceSource for Fixed {
        fn scan_timezones(&self) -> Vec<String> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            self.zones.clone()
        }

        fn read_keymap_index(&self) -> io::Result<Vec<u8>> {
            self.index
                .map(|text| text.as_bytes().to_vec())
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no index"))
        }
    }

    fn fixed(zones: &[&str], index: Option<&'static str>) -> Arc<Fixed> {
        Arc::new(Fixed {
            zones: zones.iter().map(|z| z.to_string()).collect(),
            index,
            scans: AtomicUsize::new(0),
        })
    }

    #[test]
    fn timezones_are_sorted_and_unique() {
        let source = fixed(&["Europe/Oslo", "America/New_York", "UTC", "Europe/Oslo"], None);
        let cache = ChoiceCache::new(source.clone());
        assert_eq!(
            cache.timezones().as_slice(),
            ["America/New_York", "Europe/Oslo", "UTC"]
        );
        assert!(cache.has_timezone("UTC"));
        assert!(!cache.has_timezone("utc"));
        cache.timezones();
        assert_eq!(source.scans.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidate_forces_rescan() {
        let source = fixed(&["UTC"], None);
        let cache = ChoiceCache::new(source.clone());
        cache.timezones();
        cache.invalidate();
        assert!(!cache.is_warm());
        cache.timezones();
        assert_eq!(source.scans.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_keymap_index_yields_empty_list() {
        let cache = ChoiceCache::new(fixed(&[], None));
        assert!(cache.keyboard_maps().is_empty());
        assert!(cache.timezones().is_empty());
        assert!(!cache.has_keyboard_map("us"));
    }

    #[test]
    fn parses_english_keymap_lines_only() {
        let index = "# comment.kbd:en:ignored\n\
                     MENU:en:Choose your keyboard layout\n\
                     us.kbd:en:United States of America\n\
                     de.kbd:de:Deutsch\n\
                     fr.acc.kbd:en:French accent keys\r\n\
                     be.iso.kbd:fr,en:Belgian\n";
        let maps = parse_keymap_index(index);
        assert_eq!(
            maps,
            vec![
                Choice::new("us", "United States of America"),
                Choice::new("fr.acc", "French accent keys"),
            ]
        );
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let bytes = b"us.kbd:en:United \xff States\n";
        let maps = parse_keymap_index(&String::from_utf8_lossy(bytes));
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].code, "us");
    }

    #[test]
    fn filesystem_scan_skips_metadata_and_gmt_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for rel in [
            "UTC",
            "zone.tab",
            "Europe/Oslo",
            "America/Argentina/Salta",
            "Etc/GMT+1",
            "Etc/GMT",
            "Etc/UTC",
        ] {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"TZif").unwrap();
        }

        let source = FilesystemChoiceSource::new(root, root.join("INDEX.keymaps"));
        let cache = ChoiceCache::new(Arc::new(source));
        assert_eq!(
            cache.timezones().as_slice(),
            ["America/Argentina/Salta", "Etc/UTC", "Europe/Oslo", "UTC"]
        );
        assert!(cache.keyboard_maps().is_empty());
    }

    #[test]
    fn missing_zoneinfo_root_is_empty_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let source = FilesystemChoiceSource::new(dir.path().join("absent"), dir.path().join("absent.idx"));
        assert!(source.scan_timezones().is_empty());
    }
}
