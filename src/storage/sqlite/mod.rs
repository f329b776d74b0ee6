//! SQLite implementation of the event store.

use std::path::{Path, PathBuf};

mod event_store;

pub use event_store::SqliteEventStore;

/// Directory holding the database file named by a `sqlite:` URL.
///
/// `None` for in-memory databases and bare file names.
pub fn database_dir(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix("sqlite:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_dir() {
        assert_eq!(
            database_dir("sqlite:data/events.db?mode=rwc"),
            Some(PathBuf::from("data"))
        );
        assert_eq!(
            database_dir("sqlite:///var/lib/eventpipe/events.db"),
            Some(PathBuf::from("/var/lib/eventpipe"))
        );
        assert_eq!(database_dir("sqlite::memory:"), None);
        assert_eq!(database_dir("sqlite:events.db"), None);
        assert_eq!(database_dir("postgres://localhost/app"), None);
    }
}
