use std::collections::HashMap;
use std::sync::Mutex;

/// Interface to the surrounding revision control system.
///
/// The change-detection oracle only ever needs one question answered: which
/// revision of a file is currently synced to this workspace. Running the
/// actual revision control commands is out of scope and happens behind this
/// trait.
pub trait RevisionControl: Send + Sync {
    /// The local (synced-to) revision of the file, or `None` if revision
    /// control knows nothing about the path.
    fn local_revision(&self, path: &str) -> Option<u64>;
}

/// Revision control stub for workspaces without any RCS integration.
pub struct NullRevisionControl;

impl RevisionControl for NullRevisionControl {
    fn local_revision(&self, _path: &str) -> Option<u64> {
        None
    }
}

/// Revision lookup backed by a fixed path -> revision map.
/// Useful for offline operation and for driving the oracle in tests.
pub struct StaticRevisionControl {
    revisions: Mutex<HashMap<String, u64>>,
}

impl StaticRevisionControl {
    pub fn new() -> Self {
        Self {
            revisions: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_revision(&self, path: &str, revision: u64) {
        self.revisions
            .lock()
            .unwrap()
            .insert(path.to_string(), revision);
    }
}

impl RevisionControl for StaticRevisionControl {
    fn local_revision(&self, path: &str) -> Option<u64> {
        self.revisions.lock().unwrap().get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_lookup_returns_configured_revisions() {
        let rcs = StaticRevisionControl::new();
        rcs.set_revision("art/rock.entity", 4);

        assert_eq!(rcs.local_revision("art/rock.entity"), Some(4));
        assert_eq!(rcs.local_revision("art/tree.entity"), None);
    }
}
