use super::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// In-memory stand-in for the native filesystem.
///
/// Clones share the same backing map (like clones of a native FS handle all
/// see the same disk), so a test can hand the FS to the cache and still
/// flip mod times or read-only bits afterwards.
pub struct InMemoryFS {
    items: Arc<Mutex<HashMap<PathBuf, Metadata>>>,
}

impl InMemoryFS {
    pub fn new() -> InMemoryFS {
        InMemoryFS {
            items: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn create_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut items = self.items.lock().unwrap();

        if items.contains_key(path.as_ref()) {
            return Err(io::Error::from(io::ErrorKind::AlreadyExists));
        }
        items.insert(
            path.as_ref().to_path_buf(),
            Metadata {
                file_type: FileType::File,
                read_only: false,
                last_mod_time: FileTime::zero(),
                size: 0,
            },
        );

        Ok(())
    }

    pub fn remove_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        match self.items.lock().unwrap().remove(path.as_ref()) {
            Some(_) => Ok(()),
            None => Err(io::Error::from(io::ErrorKind::NotFound)),
        }
    }

    pub fn set_mod_time<P: AsRef<Path>>(&self, path: P, mod_time: FileTime) -> io::Result<()> {
        self.update_item(path, |item| item.last_mod_time = mod_time)
    }

    pub fn set_read_only<P: AsRef<Path>>(&self, path: P, read_only: bool) -> io::Result<()> {
        self.update_item(path, |item| item.read_only = read_only)
    }

    pub fn set_size<P: AsRef<Path>>(&self, path: P, size: u64) -> io::Result<()> {
        self.update_item(path, |item| item.size = size)
    }

    fn update_item<P: AsRef<Path>, F: FnOnce(&mut Metadata)>(
        &self,
        path: P,
        update: F,
    ) -> io::Result<()> {
        let mut items = self.items.lock().unwrap();

        match items.get_mut(path.as_ref()) {
            Some(item) => {
                update(item);
                Ok(())
            }
            None => Err(io::Error::from(io::ErrorKind::NotFound)),
        }
    }
}

impl Clone for InMemoryFS {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl FS for InMemoryFS {
    fn default() -> Self {
        Self::new()
    }

    fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
        self.items.lock().unwrap().contains_key(path.as_ref())
    }

    fn metadata<P: AsRef<Path>>(&self, path: P) -> io::Result<Metadata> {
        match self.items.lock().unwrap().get(path.as_ref()) {
            Some(item) => Ok(item.clone()),
            None => Err(io::Error::from(io::ErrorKind::NotFound)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_stat_files() {
        let fs = InMemoryFS::new();

        assert!(!fs.exists("file-1"));
        fs.create_file("file-1").unwrap();
        assert!(fs.exists("file-1"));

        let metadata = fs.metadata("file-1").unwrap();
        assert_eq!(metadata.file_type(), FileType::File);
        assert!(!metadata.read_only());
    }

    #[test]
    fn clones_share_the_same_items() {
        let fs = InMemoryFS::new();
        let fs_clone = fs.clone();

        fs.create_file("file-1").unwrap();
        fs_clone.set_read_only("file-1", true).unwrap();
        fs_clone.set_size("file-1", 1337).unwrap();
        fs_clone
            .set_mod_time("file-1", FileTime::from_unix_time(42, 0))
            .unwrap();

        let metadata = fs.metadata("file-1").unwrap();
        assert!(metadata.read_only());
        assert_eq!(metadata.size(), 1337);
        assert_eq!(metadata.last_mod_time(), FileTime::from_unix_time(42, 0));
    }

    #[test]
    fn missing_files_report_not_found() {
        let fs = InMemoryFS::new();

        assert!(fs.metadata("no-such-file").is_err());
        assert!(fs.set_read_only("no-such-file", true).is_err());
    }
}
