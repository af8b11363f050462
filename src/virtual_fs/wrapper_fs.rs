use super::*;
use std::fs;

#[derive(Clone)]
pub struct WrapperFS {}

impl FS for WrapperFS {
    fn default() -> Self {
        Self {}
    }

    fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref().exists()
    }

    fn metadata<P: AsRef<Path>>(&self, path: P) -> io::Result<Metadata> {
        let native_metadata = fs::metadata(path)?;

        Ok(Metadata {
            file_type: match native_metadata.file_type() {
                t if t.is_file() => FileType::File,
                t if t.is_dir() => FileType::Dir,
                t if t.is_symlink() => FileType::Link,
                _ => return Err(io::Error::from(io::ErrorKind::Other)),
            },
            read_only: native_metadata.permissions().readonly(),
            last_mod_time: FileTime::from_last_modification_time(&native_metadata),
            size: native_metadata.len(),
        })
    }
}
