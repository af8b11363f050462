use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use super::errors::Result;
use rcs::RevisionControl;
use store::schema::assets;
use tuid::{format_tuid, Tuid};
use virtual_fs::FS;

/// Decides whether a managed file's on-disk/revision-control state has
/// diverged from its cached asset record.
///
/// The tricky case is a read-only file whose disk timestamp is newer than
/// the cache without any content change (sync clients love rewriting
/// timestamps). Re-indexing those on every run would make incremental
/// passes useless, so the revision number breaks the tie and a matching
/// revision refreshes the cached timestamp instead of reporting a change.
pub struct ChangeOracle<F: FS> {
    fs: F,
    rcs: Arc<dyn RevisionControl>,
}

impl<F: FS> ChangeOracle<F> {
    pub fn new(fs: F, rcs: Arc<dyn RevisionControl>) -> Self {
        Self { fs, rcs }
    }

    pub fn has_changed_inner(
        &self,
        conn: &SqliteConnection,
        file_id: Tuid,
        path: &str,
    ) -> Result<bool> {
        // Gone from disk means nothing to re-index.
        if !self.fs.exists(path) {
            return Ok(false);
        }

        let cached: Option<(NaiveDateTime, i64)> = assets::table
            .filter(assets::file_id.eq(file_id as i64))
            .select((assets::last_updated, assets::rcs_revision))
            .first(conn)
            .optional()?;
        let (last_updated, cached_revision) = match cached {
            Some(cached) => cached,
            // Never indexed before.
            None => return Ok(true),
        };

        let metadata = match self.fs.metadata(path) {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!("Could not stat '{}': {}", path, error);
                return Ok(false);
            }
        };
        if fs_to_date_time(&metadata.last_mod_time()) <= last_updated {
            return Ok(false);
        }

        // Newer on disk and writable: someone is actively editing it.
        if !metadata.read_only() {
            return Ok(true);
        }

        // Read-only but newer: let the revision number decide. No known
        // revision means we cannot rule a change out.
        let local_revision = match self.rcs.local_revision(path) {
            Some(revision) => revision,
            None => return Ok(true),
        };
        if local_revision as i64 > cached_revision {
            return Ok(true);
        }

        // The disk timestamp drifted ahead of the revision state. Refresh
        // the cached timestamp so the next pass early-outs on the mtime
        // check; a failed refresh is only an inconvenience, not a change.
        if let Err(error) = self.touch_inner(conn, file_id) {
            error!(
                "Failed to refresh timestamp on '{}' [{}]: {}",
                path,
                format_tuid(file_id),
                error
            );
        }

        Ok(false)
    }

    fn touch_inner(&self, conn: &SqliteConnection, file_id: Tuid) -> Result<()> {
        diesel::update(assets::table.filter(assets::file_id.eq(file_id as i64)))
            .set(assets::last_updated.eq(chrono::Utc::now().naive_utc()))
            .execute(conn)?;

        Ok(())
    }
}

pub fn fs_to_date_time(fs_time: &filetime::FileTime) -> NaiveDateTime {
    NaiveDateTime::from_timestamp(fs_time.unix_seconds(), fs_time.nanoseconds())
}
