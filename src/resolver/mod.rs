mod entity;
pub use self::entity::*;
mod errors;
pub use self::errors::{ResolverError, Result};
#[cfg(test)]
mod tests;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::collections::BTreeSet;
use std::sync::Arc;

use store::schema::{file_id_lookups, files, handled_events, histories, users};
use store::Store;
use tuid::{format_tuid, Tuid};

/// The file identity registry.
///
/// Maps identifiers to paths (one live canonical record per path), resolves
/// identifier collisions through a flat alias table and keeps an append-only
/// history of every mutation. All operations run under the store's critical
/// section, so an insert and its history entry are never observed half done.
pub struct Resolver {
    store: Arc<Store>,
}

impl Resolver {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Looks up a record by identifier.
    ///
    /// A miss in the primary table falls through to the collision lookup
    /// table and retries once with the canonical identifier; the lookup
    /// table is kept flat, so one hop always suffices.
    pub fn find_by_id(&self, id: Tuid, include_deleted: bool) -> Result<Option<ManagedFile>> {
        let conn = self.store.conn()?;
        self.find_by_id_inner(&conn, id, include_deleted)
    }

    pub fn find_by_path(&self, path: &str, include_deleted: bool) -> Result<Option<ManagedFile>> {
        let conn = self.store.conn()?;
        self.find_by_path_inner(&conn, path, include_deleted)
    }

    /// Registers a file under the given identifier. Idempotent:
    ///
    /// 1) The identifier already maps to this path: no-op (restoring the
    ///    record if it was soft-deleted).
    /// 2) The identifier already maps to a different path: hard identity
    ///    conflict, reported as `DuplicateEntry`.
    /// 3) The path already has a canonical record under a different
    ///    identifier (e.g. a second client minted its own id offline): the
    ///    new identifier becomes an alias of the canonical one.
    /// 4) Otherwise a new record is created.
    ///
    /// Returns the identifier of record, which is not necessarily the one
    /// passed in (case 3).
    pub fn insert(
        &self,
        id: Tuid,
        path: &str,
        created: NaiveDateTime,
        modified: NaiveDateTime,
        user_id: u32,
    ) -> Result<Tuid> {
        let conn = self.store.conn()?;

        Ok(conn.transaction::<_, ResolverError, _>(|| {
            if let Some(existing) = self.find_by_id_inner(&conn, id, true)? {
                if existing.path == path {
                    if existing.was_deleted {
                        self.restore_inner(&conn, &existing, modified, user_id)?;
                    }
                    return Ok(existing.file_id());
                }

                return Err(ResolverError::DuplicateEntry {
                    existing_id: existing.file_id(),
                    path: path.to_string(),
                });
            }

            if let Some(existing) = self.find_by_path_inner(&conn, path, true)? {
                // An independently minted identifier showed up for a path we
                // already track. The canonical record wins, the new id only
                // gets an alias entry.
                if existing.file_id() != id {
                    debug!(
                        "Duplicate id {} for '{}', aliasing to existing {}",
                        format_tuid(id),
                        path,
                        format_tuid(existing.file_id())
                    );
                    self.register_alias_inner(&conn, id, existing.file_id())?;
                }

                if existing.was_deleted {
                    self.restore_inner(&conn, &existing, modified, user_id)?;
                }

                return Ok(existing.file_id());
            }

            diesel::insert_into(files::table)
                .values(managed_file::InsertFull {
                    id: id as i64,
                    path,
                    created: &created,
                    modified: &modified,
                    user_id: user_id as i32,
                    was_deleted: false,
                })
                .execute(&*conn)?;
            self.append_history_inner(&conn, id, PatchOperation::Insert, modified, user_id, None)?;

            Ok(id)
        })?)
    }

    /// Moves the record for the given identifier to a new path, with the
    /// same disambiguation as `insert`. A soft-deleted record squatting on
    /// the target path is hard-retired (`Obliterate`) to free it; a live one
    /// wins the path and the given identifier is aliased to it and
    /// soft-deleted. Appends an `Update` history entry carrying the old
    /// path.
    pub fn update(
        &self,
        id: Tuid,
        new_path: &str,
        modified: NaiveDateTime,
        user_id: u32,
    ) -> Result<Tuid> {
        let conn = self.store.conn()?;

        Ok(conn.transaction::<_, ResolverError, _>(|| {
            let existing = self.find_by_id_inner(&conn, id, true)?;
            // Operate on the canonical record if the caller handed us an
            // aliased identifier.
            let resolved_id = existing.as_ref().map_or(id, |file| file.file_id());

            if let Some(ref existing) = existing {
                if existing.path == new_path {
                    if existing.was_deleted {
                        self.restore_inner(&conn, existing, modified, user_id)?;
                    }
                    return Ok(existing.file_id());
                }
            }

            if let Some(target) = self.find_by_path_inner(&conn, new_path, true)? {
                if target.was_deleted {
                    debug!(
                        "Path '{}' was soft-deleted under {}, retiring it for {}",
                        new_path,
                        format_tuid(target.file_id()),
                        format_tuid(resolved_id)
                    );
                    self.write_record_inner(
                        &conn,
                        &existing,
                        resolved_id,
                        new_path,
                        modified,
                        user_id,
                    )?;
                    self.retarget_aliases_inner(&conn, target.file_id(), resolved_id)?;
                    self.obliterate_inner(&conn, &target, modified, user_id)?;
                    return Ok(resolved_id);
                }

                debug!(
                    "Path '{}' is live under {}, aliasing {} to it",
                    new_path,
                    format_tuid(target.file_id()),
                    format_tuid(resolved_id)
                );
                self.register_alias_inner(&conn, resolved_id, target.file_id())?;
                if let Some(ref existing) = existing {
                    self.mark_deleted_record_inner(&conn, existing, modified, user_id)?;
                }
                return Ok(target.file_id());
            }

            self.write_record_inner(&conn, &existing, resolved_id, new_path, modified, user_id)?;
            Ok(resolved_id)
        })?)
    }

    /// Clones a live record under a fresh identity, e.g. when a whole
    /// branch of the asset tree is copied. The new record starts its own
    /// history with a `Branch` entry carrying the source path.
    pub fn branch(
        &self,
        source_id: Tuid,
        new_id: Tuid,
        new_path: &str,
        modified: NaiveDateTime,
        user_id: u32,
    ) -> Result<Tuid> {
        let conn = self.store.conn()?;

        Ok(conn.transaction::<_, ResolverError, _>(|| {
            let source = self
                .find_by_id_inner(&conn, source_id, false)?
                .ok_or(ResolverError::NotFound)?;

            if let Some(existing) = self.find_by_id_inner(&conn, new_id, true)? {
                return Err(ResolverError::DuplicateEntry {
                    existing_id: existing.file_id(),
                    path: new_path.to_string(),
                });
            }
            if let Some(existing) = self.find_by_path_inner(&conn, new_path, true)? {
                return Err(ResolverError::DuplicateEntry {
                    existing_id: existing.file_id(),
                    path: new_path.to_string(),
                });
            }

            diesel::insert_into(files::table)
                .values(managed_file::InsertFull {
                    id: new_id as i64,
                    path: new_path,
                    created: &modified,
                    modified: &modified,
                    user_id: user_id as i32,
                    was_deleted: false,
                })
                .execute(&*conn)?;
            self.append_history_inner(
                &conn,
                new_id,
                PatchOperation::Branch,
                modified,
                user_id,
                Some(&source.path),
            )?;

            Ok(new_id)
        })?)
    }

    /// Soft-deletes the record; a no-op if it is absent or already deleted.
    pub fn mark_deleted(&self, id: Tuid, user_id: u32) -> Result<()> {
        let conn = self.store.conn()?;

        Ok(conn.transaction::<_, ResolverError, _>(|| {
            if let Some(file) = self.find_by_id_inner(&conn, id, false)? {
                self.mark_deleted_record_inner(&conn, &file, now(), user_id)?;
            }
            Ok(())
        })?)
    }

    /// Clears the soft-delete flag; a no-op if the record is absent or live.
    pub fn restore(&self, id: Tuid, user_id: u32) -> Result<()> {
        let conn = self.store.conn()?;

        Ok(conn.transaction::<_, ResolverError, _>(|| {
            if let Some(file) = self.find_by_id_inner(&conn, id, true)? {
                if file.was_deleted {
                    self.restore_inner(&conn, &file, now(), user_id)?;
                }
            }
            Ok(())
        })?)
    }

    pub fn contains(&self, id: Tuid, include_deleted: bool) -> Result<bool> {
        let conn = self.store.conn()?;
        Ok(self.find_by_id_inner(&conn, id, include_deleted)?.is_some())
    }

    /// The full mutation history of the identifier, ordered by time.
    pub fn history(&self, id: Tuid) -> Result<Vec<FileHistory>> {
        let conn = self.store.conn()?;

        Ok(histories::table
            .filter(histories::file_id.eq(id as i64))
            .order((histories::modified.asc(), histories::id.asc()))
            .load(&*conn)?)
    }

    /// All live records, for full re-index passes.
    pub fn all_files(&self) -> Result<Vec<ManagedFile>> {
        let conn = self.store.conn()?;

        Ok(files::table
            .filter(files::was_deleted.eq(false))
            .order(files::path.asc())
            .load(&*conn)?)
    }

    ///////////////////////////////////
    // User dimension
    ///////////////////////////////////

    /// Resolves a username to its id, creating the row on first use.
    pub fn user_id(&self, username: &str) -> Result<u32> {
        let conn = self.store.conn()?;

        Ok(conn.transaction::<_, ResolverError, _>(|| {
            let existing: Option<User> = users::table
                .filter(users::username.eq(username))
                .first(&*conn)
                .optional()?;
            if let Some(user) = existing {
                return Ok(user.id as u32);
            }

            diesel::insert_into(users::table)
                .values(user::InsertName { username })
                .execute(&*conn)?;
            let user: User = users::table
                .filter(users::username.eq(username))
                .first(&*conn)?;

            Ok(user.id as u32)
        })?)
    }

    pub fn username(&self, user_id: u32) -> Result<Option<String>> {
        let conn = self.store.conn()?;

        let user: Option<User> = users::table.find(user_id as i32).first(&*conn).optional()?;
        Ok(user.map(|user| user.username))
    }

    ///////////////////////////////////
    // Replay ledger for the external change-event log
    ///////////////////////////////////

    /// Remembers that the event with the given id has been applied.
    /// Recording the same event twice is harmless.
    pub fn record_handled(&self, event_id: Tuid, username: &str) -> Result<()> {
        let conn = self.store.conn()?;

        diesel::replace_into(handled_events::table)
            .values(handled_event::InsertFull {
                id: event_id as i64,
                created: &now(),
                username,
            })
            .execute(&*conn)?;

        Ok(())
    }

    pub fn was_handled(&self, event_id: Tuid) -> Result<bool> {
        let conn = self.store.conn()?;

        let found: Option<HandledEvent> = handled_events::table
            .find(event_id as i64)
            .first(&*conn)
            .optional()?;
        Ok(found.is_some())
    }

    pub fn handled_events(&self) -> Result<BTreeSet<Tuid>> {
        let conn = self.store.conn()?;

        let ids: Vec<i64> = handled_events::table
            .select(handled_events::id)
            .load(&*conn)?;
        Ok(ids.into_iter().map(|id| id as Tuid).collect())
    }

    /// Resets the ledger once the upstream event log has been rotated.
    pub fn clear_handled(&self) -> Result<()> {
        let conn = self.store.conn()?;
        diesel::delete(handled_events::table).execute(&*conn)?;

        Ok(())
    }

    ///////////////////////////////////
    // 'private' helpers start here
    ///////////////////////////////////

    fn select_by_id_inner(
        &self,
        conn: &SqliteConnection,
        id: Tuid,
        include_deleted: bool,
    ) -> Result<Option<ManagedFile>> {
        let mut query = files::table.into_boxed().filter(files::id.eq(id as i64));
        if !include_deleted {
            query = query.filter(files::was_deleted.eq(false));
        }

        Ok(query.first(conn).optional()?)
    }

    fn find_by_id_inner(
        &self,
        conn: &SqliteConnection,
        id: Tuid,
        include_deleted: bool,
    ) -> Result<Option<ManagedFile>> {
        if let Some(file) = self.select_by_id_inner(conn, id, include_deleted)? {
            return Ok(Some(file));
        }

        // Never more than one hop, the lookup table is kept flat.
        let lookup: Option<FileIdLookup> = file_id_lookups::table
            .find(id as i64)
            .first(conn)
            .optional()?;
        match lookup {
            Some(lookup) => {
                self.select_by_id_inner(conn, lookup.existing_file_id as Tuid, include_deleted)
            }
            None => Ok(None),
        }
    }

    fn find_by_path_inner(
        &self,
        conn: &SqliteConnection,
        path: &str,
        include_deleted: bool,
    ) -> Result<Option<ManagedFile>> {
        let mut query = files::table.into_boxed().filter(files::path.eq(path));
        if !include_deleted {
            query = query.filter(files::was_deleted.eq(false));
        }

        Ok(query.first(conn).optional()?)
    }

    /// Points `duplicate_id` at `canonical_id` and rewrites any aliases that
    /// previously resolved to `duplicate_id`, keeping every chain one hop.
    fn register_alias_inner(
        &self,
        conn: &SqliteConnection,
        duplicate_id: Tuid,
        canonical_id: Tuid,
    ) -> Result<()> {
        diesel::replace_into(file_id_lookups::table)
            .values(file_id_lookup::InsertFull {
                duplicate_file_id: duplicate_id as i64,
                existing_file_id: canonical_id as i64,
            })
            .execute(conn)?;
        self.retarget_aliases_inner(conn, duplicate_id, canonical_id)?;

        Ok(())
    }

    fn retarget_aliases_inner(
        &self,
        conn: &SqliteConnection,
        old_canonical: Tuid,
        new_canonical: Tuid,
    ) -> Result<()> {
        diesel::update(
            file_id_lookups::table
                .filter(file_id_lookups::existing_file_id.eq(old_canonical as i64)),
        )
        .set(file_id_lookups::existing_file_id.eq(new_canonical as i64))
        .execute(conn)?;

        Ok(())
    }

    /// Re-points an existing record at a new path, or creates the record if
    /// the identifier is fresh. Appends the matching history entry.
    fn write_record_inner(
        &self,
        conn: &SqliteConnection,
        existing: &Option<ManagedFile>,
        id: Tuid,
        new_path: &str,
        modified: NaiveDateTime,
        user_id: u32,
    ) -> Result<()> {
        match existing {
            Some(existing) => {
                diesel::update(files::table.filter(files::id.eq(existing.id)))
                    .set((
                        files::path.eq(new_path),
                        files::modified.eq(modified),
                        files::user_id.eq(user_id as i32),
                        files::was_deleted.eq(false),
                    ))
                    .execute(conn)?;
                self.append_history_inner(
                    conn,
                    id,
                    PatchOperation::Update,
                    modified,
                    user_id,
                    Some(&existing.path),
                )?;
            }
            None => {
                diesel::insert_into(files::table)
                    .values(managed_file::InsertFull {
                        id: id as i64,
                        path: new_path,
                        created: &modified,
                        modified: &modified,
                        user_id: user_id as i32,
                        was_deleted: false,
                    })
                    .execute(conn)?;
                self.append_history_inner(
                    conn,
                    id,
                    PatchOperation::Insert,
                    modified,
                    user_id,
                    None,
                )?;
            }
        }

        Ok(())
    }

    fn mark_deleted_record_inner(
        &self,
        conn: &SqliteConnection,
        file: &ManagedFile,
        modified: NaiveDateTime,
        user_id: u32,
    ) -> Result<()> {
        diesel::update(files::table.filter(files::id.eq(file.id)))
            .set((
                files::was_deleted.eq(true),
                files::user_id.eq(user_id as i32),
            ))
            .execute(conn)?;
        self.append_history_inner(
            conn,
            file.file_id(),
            PatchOperation::Delete,
            modified,
            user_id,
            None,
        )?;

        Ok(())
    }

    fn restore_inner(
        &self,
        conn: &SqliteConnection,
        file: &ManagedFile,
        modified: NaiveDateTime,
        user_id: u32,
    ) -> Result<()> {
        diesel::update(files::table.filter(files::id.eq(file.id)))
            .set((
                files::was_deleted.eq(false),
                files::user_id.eq(user_id as i32),
            ))
            .execute(conn)?;
        self.append_history_inner(
            conn,
            file.file_id(),
            PatchOperation::Restore,
            modified,
            user_id,
            None,
        )?;

        Ok(())
    }

    /// Hard-deletes a record whose path has been taken over. The history
    /// keeps the full story, so the row itself can go.
    fn obliterate_inner(
        &self,
        conn: &SqliteConnection,
        file: &ManagedFile,
        modified: NaiveDateTime,
        user_id: u32,
    ) -> Result<()> {
        diesel::delete(files::table.filter(files::id.eq(file.id))).execute(conn)?;
        self.append_history_inner(
            conn,
            file.file_id(),
            PatchOperation::Obliterate,
            modified,
            user_id,
            Some(&file.path),
        )?;

        Ok(())
    }

    fn append_history_inner(
        &self,
        conn: &SqliteConnection,
        id: Tuid,
        operation: PatchOperation,
        modified: NaiveDateTime,
        user_id: u32,
        data: Option<&str>,
    ) -> Result<()> {
        diesel::insert_into(histories::table)
            .values(file_history::InsertFull {
                file_id: id as i64,
                operation,
                modified: &modified,
                user_id: user_id as i32,
                data,
            })
            .execute(conn)?;

        Ok(())
    }
}

fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}
