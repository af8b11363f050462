mod asset_file;
pub use self::asset_file::{dependencies_of_kind, AssetFile, AssetFileMap, AssetKind};
mod change_detection;
pub use self::change_detection::{fs_to_date_time, ChangeOracle};
mod entity;
pub use self::entity::*;
mod errors;
pub use self::errors::{CacheDBError, Result};
pub mod search;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Text};
use diesel::sqlite::SqliteConnection;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use self::search::{CacheColumn, CacheColumnId, CacheColumns, CacheQuery, SearchStatement};
use rcs::RevisionControl;
use resolver::ManagedFile;
use store::schema::{
    asset_usages, asset_x_attributes, assets, attributes, engine_types, entities_x_shaders,
    file_types, levels_x_entities, rcs_users,
};
use store::Store;
use tuid::{format_tuid, Tuid, NULL_TUID};
use virtual_fs::FS;

/// The asset dependency cache.
///
/// Persists one row per tracked asset plus the edge tables between them, so
/// builds and searches never have to re-scan the asset tree. Dependency
/// edges reference the local rowid (not the stable identifier), which is
/// why every insert persists an asset's dependencies before the asset's
/// own edges.
pub struct CacheDB<F: FS> {
    store: Arc<Store>,
    columns: CacheColumns,
    oracle: ChangeOracle<F>,
}

enum EdgeTable {
    Usage,
    EntityShader,
    LevelEntity,
}

impl<F: FS> CacheDB<F> {
    pub fn new(store: Arc<Store>, fs: F, rcs: Arc<dyn RevisionControl>) -> Self {
        let mut columns = CacheColumns::new();

        columns.insert(
            CacheColumnId::FileId,
            CacheColumn::new(
                "file_id",
                "assets",
                "file_id",
                "file_id,fileid,asset_id,assetid,tuid,id",
            ),
        );

        let mut name = CacheColumn::new("name", "assets", "name", "name");
        name.use_in_generic_search(false);
        columns.insert(CacheColumnId::Name, name);

        columns.insert(
            CacheColumnId::Path,
            CacheColumn::new("path", "assets", "path", "path,file"),
        );

        let mut file_type = CacheColumn::new("file_type", "file_types", "name", "file_type,type");
        file_type.set_join("id", "assets", "file_type_id");
        file_type.set_populate_sql("SELECT id, name FROM file_types");
        columns.insert(CacheColumnId::FileType, file_type);

        let mut engine_type =
            CacheColumn::new("engine_type", "engine_types", "name", "engine_type,engine,eng");
        engine_type.set_join("id", "assets", "engine_type_id");
        engine_type.set_populate_sql("SELECT id, name FROM engine_types");
        columns.insert(CacheColumnId::EngineType, engine_type);

        let mut rcs_user = CacheColumn::new("rcs_user", "rcs_users", "username", "rcs_user,user,usr");
        rcs_user.set_join("id", "assets", "rcs_user_id");
        rcs_user.set_populate_sql("SELECT id, username AS name FROM rcs_users");
        columns.insert(CacheColumnId::RcsUser, rcs_user);

        // Backed by edge tables, expanded to subqueries by the builder.
        let mut level = CacheColumn::new("level", "assets", "name", "level");
        level.use_in_generic_search(false);
        columns.insert(CacheColumnId::Level, level);

        let mut shader = CacheColumn::new("shader", "assets", "name", "shader");
        shader.use_in_generic_search(false);
        columns.insert(CacheColumnId::Shader, shader);

        Self {
            store,
            columns,
            oracle: ChangeOracle::new(fs, rcs),
        }
    }

    pub fn columns(&self) -> &CacheColumns {
        &self.columns
    }

    /// Whether the file's on-disk/revision-control state is newer than the
    /// cached asset record (see `ChangeOracle`).
    pub fn has_changed(&self, file: &ManagedFile) -> Result<bool> {
        let conn = self.store.conn()?;
        self.oracle
            .has_changed_inner(&conn, file.file_id(), &file.path)
    }

    /// Brings the asset record, its attributes and all of its edges up to
    /// date. `files` is the caller-resolved arena of every asset taking
    /// part in this pass; `visited` spans the whole pass so shared
    /// dependencies are only re-indexed once.
    ///
    /// Dependencies are persisted first: a changed dependency is fully
    /// re-indexed, an unchanged one merely gets its row id refreshed. Only
    /// then is the asset itself upserted and its edge sets replaced
    /// wholesale (plus the kind-specific edge table for entities/levels).
    pub fn insert_asset(
        &self,
        id: Tuid,
        files: &mut AssetFileMap,
        visited: &mut BTreeSet<Tuid>,
        cancel: &AtomicBool,
    ) -> Result<()> {
        let conn = self.store.conn()?;
        self.insert_asset_inner(&conn, id, files, visited, cancel)
    }

    /// Removes the asset row, its attribute rows and every edge in all
    /// three edge tables that mentions it on either side.
    pub fn delete_asset(&self, id: Tuid) -> Result<()> {
        let conn = self.store.conn()?;
        self.delete_asset_inner(&conn, id)
    }

    /// The asset's local rowid, if it has been inserted at least once.
    pub fn asset_row_id(&self, id: Tuid) -> Result<Option<i64>> {
        let conn = self.store.conn()?;
        self.asset_row_id_inner(&conn, id)
    }

    pub fn asset_path(&self, id: Tuid) -> Result<Option<String>> {
        let conn = self.store.conn()?;

        Ok(assets::table
            .filter(assets::file_id.eq(id as i64))
            .select(assets::path)
            .first(&*conn)
            .optional()?)
    }

    /// Loads one asset record with its dimension names and attributes
    /// resolved. The dependency id set is left empty, traversals fill it.
    pub fn select_asset(&self, id: Tuid) -> Result<Option<AssetFile>> {
        let conn = self.store.conn()?;
        self.select_asset_inner(&conn, id)
    }

    /// The identifiers reachable from `id` over the usage edges, including
    /// `id` itself. `reverse` walks "what needs X" instead of "what does X
    /// need"; `max_depth == 0` means unbounded. Cycles terminate through
    /// the result set doubling as the visited set.
    pub fn dependencies_of(
        &self,
        id: Tuid,
        reverse: bool,
        max_depth: u32,
        cancel: &AtomicBool,
    ) -> Result<BTreeSet<Tuid>> {
        let conn = self.store.conn()?;

        let mut dependencies = BTreeSet::new();
        self.dependencies_of_inner(&conn, id, &mut dependencies, reverse, max_depth, 0, cancel)?;
        Ok(dependencies)
    }

    /// Like `dependencies_of`, but returns the full records with each
    /// node's direct dependency ids filled in.
    pub fn dependency_graph(
        &self,
        id: Tuid,
        reverse: bool,
        max_depth: u32,
        cancel: &AtomicBool,
    ) -> Result<BTreeMap<Tuid, AssetFile>> {
        let conn = self.store.conn()?;

        let mut graph = BTreeMap::new();
        let mut visited = BTreeSet::new();
        self.dependency_graph_inner(
            &conn,
            id,
            &mut graph,
            &mut visited,
            reverse,
            max_depth,
            0,
            cancel,
        )?;
        Ok(graph)
    }

    /// Runs a composed search query, returning the matching identifiers.
    /// An empty expression tree matches nothing.
    pub fn search(&self, query: &CacheQuery, cancel: &AtomicBool) -> Result<BTreeSet<Tuid>> {
        if query.is_empty() {
            return Ok(BTreeSet::new());
        }
        check_cancel(cancel)?;

        let conn = self.store.conn()?;
        let statement = SearchStatement {
            columns: &self.columns,
            query,
        };
        let ids: Vec<i64> = statement.load(&*conn)?;

        Ok(ids
            .into_iter()
            .map(|id| id as Tuid)
            .filter(|id| *id != NULL_TUID)
            .collect())
    }

    /// Runs a search and loads the full records for every hit.
    pub fn search_files(&self, query: &CacheQuery, cancel: &AtomicBool) -> Result<Vec<AssetFile>> {
        let ids = self.search(query, cancel)?;
        let conn = self.store.conn()?;

        let mut result = Vec::with_capacity(ids.len());
        for id in ids {
            check_cancel(cancel)?;
            if let Some(file) = self.select_asset_inner(&conn, id)? {
                result.push(file);
            }
        }
        Ok(result)
    }

    /// Enumerates the distinct values of a searchable column (for UI
    /// pickers); only meaningful for columns registered with a populate
    /// statement.
    pub fn populate_column(&self, column: CacheColumnId) -> Result<Vec<(i64, String)>> {
        let populate_sql = self
            .columns
            .get(&column)
            .and_then(|column| column.populate_sql());
        let populate_sql = match populate_sql {
            Some(sql) => sql,
            None => return Ok(Vec::new()),
        };

        let conn = self.store.conn()?;
        let rows: Vec<IdNameRow> = sql_query(populate_sql).load(&*conn)?;
        Ok(rows.into_iter().map(|row| (row.id, row.name)).collect())
    }

    /// Resolves an attribute name to its id, creating the row on first use.
    pub fn attribute_id(&self, name: &str) -> Result<i64> {
        let conn = self.store.conn()?;
        self.attribute_id_inner(&conn, name)
    }

    /// Finds the id of the first attribute whose name matches the phrase.
    pub fn find_attribute_id(&self, phrase: &str) -> Result<Option<i64>> {
        let conn = self.store.conn()?;

        let pattern = search::clean_phrase_for_like(phrase, true);
        let rows: Vec<IdNameRow> =
            sql_query("SELECT id, name FROM attributes WHERE name LIKE ? ESCAPE '@'")
                .bind::<Text, _>(pattern)
                .load(&*conn)?;
        Ok(rows.first().map(|row| row.id))
    }

    pub fn attributes(&self) -> Result<Vec<(i64, String)>> {
        let conn = self.store.conn()?;

        Ok(attributes::table
            .order(attributes::name.asc())
            .load::<(i64, String)>(&*conn)?)
    }

    ///////////////////////////////////
    // 'private' helpers start here
    ///////////////////////////////////

    fn insert_asset_inner(
        &self,
        conn: &SqliteConnection,
        id: Tuid,
        files: &mut AssetFileMap,
        visited: &mut BTreeSet<Tuid>,
        cancel: &AtomicBool,
    ) -> Result<()> {
        check_cancel(cancel)?;

        let (dependency_ids, kind) = match files.get(&id) {
            Some(file) => (file.dependency_ids.clone(), file.kind()),
            None => return Ok(()),
        };

        // Persist dependencies first, their rows are referenced by the edge
        // tables written below.
        for dependency_id in &dependency_ids {
            check_cancel(cancel)?;

            if *dependency_id == NULL_TUID {
                continue;
            }
            if !visited.insert(*dependency_id) {
                continue;
            }

            let dependency_path = match files.get(dependency_id) {
                Some(dependency) => dependency.path.clone(),
                None => continue,
            };

            if self
                .oracle
                .has_changed_inner(conn, *dependency_id, &dependency_path)?
            {
                self.insert_asset_inner(conn, *dependency_id, files, visited, cancel)?;
            } else {
                // Already up to date in the cache, just pick up its row id.
                let row_id = self.asset_row_id_inner(conn, *dependency_id)?.unwrap_or(0);
                if let Some(dependency) = files.get_mut(dependency_id) {
                    dependency.row_id = row_id;
                }
            }
        }

        check_cancel(cancel)?;

        let row_id = {
            let file = match files.get(&id) {
                Some(file) => file,
                None => return Ok(()),
            };
            self.upsert_asset_row_inner(conn, file)?
        };
        if let Some(file) = files.get_mut(&id) {
            file.row_id = row_id;
        }

        let attributes = files[&id].attributes.clone();
        self.replace_attributes_inner(conn, row_id, &attributes, cancel)?;

        self.replace_edges_inner(
            conn,
            EdgeTable::Usage,
            row_id,
            &dependency_ids,
            files,
            visited,
            cancel,
        )?;

        match kind {
            AssetKind::Entity => {
                let shaders = dependencies_of_kind(files, id, AssetKind::Shader);
                self.replace_edges_inner(
                    conn,
                    EdgeTable::EntityShader,
                    row_id,
                    &shaders,
                    files,
                    visited,
                    cancel,
                )?;
            }
            AssetKind::Level => {
                let entities = dependencies_of_kind(files, id, AssetKind::Entity);
                self.replace_edges_inner(
                    conn,
                    EdgeTable::LevelEntity,
                    row_id,
                    &entities,
                    files,
                    visited,
                    cancel,
                )?;
            }
            _ => (),
        }

        Ok(())
    }

    /// Resolves the dimension ids and upserts the asset row, selecting by
    /// the stable file id. Returns the (possibly fresh) rowid.
    fn upsert_asset_row_inner(&self, conn: &SqliteConnection, file: &AssetFile) -> Result<i64> {
        let file_type_id = self.file_type_id_inner(conn, &file.file_type)?;
        let engine_type_id = self.engine_type_id_inner(conn, &file.engine_type)?;
        let rcs_user_id = self.rcs_user_id_inner(conn, &file.rcs_user)?;
        let last_updated = now();

        match self.asset_row_id_inner(conn, file.id)? {
            Some(row_id) => {
                diesel::update(assets::table.filter(assets::id.eq(row_id)))
                    .set((
                        assets::path.eq(&file.path),
                        assets::name.eq(&file.name),
                        assets::file_type_id.eq(file_type_id),
                        assets::engine_type_id.eq(engine_type_id),
                        assets::rcs_user_id.eq(rcs_user_id),
                        assets::rcs_revision.eq(file.rcs_revision as i64),
                        assets::size.eq(file.size as i64),
                        assets::last_updated.eq(last_updated),
                    ))
                    .execute(conn)?;
                Ok(row_id)
            }
            None => {
                diesel::insert_into(assets::table)
                    .values(asset_row::InsertFull {
                        file_id: file.id as i64,
                        path: &file.path,
                        name: &file.name,
                        file_type_id,
                        engine_type_id,
                        rcs_user_id,
                        rcs_revision: file.rcs_revision as i64,
                        size: file.size as i64,
                        last_updated: &last_updated,
                    })
                    .execute(conn)?;

                match self.asset_row_id_inner(conn, file.id)? {
                    Some(row_id) => Ok(row_id),
                    None => Err(CacheDBError::NotFound),
                }
            }
        }
    }

    /// Replaces the attribute rows of one asset wholesale: every attribute
    /// in the given map is written, every other one deleted.
    fn replace_attributes_inner(
        &self,
        conn: &SqliteConnection,
        row_id: i64,
        attrs: &BTreeMap<String, String>,
        cancel: &AtomicBool,
    ) -> Result<()> {
        let mut valid_ids = Vec::with_capacity(attrs.len());
        for (name, value) in attrs {
            check_cancel(cancel)?;

            let attribute_id = self.attribute_id_inner(conn, name)?;
            diesel::replace_into(asset_x_attributes::table)
                .values((
                    asset_x_attributes::asset_id.eq(row_id),
                    asset_x_attributes::attribute_id.eq(attribute_id),
                    asset_x_attributes::value.eq(value),
                ))
                .execute(conn)?;
            valid_ids.push(attribute_id);
        }

        if valid_ids.is_empty() {
            diesel::delete(
                asset_x_attributes::table.filter(asset_x_attributes::asset_id.eq(row_id)),
            )
            .execute(conn)?;
        } else {
            diesel::delete(
                asset_x_attributes::table
                    .filter(asset_x_attributes::asset_id.eq(row_id))
                    .filter(asset_x_attributes::attribute_id.ne_all(valid_ids)),
            )
            .execute(conn)?;
        }

        Ok(())
    }

    /// Writes one asset's edge set into the given edge table and deletes
    /// every edge not present in the new valid set (last writer wins). A
    /// dependency without a row yet is inserted on the spot.
    fn replace_edges_inner(
        &self,
        conn: &SqliteConnection,
        edge_table: EdgeTable,
        asset_row_id: i64,
        dependency_ids: &BTreeSet<Tuid>,
        files: &mut AssetFileMap,
        visited: &mut BTreeSet<Tuid>,
        cancel: &AtomicBool,
    ) -> Result<()> {
        let mut valid_rows = Vec::with_capacity(dependency_ids.len());

        for dependency_id in dependency_ids {
            check_cancel(cancel)?;

            if *dependency_id == NULL_TUID {
                continue;
            }

            // The caller's asset-graph builder is responsible for resolving
            // every dependency into the arena before indexing starts.
            let mut dependency_row = match files.get(dependency_id) {
                Some(dependency) => dependency.row_id,
                None => panic!(
                    "Dependency {} is missing from the asset arena",
                    format_tuid(*dependency_id)
                ),
            };

            if dependency_row == 0 {
                self.insert_asset_inner(conn, *dependency_id, files, visited, cancel)?;
                dependency_row = files[dependency_id].row_id;
            }

            match edge_table {
                EdgeTable::Usage => {
                    diesel::replace_into(asset_usages::table)
                        .values((
                            asset_usages::asset_id.eq(asset_row_id),
                            asset_usages::dependency_id.eq(dependency_row),
                        ))
                        .execute(conn)?;
                }
                EdgeTable::EntityShader => {
                    diesel::replace_into(entities_x_shaders::table)
                        .values((
                            entities_x_shaders::entity_id.eq(asset_row_id),
                            entities_x_shaders::shader_id.eq(dependency_row),
                        ))
                        .execute(conn)?;
                }
                EdgeTable::LevelEntity => {
                    diesel::replace_into(levels_x_entities::table)
                        .values((
                            levels_x_entities::level_id.eq(asset_row_id),
                            levels_x_entities::entity_id.eq(dependency_row),
                        ))
                        .execute(conn)?;
                }
            }

            valid_rows.push(dependency_row);
        }

        match edge_table {
            EdgeTable::Usage => {
                if valid_rows.is_empty() {
                    diesel::delete(
                        asset_usages::table.filter(asset_usages::asset_id.eq(asset_row_id)),
                    )
                    .execute(conn)?;
                } else {
                    diesel::delete(
                        asset_usages::table
                            .filter(asset_usages::asset_id.eq(asset_row_id))
                            .filter(asset_usages::dependency_id.ne_all(valid_rows)),
                    )
                    .execute(conn)?;
                }
            }
            EdgeTable::EntityShader => {
                if valid_rows.is_empty() {
                    diesel::delete(
                        entities_x_shaders::table
                            .filter(entities_x_shaders::entity_id.eq(asset_row_id)),
                    )
                    .execute(conn)?;
                } else {
                    diesel::delete(
                        entities_x_shaders::table
                            .filter(entities_x_shaders::entity_id.eq(asset_row_id))
                            .filter(entities_x_shaders::shader_id.ne_all(valid_rows)),
                    )
                    .execute(conn)?;
                }
            }
            EdgeTable::LevelEntity => {
                if valid_rows.is_empty() {
                    diesel::delete(
                        levels_x_entities::table
                            .filter(levels_x_entities::level_id.eq(asset_row_id)),
                    )
                    .execute(conn)?;
                } else {
                    diesel::delete(
                        levels_x_entities::table
                            .filter(levels_x_entities::level_id.eq(asset_row_id))
                            .filter(levels_x_entities::entity_id.ne_all(valid_rows)),
                    )
                    .execute(conn)?;
                }
            }
        }

        Ok(())
    }

    fn delete_asset_inner(&self, conn: &SqliteConnection, id: Tuid) -> Result<()> {
        let row_id = match self.asset_row_id_inner(conn, id)? {
            Some(row_id) => row_id,
            None => return Ok(()),
        };

        // Edges and attributes go first, they reference the asset row.
        diesel::delete(
            asset_usages::table.filter(
                asset_usages::asset_id
                    .eq(row_id)
                    .or(asset_usages::dependency_id.eq(row_id)),
            ),
        )
        .execute(conn)?;
        diesel::delete(
            entities_x_shaders::table.filter(
                entities_x_shaders::entity_id
                    .eq(row_id)
                    .or(entities_x_shaders::shader_id.eq(row_id)),
            ),
        )
        .execute(conn)?;
        diesel::delete(
            levels_x_entities::table.filter(
                levels_x_entities::level_id
                    .eq(row_id)
                    .or(levels_x_entities::entity_id.eq(row_id)),
            ),
        )
        .execute(conn)?;
        diesel::delete(asset_x_attributes::table.filter(asset_x_attributes::asset_id.eq(row_id)))
            .execute(conn)?;

        diesel::delete(assets::table.filter(assets::id.eq(row_id))).execute(conn)?;

        Ok(())
    }

    fn asset_row_id_inner(&self, conn: &SqliteConnection, id: Tuid) -> Result<Option<i64>> {
        Ok(assets::table
            .filter(assets::file_id.eq(id as i64))
            .select(assets::id)
            .first(conn)
            .optional()?)
    }

    fn select_asset_inner(&self, conn: &SqliteConnection, id: Tuid) -> Result<Option<AssetFile>> {
        let row: Option<AssetRow> = assets::table
            .filter(assets::file_id.eq(id as i64))
            .first(conn)
            .optional()?;
        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let file_type: Option<String> = file_types::table
            .find(row.file_type_id)
            .select(file_types::name)
            .first(conn)
            .optional()?;
        let engine_type: Option<String> = engine_types::table
            .find(row.engine_type_id)
            .select(engine_types::name)
            .first(conn)
            .optional()?;
        let rcs_user: Option<String> = rcs_users::table
            .find(row.rcs_user_id)
            .select(rcs_users::username)
            .first(conn)
            .optional()?;

        let mut attrs = BTreeMap::new();
        let attribute_rows: Vec<(i64, Option<String>)> = asset_x_attributes::table
            .filter(asset_x_attributes::asset_id.eq(row.id))
            .select((
                asset_x_attributes::attribute_id,
                asset_x_attributes::value,
            ))
            .load(conn)?;
        for (attribute_id, value) in attribute_rows {
            let name: Option<String> = attributes::table
                .find(attribute_id)
                .select(attributes::name)
                .first(conn)
                .optional()?;
            if let Some(name) = name {
                attrs.insert(name, value.unwrap_or_default());
            }
        }

        Ok(Some(AssetFile {
            id: row.asset_id(),
            path: row.path,
            name: row.name,
            file_type: file_type.unwrap_or_default(),
            engine_type: engine_type.unwrap_or_default(),
            size: row.size as u64,
            rcs_user: rcs_user.unwrap_or_default(),
            rcs_revision: row.rcs_revision as u64,
            attributes: attrs,
            dependency_ids: BTreeSet::new(),
            row_id: row.id,
        }))
    }

    fn dependencies_of_inner(
        &self,
        conn: &SqliteConnection,
        id: Tuid,
        dependencies: &mut BTreeSet<Tuid>,
        reverse: bool,
        max_depth: u32,
        current_depth: u32,
        cancel: &AtomicBool,
    ) -> Result<()> {
        // Already expanded (or a cycle): stop, do not treat as an error.
        if !dependencies.insert(id) {
            return Ok(());
        }

        if max_depth != 0 && current_depth >= max_depth {
            return Ok(());
        }
        check_cancel(cancel)?;

        let selected: Vec<i64> = if !reverse {
            let own_rows: Vec<i64> = assets::table
                .filter(assets::file_id.eq(id as i64))
                .select(assets::id)
                .load(conn)?;
            let dependency_rows = asset_usages::table
                .filter(asset_usages::asset_id.eq_any(own_rows))
                .select(asset_usages::dependency_id);
            assets::table
                .filter(assets::id.eq_any(dependency_rows))
                .select(assets::file_id)
                .load(conn)?
        } else {
            let own_rows: Vec<i64> = assets::table
                .filter(assets::file_id.eq(id as i64))
                .select(assets::id)
                .load(conn)?;
            let dependent_rows = asset_usages::table
                .filter(asset_usages::dependency_id.eq_any(own_rows))
                .select(asset_usages::asset_id);
            assets::table
                .filter(assets::id.eq_any(dependent_rows))
                .select(assets::file_id)
                .load(conn)?
        };

        for selected_id in selected {
            check_cancel(cancel)?;
            self.dependencies_of_inner(
                conn,
                selected_id as Tuid,
                dependencies,
                reverse,
                max_depth,
                current_depth + 1,
                cancel,
            )?;
        }

        Ok(())
    }

    fn dependency_graph_inner(
        &self,
        conn: &SqliteConnection,
        id: Tuid,
        graph: &mut BTreeMap<Tuid, AssetFile>,
        visited: &mut BTreeSet<Tuid>,
        reverse: bool,
        max_depth: u32,
        current_depth: u32,
        cancel: &AtomicBool,
    ) -> Result<()> {
        check_cancel(cancel)?;

        // Already expanded (or a cycle): stop.
        if !visited.insert(id) {
            return Ok(());
        }

        let mut file = match self.select_asset_inner(conn, id)? {
            Some(file) => file,
            // Unknown to the cache, e.g. an edge endpoint deleted mid-walk.
            None => return Ok(()),
        };

        let mut direct = BTreeSet::new();
        self.dependencies_of_inner(conn, id, &mut direct, reverse, 1, 0, cancel)?;
        direct.remove(&id);
        file.dependency_ids = direct.clone();
        graph.insert(id, file);

        if max_depth != 0 && current_depth >= max_depth {
            return Ok(());
        }

        for dependency_id in direct {
            check_cancel(cancel)?;
            self.dependency_graph_inner(
                conn,
                dependency_id,
                graph,
                visited,
                reverse,
                max_depth,
                current_depth + 1,
                cancel,
            )?;
        }

        Ok(())
    }

    fn attribute_id_inner(&self, conn: &SqliteConnection, name: &str) -> Result<i64> {
        let existing: Option<i64> = attributes::table
            .filter(attributes::name.eq(name))
            .select(attributes::id)
            .first(conn)
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        diesel::insert_into(attributes::table)
            .values(attributes::name.eq(name))
            .execute(conn)?;
        Ok(attributes::table
            .filter(attributes::name.eq(name))
            .select(attributes::id)
            .first(conn)?)
    }

    fn file_type_id_inner(&self, conn: &SqliteConnection, name: &str) -> Result<i64> {
        let existing: Option<i64> = file_types::table
            .filter(file_types::name.eq(name))
            .select(file_types::id)
            .first(conn)
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        diesel::insert_into(file_types::table)
            .values(file_types::name.eq(name))
            .execute(conn)?;
        Ok(file_types::table
            .filter(file_types::name.eq(name))
            .select(file_types::id)
            .first(conn)?)
    }

    fn engine_type_id_inner(&self, conn: &SqliteConnection, name: &str) -> Result<i64> {
        let existing: Option<i64> = engine_types::table
            .filter(engine_types::name.eq(name))
            .select(engine_types::id)
            .first(conn)
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        diesel::insert_into(engine_types::table)
            .values(engine_types::name.eq(name))
            .execute(conn)?;
        Ok(engine_types::table
            .filter(engine_types::name.eq(name))
            .select(engine_types::id)
            .first(conn)?)
    }

    fn rcs_user_id_inner(&self, conn: &SqliteConnection, name: &str) -> Result<i64> {
        let existing: Option<i64> = rcs_users::table
            .filter(rcs_users::username.eq(name))
            .select(rcs_users::id)
            .first(conn)
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        diesel::insert_into(rcs_users::table)
            .values(rcs_users::username.eq(name))
            .execute(conn)?;
        Ok(rcs_users::table
            .filter(rcs_users::username.eq(name))
            .select(rcs_users::id)
            .first(conn)?)
    }
}

#[derive(QueryableByName)]
struct IdNameRow {
    #[sql_type = "BigInt"]
    id: i64,
    #[sql_type = "Text"]
    name: String,
}

/// Observes the cooperative cancellation flag, letting in-flight recursive
/// calls unwind without completing further writes.
fn check_cancel(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::Relaxed) {
        Err(CacheDBError::Cancelled)
    } else {
        Ok(())
    }
}

fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}
