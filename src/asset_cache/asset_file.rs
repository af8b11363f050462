use std::collections::{BTreeMap, BTreeSet, HashMap};

use tuid::{Tuid, NULL_TUID};

/// The broad kind of an asset, derived from its file type the same way the
/// build pipeline derives it from the path decoration. Entities and levels
/// get specialized edge tables on top of the generic usage edges.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AssetKind {
    Entity,
    Level,
    Shader,
    Generic,
}

impl AssetKind {
    pub fn from_file_type(file_type: &str) -> Self {
        match file_type {
            "entity" => Self::Entity,
            "level" => Self::Level,
            "shader" => Self::Shader,
            _ => Self::Generic,
        }
    }
}

/// One asset during a re-index pass or as loaded back from the cache.
///
/// Assets are kept in a plain map keyed by identifier (see `AssetFileMap`);
/// dependency edges are identifier pairs, so the arena needs no smart
/// pointers and no cycle-aware bookkeeping. `row_id` is the asset's row in
/// the cache, 0 until it has been inserted at least once.
#[derive(Debug, Clone)]
pub struct AssetFile {
    pub id: Tuid,
    pub path: String,
    pub name: String,
    pub file_type: String,
    pub engine_type: String,
    pub size: u64,
    pub rcs_user: String,
    pub rcs_revision: u64,
    pub attributes: BTreeMap<String, String>,
    pub dependency_ids: BTreeSet<Tuid>,
    pub row_id: i64,
}

impl AssetFile {
    pub fn new(id: Tuid, path: &str) -> Self {
        let name = path
            .rsplit('/')
            .next()
            .and_then(|file_name| file_name.split('.').next())
            .unwrap_or("")
            .to_string();
        let file_type = path.rsplit('.').next().unwrap_or("").to_string();

        Self {
            id,
            path: path.to_string(),
            name,
            file_type,
            engine_type: String::new(),
            size: 0,
            rcs_user: String::new(),
            rcs_revision: 0,
            attributes: BTreeMap::new(),
            dependency_ids: BTreeSet::new(),
            row_id: 0,
        }
    }

    pub fn kind(&self) -> AssetKind {
        AssetKind::from_file_type(&self.file_type)
    }
}

/// The caller-maintained arena of all assets taking part in one pass.
pub type AssetFileMap = HashMap<Tuid, AssetFile>;

/// Collects the transitive dependency closure of `id` restricted to assets
/// of the given kind, e.g. every shader an entity pulls in through any
/// number of intermediate assets.
pub fn dependencies_of_kind(files: &AssetFileMap, id: Tuid, kind: AssetKind) -> BTreeSet<Tuid> {
    let mut result = BTreeSet::new();
    let mut visited = BTreeSet::new();
    let mut pending = vec![id];

    while let Some(current) = pending.pop() {
        if !visited.insert(current) {
            continue;
        }

        if let Some(file) = files.get(&current) {
            for dependency_id in &file.dependency_ids {
                if *dependency_id == NULL_TUID {
                    continue;
                }
                if let Some(dependency) = files.get(dependency_id) {
                    if dependency.kind() == kind {
                        result.insert(*dependency_id);
                    }
                }
                pending.push(*dependency_id);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_name_and_kind_from_the_path() {
        let file = AssetFile::new(1, "levels/jungle/boss_arena.level");
        assert_eq!(file.name, "boss_arena");
        assert_eq!(file.file_type, "level");
        assert_eq!(file.kind(), AssetKind::Level);

        assert_eq!(AssetFile::new(2, "art/rock.entity").kind(), AssetKind::Entity);
        assert_eq!(AssetFile::new(3, "fx/water.shader").kind(), AssetKind::Shader);
        assert_eq!(AssetFile::new(4, "fx/water.png").kind(), AssetKind::Generic);
    }

    #[test]
    fn collects_transitive_dependencies_of_one_kind() {
        let mut files = AssetFileMap::new();

        let mut level = AssetFile::new(1, "a.level");
        level.dependency_ids.insert(2);
        let mut entity = AssetFile::new(2, "b.entity");
        entity.dependency_ids.insert(3);
        entity.dependency_ids.insert(4);
        let mut shader = AssetFile::new(3, "c.shader");
        // Cycle back up to the level, the walk must still terminate.
        shader.dependency_ids.insert(1);
        let texture = AssetFile::new(4, "d.png");

        files.insert(1, level);
        files.insert(2, entity);
        files.insert(3, shader);
        files.insert(4, texture);

        let shaders = dependencies_of_kind(&files, 1, AssetKind::Shader);
        assert_eq!(shaders, [3].iter().cloned().collect());

        let entities = dependencies_of_kind(&files, 1, AssetKind::Entity);
        assert_eq!(entities, [2].iter().cloned().collect());
    }
}
