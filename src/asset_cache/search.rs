use diesel::query_builder::{AstPass, Query, QueryFragment, QueryId};
use diesel::result::QueryResult;
use diesel::sql_types::{BigInt, Text};
use diesel::sqlite::{Sqlite, SqliteConnection};
use diesel::RunQueryDsl;

use std::collections::{BTreeMap, BTreeSet};

/// The searchable columns of the asset cache. Registered once per cache
/// instance; queries reference columns by id or by one of their aliases.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum CacheColumnId {
    FileId,
    Name,
    Path,
    FileType,
    EngineType,
    RcsUser,
    // Backed by edge tables instead of a column on the row, see the
    // correlated subqueries in ColumnQuery::walk_ast.
    Level,
    Shader,
}

/// Metadata describing one searchable column: where it lives, which names
/// users may call it, how to join its backing table against `assets` and
/// how to enumerate its distinct values for UI pickers.
pub struct CacheColumn {
    name: &'static str,
    table: &'static str,
    column: &'static str,
    aliases: BTreeSet<String>,
    join: Option<String>,
    populate_sql: Option<&'static str>,
    use_in_generic_search: bool,
}

impl CacheColumn {
    pub fn new(name: &'static str, table: &'static str, column: &'static str, aliases: &str) -> Self {
        Self {
            name,
            table,
            column,
            aliases: aliases.split(',').map(|alias| alias.to_string()).collect(),
            join: None,
            populate_sql: None,
            use_in_generic_search: true,
        }
    }

    pub fn set_join(&mut self, primary_key: &str, foreign_table: &str, foreign_key: &str) {
        self.join = Some(format!(
            " LEFT JOIN {table} ON {table}.{primary} = {foreign_table}.{foreign}",
            table = self.table,
            primary = primary_key,
            foreign_table = foreign_table,
            foreign = foreign_key
        ));
    }

    pub fn set_populate_sql(&mut self, sql: &'static str) {
        self.populate_sql = Some(sql);
    }

    pub fn use_in_generic_search(&mut self, use_in_generic_search: bool) {
        self.use_in_generic_search = use_in_generic_search;
    }

    pub fn join_clause(&self) -> Option<&str> {
        self.join.as_ref().map(|join| join.as_str())
    }

    pub fn populate_sql(&self) -> Option<&'static str> {
        self.populate_sql
    }

    fn qualified(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

pub type CacheColumns = BTreeMap<CacheColumnId, CacheColumn>;

/// Finds the column a user-facing name or alias refers to.
pub fn find_column(columns: &CacheColumns, name: &str) -> Option<CacheColumnId> {
    let lower = name.to_lowercase();
    columns
        .iter()
        .find(|(_, column)| column.name == lower || column.aliases.contains(&lower))
        .map(|(id, _)| *id)
}

/// Normalizes a user phrase into a LIKE pattern: runs of `*` become `%`,
/// underscores are escaped (they would otherwise match any character) and
/// the whole phrase is wrapped for substring matching.
pub fn clean_phrase_for_like(phrase: &str, wrap: bool) -> String {
    let wrapped = if wrap {
        format!("*{}*", phrase)
    } else {
        phrase.to_string()
    };

    let mut result = String::with_capacity(wrapped.len() + 2);
    let mut in_wildcard_run = false;
    for character in wrapped.chars() {
        match character {
            '*' => {
                if !in_wildcard_run {
                    result.push('%');
                }
                in_wildcard_run = true;
            }
            '_' => {
                result.push_str("@_");
                in_wildcard_run = false;
            }
            other => {
                result.push(other);
                in_wildcard_run = false;
            }
        }
    }

    result
}

pub const DEFAULT_BINARY_OPERATOR: &str = "LIKE";

/// Free-text phrase matched against every column that participates in
/// generic search, OR-combined.
pub struct PhraseQuery {
    pattern: String,
    negate: bool,
}

impl PhraseQuery {
    pub fn new(phrase: &str) -> Self {
        Self {
            pattern: clean_phrase_for_like(phrase, true),
            negate: false,
        }
    }

    pub fn negate(mut self) -> Self {
        self.negate = true;
        self
    }
}

/// Phrase scoped to one named column. `level` and `shader` are special:
/// the relationship lives in an edge table, so they expand to correlated
/// subqueries over `levels_x_entities`/`entities_x_shaders`.
pub struct ColumnQuery {
    column: CacheColumnId,
    pattern: String,
    operator: String,
    negate: bool,
}

impl ColumnQuery {
    pub fn like(column: CacheColumnId, phrase: &str) -> Self {
        Self {
            column,
            pattern: clean_phrase_for_like(phrase, true),
            operator: DEFAULT_BINARY_OPERATOR.to_string(),
            negate: false,
        }
    }

    /// Exact comparison with a custom binary operator (`=`, `<`, ...).
    pub fn compare(column: CacheColumnId, operator: &str, value: &str) -> Self {
        Self {
            column,
            pattern: value.to_string(),
            operator: operator.to_string(),
            negate: false,
        }
    }

    pub fn negate(mut self) -> Self {
        self.negate = true;
        self
    }
}

/// Phrase scoped to one attribute id, matched against the attribute value.
pub struct AttributeQuery {
    attribute_id: i64,
    pattern: String,
    negate: bool,
}

impl AttributeQuery {
    pub fn new(attribute_id: i64, phrase: &str) -> Self {
        Self {
            attribute_id,
            pattern: clean_phrase_for_like(phrase, true),
            negate: false,
        }
    }

    pub fn negate(mut self) -> Self {
        self.negate = true;
        self
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum QueryOperator {
    And,
    Or,
}

impl QueryOperator {
    fn sql(&self) -> &'static str {
        match self {
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }
}

pub enum QueryExpression {
    Phrase(PhraseQuery),
    Column(ColumnQuery),
    Attribute(AttributeQuery),
    Group(CacheQuery),
}

/// An ordered list of child expressions combined with one shared binary
/// operator. The whole group can be negated.
pub struct CacheQuery {
    operator: QueryOperator,
    negate: bool,
    expressions: Vec<QueryExpression>,
}

impl CacheQuery {
    pub fn new(operator: QueryOperator) -> Self {
        Self {
            operator,
            negate: false,
            expressions: Vec::new(),
        }
    }

    pub fn negate(mut self) -> Self {
        self.negate = true;
        self
    }

    pub fn add(mut self, expression: QueryExpression) -> Self {
        self.expressions.push(expression);
        self
    }

    pub fn add_phrase(self, phrase: PhraseQuery) -> Self {
        self.add(QueryExpression::Phrase(phrase))
    }

    pub fn add_column(self, column: ColumnQuery) -> Self {
        self.add(QueryExpression::Column(column))
    }

    pub fn add_attribute(self, attribute: AttributeQuery) -> Self {
        self.add(QueryExpression::Attribute(attribute))
    }

    pub fn add_group(self, group: CacheQuery) -> Self {
        self.add(QueryExpression::Group(group))
    }

    /// An empty tree produces no statement at all, search is a no-op.
    pub fn is_empty(&self) -> bool {
        self.expressions.iter().all(|expression| match expression {
            QueryExpression::Group(group) => group.is_empty(),
            _ => false,
        })
    }

    /// The set of columns this tree touches, deciding which joins the final
    /// statement actually needs.
    fn collect_columns(&self, columns: &CacheColumns, touched: &mut BTreeSet<CacheColumnId>) {
        for expression in &self.expressions {
            match expression {
                QueryExpression::Phrase(_) => {
                    for (id, column) in columns.iter() {
                        if column.use_in_generic_search {
                            touched.insert(*id);
                        }
                    }
                }
                QueryExpression::Column(column_query) => {
                    touched.insert(column_query.column);
                }
                QueryExpression::Attribute(_) => (),
                QueryExpression::Group(group) => group.collect_columns(columns, touched),
            }
        }
    }

    fn walk(&self, columns: &CacheColumns, mut out: AstPass<Sqlite>) -> QueryResult<()> {
        if self.negate {
            out.push_sql("NOT ");
        }
        out.push_sql("( ");

        let mut first = true;
        for expression in &self.expressions {
            match expression {
                QueryExpression::Group(group) if group.is_empty() => continue,
                _ => (),
            }
            if !first {
                out.push_sql(self.operator.sql());
            }
            first = false;

            match expression {
                QueryExpression::Phrase(phrase) => phrase.walk(columns, out.reborrow())?,
                QueryExpression::Column(column) => column.walk(columns, out.reborrow())?,
                QueryExpression::Attribute(attribute) => attribute.walk(out.reborrow())?,
                QueryExpression::Group(group) => group.walk(columns, out.reborrow())?,
            }
        }

        out.push_sql(" )");
        Ok(())
    }
}

impl PhraseQuery {
    fn walk(&self, columns: &CacheColumns, mut out: AstPass<Sqlite>) -> QueryResult<()> {
        if self.negate {
            out.push_sql("NOT ");
        }
        out.push_sql("( ");

        let mut first = true;
        for (_, column) in columns.iter() {
            if !column.use_in_generic_search {
                continue;
            }
            if !first {
                out.push_sql(" OR ");
            }
            first = false;

            out.push_sql(&column.qualified());
            out.push_sql(" LIKE ");
            out.push_bind_param::<Text, _>(&self.pattern)?;
            out.push_sql(" ESCAPE '@'");
        }

        out.push_sql(" )");
        Ok(())
    }
}

impl ColumnQuery {
    fn walk(&self, columns: &CacheColumns, mut out: AstPass<Sqlite>) -> QueryResult<()> {
        if self.negate {
            out.push_sql("NOT ");
        }

        match self.column {
            CacheColumnId::Level => {
                // "entities placed in a level whose name matches"
                out.push_sql(
                    "assets.id IN ( SELECT levels_x_entities.entity_id \
                     FROM levels_x_entities \
                     JOIN assets AS level_assets \
                     ON level_assets.id = levels_x_entities.level_id \
                     WHERE level_assets.name LIKE ",
                );
                out.push_bind_param::<Text, _>(&self.pattern)?;
                out.push_sql(" ESCAPE '@' )");
            }
            CacheColumnId::Shader => {
                // "entities using a shader whose name matches"
                out.push_sql(
                    "assets.id IN ( SELECT entities_x_shaders.entity_id \
                     FROM entities_x_shaders \
                     JOIN assets AS shader_assets \
                     ON shader_assets.id = entities_x_shaders.shader_id \
                     WHERE shader_assets.name LIKE ",
                );
                out.push_bind_param::<Text, _>(&self.pattern)?;
                out.push_sql(" ESCAPE '@' )");
            }
            _ => {
                let column = match columns.get(&self.column) {
                    Some(column) => column,
                    None => unreachable!("column registry misses a registered column id"),
                };

                out.push_sql("( ");
                out.push_sql(&column.qualified());
                out.push_sql(" ");
                out.push_sql(&self.operator);
                out.push_sql(" ");
                out.push_bind_param::<Text, _>(&self.pattern)?;
                if self.operator == DEFAULT_BINARY_OPERATOR {
                    out.push_sql(" ESCAPE '@'");
                }
                out.push_sql(" )");
            }
        }

        Ok(())
    }
}

impl AttributeQuery {
    fn walk(&self, mut out: AstPass<Sqlite>) -> QueryResult<()> {
        if self.negate {
            out.push_sql("NOT ");
        }

        out.push_sql(
            "assets.id IN ( SELECT asset_x_attributes.asset_id \
             FROM asset_x_attributes \
             WHERE asset_x_attributes.attribute_id = ",
        );
        out.push_bind_param::<BigInt, _>(&self.attribute_id)?;
        out.push_sql(" AND asset_x_attributes.value LIKE ");
        out.push_bind_param::<Text, _>(&self.pattern)?;
        out.push_sql(" ESCAPE '@' )");

        Ok(())
    }
}

/// The synthesized search statement:
/// `SELECT assets.file_id FROM assets [JOIN ...] WHERE <expression tree>`.
/// Only joins for columns the tree actually touches are emitted.
pub struct SearchStatement<'a> {
    pub columns: &'a CacheColumns,
    pub query: &'a CacheQuery,
}

impl<'a> QueryFragment<Sqlite> for SearchStatement<'a> {
    fn walk_ast(&self, mut out: AstPass<Sqlite>) -> QueryResult<()> {
        out.push_sql("SELECT assets.file_id FROM assets");

        let mut touched = BTreeSet::new();
        self.query.collect_columns(self.columns, &mut touched);
        for id in touched {
            if let Some(column) = self.columns.get(&id) {
                if let Some(join) = column.join_clause() {
                    out.push_sql(join);
                }
            }
        }

        out.push_sql(" WHERE ");
        self.query.walk(self.columns, out.reborrow())
    }
}

impl<'a> Query for SearchStatement<'a> {
    type SqlType = BigInt;
}

impl<'a> QueryId for SearchStatement<'a> {
    type QueryId = ();
    const HAS_STATIC_QUERY_ID: bool = false;
}

impl<'a> RunQueryDsl<SqliteConnection> for SearchStatement<'a> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_wildcards_and_underscores() {
        assert_eq!(clean_phrase_for_like("foo", true), "%foo%");
        assert_eq!(clean_phrase_for_like("foo***bar", false), "foo%bar");
        assert_eq!(clean_phrase_for_like("a_b", false), "a@_b");
        assert_eq!(clean_phrase_for_like("*_*", true), "%@_%");
    }

    #[test]
    fn empty_trees_are_detected() {
        let empty = CacheQuery::new(QueryOperator::And);
        assert!(empty.is_empty());

        let nested_empty =
            CacheQuery::new(QueryOperator::Or).add_group(CacheQuery::new(QueryOperator::And));
        assert!(nested_empty.is_empty());

        let non_empty = CacheQuery::new(QueryOperator::And).add_phrase(PhraseQuery::new("rock"));
        assert!(!non_empty.is_empty());
    }
}
