//! Post ↔ category / tag link maintenance
//!
//! A [`RelationDiff`] is the delta between the ids currently linked to a post
//! and the ids the caller wants linked. Applying it touches only the delta:
//! link rows are inserted or deleted and the `post_count` of each affected
//! category or tag moves by exactly one. Every function here runs on a
//! caller-supplied connection so the post repository can compose several of
//! them inside one transaction.

use std::collections::{BTreeSet, HashMap};

use sqlx::{MySqlConnection, MySqlPool, Row, SqliteConnection, SqlitePool};

use super::error::{EntityKind, RepoResult, RepositoryError};
use super::filter::placeholders;
use crate::models::TermRef;

/// A many-to-many relation hanging off `posts`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Categories,
    Tags,
}

impl Relation {
    pub const ALL: [Relation; 2] = [Relation::Categories, Relation::Tags];

    /// Link table joining posts to the related rows
    pub fn link_table(&self) -> &'static str {
        match self {
            Relation::Categories => "post_categories",
            Relation::Tags => "post_tags",
        }
    }

    /// Column in the link table pointing at the related row
    pub fn foreign_key(&self) -> &'static str {
        match self {
            Relation::Categories => "category_id",
            Relation::Tags => "tag_id",
        }
    }

    /// Table holding the related rows and their `post_count`
    pub fn target_table(&self) -> &'static str {
        match self {
            Relation::Categories => "categories",
            Relation::Tags => "tags",
        }
    }

    pub fn entity(&self) -> EntityKind {
        match self {
            Relation::Categories => EntityKind::Category,
            Relation::Tags => EntityKind::Tag,
        }
    }
}

/// Minimal add/remove delta between two id sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationDiff {
    /// Sorted, deduplicated
    pub to_add: Vec<i64>,
    /// Sorted, deduplicated
    pub to_remove: Vec<i64>,
}

impl RelationDiff {
    /// `desired = None` means no change was requested and yields an empty diff;
    /// `Some(&[])` detaches everything.
    pub fn compute(current: &[i64], desired: Option<&[i64]>) -> Self {
        let Some(desired) = desired else {
            return Self::default();
        };
        let current: BTreeSet<i64> = current.iter().copied().collect();
        let desired: BTreeSet<i64> = desired.iter().copied().collect();

        Self {
            to_add: desired.difference(&current).copied().collect(),
            to_remove: current.difference(&desired).copied().collect(),
        }
    }

    /// Everything in `desired` is new
    pub fn attach(desired: &[i64]) -> Self {
        Self::compute(&[], Some(desired))
    }

    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Error for a counter update that matched fewer rows than ids given
///
/// Names the first id absent from `found`. If every id exists the shortfall
/// is not a missing row, so it is reported as an inconsistent result.
fn missing_target_error(
    relation: Relation,
    ids: &[i64],
    found: &BTreeSet<i64>,
    affected: u64,
) -> RepositoryError {
    match ids.iter().find(|id| !found.contains(id)) {
        Some(id) => RepositoryError::not_found(relation.entity(), *id),
        None => RepositoryError::Decode(format!(
            "{} counter update matched {} of {} rows",
            relation.target_table(),
            affected,
            ids.len()
        )),
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

/// Ids currently linked to `post_id`, ascending
pub async fn linked_ids_sqlite(
    conn: &mut SqliteConnection,
    relation: Relation,
    post_id: i64,
) -> RepoResult<Vec<i64>> {
    let sql = format!(
        "SELECT {fk} AS id FROM {link} WHERE post_id = ? ORDER BY {fk}",
        fk = relation.foreign_key(),
        link = relation.link_table(),
    );
    let rows = sqlx::query(&sql).bind(post_id).fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(|row| row.get::<i64, _>("id")).collect())
}

/// Apply `diff` to the links of `post_id` and move the counters with it
///
/// An unknown id aborts with `NotFound`; the caller's transaction is expected
/// to roll back whatever already ran.
pub async fn apply_diff_sqlite(
    conn: &mut SqliteConnection,
    relation: Relation,
    post_id: i64,
    diff: &RelationDiff,
) -> RepoResult<()> {
    if !diff.to_remove.is_empty() {
        let sql = format!(
            "DELETE FROM {} WHERE post_id = ? AND {} IN ({})",
            relation.link_table(),
            relation.foreign_key(),
            placeholders(diff.to_remove.len()),
        );
        let mut query = sqlx::query(&sql).bind(post_id);
        for id in &diff.to_remove {
            query = query.bind(*id);
        }
        query.execute(&mut *conn).await?;
        adjust_counters_sqlite(conn, relation, &diff.to_remove, -1).await?;
    }

    if !diff.to_add.is_empty() {
        adjust_counters_sqlite(conn, relation, &diff.to_add, 1).await?;
        let sql = format!(
            "INSERT INTO {} (post_id, {}) VALUES (?, ?)",
            relation.link_table(),
            relation.foreign_key(),
        );
        for id in &diff.to_add {
            sqlx::query(&sql)
                .bind(post_id)
                .bind(*id)
                .execute(&mut *conn)
                .await?;
        }
    }

    tracing::debug!(
        relation = relation.link_table(),
        post_id,
        added = diff.to_add.len(),
        removed = diff.to_remove.len(),
        "Applied relation diff"
    );
    Ok(())
}

/// Move `post_count` by `delta` on every row in `ids`
///
/// Fails with `NotFound` naming the first missing id when fewer rows matched
/// than ids were given.
pub async fn adjust_counters_sqlite(
    conn: &mut SqliteConnection,
    relation: Relation,
    ids: &[i64],
    delta: i64,
) -> RepoResult<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let sql = format!(
        "UPDATE {} SET post_count = post_count + ? WHERE id IN ({})",
        relation.target_table(),
        placeholders(ids.len()),
    );
    let mut query = sqlx::query(&sql).bind(delta);
    for id in ids {
        query = query.bind(*id);
    }
    let affected = query.execute(&mut *conn).await?.rows_affected();

    if (affected as usize) < ids.len() {
        let found = existing_ids_sqlite(conn, relation, ids).await?;
        return Err(missing_target_error(relation, ids, &found, affected));
    }
    Ok(())
}

async fn existing_ids_sqlite(
    conn: &mut SqliteConnection,
    relation: Relation,
    ids: &[i64],
) -> RepoResult<BTreeSet<i64>> {
    let sql = format!(
        "SELECT id FROM {} WHERE id IN ({})",
        relation.target_table(),
        placeholders(ids.len()),
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(*id);
    }
    Ok(query
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|row| row.get::<i64, _>("id"))
        .collect())
}

/// Linked categories or tags for each of `post_ids`, ordered by name
pub async fn load_terms_sqlite(
    conn: &mut SqliteConnection,
    relation: Relation,
    post_ids: &[i64],
) -> RepoResult<HashMap<i64, Vec<TermRef>>> {
    let mut by_post: HashMap<i64, Vec<TermRef>> = HashMap::new();
    if post_ids.is_empty() {
        return Ok(by_post);
    }
    let sql = format!(
        "SELECT l.post_id, t.id, t.name, t.slug FROM {link} l \
         JOIN {target} t ON t.id = l.{fk} \
         WHERE l.post_id IN ({ph}) ORDER BY t.name, t.id",
        link = relation.link_table(),
        target = relation.target_table(),
        fk = relation.foreign_key(),
        ph = placeholders(post_ids.len()),
    );
    let mut query = sqlx::query(&sql);
    for id in post_ids {
        query = query.bind(*id);
    }
    for row in query.fetch_all(&mut *conn).await? {
        by_post
            .entry(row.get("post_id"))
            .or_default()
            .push(TermRef {
                id: row.get("id"),
                name: row.get("name"),
                slug: row.get("slug"),
            });
    }
    Ok(by_post)
}

/// Direct count of live posts linked to `target_id`, independent of `post_count`
pub async fn count_live_posts_sqlite(
    pool: &SqlitePool,
    relation: Relation,
    target_id: i64,
) -> RepoResult<i64> {
    let sql = format!(
        "SELECT COUNT(*) AS total FROM {} l JOIN posts p ON p.id = l.post_id \
         WHERE l.{} = ? AND p.deleted_at IS NULL",
        relation.link_table(),
        relation.foreign_key(),
    );
    let row = sqlx::query(&sql).bind(target_id).fetch_one(pool).await?;
    Ok(row.try_get("total")?)
}

// ============================================================================
// MySQL implementations
// ============================================================================

pub async fn linked_ids_mysql(
    conn: &mut MySqlConnection,
    relation: Relation,
    post_id: i64,
) -> RepoResult<Vec<i64>> {
    let sql = format!(
        "SELECT {fk} AS id FROM {link} WHERE post_id = ? ORDER BY {fk}",
        fk = relation.foreign_key(),
        link = relation.link_table(),
    );
    let rows = sqlx::query(&sql).bind(post_id).fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(|row| row.get::<i64, _>("id")).collect())
}

pub async fn apply_diff_mysql(
    conn: &mut MySqlConnection,
    relation: Relation,
    post_id: i64,
    diff: &RelationDiff,
) -> RepoResult<()> {
    if !diff.to_remove.is_empty() {
        let sql = format!(
            "DELETE FROM {} WHERE post_id = ? AND {} IN ({})",
            relation.link_table(),
            relation.foreign_key(),
            placeholders(diff.to_remove.len()),
        );
        let mut query = sqlx::query(&sql).bind(post_id);
        for id in &diff.to_remove {
            query = query.bind(*id);
        }
        query.execute(&mut *conn).await?;
        adjust_counters_mysql(conn, relation, &diff.to_remove, -1).await?;
    }

    if !diff.to_add.is_empty() {
        adjust_counters_mysql(conn, relation, &diff.to_add, 1).await?;
        let sql = format!(
            "INSERT INTO {} (post_id, {}) VALUES (?, ?)",
            relation.link_table(),
            relation.foreign_key(),
        );
        for id in &diff.to_add {
            sqlx::query(&sql)
                .bind(post_id)
                .bind(*id)
                .execute(&mut *conn)
                .await?;
        }
    }

    tracing::debug!(
        relation = relation.link_table(),
        post_id,
        added = diff.to_add.len(),
        removed = diff.to_remove.len(),
        "Applied relation diff"
    );
    Ok(())
}

pub async fn adjust_counters_mysql(
    conn: &mut MySqlConnection,
    relation: Relation,
    ids: &[i64],
    delta: i64,
) -> RepoResult<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let sql = format!(
        "UPDATE {} SET post_count = post_count + ? WHERE id IN ({})",
        relation.target_table(),
        placeholders(ids.len()),
    );
    let mut query = sqlx::query(&sql).bind(delta);
    for id in ids {
        query = query.bind(*id);
    }
    let affected = query.execute(&mut *conn).await?.rows_affected();

    if (affected as usize) < ids.len() {
        let found = existing_ids_mysql(conn, relation, ids).await?;
        return Err(missing_target_error(relation, ids, &found, affected));
    }
    Ok(())
}

async fn existing_ids_mysql(
    conn: &mut MySqlConnection,
    relation: Relation,
    ids: &[i64],
) -> RepoResult<BTreeSet<i64>> {
    let sql = format!(
        "SELECT id FROM {} WHERE id IN ({})",
        relation.target_table(),
        placeholders(ids.len()),
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(*id);
    }
    Ok(query
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|row| row.get::<i64, _>("id"))
        .collect())
}

pub async fn load_terms_mysql(
    conn: &mut MySqlConnection,
    relation: Relation,
    post_ids: &[i64],
) -> RepoResult<HashMap<i64, Vec<TermRef>>> {
    let mut by_post: HashMap<i64, Vec<TermRef>> = HashMap::new();
    if post_ids.is_empty() {
        return Ok(by_post);
    }
    let sql = format!(
        "SELECT l.post_id, t.id, t.name, t.slug FROM {link} l \
         JOIN {target} t ON t.id = l.{fk} \
         WHERE l.post_id IN ({ph}) ORDER BY t.name, t.id",
        link = relation.link_table(),
        target = relation.target_table(),
        fk = relation.foreign_key(),
        ph = placeholders(post_ids.len()),
    );
    let mut query = sqlx::query(&sql);
    for id in post_ids {
        query = query.bind(*id);
    }
    for row in query.fetch_all(&mut *conn).await? {
        by_post
            .entry(row.get("post_id"))
            .or_default()
            .push(TermRef {
                id: row.get("id"),
                name: row.get("name"),
                slug: row.get("slug"),
            });
    }
    Ok(by_post)
}

pub async fn count_live_posts_mysql(
    pool: &MySqlPool,
    relation: Relation,
    target_id: i64,
) -> RepoResult<i64> {
    let sql = format!(
        "SELECT COUNT(*) AS total FROM {} l JOIN posts p ON p.id = l.post_id \
         WHERE l.{} = ? AND p.deleted_at IS NULL",
        relation.link_table(),
        relation.foreign_key(),
    );
    let row = sqlx::query(&sql).bind(target_id).fetch_one(pool).await?;
    Ok(row.try_get("total")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_none_desired_is_noop() {
        let diff = RelationDiff::compute(&[1, 2, 3], None);
        assert!(diff.is_noop());
    }

    #[test]
    fn test_empty_desired_clears_all() {
        let diff = RelationDiff::compute(&[3, 1, 2], Some(&[]));
        assert!(diff.to_add.is_empty());
        assert_eq!(diff.to_remove, vec![1, 2, 3]);
    }

    #[test]
    fn test_same_set_is_noop() {
        let diff = RelationDiff::compute(&[1, 2], Some(&[2, 1, 2]));
        assert!(diff.is_noop());
    }

    #[test]
    fn test_swap_one() {
        let diff = RelationDiff::compute(&[10, 20], Some(&[10, 30]));
        assert_eq!(diff.to_add, vec![30]);
        assert_eq!(diff.to_remove, vec![20]);
    }

    #[test]
    fn test_attach_dedups() {
        let diff = RelationDiff::attach(&[5, 5, 4]);
        assert_eq!(diff.to_add, vec![4, 5]);
        assert!(diff.to_remove.is_empty());
    }

    #[test]
    fn test_missing_target_names_first_absent_id() {
        let found: BTreeSet<i64> = [1, 3].into_iter().collect();
        let err = missing_target_error(Relation::Categories, &[1, 2, 3, 4], &found, 2);
        assert!(matches!(
            err,
            RepositoryError::NotFound { entity: EntityKind::Category, ref id } if id == "2"
        ));
    }

    #[test]
    fn test_missing_target_without_absent_id_is_not_not_found() {
        let found: BTreeSet<i64> = [5, 6].into_iter().collect();
        let err = missing_target_error(Relation::Tags, &[5, 6], &found, 1);
        assert!(!err.is_not_found());
        assert!(matches!(err, RepositoryError::Decode(ref msg) if msg.contains("tags")));
    }

    #[test]
    fn test_relation_tables() {
        assert_eq!(Relation::Categories.link_table(), "post_categories");
        assert_eq!(Relation::Tags.foreign_key(), "tag_id");
        assert_eq!(Relation::Tags.target_table(), "tags");
        assert_eq!(Relation::Categories.entity(), EntityKind::Category);
    }

    proptest! {
        /// Applying the diff to the current set yields exactly the desired set
        #[test]
        fn diff_reaches_desired(
            current in proptest::collection::btree_set(0i64..50, 0..20),
            desired in proptest::collection::vec(0i64..50, 0..20),
        ) {
            let current: Vec<i64> = current.into_iter().collect();
            let diff = RelationDiff::compute(&current, Some(desired.as_slice()));

            let mut result: BTreeSet<i64> = current.iter().copied().collect();
            for id in &diff.to_remove {
                prop_assert!(result.remove(id));
            }
            for id in &diff.to_add {
                prop_assert!(result.insert(*id));
            }

            let expected: BTreeSet<i64> = desired.iter().copied().collect();
            prop_assert_eq!(result, expected);
        }

        /// Adds and removes never overlap, and a second diff against the result is empty
        #[test]
        fn diff_is_minimal(
            current in proptest::collection::vec(0i64..30, 0..15),
            desired in proptest::collection::vec(0i64..30, 0..15),
        ) {
            let diff = RelationDiff::compute(&current, Some(desired.as_slice()));
            for id in &diff.to_add {
                prop_assert!(!diff.to_remove.contains(id));
                prop_assert!(!current.contains(id));
            }
            for id in &diff.to_remove {
                prop_assert!(!desired.contains(id));
            }

            let again = RelationDiff::compute(&desired, Some(desired.as_slice()));
            prop_assert!(again.is_noop());
        }
    }
}
