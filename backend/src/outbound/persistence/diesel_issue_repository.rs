//! PostgreSQL-backed issue adapter.
//!
//! [`IssueRepository::commit`] writes the issue row, the optional comment,
//! watcher upserts, and notification rows in one transaction. Watcher upserts
//! OR the stored reason bits with the incoming ones; notification inserts skip
//! ids that already exist.

use async_trait::async_trait;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::SmallInt;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};

use crate::domain::ports::{IssueChangeSet, IssueRepository, IssueRepositoryError, IssueWrite};
use crate::domain::{Issue, IssueId, OrganizationId};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{IssueRow, NewCommentRow, NotificationRow, WatcherRow};
use super::pool::{DbPool, PoolError};
use super::schema::{comments, issues, notifications, watchers};

/// Diesel-backed implementation of [`IssueRepository`].
#[derive(Clone)]
pub struct DieselIssueRepository {
    pool: DbPool,
}

impl DieselIssueRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> IssueRepositoryError {
    map_basic_pool_error(error, |message| IssueRepositoryError::connection(message))
}

fn map_diesel_error(error: diesel::result::Error) -> IssueRepositoryError {
    map_basic_diesel_error(
        error,
        IssueRepositoryError::query,
        IssueRepositoryError::connection,
    )
}

/// Failure inside the commit transaction.
#[derive(Debug)]
enum CommitError {
    Diesel(diesel::result::Error),
    Missing(IssueId),
}

impl From<diesel::result::Error> for CommitError {
    fn from(error: diesel::result::Error) -> Self {
        Self::Diesel(error)
    }
}

fn map_commit_error(error: CommitError) -> IssueRepositoryError {
    match error {
        CommitError::Diesel(error) => map_diesel_error(error),
        CommitError::Missing(issue_id) => IssueRepositoryError::missing(issue_id.to_string()),
    }
}

/// Insert watcher rows, unioning reason bits on conflict.
pub(super) async fn upsert_watchers(
    conn: &mut AsyncPgConnection,
    rows: &[WatcherRow],
) -> Result<(), diesel::result::Error> {
    if rows.is_empty() {
        return Ok(());
    }
    diesel::insert_into(watchers::table)
        .values(rows)
        .on_conflict((watchers::issue_id, watchers::user_id))
        .do_update()
        .set(watchers::reasons.eq(sql::<SmallInt>("watchers.reasons | excluded.reasons")))
        .execute(conn)
        .await
        .map(|_| ())
}

/// Insert notification rows, skipping ids already delivered.
pub(super) async fn insert_notifications(
    conn: &mut AsyncPgConnection,
    rows: &[NotificationRow],
) -> Result<usize, diesel::result::Error> {
    if rows.is_empty() {
        return Ok(0);
    }
    diesel::insert_into(notifications::table)
        .values(rows)
        .on_conflict_do_nothing()
        .execute(conn)
        .await
}

async fn write_issue(
    conn: &mut AsyncPgConnection,
    organization_id: uuid::Uuid,
    write: &IssueWrite,
) -> Result<(), CommitError> {
    match write {
        IssueWrite::Insert(issue) => {
            diesel::insert_into(issues::table)
                .values(IssueRow::from(issue))
                .execute(conn)
                .await?;
        }
        IssueWrite::Update(issue) => {
            let updated = diesel::update(issues::table)
                .filter(issues::id.eq(issue.id.as_uuid()))
                .filter(issues::organization_id.eq(organization_id))
                .set(IssueRow::from(issue))
                .execute(conn)
                .await?;
            if updated == 0 {
                return Err(CommitError::Missing(issue.id));
            }
        }
        IssueWrite::Unchanged => {}
    }
    Ok(())
}

#[async_trait]
impl IssueRepository for DieselIssueRepository {
    async fn find(
        &self,
        organization_id: &OrganizationId,
        issue_id: &IssueId,
    ) -> Result<Option<Issue>, IssueRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row: Option<IssueRow> = issues::table
            .filter(issues::id.eq(issue_id.as_uuid()))
            .filter(issues::organization_id.eq(organization_id.as_uuid()))
            .select(IssueRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        row.map(Issue::try_from)
            .transpose()
            .map_err(|err| IssueRepositoryError::query(err.to_string()))
    }

    async fn commit(&self, change: &IssueChangeSet) -> Result<(), IssueRepositoryError> {
        let organization_id = *change.organization_id.as_uuid();
        let watcher_rows: Vec<WatcherRow> = change.watchers.iter().map(WatcherRow::from).collect();
        let notification_rows: Vec<NotificationRow> = change
            .notifications
            .iter()
            .map(NotificationRow::from)
            .collect();
        let comment_row = change.comment.as_ref().map(NewCommentRow::from);
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        conn.transaction(|conn| {
            async move {
                write_issue(conn, organization_id, &change.issue).await?;
                if let Some(comment) = &comment_row {
                    diesel::insert_into(comments::table)
                        .values(comment)
                        .execute(conn)
                        .await?;
                }
                upsert_watchers(conn, &watcher_rows).await?;
                insert_notifications(conn, &notification_rows).await?;
                Ok::<_, CommitError>(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_commit_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn missing_rows_keep_the_issue_id() {
        let issue_id = IssueId::random();
        let error = map_commit_error(CommitError::Missing(issue_id));

        assert_eq!(error, IssueRepositoryError::missing(issue_id.to_string()));
    }

    #[rstest]
    fn pool_errors_are_connection_errors() {
        assert!(matches!(
            map_pool_error(PoolError::build("bad url")),
            IssueRepositoryError::Connection { .. }
        ));
    }

    #[rstest]
    fn diesel_errors_inside_the_transaction_are_query_errors() {
        let error = map_commit_error(CommitError::from(diesel::result::Error::RollbackTransaction));
        assert!(matches!(error, IssueRepositoryError::Query { .. }));
    }
}
