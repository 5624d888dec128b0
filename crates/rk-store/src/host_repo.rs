//! SQLite-backed host repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use rk_core::{
    Host, HostDraft, HostFilter, HostId, HostPatch, HostRepository, ListQuery, Page,
    RequestContext, SortOrder, StorageError,
};

use crate::db::{bounded, contains_pattern, page_window, Timeouts};

const HOST_COLUMNS: &str =
    "id, name, label, ssh_ip, ssh_port, ssh_user, interpreter, remark, created_at, updated_at";

#[derive(Debug, FromRow)]
struct HostRow {
    id: i64,
    name: String,
    label: String,
    ssh_ip: String,
    ssh_port: i64,
    ssh_user: String,
    interpreter: Option<String>,
    remark: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<HostRow> for Host {
    type Error = StorageError;

    fn try_from(row: HostRow) -> Result<Self, Self::Error> {
        let port = u16::try_from(row.ssh_port).map_err(|_| {
            StorageError::Backend(format!("host {} has invalid port {}", row.id, row.ssh_port))
        })?;

        Ok(Host {
            id: HostId(row.id),
            name: row.name,
            label: row.label,
            address: row.ssh_ip,
            port,
            username: row.ssh_user,
            interpreter: row.interpreter,
            remark: row.remark,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Host records in the `resource_host` table
#[derive(Debug, Clone)]
pub struct SqliteHostRepository {
    pool: SqlitePool,
    timeouts: Timeouts,
}

impl SqliteHostRepository {
    pub fn new(pool: SqlitePool, timeouts: Timeouts) -> Self {
        Self { pool, timeouts }
    }
}

#[async_trait]
impl HostRepository for SqliteHostRepository {
    async fn create(&self, ctx: &RequestContext, draft: &HostDraft) -> Result<Host, StorageError> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO resource_host \
             (name, label, ssh_ip, ssh_port, ssh_user, interpreter, remark, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {HOST_COLUMNS}"
        );

        let row: HostRow = bounded(
            ctx,
            "create",
            self.timeouts.write,
            sqlx::query_as(&sql)
                .bind(&draft.name)
                .bind(&draft.label)
                .bind(&draft.address)
                .bind(i64::from(draft.effective_port()))
                .bind(&draft.username)
                .bind(&draft.interpreter)
                .bind(&draft.remark)
                .bind(now)
                .bind(now)
                .fetch_one(&self.pool),
        )
        .await?;

        tracing::debug!(trace_id = %ctx.trace_id(), host_id = row.id, "Inserted host");
        row.try_into()
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        id: HostId,
        patch: &HostPatch,
    ) -> Result<(), StorageError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE resource_host SET updated_at = ");
        qb.push_bind(Utc::now());

        if let Some(name) = &patch.name {
            qb.push(", name = ").push_bind(name.clone());
        }
        if let Some(label) = &patch.label {
            qb.push(", label = ").push_bind(label.clone());
        }
        if let Some(address) = &patch.address {
            qb.push(", ssh_ip = ").push_bind(address.clone());
        }
        if let Some(port) = patch.port {
            qb.push(", ssh_port = ").push_bind(i64::from(port));
        }
        if let Some(username) = &patch.username {
            qb.push(", ssh_user = ").push_bind(username.clone());
        }
        if let Some(interpreter) = &patch.interpreter {
            qb.push(", interpreter = ").push_bind(interpreter.clone());
        }
        if let Some(remark) = &patch.remark {
            qb.push(", remark = ").push_bind(remark.clone());
        }
        qb.push(" WHERE id = ").push_bind(id.0);

        let result = bounded(ctx, "update", self.timeouts.write, qb.build().execute(&self.pool)).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("host {}", id)));
        }
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, id: HostId) -> Result<(), StorageError> {
        let result = bounded(
            ctx,
            "delete",
            self.timeouts.write,
            sqlx::query("DELETE FROM resource_host WHERE id = ?")
                .bind(id.0)
                .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("host {}", id)));
        }
        Ok(())
    }

    async fn get(&self, ctx: &RequestContext, id: HostId) -> Result<Host, StorageError> {
        let sql = format!("SELECT {HOST_COLUMNS} FROM resource_host WHERE id = ?");
        let row: Option<HostRow> = bounded(
            ctx,
            "get",
            self.timeouts.read,
            sqlx::query_as(&sql).bind(id.0).fetch_optional(&self.pool),
        )
        .await?;

        row.ok_or_else(|| StorageError::NotFound(format!("host {}", id)))?
            .try_into()
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        filter: &HostFilter,
        query: &ListQuery,
    ) -> Result<Page<Host>, StorageError> {
        let (limit, offset) = page_window(query)?;

        // One read transaction, so the count and the page see the same rows
        let fetch = async {
            let mut tx = self.pool.begin().await?;

            let mut count_qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT COUNT(*) FROM resource_host WHERE 1=1");
            push_filter(&mut count_qb, filter);
            let total: i64 = count_qb.build_query_scalar().fetch_one(&mut *tx).await?;

            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("SELECT {HOST_COLUMNS} FROM resource_host WHERE 1=1"));
            push_filter(&mut qb, filter);
            qb.push(match query.order {
                SortOrder::Asc => " ORDER BY id ASC",
                SortOrder::Desc => " ORDER BY id DESC",
            });
            qb.push(" LIMIT ").push_bind(limit);
            qb.push(" OFFSET ").push_bind(offset);
            let rows: Vec<HostRow> = qb.build_query_as().fetch_all(&mut *tx).await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>((total, rows))
        };

        let (total, rows) = bounded(ctx, "list", self.timeouts.list, fetch).await?;
        let items = rows
            .into_iter()
            .map(Host::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            total: total.max(0) as u64,
            items,
        })
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &HostFilter) {
    if let Some(name) = &filter.name {
        qb.push(" AND name LIKE ")
            .push_bind(contains_pattern(name))
            .push(" ESCAPE '\\'");
    }
    if let Some(label) = &filter.label {
        qb.push(" AND label = ").push_bind(label.clone());
    }
    if let Some(address) = &filter.address {
        qb.push(" AND ssh_ip = ").push_bind(address.clone());
    }
    if let Some(port) = filter.port {
        qb.push(" AND ssh_port = ").push_bind(i64::from(port));
    }
    if let Some(username) = &filter.username {
        qb.push(" AND ssh_user LIKE ")
            .push_bind(contains_pattern(username))
            .push(" ESCAPE '\\'");
    }
    if let Some(after) = filter.created_after {
        qb.push(" AND julianday(created_at) >= julianday(")
            .push_bind(after)
            .push(")");
    }
    if let Some(before) = filter.created_before {
        qb.push(" AND julianday(created_at) <= julianday(")
            .push_bind(before)
            .push(")");
    }
    if let Some(after) = filter.updated_after {
        qb.push(" AND julianday(updated_at) >= julianday(")
            .push_bind(after)
            .push(")");
    }
    if let Some(before) = filter.updated_before {
        qb.push(" AND julianday(updated_at) <= julianday(")
            .push_bind(before)
            .push(")");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    fn draft(name: &str, address: &str) -> HostDraft {
        HostDraft {
            name: name.into(),
            label: "web".into(),
            address: address.into(),
            port: 0,
            username: "admin".into(),
            interpreter: Some("/usr/bin/python3".into()),
            remark: String::new(),
        }
    }

    async fn repo() -> SqliteHostRepository {
        SqliteHostRepository::new(memory_pool().await, Timeouts::default())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = repo().await;
        let ctx = RequestContext::new();

        let host = repo.create(&ctx, &draft("web-1", "10.0.0.5")).await.unwrap();
        assert_eq!(host.port, 22);
        assert_eq!(host.interpreter.as_deref(), Some("/usr/bin/python3"));

        let fetched = repo.get(&ctx, host.id).await.unwrap();
        assert_eq!(fetched, host);
    }

    #[tokio::test]
    async fn test_duplicate_endpoint_rejected() {
        let repo = repo().await;
        let ctx = RequestContext::new();

        repo.create(&ctx, &draft("web-1", "10.0.0.5")).await.unwrap();
        let err = repo
            .create(&ctx, &draft("web-2", "10.0.0.5"))
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());

        let err = repo
            .create(&ctx, &draft("web-1", "10.0.0.6"))
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());

        let page = repo
            .list(&ctx, &HostFilter::default(), &ListQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_update_patch_and_missing() {
        let repo = repo().await;
        let ctx = RequestContext::new();
        let host = repo.create(&ctx, &draft("web-1", "10.0.0.5")).await.unwrap();

        let patch = HostPatch {
            port: Some(2222),
            interpreter: Some(None),
            ..HostPatch::default()
        };
        repo.update(&ctx, host.id, &patch).await.unwrap();

        let updated = repo.get(&ctx, host.id).await.unwrap();
        assert_eq!(updated.port, 2222);
        assert_eq!(updated.interpreter, None);
        assert_eq!(updated.name, "web-1");
        assert!(updated.updated_at >= host.updated_at);

        let err = repo.update(&ctx, HostId(999), &patch).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let repo = repo().await;
        let ctx = RequestContext::new();
        let host = repo.create(&ctx, &draft("web-1", "10.0.0.5")).await.unwrap();

        repo.delete(&ctx, host.id).await.unwrap();
        assert!(repo.delete(&ctx, host.id).await.unwrap_err().is_not_found());
        assert!(repo.get(&ctx, host.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let repo = repo().await;
        let ctx = RequestContext::new();
        for i in 1..=5 {
            let mut d = draft(&format!("web-{i}"), &format!("10.0.0.{i}"));
            if i % 2 == 0 {
                d.label = "db".into();
            }
            repo.create(&ctx, &d).await.unwrap();
        }

        let filter = HostFilter {
            label: Some("web".into()),
            ..HostFilter::default()
        };
        let page = repo
            .list(&ctx, &filter, &ListQuery::new(1, 2).order(SortOrder::Desc))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        let names: Vec<_> = page.items.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["web-5", "web-3"]);

        let filter = HostFilter {
            name: Some("b-4".into()),
            ..HostFilter::default()
        };
        let page = repo.list(&ctx, &filter, &ListQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].address, "10.0.0.4");
    }

    #[tokio::test]
    async fn test_cancelled_request_touches_nothing() {
        let repo = repo().await;
        let ctx = RequestContext::new();
        ctx.cancel();

        let err = repo.create(&ctx, &draft("web-1", "10.0.0.5")).await.unwrap_err();
        assert!(matches!(err, StorageError::Cancelled(_)));

        let page = repo
            .list(&RequestContext::new(), &HostFilter::default(), &ListQuery::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_list_rejects_overflowing_page() {
        let repo = repo().await;
        let err = repo
            .list(
                &RequestContext::new(),
                &HostFilter::default(),
                &ListQuery::new(u32::MAX, u32::MAX),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidQuery(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_list_total_matches_page_during_inserts() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = rk_core::config::DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("rk.db").display()),
            max_connections: 4,
            ..rk_core::config::DatabaseConfig::default()
        };
        let pool = crate::db::connect(&config).await.unwrap();
        crate::db::migrate(&pool).await.unwrap();
        let repo = SqliteHostRepository::new(pool, Timeouts::default());

        let writer = {
            let repo = repo.clone();
            tokio::spawn(async move {
                let ctx = RequestContext::new();
                for i in 0..200 {
                    let d = draft(&format!("web-{i}"), &format!("10.1.{}.{}", i / 100, i % 100));
                    repo.create(&ctx, &d).await.unwrap();
                }
            })
        };

        let ctx = RequestContext::new();
        let query = ListQuery::new(1, 1000);
        while !writer.is_finished() {
            let page = repo.list(&ctx, &HostFilter::default(), &query).await.unwrap();
            assert_eq!(page.total, page.items.len() as u64);
        }
        writer.await.unwrap();

        let page = repo.list(&ctx, &HostFilter::default(), &query).await.unwrap();
        assert_eq!(page.total, 200);
        assert_eq!(page.items.len(), 200);
    }
}
