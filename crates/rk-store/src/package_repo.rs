//! SQLite-backed package repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use rk_core::{
    ListQuery, NewPackage, Package, PackageFilter, PackageId, PackagePatch, PackageRepository,
    Page, RequestContext, SortOrder, StorageError, StorageName,
};

use crate::db::{bounded, contains_pattern, page_window, Timeouts};

const PACKAGE_COLUMNS: &str =
    "id, label, version, storage_filename, original_filename, uploaded_at";

#[derive(Debug, FromRow)]
struct PackageRow {
    id: i64,
    label: String,
    version: String,
    storage_filename: String,
    original_filename: String,
    uploaded_at: DateTime<Utc>,
}

impl TryFrom<PackageRow> for Package {
    type Error = StorageError;

    fn try_from(row: PackageRow) -> Result<Self, Self::Error> {
        let storage_name = StorageName::parse(row.storage_filename).map_err(|e| {
            StorageError::Backend(format!("package {} has a corrupt storage name: {}", row.id, e))
        })?;

        Ok(Package {
            id: PackageId(row.id),
            label: row.label,
            version: row.version,
            storage_name,
            original_filename: row.original_filename,
            uploaded_at: row.uploaded_at,
        })
    }
}

/// Package records in the `resource_package` table
#[derive(Debug, Clone)]
pub struct SqlitePackageRepository {
    pool: SqlitePool,
    timeouts: Timeouts,
}

impl SqlitePackageRepository {
    pub fn new(pool: SqlitePool, timeouts: Timeouts) -> Self {
        Self { pool, timeouts }
    }
}

#[async_trait]
impl PackageRepository for SqlitePackageRepository {
    async fn create(
        &self,
        ctx: &RequestContext,
        package: &NewPackage,
    ) -> Result<Package, StorageError> {
        let sql = format!(
            "INSERT INTO resource_package \
             (label, version, storage_filename, original_filename, uploaded_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING {PACKAGE_COLUMNS}"
        );

        let row: PackageRow = bounded(
            ctx,
            "create",
            self.timeouts.write,
            sqlx::query_as(&sql)
                .bind(&package.label)
                .bind(&package.version)
                .bind(package.storage_name.as_str())
                .bind(&package.original_filename)
                .bind(Utc::now())
                .fetch_one(&self.pool),
        )
        .await?;

        tracing::debug!(trace_id = %ctx.trace_id(), package_id = row.id, "Inserted package");
        row.try_into()
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        id: PackageId,
        patch: &PackagePatch,
    ) -> Result<(), StorageError> {
        if patch.is_empty() {
            // Nothing to write, but the record must still exist
            return self.get(ctx, id).await.map(|_| ());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE resource_package SET ");
        let mut set = qb.separated(", ");
        if let Some(label) = &patch.label {
            set.push("label = ").push_bind_unseparated(label.clone());
        }
        if let Some(version) = &patch.version {
            set.push("version = ").push_bind_unseparated(version.clone());
        }
        qb.push(" WHERE id = ").push_bind(id.0);

        let result = bounded(ctx, "update", self.timeouts.write, qb.build().execute(&self.pool)).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("package {}", id)));
        }
        Ok(())
    }

    async fn delete(&self, ctx: &RequestContext, id: PackageId) -> Result<(), StorageError> {
        let result = bounded(
            ctx,
            "delete",
            self.timeouts.write,
            sqlx::query("DELETE FROM resource_package WHERE id = ?")
                .bind(id.0)
                .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("package {}", id)));
        }
        Ok(())
    }

    async fn get(&self, ctx: &RequestContext, id: PackageId) -> Result<Package, StorageError> {
        let sql = format!("SELECT {PACKAGE_COLUMNS} FROM resource_package WHERE id = ?");
        let row: Option<PackageRow> = bounded(
            ctx,
            "get",
            self.timeouts.read,
            sqlx::query_as(&sql).bind(id.0).fetch_optional(&self.pool),
        )
        .await?;

        row.ok_or_else(|| StorageError::NotFound(format!("package {}", id)))?
            .try_into()
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        filter: &PackageFilter,
        query: &ListQuery,
    ) -> Result<Page<Package>, StorageError> {
        let (limit, offset) = page_window(query)?;

        // One read transaction, so the count and the page see the same rows
        let fetch = async {
            let mut tx = self.pool.begin().await?;

            let mut count_qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT COUNT(*) FROM resource_package WHERE 1=1");
            push_filter(&mut count_qb, filter);
            let total: i64 = count_qb.build_query_scalar().fetch_one(&mut *tx).await?;

            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("SELECT {PACKAGE_COLUMNS} FROM resource_package WHERE 1=1"));
            push_filter(&mut qb, filter);
            qb.push(match query.order {
                SortOrder::Asc => " ORDER BY id ASC",
                SortOrder::Desc => " ORDER BY id DESC",
            });
            qb.push(" LIMIT ").push_bind(limit);
            qb.push(" OFFSET ").push_bind(offset);
            let rows: Vec<PackageRow> = qb.build_query_as().fetch_all(&mut *tx).await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>((total, rows))
        };

        let (total, rows) = bounded(ctx, "list", self.timeouts.list, fetch).await?;
        let items = rows
            .into_iter()
            .map(Package::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            total: total.max(0) as u64,
            items,
        })
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &PackageFilter) {
    if let Some(label) = &filter.label {
        qb.push(" AND label = ").push_bind(label.clone());
    }
    if let Some(version) = &filter.version {
        qb.push(" AND version LIKE ")
            .push_bind(contains_pattern(version))
            .push(" ESCAPE '\\'");
    }
    if let Some(after) = filter.uploaded_after {
        qb.push(" AND julianday(uploaded_at) >= julianday(")
            .push_bind(after)
            .push(")");
    }
    if let Some(before) = filter.uploaded_before {
        qb.push(" AND julianday(uploaded_at) <= julianday(")
            .push_bind(before)
            .push(")");
    }
}
