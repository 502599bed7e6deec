//! Oracle operations over the `categories` and `products` tables.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{params, OptionalExtension, Row};

use catalog_core::{
    Category, EntityKind, EntitySnapshot, HarnessConfig, HarnessError, Product, Result,
};

use crate::session::{store_error, Session};

const PRODUCT_COLUMNS: &str = "id, title, price, category_id";

/// Direct store access used as ground truth.
///
/// Cloning is cheap; clones share the database path.
#[derive(Debug, Clone)]
pub struct DbOracle {
    path: Arc<PathBuf>,
    timeout: Duration,
}

impl DbOracle {
    /// Creates an oracle over the SQLite database at `path`.
    ///
    /// # Arguments
    /// * `path` - Database file; it must already exist
    /// * `timeout` - Bound for every operation, session acquisition included
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: Arc::new(path.into()),
            timeout,
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config.database_path.clone(), config.db_timeout())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `op` against a fresh session on the blocking pool.
    ///
    /// The session is dropped when `op` returns, whatever the outcome. If the
    /// deadline passes first the caller gets `Timeout`; the blocking task is
    /// left to finish on its own and its session is released then.
    async fn with_session<T, F>(&self, operation: &'static str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Session) -> Result<T> + Send + 'static,
    {
        let path = Arc::clone(&self.path);
        // SQLite's own lock wait outlasts the deadline so expiry always
        // surfaces as Timeout rather than a busy error.
        let busy_timeout = self.timeout * 2;
        let task = tokio::task::spawn_blocking(move || {
            let mut session = Session::open(&path, busy_timeout)?;
            op(&mut session)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => {
                tracing::warn!(operation, "store operation timed out");
                Err(HarnessError::Timeout {
                    operation: operation.to_string(),
                    limit_ms: self.timeout.as_millis() as u64,
                })
            }
            Ok(Err(join_err)) => Err(HarnessError::StoreUnavailable(format!(
                "{} aborted: {}",
                operation, join_err
            ))),
            Ok(Ok(result)) => {
                if let Err(e) = &result {
                    tracing::debug!(operation, error = %e, "store operation failed");
                }
                result
            }
        }
    }

    /// Total number of category rows.
    pub async fn count_categories(&self) -> Result<i64> {
        self.with_session("count_categories", |s| {
            count_rows(s, "SELECT COUNT(*) FROM categories")
        })
        .await
    }

    /// Total number of product rows.
    pub async fn count_products(&self) -> Result<i64> {
        self.with_session("count_products", |s| {
            count_rows(s, "SELECT COUNT(*) FROM products")
        })
        .await
    }

    /// Point lookup of a product row.
    ///
    /// # Errors
    /// `NotFound` if no row has this id.
    pub async fn get_product_by_id(&self, id: i64) -> Result<Product> {
        self.with_session("get_product_by_id", move |s| {
            select_product(s, id)?.ok_or(HarnessError::NotFound {
                entity: EntityKind::Product,
                id,
            })
        })
        .await
    }

    /// Point lookup of a category row.
    ///
    /// # Errors
    /// `NotFound` if no row has this id.
    pub async fn get_category_by_id(&self, id: i64) -> Result<Category> {
        self.with_session("get_category_by_id", move |s| {
            select_category(s, id)?.ok_or(HarnessError::NotFound {
                entity: EntityKind::Category,
                id,
            })
        })
        .await
    }

    pub async fn find_category_by_title(&self, title: &str) -> Result<Option<Category>> {
        let title = title.to_string();
        self.with_session("find_category_by_title", move |s| {
            s.conn()
                .query_row(
                    "SELECT id, title FROM categories WHERE title = ?1",
                    params![title],
                    category_from_row,
                )
                .optional()
                .map_err(store_error)
        })
        .await
    }

    /// All category rows, ordered by id.
    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        self.with_session("list_categories", select_all_categories)
            .await
    }

    /// All product rows, ordered by id.
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        self.with_session("list_products", |s| {
            let sql = format!("SELECT {} FROM products ORDER BY id", PRODUCT_COLUMNS);
            let mut stmt = s.conn().prepare(&sql).map_err(store_error)?;
            let rows = stmt
                .query_map([], product_from_row)
                .map_err(store_error)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(store_error)?;
            Ok(rows)
        })
        .await
    }

    /// Deletes a product underneath the API.
    ///
    /// # Errors
    /// `NotFound` if no row was deleted.
    pub async fn delete_product_by_id(&self, id: i64) -> Result<()> {
        self.with_session("delete_product_by_id", move |s| {
            let deleted = s
                .conn()
                .execute("DELETE FROM products WHERE id = ?1", params![id])
                .map_err(store_error)?;
            if deleted == 0 {
                return Err(HarnessError::NotFound {
                    entity: EntityKind::Product,
                    id,
                });
            }
            tracing::debug!(id, "product deleted directly");
            Ok(())
        })
        .await
    }

    /// Overwrites a product row by primary key without going through the
    /// API's validation.
    ///
    /// # Errors
    /// `NotFound` if no row has `product.id`.
    pub async fn update_product_direct(&self, product: &Product) -> Result<()> {
        let product = product.clone();
        self.with_session("update_product_direct", move |s| {
            let updated = s
                .conn()
                .execute(
                    "UPDATE products SET title = ?2, price = ?3, category_id = ?4 WHERE id = ?1",
                    params![
                        product.id,
                        product.title,
                        product.price,
                        product.category_id
                    ],
                )
                .map_err(store_error)?;
            if updated == 0 {
                return Err(HarnessError::NotFound {
                    entity: EntityKind::Product,
                    id: product.id,
                });
            }
            tracing::debug!(id = product.id, "product overwritten directly");
            Ok(())
        })
        .await
    }

    /// Inserts a fixture category.
    ///
    /// The current titles are read in the same transaction as the insert;
    /// if `title` is taken, a numbered variant is used instead, so the
    /// returned category may carry a different title than requested.
    pub async fn create_category(&self, title: &str) -> Result<Category> {
        let requested = title.to_string();
        self.with_session("create_category", move |s| {
            let tx = s.conn_mut().transaction().map_err(store_error)?;
            let taken: Vec<String> = {
                let mut stmt = tx
                    .prepare("SELECT title FROM categories")
                    .map_err(store_error)?;
                let titles = stmt
                    .query_map([], |row| row.get(0))
                    .map_err(store_error)?
                    .collect::<std::result::Result<Vec<String>, _>>()
                    .map_err(store_error)?;
                titles
            };
            let title = unique_title(&requested, &taken);
            tx.execute("INSERT INTO categories (title) VALUES (?1)", params![title])
                .map_err(store_error)?;
            let id = tx.last_insert_rowid();
            tx.commit().map_err(store_error)?;
            tracing::debug!(id, title = %title, "fixture category created");
            Ok(Category { id, title })
        })
        .await
    }

    /// Deletes a fixture category.
    ///
    /// # Errors
    /// `NotFound` if no row was deleted.
    pub async fn delete_category_by_id(&self, id: i64) -> Result<()> {
        self.with_session("delete_category_by_id", move |s| {
            let deleted = s
                .conn()
                .execute("DELETE FROM categories WHERE id = ?1", params![id])
                .map_err(store_error)?;
            if deleted == 0 {
                return Err(HarnessError::NotFound {
                    entity: EntityKind::Category,
                    id,
                });
            }
            Ok(())
        })
        .await
    }

    /// Canonical snapshot of a product, its category reference resolved to
    /// a title. `None` when the product row does not exist.
    pub async fn product_snapshot(&self, id: i64) -> Result<Option<EntitySnapshot>> {
        self.with_session("product_snapshot", move |s| {
            let Some(product) = select_product(s, id)? else {
                return Ok(None);
            };
            let category = select_category(s, product.category_id)?;
            EntitySnapshot::from_product_row(&product, category.as_ref()).map(Some)
        })
        .await
    }

    /// Canonical snapshot of a category. `None` when the row does not exist.
    pub async fn category_snapshot(&self, id: i64) -> Result<Option<EntitySnapshot>> {
        self.with_session("category_snapshot", move |s| {
            Ok(select_category(s, id)?.map(|c| EntitySnapshot::from_category_row(&c)))
        })
        .await
    }

    /// Canonical snapshots of every product, in id order.
    pub async fn product_snapshots(&self) -> Result<Vec<EntitySnapshot>> {
        self.with_session("product_snapshots", |s| {
            let categories = select_all_categories(s)?;
            let sql = format!("SELECT {} FROM products ORDER BY id", PRODUCT_COLUMNS);
            let mut stmt = s.conn().prepare(&sql).map_err(store_error)?;
            let products = stmt
                .query_map([], product_from_row)
                .map_err(store_error)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(store_error)?;
            products
                .iter()
                .map(|p| {
                    let category = categories.iter().find(|c| c.id == p.category_id);
                    EntitySnapshot::from_product_row(p, category)
                })
                .collect()
        })
        .await
    }
}

/// Returns `base` if no title in `taken` equals it, otherwise the first of
/// `"{base} 2"`, `"{base} 3"`, ... that is free.
pub fn unique_title(base: &str, taken: &[String]) -> String {
    let is_taken = |candidate: &str| taken.iter().any(|t| t == candidate);
    if !is_taken(base) {
        return base.to_string();
    }
    (2u64..)
        .map(|n| format!("{} {}", base, n))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn count_rows(session: &Session, sql: &str) -> Result<i64> {
    session
        .conn()
        .query_row(sql, [], |row| row.get(0))
        .map_err(store_error)
}

fn select_product(session: &Session, id: i64) -> Result<Option<Product>> {
    let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
    session
        .conn()
        .query_row(&sql, params![id], product_from_row)
        .optional()
        .map_err(store_error)
}

fn select_category(session: &Session, id: i64) -> Result<Option<Category>> {
    session
        .conn()
        .query_row(
            "SELECT id, title FROM categories WHERE id = ?1",
            params![id],
            category_from_row,
        )
        .optional()
        .map_err(store_error)
}

fn select_all_categories(session: &mut Session) -> Result<Vec<Category>> {
    let mut stmt = session
        .conn()
        .prepare("SELECT id, title FROM categories ORDER BY id")
        .map_err(store_error)?;
    let rows = stmt
        .query_map([], category_from_row)
        .map_err(store_error)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(store_error)?;
    Ok(rows)
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        title: row.get(1)?,
        price: row.get(2)?,
        category_id: row.get(3)?,
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        title: row.get(1)?,
    })
}
