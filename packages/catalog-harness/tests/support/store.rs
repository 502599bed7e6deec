//! Scratch SQLite store laid out like the service's database.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;
use tempfile::{tempdir, TempDir};

use catalog_oracle::DbOracle;

const SCHEMA: &str = "
    CREATE TABLE categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL UNIQUE
    );
    CREATE TABLE products (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        price INTEGER NOT NULL,
        category_id INTEGER NOT NULL REFERENCES categories(id)
    );
    INSERT INTO categories (title) VALUES ('Food'), ('Furniture');
    INSERT INTO products (title, price, category_id) VALUES
        ('Bread', 25, 1),
        ('Milk', 60, 1),
        ('Chair', 900, 2);
";

/// Database file removed together with its directory on drop.
pub struct Store {
    _dir: TempDir,
    path: PathBuf,
}

impl Store {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn oracle(&self, timeout: Duration) -> DbOracle {
        DbOracle::new(self.path.clone(), timeout)
    }

    fn connect(&self) -> Connection {
        Connection::open(&self.path).unwrap()
    }

    pub fn count(&self, table: &str) -> i64 {
        self.connect()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
            .unwrap()
    }
}

pub fn provision() -> Store {
    let dir = tempdir().unwrap();
    let path = dir.path().join("market.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    drop(conn);
    Store { _dir: dir, path }
}
