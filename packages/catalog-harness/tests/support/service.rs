//! In-process stand-in for the products/categories REST service.
//!
//! Serves the same routes over the scratch store, plus a few deliberately
//! faulty behaviors the harness must catch.

use std::collections::HashMap;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use matchit::Router;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use catalog_core::{CategoryDto, ProductDto};

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Correct,
    /// Creates a product under a client-supplied id instead of rejecting it
    AcceptsClientId,
    /// Keeps serving product bodies it has seen, whatever the store says;
    /// only API writes refresh the cache
    Caching,
    /// Hides products for a while after they were created
    DelayedVisibility(Duration),
    /// Stores new products but answers 200 instead of 201
    CreatedAsOk,
    /// Stores new products but leaves the id out of the 201 body
    OmitsCreatedId,
}

#[derive(Debug, Clone, Copy)]
enum Route {
    Products,
    Product,
    Category,
}

type HttpResponse = Response<Full<Bytes>>;

struct Service {
    router: Router<Route>,
    db_path: PathBuf,
    behavior: Behavior,
    cache: Mutex<HashMap<i64, ProductDto>>,
    created_at: Mutex<HashMap<i64, Instant>>,
}

/// Running service; stops accepting connections on drop.
pub struct TestService {
    base_url: String,
    handle: JoinHandle<()>,
}

impl TestService {
    pub async fn spawn(db_path: &Path, behavior: Behavior) -> Self {
        let mut router = Router::new();
        router.insert("/products", Route::Products).unwrap();
        router.insert("/products/{id}", Route::Product).unwrap();
        router.insert("/categories/{id}", Route::Category).unwrap();

        let service = Arc::new(Service {
            router,
            db_path: db_path.to_path_buf(),
            behavior,
            cache: Mutex::new(HashMap::new()),
            created_at: Mutex::new(HashMap::new()),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let io = TokioIo::new(stream);
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    let handler = service_fn(move |req| {
                        let service = Arc::clone(&service);
                        async move { Ok::<_, Infallible>(service.handle(req).await) }
                    });
                    let _ = http1::Builder::new().serve_connection(io, handler).await;
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            handle,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Drop for TestService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl Service {
    async fn handle(&self, req: Request<Incoming>) -> HttpResponse {
        let path = req.uri().path().to_string();
        let method = req.method().as_str().to_string();
        let (route, id) = match self.router.at(&path) {
            Ok(matched) => (
                *matched.value,
                matched.params.get("id").and_then(|v| v.parse::<i64>().ok()),
            ),
            Err(_) => return message(404, &format!("No route for {}", path)),
        };
        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => return message(400, &e.to_string()),
        };

        let result = match (route, method.as_str(), id) {
            (Route::Products, "POST", _) => self.create(&body),
            (Route::Products, "GET", _) => self.list(),
            (Route::Products, "PUT", _) => self.update(&body),
            (Route::Product, "GET", Some(id)) => self.get(id),
            (Route::Product, "DELETE", Some(id)) => self.delete(id),
            (Route::Category, "GET", Some(id)) => self.category(id),
            (_, _, None) if !matches!(route, Route::Products) => {
                Ok(message(400, "id must be a number"))
            }
            _ => Ok(message(405, "Method not allowed")),
        };
        result.unwrap_or_else(|e| message(500, &e.to_string()))
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(2))?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(conn)
    }

    fn create(&self, body: &[u8]) -> rusqlite::Result<HttpResponse> {
        let Ok(dto) = serde_json::from_slice::<ProductDto>(body) else {
            return Ok(message(400, "Malformed product"));
        };
        if dto.id.is_some() && !matches!(self.behavior, Behavior::AcceptsClientId) {
            return Ok(message(400, "Id must be null for new entity"));
        }
        let (Some(title), Some(price), Some(category)) =
            (&dto.title, dto.price, &dto.category_title)
        else {
            return Ok(message(400, "Title, price and category must not be null"));
        };

        let conn = self.connect()?;
        let Some(category_id) = category_id(&conn, category)? else {
            return Ok(message(400, "Category not found"));
        };
        conn.execute(
            "INSERT INTO products (id, title, price, category_id) VALUES (?1, ?2, ?3, ?4)",
            params![dto.id, title, price, category_id],
        )?;
        let id = conn.last_insert_rowid();

        let created = dto.clone().with_id(id);
        self.created_at.lock().unwrap().insert(id, Instant::now());
        if matches!(self.behavior, Behavior::Caching) {
            self.cache.lock().unwrap().insert(id, created.clone());
        }
        Ok(match self.behavior {
            Behavior::CreatedAsOk => json(200, &created),
            Behavior::OmitsCreatedId => json(201, &ProductDto { id: None, ..created }),
            _ => json(201, &created),
        })
    }

    fn get(&self, id: i64) -> rusqlite::Result<HttpResponse> {
        if let Some(cached) = self.cache.lock().unwrap().get(&id) {
            return Ok(json(200, cached));
        }
        if self.hidden(id) {
            return Ok(message(404, "Product not found"));
        }
        let conn = self.connect()?;
        match select_product(&conn, id)? {
            Some(product) => {
                if matches!(self.behavior, Behavior::Caching) {
                    self.cache.lock().unwrap().insert(id, product.clone());
                }
                Ok(json(200, &product))
            }
            None => Ok(message(404, "Product not found")),
        }
    }

    fn list(&self) -> rusqlite::Result<HttpResponse> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT p.id, p.title, p.price, c.title
             FROM products p JOIN categories c ON c.id = p.category_id
             ORDER BY p.id",
        )?;
        let products = stmt
            .query_map([], product_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let visible: Vec<ProductDto> = products
            .into_iter()
            .filter(|p| p.id.map_or(true, |id| !self.hidden(id)))
            .collect();
        Ok(json(200, &visible))
    }

    fn update(&self, body: &[u8]) -> rusqlite::Result<HttpResponse> {
        let Ok(dto) = serde_json::from_slice::<ProductDto>(body) else {
            return Ok(message(400, "Malformed product"));
        };
        let Some(id) = dto.id else {
            return Ok(message(400, "Id must not be null for update"));
        };
        let (Some(title), Some(price), Some(category)) =
            (&dto.title, dto.price, &dto.category_title)
        else {
            return Ok(message(400, "Title, price and category must not be null"));
        };

        let conn = self.connect()?;
        let Some(category_id) = category_id(&conn, category)? else {
            return Ok(message(400, "Category not found"));
        };
        let changed = conn.execute(
            "UPDATE products SET title = ?1, price = ?2, category_id = ?3 WHERE id = ?4",
            params![title, price, category_id, id],
        )?;
        if changed == 0 {
            return Ok(message(404, "Product not found"));
        }
        if matches!(self.behavior, Behavior::Caching) {
            self.cache.lock().unwrap().insert(id, dto.clone());
        }
        Ok(json(200, &dto))
    }

    fn delete(&self, id: i64) -> rusqlite::Result<HttpResponse> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM products WHERE id = ?1", params![id])?;
        self.cache.lock().unwrap().remove(&id);
        if removed == 0 {
            return Ok(message(404, "Product not found"));
        }
        Ok(Response::builder()
            .status(200)
            .body(Full::new(Bytes::new()))
            .unwrap())
    }

    fn category(&self, id: i64) -> rusqlite::Result<HttpResponse> {
        let conn = self.connect()?;
        let title: Option<String> = conn
            .query_row(
                "SELECT title FROM categories WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(title) = title else {
            return Ok(message(404, "Category not found"));
        };
        let mut stmt = conn.prepare(
            "SELECT p.id, p.title, p.price, c.title
             FROM products p JOIN categories c ON c.id = p.category_id
             WHERE c.id = ?1 ORDER BY p.id",
        )?;
        let products = stmt
            .query_map(params![id], product_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(json(
            200,
            &CategoryDto {
                id: Some(id),
                title: Some(title),
                products,
            },
        ))
    }

    fn hidden(&self, id: i64) -> bool {
        let Behavior::DelayedVisibility(lag) = self.behavior else {
            return false;
        };
        self.created_at
            .lock()
            .unwrap()
            .get(&id)
            .is_some_and(|created| created.elapsed() < lag)
    }
}

fn category_id(conn: &Connection, title: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM categories WHERE title = ?1",
        params![title],
        |row| row.get(0),
    )
    .optional()
}

fn select_product(conn: &Connection, id: i64) -> rusqlite::Result<Option<ProductDto>> {
    conn.query_row(
        "SELECT p.id, p.title, p.price, c.title
         FROM products p JOIN categories c ON c.id = p.category_id
         WHERE p.id = ?1",
        params![id],
        product_from_row,
    )
    .optional()
}

fn product_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProductDto> {
    Ok(ProductDto::new()
        .with_id(row.get(0)?)
        .with_title(row.get::<_, String>(1)?)
        .with_price(row.get(2)?)
        .with_category_title(row.get::<_, String>(3)?))
}

fn json<T: Serialize>(status: u16, value: &T) -> HttpResponse {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(serde_json::to_vec(value).unwrap())))
        .unwrap()
}

fn message(status: u16, text: &str) -> HttpResponse {
    #[derive(Serialize)]
    struct Body<'a> {
        status: u16,
        message: &'a str,
    }
    json(status, &Body { status, message: text })
}
