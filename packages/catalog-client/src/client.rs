//! HTTP client for the products/categories endpoints.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use catalog_core::{CategoryDto, HarnessConfig, HarnessError, ProductDto, Result};

use crate::response::{decode, ApiResponse};

/// Typed wrapper over the service's REST surface.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl ApiClient {
    /// Creates a client.
    ///
    /// # Arguments
    /// * `base_url` - Service root, e.g. `http://localhost:8189/market/api/v1`
    /// * `timeout` - Bound for each request, body included
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HarnessError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        Self::new(config.base_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `POST /products`
    pub async fn create_product(&self, product: &ProductDto) -> Result<ApiResponse<ProductDto>> {
        let request = self.http.post(self.url("products")).json(product);
        self.execute("create_product", request).await
    }

    /// `GET /products/{id}`
    pub async fn get_product(&self, id: i64) -> Result<ApiResponse<ProductDto>> {
        let request = self.http.get(self.url(&format!("products/{}", id)));
        self.execute("get_product", request).await
    }

    /// `GET /products`
    pub async fn list_products(&self) -> Result<ApiResponse<Vec<ProductDto>>> {
        let request = self.http.get(self.url("products"));
        self.execute("list_products", request).await
    }

    /// `PUT /products`; the target id travels in the body.
    pub async fn update_product(&self, product: &ProductDto) -> Result<ApiResponse<ProductDto>> {
        let request = self.http.put(self.url("products")).json(product);
        self.execute("update_product", request).await
    }

    /// `DELETE /products/{id}`
    pub async fn delete_product(&self, id: i64) -> Result<ApiResponse<serde_json::Value>> {
        let request = self.http.delete(self.url(&format!("products/{}", id)));
        self.execute("delete_product", request).await
    }

    /// `GET /categories/{id}`
    pub async fn get_category(&self, id: i64) -> Result<ApiResponse<CategoryDto>> {
        let request = self.http.get(self.url(&format!("categories/{}", id)));
        self.execute("get_category", request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<ApiResponse<T>> {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(operation, e))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(operation, e))?;

        tracing::debug!(
            operation,
            status,
            body = %String::from_utf8_lossy(&bytes),
            "api response"
        );
        Ok(decode(status, &bytes))
    }

    fn transport_error(&self, operation: &str, e: reqwest::Error) -> HarnessError {
        if e.is_timeout() {
            HarnessError::Timeout {
                operation: operation.to_string(),
                limit_ms: self.timeout.as_millis() as u64,
            }
        } else {
            HarnessError::Transport(format!("{} failed: {}", operation, e))
        }
    }
}
