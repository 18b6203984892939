//! ERP Gateway
//!
//! Thin abstraction over the ERP's HTTP API. Carries no business logic: it
//! composes URLs, attaches the API key, and decodes JSON. Transport failures,
//! non-2xx statuses and malformed bodies all collapse to an empty array —
//! callers treat "empty" as "no data this call", never as a hard error.

pub mod mock;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::core::config::ErpConfig;
use shared::erp::{self, ErpDirectory};

/// Request timeout toward the ERP
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    Get,
    Post,
}

impl std::fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiMethod::Get => write!(f, "GET"),
            ApiMethod::Post => write!(f, "POST"),
        }
    }
}

/// A file fetched from the ERP's cache host.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Remote request/response contract toward the ERP.
///
/// Object-safe so the sync tasks can run against a scripted double in tests.
#[async_trait]
pub trait ErpGateway: Send + Sync {
    /// Call an API endpoint. Returns the decoded JSON value, or an empty
    /// array when the call yielded no usable data.
    async fn call(&self, method: ApiMethod, endpoint: &str, params: &[(String, String)]) -> Value;

    /// Public download path of a remote file by name.
    fn file_url(&self, name: &str) -> String;

    /// Fetch a remote file by name. `None` on any failure.
    async fn fetch_file(&self, name: &str) -> Option<RemoteFile>;
}

/// The empty-result sentinel every failure path collapses to.
pub fn empty_result() -> Value {
    Value::Array(Vec::new())
}

/// Live HTTP gateway over `reqwest`.
pub struct HttpErpGateway {
    client: reqwest::Client,
    config: ErpConfig,
}

impl HttpErpGateway {
    pub fn new(config: ErpConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/v{}/{}",
            self.config.host.trim_end_matches('/'),
            self.config.version,
            endpoint
        )
    }
}

#[async_trait]
impl ErpGateway for HttpErpGateway {
    async fn call(&self, method: ApiMethod, endpoint: &str, params: &[(String, String)]) -> Value {
        let url = self.endpoint_url(endpoint);

        let request = match method {
            ApiMethod::Get => {
                let mut query = params.to_vec();
                query.push(("apikey".to_string(), self.config.api_key.clone()));
                self.client.get(&url).query(&query)
            }
            ApiMethod::Post => self
                .client
                .post(&url)
                .query(&[("apikey", self.config.api_key.as_str())])
                .form(params),
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "ERP request failed");
                return empty_result();
            }
        };

        if !response.status().is_success() {
            tracing::warn!(
                endpoint = %endpoint,
                status = %response.status(),
                "ERP returned non-success status"
            );
            return empty_result();
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "Failed to read ERP response body");
                return empty_result();
            }
        };

        if body.trim().is_empty() {
            return empty_result();
        }

        match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "Malformed ERP response body");
                empty_result()
            }
        }
    }

    fn file_url(&self, name: &str) -> String {
        let base = self.config.cache_host.trim_end_matches('/');
        if let Ok(mut url) = reqwest::Url::parse(base) {
            // Url path segments take care of percent-encoding the file name
            if let Ok(mut segments) = url.path_segments_mut() {
                segments
                    .push("tradeMasterImages")
                    .push(&self.config.cache_folder)
                    .push(name.trim());
            }
            url.to_string()
        } else {
            format!(
                "{}/tradeMasterImages/{}/{}",
                base,
                self.config.cache_folder,
                name.trim()
            )
        }
    }

    async fn fetch_file(&self, name: &str) -> Option<RemoteFile> {
        let url = self.file_url(name);
        let response = match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::warn!(url = %url, status = %response.status(), "File fetch returned non-success status");
                return None;
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "File fetch failed");
                return None;
            }
        };

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        match response.bytes().await {
            Ok(bytes) => Some(RemoteFile {
                bytes: bytes.to_vec(),
                content_type,
            }),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Failed to read file body");
                None
            }
        }
    }
}

/// Pull the ERP's configuration reference lists (storages, legal entities,
/// accounts, contractors, schemes, operators) in one sweep.
pub async fn load_directory(gateway: &dyn ErpGateway) -> ErpDirectory {
    let no_params: &[(String, String)] = &[];
    ErpDirectory {
        schemes: erp::pluck(
            &gateway.call(ApiMethod::Get, "object/getScheme", no_params).await,
            "idShema",
            "shema",
        ),
        storages: erp::pluck(
            &gateway.call(ApiMethod::Get, "object/getStorage", no_params).await,
            "idSklad",
            "nameSklad",
        ),
        accounts: erp::pluck(
            &gateway.call(ApiMethod::Get, "object/moneyOwn", no_params).await,
            "idDenSred",
            "naimenovanie",
        ),
        legal_entities: erp::pluck(
            &gateway.call(ApiMethod::Get, "object/legalsOwn", no_params).await,
            "idUrllico",
            "name",
        ),
        contractors: erp::pluck(
            &gateway.call(ApiMethod::Get, "object/legalsKontr", no_params).await,
            "idUrllico",
            "name",
        ),
        operators: erp::pluck(
            &gateway.call(ApiMethod::Get, "object/getLogin", no_params).await,
            "id",
            "login",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ErpConfig;

    fn test_config() -> ErpConfig {
        ErpConfig {
            host: "https://erp.example.com/".to_string(),
            version: "2".to_string(),
            api_key: "secret".to_string(),
            currency: "RUB".to_string(),
            cache_host: "https://cache.example.com".to_string(),
            cache_folder: "shop42".to_string(),
        }
    }

    #[test]
    fn test_endpoint_url_composition() {
        let gateway = HttpErpGateway::new(test_config()).unwrap();
        assert_eq!(
            gateway.endpoint_url("catalog/list"),
            "https://erp.example.com/v2/catalog/list"
        );
    }

    #[test]
    fn test_file_url_encodes_name() {
        let gateway = HttpErpGateway::new(test_config()).unwrap();
        assert_eq!(
            gateway.file_url(" box photo.jpg"),
            "https://cache.example.com/tradeMasterImages/shop42/box%20photo.jpg"
        );
    }

    #[tokio::test]
    async fn test_load_directory_plucks_reference_lists() {
        use crate::gateway::mock::MockGateway;
        use serde_json::json;

        let gateway = MockGateway::new();
        gateway.stub(
            "object/getStorage",
            json!([{"idSklad": "1", "nameSklad": "Main"}]),
        );
        gateway.stub(
            "object/getScheme",
            json!([{"idShema": 3, "shema": "Retail"}]),
        );
        gateway.stub("object/getLogin", json!([{"id": "7", "login": "site"}]));

        let directory = load_directory(&gateway).await;
        assert_eq!(directory.storages["1"], "Main");
        assert_eq!(directory.schemes["3"], "Retail");
        assert_eq!(directory.operators["7"], "site");
        // Endpoints that returned nothing yield empty lists, not errors
        assert!(directory.legal_entities.is_empty());
        assert!(directory.accounts.is_empty());
        assert!(directory.contractors.is_empty());
    }
}
