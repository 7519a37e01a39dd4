//! Gateway backed by the platform's signed JSON API.
//!
//! Every request carries an `authorization` header of the form
//! `APPFORGE-HMAC-SHA256 Credential=<access_key>, Signature=<base64>` where
//! the signature is HMAC-SHA256 (keyed by the secret key) over
//!
//! ```text
//! METHOD \n PATH \n DATE \n REGION \n hex(sha256(body))
//! ```

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{
    CloudGateway, FunctionSpec, GatewayError, GatewayFactory, RoleHandle, StoreSchema,
    ROLE_POLICIES,
};
use crate::credentials::Credentials;
use crate::types::StoreKind;

type HmacSha256 = Hmac<Sha256>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const SIGNATURE_SCHEME: &str = "APPFORGE-HMAC-SHA256";

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpGatewayFactory {
    endpoint: String,
}

impl HttpGatewayFactory {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl GatewayFactory for HttpGatewayFactory {
    fn open(&self, credentials: &Credentials) -> Result<Arc<dyn CloudGateway>, GatewayError> {
        Ok(Arc::new(HttpGateway::new(&self.endpoint, credentials.clone())?))
    }
}

// ---------------------------------------------------------------------------
// HttpGateway
// ---------------------------------------------------------------------------

pub struct HttpGateway {
    client: Client,
    base: String,
    credentials: Credentials,
}

#[derive(Deserialize)]
struct RoleResponse {
    handle: String,
}

#[derive(Deserialize)]
struct EntryPointResponse {
    url: String,
}

impl HttpGateway {
    pub fn new(endpoint: &str, credentials: Credentials) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base: endpoint.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn sign(
        &self,
        method: &Method,
        path: &str,
        date: &str,
        body: &[u8],
    ) -> Result<String, GatewayError> {
        let body_hash = format!("{:x}", Sha256::digest(body));
        let canonical = format!(
            "{}\n{}\n{}\n{}\n{}",
            method.as_str(),
            path,
            date,
            self.credentials.region,
            body_hash
        );
        let mut mac = HmacSha256::new_from_slice(self.credentials.secret_key.as_bytes())
            .map_err(|e| GatewayError::Unauthorized(e.to_string()))?;
        mac.update(canonical.as_bytes());
        let signature =
            base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        Ok(format!(
            "{SIGNATURE_SCHEME} Credential={}, Signature={signature}",
            self.credentials.access_key
        ))
    }

    fn send(
        &self,
        method: Method,
        path: &str,
        body: &serde_json::Value,
        resource: &str,
    ) -> Result<Response, GatewayError> {
        let body = serde_json::to_vec(body).map_err(|e| GatewayError::Transport(e.to_string()))?;
        let date = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let authorization = self.sign(&method, path, &date, &body)?;

        debug!(method = %method, path, "gateway request");
        let resp = self
            .client
            .request(method, format!("{}{}", self.base, path))
            .header(CONTENT_TYPE, "application/json")
            .header("x-appforge-region", &self.credentials.region)
            .header("x-appforge-date", &date)
            .header("authorization", authorization)
            .body(body)
            .send()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        check_status(resp, resource)
    }
}

/// Map non-success statuses onto gateway errors.
fn check_status(resp: Response, resource: &str) -> Result<Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().unwrap_or_default();
    Err(match status {
        StatusCode::CONFLICT => GatewayError::AlreadyExists(resource.to_string()),
        StatusCode::NOT_FOUND => GatewayError::NotFound(resource.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized(message),
        _ => GatewayError::Remote {
            status: status.as_u16(),
            message,
        },
    })
}

fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, GatewayError> {
    resp.json::<T>()
        .map_err(|e| GatewayError::Transport(format!("malformed response: {e}")))
}

impl CloudGateway for HttpGateway {
    fn ensure_role(&self, name: &str) -> Result<RoleHandle, GatewayError> {
        let resp = self.send(
            Method::PUT,
            &format!("/v1/roles/{name}"),
            &json!({ "policies": ROLE_POLICIES }),
            name,
        )?;
        let role: RoleResponse = decode(resp)?;
        Ok(RoleHandle(role.handle))
    }

    fn create_function(&self, spec: &FunctionSpec<'_>) -> Result<(), GatewayError> {
        let body = json!({
            "name": spec.name,
            "description": spec.description,
            "runtime": spec.runtime,
            "role": spec.role,
            "handler": spec.handler,
            "archive": base64::engine::general_purpose::STANDARD.encode(spec.archive),
        });
        self.send(Method::POST, "/v1/functions", &body, spec.name)?;
        Ok(())
    }

    fn update_function_code(&self, name: &str, archive: &[u8]) -> Result<(), GatewayError> {
        let body = json!({
            "archive": base64::engine::general_purpose::STANDARD.encode(archive),
        });
        self.send(
            Method::PUT,
            &format!("/v1/functions/{name}/code"),
            &body,
            name,
        )?;
        Ok(())
    }

    fn connect_entry_point(
        &self,
        api_name: &str,
        function_name: &str,
    ) -> Result<String, GatewayError> {
        let resp = self.send(
            Method::PUT,
            &format!("/v1/apis/{api_name}"),
            &json!({ "function": function_name }),
            api_name,
        )?;
        let entry: EntryPointResponse = decode(resp)?;
        Ok(entry.url)
    }

    fn init_backing_store(
        &self,
        kind: StoreKind,
        name: &str,
        schema: &StoreSchema,
    ) -> Result<(), GatewayError> {
        let body =
            serde_json::to_value(schema).map_err(|e| GatewayError::Transport(e.to_string()))?;
        match self.send(Method::PUT, &format!("/v1/stores/{kind}/{name}"), &body, name) {
            Ok(_) | Err(GatewayError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
