use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;

use super::{validate_key, ObjectInfo, ObjectStore, ObjectStoreError};

const API_BASE: &str = "https://storage.googleapis.com/storage/v1/b/";
const UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1/b/";

/// Access tokens live for an hour; refresh well before that.
const TOKEN_REFRESH_AFTER_MINUTES: i64 = 45;

/// Google Cloud Storage object store backend.
pub struct GcsStore {
    bucket: String,
    client: Client,
    access_token: tokio::sync::RwLock<CachedToken>,
    credentials_file: Option<String>,
}

struct CachedToken {
    value: String,
    fetched_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ListItem {
    name: String,
    #[serde(default)]
    size: Option<String>,
    updated: DateTime<Utc>,
}

impl GcsStore {
    pub async fn new(bucket: &str, credentials_file: Option<&str>) -> Result<Self, anyhow::Error> {
        let client = Client::builder().build()?;

        let store = Self {
            bucket: bucket.to_string(),
            client,
            access_token: tokio::sync::RwLock::new(CachedToken {
                value: String::new(),
                fetched_at: DateTime::<Utc>::MIN_UTC,
            }),
            credentials_file: credentials_file.map(|s| s.to_string()),
        };

        store.refresh_token().await?;
        Ok(store)
    }

    async fn refresh_token(&self) -> Result<String, anyhow::Error> {
        let token = if let Some(ref creds_path) = self.credentials_file {
            self.token_from_service_account(creds_path).await?
        } else {
            self.token_from_metadata_server().await?
        };

        let mut lock = self.access_token.write().await;
        *lock = CachedToken {
            value: token.clone(),
            fetched_at: Utc::now(),
        };
        Ok(token)
    }

    /// Current bearer token, refreshed first if it is close to expiry.
    async fn token(&self) -> Result<String, ObjectStoreError> {
        {
            let cached = self.access_token.read().await;
            if Utc::now() - cached.fetched_at < Duration::minutes(TOKEN_REFRESH_AFTER_MINUTES) {
                return Ok(cached.value.clone());
            }
        }

        tracing::debug!(bucket = %self.bucket, "Refreshing GCS access token");
        self.refresh_token()
            .await
            .map_err(|e| ObjectStoreError::Backend(format!("GCS token refresh failed: {e}")))
    }

    async fn token_from_service_account(&self, path: &str) -> Result<String, anyhow::Error> {
        let key_json = tokio::fs::read_to_string(path).await?;
        let key: ServiceAccountKey = serde_json::from_str(&key_json)?;

        let now = Utc::now().timestamp();
        let claims = serde_json::json!({
            "iss": key.client_email,
            "scope": "https://www.googleapis.com/auth/devstorage.read_write",
            "aud": key.token_uri,
            "iat": now,
            "exp": now + 3600,
        });

        let header = URL_SAFE_NO_PAD.encode(&serde_json::to_vec(&serde_json::json!({
            "alg": "RS256",
            "typ": "JWT"
        }))?);
        let payload = URL_SAFE_NO_PAD.encode(&serde_json::to_vec(&claims)?);
        let unsigned = format!("{header}.{payload}");

        let signature = sign_rs256(unsigned.as_bytes(), &key.private_key)?;
        let jwt = format!("{unsigned}.{}", URL_SAFE_NO_PAD.encode(&signature));

        let resp: TokenResponse = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp.access_token)
    }

    async fn token_from_metadata_server(&self) -> Result<String, anyhow::Error> {
        let resp: TokenResponse = self
            .client
            .get("http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token")
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp.access_token)
    }

    /// `.../b/<bucket>/o[/<key>]` with every segment percent-encoded
    /// (object names keep their `/` as `%2F`).
    fn endpoint(&self, base: &str, key: Option<&str>) -> Result<Url, ObjectStoreError> {
        let mut url =
            Url::parse(base).map_err(|e| ObjectStoreError::Backend(format!("Bad GCS URL: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ObjectStoreError::Backend("GCS URL cannot be a base".to_string()))?;
            segments.pop_if_empty().push(&self.bucket).push("o");
            if let Some(key) = key {
                segments.push(key);
            }
        }
        Ok(url)
    }

    fn upload_url(&self, key: &str) -> Result<Url, ObjectStoreError> {
        let mut url = self.endpoint(UPLOAD_BASE, None)?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);
        Ok(url)
    }

    fn object_url(&self, key: &str) -> Result<Url, ObjectStoreError> {
        let mut url = self.endpoint(API_BASE, Some(key))?;
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    fn metadata_url(&self, key: &str) -> Result<Url, ObjectStoreError> {
        self.endpoint(API_BASE, Some(key))
    }

    fn list_url(&self, prefix: &str, page_token: Option<&str>) -> Result<Url, ObjectStoreError> {
        let mut url = self.endpoint(API_BASE, None)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("prefix", prefix)
                .append_pair("delimiter", "/")
                .append_pair("fields", "items(name,size,updated),nextPageToken");
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    /// Attach a fresh bearer token and send.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ObjectStoreError> {
        let token = self.token().await?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        validate_key(key)?;
        let request = self
            .client
            .post(self.upload_url(key)?)
            .header("Content-Type", "application/octet-stream")
            .body(data);

        check_status(self.send(request).await?, "upload").await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        validate_key(key)?;
        let resp = self.send(self.client.get(self.object_url(key)?)).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }

        check_status(resp, "download")
            .await?
            .bytes()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        validate_key(key)?;
        let resp = self.send(self.client.delete(self.metadata_url(key)?)).await?;

        // Already gone
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(resp, "delete").await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        validate_key(key)?;
        let resp = self.send(self.client.get(self.metadata_url(key)?)).await?;
        presence(resp).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, ObjectStoreError> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let url = self.list_url(prefix, page_token.as_deref())?;
            let resp = check_status(self.send(self.client.get(url)).await?, "list").await?;
            let page: ListResponse = resp
                .json()
                .await
                .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

            objects.extend(page.items.into_iter().map(|item| ObjectInfo {
                size: item.size.and_then(|s| s.parse().ok()).unwrap_or(0),
                key: item.name,
                last_modified: item.updated,
            }));

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(objects)
    }
}

/// Pass successful responses through; anything else becomes a backend error
/// carrying the response body.
async fn check_status(resp: Response, action: &str) -> Result<Response, ObjectStoreError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(ObjectStoreError::Backend(format!(
        "GCS {action} failed ({status}): {body}"
    )))
}

/// Only a 404 means absent; auth and server failures are errors.
async fn presence(resp: Response) -> Result<bool, ObjectStoreError> {
    if resp.status() == StatusCode::NOT_FOUND {
        return Ok(false);
    }
    check_status(resp, "stat").await.map(|_| true)
}

fn sign_rs256(data: &[u8], private_key_pem: &str) -> Result<Vec<u8>, anyhow::Error> {
    // Strip PEM armour and decode the PKCS#8 body
    let der_b64: String = private_key_pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    let der = STANDARD.decode(der_b64)?;

    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(&der)
        .map_err(|e| anyhow::anyhow!("Failed to parse RSA key: {e}"))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            data,
            &mut signature,
        )
        .map_err(|e| anyhow::anyhow!("Failed to sign: {e}"))?;

    Ok(signature)
}
