//! IPFS pinning gateways (Pinata, Filebase)
//!
//! Both services take a multipart upload and answer with the CID of the
//! pinned content; reads go through the provider's public gateway at
//! `{gateway}/ipfs/{cid}`.

use async_trait::async_trait;
use cloudstore_core::BlobHandle;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::blob::{BlobStore, StorageError};

#[derive(Debug, Deserialize)]
struct PinataPinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

#[derive(Debug, Deserialize)]
struct FilebaseUploadResponse {
    cid: String,
}

/// Pinata `pinFileToIPFS` client
pub struct PinataStore {
    client: Client,
    endpoint: String,
    gateway: String,
    api_key: SecretString,
    api_secret: SecretString,
}

impl PinataStore {
    pub const NAME: &'static str = "pinata";

    pub fn new(
        client: Client,
        endpoint: &str,
        gateway: &str,
        api_key: SecretString,
        api_secret: SecretString,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            gateway: gateway.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
        }
    }

    fn pin_url(&self) -> String {
        format!("{}/pinning/pinFileToIPFS", self.endpoint)
    }

    fn auth_url(&self) -> String {
        format!("{}/data/testAuthentication", self.endpoint)
    }
}

#[async_trait]
impl BlobStore for PinataStore {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn upload(&self, bytes: &[u8], file_name: &str) -> Result<BlobHandle, StorageError> {
        let metadata = serde_json::json!({ "name": file_name }).to_string();
        let form = Form::new()
            .part(
                "file",
                Part::bytes(bytes.to_vec()).file_name(file_name.to_string()),
            )
            .text("pinataMetadata", metadata);

        debug!(url = %self.pin_url(), size = bytes.len(), "pinning to Pinata");
        let response = self
            .client
            .post(self.pin_url())
            .header("pinata_api_key", self.api_key.expose_secret())
            .header("pinata_secret_api_key", self.api_secret.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|source| http_error(Self::NAME, source))?;

        let body = success_body(Self::NAME, response).await?;
        let hash = parse_pinata_response(&body)?;
        info!(%hash, "pinned to Pinata");

        Ok(BlobHandle {
            url: gateway_url(&self.gateway, &hash),
            hash,
            provider: Self::NAME.into(),
        })
    }

    async fn fetch(&self, hash: &str) -> Result<Vec<u8>, StorageError> {
        fetch_from_gateway(&self.client, Self::NAME, &self.gateway, hash).await
    }

    /// Checks the API keys, not just reachability.
    async fn health(&self) -> Result<(), StorageError> {
        let response = self
            .client
            .get(self.auth_url())
            .header("pinata_api_key", self.api_key.expose_secret())
            .header("pinata_secret_api_key", self.api_secret.expose_secret())
            .send()
            .await
            .map_err(|source| http_error(Self::NAME, source))?;
        success_body(Self::NAME, response).await.map(|_| ())
    }
}

/// Filebase IPFS upload client
pub struct FilebaseStore {
    client: Client,
    endpoint: String,
    gateway: String,
    api_key: SecretString,
}

impl FilebaseStore {
    pub const NAME: &'static str = "filebase";

    pub fn new(client: Client, endpoint: &str, gateway: &str, api_key: SecretString) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            gateway: gateway.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn upload_url(&self) -> String {
        format!("{}/ipfs/upload", self.endpoint)
    }
}

#[async_trait]
impl BlobStore for FilebaseStore {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn upload(&self, bytes: &[u8], file_name: &str) -> Result<BlobHandle, StorageError> {
        let form = Form::new().part(
            "file",
            Part::bytes(bytes.to_vec()).file_name(file_name.to_string()),
        );

        debug!(url = %self.upload_url(), size = bytes.len(), "uploading to Filebase");
        let response = self
            .client
            .post(self.upload_url())
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|source| http_error(Self::NAME, source))?;

        let body = success_body(Self::NAME, response).await?;
        let hash = parse_filebase_response(&body)?;
        info!(%hash, "uploaded to Filebase");

        Ok(BlobHandle {
            url: gateway_url(&self.gateway, &hash),
            hash,
            provider: Self::NAME.into(),
        })
    }

    async fn fetch(&self, hash: &str) -> Result<Vec<u8>, StorageError> {
        fetch_from_gateway(&self.client, Self::NAME, &self.gateway, hash).await
    }

    /// Gateway reachability only; Filebase has no key-check endpoint.
    async fn health(&self) -> Result<(), StorageError> {
        let response = self
            .client
            .head(&self.gateway)
            .send()
            .await
            .map_err(|source| http_error(Self::NAME, source))?;
        if response.status().is_server_error() {
            return Err(StorageError::Status {
                provider: Self::NAME.into(),
                status: response.status(),
                body: String::new(),
            });
        }
        Ok(())
    }
}

fn http_error(provider: &str, source: reqwest::Error) -> StorageError {
    StorageError::Http {
        provider: provider.into(),
        source,
    }
}

pub(crate) fn gateway_url(gateway: &str, hash: &str) -> String {
    format!("{}/ipfs/{}", gateway.trim_end_matches('/'), hash)
}

async fn success_body(provider: &str, response: Response) -> Result<String, StorageError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| http_error(provider, source))?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(StorageError::Status {
            provider: provider.into(),
            status,
            body,
        })
    }
}

async fn fetch_from_gateway(
    client: &Client,
    provider: &str,
    gateway: &str,
    hash: &str,
) -> Result<Vec<u8>, StorageError> {
    let url = gateway_url(gateway, hash);
    debug!(%url, "fetching from gateway");
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|source| http_error(provider, source))?;

    if response.status() == StatusCode::NOT_FOUND {
        return Err(StorageError::NotFound(hash.into()));
    }
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(StorageError::Status {
            provider: provider.into(),
            status,
            body,
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|source| http_error(provider, source))?;
    Ok(bytes.to_vec())
}

fn parse_pinata_response(body: &str) -> Result<String, StorageError> {
    let parsed: PinataPinResponse =
        serde_json::from_str(body).map_err(|e| StorageError::Response {
            provider: PinataStore::NAME.into(),
            message: format!("{e}: {body}"),
        })?;
    non_empty_hash(PinataStore::NAME, parsed.ipfs_hash)
}

fn parse_filebase_response(body: &str) -> Result<String, StorageError> {
    let parsed: FilebaseUploadResponse =
        serde_json::from_str(body).map_err(|e| StorageError::Response {
            provider: FilebaseStore::NAME.into(),
            message: format!("{e}: {body}"),
        })?;
    non_empty_hash(FilebaseStore::NAME, parsed.cid)
}

fn non_empty_hash(provider: &str, hash: String) -> Result<String, StorageError> {
    if hash.trim().is_empty() {
        return Err(StorageError::Response {
            provider: provider.into(),
            message: "empty content hash".into(),
        });
    }
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pinata_response() {
        let body = r#"{"IpfsHash":"QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG","PinSize":1234,"Timestamp":"2025-01-01T00:00:00Z"}"#;
        assert_eq!(
            parse_pinata_response(body).unwrap(),
            "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG"
        );
    }

    #[test]
    fn test_parse_pinata_error_body() {
        let err = parse_pinata_response(r#"{"error":"Invalid authentication"}"#).unwrap_err();
        assert!(matches!(err, StorageError::Response { .. }));
        assert!(err.to_string().contains("pinata"));
    }

    #[test]
    fn test_parse_filebase_response() {
        assert_eq!(
            parse_filebase_response(r#"{"cid":"bafybeigdyrzt"}"#).unwrap(),
            "bafybeigdyrzt"
        );
        assert!(parse_filebase_response(r#"{"cid":""}"#).is_err());
    }

    #[test]
    fn test_gateway_url() {
        assert_eq!(
            gateway_url("https://gateway.pinata.cloud/", "QmHash"),
            "https://gateway.pinata.cloud/ipfs/QmHash"
        );
    }

    #[test]
    fn test_endpoints_trimmed() {
        let store = PinataStore::new(
            Client::new(),
            "https://api.pinata.cloud/",
            "https://gateway.pinata.cloud",
            SecretString::from("k".to_string()),
            SecretString::from("s".to_string()),
        );
        assert_eq!(store.pin_url(), "https://api.pinata.cloud/pinning/pinFileToIPFS");
        assert_eq!(store.auth_url(), "https://api.pinata.cloud/data/testAuthentication");

        let store = FilebaseStore::new(
            Client::new(),
            "https://api.filebase.io/v1/",
            "https://ipfs.filebase.io",
            SecretString::from("k".to_string()),
        );
        assert_eq!(store.upload_url(), "https://api.filebase.io/v1/ipfs/upload");
    }
}
