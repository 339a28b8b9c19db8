use crate::{config::ObjectStoreConfig, errors::AppError};
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use log::info;

/// S3 (or S3-compatible) bucket used when local disk is not durable enough.
#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
    key_prefix: String,
    cdn_base_url: Option<String>,
}

impl ObjectStore {
    /// Builds the client from static credentials. No network I/O happens here.
    pub fn new(config: &ObjectStoreConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "journal-platform-config",
        );
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint.clone()).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
            key_prefix: config.key_prefix.clone(),
            cdn_base_url: config.cdn_base_url.clone(),
        }
    }

    pub fn key_for(&self, filename: &str) -> String {
        if self.key_prefix.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", self.key_prefix, filename)
        }
    }

    /// Public URL for an object key, CDN-fronted when a CDN base is configured.
    pub fn url_for(&self, key: &str) -> String {
        if let Some(cdn) = &self.cdn_base_url {
            return format!("{}/{}", cdn, key);
        }
        match &self.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.bucket,
                key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }

    pub async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String, AppError> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                AppError::StorageUnavailable(format!(
                    "object store put s3://{}/{} failed: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;
        info!("Stored {} bytes at s3://{}/{}", size, self.bucket, key);
        Ok(self.url_for(key))
    }

    /// Keys under the configured prefix, for maintenance listings.
    pub async fn list(&self) -> Result<Vec<String>, AppError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(self.key_for(""))
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    AppError::StorageUnavailable(format!(
                        "object store list s3://{}/{} failed: {}",
                        self.bucket,
                        self.key_prefix,
                        DisplayErrorContext(&e)
                    ))
                })?;
            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );
            match output.next_continuation_token() {
                Some(token) if output.is_truncated() == Some(true) => {
                    continuation = Some(token.to_string())
                }
                _ => break,
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ObjectStoreConfig {
        ObjectStoreConfig {
            bucket: "journals".to_string(),
            region: "eu-west-1".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            endpoint: None,
            key_prefix: "uploads".to_string(),
            cdn_base_url: None,
        }
    }

    #[test]
    fn bucket_urls_use_virtual_host_style() {
        let store = ObjectStore::new(&config());
        let key = store.key_for("a.pdf");
        assert_eq!(key, "uploads/a.pdf");
        assert_eq!(
            store.url_for(&key),
            "https://journals.s3.eu-west-1.amazonaws.com/uploads/a.pdf"
        );
    }

    #[test]
    fn cdn_base_takes_precedence() {
        let store = ObjectStore::new(&ObjectStoreConfig {
            cdn_base_url: Some("https://cdn.example.org".to_string()),
            ..config()
        });
        assert_eq!(
            store.url_for("uploads/a.pdf"),
            "https://cdn.example.org/uploads/a.pdf"
        );
    }

    #[test]
    fn custom_endpoint_uses_path_style() {
        let store = ObjectStore::new(&ObjectStoreConfig {
            endpoint: Some("http://localhost:9000/".to_string()),
            key_prefix: String::new(),
            ..config()
        });
        assert_eq!(store.key_for("a.pdf"), "a.pdf");
        assert_eq!(store.url_for("a.pdf"), "http://localhost:9000/journals/a.pdf");
    }
}
