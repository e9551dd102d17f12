//! HTTP client wrapper for interacting with Qdrant.

use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::clock::now_rfc3339;
use crate::qdrant::payload::build_payload;
use crate::qdrant::types::{
    ChunkPoint, CollectionInfo, CollectionInfoResponse, DocumentPayload, QdrantError,
};

/// Payload fields indexed for filtering, with their Qdrant schema.
const PAYLOAD_INDEXES: [(&str, &str); 4] = [
    ("doc_hash", "keyword"),
    ("label", "keyword"),
    ("file_name", "keyword"),
    ("timestamp", "datetime"),
];

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a client for the given base URL.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("docjobs/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Create a collection only when it is missing from Qdrant.
    pub async fn create_collection_if_not_exists(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        if self.collection_exists(collection_name).await? {
            return Ok(());
        }

        tracing::debug!(
            collection = collection_name,
            vector_size,
            "Creating collection"
        );
        self.create_collection(collection_name, vector_size).await
    }

    /// Create a collection with the specified vector size.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection created");
        })
        .await
    }

    /// Drop a collection and all of its points. Missing collections are not an error.
    pub async fn delete_collection(&self, collection_name: &str) -> Result<(), QdrantError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{collection_name}"))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        self.ensure_success(response, || {
            tracing::info!(collection = collection_name, "Collection deleted");
        })
        .await
    }

    /// Upsert the embedded chunks of one document, returning the number of points written.
    pub async fn upsert_chunks(
        &self,
        collection_name: &str,
        document: &DocumentPayload,
        chunks: Vec<ChunkPoint>,
    ) -> Result<usize, QdrantError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let now = now_rfc3339();
        let points: Vec<Value> = chunks
            .into_iter()
            .map(|chunk| {
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "vector": chunk.vector,
                    "payload": build_payload(document, chunk.chunk_index, &chunk.text, &now),
                })
            })
            .collect();

        let point_count = points.len();
        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}/points"))
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                doc_hash = %document.doc_hash,
                points = point_count,
                "Points indexed"
            );
        })
        .await?;

        Ok(point_count)
    }

    /// Ensure payload indexes exist for the fields used in filters.
    pub async fn ensure_payload_indexes(&self, collection_name: &str) -> Result<(), QdrantError> {
        for (field, schema) in PAYLOAD_INDEXES {
            let body = json!({
                "field_name": field,
                "field_schema": schema,
            });

            let response = self
                .request(Method::PUT, &format!("collections/{collection_name}/index"))
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() || status == StatusCode::CONFLICT {
                tracing::debug!(
                    collection = collection_name,
                    field,
                    schema,
                    "Payload index ensured"
                );
            } else {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::warn!(collection = collection_name, field, schema, error = %error, "Failed to ensure payload index");
            }
        }

        Ok(())
    }

    /// Check whether a collection exists.
    pub async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = collection_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    /// Fetch point counts and health of a collection; `None` when it does not exist.
    pub async fn collection_info(
        &self,
        collection_name: &str,
    ) -> Result<Option<CollectionInfo>, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let CollectionInfoResponse { result } = response.json().await?;
                Ok(Some(result))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = collection_name, error = %error, "Collection info request failed");
                Err(error)
            }
        }
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use httpmock::{
        Method::{DELETE, GET, PUT},
        MockServer,
    };

    pub(crate) fn service_for(server: &MockServer) -> QdrantService {
        QdrantService {
            client: Client::builder()
                .user_agent("docjobs-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            api_key: None,
        }
    }

    #[test]
    fn rejects_unparseable_url() {
        let result = QdrantService::new("not a url", None);
        assert!(matches!(result, Err(QdrantError::InvalidUrl(_))));
    }

    #[test]
    fn endpoint_joins_without_duplicate_slashes() {
        assert_eq!(
            format_endpoint("http://localhost:6333/", "/collections/demo"),
            "http://localhost:6333/collections/demo"
        );
    }

    #[tokio::test]
    async fn creates_missing_collection_only_once() {
        let server = MockServer::start_async().await;
        let missing = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/docs");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs")
                    .body_contains("\"size\":8");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;

        service_for(&server)
            .create_collection_if_not_exists("docs", 8)
            .await
            .expect("collection ensured");

        missing.assert();
        create.assert();
    }

    #[tokio::test]
    async fn upsert_sends_chunk_payloads() {
        let server = MockServer::start_async().await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs/points")
                    .query_param("wait", "true")
                    .body_contains("\"doc_hash\":\"hash-1\"")
                    .body_contains("\"chunk_index\":1");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        let document = DocumentPayload {
            doc_hash: "hash-1".into(),
            file_name: "a.md".into(),
            file_path: "general/a.md".into(),
            label: "general".into(),
        };
        let chunks = vec![
            ChunkPoint {
                text: "first".into(),
                chunk_index: 0,
                vector: vec![0.1, 0.2],
            },
            ChunkPoint {
                text: "second".into(),
                chunk_index: 1,
                vector: vec![0.3, 0.4],
            },
        ];

        let written = service_for(&server)
            .upsert_chunks("docs", &document, chunks)
            .await
            .expect("upsert");

        upsert.assert();
        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn reads_collection_info() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/docs");
                then.status(200).json_body(json!({
                    "result": {
                        "status": "green",
                        "points_count": 42,
                        "indexed_vectors_count": 40,
                        "segments_count": 2,
                        "config": { "params": {} }
                    },
                    "status": "ok"
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/absent");
                then.status(404);
            })
            .await;

        let service = service_for(&server);
        let info = service
            .collection_info("docs")
            .await
            .expect("info")
            .expect("collection exists");
        assert_eq!(info.status, "green");
        assert_eq!(info.points_count, Some(42));
        assert_eq!(info.indexed_vectors_count, Some(40));
        assert!(service.collection_info("absent").await.expect("info").is_none());
    }

    #[tokio::test]
    async fn delete_tolerates_missing_collection() {
        let server = MockServer::start_async().await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/docs");
                then.status(404);
            })
            .await;

        service_for(&server)
            .delete_collection("docs")
            .await
            .expect("missing collection is fine");
        delete.assert();
    }

    #[tokio::test]
    async fn surfaces_unexpected_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/docs");
                then.status(500).body("boom");
            })
            .await;

        let error = service_for(&server)
            .collection_exists("docs")
            .await
            .expect_err("server error");
        assert!(matches!(
            error,
            QdrantError::UnexpectedStatus { status, ref body } if status == StatusCode::INTERNAL_SERVER_ERROR && body == "boom"
        ));
    }
}
