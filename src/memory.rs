//! Lesson Memory
//!
//! Successful tool invocations taught in training mode are stored in a
//! ChromaDB collection as `(user_request, tool_call_json)` pairs, keyed by the
//! embedding of the request. At request time the nearest lessons are pulled
//! back and shown to the model as worked examples.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

const COLLECTIONS_PATH: &str = "/api/v2/tenants/default_tenant/databases/default_database/collections";

const META_USER_REQUEST: &str = "user_request";
const META_TOOL_CALL_JSON: &str = "tool_call_json";

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} failed ({status}): {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Invalid ChromaDB URL '{0}'")]
    InvalidUrl(String),

    #[error("Could not decode {operation} response: {reason}. Body: {body}")]
    Decode {
        operation: &'static str,
        reason: String,
        body: String,
    },
}

/// A taught request and the tool call that answered it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub user_request: String,
    pub tool_call_json: String,
}

impl Lesson {
    pub fn new(user_request: impl Into<String>, tool_call_json: impl Into<String>) -> Self {
        Self {
            user_request: user_request.into(),
            tool_call_json: tool_call_json.into(),
        }
    }

    /// Pretty JSON for display, falling back to the raw text
    pub fn pretty_tool_call(&self) -> String {
        serde_json::from_str::<Value>(&self.tool_call_json)
            .ok()
            .and_then(|v| serde_json::to_string_pretty(&v).ok())
            .unwrap_or_else(|| self.tool_call_json.clone())
    }

    fn from_metadata(meta: &HashMap<String, Value>) -> Option<Self> {
        let user_request = meta.get(META_USER_REQUEST)?.as_str()?;
        let tool_call_json = meta.get(META_TOOL_CALL_JSON)?.as_str()?;
        Some(Self::new(user_request, tool_call_json))
    }
}

/// A lesson returned from a similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredLesson {
    pub lesson: Lesson,
    /// Lower is closer
    pub distance: f64,
}

/// Storage seam for lessons
#[async_trait]
pub trait LessonStore: Send + Sync {
    async fn add(&self, id: &str, embedding: &[f32], lesson: &Lesson) -> Result<(), MemoryError>;

    /// Nearest `n` lessons to `embedding`
    async fn query(&self, embedding: &[f32], n: usize) -> Result<Vec<ScoredLesson>, MemoryError>;

    async fn all(&self) -> Result<Vec<Lesson>, MemoryError>;
}

#[derive(Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Serialize)]
struct AddRequest<'a> {
    ids: Vec<&'a str>,
    embeddings: Vec<&'a [f32]>,
    documents: Vec<&'a str>,
    metadatas: Vec<HashMap<&'static str, &'a str>>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query_embeddings: Vec<&'a [f32]>,
    n_results: usize,
    include: [&'static str; 2],
}

#[derive(Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f64>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<HashMap<String, Value>>>>>,
}

#[derive(Serialize)]
struct GetRequest {
    include: [&'static str; 1],
}

#[derive(Deserialize, Default)]
struct GetResponse {
    #[serde(default)]
    metadatas: Option<Vec<Option<HashMap<String, Value>>>>,
}

/// ChromaDB REST client bound to one collection
pub struct ChromaClient {
    base_url: String,
    collection_name: String,
    collection_id: String,
    client: Client,
}

impl ChromaClient {
    /// Connect and make sure the collection exists
    pub async fn connect(base_url: &str, collection_name: &str) -> Result<Self, MemoryError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let collection_id = ensure_collection(&client, &base_url, collection_name).await?;
        tracing::info!(collection = collection_name, id = %collection_id, "lesson memory ready");

        Ok(Self {
            base_url,
            collection_name: collection_name.into(),
            collection_id,
            client,
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    fn collection_url(&self, action: &str) -> String {
        format!(
            "{}{}/{}/{}",
            self.base_url, COLLECTIONS_PATH, self.collection_id, action
        )
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        operation: &'static str,
        action: &str,
        body: &T,
    ) -> Result<String, MemoryError> {
        let response = self
            .client
            .post(self.collection_url(action))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(MemoryError::Api {
                operation,
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

async fn ensure_collection(client: &Client, base_url: &str, name: &str) -> Result<String, MemoryError> {
    let create_url = format!("{}{}", base_url, COLLECTIONS_PATH);
    let response = client
        .post(&create_url)
        .json(&CreateCollectionRequest { name })
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    match status {
        StatusCode::OK | StatusCode::CREATED => {
            tracing::debug!(collection = name, "collection created or verified");
        }
        StatusCode::CONFLICT => {
            tracing::debug!(collection = name, "collection already exists");
        }
        _ if body.contains("already exists") => {
            tracing::debug!(collection = name, status = %status, "collection already exists (reported as error)");
        }
        _ => {
            return Err(MemoryError::Api {
                operation: "create collection",
                status: status.as_u16(),
                body,
            });
        }
    }

    let response = client.get(collection_lookup_url(base_url, name)?).send().await?;
    let status = response.status();
    let body = response.text().await?;

    if status != StatusCode::OK {
        return Err(MemoryError::Api {
            operation: "get collection",
            status: status.as_u16(),
            body,
        });
    }

    let info: CollectionInfo = serde_json::from_str(&body).map_err(|e| MemoryError::Decode {
        operation: "get collection",
        reason: e.to_string(),
        body,
    })?;
    Ok(info.id)
}

/// `.../collections/{name}` with the name as a single encoded segment
fn collection_lookup_url(base_url: &str, name: &str) -> Result<Url, MemoryError> {
    let mut url = Url::parse(base_url).map_err(|_| MemoryError::InvalidUrl(base_url.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| MemoryError::InvalidUrl(base_url.to_string()))?
        .pop_if_empty()
        .extend(COLLECTIONS_PATH.split('/').filter(|s| !s.is_empty()))
        .push(name);
    Ok(url)
}

fn decode<T: for<'de> Deserialize<'de>>(operation: &'static str, body: String) -> Result<T, MemoryError> {
    serde_json::from_str(&body).map_err(|e| MemoryError::Decode {
        operation,
        reason: e.to_string(),
        body,
    })
}

#[async_trait]
impl LessonStore for ChromaClient {
    async fn add(&self, id: &str, embedding: &[f32], lesson: &Lesson) -> Result<(), MemoryError> {
        let mut metadata = HashMap::new();
        metadata.insert(META_USER_REQUEST, lesson.user_request.as_str());
        metadata.insert(META_TOOL_CALL_JSON, lesson.tool_call_json.as_str());

        let request = AddRequest {
            ids: vec![id],
            embeddings: vec![embedding],
            documents: vec![&lesson.user_request],
            metadatas: vec![metadata],
        };

        self.post_json("add lesson", "add", &request).await?;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], n: usize) -> Result<Vec<ScoredLesson>, MemoryError> {
        let request = QueryRequest {
            query_embeddings: vec![embedding],
            n_results: n,
            include: ["metadatas", "distances"],
        };

        let body = self.post_json("query lessons", "query", &request).await?;
        let parsed: QueryResponse = decode("query lessons", body)?;

        let metadatas = parsed
            .metadatas
            .and_then(|m| m.into_iter().next())
            .unwrap_or_default();
        let distances = parsed
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();

        Ok(metadatas
            .iter()
            .enumerate()
            .filter_map(|(i, meta)| {
                let lesson = Lesson::from_metadata(meta.as_ref()?)?;
                let distance = distances.get(i).copied().flatten().unwrap_or(f64::MAX);
                Some(ScoredLesson { lesson, distance })
            })
            .collect())
    }

    async fn all(&self) -> Result<Vec<Lesson>, MemoryError> {
        let request = GetRequest {
            include: ["metadatas"],
        };

        let body = self.post_json("list lessons", "get", &request).await?;
        let parsed: GetResponse = decode("list lessons", body)?;

        Ok(parsed
            .metadatas
            .unwrap_or_default()
            .iter()
            .filter_map(|meta| Lesson::from_metadata(meta.as_ref()?))
            .collect())
    }
}
