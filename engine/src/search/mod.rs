//! Dish-selection orchestrator
//!
//! Each call is independent and stateless: the caller supplies the query,
//! the selection context from the previous turn, and a fresh catalog
//! snapshot. The flow is projection → optional image ingestion → request
//! construction → backend invocation → untrusted parse → catalog
//! verification → selection state machine → constraint filter →
//! reconciliation.
//!
//! Backend failures never escape `search`; they surface as an error reply.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::Restaurant;
use crate::llm::{InferenceBackend, InferenceError, TextStream};

pub mod image;
pub mod projector;
pub mod prompt;
pub mod reconcile;
pub mod selection;
pub mod upload;

pub use image::{ImageDescriptor, ImageError, MAX_IMAGE_BYTES};
pub use projector::{project, SearchRecord};
pub use selection::{Intent, SelectionContext, SelectionEntry};

/// Default cap on selection entries per reply.
pub const DEFAULT_LIMIT: usize = 10;

/// Where the optional query image comes from.
pub enum ImageSource {
    /// An image already on the filesystem
    Path(PathBuf),

    /// An uploaded buffer; staged in a scoped temporary file before
    /// ingestion
    Upload { file_name: String, bytes: Vec<u8> },
}

/// One conversational search turn.
pub struct SearchQuery {
    /// Free-text query; may be empty when an image is supplied
    pub text: String,

    /// Optional image input (always optional; failures degrade to text-only)
    pub image: Option<ImageSource>,

    /// Optional standing preferences/allergies for this caller
    pub preferences: Option<String>,

    /// Cap on selection entries; 0 means [`DEFAULT_LIMIT`]
    pub limit: usize,

    /// Selection context from the previous turn
    pub context: SelectionContext,
}

impl SearchQuery {
    /// A plain text query with defaults for everything else.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
            preferences: None,
            limit: DEFAULT_LIMIT,
            context: SelectionContext::default(),
        }
    }

    fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            DEFAULT_LIMIT
        } else {
            self.limit
        }
    }
}

/// Reply status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    Success,
    Error,
}

/// The orchestrator's reply envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReply {
    pub status: SearchStatus,

    /// The selection set after this turn
    pub results: Vec<SelectionEntry>,

    /// Live restaurants pruned to the selected dishes
    pub restaurants: Vec<Restaurant>,

    /// Updated context to send with the next turn
    pub context: SelectionContext,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SearchReply {
    fn error(message: String, context: SelectionContext) -> Self {
        Self {
            status: SearchStatus::Error,
            results: Vec::new(),
            restaurants: Vec::new(),
            context,
            message: Some(message),
        }
    }
}

/// The conversational search engine.
///
/// Holds only the backend handle; catalog data is an explicit argument on
/// every call, never instance state.
pub struct SearchEngine {
    backend: Arc<dyn InferenceBackend>,
}

impl SearchEngine {
    /// Create a new search engine on top of an inference backend
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }

    /// Run one blocking search turn.
    ///
    /// Never fails: backend and parse errors become an error reply carrying
    /// the unchanged context.
    pub async fn search(&self, query: &SearchQuery, catalog: &[Restaurant]) -> SearchReply {
        match self.run_turn(query, catalog).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("search turn failed: {}", e);
                SearchReply::error(e.to_string(), query.context.clone())
            }
        }
    }

    async fn run_turn(
        &self,
        query: &SearchQuery,
        catalog: &[Restaurant],
    ) -> Result<SearchReply, InferenceError> {
        let limit = query.effective_limit();
        let records = projector::project(catalog);
        let descriptor = prepare_image(query.image.as_ref());

        let request = prompt::build_request(
            &query.text,
            descriptor.as_ref(),
            &query.context,
            query.preferences.as_deref(),
            limit,
            &records,
        );

        let response = self.backend.invoke(&request).await?;
        let mut turn = prompt::parse_extraction(&response.text)?;

        debug!(
            "turn extracted: intent={:?}, category={:?}, rows={}",
            turn.intent,
            turn.category,
            turn.records.len()
        );

        turn.records = selection::verify_records(&turn.records, &records);
        if let Some(preferences) = &query.preferences {
            turn.constraints.push(preferences.clone());
        }

        let context = selection::apply_turn(&query.context, &turn, limit);
        let context = selection::enforce_constraints(context, catalog);
        let restaurants = reconcile::reconcile(&context.entries, catalog);

        Ok(SearchReply {
            status: SearchStatus::Success,
            results: context.entries.clone(),
            restaurants,
            context,
            message: None,
        })
    }

    /// Run one streaming search turn.
    ///
    /// Yields the backend's raw text fragments; their concatenation follows
    /// the same JSON contract as the blocking response. The consumer may
    /// stop pulling at any point.
    pub async fn search_stream(
        &self,
        query: &SearchQuery,
        catalog: &[Restaurant],
    ) -> Result<TextStream, InferenceError> {
        let limit = query.effective_limit();
        let records = projector::project(catalog);
        let descriptor = prepare_image(query.image.as_ref());

        let request = prompt::build_request(
            &query.text,
            descriptor.as_ref(),
            &query.context,
            query.preferences.as_deref(),
            limit,
            &records,
        );

        self.backend.invoke_stream(&request).await
    }
}

/// Ingest the optional image input.
///
/// Failures degrade to text-only mode at warn level; the image channel is
/// always optional. Uploaded buffers are staged in a scoped temporary file
/// that is removed when this function returns, on every path.
fn prepare_image(source: Option<&ImageSource>) -> Option<ImageDescriptor> {
    let source = source?;

    let result = match source {
        ImageSource::Path(path) => image::ingest(path),
        ImageSource::Upload { file_name, bytes } => {
            match upload::TempUpload::write(file_name, bytes) {
                Ok(staged) => image::ingest(staged.path()),
                Err(e) => {
                    warn!("failed to stage uploaded image: {}", e);
                    return None;
                }
            }
        }
    };

    match result {
        Ok(descriptor) => Some(descriptor),
        Err(e) => {
            warn!("image ingestion failed, degrading to text-only search: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Dish;
    use crate::llm::{InferenceRequest, RawResponse};
    use async_trait::async_trait;

    struct CannedBackend {
        text: String,
    }

    #[async_trait]
    impl InferenceBackend for CannedBackend {
        fn name(&self) -> &str {
            "canned"
        }

        async fn invoke(&self, _request: &InferenceRequest) -> crate::llm::Result<RawResponse> {
            Ok(RawResponse {
                text: self.text.clone(),
            })
        }

        async fn invoke_stream(
            &self,
            _request: &InferenceRequest,
        ) -> crate::llm::Result<TextStream> {
            let text = self.text.clone();
            let fragments =
                futures::stream::once(async move { Ok::<_, InferenceError>(text) });
            Ok(Box::pin(fragments))
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl InferenceBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }

        async fn invoke(&self, _request: &InferenceRequest) -> crate::llm::Result<RawResponse> {
            Err(InferenceError::Unavailable("backend down".to_string()))
        }

        async fn invoke_stream(
            &self,
            _request: &InferenceRequest,
        ) -> crate::llm::Result<TextStream> {
            Err(InferenceError::Unavailable("backend down".to_string()))
        }
    }

    fn catalog() -> Vec<Restaurant> {
        vec![Restaurant {
            id: 1,
            name: "Sakhli 11".to_string(),
            address: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            working_hours: String::new(),
            phone: String::new(),
            price_range: 2,
            atmosphere: vec![],
            dishes: vec![
                Dish {
                    id: 1,
                    restaurant_id: 1,
                    name: "Khachapuri".to_string(),
                    description: String::new(),
                    price: 8.0,
                    image_url: String::new(),
                    ingredients: vec![],
                    tags: vec![],
                    allergens: vec![],
                },
                Dish {
                    id: 2,
                    restaurant_id: 1,
                    name: "Lobiani".to_string(),
                    description: String::new(),
                    price: 6.0,
                    image_url: String::new(),
                    ingredients: vec![],
                    tags: vec![],
                    allergens: vec!["pork".to_string()],
                },
            ],
        }]
    }

    fn engine(text: &str) -> SearchEngine {
        SearchEngine::new(Arc::new(CannedBackend {
            text: text.to_string(),
        }))
    }

    #[tokio::test]
    async fn test_search_reconciles_against_catalog() {
        let engine = engine(
            r#"{"intent":"explore","category":"khachapuri","results":[
                {"restaurant_id":"1","restaurant_name":"Sakhli 11","dish_name":"Khachapuri","dish_price":8}
            ]}"#,
        );

        let reply = engine.search(&SearchQuery::text("khachapuri"), &catalog()).await;

        assert_eq!(reply.status, SearchStatus::Success);
        assert_eq!(reply.results.len(), 1);
        assert_eq!(reply.restaurants.len(), 1);
        assert_eq!(reply.restaurants[0].dishes.len(), 1);
        assert_eq!(reply.restaurants[0].dishes[0].name, "Khachapuri");
    }

    #[tokio::test]
    async fn test_search_error_envelope_on_backend_failure() {
        let engine = SearchEngine::new(Arc::new(FailingBackend));

        let reply = engine.search(&SearchQuery::text("anything"), &catalog()).await;

        assert_eq!(reply.status, SearchStatus::Error);
        assert!(reply.message.as_deref().is_some_and(|m| !m.is_empty()));
        assert!(reply.results.is_empty());
    }

    #[tokio::test]
    async fn test_search_error_envelope_on_malformed_json() {
        let engine = engine("sorry, I can only answer in prose");

        let reply = engine.search(&SearchQuery::text("khinkali"), &catalog()).await;

        assert_eq!(reply.status, SearchStatus::Error);
        assert!(reply.message.is_some());
    }

    #[tokio::test]
    async fn test_error_reply_keeps_prior_context() {
        let engine = SearchEngine::new(Arc::new(FailingBackend));

        let mut query = SearchQuery::text("more");
        query.context.entries.push(SelectionEntry {
            restaurant_id: "1".to_string(),
            restaurant_name: "Sakhli 11".to_string(),
            dish_name: "Khachapuri".to_string(),
            dish_price: 8.0,
            category: "khachapuri".to_string(),
        });

        let reply = engine.search(&query, &catalog()).await;

        assert_eq!(reply.status, SearchStatus::Error);
        assert_eq!(reply.context, query.context);
    }

    #[tokio::test]
    async fn test_bad_image_path_degrades_to_text_only() {
        let engine = engine(r#"{"intent":"query","results":[]}"#);

        let mut query = SearchQuery::text("what do I have?");
        query.image = Some(ImageSource::Path(PathBuf::from("/nonexistent/menu.pdf")));

        let reply = engine.search(&query, &catalog()).await;
        assert_eq!(reply.status, SearchStatus::Success);
    }

    #[tokio::test]
    async fn test_preferences_filter_allergens() {
        let engine = engine(
            r#"{"intent":"explore","category":"pies","results":[
                {"restaurant_id":"1","restaurant_name":"Sakhli 11","dish_name":"Khachapuri","dish_price":8},
                {"restaurant_id":"1","restaurant_name":"Sakhli 11","dish_name":"Lobiani","dish_price":6}
            ]}"#,
        );

        let mut query = SearchQuery::text("pies");
        query.preferences = Some("pork allergy".to_string());

        let reply = engine.search(&query, &catalog()).await;

        let names: Vec<&str> = reply.results.iter().map(|e| e.dish_name.as_str()).collect();
        assert_eq!(names, vec!["Khachapuri"]);
    }

    #[tokio::test]
    async fn test_limit_caps_results() {
        let engine = engine(
            r#"{"intent":"explore","category":"pies","results":[
                {"restaurant_id":"1","restaurant_name":"Sakhli 11","dish_name":"Khachapuri","dish_price":8},
                {"restaurant_id":"1","restaurant_name":"Sakhli 11","dish_name":"Lobiani","dish_price":6}
            ]}"#,
        );

        let mut query = SearchQuery::text("pies");
        query.limit = 1;

        let reply = engine.search(&query, &catalog()).await;
        assert_eq!(reply.results.len(), 1);
    }

    #[tokio::test]
    async fn test_hallucinated_dish_never_reaches_context() {
        let engine = engine(
            r#"{"intent":"explore","category":"pies","results":[
                {"restaurant_id":"1","restaurant_name":"Sakhli 11","dish_name":"Mystery Pie","dish_price":5}
            ]}"#,
        );

        let reply = engine.search(&SearchQuery::text("pies"), &catalog()).await;

        assert_eq!(reply.status, SearchStatus::Success);
        assert!(reply.results.is_empty());
        assert!(reply.restaurants.is_empty());
    }

    #[tokio::test]
    async fn test_search_stream_yields_fragments() {
        use futures::StreamExt;

        let engine = engine(r#"{"intent":"query","results":[]}"#);

        let mut stream = engine
            .search_stream(&SearchQuery::text("khinkali"), &catalog())
            .await
            .unwrap();

        let mut collected = String::new();
        while let Some(fragment) = stream.next().await {
            collected.push_str(&fragment.unwrap());
        }
        assert_eq!(collected, r#"{"intent":"query","results":[]}"#);
    }
}
