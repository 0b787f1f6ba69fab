use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::{build_router, AppState};
use crate::config::LlmConfig;
use crate::models::{BreakEvenData, CostBreakdown, Message, NewActionItem, ProviderId, Role};
use crate::providers::{AiProvider, ChatRequest, ChatResponse, ProviderError, ProviderRouter};
use crate::services::conversation::DEFAULT_COACH_PROMPT;
use crate::services::{ChatGateway, Database, LlmThrottle};

/// Replies from a queue and records every request it sees.
#[derive(Default)]
struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    fn reply(&self, text: &str) {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
    }

    fn fail(&self, error: &str) {
        self.replies.lock().unwrap().push_back(Err(error.to_string()));
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Local
    }

    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(content)) => Ok(ChatResponse {
                content,
                model,
                tokens_in: Some(10),
                tokens_out: Some(20),
            }),
            Some(Err(error)) => Err(ProviderError::RequestFailed(error)),
            None => Err(ProviderError::InvalidResponse("no scripted reply".to_string())),
        }
    }
}

struct TestApp {
    router: Router,
    db: Database,
    provider: Arc<ScriptedProvider>,
}

fn test_app() -> TestApp {
    let db = Database::new_in_memory().unwrap();
    let provider = Arc::new(ScriptedProvider::default());

    let mut router = ProviderRouter::new();
    router.register(provider.clone());

    let config = LlmConfig {
        provider: ProviderId::Local,
        api_key: String::new(),
        model: "test-model".to_string(),
        base_url: None,
        min_interval: Duration::ZERO,
        history_limit: 10,
        max_tokens: None,
    };
    let gateway = ChatGateway::new(
        &router,
        Arc::new(LlmThrottle::new(config.min_interval)),
        config,
    )
    .unwrap();

    let state = Arc::new(AppState {
        db: db.clone(),
        gateway,
    });
    TestApp {
        router: build_router(state, &[]),
        db,
        provider,
    }
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = self.send_raw(method, uri, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn create_conversation(&self) -> String {
        let (status, body) = self
            .send(Method::POST, "/api/conversations", Some(json!({})))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    async fn create_item(&self, content: &str, parent: Option<&str>) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/items",
                Some(json!({"content": content, "parentId": parent})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = app.send(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["provider"], "OpenAI Compatible");
    assert_eq!(body["model"], "test-model");
}

#[tokio::test]
async fn test_delete_with_children_requires_flag() {
    let app = test_app();
    let root = app.create_item("Open the shop", None).await;
    let first = app.create_item("Sign the lease", Some(&root)).await;
    app.create_item("Paint the walls", Some(&root)).await;
    app.create_item("Call the landlord", Some(&first)).await;

    let (status, body) = app
        .send(Method::DELETE, &format!("/api/items/{}?deleteChildren=false", root), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("deleteChildren=true"));
    let remaining = app.db.list_action_items(Default::default()).await.unwrap();
    assert_eq!(remaining.len(), 4);

    let (status, body) = app
        .send(Method::DELETE, &format!("/api/items/{}?deleteChildren=true", root), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 4);
    assert!(app.db.list_action_items(Default::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_leaf_and_missing_item() {
    let app = test_app();
    let leaf = app.create_item("Order business cards", None).await;

    let (status, body) = app
        .send(Method::DELETE, &format!("/api/items/{}", leaf), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);

    let (status, body) = app
        .send(Method::DELETE, &format!("/api/items/{}", leaf), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Action item not found");
}

#[tokio::test]
async fn test_item_validation() {
    let app = test_app();
    let root = app.create_item("Open the shop", None).await;
    let child = app.create_item("Sign the lease", Some(&root)).await;

    let (status, _) = app
        .send(Method::POST, "/api/items", Some(json!({"content": "   "})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/items",
            Some(json!({"content": "Orphan task", "parentId": "missing"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            Method::PATCH,
            &format!("/api/items/{}", root),
            Some(json!({"parentId": child})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("descendants"));

    let (status, _) = app
        .send(
            Method::PATCH,
            &format!("/api/items/{}", root),
            Some(json!({"colour": "red"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(Method::PATCH, "/api/items/missing", Some(json!({"completed": true})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_item_patch_and_filters() {
    let app = test_app();
    let root = app.create_item("Open the shop", None).await;
    let child = app.create_item("Sign the lease", Some(&root)).await;
    let second = app.create_item("Paint the walls", Some(&root)).await;

    let (status, body) = app
        .send(
            Method::PATCH,
            &format!("/api/items/{}", child),
            Some(json!({"completed": true, "parentId": null})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completed"], true);
    assert_eq!(body["parentId"], Value::Null);

    let (_, body) = app
        .send(Method::GET, &format!("/api/items?parentId={}", root), None)
        .await;
    let children = body.as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["id"], second.as_str());
    assert_eq!(children[0]["ordinal"], 1);
}

#[tokio::test]
async fn test_send_message_extracts_action_items() {
    let app = test_app();
    let id = app.create_conversation().await;
    app.provider
        .reply("Great idea! Here is where to start:\n1. Buy supplies\n2. Find a location");

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/conversations/{}/messages", id),
            Some(json!({"content": "I want to open a bakery"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["userMessage"]["role"], "user");
    assert_eq!(body["assistantMessage"]["model"], "test-model");
    let items: Vec<&str> = body["actionItems"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["content"].as_str().unwrap())
        .collect();
    assert_eq!(items, vec!["Buy supplies", "Find a location"]);

    let requests = app.provider.requests();
    assert_eq!(requests[0].system_prompt.as_deref(), Some(DEFAULT_COACH_PROMPT));
    assert_eq!(requests[0].messages.len(), 1);

    let (_, detail) = app
        .send(Method::GET, &format!("/api/conversations/{}", id), None)
        .await;
    assert_eq!(detail["title"], "I want to open a bakery");
    assert_eq!(detail["messages"].as_array().unwrap().len(), 2);

    let (_, listed) = app
        .send(Method::GET, &format!("/api/items?conversationId={}", id), None)
        .await;
    assert_eq!(listed.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_history_is_trimmed_to_limit() {
    let app = test_app();
    let id = app.create_conversation().await;
    for i in 0..6 {
        app.db
            .insert_message(&Message::new(&id, Role::User, format!("question {}", i)))
            .await
            .unwrap();
        app.db
            .insert_message(&Message::new(&id, Role::Assistant, format!("answer {}", i)))
            .await
            .unwrap();
    }
    app.provider.reply("Sounds good.");

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/conversations/{}/messages", id),
            Some(json!({"content": "What next?"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let sent = &app.provider.requests()[0].messages;
    assert!(sent.len() <= 10);
    assert_eq!(sent[0].role, Role::User);
    assert_eq!(sent.last().unwrap().content, "What next?");
}

#[tokio::test]
async fn test_provider_failure_is_500_and_stores_nothing() {
    let app = test_app();
    let id = app.create_conversation().await;
    app.provider.fail("HTTP 429: slow down");

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/conversations/{}/messages", id),
            Some(json!({"content": "Hello"})),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Coach reply failed");
    assert!(body["details"].as_str().unwrap().contains("slow down"));
    assert!(app.db.list_messages(&id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_message_validation_and_missing_conversation() {
    let app = test_app();
    let id = app.create_conversation().await;

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/api/conversations/{}/messages", id),
            Some(json!({"content": ""})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/conversations/missing/messages",
            Some(json!({"content": "Hi"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Conversation not found");
    assert!(app.provider.requests().is_empty());
}

#[tokio::test]
async fn test_break_even_turn_merges_state() {
    let app = test_app();
    let id = app.create_conversation().await;
    app.db
        .save_break_even(
            &id,
            &BreakEvenData {
                fixed_costs: Some(CostBreakdown::Total(1500.0)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    app.provider
        .reply("Got it.\n\nHere is the updated data:\n```json\n{\"unitPrice\": 25}\n```");

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/conversations/{}/break-even", id),
            Some(json!({"content": "I'll charge $25 a loaf"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["fixedCosts"], 1500.0);
    assert_eq!(body["data"]["unitPrice"], 25.0);
    assert_eq!(body["assistantMessage"]["content"], "Got it.");
    assert_eq!(body["computed"]["units"], 60.0);

    let system = app.provider.requests()[0].system_prompt.clone().unwrap();
    assert!(system.contains("Fixed Costs: $1,500.00"));

    let (_, view) = app
        .send(Method::GET, &format!("/api/conversations/{}/break-even", id), None)
        .await;
    assert_eq!(view["data"]["unitPrice"], 25.0);
    assert!(view["summary"].as_str().unwrap().contains("Unit Price: $25.00"));
}

#[tokio::test]
async fn test_break_even_reply_without_json_keeps_state() {
    let app = test_app();
    let id = app.create_conversation().await;
    app.provider.reply("What is your monthly rent?");

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/conversations/{}/break-even", id),
            Some(json!({"content": "Help me with break-even"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({}));
    assert_eq!(body["summary"], "");
    assert!(app.db.get_break_even(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_extract_endpoint() {
    let app = test_app();
    let id = app.create_conversation().await;
    let message = Message::new(&id, Role::Assistant, "Step 1: Register your business name");
    app.db.insert_message(&message).await.unwrap();

    let (status, body) = app
        .send(Method::POST, &format!("/api/messages/{}/extract", message.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["actionItems"][0]["content"], "Register your business name");
    assert_eq!(body["actionItems"][0]["messageId"], message.id.as_str());

    let (status, _) = app
        .send(Method::POST, "/api/messages/missing/extract", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_conversation_update_delete_and_export() {
    let app = test_app();
    let id = app.create_conversation().await;
    app.db
        .insert_action_items(vec![NewActionItem {
            content: "Buy supplies".to_string(),
            completed: false,
            ordinal: 0,
            parent_id: None,
            message_id: None,
            conversation_id: Some(id.clone()),
        }])
        .await
        .unwrap();

    let (status, body) = app
        .send(
            Method::PATCH,
            &format!("/api/conversations/{}", id),
            Some(json!({"title": "Bakery plan", "systemPrompt": "Be blunt."})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Bakery plan");
    assert_eq!(body["systemPrompt"], "Be blunt.");

    let (status, bytes) = app
        .send_raw(Method::GET, &format!("/api/conversations/{}/export", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let markdown = String::from_utf8(bytes).unwrap();
    assert!(markdown.starts_with("# Bakery plan"));
    assert!(markdown.contains("- [ ] Buy supplies"));

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/conversations/{}", id), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .send(Method::GET, &format!("/api/conversations/{}", id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let items = app.db.list_action_items(Default::default()).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].conversation_id, None);
}

#[tokio::test]
async fn test_lists_crud_and_tree_delete() {
    let app = test_app();
    let (status, parent) = app
        .send(
            Method::POST,
            "/api/lists",
            Some(json!({"title": "Launch", "items": ["Permits", " ", "Signage"]})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(parent["items"], json!(["Permits", "Signage"]));
    let parent_id = parent["id"].as_str().unwrap().to_string();

    let (status, child) = app
        .send(
            Method::POST,
            "/api/lists",
            Some(json!({"title": "Permits", "items": ["Food handler"], "parentId": parent_id})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let child_id = child["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/api/lists/{}", parent_id),
            Some(json!({"title": "Launch", "parentId": child_id})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, replaced) = app
        .send(
            Method::PUT,
            &format!("/api/lists/{}", child_id),
            Some(json!({
                "title": "Licences",
                "items": ["Food handler", "Fire"],
                "parentId": parent_id
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced["title"], "Licences");

    let (status, _) = app
        .send(Method::POST, "/api/lists", Some(json!({"title": ""})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/lists/{}", parent_id), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            Method::DELETE,
            &format!("/api/lists/{}?deleteChildren=true", parent_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 2);

    let (status, _) = app
        .send(Method::GET, &format!("/api/lists/{}", child_id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_plan_sections() {
    let app = test_app();
    let (status, plan) = app
        .send(
            Method::POST,
            "/api/plans",
            Some(json!({"title": "Corner Bakery", "description": "Sourdough"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let plan_id = plan["id"].as_str().unwrap().to_string();

    let (status, section) = app
        .send(
            Method::PUT,
            &format!("/api/plans/{}/sections/market_analysis", plan_id),
            Some(json!({"content": "Students and commuters."})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(section["title"], "Market Analysis");

    app.provider.reply(r#"{"content": "We bake bread for the neighbourhood."}"#);
    let (status, section) = app
        .send(
            Method::POST,
            &format!("/api/plans/{}/sections/executive_summary/generate", plan_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", section);
    assert_eq!(section["content"], "We bake bread for the neighbourhood.");

    let request = &app.provider.requests()[0];
    assert_eq!(request.response_format, crate::providers::ResponseFormat::Json);
    assert!(request.messages[0].content.contains("Students and commuters."));

    let (_, fetched) = app
        .send(Method::GET, &format!("/api/plans/{}", plan_id), None)
        .await;
    let keys: Vec<&str> = fetched["sections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["sectionKey"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["executive_summary", "market_analysis"]);

    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/api/plans/{}/sections/appendix", plan_id),
            Some(json!({"content": "x"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/plans/{}", plan_id), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app
        .send(Method::GET, &format!("/api/plans/{}", plan_id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_settings_round_trip() {
    let app = test_app();
    let (status, defaults) = app.send(Method::GET, "/api/settings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(defaults["autoExtract"], true);

    let (status, _) = app
        .send(Method::PUT, "/api/settings", Some(json!({"temperature": 5.0})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, saved) = app
        .send(
            Method::PUT,
            "/api/settings",
            Some(json!({
                "coachPrompt": "You coach cafes.",
                "temperature": 0.3,
                "autoExtract": false
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["coachPrompt"], "You coach cafes.");

    let id = app.create_conversation().await;
    app.provider.reply("1. Buy supplies");
    let (_, body) = app
        .send(
            Method::POST,
            &format!("/api/conversations/{}/messages", id),
            Some(json!({"content": "Hi"})),
        )
        .await;
    assert!(body["actionItems"].as_array().unwrap().is_empty());
    let request = &app.provider.requests()[0];
    assert_eq!(request.system_prompt.as_deref(), Some("You coach cafes."));
    assert_eq!(request.temperature, Some(0.3));
}
