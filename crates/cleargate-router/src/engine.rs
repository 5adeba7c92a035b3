//! HTTP client for the workflow execution engine.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Serialize;

use cleargate_event_router::errors::ExecutionError;
use cleargate_event_router::traits::ExecutionEngine;
use cleargate_event_router::types::{ExecutionContext, ExecutionOutcome, WorkflowExecutionModel};

#[derive(Serialize)]
struct DispatchRequest<'a> {
    workflow: &'a WorkflowExecutionModel,
    context: &'a ExecutionContext,
}

/// Dispatches executions with `POST {base_url}/executions`.
///
/// The body is `{ "workflow": .., "context": .. }`. The execution credential,
/// when present, travels as a bearer token and never in the body.
pub struct HttpExecutionEngine {
    client: reqwest::Client,
    base_url: String,
}

impl HttpExecutionEngine {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ExecutionEngine for HttpExecutionEngine {
    async fn execute(
        &self,
        workflow: &WorkflowExecutionModel,
        context: ExecutionContext,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let url = format!("{}/executions", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .json(&DispatchRequest {
                workflow,
                context: &context,
            });
        if let Some(ref credential) = context.credential {
            request = request.bearer_auth(credential.secret.expose_secret());
        }

        let response = request.send().await.map_err(|e| ExecutionError::Transport {
            message: format!("POST {url} failed: {e}"),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutionError::Rejected {
                message: format!("HTTP {status}: {body}"),
            });
        }

        response
            .json::<ExecutionOutcome>()
            .await
            .map_err(|e| ExecutionError::Transport {
                message: format!("invalid engine response: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cleargate_event_router::types::{
        EventSnapshot, ExecutionCredential, TriggeredBy, WorkflowDefinition,
    };
    use secrecy::SecretString;
    use serde_json::{Map, Value, json};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn workflow() -> WorkflowExecutionModel {
        WorkflowExecutionModel {
            id: "w1".into(),
            space_id: "s1".into(),
            name: "Deploy".into(),
            enabled: true,
            definition: WorkflowDefinition {
                name: "Deploy".into(),
                inputs: vec![],
                steps: Value::Null,
            },
        }
    }

    fn context(credential: Option<ExecutionCredential>) -> ExecutionContext {
        let mut inputs = Map::new();
        inputs.insert("ref".into(), json!("main"));
        ExecutionContext {
            space_id: "s1".into(),
            triggered_by: TriggeredBy {
                trigger_type: "external.event".into(),
                event_id: "e1".into(),
                subscription_id: "sub1".into(),
                principal_id: "u1".into(),
            },
            inputs,
            event: EventSnapshot {
                id: "e1".into(),
                trigger_type: "external.event".into(),
                payload: json!({"source": "github"}),
                timestamp: Utc::now(),
            },
            credential,
            input_validation_failed: false,
            input_validation_error: None,
        }
    }

    #[tokio::test]
    async fn test_dispatch_posts_workflow_and_context() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/executions"))
            .and(header("Authorization", "Bearer sk-exec"))
            .and(body_partial_json(json!({
                "workflow": {"id": "w1"},
                "context": {"inputs": {"ref": "main"}, "triggered_by": {"event_id": "e1"}}
            })))
            .respond_with(
                ResponseTemplate::new(202)
                    .set_body_json(json!({"execution_id": "x-1", "status": "queued"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let engine = HttpExecutionEngine::new(&format!("{}/", server.uri()), None).unwrap();
        let credential = ExecutionCredential {
            id: "key-1".into(),
            principal_id: "u1".into(),
            secret: SecretString::from("sk-exec".to_string()),
        };
        let outcome = engine
            .execute(&workflow(), context(Some(credential)))
            .await
            .unwrap();
        assert_eq!(outcome.execution_id, "x-1");
        assert_eq!(outcome.status.as_deref(), Some("queued"));
    }

    #[tokio::test]
    async fn test_error_status_is_rejection() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/executions"))
            .respond_with(ResponseTemplate::new(422).set_body_string("workflow disabled"))
            .mount(&server)
            .await;

        let engine = HttpExecutionEngine::new(&server.uri(), None).unwrap();
        let err = engine.execute(&workflow(), context(None)).await.unwrap_err();
        match err {
            ExecutionError::Rejected { message } => {
                assert!(message.contains("422"));
                assert!(message.contains("workflow disabled"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_response_is_transport_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/executions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let engine = HttpExecutionEngine::new(&server.uri(), None).unwrap();
        let err = engine.execute(&workflow(), context(None)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_engine_is_transport_error() {
        let engine = HttpExecutionEngine::new("http://127.0.0.1:1", None).unwrap();
        let err = engine.execute(&workflow(), context(None)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Transport { .. }));
    }
}
