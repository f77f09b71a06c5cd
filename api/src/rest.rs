use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tower_http::trace::TraceLayer;

use axon_core::route::Route;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct AgentCallQuery {
    full: Option<String>,
}

/// Assemble the REST router from the route table: the agent at `/`, one
/// endpoint per tool at `/<name>`.
pub fn router(state: AppState) -> Router {
    let mut router = Router::new();

    for route in state.gateway.routes().routes() {
        match route {
            Route::Agent { .. } => {
                tracing::info!("creating agent endpoint /");
                router = router.route("/", post(call_agent));
            }
            Route::Tool { name, .. } => {
                let path = route.path();
                tracing::info!("creating tool endpoint {path}");
                let tool_name = name.clone();
                router = router.route(
                    &path,
                    post(
                        move |state: State<AppState>,
                              connect_info: ConnectInfo<SocketAddr>,
                              body: Bytes| {
                            let tool_name = tool_name.clone();
                            async move { call_tool(state, connect_info, tool_name, body).await }
                        },
                    ),
                );
            }
        }
    }

    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn call_agent(
    State(state): State<AppState>,
    Query(query): Query<AgentCallQuery>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let full = query
        .full
        .as_deref()
        .is_some_and(|value| value.eq_ignore_ascii_case("true"));
    let supplied = parse_object_body(&body)?;

    tracing::info!(client = %client, full, "agent request: {supplied:?}");

    let output_state = state.gateway.invoke_agent(&supplied).await?;

    if full {
        Ok(Json(Value::Object(output_state)))
    } else {
        Ok(Json(
            output_state.get("output").cloned().unwrap_or(Value::Null),
        ))
    }
}

async fn call_tool(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    tool_name: String,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let args = parse_object_body(&body)?;

    tracing::info!(client = %client, tool = %tool_name, "tool request: {args:?}");

    let result = state.gateway.invoke_tool(&tool_name, args).await?;
    Ok(Json(json!({ "result": result })))
}

/// Accept an absent, null, or object body; anything else is a validation
/// error.
fn parse_object_body(body: &[u8]) -> Result<Map<String, Value>, AppError> {
    if body.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(_) => Err(AppError::Validation {
            message: "request body must be a JSON object".to_string(),
            field: None,
        }),
        Err(err) => Err(AppError::Validation {
            message: format!("invalid JSON body: {err}"),
            field: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Request, StatusCode, header};
    use std::path::PathBuf;
    use std::sync::Arc;
    use tower::ServiceExt;

    use axon_core::config::{AgentConfig, LoadedAgent};
    use axon_core::mode::Exposure;
    use axon_core::route::RouteTable;
    use axon_runtime::Gateway;
    use axon_runtime::runner::RunnerSettings;
    use axon_runtime::tools::ToolSet;

    const AGENT_YAML: &str = "description: demo agent\nagent: 'Work on {{ topic }}.'\ntask: go\ntools:\n  - name: echo_words\n    description: Echo the given words\n    arguments:\n      - name: words\n    tool: 'echo {{ words }}'\n";

    fn app(exposure: Exposure, runner_bin: &str) -> Router {
        let config: AgentConfig = serde_yaml::from_str(AGENT_YAML).unwrap();
        let agent = LoadedAgent {
            path: PathBuf::from("/agents/demo/agent.yml"),
            name: "demo".to_string(),
            config,
        };
        let tools = exposure
            .includes_tools()
            .then(|| ToolSet::from_config(&agent.config));
        let routes = RouteTable::build(
            exposure,
            &agent.config,
            tools
                .iter()
                .flat_map(ToolSet::iter)
                .map(|tool| (tool.name.clone(), tool.description.clone())),
        )
        .unwrap();
        let settings = RunnerSettings {
            runner_bin: PathBuf::from(runner_bin),
            agent_path: agent.path.clone(),
            generator: "openai/gpt-4o".to_string(),
            conversation_strategy: "full".to_string(),
            max_steps: 10,
            max_cost: 0.0,
            timeout: None,
            quiet: true,
        };
        let state = AppState {
            gateway: Arc::new(Gateway::new(&agent, settings, tools, routes)),
        };
        router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9))))
    }

    fn post_json(path: &str, body: &str) -> Request<axum::body::Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn missing_required_input_is_a_400_naming_the_input() {
        let app = app(Exposure::AgentOnly, "/nonexistent/runner");
        let response = app.oneshot(post_json("/", "{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], json!("validation_failed"));
        assert_eq!(body["message"], json!("input 'topic' is required"));
        assert_eq!(body["field"], json!("topic"));
        assert!(body.get("request_id").is_some());
    }

    #[tokio::test]
    async fn non_object_body_is_rejected() {
        let app = app(Exposure::AgentOnly, "/nonexistent/runner");
        let response = app.oneshot(post_json("/", "[1, 2]")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn agent_endpoint_is_absent_in_tools_only_mode() {
        let app = app(Exposure::ToolsOnly, "/nonexistent/runner");
        let response = app.oneshot(post_json("/", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_tool_path_is_a_404() {
        let app = app(Exposure::Combined, "/nonexistent/runner");
        let response = app.oneshot(post_json("/no_such_tool", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn completing_runner(dir: &std::path::Path) -> PathBuf {
            let path = dir.join("fake-runner.sh");
            std::fs::write(
                &path,
                "#!/bin/sh\nfor arg do last=\"$arg\"; done\nprintf '{\"name\":\"task_complete\",\"data\":{\"reason\":{\"output\":\"done\"}}}\\n' > \"$last\"\n",
            )
            .unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        #[tokio::test]
        async fn agent_call_returns_only_the_output_value_by_default() {
            let dir = tempfile::tempdir().unwrap();
            let bin = completing_runner(dir.path());
            let app = app(Exposure::AgentOnly, bin.to_str().unwrap());

            let response = app
                .oneshot(post_json("/", r#"{"topic": "rust"}"#))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            // The value under `output`, never the surrounding state map.
            assert_eq!(body, json!({ "output": "done" }));
        }

        #[tokio::test]
        async fn full_true_returns_the_whole_output_state() {
            let dir = tempfile::tempdir().unwrap();
            let bin = completing_runner(dir.path());
            let app = app(Exposure::AgentOnly, bin.to_str().unwrap());

            let response = app
                .oneshot(post_json("/?full=true", r#"{"topic": "rust"}"#))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["output"], json!({ "output": "done" }));
            assert!(body.get("command_line").is_some());
            assert!(body.get("exit_code").is_some());
            assert!(body.get("events").is_some());
        }

        #[tokio::test]
        async fn full_with_other_values_keeps_the_short_shape() {
            let dir = tempfile::tempdir().unwrap();
            let bin = completing_runner(dir.path());
            let app = app(Exposure::AgentOnly, bin.to_str().unwrap());

            let response = app
                .oneshot(post_json("/?full=yes", r#"{"topic": "rust"}"#))
                .await
                .unwrap();
            let body = body_json(response).await;
            assert_eq!(body, json!({ "output": "done" }));
        }

        #[tokio::test]
        async fn tool_call_wraps_the_result() {
            let app = app(Exposure::Combined, "/nonexistent/runner");
            let response = app
                .oneshot(post_json("/echo_words", r#"{"words": "hi there"}"#))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body, json!({ "result": "hi there" }));
        }

        #[tokio::test]
        async fn tool_call_accepts_an_empty_body() {
            let app = app(Exposure::Combined, "/nonexistent/runner");
            let request = Request::builder()
                .method("POST")
                .uri("/echo_words")
                .body(axum::body::Body::empty())
                .unwrap();
            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body, json!({ "result": "" }));
        }
    }
}
