use crate::executions::Executions;
use actix_web::{delete, get, post, put, web, HttpResponse, Responder, Result as ActixResult};
use actix_ws::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;
use wfcore::{EngineError, GraphError, WorkflowGraph};
use wfruntime::validate_graph;

/// Application state shared across handlers
pub struct AppState {
    pub executions: Executions,
}

/// Request body for `/execute`; either an inline graph or a stored name
#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    #[serde(default)]
    graph: Option<WorkflowGraph>,
    #[serde(default)]
    workflow_name: Option<String>,
    #[serde(default)]
    inputs: Value,
}

#[derive(Debug, Deserialize)]
struct ResumeRequest {
    execution_id: Uuid,
    #[serde(default)]
    form_data: Value,
}

#[derive(Debug, Deserialize)]
struct InputsRequest {
    #[serde(default)]
    inputs: Value,
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<String>,
}

fn error_response(e: &EngineError) -> HttpResponse {
    let body = ErrorResponse {
        error: e.to_string(),
        details: match e {
            EngineError::Schema(s) => s.violations.clone(),
            _ => Vec::new(),
        },
    };
    match e {
        EngineError::Schema(_) => HttpResponse::UnprocessableEntity().json(body),
        EngineError::ExecutionNotFound(_) | EngineError::Graph(GraphError::NotFound(_)) => {
            HttpResponse::NotFound().json(body)
        }
        EngineError::Graph(GraphError::AlreadyExists(_)) => HttpResponse::Conflict().json(body),
        EngineError::Graph(_)
        | EngineError::InvalidInputs(_)
        | EngineError::NotPaused { .. }
        | EngineError::GraphMismatch { .. } => HttpResponse::BadRequest().json(body),
        _ => {
            error!("Request failed: {}", e);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

fn respond<T: Serialize>(result: Result<T, EngineError>) -> HttpResponse {
    match result {
        Ok(body) => HttpResponse::Ok().json(body),
        Err(e) => error_response(&e),
    }
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "wfserver"
    }))
}

/// Run a graph until it completes, fails or pauses at a form
#[post("/execute")]
async fn execute(
    data: web::Data<AppState>,
    req: web::Json<ExecuteRequest>,
) -> ActixResult<impl Responder> {
    let ExecuteRequest {
        graph,
        workflow_name,
        inputs,
    } = req.into_inner();

    let result = match (graph, workflow_name) {
        (Some(graph), _) => {
            info!("Executing inline workflow {}", graph.label());
            data.executions.execute(graph, inputs).await
        }
        (None, Some(name)) => {
            info!("Executing stored workflow {}", name);
            data.executions.execute_by_name(&name, inputs).await
        }
        (None, None) => Err(EngineError::InvalidInputs(
            "request needs either 'graph' or 'workflow_name'".to_string(),
        )),
    };
    Ok(respond(result))
}

/// Submit form data to a paused run
#[post("/resume")]
async fn resume(
    data: web::Data<AppState>,
    req: web::Json<ResumeRequest>,
) -> ActixResult<impl Responder> {
    let ResumeRequest {
        execution_id,
        form_data,
    } = req.into_inner();
    info!("Resuming execution {}", execution_id);
    Ok(respond(data.executions.resume(execution_id, form_data).await))
}

/// Runs waiting for form input
#[get("/api/executions")]
async fn list_paused(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    Ok(respond(data.executions.paused().await))
}

/// List all workflows
#[get("/api/workflows")]
async fn list_workflows(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let result = data.executions.runtime().store().list_all().await.map(|graphs| {
        graphs
            .iter()
            .map(|g| {
                serde_json::json!({
                    "name": g.name,
                    "version": g.version,
                    "description": g.description,
                    "nodes": g.nodes.len(),
                    "edges": g.edges.len(),
                })
            })
            .collect::<Vec<_>>()
    });
    Ok(respond(result))
}

/// Validate and store a new workflow
#[post("/api/workflows")]
async fn create_workflow(
    data: web::Data<AppState>,
    graph: web::Json<WorkflowGraph>,
) -> ActixResult<impl Responder> {
    let graph = graph.into_inner();
    let runtime = data.executions.runtime();
    if let Err(e) = validate_graph(&graph, runtime.registry()) {
        return Ok(error_response(&EngineError::from(e)));
    }

    let name = graph.name.clone();
    match runtime.store().create(&name, graph).await {
        Ok(stored) => {
            info!("Created workflow {}", stored.label());
            Ok(HttpResponse::Created().json(stored))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

#[get("/api/workflows/{name}")]
async fn get_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let name = path.into_inner();
    let result = data
        .executions
        .runtime()
        .store()
        .get_by_name(&name)
        .await
        .and_then(|found| found.ok_or_else(|| GraphError::NotFound(name).into()));
    Ok(respond(result))
}

/// Replace a workflow; runs already in flight keep their pinned version
#[put("/api/workflows/{name}")]
async fn update_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
    graph: web::Json<WorkflowGraph>,
) -> ActixResult<impl Responder> {
    let name = path.into_inner();
    let graph = graph.into_inner();
    let runtime = data.executions.runtime();
    if let Err(e) = validate_graph(&graph, runtime.registry()) {
        return Ok(error_response(&EngineError::from(e)));
    }
    Ok(respond(runtime.store().update(&name, graph).await))
}

#[delete("/api/workflows/{name}")]
async fn delete_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ActixResult<impl Responder> {
    let name = path.into_inner();
    match data.executions.runtime().store().delete(&name).await {
        Ok(()) => {
            info!("Deleted workflow: {}", name);
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "message": "Workflow deleted successfully"
            })))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// Execute a stored workflow
#[post("/api/workflows/{name}/execute")]
async fn execute_workflow(
    data: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<InputsRequest>,
) -> ActixResult<impl Responder> {
    let name = path.into_inner();
    info!("Executing workflow: {}", name);
    Ok(respond(data.executions.execute_by_name(&name, req.into_inner().inputs).await))
}

/// Node kinds the runtime can execute
#[get("/api/kinds")]
async fn list_kinds(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let registry = data.executions.runtime().registry();
    let kinds: Vec<_> = registry
        .list_kinds()
        .into_iter()
        .map(|kind| {
            serde_json::json!({
                "kind": kind,
                "description": registry.metadata(kind).map(|m| m.description).unwrap_or_default(),
            })
        })
        .collect();
    Ok(HttpResponse::Ok().json(kinds))
}

/// WebSocket endpoint for real-time events
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected");
    let mut events = data.executions.runtime().subscribe_events();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("WebSocket client lagging, skipped {} events", skipped);
                        }
                        Err(_) => break,
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

/// Mount every route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(execute)
        .service(resume)
        .service(list_paused)
        .service(list_workflows)
        .service(create_workflow)
        .service(get_workflow)
        .service(update_workflow)
        .service(delete_workflow)
        .service(execute_workflow)
        .service(list_kinds)
        .service(websocket_events);
}
