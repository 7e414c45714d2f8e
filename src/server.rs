use std::future::Future;
use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    schemars,
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use serde_json::json;
use tokio::sync::{Mutex, MutexGuard};

use crate::client::{
    BiClient, Credentials, FileUpload, FolderRef, Page, Session, Table, UploadOutcome,
    UploadTarget,
};

// Parameter structs for tools
#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct PageParams {
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl PageParams {
    fn page(&self) -> Page {
        Page {
            offset: self.offset,
            limit: self.limit,
        }
    }
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct IdParams {
    pub id: u64,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct DocumentSchedulesParams {
    pub document_id: u64,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct DocumentScheduleParams {
    pub document_id: u64,
    pub schedule_id: u64,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ListFolderParams {
    /// Numeric folder id; the infostore root when neither id nor cuid is set
    #[serde(default)]
    pub folder_id: Option<u64>,
    #[serde(default)]
    pub cuid: Option<String>,
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct UploadFileParams {
    /// Local path of the file to upload
    pub path: String,
    pub folder_id: u64,
    /// Name in the repository, defaults to the file name
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct UpdateFileParams {
    pub spreadsheet_id: u64,
    pub path: String,
}

#[derive(Clone)]
pub struct BiMcpServer {
    client: BiClient,
    credentials: Arc<Credentials>,
    session: Arc<Mutex<Session>>,
    tool_router: ToolRouter<BiMcpServer>,
}

#[tool_router]
impl BiMcpServer {
    pub fn new(client: BiClient, credentials: Credentials) -> Self {
        Self {
            client,
            credentials: Arc::new(credentials),
            session: Arc::new(Mutex::new(Session::None)),
            tool_router: Self::tool_router(),
        }
    }

    /// Logs on with the stored credentials, replacing any current session.
    pub async fn log_on(&self) -> Result<(), anyhow::Error> {
        let mut session = self.session.lock().await;
        *session = self.client.log_on(&self.credentials).await?;
        Ok(())
    }

    /// Logs off the shared session if one is active.
    pub async fn log_off(&self) -> Result<(), anyhow::Error> {
        let mut session = self.session.lock().await;
        if session.is_active() {
            self.client.log_off(&mut session).await?;
        }
        Ok(())
    }

    pub async fn is_logged_on(&self) -> bool {
        self.session.lock().await.is_active()
    }

    async fn ensure_session(&self) -> Result<MutexGuard<'_, Session>, anyhow::Error> {
        let mut session = self.session.lock().await;
        if !session.is_active() {
            tracing::debug!("No active session, logging on with stored credentials");
            *session = self.client.log_on(&self.credentials).await?;
        }
        Ok(session)
    }

    // Document tools
    #[tool(description = "List documents in the repository, one row per document")]
    async fn list_documents(
        &self,
        Parameters(params): Parameters<PageParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = match self.ensure_session().await {
            Ok(session) => session,
            Err(e) => return Ok(error_result("Failed to log on", e)),
        };
        let result = self.client.list_documents(&session, params.page()).await;
        Ok(table_result("Failed to list documents", result))
    }

    #[tool(description = "Get the properties of a single document")]
    async fn get_document(
        &self,
        Parameters(params): Parameters<IdParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = match self.ensure_session().await {
            Ok(session) => session,
            Err(e) => return Ok(error_result("Failed to log on", e)),
        };
        let result = self.client.get_document(&session, params.id).await;
        Ok(table_result("Failed to get document", result))
    }

    // Schedule tools
    #[tool(description = "List the schedules of a document")]
    async fn list_document_schedules(
        &self,
        Parameters(params): Parameters<DocumentSchedulesParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = match self.ensure_session().await {
            Ok(session) => session,
            Err(e) => return Ok(error_result("Failed to log on", e)),
        };
        let result = self
            .client
            .list_document_schedules(&session, params.document_id)
            .await;
        Ok(table_result("Failed to list schedules", result))
    }

    #[tool(description = "Get the details of one schedule of a document")]
    async fn get_document_schedule(
        &self,
        Parameters(params): Parameters<DocumentScheduleParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = match self.ensure_session().await {
            Ok(session) => session,
            Err(e) => return Ok(error_result("Failed to log on", e)),
        };
        let result = self
            .client
            .get_document_schedule(&session, params.document_id, params.schedule_id)
            .await;
        Ok(table_result("Failed to get schedule", result))
    }

    // Connection tools
    #[tool(description = "List data connections")]
    async fn list_connections(
        &self,
        Parameters(params): Parameters<PageParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = match self.ensure_session().await {
            Ok(session) => session,
            Err(e) => return Ok(error_result("Failed to log on", e)),
        };
        let result = self.client.list_connections(&session, params.page()).await;
        Ok(table_result("Failed to list connections", result))
    }

    #[tool(description = "Get the details of a data connection")]
    async fn get_connection(
        &self,
        Parameters(params): Parameters<IdParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = match self.ensure_session().await {
            Ok(session) => session,
            Err(e) => return Ok(error_result("Failed to log on", e)),
        };
        let result = self.client.get_connection(&session, params.id).await;
        Ok(table_result("Failed to get connection", result))
    }

    // Universe tools
    #[tool(description = "List universes")]
    async fn list_universes(
        &self,
        Parameters(params): Parameters<PageParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = match self.ensure_session().await {
            Ok(session) => session,
            Err(e) => return Ok(error_result("Failed to log on", e)),
        };
        let result = self.client.list_universes(&session, params.page()).await;
        Ok(table_result("Failed to list universes", result))
    }

    #[tool(description = "Get the details of a universe")]
    async fn get_universe(
        &self,
        Parameters(params): Parameters<IdParams>,
    ) -> Result<CallToolResult, McpError> {
        let session = match self.ensure_session().await {
            Ok(session) => session,
            Err(e) => return Ok(error_result("Failed to log on", e)),
        };
        let result = self.client.get_universe(&session, params.id).await;
        Ok(table_result("Failed to get universe", result))
    }

    // Infostore tools
    #[tool(description = "List the children of an infostore folder (root when no folder is given)")]
    async fn list_folder(
        &self,
        Parameters(params): Parameters<ListFolderParams>,
    ) -> Result<CallToolResult, McpError> {
        let folder = match (params.folder_id, params.cuid) {
            (Some(id), _) => FolderRef::Id(id),
            (None, Some(cuid)) => FolderRef::Cuid(cuid),
            (None, None) => FolderRef::Root,
        };
        let page = Page {
            offset: params.offset,
            limit: params.limit,
        };

        let session = match self.ensure_session().await {
            Ok(session) => session,
            Err(e) => return Ok(error_result("Failed to log on", e)),
        };
        let result = self.client.list_folder(&session, &folder, page).await;
        Ok(table_result("Failed to list folder", result))
    }

    // Upload tools
    #[tool(description = "Upload a local spreadsheet file into a repository folder")]
    async fn upload_file(
        &self,
        Parameters(params): Parameters<UploadFileParams>,
    ) -> Result<CallToolResult, McpError> {
        let file = match FileUpload::from_path(&params.path).await {
            Ok(file) => file,
            Err(e) => return Ok(error_result("Failed to read file", e)),
        };
        let target = UploadTarget {
            name: params.name.unwrap_or_else(|| file.file_name.clone()),
            folder_id: params.folder_id,
        };

        let session = match self.ensure_session().await {
            Ok(session) => session,
            Err(e) => return Ok(error_result("Failed to log on", e)),
        };
        let result = self.client.upload_file(&session, &target, file).await;
        Ok(upload_result("Failed to upload file", result))
    }

    #[tool(description = "Replace the content of an uploaded spreadsheet with a local file")]
    async fn update_file(
        &self,
        Parameters(params): Parameters<UpdateFileParams>,
    ) -> Result<CallToolResult, McpError> {
        let file = match FileUpload::from_path(&params.path).await {
            Ok(file) => file,
            Err(e) => return Ok(error_result("Failed to read file", e)),
        };

        let session = match self.ensure_session().await {
            Ok(session) => session,
            Err(e) => return Ok(error_result("Failed to log on", e)),
        };
        let result = self
            .client
            .update_file(&session, params.spreadsheet_id, file)
            .await;
        Ok(upload_result("Failed to update file", result))
    }

    // Session tools
    #[tool(description = "Show whether a session is active and for which user")]
    async fn session_status(&self) -> Result<CallToolResult, McpError> {
        let session = self.session.lock().await;
        let result = match session.token() {
            Some(token) => json!({
                "active": true,
                "user": token.username(),
                "logged_on_at": token.issued_at(),
                "base_url": self.client.base_url()
            }),
            None => json!({
                "active": false,
                "base_url": self.client.base_url()
            }),
        };
        Ok(CallToolResult::success(vec![Content::text(pretty(&result))]))
    }

    #[tool(
        name = "log_off",
        description = "End the current session; the next tool call logs on again"
    )]
    async fn end_session(&self) -> Result<CallToolResult, McpError> {
        match self.log_off().await {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(pretty(
                &json!({"success": true, "message": "Logged off"}),
            ))])),
            Err(e) => Ok(error_result("Failed to log off", e)),
        }
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn error_result(context: &str, error: impl std::fmt::Display) -> CallToolResult {
    let error = json!({
        "error": context,
        "details": error.to_string()
    });
    CallToolResult::error(vec![Content::text(error.to_string())])
}

fn table_json(table: &Table) -> serde_json::Value {
    let collisions: Vec<serde_json::Value> = table
        .collisions()
        .into_iter()
        .map(|column| json!({"column": column.name(), "sources": column.sources()}))
        .collect();

    json!({
        "columns": table.column_names(),
        "rows": table.to_records(),
        "row_count": table.len(),
        "collisions": collisions
    })
}

fn table_result(context: &str, result: crate::client::Result<Table>) -> CallToolResult {
    match result {
        Ok(table) => CallToolResult::success(vec![Content::text(pretty(&table_json(&table)))]),
        Err(e) => error_result(context, e),
    }
}

fn upload_result(context: &str, result: crate::client::Result<UploadOutcome>) -> CallToolResult {
    match result {
        Ok(outcome) => {
            let result = json!({
                "success": true,
                "message": outcome.message,
                "id": outcome.id
            });
            CallToolResult::success(vec![Content::text(pretty(&result))])
        }
        Err(e) => error_result(context, e),
    }
}

#[tool_handler]
impl ServerHandler for BiMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some("This server exposes a BI platform repository through its RESTful web services. Available tools list and describe documents, document schedules, data connections, universes and infostore folders (results are flattened into tables), upload or update spreadsheet files, and manage the logon session.".to_string()),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        Ok(self.get_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_table_json_shape() {
        let table = crate::client::flatten(&json!([
            {"id": 1, "folder": {"id": 9}},
            {"id": 2}
        ]));
        let value = table_json(&table);

        assert_eq!(value["columns"], json!(["id"]));
        assert_eq!(value["row_count"], json!(2));
        assert_eq!(value["rows"][0], json!({"id": 9}));
        assert_eq!(value["collisions"][0]["sources"], json!(["id", "folder.id"]));
    }

    #[test]
    fn test_page_params_pass_through() {
        let params = PageParams {
            offset: Some(5),
            limit: None,
        };
        assert_eq!(params.page(), Page { offset: Some(5), limit: None });
    }

    type Seen = Arc<std::sync::Mutex<Vec<String>>>;

    async fn mock_bi(
        axum::extract::State(seen): axum::extract::State<Seen>,
        method: axum::http::Method,
        uri: axum::http::Uri,
    ) -> axum::response::Response {
        use axum::http::{header, HeaderName, StatusCode};
        use axum::response::IntoResponse;

        seen.lock().unwrap().push(format!("{} {}", method, uri.path()));
        let json_response = |status: StatusCode, body: serde_json::Value| {
            (status, [(header::CONTENT_TYPE, "application/json")], body.to_string()).into_response()
        };

        match (method.as_str(), uri.path()) {
            ("GET", "/biprws/logon/long") => {
                (StatusCode::OK, [(header::CONTENT_TYPE, "application/xml")], "<attrs/>").into_response()
            }
            ("POST", "/biprws/logon/long") => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/json"),
                    (HeaderName::from_static("x-sap-logontoken"), "tok-123"),
                ],
                "{}",
            )
                .into_response(),
            ("POST", "/biprws/logoff") => StatusCode::OK.into_response(),
            ("GET", "/biprws/raylight/v1/documents") => json_response(
                StatusCode::OK,
                json!({"documents": {"document": [
                    {"id": 5017, "name": "Sales", "folder": {"id": 23}}
                ]}}),
            ),
            _ => json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error_code": "RWS 00012", "message": "Internal server error"}),
            ),
        }
    }

    async fn start_mock() -> (String, Seen) {
        let seen: Seen = Arc::default();
        let router = axum::Router::new()
            .fallback(mock_bi)
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        (format!("http://{}", addr), seen)
    }

    fn mcp_server(base_url: String) -> BiMcpServer {
        BiMcpServer::new(
            BiClient::new(base_url),
            Credentials::new("jdoe", "s3cret", crate::client::AuthType::Enterprise),
        )
    }

    fn result_text(result: &CallToolResult) -> serde_json::Value {
        let value = serde_json::to_value(result).unwrap();
        let text = value["content"][0]["text"].as_str().unwrap();
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn test_tool_call_logs_on_lazily_and_returns_table() {
        let (base_url, seen) = start_mock().await;
        let mcp = mcp_server(base_url);
        assert!(!mcp.is_logged_on().await);

        let result = mcp
            .list_documents(Parameters(PageParams {
                offset: Some(0),
                limit: Some(10),
            }))
            .await
            .unwrap();

        assert_ne!(result.is_error, Some(true));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "GET /biprws/logon/long".to_string(),
                "POST /biprws/logon/long".to_string(),
                "GET /biprws/raylight/v1/documents".to_string(),
            ]
        );

        let body = result_text(&result);
        assert_eq!(body["columns"], json!(["id", "name"]));
        assert_eq!(body["row_count"], json!(1));
        assert_eq!(body["rows"][0], json!({"id": 23, "name": "Sales"}));
        assert_eq!(body["collisions"][0]["column"], json!("id"));

        // the session is reused by the next call
        mcp.list_documents(Parameters(PageParams {
            offset: None,
            limit: None,
        }))
        .await
        .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 4);
        assert!(mcp.is_logged_on().await);

        let closed = mcp.end_session().await.unwrap();
        assert_ne!(closed.is_error, Some(true));
        assert!(!mcp.is_logged_on().await);
        assert_eq!(seen.lock().unwrap().last().unwrap(), "POST /biprws/logoff");
    }

    #[tokio::test]
    async fn test_tool_failure_is_error_result() {
        let (base_url, _seen) = start_mock().await;
        let mcp = mcp_server(base_url);

        let result = mcp
            .list_universes(Parameters(PageParams {
                offset: None,
                limit: None,
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        let body = result_text(&result);
        assert_eq!(body["error"], json!("Failed to list universes"));
        let details = body["details"].as_str().unwrap();
        assert!(details.contains("500"));
        assert!(details.contains("RWS 00012"));
    }

    #[tokio::test]
    async fn test_tool_names() {
        let mcp = mcp_server("http://127.0.0.1:1".to_string());
        let names: Vec<String> = mcp
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();

        assert_eq!(names.len(), 13);
        assert!(names.contains(&"log_off".to_string()));
        assert!(!names.contains(&"end_session".to_string()));
        assert!(names.contains(&"session_status".to_string()));
    }
}
