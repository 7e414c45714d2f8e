use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;

use crate::client::{
    auth::{BiAuth, Session, LOGON_TOKEN_HEADER},
    error::{BiError, Result},
    flatten::{ColumnNaming, Flattener, Table},
    types::*,
};

pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";

const RAYLIGHT: &str = "/biprws/raylight/v1";

/// REST client for one BI platform host.
///
/// Holds no session state: every call takes the [`Session`] to authenticate
/// with, and list/get operations return flattened [`Table`]s.
#[derive(Debug, Clone)]
pub struct BiClient {
    base_url: String,
    client: Client,
    auth: BiAuth,
    flattener: Flattener,
}

impl BiClient {
    pub fn new(base_url: String) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = Client::new();
        Self {
            auth: BiAuth::new(base_url.clone(), client.clone()),
            client,
            base_url,
            flattener: Flattener::default(),
        }
    }

    /// Switches how nested response fields are named once flattened.
    pub fn with_column_naming(mut self, naming: ColumnNaming) -> Self {
        self.flattener = Flattener::new(naming);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn log_on(&self, credentials: &Credentials) -> Result<Session> {
        self.auth.log_on(credentials).await
    }

    pub async fn log_off(&self, session: &mut Session) -> Result<()> {
        self.auth.log_off(session).await
    }

    fn request(&self, session: &Session, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("Making {} request to: {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .header(ACCEPT, JSON_CONTENT_TYPE);
        match token_header(session)? {
            Some(value) => request = request.header(LOGON_TOKEN_HEADER, value),
            None => tracing::debug!("No active session, sending request without logon token"),
        }
        Ok(request)
    }

    async fn get_json(&self, session: &Session, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .request(session, Method::GET, path)?
            .query(query)
            .send()
            .await?;
        tracing::debug!("Response status for {}: {}", path, response.status());

        let response = ensure_success(response).await?;
        ensure_json(&response)?;
        Ok(response.json().await?)
    }

    /// GETs `path` and flattens the records found at the JSON pointer `records_at`.
    async fn get_table(
        &self,
        session: &Session,
        path: &str,
        query: &[(&str, String)],
        records_at: &str,
    ) -> Result<Table> {
        let body = self.get_json(session, path, query).await?;
        let table = match body.pointer(records_at) {
            Some(records) => self.flattener.flatten(records),
            None => {
                tracing::debug!("No records at {} in response from {}", records_at, path);
                Table::default()
            }
        };
        tracing::debug!("Retrieved {} rows from {}", table.len(), path);
        Ok(table)
    }

    async fn send_multipart(
        &self,
        session: &Session,
        method: Method,
        path: &str,
        form: Form,
    ) -> Result<UploadOutcome> {
        let response = self
            .request(session, method, path)?
            .multipart(form)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        ensure_json(&response)?;
        let envelope: SuccessEnvelope = response.json().await?;
        tracing::info!("Upload to {} succeeded: {}", path, envelope.success.message);
        Ok(envelope.success)
    }

    // Document operations
    pub async fn list_documents(&self, session: &Session, page: Page) -> Result<Table> {
        let path = format!("{}/documents", RAYLIGHT);
        self.get_table(session, &path, &page.query(), "/documents/document")
            .await
    }

    pub async fn get_document(&self, session: &Session, document_id: u64) -> Result<Table> {
        let path = format!("{}/documents/{}", RAYLIGHT, document_id);
        self.get_table(session, &path, &[], "/document").await
    }

    // Schedule operations
    pub async fn list_document_schedules(&self, session: &Session, document_id: u64) -> Result<Table> {
        let path = format!("{}/documents/{}/schedules", RAYLIGHT, document_id);
        self.get_table(session, &path, &[], "/schedules/schedule").await
    }

    pub async fn get_document_schedule(
        &self,
        session: &Session,
        document_id: u64,
        schedule_id: u64,
    ) -> Result<Table> {
        let path = format!(
            "{}/documents/{}/schedules/{}",
            RAYLIGHT, document_id, schedule_id
        );
        self.get_table(session, &path, &[], "/schedule").await
    }

    // Connection operations
    pub async fn list_connections(&self, session: &Session, page: Page) -> Result<Table> {
        let path = format!("{}/connections", RAYLIGHT);
        self.get_table(session, &path, &page.query(), "/connections/connection")
            .await
    }

    pub async fn get_connection(&self, session: &Session, connection_id: u64) -> Result<Table> {
        let path = format!("{}/connections/{}", RAYLIGHT, connection_id);
        self.get_table(session, &path, &[], "/connection").await
    }

    // Universe operations
    pub async fn list_universes(&self, session: &Session, page: Page) -> Result<Table> {
        let path = format!("{}/universes", RAYLIGHT);
        self.get_table(session, &path, &page.query(), "/universes/universe")
            .await
    }

    pub async fn get_universe(&self, session: &Session, universe_id: u64) -> Result<Table> {
        let path = format!("{}/universes/{}", RAYLIGHT, universe_id);
        self.get_table(session, &path, &[], "/universe").await
    }

    // Infostore operations
    pub async fn list_folder(&self, session: &Session, folder: &FolderRef, page: Page) -> Result<Table> {
        self.get_table(session, &folder.path(), &page.query(), "/entries")
            .await
    }

    // Upload operations
    pub async fn upload_file(
        &self,
        session: &Session,
        target: &UploadTarget,
        file: FileUpload,
    ) -> Result<UploadOutcome> {
        let path = format!("{}/spreadsheets", RAYLIGHT);
        let request = serde_json::to_string(&SpreadsheetRequest {
            spreadsheet: SpreadsheetFields {
                name: &target.name,
                folder_id: target.folder_id,
            },
        })?;
        let form = Form::new()
            .part("attachment", attachment_part(file)?)
            .part("request", Part::text(request).mime_str(JSON_CONTENT_TYPE)?);

        self.send_multipart(session, Method::POST, &path, form).await
    }

    pub async fn update_file(
        &self,
        session: &Session,
        spreadsheet_id: u64,
        file: FileUpload,
    ) -> Result<UploadOutcome> {
        let path = format!("{}/spreadsheets/{}", RAYLIGHT, spreadsheet_id);
        let form = Form::new().part("attachment", attachment_part(file)?);

        self.send_multipart(session, Method::PUT, &path, form).await
    }

    pub async fn upload_path(
        &self,
        session: &Session,
        target: &UploadTarget,
        path: impl AsRef<std::path::Path>,
    ) -> Result<UploadOutcome> {
        let file = FileUpload::from_path(path).await?;
        self.upload_file(session, target, file).await
    }

    pub async fn update_path(
        &self,
        session: &Session,
        spreadsheet_id: u64,
        path: impl AsRef<std::path::Path>,
    ) -> Result<UploadOutcome> {
        let file = FileUpload::from_path(path).await?;
        self.update_file(session, spreadsheet_id, file).await
    }
}

fn attachment_part(file: FileUpload) -> Result<Part> {
    Ok(Part::bytes(file.content)
        .file_name(file.file_name)
        .mime_str(&file.mime_type)?)
}

/// Logon token header value for `session`, if it has one.
pub(crate) fn token_header(session: &Session) -> Result<Option<HeaderValue>> {
    session
        .token()
        .map(|token| {
            HeaderValue::from_str(token.value())
                .map_err(|e| BiError::InvalidHeader(format!("{}: {}", LOGON_TOKEN_HEADER, e)))
        })
        .transpose()
}

/// Passes 2xx responses through and turns anything else into [`BiError::Request`].
pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());
    tracing::error!("Request failed with status {}: {}", status, body);

    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody {
            error_code: Some(code),
            message,
        }) => format!("{}: {}", code, message),
        Ok(ErrorBody { message, .. }) => message,
        Err(_) if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string(),
        Err(_) => body,
    };
    Err(BiError::request(status.as_u16(), message))
}

/// Fails with [`BiError::Protocol`] unless the response is `application/json`.
pub(crate) fn ensure_json(response: &Response) -> Result<()> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    let media_type = content_type.split(';').next().unwrap_or("").trim();

    if media_type.eq_ignore_ascii_case(JSON_CONTENT_TYPE) {
        Ok(())
    } else {
        tracing::error!("Expected {} response, got '{}'", JSON_CONTENT_TYPE, content_type);
        let found = if content_type.is_empty() {
            "no content type".to_string()
        } else {
            content_type.to_string()
        };
        Err(BiError::protocol(JSON_CONTENT_TYPE, found))
    }
}
