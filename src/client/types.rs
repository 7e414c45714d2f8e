//! Type definitions for the BI platform REST API.
//!
//! This module contains the request and response types shared by the session
//! manager and the endpoint operations.
//!
//! ## Key Types
//!
//! - [`Credentials`] / [`AuthType`] - Log-on input and its XML payload
//! - [`Page`] - `offset`/`limit` passed through to list endpoints
//! - [`FolderRef`] - Addressing of an infostore folder
//! - [`FileUpload`] / [`UploadOutcome`] - Multipart upload input and result

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::client::error::BiError;

/// Authentication plugin used by the CMS to check credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthType {
    #[default]
    #[serde(rename = "secEnterprise")]
    Enterprise,
    #[serde(rename = "secLDAP")]
    Ldap,
    #[serde(rename = "secWinAD")]
    WinAd,
    #[serde(rename = "secSAPR3")]
    SapR3,
}

impl AuthType {
    pub const ALL: [AuthType; 4] = [
        AuthType::Enterprise,
        AuthType::Ldap,
        AuthType::WinAd,
        AuthType::SapR3,
    ];

    /// Wire name sent in the `auth` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::Enterprise => "secEnterprise",
            AuthType::Ldap => "secLDAP",
            AuthType::WinAd => "secWinAD",
            AuthType::SapR3 => "secSAPR3",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = BiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuthType::ALL
            .into_iter()
            .find(|auth| auth.as_str() == s)
            .ok_or_else(|| BiError::InvalidAuthType(s.to_string()))
    }
}

/// User credentials exchanged for a logon token.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub auth_type: AuthType,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>, auth_type: AuthType) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            auth_type,
        }
    }

    /// Builds the `attrs` document posted to `/biprws/logon/long`.
    pub fn to_logon_xml(&self) -> String {
        format!(
            concat!(
                r#"<attrs xmlns="http://www.sap.com/rws/bip">"#,
                r#"<attr name="password" type="string">{}</attr>"#,
                r#"<attr name="auth" type="string" possibilities="secEnterprise,secLDAP,secWinAD,secSAPR3">{}</attr>"#,
                r#"<attr name="userName" type="string">{}</attr>"#,
                "</attrs>"
            ),
            escape_xml(&self.password),
            self.auth_type.as_str(),
            escape_xml(&self.username),
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("auth_type", &self.auth_type)
            .finish()
    }
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Pagination parameters, forwarded verbatim as `offset` and `limit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

impl Page {
    pub fn new(offset: u32, limit: u32) -> Self {
        Self {
            offset: Some(offset),
            limit: Some(limit),
        }
    }

    pub(crate) fn query(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![];
        if let Some(offset) = self.offset {
            params.push(("offset", offset.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        params
    }
}

/// Infostore folder to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderRef {
    /// The infostore root
    Root,
    /// Folder by numeric SI_ID
    Id(u64),
    /// Folder by CUID
    Cuid(String),
}

impl FolderRef {
    pub(crate) fn path(&self) -> String {
        match self {
            FolderRef::Root => "/biprws/infostore".to_string(),
            FolderRef::Id(id) => format!("/biprws/infostore/{}/children", id),
            FolderRef::Cuid(cuid) => format!(
                "/biprws/infostore/cuid_{}/children",
                urlencoding::encode(cuid)
            ),
        }
    }
}

/// A file sent as the `attachment` part of an upload.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .to_string();
        Self {
            file_name,
            mime_type,
            content,
        }
    }

    /// Reads `path` and guesses the MIME type from its extension.
    pub async fn from_path(path: impl AsRef<std::path::Path>) -> crate::client::error::Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(file_name, content))
    }
}

/// Where a new file lands in the repository.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub name: String,
    pub folder_id: u64,
}

/// `request` part of a new upload.
#[derive(Debug, Serialize)]
pub(crate) struct SpreadsheetRequest<'a> {
    pub spreadsheet: SpreadsheetFields<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SpreadsheetFields<'a> {
    pub name: &'a str,
    pub folder_id: u64,
}

/// Server acknowledgement of an upload or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub message: String,
    #[serde(default)]
    pub id: Option<u64>,
}

/// `{"success": {...}}` wrapper returned by write endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct SuccessEnvelope {
    pub success: UploadOutcome,
}

/// Error body returned by the REST services.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error_code: Option<String>,
    pub message: String,
}
