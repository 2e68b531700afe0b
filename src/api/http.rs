//! reqwest-backed intake API client.

use super::{IntakeApi, StatusResponse, UploadBatch, UploadResponse};
use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::upload_queue::CaseId;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpIntakeClient {
    client: reqwest::Client,
    server_url: String,
    api_token: Option<String>,
}

impl HttpIntakeClient {
    pub fn new(config: &IntakeConfig) -> Result<Self, IntakeError> {
        let server_url = config.require_server_url()?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            server_url,
            api_token: config.api_token.clone(),
        })
    }

    pub fn upload_url(&self, case_id: CaseId) -> String {
        format!("{}/api/cases/{}/upload_files/", self.server_url, case_id)
    }

    pub fn status_url(&self, case_id: CaseId) -> String {
        format!("{}/api/cases/{}/file_status/", self.server_url, case_id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    fn build_form(batch: UploadBatch) -> Result<Form, IntakeError> {
        let mut form = Form::new().text("file_type", batch.file_type.to_string());

        for file in batch.files {
            let part = Part::bytes(file.content)
                .file_name(file.filename)
                .mime_str("application/octet-stream")?;
            form = form
                .part("files", part)
                .text("client_tokens", file.client_token);
        }

        Ok(form)
    }
}

async fn error_from_response(response: Response) -> IntakeError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    IntakeError::Http { status, body }
}

#[async_trait]
impl IntakeApi for HttpIntakeClient {
    async fn upload_batch(
        &self,
        case_id: CaseId,
        batch: UploadBatch,
    ) -> Result<UploadResponse, IntakeError> {
        debug!(
            case_id,
            files = batch.files.len(),
            bytes = batch.total_bytes(),
            "Submitting upload batch"
        );

        let form = Self::build_form(batch)?;
        let response = self
            .authorize(self.client.post(self.upload_url(case_id)))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<UploadResponse>().await?);
        }

        // A batch where every file was rejected still carries per-file errors
        if status.is_client_error() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return match serde_json::from_str::<UploadResponse>(&body) {
                Ok(parsed) if !parsed.errors.is_empty() => Ok(parsed),
                _ => Err(IntakeError::Http {
                    status: status.as_u16(),
                    body,
                }),
            };
        }

        Err(error_from_response(response).await)
    }

    async fn fetch_status(&self, case_id: CaseId) -> Result<StatusResponse, IntakeError> {
        let response = self
            .authorize(self.client.get(self.status_url(case_id)))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(response.json::<StatusResponse>().await?)
    }
}
