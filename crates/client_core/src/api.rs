//! Transport layer for the remote analysis service.
//!
//! [`AnalysisApi`] is the seam between the lifecycle controller and the
//! service: one method per remote operation, each a single best-effort
//! request with no retries, timeouts, or caching. [`HttpAnalysisApi`] is the
//! production implementation over reqwest.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{multipart, Client};
use shared::{
    domain::{DetectionModule, JobId},
    protocol::{StatusResponse, UploadResponse, ViolationRecord},
};
use url::Url;

/// A video payload handed to [`AnalysisApi::submit_job`].
#[derive(Debug, Clone)]
pub struct VideoUpload {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait AnalysisApi: Send + Sync {
    /// Uploads the video and the selected module; returns the job id the
    /// service assigned.
    async fn submit_job(&self, upload: VideoUpload, module: DetectionModule) -> Result<JobId>;

    /// Fetches the current status of a job. An unknown job id surfaces as a
    /// plain transport failure; the service does not distinguish the two.
    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusResponse>;

    /// Fetches the full, cumulative violation report for a job.
    async fn fetch_report(&self, job_id: &JobId) -> Result<Vec<ViolationRecord>>;

    /// Turns a server-relative media locator into something the caller can
    /// open directly.
    fn resolve_media_url(&self, reference: &str) -> String {
        reference.to_string()
    }
}

pub struct HttpAnalysisApi {
    http: Client,
    server_url: String,
}

impl HttpAnalysisApi {
    pub fn new(server_url: &str) -> Result<Self> {
        Url::parse(server_url)
            .with_context(|| format!("invalid analysis server url: {server_url}"))?;
        Ok(Self {
            http: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AnalysisApi for HttpAnalysisApi {
    async fn submit_job(&self, upload: VideoUpload, module: DetectionModule) -> Result<JobId> {
        let mut file_part = multipart::Part::bytes(upload.bytes).file_name(upload.filename);
        if let Some(mime_type) = &upload.mime_type {
            file_part = file_part
                .mime_str(mime_type)
                .with_context(|| format!("invalid mime type: {mime_type}"))?;
        }
        let form = multipart::Form::new()
            .part("file", file_part)
            .text("case_type", module.wire_tag());

        let response: UploadResponse = self
            .http
            .post(format!("{}/upload", self.server_url))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.job_id)
    }

    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusResponse> {
        let response: StatusResponse = self
            .http
            .get(format!("{}/status/{job_id}", self.server_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response)
    }

    async fn fetch_report(&self, job_id: &JobId) -> Result<Vec<ViolationRecord>> {
        let report: Vec<ViolationRecord> = self
            .http
            .get(format!("{}/report/{job_id}", self.server_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(report)
    }

    fn resolve_media_url(&self, reference: &str) -> String {
        if reference.starts_with('/') {
            format!("{}{reference}", self.server_url)
        } else {
            format!("{}/{reference}", self.server_url)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_malformed_server_url() {
        assert!(HttpAnalysisApi::new("not a url").is_err());
    }

    #[test]
    fn media_urls_are_joined_with_the_server_base() {
        let api = HttpAnalysisApi::new("http://localhost:8000/").expect("api");
        assert_eq!(
            api.resolve_media_url("/media/out1.mp4"),
            "http://localhost:8000/media/out1.mp4"
        );
        assert_eq!(
            api.resolve_media_url("media/out1.mp4"),
            "http://localhost:8000/media/out1.mp4"
        );
    }
}
