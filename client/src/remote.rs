use async_trait::async_trait;
use common::{ExecutionService, JobHandle, JobInfo, JobSpec, PipelineError};
use reqwest::Client;

/// Servicio de ejecución remoto: el master, por HTTP.
#[derive(Debug, Clone)]
pub struct HttpExecutionService {
    client: Client,
    base_url: String,
}

impl HttpExecutionService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `None` si el master no conoce el job.
    pub async fn job(&self, id: &str) -> anyhow::Result<Option<JobInfo>> {
        let url = format!("{}/api/v1/jobs/{}", self.base_url, id);
        let resp = self.client.get(&url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let job: JobInfo = resp.error_for_status()?.json().await?;
        Ok(Some(job))
    }
}

#[async_trait]
impl ExecutionService for HttpExecutionService {
    async fn submit(&self, spec: JobSpec) -> common::Result<JobHandle> {
        let url = format!("{}/api/v1/jobs", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&spec)
            .send()
            .await
            .map_err(|e| PipelineError::Dispatch(format!("POST {url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Dispatch(format!(
                "master devolvió {status}: {body}"
            )));
        }

        let job: JobInfo = resp
            .json()
            .await
            .map_err(|e| PipelineError::Dispatch(format!("respuesta inválida: {e}")))?;
        Ok(job.handle())
    }
}
