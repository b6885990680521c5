//! Blocking HTTP client for a running `sheetenv-server`.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use sheetenv::core::types::{Action, EpisodeState, Observation, StepResponse};
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct EnvClient {
    base_url: String,
    http: Client,
}

impl EnvClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn health(&self) -> Result<()> {
        let response = self
            .http
            .get(self.url("/health"))
            .send()
            .with_context(|| format!("GET {}", self.url("/health")))?;
        check_status(response).map(|_| ())
    }

    pub fn reset(&self) -> Result<Observation> {
        let response: StepResponse = self.post("/reset", None)?;
        Ok(response.into_observation())
    }

    /// Sends `{command, parameters}`; top-level `reward`/`done` are folded
    /// back onto the returned observation.
    pub fn step(&self, action: &Action) -> Result<Observation> {
        let body = json!({
            "command": action.command,
            "parameters": action.parameters,
        });
        let response: StepResponse = self.post("/step", Some(body))?;
        Ok(response.into_observation())
    }

    pub fn state(&self) -> Result<EpisodeState> {
        let url = self.url("/state");
        let response = self
            .http
            .get(&url)
            .send()
            .with_context(|| format!("GET {url}"))?;
        parse_json(response, &url)
    }

    pub fn close(&self) -> Result<Observation> {
        let response: StepResponse = self.post("/close", None)?;
        Ok(response.into_observation())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post<T: DeserializeOwned>(&self, path: &str, body: Option<serde_json::Value>) -> Result<T> {
        let url = self.url(path);
        debug!(url = %url, "request");
        let mut request = self.http.post(&url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().with_context(|| format!("POST {url}"))?;
        parse_json(response, &url)
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        bail!("server returned {status}: {body}");
    }
    Ok(response)
}

fn parse_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T> {
    check_status(response)?
        .json()
        .with_context(|| format!("parse response from {url}"))
}
