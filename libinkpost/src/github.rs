//! Thin GitHub REST client shared by the token issuer and the publisher

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, Url};
use serde::Deserialize;

const USER_AGENT: &str = "inkpost";
const API_VERSION: &str = "2022-11-28";

#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base_url: String,
}

impl GitHubClient {
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialized.
    pub fn new(api_base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            api_base_url: api_base_url.into(),
        })
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// Build `{api_base_url}/{segments...}`, percent-encoding each segment
    pub fn url<I, S>(&self, segments: I) -> Option<Url>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut url = Url::parse(&self.api_base_url).ok()?;
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(segments);
        Some(url)
    }

    /// A request carrying GitHub's JSON media type, API version and a bearer token
    pub fn request(&self, method: Method, url: Url, bearer: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .bearer_auth(bearer)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// `"<status>: <message>"` for a failed response, using GitHub's `message`
/// field when the body has one
pub async fn describe_failure(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or(body);

    if message.trim().is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, message.trim())
    }
}
