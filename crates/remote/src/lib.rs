use async_trait::async_trait;
use clipdeck_backends::RemotePlayback;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("playback API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no access token configured")]
    MissingToken,
}

pub type Result<T> = std::result::Result<T, RemoteError>;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DevicesResponse {
    #[serde(default)]
    devices: Vec<Device>,
}

pub struct WebPlaybackClient {
    http: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl WebPlaybackClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub async fn start_playback(&self, device: &str, track_ref: &str, offset: Duration) -> Result<()> {
        let url = self.endpoint("me/player/play", Some(device))?;
        let body = json!({
            "uris": [track_ref],
            "position_ms": offset.as_millis() as u64,
        });
        debug!(%url, track_ref, "PUT play");

        let response = self
            .http
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        check_status(response).await
    }

    pub async fn pause_playback(&self, device: &str) -> Result<()> {
        let url = self.endpoint("me/player/pause", Some(device))?;
        debug!(%url, "PUT pause");

        let response = self
            .http
            .put(url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await?;
        check_status(response).await
    }

    pub async fn devices(&self) -> Result<Vec<Device>> {
        let url = self.endpoint("me/player/devices", None)?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: DevicesResponse = response.json().await?;
        Ok(parsed.devices)
    }

    /// Whether `device_id` is currently listed for the account.
    pub async fn check_device(&self, device_id: &str) -> Result<bool> {
        let devices = self.devices().await?;
        Ok(devices
            .iter()
            .any(|d| d.id.as_deref() == Some(device_id)))
    }

    fn endpoint(&self, path: &str, device: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}", self.api_base, path))?;
        if let Some(device) = device {
            url.query_pairs_mut().append_pair("device_id", device);
        }
        Ok(url)
    }
}

async fn check_status(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RemotePlayback for WebPlaybackClient {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn start(&self, device: &str, track_ref: &str, offset: Duration) -> anyhow::Result<()> {
        Ok(self.start_playback(device, track_ref, offset).await?)
    }

    async fn pause(&self, device: &str) -> anyhow::Result<()> {
        Ok(self.pause_playback(device).await?)
    }
}

#[derive(Default)]
pub struct ClientBuilder {
    http: Option<reqwest::Client>,
    api_base: Option<String>,
    access_token: Option<String>,
    timeout: Option<Duration>,
}

impl ClientBuilder {
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = Some(url.into());
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<WebPlaybackClient> {
        let access_token = self
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or(RemoteError::MissingToken)?;

        let http = match self.http {
            Some(client) => client,
            None => reqwest::Client::builder()
                .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
                .build()?,
        };

        let api_base = self
            .api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        Url::parse(&api_base)?;

        Ok(WebPlaybackClient {
            http,
            api_base,
            access_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{RemoteError, WebPlaybackClient};
    use clipdeck_backends::RemotePlayback;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> WebPlaybackClient {
        WebPlaybackClient::builder()
            .api_base(format!("{}/v1/", server.uri()))
            .access_token("tok")
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_a_token() {
        assert!(matches!(
            WebPlaybackClient::builder().build(),
            Err(RemoteError::MissingToken)
        ));
        assert!(matches!(
            WebPlaybackClient::builder().access_token("  ").build(),
            Err(RemoteError::MissingToken)
        ));
    }

    #[test]
    fn builder_trims_trailing_slash() {
        let client = WebPlaybackClient::builder()
            .api_base("https://api.example.com/v1/")
            .access_token("tok")
            .build()
            .unwrap();
        assert_eq!(client.api_base(), "https://api.example.com/v1");
    }

    #[tokio::test]
    async fn start_sends_track_and_offset_to_device() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/me/player/play"))
            .and(query_param("device_id", "dev-1"))
            .and(header("authorization", "Bearer tok"))
            .and(body_json(json!({
                "uris": ["spotify:track:abc"],
                "position_ms": 45_500,
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .start("dev-1", "spotify:track:abc", Duration::from_millis(45_500))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn pause_failure_reports_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/me/player/pause"))
            .and(query_param("device_id", "dev-1"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Restriction violated"))
            .mount(&server)
            .await;

        let err = client(&server).pause_playback("dev-1").await.unwrap_err();
        match err {
            RemoteError::Status { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "Restriction violated");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn device_check_looks_for_the_configured_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/me/player/devices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "devices": [
                    {"id": "dev-1", "name": "Desk", "is_active": true, "type": "Computer"},
                    {"id": null, "name": "Restricted", "is_active": false}
                ]
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let devices = client.devices().await.unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].kind.as_deref(), Some("Computer"));
        assert!(client.check_device("dev-1").await.unwrap());
        assert!(!client.check_device("dev-2").await.unwrap());
    }
}
