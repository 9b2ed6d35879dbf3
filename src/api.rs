// API client module: a small blocking HTTP client for the WeChat Official
// Account platform. Every operation is a single request/response cycle;
// nothing is cached or retried, and access tokens are fetched fresh on
// every invocation.

use anyhow::{bail, Context, Result};
use reqwest::blocking::{multipart, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

/// Production API host. Overridable through `WECHAT_API_BASE`, which also
/// makes the client pointable at a local stub server.
pub const PRODUCTION_BASE_URL: &str = "https://api.weixin.qq.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Official-account credentials used for the token exchange. Constructed
/// once at the CLI boundary and passed explicitly into
/// [`ApiClient::fetch_access_token`]; no API call reads the environment.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub app_id: String,
    pub app_secret: String,
}

impl Credentials {
    /// Read `WECHAT_APP_ID` and `WECHAT_APP_SECRET`. Fails before any
    /// network call when either is missing.
    pub fn from_env() -> Result<Self> {
        let app_id = std::env::var("WECHAT_APP_ID")
            .context("WECHAT_APP_ID environment variable is required")?;
        let app_secret = std::env::var("WECHAT_APP_SECRET")
            .context("WECHAT_APP_SECRET environment variable is required")?;
        Ok(Credentials { app_id, app_secret })
    }
}

/// Article record as read from a JSON file. Field names and defaults mirror
/// the platform's `add_news` payload; `show_cover_pic` and the comment
/// flags are 0/1 integers on the wire.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Article {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb_media_id: Option<String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default = "default_show_cover_pic")]
    pub show_cover_pic: u8,
    #[serde(default)]
    pub content_source_url: String,
    #[serde(default)]
    pub need_open_comment: u8,
    #[serde(default)]
    pub only_fans_can_comment: u8,
}

fn default_show_cover_pic() -> u8 {
    1
}

impl Article {
    /// Load an article from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("article file does not exist: {}", path.display());
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read article file {}", path.display()))?;
        let article: Article = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse article file {}", path.display()))?;
        Ok(article)
    }

    /// Title and content must be non-empty before a request is sent.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() || self.content.trim().is_empty() {
            bail!("article must have non-empty title and content fields");
        }
        Ok(())
    }
}

/// Result of an image upload, passed through to the caller unchanged.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub media_id: String,
    pub url: String,
}

/// Blocking API client holding a reqwest client and the API base URL.
/// All requests carry an explicit timeout; a hung server fails the call
/// instead of hanging the process.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create an ApiClient configured from the environment variable
    /// `WECHAT_API_BASE`, falling back to the production host.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("WECHAT_API_BASE").unwrap_or_else(|_| PRODUCTION_BASE_URL.into());
        Self::new(base_url)
    }

    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(ApiClient {
            client,
            base_url: base_url.into(),
        })
    }

    /// Exchange credentials for a short-lived access token via
    /// `GET /cgi-bin/token`. Every call is a fresh round trip.
    pub fn fetch_access_token(&self, credentials: &Credentials) -> Result<String> {
        let url = format!("{}/cgi-bin/token", self.base_url);
        let res = self
            .client
            .get(&url)
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", credentials.app_id.as_str()),
                ("secret", credentials.app_secret.as_str()),
            ])
            .send()
            .context("failed to send access token request")?;
        parse_token_response(&read_body(res)?)
    }

    /// Create an article draft via `POST /cgi-bin/material/add_news` and
    /// return the media id of the staged draft.
    pub fn create_draft(&self, access_token: &str, article: &Article) -> Result<String> {
        article.validate()?;
        let url = format!(
            "{}/cgi-bin/material/add_news?access_token={}",
            self.base_url, access_token
        );
        let res = self
            .client
            .post(&url)
            .json(&draft_envelope(article))
            .send()
            .context("failed to send draft creation request")?;
        parse_draft_response(&read_body(res)?)
    }

    /// Upload a local image via `POST /cgi-bin/media/uploadimg` as
    /// multipart form data. The platform expects the file in a single
    /// `buffer` field.
    pub fn upload_image(&self, access_token: &str, path: &Path) -> Result<ImageUpload> {
        if !path.exists() {
            bail!("image file does not exist: {}", path.display());
        }
        let url = format!(
            "{}/cgi-bin/media/uploadimg?access_token={}",
            self.base_url, access_token
        );
        let file = File::open(path)
            .with_context(|| format!("failed to open image file {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("image.jpg")
            .to_string();
        let part = multipart::Part::reader(file).file_name(file_name);
        let form = multipart::Form::new().part("buffer", part);
        let res = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .context("failed to send image upload request")?;
        parse_upload_response(&read_body(res)?)
    }

    /// Send a previously created draft to all subscribers via
    /// `POST /cgi-bin/message/mass/sendall` and return the message id.
    pub fn mass_send(&self, access_token: &str, media_id: &str) -> Result<String> {
        let url = format!(
            "{}/cgi-bin/message/mass/sendall?access_token={}",
            self.base_url, access_token
        );
        let res = self
            .client
            .post(&url)
            .json(&mass_send_envelope(media_id))
            .send()
            .context("failed to send mass send request")?;
        parse_mass_send_response(&read_body(res)?)
    }
}

/// Read the body, rejecting non-2xx responses with status and body text.
fn read_body(res: reqwest::blocking::Response) -> Result<String> {
    let status = res.status();
    let body = res.text().context("failed to read response body")?;
    if !status.is_success() {
        bail!("request failed: {} - {}", status, body);
    }
    Ok(body)
}

// The platform reports errors as a 200 response whose body lacks the
// expected success field (typically `{"errcode":..,"errmsg":..}`), so the
// parsers below branch on field presence rather than HTTP status.

fn parse_json(body: &str) -> Result<Value> {
    serde_json::from_str(body).with_context(|| format!("failed to parse response: {}", body))
}

/// Extract a field from a parsed response, surfacing the full object when
/// it is missing. Numeric fields (e.g. `msg_id`) are rendered as text.
fn expect_field(response: &Value, field: &str) -> Result<String> {
    match response.get(field) {
        Some(value) => Ok(field_as_string(value)),
        None => bail!("unexpected response from server: {}", response),
    }
}

fn field_as_string(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

/// The `add_news` endpoint expects a single-element article collection.
fn draft_envelope(article: &Article) -> Value {
    serde_json::json!({ "articles": [article] })
}

/// Send-to-all envelope for `message/mass/sendall`.
fn mass_send_envelope(media_id: &str) -> Value {
    serde_json::json!({
        "filter": { "is_to_all": true, "tag_id": "" },
        "mpnews": { "media_id": media_id },
        "msgtype": "mpnews"
    })
}

fn parse_token_response(body: &str) -> Result<String> {
    expect_field(&parse_json(body)?, "access_token")
}

fn parse_draft_response(body: &str) -> Result<String> {
    expect_field(&parse_json(body)?, "media_id")
}

fn parse_upload_response(body: &str) -> Result<ImageUpload> {
    let response = parse_json(body)?;
    // `url` is the success marker; some platform versions omit `media_id`.
    let url = expect_field(&response, "url")?;
    let media_id = response
        .get("media_id")
        .map(field_as_string)
        .unwrap_or_default();
    Ok(ImageUpload { media_id, url })
}

fn parse_mass_send_response(body: &str) -> Result<String> {
    expect_field(&parse_json(body)?, "msg_id")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article_from_json(json: &str) -> Article {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn credentials_from_env_fails_without_variables() {
        std::env::remove_var("WECHAT_APP_ID");
        std::env::remove_var("WECHAT_APP_SECRET");
        let err = Credentials::from_env().unwrap_err();
        assert!(err.to_string().contains("WECHAT_APP_ID"));
    }

    #[test]
    fn token_response_yields_bare_token() {
        assert_eq!(
            parse_token_response(r#"{"access_token":"T"}"#).unwrap(),
            "T"
        );
    }

    #[test]
    fn token_error_object_is_surfaced() {
        let err = parse_token_response(r#"{"errcode":40001,"errmsg":"bad"}"#).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("40001"));
        assert!(msg.contains("bad"));
    }

    #[test]
    fn non_json_body_is_surfaced_raw() {
        let err = parse_token_response("<html>gateway timeout</html>").unwrap_err();
        assert!(err.to_string().contains("gateway timeout"));
    }

    #[test]
    fn article_missing_content_fails_validation() {
        let article = article_from_json(r#"{"title":"Hello"}"#);
        let err = article.validate().unwrap_err();
        assert!(err.to_string().contains("title and content"));
    }

    #[test]
    fn article_defaults_match_platform_expectations() {
        let article = article_from_json(r#"{"title":"Hello","content":"<p>hi</p>"}"#);
        assert!(article.validate().is_ok());
        assert_eq!(article.show_cover_pic, 1);
        assert_eq!(article.author, "");
        assert_eq!(article.need_open_comment, 0);
        assert_eq!(article.only_fans_can_comment, 0);
        assert!(article.thumb_media_id.is_none());
    }

    #[test]
    fn draft_envelope_wraps_single_article() {
        let article = article_from_json(
            r#"{"title":"Hello","content":"<p>hi</p>","thumb_media_id":"TH1"}"#,
        );
        let envelope = draft_envelope(&article);
        let articles = envelope["articles"].as_array().unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0]["title"], "Hello");
        assert_eq!(articles[0]["thumb_media_id"], "TH1");
        assert_eq!(articles[0]["show_cover_pic"], 1);
    }

    #[test]
    fn absent_thumb_media_id_is_omitted_from_payload() {
        let article = article_from_json(r#"{"title":"Hello","content":"<p>hi</p>"}"#);
        let envelope = draft_envelope(&article);
        assert!(envelope["articles"][0].get("thumb_media_id").is_none());
    }

    #[test]
    fn draft_response_yields_media_id() {
        assert_eq!(parse_draft_response(r#"{"media_id":"M1"}"#).unwrap(), "M1");
    }

    #[test]
    fn mass_send_envelope_targets_all_subscribers() {
        let envelope = mass_send_envelope("M1");
        assert_eq!(envelope["mpnews"]["media_id"], "M1");
        assert_eq!(envelope["msgtype"], "mpnews");
        assert_eq!(envelope["filter"]["is_to_all"], true);
        assert_eq!(envelope["filter"]["tag_id"], "");
    }

    #[test]
    fn upload_response_passes_both_values_through() {
        let upload = parse_upload_response(r#"{"media_id":"I1","url":"http://x/I1"}"#).unwrap();
        assert_eq!(upload.media_id, "I1");
        assert_eq!(upload.url, "http://x/I1");
    }

    #[test]
    fn upload_response_without_url_is_an_error() {
        let err = parse_upload_response(r#"{"errcode":40004,"errmsg":"invalid media type"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("invalid media type"));
    }

    #[test]
    fn numeric_msg_id_is_rendered_as_text() {
        assert_eq!(
            parse_mass_send_response(r#"{"msg_id":34182,"errcode":0}"#).unwrap(),
            "34182"
        );
    }
}
