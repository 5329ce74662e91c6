use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use boia_dashboard::fetch::auth::ApiKey;
use boia_dashboard::fetch::{BasicClient, Fetched, HttpClient, fetch};
use boia_dashboard::metrics::MetricsSource;
use boia_dashboard::output::Period;
use boia_dashboard::parser::parse_device_stats;
use chrono::SecondsFormat;
use reqwest::{Method, Request, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::infra::session::Session;
use crate::services::device_api::{Device, DeviceApi, User};

#[derive(Serialize)]
struct LoginRequest<'a> {
    mail: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    mail: &'a str,
    password: &'a str,
    role: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
    user: User,
}

#[derive(Deserialize)]
struct ValidateResponse {
    user: User,
}

#[derive(Serialize)]
struct UpdateDeviceRequest<'a> {
    id: &'a str,
    name: &'a str,
    user_id: &'a str,
}

/// REST client for the tracking backend, authenticated as one user.
pub struct BackendClient<C = ApiKey<BasicClient>> {
    base_url: Url,
    http: C,
    user_id: String,
}

impl BackendClient {
    /// Authenticated client for the session's user.
    pub fn connect(base_url: &str, session: &Session) -> Result<Self> {
        let http = ApiKey::bearer(BasicClient::new()?, &session.token)?;
        Self::with_client(base_url, http, &session.user.id)
    }

    /// Exchanges credentials for a token.
    #[tracing::instrument(skip(password))]
    pub async fn login(base_url: &str, mail: &str, password: &str) -> Result<Session> {
        let url = endpoint(&parse_base(base_url)?, "/login")?;
        let req = json_request(Method::POST, url, &LoginRequest { mail, password })?;

        let fetched = fetch(&BasicClient::new()?, req).await?;
        if !fetched.status.is_success() {
            return Err(failure(&fetched, "Failed to login"));
        }

        let login: LoginResponse =
            serde_json::from_slice(&fetched.body).context("Failed to parse login response")?;
        info!(user_id = %login.user.id, "Logged in");

        Ok(Session {
            token: login.token,
            user: login.user,
        })
    }

    /// Creates an account, then logs into it.
    #[tracing::instrument(skip(password))]
    pub async fn register(base_url: &str, name: &str, mail: &str, password: &str) -> Result<Session> {
        let url = endpoint(&parse_base(base_url)?, "/register")?;
        let body = RegisterRequest {
            name,
            mail,
            password,
            role: "user",
        };
        let req = json_request(Method::POST, url, &body)?;

        let fetched = fetch(&BasicClient::new()?, req).await?;
        if !fetched.status.is_success() {
            return Err(failure(&fetched, "Failed to register"));
        }

        Self::login(base_url, mail, password).await
    }

    /// Returns the token's user, or `None` when the backend rejects the token.
    #[tracing::instrument(skip(token))]
    pub async fn validate_token(base_url: &str, token: &str) -> Result<Option<User>> {
        let url = endpoint(&parse_base(base_url)?, "/validate-token")?;
        let http = ApiKey::bearer(BasicClient::new()?, token)?;

        let fetched = fetch(&http, Request::new(Method::GET, url)).await?;
        if !fetched.status.is_success() {
            debug!(status = %fetched.status, "Token rejected");
            return Ok(None);
        }

        let resp: ValidateResponse = serde_json::from_slice(&fetched.body)
            .context("Failed to parse token validation response")?;
        Ok(Some(resp.user))
    }
}

impl<C: HttpClient> BackendClient<C> {
    pub fn with_client(base_url: &str, http: C, user_id: &str) -> Result<Self> {
        Ok(Self {
            base_url: parse_base(base_url)?,
            http,
            user_id: user_id.to_string(),
        })
    }

    async fn send(&self, req: Request, what: &str) -> Result<Fetched> {
        let fetched = fetch(&self.http, req).await?;
        if !fetched.status.is_success() {
            return Err(failure(&fetched, what));
        }
        Ok(fetched)
    }
}

#[async_trait]
impl<C: HttpClient> DeviceApi for BackendClient<C> {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        let url = devices_url(&self.base_url, &[("user_id", &self.user_id)])?;

        let fetched = self
            .send(Request::new(Method::GET, url), "Failed to fetch devices")
            .await?;

        serde_json::from_slice(&fetched.body).context("Failed to parse device list")
    }

    async fn create_device(&self, name: &str) -> Result<()> {
        let url = devices_url(&self.base_url, &[("user_id", &self.user_id), ("name", name)])?;

        self.send(Request::new(Method::POST, url), "Failed to create device")
            .await?;
        Ok(())
    }

    async fn update_device(&self, id: &str, name: &str) -> Result<()> {
        let url = devices_url(&self.base_url, &[])?;
        let body = UpdateDeviceRequest {
            id,
            name,
            user_id: &self.user_id,
        };

        self.send(json_request(Method::PUT, url, &body)?, "Failed to update device")
            .await?;
        Ok(())
    }

    async fn delete_device(&self, id: &str) -> Result<()> {
        let url = devices_url(&self.base_url, &[("id", id)])?;

        self.send(Request::new(Method::DELETE, url), "Failed to delete device")
            .await?;
        Ok(())
    }

    async fn device_metrics(
        &self,
        device_id: &str,
        period: Option<&Period>,
    ) -> Result<MetricsSource> {
        let url = device_stats_url(&self.base_url, device_id, period)?;

        let fetched = fetch(&self.http, Request::new(Method::GET, url)).await?;
        metrics_from_response(&fetched)
    }
}

/// 404 means the device has no data yet.
fn metrics_from_response(fetched: &Fetched) -> Result<MetricsSource> {
    if fetched.status == StatusCode::NOT_FOUND {
        return Ok(MetricsSource::empty());
    }
    if !fetched.status.is_success() {
        return Err(failure(fetched, "Failed to fetch dashboard metrics"));
    }
    parse_device_stats(&fetched.body)
}

fn failure(fetched: &Fetched, fallback: &str) -> anyhow::Error {
    let message = fetched
        .error_message()
        .unwrap_or_else(|| fallback.to_string());
    anyhow!("{} (status {})", message, fetched.status)
}

fn parse_base(base_url: &str) -> Result<Url> {
    Url::parse(base_url).with_context(|| format!("Invalid API URL `{base_url}`"))
}

fn endpoint(base: &Url, path: &str) -> Result<Url> {
    let joined = format!("{}{}", base.as_str().trim_end_matches('/'), path);
    Url::parse(&joined).with_context(|| format!("Invalid endpoint `{joined}`"))
}

fn devices_url(base: &Url, query: &[(&str, &str)]) -> Result<Url> {
    let mut url = endpoint(base, "/api/devices")?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}

fn device_stats_url(base: &Url, device_id: &str, period: Option<&Period>) -> Result<Url> {
    let mut url = endpoint(base, "/api/deviceStats")?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("deviceId", device_id);
        if let Some(period) = period {
            query.append_pair(
                "startDate",
                &period.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            );
            query.append_pair(
                "endDate",
                &period.end.to_rfc3339_opts(SecondsFormat::Millis, true),
            );
        }
    }
    Ok(url)
}

fn json_request<T: Serialize>(method: Method, url: Url, body: &T) -> Result<Request> {
    let mut req = Request::new(method, url);
    req.headers_mut().insert(
        reqwest::header::CONTENT_TYPE,
        reqwest::header::HeaderValue::from_static("application/json"),
    );
    *req.body_mut() = Some(serde_json::to_vec(body)?.into());
    Ok(req)
}
