use crate::api::{ApiError, KeyKind, Resource};
use crate::config::Config;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    token: RwLock<Option<String>>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            token: RwLock::new(None),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(
            &config.api_base_url,
            &config.api_username,
            &config.api_password,
            Duration::from_secs(config.api_timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Exchange the configured credentials for a bearer token and keep it.
    pub async fn login(&self) -> Result<String, ApiError> {
        debug!("API client: logging in as '{}'", self.username);
        let response = self
            .http
            .post(self.url("auth/login"))
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!("API client: login rejected for '{}'", self.username);
            return Err(ApiError::Unauthorized);
        }
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let LoginResponse { token } = serde_json::from_str(&text)?;
        *self.token.write().await = Some(token.clone());
        info!("API client: logged in as '{}'", self.username);
        Ok(token)
    }

    async fn current_token(&self) -> Result<String, ApiError> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.login().await
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: &str,
    ) -> Result<Response, ApiError> {
        let mut request = self.http.request(method, self.url(path)).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Send one request. A 401 triggers a single re-login and one retry.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, ApiError> {
        let token = self.current_token().await?;
        let mut response = self.dispatch(method.clone(), path, body, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("API client: {} {} returned 401, logging in again", method, path);
            let token = self.login().await?;
            response = self.dispatch(method.clone(), path, body, &token).await?;
        }

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(path.to_string()));
        }

        let text = response.text().await?;
        if !status.is_success() {
            warn!("API client: {} {} failed with {}", method, path, status);
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!("API client: {} {} -> {}", method, path, status);
        if text.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(serde_json::from_str(&text)?))
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let value = self.send(Method::GET, path, None).await?;
        Ok(serde_json::from_value(value.unwrap_or(Value::Null))?)
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let value = self.send(Method::POST, path, Some(&body)).await?;
        Ok(serde_json::from_value(value.unwrap_or(Value::Null))?)
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let body = serde_json::to_value(body)?;
        self.send(Method::PUT, path, Some(&body)).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// Store a new record. Records with server-assigned keys come back with their id set.
    pub async fn create<R: Resource>(&self, resource: &R) -> Result<R, ApiError> {
        match R::KEY_KIND {
            KeyKind::Assigned => self.post(&resource.collection_path(), resource).await,
            KeyKind::Known => {
                self.put(&resource.item_path()?, resource).await?;
                Ok(resource.clone())
            }
        }
    }

    /// PUT the full current state of a record.
    pub async fn update<R: Resource>(&self, resource: &R) -> Result<(), ApiError> {
        self.put(&resource.item_path()?, resource).await
    }

    /// Deleting something the API no longer has is not an error.
    pub async fn delete_resource<R: Resource>(&self, resource: &R) -> Result<(), ApiError> {
        match self.delete(&resource.item_path()?).await {
            Err(ApiError::NotFound(path)) => {
                debug!("API client: {} was already gone", path);
                Ok(())
            }
            other => other,
        }
    }
}
