use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use super::{AuthError, SessionCredential, SessionStore, SESSION_COOKIE};
use crate::config::LoginCredentials;
use crate::http::{
    HttpRequest, HttpResponse, PayloadError, RequestContext, ResilientFetcher, Transport,
};
use crate::Result;

/// Obtains, caches and renews the login cookies used by private endpoints.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    store: Arc<dyn SessionStore>,
    credentials: Option<LoginCredentials>,
    login_url: String,
    ttl: Duration,
    login_gate: Mutex<()>,
    logins: AtomicUsize,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SessionManager")
            .field("store", &self.store.backend())
            .field("credentials", &self.credentials)
            .field("login_url", &self.login_url)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn SessionStore>,
        credentials: Option<LoginCredentials>,
        login_url: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            credentials,
            login_url: login_url.into(),
            ttl,
            login_gate: Mutex::new(()),
            logins: AtomicUsize::new(0),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// Number of login exchanges performed by this manager.
    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    /// Load valid session cookies into `context`, logging in when needed.
    pub async fn ensure_session(
        &self,
        context: &mut RequestContext,
    ) -> std::result::Result<(), AuthError> {
        if let Some(credential) = self.cached().await {
            context.load_cookies(&credential.tokens);
            return Ok(());
        }

        // Concurrent callers wait here; only the first one logs in.
        let _gate = self.login_gate.lock().await;
        if let Some(credential) = self.cached().await {
            context.load_cookies(&credential.tokens);
            return Ok(());
        }

        let credential = self.login().await?;
        if let Err(error) = self.store.set(&credential, self.ttl).await {
            tracing::warn!("Failed to cache session: {}", error);
        }
        context.load_cookies(&credential.tokens);
        Ok(())
    }

    /// Drop cached cookies so the next `ensure_session` logs in again.
    pub async fn invalidate(&self) -> std::result::Result<(), AuthError> {
        tracing::info!(backend = self.store.backend(), "Invalidating cached session");
        self.store.delete().await
    }

    /// Fetch a private resource, re-logging in once on an authorization failure.
    pub async fn fetch_authorized<T, P>(
        &self,
        fetcher: &ResilientFetcher,
        request: &HttpRequest,
        parse: P,
    ) -> Result<T>
    where
        P: Fn(&str) -> std::result::Result<T, PayloadError>,
    {
        let mut context = RequestContext::new();
        self.ensure_session(&mut context).await?;
        match fetcher.fetch(&context.apply(request.clone()), &parse).await {
            Err(error) if error.is_auth_rejected() => {
                tracing::warn!(url = %request.display_url(), "Session rejected, logging in again");
                let rejected = context.cookie(SESSION_COOKIE).map(str::to_string);
                context.clear();
                self.renew(&mut context, rejected.as_deref()).await?;
                fetcher
                    .fetch(&context.apply(request.clone()), &parse)
                    .await
                    .map_err(Into::into)
            }
            other => other.map_err(Into::into),
        }
    }

    /// Replace the session that was rejected, unless another caller already did.
    async fn renew(
        &self,
        context: &mut RequestContext,
        rejected: Option<&str>,
    ) -> std::result::Result<(), AuthError> {
        let _gate = self.login_gate.lock().await;
        if let Some(credential) = self.cached().await {
            if credential.tokens.get(SESSION_COOKIE).map(String::as_str) != rejected {
                tracing::debug!("Session already renewed by another caller");
                context.load_cookies(&credential.tokens);
                return Ok(());
            }
        }

        // Log in even when the delete fails.
        if let Err(error) = self.invalidate().await {
            tracing::warn!("Failed to drop rejected session: {}", error);
        }
        let credential = self.login().await?;
        if let Err(error) = self.store.set(&credential, self.ttl).await {
            tracing::warn!("Failed to cache session: {}", error);
        }
        context.load_cookies(&credential.tokens);
        Ok(())
    }

    async fn cached(&self) -> Option<SessionCredential> {
        match self.store.get().await {
            Ok(Some(credential)) if credential.tokens.contains_key(SESSION_COOKIE) => {
                Some(credential)
            }
            Ok(_) => None,
            Err(error) => {
                tracing::warn!("Session store read failed, treating as empty: {}", error);
                None
            }
        }
    }

    async fn login(&self) -> std::result::Result<SessionCredential, AuthError> {
        let Some(credentials) = &self.credentials else {
            return Err(AuthError::NotConfigured);
        };

        let payload = serde_json::json!({
            "credentials": {
                "username": credentials.username,
                "password": credentials.password,
            }
        });
        let response = self
            .transport
            .execute(HttpRequest::post_json(&self.login_url, payload))
            .await?;
        self.logins.fetch_add(1, Ordering::SeqCst);

        if !response.is_success() {
            return Err(AuthError::LoginFailed(response.summary()));
        }

        let tokens = extract_tokens(&response);
        if !tokens.contains_key(SESSION_COOKIE) {
            return Err(AuthError::MissingSessionToken);
        }

        tracing::info!(
            username = %credentials.username,
            cookies = tokens.len(),
            "Logged in to remote service"
        );
        Ok(SessionCredential {
            tokens,
            expires_at: Utc::now()
                + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero()),
        })
    }
}

/// Cookies from the parsed jar, topped up from raw `Set-Cookie` headers.
fn extract_tokens(response: &HttpResponse) -> BTreeMap<String, String> {
    let mut tokens: BTreeMap<String, String> = response
        .cookies
        .iter()
        .filter(|(_, value)| is_live_cookie(value))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    for header in response.header_values("set-cookie") {
        let pair = header.split(';').next().unwrap_or_default();
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim().trim_matches('"'));
        if name.is_empty() || !is_live_cookie(value) {
            continue;
        }
        tokens
            .entry(name.to_string())
            .or_insert_with(|| value.to_string());
    }
    tokens
}

fn is_live_cookie(value: &str) -> bool {
    !value.is_empty() && value != "deleted"
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::session::InMemorySessionStore;
    use crate::test_support::{instant_policy, StubTransport};
    use crate::Error;

    const LOGIN: &str = "https://bgg.test/login/api/v1";
    const PRIVATE: &str = "api/collections";

    fn credentials() -> Option<LoginCredentials> {
        Some(LoginCredentials {
            username: "qubus".to_string(),
            password: "hunter2".to_string(),
        })
    }

    fn manager(stub: &Arc<StubTransport>) -> SessionManager {
        SessionManager::new(
            stub.clone(),
            Arc::new(InMemorySessionStore::new()),
            credentials(),
            LOGIN,
            Duration::from_secs(3600),
        )
    }

    fn login_ok() -> HttpResponse {
        HttpResponse::new(204, "")
            .with_header("Set-Cookie", "SessionID=abc123; Path=/; HttpOnly")
            .with_header("Set-Cookie", "bggusername=qubus; Path=/")
    }

    fn private_request() -> HttpRequest {
        HttpRequest::get(format!("https://bgg.test/{PRIVATE}")).query("objectid", 13)
    }

    fn body(body: &str) -> std::result::Result<String, PayloadError> {
        Ok(body.to_string())
    }

    #[tokio::test]
    async fn login_reads_tokens_from_raw_headers_when_body_is_empty() {
        let stub = Arc::new(StubTransport::new().route("login/api/v1", vec![login_ok()]));
        let manager = manager(&stub);

        let mut context = RequestContext::new();
        manager.ensure_session(&mut context).await.unwrap();

        assert_eq!(context.cookie("SessionID"), Some("abc123"));
        assert_eq!(context.cookie("bggusername"), Some("qubus"));
        assert_eq!(manager.login_count(), 1);

        let login = &stub.requests_to("login/api/v1")[0];
        assert_eq!(
            login.json,
            Some(serde_json::json!({
                "credentials": {"username": "qubus", "password": "hunter2"}
            }))
        );
    }

    #[tokio::test]
    async fn structured_cookies_take_precedence() {
        let stub = Arc::new(StubTransport::new().route(
            "login/api/v1",
            vec![HttpResponse::new(200, "{}")
                .with_cookie("SessionID", "from-jar")
                .with_header("Set-Cookie", "SessionID=from-header")],
        ));
        let manager = manager(&stub);
        let mut context = RequestContext::new();
        manager.ensure_session(&mut context).await.unwrap();
        assert_eq!(context.cookie("SessionID"), Some("from-jar"));
    }

    #[tokio::test]
    async fn cached_session_skips_login() {
        let stub = Arc::new(StubTransport::new().route("login/api/v1", vec![login_ok()]));
        let manager = manager(&stub);

        let mut first = RequestContext::new();
        manager.ensure_session(&mut first).await.unwrap();
        let mut second = RequestContext::new();
        manager.ensure_session(&mut second).await.unwrap();

        assert_eq!(stub.calls_to("login/api/v1"), 1);
        assert_eq!(second.cookie("SessionID"), Some("abc123"));
    }

    #[tokio::test]
    async fn missing_session_cookie_fails_loudly() {
        let stub = Arc::new(StubTransport::new().route(
            "login/api/v1",
            vec![HttpResponse::new(200, "").with_header("Set-Cookie", "bggusername=qubus")],
        ));
        let manager = manager(&stub);
        let error = manager
            .ensure_session(&mut RequestContext::new())
            .await
            .unwrap_err();
        assert!(matches!(error, AuthError::MissingSessionToken));
    }

    #[tokio::test]
    async fn rejected_login_and_missing_credentials_are_errors() {
        let stub = Arc::new(StubTransport::new().route(
            "login/api/v1",
            vec![HttpResponse::new(401, "bad password")],
        ));
        let error = manager(&stub)
            .ensure_session(&mut RequestContext::new())
            .await
            .unwrap_err();
        assert!(matches!(error, AuthError::LoginFailed(_)));

        let unconfigured = SessionManager::new(
            stub.clone(),
            Arc::new(InMemorySessionStore::new()),
            None,
            LOGIN,
            Duration::from_secs(60),
        );
        let error = unconfigured
            .ensure_session(&mut RequestContext::new())
            .await
            .unwrap_err();
        assert!(matches!(error, AuthError::NotConfigured));
    }

    #[tokio::test]
    async fn one_rejection_triggers_exactly_one_relogin() {
        let stub = Arc::new(
            StubTransport::new()
                .route("login/api/v1", vec![login_ok()])
                .route(
                    PRIVATE,
                    vec![
                        HttpResponse::new(401, ""),
                        HttpResponse::new(200, r#"{"items": []}"#),
                    ],
                ),
        );
        let manager = manager(&stub);
        let fetcher = ResilientFetcher::new(stub.clone(), instant_policy(3));

        let payload = manager
            .fetch_authorized(&fetcher, &private_request(), body)
            .await
            .unwrap();

        assert_eq!(payload, r#"{"items": []}"#);
        assert_eq!(manager.login_count(), 2);
        assert_eq!(stub.calls_to(PRIVATE), 2);
        let retried = &stub.requests_to(PRIVATE)[1];
        assert!(retried
            .headers
            .iter()
            .any(|(name, value)| name == "Cookie" && value.contains("SessionID=abc123")));
    }

    #[tokio::test]
    async fn second_rejection_is_returned_to_the_caller() {
        let stub = Arc::new(
            StubTransport::new()
                .route("login/api/v1", vec![login_ok()])
                .route(PRIVATE, vec![HttpResponse::new(403, "")]),
        );
        let manager = manager(&stub);
        let fetcher = ResilientFetcher::new(stub.clone(), instant_policy(3));

        let error = manager
            .fetch_authorized(&fetcher, &private_request(), body)
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Fetch(ref fetch) if fetch.is_auth_rejected()));
        assert_eq!(manager.login_count(), 2);
        assert_eq!(stub.calls_to(PRIVATE), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_login() {
        let stub = Arc::new(
            StubTransport::new()
                .route("login/api/v1", vec![login_ok()])
                .with_delay(Duration::from_millis(20)),
        );
        let manager = Arc::new(manager(&stub));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    let mut context = RequestContext::new();
                    manager.ensure_session(&mut context).await?;
                    Ok::<_, AuthError>(context)
                })
            })
            .collect();
        for task in tasks {
            let context = task.await.unwrap().unwrap();
            assert_eq!(context.cookie("SessionID"), Some("abc123"));
        }
        assert_eq!(manager.login_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rejections_renew_the_session_once() {
        let stub = Arc::new(
            StubTransport::new()
                .route(
                    "login/api/v1",
                    vec![
                        login_ok(),
                        HttpResponse::new(204, "")
                            .with_header("Set-Cookie", "SessionID=renewed; Path=/"),
                    ],
                )
                .route(
                    PRIVATE,
                    vec![
                        HttpResponse::new(401, ""),
                        HttpResponse::new(401, ""),
                        HttpResponse::new(200, "ok"),
                    ],
                )
                .with_delay(Duration::from_millis(20)),
        );
        let manager = Arc::new(manager(&stub));
        let fetcher = Arc::new(ResilientFetcher::new(stub.clone(), instant_policy(3)));
        // Log in first so both callers send the same session.
        manager.ensure_session(&mut RequestContext::new()).await.unwrap();

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let manager = manager.clone();
                let fetcher = fetcher.clone();
                tokio::spawn(async move {
                    manager
                        .fetch_authorized(&fetcher, &private_request(), body)
                        .await
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "ok");
        }

        assert_eq!(manager.login_count(), 2);
        let retried = stub.requests_to(PRIVATE);
        assert!(retried[2..].iter().all(|request| request
            .headers
            .iter()
            .any(|(name, value)| name == "Cookie" && value.contains("SessionID=renewed"))));
    }

    /// Serves a cached session but cannot delete it.
    struct StickyStore(InMemorySessionStore);

    #[async_trait::async_trait]
    impl SessionStore for StickyStore {
        async fn get(&self) -> std::result::Result<Option<SessionCredential>, AuthError> {
            self.0.get().await
        }

        async fn set(
            &self,
            credential: &SessionCredential,
            ttl: Duration,
        ) -> std::result::Result<(), AuthError> {
            self.0.set(credential, ttl).await
        }

        async fn delete(&self) -> std::result::Result<(), AuthError> {
            Err(AuthError::Store("connection reset".to_string()))
        }

        fn backend(&self) -> &'static str {
            "sticky"
        }
    }

    #[tokio::test]
    async fn store_delete_failure_still_relogs_in() {
        let stub = Arc::new(
            StubTransport::new()
                .route(
                    "login/api/v1",
                    vec![
                        login_ok(),
                        HttpResponse::new(204, "")
                            .with_header("Set-Cookie", "SessionID=renewed; Path=/"),
                    ],
                )
                .route(
                    PRIVATE,
                    vec![HttpResponse::new(401, ""), HttpResponse::new(200, "ok")],
                ),
        );
        let manager = SessionManager::new(
            stub.clone(),
            Arc::new(StickyStore(InMemorySessionStore::new())),
            credentials(),
            LOGIN,
            Duration::from_secs(3600),
        );
        let fetcher = ResilientFetcher::new(stub.clone(), instant_policy(3));

        let payload = manager
            .fetch_authorized(&fetcher, &private_request(), body)
            .await
            .unwrap();

        assert_eq!(payload, "ok");
        assert_eq!(manager.login_count(), 2);
        let retried = &stub.requests_to(PRIVATE)[1];
        assert!(retried
            .headers
            .iter()
            .any(|(name, value)| name == "Cookie" && value.contains("SessionID=renewed")));
    }
}
