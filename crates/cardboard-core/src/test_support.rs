//! Scripted transport and fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{Endpoints, LoginCredentials, SyncOptions};
use crate::fingerprint::InMemoryFingerprintCache;
use crate::http::{
    HttpRequest, HttpResponse, ResilientFetcher, RetryPolicy, Transport, TransportError,
};
use crate::services::DatabaseService;
use crate::session::{InMemorySessionStore, SessionManager};
use crate::sync::SyncContext;

pub const BASE_URL: &str = "https://bgg.test";

#[derive(Clone)]
enum Scripted {
    Response(HttpResponse),
    Error(TransportError),
}

struct Route {
    needle: String,
    script: VecDeque<Scripted>,
}

/// Answers requests from per-route scripts.
///
/// A route matches when the request URL (query included) contains its
/// needle; the first registered match wins. Each call consumes the head of
/// the script, and the last entry repeats forever. Unmatched requests get a
/// `404`.
#[derive(Default)]
pub struct StubTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<HttpRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn route(self, needle: &str, responses: Vec<HttpResponse>) -> Self {
        self.push(needle, responses.into_iter().map(Scripted::Response));
        self
    }

    #[must_use]
    pub fn route_error(self, needle: &str, error: TransportError) -> Self {
        self.push(needle, std::iter::once(Scripted::Error(error)));
        self
    }

    /// Hold every call open for `delay` so overlapping calls can be observed.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(&self, needle: &str, entries: impl Iterator<Item = Scripted>) {
        let mut routes = self.routes.lock().unwrap();
        if let Some(route) = routes.iter_mut().find(|route| route.needle == needle) {
            route.script.extend(entries);
        } else {
            routes.push(Route {
                needle: needle.to_string(),
                script: entries.collect(),
            });
        }
    }

    pub fn calls_to(&self, needle: &str) -> usize {
        self.requests_to(needle).len()
    }

    pub fn requests_to(&self, needle: &str) -> Vec<HttpRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.display_url().contains(needle))
            .cloned()
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_for(&self, url: &str) -> Scripted {
        let mut routes = self.routes.lock().unwrap();
        let Some(route) = routes.iter_mut().find(|route| url.contains(&route.needle)) else {
            return Scripted::Response(HttpResponse::new(404, "no route"));
        };
        if route.script.len() > 1 {
            route.script.pop_front().unwrap()
        } else {
            route
                .script
                .front()
                .cloned()
                .unwrap_or_else(|| Scripted::Response(HttpResponse::new(404, "empty script")))
        }
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.display_url();
        self.calls.lock().unwrap().push(request);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.next_for(&url);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match scripted {
            Scripted::Response(response) => Ok(response),
            Scripted::Error(error) => Err(error),
        }
    }
}

/// A policy with no sleeps at all.
pub fn instant_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        pacing: Duration::ZERO,
        pacing_jitter: Duration::ZERO,
        queued_base: Duration::ZERO,
        rate_limit_base: Duration::ZERO,
        error_base: Duration::ZERO,
        max_backoff: Duration::ZERO,
        backoff_jitter: 0.0,
        deadline: None,
    }
}

pub fn collection_xml(items: &[(i64, &str, u32)]) -> String {
    let mut body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?><items totalitems="{}" termsofuse="https://boardgamegeek.com/xmlapi/termsofuse" pubdate="Sat, 18 Oct 2026 10:00:00 +0000">"#,
        items.len()
    );
    for (id, title, plays) in items {
        body.push_str(&format!(
            r#"<item objecttype="thing" objectid="{id}" subtype="boardgame" collid="{collid}">
                <name sortindex="1">{title}</name>
                <yearpublished>2015</yearpublished>
                <image>https://cf.geekdo-images.com/{id}.jpg</image>
                <thumbnail>https://cf.geekdo-images.com/{id}_t.jpg</thumbnail>
                <stats minplayers="1" maxplayers="4" minplaytime="30" maxplaytime="60" playingtime="60" numowned="100">
                    <rating value="8">
                        <usersrated value="100"/>
                        <average value="7.5"/>
                        <ranks><rank type="subtype" id="1" name="boardgame" friendlyname="Board Game Rank" value="{id}" bayesaverage="7.1"/></ranks>
                    </rating>
                </stats>
                <status own="1" prevowned="0" fortrade="0" want="0" wanttoplay="0" wanttobuy="0" wishlist="0" preordered="0" lastmodified="2026-01-02 10:00:00"/>
                <numplays>{plays}</numplays>
            </item>"#,
            collid = id * 10,
        ));
    }
    body.push_str("</items>");
    body
}

pub fn thing_xml(id: i64, title: &str, mechanics: &[&str]) -> String {
    let links: String = mechanics
        .iter()
        .enumerate()
        .map(|(index, mechanic)| {
            format!(r#"<link type="boardgamemechanic" id="{}" value="{mechanic}"/>"#, 2000 + index)
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><items termsofuse="https://boardgamegeek.com/xmlapi/termsofuse">
            <item type="boardgame" id="{id}">
                <thumbnail>https://cf.geekdo-images.com/{id}_t.jpg</thumbnail>
                <name type="primary" sortindex="1" value="{title}"/>
                <name type="alternate" sortindex="1" value="{title} (alt)"/>
                <description>About {title}</description>
                <yearpublished value="2015"/>
                <minplayers value="1"/>
                <maxplayers value="4"/>
                <playingtime value="60"/>
                <minplaytime value="30"/>
                <maxplaytime value="60"/>
                <minage value="10"/>
                {links}
                <link type="boardgamedesigner" id="1" value="Designer {id}"/>
                <link type="boardgameartist" id="2" value="Artist {id}"/>
                <link type="boardgamepublisher" id="3" value="Publisher {id}"/>
                <link type="boardgamecategory" id="4" value="Category {id}"/>
                <statistics page="1">
                    <ratings>
                        <average value="7.5"/>
                        <ranks><rank type="subtype" id="1" name="boardgame" value="{id}"/></ranks>
                        <averageweight value="2.5"/>
                    </ratings>
                </statistics>
            </item>
        </items>"#
    )
}

pub fn hot_xml(items: &[(i64, i64, &str)]) -> String {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="utf-8"?><items termsofuse="https://boardgamegeek.com/xmlapi/termsofuse">"#,
    );
    for (id, rank, name) in items {
        body.push_str(&format!(
            r#"<item id="{id}" rank="{rank}"><thumbnail value="https://cf.geekdo-images.com/{id}_t.jpg"/><name value="{name}"/><yearpublished value="2026"/></item>"#
        ));
    }
    body.push_str("</items>");
    body
}

pub fn private_json(price: &str, currency: &str) -> String {
    serde_json::json!({
        "items": [{
            "privateinfo": {
                "pricepaid": price,
                "pp_currency": currency,
                "quantity": "1",
                "acquisitiondate": "2025-12-24",
                "acquiredfrom": "Local shop",
                "privatecomment": ""
            }
        }]
    })
    .to_string()
}

pub fn plays_json(object_id: i64, play_ids: &[i64]) -> String {
    let plays: Vec<serde_json::Value> = play_ids
        .iter()
        .map(|play_id| {
            serde_json::json!({
                "playid": play_id.to_string(),
                "userid": "77",
                "objecttype": "thing",
                "objectid": object_id.to_string(),
                "playdate": "2026-01-05",
                "quantity": "1",
                "length": "45",
                "numplayers": "2",
                "name": format!("Game {object_id}"),
                "players": [],
                "subtypes": ["boardgame"]
            })
        })
        .collect();
    serde_json::json!({ "plays": plays }).to_string()
}

pub fn login_ok() -> HttpResponse {
    HttpResponse::new(204, "")
        .with_header("Set-Cookie", "SessionID=abc123; Path=/; HttpOnly")
        .with_header("Set-Cookie", "bggusername=qubus; Path=/")
}

pub fn credentials() -> LoginCredentials {
    LoginCredentials {
        username: "qubus".to_string(),
        password: "hunter2".to_string(),
    }
}

/// A pipeline context over an in-memory database, memory caches and `stub`.
pub async fn sync_context(stub: &Arc<StubTransport>, options: SyncOptions) -> SyncContext {
    let endpoints = Endpoints::new(BASE_URL);
    let fetcher = Arc::new(ResilientFetcher::new(stub.clone(), instant_policy(2)));
    let session = Arc::new(SessionManager::new(
        stub.clone(),
        Arc::new(InMemorySessionStore::new()),
        Some(credentials()),
        endpoints.login_url.clone(),
        Duration::from_secs(3600),
    ));
    SyncContext {
        fetcher,
        session,
        db: DatabaseService::open_in_memory().await.unwrap(),
        fingerprints: Arc::new(InMemoryFingerprintCache::new()),
        endpoints,
        options,
    }
}
