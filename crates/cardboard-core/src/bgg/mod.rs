//! Remote catalogue documents and request builders.

mod json;
mod xml;

pub use json::{parse_plays, parse_private_collection};
pub use xml::{parse_collection, parse_hot, parse_thing, CollectionListing, HotListing, ThingDetail};

use crate::config::Endpoints;
use crate::http::HttpRequest;
use crate::models::CollectionKind;

/// Which hot list to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotKind {
    Games,
    Persons,
}

impl HotKind {
    fn remote_type(self) -> &'static str {
        match self {
            Self::Games => "boardgame",
            Self::Persons => "boardgameperson",
        }
    }
}

pub fn collection_request(
    endpoints: &Endpoints,
    username: &str,
    kind: CollectionKind,
) -> HttpRequest {
    let request = HttpRequest::get(endpoints.collection())
        .query("username", username)
        .query("stats", 1)
        .query("subtype", kind.subtype());
    match kind {
        CollectionKind::Games => request.query("excludesubtype", "boardgameaccessory"),
        CollectionKind::Accessories => request,
    }
}

pub fn thing_request(endpoints: &Endpoints, id: i64) -> HttpRequest {
    HttpRequest::get(endpoints.thing())
        .query("id", id)
        .query("stats", 1)
}

pub fn hot_request(endpoints: &Endpoints, kind: HotKind) -> HttpRequest {
    HttpRequest::get(endpoints.hot()).query("type", kind.remote_type())
}

pub fn private_collection_request(endpoints: &Endpoints, username: &str, id: i64) -> HttpRequest {
    HttpRequest::get(endpoints.private_collection())
        .query("objectid", id)
        .query("objecttype", "thing")
        .query("username", username)
        .header("Accept", "application/json")
}

pub fn plays_request(endpoints: &Endpoints, id: i64, page: usize, page_size: usize) -> HttpRequest {
    HttpRequest::get(endpoints.plays())
        .query("action", "getplays")
        .query("ajax", 1)
        .query("currentUser", "true")
        .query("objectid", id)
        .query("objecttype", "thing")
        .query("pageID", page)
        .query("showcount", page_size)
        .header("Accept", "application/json, text/plain, */*")
}
