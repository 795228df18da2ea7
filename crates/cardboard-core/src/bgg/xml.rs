//! XML API v2 documents: collection, thing and hot lists.

use std::collections::HashSet;

use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::convert::{flag, rank_value, rating_value, to_int};
use crate::http::PayloadError;
use crate::models::CollectionStatus;

/// One row of the collection listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionListing {
    pub id: i64,
    pub subtype: Option<String>,
    pub title: Option<String>,
    pub year_published: Option<i64>,
    pub image: Option<String>,
    pub thumbnail: Option<String>,
    pub num_plays: i64,
    pub my_rating: Option<f64>,
    pub average_rating: Option<f64>,
    pub rank: Option<i64>,
    pub status: CollectionStatus,
    pub last_modified: Option<String>,
}

/// The detail page of one thing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThingDetail {
    pub id: i64,
    pub item_type: Option<String>,
    pub primary_name: Option<String>,
    pub description: Option<String>,
    pub year_published: Option<i64>,
    pub image: Option<String>,
    pub thumbnail: Option<String>,
    pub min_players: Option<i64>,
    pub max_players: Option<i64>,
    pub min_playtime: Option<i64>,
    pub max_playtime: Option<i64>,
    pub playing_time: Option<i64>,
    pub min_age: Option<i64>,
    pub weight: Option<f64>,
    pub average_rating: Option<f64>,
    pub rank: Option<i64>,
    pub mechanics: Vec<String>,
    pub designers: Vec<String>,
    pub artists: Vec<String>,
    pub publishers: Vec<String>,
    pub categories: Vec<String>,
}

/// One entry of a hot list (games or persons).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotListing {
    pub id: i64,
    pub rank: i64,
    pub name: Option<String>,
    pub year_published: Option<i64>,
    pub thumbnail: Option<String>,
}

pub fn parse_collection(body: &str) -> Result<Vec<CollectionListing>, PayloadError> {
    let document = parse_document(body)?;
    let root = expect_items_root(&document)?;

    let mut seen = HashSet::new();
    let mut listings = Vec::new();
    for item in elements(root, "item") {
        let Some(id) = to_int(item.attribute("objectid")) else {
            tracing::debug!("Skipping collection item without objectid");
            continue;
        };
        // A game owned twice appears twice; the first entry wins.
        if !seen.insert(id) {
            continue;
        }
        listings.push(collection_listing(item, id));
    }
    Ok(listings)
}

fn collection_listing(item: Node<'_, '_>, id: i64) -> CollectionListing {
    let rating_node = path(item, &["stats", "rating"]);
    let status = child(item, "status");
    let status_flag = |name: &str| flag(status.and_then(|node| node.attribute(name)));
    let wishlist = status_flag("wishlist");

    CollectionListing {
        id,
        subtype: item.attribute("subtype").map(str::to_string),
        title: child_text(item, "name"),
        year_published: to_int(child_text(item, "yearpublished").as_deref())
            .filter(|year| *year != 0),
        image: child_text(item, "image"),
        thumbnail: child_text(item, "thumbnail"),
        num_plays: to_int(child_text(item, "numplays").as_deref()).unwrap_or(0),
        my_rating: rating_value(rating_node.and_then(|node| node.attribute("value"))),
        average_rating: rating_value(rating_node.and_then(|node| child_value(node, "average"))),
        rank: rating_node.and_then(board_game_rank),
        status: CollectionStatus {
            owned: status_flag("own"),
            prev_owned: status_flag("prevowned"),
            for_trade: status_flag("fortrade"),
            want: status_flag("want"),
            want_to_play: status_flag("wanttoplay"),
            want_to_buy: status_flag("wanttobuy"),
            wishlist,
            preordered: status_flag("preordered"),
            wishlist_priority: if wishlist {
                to_int(status.and_then(|node| node.attribute("wishlistpriority")))
            } else {
                None
            },
        },
        last_modified: status
            .and_then(|node| node.attribute("lastmodified"))
            .map(str::to_string),
    }
}

/// Parse a thing document. `Ok(None)` when the remote has no such item.
pub fn parse_thing(body: &str) -> Result<Option<ThingDetail>, PayloadError> {
    let document = parse_document(body)?;
    let root = expect_items_root(&document)?;
    let Some(item) = elements(root, "item").next() else {
        return Ok(None);
    };
    let Some(id) = to_int(item.attribute("id")) else {
        return Err(PayloadError::Shape("thing item has no id".to_string()));
    };

    let ratings = path(item, &["statistics", "ratings"]);
    let mut detail = ThingDetail {
        id,
        item_type: item.attribute("type").map(str::to_string),
        primary_name: elements(item, "name")
            .find(|name| name.attribute("type") == Some("primary"))
            .and_then(|name| name.attribute("value"))
            .map(str::to_string),
        description: child_text(item, "description"),
        year_published: to_int(child_value(item, "yearpublished")).filter(|year| *year != 0),
        image: child_text(item, "image"),
        thumbnail: child_text(item, "thumbnail"),
        min_players: to_int(child_value(item, "minplayers")),
        max_players: to_int(child_value(item, "maxplayers")),
        min_playtime: to_int(child_value(item, "minplaytime")),
        max_playtime: to_int(child_value(item, "maxplaytime")),
        playing_time: to_int(child_value(item, "playingtime")),
        min_age: to_int(child_value(item, "minage")),
        weight: rating_value(ratings.and_then(|node| child_value(node, "averageweight"))),
        average_rating: rating_value(ratings.and_then(|node| child_value(node, "average"))),
        rank: ratings.and_then(board_game_rank),
        ..ThingDetail::default()
    };

    for link in elements(item, "link") {
        let Some(value) = link.attribute("value").map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        let bucket = match link.attribute("type") {
            Some("boardgamemechanic") => &mut detail.mechanics,
            Some("boardgamedesigner") => &mut detail.designers,
            Some("boardgameartist") => &mut detail.artists,
            Some("boardgamepublisher") => &mut detail.publishers,
            Some("boardgamecategory") => &mut detail.categories,
            _ => continue,
        };
        bucket.push(value.to_string());
    }

    Ok(Some(detail))
}

pub fn parse_hot(body: &str) -> Result<Vec<HotListing>, PayloadError> {
    let document = parse_document(body)?;
    let root = expect_items_root(&document)?;

    let mut listings = Vec::new();
    for item in elements(root, "item") {
        let Some(id) = to_int(item.attribute("id")) else {
            continue;
        };
        listings.push(HotListing {
            id,
            rank: to_int(item.attribute("rank")).unwrap_or(0),
            name: child_value(item, "name").map(str::to_string),
            year_published: to_int(child_value(item, "yearpublished")).filter(|year| *year != 0),
            thumbnail: child_value(item, "thumbnail").map(str::to_string),
        });
    }
    Ok(listings)
}

fn parse_document(body: &str) -> Result<Document<'_>, PayloadError> {
    Document::parse(body).map_err(|error| PayloadError::Syntax(format!("invalid XML: {error}")))
}

fn expect_items_root<'a, 'input>(
    document: &'a Document<'input>,
) -> Result<Node<'a, 'input>, PayloadError> {
    let root = document.root_element();
    match root.tag_name().name() {
        "items" => Ok(root),
        "errors" | "error" => {
            let message = root
                .attribute("message")
                .map(str::to_string)
                .or_else(|| {
                    root.descendants()
                        .find(|node| node.has_tag_name("message"))
                        .and_then(|node| node.text())
                        .map(|text| text.trim().to_string())
                })
                .unwrap_or_else(|| "remote returned an error document".to_string());
            Err(PayloadError::Shape(message))
        }
        // "Your request has been accepted and will be processed soon."
        "message" => Err(PayloadError::Syntax(
            "remote returned a processing notice".to_string(),
        )),
        other => Err(PayloadError::Shape(format!("unexpected root element <{other}>"))),
    }
}

fn elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |child| child.is_element() && child.has_tag_name(name))
}

fn child<'a, 'input: 'a>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.has_tag_name(name))
}

fn path<'a, 'input: 'a>(node: Node<'a, 'input>, names: &[&str]) -> Option<Node<'a, 'input>> {
    names
        .iter()
        .try_fold(node, |current, name| child(current, name))
}

fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    child(node, name)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn child_value<'a, 'input: 'a>(node: Node<'a, 'input>, name: &str) -> Option<&'a str> {
    child(node, name).and_then(|child| child.attribute("value"))
}

/// The overall board game rank, ignoring family ranks.
fn board_game_rank(rating_node: Node<'_, '_>) -> Option<i64> {
    let ranks = child(rating_node, "ranks")?;
    let mut all = elements(ranks, "rank");
    let preferred = elements(ranks, "rank").find(|node| {
        node.attribute("type") == Some("subtype")
            && matches!(
                node.attribute("name"),
                Some("boardgame" | "boardgameaccessory")
            )
    });
    rank_value(preferred.or_else(|| all.next())?.attribute("value"))
}
