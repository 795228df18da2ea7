//! Trending list models

use serde::{Deserialize, Serialize};

use crate::bgg::{HotListing, ThingDetail};
use crate::util::entity_label;

/// A game on the remote "hotness" list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotGame {
    pub entity_id: i64,
    /// Position on the hot list, 1-based
    pub rank: i64,
    pub name: String,
    pub year_published: Option<i64>,
    pub thumbnail: Option<String>,
    pub url: String,
    pub description: Option<String>,
    pub mechanics: Vec<String>,
    pub designers: Vec<String>,
    pub artists: Vec<String>,
    pub min_players: Option<i64>,
    pub max_players: Option<i64>,
    pub playing_time: Option<i64>,
    pub weight: Option<f64>,
    pub average_rating: Option<f64>,
    pub bgg_rank: Option<i64>,
}

impl HotGame {
    #[must_use]
    pub fn from_remote(listing: &HotListing, detail: &ThingDetail, base_url: &str) -> Self {
        Self {
            entity_id: listing.id,
            rank: listing.rank,
            name: listing
                .name
                .clone()
                .or_else(|| detail.primary_name.clone())
                .unwrap_or_else(|| entity_label(None, listing.id)),
            year_published: listing.year_published.or(detail.year_published),
            thumbnail: listing.thumbnail.clone().or_else(|| detail.thumbnail.clone()),
            url: format!("{base_url}/boardgame/{}", listing.id),
            description: detail.description.clone(),
            mechanics: detail.mechanics.clone(),
            designers: detail.designers.clone(),
            artists: detail.artists.clone(),
            min_players: detail.min_players,
            max_players: detail.max_players,
            playing_time: detail.playing_time,
            weight: detail.weight,
            average_rating: detail.average_rating,
            bgg_rank: detail.rank,
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        entity_label(Some(&self.name), self.entity_id)
    }
}

/// A designer/person on the remote "hotness" list. List-level only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotPerson {
    pub entity_id: i64,
    pub rank: i64,
    pub name: String,
    pub thumbnail: Option<String>,
    pub url: String,
}

impl HotPerson {
    #[must_use]
    pub fn from_remote(listing: &HotListing, base_url: &str) -> Self {
        Self {
            entity_id: listing.id,
            rank: listing.rank,
            name: listing
                .name
                .clone()
                .unwrap_or_else(|| entity_label(None, listing.id)),
            thumbnail: listing.thumbnail.clone(),
            url: format!("{base_url}/boardgamedesigner/{}", listing.id),
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        entity_label(Some(&self.name), self.entity_id)
    }
}
