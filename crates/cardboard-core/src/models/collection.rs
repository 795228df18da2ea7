//! Collection entity model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bgg::{CollectionListing, ThingDetail};
use crate::util::entity_label;

/// Which slice of the user's catalogue a collection row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Games,
    Accessories,
}

impl CollectionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Games => "games",
            Self::Accessories => "accessories",
        }
    }

    /// Remote subtype requested from the collection endpoint.
    #[must_use]
    pub fn subtype(self) -> &'static str {
        match self {
            Self::Games => "boardgame",
            Self::Accessories => "boardgameaccessory",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "games" | "game" | "collection" => Ok(Self::Games),
            "accessories" | "accessory" => Ok(Self::Accessories),
            other => Err(format!("unknown collection kind `{other}`")),
        }
    }
}

/// Ownership and wish flags from the collection listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct CollectionStatus {
    pub owned: bool,
    pub prev_owned: bool,
    pub for_trade: bool,
    pub want: bool,
    pub want_to_play: bool,
    pub want_to_buy: bool,
    pub wishlist: bool,
    pub preordered: bool,
    /// 1 (must have) to 5 (don't buy); `None` when not wishlisted
    pub wishlist_priority: Option<i64>,
}

/// Where a purchase currency came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrencySource {
    /// Reported by the remote private fields
    Remote,
    /// Filled in from the configured default
    Default,
}

impl CurrencySource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Default => "default",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "remote" => Some(Self::Remote),
            "default" => Some(Self::Default),
            _ => None,
        }
    }
}

/// Privately scoped acquisition data. Only visible to a logged-in owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PurchaseInfo {
    pub price_paid: Option<f64>,
    pub currency: Option<String>,
    pub currency_source: Option<CurrencySource>,
    pub quantity: Option<i64>,
    pub acquisition_date: Option<String>,
    pub acquired_from: Option<String>,
    pub private_comment: Option<String>,
}

impl PurchaseInfo {
    /// Fill in a missing currency for a known price.
    #[must_use]
    pub fn with_default_currency(mut self, default: Option<&str>) -> Self {
        if self.currency.is_none() && self.price_paid.is_some() {
            if let Some(currency) = default {
                self.currency = Some(currency.to_string());
                self.currency_source = Some(CurrencySource::Default);
            }
        }
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.price_paid.is_none()
            && self.currency.is_none()
            && self.quantity.is_none()
            && self.acquisition_date.is_none()
            && self.acquired_from.is_none()
            && self.private_comment.is_none()
    }
}

/// A catalogue item mirrored from the remote collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionEntity {
    /// Remote object id, unique per kind
    pub entity_id: i64,
    pub kind: CollectionKind,
    /// Display title from the collection listing
    pub title: String,
    /// Primary name from the detail page
    pub original_title: Option<String>,
    pub year_published: Option<i64>,
    pub image: Option<String>,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    pub num_plays: i64,
    pub my_rating: Option<f64>,
    pub average_rating: Option<f64>,
    pub rank: Option<i64>,
    /// Community complexity rating (1-5)
    pub weight: Option<f64>,
    pub min_players: Option<i64>,
    pub max_players: Option<i64>,
    pub min_playtime: Option<i64>,
    pub max_playtime: Option<i64>,
    pub playing_time: Option<i64>,
    pub min_age: Option<i64>,
    /// Remote item type, e.g. `boardgame` or `boardgameexpansion`
    pub item_type: Option<String>,
    pub status: CollectionStatus,
    pub mechanics: Vec<String>,
    pub designers: Vec<String>,
    pub artists: Vec<String>,
    pub publishers: Vec<String>,
    pub categories: Vec<String>,
    /// `None` means "not fetched this run", never "cleared"
    pub purchase: Option<PurchaseInfo>,
    /// Remote last-modified stamp of the collection entry
    pub last_modified: Option<String>,
}

impl CollectionEntity {
    /// Assemble an entity from its list row and detail page.
    #[must_use]
    pub fn from_remote(
        kind: CollectionKind,
        listing: &CollectionListing,
        detail: &ThingDetail,
        purchase: Option<PurchaseInfo>,
    ) -> Self {
        let title = listing
            .title
            .clone()
            .or_else(|| detail.primary_name.clone())
            .unwrap_or_else(|| entity_label(None, listing.id));

        Self {
            entity_id: listing.id,
            kind,
            title,
            original_title: detail.primary_name.clone(),
            year_published: listing.year_published.or(detail.year_published),
            image: listing.image.clone().or_else(|| detail.image.clone()),
            thumbnail: listing.thumbnail.clone().or_else(|| detail.thumbnail.clone()),
            description: detail.description.clone(),
            num_plays: listing.num_plays,
            my_rating: listing.my_rating,
            average_rating: listing.average_rating.or(detail.average_rating),
            rank: listing.rank.or(detail.rank),
            weight: detail.weight,
            min_players: detail.min_players,
            max_players: detail.max_players,
            min_playtime: detail.min_playtime,
            max_playtime: detail.max_playtime,
            playing_time: detail.playing_time,
            min_age: detail.min_age,
            item_type: detail.item_type.clone(),
            status: listing.status.clone(),
            mechanics: detail.mechanics.clone(),
            designers: detail.designers.clone(),
            artists: detail.artists.clone(),
            publishers: detail.publishers.clone(),
            categories: detail.categories.clone(),
            purchase,
            last_modified: listing.last_modified.clone(),
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        entity_label(Some(&self.title), self.entity_id)
    }
}
