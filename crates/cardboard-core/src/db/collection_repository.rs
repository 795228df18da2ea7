//! Collection repository implementation

use std::collections::BTreeSet;

use libsql::{Connection, Value};

use super::connection::finish_transaction;
use super::snapshot::{ChangeSet, SnapshotStore, ID_CHUNK};
use super::values::{self, RowReader};
use crate::error::Result;
use crate::models::{
    CollectionEntity, CollectionKind, CollectionStatus, CurrencySource, PurchaseInfo,
};
use crate::util::unix_timestamp_now;

/// Columns always written; `entity_id` and `kind` lead so updates can key on `?1`/`?2`.
const BASE_COLUMNS: [&str; 34] = [
    "entity_id",
    "kind",
    "title",
    "original_title",
    "year_published",
    "image",
    "thumbnail",
    "description",
    "num_plays",
    "my_rating",
    "average_rating",
    "bgg_rank",
    "weight",
    "min_players",
    "max_players",
    "min_playtime",
    "max_playtime",
    "playing_time",
    "min_age",
    "item_type",
    "status_owned",
    "status_prev_owned",
    "status_for_trade",
    "status_want",
    "status_want_to_play",
    "status_want_to_buy",
    "status_wishlist",
    "status_preordered",
    "wishlist_priority",
    "mechanics",
    "designers",
    "artists",
    "publishers",
    "categories",
];

const PURCHASE_COLUMNS: [&str; 7] = [
    "purchase_price_paid",
    "purchase_currency",
    "purchase_currency_source",
    "purchase_quantity",
    "purchase_acquisition_date",
    "purchase_acquired_from",
    "purchase_private_comment",
];

const TRAILING_COLUMNS: [&str; 2] = ["last_modified", "synced_at"];

/// Trait for read access to the mirrored collection (async)
#[allow(async_fn_in_trait)]
pub trait CollectionRepository {
    /// List entities ordered by title, optionally limited
    async fn list(&self, limit: Option<usize>) -> Result<Vec<CollectionEntity>>;

    /// Get one entity by remote id
    async fn get(&self, entity_id: i64) -> Result<Option<CollectionEntity>>;

    /// Number of persisted entities of this kind
    async fn count(&self) -> Result<i64>;
}

/// libSQL implementation scoped to one [`CollectionKind`]
pub struct LibSqlCollectionRepository<'a> {
    conn: &'a Connection,
    kind: CollectionKind,
}

impl<'a> LibSqlCollectionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection, kind: CollectionKind) -> Self {
        Self { conn, kind }
    }

    fn select_sql(filter: &str) -> String {
        let columns = BASE_COLUMNS
            .iter()
            .chain(PURCHASE_COLUMNS.iter())
            .chain(TRAILING_COLUMNS.iter().take(1))
            .copied()
            .collect::<Vec<_>>()
            .join(", ");
        format!("SELECT {columns} FROM collection_items WHERE kind = ?1 {filter}")
    }

    fn insert_sql() -> String {
        let columns: Vec<&str> = BASE_COLUMNS
            .iter()
            .chain(PURCHASE_COLUMNS.iter())
            .chain(TRAILING_COLUMNS.iter())
            .copied()
            .collect();
        format!(
            "INSERT INTO collection_items ({}) VALUES ({})",
            columns.join(", "),
            values::placeholders(0, columns.len())
        )
    }

    /// Purchase columns are left alone when the run did not fetch them.
    fn update_sql(with_purchase: bool) -> String {
        let mut columns: Vec<&str> = BASE_COLUMNS.to_vec();
        if with_purchase {
            columns.extend(PURCHASE_COLUMNS);
        }
        columns.extend(TRAILING_COLUMNS);

        let assignments = columns
            .iter()
            .enumerate()
            .skip(2)
            .map(|(index, column)| format!("{column} = ?{}", index + 1))
            .collect::<Vec<_>>()
            .join(", ");
        format!("UPDATE collection_items SET {assignments} WHERE entity_id = ?1 AND kind = ?2")
    }

    fn base_values(entity: &CollectionEntity) -> Result<Vec<Value>> {
        let status = &entity.status;
        Ok(vec![
            Value::Integer(entity.entity_id),
            Value::Text(entity.kind.as_str().to_string()),
            Value::Text(entity.title.clone()),
            values::text(entity.original_title.as_deref()),
            values::integer(entity.year_published),
            values::text(entity.image.as_deref()),
            values::text(entity.thumbnail.as_deref()),
            values::text(entity.description.as_deref()),
            Value::Integer(entity.num_plays),
            values::real(entity.my_rating),
            values::real(entity.average_rating),
            values::integer(entity.rank),
            values::real(entity.weight),
            values::integer(entity.min_players),
            values::integer(entity.max_players),
            values::integer(entity.min_playtime),
            values::integer(entity.max_playtime),
            values::integer(entity.playing_time),
            values::integer(entity.min_age),
            values::text(entity.item_type.as_deref()),
            values::flag(status.owned),
            values::flag(status.prev_owned),
            values::flag(status.for_trade),
            values::flag(status.want),
            values::flag(status.want_to_play),
            values::flag(status.want_to_buy),
            values::flag(status.wishlist),
            values::flag(status.preordered),
            values::integer(status.wishlist_priority),
            values::string_list(&entity.mechanics)?,
            values::string_list(&entity.designers)?,
            values::string_list(&entity.artists)?,
            values::string_list(&entity.publishers)?,
            values::string_list(&entity.categories)?,
        ])
    }

    fn purchase_values(purchase: Option<&PurchaseInfo>) -> Vec<Value> {
        let Some(purchase) = purchase else {
            return vec![Value::Null; PURCHASE_COLUMNS.len()];
        };
        vec![
            values::real(purchase.price_paid),
            values::text(purchase.currency.as_deref()),
            values::text(purchase.currency_source.map(CurrencySource::as_str)),
            values::integer(purchase.quantity),
            values::text(purchase.acquisition_date.as_deref()),
            values::text(purchase.acquired_from.as_deref()),
            values::text(purchase.private_comment.as_deref()),
        ]
    }

    fn row_values(
        entity: &CollectionEntity,
        with_purchase: bool,
        synced_at: i64,
    ) -> Result<Vec<Value>> {
        let mut row = Self::base_values(entity)?;
        if with_purchase {
            row.extend(Self::purchase_values(entity.purchase.as_ref()));
        }
        row.push(values::text(entity.last_modified.as_deref()));
        row.push(Value::Integer(synced_at));
        Ok(row)
    }

    fn read_entity(row: &libsql::Row) -> Result<CollectionEntity> {
        let mut reader = RowReader::new(row);
        let entity_id = reader.int()?;
        let kind = reader
            .text()?
            .parse::<CollectionKind>()
            .map_err(crate::Error::Database)?;
        let title = reader.text()?;
        let original_title = reader.opt_text()?;
        let year_published = reader.opt_int()?;
        let image = reader.opt_text()?;
        let thumbnail = reader.opt_text()?;
        let description = reader.opt_text()?;
        let num_plays = reader.opt_int()?.unwrap_or(0);
        let my_rating = reader.opt_real()?;
        let average_rating = reader.opt_real()?;
        let rank = reader.opt_int()?;
        let weight = reader.opt_real()?;
        let min_players = reader.opt_int()?;
        let max_players = reader.opt_int()?;
        let min_playtime = reader.opt_int()?;
        let max_playtime = reader.opt_int()?;
        let playing_time = reader.opt_int()?;
        let min_age = reader.opt_int()?;
        let item_type = reader.opt_text()?;
        let status = CollectionStatus {
            owned: reader.flag()?,
            prev_owned: reader.flag()?,
            for_trade: reader.flag()?,
            want: reader.flag()?,
            want_to_play: reader.flag()?,
            want_to_buy: reader.flag()?,
            wishlist: reader.flag()?,
            preordered: reader.flag()?,
            wishlist_priority: reader.opt_int()?,
        };
        let mechanics = reader.string_list()?;
        let designers = reader.string_list()?;
        let artists = reader.string_list()?;
        let publishers = reader.string_list()?;
        let categories = reader.string_list()?;
        let purchase = PurchaseInfo {
            price_paid: reader.opt_real()?,
            currency: reader.opt_text()?,
            currency_source: reader.opt_text()?.as_deref().and_then(CurrencySource::parse),
            quantity: reader.opt_int()?,
            acquisition_date: reader.opt_text()?,
            acquired_from: reader.opt_text()?,
            private_comment: reader.opt_text()?,
        };
        let last_modified = reader.opt_text()?;

        Ok(CollectionEntity {
            entity_id,
            kind,
            title,
            original_title,
            year_published,
            image,
            thumbnail,
            description,
            num_plays,
            my_rating,
            average_rating,
            rank,
            weight,
            min_players,
            max_players,
            min_playtime,
            max_playtime,
            playing_time,
            min_age,
            item_type,
            status,
            mechanics,
            designers,
            artists,
            publishers,
            categories,
            purchase: (!purchase.is_empty()).then_some(purchase),
            last_modified,
        })
    }

    async fn query_entities(
        &self,
        filter: &str,
        params: Vec<Value>,
    ) -> Result<Vec<CollectionEntity>> {
        let mut rows = self.conn.query(&Self::select_sql(filter), params).await?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next().await? {
            entities.push(Self::read_entity(&row)?);
        }
        Ok(entities)
    }

    async fn apply(&self, changes: &ChangeSet<CollectionEntity>) -> Result<()> {
        let synced_at = unix_timestamp_now();
        let insert_sql = Self::insert_sql();
        let update_full = Self::update_sql(true);
        let update_public = Self::update_sql(false);

        for entity in &changes.inserts {
            self.conn
                .execute(&insert_sql, Self::row_values(entity, true, synced_at)?)
                .await?;
        }
        for entity in &changes.updates {
            let with_purchase = entity.purchase.is_some();
            let sql = if with_purchase { &update_full } else { &update_public };
            self.conn
                .execute(sql, Self::row_values(entity, with_purchase, synced_at)?)
                .await?;
        }
        for entity_id in &changes.deletes {
            self.conn
                .execute(
                    "DELETE FROM collection_items WHERE kind = ?1 AND entity_id = ?2",
                    vec![
                        Value::Text(self.kind.as_str().to_string()),
                        Value::Integer(*entity_id),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    /// `(entity_id, title)` for every persisted game, ordered by id
    pub async fn id_titles(&self) -> Result<Vec<(i64, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT entity_id, title FROM collection_items WHERE kind = ?1 ORDER BY entity_id",
                [self.kind.as_str()],
            )
            .await?;
        let mut pairs = Vec::new();
        while let Some(row) = rows.next().await? {
            let mut reader = RowReader::new(&row);
            pairs.push((reader.int()?, reader.text()?));
        }
        Ok(pairs)
    }
}

impl CollectionRepository for LibSqlCollectionRepository<'_> {
    async fn list(&self, limit: Option<usize>) -> Result<Vec<CollectionEntity>> {
        let filter = match limit {
            Some(limit) => format!("ORDER BY title COLLATE NOCASE, entity_id LIMIT {limit}"),
            None => "ORDER BY title COLLATE NOCASE, entity_id".to_string(),
        };
        self.query_entities(&filter, vec![Value::Text(self.kind.as_str().to_string())])
            .await
    }

    async fn get(&self, entity_id: i64) -> Result<Option<CollectionEntity>> {
        let entities = self
            .query_entities(
                "AND entity_id = ?2",
                vec![
                    Value::Text(self.kind.as_str().to_string()),
                    Value::Integer(entity_id),
                ],
            )
            .await?;
        Ok(entities.into_iter().next())
    }

    async fn count(&self) -> Result<i64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM collection_items WHERE kind = ?1",
                [self.kind.as_str()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Ok(0),
        }
    }
}

impl SnapshotStore<CollectionEntity> for LibSqlCollectionRepository<'_> {
    async fn select_all_ids(&self) -> Result<BTreeSet<i64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT entity_id FROM collection_items WHERE kind = ?1",
                [self.kind.as_str()],
            )
            .await?;
        let mut ids = BTreeSet::new();
        while let Some(row) = rows.next().await? {
            ids.insert(row.get::<i64>(0)?);
        }
        Ok(ids)
    }

    async fn select_by_ids(&self, ids: &BTreeSet<i64>) -> Result<Vec<CollectionEntity>> {
        let ids: Vec<i64> = ids.iter().copied().collect();
        let mut entities = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK) {
            let filter = format!("AND entity_id IN ({})", values::placeholders(1, chunk.len()));
            let mut params = vec![Value::Text(self.kind.as_str().to_string())];
            params.extend(chunk.iter().copied().map(Value::Integer));
            entities.extend(self.query_entities(&filter, params).await?);
        }
        Ok(entities)
    }

    async fn commit(&self, changes: &ChangeSet<CollectionEntity>) -> Result<()> {
        self.conn.execute("BEGIN IMMEDIATE", ()).await?;
        let result = self.apply(changes).await;
        finish_transaction(self.conn, result).await
    }
}
