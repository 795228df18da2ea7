//! JSON endpoints: private collection fields and logged plays.

use serde_json::{Map, Value};

use crate::convert::{to_bool, to_float, to_int};
use crate::http::PayloadError;
use crate::models::{CurrencySource, Play, PurchaseInfo};

/// Parse the private collection response for one object.
///
/// `Ok(None)` when the object has no private entry.
pub fn parse_private_collection(body: &str) -> Result<Option<PurchaseInfo>, PayloadError> {
    let root = parse_object(body)?;
    let Some(items) = root.get("items") else {
        return Err(PayloadError::Shape(
            "private collection response has no `items`".to_string(),
        ));
    };
    let Some(item) = items.as_array().and_then(|items| items.first()) else {
        return Ok(None);
    };
    let Some(item) = item.as_object() else {
        return Err(PayloadError::Shape("private item is not an object".to_string()));
    };
    // Older responses inline the fields on the item itself.
    let fields = item
        .get("privateinfo")
        .and_then(Value::as_object)
        .unwrap_or(item);

    let currency = text(fields.get("pp_currency")).map(|currency| currency.to_ascii_uppercase());
    let info = PurchaseInfo {
        price_paid: to_float(text(fields.get("pricepaid")).as_deref()),
        currency_source: currency.as_ref().map(|_| CurrencySource::Remote),
        currency,
        quantity: to_int(text(fields.get("quantity")).as_deref()),
        acquisition_date: text(fields.get("acquisitiondate"))
            .filter(|date| !date.starts_with("0000-00-00")),
        acquired_from: text(fields.get("acquiredfrom")),
        private_comment: text(fields.get("privatecomment")),
    };
    Ok(Some(info))
}

/// Parse one page of plays. A missing or null `plays` array is an empty page.
pub fn parse_plays(body: &str) -> Result<Vec<Play>, PayloadError> {
    let root = parse_object(body)?;
    let plays = match root.get("plays") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(plays)) => plays,
        Some(_) => return Err(PayloadError::Shape("`plays` is not an array".to_string())),
    };
    Ok(plays.iter().filter_map(play_from_value).collect())
}

fn play_from_value(value: &Value) -> Option<Play> {
    let record = value.as_object()?;
    let field = |name: &str| text(record.get(name));
    let play_id = to_int(field("playid").as_deref()).filter(|id| *id > 0)?;
    let (comments_value, comments_rendered) = comments(record.get("comments"));

    Some(Play {
        play_id,
        user_id: to_int(field("userid").as_deref()),
        object_type: field("objecttype"),
        object_id: to_int(field("objectid").as_deref()).unwrap_or_default(),
        tstamp: field("tstamp"),
        play_date: field("playdate"),
        quantity: to_int(field("quantity").as_deref()),
        length: to_int(field("length").as_deref()),
        location: field("location"),
        num_players: to_int(field("numplayers").as_deref()),
        length_ms: to_int(field("length_ms").as_deref()),
        comments_value,
        comments_rendered,
        incomplete: to_bool(field("incomplete").as_deref()),
        now_in_stats: to_bool(field("nowinstats").as_deref()),
        win_state: field("winstate"),
        online: to_bool(field("online").as_deref()),
        game_name: field("name"),
        players: record.get("players").cloned().unwrap_or(Value::Null),
        subtypes: record.get("subtypes").cloned().unwrap_or(Value::Null),
        raw: value.clone(),
    })
}

fn comments(value: Option<&Value>) -> (Option<String>, Option<String>) {
    match value {
        Some(Value::Object(comments)) => (
            text(comments.get("value")),
            text(comments.get("rendered")),
        ),
        Some(Value::String(comment)) if !comment.trim().is_empty() => {
            (Some(comment.clone()), Some(comment.clone()))
        }
        _ => (None, None),
    }
}

fn parse_object(body: &str) -> Result<Map<String, Value>, PayloadError> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(root)) => Ok(root),
        Ok(_) => Err(PayloadError::Shape("expected a JSON object".to_string())),
        Err(error) => Err(PayloadError::Syntax(format!("invalid JSON: {error}"))),
    }
}

/// Numbers and strings both arrive as text; empty strings mean absent.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(if *flag { "1" } else { "0" }.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
