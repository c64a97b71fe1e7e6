use std::path::Path;

use bytes::Buf;
use serde::de::DeserializeOwned;

use crate::{
    cards::{Card, CardType, Pack, PackSlotEntry, Pool, Rarity, Slot},
    err, Res,
};

const CACHE_FILE: &str = "packs.json";

const PACKS_QUERY: &str = r#"
query {
  Packs(limit: 0) {
    docs {
      id
      name
      cards {
        card { id name rarity { id name } cardType { id name } }
        pool
        slot
        percent
      }
    }
  }
}
"#;

async fn post_query(endpoint: &str, query: &str) -> Res<bytes::Bytes> {
    reqwest::Client::new()
        .post(endpoint)
        .json(&serde_json::json!({ "query": query }))
        .send()
        .await
        .map_err(|e| e.to_string())?
        .error_for_status()
        .map_err(|e| e.to_string())?
        .bytes()
        .await
        .map_err(|e| e.to_string())
}

fn decode_json<T: DeserializeOwned>(bytes: bytes::Bytes) -> Res<T> {
    serde_json::de::from_reader(bytes.reader()).map_err(|e| e.to_string())
}

async fn download_packs(endpoint: &str, path: &Path) -> Res<()> {
    let raw = post_query(endpoint, PACKS_QUERY).await?;

    // Reject error responses before they are cached.
    let response: GqlResponse = decode_json(raw.clone())?;
    if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
        return err(format!("Content query failed: {}", messages.join("; ")));
    }

    tokio::fs::write(path, raw)
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

#[derive(serde::Deserialize, Debug)]
struct GqlError {
    message: String,
}

#[derive(serde::Deserialize, Debug)]
struct GqlResponse {
    data: Option<GqlData>,
    errors: Option<Vec<GqlError>>,
}

#[derive(serde::Deserialize, Debug)]
struct GqlData {
    #[serde(rename = "Packs")]
    packs: GqlDocs,
}

#[derive(serde::Deserialize, Debug)]
struct GqlDocs {
    docs: Vec<GqlPack>,
}

/// Content store identifiers arrive as numbers or numeric strings depending on
/// the collection.
#[derive(serde::Deserialize, Debug)]
#[serde(untagged)]
enum GqlId {
    Number(u32),
    Text(String),
}

impl GqlId {
    fn number(&self) -> Option<u32> {
        match self {
            GqlId::Number(n) => Some(*n),
            GqlId::Text(s) => s.trim().parse().ok(),
        }
    }

    fn text(&self) -> String {
        match self {
            GqlId::Number(n) => n.to_string(),
            GqlId::Text(s) => s.clone(),
        }
    }
}

#[derive(serde::Deserialize, Debug)]
struct GqlRarity {
    id: GqlId,
    name: String,
}

#[derive(serde::Deserialize, Debug)]
struct GqlCardType {
    id: GqlId,
    name: String,
}

#[derive(serde::Deserialize, Debug)]
struct GqlCard {
    id: GqlId,
    name: String,
    rarity: Option<GqlRarity>,
    #[serde(rename = "cardType")]
    card_type: Option<GqlCardType>,
}

#[derive(serde::Deserialize, Debug)]
struct GqlPackCard {
    /// Null when the referenced card has been deleted.
    card: Option<GqlCard>,

    /// "regular" or "rare". Older records omit it.
    pool: Option<String>,

    slot: Option<String>,

    /// Drop rate within the slot, 0 to 100.
    percent: Option<f64>,
}

#[derive(serde::Deserialize, Debug)]
struct GqlPack {
    id: GqlId,
    name: String,
    #[serde(default)]
    cards: Vec<GqlPackCard>,
}

impl GqlCard {
    fn to_card(self) -> Option<Card> {
        let rarity = self.rarity?;
        Some(Card::new(
            self.id.text(),
            self.name,
            Rarity {
                id: rarity.id.number()?,
                name: rarity.name,
            },
            self.card_type.map(|t| CardType {
                id: t.id.text(),
                name: t.name,
            }),
        ))
    }
}

impl GqlPackCard {
    fn to_entry(self) -> Option<PackSlotEntry> {
        let slot = Slot::parse(self.slot.as_deref()?)?;
        let pool = match self.pool.as_deref().map(str::trim) {
            None | Some("") => slot.pool(),
            Some("regular") => Pool::Regular,
            Some("rare") => Pool::Rare,
            Some(_) => return None,
        };
        if pool != slot.pool() {
            return None;
        }
        let percent = self.percent.filter(|p| (0.0..=100.0).contains(p))?;

        Some(PackSlotEntry {
            card: self.card?.to_card()?,
            pool,
            slot,
            percent,
        })
    }
}

impl GqlPack {
    fn to_pack(self) -> Pack {
        let id = self.id.text();
        let total = self.cards.len();
        let entries: Vec<PackSlotEntry> = self
            .cards
            .into_iter()
            .filter_map(GqlPackCard::to_entry)
            .collect();
        if entries.len() < total {
            tracing::debug!(
                "Dropped {} malformed card entries from pack {id}.",
                total - entries.len()
            );
        }

        Pack {
            id,
            name: self.name,
            entries,
        }
    }
}

fn decode_packs(raw: bytes::Bytes) -> Res<Vec<Pack>> {
    let response: GqlResponse = decode_json(raw)?;
    let Some(data) = response.data else {
        return err("Content response contained no data.");
    };
    Ok(data.packs.docs.into_iter().map(GqlPack::to_pack).collect())
}

/// Load pack definitions from the cache in the data directory, downloading
/// them from the content endpoint first if there is no cache.
pub async fn load_packs(data: &Path, endpoint: Option<&str>) -> Res<Vec<Pack>> {
    tracing::debug!("Loading pack data.");

    tokio::fs::create_dir_all(data)
        .await
        .map_err(|e| e.to_string())?;
    let file = data.join(CACHE_FILE);

    if !file.exists() {
        let Some(endpoint) = endpoint else {
            return err(format!(
                "No pack data at {} and no content endpoint configured.",
                file.display()
            ));
        };
        tracing::debug!("File not found in cache, downloading to {}", file.display());
        download_packs(endpoint, &file).await?;
        tracing::debug!("Successfully downloaded data.");
    }

    let raw = tokio::fs::read(&file).await.map_err(|e| e.to_string())?;
    tracing::debug!("Read pack data from disk. Parsing JSON.");
    decode_packs(bytes::Bytes::from(raw))
}
