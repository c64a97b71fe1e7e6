use std::{collections::HashMap, sync::Arc};

pub mod graphql;

/// Card rarity. The identifier orders rarities for sorting and display, it
/// plays no part in drop rates.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rarity {
    pub id: u32,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CardType {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Card {
    id: String,
    name: String,
    pub rarity: Rarity,
    card_type: Option<CardType>,
}

impl Card {
    pub fn new(id: String, name: String, rarity: Rarity, card_type: Option<CardType>) -> Self {
        Self {
            id,
            name,
            rarity,
            card_type,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    #[cfg(test)]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(test)]
    pub fn card_type(&self) -> Option<&CardType> {
        self.card_type.as_ref()
    }

    #[cfg(test)]
    pub fn sample(rarity: u32) -> Self {
        static ID: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(1);

        let id = ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Self {
            id: format!("card-{id}"),
            name: format!("Card {id}"),
            rarity: Rarity {
                id: rarity,
                name: format!("Rarity {rarity}"),
            },
            card_type: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pool {
    Regular,
    Rare,
}

/// The positions within a pack that share one drop rate table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Slot {
    #[serde(rename = "123")]
    First,
    #[serde(rename = "4")]
    Fourth,
    #[serde(rename = "5")]
    Fifth,
    #[serde(rename = "12345")]
    RarePack,
}

impl Slot {
    pub const ALL: [Slot; 4] = [Slot::First, Slot::Fourth, Slot::Fifth, Slot::RarePack];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "123" => Some(Slot::First),
            "4" => Some(Slot::Fourth),
            "5" => Some(Slot::Fifth),
            "12345" => Some(Slot::RarePack),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Slot::First => "123",
            Slot::Fourth => "4",
            Slot::Fifth => "5",
            Slot::RarePack => "12345",
        }
    }

    pub fn pool(self) -> Pool {
        match self {
            Slot::First | Slot::Fourth | Slot::Fifth => Pool::Regular,
            Slot::RarePack => Pool::Rare,
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A card's chance of appearing in a slot, given that slot is being drawn.
/// Percentages within a slot are relative weights and need not total 100.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PackSlotEntry {
    pub card: Card,
    pub pool: Pool,
    pub slot: Slot,
    pub percent: f64,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Pack {
    pub id: String,
    pub name: String,
    pub entries: Vec<PackSlotEntry>,
}

impl Pack {
    pub fn candidates(&self, slot: Slot) -> impl Iterator<Item = &PackSlotEntry> {
        self.entries.iter().filter(move |e| e.slot == slot)
    }
}

pub struct PackCatalog {
    /// Map from lowercased pack ID to pack. Packs are shared with every
    /// session simulating them.
    id_to_pack: HashMap<String, Arc<Pack>>,
}

impl PackCatalog {
    pub fn new() -> Self {
        Self {
            id_to_pack: HashMap::new(),
        }
    }

    pub fn add(&mut self, pack: Pack) {
        let key = pack.id.to_ascii_lowercase();
        self.id_to_pack.insert(key, Arc::new(pack));
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Pack>> {
        self.id_to_pack.get(&id.to_ascii_lowercase())
    }

    pub fn size(&self) -> usize {
        self.id_to_pack.len()
    }

    /// All packs, ordered by ID.
    pub fn packs(&self) -> Vec<&Arc<Pack>> {
        let mut packs: Vec<&Arc<Pack>> = self.id_to_pack.values().collect();
        packs.sort_by(|a, b| a.id.cmp(&b.id));
        packs
    }
}

#[cfg(test)]
mod test {
    use super::{Card, Pack, PackCatalog, PackSlotEntry, Pool, Slot};

    #[test]
    fn test_slot_codes() {
        for slot in Slot::ALL {
            assert_eq!(Slot::parse(slot.code()), Some(slot));
        }
        assert_eq!(Slot::parse(" 4 "), Some(Slot::Fourth));
        assert_eq!(Slot::parse("1234"), None);
        assert_eq!(Slot::RarePack.pool(), Pool::Rare);
        assert_eq!(Slot::First.pool(), Pool::Regular);
    }

    #[test]
    fn test_slot_serde() {
        let json = serde_json::to_string(&Slot::RarePack).unwrap();
        assert_eq!(json, "\"12345\"");
        let slot: Slot = serde_json::from_str("\"123\"").unwrap();
        assert_eq!(slot, Slot::First);
    }

    #[test]
    fn test_catalog_lookup() {
        let mut catalog = PackCatalog::new();
        catalog.add(Pack {
            id: "Genetic-Apex".to_string(),
            name: "Genetic Apex".to_string(),
            entries: vec![PackSlotEntry {
                card: Card::sample(1),
                pool: Pool::Regular,
                slot: Slot::First,
                percent: 100.0,
            }],
        });
        catalog.add(Pack {
            id: "a-pack".to_string(),
            name: "A Pack".to_string(),
            entries: Vec::new(),
        });

        assert_eq!(catalog.size(), 2);
        assert!(catalog.get("genetic-apex").is_some());
        assert!(catalog.get("GENETIC-APEX").is_some());
        assert!(catalog.get("missing").is_none());
        let ids: Vec<&str> = catalog.packs().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["Genetic-Apex", "a-pack"]);
    }

    #[test]
    fn test_candidates() {
        let pack = Pack {
            id: "p".to_string(),
            name: "P".to_string(),
            entries: vec![
                PackSlotEntry {
                    card: Card::sample(1),
                    pool: Pool::Regular,
                    slot: Slot::First,
                    percent: 50.0,
                },
                PackSlotEntry {
                    card: Card::sample(2),
                    pool: Pool::Regular,
                    slot: Slot::Fourth,
                    percent: 50.0,
                },
            ],
        };
        assert_eq!(pack.candidates(Slot::First).count(), 1);
        assert_eq!(pack.candidates(Slot::RarePack).count(), 0);
    }
}
