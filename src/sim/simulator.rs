use std::{collections::HashMap, sync::Arc};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::cards::{Card, Pack, Slot};

use super::{
    sampling::{determine_pack_type, pull_from_pool},
    PackType, SimulatorConfig, SimulatorError,
};

/// Card slots drawn, in order, for each type of pack.
const REGULAR_SLOTS: [Slot; 5] = [
    Slot::First,
    Slot::First,
    Slot::First,
    Slot::Fourth,
    Slot::Fifth,
];
const RARE_SLOTS: [Slot; 5] = [Slot::RarePack; 5];

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct PullResult {
    pub pack_type: PackType,
    pub cards: Vec<Card>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    current_pull: Option<PullResult>,
    history: Vec<Card>,
    regular_count: u64,
    rare_count: u64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Stats {
    pub regular_count: u64,
    pub rare_count: u64,
    pub total_packs: u64,
    pub currency_units_spent: u64,
    /// Real world price of the currency spent, in dollars.
    pub derived_monetary_cost: f64,
    pub pack_points: u64,
}

impl Stats {
    fn new(regular_count: u64, rare_count: u64, config: &SimulatorConfig) -> Self {
        let total_packs = regular_count + rare_count;
        let currency_units_spent = total_packs * u64::from(config.cost_per_pack);
        Self {
            regular_count,
            rare_count,
            total_packs,
            currency_units_spent,
            derived_monetary_cost: (currency_units_spent as f64 * config.cents_per_unit).round()
                / 100.0,
            pack_points: total_packs * u64::from(config.points_per_pack),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct CardTotal {
    pub card: Card,
    pub quantity: usize,
}

/// Opens packs of a single pack definition and tracks what has been pulled.
/// State only changes through `open_pack` and `reset_session`.
pub struct PackSimulator<R: Rng = StdRng> {
    pack: Arc<Pack>,
    config: SimulatorConfig,
    rng: R,
    state: SessionState,
}

impl PackSimulator<StdRng> {
    pub fn seeded(pack: impl Into<Arc<Pack>>, config: SimulatorConfig, seed: u64) -> Self {
        Self::new(pack, config, StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy(pack: impl Into<Arc<Pack>>, config: SimulatorConfig) -> Self {
        Self::new(pack, config, StdRng::from_entropy())
    }
}

impl<R: Rng> PackSimulator<R> {
    pub fn new(pack: impl Into<Arc<Pack>>, config: SimulatorConfig, rng: R) -> Self {
        Self {
            pack: pack.into(),
            config,
            rng,
            state: SessionState::default(),
        }
    }

    pub fn pack(&self) -> &Pack {
        &self.pack
    }

    /// Open one pack. If any slot cannot be drawn the session is left exactly
    /// as it was.
    pub fn open_pack(&mut self, force_rare: bool) -> Result<PullResult, SimulatorError> {
        let pack_type = if force_rare {
            PackType::Rare
        } else {
            determine_pack_type(&mut self.rng, &self.config)
        };

        let slots = match pack_type {
            PackType::Regular => &REGULAR_SLOTS,
            PackType::Rare => &RARE_SLOTS,
        };
        let cards = slots
            .iter()
            .map(|&slot| pull_from_pool(&self.pack.entries, slot, &mut self.rng))
            .collect::<Result<Vec<Card>, SimulatorError>>()?;

        match pack_type {
            PackType::Regular => self.state.regular_count += 1,
            PackType::Rare => self.state.rare_count += 1,
        }
        self.state.history.extend(cards.iter().cloned());

        let pull = PullResult { pack_type, cards };
        self.state.current_pull = Some(pull.clone());
        Ok(pull)
    }

    pub fn reset_session(&mut self) {
        self.state = SessionState::default();
    }

    pub fn statistics(&self) -> Stats {
        Stats::new(self.state.regular_count, self.state.rare_count, &self.config)
    }

    pub fn current_pull(&self) -> Option<&PullResult> {
        self.state.current_pull.as_ref()
    }

    /// Every card pulled this session, in pull order.
    pub fn history(&self) -> &[Card] {
        &self.state.history
    }

    #[cfg(test)]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Count of each distinct card pulled, rarest first and then most pulled
    /// first. Ties keep the order cards were first pulled in.
    pub fn aggregate_pull_history(&self) -> Vec<CardTotal> {
        aggregate(&self.state.history)
    }
}

fn aggregate(history: &[Card]) -> Vec<CardTotal> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut totals: Vec<CardTotal> = Vec::new();
    for card in history {
        match index.get(card.id()) {
            Some(&i) => totals[i].quantity += 1,
            None => {
                index.insert(card.id(), totals.len());
                totals.push(CardTotal {
                    card: card.clone(),
                    quantity: 1,
                });
            }
        }
    }

    totals.sort_by(|a, b| {
        b.card
            .rarity
            .id
            .cmp(&a.card.rarity.id)
            .then(b.quantity.cmp(&a.quantity))
    });
    totals
}
