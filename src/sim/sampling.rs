use rand::Rng;

use crate::cards::{Card, Pack, PackSlotEntry, Slot};

use super::{PackType, SimulatorConfig, SimulatorError};

/// Percentages are scaled by this before rounding to integer weights.
pub const WEIGHT_SCALE: f64 = 100_000.0;

/// Convert a drop rate percentage into an integer sampling weight. Rounding
/// means the weights of a slot may total slightly more or less than the
/// percentages suggest. Unusable percentages weigh nothing.
pub fn to_weight(percent: f64) -> u64 {
    if !percent.is_finite() || percent <= 0.0 {
        return 0;
    }
    (percent * WEIGHT_SCALE).round() as u64
}

#[derive(Debug)]
pub struct Interval<'a> {
    pub entry: &'a PackSlotEntry,
    pub lower: u64,
    pub upper: u64,
}

impl Interval<'_> {
    pub fn weight(&self) -> u64 {
        self.upper - self.lower
    }

    fn contains(&self, value: u64) -> bool {
        self.lower <= value && value < self.upper
    }
}

/// Candidates laid end to end as half open intervals `[lower, upper)` over
/// `[0, total)`, in ascending rarity order.
///
/// Weights that cannot be summed in a `u64` are rejected rather than wrapped,
/// as a wrapped total would leave the intervals overlapping.
#[derive(Debug)]
pub struct CumulativeTable<'a> {
    intervals: Vec<Interval<'a>>,
    total: u64,
}

impl<'a> CumulativeTable<'a> {
    pub fn build<I: IntoIterator<Item = &'a PackSlotEntry>>(candidates: I) -> Option<Self> {
        let mut sorted: Vec<&PackSlotEntry> = candidates.into_iter().collect();
        sorted.sort_by_key(|entry| entry.card.rarity.id);

        let mut total: u64 = 0;
        let mut intervals = Vec::with_capacity(sorted.len());
        for entry in sorted {
            let lower = total;
            total = total.checked_add(to_weight(entry.percent))?;
            intervals.push(Interval {
                entry,
                lower,
                upper: total,
            });
        }

        Some(Self { intervals, total })
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn intervals(&self) -> &[Interval<'a>] {
        &self.intervals
    }

    /// The first candidate whose interval contains the value.
    pub fn find(&self, value: u64) -> Option<&'a PackSlotEntry> {
        self.intervals
            .iter()
            .find(|interval| interval.contains(value))
            .map(|interval| interval.entry)
    }

    /// Draw a candidate with probability proportional to its weight. None if
    /// the table has no weight to draw from.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<&'a PackSlotEntry> {
        if self.total == 0 {
            return None;
        }
        self.find(rng.gen_range(0..self.total))
    }
}

pub fn determine_pack_type<R: Rng>(rng: &mut R, config: &SimulatorConfig) -> PackType {
    if config.rare_roll_range > 0 && rng.gen_range(0..config.rare_roll_range) < config.rare_threshold
    {
        PackType::Rare
    } else {
        PackType::Regular
    }
}

/// Draw one card for a slot from the entries of a pack.
pub fn pull_from_pool<R: Rng>(
    entries: &[PackSlotEntry],
    slot: Slot,
    rng: &mut R,
) -> Result<Card, SimulatorError> {
    let table = CumulativeTable::build(entries.iter().filter(|entry| entry.slot == slot))
        .ok_or(SimulatorError::WeightOverflow { slot })?;
    if table.is_empty() {
        return Err(SimulatorError::EmptySlot { slot });
    }

    table
        .sample(rng)
        .map(|entry| entry.card.clone())
        .ok_or(SimulatorError::ZeroWeight { slot })
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct DropRate {
    pub card: Card,
    /// Percentage as listed in the pack data.
    pub percent: f64,
    pub weight: u64,
    /// Percentage actually used when sampling, after rounding.
    pub share: f64,
}

/// The drop rate table of one slot of a pack, in sampling order.
pub fn drop_rates(pack: &Pack, slot: Slot) -> Result<Vec<DropRate>, SimulatorError> {
    let table = CumulativeTable::build(pack.candidates(slot))
        .ok_or(SimulatorError::WeightOverflow { slot })?;
    let total = table.total();
    Ok(table
        .intervals()
        .iter()
        .map(|interval| DropRate {
            card: interval.entry.card.clone(),
            percent: interval.entry.percent,
            weight: interval.weight(),
            share: if total == 0 {
                0.0
            } else {
                interval.weight() as f64 / total as f64 * 100.0
            },
        })
        .collect())
}
