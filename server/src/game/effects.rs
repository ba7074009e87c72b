use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectKind {
    SpeedBoost,
    RapidFire,
}

/// Active timed effects of one player, keyed by kind.
///
/// Each kind appears at most once; reapplying it moves its deadline instead
/// of adding a second instance.
#[derive(Debug, Clone, Default)]
pub struct TimedEffects {
    expiries: BTreeMap<EffectKind, f64>,
}

impl TimedEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts or restarts an effect. Returns true if it was already running.
    pub fn apply(&mut self, kind: EffectKind, now: f64, duration: f32) -> bool {
        self.expiries
            .insert(kind, now + duration as f64)
            .map_or(false, |old_expiry| old_expiry > now)
    }

    pub fn is_active(&self, kind: EffectKind, now: f64) -> bool {
        self.expiries.get(&kind).map_or(false, |&expiry| expiry > now)
    }

    pub fn remaining(&self, kind: EffectKind, now: f64) -> Option<f64> {
        self.expiries
            .get(&kind)
            .map(|&expiry| expiry - now)
            .filter(|remaining| *remaining > 0.0)
    }

    /// Removes and returns every effect whose deadline has passed
    pub fn expire(&mut self, now: f64) -> Vec<EffectKind> {
        let expired: Vec<EffectKind> = self
            .expiries
            .iter()
            .filter(|(_, &expiry)| expiry <= now)
            .map(|(kind, _)| *kind)
            .collect();
        for kind in &expired {
            self.expiries.remove(kind);
        }
        expired
    }

    pub fn clear(&mut self) {
        self.expiries.clear();
    }

    pub fn len(&self) -> usize {
        self.expiries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }
}
