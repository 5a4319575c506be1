//! Per-player spell cooldowns: per-spell expiry, optional category lockout,
//! and the global cooldown. Expiries are stored against the game clock's
//! millisecond timeline.

use std::collections::HashMap;

/// Default global cooldown when the template leaves it unset.
pub const DEFAULT_GCD_MS: i32 = 1000;

#[derive(Debug, Default, Clone)]
pub struct CooldownHolder {
    by_spell: HashMap<i32, i64>,
    by_category: HashMap<i32, i64>,
    gcd_until: i64,
}

impl CooldownHolder {
    pub fn new() -> CooldownHolder {
        CooldownHolder::default()
    }

    pub fn set(&mut self, spell_id: i32, now_ms: i64, duration_ms: i32) {
        if duration_ms > 0 {
            self.by_spell.insert(spell_id, now_ms + duration_ms as i64);
        }
    }

    pub fn set_category(&mut self, category: i32, now_ms: i64, duration_ms: i32) {
        if category > 0 && duration_ms > 0 {
            self.by_category
                .insert(category, now_ms + duration_ms as i64);
        }
    }

    pub fn set_gcd(&mut self, now_ms: i64, duration_ms: i32) {
        if duration_ms > 0 {
            self.gcd_until = self.gcd_until.max(now_ms + duration_ms as i64);
        }
    }

    pub fn is_ready(&self, spell_id: i32, category: i32, now_ms: i64) -> bool {
        if now_ms < self.gcd_until {
            return false;
        }
        if let Some(&until) = self.by_spell.get(&spell_id) {
            if now_ms < until {
                return false;
            }
        }
        if category > 0 {
            if let Some(&until) = self.by_category.get(&category) {
                if now_ms < until {
                    return false;
                }
            }
        }
        true
    }

    pub fn remaining_ms(&self, spell_id: i32, now_ms: i64) -> i32 {
        self.by_spell
            .get(&spell_id)
            .map(|&until| (until - now_ms).max(0) as i32)
            .unwrap_or(0)
    }

    /// Active (spell id, remaining ms) pairs, for the login resend.
    pub fn active(&self, now_ms: i64) -> Vec<(i32, i32)> {
        let mut list: Vec<(i32, i32)> = self
            .by_spell
            .iter()
            .filter(|(_, &until)| until > now_ms)
            .map(|(&spell, &until)| (spell, (until - now_ms) as i32))
            .collect();
        list.sort_unstable();
        list
    }

    pub fn clear(&mut self) {
        self.by_spell.clear();
        self.by_category.clear();
        self.gcd_until = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spell_cooldown_gates_until_expiry() {
        let mut cd = CooldownHolder::new();
        cd.set(101, 1_000, 4_500);

        assert!(!cd.is_ready(101, 0, 2_000));
        assert_eq!(cd.remaining_ms(101, 2_000), 3_500);
        assert!(cd.is_ready(101, 0, 5_500));
        assert_eq!(cd.remaining_ms(101, 6_000), 0);
    }

    #[test]
    fn category_lockout_blocks_other_spells_in_category() {
        let mut cd = CooldownHolder::new();
        cd.set_category(7, 0, 10_000);

        assert!(!cd.is_ready(999, 7, 5_000));
        assert!(cd.is_ready(999, 8, 5_000));
        assert!(cd.is_ready(999, 7, 10_000));
    }

    #[test]
    fn gcd_blocks_everything_briefly() {
        let mut cd = CooldownHolder::new();
        cd.set_gcd(0, DEFAULT_GCD_MS);

        assert!(!cd.is_ready(1, 0, 500));
        assert!(cd.is_ready(1, 0, 1_000));
    }

    #[test]
    fn active_lists_unexpired_cooldowns() {
        let mut cd = CooldownHolder::new();
        cd.set(101, 0, 4_500);
        cd.set(102, 0, 100);

        assert_eq!(cd.active(1_000), vec![(101, 3_500)]);
    }
}
