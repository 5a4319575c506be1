//! Combat math: the hit-roll table and the damage/heal pipelines.

use rand::rngs::StdRng;
use rand::Rng;

use duskmere_core::defines::spell::{HitResult, School, SpellAttributes};

/// Everything the hit table needs about one attacker→defender interaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct HitInput {
    pub attacker_level: i32,
    pub attacker_weapon_skill: i32,
    pub attacker_crit_rating: i32,
    pub defender_level: i32,
    pub defender_dodge_rating: i32,
    pub defender_parry_rating: i32,
    pub defender_block_rating: i32,
}

/// Chance floors and caps per slot, in percent.
const MISS_BASE: f32 = 5.0;
const MISS_CAP: f32 = 30.0;
const AVOID_BASE: f32 = 3.0;
const AVOID_CAP: f32 = 25.0;
const BLOCK_CAP: f32 = 30.0;
const CRIT_BASE: f32 = 5.0;
const CRIT_CAP: f32 = 50.0;

/// Fraction of damage a block removes.
pub const BLOCK_REDUCTION: f32 = 0.5;

fn clamp_pct(value: f32, cap: f32) -> f32 {
    value.clamp(0.0, cap)
}

/// Per-slot probabilities after attribute suppression.
pub fn hit_chances(input: &HitInput, attributes: SpellAttributes) -> [f32; 5] {
    let skill_gap = (input.defender_level * 5 - input.attacker_weapon_skill) as f32;

    let miss = if attributes.contains(SpellAttributes::IMPOSSIBLE_MISS) {
        0.0
    } else {
        clamp_pct(MISS_BASE + skill_gap * 0.1, MISS_CAP)
    };
    let dodge = if attributes.contains(SpellAttributes::IMPOSSIBLE_DODGE) {
        0.0
    } else {
        clamp_pct(AVOID_BASE + input.defender_dodge_rating as f32 * 0.05, AVOID_CAP)
    };
    let parry = if attributes.contains(SpellAttributes::IMPOSSIBLE_PARRY) {
        0.0
    } else {
        clamp_pct(AVOID_BASE + input.defender_parry_rating as f32 * 0.05, AVOID_CAP)
    };
    let block = if attributes.contains(SpellAttributes::IMPOSSIBLE_BLOCK)
        || input.defender_block_rating <= 0
    {
        0.0
    } else {
        clamp_pct(input.defender_block_rating as f32 * 0.05, BLOCK_CAP)
    };
    let crit = if attributes.contains(SpellAttributes::CANT_CRIT) {
        0.0
    } else {
        clamp_pct(CRIT_BASE + input.attacker_crit_rating as f32 * 0.05, CRIT_CAP)
    };

    [miss, dodge, parry, block, crit]
}

/// Roll one result from the ordered table: miss, dodge, parry, block,
/// crit, normal. A single draw is compared against cumulative thresholds;
/// a draw on a boundary falls to the later slot.
pub fn roll_hit(rng: &mut StdRng, input: &HitInput, attributes: SpellAttributes) -> HitResult {
    let [miss, dodge, parry, block, crit] = hit_chances(input, attributes);
    let roll = rng.gen_range(0.0..100.0);

    let mut threshold = miss;
    if roll < threshold {
        return HitResult::Miss;
    }
    threshold += dodge;
    if roll < threshold {
        return HitResult::Dodge;
    }
    threshold += parry;
    if roll < threshold {
        return HitResult::Parry;
    }
    threshold += block;
    if roll < threshold {
        return HitResult::Block;
    }
    threshold += crit;
    if roll < threshold {
        return HitResult::Crit;
    }
    HitResult::Normal
}

/// School resistance scaling: each point of resistance sheds 0.04%, capped
/// at 75% reduction. Physical damage is never resisted (armor handles it).
pub fn resist_factor(school: School, resistance: i32) -> f32 {
    if school == School::Physical {
        return 1.0;
    }
    let reduction = (resistance as f32 * 0.04).clamp(0.0, 75.0);
    1.0 - reduction / 100.0
}

pub struct DamageInput {
    pub base: i32,
    pub school: School,
    pub result: HitResult,
    pub crit_multiplier: f32,
    pub target_resistance: i32,
    pub target_armor: i32,
    pub ignore_armor: bool,
    pub ignore_resistances: bool,
}

/// The damage pipeline, absorb excluded (shields are consumed against the
/// final value by the caller since they live on the target's aura list).
pub fn compute_damage(input: &DamageInput) -> i32 {
    let mut damage = input.base as f32;

    match input.result {
        HitResult::Miss | HitResult::Dodge | HitResult::Parry | HitResult::Evade => return 0,
        HitResult::Crit => damage *= input.crit_multiplier,
        HitResult::Block => damage *= 1.0 - BLOCK_REDUCTION,
        _ => {}
    }

    if !input.ignore_resistances {
        damage *= resist_factor(input.school, input.target_resistance);
    }

    if input.school == School::Physical && !input.ignore_armor {
        damage -= input.target_armor as f32;
    }

    (damage as i32).max(0)
}

/// Healing scales with the caster's healing-dealt and the target's
/// healing-received percent modifiers; a crit doubles it. The caller clamps
/// to the target's missing health.
pub fn compute_heal(
    base: i32,
    crit: bool,
    healing_dealt_pct: i32,
    healing_received_pct: i32,
) -> i32 {
    let mut heal = base as f32;
    heal *= 1.0 + healing_dealt_pct as f32 / 100.0;
    heal *= 1.0 + healing_received_pct as f32 / 100.0;
    if crit {
        heal *= 2.0;
    }
    (heal as i32).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn even_input() -> HitInput {
        HitInput {
            attacker_level: 5,
            attacker_weapon_skill: 25,
            attacker_crit_rating: 0,
            defender_level: 5,
            defender_dodge_rating: 0,
            defender_parry_rating: 0,
            defender_block_rating: 0,
        }
    }

    #[test]
    fn suppression_flags_zero_their_slots() {
        let input = even_input();
        let all = SpellAttributes::IMPOSSIBLE_MISS
            | SpellAttributes::IMPOSSIBLE_DODGE
            | SpellAttributes::IMPOSSIBLE_PARRY
            | SpellAttributes::IMPOSSIBLE_BLOCK
            | SpellAttributes::CANT_CRIT;
        assert_eq!(hit_chances(&input, all), [0.0; 5]);
    }

    #[test]
    fn suppressed_table_always_lands_normal() {
        let mut rng = StdRng::seed_from_u64(7);
        let input = even_input();
        let all = SpellAttributes::IMPOSSIBLE_MISS
            | SpellAttributes::IMPOSSIBLE_DODGE
            | SpellAttributes::IMPOSSIBLE_PARRY
            | SpellAttributes::IMPOSSIBLE_BLOCK
            | SpellAttributes::CANT_CRIT;
        for _ in 0..100 {
            assert_eq!(roll_hit(&mut rng, &input, all), HitResult::Normal);
        }
    }

    #[test]
    fn identical_seed_rolls_identically() {
        let input = even_input();
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            assert_eq!(
                roll_hit(&mut a, &input, SpellAttributes::empty()),
                roll_hit(&mut b, &input, SpellAttributes::empty())
            );
        }
    }

    #[test]
    fn chances_respect_caps() {
        let input = HitInput {
            defender_dodge_rating: 10_000,
            attacker_crit_rating: 10_000,
            defender_block_rating: 10_000,
            defender_level: 100,
            ..even_input()
        };
        let [miss, dodge, _, block, crit] = hit_chances(&input, SpellAttributes::empty());
        assert_eq!(miss, MISS_CAP);
        assert_eq!(dodge, AVOID_CAP);
        assert_eq!(block, BLOCK_CAP);
        assert_eq!(crit, CRIT_CAP);
    }

    #[test]
    fn avoided_hits_deal_nothing() {
        for result in [HitResult::Miss, HitResult::Dodge, HitResult::Parry] {
            let damage = compute_damage(&DamageInput {
                base: 100,
                school: School::Fire,
                result,
                crit_multiplier: 2.0,
                target_resistance: 0,
                target_armor: 0,
                ignore_armor: false,
                ignore_resistances: false,
            });
            assert_eq!(damage, 0);
        }
    }

    #[test]
    fn crit_multiplies_and_block_halves() {
        let mut input = DamageInput {
            base: 30,
            school: School::Fire,
            result: HitResult::Crit,
            crit_multiplier: 2.0,
            target_resistance: 0,
            target_armor: 0,
            ignore_armor: false,
            ignore_resistances: false,
        };
        assert_eq!(compute_damage(&input), 60);

        input.result = HitResult::Block;
        assert_eq!(compute_damage(&input), 15);
    }

    #[test]
    fn armor_reduces_physical_only() {
        let mut input = DamageInput {
            base: 30,
            school: School::Physical,
            result: HitResult::Normal,
            crit_multiplier: 2.0,
            target_resistance: 100,
            target_armor: 10,
            ignore_armor: false,
            ignore_resistances: false,
        };
        assert_eq!(compute_damage(&input), 20);

        input.school = School::Frost;
        input.target_armor = 1_000;
        input.target_resistance = 0;
        assert_eq!(compute_damage(&input), 30);
    }

    #[test]
    fn damage_clamps_at_zero() {
        let input = DamageInput {
            base: 5,
            school: School::Physical,
            result: HitResult::Normal,
            crit_multiplier: 2.0,
            target_resistance: 0,
            target_armor: 50,
            ignore_armor: false,
            ignore_resistances: false,
        };
        assert_eq!(compute_damage(&input), 0);
    }

    #[test]
    fn resistance_caps_at_75_percent() {
        assert_eq!(resist_factor(School::Fire, 0), 1.0);
        assert!((resist_factor(School::Fire, 10_000) - 0.25).abs() < 1e-6);
        assert_eq!(resist_factor(School::Physical, 10_000), 1.0);
    }

    #[test]
    fn heal_scaling_and_crit() {
        assert_eq!(compute_heal(100, false, 0, 0), 100);
        assert_eq!(compute_heal(100, false, 20, 0), 120);
        assert_eq!(compute_heal(100, false, 0, 50), 150);
        assert_eq!(compute_heal(100, true, 0, 0), 200);
        assert_eq!(compute_heal(100, false, -200, 0), 0);
    }
}
