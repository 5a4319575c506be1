//! Spell data identifiers: effects, auras, schools, targeting, hit results,
//! attribute and interrupt flags. Numeric values line up with the content
//! store's `spell_template` columns.

use bitflags::bitflags;

/// How many effect slots a spell template carries.
pub const NUM_EFFECTS: usize = 3;

/// Spell effect kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EffectKind {
    #[default]
    None = 0,
    SchoolDamage = 1,
    ApplyAura = 3,
    Heal = 6,
    RestoreMana = 11,
    WeaponDamage = 14,
    Threat = 18,
    InterruptCast = 22,
    MeleeAttack = 30,
}

impl EffectKind {
    pub fn from_id(id: i32) -> EffectKind {
        match id {
            1 => EffectKind::SchoolDamage,
            3 => EffectKind::ApplyAura,
            6 => EffectKind::Heal,
            11 => EffectKind::RestoreMana,
            14 => EffectKind::WeaponDamage,
            18 => EffectKind::Threat,
            22 => EffectKind::InterruptCast,
            30 => EffectKind::MeleeAttack,
            _ => EffectKind::None,
        }
    }
}

/// Aura variants carried by apply-aura effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AuraType {
    #[default]
    None = 0,
    PeriodicDamage = 1,
    PeriodicHeal = 2,
    InflictMechanic = 3,
    ModifyStat = 4,
    AbsorbDamage = 6,
    PeriodicRestoreMana = 10,
    ModifyMoveSpeedPct = 11,
    ModifyDamageDealtPct = 14,
    ModifyDamageReceivedPct = 15,
    Model = 19,
    Proc = 21,
    ModifyHealingDealtPct = 22,
    ModifyHealingRecvPct = 23,
}

impl AuraType {
    pub fn from_id(id: i32) -> AuraType {
        match id {
            1 => AuraType::PeriodicDamage,
            2 => AuraType::PeriodicHeal,
            3 => AuraType::InflictMechanic,
            4 => AuraType::ModifyStat,
            6 => AuraType::AbsorbDamage,
            10 => AuraType::PeriodicRestoreMana,
            11 => AuraType::ModifyMoveSpeedPct,
            14 => AuraType::ModifyDamageDealtPct,
            15 => AuraType::ModifyDamageReceivedPct,
            19 => AuraType::Model,
            21 => AuraType::Proc,
            22 => AuraType::ModifyHealingDealtPct,
            23 => AuraType::ModifyHealingRecvPct,
            _ => AuraType::None,
        }
    }
}

/// Control mechanics an `InflictMechanic` aura can apply. The value sits in
/// the effect's misc field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mechanic {
    None = 0,
    Stun = 1,
    Silence = 2,
    Root = 3,
}

impl Mechanic {
    pub fn from_id(id: i32) -> Mechanic {
        match id {
            1 => Mechanic::Stun,
            2 => Mechanic::Silence,
            3 => Mechanic::Root,
            _ => Mechanic::None,
        }
    }
}

/// Damage schools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum School {
    Physical = 0,
    Fire = 1,
    Frost = 2,
    Arcane = 3,
    Nature = 4,
    Shadow = 5,
    Holy = 6,
}

impl School {
    pub fn from_id(id: u8) -> School {
        match id {
            1 => School::Fire,
            2 => School::Frost,
            3 => School::Arcane,
            4 => School::Nature,
            5 => School::Shadow,
            6 => School::Holy,
            _ => School::Physical,
        }
    }
}

/// Effect targeting modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TargetType {
    #[default]
    None = 0,
    Caster = 1,
    Friendly = 2,
    AreaFriendly = 3,
    Hostile = 14,
    AreaHostile = 15,
    Any = 17,
    Ground = 19,
    Item = 20,
}

impl TargetType {
    pub fn from_id(id: i32) -> TargetType {
        match id {
            1 => TargetType::Caster,
            2 => TargetType::Friendly,
            3 => TargetType::AreaFriendly,
            14 => TargetType::Hostile,
            15 => TargetType::AreaHostile,
            17 => TargetType::Any,
            19 => TargetType::Ground,
            20 => TargetType::Item,
            _ => TargetType::None,
        }
    }
}

/// Single attacker/defender interaction outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HitResult {
    Normal = 0,
    Crit = 1,
    Miss = 2,
    Dodge = 3,
    Parry = 4,
    Block = 5,
    Evade = 6,
    Immune = 7,
    Absorb = 8,
}

bitflags! {
    /// Spell attribute flags from `spell_template.attributes`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SpellAttributes: u64 {
        const AUTO_APPROACH              = 1 << 0;
        const CANT_TARGET_SELF           = 1 << 1;
        const CAN_TARGET_DEAD            = 1 << 2;
        const CANT_CRIT                  = 1 << 3;
        const IGNORE_ARMOR               = 1 << 4;
        const IGNORE_INVULNERABILITY     = 1 << 5;
        const IGNORE_LOS                 = 1 << 6;
        const IGNORE_RESISTANCES         = 1 << 7;
        const NO_HEAL_BONUS              = 1 << 10;
        const NO_SPELL_BONUS             = 1 << 11;
        const NO_THREAT                  = 1 << 12;
        const NO_AGGRO                   = 1 << 13;
        const IMPOSSIBLE_BLOCK           = 1 << 14;
        const IMPOSSIBLE_DODGE           = 1 << 15;
        const IMPOSSIBLE_MISS            = 1 << 16;
        const IMPOSSIBLE_PARRY           = 1 << 17;
        const PASSIVE                    = 1 << 18;
        const ONE_PER_CASTER             = 1 << 20;
        const ONE_PER_TARGET             = 1 << 21;
        const NO_CANCEL_ON_MOVE          = 1 << 23;
        const SAME_STACK_FOR_ALL_CASTERS = 1 << 24;
        const TRIGGERED                  = 1 << 25;
        const TARGETS_GROUND             = 1 << 33;
        const TARGETS_ITEM               = 1 << 35;
        const PERSISTS_THROUGH_DEATH     = 1 << 42;
    }
}

bitflags! {
    /// Causes that interrupt a cast in progress.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InterruptFlags: u32 {
        const MOVEMENT    = 1 << 3;
        const TAKE_DAMAGE = 1 << 5;
    }
}

/// Hardcoded spell ids with built-in behavior rather than template data.
pub mod static_spells {
    /// Melee auto-attack.
    pub const MELEE: i32 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_kinds_decode() {
        assert_eq!(EffectKind::from_id(1), EffectKind::SchoolDamage);
        assert_eq!(EffectKind::from_id(3), EffectKind::ApplyAura);
        assert_eq!(EffectKind::from_id(255), EffectKind::None);
    }

    #[test]
    fn attribute_bits_are_disjoint() {
        assert!(SpellAttributes::all().contains(SpellAttributes::IMPOSSIBLE_DODGE));
        assert!((SpellAttributes::IMPOSSIBLE_DODGE & SpellAttributes::CANT_CRIT).is_empty());
    }
}
