//! Unit stats, equipment slots, factions.

use bitflags::bitflags;

/// Unit stat identifiers. The ids line up with `item_template.stat*_type`
/// in the content store and with the stat variable block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u16)]
pub enum Stat {
    #[default]
    NullStat = 0,
    ArmorValue = 3,
    Strength = 4,
    Agility = 5,
    Willpower = 6,
    Intelligence = 7,
    Courage = 8,
    WeaponValue = 11,
    MeleeCritical = 15,
    SpellCritical = 17,
    DodgeRating = 18,
    BlockRating = 19,
    ResistFrost = 20,
    ResistFire = 21,
    ResistShadow = 22,
    ResistHoly = 23,
    ParryRating = 40,
}

impl Stat {
    pub fn from_id(id: u16) -> Option<Stat> {
        Some(match id {
            3 => Stat::ArmorValue,
            4 => Stat::Strength,
            5 => Stat::Agility,
            6 => Stat::Willpower,
            7 => Stat::Intelligence,
            8 => Stat::Courage,
            11 => Stat::WeaponValue,
            15 => Stat::MeleeCritical,
            17 => Stat::SpellCritical,
            18 => Stat::DodgeRating,
            19 => Stat::BlockRating,
            20 => Stat::ResistFrost,
            21 => Stat::ResistFire,
            22 => Stat::ResistShadow,
            23 => Stat::ResistHoly,
            40 => Stat::ParryRating,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Stat::NullStat => "None",
            Stat::ArmorValue => "Armor Value",
            Stat::Strength => "Strength",
            Stat::Agility => "Agility",
            Stat::Willpower => "Willpower",
            Stat::Intelligence => "Intelligence",
            Stat::Courage => "Courage",
            Stat::WeaponValue => "Weapon Value",
            Stat::MeleeCritical => "Melee Critical",
            Stat::SpellCritical => "Spell Critical",
            Stat::DodgeRating => "Dodge Rating",
            Stat::BlockRating => "Block Rating",
            Stat::ResistFrost => "Frost Resistance",
            Stat::ResistFire => "Fire Resistance",
            Stat::ResistShadow => "Shadow Resistance",
            Stat::ResistHoly => "Holy Resistance",
            Stat::ParryRating => "Parry Rating",
        }
    }
}

/// The five stats a player can invest level-up points into.
pub const PRIMARY_STATS: [Stat; 5] = [
    Stat::Strength,
    Stat::Agility,
    Stat::Willpower,
    Stat::Intelligence,
    Stat::Courage,
];

/// Equipment slots, matching the client's paper-doll layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EquipSlot {
    None = 0,
    Helm = 1,
    Weapon = 2,
    Offhand = 3,
    Ranged = 4,
    Chest = 5,
    Necklace = 6,
    Hands = 7,
    Ring1 = 8,
    Ring2 = 9,
    Feet = 10,
    Legs = 11,
    Belt = 12,
}

pub const NUM_EQUIP_SLOTS: usize = 13;

impl EquipSlot {
    pub fn from_id(id: u8) -> Option<EquipSlot> {
        Some(match id {
            1 => EquipSlot::Helm,
            2 => EquipSlot::Weapon,
            3 => EquipSlot::Offhand,
            4 => EquipSlot::Ranged,
            5 => EquipSlot::Chest,
            6 => EquipSlot::Necklace,
            7 => EquipSlot::Hands,
            8 => EquipSlot::Ring1,
            9 => EquipSlot::Ring2,
            10 => EquipSlot::Feet,
            11 => EquipSlot::Legs,
            12 => EquipSlot::Belt,
            _ => return None,
        })
    }

    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Slots the client renders on other players; changes broadcast.
    pub fn is_visible(self) -> bool {
        matches!(
            self,
            EquipSlot::Helm
                | EquipSlot::Weapon
                | EquipSlot::Offhand
                | EquipSlot::Chest
                | EquipSlot::Hands
                | EquipSlot::Feet
                | EquipSlot::Legs
        )
    }
}

/// Unit faction, driving hostility and aggro.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Faction {
    PlayerDefault = 0,
    Friendly = 1,
    Neutral = 2,
    Hostile = 3,
}

impl Faction {
    pub fn from_id(id: u8) -> Faction {
        match id {
            1 => Faction::Friendly,
            2 => Faction::Neutral,
            3 => Faction::Hostile,
            _ => Faction::PlayerDefault,
        }
    }
}

bitflags! {
    /// NPC capability flags from `npc_template.npc_flags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NpcFlags: u32 {
        const GOSSIP      = 0x0001;
        const QUEST_GIVER = 0x0002;
        const VENDOR      = 0x0004;
        const BANKER      = 0x0040;
        const REPAIR      = 0x0080;
    }
}
