//! Character rows and the transactional full save.
//!
//! A player record only commits when the character row and every sub-store
//! (inventory, equipment, bank, quest log, stat bonuses) have been written
//! in the same transaction.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use duskmere_core::defines::player::MAX_CHARACTERS_PER_ACCOUNT;

use crate::db::database::Database;

#[derive(Debug, Clone, Default)]
pub struct CharacterRecord {
    pub guid: i32,
    pub account_id: i32,
    pub name: String,
    pub class_id: u8,
    pub gender: u8,
    pub portrait_id: i32,
    pub level: i32,
    pub experience: i32,
    pub gold: i32,
    pub map_id: i32,
    pub pos_x: f32,
    pub pos_y: f32,
    pub facing: f32,
    pub health: i32,
    pub mana: i32,
    pub played_time: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRow {
    pub slot: i32,
    pub item_entry: i32,
    pub stack_count: i32,
    pub durability: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestRow {
    pub quest_id: i32,
    pub status: u8,
    pub progress: [i32; 4],
}

/// Everything a periodic or logout save writes, captured as plain data so
/// the save worker never touches live entities.
#[derive(Debug, Clone, Default)]
pub struct PlayerSnapshot {
    pub character: CharacterRecord,
    pub inventory: Vec<ItemRow>,
    pub bank: Vec<ItemRow>,
    pub equipment: Vec<ItemRow>,
    pub quests: Vec<QuestRow>,
    pub stat_bonuses: Vec<(u16, i32)>,
}

fn record_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<CharacterRecord> {
    Ok(CharacterRecord {
        guid: r.get(0)?,
        account_id: r.get(1)?,
        name: r.get(2)?,
        class_id: r.get::<_, i32>(3)? as u8,
        gender: r.get::<_, i32>(4)? as u8,
        portrait_id: r.get(5)?,
        level: r.get(6)?,
        experience: r.get(7)?,
        gold: r.get(8)?,
        map_id: r.get(9)?,
        pos_x: r.get::<_, f64>(10)? as f32,
        pos_y: r.get::<_, f64>(11)? as f32,
        facing: r.get::<_, f64>(12)? as f32,
        health: r.get(13)?,
        mana: r.get(14)?,
        played_time: r.get(15)?,
    })
}

const RECORD_COLUMNS: &str = "guid, account_id, name, class_id, gender, portrait_id, level, \
     experience, gold, map_id, pos_x, pos_y, facing, health, mana, played_time";

pub fn is_valid_name(name: &str) -> bool {
    let len = name.chars().count();
    (3..=12).contains(&len) && name.chars().all(|c| c.is_ascii_alphanumeric())
}

pub fn is_name_taken(db: &Database, name: &str) -> Result<bool> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare_cached("SELECT 1 FROM characters WHERE name = ?1 AND deleted = 0")?;
        Ok(stmt.query_row([name], |_| Ok(())).optional()?.is_some())
    })
}

pub fn count_by_account(db: &Database, account_id: i32) -> Result<i32> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare_cached(
            "SELECT COUNT(*) FROM characters WHERE account_id = ?1 AND deleted = 0",
        )?;
        stmt.query_row([account_id], |r| r.get(0))
    })
}

/// Create a new character row. Returns `None` when the name is invalid or
/// taken, or the account is at its character limit.
pub fn create_character(db: &Database, record: &CharacterRecord) -> Result<Option<i32>> {
    if !is_valid_name(&record.name) || is_name_taken(db, &record.name)? {
        return Ok(None);
    }
    if count_by_account(db, record.account_id)? >= MAX_CHARACTERS_PER_ACCOUNT as i32 {
        return Ok(None);
    }

    let guid = db.with_conn(|conn| {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO characters (account_id, name, class_id, gender, portrait_id, level, \
             experience, gold, map_id, pos_x, pos_y, facing, health, mana, played_time) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )?;
        stmt.execute(params![
            record.account_id,
            record.name,
            record.class_id as i32,
            record.gender as i32,
            record.portrait_id,
            record.level,
            record.experience,
            record.gold,
            record.map_id,
            record.pos_x as f64,
            record.pos_y as f64,
            record.facing as f64,
            record.health,
            record.mana,
            record.played_time,
        ])?;
        Ok(conn.last_insert_rowid() as i32)
    })?;

    Ok(Some(guid))
}

pub fn characters_by_account(db: &Database, account_id: i32) -> Result<Vec<CharacterRecord>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {RECORD_COLUMNS} FROM characters \
             WHERE account_id = ?1 AND deleted = 0 ORDER BY guid"
        ))?;
        let rows = stmt.query_map([account_id], |r| record_from_row(r))?;
        rows.collect()
    })
}

pub fn character_by_guid(db: &Database, guid: i32) -> Result<Option<CharacterRecord>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {RECORD_COLUMNS} FROM characters WHERE guid = ?1 AND deleted = 0"
        ))?;
        stmt.query_row([guid], |r| record_from_row(r)).optional()
    })
}

/// Soft delete; only the owning account may delete.
pub fn delete_character(db: &Database, guid: i32, account_id: i32) -> Result<bool> {
    let changed = db.with_conn(|conn| {
        let mut stmt = conn.prepare_cached(
            "UPDATE characters SET deleted = 1 WHERE guid = ?1 AND account_id = ?2",
        )?;
        stmt.execute(params![guid, account_id])
    })?;
    Ok(changed > 0)
}

fn replace_item_rows(
    tx: &Transaction,
    table: &str,
    guid: i32,
    rows: &[ItemRow],
    with_stack: bool,
) -> rusqlite::Result<()> {
    tx.execute(
        &format!("DELETE FROM {table} WHERE character_guid = ?1"),
        [guid],
    )?;
    for row in rows {
        if with_stack {
            tx.execute(
                &format!(
                    "INSERT INTO {table} (character_guid, slot, item_entry, stack_count, \
                     durability) VALUES (?1, ?2, ?3, ?4, ?5)"
                ),
                params![guid, row.slot, row.item_entry, row.stack_count, row.durability],
            )?;
        } else {
            tx.execute(
                &format!(
                    "INSERT INTO {table} (character_guid, slot, item_entry, durability) \
                     VALUES (?1, ?2, ?3, ?4)"
                ),
                params![guid, row.slot, row.item_entry, row.durability],
            )?;
        }
    }
    Ok(())
}

/// Write the whole snapshot in one transaction (invariant: all sub-stores
/// commit together or not at all).
pub fn save_snapshot(db: &Database, snapshot: &PlayerSnapshot) -> Result<()> {
    db.with_transaction(|tx| {
        let c = &snapshot.character;
        tx.execute(
            "UPDATE characters SET level = ?2, experience = ?3, gold = ?4, map_id = ?5, \
             pos_x = ?6, pos_y = ?7, facing = ?8, health = ?9, mana = ?10, played_time = ?11 \
             WHERE guid = ?1",
            params![
                c.guid,
                c.level,
                c.experience,
                c.gold,
                c.map_id,
                c.pos_x as f64,
                c.pos_y as f64,
                c.facing as f64,
                c.health,
                c.mana,
                c.played_time,
            ],
        )?;

        replace_item_rows(tx, "character_inventory", c.guid, &snapshot.inventory, true)?;
        replace_item_rows(tx, "character_bank", c.guid, &snapshot.bank, true)?;
        replace_item_rows(tx, "character_equipment", c.guid, &snapshot.equipment, false)?;

        tx.execute(
            "DELETE FROM character_quests WHERE character_guid = ?1",
            [c.guid],
        )?;
        for quest in &snapshot.quests {
            tx.execute(
                "INSERT INTO character_quests (character_guid, quest_id, status, progress0, \
                 progress1, progress2, progress3) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    c.guid,
                    quest.quest_id,
                    quest.status as i32,
                    quest.progress[0],
                    quest.progress[1],
                    quest.progress[2],
                    quest.progress[3],
                ],
            )?;
        }

        tx.execute(
            "DELETE FROM character_stat_bonuses WHERE character_guid = ?1",
            [c.guid],
        )?;
        for (stat, amount) in &snapshot.stat_bonuses {
            tx.execute(
                "INSERT INTO character_stat_bonuses (character_guid, stat, amount) \
                 VALUES (?1, ?2, ?3)",
                params![c.guid, *stat as i32, *amount],
            )?;
        }

        Ok(())
    })
}

fn load_item_rows(conn: &Connection, table: &str, guid: i32) -> rusqlite::Result<Vec<ItemRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT slot, item_entry, stack_count, durability \
         FROM {table} WHERE character_guid = ?1 ORDER BY slot"
    ))?;
    let rows = stmt.query_map([guid], |r| {
        Ok(ItemRow {
            slot: r.get(0)?,
            item_entry: r.get(1)?,
            stack_count: r.get(2)?,
            durability: r.get(3)?,
        })
    })?;
    rows.collect()
}

/// Load everything below the character row.
pub fn load_subdata(
    db: &Database,
    guid: i32,
) -> Result<(Vec<ItemRow>, Vec<ItemRow>, Vec<ItemRow>, Vec<QuestRow>, Vec<(u16, i32)>)> {
    db.with_conn(|conn| {
        let inventory = load_item_rows(conn, "character_inventory", guid)?;
        let bank = load_item_rows(conn, "character_bank", guid)?;

        let mut stmt = conn.prepare_cached(
            "SELECT slot, item_entry, durability FROM character_equipment \
             WHERE character_guid = ?1 ORDER BY slot",
        )?;
        let equipment = stmt
            .query_map([guid], |r| {
                Ok(ItemRow {
                    slot: r.get(0)?,
                    item_entry: r.get(1)?,
                    stack_count: 1,
                    durability: r.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare_cached(
            "SELECT quest_id, status, progress0, progress1, progress2, progress3 \
             FROM character_quests WHERE character_guid = ?1",
        )?;
        let quests = stmt
            .query_map([guid], |r| {
                Ok(QuestRow {
                    quest_id: r.get(0)?,
                    status: r.get::<_, i32>(1)? as u8,
                    progress: [r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?],
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare_cached(
            "SELECT stat, amount FROM character_stat_bonuses WHERE character_guid = ?1",
        )?;
        let bonuses = stmt
            .query_map([guid], |r| Ok((r.get::<_, i32>(0)? as u16, r.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((inventory, bank, equipment, quests, bonuses))
    })
}
