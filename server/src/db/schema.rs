//! Server-store schema bootstrap. Idempotent: safe to run at every startup.

pub const SERVER_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    username    TEXT    NOT NULL UNIQUE COLLATE NOCASE,
    password    TEXT    NOT NULL,
    gm_level    INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS characters (
    guid        INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id  INTEGER NOT NULL REFERENCES accounts(id),
    name        TEXT    NOT NULL UNIQUE COLLATE NOCASE,
    class_id    INTEGER NOT NULL,
    gender      INTEGER NOT NULL DEFAULT 0,
    portrait_id INTEGER NOT NULL DEFAULT 0,
    level       INTEGER NOT NULL DEFAULT 1,
    experience  INTEGER NOT NULL DEFAULT 0,
    gold        INTEGER NOT NULL DEFAULT 0,
    map_id      INTEGER NOT NULL DEFAULT 1,
    pos_x       REAL    NOT NULL DEFAULT 0,
    pos_y       REAL    NOT NULL DEFAULT 0,
    facing      REAL    NOT NULL DEFAULT 0,
    health      INTEGER NOT NULL DEFAULT 1,
    mana        INTEGER NOT NULL DEFAULT 0,
    played_time INTEGER NOT NULL DEFAULT 0,
    deleted     INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_characters_account ON characters(account_id);

CREATE TABLE IF NOT EXISTS character_inventory (
    character_guid INTEGER NOT NULL REFERENCES characters(guid),
    slot           INTEGER NOT NULL,
    item_entry     INTEGER NOT NULL,
    stack_count    INTEGER NOT NULL DEFAULT 1,
    durability     INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (character_guid, slot)
);

CREATE TABLE IF NOT EXISTS character_bank (
    character_guid INTEGER NOT NULL REFERENCES characters(guid),
    slot           INTEGER NOT NULL,
    item_entry     INTEGER NOT NULL,
    stack_count    INTEGER NOT NULL DEFAULT 1,
    durability     INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (character_guid, slot)
);

CREATE TABLE IF NOT EXISTS character_equipment (
    character_guid INTEGER NOT NULL REFERENCES characters(guid),
    slot           INTEGER NOT NULL,
    item_entry     INTEGER NOT NULL,
    durability     INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (character_guid, slot)
);

CREATE TABLE IF NOT EXISTS character_quests (
    character_guid INTEGER NOT NULL REFERENCES characters(guid),
    quest_id       INTEGER NOT NULL,
    status         INTEGER NOT NULL DEFAULT 1,
    progress0      INTEGER NOT NULL DEFAULT 0,
    progress1      INTEGER NOT NULL DEFAULT 0,
    progress2      INTEGER NOT NULL DEFAULT 0,
    progress3      INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (character_guid, quest_id)
);

CREATE TABLE IF NOT EXISTS character_stat_bonuses (
    character_guid INTEGER NOT NULL REFERENCES characters(guid),
    stat           INTEGER NOT NULL,
    amount         INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (character_guid, stat)
);

-- Development account; remove in production deployments.
INSERT OR IGNORE INTO accounts (username, password, gm_level)
    VALUES ('admin', 'admin', 1);
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::database::Database;

    #[test]
    fn bootstrap_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.execute_batch(SERVER_SCHEMA).unwrap();
        db.execute_batch(SERVER_SCHEMA).unwrap();

        let accounts: i64 = db
            .with_conn(|c| c.query_row("SELECT COUNT(*) FROM accounts", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(accounts, 1);
    }
}
