//! Table rotation between the import, production, and backup slots.
//!
//! Every rotation is one SQLite transaction over `ALTER TABLE ... RENAME`,
//! so readers see either the old generation or the new one, never a mix.

use log::info;
use rusqlite::Connection;

use osmforge_core::mapping::Mapping;

use crate::store::table_present;
use crate::{DeployError, FeatureStore, Slot};

impl FeatureStore {
    /// Promote the import slot to production, keeping the previous
    /// production generation as backup. Fails with no side effects when
    /// any import table is missing.
    pub fn deploy(&mut self, mapping: &Mapping) -> Result<(), DeployError> {
        let tables = mapping.table_names();
        require_slot(&self.conn, Slot::Import, &tables)?;
        let tx = self.conn.transaction()?;
        for table in &tables {
            let production = Slot::Production.qualify(table);
            let backup = Slot::Backup.qualify(table);
            tx.execute_batch(&format!("DROP TABLE IF EXISTS \"{backup}\""))?;
            if table_present(&tx, &production)? {
                rename(&tx, &production, &backup)?;
            }
            rename(&tx, &Slot::Import.qualify(table), &production)?;
        }
        tx.commit()?;
        info!("deployed {} tables to production", tables.len());
        Ok(())
    }

    /// Swap the backup generation back into production, parking the
    /// current production tables in the import slot. Fails with no side
    /// effects when any backup table is missing.
    pub fn revert_deploy(&mut self, mapping: &Mapping) -> Result<(), DeployError> {
        let tables = mapping.table_names();
        require_slot(&self.conn, Slot::Backup, &tables)?;
        let tx = self.conn.transaction()?;
        for table in &tables {
            let production = Slot::Production.qualify(table);
            let import = Slot::Import.qualify(table);
            if table_present(&tx, &production)? {
                tx.execute_batch(&format!("DROP TABLE IF EXISTS \"{import}\""))?;
                rename(&tx, &production, &import)?;
            }
            rename(&tx, &Slot::Backup.qualify(table), &production)?;
        }
        tx.commit()?;
        info!("reverted production to the backup generation");
        Ok(())
    }

    /// Drop whatever backup tables exist. Dropping an absent backup is
    /// not an error.
    pub fn remove_backup(&mut self, mapping: &Mapping) -> Result<(), DeployError> {
        let tx = self.conn.transaction()?;
        for table in mapping.table_names() {
            let backup = Slot::Backup.qualify(&table);
            tx.execute_batch(&format!("DROP TABLE IF EXISTS \"{backup}\""))?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn require_slot(conn: &Connection, slot: Slot, tables: &[String]) -> Result<(), DeployError> {
    for table in tables {
        if !table_present(conn, &slot.qualify(table))? {
            return Err(DeployError::MissingSlot {
                slot,
                table: table.clone(),
            });
        }
    }
    Ok(())
}

// ALTER TABLE RENAME keeps the table's indexes under their old names, so
// the index follows the rename explicitly; otherwise the next import-slot
// creation collides with a stale "import_*_osm_id_idx" on production.
fn rename(conn: &Connection, from: &str, to: &str) -> Result<(), rusqlite::Error> {
    conn.execute_batch(&format!(
        "ALTER TABLE \"{from}\" RENAME TO \"{to}\";\n\
         DROP INDEX IF EXISTS \"{from}_osm_id_idx\";\n\
         CREATE INDEX IF NOT EXISTS \"{to}_osm_id_idx\" ON \"{to}\" (osm_id);"
    ))
}
