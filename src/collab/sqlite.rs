//! SQLite-backed baseline store.
//!
//! Records are stored as JSON rows keyed by deployment id. A single
//! connection behind a mutex is enough here: every write already happens
//! under the manager lock, so the store never sees concurrent writers.

use std::path::Path;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use super::BaselineStore;
use crate::types::record::NetworkBaseline;

pub struct SqliteBaselineStore {
    conn: Mutex<Connection>,
}

impl SqliteBaselineStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("opening baseline database at {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory baseline database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS network_baselines (
                deployment_id TEXT PRIMARY KEY,
                cluster_id TEXT NOT NULL,
                namespace TEXT NOT NULL,
                data TEXT NOT NULL
            )",
            [],
        )
        .context("creating network_baselines table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl BaselineStore for SqliteBaselineStore {
    fn get(&self, deployment_id: &str) -> Result<Option<NetworkBaseline>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT data FROM network_baselines WHERE deployment_id = ?1")?;
        let mut rows = stmt.query(params![deployment_id])?;
        match rows.next()? {
            Some(row) => {
                let data: String = row.get(0)?;
                let baseline = serde_json::from_str(&data)
                    .with_context(|| format!("corrupt baseline row for {}", deployment_id))?;
                Ok(Some(baseline))
            }
            None => Ok(None),
        }
    }

    fn upsert_many(&self, baselines: &[NetworkBaseline]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for baseline in baselines {
            let data = serde_json::to_string(baseline)?;
            tx.execute(
                "INSERT OR REPLACE INTO network_baselines
                 (deployment_id, cluster_id, namespace, data)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    baseline.deployment_id,
                    baseline.cluster_id,
                    baseline.namespace,
                    data
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, deployment_id: &str) -> Result<()> {
        self.conn.lock().execute(
            "DELETE FROM network_baselines WHERE deployment_id = ?1",
            params![deployment_id],
        )?;
        Ok(())
    }

    fn delete_many(&self, deployment_ids: &[String]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for id in deployment_ids {
            tx.execute(
                "DELETE FROM network_baselines WHERE deployment_id = ?1",
                params![id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn walk(&self, f: &mut dyn FnMut(NetworkBaseline) -> Result<()>) -> Result<()> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT data FROM network_baselines")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let data: String = row.get(0)?;
            let baseline: NetworkBaseline =
                serde_json::from_str(&data).context("corrupt baseline row")?;
            f(baseline)?;
        }
        Ok(())
    }
}
