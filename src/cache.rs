use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use tracing::debug;

use crate::model::{EventMap, JobId, ScalarLog};

const CACHE_SCHEMA_VERSION: &str = "1";

/// Persistent, append-only store of parsed scalar logs, keyed by job id.
///
/// A `Live` cache holds an exclusive handle on the backing sqlite file;
/// opening a second live handle against the same path fails fast instead of
/// risking corruption. A `Detached` cache is a plain in-memory snapshot,
/// obtained by closing a live handle (e.g. to duplicate a manager), and can
/// be reattached to a file later.
#[derive(Debug)]
pub enum ScalarLogCache {
    Live(LiveHandle),
    Detached(Snapshot),
}

#[derive(Debug)]
pub struct LiveHandle {
    conn: Connection,
    path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    events: EventMap,
}

impl ScalarLogCache {
    /// Opens an exclusive file-backed handle, creating the store on first use.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(ScalarLogCache::Live(LiveHandle::open_exclusive(path)?))
    }

    /// An empty detached cache, never persisted.
    pub fn memory() -> Self {
        ScalarLogCache::Detached(Snapshot::default())
    }

    pub fn is_live(&self) -> bool {
        matches!(self, ScalarLogCache::Live(_))
    }

    pub fn get(&self, id: JobId) -> Result<Option<ScalarLog>> {
        match self {
            ScalarLogCache::Live(handle) => handle.get(id),
            ScalarLogCache::Detached(snapshot) => Ok(snapshot.events.get(&id).cloned()),
        }
    }

    /// Whether a non-empty log is cached for the job.
    pub fn contains_events(&self, id: JobId) -> Result<bool> {
        Ok(self.get(id)?.is_some_and(|log| !log.is_empty()))
    }

    /// Merges parsed logs into the store; durable once the call returns.
    pub fn put_many(&mut self, events: &EventMap) -> Result<()> {
        match self {
            ScalarLogCache::Live(handle) => handle.put_many(events),
            ScalarLogCache::Detached(snapshot) => {
                snapshot.events.extend(events.clone());
                Ok(())
            }
        }
    }

    pub fn all_events(&self) -> Result<EventMap> {
        match self {
            ScalarLogCache::Live(handle) => handle.all_events(),
            ScalarLogCache::Detached(snapshot) => Ok(snapshot.events.clone()),
        }
    }

    /// Materializes the contents into an in-memory snapshot and closes the
    /// file handle, releasing the single-writer lock. No-op when detached.
    pub fn detach(&mut self) -> Result<()> {
        if let ScalarLogCache::Live(handle) = self {
            let events = handle.all_events()?;
            debug!(path = %handle.path.display(), jobs = events.len(), "detaching cache");
            *self = ScalarLogCache::Detached(Snapshot { events });
        }
        Ok(())
    }

    /// Reattaches a detached cache to a file, merging the snapshot into the
    /// persisted contents. Fails on a cache that is already live.
    pub fn reopen(&mut self, path: &Path) -> Result<()> {
        match self {
            ScalarLogCache::Live(handle) => Err(anyhow!(
                "cache is already attached to {}",
                handle.path.display()
            )),
            ScalarLogCache::Detached(snapshot) => {
                let mut handle = LiveHandle::open_exclusive(path)?;
                handle.put_many(&snapshot.events)?;
                *self = ScalarLogCache::Live(handle);
                Ok(())
            }
        }
    }
}

impl LiveHandle {
    fn open_exclusive(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open cache at {}", path.display()))?;
        conn.busy_timeout(Duration::ZERO)
            .context("failed to disable busy timeout")?;
        conn.pragma_update(None, "locking_mode", "EXCLUSIVE")
            .context("failed to set locking_mode=EXCLUSIVE")?;

        // The schema write acquires the exclusive lock, which is then held
        // until the connection closes. A second opener fails here.
        conn.execute_batch(
            "
            BEGIN EXCLUSIVE;
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS events (
              job_id INTEGER PRIMARY KEY,
              payload TEXT NOT NULL
            );
            COMMIT;
            ",
        )
        .map_err(|err| {
            if is_busy(&err) {
                anyhow!(
                    "scalar log cache at {} is already open by another manager",
                    path.display()
                )
            } else {
                anyhow!(err).context(format!("failed to initialize cache at {}", path.display()))
            }
        })?;

        conn.execute(
            "INSERT INTO metadata(key, value) VALUES('cache_schema_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            [CACHE_SCHEMA_VERSION],
        )?;

        Ok(Self { conn, path: path.to_path_buf() })
    }

    fn get(&self, id: JobId) -> Result<Option<ScalarLog>> {
        let payload: Option<String> = self
            .conn
            .query_row("SELECT payload FROM events WHERE job_id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()
            .with_context(|| format!("failed to read cached events for job {id}"))?;

        payload
            .map(|raw| {
                serde_json::from_str(&raw)
                    .with_context(|| format!("corrupt cached payload for job {id}"))
            })
            .transpose()
    }

    fn put_many(&mut self, events: &EventMap) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut statement = tx.prepare(
                "INSERT INTO events(job_id, payload) VALUES(?1, ?2)
                 ON CONFLICT(job_id) DO UPDATE SET payload=excluded.payload",
            )?;
            for (id, log) in events {
                let payload = serde_json::to_string(log)
                    .with_context(|| format!("failed to serialize events for job {id}"))?;
                statement.execute(params![id, payload])?;
            }
        }
        tx.commit().context("failed to commit cache update")?;
        Ok(())
    }

    fn all_events(&self) -> Result<EventMap> {
        let mut statement = self.conn.prepare("SELECT job_id, payload FROM events")?;
        let rows = statement.query_map([], |row| {
            Ok((row.get::<_, JobId>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut events = EventMap::new();
        for row in rows {
            let (id, raw) = row?;
            let log: ScalarLog = serde_json::from_str(&raw)
                .with_context(|| format!("corrupt cached payload for job {id}"))?;
            events.insert(id, log);
        }
        Ok(events)
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::DatabaseBusy || failure.code == ErrorCode::DatabaseLocked
    )
}
