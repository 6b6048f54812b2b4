//! Named cache partitions.
//!
//! A partition is an independently-lifecycled key -> response store. Entries
//! are addressed by request identity and hold immutable response snapshots.
//! Partitions are created on first write, so a handle stays usable after its
//! partition has been deleted out from under it.

use super::connection::CacheDb;
use super::hash::request_key;
use crate::http::{CachedResponse, Request};
use crate::Error;
use tokio_rusqlite::{params, rusqlite};

/// Handle to one named partition.
#[derive(Clone, Debug)]
pub struct Partition {
    db: CacheDb,
    name: String,
}

/// Owned row data moved into the connection thread.
struct EntryRow {
    key: String,
    method: String,
    url: String,
    status: u16,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryRow {
    fn new(request: &Request, response: &CachedResponse) -> Result<Self, Error> {
        if !request.is_get() {
            return Err(Error::InvalidInput(format!("only GET responses are cacheable, got {}", request.method)));
        }
        let url = request.url.as_str().to_string();
        Ok(Self {
            key: request_key(&request.method, &url),
            method: request.method.to_ascii_uppercase(),
            url,
            status: response.status,
            headers_json: serde_json::to_string(&response.headers)?,
            body: response.body.to_vec(),
        })
    }
}

fn ensure_partition(conn: &rusqlite::Connection, name: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
        params![name, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn write_entry(conn: &rusqlite::Connection, partition: &str, row: &EntryRow) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO entries (partition, key, method, url, status, headers_json, body, stored_at, seq)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                 COALESCE((SELECT MAX(seq) FROM entries WHERE partition = ?1), 0) + 1)
         ON CONFLICT(partition, key) DO UPDATE SET
             status = excluded.status,
             headers_json = excluded.headers_json,
             body = excluded.body,
             stored_at = excluded.stored_at,
             seq = excluded.seq",
        params![
            partition,
            &row.key,
            &row.method,
            &row.url,
            row.status,
            &row.headers_json,
            &row.body,
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

impl CacheDb {
    /// Get a handle to the named partition without touching the database.
    ///
    /// The partition row is created on the first write through the handle.
    pub fn partition(&self, name: &str) -> Partition {
        Partition { db: self.clone(), name: name.to_string() }
    }

    /// Get a handle to the named partition, creating it if needed.
    pub async fn open_partition(&self, name: &str) -> Result<Partition, Error> {
        let owned = name.to_string();
        self.conn
            .call(move |conn| ensure_partition(conn, &owned))
            .await
            .map_err(Error::from)?;
        Ok(self.partition(name))
    }

    /// Names of all existing partitions, oldest first.
    pub async fn partition_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Whether a partition with this name exists.
    pub async fn has_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM partitions WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a partition and every entry in it.
    ///
    /// Returns false if no partition had that name.
    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}

impl Partition {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up the stored response for a request.
    ///
    /// Non-GET requests never match.
    pub async fn match_request(&self, request: &Request) -> Result<Option<CachedResponse>, Error> {
        if !request.is_get() {
            return Ok(None);
        }
        let partition = self.name.clone();
        let key = request_key(&request.method, request.url.as_str());
        self.db
            .conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let result = conn.query_row(
                    "SELECT status, headers_json, body FROM entries WHERE partition = ?1 AND key = ?2",
                    params![partition, key],
                    |row| Ok((row.get::<_, u16>(0)?, row.get::<_, String>(1)?, row.get::<_, Vec<u8>>(2)?)),
                );

                match result {
                    Ok((status, headers_json, body)) => {
                        let headers = serde_json::from_str(&headers_json)?;
                        Ok(Some(CachedResponse::new(status, headers, body)))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Store a response snapshot, replacing any previous entry for the
    /// same request.
    pub async fn put(&self, request: &Request, response: &CachedResponse) -> Result<(), Error> {
        let row = EntryRow::new(request, response)?;
        let partition = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                ensure_partition(conn, &partition)?;
                write_entry(conn, &partition, &row)
            })
            .await
            .map_err(Error::from)
    }

    /// Store several snapshots in one transaction: either all are written
    /// or none are.
    pub async fn put_all(&self, entries: &[(Request, CachedResponse)]) -> Result<(), Error> {
        let rows = entries
            .iter()
            .map(|(request, response)| EntryRow::new(request, response))
            .collect::<Result<Vec<_>, _>>()?;
        let partition = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_partition(&tx, &partition)?;
                for row in &rows {
                    write_entry(&tx, &partition, row)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove the entry for a request. Returns false if there was none.
    pub async fn delete(&self, request: &Request) -> Result<bool, Error> {
        let partition = self.name.clone();
        let key = request_key(&request.method, request.url.as_str());
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted =
                    conn.execute("DELETE FROM entries WHERE partition = ?1 AND key = ?2", params![partition, key])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// URLs of all entries in store order, oldest first.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let partition = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM entries WHERE partition = ?1 ORDER BY seq ASC")?;
                let urls = stmt
                    .query_map(params![partition], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in the partition.
    pub async fn len(&self) -> Result<usize, Error> {
        let partition = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<usize, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE partition = ?1", params![partition], |row| {
                        row.get(0)
                    })?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete the oldest entries until at most `max_entries` remain.
    ///
    /// Returns the number of deleted entries.
    pub async fn trim(&self, max_entries: usize) -> Result<u64, Error> {
        let partition = self.name.clone();
        let max = max_entries as i64;
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE partition = ?1", params![partition], |row| {
                        row.get(0)
                    })?;
                if count <= max {
                    return Ok(0);
                }

                let deleted = conn.execute(
                    "DELETE FROM entries WHERE partition = ?1 AND key IN (
                        SELECT key FROM entries WHERE partition = ?1 ORDER BY seq ASC LIMIT ?2
                    )",
                    params![partition, count - max],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}
