// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// A JSON-document store over SQLite: every table carries a `json` blob column holding
// the serialized document, plus a handful of extracted columns used for indexed
// queries (§4.2). Writes that must land together — state transitions paired with rule
// `last_triggered` clears during preemption (§4.6 step 7) — run inside one
// `rusqlite::Transaction` so a crash between them can never leave torn state.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use helion_types::audit::AuditEntry;
use helion_types::cache::CacheDoc;
use helion_types::config::Config;
use helion_types::metrics::ApiCallCounter;
use helion_types::rule::Rule;
use helion_types::state::{AutomationState, QuickControlOverride};
use helion_types::tenant::TenantId;

use crate::error::{StoreError, StoreResult};

#[derive(Debug)]
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &str) -> StoreResult<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS configs (
                tenant_id          TEXT PRIMARY KEY,
                automation_enabled INTEGER NOT NULL,
                json               TEXT NOT NULL,
                updated_at         TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS rules (
                tenant_id  TEXT NOT NULL,
                rule_id    TEXT NOT NULL,
                json       TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, rule_id)
            );

            CREATE TABLE IF NOT EXISTS states (
                tenant_id  TEXT PRIMARY KEY,
                json       TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS quick_control (
                tenant_id  TEXT PRIMARY KEY,
                json       TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id    TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                json         TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_tenant_time
                ON audit_log(tenant_id, completed_at DESC);

            CREATE TABLE IF NOT EXISTS cache_docs (
                scope      TEXT NOT NULL,
                key        TEXT NOT NULL,
                json       TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                PRIMARY KEY (scope, key)
            );

            CREATE TABLE IF NOT EXISTS api_call_counters (
                tenant_id TEXT NOT NULL,
                call_date TEXT NOT NULL,
                provider  TEXT NOT NULL,
                count     INTEGER NOT NULL,
                PRIMARY KEY (tenant_id, call_date, provider)
            );",
        )?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(":memory:")
    }

    // ---- Config (§3 "Config", §6) ----

    pub fn get_config(&self, tenant: &TenantId) -> StoreResult<Option<Config>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let json: Option<String> = conn
            .query_row("SELECT json FROM configs WHERE tenant_id = ?1", params![tenant.as_str()], |row| row.get(0))
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    pub fn put_config(&self, config: &Config) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let json = serde_json::to_string(config)?;
        conn.execute(
            "INSERT INTO configs (tenant_id, automation_enabled, json, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(tenant_id) DO UPDATE SET
                automation_enabled = ?2, json = ?3, updated_at = ?4",
            params![config.uid.as_str(), config.automation_enabled, json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Tenants with `automationEnabled = true`, used by the scheduler driver to decide
    /// which tenants get a per-tick dispatch (§4.1).
    pub fn list_tenants_with_automation_enabled(&self) -> StoreResult<Vec<TenantId>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare("SELECT tenant_id FROM configs WHERE automation_enabled = 1")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(TenantId::new)
            .collect();
        Ok(ids)
    }

    // ---- Rules (§3 "Rule", §6) ----

    pub fn list_rules(&self, tenant: &TenantId) -> StoreResult<Vec<Rule>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare("SELECT json FROM rules WHERE tenant_id = ?1 ORDER BY rule_id")?;
        let rules = stmt
            .query_map(params![tenant.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|j| serde_json::from_str(&j))
            .collect::<Result<Vec<Rule>, _>>()?;
        Ok(rules)
    }

    pub fn get_rule(&self, tenant: &TenantId, rule_id: &str) -> StoreResult<Option<Rule>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let json: Option<String> = conn
            .query_row(
                "SELECT json FROM rules WHERE tenant_id = ?1 AND rule_id = ?2",
                params![tenant.as_str(), rule_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    pub fn put_rule(&self, rule: &Rule) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let json = serde_json::to_string(rule)?;
        conn.execute(
            "INSERT INTO rules (tenant_id, rule_id, json, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(tenant_id, rule_id) DO UPDATE SET json = ?3, updated_at = ?4",
            params![rule.uid.as_str(), rule.rule_id, json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn delete_rule(&self, tenant: &TenantId, rule_id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "DELETE FROM rules WHERE tenant_id = ?1 AND rule_id = ?2",
            params![tenant.as_str(), rule_id],
        )?;
        Ok(())
    }

    // ---- Automation state (§3 "AutomationState", §4.6) ----

    pub fn get_state(&self, tenant: &TenantId) -> StoreResult<AutomationState> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let json: Option<String> = conn
            .query_row("SELECT json FROM states WHERE tenant_id = ?1", params![tenant.as_str()], |row| row.get(0))
            .optional()?;
        match json {
            Some(j) => Ok(serde_json::from_str(&j)?),
            None => Ok(AutomationState::idle(tenant.clone())),
        }
    }

    /// Merge-write: `patch` receives the current (or freshly idle) state and mutates it
    /// in place; the result is written back and returned. Fields the patch doesn't touch
    /// are preserved, matching the store's merge-semantics write guarantee (§4.2).
    pub fn merge_state<F>(&self, tenant: &TenantId, patch: F) -> StoreResult<AutomationState>
    where
        F: FnOnce(&mut AutomationState),
    {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut state = read_state(&conn, tenant)?;
        patch(&mut state);
        write_state(&conn, &state)?;
        Ok(state)
    }

    /// Atomic multi-document commit for the preemption transition (§4.2, §4.6 step 7):
    /// write the new state plus clear/stamp the `last_triggered` of whichever rules the
    /// caller names, all inside one transaction.
    pub fn commit_preemption(
        &self,
        state: &AutomationState,
        rule_triggered_updates: &[(String, Option<chrono::DateTime<Utc>>)],
    ) -> StoreResult<()> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction()?;

        let json = serde_json::to_string(state)?;
        tx.execute(
            "INSERT INTO states (tenant_id, json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_id) DO UPDATE SET json = ?2, updated_at = ?3",
            params![state.uid.as_str(), json, Utc::now().to_rfc3339()],
        )?;

        for (rule_id, last_triggered) in rule_triggered_updates {
            let existing: Option<String> = tx
                .query_row(
                    "SELECT json FROM rules WHERE tenant_id = ?1 AND rule_id = ?2",
                    params![state.uid.as_str(), rule_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(existing) = existing else {
                return Err(StoreError::NotFound { kind: "rule", id: rule_id.clone() });
            };
            let mut rule: Rule = serde_json::from_str(&existing)?;
            rule.last_triggered = *last_triggered;
            let updated = serde_json::to_string(&rule)?;
            tx.execute(
                "UPDATE rules SET json = ?1, updated_at = ?2 WHERE tenant_id = ?3 AND rule_id = ?4",
                params![updated, Utc::now().to_rfc3339(), state.uid.as_str(), rule_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    // ---- Quick-control override (§4.9) ----

    pub fn get_quick_control(&self, tenant: &TenantId) -> StoreResult<Option<QuickControlOverride>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let json: Option<String> = conn
            .query_row("SELECT json FROM quick_control WHERE tenant_id = ?1", params![tenant.as_str()], |row| row.get(0))
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    pub fn put_quick_control(&self, override_doc: &QuickControlOverride) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let json = serde_json::to_string(override_doc)?;
        conn.execute(
            "INSERT INTO quick_control (tenant_id, json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_id) DO UPDATE SET json = ?2, updated_at = ?3",
            params![override_doc.uid.as_str(), json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ---- Audit (§4.8, append-only) ----

    pub fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let json = serde_json::to_string(entry)?;
        conn.execute(
            "INSERT INTO audit_log (tenant_id, completed_at, json) VALUES (?1, ?2, ?3)",
            params![entry.uid.as_str(), entry.completed_at.to_rfc3339(), json],
        )?;
        Ok(())
    }

    pub fn list_audit(&self, tenant: &TenantId, limit: u32) -> StoreResult<Vec<AuditEntry>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT json FROM audit_log WHERE tenant_id = ?1 ORDER BY completed_at DESC LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![tenant.as_str(), limit], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|j| serde_json::from_str(&j))
            .collect::<Result<Vec<AuditEntry>, _>>()?;
        Ok(entries)
    }

    // ---- Cache (§4.4) ----

    pub fn cache_get<T: DeserializeOwned>(&self, scope: &str, key: &str) -> StoreResult<Option<CacheDoc<T>>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let json: Option<String> = conn
            .query_row("SELECT json FROM cache_docs WHERE scope = ?1 AND key = ?2", params![scope, key], |row| row.get(0))
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    pub fn cache_put<T: Serialize>(&self, scope: &str, key: &str, doc: &CacheDoc<T>) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let json = serde_json::to_string(doc)?;
        conn.execute(
            "INSERT INTO cache_docs (scope, key, json, expires_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(scope, key) DO UPDATE SET json = ?3, expires_at = ?4",
            params![scope, key, json, doc.expires_at],
        )?;
        Ok(())
    }

    pub fn cache_delete(&self, scope: &str, key: &str) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute("DELETE FROM cache_docs WHERE scope = ?1 AND key = ?2", params![scope, key])?;
        Ok(())
    }

    /// Reclaim cache documents past their `expires_at` hint. Purely a disk-space
    /// optimization: the cache layer never depends on this running for correctness
    /// (§4.4).
    pub fn cache_evict_expired(&self, now_unix_s: i64) -> StoreResult<u64> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let deleted = conn.execute("DELETE FROM cache_docs WHERE expires_at < ?1", params![now_unix_s])?;
        Ok(deleted as u64)
    }

    // ---- Metrics (§6 "GET /api/metrics/api-calls", §8 property 1) ----

    /// Record one real external-API call (never a cache hit) against the tenant's daily
    /// counter for `provider`, keyed by `call_date`'s UTC calendar day.
    pub fn record_api_call(&self, tenant: &TenantId, provider: &str, call_date: chrono::NaiveDate) -> StoreResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO api_call_counters (tenant_id, call_date, provider, count) VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(tenant_id, call_date, provider) DO UPDATE SET count = count + 1",
            params![tenant.as_str(), call_date.to_string(), provider],
        )?;
        Ok(())
    }

    /// Every counter row for this tenant, unsorted and unfiltered by date — the HTTP
    /// surface narrows to the requested `days` window and sorts in-process, rather than
    /// this store needing a compound `(tenant_id, call_date)` index (§6 scope note).
    pub fn api_call_counters(&self, tenant: &TenantId) -> StoreResult<Vec<ApiCallCounter>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare("SELECT call_date, provider, count FROM api_call_counters WHERE tenant_id = ?1")?;
        let rows = stmt
            .query_map(params![tenant.as_str()], |row| {
                Ok(ApiCallCounter { date: row.get(0)?, provider: row.get(1)?, count: row.get::<_, i64>(2)? as u32 })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn read_state(conn: &Connection, tenant: &TenantId) -> StoreResult<AutomationState> {
    let json: Option<String> = conn
        .query_row("SELECT json FROM states WHERE tenant_id = ?1", params![tenant.as_str()], |row| row.get(0))
        .optional()?;
    match json {
        Some(j) => Ok(serde_json::from_str(&j)?),
        None => Ok(AutomationState::idle(tenant.clone())),
    }
}

fn write_state(conn: &Connection, state: &AutomationState) -> StoreResult<()> {
    let json = serde_json::to_string(state)?;
    conn.execute(
        "INSERT INTO states (tenant_id, json, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(tenant_id) DO UPDATE SET json = ?2, updated_at = ?3",
        params![state.uid.as_str(), json, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}
