//! Cadence template rows. `retry_dispositions` and `cadence_days` are
//! stored as JSON columns; the day map deserializes into a typed
//! `BTreeMap<u32, DayConfig>` so sparse day numbers stay ordered.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{Row, params};

use dialclaw_core::error::{DialClawError, Result};
use dialclaw_core::traits::TemplateStore;
use dialclaw_core::types::{CadenceTemplate, DayConfig};

use crate::{CadenceDb, db_err, parse_ts_req};

fn template_from_row(row: &Row<'_>) -> rusqlite::Result<CadenceTemplate> {
    let retry_raw: String = row.get(2)?;
    let days_raw: String = row.get(3)?;
    Ok(CadenceTemplate {
        id: row.get(0)?,
        name: row.get(1)?,
        retry_dispositions: serde_json::from_str(&retry_raw).unwrap_or_default(),
        days: parse_days(&days_raw),
        created_at: parse_ts_req(row.get(4)?),
    })
}

/// The stored map is keyed by stringified day numbers (JSON objects
/// can't have integer keys); non-numeric keys are dropped.
fn parse_days(raw: &str) -> BTreeMap<u32, DayConfig> {
    let string_keyed: BTreeMap<String, DayConfig> =
        serde_json::from_str(raw).unwrap_or_default();
    string_keyed
        .into_iter()
        .filter_map(|(k, v)| k.parse::<u32>().ok().map(|day| (day, v)))
        .collect()
}

fn days_to_json(days: &BTreeMap<u32, DayConfig>) -> String {
    let string_keyed: BTreeMap<String, &DayConfig> =
        days.iter().map(|(k, v)| (k.to_string(), v)).collect();
    serde_json::to_string(&string_keyed).unwrap_or_else(|_| "{}".into())
}

impl CadenceDb {
    /// Create a template; duplicate names are rejected.
    pub fn create_cadence_template(
        &self,
        name: &str,
        retry_dispositions: Vec<String>,
        days: BTreeMap<u32, DayConfig>,
    ) -> Result<CadenceTemplate> {
        if days.contains_key(&0) {
            return Err(DialClawError::Invalid(
                "cadence days are 1-based; day 0 is not allowed".into(),
            ));
        }
        if let Some(day) = days.iter().find(|(_, cfg)| cfg.attempts == 0) {
            return Err(DialClawError::Invalid(format!(
                "day {} has an attempt budget of 0",
                day.0
            )));
        }
        let template = CadenceTemplate::new(name, retry_dispositions, days);
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO cadence_templates
             (id, name, retry_dispositions, cadence_days, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                template.id,
                template.name,
                serde_json::to_string(&template.retry_dispositions)
                    .map_err(|e| db_err("serialize dispositions", e))?,
                days_to_json(&template.days),
                template.created_at.to_rfc3339()
            ],
        )
        .map_err(|e| db_err("create template", e))?;
        if inserted == 0 {
            return Err(DialClawError::Invalid(format!(
                "a cadence template named '{name}' already exists"
            )));
        }
        tracing::info!("📋 Cadence template created: '{}' ({})", template.name, template.id);
        Ok(template)
    }

    /// Replace a template's dispositions and day map. Does not touch
    /// progress already recorded against it.
    pub fn update_cadence_template(
        &self,
        id: &str,
        retry_dispositions: Vec<String>,
        days: BTreeMap<u32, DayConfig>,
    ) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE cadence_templates SET retry_dispositions = ?1, cadence_days = ?2
                 WHERE id = ?3",
                params![
                    serde_json::to_string(&retry_dispositions)
                        .map_err(|e| db_err("serialize dispositions", e))?,
                    days_to_json(&days),
                    id
                ],
            )
            .map_err(|e| db_err("update template", e))?;
        if changed == 0 {
            return Err(DialClawError::NotFound(format!("cadence template {id}")));
        }
        Ok(())
    }

    pub fn list_cadence_templates(&self) -> Result<Vec<CadenceTemplate>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, retry_dispositions, cadence_days, created_at
                 FROM cadence_templates ORDER BY created_at DESC",
            )
            .map_err(|e| db_err("prepare templates", e))?;
        let rows = stmt
            .query_map([], template_from_row)
            .map_err(|e| db_err("query templates", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("read templates", e))
    }

    pub fn delete_cadence_template(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute("DELETE FROM cadence_templates WHERE id = ?1", params![id])
            .map_err(|e| db_err("delete template", e))?;
        if changed == 0 {
            return Err(DialClawError::NotFound(format!("cadence template {id}")));
        }
        Ok(())
    }
}

impl TemplateStore for CadenceDb {
    fn template(&self, template_id: &str) -> Result<Option<CadenceTemplate>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, retry_dispositions, cadence_days, created_at
                 FROM cadence_templates WHERE id = ?1",
            )
            .map_err(|e| db_err("prepare template", e))?;
        let mut rows = stmt
            .query_map(params![template_id], template_from_row)
            .map_err(|e| db_err("query template", e))?;
        rows.next()
            .transpose()
            .map_err(|e| db_err("read template", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days(entries: &[(u32, u32, &[&str])]) -> BTreeMap<u32, DayConfig> {
        entries
            .iter()
            .map(|(day, attempts, windows)| {
                (
                    *day,
                    DayConfig {
                        attempts: *attempts,
                        time_windows: windows.iter().map(|w| w.to_string()).collect(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_round_trip_sparse_days() {
        let db = CadenceDb::open_in_memory().unwrap();
        let created = db
            .create_cadence_template(
                "standard",
                vec!["No Answer".into(), "Voicemail".into()],
                days(&[(1, 3, &["09:00-12:00", "13:00-17:00"]), (4, 1, &["09:00-17:00"])]),
            )
            .unwrap();
        let loaded = db.template(&created.id).unwrap().unwrap();
        assert_eq!(loaded.days.len(), 2);
        assert_eq!(loaded.last_day(), Some(4));
        assert_eq!(loaded.days[&1].attempts, 3);
        assert_eq!(loaded.retry_dispositions.len(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let db = CadenceDb::open_in_memory().unwrap();
        db.create_cadence_template("dup", vec![], days(&[(1, 1, &["09:00-17:00"])]))
            .unwrap();
        assert!(
            db.create_cadence_template("dup", vec![], days(&[(1, 1, &["09:00-17:00"])]))
                .is_err()
        );
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let db = CadenceDb::open_in_memory().unwrap();
        assert!(
            db.create_cadence_template("bad", vec![], days(&[(1, 0, &["09:00-17:00"])]))
                .is_err()
        );
    }

    #[test]
    fn test_update_and_delete() {
        let db = CadenceDb::open_in_memory().unwrap();
        let t = db
            .create_cadence_template("mut", vec![], days(&[(1, 1, &["09:00-17:00"])]))
            .unwrap();
        db.update_cadence_template(&t.id, vec!["Busy".into()], days(&[(2, 2, &["10:00-11:00"])]))
            .unwrap();
        let loaded = db.template(&t.id).unwrap().unwrap();
        assert_eq!(loaded.retry_dispositions, vec!["Busy".to_string()]);
        assert_eq!(loaded.last_day(), Some(2));

        db.delete_cadence_template(&t.id).unwrap();
        assert!(db.template(&t.id).unwrap().is_none());
        assert!(db.delete_cadence_template(&t.id).is_err());
    }
}
