use crate::access::StudentScope;
use crate::import::{GroupRepository, NewStudent, StudentRepository};
use crate::phone::normalize_phone;
use anyhow::{bail, Context};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%SZ','now')";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: String,
    pub name: String,
    pub halaqah_id: String,
    pub halaqah_name: String,
    pub guardian_name: Option<String>,
    pub guardian_phone: Option<String>,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HalaqahRow {
    pub id: String,
    pub name: String,
    pub teacher_name: Option<String>,
    pub student_count: i64,
}

/// Workspace-backed repositories over one open connection.
pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SqliteStore { conn }
    }

    pub fn student(&self, student_id: &str) -> anyhow::Result<Option<StudentRow>> {
        let sql = format!("{} WHERE s.id = ?", STUDENT_SELECT);
        Ok(self
            .conn
            .query_row(&sql, [student_id], map_student)
            .optional()?)
    }

    pub fn list_students(
        &self,
        scope: &StudentScope,
        halaqah_id: Option<&str>,
        country_code: &str,
    ) -> anyhow::Result<Vec<StudentRow>> {
        let mut sql = format!("{} WHERE 1 = 1", STUDENT_SELECT);
        let mut binds: Vec<String> = Vec::new();
        if let StudentScope::Halaqah(ids) = scope {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            sql.push_str(&format!(
                " AND s.halaqah_id IN ({})",
                vec!["?"; ids.len()].join(", ")
            ));
            binds.extend(ids.iter().cloned());
        }
        if let Some(id) = halaqah_id {
            sql.push_str(" AND s.halaqah_id = ?");
            binds.push(id.to_string());
        }
        sql.push_str(" ORDER BY h.name, s.name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(binds.iter()), map_student)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(match scope {
            StudentScope::GuardianPhone(phone) => rows
                .into_iter()
                .filter(|s| {
                    let theirs = normalize_phone(s.guardian_phone.as_deref().unwrap_or(""), country_code);
                    !phone.is_empty() && theirs == *phone
                })
                .collect(),
            _ => rows,
        })
    }

    pub fn list_halaqah(&self) -> anyhow::Result<Vec<HalaqahRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT
               h.id,
               h.name,
               h.teacher_name,
               (SELECT COUNT(*) FROM students s WHERE s.halaqah_id = h.id) AS student_count
             FROM halaqah h
             ORDER BY h.name",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(HalaqahRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    teacher_name: r.get(2)?,
                    student_count: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn halaqah_by_id(&self, halaqah_id: &str) -> anyhow::Result<Option<HalaqahRow>> {
        Ok(self
            .list_halaqah()?
            .into_iter()
            .find(|h| h.id == halaqah_id))
    }

    pub fn create_halaqah(&self, name: &str, teacher_name: Option<&str>) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        let sql = format!(
            "INSERT INTO halaqah(id, name, teacher_name, created_at) VALUES(?, ?, ?, {})",
            NOW_SQL
        );
        self.conn
            .execute(&sql, (&id, name, teacher_name))
            .with_context(|| format!("failed to insert halaqah {}", name))?;
        Ok(id)
    }

    pub fn create_student(&self, halaqah_id: &str, student: &NewStudent) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        let sql = format!(
            "INSERT INTO students(id, halaqah_id, name, guardian_name, guardian_phone, active, created_at)
             VALUES(?, ?, ?, ?, ?, 1, {})",
            NOW_SQL
        );
        self.conn.execute(
            &sql,
            (
                &id,
                halaqah_id,
                &student.name,
                student.guardian_name.as_deref(),
                student.guardian_phone.as_deref(),
            ),
        )?;
        Ok(id)
    }

    /// Removes the student with its setoran and daily assessment rows.
    pub fn delete_student(&self, student_id: &str) -> anyhow::Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM setoran WHERE student_id = ?", [student_id])?;
        tx.execute(
            "DELETE FROM daily_assessments WHERE student_id = ?",
            [student_id],
        )?;
        let n = tx.execute("DELETE FROM students WHERE id = ?", [student_id])?;
        tx.commit()?;
        Ok(n > 0)
    }
}

const STUDENT_SELECT: &str = "SELECT
       s.id,
       s.name,
       s.halaqah_id,
       h.name,
       s.guardian_name,
       s.guardian_phone,
       s.active,
       s.created_at
     FROM students s
     JOIN halaqah h ON h.id = s.halaqah_id";

fn map_student(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: r.get(0)?,
        name: r.get(1)?,
        halaqah_id: r.get(2)?,
        halaqah_name: r.get(3)?,
        guardian_name: r.get(4)?,
        guardian_phone: r.get(5)?,
        active: r.get::<_, i64>(6)? != 0,
        created_at: r.get(7)?,
    })
}

impl GroupRepository for SqliteStore<'_> {
    fn list_group_names(&self) -> anyhow::Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM halaqah ORDER BY name")?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn insert_groups(&mut self, names: &[String]) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let sql = format!(
            "INSERT INTO halaqah(id, name, created_at) VALUES(?, ?, {})",
            NOW_SQL
        );
        for name in names {
            tx.execute(&sql, (Uuid::new_v4().to_string(), name))
                .with_context(|| format!("failed to insert halaqah {}", name))?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl StudentRepository for SqliteStore<'_> {
    fn list_guardian_phones(&self) -> anyhow::Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT guardian_phone FROM students WHERE guardian_phone IS NOT NULL")?;
        let phones = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(phones)
    }

    fn insert_students(&mut self, rows: &[NewStudent]) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let sql = format!(
            "INSERT INTO students(id, halaqah_id, name, guardian_name, guardian_phone, active, created_at)
             SELECT ?, h.id, ?, ?, ?, 1, {}
             FROM halaqah h
             WHERE h.name = ?",
            NOW_SQL
        );
        for row in rows {
            let n = tx.execute(
                &sql,
                (
                    Uuid::new_v4().to_string(),
                    &row.name,
                    row.guardian_name.as_deref(),
                    row.guardian_phone.as_deref(),
                    &row.group_name,
                ),
            )?;
            if n == 0 {
                // Dropping `tx` rolls back the rows already written in this chunk.
                bail!("halaqah not found: {}", row.group_name);
            }
        }
        tx.commit()?;
        Ok(())
    }
}
