use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;

use crate::error::ResultsResult;
use crate::grades::SubjectScore;
use crate::model::{AdminRecord, StudentRecord};

pub const DB_FILE: &str = "results.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            enrollment_number TEXT NOT NULL UNIQUE,
            student_name TEXT NOT NULL,
            email TEXT,
            password TEXT NOT NULL,
            department TEXT NOT NULL,
            course TEXT NOT NULL DEFAULT '',
            semester TEXT NOT NULL DEFAULT '',
            subjects_json TEXT NOT NULL DEFAULT '[]',
            attendance_marks REAL NOT NULL DEFAULT 0,
            internship_marks REAL NOT NULL DEFAULT 0,
            project_marks REAL NOT NULL DEFAULT 0
        )",
        [],
    )?;
    ensure_students_updated_at(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_department ON students(department)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admins(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL,
            department TEXT NOT NULL
        )",
        [],
    )?;
    ensure_admins_otp_columns(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_admins_department ON admins(department)",
        [],
    )?;
    Ok(())
}

fn ensure_students_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn ensure_admins_otp_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "admins", "otp_digest")? {
        conn.execute("ALTER TABLE admins ADD COLUMN otp_digest TEXT", [])?;
    }
    if !table_has_column(conn, "admins", "otp_expires_at")? {
        conn.execute("ALTER TABLE admins ADD COLUMN otp_expires_at TEXT", [])?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Canonical student store.
pub trait StudentStore {
    fn find_by_enrollment(&self, enrollment_number: &str) -> ResultsResult<Option<StudentRecord>>;
    fn find_by_id(&self, id: &str) -> ResultsResult<Option<StudentRecord>>;
    fn upsert(&self, record: &StudentRecord) -> ResultsResult<()>;
    /// Returns whether a row was removed.
    fn delete(&self, id: &str) -> ResultsResult<bool>;
    fn list(&self, department: Option<&str>) -> ResultsResult<Vec<StudentRecord>>;
}

const STUDENT_COLUMNS: &str = "id, enrollment_number, student_name, email, password, department,
     course, semester, subjects_json, attendance_marks, internship_marks, project_marks, updated_at";

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<(StudentRecord, String)> {
    let subjects_json: String = row.get(8)?;
    Ok((
        StudentRecord {
            id: row.get(0)?,
            enrollment_number: row.get(1)?,
            student_name: row.get(2)?,
            email: row.get(3)?,
            password: row.get(4)?,
            department: row.get(5)?,
            course: row.get(6)?,
            semester: row.get(7)?,
            subjects: Vec::new(),
            attendance: row.get(9)?,
            internship: row.get(10)?,
            project: row.get(11)?,
            updated_at: row.get(12)?,
        },
        subjects_json,
    ))
}

fn decode_subjects(pair: (StudentRecord, String)) -> ResultsResult<StudentRecord> {
    let (mut record, subjects_json) = pair;
    record.subjects = serde_json::from_str::<Vec<SubjectScore>>(&subjects_json)?;
    Ok(record)
}

impl StudentStore for Connection {
    fn find_by_enrollment(&self, enrollment_number: &str) -> ResultsResult<Option<StudentRecord>> {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE enrollment_number = ?");
        self.query_row(&sql, [enrollment_number], student_from_row)
            .optional()?
            .map(decode_subjects)
            .transpose()
    }

    fn find_by_id(&self, id: &str) -> ResultsResult<Option<StudentRecord>> {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
        self.query_row(&sql, [id], student_from_row)
            .optional()?
            .map(decode_subjects)
            .transpose()
    }

    fn upsert(&self, record: &StudentRecord) -> ResultsResult<()> {
        let subjects_json = serde_json::to_string(&record.subjects)?;
        self.execute(
            "INSERT INTO students(
               id, enrollment_number, student_name, email, password, department,
               course, semester, subjects_json, attendance_marks, internship_marks,
               project_marks, updated_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               enrollment_number = excluded.enrollment_number,
               student_name = excluded.student_name,
               email = excluded.email,
               password = excluded.password,
               department = excluded.department,
               course = excluded.course,
               semester = excluded.semester,
               subjects_json = excluded.subjects_json,
               attendance_marks = excluded.attendance_marks,
               internship_marks = excluded.internship_marks,
               project_marks = excluded.project_marks,
               updated_at = excluded.updated_at",
            rusqlite::params![
                record.id,
                record.enrollment_number,
                record.student_name,
                record.email,
                record.password,
                record.department,
                record.course,
                record.semester,
                subjects_json,
                record.attendance,
                record.internship,
                record.project,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    fn delete(&self, id: &str) -> ResultsResult<bool> {
        let n = self.execute("DELETE FROM students WHERE id = ?", [id])?;
        Ok(n > 0)
    }

    fn list(&self, department: Option<&str>) -> ResultsResult<Vec<StudentRecord>> {
        let rows = match department {
            Some(dept) => {
                let sql = format!(
                    "SELECT {STUDENT_COLUMNS} FROM students WHERE department = ? ORDER BY rowid"
                );
                let mut stmt = self.prepare(&sql)?;
                let rows = stmt
                    .query_map([dept], student_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let sql = format!("SELECT {STUDENT_COLUMNS} FROM students ORDER BY rowid");
                let mut stmt = self.prepare(&sql)?;
                let rows = stmt
                    .query_map([], student_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        rows.into_iter().map(decode_subjects).collect()
    }
}

fn admin_from_row(row: &Row<'_>) -> rusqlite::Result<AdminRecord> {
    Ok(AdminRecord {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        department: row.get(3)?,
        otp_digest: row.get(4)?,
        otp_expires_at: row.get(5)?,
    })
}

const ADMIN_COLUMNS: &str = "id, email, password, department, otp_digest, otp_expires_at";

pub fn admin_by_email(conn: &Connection, email: &str) -> ResultsResult<Option<AdminRecord>> {
    let sql = format!("SELECT {ADMIN_COLUMNS} FROM admins WHERE email = ?");
    Ok(conn.query_row(&sql, [email], admin_from_row).optional()?)
}

/// First admin registered for a department, used for reply-to routing.
pub fn admin_by_department(
    conn: &Connection,
    department: &str,
) -> ResultsResult<Option<AdminRecord>> {
    let sql =
        format!("SELECT {ADMIN_COLUMNS} FROM admins WHERE department = ? ORDER BY rowid LIMIT 1");
    Ok(conn.query_row(&sql, [department], admin_from_row).optional()?)
}

pub fn admin_insert(conn: &Connection, admin: &AdminRecord) -> ResultsResult<()> {
    conn.execute(
        "INSERT INTO admins(id, email, password, department, otp_digest, otp_expires_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            admin.id,
            admin.email,
            admin.password,
            admin.department,
            admin.otp_digest,
            admin.otp_expires_at,
        ],
    )?;
    Ok(())
}

pub fn admin_set_otp(
    conn: &Connection,
    admin_id: &str,
    otp_digest: Option<&str>,
    otp_expires_at: Option<&str>,
) -> ResultsResult<()> {
    conn.execute(
        "UPDATE admins SET otp_digest = ?, otp_expires_at = ? WHERE id = ?",
        (otp_digest, otp_expires_at, admin_id),
    )?;
    Ok(())
}

pub fn admin_set_password(conn: &Connection, admin_id: &str, password: &str) -> ResultsResult<()> {
    conn.execute(
        "UPDATE admins SET password = ?, otp_digest = NULL, otp_expires_at = NULL WHERE id = ?",
        (password, admin_id),
    )?;
    Ok(())
}

#[cfg(test)]
pub fn open_memory() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    init_schema(&conn).expect("init schema");
    conn
}
