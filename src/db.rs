use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::error::EngineResult;
use crate::model::{ExamCategory, ResultRecord, ResultStatus, Student, Subject};

pub const DB_FILE_NAME: &str = "results.sqlite3";

/// Rows per `IN (...)` lookup.
const LOOKUP_CHUNK: usize = 500;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            roll_number TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            branch TEXT NOT NULL,
            batch TEXT NOT NULL,
            regulation TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_branch_batch ON students(branch, batch)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            subject_code TEXT NOT NULL UNIQUE,
            subject_name TEXT NOT NULL,
            credits REAL NOT NULL DEFAULT 0,
            semester TEXT NOT NULL,
            branch TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS results(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            semester TEXT NOT NULL,
            academic_period TEXT NOT NULL,
            exam_category TEXT NOT NULL,
            attempt_no INTEGER NOT NULL,
            grade TEXT NOT NULL,
            grade_points INTEGER NOT NULL,
            credits_earned REAL NOT NULL,
            status TEXT NOT NULL,
            is_latest INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    ensure_results_created_at(conn)?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_results_natural_key
         ON results(student_id, subject_id, exam_category, academic_period)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_student ON results(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_latest_status ON results(is_latest, status)",
        [],
    )?;

    Ok(())
}

fn ensure_results_created_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "results", "created_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE results ADD COLUMN created_at TEXT", [])?;
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

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(", ")
}

fn conversion_err(idx: usize, what: &str, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unknown {}: {}", what, raw).into(),
    )
}

const STUDENT_COLUMNS: &str = "id, roll_number, name, branch, batch, regulation";
const SUBJECT_COLUMNS: &str = "id, subject_code, subject_name, credits, semester, branch";
const RESULT_COLUMNS: &str = "id, student_id, subject_id, semester, academic_period, exam_category,
     attempt_no, grade, grade_points, credits_earned, status, is_latest, created_at";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        roll_number: r.get(1)?,
        name: r.get(2)?,
        branch: r.get(3)?,
        batch: r.get(4)?,
        regulation: r.get(5)?,
    })
}

fn subject_from_row(r: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: r.get(0)?,
        subject_code: r.get(1)?,
        subject_name: r.get(2)?,
        credits: r.get(3)?,
        semester: r.get(4)?,
        branch: r.get(5)?,
    })
}

fn result_from_row(r: &Row<'_>) -> rusqlite::Result<ResultRecord> {
    let category: String = r.get(5)?;
    let status: String = r.get(10)?;
    Ok(ResultRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        subject_id: r.get(2)?,
        semester: r.get(3)?,
        academic_period: r.get(4)?,
        exam_category: ExamCategory::parse(&category)
            .ok_or_else(|| conversion_err(5, "exam category", &category))?,
        attempt_no: r.get(6)?,
        grade: r.get(7)?,
        grade_points: r.get(8)?,
        credits_earned: r.get(9)?,
        status: ResultStatus::parse(&status)
            .ok_or_else(|| conversion_err(10, "status", &status))?,
        is_latest: r.get::<_, i64>(11)? != 0,
        created_at: r.get(12)?,
    })
}

fn select_in<T>(
    conn: &Connection,
    sql_prefix: &str,
    keys: &[String],
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> EngineResult<Vec<T>> {
    let mut out = Vec::new();
    for chunk in keys.chunks(LOOKUP_CHUNK) {
        let sql = format!("{} ({})", sql_prefix, placeholders(chunk.len()));
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(chunk.iter()), map)?
            .collect::<Result<Vec<_>, _>>()?;
        out.extend(rows);
    }
    Ok(out)
}

// ---- students ----

pub fn students_by_rolls(conn: &Connection, rolls: &[String]) -> EngineResult<Vec<Student>> {
    select_in(
        conn,
        &format!(
            "SELECT {} FROM students WHERE roll_number IN",
            STUDENT_COLUMNS
        ),
        rolls,
        student_from_row,
    )
}

pub fn student_by_id(conn: &Connection, id: &str) -> EngineResult<Option<Student>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS),
            [id],
            student_from_row,
        )
        .optional()?)
}

pub fn student_by_roll(conn: &Connection, roll: &str) -> EngineResult<Option<Student>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM students WHERE roll_number = ?",
                STUDENT_COLUMNS
            ),
            [roll],
            student_from_row,
        )
        .optional()?)
}

pub fn all_students(conn: &Connection) -> EngineResult<Vec<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students ORDER BY roll_number",
        STUDENT_COLUMNS
    ))?;
    let rows = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_students(conn: &Connection) -> EngineResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?)
}

/// Insert a student unless the roll number is already taken. Returns whether
/// a row was written.
pub fn insert_student_ignore(conn: &Connection, s: &Student) -> EngineResult<bool> {
    let n = conn.execute(
        "INSERT INTO students(id, roll_number, name, branch, batch, regulation)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(roll_number) DO NOTHING",
        (
            &s.id,
            &s.roll_number,
            &s.name,
            &s.branch,
            &s.batch,
            &s.regulation,
        ),
    )?;
    Ok(n > 0)
}

pub fn update_student(conn: &Connection, s: &Student) -> EngineResult<()> {
    conn.execute(
        "UPDATE students SET name = ?, branch = ?, batch = ?, regulation = ? WHERE id = ?",
        (&s.name, &s.branch, &s.batch, &s.regulation, &s.id),
    )?;
    Ok(())
}

fn like_pattern(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 2);
    out.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// Case-insensitive substring search on roll number or name. `%` and `_` in
/// the query match literally.
pub fn search_students(
    conn: &Connection,
    query: Option<&str>,
    limit: i64,
    offset: i64,
) -> EngineResult<(Vec<Student>, i64)> {
    let pattern = like_pattern(&query.unwrap_or("").trim().to_ascii_lowercase());

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM students
         WHERE lower(roll_number) LIKE ?1 ESCAPE '\\' OR lower(name) LIKE ?1 ESCAPE '\\'",
        [&pattern],
        |r| r.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students
         WHERE lower(roll_number) LIKE ?1 ESCAPE '\\' OR lower(name) LIKE ?1 ESCAPE '\\'
         ORDER BY roll_number ASC
         LIMIT ?2 OFFSET ?3",
        STUDENT_COLUMNS
    ))?;
    let rows = stmt
        .query_map((&pattern, limit, offset), student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok((rows, total))
}

// ---- subjects ----

pub fn subjects_by_codes(conn: &Connection, codes: &[String]) -> EngineResult<Vec<Subject>> {
    select_in(
        conn,
        &format!(
            "SELECT {} FROM subjects WHERE subject_code IN",
            SUBJECT_COLUMNS
        ),
        codes,
        subject_from_row,
    )
}

pub fn all_subjects(conn: &Connection) -> EngineResult<Vec<Subject>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM subjects", SUBJECT_COLUMNS))?;
    let rows = stmt
        .query_map([], subject_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_subject_ignore(conn: &Connection, s: &Subject) -> EngineResult<bool> {
    let n = conn.execute(
        "INSERT INTO subjects(id, subject_code, subject_name, credits, semester, branch)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(subject_code) DO NOTHING",
        (
            &s.id,
            &s.subject_code,
            &s.subject_name,
            s.credits,
            &s.semester,
            &s.branch,
        ),
    )?;
    Ok(n > 0)
}

pub fn update_subject_name(conn: &Connection, id: &str, name: &str) -> EngineResult<()> {
    conn.execute(
        "UPDATE subjects SET subject_name = ? WHERE id = ?",
        (name, id),
    )?;
    Ok(())
}

pub fn update_subject_credits(conn: &Connection, id: &str, credits: f64) -> EngineResult<()> {
    conn.execute("UPDATE subjects SET credits = ? WHERE id = ?", (credits, id))?;
    Ok(())
}

// ---- results ----

pub fn results_for_students(
    conn: &Connection,
    student_ids: &[String],
) -> EngineResult<Vec<ResultRecord>> {
    select_in(
        conn,
        &format!("SELECT {} FROM results WHERE student_id IN", RESULT_COLUMNS),
        student_ids,
        result_from_row,
    )
}

pub fn all_results(conn: &Connection, latest_only: bool) -> EngineResult<Vec<ResultRecord>> {
    let sql = if latest_only {
        format!("SELECT {} FROM results WHERE is_latest = 1", RESULT_COLUMNS)
    } else {
        format!("SELECT {} FROM results", RESULT_COLUMNS)
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], result_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert one attempt; a natural-key collision is ignored. Returns whether a
/// row was written.
pub fn insert_result_ignore(conn: &Connection, r: &ResultRecord) -> EngineResult<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO results(
            id, student_id, subject_id, semester, academic_period, exam_category,
            attempt_no, grade, grade_points, credits_earned, status, is_latest, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            r.id,
            r.student_id,
            r.subject_id,
            r.semester,
            r.academic_period,
            r.exam_category.as_str(),
            r.attempt_no,
            r.grade,
            r.grade_points,
            r.credits_earned,
            r.status.as_str(),
            r.is_latest as i64,
            r.created_at,
        ],
    )?;
    Ok(n > 0)
}

pub fn demote_results(conn: &Connection, ids: &[String]) -> EngineResult<usize> {
    let mut changed = 0;
    for chunk in ids.chunks(LOOKUP_CHUNK) {
        let sql = format!(
            "UPDATE results SET is_latest = 0 WHERE id IN ({})",
            placeholders(chunk.len())
        );
        changed += conn.execute(&sql, params_from_iter(chunk.iter()))?;
    }
    Ok(changed)
}

pub fn update_result_grade(
    conn: &Connection,
    id: &str,
    grade: &str,
    grade_points: i64,
    credits_earned: f64,
    status: ResultStatus,
) -> EngineResult<()> {
    conn.execute(
        "UPDATE results
         SET grade = ?, grade_points = ?, credits_earned = ?, status = ?
         WHERE id = ?",
        (grade, grade_points, credits_earned, status.as_str(), id),
    )?;
    Ok(())
}
