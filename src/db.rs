use crate::auth;
use crate::config::Config;
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "classtrack.sqlite3";

const DEFAULT_SUBJECTS: [&str; 12] = [
    "Software Engineering",
    "Mobile Applications",
    "Data Structure",
    "Mathematics",
    "Information Security",
    "Frontend Development",
    "Basic Indian Language",
    "Information Security lab",
    "Frontend Development lab",
    "Mobile Applications lab",
    "Data Structure lab",
    "Integral Yoga",
];

const DEMO_STUDENTS: [(&str, &str, &str); 8] = [
    ("24820001", "Aravindh", "devaravindh-ml-exercism"),
    ("24820002", "Aswin", "aswinas04-exercism"),
    ("24820003", "Bavana", "bhavana2912-exercism"),
    ("24820004", "Gokul", "gokulramesh502-exercism"),
    ("24820005", "Hariharan", "hariharan-exercism"),
    ("24820006", "Meenatchi", "meenatchi-exercism"),
    ("24820007", "Siva Bharathi", "Sivabharathi-Ramesh-exercism"),
    ("24820008", "Visal Stephen Raj", "Visalstephenraj-exercism"),
];

pub fn open_db(workspace: &Path, cfg: &Config) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    seed_defaults(&conn, cfg)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('admin', 'teacher', 'student'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            roll_no TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            profile_handle TEXT,
            user_id INTEGER REFERENCES users(id) ON DELETE SET NULL
        )",
        [],
    )?;
    // Older workspaces may predate the profile handle and the account link.
    ensure_students_link_columns(conn)?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_students_user ON students(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS homework(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            posted_date TEXT NOT NULL,
            due_date TEXT NOT NULL,
            FOREIGN KEY(subject_id) REFERENCES subjects(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_homework_subject ON homework(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS homework_submissions(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            homework_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'Pending'
                CHECK(status IN ('Pending', 'Submitted', 'Graded')),
            grade INTEGER,
            FOREIGN KEY(homework_id) REFERENCES homework(id) ON DELETE CASCADE,
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE,
            UNIQUE(homework_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submissions_student ON homework_submissions(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS doubts(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            homework_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            question TEXT NOT NULL,
            answer TEXT,
            asked_at TEXT NOT NULL,
            FOREIGN KEY(homework_id) REFERENCES homework(id) ON DELETE CASCADE,
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_doubts_homework ON doubts(homework_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_doubts_student ON doubts(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            subject_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            status TEXT NOT NULL
                CHECK(status IN ('Present', 'Absent Informed', 'Absent Uninformed')),
            UNIQUE(date, subject_id, student_id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id) ON DELETE CASCADE,
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_subject ON attendance(subject_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            token_hash TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        )",
        [],
    )?;

    Ok(())
}

fn ensure_students_link_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "students", "profile_handle")? {
        conn.execute("ALTER TABLE students ADD COLUMN profile_handle TEXT", [])?;
    }
    if !table_has_column(conn, "students", "user_id")? {
        conn.execute(
            "ALTER TABLE students ADD COLUMN user_id INTEGER REFERENCES users(id) ON DELETE SET NULL",
            [],
        )?;
    }
    Ok(())
}

/// First-run data: an admin account, the default subjects and the demo roster.
/// Each group is only inserted while its table is empty.
pub fn seed_defaults(conn: &Connection, cfg: &Config) -> anyhow::Result<()> {
    if count_rows(conn, "users")? == 0 {
        let hash = auth::hash_password(&cfg.auth.bootstrap_admin_password)?;
        conn.execute(
            "INSERT INTO users(username, password_hash, role) VALUES('admin', ?, 'admin')",
            [&hash],
        )?;
        tracing::info!("created bootstrap admin account");
    }

    if cfg.seed.subjects && count_rows(conn, "subjects")? == 0 {
        let mut stmt = conn.prepare("INSERT INTO subjects(name) VALUES(?)")?;
        for name in DEFAULT_SUBJECTS {
            stmt.execute([name])?;
        }
        tracing::info!(count = DEFAULT_SUBJECTS.len(), "seeded subjects");
    }

    if cfg.seed.demo_students && count_rows(conn, "students")? == 0 {
        let mut stmt =
            conn.prepare("INSERT INTO students(roll_no, name, profile_handle) VALUES(?, ?, ?)")?;
        for (roll_no, name, handle) in DEMO_STUDENTS {
            stmt.execute((roll_no, name, handle))?;
        }
        tracing::info!(count = DEMO_STUDENTS.len(), "seeded demo students");
    }

    Ok(())
}

fn count_rows(conn: &Connection, table: &str) -> anyhow::Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    Ok(conn.query_row(&sql, [], |r| r.get(0))?)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent_and_seeds_once() {
        let conn = Connection::open_in_memory().expect("db");
        let cfg = Config::default();
        init_schema(&conn).expect("schema");
        seed_defaults(&conn, &cfg).expect("seed");
        init_schema(&conn).expect("schema again");
        seed_defaults(&conn, &cfg).expect("seed again");

        assert_eq!(count_rows(&conn, "users").expect("users"), 1);
        assert_eq!(count_rows(&conn, "subjects").expect("subjects"), 12);
        assert_eq!(count_rows(&conn, "students").expect("students"), 8);

        let hash: String = conn
            .query_row("SELECT password_hash FROM users WHERE username = 'admin'", [], |r| {
                r.get(0)
            })
            .expect("admin");
        assert!(auth::verify_password("admin", &hash));
    }

    #[test]
    fn legacy_students_table_gains_link_columns() {
        let conn = Connection::open_in_memory().expect("db");
        conn.execute(
            "CREATE TABLE students(id INTEGER PRIMARY KEY AUTOINCREMENT, roll_no TEXT NOT NULL UNIQUE, name TEXT NOT NULL)",
            [],
        )
        .expect("legacy table");
        init_schema(&conn).expect("schema");
        assert!(table_has_column(&conn, "students", "profile_handle").expect("col"));
        assert!(table_has_column(&conn, "students", "user_id").expect("col"));
    }

    #[test]
    fn deleting_user_detaches_student() {
        let conn = Connection::open_in_memory().expect("db");
        init_schema(&conn).expect("schema");
        conn.execute(
            "INSERT INTO users(username, password_hash, role) VALUES('s1', 'x', 'student')",
            [],
        )
        .expect("user");
        let uid = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO students(roll_no, name, user_id) VALUES('R1', 'Ann', ?)",
            [uid],
        )
        .expect("student");
        conn.execute("DELETE FROM users WHERE id = ?", [uid])
            .expect("delete");
        let linked: Option<i64> = conn
            .query_row("SELECT user_id FROM students WHERE roll_no = 'R1'", [], |r| {
                r.get(0)
            })
            .expect("student survives");
        assert_eq!(linked, None);
    }
}
