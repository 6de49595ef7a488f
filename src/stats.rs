use crate::config::Thresholds;
use crate::dates::Period;
use chrono::NaiveDate;
use rusqlite::{params_from_iter, types::Value, Connection};
use serde::Serialize;
use std::cmp::Ordering;

pub const PRESENT: &str = "Present";
pub const ABSENT_INFORMED: &str = "Absent Informed";
pub const ABSENT_UNINFORMED: &str = "Absent Uninformed";

/// 1-decimal half-up rounding: `floor(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// `part / total * 100` rounded; 0 when nothing was counted.
pub fn percentage(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round_off_1_decimal(100.0 * part as f64 / total as f64)
}

pub fn is_answered(answer: Option<&str>) -> bool {
    answer.map(|a| !a.is_empty()).unwrap_or(false)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total: i64,
    pub present: i64,
    pub absent_informed: i64,
    pub absent_uninformed: i64,
    pub percentage: f64,
}

pub fn attendance_summary(
    conn: &Connection,
    student_id: i64,
    subject_id: Option<i64>,
    period: &Period,
) -> rusqlite::Result<AttendanceSummary> {
    let mut conditions = vec!["student_id = ?".to_string()];
    let mut params: Vec<Value> = vec![Value::Integer(student_id)];
    if let Some(sid) = subject_id {
        conditions.push("subject_id = ?".to_string());
        params.push(Value::Integer(sid));
    }
    period.push_filter("date", &mut conditions, &mut params);

    let sql = format!(
        "SELECT
           COUNT(*),
           COALESCE(SUM(CASE WHEN status = 'Present' THEN 1 ELSE 0 END), 0),
           COALESCE(SUM(CASE WHEN status = 'Absent Informed' THEN 1 ELSE 0 END), 0),
           COALESCE(SUM(CASE WHEN status = 'Absent Uninformed' THEN 1 ELSE 0 END), 0)
         FROM attendance
         WHERE {}",
        conditions.join(" AND ")
    );
    conn.query_row(&sql, params_from_iter(params), |r| {
        let total: i64 = r.get(0)?;
        let present: i64 = r.get(1)?;
        Ok(AttendanceSummary {
            total,
            present,
            absent_informed: r.get(2)?,
            absent_uninformed: r.get(3)?,
            percentage: percentage(present, total),
        })
    })
}

/// Homework without a submission row counts as Pending, so the three
/// buckets always add up to `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeworkBreakdown {
    pub pending: i64,
    pub submitted: i64,
    pub graded: i64,
    pub total: i64,
}

impl HomeworkBreakdown {
    fn from_counts(total: i64, submitted: i64, graded: i64) -> Self {
        Self {
            pending: (total - submitted - graded).max(0),
            submitted,
            graded,
            total,
        }
    }
}

pub fn homework_breakdown(conn: &Connection, student_id: i64) -> rusqlite::Result<HomeworkBreakdown> {
    conn.query_row(
        "SELECT
           COUNT(*),
           COALESCE(SUM(CASE WHEN hs.status = 'Submitted' THEN 1 ELSE 0 END), 0),
           COALESCE(SUM(CASE WHEN hs.status = 'Graded' THEN 1 ELSE 0 END), 0)
         FROM homework h
         LEFT JOIN homework_submissions hs
           ON hs.homework_id = h.id AND hs.student_id = ?",
        [student_id],
        |r| Ok(HomeworkBreakdown::from_counts(r.get(0)?, r.get(1)?, r.get(2)?)),
    )
}

/// Breakdown over every (student, homework) pair.
pub fn homework_breakdown_all(conn: &Connection) -> rusqlite::Result<HomeworkBreakdown> {
    conn.query_row(
        "SELECT
           (SELECT COUNT(*) FROM students) * (SELECT COUNT(*) FROM homework),
           (SELECT COUNT(*) FROM homework_submissions WHERE status = 'Submitted'),
           (SELECT COUNT(*) FROM homework_submissions WHERE status = 'Graded')",
        [],
        |r| Ok(HomeworkBreakdown::from_counts(r.get(0)?, r.get(1)?, r.get(2)?)),
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoubtStats {
    pub total: i64,
    pub answered: i64,
    pub unanswered: i64,
}

impl DoubtStats {
    pub fn from_answers<'a, I>(answers: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut out = Self::default();
        for a in answers {
            out.total += 1;
            if is_answered(a) {
                out.answered += 1;
            }
        }
        out.unanswered = out.total - out.answered;
        out
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DoubtFilter {
    pub student_id: Option<i64>,
    pub homework_id: Option<i64>,
}

pub fn doubt_stats(conn: &Connection, filter: DoubtFilter) -> rusqlite::Result<DoubtStats> {
    let mut conditions = vec!["1 = 1".to_string()];
    let mut params: Vec<Value> = Vec::new();
    if let Some(sid) = filter.student_id {
        conditions.push("student_id = ?".to_string());
        params.push(Value::Integer(sid));
    }
    if let Some(hid) = filter.homework_id {
        conditions.push("homework_id = ?".to_string());
        params.push(Value::Integer(hid));
    }
    let sql = format!(
        "SELECT
           COUNT(*),
           COALESCE(SUM(CASE WHEN answer IS NOT NULL AND answer != '' THEN 1 ELSE 0 END), 0)
         FROM doubts
         WHERE {}",
        conditions.join(" AND ")
    );
    conn.query_row(&sql, params_from_iter(params), |r| {
        let total: i64 = r.get(0)?;
        let answered: i64 = r.get(1)?;
        Ok(DoubtStats {
            total,
            answered,
            unanswered: total - answered,
        })
    })
}

/// Per-student raw figures shared by low-performer detection and leaderboards.
#[derive(Debug, Clone)]
struct StudentMetrics {
    student_id: i64,
    name: String,
    roll_no: String,
    attendance_total: i64,
    attendance_present: i64,
    grade_count: i64,
    average_grade: Option<f64>,
    doubt_count: i64,
}

impl StudentMetrics {
    fn raw_attendance_percent(&self) -> Option<f64> {
        if self.attendance_total > 0 {
            Some(100.0 * self.attendance_present as f64 / self.attendance_total as f64)
        } else {
            None
        }
    }
}

fn load_student_metrics(conn: &Connection) -> rusqlite::Result<Vec<StudentMetrics>> {
    let mut stmt = conn.prepare(
        "SELECT
           s.id, s.name, s.roll_no,
           COALESCE(a.total, 0), COALESCE(a.present, 0),
           COALESCE(g.graded, 0), g.avg_grade,
           COALESCE(d.asked, 0)
         FROM students s
         LEFT JOIN (
           SELECT student_id,
                  COUNT(*) AS total,
                  SUM(CASE WHEN status = 'Present' THEN 1 ELSE 0 END) AS present
           FROM attendance
           GROUP BY student_id
         ) a ON a.student_id = s.id
         LEFT JOIN (
           SELECT student_id, COUNT(*) AS graded, AVG(grade) AS avg_grade
           FROM homework_submissions
           WHERE grade IS NOT NULL
           GROUP BY student_id
         ) g ON g.student_id = s.id
         LEFT JOIN (
           SELECT student_id, COUNT(*) AS asked
           FROM doubts
           GROUP BY student_id
         ) d ON d.student_id = s.id
         ORDER BY s.name, s.roll_no",
    )?;
    stmt.query_map([], |r| {
        Ok(StudentMetrics {
            student_id: r.get(0)?,
            name: r.get(1)?,
            roll_no: r.get(2)?,
            attendance_total: r.get(3)?,
            attendance_present: r.get(4)?,
            grade_count: r.get(5)?,
            average_grade: r.get(6)?,
            doubt_count: r.get(7)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LowPerformer {
    pub student_id: i64,
    pub name: String,
    pub roll_no: String,
    pub attendance_percentage: Option<f64>,
    pub average_grade: Option<f64>,
    pub reasons: Vec<String>,
}

/// Flags a student when attendance or average grade is strictly below its
/// threshold. A signal with no records behind it never triggers.
pub fn low_performers(conn: &Connection, thresholds: &Thresholds) -> rusqlite::Result<Vec<LowPerformer>> {
    let mut out = Vec::new();
    for m in load_student_metrics(conn)? {
        let attendance = m.raw_attendance_percent();
        let mut reasons = Vec::new();
        // Compare unrounded; report the same rounded figure as the fields.
        if let Some(pct) = attendance {
            if pct < thresholds.low_attendance_percent {
                reasons.push(format!("Low attendance: {:.1}%", round_off_1_decimal(pct)));
            }
        }
        if let Some(avg) = m.average_grade {
            if avg < thresholds.low_grade {
                reasons.push(format!("Low grades: {:.1}", round_off_1_decimal(avg)));
            }
        }
        if reasons.is_empty() {
            continue;
        }
        out.push(LowPerformer {
            student_id: m.student_id,
            name: m.name,
            roll_no: m.roll_no,
            attendance_percentage: attendance.map(round_off_1_decimal),
            average_grade: m.average_grade.map(round_off_1_decimal),
            reasons,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAnalytics {
    pub subject_id: i64,
    pub name: String,
    pub classes: i64,
    pub avg_attendance: f64,
    pub homeworks_count: i64,
    pub avg_grade: Option<f64>,
    pub pending_doubts: i64,
}

pub fn subject_analytics(conn: &Connection) -> rusqlite::Result<Vec<SubjectAnalytics>> {
    // Each metric is aggregated before the join so rows never multiply.
    let mut stmt = conn.prepare(
        "SELECT
           s.id, s.name,
           COALESCE(a.classes, 0), COALESCE(a.total, 0), COALESCE(a.present, 0),
           COALESCE(h.homeworks, 0),
           g.avg_grade,
           COALESCE(d.unanswered, 0)
         FROM subjects s
         LEFT JOIN (
           SELECT subject_id,
                  COUNT(DISTINCT date) AS classes,
                  COUNT(*) AS total,
                  SUM(CASE WHEN status = 'Present' THEN 1 ELSE 0 END) AS present
           FROM attendance
           GROUP BY subject_id
         ) a ON a.subject_id = s.id
         LEFT JOIN (
           SELECT subject_id, COUNT(*) AS homeworks
           FROM homework
           GROUP BY subject_id
         ) h ON h.subject_id = s.id
         LEFT JOIN (
           SELECT hw.subject_id, AVG(hs.grade) AS avg_grade
           FROM homework_submissions hs
           JOIN homework hw ON hw.id = hs.homework_id
           WHERE hs.grade IS NOT NULL
           GROUP BY hw.subject_id
         ) g ON g.subject_id = s.id
         LEFT JOIN (
           SELECT hw.subject_id, COUNT(*) AS unanswered
           FROM doubts dq
           JOIN homework hw ON hw.id = dq.homework_id
           WHERE dq.answer IS NULL OR dq.answer = ''
           GROUP BY hw.subject_id
         ) d ON d.subject_id = s.id
         ORDER BY s.name",
    )?;
    stmt.query_map([], |r| {
        let total: i64 = r.get(3)?;
        let present: i64 = r.get(4)?;
        let avg_grade: Option<f64> = r.get(6)?;
        Ok(SubjectAnalytics {
            subject_id: r.get(0)?,
            name: r.get(1)?,
            classes: r.get(2)?,
            avg_attendance: percentage(present, total),
            homeworks_count: r.get(5)?,
            avg_grade: avg_grade.map(round_off_1_decimal),
            pending_doubts: r.get(7)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderboardMetric {
    Attendance,
    Homework,
    Doubts,
}

impl LeaderboardMetric {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "attendance" => Some(Self::Attendance),
            "homework" | "grades" => Some(Self::Homework),
            "doubts" => Some(Self::Doubts),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attendance => "attendance",
            Self::Homework => "homework",
            Self::Doubts => "doubts",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::Attendance => "%",
            Self::Homework => "",
            Self::Doubts => " questions",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub student_id: i64,
    pub name: String,
    pub roll_no: String,
    pub score: f64,
    pub unit: &'static str,
}

/// Descending by score; ties fall back to name, then roll number.
pub fn leaderboard(conn: &Connection, metric: LeaderboardMetric) -> rusqlite::Result<Vec<LeaderboardEntry>> {
    let mut scored: Vec<(f64, StudentMetrics)> = load_student_metrics(conn)?
        .into_iter()
        .filter_map(|m| {
            let score = match metric {
                LeaderboardMetric::Attendance => percentage(m.attendance_present, m.attendance_total),
                LeaderboardMetric::Homework => {
                    if m.grade_count == 0 {
                        return None;
                    }
                    round_off_1_decimal(m.average_grade.unwrap_or(0.0))
                }
                LeaderboardMetric::Doubts => m.doubt_count as f64,
            };
            Some((score, m))
        })
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.roll_no.cmp(&b.roll_no))
    });

    Ok(scored
        .into_iter()
        .enumerate()
        .map(|(i, (score, m))| LeaderboardEntry {
            rank: i + 1,
            student_id: m.student_id,
            name: m.name,
            roll_no: m.roll_no,
            score,
            unit: metric.unit(),
        })
        .collect())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTotals {
    pub present: i64,
    pub absent_informed: i64,
    pub absent_uninformed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_classes: i64,
    pub total_homeworks: i64,
    pub avg_attendance: f64,
    pub avg_grade: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemOverview {
    pub attendance: StatusTotals,
    pub homework: HomeworkBreakdown,
    pub subjects: Vec<SubjectAnalytics>,
    pub overall: OverallStats,
    pub low_performers: Vec<LowPerformer>,
}

pub fn system_overview(conn: &Connection, thresholds: &Thresholds) -> rusqlite::Result<SystemOverview> {
    let attendance = conn.query_row(
        "SELECT
           COALESCE(SUM(CASE WHEN status = 'Present' THEN 1 ELSE 0 END), 0),
           COALESCE(SUM(CASE WHEN status = 'Absent Informed' THEN 1 ELSE 0 END), 0),
           COALESCE(SUM(CASE WHEN status = 'Absent Uninformed' THEN 1 ELSE 0 END), 0)
         FROM attendance",
        [],
        |r| {
            Ok(StatusTotals {
                present: r.get(0)?,
                absent_informed: r.get(1)?,
                absent_uninformed: r.get(2)?,
            })
        },
    )?;
    let total_classes: i64 = conn.query_row(
        "SELECT COUNT(*) FROM (SELECT DISTINCT date, subject_id FROM attendance)",
        [],
        |r| r.get(0),
    )?;
    let total_homeworks: i64 = conn.query_row("SELECT COUNT(*) FROM homework", [], |r| r.get(0))?;
    let avg_grade: Option<f64> = conn.query_row(
        "SELECT AVG(grade) FROM homework_submissions WHERE grade IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let marked = attendance.present + attendance.absent_informed + attendance.absent_uninformed;

    Ok(SystemOverview {
        attendance,
        homework: homework_breakdown_all(conn)?,
        subjects: subject_analytics(conn)?,
        overall: OverallStats {
            total_classes,
            total_homeworks,
            avg_attendance: percentage(attendance.present, marked),
            avg_grade: avg_grade.map(round_off_1_decimal),
        },
        low_performers: low_performers(conn, thresholds)?,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDashboard {
    pub students_total: i64,
    pub subjects_total: i64,
    pub active_homeworks: i64,
    pub pending_submissions: i64,
    pub to_grade: i64,
    pub subjects_marked_today: i64,
    pub doubts: DoubtStats,
}

pub fn teacher_dashboard(conn: &Connection, today: NaiveDate) -> rusqlite::Result<TeacherDashboard> {
    let students_total: i64 = conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?;
    let subjects_total: i64 = conn.query_row("SELECT COUNT(*) FROM subjects", [], |r| r.get(0))?;
    let active_homeworks: i64 = conn.query_row(
        "SELECT COUNT(*) FROM homework WHERE due_date >= ?",
        [today],
        |r| r.get(0),
    )?;
    let subjects_marked_today: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT subject_id) FROM attendance WHERE date = ?",
        [today],
        |r| r.get(0),
    )?;
    let breakdown = homework_breakdown_all(conn)?;
    Ok(TeacherDashboard {
        students_total,
        subjects_total,
        active_homeworks,
        pending_submissions: breakdown.pending,
        to_grade: breakdown.submitted,
        subjects_marked_today,
        doubts: doubt_stats(conn, DoubtFilter::default())?,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDashboard {
    pub homework: HomeworkBreakdown,
    pub attendance: AttendanceSummary,
    pub doubts: DoubtStats,
}

pub fn student_dashboard(conn: &Connection, student_id: i64) -> rusqlite::Result<StudentDashboard> {
    Ok(StudentDashboard {
        homework: homework_breakdown(conn, student_id)?,
        attendance: attendance_summary(conn, student_id, None, &Period::all())?,
        doubts: doubt_stats(
            conn,
            DoubtFilter {
                student_id: Some(student_id),
                homework_id: None,
            },
        )?,
    })
}
