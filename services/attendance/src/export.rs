//! CSV rendering of a ledger

use chrono::{DateTime, SecondsFormat};

use crate::models::AttendanceRecord;

const HEADER: [&str; 10] = [
    "Session",
    "CourseId",
    "SectionId",
    "Username",
    "Time",
    "Device",
    "Source",
    "Present",
    "LeftAt",
    "Kicked",
];

fn rfc3339(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

fn row<I, S>(cells: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    cells
        .into_iter()
        .map(|c| quote(c.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Every cell quoted, embedded quotes doubled, rows joined by `\n`.
pub fn to_csv(records: &[AttendanceRecord]) -> String {
    let mut lines = vec![row(HEADER)];
    lines.extend(records.iter().map(|r| {
        row([
            r.session_id.clone(),
            r.course_id.clone(),
            r.section_id.clone(),
            r.username.clone(),
            rfc3339(r.time),
            r.device.clone(),
            r.source.as_str().to_string(),
            r.present.to_string(),
            r.left_at.map(rfc3339).unwrap_or_default(),
            if r.kicked { "yes" } else { "" }.to_string(),
        ])
    }));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;

    #[test]
    fn test_to_csv() {
        let record = AttendanceRecord {
            username: "stud1".to_string(),
            session_id: "SES-A".to_string(),
            course_id: "C1".to_string(),
            section_id: "S1".to_string(),
            time: 0,
            device: "Phone \"X\"".to_string(),
            source: Source::Scan,
            present: false,
            left_at: Some(1_000),
            kicked: true,
        };

        let csv = to_csv(&[record]);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("\"Session\",\"CourseId\""));
        assert_eq!(
            lines[1],
            "\"SES-A\",\"C1\",\"S1\",\"stud1\",\"1970-01-01T00:00:00.000Z\",\"Phone \"\"X\"\"\",\"scan\",\"false\",\"1970-01-01T00:00:01.000Z\",\"yes\""
        );
    }

    #[test]
    fn test_empty_ledger_has_header_only() {
        assert_eq!(to_csv(&[]).lines().count(), 1);
    }
}
