//! Human-readable rendering of scan status and report pages.

use std::fmt::Write as _;
use std::io::{self, Write};

use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use yansi::{Condition, Paint};

use crate::output::report::{GroupRow, ReportPage};
use crate::session::{ScanState, ScanStatus};

/// Plain-text renderer.
#[derive(Debug, Clone, Copy)]
pub struct TextOutput {
    colored: bool,
}

impl TextOutput {
    #[must_use]
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    fn condition(&self) -> Condition {
        if self.colored {
            Condition::ALWAYS
        } else {
            Condition::NEVER
        }
    }

    /// One-line description of `status` as of `now`.
    #[must_use]
    pub fn status_line(&self, status: &ScanStatus, now: DateTime<Utc>) -> String {
        match status.state {
            ScanState::None => "No scan has been run yet.".to_string(),
            ScanState::Running => format!(
                "Scan in progress: {:.0}% ({}/{} items).",
                status.percentage, status.processed, status.total
            ),
            ScanState::Stopped => format!(
                "Scan stopped at {:.0}% ({}/{} items). Resume to continue.",
                status.percentage, status.processed, status.total
            ),
            ScanState::Complete => match status.last_full_scan {
                Some(at) => format!("Last complete scan: {} ago.", time_ago(at, now)),
                None => "Scan complete.".to_string(),
            },
        }
    }

    /// Render a full report page.
    #[must_use]
    pub fn render(&self, page: &ReportPage, now: DateTime<Utc>) -> String {
        let cond = self.condition();
        let mut out = String::new();

        let _ = writeln!(out, "{}", self.status_line(&page.status, now).bold().whenever(cond));

        if page.stats.total_sets == 0 {
            let _ = writeln!(out, "{}", "No duplicates found.".green().whenever(cond));
            return out;
        }

        let _ = writeln!(
            out,
            "Duplicate sets: {}   Files: {}   Total size: {}{}",
            page.stats.total_sets,
            page.stats.total_files,
            ByteSize::b(page.stats.total_size),
            if page.complete { "" } else { "   (partial results)" }
        );
        let p = &page.pagination;
        let _ = writeln!(
            out,
            "Showing {}-{} of {} (page {}/{})",
            p.start, p.end, p.total_items, p.current_page, p.total_pages
        );

        for (i, group) in page.groups.iter().enumerate() {
            out.push('\n');
            self.render_group(&mut out, p.start + i, group);
        }
        out
    }

    fn render_group(&self, out: &mut String, index: usize, group: &GroupRow) {
        let cond = self.condition();
        let _ = writeln!(
            out,
            "[{}] {} ({} items)",
            index,
            group.hash.get(..12).unwrap_or(&group.hash).cyan().whenever(cond),
            group.members.len()
        );

        for member in &group.members {
            let label = if member.referenced {
                member.label.green().whenever(cond)
            } else {
                member.label.yellow().whenever(cond)
            };
            let size = member
                .size
                .map_or_else(|| "missing".to_string(), |s| ByteSize::b(s).to_string());
            let _ = writeln!(
                out,
                "    #{:<8} {:<8} {:>10}  {}",
                member.id,
                label,
                size,
                member.path.as_deref().unwrap_or("<unknown>")
            );
        }

        if !group.orphan_ids.is_empty() {
            let ids: Vec<String> = group.orphan_ids.iter().map(ToString::to_string).collect();
            let _ = write!(out, "    orphans: {}", ids.join(", "));
            if let Some(token) = &group.delete_token {
                let _ = write!(out, "   token: {}", token);
            }
            out.push('\n');
        }
    }

    /// Write a rendered page to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W, page: &ReportPage) -> io::Result<()> {
        writer.write_all(self.render(page, Utc::now()).as_bytes())
    }
}

/// Coarse "N units" distance between `then` and `now`.
#[must_use]
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    let (n, unit) = match secs {
        s if s < 60 => (s.max(1), "second"),
        s if s < 3_600 => (s / 60, "minute"),
        s if s < 86_400 => (s / 3_600, "hour"),
        s => (s / 86_400, "day"),
    };
    format!("{} {}{}", n, unit, if n == 1 { "" } else { "s" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::report::{LibraryStats, MemberRow, Pagination};
    use chrono::Duration;

    fn status(state: ScanState, processed: usize, total: usize) -> ScanStatus {
        ScanStatus {
            state,
            generation: None,
            total,
            processed,
            percentage: if total == 0 { 0.0 } else { processed as f64 * 100.0 / total as f64 },
            next_offset: None,
            last_full_scan: None,
            cached_groups: 0,
        }
    }

    #[test]
    fn test_time_ago() {
        let now = Utc::now();
        assert_eq!(time_ago(now, now), "1 second");
        assert_eq!(time_ago(now - Duration::minutes(5), now), "5 minutes");
        assert_eq!(time_ago(now - Duration::hours(1), now), "1 hour");
        assert_eq!(time_ago(now - Duration::days(3), now), "3 days");
    }

    #[test]
    fn test_status_lines() {
        let out = TextOutput::new(false);
        let now = Utc::now();
        assert!(out.status_line(&status(ScanState::None, 0, 0), now).contains("No scan"));
        assert_eq!(
            out.status_line(&status(ScanState::Stopped, 20, 50), now),
            "Scan stopped at 40% (20/50 items). Resume to continue."
        );

        let mut done = status(ScanState::Complete, 5, 5);
        done.last_full_scan = Some(now - Duration::hours(3));
        assert_eq!(out.status_line(&done, now), "Last complete scan: 3 hours ago.");
    }

    #[test]
    fn test_render_page() {
        let page = ReportPage {
            status: status(ScanState::Running, 2, 5),
            complete: false,
            stats: LibraryStats {
                total_sets: 1,
                total_files: 2,
                total_size: 2048,
                redundant_copies: 1,
            },
            pagination: Pagination::new(1, 20, 1),
            groups: vec![GroupRow {
                hash: "a".repeat(64),
                members: vec![
                    MemberRow {
                        id: 1,
                        path: Some("/m/1.jpg".into()),
                        size: Some(1024),
                        referenced: true,
                        label: "attached",
                    },
                    MemberRow {
                        id: 2,
                        path: Some("/m/2.jpg".into()),
                        size: None,
                        referenced: false,
                        label: "orphan",
                    },
                ],
                orphan_ids: vec![2],
                delete_token: Some("tok".into()),
            }],
        };

        let text = TextOutput::new(false).render(&page, Utc::now());
        assert!(text.contains("Scan in progress: 40% (2/5 items)."));
        assert!(text.contains("(partial results)"));
        assert!(text.contains("Showing 1-1 of 1 (page 1/1)"));
        assert!(text.contains("[1] aaaaaaaaaaaa (2 items)"));
        assert!(text.contains("missing"));
        assert!(text.contains("orphans: 2   token: tok"));
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn test_render_empty() {
        let page = ReportPage {
            status: status(ScanState::None, 0, 0),
            complete: false,
            stats: LibraryStats::default(),
            pagination: Pagination::new(0, 20, 1),
            groups: Vec::new(),
        };
        let text = TextOutput::new(false).render(&page, Utc::now());
        assert!(text.contains("No duplicates found."));
    }
}
