//! Paginated duplicate report assembled from the cached result.
//!
//! # Overview
//!
//! A [`ReportPage`] is what an operator looks at: the scan status, totals
//! over every group, and one page of groups with each member labelled as
//! attached or orphan. Groups with at least one orphan carry a delete token
//! scoped to that group.

use std::fs;

use serde::Serialize;

use crate::actions::guard::{Action, ActionToken, TokenSigner};
use crate::actions::ReferenceChecker;
use crate::cache::CachedResult;
use crate::scanner::ItemId;
use crate::session::ScanStatus;
use crate::store::{ItemCatalog, StoreResult};

/// Page window over a list of groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// 1-based page actually shown (clamped to the valid range).
    pub current_page: usize,
    pub per_page: usize,
    pub total_items: usize,
    pub total_pages: usize,
    /// Index of the first item on the page.
    pub offset: usize,
    /// 1-based position of the first item shown, 0 when empty.
    pub start: usize,
    /// 1-based position of the last item shown.
    pub end: usize,
}

impl Pagination {
    /// Compute the window for `requested_page`.
    ///
    /// # Example
    ///
    /// ```
    /// use mediadupe::output::report::Pagination;
    ///
    /// let p = Pagination::new(45, 20, 3);
    /// assert_eq!(p.total_pages, 3);
    /// assert_eq!((p.start, p.end), (41, 45));
    /// ```
    #[must_use]
    pub fn new(total_items: usize, per_page: usize, requested_page: usize) -> Self {
        let per_page = per_page.max(1);
        let total_pages = total_items.div_ceil(per_page);
        let current_page = requested_page.clamp(1, total_pages.max(1));
        let offset = (current_page - 1) * per_page;
        let end = (offset + per_page).min(total_items);
        Self {
            current_page,
            per_page,
            total_items,
            total_pages,
            offset,
            start: if total_items == 0 { 0 } else { offset + 1 },
            end,
        }
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }
}

/// Totals over every duplicate group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    /// Number of duplicate groups
    pub total_sets: usize,
    /// Members whose file still exists
    pub total_files: usize,
    /// Combined size of those files in bytes
    pub total_size: u64,
    /// Members beyond the first in each group
    pub redundant_copies: usize,
}

/// One member of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRow {
    pub id: ItemId,
    pub path: Option<String>,
    pub size: Option<u64>,
    pub referenced: bool,
    pub label: &'static str,
}

/// One duplicate group on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRow {
    pub hash: String,
    pub members: Vec<MemberRow>,
    pub orphan_ids: Vec<ItemId>,
    /// Token for deleting this group's orphans. Absent when there are none.
    pub delete_token: Option<ActionToken>,
}

/// A full report page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPage {
    pub status: ScanStatus,
    /// Whether the groups come from a completed scan.
    pub complete: bool,
    pub stats: LibraryStats,
    pub pagination: Pagination,
    pub groups: Vec<GroupRow>,
}

struct MemberFile {
    path: Option<String>,
    size: Option<u64>,
}

/// Builds [`ReportPage`]s.
pub struct ReportBuilder<'a> {
    catalog: &'a dyn ItemCatalog,
    checker: &'a ReferenceChecker,
    signer: Option<&'a TokenSigner>,
}

impl<'a> ReportBuilder<'a> {
    #[must_use]
    pub fn new(catalog: &'a dyn ItemCatalog, checker: &'a ReferenceChecker) -> Self {
        Self {
            catalog,
            checker,
            signer: None,
        }
    }

    /// Attach delete tokens to groups that have orphans.
    #[must_use]
    pub fn with_signer(mut self, signer: &'a TokenSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Build the requested page.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog or reference oracle fails.
    pub fn build(
        &self,
        status: ScanStatus,
        result: Option<&CachedResult>,
        page: usize,
        per_page: usize,
    ) -> StoreResult<ReportPage> {
        let Some(result) = result else {
            return Ok(ReportPage {
                status,
                complete: false,
                stats: LibraryStats::default(),
                pagination: Pagination::new(0, per_page, page),
                groups: Vec::new(),
            });
        };

        let groups: Vec<_> = result.groups.iter().filter(|(_, ids)| ids.len() >= 2).collect();

        let mut stats = LibraryStats {
            total_sets: groups.len(),
            redundant_copies: result.groups.stats().redundant_copies,
            ..LibraryStats::default()
        };
        for (_, ids) in &groups {
            for &id in ids.iter() {
                if let Some(size) = self.member_file(id)?.size {
                    stats.total_files += 1;
                    stats.total_size += size;
                }
            }
        }

        let pagination = Pagination::new(groups.len(), per_page, page);
        let mut rows = Vec::with_capacity(pagination.end - pagination.offset);

        for (digest, ids) in &groups[pagination.offset..pagination.end] {
            let mut members = Vec::with_capacity(ids.len());
            for member in self.checker.label_group(ids.iter().copied())? {
                let file = self.member_file(member.id)?;
                members.push(MemberRow {
                    id: member.id,
                    path: file.path,
                    size: file.size,
                    referenced: member.referenced,
                    label: member.label(),
                });
            }

            let orphan_ids: Vec<_> = members.iter().filter(|m| !m.referenced).map(|m| m.id).collect();
            let delete_token = match self.signer {
                Some(signer) if !orphan_ids.is_empty() => {
                    Some(signer.mint(Action::DeleteOrphans, digest.as_str()))
                }
                _ => None,
            };

            rows.push(GroupRow {
                hash: digest.to_string(),
                members,
                orphan_ids,
                delete_token,
            });
        }

        Ok(ReportPage {
            status,
            complete: result.complete,
            stats,
            pagination,
            groups: rows,
        })
    }

    fn member_file(&self, id: ItemId) -> StoreResult<MemberFile> {
        let path = self.catalog.item_path(id)?;
        let size = path
            .as_deref()
            .and_then(|p| fs::metadata(p).ok())
            .filter(|m| m.is_file())
            .map(|m| m.len());
        Ok(MemberFile {
            path: path.map(|p| p.to_string_lossy().into_owned()),
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicates::HashGroups;
    use crate::scanner::Digest;
    use crate::session::ScanStatus;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_pagination_bounds() {
        let p = Pagination::new(0, 20, 1);
        assert_eq!((p.total_pages, p.current_page, p.start, p.end), (0, 1, 0, 0));

        let p = Pagination::new(40, 20, 2);
        assert_eq!((p.offset, p.start, p.end), (20, 21, 40));
        assert!(p.has_previous());
        assert!(!p.has_next());

        let p = Pagination::new(41, 20, 99);
        assert_eq!(p.current_page, 3);
        assert_eq!((p.start, p.end), (41, 41));

        assert_eq!(Pagination::new(5, 20, 0).current_page, 1);
    }

    #[test]
    fn test_report_without_result() {
        let store = Arc::new(MemoryStore::new());
        let checker = ReferenceChecker::new(store.clone());
        let page = ReportBuilder::new(&*store, &checker)
            .build(ScanStatus::idle(None, 0), None, 1, 20)
            .unwrap();
        assert!(page.groups.is_empty());
        assert_eq!(page.stats, LibraryStats::default());
    }

    #[test]
    fn test_report_labels_and_tokens() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        for id in 1..=4u64 {
            let path = dir.path().join(format!("{id}.jpg"));
            fs::write(&path, b"1234").unwrap();
            store.add_item(id, path);
        }
        store.set_referenced(1, true);
        store.set_referenced(3, true);
        store.set_referenced(4, true);

        let h1 = Digest::of_bytes(b"h1");
        let h2 = Digest::of_bytes(b"h2");
        let groups = HashGroups::from_pairs([(h1.clone(), 1), (h1.clone(), 2), (h2.clone(), 3), (h2, 4)]);
        let result = CachedResult::new("g", groups, true);

        let checker = ReferenceChecker::new(store.clone());
        let signer = TokenSigner::new("k");
        let page = ReportBuilder::new(&*store, &checker)
            .with_signer(&signer)
            .build(ScanStatus::idle(None, 2), Some(&result), 1, 20)
            .unwrap();

        assert!(page.complete);
        assert_eq!(page.stats.total_sets, 2);
        assert_eq!(page.stats.total_files, 4);
        assert_eq!(page.stats.total_size, 16);

        let row = page.groups.iter().find(|g| g.hash == h1.as_str()).unwrap();
        assert_eq!(row.orphan_ids, vec![2]);
        assert_eq!(row.members[0].label, "attached");
        let token = row.delete_token.as_ref().unwrap();
        assert!(signer.verify(Action::DeleteOrphans, h1.as_str(), token));

        let fully_attached = page.groups.iter().find(|g| g.hash != h1.as_str()).unwrap();
        assert!(fully_attached.delete_token.is_none());
    }

    #[test]
    fn test_missing_files_excluded_from_totals() {
        let store = Arc::new(MemoryStore::new());
        store.add_item(1, "/does/not/exist/1.jpg");
        store.add_item(2, "/does/not/exist/2.jpg");
        let h = Digest::of_bytes(b"h");
        let result = CachedResult::new("g", HashGroups::from_pairs([(h.clone(), 1), (h, 2)]), false);

        let checker = ReferenceChecker::new(store.clone());
        let page = ReportBuilder::new(&*store, &checker)
            .build(ScanStatus::idle(None, 1), Some(&result), 1, 20)
            .unwrap();
        assert_eq!(page.stats.total_sets, 1);
        assert_eq!(page.stats.total_files, 0);
        assert_eq!(page.groups[0].members[0].size, None);
    }
}
