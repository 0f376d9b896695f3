//! Site statistics: ranking, paging and time formatting.

use std::fmt;

use serde::Serialize;

use crate::types::{SiteMap, SitesPerPage};

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;

// =============================================================================
// Ranking
// =============================================================================

/// One row of the statistics table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteEntry {
    pub domain: String,
    /// Stored time, plus the live elapsed span for the active domain
    pub time: u64,
    pub favicon: String,
    pub title: String,
    /// Percentage of the largest stored time, 0..=100
    pub share: f64,
    pub active: bool,
}

/// Sites ranked by time spent, most first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteStats {
    entries: Vec<SiteEntry>,
}

/// One page of [`SiteStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsPage<'a> {
    pub sites: &'a [SiteEntry],
    /// 1-based, clamped to `total_pages`
    pub page: u32,
    pub total_pages: u32,
    pub total_sites: usize,
}

impl SiteStats {
    /// Rank `sites`. `live` is the active domain and its unflushed elapsed time.
    pub fn ranked(sites: &SiteMap, live: Option<(&str, u64)>) -> Self {
        let max_time = sites.values().map(|r| r.time).max().unwrap_or(0);

        let mut entries: Vec<SiteEntry> = sites
            .iter()
            .map(|(domain, record)| {
                let active = live.is_some_and(|(d, _)| d == domain);
                let extra = live.filter(|_| active).map_or(0, |(_, ms)| ms);
                SiteEntry {
                    domain: domain.clone(),
                    time: record.time.saturating_add(extra),
                    favicon: record.favicon.clone(),
                    title: record.title.clone(),
                    share: if max_time > 0 {
                        record.time as f64 / max_time as f64 * 100.0
                    } else {
                        0.0
                    },
                    active,
                }
            })
            .collect();

        entries.sort_by(|a, b| b.time.cmp(&a.time).then_with(|| a.domain.cmp(&b.domain)));
        Self { entries }
    }

    pub fn entries(&self) -> &[SiteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_time(&self) -> u64 {
        self.entries.iter().map(|e| e.time).sum()
    }

    /// Number of pages; at least 1.
    pub fn total_pages(&self, per_page: SitesPerPage) -> u32 {
        match per_page {
            SitesPerPage::All => 1,
            SitesPerPage::Count(n) => {
                let n = n.max(1) as usize;
                (self.entries.len().div_ceil(n) as u32).max(1)
            }
        }
    }

    /// Page `page` (1-based). Out-of-range pages clamp to the last page.
    pub fn page(&self, page: u32, per_page: SitesPerPage) -> StatsPage<'_> {
        let total_pages = self.total_pages(per_page);
        let page = page.clamp(1, total_pages);
        let sites = match per_page {
            SitesPerPage::All => &self.entries[..],
            SitesPerPage::Count(n) => {
                let n = n.max(1) as usize;
                let start = ((page - 1) as usize * n).min(self.entries.len());
                let end = (start + n).min(self.entries.len());
                &self.entries[start..end]
            }
        };
        StatsPage {
            sites,
            page,
            total_pages,
            total_sites: self.entries.len(),
        }
    }
}

// =============================================================================
// Formatting
// =============================================================================

/// `HH:MM:SS`; hours are not wrapped at 24.
pub fn format_clock(ms: u64) -> String {
    let seconds = ms / MS_PER_SECOND;
    format!("{:02}:{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60, seconds % 60)
}

/// Coarse time-spent figure shown on the interstitial page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpentTime {
    NotTracked,
    UnderMinute,
    Minutes(u64),
    HoursMinutes(u64, u64),
}

impl SpentTime {
    pub fn from_ms(ms: u64) -> Self {
        let hours = ms / MS_PER_HOUR;
        let minutes = (ms % MS_PER_HOUR) / MS_PER_MINUTE;
        match (ms, hours, minutes) {
            (0, _, _) => SpentTime::NotTracked,
            (_, 0, 0) => SpentTime::UnderMinute,
            (_, 0, m) => SpentTime::Minutes(m),
            (_, h, m) => SpentTime::HoursMinutes(h, m),
        }
    }
}

impl fmt::Display for SpentTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpentTime::NotTracked => write!(f, "No time tracked"),
            SpentTime::UnderMinute => write!(f, "Less than a minute"),
            SpentTime::Minutes(1) => write!(f, "1 minute"),
            SpentTime::Minutes(m) => write!(f, "{} minutes", m),
            SpentTime::HoursMinutes(h, m) => write!(f, "{}h {}m", h, m),
        }
    }
}

pub fn format_spent(ms: u64) -> SpentTime {
    SpentTime::from_ms(ms)
}
