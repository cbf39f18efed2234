//! Catalog Crawler: walks the paginated catalog one listing page at a time.
//!
//! Flow per page: fetch listing → parse rows → fetch each product page → merge into the
//! catalog by id → persist catalog + cursor. The cursor records the section
//! (individual / pre-packaged) and the next offset, so an interrupted run resumes where it
//! stopped instead of starting over.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use url::Url;

use crate::catalog::fetcher::PageSource;
use crate::catalog::parser::{parse_detail_page, parse_listing_page, ProductDetail};
use crate::catalog::store::{CatalogStore, CrawlCursor, CursorStore};
use crate::models::assessment::{AssessmentRecord, SolutionType};

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub start_url: Url,
    /// Offset step between listing pages.
    pub page_size: u32,
    /// Upper bound on listing pages per catalog section.
    pub max_pages: u32,
    /// A section ends after this many failed listing pages in a row.
    pub max_consecutive_failures: u32,
}

/// Per-run switches from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlOptions {
    /// Ignore any persisted cursor and crawl from the first page.
    pub restart: bool,
    /// Stop after this many listing pages (the cursor is kept for the next run).
    pub page_budget: Option<u32>,
}

/// One visited listing page.
#[derive(Debug, Clone)]
pub struct CrawlPage {
    pub url: String,
    pub solution_type: SolutionType,
    pub records: Vec<AssessmentRecord>,
    /// Set when the listing fetch failed and the page was skipped.
    pub failed: bool,
}

/// Pull-based crawler: each [`CatalogCrawler::next_page`] call visits at most one listing
/// page. Returns `None` once every section is exhausted.
pub struct CatalogCrawler<'a> {
    source: &'a dyn PageSource,
    settings: CrawlSettings,
    cursor: CrawlCursor,
    consecutive_failures: u32,
}

impl<'a> CatalogCrawler<'a> {
    pub fn new(source: &'a dyn PageSource, settings: CrawlSettings, cursor: CrawlCursor) -> Self {
        Self {
            source,
            settings,
            cursor,
            consecutive_failures: 0,
        }
    }

    pub fn cursor(&self) -> &CrawlCursor {
        &self.cursor
    }

    pub async fn next_page(&mut self) -> Option<CrawlPage> {
        loop {
            if self.cursor.finished {
                return None;
            }
            if self.cursor.pages_visited >= self.settings.max_pages {
                info!(
                    section = ?self.cursor.solution_type,
                    "page limit reached, ending section"
                );
                self.advance_section();
                continue;
            }

            let solution_type = self.cursor.solution_type;
            let url = listing_url(&self.settings.start_url, solution_type, self.cursor.next_start);

            let html = match self.source.fetch(&url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("Skipping listing page {url}: {e}");
                    self.consecutive_failures += 1;
                    if self.consecutive_failures >= self.settings.max_consecutive_failures {
                        warn!(
                            section = ?solution_type,
                            failures = self.consecutive_failures,
                            "too many consecutive failures, ending section"
                        );
                        self.advance_section();
                    } else {
                        self.step();
                    }
                    return Some(CrawlPage {
                        url,
                        solution_type,
                        records: Vec::new(),
                        failed: true,
                    });
                }
            };
            self.consecutive_failures = 0;

            let page_url = Url::parse(&url).unwrap_or_else(|_| self.settings.start_url.clone());
            let items = parse_listing_page(&html, &page_url);
            if items.is_empty() {
                info!(section = ?solution_type, offset = self.cursor.next_start, "no more listings");
                self.advance_section();
                continue;
            }

            let mut records = Vec::with_capacity(items.len());
            for item in items {
                let detail = match self.source.fetch(&item.url).await {
                    Ok(html) => parse_detail_page(&html),
                    Err(e) => {
                        warn!("Keeping listing data only for {}: {e}", item.id);
                        ProductDetail::default()
                    }
                };
                records.push(item.into_record(detail, solution_type));
            }

            self.step();
            return Some(CrawlPage {
                url,
                solution_type,
                records,
                failed: false,
            });
        }
    }

    fn step(&mut self) {
        self.cursor.next_start += self.settings.page_size;
        self.cursor.pages_visited += 1;
        self.cursor.updated_at = Utc::now();
    }

    fn advance_section(&mut self) {
        self.consecutive_failures = 0;
        self.cursor.next_start = 0;
        self.cursor.pages_visited = 0;
        self.cursor.updated_at = Utc::now();
        match self.cursor.solution_type {
            SolutionType::Individual => self.cursor.solution_type = SolutionType::Prepackaged,
            SolutionType::Prepackaged => self.cursor.finished = true,
        }
    }
}

/// Builds the listing URL for a section and offset, keeping any other query parameters.
pub fn listing_url(start_url: &Url, solution_type: SolutionType, start: u32) -> String {
    let mut url = start_url.clone();
    let kept: Vec<(String, String)> = start_url
        .query_pairs()
        .filter(|(k, _)| k != "start" && k != "type")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("start", &start.to_string())
        .append_pair("type", &solution_type.catalog_param().to_string());
    url.to_string()
}

#[derive(Debug, Clone, Default)]
pub struct CrawlReport {
    pub pages_visited: u32,
    pub failed_pages: Vec<String>,
    pub records_seen: usize,
    pub total_records: usize,
    pub finished: bool,
    pub resumed: bool,
}

/// Runs (or resumes) a crawl, persisting the catalog and cursor after every page.
pub async fn run_crawl(
    source: &dyn PageSource,
    settings: CrawlSettings,
    catalog: &CatalogStore,
    cursors: &CursorStore,
    options: CrawlOptions,
) -> Result<CrawlReport> {
    if options.restart {
        cursors.clear()?;
    }

    let saved = cursors.load().context("failed to load crawl cursor")?;
    let (cursor, mut records, resumed) = match saved {
        Some(cursor) if !cursor.finished => {
            let records = catalog.load_map().context("failed to load catalog for resume")?;
            info!(
                section = ?cursor.solution_type,
                offset = cursor.next_start,
                existing = records.len(),
                "Resuming crawl"
            );
            (cursor, records, true)
        }
        _ => {
            info!("Starting fresh crawl at {}", settings.start_url);
            (CrawlCursor::start(), BTreeMap::new(), false)
        }
    };

    let mut report = CrawlReport {
        resumed,
        ..CrawlReport::default()
    };
    let mut crawler = CatalogCrawler::new(source, settings, cursor);

    while let Some(page) = crawler.next_page().await {
        report.pages_visited += 1;
        if page.failed {
            report.failed_pages.push(page.url.clone());
        } else {
            report.records_seen += page.records.len();
            info!(
                url = %page.url,
                section = ?page.solution_type,
                records = page.records.len(),
                "Crawled listing page"
            );
            for record in page.records {
                records.insert(record.id.clone(), record);
            }
            catalog.save(records.values())?;
        }
        cursors.save(crawler.cursor())?;

        if options
            .page_budget
            .is_some_and(|budget| report.pages_visited >= budget)
        {
            info!("Page budget reached; run again to resume");
            break;
        }
    }

    report.finished = crawler.cursor().finished;
    if report.finished {
        cursors.save(crawler.cursor())?;
    }
    report.total_records = records.len();
    info!(
        pages = report.pages_visited,
        failed = report.failed_pages.len(),
        total = report.total_records,
        finished = report.finished,
        "Crawl run complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::catalog::fetcher::testing::StaticPages;

    const START: &str = "https://catalog.example.com/product-catalog/";

    fn settings() -> CrawlSettings {
        CrawlSettings {
            start_url: Url::parse(START).unwrap(),
            page_size: 12,
            max_pages: 10,
            max_consecutive_failures: 2,
        }
    }

    fn listing(slugs: &[&str]) -> String {
        let rows: String = slugs
            .iter()
            .map(|slug| {
                format!(
                    r#"<tr><td class="custom__table-heading__title"><a href="/view/{slug}/">{slug}</a></td>
                    <td class="custom__table-heading__general"><span class="catalogue__circle -yes"></span></td>
                    <td class="custom__table-heading__general"></td>
                    <td class="custom__table-heading__general"><span class="product-catalogue__key">A</span></td></tr>"#
                )
            })
            .collect();
        format!("<table><tr><th>Individual Test Solutions</th></tr>{rows}</table>")
    }

    fn detail(minutes: u32) -> String {
        format!(
            r#"<div class="product-catalogue-training-calendar__row"><h4>Description</h4><p>About it.</p></div>
            <div class="product-catalogue-training-calendar__row"><h4>Assessment length</h4>
            <p>Approximate Completion Time in minutes = {minutes}</p></div>"#
        )
    }

    fn url(solution: SolutionType, start: u32) -> String {
        listing_url(&Url::parse(START).unwrap(), solution, start)
    }

    fn catalog_pages() -> StaticPages {
        StaticPages::default()
            .with(&url(SolutionType::Individual, 0), &listing(&["alpha", "bravo"]))
            // "bravo" is listed again on the next page
            .with(&url(SolutionType::Individual, 12), &listing(&["bravo", "charlie"]))
            .with(&url(SolutionType::Individual, 24), &listing(&[]))
            .with(&url(SolutionType::Prepackaged, 0), &listing(&["delta"]))
            .with(&url(SolutionType::Prepackaged, 12), &listing(&[]))
            .with("https://catalog.example.com/view/alpha/", &detail(10))
            .with("https://catalog.example.com/view/bravo/", &detail(20))
            .with("https://catalog.example.com/view/charlie/", &detail(30))
            .with("https://catalog.example.com/view/delta/", &detail(40))
    }

    fn ids(records: &[AssessmentRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_listing_url_sets_start_and_type() {
        let base = Url::parse("https://x.com/catalog/?start=99&type=2&lang=en").unwrap();
        assert_eq!(
            listing_url(&base, SolutionType::Individual, 24),
            "https://x.com/catalog/?lang=en&start=24&type=1"
        );
    }

    #[tokio::test]
    async fn test_full_crawl_visits_both_sections() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = CatalogStore::new(dir.path().join("catalog.json"));
        let cursors = CursorStore::new(dir.path().join("cursor.json"));
        let pages = catalog_pages();

        let report = run_crawl(&pages, settings(), &catalog, &cursors, CrawlOptions::default())
            .await
            .unwrap();

        assert!(report.finished);
        assert!(!report.resumed);
        let records = catalog.load().unwrap();
        assert_eq!(ids(&records), vec!["alpha", "bravo", "charlie", "delta"]);
        assert_eq!(records[2].duration, Some(30));
        assert_eq!(records[3].solution_type, SolutionType::Prepackaged);
        assert!(records.iter().all(|r| r.remote_testing && r.description == "About it."));
    }

    #[tokio::test]
    async fn test_interrupted_crawl_resumes_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = CatalogStore::new(dir.path().join("catalog.json"));
        let cursors = CursorStore::new(dir.path().join("cursor.json"));
        let pages = catalog_pages();

        let first = run_crawl(
            &pages,
            settings(),
            &catalog,
            &cursors,
            CrawlOptions {
                page_budget: Some(1),
                ..CrawlOptions::default()
            },
        )
        .await
        .unwrap();
        assert!(!first.finished);
        let partial = catalog.load().unwrap();
        assert_eq!(ids(&partial), vec!["alpha", "bravo"]);
        assert_eq!(cursors.load().unwrap().unwrap().next_start, 12);

        let before = pages.requested.lock().unwrap().len();
        let second = run_crawl(&pages, settings(), &catalog, &cursors, CrawlOptions::default())
            .await
            .unwrap();
        assert!(second.resumed);
        assert!(second.finished);

        // the first listing page is not fetched again
        let requested = pages.requested.lock().unwrap();
        assert!(!requested[before..].contains(&url(SolutionType::Individual, 0)));

        let full = catalog.load().unwrap();
        let unique: HashSet<&str> = full.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(unique.len(), full.len());
        for r in &partial {
            assert!(unique.contains(r.id.as_str()));
        }
        assert_eq!(full.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_listing_page_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = CatalogStore::new(dir.path().join("catalog.json"));
        let cursors = CursorStore::new(dir.path().join("cursor.json"));
        let pages = catalog_pages();
        pages.fail(&url(SolutionType::Individual, 0));

        let report = run_crawl(&pages, settings(), &catalog, &cursors, CrawlOptions::default())
            .await
            .unwrap();

        assert!(report.finished);
        assert_eq!(report.failed_pages, vec![url(SolutionType::Individual, 0)]);
        let records = catalog.load().unwrap();
        assert_eq!(ids(&records), vec!["bravo", "charlie", "delta"]);
    }

    #[tokio::test]
    async fn test_consecutive_failures_end_section() {
        let pages = catalog_pages();
        pages.fail(&url(SolutionType::Individual, 0));
        pages.fail(&url(SolutionType::Individual, 12));

        let mut crawler = CatalogCrawler::new(&pages, settings(), CrawlCursor::start());
        assert!(crawler.next_page().await.unwrap().failed);
        assert!(crawler.next_page().await.unwrap().failed);
        assert_eq!(crawler.cursor().solution_type, SolutionType::Prepackaged);

        let page = crawler.next_page().await.unwrap();
        assert_eq!(ids(&page.records), vec!["delta"]);
        assert!(crawler.next_page().await.is_none());
    }

    #[tokio::test]
    async fn test_detail_failure_keeps_listing_record() {
        let pages = catalog_pages();
        pages.fail("https://catalog.example.com/view/alpha/");

        let mut crawler = CatalogCrawler::new(&pages, settings(), CrawlCursor::start());
        let page = crawler.next_page().await.unwrap();
        let alpha = &page.records[0];
        assert_eq!(alpha.id, "alpha");
        assert_eq!(alpha.duration, None);
        assert!(alpha.description.is_empty());
        assert_eq!(page.records[1].duration, Some(20));
    }

    #[tokio::test]
    async fn test_restart_ignores_saved_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = CatalogStore::new(dir.path().join("catalog.json"));
        let cursors = CursorStore::new(dir.path().join("cursor.json"));
        let pages = catalog_pages();

        let mut cursor = CrawlCursor::start();
        cursor.solution_type = SolutionType::Prepackaged;
        cursors.save(&cursor).unwrap();

        let report = run_crawl(
            &pages,
            settings(),
            &catalog,
            &cursors,
            CrawlOptions {
                restart: true,
                ..CrawlOptions::default()
            },
        )
        .await
        .unwrap();
        assert!(!report.resumed);
        assert_eq!(report.total_records, 4);
    }
}
