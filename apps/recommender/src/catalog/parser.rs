//! HTML extraction for catalog listing and product detail pages.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::models::assessment::{slug_from_url, AssessmentRecord, SolutionType};
use crate::models::test_type::TestType;

/// CSS selectors for the catalog markup.
struct CatalogSelectors {
    row: Selector,
    title_link: Selector,
    general_cell: Selector,
    yes_marker: Selector,
    key: Selector,
    detail_row: Selector,
    detail_heading: Selector,
    detail_paragraph: Selector,
}

impl CatalogSelectors {
    fn get() -> &'static Self {
        static SELECTORS: OnceLock<CatalogSelectors> = OnceLock::new();
        SELECTORS.get_or_init(|| Self {
            row: Selector::parse("tr").expect("row selector"),
            title_link: Selector::parse("td.custom__table-heading__title a[href]")
                .expect("title selector"),
            general_cell: Selector::parse("td.custom__table-heading__general")
                .expect("general cell selector"),
            yes_marker: Selector::parse(".catalogue__circle.-yes").expect("yes selector"),
            key: Selector::parse(".product-catalogue__key").expect("key selector"),
            detail_row: Selector::parse(".product-catalogue-training-calendar__row")
                .expect("detail row selector"),
            detail_heading: Selector::parse("h4").expect("heading selector"),
            detail_paragraph: Selector::parse("p").expect("paragraph selector"),
        })
    }
}

fn completion_time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)completion\s+time\s+in\s+minutes\s*=\s*(?:max\s*)?(\d+)")
            .expect("completion time regex")
    })
}

fn first_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)").expect("number regex"))
}

/// Product fields available from a listing page row.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingItem {
    pub id: String,
    pub name: String,
    pub url: String,
    pub remote_testing: bool,
    pub adaptive_support: bool,
    pub test_types: BTreeSet<String>,
}

impl ListingItem {
    /// Combines listing fields with whatever the detail page yielded.
    pub fn into_record(self, detail: ProductDetail, solution_type: SolutionType) -> AssessmentRecord {
        AssessmentRecord {
            id: self.id,
            name: self.name,
            url: self.url,
            description: detail.description,
            remote_testing: self.remote_testing,
            adaptive_support: self.adaptive_support,
            duration: detail.duration,
            test_types: self.test_types,
            solution_type,
        }
    }
}

/// Fields only present on a product's own page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductDetail {
    pub description: String,
    pub duration: Option<u32>,
}

/// Parses every product row of a listing page. Header rows and rows without a product link
/// are ignored; relative links are resolved against `page_url`.
pub fn parse_listing_page(html: &str, page_url: &Url) -> Vec<ListingItem> {
    let selectors = CatalogSelectors::get();
    let document = Html::parse_document(html);

    document
        .select(&selectors.row)
        .filter_map(|row| parse_listing_row(row, page_url, selectors))
        .collect()
}

fn parse_listing_row(
    row: ElementRef<'_>,
    page_url: &Url,
    selectors: &CatalogSelectors,
) -> Option<ListingItem> {
    let link = row.select(&selectors.title_link).next()?;
    let href = link.value().attr("href")?;
    let url = page_url.join(href).ok()?.to_string();
    let id = slug_from_url(&url)?;
    let name = collapse_whitespace(&link.text().collect::<String>());
    if name.is_empty() {
        return None;
    }

    // General cells are, in order: remote testing, adaptive/IRT, test type keys.
    let cells: Vec<ElementRef<'_>> = row.select(&selectors.general_cell).collect();
    let has_yes = |idx: usize| {
        cells
            .get(idx)
            .map(|cell| cell.select(&selectors.yes_marker).next().is_some())
            .unwrap_or(false)
    };

    let test_types = row
        .select(&selectors.key)
        .flat_map(|key| key.text().collect::<String>().chars().collect::<Vec<_>>())
        .filter_map(TestType::from_code)
        .map(|t| t.label().to_string())
        .collect();

    Some(ListingItem {
        id,
        name,
        url,
        remote_testing: has_yes(0),
        adaptive_support: has_yes(1),
        test_types,
    })
}

/// Parses a product page for its description and approximate completion time.
pub fn parse_detail_page(html: &str) -> ProductDetail {
    let selectors = CatalogSelectors::get();
    let document = Html::parse_document(html);

    let mut detail = ProductDetail::default();
    for row in document.select(&selectors.detail_row) {
        let heading = row
            .select(&selectors.detail_heading)
            .next()
            .map(|h| collapse_whitespace(&h.text().collect::<String>()))
            .unwrap_or_default();
        let body = row
            .select(&selectors.detail_paragraph)
            .map(|p| collapse_whitespace(&p.text().collect::<String>()))
            .collect::<Vec<_>>()
            .join(" ");

        match heading.to_lowercase().as_str() {
            "description" if detail.description.is_empty() => detail.description = body,
            "assessment length" if detail.duration.is_none() => {
                detail.duration = parse_duration_minutes(&body);
            }
            _ => {}
        }
    }

    if detail.duration.is_none() {
        let text = collapse_whitespace(&document.root_element().text().collect::<String>());
        detail.duration = completion_time_pattern()
            .captures(&text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());
    }
    detail
}

/// Parses "Approximate Completion Time in minutes = 49" (or any text holding a number)
/// into minutes. Returns `None` when no number is present, e.g. "Untimed".
pub fn parse_duration_minutes(text: &str) -> Option<u32> {
    completion_time_pattern()
        .captures(text)
        .or_else(|| first_number_pattern().captures(text))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
