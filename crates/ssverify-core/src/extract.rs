use std::ops::Range;

use futures::stream::{self, StreamExt};

use crate::error::AppError;
use crate::models::{Node, TagStream};
use crate::parser::TagStreamParser;
use crate::traits::Fetcher;

/// Combined output of extracting several sites.
#[derive(Debug, Clone, Default)]
pub struct SitesExtraction {
    pub stream: TagStream,
    pub sites_ok: usize,
    pub sites_failed: usize,
}

/// Fetches a paginated listing site and parses every page into one stream.
///
/// The first page is fetched and parsed, its pagination anchors are read,
/// and the remaining pages are fetched through a bounded pool. Page streams
/// are concatenated in page order regardless of completion order.
#[derive(Clone)]
pub struct SiteExtractor<F: Fetcher> {
    fetcher: F,
    parser: TagStreamParser,
    base_url: String,
    pagination_marker: String,
    concurrency: usize,
}

impl<F: Fetcher> SiteExtractor<F> {
    pub fn new(
        fetcher: F,
        parser: TagStreamParser,
        base_url: impl Into<String>,
        pagination_marker: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            parser,
            base_url: base_url.into(),
            pagination_marker: pagination_marker.into(),
            concurrency: 1,
        }
    }

    /// Maximum number of sub-pages fetched at once (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn fetch_page(&self, url: &str) -> Result<TagStream, AppError> {
        let response = self.fetcher.fetch(url).await?;
        tracing::debug!(%url, bytes = response.body.len(), "Fetched page");
        Ok(self.parser.parse(&response.body))
    }

    /// Extract a single site.
    ///
    /// Fails only when the first page cannot be fetched. A missing or
    /// malformed pagination reference yields the first page alone, and a
    /// failing sub-page is logged and left out.
    pub async fn extract_site(&self, site_url: &str) -> Result<TagStream, AppError> {
        tracing::info!(site = %site_url, "Looking for records");
        let mut combined = self.fetch_page(site_url).await?;

        let links = pagination_links(&combined, &self.pagination_marker);
        let Some(last) = links.into_iter().next() else {
            tracing::debug!(site = %site_url, "No pagination found, single page");
            return Ok(combined);
        };

        let max = match parse_page_count(&last) {
            Ok(max) => max,
            Err(e) => {
                tracing::warn!(site = %site_url, error = %e, "Keeping first page only");
                return Ok(combined);
            }
        };

        let urls: Vec<String> = page_range(max)
            .filter_map(|page| page_reference(&last, page))
            .map(|reference| format!("{}{}", self.base_url, reference))
            .collect();
        tracing::debug!(site = %site_url, max, pages = urls.len(), "Fetching remaining pages");

        let pages: Vec<Option<TagStream>> = stream::iter(urls)
            .map(|url| async move {
                tracing::debug!(%url, "Looking for records in rest of pages");
                match self.fetch_page(&url).await {
                    Ok(page) => Some(page),
                    Err(e) => {
                        tracing::warn!(%url, error = %e, "Dropping page");
                        None
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        for page in pages.into_iter().flatten() {
            combined.extend(page);
        }
        Ok(combined)
    }

    /// Extract every site in order. Failing sites are logged and skipped.
    pub async fn extract_sites(&self, sites: &[String]) -> SitesExtraction {
        let mut out = SitesExtraction::default();
        for site in sites {
            match self.extract_site(site).await {
                Ok(stream) => {
                    out.stream.extend(stream);
                    out.sites_ok += 1;
                }
                Err(e) => {
                    tracing::error!(site = %site, error = %e, "Site extraction failed");
                    out.sites_failed += 1;
                }
            }
        }
        out
    }
}

/// `href`s of anchors whose first attribute value is the pagination marker.
pub fn pagination_links(stream: &[Node], marker: &str) -> Vec<String> {
    stream
        .iter()
        .filter(|n| n.tag == "a" && n.first_attr_value() == Some(marker))
        .filter_map(|n| n.attr("href").map(str::to_string))
        .collect()
}

/// Sub-pages to fetch for a site whose last page is `max`.
///
/// The upper bound is exclusive: page `max` itself is never fetched. This is
/// a known gap kept as is.
pub fn page_range(max: u32) -> Range<u32> {
    2..max
}

/// Splits `.../pageN.ext` into (`.../page`, `N`, `.ext`).
fn split_page_suffix(reference: &str) -> Option<(&str, u32, &str)> {
    let at = reference.rfind("page")? + "page".len();
    let tail = &reference[at..];
    let digits = tail.find('.').unwrap_or(tail.len());
    let number = tail[..digits].parse().ok()?;
    Some((&reference[..at], number, &tail[digits..]))
}

/// Page count encoded in a `...pageN.ext` reference.
pub fn parse_page_count(reference: &str) -> Result<u32, AppError> {
    split_page_suffix(reference)
        .map(|(_, n, _)| n)
        .ok_or_else(|| AppError::PaginationFormat {
            reference: reference.to_string(),
        })
}

/// The reference with its page number replaced by `page`.
pub fn page_reference(reference: &str, page: u32) -> Option<String> {
    split_page_suffix(reference).map(|(head, _, tail)| format!("{head}{page}{tail}"))
}
