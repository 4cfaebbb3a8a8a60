use chrono::{DateTime, Utc};

use crate::models::{AddressIndex, ListingRecord, Node};

/// A node that carries one value of a listing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// Listing link; carries the `href`.
    Url(String),
    /// Listing cell; carries its text.
    Item(String),
}

/// Recognises listing markers by their attribute classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerMatcher {
    /// `class` of anchors linking to a listing.
    pub url_class: String,
    /// Value of the first attribute of listing cells.
    pub item_class: String,
}

impl MarkerMatcher {
    pub fn new(url_class: impl Into<String>, item_class: impl Into<String>) -> Self {
        Self {
            url_class: url_class.into(),
            item_class: item_class.into(),
        }
    }

    /// Anchors need an `href`, cells need text; otherwise the node is not a marker.
    pub fn classify(&self, node: &Node) -> Option<Marker> {
        match node.tag.as_str() {
            "a" if node.attr("class") == Some(self.url_class.as_str()) => {
                node.attr("href").map(|href| Marker::Url(href.to_string()))
            }
            "td" if node.first_attr_value() == Some(self.item_class.as_str()) => {
                node.text.clone().map(Marker::Item)
            }
            _ => None,
        }
    }
}

/// Turns a tag stream into listing records grouped by address.
///
/// Marker values are buffered in stream order; the first non-marker node
/// after a run of markers flushes the buffer into one record. A buffer left
/// open at the end of the stream is discarded.
#[derive(Debug, Clone)]
pub struct RecordAssembler {
    matcher: MarkerMatcher,
    base_url: String,
    house_marker: String,
}

impl RecordAssembler {
    pub fn new(
        matcher: MarkerMatcher,
        base_url: impl Into<String>,
        house_marker: impl Into<String>,
    ) -> Self {
        Self {
            matcher,
            base_url: base_url.into(),
            house_marker: house_marker.into(),
        }
    }

    pub fn assemble(&self, stream: &[Node]) -> AddressIndex {
        self.assemble_at(stream, Utc::now())
    }

    /// Assemble with an explicit extraction timestamp for every record.
    pub fn assemble_at(&self, stream: &[Node], date: DateTime<Utc>) -> AddressIndex {
        let mut index = AddressIndex::new();
        let mut buffer: Vec<String> = Vec::new();
        let mut dropped = 0usize;

        for node in stream {
            match self.matcher.classify(node) {
                Some(Marker::Url(value) | Marker::Item(value)) => buffer.push(value),
                None if !buffer.is_empty() => {
                    let values = std::mem::take(&mut buffer);
                    match ListingRecord::from_buffer(
                        values,
                        &self.base_url,
                        &self.house_marker,
                        date,
                    ) {
                        Ok(record) => index.insert(record),
                        Err(e) => {
                            dropped += 1;
                            tracing::trace!(error = %e, "Dropped item buffer");
                        }
                    }
                }
                None => {}
            }
        }

        if !buffer.is_empty() {
            tracing::debug!(values = buffer.len(), "Discarding trailing item buffer");
        }
        tracing::debug!(
            records = index.len(),
            addresses = index.bucket_count(),
            dropped,
            "Assembled listings"
        );

        index
    }
}
