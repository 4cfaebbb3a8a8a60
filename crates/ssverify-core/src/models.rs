use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;

/// `kind` of stored documents that represent active listings.
pub const AD_KIND: &str = "ad";

/// A JSON document as kept by the listing store.
pub type Document = serde_json::Map<String, Value>;

/// Ordered nodes produced by parsing one page (or several, concatenated).
pub type TagStream = Vec<Node>;

/// A single tag attribute. Valueless attributes carry an empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One whitelisted tag occurrence with its attributes and trailing text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub tag: String,
    pub attributes: Vec<Attribute>,
    pub text: Option<String>,
}

impl Node {
    pub fn new(tag: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            tag: tag.into(),
            attributes,
            text: None,
        }
    }

    /// Value of the first attribute with the given name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Value of the first attribute, whatever its name.
    pub fn first_attr_value(&self) -> Option<&str> {
        self.attributes.first().map(|a| a.value.as_str())
    }
}

/// Raw HTTP response as returned by a [`Fetcher`](crate::traits::Fetcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

/// Fields shared by every listing variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFields {
    pub url: String,
    pub address: String,
    pub m2: String,
    pub level: String,
    /// Serialized as `type`.
    pub listing_type: String,
    pub price_m2: String,
    pub price: String,
    /// Extraction timestamp, not present in the source markup.
    pub date: DateTime<Utc>,
}

/// A listing assembled from one flushed item buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingRecord {
    /// Six-value row: no room count, type comes from configuration.
    House(ListingFields),
    /// Eight-value row with explicit rooms and type.
    Apartment { rooms: String, fields: ListingFields },
}

impl ListingRecord {
    /// Build a record from a raw item buffer.
    ///
    /// The first value is the listing path, joined onto `base_url`.
    /// Six values give a [`ListingRecord::House`] typed with `house_marker`,
    /// eight give a [`ListingRecord::Apartment`]. Anything else is rejected.
    pub fn from_buffer(
        values: Vec<String>,
        base_url: &str,
        house_marker: &str,
        date: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let len = values.len();
        let mut it = values.into_iter();
        let mut next = || it.next().unwrap_or_default();

        match len {
            6 => {
                let url = format!("{base_url}{}", next());
                Ok(ListingRecord::House(ListingFields {
                    url,
                    address: next(),
                    m2: next(),
                    level: next(),
                    listing_type: house_marker.to_string(),
                    price_m2: next(),
                    price: next(),
                    date,
                }))
            }
            8 => {
                let url = format!("{base_url}{}", next());
                let address = next();
                let rooms = next();
                Ok(ListingRecord::Apartment {
                    rooms,
                    fields: ListingFields {
                        url,
                        address,
                        m2: next(),
                        level: next(),
                        listing_type: next(),
                        price_m2: next(),
                        price: next(),
                        date,
                    },
                })
            }
            len => Err(AppError::RecordBuild { len }),
        }
    }

    pub fn fields(&self) -> &ListingFields {
        match self {
            ListingRecord::House(fields) => fields,
            ListingRecord::Apartment { fields, .. } => fields,
        }
    }

    pub fn url(&self) -> &str {
        &self.fields().url
    }

    pub fn address(&self) -> &str {
        &self.fields().address
    }

    pub fn rooms(&self) -> Option<&str> {
        match self {
            ListingRecord::House(_) => None,
            ListingRecord::Apartment { rooms, .. } => Some(rooms),
        }
    }

    /// Look up a field by its document name.
    pub fn field(&self, name: &str) -> Option<Value> {
        let f = self.fields();
        let value = match name {
            "url" => &f.url,
            "address" => &f.address,
            "m2" => &f.m2,
            "level" => &f.level,
            "type" => &f.listing_type,
            "price_m2" => &f.price_m2,
            "price" => &f.price,
            "rooms" => return self.rooms().map(|r| Value::String(r.to_string())),
            "date" => return Some(Value::String(format_date(&f.date))),
            _ => return None,
        };
        Some(Value::String(value.clone()))
    }

    /// Document form used when the record is persisted as a new listing.
    pub fn to_document(&self) -> Document {
        let f = self.fields();
        let mut doc = Document::new();
        doc.insert("url".into(), f.url.clone().into());
        doc.insert("address".into(), f.address.clone().into());
        if let Some(rooms) = self.rooms() {
            doc.insert("rooms".into(), rooms.into());
        }
        doc.insert("m2".into(), f.m2.clone().into());
        doc.insert("level".into(), f.level.clone().into());
        doc.insert("type".into(), f.listing_type.clone().into());
        doc.insert("price_m2".into(), f.price_m2.clone().into());
        doc.insert("price".into(), f.price.clone().into());
        doc.insert("date".into(), format_date(&f.date).into());
        doc
    }
}

impl std::fmt::Display for ListingRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields = self.fields();
        write!(f, "{} ", fields.url)?;
        if let Some(rooms) = self.rooms() {
            write!(f, "rooms={rooms} ")?;
        }
        write!(
            f,
            "m2={} level={} type={} price_m2={} price={}",
            fields.m2, fields.level, fields.listing_type, fields.price_m2, fields.price
        )
    }
}

/// Timestamps are stored as RFC 3339 strings with millisecond precision.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Listing records grouped by exact address string.
///
/// Records keep their insertion order within a bucket. Buckets iterate in
/// address order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressIndex {
    buckets: BTreeMap<String, Vec<ListingRecord>>,
}

impl AddressIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ListingRecord) {
        self.buckets
            .entry(record.address().to_string())
            .or_default()
            .push(record);
    }

    pub fn get(&self, address: &str) -> Option<&[ListingRecord]> {
        self.buckets.get(address).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ListingRecord])> {
        self.buckets
            .iter()
            .map(|(address, records)| (address.as_str(), records.as_slice()))
    }

    pub fn records(&self) -> impl Iterator<Item = &ListingRecord> {
        self.buckets.values().flatten()
    }

    /// First record whose url and address both match, scanning every bucket.
    pub fn find(&self, url: &str, address: &str) -> Option<&ListingRecord> {
        self.records()
            .find(|r| r.url() == url && r.address() == address)
    }

    /// Number of records across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// A document read back from the listing store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: Uuid,
    pub kind: String,
    pub doc: Document,
}

impl StoredRecord {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.doc.get(name)
    }

    pub fn url(&self) -> Option<&str> {
        self.doc.get("url").and_then(Value::as_str)
    }

    pub fn address(&self) -> Option<&str> {
        self.doc.get("address").and_then(Value::as_str)
    }
}

/// A document to insert into the listing store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub kind: String,
    pub doc: Document,
}

impl NewDocument {
    pub fn listing(record: &ListingRecord) -> Self {
        Self {
            kind: AD_KIND.to_string(),
            doc: record.to_document(),
        }
    }
}

/// Selector for store lookups and updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Kind(String),
    Id(Uuid),
}
