//! Item catalog loading and the on-disk item file format.
//!
//! An item file is a flat sequence of 32-bit little-endian signed integers,
//! read pairwise as `(weight, value)`. Every process reads its own copy once
//! before the protocol starts.

use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// Size of one encoded integer in bytes.
const FIELD_WIDTH: usize = 4;

/// Size of one encoded `(weight, value)` pair in bytes.
const PAIR_WIDTH: usize = 2 * FIELD_WIDTH;

/// Errors raised while decoding an item file.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CatalogError {
    #[error("item file length {len} is not a whole number of (weight, value) pairs")]
    Truncated { len: usize },

    #[error("item {index} has a negative {field}: {raw}")]
    Negative {
        index: usize,
        field: &'static str,
        raw: i32,
    },

    #[error("item spec '{0}' is not of the form WEIGHT:VALUE")]
    InvalidSpec(String),

    #[error("{field} {raw} does not fit the item file format")]
    OutOfRange { field: &'static str, raw: u64 },
}

/// A single reusable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Item {
    pub weight: usize,
    pub value: u64,
}

impl Item {
    pub fn new(weight: usize, value: u64) -> Self {
        Self { weight, value }
    }
}

impl std::str::FromStr for Item {
    type Err = CatalogError;

    /// Parse `WEIGHT:VALUE`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (weight, value) = s
            .split_once(':')
            .ok_or_else(|| CatalogError::InvalidSpec(s.to_string()))?;
        let weight = weight
            .trim()
            .parse()
            .map_err(|_| CatalogError::InvalidSpec(s.to_string()))?;
        let value = value
            .trim()
            .parse()
            .map_err(|_| CatalogError::InvalidSpec(s.to_string()))?;
        Ok(Self { weight, value })
    }
}

/// Items ordered ascending by weight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemCatalog {
    items: Vec<Item>,
}

impl ItemCatalog {
    /// Build a catalog, stable-sorting the items by weight.
    pub fn new(mut items: Vec<Item>) -> Self {
        items.sort_by_key(|item| item.weight);
        Self { items }
    }

    /// Decode an item file's contents.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CatalogError> {
        if bytes.len() % PAIR_WIDTH != 0 {
            return Err(CatalogError::Truncated { len: bytes.len() });
        }

        let mut items = Vec::with_capacity(bytes.len() / PAIR_WIDTH);
        for (index, pair) in bytes.chunks_exact(PAIR_WIDTH).enumerate() {
            let weight = decode_field(&pair[..FIELD_WIDTH], index, "weight")?;
            let value = decode_field(&pair[FIELD_WIDTH..], index, "value")?;
            items.push(Item::new(weight as usize, u64::from(value)));
        }

        Ok(Self::new(items))
    }

    /// Read and decode an item file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let bytes = std::fs::read(path)?;
        let catalog = Self::from_bytes(&bytes)?;
        tracing::debug!(
            path = %path.display(),
            items = catalog.len(),
            lightest = ?catalog.lightest_weight(),
            "Loaded item catalog"
        );
        Ok(catalog)
    }

    /// Encode in the item file format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CatalogError> {
        let mut bytes = Vec::with_capacity(self.items.len() * PAIR_WIDTH);
        for item in &self.items {
            bytes.extend_from_slice(&encode_field(item.weight as u64, "weight")?);
            bytes.extend_from_slice(&encode_field(item.value, "value")?);
        }
        Ok(bytes)
    }

    /// Encode and write to `path`.
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Weight of the lightest item, or `None` for an empty catalog.
    pub fn lightest_weight(&self) -> Option<usize> {
        self.items.first().map(|item| item.weight)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn decode_field(bytes: &[u8], index: usize, field: &'static str) -> Result<u32, CatalogError> {
    let mut raw = [0u8; FIELD_WIDTH];
    raw.copy_from_slice(bytes);
    let raw = i32::from_le_bytes(raw);
    u32::try_from(raw).map_err(|_| CatalogError::Negative { index, field, raw })
}

fn encode_field(value: u64, field: &'static str) -> Result<[u8; FIELD_WIDTH], CatalogError> {
    let narrowed = i32::try_from(value).map_err(|_| CatalogError::OutOfRange { field, raw: value })?;
    Ok(narrowed.to_le_bytes())
}
