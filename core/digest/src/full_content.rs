//! Full content listing.
//!
//! When the server has no aggregate for a level it answers with every
//! confirmed element instead. On the wire this is a JSON array of base64
//! strings.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use tracesync_common::{Error, Result};

use crate::difference::Difference;

/// The complete set of elements held by one side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<String>", try_from = "Vec<String>")]
pub struct FullContent {
    items: Vec<Vec<u8>>,
}

impl FullContent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a listing from a set of elements.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self {
            items: items.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, item: Vec<u8>) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[Vec<u8>] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Compare this (remote) listing with the local elements directly.
    pub fn difference<'a, I>(&self, local: I) -> Difference<Vec<u8>>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let remote: HashSet<&[u8]> = self.items.iter().map(|i| i.as_slice()).collect();
        let local: HashSet<&[u8]> = local.into_iter().collect();

        Difference {
            added: remote
                .difference(&local)
                .map(|item| item.to_vec())
                .collect(),
            removed: local
                .difference(&remote)
                .map(|item| item.to_vec())
                .collect(),
        }
    }

    /// Parse a listing from its JSON wire form.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

impl From<FullContent> for Vec<String> {
    fn from(content: FullContent) -> Self {
        content.items.iter().map(|i| STANDARD.encode(i)).collect()
    }
}

impl TryFrom<Vec<String>> for FullContent {
    type Error = Error;

    fn try_from(wire: Vec<String>) -> Result<Self> {
        let items = wire
            .into_iter()
            .map(|s| {
                STANDARD
                    .decode(s)
                    .map_err(|e| Error::Protocol(format!("Invalid listing entry: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { items })
    }
}
