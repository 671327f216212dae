//! Structural extraction from html pages.
//!
//! A [`TableRule`] describes "the first column of the table that belongs to
//! the header saying X". Unlike image matching this is multi-valued: every
//! matching cell is returned.

use std::collections::BTreeSet;

use log::warn;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableRule {
    /// Css selector of the header candidates
    pub header: String,
    /// Text the header must contain
    pub header_contains: String,
    /// How many levels to go up from the header to the element holding the table
    pub ancestor_levels: usize,
    /// Css selector of the table inside that element, the first one is used
    pub table: String,
    /// Css selector of the cells inside the table
    pub cells: String,
}

impl Default for TableRule {
    fn default() -> Self {
        Self {
            header: "div.card-header h5".to_string(),
            header_contains: "Active Codes".to_string(),
            ancestor_levels: 2,
            table: "div.card-body table".to_string(),
            cells: "tbody tr td:first-child".to_string(),
        }
    }
}

fn parse_selector(selector: &str) -> anyhow::Result<Selector> {
    Selector::parse(selector).map_err(|err| anyhow::anyhow!("invalid selector {selector:?}: {err}"))
}

impl TableRule {
    /// Check the selectors once, up front
    pub fn compile(&self) -> anyhow::Result<TableExtractor> {
        Ok(TableExtractor {
            header: parse_selector(&self.header)?,
            header_contains: self.header_contains.clone(),
            ancestor_levels: self.ancestor_levels,
            table: parse_selector(&self.table)?,
            cells: parse_selector(&self.cells)?,
        })
    }
}

/// A compiled [`TableRule`]
#[derive(Debug, Clone)]
pub struct TableExtractor {
    header: Selector,
    header_contains: String,
    ancestor_levels: usize,
    table: Selector,
    cells: Selector,
}

impl TableExtractor {
    /// All non-empty, trimmed cell texts.
    ///
    /// A page without the header or the table yields an empty set (and a
    /// warning), the same as a page that lists nothing.
    pub fn extract(&self, document: &Html) -> BTreeSet<String> {
        let Some(header) = document.select(&self.header).find(|header| {
            header
                .text()
                .collect::<String>()
                .contains(&self.header_contains)
        }) else {
            warn!(
                "[TableExtractor]: could not find a header containing {:?}",
                self.header_contains
            );
            return BTreeSet::new();
        };

        let mut container = *header;
        for _ in 0..self.ancestor_levels {
            match container.parent() {
                Some(parent) => container = parent,
                None => {
                    warn!("[TableExtractor]: header has less than {} ancestors", self.ancestor_levels);
                    return BTreeSet::new();
                }
            }
        }
        let Some(table) = ElementRef::wrap(container).and_then(|c| c.select(&self.table).next())
        else {
            warn!("[TableExtractor]: could not find the table");
            return BTreeSet::new();
        };

        table
            .select(&self.cells)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .filter(|text| !text.is_empty())
            .collect()
    }
}
