// 🏢 Company Registry - corp_code <-> company lookup
//
// DART publishes every registered company as one XML document inside a zip
// archive (corpCode.xml). The registry is built from it at most once per run
// and passed explicitly to whoever needs name -> code resolution.

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Cursor, Read};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub corp_code: String,
    pub corp_name: String,
    pub stock_code: Option<String>,
    pub modify_date: Option<String>,
}

/// Strips legal-form markers and whitespace so that "(주)가나골프" and "가나 골프 주식회사" match
pub fn normalize_company_name(name: &str) -> String {
    let mut normalized = name.to_string();
    for marker in ["(주)", "㈜", "주식회사", "(유)", "유한회사"] {
        normalized = normalized.replace(marker, "");
    }
    normalized
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

fn child_text(node: roxmltree::Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|c| c.has_tag_name(tag))
        .and_then(|c| c.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[derive(Debug, Clone, Default)]
pub struct CompanyRegistry {
    by_code: HashMap<String, RegistryEntry>,
    /// normalized name -> corp_code (first entry wins)
    by_name: HashMap<String, String>,
}

impl CompanyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<RegistryEntry>) -> Self {
        let mut registry = CompanyRegistry::new();
        for entry in entries {
            registry.register(entry);
        }
        registry
    }

    /// Parse the corpCode.xml document
    pub fn from_xml(xml: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(xml)
            .map_err(|e| MonitorError::Transport(format!("Malformed registry XML: {}", e)))?;

        let mut registry = CompanyRegistry::new();

        for node in doc.descendants().filter(|n| n.has_tag_name("list")) {
            let (Some(corp_code), Some(corp_name)) =
                (child_text(node, "corp_code"), child_text(node, "corp_name"))
            else {
                continue;
            };

            registry.register(RegistryEntry {
                corp_code,
                corp_name,
                stock_code: child_text(node, "stock_code"),
                modify_date: child_text(node, "modify_date"),
            });
        }

        Ok(registry)
    }

    /// Unpack the zip archive served by the corpCode endpoint and parse its XML
    pub fn from_archive(bytes: &[u8]) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| MonitorError::Transport(format!("Malformed registry archive: {}", e)))?;

        if archive.len() == 0 {
            return Err(MonitorError::Transport(
                "Registry archive contains no documents".to_string(),
            ));
        }

        let mut file = archive
            .by_index(0)
            .map_err(|e| MonitorError::Transport(format!("Malformed registry archive: {}", e)))?;

        let mut xml = String::new();
        file.read_to_string(&mut xml)
            .map_err(|e| MonitorError::Transport(format!("Unreadable registry document: {}", e)))?;

        Self::from_xml(&xml)
    }

    pub fn register(&mut self, entry: RegistryEntry) {
        self.by_name
            .entry(normalize_company_name(&entry.corp_name))
            .or_insert_with(|| entry.corp_code.clone());
        self.by_code.insert(entry.corp_code.clone(), entry);
    }

    pub fn get(&self, corp_code: &str) -> Option<&RegistryEntry> {
        self.by_code.get(corp_code)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&RegistryEntry> {
        self.by_name
            .get(&normalize_company_name(name))
            .and_then(|code| self.by_code.get(code))
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}
