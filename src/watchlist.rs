// 📋 Watch-list Loader
// Reads the monitored companies from a delimited export of the registry spreadsheet.
//
// Upstream exports are inconsistent about header names, so each field accepts
// a small set of synonyms. The first synonym present in the header row wins.

use crate::disclosure::DisclosureRecord;
use crate::error::{MonitorError, Result};
use crate::registry::{normalize_company_name, CompanyRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ============================================================================
// HEADER SYNONYMS
// ============================================================================

pub const INDUSTRY_HEADERS: &[&str] = &["업종명", "업종", "업태", "industry"];
pub const NAME_HEADERS: &[&str] = &["법인명", "회사명", "상호", "기업명", "공시회사명", "corp_name", "name"];
pub const CODE_HEADERS: &[&str] = &["고유번호", "기업코드", "법인등록번호", "corp_code"];
pub const BUSINESS_ID_HEADERS: &[&str] = &["사업자등록번호", "사업자번호", "business_number"];

/// DART registry codes are 8 digits
const REGISTRY_CODE_WIDTH: usize = 8;

// ============================================================================
// WATCHED ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedEntity {
    pub display_name: String,
    pub registry_code: Option<String>,
    pub business_registration_id: Option<String>,
}

impl WatchedEntity {
    pub fn new(display_name: &str, registry_code: Option<&str>) -> Self {
        WatchedEntity {
            display_name: display_name.to_string(),
            registry_code: registry_code.map(String::from),
            business_registration_id: None,
        }
    }

    /// Registry code, or the normalized display name when the code is unknown
    pub fn identity_key(&self) -> String {
        match &self.registry_code {
            Some(code) => code.clone(),
            None => format!("name:{}", normalize_company_name(&self.display_name)),
        }
    }
}

/// Trim, drop a spreadsheet float suffix and left-pad numeric codes to 8 digits
pub fn normalize_registry_code(raw: &str) -> Option<String> {
    let mut code = raw.trim();
    if let Some(stripped) = code.strip_suffix(".0") {
        code = stripped;
    }
    if code.is_empty() {
        return None;
    }

    if code.len() < REGISTRY_CODE_WIDTH && code.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("{:0>width$}", code, width = REGISTRY_CODE_WIDTH))
    } else {
        Some(code.to_string())
    }
}

// ============================================================================
// WATCH LIST
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct WatchList {
    entities: Vec<WatchedEntity>,
}

impl WatchList {
    /// Deduplicates by identity key, keeping the first occurrence
    pub fn from_entities(entities: Vec<WatchedEntity>) -> Self {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(entities.len());

        for entity in entities {
            if seen.insert(entity.identity_key()) {
                unique.push(entity);
            } else {
                debug!(entity = %entity.display_name, "Duplicate watch-list entry skipped");
            }
        }

        WatchList { entities: unique }
    }

    pub fn entities(&self) -> &[WatchedEntity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities still keyed by name only
    pub fn unresolved_count(&self) -> usize {
        self.entities
            .iter()
            .filter(|e| e.registry_code.is_none())
            .count()
    }

    /// Fill in missing registry codes by name. Returns how many were resolved.
    pub fn resolve_codes(&mut self, registry: &CompanyRegistry) -> usize {
        let mut resolved = 0;

        for entity in self.entities.iter_mut().filter(|e| e.registry_code.is_none()) {
            if let Some(entry) = registry.find_by_name(&entity.display_name) {
                entity.registry_code = Some(entry.corp_code.clone());
                resolved += 1;
            }
        }

        // Two names may resolve to the same code
        *self = WatchList::from_entities(std::mem::take(&mut self.entities));
        resolved
    }

    /// Whether a record belongs to a watched entity, by code or by normalized name
    pub fn matches(&self, record: &DisclosureRecord) -> bool {
        let record_name = normalize_company_name(&record.entity_name);

        self.entities.iter().any(|e| match &e.registry_code {
            Some(code) => *code == record.entity_code,
            None => normalize_company_name(&e.display_name) == record_name,
        })
    }
}

// ============================================================================
// LOADER
// ============================================================================

#[derive(Debug, Clone)]
pub struct WatchListLoader {
    path: PathBuf,
    industry: Option<String>,
}

impl WatchListLoader {
    pub fn new<P: AsRef<Path>>(path: P, industry: Option<String>) -> Self {
        WatchListLoader {
            path: path.as_ref().to_path_buf(),
            industry,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<WatchList> {
        if !self.path.exists() {
            return Err(MonitorError::Configuration(format!(
                "Watch-list file not found: {}",
                self.path.display()
            )));
        }

        let file = std::fs::File::open(&self.path).map_err(|e| {
            MonitorError::Configuration(format!(
                "Failed to open watch-list {}: {}",
                self.path.display(),
                e
            ))
        })?;

        info!(path = %self.path.display(), "Loading watch-list");
        self.load_from_reader(file)
    }

    pub fn load_from_reader<R: Read>(&self, reader: R) -> Result<WatchList> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| MonitorError::Configuration(format!("Unreadable watch-list header: {}", e)))?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();

        let find = |candidates: &[&str]| -> Option<usize> {
            candidates
                .iter()
                .find_map(|c| headers.iter().position(|h| h == c))
        };

        let name_col = find(NAME_HEADERS).ok_or_else(|| {
            MonitorError::Configuration(format!(
                "Watch-list has no company name column (expected one of {:?})",
                NAME_HEADERS
            ))
        })?;
        let code_col = find(CODE_HEADERS);
        let business_col = find(BUSINESS_ID_HEADERS);

        let industry_filter = match &self.industry {
            Some(label) => {
                let col = find(INDUSTRY_HEADERS).ok_or_else(|| {
                    MonitorError::Configuration(format!(
                        "Industry filter '{}' set but watch-list has no industry column (expected one of {:?})",
                        label, INDUSTRY_HEADERS
                    ))
                })?;
                Some((col, label.trim().to_string()))
            }
            None => None,
        };

        if code_col.is_none() {
            warn!("Watch-list has no registry code column; entities will be matched by name");
        }

        let cell = |record: &csv::StringRecord, col: Option<usize>| -> Option<String> {
            col.and_then(|c| record.get(c))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut entities = Vec::new();
        let mut rows = 0usize;

        for result in rdr.records() {
            let record = result.map_err(|e| {
                MonitorError::Configuration(format!("Malformed watch-list row: {}", e))
            })?;
            rows += 1;

            if let Some((col, label)) = &industry_filter {
                if cell(&record, Some(*col)).as_deref() != Some(label.as_str()) {
                    continue;
                }
            }

            let Some(display_name) = cell(&record, Some(name_col)) else {
                continue;
            };

            entities.push(WatchedEntity {
                display_name,
                registry_code: cell(&record, code_col).and_then(|c| normalize_registry_code(&c)),
                business_registration_id: cell(&record, business_col),
            });
        }

        let watch_list = WatchList::from_entities(entities);
        info!(
            rows,
            watched = watch_list.len(),
            unresolved = watch_list.unresolved_count(),
            "Watch-list loaded"
        );

        Ok(watch_list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryEntry;

    fn create_test_record(code: &str, name: &str) -> DisclosureRecord {
        DisclosureRecord {
            entity_code: code.to_string(),
            entity_name: name.to_string(),
            ticker_code: None,
            report_title: "감사보고서 (2024.12)".to_string(),
            receipt_id: "20250301000001".to_string(),
            submitter_name: "회계법인".to_string(),
            receipt_date: "20250301".to_string(),
            remark: String::new(),
        }
    }

    #[test]
    fn test_header_synonyms_and_padding() {
        let csv = "상호,고유번호,사업자번호\n가나골프,434003,123-45-67890\n다라컨트리클럽,00512345.0,\n";
        let loader = WatchListLoader::new("unused.csv", None);

        let list = loader.load_from_reader(csv.as_bytes()).unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list.entities()[0].registry_code.as_deref(), Some("00434003"));
        assert_eq!(
            list.entities()[0].business_registration_id.as_deref(),
            Some("123-45-67890")
        );
        assert_eq!(list.entities()[1].registry_code.as_deref(), Some("00512345"));
        assert!(list.entities()[1].business_registration_id.is_none());
    }

    #[test]
    fn test_industry_filter() {
        let csv = "업종명,법인명,고유번호\n골프장 운영업,가나골프,00434003\n스키장 운영업,마바스키,00434004\n골프장 운영업,사아골프,00434005\n";
        let loader = WatchListLoader::new("unused.csv", Some("골프장 운영업".to_string()));

        let list = loader.load_from_reader(csv.as_bytes()).unwrap();

        let names: Vec<&str> = list.entities().iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, vec!["가나골프", "사아골프"]);
    }

    #[test]
    fn test_duplicates_keep_first() {
        let csv = "corp_name,corp_code\n가나골프,00434003\n가나골프 (중복),00434003\n다라골프,00434004\n";
        let loader = WatchListLoader::new("unused.csv", None);

        let list = loader.load_from_reader(csv.as_bytes()).unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list.entities()[0].display_name, "가나골프");
    }

    #[test]
    fn test_missing_name_column_is_configuration_error() {
        let csv = "고유번호,사업자번호\n00434003,123\n";
        let loader = WatchListLoader::new("unused.csv", None);

        let err = loader.load_from_reader(csv.as_bytes()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_industry_column_is_configuration_error() {
        let csv = "법인명,고유번호\n가나골프,00434003\n";
        let loader = WatchListLoader::new("unused.csv", Some("골프장 운영업".to_string()));

        let err = loader.load_from_reader(csv.as_bytes()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let loader = WatchListLoader::new("/nonexistent/companies.csv", None);
        assert!(loader.load().unwrap_err().is_configuration());
    }

    #[test]
    fn test_name_only_entities_resolve_through_registry() {
        let csv = "회사명\n(주)가나골프\n다라골프\n";
        let loader = WatchListLoader::new("unused.csv", None);
        let mut list = loader.load_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(list.unresolved_count(), 2);

        let registry = CompanyRegistry::from_entries(vec![RegistryEntry {
            corp_code: "00434003".to_string(),
            corp_name: "가나골프".to_string(),
            stock_code: None,
            modify_date: None,
        }]);

        assert_eq!(list.resolve_codes(&registry), 1);
        assert_eq!(list.unresolved_count(), 1);
        assert_eq!(list.entities()[0].registry_code.as_deref(), Some("00434003"));
    }

    #[test]
    fn test_matches_by_code_or_name() {
        let list = WatchList::from_entities(vec![
            WatchedEntity::new("가나골프", Some("00434003")),
            WatchedEntity::new("다라골프", None),
        ]);

        assert!(list.matches(&create_test_record("00434003", "아무이름")));
        assert!(list.matches(&create_test_record("99999999", "다라골프 주식회사")));
        assert!(!list.matches(&create_test_record("99999999", "마바골프")));
    }
}
