// Audit Watch - Core Library
// DART audit-report monitor: fetch, detect new filings, notify, remember what was sent

pub mod error;
pub mod disclosure;
pub mod classifier;     // Report-type keyword filter
pub mod fingerprint;    // Content fingerprints for sources without a stable id
pub mod registry;       // corpCode.xml company registry
pub mod watchlist;      // Monitored companies from CSV
pub mod dart;           // list.json client + fetch orchestration
pub mod store;          // Dedup state: file, JSON or SQLite
pub mod telegram;       // Notifier
pub mod stats;          // RunStatistics + JSONL run log
pub mod config;
pub mod runner;
pub mod scheduler;

// Re-export commonly used types
pub use error::{MonitorError, Result};
pub use disclosure::{DisclosureRecord, DETAIL_URL_BASE};
pub use classifier::{ReportFilter, DEFAULT_KEYWORDS};
pub use fingerprint::{content_fingerprint, normalize_link, normalize_title};
pub use registry::{normalize_company_name, CompanyRegistry, RegistryEntry};
pub use watchlist::{normalize_registry_code, WatchList, WatchListLoader, WatchedEntity};
pub use dart::{
    fetch_all, fetch_watch_list, parse_list_response,
    DartClient, DateRange, DisclosurePage, DisclosureSource, FetchMode, FetchReport, ListQuery,
    BULK_RANGE_LIMIT_DAYS, MAX_PAGE_SIZE,
};
pub use store::{
    AnnouncementStore, FileStore, JsonStore, SqliteStore, StoreBackend, TrackingSet,
};
pub use telegram::{render_disclosure, render_summary, escape_html, Notifier, TelegramClient};
pub use stats::{RunLog, RunStatistics};
pub use config::Config;
pub use runner::{RunSettings, Runner};
pub use scheduler::{RunState, Scheduler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
