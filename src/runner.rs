// 🔄 Runner - one full monitoring cycle
//
// watch-list -> fetch -> report filter -> novelty filter -> notify -> mark
//
// A record is marked only after its notification succeeded, so a failed send
// is retried by the next run. Nothing inside a run escapes as an error: faults
// end up in RunStatistics.

use crate::classifier::ReportFilter;
use crate::config::Config;
use crate::dart::{fetch_watch_list, DartClient, DateRange, DisclosureSource, FetchMode, ListQuery};
use crate::disclosure::DisclosureRecord;
use crate::error::Result;
use crate::stats::{RunLog, RunStatistics};
use crate::store::{self, AnnouncementStore};
use crate::telegram::{Notifier, TelegramClient};
use crate::watchlist::WatchListLoader;
use chrono::{Local, NaiveDate};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub fetch_mode: FetchMode,
    pub target_year: Option<i32>,
    pub lookback_days: u32,
    pub retention_days: Option<u32>,
    pub api_delay: Duration,
    pub send_delay: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            fetch_mode: FetchMode::Auto,
            target_year: None,
            lookback_days: 1,
            retention_days: None,
            api_delay: Duration::from_millis(500),
            send_delay: Duration::from_millis(100),
        }
    }
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        RunSettings {
            fetch_mode: config.fetch_mode,
            target_year: config.target_year,
            lookback_days: config.lookback_days,
            retention_days: config.retention_days,
            api_delay: config.api_delay,
            send_delay: config.send_delay,
        }
    }

    pub fn date_range(&self, today: NaiveDate) -> Result<DateRange> {
        match self.target_year {
            Some(year) => DateRange::for_year(year, today),
            None => DateRange::lookback(self.lookback_days, today),
        }
    }
}

pub struct Runner<S, N> {
    source: S,
    notifier: N,
    store: Box<dyn AnnouncementStore>,
    loader: WatchListLoader,
    filter: ReportFilter,
    settings: RunSettings,
    run_log: Option<RunLog>,
    config: Option<Config>,
}

impl Runner<DartClient, TelegramClient> {
    /// Production wiring: DART source, Telegram notifier, configured store
    pub fn from_config(config: Config) -> Result<Self> {
        let source = DartClient::new(&config.dart_base_url, &config.dart_api_key, config.http_timeout)?;
        let notifier = TelegramClient::new(
            &config.telegram_base_url,
            &config.telegram_bot_token,
            &config.telegram_chat_id,
            config.http_timeout,
        )?
        .with_summary_sample(config.summary_sample);

        let store = store::open(config.state_backend, &config.state_path);
        let loader = WatchListLoader::new(&config.watchlist_path, config.target_industry.clone());
        let filter = ReportFilter::new(&config.report_keywords);
        let settings = RunSettings::from_config(&config);
        let run_log = RunLog::new(&config.run_log_path);

        Ok(Runner::new(source, notifier, store, loader, filter, settings)
            .with_run_log(run_log)
            .with_config(config))
    }
}

impl<S, N> Runner<S, N>
where
    S: DisclosureSource,
    N: Notifier,
{
    pub fn new(
        source: S,
        notifier: N,
        store: Box<dyn AnnouncementStore>,
        loader: WatchListLoader,
        filter: ReportFilter,
        settings: RunSettings,
    ) -> Self {
        Runner {
            source,
            notifier,
            store,
            loader,
            filter,
            settings,
            run_log: None,
            config: None,
        }
    }

    pub fn with_run_log(mut self, run_log: RunLog) -> Self {
        self.run_log = Some(run_log);
        self
    }

    /// Attach the configuration re-validated at the start of every run
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn store(&self) -> &dyn AnnouncementStore {
        self.store.as_ref()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Execute one cycle. Never fails: errors are counted in the returned statistics.
    pub async fn run_once(&mut self) -> RunStatistics {
        let mut stats = RunStatistics::start();
        info!(run_id = %stats.run_id, source = %self.source.describe(), "Run started");

        let announced = match self.execute(&mut stats).await {
            Ok(announced) => Some(announced),
            Err(e) => {
                error!(run_id = %stats.run_id, error = %e, "Run aborted");
                stats.record_fault(e.to_string());
                None
            }
        };

        stats.finish();

        if let Some(run_log) = &self.run_log {
            if let Err(e) = run_log.append(&stats) {
                warn!(path = %run_log.path().display(), error = %e, "Failed to append run log");
            }
        }

        info!(
            run_id = %stats.run_id,
            entities = stats.entities_watched,
            fetched = stats.disclosures_fetched,
            audit_reports = stats.audit_reports,
            new = stats.disclosures_new,
            sent = stats.notifications_sent,
            errors = stats.error_count,
            duration_ms = stats.duration_ms().unwrap_or_default(),
            "Run finished"
        );

        // An aborted run has nothing meaningful to summarize
        if let Some(announced) = announced {
            let sent = self
                .notifier
                .notify_summary(stats.entities_watched, stats.notifications_sent, &announced)
                .await;
            if !sent {
                warn!(run_id = %stats.run_id, "Summary notification failed");
            }
        }

        stats
    }

    async fn execute(&mut self, stats: &mut RunStatistics) -> Result<Vec<DisclosureRecord>> {
        if let Some(config) = &self.config {
            config.validate()?;
        }

        let mut watch_list = self.loader.load()?;

        if watch_list.unresolved_count() > 0 {
            match self.source.company_registry().await {
                Ok(registry) => {
                    let resolved = watch_list.resolve_codes(&registry);
                    info!(
                        resolved,
                        unresolved = watch_list.unresolved_count(),
                        "Resolved watch-list names through the company registry"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Company registry unavailable, name-only entities stay unresolved");
                    stats.record_error();
                }
            }
        }

        stats.entities_watched = watch_list.len();
        if watch_list.is_empty() {
            warn!(path = %self.loader.path().display(), "Watch-list is empty, nothing to monitor");
            return Ok(Vec::new());
        }

        if let Some(days) = self.settings.retention_days {
            match self.store.prune_older_than(chrono::Duration::days(days as i64)) {
                Ok(removed) => info!(removed, retention_days = days, "Pruned tracking set"),
                Err(e) => {
                    warn!(error = %e, "Pruning failed");
                    stats.record_error();
                }
            }
        }

        let range = self.settings.date_range(Local::now().date_naive())?;
        let report = fetch_watch_list(
            &self.source,
            &watch_list,
            range,
            self.settings.fetch_mode,
            self.settings.api_delay,
        )
        .await;

        stats.error_count += report.failures.len();
        stats.disclosures_fetched = report.records.len();

        let audit_reports = self.filter.retain_audit_reports(report.records);
        stats.audit_reports = audit_reports.len();

        // The same filing may come back twice within one fetch
        let mut seen = HashSet::new();
        let fresh: Vec<DisclosureRecord> = self
            .store
            .filter_new(&audit_reports)
            .into_iter()
            .filter(|r| seen.insert(r.receipt_id.clone()))
            .collect();
        stats.disclosures_new = fresh.len();

        info!(
            fetched = stats.disclosures_fetched,
            audit_reports = stats.audit_reports,
            new = stats.disclosures_new,
            "Detection complete"
        );

        let mut announced = Vec::with_capacity(fresh.len());

        for (idx, record) in fresh.into_iter().enumerate() {
            if idx > 0 {
                tokio::time::sleep(self.settings.send_delay).await;
            }

            if !self.notifier.notify(&record).await {
                warn!(receipt_id = %record.receipt_id, "Notification failed, left unmarked for the next run");
                stats.record_error();
                continue;
            }
            stats.notifications_sent += 1;

            if let Err(e) = self.store.mark_record(&record) {
                error!(receipt_id = %record.receipt_id, error = %e, "Failed to record announcement");
                stats.record_error();
            }

            announced.push(record);
        }

        Ok(announced)
    }

    /// Check every outside dependency without announcing anything
    pub async fn test_setup(&self) -> bool {
        let mut ok = true;

        if let Some(config) = &self.config {
            if let Err(e) = config.validate() {
                error!(error = %e, "Configuration check failed");
                ok = false;
            }
        }

        match self.loader.load() {
            Ok(watch_list) => info!(
                entities = watch_list.len(),
                unresolved = watch_list.unresolved_count(),
                "Watch-list OK"
            ),
            Err(e) => {
                error!(error = %e, "Watch-list check failed");
                ok = false;
            }
        }

        let today = Local::now().date_naive();
        let check = ListQuery::new(DateRange { start: today, end: today }, None, 1, 1);
        match self.source.list_page(&check).await {
            Ok(page) => info!(status = %page.status, source = %self.source.describe(), "Disclosure source OK"),
            Err(e) => {
                error!(error = %e, "Disclosure source check failed");
                ok = false;
            }
        }

        if self.notifier.test_connection().await {
            info!("Notifier OK");
        } else {
            error!("Notifier check failed");
            ok = false;
        }

        info!(store = %self.store.describe(), tracked = self.store.len(), "State store");
        ok
    }

    /// Forget every announced id. The next run re-announces everything in its window.
    pub fn reset_state(&mut self) -> Result<()> {
        let tracked = self.store.len();
        self.store.reset()?;
        warn!(store = %self.store.describe(), removed = tracked, "State reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_range_prefers_target_year() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();

        let mut settings = RunSettings::default();
        assert_eq!(settings.date_range(today).unwrap().days(), 2);

        settings.lookback_days = u32::MAX;
        assert!(settings.date_range(today).unwrap_err().is_configuration());

        settings.target_year = Some(2025);
        let range = settings.date_range(today).unwrap();
        assert_eq!(range.begin_param(), "20250101");
        assert_eq!(range.end_param(), "20250630");
    }
}
