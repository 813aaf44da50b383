// ⏱️ Scheduler - periodic trigger with at most one run in flight

use crate::dart::DisclosureSource;
use crate::runner::Runner;
use crate::stats::RunStatistics;
use crate::telegram::Notifier;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

pub struct Scheduler<S, N> {
    runner: Mutex<Runner<S, N>>,
    interval: Duration,
}

impl<S, N> Scheduler<S, N>
where
    S: DisclosureSource,
    N: Notifier,
{
    pub fn new(runner: Runner<S, N>, interval: Duration) -> Self {
        Scheduler {
            runner: Mutex::new(runner),
            interval,
        }
    }

    pub fn state(&self) -> RunState {
        match self.runner.try_lock() {
            Ok(_) => RunState::Idle,
            Err(_) => RunState::Running,
        }
    }

    /// Run now, unless a run is already in progress (then `None`)
    pub async fn trigger(&self) -> Option<RunStatistics> {
        let Ok(mut runner) = self.runner.try_lock() else {
            info!("Run already in progress, trigger skipped");
            return None;
        };
        Some(runner.run_once().await)
    }

    /// Tick every interval (first tick immediately) until `shutdown` resolves.
    /// An in-flight run always completes before the loop exits.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.trigger().await;
                }
            }
        }
    }

    pub fn into_runner(self) -> Runner<S, N> {
        self.runner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ReportFilter;
    use crate::dart::{DisclosurePage, ListQuery};
    use crate::disclosure::DisclosureRecord;
    use crate::error::Result;
    use crate::registry::CompanyRegistry;
    use crate::runner::RunSettings;
    use crate::store::SqliteStore;
    use crate::watchlist::WatchListLoader;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// Blocks every list call until the gate is opened
    struct GatedSource {
        gate: Arc<Notify>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DisclosureSource for GatedSource {
        async fn list_page(&self, _query: &ListQuery) -> Result<DisclosurePage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(DisclosurePage::empty("013"))
        }

        async fn company_registry(&self) -> Result<CompanyRegistry> {
            Ok(CompanyRegistry::new())
        }
    }

    struct SilentNotifier;

    #[async_trait]
    impl Notifier for SilentNotifier {
        async fn notify(&self, _record: &DisclosureRecord) -> bool {
            true
        }

        async fn notify_summary(&self, _: usize, _: usize, _: &[DisclosureRecord]) -> bool {
            true
        }

        async fn test_connection(&self) -> bool {
            true
        }
    }

    fn create_test_scheduler(
        dir: &tempfile::TempDir,
        gate: Arc<Notify>,
    ) -> Scheduler<GatedSource, SilentNotifier> {
        let path = dir.path().join("companies.csv");
        std::fs::write(&path, "법인명,고유번호\n가나골프,00434003\n").unwrap();

        let settings = RunSettings {
            api_delay: Duration::ZERO,
            send_delay: Duration::ZERO,
            ..RunSettings::default()
        };

        let runner = Runner::new(
            GatedSource {
                gate,
                calls: AtomicUsize::new(0),
            },
            SilentNotifier,
            Box::new(SqliteStore::open_in_memory().unwrap()),
            WatchListLoader::new(&path, None),
            ReportFilter::default(),
            settings,
        );

        Scheduler::new(runner, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_trigger_skipped_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(Notify::new());
        let scheduler = Arc::new(create_test_scheduler(&dir, gate.clone()));

        assert_eq!(scheduler.state(), RunState::Idle);

        let first = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.trigger().await })
        };

        while scheduler.state() == RunState::Idle {
            tokio::task::yield_now().await;
        }

        assert!(scheduler.trigger().await.is_none());

        gate.notify_one();
        let stats = first.await.unwrap().expect("first trigger runs");

        assert_eq!(stats.entities_watched, 1);
        assert_eq!(stats.error_count, 0);
        assert_eq!(scheduler.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(Notify::new());
        gate.notify_one();
        let scheduler = create_test_scheduler(&dir, gate);

        // Shutdown fires after the immediate first tick has run
        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
        };
        scheduler.run_until(shutdown).await;

        let runner = scheduler.into_runner();
        assert_eq!(runner.source().calls.load(Ordering::SeqCst), 1);
    }
}
