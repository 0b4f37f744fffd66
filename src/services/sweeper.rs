//! Expiry sweeper: reclaims copies held by approved requests that were never
//! picked up within the grace period.

use std::sync::Arc;

use chrono::Duration;
use tokio::{sync::oneshot, task::JoinHandle, time::MissedTickBehavior};
use uuid::Uuid;

use crate::{clock::Clock, config::LifecycleConfig, error::AppResult, repository::Repository};

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired requests found
    pub examined: usize,
    /// Requests deleted by this sweep
    pub reclaimed: Vec<Uuid>,
    /// Requests another actor changed first (taken, rejected, or swept)
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ExpirySweeper {
    repository: Repository,
    clock: Arc<dyn Clock>,
    grace: Duration,
}

impl ExpirySweeper {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, config: &LifecycleConfig) -> Self {
        Self {
            repository,
            clock,
            grace: Duration::days(config.reservation_grace_days),
        }
    }

    /// Reclaim every expired reservation once. A failure on one request is
    /// logged and does not stop the others.
    pub async fn sweep(&self) -> AppResult<SweepReport> {
        let cutoff = self.clock.now() - self.grace;
        let expired = self.repository.borrow_requests.list_expired(cutoff).await?;

        let mut report = SweepReport {
            examined: expired.len(),
            ..Default::default()
        };

        for request in expired {
            match self
                .repository
                .borrow_requests
                .delete_if_untaken(request.id, cutoff)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(request_id = %request.id, error = %e, "Failed to expire reservation");
                    report.failed += 1;
                    continue;
                }
            }

            match self.repository.books.restore_copy(request.book_id).await {
                Ok(true) => {}
                Ok(false) => tracing::warn!(
                    request_id = %request.id,
                    book_id = %request.book_id,
                    "Expired reservation had no copy to restore"
                ),
                Err(e) => tracing::error!(
                    request_id = %request.id,
                    book_id = %request.book_id,
                    error = %e,
                    "Failed to restore copy for expired reservation"
                ),
            }

            tracing::info!(
                request_id = %request.id,
                book_id = %request.book_id,
                student_id = %request.student_id,
                approved_date = ?request.approved_date,
                "Expired reservation reclaimed"
            );
            report.reclaimed.push(request.id);
        }

        Ok(report)
    }

    /// Start sweeping every `period` in a background task
    pub fn spawn(self, period: std::time::Duration) -> SweeperHandle {
        // tokio intervals cannot tick every zero seconds
        let period = if period.is_zero() {
            std::time::Duration::from_secs(1)
        } else {
            period
        };
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(period_secs = period.as_secs(), "Expiry sweeper started");
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => match self.sweep().await {
                        Ok(report) if !report.reclaimed.is_empty() || report.failed > 0 => {
                            tracing::info!(
                                examined = report.examined,
                                reclaimed = report.reclaimed.len(),
                                skipped = report.skipped,
                                failed = report.failed,
                                "Expiry sweep finished"
                            );
                        }
                        Ok(_) => tracing::debug!("Expiry sweep found nothing to reclaim"),
                        Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
                    },
                }
            }
            tracing::info!("Expiry sweeper stopped");
        });

        SweeperHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Owner of a running sweeper task
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the task and wait for it to finish its current sweep
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::error!(error = %e, "Expiry sweeper task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
