//! Business logic services

pub mod auth;
pub mod catalog;
pub mod lifecycle;
pub mod penalty;
pub mod stats;
pub mod students;
pub mod sweeper;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{clock::Clock, config::AppConfig, error::AppResult, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub catalog: catalog::CatalogService,
    pub lifecycle: lifecycle::LifecycleService,
    pub penalty: penalty::PenaltyService,
    pub students: students::StudentService,
    pub stats: stats::StatsService,
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl Services {
    /// Create all services over one repository and one time source
    pub fn new(repository: Repository, config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let penalty = penalty::PenaltyService::new(repository.clone(), config.lifecycle.clone());

        Self {
            auth: auth::AuthService::new(repository.clone(), config.auth.clone()),
            catalog: catalog::CatalogService::new(repository.clone()),
            lifecycle: lifecycle::LifecycleService::new(
                repository.clone(),
                config.lifecycle.clone(),
                clock.clone(),
                penalty.clone(),
            ),
            penalty,
            students: students::StudentService::new(repository.clone(), clock.clone()),
            stats: stats::StatsService::new(repository.clone(), clock.clone()),
            repository,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Expiry sweeper sharing this container's store and clock
    pub fn sweeper(&self, config: &AppConfig) -> sweeper::ExpirySweeper {
        sweeper::ExpirySweeper::new(self.repository.clone(), self.clock.clone(), &config.lifecycle)
    }

    /// Readiness probe on the backing store
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.ping().await
    }
}
