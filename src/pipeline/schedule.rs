// src/pipeline/schedule.rs

//! Daily trigger.
//!
//! Exactly one cron job is kept. Registering again with the same hour leaves
//! the job alone; a different hour replaces it.

use std::future::Future;

use chrono::Local;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// What registering an hour should do to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPlan {
    Install { hour: u32 },
    Replace { previous: u32, hour: u32 },
    Unchanged,
}

impl TriggerPlan {
    pub fn decide(current: Option<u32>, requested: u32) -> Result<Self> {
        if requested > 23 {
            return Err(AppError::validation(format!(
                "trigger hour {requested} is outside 0-23"
            )));
        }
        Ok(match current {
            None => TriggerPlan::Install { hour: requested },
            Some(hour) if hour == requested => TriggerPlan::Unchanged,
            Some(previous) => TriggerPlan::Replace {
                previous,
                hour: requested,
            },
        })
    }
}

/// Six-field cron expression firing at the top of `hour` every day.
pub fn cron_expression(hour: u32) -> String {
    format!("0 0 {hour} * * *")
}

fn scheduler_error(e: impl std::fmt::Display) -> AppError {
    AppError::Scheduler(e.to_string())
}

/// A single daily job on a local-time cron scheduler.
pub struct DailyTrigger {
    scheduler: JobScheduler,
    current: Option<(Uuid, u32)>,
}

impl DailyTrigger {
    pub async fn new() -> Result<Self> {
        let scheduler = JobScheduler::new().await.map_err(scheduler_error)?;
        Ok(Self {
            scheduler,
            current: None,
        })
    }

    /// Hour of the installed job, if any.
    pub fn hour(&self) -> Option<u32> {
        self.current.map(|(_, hour)| hour)
    }

    /// Install or move the daily job. Returns `false` when nothing changed.
    pub async fn register<F, Fut>(&mut self, hour: u32, task: F) -> Result<bool>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let plan = TriggerPlan::decide(self.hour(), hour)?;
        if plan == TriggerPlan::Unchanged {
            log::debug!("Daily trigger already at {hour}:00");
            return Ok(false);
        }

        if let Some((id, previous)) = self.current.take() {
            self.scheduler.remove(&id).await.map_err(scheduler_error)?;
            log::info!("Removed daily trigger at {previous}:00");
        }

        let job = Job::new_async_tz(cron_expression(hour).as_str(), Local, move |_uuid, _l| {
            Box::pin(task())
        })
        .map_err(scheduler_error)?;
        let id = self.scheduler.add(job).await.map_err(scheduler_error)?;
        self.current = Some((id, hour));

        log::info!("Daily trigger set for {hour}:00 local time");
        Ok(true)
    }

    pub async fn start(&self) -> Result<()> {
        self.scheduler.start().await.map_err(scheduler_error)
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await.map_err(scheduler_error)
    }
}
