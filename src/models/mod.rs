// src/models/mod.rs

//! Domain models for the sync application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod assignment;
mod config;
mod course_work;
mod portal;
mod selectors;
mod task;

// Re-export all public types
pub use assignment::{AssignmentRecord, HEADER, LifecycleFlag, Source};
pub use config::{
    CircuitBreakerSettings, Config, CrawlerConfig, GoogleConfig, PortalConfig, SyncConfig,
};
pub use course_work::{CourseWork, DueDate, DueTime, RemoteCourse};
pub use portal::{CourseContent, CourseLink};
pub use selectors::PortalSelectors;
pub use task::{NewTask, RemoteTask, TaskList, TaskStatus};
