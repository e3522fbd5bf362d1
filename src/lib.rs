// src/lib.rs

//! Assignment Sync Library
//!
//! Scrapes a SAML-protected learning portal, reads a course-work API and
//! keeps both in step with a remote task list.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod settings;
pub mod storage;
pub mod utils;
