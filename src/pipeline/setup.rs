// src/pipeline/setup.rs

//! Binding the settings to a task list.

use crate::error::Result;
use crate::models::TaskList;
use crate::services::TaskSink;
use crate::settings::{Settings, TaskSettings};

/// Find a task list by exact title, creating it when absent.
pub async fn ensure_task_list(sink: &dyn TaskSink, name: &str) -> Result<TaskList> {
    let lists = sink.list_task_lists().await?;
    if let Some(existing) = lists.into_iter().find(|list| list.title == name) {
        log::info!("Using existing task list '{}' ({})", existing.title, existing.id);
        return Ok(existing);
    }

    let created = sink.create_task_list(name).await?;
    log::info!("Created task list '{}' ({})", created.title, created.id);
    Ok(created)
}

/// Store task settings and bind the list named in them.
pub async fn setup_tasks(
    sink: &dyn TaskSink,
    settings: &mut Settings,
    tasks: &TaskSettings,
) -> Result<TaskList> {
    settings.save_tasks(tasks)?;
    let list = ensure_task_list(sink, &tasks.task_list_name).await?;
    settings.set_task_list_id(&list.id)?;
    Ok(list)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::services::testing::MemorySink;
    use crate::settings::{CLEANUP_DAYS, TRIGGER_HOUR};

    fn tasks(name: &str) -> TaskSettings {
        TaskSettings {
            task_list_name: name.into(),
            trigger_hour: 7,
            cleanup_days: 14,
        }
    }

    #[tokio::test]
    async fn test_existing_list_is_reused() {
        let sink = MemorySink::new()
            .with_list("L9", "Other")
            .with_list("L1", "大学課題");

        let list = ensure_task_list(&sink, "大学課題").await.unwrap();
        assert_eq!(list.id, "L1");
        assert_eq!(sink.lists().len(), 2);
    }

    #[tokio::test]
    async fn test_setup_creates_list_and_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        let sink = MemorySink::new();
        let mut settings = Settings::load(&path).unwrap();

        let list = setup_tasks(&sink, &mut settings, &tasks("Homework")).await.unwrap();
        assert_eq!(list.title, "Homework");

        let reloaded = Settings::load(&path).unwrap();
        assert_eq!(reloaded.task_list_id(), Some(list.id));
        assert_eq!(reloaded.get_setting(TRIGGER_HOUR).as_deref(), Some("7"));
        assert_eq!(reloaded.get_setting(CLEANUP_DAYS).as_deref(), Some("14"));
    }

    #[tokio::test]
    async fn test_invalid_settings_touch_nothing() {
        let sink = MemorySink::new();
        let mut settings = Settings::in_memory();
        let mut bad = tasks("Homework");
        bad.trigger_hour = 30;

        assert!(setup_tasks(&sink, &mut settings, &bad).await.is_err());
        assert!(sink.lists().is_empty());
        assert_eq!(settings.task_list_id(), None);
    }
}
