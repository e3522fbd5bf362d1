//! In-memory stand-ins for the network collaborators.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::classroom::CourseWorkSource;
use super::session::{HttpRequest, HttpResponse, HttpTransport};
use super::tasks::TaskSink;
use crate::error::{AppError, Result};
use crate::models::{CourseWork, NewTask, RemoteCourse, RemoteTask, TaskList, TaskStatus};

type Route = Box<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

enum Script {
    Sequence(Mutex<VecDeque<HttpResponse>>),
    Routes(Route),
}

/// Replays canned responses and records every request it sees.
pub struct ScriptedTransport {
    script: Script,
    seen: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    /// Answer requests with the given responses in order.
    pub fn sequence(responses: Vec<HttpResponse>) -> Self {
        Self {
            script: Script::Sequence(Mutex::new(responses.into())),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Answer each request by calling `route`.
    pub fn routes<F>(route: F) -> Self
    where
        F: Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
    {
        Self {
            script: Script::Routes(Box::new(route)),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.seen.lock().unwrap().push(request.clone());
        match &self.script {
            Script::Sequence(queue) => queue.lock().unwrap().pop_front().ok_or_else(|| {
                AppError::validation(format!("no scripted response for {}", request.url))
            }),
            Script::Routes(route) => Ok(route(request)),
        }
    }
}

/// Task sink keeping tasks in memory.
#[derive(Default)]
pub struct MemorySink {
    tasks: Mutex<BTreeMap<String, RemoteTask>>,
    inserted: Mutex<Vec<NewTask>>,
    lists: Mutex<Vec<TaskList>>,
    failing_gets: HashSet<String>,
    fail_inserts: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(self, id: &str, status: TaskStatus) -> Self {
        self.tasks.lock().unwrap().insert(
            id.to_string(),
            RemoteTask {
                id: id.to_string(),
                title: String::new(),
                status,
                deleted: false,
            },
        );
        self
    }

    pub fn with_list(self, id: &str, title: &str) -> Self {
        self.lists.lock().unwrap().push(TaskList {
            id: id.to_string(),
            title: title.to_string(),
        });
        self
    }

    /// `get_task` for this ID fails with a non-NotFound error.
    pub fn failing_get(mut self, id: &str) -> Self {
        self.failing_gets.insert(id.to_string());
        self
    }

    pub fn failing_inserts(mut self) -> Self {
        self.fail_inserts = true;
        self
    }

    pub fn inserted(&self) -> Vec<NewTask> {
        self.inserted.lock().unwrap().clone()
    }

    pub fn lists(&self) -> Vec<TaskList> {
        self.lists.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskSink for MemorySink {
    async fn get_task(&self, _list_id: &str, task_id: &str) -> Result<RemoteTask> {
        if self.failing_gets.contains(task_id) {
            return Err(AppError::sink_api("503 backend unavailable"));
        }
        self.tasks
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .ok_or_else(|| AppError::SinkNotFound {
                task_id: task_id.to_string(),
            })
    }

    async fn insert_task(&self, _list_id: &str, task: &NewTask) -> Result<RemoteTask> {
        if self.fail_inserts {
            return Err(AppError::sink_api("429 rate limited"));
        }
        let mut inserted = self.inserted.lock().unwrap();
        inserted.push(task.clone());
        let created = RemoteTask {
            id: format!("task-{}", inserted.len()),
            title: task.title.clone(),
            status: TaskStatus::NeedsAction,
            deleted: false,
        };
        self.tasks
            .lock()
            .unwrap()
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn list_task_lists(&self) -> Result<Vec<TaskList>> {
        Ok(self.lists())
    }

    async fn create_task_list(&self, title: &str) -> Result<TaskList> {
        let mut lists = self.lists.lock().unwrap();
        let list = TaskList {
            id: format!("list-{}", lists.len() + 1),
            title: title.to_string(),
        };
        lists.push(list.clone());
        Ok(list)
    }
}

/// Course-work source with fixed contents.
#[derive(Default)]
pub struct StaticCourseWork {
    courses: Vec<RemoteCourse>,
    works: BTreeMap<String, Vec<CourseWork>>,
    failing: HashSet<String>,
    fail_listing: bool,
}

impl StaticCourseWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn course(mut self, id: &str, name: &str, works: Vec<CourseWork>) -> Self {
        self.courses.push(RemoteCourse {
            id: id.to_string(),
            name: name.to_string(),
        });
        self.works.insert(id.to_string(), works);
        self
    }

    pub fn failing_course(mut self, id: &str, name: &str) -> Self {
        self.courses.push(RemoteCourse {
            id: id.to_string(),
            name: name.to_string(),
        });
        self.failing.insert(id.to_string());
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }
}

#[async_trait]
impl CourseWorkSource for StaticCourseWork {
    async fn list_active_courses(&self) -> Result<Vec<RemoteCourse>> {
        if self.fail_listing {
            return Err(AppError::course_work_api("401 unauthorized"));
        }
        Ok(self.courses.clone())
    }

    async fn list_published_course_work(&self, course_id: &str) -> Result<Vec<CourseWork>> {
        if self.failing.contains(course_id) {
            return Err(AppError::course_work_api("500 internal"));
        }
        Ok(self.works.get(course_id).cloned().unwrap_or_default())
    }
}
