//! Lesson persistence. The concrete store (e.g. a vector index) is an
//! external collaborator; this module specifies the shape and a test-grade
//! in-memory sink.

use async_trait::async_trait;
use tokio::sync::Mutex;

/// A synthesized, persisted note from a completed agent run. Immutable
/// after write; excluded from any age-based cleanup policy a store applies.
#[derive(Debug, Clone)]
pub struct Lesson {
    /// Storage key, `lesson_{name}_{timestamp}`.
    pub key: String,
    /// Always `"learned_lesson"`.
    pub kind: &'static str,
    /// Lesson text, optionally prefixed `"CRITICAL:"`.
    pub content: String,
    /// Tags, including the agent name and role label.
    pub tags: Vec<String>,
    /// Unix timestamp (seconds) of creation.
    pub created_at: i64,
}

/// Where lessons go. A write failure here must never propagate into the
/// coordinator's `spawn()` result.
#[async_trait]
pub trait LessonSink: Send + Sync {
    /// Persist a lesson. Returns `false` on failure; callers must treat
    /// that as non-fatal.
    async fn write(&self, lesson: Lesson) -> bool;
}

/// A process-local lesson store, useful for tests and for deployments with
/// no external memory backend wired in.
#[derive(Default)]
pub struct InMemoryLessonStore {
    lessons: Mutex<Vec<Lesson>>,
}

impl InMemoryLessonStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every lesson written so far, for assertions in tests.
    pub async fn all(&self) -> Vec<Lesson> {
        self.lessons.lock().await.clone()
    }
}

#[async_trait]
impl LessonSink for InMemoryLessonStore {
    async fn write(&self, lesson: Lesson) -> bool {
        self.lessons.lock().await.push(lesson);
        true
    }
}
