//! # Task Scheduler
//!
//! Decomposes submitted jobs into tasks, places tasks on healthy agents by
//! round-robin, and retries failures up to a configured bound. Ordering is
//! FIFO by default; priority scheduling sorts by descending priority with
//! submission time breaking ties.

use crate::types::*;
use chrono::Utc;
use fleet_registry::{generate_id, AgentId, DiscoveryRegistry, HealthStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Job and task scheduler backed by the discovery registry
pub struct TaskScheduler {
    registry: Arc<DiscoveryRegistry>,
    config: Arc<RwLock<SchedulerConfig>>,
    jobs: Arc<RwLock<HashMap<String, Job>>>,
    tasks: Arc<RwLock<HashMap<String, Task>>>,
    assignments: Arc<RwLock<Vec<Assignment>>>,
    metrics: Arc<RwLock<SchedulerMetrics>>,
    /// Round-robin position over the healthy agent list
    rr_cursor: AtomicUsize,
}

impl TaskScheduler {
    pub fn new(registry: Arc<DiscoveryRegistry>, config: SchedulerConfig) -> Self {
        Self {
            registry,
            config: Arc::new(RwLock::new(config)),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            tasks: Arc::new(RwLock::new(HashMap::new())),
            assignments: Arc::new(RwLock::new(Vec::new())),
            metrics: Arc::new(RwLock::new(SchedulerMetrics::default())),
            rr_cursor: AtomicUsize::new(0),
        }
    }

    /// Submit a job: decompose it into tasks, schedule them, and return the
    /// stored job.
    pub async fn submit(&self, spec: JobSpec) -> Job {
        let now = Utc::now();
        let job_id = {
            let jobs = self.jobs.read().await;
            // re-roll on the (vanishingly rare) id collision
            let mut id = generate_id("job");
            while jobs.contains_key(&id) {
                id = generate_id("job");
            }
            id
        };

        let mut job = Job {
            id: job_id.clone(),
            name: spec.name,
            owner: spec.owner,
            parameters: spec.parameters,
            status: JobStatus::Pending,
            tasks: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        // baseline decomposition: one generic task per job
        let task_ids: Vec<String> = {
            let mut tasks = self.tasks.write().await;
            let mut ids = Vec::new();
            for index in 0..1 {
                let task = Task {
                    id: format!("task-{}", Uuid::new_v4()),
                    job_id: job_id.clone(),
                    name: format!("{}-task-{}", job.name, index),
                    task_type: "generic".to_string(),
                    input: serde_json::Value::Null,
                    dependencies: Vec::new(),
                    status: TaskStatus::Pending,
                    assigned_agent_id: None,
                    resources: TaskResources::default(),
                    priority: spec.priority.unwrap_or(1),
                    retries: 0,
                    permanently_failed: false,
                    created_at: now,
                    updated_at: now,
                };
                ids.push(task.id.clone());
                tasks.insert(task.id.clone(), task);
            }
            ids
        };
        job.tasks = task_ids.clone();

        self.jobs.write().await.insert(job_id.clone(), job.clone());
        {
            let mut metrics = self.metrics.write().await;
            metrics.jobs += 1;
            metrics.tasks += task_ids.len() as u64;
        }

        info!("Submitted job {} with {} task(s)", job_id, task_ids.len());
        self.schedule(&task_ids).await;

        self.jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .unwrap_or(job)
    }

    /// Place the given tasks on healthy agents.
    ///
    /// Emits one assignment per task. With no healthy agent available the
    /// assignment carries no agent and the task stays pending for a later
    /// round.
    pub async fn schedule(&self, task_ids: &[String]) -> Vec<Assignment> {
        let ordering = self.config.read().await.scheduling;

        let mut batch: Vec<Task> = {
            let tasks = self.tasks.read().await;
            task_ids
                .iter()
                .filter_map(|id| tasks.get(id).cloned())
                .collect()
        };

        if ordering == SchedulingType::Priority {
            batch.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.created_at.cmp(&b.created_at))
            });
        }

        // healthy agents in stable id order; the cursor cycles across calls
        let mut healthy: Vec<AgentId> = self
            .registry
            .all()
            .await
            .into_iter()
            .filter(|agent| agent.health.status == HealthStatus::Healthy)
            .map(|agent| agent.id)
            .collect();
        healthy.sort();

        let mut emitted = Vec::with_capacity(batch.len());
        for task in batch {
            let selected = if healthy.is_empty() {
                None
            } else {
                let slot = self.rr_cursor.fetch_add(1, Ordering::Relaxed);
                Some(healthy[slot % healthy.len()].clone())
            };

            let assignment = Assignment {
                task_id: task.id.clone(),
                agent_id: selected.clone(),
                status: AssignmentStatus::Assigned,
                assigned_at: Utc::now(),
            };

            {
                let mut tasks = self.tasks.write().await;
                if let Some(stored) = tasks.get_mut(&task.id) {
                    match &selected {
                        Some(agent_id) => {
                            stored.status = TaskStatus::Assigned;
                            stored.assigned_agent_id = Some(agent_id.clone());
                            debug!("Assigned task {} to {}", stored.id, agent_id);
                        }
                        None => {
                            stored.status = TaskStatus::Pending;
                            stored.assigned_agent_id = None;
                            debug!("No healthy agent for task {}; deferred", stored.id);
                        }
                    }
                    stored.updated_at = Utc::now();
                }
            }

            emitted.push(assignment.clone());
            self.assignments.write().await.push(assignment);
        }

        emitted
    }

    /// Re-run scheduling over every task currently pending
    pub async fn schedule_pending(&self) -> Vec<Assignment> {
        let mut pending: Vec<(String, chrono::DateTime<Utc>)> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| (t.id.clone(), t.created_at))
            .collect();
        // submission order for the FIFO baseline
        pending.sort_by_key(|(_, created_at)| *created_at);
        let ids: Vec<String> = pending.into_iter().map(|(id, _)| id).collect();
        self.schedule(&ids).await
    }

    /// Mark a task completed. Unknown task ids are a no-op.
    pub async fn complete_task(&self, task_id: &str, agent_id: AgentId) {
        let job_id = {
            let mut tasks = self.tasks.write().await;
            let task = match tasks.get_mut(task_id) {
                Some(task) => task,
                None => return,
            };
            task.status = TaskStatus::Completed;
            task.assigned_agent_id = Some(agent_id);
            task.updated_at = Utc::now();
            task.job_id.clone()
        };

        self.metrics.write().await.completed += 1;
        self.set_assignment_status(task_id, AssignmentStatus::Completed)
            .await;
        self.refresh_job_status(&job_id).await;
        debug!("Task {} completed", task_id);
    }

    /// Mark a task failed; `handle_failures` decides whether it retries
    pub async fn fail_task(&self, task_id: &str) {
        {
            let mut tasks = self.tasks.write().await;
            let task = match tasks.get_mut(task_id) {
                Some(task) => task,
                None => return,
            };
            task.status = TaskStatus::Failed;
            task.updated_at = Utc::now();
        }
        self.set_assignment_status(task_id, AssignmentStatus::Failed)
            .await;
        debug!("Task {} failed", task_id);
    }

    /// Sweep failed tasks: requeue those with retries left, finalize the
    /// rest. The failure metric is bumped exactly once per task.
    pub async fn handle_failures(&self) {
        let max_retries = self.config.read().await.max_retries;
        let mut finalized_jobs = Vec::new();

        {
            let mut tasks = self.tasks.write().await;
            for task in tasks.values_mut() {
                if task.status != TaskStatus::Failed || task.permanently_failed {
                    continue;
                }
                if task.retries < max_retries {
                    task.retries += 1;
                    task.status = TaskStatus::Pending;
                    task.assigned_agent_id = None;
                    task.updated_at = Utc::now();
                    debug!(
                        "Task {} queued for retry {}/{}",
                        task.id, task.retries, max_retries
                    );
                } else {
                    task.permanently_failed = true;
                    task.updated_at = Utc::now();
                    finalized_jobs.push(task.job_id.clone());
                    info!("Task {} failed permanently after {} retries", task.id, task.retries);
                }
            }
        }

        if !finalized_jobs.is_empty() {
            let mut metrics = self.metrics.write().await;
            metrics.failed += finalized_jobs.len() as u64;
        }
        for job_id in finalized_jobs {
            let mut jobs = self.jobs.write().await;
            if let Some(job) = jobs.get_mut(&job_id) {
                job.status = JobStatus::Failed;
                job.updated_at = Utc::now();
            }
        }
    }

    /// Point-in-time snapshot of scheduler and fleet volume
    pub async fn monitor(&self) -> MonitorReport {
        let metrics = *self.metrics.read().await;
        MonitorReport {
            jobs: self.jobs.read().await.len(),
            tasks: self.tasks.read().await.len(),
            agents: self.registry.len().await,
            completed: metrics.completed,
            failed: metrics.failed,
        }
    }

    /// Copy of the rolling counters
    pub async fn collect_metrics(&self) -> SchedulerMetrics {
        *self.metrics.read().await
    }

    /// Merge a partial configuration into the live one
    pub async fn load_config(&self, patch: SchedulerConfigPatch) {
        let mut config = self.config.write().await;
        config.merge(patch);
        debug!(
            "Scheduler configuration updated: {:?} max_retries={}",
            config.scheduling, config.max_retries
        );
    }

    pub async fn config(&self) -> SchedulerConfig {
        self.config.read().await.clone()
    }

    pub async fn job(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().await.get(job_id).cloned()
    }

    pub async fn task(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().await.get(task_id).cloned()
    }

    pub async fn assignments(&self) -> Vec<Assignment> {
        self.assignments.read().await.clone()
    }

    async fn set_assignment_status(&self, task_id: &str, status: AssignmentStatus) {
        let mut assignments = self.assignments.write().await;
        if let Some(assignment) = assignments
            .iter_mut()
            .rev()
            .find(|a| a.task_id == task_id)
        {
            assignment.status = status;
        }
    }

    /// A job completes once every one of its tasks has
    async fn refresh_job_status(&self, job_id: &str) {
        let all_done = {
            let jobs = self.jobs.read().await;
            let job = match jobs.get(job_id) {
                Some(job) => job,
                None => return,
            };
            let tasks = self.tasks.read().await;
            job.tasks.iter().all(|id| {
                tasks
                    .get(id)
                    .map(|t| t.status == TaskStatus::Completed)
                    .unwrap_or(false)
            })
        };

        if all_done {
            let mut jobs = self.jobs.write().await;
            if let Some(job) = jobs.get_mut(job_id) {
                job.status = JobStatus::Completed;
                job.updated_at = Utc::now();
            }
        }
    }
}
