use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditKind, AuditSink};
use crate::meet::storage::StorageProvider;
use crate::shared::error::MeetError;
use crate::shared::models::{RecordingJob, RecordingStatus};
use crate::shared::retry::{retry, RetryPolicy};

const UPLOAD_QUEUE_CAPACITY: usize = 256;

#[derive(Debug)]
struct UploadTask {
    egress_id: String,
}

/// Owns the recording state machine. Egress webhook events drive jobs
/// through `started → ended → uploading → completed`, with `failed`
/// reachable from any non-terminal state. Uploads run on a worker pool fed
/// by an explicit queue, so webhook responses return before the transfer
/// and completion stays observable on the job row.
pub struct RecordingOrchestrator {
    jobs: RwLock<HashMap<String, RecordingJob>>,
    storage: Arc<dyn StorageProvider>,
    audit: Arc<dyn AuditSink>,
    retry_policy: RetryPolicy,
    upload_tx: mpsc::Sender<UploadTask>,
}

impl RecordingOrchestrator {
    pub fn new(
        storage: Arc<dyn StorageProvider>,
        audit: Arc<dyn AuditSink>,
        retry_policy: RetryPolicy,
        upload_workers: usize,
    ) -> Arc<Self> {
        let (upload_tx, upload_rx) = mpsc::channel(UPLOAD_QUEUE_CAPACITY);
        let orchestrator = Arc::new(Self {
            jobs: RwLock::new(HashMap::new()),
            storage,
            audit,
            retry_policy,
            upload_tx,
        });
        orchestrator.spawn_workers(upload_rx, upload_workers.max(1));
        orchestrator
    }

    fn spawn_workers(self: &Arc<Self>, upload_rx: mpsc::Receiver<UploadTask>, workers: usize) {
        let upload_rx = Arc::new(Mutex::new(upload_rx));
        for worker in 0..workers {
            let orchestrator = Arc::clone(self);
            let upload_rx = Arc::clone(&upload_rx);
            tokio::spawn(async move {
                loop {
                    let task = { upload_rx.lock().await.recv().await };
                    match task {
                        Some(task) => orchestrator.process_upload(task).await,
                        None => {
                            info!("Upload worker {worker} shutting down");
                            break;
                        }
                    }
                }
            });
        }
    }

    /// Handles `egress_started`: registers a new job in `started`.
    pub async fn on_egress_started(
        &self,
        room_id: Uuid,
        egress_id: &str,
        local_file_path: Option<String>,
    ) -> Result<(), MeetError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(egress_id) {
            return Err(MeetError::State(format!(
                "egress {egress_id} already tracked"
            )));
        }
        if jobs
            .values()
            .any(|j| j.room_id == room_id && !j.status.is_terminal())
        {
            return Err(MeetError::State(format!(
                "room {room_id} already has an active recording"
            )));
        }
        jobs.insert(
            egress_id.to_string(),
            RecordingJob {
                id: Uuid::new_v4(),
                room_id,
                egress_id: egress_id.to_string(),
                status: RecordingStatus::Started,
                local_file_path,
                storage_url: None,
                started_at: Utc::now(),
                ended_at: None,
                error: None,
            },
        );
        info!("Recording {egress_id} started for room {room_id}");
        Ok(())
    }

    /// Handles `egress_ended`: moves the job to `ended` and queues the
    /// upload. A missing job is created defensively in `ended`, since the
    /// start notification is not load-bearing.
    pub async fn on_egress_ended(
        &self,
        room_id: Uuid,
        egress_id: &str,
        local_file_path: Option<String>,
    ) -> Result<(), MeetError> {
        {
            let mut jobs = self.jobs.write().await;
            match jobs.get_mut(egress_id) {
                Some(job) => {
                    transition(job, RecordingStatus::Ended)?;
                    job.ended_at = Some(Utc::now());
                    if local_file_path.is_some() {
                        job.local_file_path = local_file_path;
                    }
                }
                None => {
                    warn!("egress_ended for untracked egress {egress_id}, creating job");
                    jobs.insert(
                        egress_id.to_string(),
                        RecordingJob {
                            id: Uuid::new_v4(),
                            room_id,
                            egress_id: egress_id.to_string(),
                            status: RecordingStatus::Ended,
                            local_file_path,
                            storage_url: None,
                            started_at: Utc::now(),
                            ended_at: Some(Utc::now()),
                            error: None,
                        },
                    );
                }
            }
        }
        self.enqueue_upload(egress_id).await;
        Ok(())
    }

    /// Handles `egress_failed`: terminal failure reported by the media
    /// server itself.
    pub async fn on_egress_failed(
        &self,
        room_id: Uuid,
        egress_id: &str,
        reason: &str,
    ) -> Result<(), MeetError> {
        let stale_artifact = {
            let mut jobs = self.jobs.write().await;
            match jobs.get_mut(egress_id) {
                Some(job) => {
                    transition(job, RecordingStatus::Failed)?;
                    job.error = Some(reason.to_string());
                    job.ended_at = Some(Utc::now());
                    job.local_file_path.take()
                }
                None => {
                    jobs.insert(
                        egress_id.to_string(),
                        RecordingJob {
                            id: Uuid::new_v4(),
                            room_id,
                            egress_id: egress_id.to_string(),
                            status: RecordingStatus::Failed,
                            local_file_path: None,
                            storage_url: None,
                            started_at: Utc::now(),
                            ended_at: Some(Utc::now()),
                            error: Some(reason.to_string()),
                        },
                    );
                    None
                }
            }
        };
        // A failed job will never be uploaded; its artifact goes now
        // rather than waiting on a queued task that may never exist.
        if let Some(path) = stale_artifact {
            remove_temp_file(&path).await;
        }
        self.audit
            .record(AuditEvent::new(
                AuditKind::RecordingLost,
                egress_id,
                format!("egress failed upstream: {reason}"),
            ))
            .await;
        Ok(())
    }

    /// Finalization check run when a room finishes: re-queues any job for
    /// the room still sitting in `ended` (e.g. a queue send lost to a
    /// restart) and logs jobs that never saw their end notification.
    pub async fn finalize_room(&self, room_id: Uuid) {
        let pending: Vec<(String, RecordingStatus)> = {
            let jobs = self.jobs.read().await;
            jobs.values()
                .filter(|j| j.room_id == room_id && !j.status.is_terminal())
                .map(|j| (j.egress_id.clone(), j.status))
                .collect()
        };
        for (egress_id, status) in pending {
            match status {
                RecordingStatus::Ended => self.enqueue_upload(&egress_id).await,
                RecordingStatus::Started => {
                    info!("Room {room_id} finished; recording {egress_id} still awaiting egress_ended")
                }
                _ => {}
            }
        }
    }

    pub async fn get_job(&self, egress_id: &str) -> Option<RecordingJob> {
        self.jobs.read().await.get(egress_id).cloned()
    }

    pub async fn jobs_for_room(&self, room_id: Uuid) -> Vec<RecordingJob> {
        self.jobs
            .read()
            .await
            .values()
            .filter(|j| j.room_id == room_id)
            .cloned()
            .collect()
    }

    async fn enqueue_upload(&self, egress_id: &str) {
        let task = UploadTask {
            egress_id: egress_id.to_string(),
        };
        if let Err(e) = self.upload_tx.send(task).await {
            error!("Upload queue closed, recording {egress_id} stuck in ended: {e}");
        }
    }

    /// Upload step, run by the worker pool. The local temp file is removed
    /// on every exit path so failed uploads cannot fill the disk.
    async fn process_upload(&self, task: UploadTask) {
        let egress_id = task.egress_id.as_str();
        let (room_id, local_file_path) = {
            let mut jobs = self.jobs.write().await;
            let Some(job) = jobs.get_mut(egress_id) else {
                warn!("Upload task for unknown egress {egress_id}");
                return;
            };
            if let Err(e) = transition(job, RecordingStatus::Uploading) {
                // Lost the race to a concurrent failure event, or a
                // duplicate task. A failed job still carrying its
                // artifact owns disposal here; an uploading or completed
                // one must keep the file for the worker that holds it.
                info!("Skipping upload for {egress_id}: {e}");
                let stale_artifact = if job.status == RecordingStatus::Failed {
                    job.local_file_path.take()
                } else {
                    None
                };
                drop(jobs);
                if let Some(path) = stale_artifact {
                    remove_temp_file(&path).await;
                }
                return;
            }
            (job.room_id, job.local_file_path.clone())
        };

        let Some(local_file_path) = local_file_path else {
            self.fail_job(egress_id, "no local artifact path on recording job")
                .await;
            return;
        };

        let key = format!("recordings/{room_id}/{egress_id}.mp4");
        let local = Path::new(&local_file_path);
        let uploaded = retry(&self.retry_policy, "recording upload", || {
            self.storage.upload(local, &key)
        })
        .await;

        match uploaded {
            Ok(storage_url) => {
                let completed = {
                    let mut jobs = self.jobs.write().await;
                    if let Some(job) = jobs.get_mut(egress_id) {
                        if transition(job, RecordingStatus::Completed).is_ok() {
                            job.storage_url = Some(storage_url.clone());
                            true
                        } else {
                            false
                        }
                    } else {
                        false
                    }
                };
                if completed {
                    info!("Recording {egress_id} stored at {storage_url}");
                    self.audit
                        .record(AuditEvent::new(
                            AuditKind::RecordingCompleted,
                            egress_id,
                            storage_url,
                        ))
                        .await;
                }
            }
            Err(e) => {
                self.fail_job(egress_id, &format!("upload retries exhausted: {e}"))
                    .await;
            }
        }

        remove_temp_file(&local_file_path).await;
    }

    async fn fail_job(&self, egress_id: &str, reason: &str) {
        let stale_artifact = {
            let mut jobs = self.jobs.write().await;
            jobs.get_mut(egress_id).and_then(|job| {
                if transition(job, RecordingStatus::Failed).is_ok() {
                    job.error = Some(reason.to_string());
                    job.local_file_path.take()
                } else {
                    None
                }
            })
        };
        if let Some(path) = stale_artifact {
            remove_temp_file(&path).await;
        }
        error!("Recording {egress_id} failed: {reason}");
        self.audit
            .record(AuditEvent::new(AuditKind::RecordingLost, egress_id, reason))
            .await;
    }
}

/// Guarded state transition. Only the forward edges of the pipeline are
/// allowed; anything else is an `Invalid state` the caller logs and treats
/// as a no-op.
fn transition(job: &mut RecordingJob, to: RecordingStatus) -> Result<(), MeetError> {
    use RecordingStatus::{Completed, Ended, Failed, Started, Uploading};
    let allowed = matches!(
        (job.status, to),
        (Started, Ended | Failed) | (Ended, Uploading | Failed) | (Uploading, Completed | Failed)
    );
    if !allowed {
        return Err(MeetError::State(format!(
            "recording {} cannot move {} -> {to}",
            job.egress_id, job.status
        )));
    }
    job.status = to;
    Ok(())
}

async fn remove_temp_file(path: &str) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("Removed local recording artifact {path}"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove local artifact {path}: {e}"),
    }
}
