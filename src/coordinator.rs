//! The coordinator: task tables, lease-based reassignment, and the RPC
//! surface workers pull work from.
//!
//! The coordinator lives for exactly one job. It is the sole source of
//! truth for task assignment; the lease timeout is its sole fault-tolerance
//! mechanism. A task whose worker vanishes is handed out again once the
//! lease expires, and the filesystem protocol on the worker side keeps a
//! straggler's late rename harmless.

use crate::rpc::pb::coordinator_server::{Coordinator, CoordinatorServer};
use crate::rpc::pb::{Directive, ReportAck, TaskAssignment, TaskReport, TaskRequest};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::{transport::Server, Request, Response, Status};
use tracing::{info, warn};

/// How long a worker may hold a task before it is reassigned.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(10);

/// Which task table a report refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskKind {
    Map,
    Reduce,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TaskState {
    Pending,
    Running,
    Done,
}

/// One slot in a task table. The lease instant is only meaningful while
/// the slot is `Running`.
struct Slot {
    state: TaskState,
    lease: Option<Instant>,
}

impl Slot {
    fn pending() -> Self {
        Slot {
            state: TaskState::Pending,
            lease: None,
        }
    }
}

/// What `request_task` handed back to a worker.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Assignment {
    Map {
        map_id: u32,
        n_reduce: u32,
        input: String,
    },
    Reduce {
        reduce_id: u32,
        n_reduce: u32,
    },
    Idle,
    Exit,
}

struct Tables {
    maps: Vec<Slot>,
    reduces: Vec<Slot>,
    done: bool,
}

/// The scheduling state machine.
///
/// All mutable state sits behind one mutex. The handlers do no I/O and
/// never block while holding it; contention is bounded by table size.
pub struct Scheduler {
    inputs: Vec<String>,
    n_reduce: u32,
    lease: Duration,
    tables: Mutex<Tables>,
}

impl Scheduler {
    /// One Map task per input file, `n_reduce` Reduce tasks, default lease.
    pub fn new(inputs: Vec<String>, n_reduce: u32) -> Self {
        Self::with_lease(inputs, n_reduce, DEFAULT_LEASE)
    }

    pub fn with_lease(inputs: Vec<String>, n_reduce: u32, lease: Duration) -> Self {
        let maps = inputs.iter().map(|_| Slot::pending()).collect();
        let reduces = (0..n_reduce).map(|_| Slot::pending()).collect();
        Self {
            inputs,
            n_reduce,
            lease,
            tables: Mutex::new(Tables {
                maps,
                reduces,
                done: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hand out work. Expired leases are reaped first, then a Pending Map
    /// is assigned in index order; Reduces are considered only once every
    /// Map is Done. Never blocks and never waits for state to change.
    pub fn request_task(&self) -> Assignment {
        let mut t = self.lock();
        let now = Instant::now();
        reap("map", &mut t.maps, now, self.lease);
        reap("reduce", &mut t.reduces, now, self.lease);

        if let Some(id) = claim_pending(&mut t.maps, now) {
            return Assignment::Map {
                map_id: id as u32,
                n_reduce: self.n_reduce,
                input: self.inputs[id].clone(),
            };
        }
        if all_done(&t.maps) {
            if let Some(id) = claim_pending(&mut t.reduces, now) {
                return Assignment::Reduce {
                    reduce_id: id as u32,
                    n_reduce: self.n_reduce,
                };
            }
            if all_done(&t.reduces) {
                if !t.done {
                    info!("all tasks done; job complete");
                    t.done = true;
                }
                return Assignment::Exit;
            }
        }
        Assignment::Idle
    }

    /// Record a task outcome. Success is idempotent: a late report from a
    /// reaped worker at most re-sets Done to Done. A failure returns the
    /// task to Pending unless it already completed elsewhere; Done is
    /// terminal. An unknown id is a no-op.
    pub fn report_task(&self, kind: TaskKind, id: u32, success: bool) {
        let mut t = self.lock();
        let slots = match kind {
            TaskKind::Map => &mut t.maps,
            TaskKind::Reduce => &mut t.reduces,
        };
        let Some(slot) = slots.get_mut(id as usize) else {
            return;
        };
        if success {
            slot.state = TaskState::Done;
            slot.lease = None;
        } else if slot.state != TaskState::Done {
            warn!(?kind, id, "task reported failed; returning to pending");
            slot.state = TaskState::Pending;
            slot.lease = None;
        }
    }

    /// Snapshot of the done flag, polled by the supervisor.
    pub fn done(&self) -> bool {
        self.lock().done
    }
}

fn reap(kind: &str, slots: &mut [Slot], now: Instant, lease: Duration) {
    for (id, slot) in slots.iter_mut().enumerate() {
        if slot.state != TaskState::Running {
            continue;
        }
        if let Some(started) = slot.lease {
            if now.duration_since(started) > lease {
                warn!(kind, id, "lease expired; returning task to pending");
                slot.state = TaskState::Pending;
                slot.lease = None;
            }
        }
    }
}

fn claim_pending(slots: &mut [Slot], now: Instant) -> Option<usize> {
    let (id, slot) = slots
        .iter_mut()
        .enumerate()
        .find(|(_, s)| s.state == TaskState::Pending)?;
    slot.state = TaskState::Running;
    slot.lease = Some(now);
    Some(id)
}

fn all_done(slots: &[Slot]) -> bool {
    slots.iter().all(|s| s.state == TaskState::Done)
}

/////////////////////////////////////////////////////////////////////////////
// RPC surface
/////////////////////////////////////////////////////////////////////////////

/// The tonic service workers talk to: thin marshalling over [`Scheduler`].
pub struct CoordinatorService {
    scheduler: Arc<Scheduler>,
}

impl CoordinatorService {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

#[tonic::async_trait]
impl Coordinator for CoordinatorService {
    async fn request_task(
        &self,
        _request: Request<TaskRequest>,
    ) -> Result<Response<TaskAssignment>, Status> {
        let reply = match self.scheduler.request_task() {
            Assignment::Map {
                map_id,
                n_reduce,
                input,
            } => TaskAssignment {
                directive: Directive::Map as i32,
                task_id: map_id,
                n_reduce,
                input,
            },
            Assignment::Reduce { reduce_id, n_reduce } => TaskAssignment {
                directive: Directive::Reduce as i32,
                task_id: reduce_id,
                n_reduce,
                ..Default::default()
            },
            Assignment::Idle => TaskAssignment {
                directive: Directive::Idle as i32,
                ..Default::default()
            },
            Assignment::Exit => TaskAssignment {
                directive: Directive::Exit as i32,
                ..Default::default()
            },
        };
        Ok(Response::new(reply))
    }

    async fn report_task(
        &self,
        request: Request<TaskReport>,
    ) -> Result<Response<ReportAck>, Status> {
        let report = request.into_inner();
        let kind = match report.kind() {
            Directive::Map => TaskKind::Map,
            Directive::Reduce => TaskKind::Reduce,
            // Not a task outcome; nothing to record.
            Directive::Idle | Directive::Exit => return Ok(Response::new(ReportAck {})),
        };
        self.scheduler.report_task(kind, report.task_id, report.success);
        Ok(Response::new(ReportAck {}))
    }
}

/// Bind the coordinator socket and serve RPCs until the future is dropped.
///
/// A stale socket file left by a previous run is removed before binding;
/// an actual bind failure is fatal and surfaces to the supervisor.
pub async fn serve(scheduler: Arc<Scheduler>, sock: &Path) -> Result<()> {
    match std::fs::remove_file(sock) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err).context("removing stale coordinator socket"),
    }
    let listener = UnixListener::bind(sock)
        .with_context(|| format!("binding coordinator socket {}", sock.display()))?;
    info!(sock = %sock.display(), "coordinator listening");

    Server::builder()
        .add_service(CoordinatorServer::new(CoordinatorService::new(scheduler)))
        .serve_with_incoming(UnixListenerStream::new(listener))
        .await
        .context("serving coordinator rpc")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn inputs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("in-{i}.txt")).collect()
    }

    #[test]
    fn maps_assigned_in_index_order_then_idle() {
        let s = Scheduler::new(inputs(2), 2);
        assert_eq!(
            s.request_task(),
            Assignment::Map {
                map_id: 0,
                n_reduce: 2,
                input: "in-0.txt".into()
            }
        );
        assert_eq!(
            s.request_task(),
            Assignment::Map {
                map_id: 1,
                n_reduce: 2,
                input: "in-1.txt".into()
            }
        );
        // Both maps are running; nothing is assignable yet.
        assert_eq!(s.request_task(), Assignment::Idle);
    }

    #[test]
    fn reduces_gated_until_every_map_is_done() {
        let s = Scheduler::new(inputs(2), 1);
        s.request_task();
        s.request_task();
        s.report_task(TaskKind::Map, 0, true);
        assert_eq!(s.request_task(), Assignment::Idle);

        s.report_task(TaskKind::Map, 1, true);
        assert_eq!(
            s.request_task(),
            Assignment::Reduce {
                reduce_id: 0,
                n_reduce: 1
            }
        );
    }

    #[test]
    fn exit_once_all_reduces_are_done() {
        let s = Scheduler::new(inputs(1), 1);
        s.request_task();
        s.report_task(TaskKind::Map, 0, true);
        s.request_task();
        assert!(!s.done());
        s.report_task(TaskKind::Reduce, 0, true);
        assert_eq!(s.request_task(), Assignment::Exit);
        assert!(s.done());
        // Exit is repeatable for every remaining worker.
        assert_eq!(s.request_task(), Assignment::Exit);
        assert!(s.done());
    }

    #[test]
    fn failure_report_requeues_the_task() {
        let s = Scheduler::new(inputs(1), 1);
        assert!(matches!(s.request_task(), Assignment::Map { map_id: 0, .. }));
        s.report_task(TaskKind::Map, 0, false);
        assert!(matches!(s.request_task(), Assignment::Map { map_id: 0, .. }));
    }

    #[test]
    fn expired_lease_requeues_the_task() {
        let s = Scheduler::with_lease(inputs(1), 1, Duration::from_millis(5));
        assert!(matches!(s.request_task(), Assignment::Map { map_id: 0, .. }));
        assert_eq!(s.request_task(), Assignment::Idle);
        sleep(Duration::from_millis(20));
        assert!(matches!(s.request_task(), Assignment::Map { map_id: 0, .. }));
    }

    #[test]
    fn late_reports_after_reassignment_are_idempotent() {
        let s = Scheduler::with_lease(inputs(1), 0, Duration::from_millis(5));
        // Worker A takes the task and is reaped.
        s.request_task();
        sleep(Duration::from_millis(20));
        // Worker B takes it over and finishes.
        assert!(matches!(s.request_task(), Assignment::Map { map_id: 0, .. }));
        s.report_task(TaskKind::Map, 0, true);
        assert_eq!(s.request_task(), Assignment::Exit);

        // A resurfaces: its success re-sets Done to Done, and its failure
        // is ignored because Done is terminal.
        s.report_task(TaskKind::Map, 0, true);
        assert_eq!(s.request_task(), Assignment::Exit);
        s.report_task(TaskKind::Map, 0, false);
        assert_eq!(s.request_task(), Assignment::Exit);
        assert!(s.done());
    }

    #[test]
    fn unknown_task_id_is_a_no_op() {
        let s = Scheduler::new(inputs(1), 1);
        s.report_task(TaskKind::Map, 7, true);
        s.report_task(TaskKind::Reduce, 7, false);
        assert!(matches!(s.request_task(), Assignment::Map { map_id: 0, .. }));
    }

    #[test]
    fn zero_reduce_job_exits_after_maps() {
        let s = Scheduler::new(inputs(1), 0);
        s.request_task();
        s.report_task(TaskKind::Map, 0, true);
        assert_eq!(s.request_task(), Assignment::Exit);
        assert!(s.done());
    }

    #[test]
    fn empty_job_is_immediately_done() {
        let s = Scheduler::new(Vec::new(), 0);
        assert_eq!(s.request_task(), Assignment::Exit);
        assert!(s.done());
    }
}
