use super::*;
use jobsys_core::descriptor::MAX_PARAM_SIZE;
use jobsys_core::state::Priority;
use std::sync::atomic::{AtomicU64, AtomicUsize};
use std::sync::Mutex;
use std::thread::{self, ThreadId};
use std::time::Duration;

fn manager(config: SchedulerConfig) -> JobManager {
    JobManager::start(config).unwrap()
}

fn single_worker() -> SchedulerConfig {
    SchedulerConfig::new().num_workers(1).num_helper_workers(0)
}

/// Occupies the only worker until released
fn hold_worker(mgr: &JobManager) -> Arc<AtomicBool> {
    let started = Arc::new(AtomicBool::new(false));
    let release = Arc::new(AtomicBool::new(false));
    let (s, r) = (started.clone(), release.clone());
    mgr.add_lambda(
        "Gate",
        move || {
            s.store(true, Ordering::SeqCst);
            while !r.load(Ordering::SeqCst) {
                thread::yield_now();
            }
        },
        JobOptions::new(),
    )
    .unwrap();
    while !started.load(Ordering::SeqCst) {
        thread::yield_now();
    }
    release
}

// ----------------------------------------------------------------------------
// Exactly once, with exact parameter bytes
// ----------------------------------------------------------------------------

static SEEN: Mutex<Vec<u32>> = Mutex::new(Vec::new());
static BAD_PARAMS: AtomicUsize = AtomicUsize::new(0);

fn record_value(params: &JobParams) {
    let bytes = params.bytes().unwrap_or_default();
    if bytes.len() != 8 {
        BAD_PARAMS.fetch_add(1, Ordering::SeqCst);
        return;
    }
    let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let check = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if check != !value {
        BAD_PARAMS.fetch_add(1, Ordering::SeqCst);
    }
    SEEN.lock().unwrap().push(value);
}

#[test]
fn test_exactly_once_from_many_threads() {
    const PRODUCERS: u32 = 4;
    const PER: u32 = 500;
    let mgr = Arc::new(manager(
        SchedulerConfig::new().num_workers(3).uniform_queue_capacity(32),
    ));
    let handle = mgr.get_or_register_job_handle("RecordValue", record_value).unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let mgr = mgr.clone();
            let handle = handle.clone();
            thread::spawn(move || {
                let state = mgr.acquire_state().unwrap();
                for i in 0..PER {
                    let value = p * PER + i;
                    let mut bytes = [0u8; 8];
                    bytes[..4].copy_from_slice(&value.to_le_bytes());
                    bytes[4..].copy_from_slice(&(!value).to_le_bytes());
                    let priority = Priority::from_index((i % 4) as usize).unwrap();
                    mgr.add_job(&handle, &bytes, JobOptions::new().priority(priority).state(&state))
                        .unwrap();
                }
                mgr.wait_for_job(&state);
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }

    let mut seen = SEEN.lock().unwrap().clone();
    seen.sort_unstable();
    assert_eq!(seen, (0..PRODUCERS * PER).collect::<Vec<_>>());
    assert_eq!(BAD_PARAMS.load(Ordering::SeqCst), 0);
    assert_eq!(handle.job_type().submitted(), (PRODUCERS * PER) as u64);
    mgr.shutdown();
    assert_eq!(mgr.stats().signals_in_use, 0);
}

// ----------------------------------------------------------------------------
// Ordering
// ----------------------------------------------------------------------------

#[test]
fn test_high_drains_before_regular() {
    let mgr = manager(single_worker());
    let order = Arc::new(Mutex::new(Vec::new()));
    let state = mgr.acquire_state().unwrap();

    let release = hold_worker(&mgr);
    for (priority, tag) in [(Priority::Regular, 'r'), (Priority::High, 'h')] {
        for _ in 0..5 {
            let order = order.clone();
            mgr.add_lambda(
                "Tag",
                move || order.lock().unwrap().push(tag),
                JobOptions::new().priority(priority).state(&state),
            )
            .unwrap();
        }
    }
    release.store(true, Ordering::SeqCst);
    mgr.wait_for_job(&state);

    let order: String = order.lock().unwrap().iter().collect();
    assert_eq!(order, "hhhhhrrrrr");
}

#[test]
fn test_fifo_within_priority() {
    let mgr = manager(single_worker());
    let order = Arc::new(Mutex::new(Vec::new()));
    let state = mgr.acquire_state().unwrap();

    let release = hold_worker(&mgr);
    for i in 0..100u32 {
        let order = order.clone();
        mgr.add_lambda(
            "Seq",
            move || order.lock().unwrap().push(i),
            JobOptions::new().priority(Priority::Low).state(&state),
        )
        .unwrap();
    }
    release.store(true, Ordering::SeqCst);
    mgr.wait_for_job(&state);

    assert_eq!(*order.lock().unwrap(), (0..100).collect::<Vec<_>>());
}

// ----------------------------------------------------------------------------
// Completion
// ----------------------------------------------------------------------------

#[test]
fn test_wait_returns_after_body() {
    let mgr = manager(SchedulerConfig::new().num_workers(2));
    let done = Arc::new(AtomicUsize::new(0));
    let state = mgr.acquire_state().unwrap();

    for _ in 0..4 {
        let done = done.clone();
        mgr.add_lambda(
            "Slow",
            move || {
                thread::sleep(Duration::from_millis(20));
                done.fetch_add(1, Ordering::SeqCst);
            },
            JobOptions::new().state(&state),
        )
        .unwrap();
    }
    mgr.wait_for_job(&state);
    assert_eq!(done.load(Ordering::SeqCst), 4);
    assert!(!state.needs_to_wait());
}

#[test]
fn test_primary_thread_wait_with_boost() {
    let mgr = Arc::new(manager(SchedulerConfig::new().num_workers(1).num_helper_workers(2).worker_boost(true)));
    let num_workers = mgr.worker_counts().0;
    let m = mgr.clone();
    let (ran, on_helper) = thread::spawn(move || {
        m.register_primary_thread();
        let count = Arc::new(AtomicUsize::new(0));
        let on_helper = Arc::new(AtomicUsize::new(0));
        let state = m.acquire_state().unwrap();
        for _ in 0..100 {
            let count = count.clone();
            let on_helper = on_helper.clone();
            m.add_lambda(
                "Boosted",
                move || {
                    thread::sleep(Duration::from_millis(2));
                    if tls::current_worker_id().is_some_and(|id| id.index as usize >= num_workers) {
                        on_helper.fetch_add(1, Ordering::SeqCst);
                    }
                    count.fetch_add(1, Ordering::SeqCst);
                },
                JobOptions::new().state(&state),
            )
            .unwrap();
        }
        m.wait_for_job(&state);
        (count.load(Ordering::SeqCst), on_helper.load(Ordering::SeqCst))
    })
    .join()
    .unwrap();
    assert_eq!(ran, 100);
    assert!(on_helper > 0, "no job ran on a kicked helper");
    mgr.shutdown();
}

#[test]
fn test_state_from_other_manager_rejected() {
    let a = manager(single_worker());
    let b = manager(single_worker());
    let state_a = a.acquire_state().unwrap();
    let _state_b = b.acquire_state().unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let d = done.clone();
    let err = b
        .add_lambda(
            "Foreign",
            move || {
                thread::sleep(Duration::from_millis(50));
                d.store(true, Ordering::SeqCst);
            },
            JobOptions::new().state(&state_a),
        )
        .unwrap_err();
    assert_eq!(err, JobError::InvalidSignal);
    assert!(!state_a.needs_to_wait());

    // the rejected closure was freed, not leaked or run
    assert_eq!(Arc::strong_count(&done), 1);
    assert!(!done.load(Ordering::SeqCst));

    // both pools still hold exactly their own state
    assert_eq!(a.stats().signals_in_use, 1);
    assert_eq!(b.stats().signals_in_use, 1);

    fn ignore(_: &JobParams) {}
    let raw = b.get_or_register_job_handle("ForeignRaw", ignore).unwrap();
    assert_eq!(
        b.add_job(&raw, &[1, 2, 3], JobOptions::new().state(&state_a)),
        Err(JobError::InvalidSignal)
    );
}

// ----------------------------------------------------------------------------
// Capacity
// ----------------------------------------------------------------------------

#[test]
fn test_zero_capacity_goes_through_overflow() {
    let mgr = Arc::new(manager(
        SchedulerConfig::new()
            .num_workers(2)
            .queue_capacity(Priority::Regular, 0),
    ));
    let counter = Arc::new(AtomicU64::new(0));

    let producers: Vec<_> = (0..2)
        .map(|_| {
            let mgr = mgr.clone();
            let counter = counter.clone();
            thread::spawn(move || {
                let state = mgr.acquire_state().unwrap();
                for _ in 0..250 {
                    let counter = counter.clone();
                    mgr.add_lambda(
                        "Count",
                        move || {
                            counter.fetch_add(1, Ordering::SeqCst);
                        },
                        JobOptions::new().state(&state),
                    )
                    .unwrap();
                }
                mgr.wait_for_job(&state);
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }

    assert_eq!(counter.load(Ordering::SeqCst), 500);
    assert!(mgr.stats().overflowed >= 500);
    mgr.shutdown();
}

static TICKS: AtomicU64 = AtomicU64::new(0);

fn tick(_: &JobParams) {
    TICKS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn test_thousand_jobs_ring_of_sixteen() {
    let mgr = manager(
        SchedulerConfig::new()
            .queue_capacity(Priority::Regular, 16)
            .completion_pool_size(1024),
    );
    let handle = mgr.get_or_register_job_handle("Tick", tick).unwrap();

    let states: Vec<JobState> = (0..1000)
        .map(|_| {
            let state = mgr.acquire_state().unwrap();
            mgr.add_job(&handle, &[], JobOptions::new().state(&state)).unwrap();
            state
        })
        .collect();
    for state in &states {
        mgr.wait_for_job(state);
    }

    assert_eq!(TICKS.load(Ordering::SeqCst), 1000);
    drop(states);
    // jobs drop their own reference just after signaling
    mgr.shutdown();
    assert_eq!(mgr.stats().signals_in_use, 0);
}

// ----------------------------------------------------------------------------
// Nested submission
// ----------------------------------------------------------------------------

#[test]
fn test_nested_submission_from_worker_never_blocks() {
    // One worker and a one-slot ring: a worker that blocked on a full ring
    // would wait forever for itself.
    let mgr = Arc::new(manager(single_worker().uniform_queue_capacity(1)));
    let count = Arc::new(AtomicUsize::new(0));
    let state = mgr.acquire_state().unwrap();

    let (m, c, s) = (mgr.clone(), count.clone(), state.clone());
    mgr.add_lambda(
        "Outer",
        move || {
            assert!(tls::is_worker_thread());
            for _ in 0..20 {
                let c = c.clone();
                m.add_lambda(
                    "Inner",
                    move || {
                        c.fetch_add(1, Ordering::SeqCst);
                    },
                    JobOptions::new().state(&s),
                )
                .unwrap();
            }
        },
        JobOptions::new().state(&state),
    )
    .unwrap();

    mgr.wait_for_job(&state);
    assert_eq!(count.load(Ordering::SeqCst), 20);
    assert!(mgr.stats().overflowed > 0);
    mgr.shutdown();
}

// ----------------------------------------------------------------------------
// Lifecycle
// ----------------------------------------------------------------------------

#[test]
fn test_shutdown_drains_and_is_idempotent() {
    let mgr = manager(SchedulerConfig::new().num_workers(2).num_blocking_workers(1));
    let count = Arc::new(AtomicUsize::new(0));

    for i in 0..300 {
        let count = count.clone();
        mgr.add_lambda(
            "Drain",
            move || {
                count.fetch_add(1, Ordering::SeqCst);
            },
            JobOptions::new().blocking(i % 3 == 0),
        )
        .unwrap();
    }
    mgr.shutdown();
    assert!(!mgr.is_running());
    assert_eq!(count.load(Ordering::SeqCst), 300);
    let stats = mgr.stats();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.blocking_executed, 100);

    mgr.shutdown();

    // After shutdown, jobs run on the caller.
    let here = thread::current().id();
    let ran_on = Arc::new(Mutex::new(None));
    let r = ran_on.clone();
    mgr.add_lambda("Late", move || *r.lock().unwrap() = Some(thread::current().id()), JobOptions::new())
        .unwrap();
    assert_eq!(*ran_on.lock().unwrap(), Some(here));
}

#[test]
fn test_init_twice() {
    let mgr = JobManager::new(single_worker()).unwrap();
    mgr.init(Some(1)).unwrap();
    assert_eq!(mgr.init(None), Err(JobError::AlreadyInitialized));
    assert_eq!(mgr.worker_counts(), (1, 0, 1));
    mgr.shutdown();
    assert_eq!(mgr.init(None), Err(JobError::AlreadyInitialized));
}

#[test]
fn test_worker_hint_caps_pool() {
    let mgr = JobManager::new(SchedulerConfig::new().num_workers(0)).unwrap();
    mgr.init(Some(1)).unwrap();
    assert_eq!(mgr.worker_counts().0, 1);
}

#[test]
fn test_invalid_config_rejected() {
    let err = JobManager::new(SchedulerConfig::new().num_blocking_workers(0)).err();
    assert!(matches!(err, Some(JobError::InvalidConfig(_))));
}

// ----------------------------------------------------------------------------
// Fallback routing
// ----------------------------------------------------------------------------

static INLINE_THREAD: Mutex<Option<ThreadId>> = Mutex::new(None);

fn note_thread(_: &JobParams) {
    *INLINE_THREAD.lock().unwrap() = Some(thread::current().id());
}

#[test]
fn test_disabled_runs_on_caller_before_return() {
    let mgr = manager(SchedulerConfig::new().num_workers(1).enabled(false));
    let handle = mgr.get_or_register_job_handle("NoteThread", note_thread).unwrap();

    mgr.add_job(&handle, &[], JobOptions::new()).unwrap();
    assert_eq!(*INLINE_THREAD.lock().unwrap(), Some(thread::current().id()));
    assert_eq!(handle.job_type().ran_inline(), 1);
    assert_eq!(mgr.stats().fallback_executed, 1);

    mgr.set_enabled(true);
    let state = mgr.acquire_state().unwrap();
    let ran_inline = Arc::new(AtomicBool::new(true));
    let r = ran_inline.clone();
    mgr.add_lambda("OnWorker", move || r.store(!tls::is_worker_thread(), Ordering::SeqCst), JobOptions::new().state(&state))
        .unwrap();
    mgr.wait_for_job(&state);
    assert!(!ran_inline.load(Ordering::SeqCst));
}

#[test]
fn test_filtered_job_runs_inline() {
    let mgr = manager(SchedulerConfig::new().num_workers(1).job_filter(["Phys"]));
    let state = mgr.acquire_state().unwrap();
    let on_worker = Arc::new(Mutex::new(Vec::new()));

    for name in ["UpdatePhysics", "Animate"] {
        let w = on_worker.clone();
        mgr.add_lambda(name, move || w.lock().unwrap().push((name, tls::is_worker_thread())), JobOptions::new().state(&state))
            .unwrap();
    }
    mgr.wait_for_job(&state);

    let mut seen = on_worker.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec![("Animate", true), ("UpdatePhysics", false)]);

    mgr.set_job_filter(&[]);
    assert!(!mgr.lookup_job_handle("UpdatePhysics").unwrap().job_type().is_filtered());
}

#[test]
fn test_jobs_before_init_run_inline() {
    let mgr = JobManager::new(single_worker()).unwrap();
    let ran = Arc::new(AtomicBool::new(false));
    let r = ran.clone();
    mgr.add_lambda("Early", move || r.store(true, Ordering::SeqCst), JobOptions::new())
        .unwrap();
    assert!(ran.load(Ordering::SeqCst));
}

// ----------------------------------------------------------------------------
// Errors and typed jobs
// ----------------------------------------------------------------------------

fn never(_: &JobParams) {}

#[test]
fn test_oversized_params_rejected_without_leaking_signal() {
    let mgr = manager(single_worker());
    let handle = mgr.get_or_register_job_handle("Never", never).unwrap();
    let state = mgr.acquire_state().unwrap();

    let big = vec![0u8; MAX_PARAM_SIZE + 1];
    let err = mgr.add_job(&handle, &big, JobOptions::new().state(&state));
    assert_eq!(err, Err(JobError::ParamsTooLarge { size: MAX_PARAM_SIZE + 1, max: MAX_PARAM_SIZE }));
    assert!(!state.needs_to_wait());
    drop(state);
    assert_eq!(mgr.stats().signals_in_use, 0);
}

static TYPED_SUM: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Copy)]
struct Accumulate {
    value: u64,
    times: u8,
}

impl Job for Accumulate {
    const NAME: &'static str = "Accumulate";

    fn run(self) {
        TYPED_SUM.fetch_add(self.value * self.times as u64, Ordering::SeqCst);
    }
}

#[test]
fn test_typed_jobs() {
    let mgr = manager(SchedulerConfig::new().num_workers(2));
    let handle = mgr.register_typed::<Accumulate>().unwrap();
    let state = mgr.acquire_state().unwrap();

    for value in 1..=10 {
        mgr.add_typed(&handle, Accumulate { value, times: 2 }, JobOptions::new().state(&state))
            .unwrap();
    }
    mgr.run_typed(Accumulate { value: 5, times: 1 }, JobOptions::new().state(&state))
        .unwrap();
    mgr.wait_for_job(&state);
    assert_eq!(TYPED_SUM.load(Ordering::SeqCst), 115);

    // raw bytes into a typed job type
    assert_eq!(
        mgr.add_job(&handle, &[1, 2, 3], JobOptions::new()),
        Err(JobError::JobTypeMismatch("Accumulate".to_string()))
    );
    // a byte job type is not a typed one
    let raw = mgr.get_or_register_job_handle("Raw", never).unwrap();
    assert!(mgr.add_typed(&raw, Accumulate { value: 1, times: 1 }, JobOptions::new()).is_err());
    assert!(mgr.get_or_register_job_handle("Accumulate", never).is_err());
}

#[test]
fn test_registry_diagnostics() {
    let mgr = JobManager::new(single_worker()).unwrap();
    assert!(mgr.lookup_job_handle("Never").is_none());
    let h = mgr.get_or_register_job_handle("Never", never).unwrap();
    assert_eq!(mgr.lookup_job_handle("Never"), Some(h));
    assert_eq!(mgr.job_name(never).as_deref(), Some("Never"));
    mgr.dump_job_list();
}

// ----------------------------------------------------------------------------
// Profiling
// ----------------------------------------------------------------------------

#[test]
fn test_profiling_samples_and_frames() {
    let mgr = manager(single_worker().profiling(true).sample_capacity(64));
    let state = mgr.acquire_state().unwrap();

    for _ in 0..3 {
        mgr.add_lambda(
            "Profiled",
            || thread::sleep(Duration::from_millis(10)),
            JobOptions::new().state(&state),
        )
        .unwrap();
    }
    mgr.wait_for_job(&state);
    mgr.update_frame();

    let samples = mgr.samples();
    assert_eq!(samples.iter().filter(|s| s.kind == SampleKind::Run).count(), 3);
    assert_eq!(samples.iter().filter(|s| s.kind == SampleKind::Wait).count(), 1);
    assert!(samples
        .iter()
        .filter(|s| s.kind == SampleKind::Run)
        .all(|s| s.worker == Some(jobsys_core::id::WorkerId::new(BackendKind::Thread, 0))));

    let frame = mgr.frame_stats(BackendKind::Thread).unwrap();
    assert_eq!(frame.total_jobs(), 3);
    assert!(frame.total_exec_us() >= 30_000);

    let jobs = mgr.job_frame_stats(BackendKind::Thread, JobSortOrder::Lexical);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].name, "Profiled");
    assert_eq!(jobs[0].count, 3);

    assert!(mgr.frame_stats(BackendKind::Fallback).is_none());
}

#[test]
fn test_profiling_off_records_nothing() {
    let mgr = manager(single_worker());
    let state = mgr.acquire_state().unwrap();
    mgr.add_lambda("Quiet", || {}, JobOptions::new().state(&state)).unwrap();
    mgr.wait_for_job(&state);
    assert!(mgr.samples().is_empty());
}

#[test]
fn test_debug_reports_lifecycle() {
    let mgr = manager(single_worker());
    let running = format!("{:?}", mgr);
    assert!(running.starts_with("JobManager"));
    assert!(running.contains("running: true"));
    mgr.shutdown();
    assert!(format!("{:?}", mgr).contains("running: false"));
}
