//! Job profiling
//!
//! Two consumer-facing views, both written with plain atomics so that
//! recording never blocks or fails the job being measured:
//!
//! - [`SampleRing`]: the most recent `(job type, thread, start, end)`
//!   samples, overwritten in place. Each slot is a small seqlock; readers
//!   skip slots that are mid-write.
//! - [`BackendProfiler`]: per-backend frame statistics. A few frame
//!   buffers rotate on [`BackendProfiler::update`]; jobs accumulate into the
//!   frame that was current when they were submitted.

use jobsys_core::constants::{MAX_JOB_TYPES, MAX_WORKERS};
use jobsys_core::id::{BackendKind, JobTypeId, WorkerId};
use std::sync::atomic::{fence, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};

/// Frame buffers kept per backend
pub const NUM_FRAMES: usize = 3;

const NO_WORKER: u32 = u32::MAX;

fn encode_worker(id: Option<WorkerId>) -> u32 {
    match id {
        Some(id) => ((id.kind as u32) << 16) | id.index as u32,
        None => NO_WORKER,
    }
}

fn decode_worker(raw: u32) -> Option<WorkerId> {
    if raw == NO_WORKER {
        return None;
    }
    let kind = match raw >> 16 {
        0 => BackendKind::Thread,
        1 => BackendKind::Blocking,
        _ => BackendKind::Fallback,
    };
    Some(WorkerId::new(kind, (raw & 0xFFFF) as u16))
}

/// What a sample measured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SampleKind {
    /// A job body executing
    Run = 0,
    /// A thread blocked in `wait_for_job`
    Wait = 1,
}

/// One recorded interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Monotonic sequence number, oldest first
    pub seq: u64,
    pub job_type: JobTypeId,
    /// Worker that ran (or waited); `None` for non-worker threads
    pub worker: Option<WorkerId>,
    pub start_ns: u64,
    pub end_ns: u64,
    pub kind: SampleKind,
}

impl Sample {
    #[inline]
    pub fn duration_ns(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns)
    }
}

#[derive(Default)]
struct SampleSlot {
    /// Odd while being written; otherwise 2 * (seq + 1)
    version: AtomicU64,
    job_type: AtomicU32,
    worker: AtomicU32,
    start_ns: AtomicU64,
    end_ns: AtomicU64,
    kind: AtomicU8,
}

/// Fixed-size ring of recent samples
pub struct SampleRing {
    slots: Box<[SampleSlot]>,
    head: AtomicU64,
    dropped: AtomicU64,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| SampleSlot::default()).collect(),
            head: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Samples recorded since creation (including overwritten ones)
    #[inline]
    pub fn recorded(&self) -> u64 {
        self.head.load(Ordering::Relaxed)
    }

    /// Samples lost to slot contention
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Record one interval; never blocks
    pub fn record(
        &self,
        job_type: JobTypeId,
        worker: Option<WorkerId>,
        start_ns: u64,
        end_ns: u64,
        kind: SampleKind,
    ) {
        let seq = self.head.fetch_add(1, Ordering::Relaxed);
        let slot = &self.slots[(seq % self.slots.len() as u64) as usize];

        // Another writer lapped us onto the same slot: drop this sample.
        let version = slot.version.load(Ordering::Relaxed);
        if version % 2 == 1
            || slot
                .version
                .compare_exchange(version, seq * 2 + 1, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        fence(Ordering::Release);
        slot.job_type.store(job_type.as_u32(), Ordering::Relaxed);
        slot.worker.store(encode_worker(worker), Ordering::Relaxed);
        slot.start_ns.store(start_ns, Ordering::Relaxed);
        slot.end_ns.store(end_ns, Ordering::Relaxed);
        slot.kind.store(kind as u8, Ordering::Relaxed);
        slot.version.store(seq * 2 + 2, Ordering::Release);
    }

    /// Consistent samples currently in the ring, oldest first
    pub fn snapshot(&self) -> Vec<Sample> {
        let mut out: Vec<Sample> = self.slots.iter().filter_map(read_slot).collect();
        out.sort_unstable_by_key(|s| s.seq);
        out
    }
}

fn read_slot(slot: &SampleSlot) -> Option<Sample> {
    let v1 = slot.version.load(Ordering::Acquire);
    if v1 == 0 || v1 % 2 == 1 {
        return None;
    }
    let sample = Sample {
        seq: v1 / 2 - 1,
        job_type: JobTypeId::new(slot.job_type.load(Ordering::Relaxed)),
        worker: decode_worker(slot.worker.load(Ordering::Relaxed)),
        start_ns: slot.start_ns.load(Ordering::Relaxed),
        end_ns: slot.end_ns.load(Ordering::Relaxed),
        kind: if slot.kind.load(Ordering::Relaxed) == SampleKind::Wait as u8 {
            SampleKind::Wait
        } else {
            SampleKind::Run
        },
    };
    fence(Ordering::Acquire);
    let v2 = slot.version.load(Ordering::Relaxed);
    (v1 == v2).then_some(sample)
}

// ============================================================================
// Frame statistics
// ============================================================================

/// Sort order for per-job frame statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobSortOrder {
    #[default]
    TimeHighToLow,
    TimeLowToHigh,
    Lexical,
    NoSort,
}

#[derive(Default)]
struct Counter {
    count: AtomicU32,
    exec_us: AtomicU64,
}

impl Counter {
    #[inline]
    fn add(&self, us: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.exec_us.fetch_add(us, Ordering::Relaxed);
    }

    #[inline]
    fn clear(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.exec_us.store(0, Ordering::Relaxed);
    }

    #[inline]
    fn get(&self) -> (u32, u64) {
        (self.count.load(Ordering::Relaxed), self.exec_us.load(Ordering::Relaxed))
    }
}

struct Frame {
    start_ns: AtomicU64,
    end_ns: AtomicU64,
    workers: Box<[Counter]>,
    jobs: Box<[Counter]>,
}

impl Frame {
    fn new(num_workers: usize) -> Self {
        Self {
            start_ns: AtomicU64::new(0),
            end_ns: AtomicU64::new(0),
            workers: (0..num_workers).map(|_| Counter::default()).collect(),
            jobs: (0..MAX_JOB_TYPES).map(|_| Counter::default()).collect(),
        }
    }

    fn clear(&self, now_ns: u64) {
        self.workers.iter().for_each(Counter::clear);
        self.jobs.iter().for_each(Counter::clear);
        self.end_ns.store(0, Ordering::Relaxed);
        self.start_ns.store(now_ns, Ordering::Relaxed);
    }
}

/// Per-worker totals for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerFrameStats {
    pub worker: WorkerId,
    pub jobs: u32,
    pub exec_us: u64,
    /// Share of the frame spent executing jobs, 0.0 - 100.0
    pub utilization: f32,
}

/// Per-job-type totals for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct JobFrameStats {
    pub job_type: JobTypeId,
    pub name: String,
    pub count: u32,
    pub exec_us: u64,
}

/// Closed-frame statistics for one backend
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStats {
    pub backend: BackendKind,
    pub frame_us: u64,
    pub workers: Vec<WorkerFrameStats>,
}

impl FrameStats {
    pub fn total_jobs(&self) -> u64 {
        self.workers.iter().map(|w| w.jobs as u64).sum()
    }

    pub fn total_exec_us(&self) -> u64 {
        self.workers.iter().map(|w| w.exec_us).sum()
    }

    /// Mean utilization over all workers
    pub fn avg_utilization(&self) -> f32 {
        if self.workers.is_empty() {
            return 0.0;
        }
        self.workers.iter().map(|w| w.utilization).sum::<f32>() / self.workers.len() as f32
    }
}

/// Frame-buffered execution statistics for one backend
pub struct BackendProfiler {
    kind: BackendKind,
    frames: [Frame; NUM_FRAMES],
    current: AtomicUsize,
}

impl BackendProfiler {
    pub fn new(kind: BackendKind, num_workers: usize) -> Self {
        let num_workers = num_workers.min(MAX_WORKERS);
        Self {
            kind,
            frames: std::array::from_fn(|_| Frame::new(num_workers)),
            current: AtomicUsize::new(0),
        }
    }

    /// Frame index to stamp into descriptors submitted now
    #[inline]
    pub fn current_frame(&self) -> u16 {
        self.current.load(Ordering::Acquire) as u16
    }

    /// Accumulate one executed job; out-of-range indices are ignored
    pub fn record_job(&self, frame: u16, worker: u16, job_type: JobTypeId, run_us: u64) {
        let Some(frame) = self.frames.get(frame as usize) else {
            return;
        };
        if let Some(w) = frame.workers.get(worker as usize) {
            w.add(run_us);
        }
        if let Some(j) = frame.jobs.get(job_type.as_usize()) {
            j.add(run_us);
        }
    }

    /// Close the current frame at `now_ns` and start the next one
    pub fn update(&self, now_ns: u64) {
        let cur = self.current.load(Ordering::Acquire);
        let next = (cur + 1) % NUM_FRAMES;
        self.frames[cur].end_ns.store(now_ns, Ordering::Relaxed);
        self.frames[next].clear(now_ns);
        self.current.store(next, Ordering::Release);
    }

    fn previous(&self) -> &Frame {
        let cur = self.current.load(Ordering::Acquire);
        &self.frames[(cur + NUM_FRAMES - 1) % NUM_FRAMES]
    }

    /// Per-worker statistics of the last closed frame
    pub fn frame_stats(&self) -> FrameStats {
        let frame = self.previous();
        let start = frame.start_ns.load(Ordering::Relaxed);
        let end = frame.end_ns.load(Ordering::Relaxed);
        let frame_us = end.saturating_sub(start) / 1_000;

        let workers = frame
            .workers
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let (jobs, exec_us) = c.get();
                let utilization = if frame_us == 0 {
                    0.0
                } else {
                    (exec_us as f64 * 100.0 / frame_us as f64).min(100.0) as f32
                };
                WorkerFrameStats {
                    worker: WorkerId::new(self.kind, i as u16),
                    jobs,
                    exec_us,
                    utilization,
                }
            })
            .collect();

        FrameStats { backend: self.kind, frame_us, workers }
    }

    /// Per-job-type statistics of the last closed frame
    ///
    /// Only job types that ran are listed. `name_of` resolves display names.
    pub fn job_frame_stats<F>(&self, name_of: F, order: JobSortOrder) -> Vec<JobFrameStats>
    where
        F: Fn(JobTypeId) -> String,
    {
        let mut stats: Vec<JobFrameStats> = self
            .previous()
            .jobs
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let (count, exec_us) = c.get();
                (count > 0).then(|| {
                    let job_type = JobTypeId::new(i as u32);
                    JobFrameStats { job_type, name: name_of(job_type), count, exec_us }
                })
            })
            .collect();
        sort_job_stats(&mut stats, order);
        stats
    }
}

/// Sort per-job statistics in place
pub fn sort_job_stats(stats: &mut [JobFrameStats], order: JobSortOrder) {
    match order {
        JobSortOrder::TimeHighToLow => stats.sort_by(|a, b| b.exec_us.cmp(&a.exec_us)),
        JobSortOrder::TimeLowToHigh => stats.sort_by(|a, b| a.exec_us.cmp(&b.exec_us)),
        JobSortOrder::Lexical => stats.sort_by(|a, b| a.name.cmp(&b.name)),
        JobSortOrder::NoSort => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sample_ring_keeps_most_recent() {
        let ring = SampleRing::new(4);
        let w = Some(WorkerId::new(BackendKind::Thread, 2));
        for i in 0..6u64 {
            ring.record(JobTypeId::new(i as u32), w, i * 10, i * 10 + 5, SampleKind::Run);
        }
        let snap = ring.snapshot();
        assert_eq!(snap.len(), 4);
        assert_eq!(snap.first().unwrap().job_type.as_u32(), 2);
        assert_eq!(snap.last().unwrap().job_type.as_u32(), 5);
        assert_eq!(snap[0].worker, w);
        assert_eq!(snap[0].duration_ns(), 5);
        assert_eq!(ring.recorded(), 6);
    }

    #[test]
    fn test_sample_ring_concurrent_writers() {
        let ring = Arc::new(SampleRing::new(64));
        let handles: Vec<_> = (0..4u16)
            .map(|t| {
                let ring = ring.clone();
                thread::spawn(move || {
                    for i in 0..1000u64 {
                        ring.record(
                            JobTypeId::new(t as u32),
                            Some(WorkerId::new(BackendKind::Blocking, t)),
                            i,
                            i + 1,
                            SampleKind::Wait,
                        );
                    }
                })
            })
            .collect();
        for _ in 0..100 {
            for s in ring.snapshot() {
                assert_eq!(s.end_ns, s.start_ns + 1);
            }
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ring.recorded(), 4000);
        assert!(ring.snapshot().iter().all(|s| s.kind == SampleKind::Wait));
    }

    #[test]
    fn test_worker_encoding() {
        for id in [
            None,
            Some(WorkerId::new(BackendKind::Thread, 0)),
            Some(WorkerId::new(BackendKind::Blocking, 63)),
        ] {
            assert_eq!(decode_worker(encode_worker(id)), id);
        }
    }

    #[test]
    fn test_frame_rotation_and_stats() {
        let p = BackendProfiler::new(BackendKind::Thread, 2);
        p.update(1_000_000);
        let frame = p.current_frame();
        p.record_job(frame, 0, JobTypeId::new(1), 300);
        p.record_job(frame, 1, JobTypeId::new(1), 100);
        p.record_job(frame, 1, JobTypeId::new(2), 500);
        p.update(2_000_000);

        let stats = p.frame_stats();
        assert_eq!(stats.frame_us, 1_000);
        assert_eq!(stats.total_jobs(), 3);
        assert_eq!(stats.total_exec_us(), 900);
        assert_eq!(stats.workers[1].jobs, 2);
        assert!((stats.workers[0].utilization - 30.0).abs() < 0.01);

        let jobs = p.job_frame_stats(|id| format!("job{}", id), JobSortOrder::TimeHighToLow);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].name, "job2");
        assert_eq!(jobs[1].count, 2);

        // a frame later the counters are gone
        p.update(3_000_000);
        assert_eq!(p.frame_stats().total_jobs(), 0);
    }

    #[test]
    fn test_sort_orders() {
        let mk = |name: &str, us| JobFrameStats {
            job_type: JobTypeId::new(0),
            name: name.to_string(),
            count: 1,
            exec_us: us,
        };
        let mut v = vec![mk("b", 5), mk("a", 9), mk("c", 1)];
        sort_job_stats(&mut v, JobSortOrder::Lexical);
        assert_eq!(v[0].name, "a");
        sort_job_stats(&mut v, JobSortOrder::TimeLowToHigh);
        assert_eq!(v[0].name, "c");
        sort_job_stats(&mut v, JobSortOrder::TimeHighToLow);
        assert_eq!(v[0].name, "a");
    }

    #[test]
    fn test_record_out_of_range_ignored() {
        let p = BackendProfiler::new(BackendKind::Blocking, 1);
        p.record_job(u16::MAX, 0, JobTypeId::new(0), 1);
        p.record_job(0, 40, JobTypeId::NONE, 1);
        p.update(10);
        assert_eq!(p.frame_stats().total_jobs(), 0);
    }
}
