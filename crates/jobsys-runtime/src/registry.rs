//! Job-type registry
//!
//! Job types are interned by name once and live for the life of the
//! registry. Registration is cold-path and takes a coarse lock; the hot
//! submission path only touches the `JobHandle` the caller already holds.

use crate::invoke::{invoke_lambda, invoke_typed, LambdaPtr};
use jobsys_core::descriptor::Invoker;
use jobsys_core::error::{JobError, JobResult};
use jobsys_core::id::JobTypeId;
use jobsys_core::job::Job;
use jobsys_core::kinfo;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Immutable description of one job type plus diagnostic counters
pub struct JobType {
    id: JobTypeId,
    name: Box<str>,
    invoker: Invoker,
    /// Parameter type for typed and lambda jobs; `None` for raw byte jobs
    param_type: Option<TypeId>,
    filtered: AtomicBool,
    submitted: AtomicU64,
    ran_inline: AtomicU64,
}

impl JobType {
    #[inline]
    pub fn id(&self) -> JobTypeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn invoker(&self) -> Invoker {
        self.invoker
    }

    #[inline]
    pub fn param_type(&self) -> Option<TypeId> {
        self.param_type
    }

    /// Excluded by the name filter; runs synchronously
    #[inline]
    pub fn is_filtered(&self) -> bool {
        self.filtered.load(Ordering::Relaxed)
    }

    /// Jobs submitted through any backend
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Jobs that ran on the submitting thread
    pub fn ran_inline(&self) -> u64 {
        self.ran_inline.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn note_submitted(&self, inline: bool) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        if inline {
            self.ran_inline.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Handle to a registered job type; cheap to clone
#[derive(Clone)]
pub struct JobHandle(Arc<JobType>);

impl JobHandle {
    #[inline]
    pub fn job_type(&self) -> &JobType {
        &self.0
    }

    #[inline]
    pub fn id(&self) -> JobTypeId {
        self.0.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobHandle({}, {:?})", self.0.id, self.0.name)
    }
}

impl PartialEq for JobHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for JobHandle {}

#[derive(Default)]
struct Inner {
    by_name: HashMap<Box<str>, usize>,
    types: Vec<JobHandle>,
    filter: Vec<String>,
}

/// Name-interned set of job types
pub struct JobRegistry {
    inner: Mutex<Inner>,
}

fn matches_filter(name: &str, filter: &[String]) -> bool {
    filter.iter().any(|f| !f.is_empty() && name.contains(f.as_str()))
}

impl JobRegistry {
    pub fn new(filter: &[String]) -> Self {
        Self {
            inner: Mutex::new(Inner {
                filter: filter.to_vec(),
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a raw byte job type by name, registering it on first use
    ///
    /// The invoker given on first registration wins. An invoker already
    /// serving a typed or lambda job type is rejected.
    pub fn get_or_register(&self, name: &str, invoker: Invoker) -> JobResult<JobHandle> {
        self.register(name, invoker, None)
    }

    /// Look up or register the typed job `J` under `J::NAME`
    pub(crate) fn register_job<J: Job>(&self) -> JobResult<JobHandle> {
        self.get_or_register_typed(J::NAME, invoke_typed::<J>, TypeId::of::<J>())
    }

    /// Look up or register a closure job type
    pub(crate) fn register_lambda(&self, name: &str) -> JobResult<JobHandle> {
        self.get_or_register_typed(name, invoke_lambda, TypeId::of::<LambdaPtr>())
    }

    fn get_or_register_typed(
        &self,
        name: &str,
        invoker: Invoker,
        param_type: TypeId,
    ) -> JobResult<JobHandle> {
        self.register(name, invoker, Some(param_type))
    }

    fn register(&self, name: &str, invoker: Invoker, param_type: Option<TypeId>) -> JobResult<JobHandle> {
        let mut inner = self.lock();
        if let Some(&idx) = inner.by_name.get(name) {
            let existing = &inner.types[idx];
            if existing.0.param_type != param_type {
                return Err(JobError::JobTypeMismatch(name.to_string()));
            }
            return Ok(existing.clone());
        }
        if param_type.is_none()
            && inner
                .types
                .iter()
                .any(|h| h.0.param_type.is_some() && h.0.invoker as usize == invoker as usize)
        {
            return Err(JobError::JobTypeMismatch(name.to_string()));
        }

        let idx = inner.types.len();
        let handle = JobHandle(Arc::new(JobType {
            id: JobTypeId::new(idx as u32),
            name: name.into(),
            invoker,
            param_type,
            filtered: AtomicBool::new(matches_filter(name, &inner.filter)),
            submitted: AtomicU64::new(0),
            ran_inline: AtomicU64::new(0),
        }));
        inner.by_name.insert(name.into(), idx);
        inner.types.push(handle.clone());
        Ok(handle)
    }

    /// Look up without registering
    pub fn lookup(&self, name: &str) -> Option<JobHandle> {
        let inner = self.lock();
        inner.by_name.get(name).map(|&idx| inner.types[idx].clone())
    }

    pub fn by_id(&self, id: JobTypeId) -> Option<JobHandle> {
        self.lock().types.get(id.as_usize()).cloned()
    }

    /// Display name for a job type id; unknown ids render as `#<id>`
    pub fn name_of(&self, id: JobTypeId) -> String {
        self.by_id(id)
            .map(|h| h.name().to_string())
            .unwrap_or_else(|| format!("#{}", id))
    }

    /// Name of the first job type registered with this invoker
    pub fn name_of_invoker(&self, invoker: Invoker) -> Option<String> {
        self.lock()
            .types
            .iter()
            .find(|h| h.0.invoker as usize == invoker as usize)
            .map(|h| h.name().to_string())
    }

    /// Replace the name filter and re-evaluate every registered type
    pub fn set_filter(&self, filter: &[String]) {
        let mut inner = self.lock();
        inner.filter = filter.to_vec();
        for h in &inner.types {
            h.0.filtered
                .store(matches_filter(&h.0.name, &inner.filter), Ordering::Relaxed);
        }
    }

    pub fn filter(&self) -> Vec<String> {
        self.lock().filter.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered handles in registration order
    pub fn handles(&self) -> Vec<JobHandle> {
        self.lock().types.clone()
    }

    /// Log every registered job type
    pub fn dump(&self) {
        let handles = self.handles();
        kinfo!("{} registered job types:", handles.len());
        for h in handles {
            let t = h.job_type();
            kinfo!(
                "  [{:4}] {:<32} submitted={} inline={}{}",
                t.id(),
                t.name(),
                t.submitted(),
                t.ran_inline(),
                if t.is_filtered() { " (filtered)" } else { "" }
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsys_core::descriptor::JobParams;

    fn a(_: &JobParams) {}
    fn b(_: &JobParams) {}

    #[test]
    fn test_interning() {
        let reg = JobRegistry::new(&[]);
        let h1 = reg.get_or_register("Animate", a).unwrap();
        let h2 = reg.get_or_register("Animate", b).unwrap();
        let h3 = reg.get_or_register("Physics", b).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.id(), JobTypeId::new(0));
        assert_eq!(h3.id(), JobTypeId::new(1));
        assert_eq!(h2.job_type().invoker() as usize, a as usize);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_lookup_does_not_insert() {
        let reg = JobRegistry::new(&[]);
        assert!(reg.lookup("Missing").is_none());
        assert!(reg.is_empty());
        reg.get_or_register("Present", a).unwrap();
        assert_eq!(reg.lookup("Present").unwrap().name(), "Present");
        assert_eq!(reg.name_of(JobTypeId::new(0)), "Present");
        assert_eq!(reg.name_of(JobTypeId::new(5)), "#5");
        assert_eq!(reg.name_of_invoker(a).as_deref(), Some("Present"));
        assert!(reg.name_of_invoker(b).is_none());
    }

    #[test]
    fn test_param_type_mismatch() {
        let reg = JobRegistry::new(&[]);
        reg.get_or_register_typed("Skin", a, TypeId::of::<u32>()).unwrap();
        assert!(reg.get_or_register_typed("Skin", a, TypeId::of::<u32>()).is_ok());
        assert_eq!(
            reg.get_or_register_typed("Skin", a, TypeId::of::<u64>()).unwrap_err(),
            JobError::JobTypeMismatch("Skin".to_string())
        );
        assert!(reg.get_or_register("Skin", a).is_err());
    }

    #[derive(Clone, Copy)]
    struct Words {
        a: usize,
        b: usize,
    }

    impl Job for Words {
        const NAME: &'static str = "Words";
        fn run(self) {
            assert_ne!(self.a, self.b);
        }
    }

    #[test]
    fn test_typed_invokers_stay_pinned() {
        let reg = JobRegistry::new(&[]);
        let words = reg.register_job::<Words>().unwrap();
        let lambda = reg.register_lambda("Closure").unwrap();
        assert_eq!(words.job_type().param_type(), Some(TypeId::of::<Words>()));
        assert_eq!(lambda.job_type().param_type(), Some(TypeId::of::<LambdaPtr>()));

        // neither invoker can be reused for raw bytes under another name
        let raw_words = reg.get_or_register("ForgedWords", words.job_type().invoker());
        assert_eq!(raw_words.unwrap_err(), JobError::JobTypeMismatch("ForgedWords".to_string()));
        let raw_lambda = reg.get_or_register("ForgedClosure", invoke_lambda);
        assert_eq!(raw_lambda.unwrap_err(), JobError::JobTypeMismatch("ForgedClosure".to_string()));
        assert!(reg.lookup("ForgedClosure").is_none());

        // a second closure name shares the invoker and stays typed
        assert!(reg.register_lambda("OtherClosure").is_ok());
        assert!(reg.get_or_register("Plain", a).is_ok());
    }

    #[test]
    fn test_filter_substring() {
        let reg = JobRegistry::new(&["Phys".to_string()]);
        let phys = reg.get_or_register("UpdatePhysics", a).unwrap();
        let anim = reg.get_or_register("Animate", a).unwrap();
        assert!(phys.job_type().is_filtered());
        assert!(!anim.job_type().is_filtered());

        reg.set_filter(&["nim".to_string()]);
        assert!(!phys.job_type().is_filtered());
        assert!(anim.job_type().is_filtered());

        reg.set_filter(&[]);
        assert!(!anim.job_type().is_filtered());
    }
}
