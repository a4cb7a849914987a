//! Test utilities: mock plugins and pipeline builders

use async_trait::async_trait;
use flowline::core::{
    Data, Extract, ExtractPhase, Load, LoadPhase, MergeExtract, Phase, PhaseKind, Pipeline, PipelineType, Plugin,
    PostProcess, PreProcess, Transform, TransformLoad, TransformLoadPhase, TransformPhase,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared, ordered log of what the mocks did
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Position of an entry, panicking with the full log if absent
    pub fn position(&self, entry: &str) -> usize {
        let entries = self.entries();
        entries
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("'{}' not found in log {:?}", entry, entries))
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries().iter().any(|e| e == entry)
    }
}

/// Extract step returning fixed data after an optional delay
pub struct MockExtract {
    id: String,
    data: Data,
    delay: Duration,
    fail: bool,
    calls: Arc<AtomicUsize>,
    log: EventLog,
}

impl MockExtract {
    pub fn new(id: &str, data: Data) -> Self {
        Self {
            id: id.to_string(),
            data,
            delay: Duration::ZERO,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
            log: EventLog::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_log(mut self, log: &EventLog) -> Self {
        self.log = log.clone();
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Plugin for MockExtract {
    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Extract for MockExtract {
    async fn extract(&self) -> anyhow::Result<Data> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.push(format!("start:{}", self.id));
        tokio::time::sleep(self.delay).await;
        self.log.push(format!("end:{}", self.id));
        if self.fail {
            anyhow::bail!("{} could not reach its source", self.id);
        }
        Ok(self.data.clone())
    }
}

/// Transform step backed by a closure
pub struct FnTransform {
    id: String,
    f: Box<dyn Fn(Data) -> anyhow::Result<Data> + Send + Sync>,
}

impl FnTransform {
    pub fn new<F>(id: &str, f: F) -> Self
    where
        F: Fn(Data) -> anyhow::Result<Data> + Send + Sync + 'static,
    {
        Self {
            id: id.to_string(),
            f: Box::new(f),
        }
    }

    /// Blocks the calling thread, like a CPU-heavy transform would
    pub fn blocking(id: &str, duration: Duration) -> Self {
        Self::new(id, move |data| {
            std::thread::sleep(duration);
            Ok(data)
        })
    }
}

impl Plugin for FnTransform {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Transform for FnTransform {
    fn transform(&self, data: Data) -> anyhow::Result<Data> {
        (self.f)(data)
    }
}

/// Load step recording every value it receives
pub struct RecordingLoad {
    id: String,
    delay: Duration,
    received: Arc<Mutex<Vec<Data>>>,
    log: EventLog,
}

impl RecordingLoad {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            delay: Duration::ZERO,
            received: Arc::new(Mutex::new(Vec::new())),
            log: EventLog::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_log(mut self, log: &EventLog) -> Self {
        self.log = log.clone();
        self
    }

    pub fn received(&self) -> Arc<Mutex<Vec<Data>>> {
        self.received.clone()
    }
}

impl Plugin for RecordingLoad {
    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Load for RecordingLoad {
    async fn load(&self, data: &Data) -> anyhow::Result<()> {
        self.log.push(format!("start:{}", self.id));
        tokio::time::sleep(self.delay).await;
        self.received.lock().unwrap().push(data.clone());
        self.log.push(format!("end:{}", self.id));
        Ok(())
    }
}

/// Merge step returning the id-to-data mapping as an object
pub struct MappingMerge {
    id: String,
}

impl MappingMerge {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

impl Plugin for MappingMerge {
    fn id(&self) -> &str {
        &self.id
    }
}

impl MergeExtract for MappingMerge {
    fn merge(&self, data: HashMap<String, Data>) -> anyhow::Result<Data> {
        Ok(Data::Object(data.into_iter().collect()))
    }
}

/// Step logging its invocation; usable as pre, post and transform-at-load
pub struct LoggingStep {
    id: String,
    log: EventLog,
    fail: bool,
}

impl LoggingStep {
    pub fn new(id: &str, log: &EventLog) -> Self {
        Self {
            id: id.to_string(),
            log: log.clone(),
            fail: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn run(&self) -> anyhow::Result<Data> {
        self.log.push(self.id.clone());
        if self.fail {
            anyhow::bail!("{} failed", self.id);
        }
        Ok(Data::String(self.id.clone()))
    }
}

impl Plugin for LoggingStep {
    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl PreProcess for LoggingStep {
    async fn pre_process(&self) -> anyhow::Result<Data> {
        self.run()
    }
}

#[async_trait]
impl PostProcess for LoggingStep {
    async fn post_process(&self) -> anyhow::Result<Data> {
        self.run()
    }
}

#[async_trait]
impl TransformLoad for LoggingStep {
    async fn transform_load(&self) -> anyhow::Result<()> {
        self.run().map(|_| ())
    }
}

/// Assembles a pipeline from phases
pub struct PipelineBuilder {
    name: String,
    pipeline_type: PipelineType,
    phases: HashMap<PhaseKind, Phase>,
    needs: HashSet<String>,
}

impl PipelineBuilder {
    pub fn new(name: &str, pipeline_type: PipelineType) -> Self {
        Self {
            name: name.to_string(),
            pipeline_type,
            phases: HashMap::new(),
            needs: HashSet::new(),
        }
    }

    pub fn extract(mut self, phase: ExtractPhase) -> Self {
        self.phases.insert(PhaseKind::Extract, Phase::Extract(phase));
        self
    }

    pub fn transform(mut self, phase: TransformPhase) -> Self {
        self.phases.insert(PhaseKind::Transform, Phase::Transform(phase));
        self
    }

    pub fn load(mut self, phase: LoadPhase) -> Self {
        self.phases.insert(PhaseKind::Load, Phase::Load(phase));
        self
    }

    pub fn transform_at_load(mut self, phase: TransformLoadPhase) -> Self {
        self.phases.insert(PhaseKind::TransformAtLoad, Phase::TransformLoad(phase));
        self
    }

    pub fn needs(mut self, names: &[&str]) -> Self {
        self.needs.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline::new(self.name, self.pipeline_type, self.phases, Some(self.needs)).unwrap()
    }
}

pub fn single_extract(step: impl Extract + 'static) -> ExtractPhase {
    ExtractPhase::new(vec![Arc::new(step)], vec![], None).unwrap()
}

pub fn single_load(step: impl Load + 'static) -> LoadPhase {
    LoadPhase::new(vec![Arc::new(step)], vec![], vec![]).unwrap()
}

/// ETL pipeline with one logging extract of `delay_ms` and one load
pub fn timed_etl(name: &str, needs: &[&str], delay_ms: u64, log: &EventLog) -> Pipeline {
    PipelineBuilder::new(name, PipelineType::Etl)
        .extract(single_extract(
            MockExtract::new(name, Data::Null)
                .with_delay(Duration::from_millis(delay_ms))
                .with_log(log),
        ))
        .load(single_load(RecordingLoad::new(&format!("{}_sink", name))))
        .needs(needs)
        .build()
}

/// Names of the executed pipelines, sorted
pub fn sorted(executed: &HashSet<String>) -> Vec<String> {
    let mut names: Vec<String> = executed.iter().cloned().collect();
    names.sort();
    names
}
