/// Structured trace of pipeline decisions.
///
/// Tracing output is for humans; the journal is what tests and the CLI inspect
/// to see what a coordinator actually did (including silent cancellations).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    FetchIssued,
    FetchSkipped,
    FetchCancelled,
    FetchFailed,
    BatchApplied,
    Committed,
    Discarded,
    TornDown,
    RadiusAdjusted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineEvent {
    /// 0-based position in the journal.
    pub seq: u64,
    pub source: &'static str,
    pub kind: EventKind,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Journal {
    next_seq: u64,
    events: Vec<PipelineEvent>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, source: &'static str, kind: EventKind, message: impl Into<String>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(PipelineEvent {
            seq,
            source,
            kind,
            message: message.into(),
        });
    }

    pub fn events(&self) -> &[PipelineEvent] {
        &self.events
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    pub fn last(&self, kind: EventKind) -> Option<&PipelineEvent> {
        self.events.iter().rev().find(|e| e.kind == kind)
    }

    /// Sequence numbers keep increasing across drains.
    pub fn drain(&mut self) -> Vec<PipelineEvent> {
        std::mem::take(&mut self.events)
    }
}
