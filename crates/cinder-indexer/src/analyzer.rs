use cinder_codemodel::{CheckDepth, Document};

/// Hook for the tokenizer/semantic checker that runs over each freshly
/// processed document. The depth distinguishes open editor buffers
/// ([`CheckDepth::Full`]) from everything else ([`CheckDepth::Fast`]).
///
/// The pipeline itself does not analyze; it records the depth on the
/// document and hands it to whatever implementation is configured.
pub trait Analyzer: Send {
    fn analyze(&mut self, document: &mut Document, depth: CheckDepth);
}

/// Default analyzer: does nothing.
#[derive(Debug, Default)]
pub struct NoopAnalyzer;

impl Analyzer for NoopAnalyzer {
    fn analyze(&mut self, _document: &mut Document, _depth: CheckDepth) {}
}
