//! Lazy, pull-based fragment production.
//!
//! A [`FragmentStream`] plans one element kind at a time and builds each
//! fragment only when the caller asks for it. Dropping the stream cancels the
//! remaining work. Related neighbours are merged as in the eager path, which
//! may plan the next kind one fragment early. Fragments carry no `total`,
//! since the sequence length is unknown until the end.

use std::collections::VecDeque;
use std::iter::FusedIterator;

use specweave_core::{ElementKind, FragmentId, SpecDocument};
use tracing::{debug, trace};

use super::SemanticChunker;
use super::fragments::{FragmentFactory, Overlap, Plan};
use super::grouping::plan_kind;
use crate::errors::{ContextError, Result};
use crate::relationships::RelationshipGraph;
use crate::types::{ChunkingStrategy, ContextFragment};

/// Forward-only cursor over the fragments of one document.
///
/// Yields `Err` at most once, after which it is exhausted. Iterating again
/// requires a new stream, which re-plans from scratch.
pub struct FragmentStream<'a> {
    chunker: &'a SemanticChunker,
    document: &'a SpecDocument,
    strategy: ChunkingStrategy,
    graph: Option<RelationshipGraph>,
    kinds: VecDeque<ElementKind>,
    pending: VecDeque<Plan>,
    deferred: Option<ContextError>,
    previous: Option<(FragmentId, Vec<String>)>,
    index: usize,
    finished: bool,
}

impl<'a> FragmentStream<'a> {
    pub(crate) fn new(
        chunker: &'a SemanticChunker,
        document: &'a SpecDocument,
        strategy: ChunkingStrategy,
    ) -> Self {
        let kinds = super::priority_kinds(&strategy).into();
        Self {
            chunker,
            document,
            strategy,
            graph: None,
            kinds,
            pending: VecDeque::new(),
            deferred: None,
            previous: None,
            index: 0,
            finished: false,
        }
    }

    /// Strategy the stream was built with.
    pub fn strategy(&self) -> &ChunkingStrategy {
        &self.strategy
    }

    /// Number of fragments yielded so far.
    pub fn yielded(&self) -> usize {
        self.index
    }

    fn advance(&mut self) -> Result<Option<ContextFragment>> {
        let document = self.document;
        let graph: &RelationshipGraph = self
            .graph
            .get_or_insert_with(|| RelationshipGraph::for_document(document));
        let factory = FragmentFactory::new(
            document,
            graph,
            &self.chunker.assessor,
            self.chunker.estimator,
            self.chunker.budget(&self.strategy),
        );

        if let Some(error) = self.deferred.take() {
            return Err(error);
        }
        plan_ahead(&mut self.kinds, &mut self.pending, document, &factory, &self.strategy)?;
        let Some(mut plan) = self.pending.pop_front() else {
            debug!(document = %document.name, fragments = self.index, "stream exhausted");
            return Ok(None);
        };

        if self.strategy.preserve_relationships {
            loop {
                // A planning failure surfaces on the next call, after this fragment.
                if let Err(error) =
                    plan_ahead(&mut self.kinds, &mut self.pending, document, &factory, &self.strategy)
                {
                    self.deferred = Some(error);
                }
                let Some(next) = self.pending.front() else {
                    break;
                };
                if !factory.try_absorb(&mut plan, next, self.strategy.max_chunk_size)? {
                    break;
                }
                let _ = self.pending.pop_front();
            }
        }

        let overlap = match self.previous.take() {
            Some((with, ids)) if self.strategy.overlap_size > 0 => Some(Overlap {
                with,
                ids: factory.overlap_tail(&ids, self.strategy.overlap_size)?,
            }),
            _ => None,
        };
        let fragment = factory.build(&plan, self.index, None, overlap)?;
        self.previous = Some((fragment.id.clone(), plan.ids));
        self.index += 1;
        Ok(Some(fragment))
    }
}

/// Plan kinds until `pending` holds a plan or no kind is left.
fn plan_ahead(
    kinds: &mut VecDeque<ElementKind>,
    pending: &mut VecDeque<Plan>,
    document: &SpecDocument,
    factory: &FragmentFactory<'_>,
    strategy: &ChunkingStrategy,
) -> Result<()> {
    while pending.is_empty() {
        let Some(kind) = kinds.pop_front() else {
            return Ok(());
        };
        let plans = plan_kind(kind, document, factory, strategy)?;
        trace!(kind = %kind, plans = plans.len(), "stream planned kind");
        pending.extend(plans);
    }
    Ok(())
}

impl Iterator for FragmentStream<'_> {
    type Item = Result<ContextFragment>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(fragment)) => Some(Ok(fragment)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(error) => {
                self.finished = true;
                Some(Err(error))
            }
        }
    }
}

impl FusedIterator for FragmentStream<'_> {}
