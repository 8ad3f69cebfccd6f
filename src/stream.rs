//! Stream dispatch: pick the most specific container definition whose
//! restrictions match a received buffer.

use tracing::{debug, trace};

use crate::bits::BitBuffer;
use crate::definition::{ContainerIdx, DefinitionTree};
use crate::resolve::{resolve_quiet, ContentModel};
use crate::{Error, Result};

/// Matches incoming buffers against a fixed candidate set of container
/// definitions.
///
/// Candidates default to every non-abstract descendant of a root
/// container; restriction checks during dispatch are warning-free, and
/// exactly one candidate must match for dispatch to succeed.
pub struct StreamDispatcher<'a> {
    tree: &'a DefinitionTree,
    candidates: Vec<ContainerIdx>,
}

impl<'a> StreamDispatcher<'a> {
    /// Dispatcher over every non-abstract container inheriting from
    /// `root`.
    #[must_use]
    pub fn new(tree: &'a DefinitionTree, root: ContainerIdx) -> Self {
        let candidates = (0..tree.containers.len())
            .filter(|&c| !tree.container(c).is_abstract && tree.inherits_from(c, root))
            .collect();
        StreamDispatcher { tree, candidates }
    }

    /// Dispatcher over an explicit candidate list, in the given order.
    #[must_use]
    pub fn with_candidates(tree: &'a DefinitionTree, candidates: Vec<ContainerIdx>) -> Self {
        StreamDispatcher { tree, candidates }
    }

    /// Keep only candidates whose names appear in `names`.
    #[must_use]
    pub fn including(mut self, names: &[&str]) -> Self {
        self.candidates
            .retain(|&c| names.contains(&self.tree.container(c).name.as_str()));
        self
    }

    /// Drop candidates whose names appear in `names`.
    #[must_use]
    pub fn excluding(mut self, names: &[&str]) -> Self {
        self.candidates
            .retain(|&c| !names.contains(&self.tree.container(c).name.as_str()));
        self
    }

    #[must_use]
    pub fn candidates(&self) -> &[ContainerIdx] {
        &self.candidates
    }

    /// Resolve `bits` against every candidate and return the single
    /// matching model, or `None` when no candidate matches.
    ///
    /// A candidate that fails to resolve at all (buffer too short for its
    /// layout, unusable repeat count) simply does not match; such failures
    /// are expected when probing definitions against foreign data.
    ///
    /// # Errors
    /// [`Error::AmbiguousMatch`] when more than one candidate matches.
    pub fn dispatch(&self, bits: &BitBuffer) -> Result<Option<ContentModel>> {
        let mut matched: Option<ContentModel> = None;
        let mut matches = 0usize;
        for &candidate in &self.candidates {
            let name = &self.tree.container(candidate).name;
            match resolve_quiet(self.tree, candidate, bits) {
                Ok(model) if model.matches_restrictions() => {
                    trace!(container = %name, "candidate matched");
                    matches += 1;
                    if matched.is_none() {
                        matched = Some(model);
                    }
                }
                Ok(_) => trace!(container = %name, "restrictions not satisfied"),
                Err(err) => trace!(container = %name, %err, "candidate failed to resolve"),
            }
        }
        if matches > 1 {
            return Err(Error::AmbiguousMatch(matches));
        }
        debug!(
            candidates = self.candidates.len(),
            matched = matches,
            "dispatched buffer"
        );
        Ok(matched)
    }
}
