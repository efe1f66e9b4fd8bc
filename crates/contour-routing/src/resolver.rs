//! Matching resolver: which published handlers want this message
//!
//! Every directory key is read and every pattern of its registration is
//! evaluated, so cost grows linearly with the number of handlers. Reads run
//! concurrently; per registration the first matching pattern in publish
//! order decides the score.

use futures::future::join_all;

use contour_core::{ContourResult, HandlerIdentity, HandlerRegistration};
use contour_directory::Directory;
use contour_predicate::{Message, PredicateEngine};

use crate::candidate::MatchingCandidate;

/// Turns a message into scored candidates using the directory
#[derive(Debug, Clone)]
pub struct MatchingResolver {
    directory: Directory,
    engine: PredicateEngine,
}

impl MatchingResolver {
    /// Create a resolver over `directory`
    pub fn new(directory: Directory, engine: PredicateEngine) -> Self {
        Self { directory, engine }
    }

    /// Directory the resolver reads
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Candidates for `message`, in key enumeration order.
    ///
    /// Keys that read as absent are skipped. A failed point read is logged
    /// and skipped; a failed key enumeration fails the call.
    #[tracing::instrument(skip_all)]
    pub async fn resolve<M: Message>(&self, message: &M) -> ContourResult<Vec<MatchingCandidate>> {
        let keys = self.directory.enumerate_keys().await?;
        let reads = join_all(keys.into_iter().map(|identity| async move {
            let result = self.directory.get(&identity).await;
            (identity, result)
        }))
        .await;

        let mut candidates = Vec::new();
        for (identity, result) in reads {
            match result {
                Ok(Some(registration)) => {
                    if let Some(candidate) = self.evaluate(identity, &registration, message) {
                        candidates.push(candidate);
                    }
                }
                Ok(None) => {
                    tracing::trace!(identity = %identity, "Registration not yet visible");
                }
                Err(err) => {
                    tracing::warn!(identity = %identity, error = %err, "Skipping unreadable registration");
                }
            }
        }
        tracing::debug!(candidates = candidates.len(), "Resolved message");
        Ok(candidates)
    }

    /// Candidate produced by one registration, if any pattern matches
    pub fn evaluate<M: Message>(
        &self,
        identity: HandlerIdentity,
        registration: &HandlerRegistration,
        message: &M,
    ) -> Option<MatchingCandidate> {
        let mut matching = registration
            .patterns()
            .iter()
            .filter(|pattern| self.engine.matches(*pattern, message));
        let first = matching.next()?;

        let extra = matching.count();
        if extra > 0 {
            tracing::warn!(
                identity = %identity,
                matched = extra + 1,
                pattern = %first,
                "Several patterns of one registration match, using the first"
            );
        }

        Some(MatchingCandidate {
            identity,
            score: first.score(),
            trust_weight: registration.trust_weight(),
            is_secondary: first.is_secondary(),
        })
    }
}
