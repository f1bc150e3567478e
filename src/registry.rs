use crate::verification::{InteractionDiff, UnmatchedRequest};
use crate::{Interaction, PactError, Request};
use log::debug;

/// Identifies a registered interaction for the lifetime of the test that registered it.
///
/// Handles are invalidated when the registry is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractionHandle {
    generation: u64,
    position: usize,
}

/// An [`Interaction`] plus what we learnt about it at runtime.
struct RegisteredInteraction {
    interaction: Interaction,
    satisfied: bool,
}

/// The ordered set of interactions declared for the current test.
///
/// Lookups walk the interactions in registration order and skip those that are already
/// satisfied: the first unsatisfied interaction whose request spec fully matches wins.
/// Two interactions with the same request shape are therefore answered one after the other.
#[derive(Default)]
pub struct InteractionRegistry {
    interactions: Vec<RegisteredInteraction>,
    unmatched: Vec<UnmatchedRequest>,
    generation: u64,
}

impl InteractionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an interaction for the current test.
    ///
    /// Fails if the interaction is invalid, or if another interaction with the same provider
    /// state and description but a different content was already registered.
    pub fn add(&mut self, interaction: Interaction) -> Result<InteractionHandle, PactError> {
        interaction.validate()?;
        let conflict = self
            .interactions
            .iter()
            .any(|r| r.interaction.key() == interaction.key() && r.interaction != interaction);
        if conflict {
            return Err(PactError::ConflictingInteraction {
                state: interaction.state.clone(),
                description: interaction.description.clone(),
            });
        }

        debug!("Registering interaction: {}", interaction.label());
        let handle = InteractionHandle {
            generation: self.generation,
            position: self.interactions.len(),
        };
        self.interactions.push(RegisteredInteraction {
            interaction,
            satisfied: false,
        });
        Ok(handle)
    }

    /// Find the first unsatisfied interaction matching `request` and mark it as satisfied.
    pub fn find_match(&mut self, request: &Request) -> Option<&Interaction> {
        for registered in self.interactions.iter_mut() {
            if !registered.satisfied
                && registered
                    .interaction
                    .request
                    .match_request(request)
                    .is_ok()
            {
                registered.satisfied = true;
                return Some(&registered.interaction);
            }
        }
        None
    }

    /// Explain why `request` matched none of the unsatisfied interactions on its route.
    pub fn diagnose(&self, request: &Request) -> Vec<InteractionDiff> {
        self.interactions
            .iter()
            .filter(|r| !r.satisfied && r.interaction.request.same_route(request))
            .map(|r| InteractionDiff {
                description: r.interaction.description.clone(),
                state: r.interaction.state.clone(),
                mismatches: r.interaction.request.match_request(request).mismatches,
            })
            .collect()
    }

    /// Keep track of a request nothing matched, so that verification can report it.
    pub fn record_unmatched(&mut self, request: &Request) -> &UnmatchedRequest {
        let unmatched = UnmatchedRequest {
            request: request.clone(),
            diffs: self.diagnose(request),
        };
        self.unmatched.push(unmatched);
        &self.unmatched[self.unmatched.len() - 1]
    }

    /// Registered interactions that no request has matched yet, in registration order.
    pub fn unsatisfied(&self) -> Vec<&Interaction> {
        self.interactions
            .iter()
            .filter(|r| !r.satisfied)
            .map(|r| &r.interaction)
            .collect()
    }

    /// Registered interactions that a request has matched, in registration order.
    pub fn satisfied(&self) -> Vec<&Interaction> {
        self.interactions
            .iter()
            .filter(|r| r.satisfied)
            .map(|r| &r.interaction)
            .collect()
    }

    pub fn unmatched_requests(&self) -> &[UnmatchedRequest] {
        &self.unmatched
    }

    /// `None` if the handle belongs to a test whose interactions have been cleared.
    pub fn is_satisfied(&self, handle: InteractionHandle) -> Option<bool> {
        if handle.generation != self.generation {
            return None;
        }
        self.interactions
            .get(handle.position)
            .map(|registered| registered.satisfied)
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Forget every interaction and unmatched request.
    pub fn clear(&mut self) {
        self.interactions.clear();
        self.unmatched.clear();
        self.generation += 1;
    }
}
