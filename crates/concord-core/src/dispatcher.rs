//! Guard dispatcher: the single guard every instrumented route points at.
//!
//! The router calls the activation and deactivation entry points like any
//! other guard. The dispatcher classifies the navigation state and plays one
//! of four roles:
//!
//! | mode                 | activation entry                | deactivation entry              |
//! |----------------------|---------------------------------|---------------------------------|
//! | router sync          | run local guards, allow         | run local guards, allow         |
//! | activation check     | answer local verdict, deny      | allow (activation will answer)  |
//! | deactivation check   | answer `true`, deny             | answer local verdict, deny      |
//! | unmarked (initiator) | local guards, then canvas peers | local guards, then canvas peers |
//!
//! Answers go back through the pending-check table to the channel handler
//! that forced the navigation.

use crate::config::CoordinationConfig;
use crate::error::{GuardError, ProtocolError};
use crate::gather::{
    ACTIVATION_CHANNEL, CheckHandler, CheckRequest, DEACTIVATION_CHANNEL, ScatterGather,
};
use crate::guard::{
    Guard, GuardContext, GuardFuture, GuardResult, combine_to_boolean, combine_to_guard_result,
    evaluate_all,
};
use crate::navigator::{NavigateOptions, Navigator};
use crate::pending::{PendingChecks, Ticket};
use crate::registry::GuardRegistry;
use crate::state::{NavigationMode, NavigationState, classify};
use futures_util::FutureExt;
use std::sync::{Arc, OnceLock, Weak};

/// Which entry point a guard list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Activation,
    Deactivation,
}

impl Phase {
    fn channel(self) -> &'static str {
        match self {
            Phase::Activation => ACTIVATION_CHANNEL,
            Phase::Deactivation => DEACTIVATION_CHANNEL,
        }
    }

    fn check_mode(self) -> NavigationMode {
        match self {
            Phase::Activation => NavigationMode::ActivationCheckRequested,
            Phase::Deactivation => NavigationMode::DeactivationCheckRequested,
        }
    }
}

/// State that only exists once coordination has been activated.
struct Coordination {
    registry: GuardRegistry,
    pending: Arc<PendingChecks>,
    gatherer: Arc<dyn ScatterGather>,
}

pub struct GuardDispatcher {
    participant: String,
    config: CoordinationConfig,
    coordination: OnceLock<Coordination>,
}

impl GuardDispatcher {
    pub fn new(participant: impl Into<String>, config: CoordinationConfig) -> Arc<Self> {
        Arc::new(Self {
            participant: participant.into(),
            config,
            coordination: OnceLock::new(),
        })
    }

    pub fn participant(&self) -> &str {
        &self.participant
    }

    pub fn is_active(&self) -> bool {
        self.coordination.get().is_some()
    }

    /// Build the registry and pending-check table and answer rounds on both channels.
    ///
    /// `navigator` is this participant's router; it is held weakly since the
    /// router in turn holds the dispatcher through its routes.
    pub fn activate(
        &self,
        gatherer: Arc<dyn ScatterGather>,
        navigator: Weak<dyn Navigator>,
    ) -> Result<(), ProtocolError> {
        let pending = Arc::new(PendingChecks::new());
        let coordination = Coordination {
            registry: GuardRegistry::new(),
            pending: pending.clone(),
            gatherer: gatherer.clone(),
        };
        self.coordination
            .set(coordination)
            .map_err(|_| ProtocolError::AlreadyActivated {
                participant: self.participant.clone(),
            })?;

        for phase in [Phase::Activation, Phase::Deactivation] {
            let handler = check_handler(
                phase,
                self.participant.clone(),
                pending.clone(),
                navigator.clone(),
            );
            gatherer.register_handler(phase.channel(), handler);
        }
        tracing::debug!("guard coordination active for {}", self.participant);
        Ok(())
    }

    /// Stop answering rounds. Later rounds started elsewhere no longer wait on us.
    pub fn teardown(&self) -> Result<(), ProtocolError> {
        let coordination = self.coordination()?;
        coordination.gatherer.destroy(ACTIVATION_CHANNEL);
        coordination.gatherer.destroy(DEACTIVATION_CHANNEL);
        tracing::debug!("guard coordination torn down for {}", self.participant);
        Ok(())
    }

    pub fn registry(&self) -> Result<&GuardRegistry, ProtocolError> {
        Ok(&self.coordination()?.registry)
    }

    pub fn pending(&self) -> Result<&PendingChecks, ProtocolError> {
        Ok(&self.coordination()?.pending)
    }

    /// Guard to install as a route's only activation guard.
    pub fn activation_entry(self: &Arc<Self>) -> Arc<dyn Guard> {
        Arc::new(Entry {
            dispatcher: self.clone(),
            phase: Phase::Activation,
        })
    }

    /// Guard to install as a route's only deactivation guard.
    pub fn deactivation_entry(self: &Arc<Self>) -> Arc<dyn Guard> {
        Arc::new(Entry {
            dispatcher: self.clone(),
            phase: Phase::Deactivation,
        })
    }

    pub async fn on_activation_check(&self, ctx: &GuardContext) -> Result<GuardResult, GuardError> {
        let coordination = self.coordination()?;
        let mode = classify(&ctx.state);
        tracing::debug!(
            "{}: activation guard for {} ({})",
            self.participant,
            ctx.target_url,
            mode
        );

        match mode {
            NavigationMode::RouterSync => {
                let local = self.local_verdict(coordination, ctx, Phase::Activation).await?;
                if !local {
                    tracing::debug!(
                        "{}: activation guards now deny {} after agreement, allowing anyway",
                        self.participant,
                        ctx.target_url
                    );
                }
                Ok(GuardResult::Allow)
            }
            NavigationMode::ActivationCheckRequested => {
                let local = self.local_verdict(coordination, ctx, Phase::Activation).await?;
                self.answer(coordination, ctx, local);
                Ok(GuardResult::Deny)
            }
            NavigationMode::DeactivationCheckRequested => {
                // Reaching activation in a deactivation round means nothing
                // here had deactivation guards to veto with.
                self.answer(coordination, ctx, true);
                Ok(GuardResult::Deny)
            }
            NavigationMode::Unmarked => self.initiate(coordination, ctx, Phase::Activation).await,
        }
    }

    pub async fn on_deactivation_check(
        &self,
        ctx: &GuardContext,
    ) -> Result<GuardResult, GuardError> {
        let coordination = self.coordination()?;
        let mode = classify(&ctx.state);
        tracing::debug!(
            "{}: deactivation guard for {} towards {} ({})",
            self.participant,
            ctx.route.url,
            ctx.target_url,
            mode
        );

        match mode {
            NavigationMode::RouterSync => {
                let local = self.local_verdict(coordination, ctx, Phase::Deactivation).await?;
                if !local {
                    tracing::debug!(
                        "{}: deactivation guards now deny leaving {} after agreement, allowing anyway",
                        self.participant,
                        ctx.route.url
                    );
                }
                Ok(GuardResult::Allow)
            }
            NavigationMode::DeactivationCheckRequested => {
                let local = self.local_verdict(coordination, ctx, Phase::Deactivation).await?;
                self.answer(coordination, ctx, local);
                Ok(GuardResult::Deny)
            }
            // Let the router go on to the activation entry, which answers.
            NavigationMode::ActivationCheckRequested => Ok(GuardResult::Allow),
            NavigationMode::Unmarked => self.initiate(coordination, ctx, Phase::Deactivation).await,
        }
    }

    fn coordination(&self) -> Result<&Coordination, ProtocolError> {
        self.coordination
            .get()
            .ok_or_else(|| ProtocolError::NotActivated {
                participant: self.participant.clone(),
            })
    }

    fn local_guards(
        &self,
        coordination: &Coordination,
        ctx: &GuardContext,
        phase: Phase,
    ) -> Vec<Arc<dyn Guard>> {
        let Some(route) = ctx.route.route_id else {
            tracing::warn!(
                "{}: route {} has no configuration identity, treating as unguarded",
                self.participant,
                ctx.route.path
            );
            return Vec::new();
        };
        match phase {
            Phase::Activation => coordination.registry.activation_guards(route),
            Phase::Deactivation => coordination.registry.deactivation_guards(route),
        }
    }

    async fn local_verdict(
        &self,
        coordination: &Coordination,
        ctx: &GuardContext,
        phase: Phase,
    ) -> Result<bool, GuardError> {
        let guards = self.local_guards(coordination, ctx, phase);
        Ok(combine_to_boolean(evaluate_all(&guards, ctx).await?))
    }

    /// This participant started the navigation: decide locally, then ask everyone else.
    async fn initiate(
        &self,
        coordination: &Coordination,
        ctx: &GuardContext,
        phase: Phase,
    ) -> Result<GuardResult, GuardError> {
        let guards = self.local_guards(coordination, ctx, phase);
        let local = combine_to_guard_result(evaluate_all(&guards, ctx).await?);
        if !local.is_allow() {
            tracing::debug!(
                "{}: local {:?} guards returned {} for {}, not canvassing",
                self.participant,
                phase,
                local,
                ctx.target_url
            );
            return Ok(local);
        }

        let remote = self.canvass(coordination, phase, &ctx.target_url).await?;
        Ok(combine_to_boolean([local, GuardResult::from(remote)]).into())
    }

    async fn canvass(
        &self,
        coordination: &Coordination,
        phase: Phase,
        url: &str,
    ) -> Result<bool, GuardError> {
        let channel = phase.channel();
        let round = coordination
            .gatherer
            .gather(channel, CheckRequest::new(url));

        let response = match self.config.gather_timeout {
            None => round.await?,
            Some(limit) => match tokio::time::timeout(limit, round).await {
                Ok(response) => response?,
                Err(_) => {
                    let verdict = self.config.on_timeout.verdict();
                    tracing::warn!(
                        "{}: {} round for {} timed out after {:?}, verdict {}",
                        self.participant,
                        channel,
                        url,
                        limit,
                        verdict
                    );
                    return Ok(verdict);
                }
            },
        };

        for dissenter in response.dissenters() {
            tracing::info!("{}: {} vetoed {} on {}", self.participant, dissenter, url, channel);
        }
        Ok(response.unanimous())
    }

    /// Deliver a verdict to whichever handler is collecting for this navigation.
    fn answer(&self, coordination: &Coordination, ctx: &GuardContext, verdict: bool) {
        let url = &ctx.target_url;
        let delivered = match Ticket::from_state(&ctx.state) {
            Some(ticket) => coordination.pending.resolve_ticket(url, ticket, verdict),
            None => coordination.pending.resolve(url, verdict),
        };
        if delivered {
            tracing::debug!("{}: answered check for {}: {}", self.participant, url, verdict);
        } else {
            tracing::debug!("{}: no pending check for {}", self.participant, url);
        }
    }
}

/// Guard installed on instrumented routes.
struct Entry {
    dispatcher: Arc<GuardDispatcher>,
    phase: Phase,
}

impl Guard for Entry {
    fn check<'a>(&'a self, ctx: &'a GuardContext) -> GuardFuture<'a> {
        match self.phase {
            Phase::Activation => Box::pin(self.dispatcher.on_activation_check(ctx)),
            Phase::Deactivation => Box::pin(self.dispatcher.on_deactivation_check(ctx)),
        }
    }

    fn is_coordinated(&self) -> bool {
        true
    }
}

/// Answer a round by forcing a check navigation on our own router.
fn check_handler(
    phase: Phase,
    participant: String,
    pending: Arc<PendingChecks>,
    navigator: Weak<dyn Navigator>,
) -> CheckHandler {
    Arc::new(move |request: CheckRequest| {
        let participant = participant.clone();
        let pending = pending.clone();
        let navigator = navigator.clone();
        async move {
            let url = request.url;
            let (ticket, verdict) = pending.insert(&url);
            let state = ticket.attach(NavigationState::with_mode(phase.check_mode()));

            match navigator.upgrade() {
                Some(router) => {
                    match router.navigate_to(&url, NavigateOptions::forced(state)).await {
                        Ok(outcome) => {
                            tracing::debug!("{}: check navigation ended {:?}", participant, outcome)
                        }
                        Err(e) => {
                            tracing::warn!(
                                "{}: check navigation to {} failed, reporting deny: {}",
                                participant,
                                url,
                                e
                            );
                            pending.resolve_ticket(&url, ticket, false);
                        }
                    }
                }
                None => tracing::warn!("{}: router dropped before {} check", participant, url),
            }

            if pending.resolve_ticket(&url, ticket, true) {
                tracing::debug!(
                    "{}: no guard answered {:?} check for {}, reporting allow",
                    participant,
                    phase,
                    url
                );
            }
            verdict.await.unwrap_or(true)
        }
        .boxed()
    })
}
