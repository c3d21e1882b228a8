//! The checkout payment state machine.
//!
//! One attempt drives a committed checkout through rate resolution, fresh
//! balance/allowance reads, an optional approval call, and the transfer
//! call, polling each submission to finality. The machine enforces by
//! construction that the transfer is never built or submitted before a
//! required approval is confirmed, and that one committed attempt never
//! issues two transfers: resume with the same attempt token skips every
//! sub-call that already confirmed and re-queries any that was left
//! pending.
//!
//! Concurrency discipline is single-writer per session: a second
//! `begin_attempt` for a session with an attempt in flight is rejected.
//! Cancellation stops further submissions immediately, but confirmation
//! polling of anything already submitted is finished on a detached task so
//! the attempt record converges to what the ledger actually did.

use std::sync::Arc;

use alloy_primitives::U256;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::amount::{TokenAmount, TokenDeployment};
use crate::attempt::{
    AttemptStage, AttemptState, AttemptToken, FailureReason, PaymentAttempt, SubCallKind,
    SubCallStatus,
};
use crate::call::CallBuilder;
use crate::cart::CartStore;
use crate::config::OrchestratorConfig;
use crate::error::{CheckoutError, ExecutorError, QueryError, RateError};
use crate::executor::{Credentials, TransactionExecutor, TxHandle, TxStatus};
use crate::ledger::{LedgerAddress, LedgerReader};
use crate::oracle::{FiatCurrency, RatePair, RateSource};
use crate::retry::{RetryError, with_retry};
use crate::session::SessionId;

/// How the amount to settle is determined.
#[derive(Debug, Clone)]
pub enum Pricing {
    /// The cart is priced in fiat; convert through the rate source.
    Fiat {
        /// Fiat currency the cart prices are in.
        currency: FiatCurrency,
    },
    /// The amount is already known in token base units; no conversion.
    Token {
        /// Amount to transfer, in base units.
        amount: U256,
    },
}

/// Everything one payment attempt needs from the checkout.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    /// The session being paid for.
    pub session: SessionId,
    /// Resume a prior committed attempt instead of starting a new one.
    pub resume: Option<AttemptToken>,
    /// The buyer's custodial wallet.
    pub payer: LedgerAddress,
    /// Where the payment goes.
    pub merchant: LedgerAddress,
    /// The settlement contract that moves the tokens; the approval's
    /// spender and the transfer call's target.
    pub spender: LedgerAddress,
    /// Chosen settlement currency.
    pub token: TokenDeployment,
    /// Fiat-priced or token-priced checkout.
    pub pricing: Pricing,
    /// Credentials the executor signs with.
    pub credentials: Credentials,
}

/// Live view of a running (or finished) payment attempt.
pub struct AttemptHandle {
    token: AttemptToken,
    state: watch::Receiver<AttemptState>,
    record: Arc<Mutex<PaymentAttempt>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for AttemptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptHandle")
            .field("token", &self.token)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl AttemptHandle {
    /// The attempt's idempotency token; pass it back as
    /// [`PaymentIntent::resume`] to re-enter safely.
    #[must_use]
    pub const fn token(&self) -> AttemptToken {
        self.token
    }

    /// The current attempt state.
    #[must_use]
    pub fn state(&self) -> AttemptState {
        *self.state.borrow()
    }

    /// Waits for the next state change and returns the new state.
    pub async fn changed(&mut self) -> AttemptState {
        // An error means the attempt task finished; the last state stands.
        let _ = self.state.changed().await;
        self.state()
    }

    /// Waits until the attempt reaches a terminal state.
    pub async fn wait_terminal(&mut self) -> AttemptState {
        loop {
            let current = self.state();
            if current.is_terminal() {
                return current;
            }
            if self.state.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// Snapshot of the full attempt record.
    pub async fn attempt(&self) -> PaymentAttempt {
        self.record.lock().await.clone()
    }

    /// Cancels the attempt. No further submissions are made; anything
    /// already submitted is still polled to finality in the background.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// The orchestrator: holds the injected capabilities and runs one payment
/// attempt per session at a time.
pub struct CheckoutOrchestrator {
    rates: Arc<dyn RateSource>,
    ledger: Arc<dyn LedgerReader>,
    builder: Arc<dyn CallBuilder>,
    executor: Arc<dyn TransactionExecutor>,
    config: OrchestratorConfig,
    in_flight: DashMap<SessionId, AttemptToken>,
    attempts: DashMap<AttemptToken, Arc<Mutex<PaymentAttempt>>>,
    tracker: TaskTracker,
}

impl std::fmt::Debug for CheckoutOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutOrchestrator")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

/// Shared context of one running attempt.
struct AttemptCtx {
    intent: PaymentIntent,
    cart: Arc<Mutex<CartStore>>,
    record: Arc<Mutex<PaymentAttempt>>,
    state_tx: watch::Sender<AttemptState>,
    cancel: CancellationToken,
}

impl AttemptCtx {
    async fn set_state(&self, state: AttemptState) {
        self.record.lock().await.state = state;
        self.state_tx.send_replace(state);
        #[cfg(feature = "telemetry")]
        tracing::debug!(state = ?state, "attempt state");
    }

    fn current_state(&self) -> AttemptState {
        *self.state_tx.borrow()
    }
}

/// The hop an attempt is in while `state` is current; used when the
/// overall deadline fires.
const fn stage_of(state: AttemptState) -> AttemptStage {
    match state {
        AttemptState::Idle => AttemptStage::Rate,
        AttemptState::RateResolved { .. } => AttemptStage::Balance,
        AttemptState::BalanceChecked => AttemptStage::ApprovalSubmit,
        AttemptState::ApprovalPending => AttemptStage::ApprovalConfirm,
        AttemptState::ApprovalConfirmed => AttemptStage::TransferSubmit,
        AttemptState::TransferPending
        | AttemptState::TransferConfirmed
        | AttemptState::Failed { .. } => AttemptStage::TransferConfirm,
    }
}

fn rate_failure(error: RetryError<RateError>) -> FailureReason {
    match error {
        RetryError::Cancelled => FailureReason::Cancelled,
        RetryError::TimedOut | RetryError::Exhausted(_) | RetryError::Terminal(_) => {
            FailureReason::RateUnavailable
        }
    }
}

fn query_failure(error: &RetryError<QueryError>, stage: AttemptStage) -> FailureReason {
    match error {
        RetryError::Cancelled => FailureReason::Cancelled,
        RetryError::TimedOut | RetryError::Exhausted(_) | RetryError::Terminal(_) => {
            FailureReason::Timeout { stage }
        }
    }
}

fn submit_failure(error: RetryError<ExecutorError>, stage: AttemptStage) -> FailureReason {
    match error {
        RetryError::Cancelled => FailureReason::Cancelled,
        RetryError::Terminal(ExecutorError::Credentials(_)) => FailureReason::Credentials,
        RetryError::Terminal(ExecutorError::MalformedCall(_)) => FailureReason::MalformedCall,
        RetryError::TimedOut
        | RetryError::Exhausted(_)
        | RetryError::Terminal(ExecutorError::Unavailable(_)) => FailureReason::Timeout { stage },
    }
}

impl CheckoutOrchestrator {
    /// Creates an orchestrator over the injected capabilities.
    #[must_use]
    pub fn new(
        rates: Arc<dyn RateSource>,
        ledger: Arc<dyn LedgerReader>,
        builder: Arc<dyn CallBuilder>,
        executor: Arc<dyn TransactionExecutor>,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            rates,
            ledger,
            builder,
            executor,
            config,
            in_flight: DashMap::new(),
            attempts: DashMap::new(),
            tracker: TaskTracker::new(),
        })
    }

    /// Commits the checkout to a payment attempt.
    ///
    /// Generates the idempotency token (or reuses [`PaymentIntent::resume`])
    /// and spawns the attempt; the returned handle observes and cancels it.
    /// The cart is cleared only when the attempt reaches
    /// [`AttemptState::TransferConfirmed`].
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::AttemptInFlight`] if the session already has a
    ///   running attempt.
    /// - [`CheckoutError::NothingToPay`] on an empty cart or zero amount.
    pub async fn begin_attempt(
        self: &Arc<Self>,
        intent: PaymentIntent,
        cart: Arc<Mutex<CartStore>>,
    ) -> Result<AttemptHandle, CheckoutError> {
        match &intent.pricing {
            Pricing::Fiat { .. } => {
                if cart.lock().await.is_empty() {
                    return Err(CheckoutError::NothingToPay);
                }
            }
            Pricing::Token { amount } => {
                if amount.is_zero() {
                    return Err(CheckoutError::NothingToPay);
                }
            }
        }

        let token = intent.resume.unwrap_or_else(AttemptToken::generate);
        match self.in_flight.entry(intent.session.clone()) {
            Entry::Occupied(_) => {
                return Err(CheckoutError::AttemptInFlight(intent.session.to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(token);
            }
        }

        let record = Arc::clone(
            &self
                .attempts
                .entry(token)
                .or_insert_with(|| {
                    Arc::new(Mutex::new(PaymentAttempt::new(token, intent.session.clone())))
                }),
        );
        // A resumed record starts over; confirmed sub-calls stay on file.
        record.lock().await.state = AttemptState::Idle;

        #[cfg(feature = "telemetry")]
        tracing::info!(session = %intent.session, %token, resumed = intent.resume.is_some(), "payment attempt begins");

        let (state_tx, state_rx) = watch::channel(AttemptState::Idle);
        let cancel = CancellationToken::new();
        let ctx = AttemptCtx {
            intent,
            cart,
            record: Arc::clone(&record),
            state_tx,
            cancel: cancel.clone(),
        };
        let this = Arc::clone(self);
        self.tracker.spawn(async move { this.run(ctx).await });

        Ok(AttemptHandle {
            token,
            state: state_rx,
            record,
            cancel,
        })
    }

    /// Closes the attempt tracker and waits for every spawned task,
    /// including detached confirmation pollers.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    async fn run(self: Arc<Self>, ctx: AttemptCtx) {
        let token = ctx.record.lock().await.token;
        let outcome = tokio::select! {
            outcome = self.drive(&ctx) => outcome,
            () = tokio::time::sleep(self.config.attempt_deadline()) => {
                ctx.cancel.cancel();
                Err(FailureReason::Timeout { stage: stage_of(ctx.current_state()) })
            }
        };
        match outcome {
            Ok(()) => {
                // Terminal success already published by drive(); the record
                // is done and leaves the resume registry.
                self.attempts.remove(&token);
                self.in_flight.remove(&ctx.intent.session);
            }
            Err(reason) => {
                if matches!(
                    reason,
                    FailureReason::Cancelled | FailureReason::Timeout { .. }
                ) {
                    // The ledger may still land what we submitted; keep
                    // polling in the background so the record stays true.
                    self.finalize_pending(&ctx).await;
                }
                self.in_flight.remove(&ctx.intent.session);
                #[cfg(feature = "telemetry")]
                tracing::warn!(%token, reason = ?reason, "payment attempt failed");
                ctx.set_state(AttemptState::Failed { reason }).await;
            }
        }
    }

    async fn drive(&self, ctx: &AttemptCtx) -> Result<(), FailureReason> {
        let intent = &ctx.intent;
        let token_dep = &intent.token;
        let attempt_token = ctx.record.lock().await.token;

        // Resume from the next unconfirmed step: a transfer that already
        // landed concludes the attempt, and one left pending is re-queried
        // against the ledger, never resubmitted and never re-gated on a
        // balance the landed transfer itself may have reduced.
        if ctx.record.lock().await.confirmed(SubCallKind::Transfer) {
            ctx.set_state(AttemptState::TransferConfirmed).await;
            ctx.cart.lock().await.clear();
            return Ok(());
        }
        let prior_transfer = ctx.record.lock().await.pending_handle(SubCallKind::Transfer);
        if let Some(handle) = prior_transfer {
            ctx.set_state(AttemptState::TransferPending).await;
            self.await_confirmation(ctx, SubCallKind::Transfer, &handle)
                .await?;
            ctx.set_state(AttemptState::TransferConfirmed).await;
            ctx.cart.lock().await.clear();
            return Ok(());
        }

        // Resolve the amount to settle, converting through the oracle when
        // the cart is fiat-priced.
        let (amount, stale) = match &intent.pricing {
            Pricing::Token { amount } => (*amount, false),
            Pricing::Fiat { currency } => {
                let subtotal = ctx.cart.lock().await.subtotal();
                let pair = RatePair::new(currency.clone(), token_dep.symbol.clone());
                let quote = with_retry(
                    &self.config.retry,
                    self.config.call_timeout(),
                    &ctx.cancel,
                    || self.rates.rate(&pair),
                )
                .await
                .map_err(rate_failure)?;
                ctx.record.lock().await.rate = Some(quote);
                let amount = TokenAmount::from_fiat(subtotal, quote.rate, token_dep.decimals)
                    .map_err(|_| FailureReason::AmountOutOfRange)?;
                (amount.value(), quote.stale)
            }
        };
        ctx.set_state(AttemptState::RateResolved { stale }).await;

        let (balance, allowance) = self.fresh_reads(ctx).await?;
        if balance < amount {
            return Err(FailureReason::InsufficientBalance);
        }
        ctx.set_state(AttemptState::BalanceChecked).await;

        if allowance < amount {
            if ctx.record.lock().await.confirmed(SubCallKind::Approval) {
                // A confirmed approval no longer covers the amount; the
                // grant evidently did not take effect as recorded.
                return Err(FailureReason::CallReverted);
            }
            // Bind before matching: the record guard must not be held
            // across the submission await.
            let prior = ctx.record.lock().await.pending_handle(SubCallKind::Approval);
            let handle = match prior {
                // Resume: a prior submission may have landed; re-query it
                // instead of submitting again.
                Some(handle) => handle,
                None => {
                    let nonce = attempt_token.call_nonce(SubCallKind::Approval);
                    let call = self
                        .builder
                        .build_approval(&intent.spender, amount, token_dep, nonce)
                        .map_err(|_| FailureReason::AmountOutOfRange)?;
                    let handle = with_retry(
                        &self.config.retry,
                        self.config.call_timeout(),
                        &ctx.cancel,
                        || self.executor.submit(&call, &intent.credentials),
                    )
                    .await
                    .map_err(|e| submit_failure(e, AttemptStage::ApprovalSubmit))?;
                    #[cfg(feature = "telemetry")]
                    tracing::info!(tx = %handle, "approval submitted");
                    ctx.record
                        .lock()
                        .await
                        .record_submitted(SubCallKind::Approval, handle.clone());
                    handle
                }
            };
            ctx.set_state(AttemptState::ApprovalPending).await;
            self.await_confirmation(ctx, SubCallKind::Approval, &handle)
                .await?;
            ctx.set_state(AttemptState::ApprovalConfirmed).await;

            // The transfer descriptor only exists once a fresh read shows
            // the allowance actually covers the amount.
            let allowance = self.read_allowance(ctx).await?;
            if allowance < amount {
                return Err(FailureReason::CallReverted);
            }
            let balance = self.read_balance(ctx).await?;
            if balance < amount {
                return Err(FailureReason::InsufficientBalance);
            }
        }

        let nonce = attempt_token.call_nonce(SubCallKind::Transfer);
        let call = self
            .builder
            .build_transfer(&intent.merchant, amount, token_dep, nonce)
            .map_err(|_| FailureReason::AmountOutOfRange)?;
        let handle = with_retry(
            &self.config.retry,
            self.config.call_timeout(),
            &ctx.cancel,
            || self.executor.submit(&call, &intent.credentials),
        )
        .await
        .map_err(|e| submit_failure(e, AttemptStage::TransferSubmit))?;
        #[cfg(feature = "telemetry")]
        tracing::info!(tx = %handle, "transfer submitted");
        ctx.record
            .lock()
            .await
            .record_submitted(SubCallKind::Transfer, handle.clone());
        ctx.set_state(AttemptState::TransferPending).await;
        self.await_confirmation(ctx, SubCallKind::Transfer, &handle)
            .await?;
        ctx.set_state(AttemptState::TransferConfirmed).await;
        ctx.cart.lock().await.clear();
        #[cfg(feature = "telemetry")]
        tracing::info!(tx = %handle, "transfer confirmed, cart cleared");
        Ok(())
    }

    /// Balance and allowance, read fresh and concurrently.
    async fn fresh_reads(&self, ctx: &AttemptCtx) -> Result<(U256, U256), FailureReason> {
        let balance = async { self.read_balance(ctx).await };
        let allowance = async { self.read_allowance(ctx).await };
        futures_util::try_join!(balance, allowance)
    }

    async fn read_balance(&self, ctx: &AttemptCtx) -> Result<U256, FailureReason> {
        let intent = &ctx.intent;
        with_retry(
            &self.config.retry,
            self.config.call_timeout(),
            &ctx.cancel,
            || self.ledger.balance(&intent.payer, &intent.token.address),
        )
        .await
        .map_err(|e| query_failure(&e, AttemptStage::Balance))
    }

    async fn read_allowance(&self, ctx: &AttemptCtx) -> Result<U256, FailureReason> {
        let intent = &ctx.intent;
        with_retry(
            &self.config.retry,
            self.config.call_timeout(),
            &ctx.cancel,
            || {
                self.ledger
                    .allowance(&intent.payer, &intent.spender, &intent.token.address)
            },
        )
        .await
        .map_err(|e| query_failure(&e, AttemptStage::Allowance))
    }

    /// Polls `handle` until the ledger reports finality, the confirmation
    /// deadline passes, or the attempt is cancelled. Status-fetch trouble
    /// is absorbed by the next tick.
    async fn await_confirmation(
        &self,
        ctx: &AttemptCtx,
        kind: SubCallKind,
        handle: &TxHandle,
    ) -> Result<(), FailureReason> {
        let stage = match kind {
            SubCallKind::Approval => AttemptStage::ApprovalConfirm,
            SubCallKind::Transfer => AttemptStage::TransferConfirm,
        };
        let deadline = tokio::time::Instant::now() + self.config.confirm_deadline();
        loop {
            if ctx.cancel.is_cancelled() {
                return Err(FailureReason::Cancelled);
            }
            let status =
                tokio::time::timeout(self.config.call_timeout(), self.executor.status(handle))
                    .await;
            match status {
                Ok(Ok(TxStatus::Confirmed)) => {
                    ctx.record
                        .lock()
                        .await
                        .record_final(kind, SubCallStatus::Confirmed);
                    return Ok(());
                }
                Ok(Ok(TxStatus::Reverted)) => {
                    ctx.record
                        .lock()
                        .await
                        .record_final(kind, SubCallStatus::Failed);
                    return Err(FailureReason::CallReverted);
                }
                Ok(Ok(TxStatus::Pending)) => {}
                Ok(Err(_error)) => {
                    #[cfg(feature = "telemetry")]
                    tracing::warn!(tx = %handle, error = %_error, "status poll failed");
                }
                Err(_elapsed) => {
                    #[cfg(feature = "telemetry")]
                    tracing::warn!(tx = %handle, "status poll timed out");
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FailureReason::Timeout { stage });
            }
            tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => return Err(FailureReason::Cancelled),
                () = tokio::time::sleep(self.config.confirm_poll()) => {}
            }
        }
    }

    /// Detaches a finality poller for every submitted-but-pending
    /// sub-call, so an abandoned attempt's record still converges to what
    /// the ledger did.
    async fn finalize_pending(&self, ctx: &AttemptCtx) {
        let pending: Vec<(SubCallKind, TxHandle)> = ctx
            .record
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.status == SubCallStatus::Pending)
            .filter_map(|c| c.handle.clone().map(|h| (c.kind, h)))
            .collect();
        for (kind, handle) in pending {
            let executor = Arc::clone(&self.executor);
            let record = Arc::clone(&ctx.record);
            let poll = self.config.confirm_poll();
            let deadline = tokio::time::Instant::now() + self.config.confirm_deadline();
            #[cfg(feature = "telemetry")]
            tracing::info!(tx = %handle, kind = ?kind, "finalizing abandoned sub-call");
            self.tracker.spawn(async move {
                loop {
                    match executor.status(&handle).await {
                        Ok(TxStatus::Confirmed) => {
                            record
                                .lock()
                                .await
                                .record_final(kind, SubCallStatus::Confirmed);
                            return;
                        }
                        Ok(TxStatus::Reverted) => {
                            record
                                .lock()
                                .await
                                .record_final(kind, SubCallStatus::Failed);
                            return;
                        }
                        Ok(TxStatus::Pending) | Err(_) => {}
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return;
                    }
                    tokio::time::sleep(poll).await;
                }
            });
        }
    }
}
