/* This file is part of sprout
 *
 * Copyright (C) 2023-2026 Sprout developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Transaction submission lifecycle. A submission is a plan of at most
//! two transactions, an optional token approval followed by the action,
//! driven through sign, broadcast and confirmation polling. The approval
//! must confirm before the action is even signed. There is no automatic
//! retry: every failure surfaces and the user decides.
use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use crate::{
    chain::{ChainClient, ConfirmSettings, Refresh, TxHash, TxRequest, TxStatus},
    error::Error,
    wallet::WalletSource,
    Result, Sprout,
};

/// Everything needed to drive one user action on-chain.
#[derive(Clone, Debug)]
pub struct SubmitPlan {
    /// Short label for the history log, e.g. "stake"
    pub kind: String,
    /// Token approval that must confirm before the action, if one is needed
    pub approval: Option<TxRequest>,
    /// The action itself
    pub action: TxRequest,
    /// Signer daemon to route both transactions to
    pub source: WalletSource,
    /// Reads to re-issue after each confirmation
    pub refresh: Vec<Refresh>,
}

/// Where a submission currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingApprovalSignature,
    ApprovalPending,
    AwaitingActionSignature,
    ActionPending,
    Confirming,
    Confirmed,
    Failed,
}

impl Phase {
    /// Whether a new submission may claim the lifecycle.
    fn is_settled(&self) -> bool {
        matches!(self, Self::Idle | Self::Confirmed | Self::Failed)
    }
}

/// Hashes of the transactions a completed submission produced.
#[derive(Clone, Debug)]
pub struct Outcome {
    pub approval_hash: Option<TxHash>,
    pub action_hash: TxHash,
}

/// Drives submissions one at a time. The phase acts as an idempotency
/// guard: while a submission is in flight, a second one is rejected
/// instead of double-signing.
pub struct Lifecycle {
    phase: Mutex<Phase>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self { phase: Mutex::new(Phase::Idle) }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        match self.phase.lock() {
            Ok(guard) => *guard,
            Err(_) => Phase::Failed,
        }
    }

    fn set_phase(&self, phase: Phase) {
        if let Ok(mut guard) = self.phase.lock() {
            debug!(target: "lifecycle", "Phase transition to {phase:?}");
            *guard = phase;
        }
    }

    /// Atomically claim the lifecycle for a new submission.
    fn claim(&self, first_phase: Phase) -> Result<()> {
        let Ok(mut guard) = self.phase.lock() else {
            return Err(Error::SubmissionInFlight)
        };
        if !guard.is_settled() {
            return Err(Error::SubmissionInFlight)
        }
        *guard = first_phase;
        Ok(())
    }

    /// Drive a plan to completion. The optional approval is signed,
    /// broadcast and confirmed before the action is touched; each
    /// confirmation triggers the plan's refresh set exactly once.
    pub async fn submit(
        &self,
        chain: &dyn ChainClient,
        plan: &SubmitPlan,
        confirm: &ConfirmSettings,
    ) -> Result<Outcome> {
        let first_phase = if plan.approval.is_some() {
            Phase::AwaitingApprovalSignature
        } else {
            Phase::AwaitingActionSignature
        };
        self.claim(first_phase)?;

        match self.drive(chain, plan, confirm).await {
            Ok(outcome) => {
                self.set_phase(Phase::Confirmed);
                Ok(outcome)
            }
            Err(e) => {
                self.set_phase(Phase::Failed);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        chain: &dyn ChainClient,
        plan: &SubmitPlan,
        confirm: &ConfirmSettings,
    ) -> Result<Outcome> {
        let mut approval_hash = None;

        if let Some(ref approval) = plan.approval {
            info!(target: "lifecycle", "Requesting approval signature for {}", plan.kind);
            let signed = chain.sign(plan.source, approval).await?;

            self.set_phase(Phase::ApprovalPending);
            let hash = chain.broadcast(&signed).await?;
            info!(target: "lifecycle", "Approval broadcast as {hash}");

            wait_confirmation(chain, &hash, confirm).await?;
            self.refresh(chain, &plan.refresh).await;
            approval_hash = Some(hash);
        }

        self.set_phase(Phase::AwaitingActionSignature);
        info!(target: "lifecycle", "Requesting action signature for {}", plan.kind);
        let signed = chain.sign(plan.source, &plan.action).await?;

        self.set_phase(Phase::ActionPending);
        let action_hash = chain.broadcast(&signed).await?;
        info!(target: "lifecycle", "Action broadcast as {action_hash}");

        self.set_phase(Phase::Confirming);
        wait_confirmation(chain, &action_hash, confirm).await?;
        self.refresh(chain, &plan.refresh).await;

        Ok(Outcome { approval_hash, action_hash })
    }

    async fn refresh(&self, chain: &dyn ChainClient, set: &[Refresh]) {
        // A failed refresh leaves a stale view, never a failed submission
        if let Err(e) = chain.refresh(set).await {
            warn!(target: "lifecycle", "Post-confirmation refresh failed: {e}");
        }
    }
}

/// Poll the node until the transaction settles, one way or the other.
/// Waiting is bounded: past the configured timeout the submission fails
/// even though the transaction may still confirm later.
async fn wait_confirmation(
    chain: &dyn ChainClient,
    hash: &TxHash,
    confirm: &ConfirmSettings,
) -> Result<()> {
    let started = Instant::now();

    loop {
        match chain.tx_status(hash).await {
            Ok(TxStatus::Confirmed) => return Ok(()),
            Ok(TxStatus::Reverted(reason)) => {
                return Err(Error::TxReverted(hash.to_string(), reason))
            }
            Ok(TxStatus::NotFound | TxStatus::Pending | TxStatus::Included) => (),
            // Transient poll failures keep polling until the deadline
            Err(e) => warn!(target: "lifecycle", "Status poll for {hash} failed: {e}"),
        }

        if started.elapsed().as_secs() >= confirm.timeout {
            return Err(Error::ConfirmTimeout(hash.to_string()))
        }

        smol::Timer::after(Duration::from_secs(confirm.poll_interval)).await;
    }
}

impl Sprout {
    /// Drive a plan through the lifecycle and record the produced
    /// transactions in the wallet history.
    pub async fn submit_plan(&self, plan: &SubmitPlan) -> Result<Outcome> {
        let result = self.lifecycle.submit(self, plan, &self.settings.confirm).await;

        match &result {
            Ok(outcome) => {
                if let Some(ref hash) = outcome.approval_hash {
                    self.record_tx_history(hash, "approve", "Confirmed")?;
                }
                self.record_tx_history(&outcome.action_hash, &plan.kind, "Confirmed")?;
            }
            Err(Error::TxReverted(hash, _)) => {
                self.record_tx_history(&TxHash(hash.clone()), &plan.kind, "Failed")?;
            }
            // The transaction may still confirm after we stopped waiting
            Err(Error::ConfirmTimeout(hash)) => {
                self.record_tx_history(&TxHash(hash.clone()), &plan.kind, "Broadcasted")?;
            }
            Err(_) => (),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex as StdMutex};

    use async_trait::async_trait;
    use smol::channel;

    use super::*;
    use crate::{
        address::Address,
        chain::{ContractCall, TxRequest},
        rpc::JsonValue,
    };

    /// Scripted chain backend logging every interaction.
    #[derive(Default)]
    struct MockChain {
        events: StdMutex<Vec<String>>,
        /// Statuses served in order; the last one repeats
        statuses: StdMutex<VecDeque<TxStatus>>,
        /// When set, `sign` blocks until a message arrives
        sign_gate: Option<channel::Receiver<()>>,
    }

    impl MockChain {
        fn scripted(statuses: &[TxStatus]) -> Self {
            Self {
                statuses: StdMutex::new(statuses.iter().cloned().collect()),
                ..Default::default()
            }
        }

        fn log(&self, event: impl Into<String>) {
            self.events.lock().unwrap().push(event.into());
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.events().iter().filter(|e| e.starts_with(prefix)).count()
        }
    }

    #[async_trait]
    impl ChainClient for MockChain {
        async fn contract_read(&self, call: &ContractCall) -> Result<JsonValue> {
            self.log(format!("read {}", call.function));
            Ok(JsonValue::String("0".to_string()))
        }

        async fn sign(&self, _source: WalletSource, tx: &TxRequest) -> Result<String> {
            if let Some(ref gate) = self.sign_gate {
                gate.recv().await.map_err(|_| Error::RpcReplyTimeout)?;
            }
            self.log(format!("sign {}", tx.function));
            Ok(format!("signed-{}", tx.function))
        }

        async fn broadcast(&self, signed: &str) -> Result<TxHash> {
            self.log(format!("broadcast {signed}"));
            Ok(TxHash(format!("hash-of-{signed}")))
        }

        async fn tx_status(&self, _hash: &TxHash) -> Result<TxStatus> {
            self.log("status");
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                return Ok(statuses.pop_front().unwrap())
            }
            Ok(statuses.front().cloned().unwrap_or(TxStatus::Confirmed))
        }

        async fn refresh(&self, set: &[Refresh]) -> Result<()> {
            self.log(format!("refresh {}", set.len()));
            Ok(())
        }
    }

    fn plan(with_approval: bool) -> SubmitPlan {
        let farm = Address([9u8; 32]);
        let token = Address([3u8; 32]);
        SubmitPlan {
            kind: "stake".to_string(),
            approval: with_approval.then(|| TxRequest::new(token, "approve", vec![])),
            action: TxRequest::new(farm, "stake", vec![]),
            source: WalletSource::Injected,
            refresh: vec![Refresh::PoolState],
        }
    }

    fn fast_confirm() -> ConfirmSettings {
        ConfirmSettings { poll_interval: 0, timeout: 5 }
    }

    #[test]
    fn approval_confirms_before_action_is_signed() {
        smol::block_on(async {
            let chain = MockChain::scripted(&[TxStatus::Confirmed]);
            let lifecycle = Lifecycle::new();

            let outcome = lifecycle.submit(&chain, &plan(true), &fast_confirm()).await.unwrap();
            assert!(outcome.approval_hash.is_some());

            let events = chain.events();
            let approve_confirmed =
                events.iter().position(|e| e == "status").unwrap();
            let action_signed = events.iter().position(|e| e == "sign stake").unwrap();
            assert!(events.iter().position(|e| e == "sign approve").unwrap() < approve_confirmed);
            assert!(approve_confirmed < action_signed);

            // One refresh per confirmation, two transactions, two refreshes
            assert_eq!(chain.count("refresh"), 2);
            assert_eq!(lifecycle.phase(), Phase::Confirmed);
        });
    }

    #[test]
    fn sufficient_allowance_skips_approval() {
        smol::block_on(async {
            let chain = MockChain::scripted(&[TxStatus::Confirmed]);
            let lifecycle = Lifecycle::new();

            let outcome = lifecycle.submit(&chain, &plan(false), &fast_confirm()).await.unwrap();
            assert!(outcome.approval_hash.is_none());
            assert_eq!(chain.count("sign"), 1);
            assert_eq!(chain.count("refresh"), 1);
        });
    }

    #[test]
    fn pending_statuses_are_polled_through() {
        smol::block_on(async {
            let chain = MockChain::scripted(&[
                TxStatus::NotFound,
                TxStatus::Pending,
                TxStatus::Included,
                TxStatus::Confirmed,
            ]);
            let lifecycle = Lifecycle::new();

            lifecycle.submit(&chain, &plan(false), &fast_confirm()).await.unwrap();
            assert_eq!(chain.count("status"), 4);
        });
    }

    #[test]
    fn reverted_reason_is_preserved() {
        smol::block_on(async {
            let chain = MockChain::scripted(&[TxStatus::Reverted("insufficient balance".to_string())]);
            let lifecycle = Lifecycle::new();

            let err = lifecycle.submit(&chain, &plan(false), &fast_confirm()).await.unwrap_err();
            match err {
                Error::TxReverted(_, reason) => assert_eq!(reason, "insufficient balance"),
                x => panic!("expected TxReverted, got {x}"),
            }
            assert_eq!(lifecycle.phase(), Phase::Failed);
            // No refresh on failure
            assert_eq!(chain.count("refresh"), 0);
        });
    }

    #[test]
    fn confirmation_wait_is_bounded() {
        smol::block_on(async {
            let chain = MockChain::scripted(&[TxStatus::Pending]);
            let lifecycle = Lifecycle::new();
            let confirm = ConfirmSettings { poll_interval: 0, timeout: 0 };

            let err = lifecycle.submit(&chain, &plan(false), &confirm).await.unwrap_err();
            assert!(matches!(err, Error::ConfirmTimeout(_)));
            assert_eq!(lifecycle.phase(), Phase::Failed);
        });
    }

    #[test]
    fn second_submission_is_rejected_while_in_flight() {
        smol::block_on(async {
            let (tx, rx) = channel::unbounded();
            let mut chain = MockChain::scripted(&[TxStatus::Confirmed]);
            chain.sign_gate = Some(rx);

            let chain = std::sync::Arc::new(chain);
            let lifecycle = std::sync::Arc::new(Lifecycle::new());

            let c = chain.clone();
            let l = lifecycle.clone();
            let first = smol::spawn(async move { l.submit(&*c, &plan(false), &fast_confirm()).await });

            // Wait until the first submission has claimed the lifecycle
            while lifecycle.phase().is_settled() {
                smol::future::yield_now().await;
            }

            let err = lifecycle.submit(&*chain, &plan(false), &fast_confirm()).await.unwrap_err();
            assert!(matches!(err, Error::SubmissionInFlight));

            tx.send(()).await.unwrap();
            first.await.unwrap();

            // Only the first submission ever reached the signer
            assert_eq!(chain.count("sign"), 1);
            assert_eq!(lifecycle.phase(), Phase::Confirmed);
        });
    }
}
