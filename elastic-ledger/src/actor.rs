//! Actor-based concurrency for the ledger
//!
//! One tokio task owns the [`Ledger`]; callers hold a cloneable
//! [`LedgerHandle`] and talk to it over a bounded mailbox. Each message is
//! processed to completion before the next is received, so every operation
//! is indivisible with respect to every other.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │     LedgerHandle (Clone)     │
//! └──────────────┬───────────────┘
//!                │ mpsc::channel (bounded)
//!                ▼
//! ┌──────────────────────────────┐
//! │   LedgerActor (single task)  │
//! │   owns Ledger<P, F>          │
//! └──────────────────────────────┘
//! ```

use crate::{
    events::Sequenced,
    funds::FundsMover,
    ledger::{Ledger, LedgerStatus},
    oracle::PriceSource,
    types::{Account, AccountId},
    Error, Result,
};
use primitive_types::U256;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type Reply<T> = oneshot::Sender<Result<T>>;

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Run the rebase precondition only
    Rebase {
        /// Reply channel
        response: Reply<()>,
    },

    /// Holder-to-holder transfer
    Transfer {
        /// Debited holder
        from: AccountId,
        /// Credited holder
        to: AccountId,
        /// Derived amount
        amount: U256,
        /// Reply channel
        response: Reply<bool>,
    },

    /// Move a holder's whole balance
    TransferAll {
        /// Debited holder
        from: AccountId,
        /// Credited holder
        to: AccountId,
        /// Reply channel
        response: Reply<U256>,
    },

    /// Allowance-backed transfer
    TransferFrom {
        /// Spender using the allowance
        spender: AccountId,
        /// Debited holder
        from: AccountId,
        /// Credited holder
        to: AccountId,
        /// Derived amount
        amount: U256,
        /// Reply channel
        response: Reply<bool>,
    },

    /// Allowance-backed transfer of a whole balance
    TransferAllFrom {
        /// Spender using the allowance
        spender: AccountId,
        /// Debited holder
        from: AccountId,
        /// Credited holder
        to: AccountId,
        /// Reply channel
        response: Reply<U256>,
    },

    /// Set an allowance
    Approve {
        /// Balance owner
        owner: AccountId,
        /// Spender using the allowance
        spender: AccountId,
        /// Derived amount
        amount: U256,
        /// Reply channel
        response: Reply<bool>,
    },

    /// Mint derived units
    Mint {
        /// Pays the reference asset
        payer: AccountId,
        /// Credited holder
        beneficiary: AccountId,
        /// Derived amount
        amount: U256,
        /// Reply channel
        response: Reply<U256>,
    },

    /// Burn derived units
    Burn {
        /// Balance owner
        owner: AccountId,
        /// Receives the reference asset
        recipient: AccountId,
        /// Derived amount
        amount: U256,
        /// Reply channel
        response: Reply<U256>,
    },

    /// Burn a whole balance
    BurnAll {
        /// Balance owner
        owner: AccountId,
        /// Receives the reference asset
        recipient: AccountId,
        /// Reply channel
        response: Reply<U256>,
    },

    /// Deposit reference units
    Deposit {
        /// Pays the reference asset
        depositor: AccountId,
        /// Credited holder
        beneficiary: AccountId,
        /// Reference amount
        uamount: U256,
        /// Reply channel
        response: Reply<U256>,
    },

    /// Deposit everything the depositor holds
    DepositAll {
        /// Pays the reference asset
        depositor: AccountId,
        /// Credited holder
        beneficiary: AccountId,
        /// Reply channel
        response: Reply<U256>,
    },

    /// Withdraw reference units
    Withdraw {
        /// Balance owner
        owner: AccountId,
        /// Receives the reference asset
        recipient: AccountId,
        /// Reference amount
        uamount: U256,
        /// Reply channel
        response: Reply<U256>,
    },

    /// Withdraw a whole balance
    WithdrawAll {
        /// Balance owner
        owner: AccountId,
        /// Receives the reference asset
        recipient: AccountId,
        /// Reply channel
        response: Reply<U256>,
    },

    /// Derived balance
    BalanceOf {
        /// Queried slot
        account: Account,
        /// Reply channel
        response: Reply<U256>,
    },

    /// Reference-unit balance
    ScaledBalanceOf {
        /// Queried slot
        account: Account,
        /// Reply channel
        response: Reply<U256>,
    },

    /// Current allowance
    Allowance {
        /// Balance owner
        owner: AccountId,
        /// Spender using the allowance
        spender: AccountId,
        /// Reply channel
        response: Reply<U256>,
    },

    /// Point-in-time summary
    Status {
        /// Reply channel
        response: Reply<LedgerStatus>,
    },

    /// Committed events from `from` on, left in the log
    Events {
        /// First sequence wanted
        from: u64,
        /// Reply channel
        response: Reply<Vec<Sequenced>>,
    },

    /// Take every committed event out of the log
    DrainEvents {
        /// Reply channel
        response: Reply<Vec<Sequenced>>,
    },

    /// Verify bit conservation
    CheckConservation {
        /// Reply channel
        response: Reply<()>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns the ledger
#[derive(Debug)]
pub struct LedgerActor<P, F> {
    /// The ledger
    ledger: Ledger<P, F>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl<P: PriceSource, F: FundsMover> LedgerActor<P, F> {
    /// Create new actor
    pub fn new(ledger: Ledger<P, F>, mailbox: mpsc::Receiver<LedgerMessage>) -> Self {
        Self { ledger, mailbox }
    }

    /// Process messages until shutdown or until every handle is dropped
    ///
    /// Returns the ledger so its final state can be inspected.
    pub async fn run(mut self) -> Ledger<P, F> {
        while let Some(msg) = self.mailbox.recv().await {
            if let LedgerMessage::Shutdown = msg {
                tracing::info!(epoch = self.ledger.epoch(), "ledger actor shutting down");
                break;
            }
            self.handle_message(msg);
        }
        self.ledger
    }

    fn handle_message(&mut self, msg: LedgerMessage) {
        let ledger = &mut self.ledger;
        match msg {
            LedgerMessage::Rebase { response } => {
                let _ = response.send(ledger.rebase());
            }

            LedgerMessage::Transfer {
                from,
                to,
                amount,
                response,
            } => {
                let _ = response.send(ledger.transfer(&from, &to, amount));
            }

            LedgerMessage::TransferAll { from, to, response } => {
                let _ = response.send(ledger.transfer_all(&from, &to));
            }

            LedgerMessage::TransferFrom {
                spender,
                from,
                to,
                amount,
                response,
            } => {
                let _ = response.send(ledger.transfer_from(&spender, &from, &to, amount));
            }

            LedgerMessage::TransferAllFrom {
                spender,
                from,
                to,
                response,
            } => {
                let _ = response.send(ledger.transfer_all_from(&spender, &from, &to));
            }

            LedgerMessage::Approve {
                owner,
                spender,
                amount,
                response,
            } => {
                let _ = response.send(ledger.approve(&owner, &spender, amount));
            }

            LedgerMessage::Mint {
                payer,
                beneficiary,
                amount,
                response,
            } => {
                let _ = response.send(ledger.mint(&payer, &beneficiary, amount));
            }

            LedgerMessage::Burn {
                owner,
                recipient,
                amount,
                response,
            } => {
                let _ = response.send(ledger.burn(&owner, &recipient, amount));
            }

            LedgerMessage::BurnAll {
                owner,
                recipient,
                response,
            } => {
                let _ = response.send(ledger.burn_all(&owner, &recipient));
            }

            LedgerMessage::Deposit {
                depositor,
                beneficiary,
                uamount,
                response,
            } => {
                let _ = response.send(ledger.deposit(&depositor, &beneficiary, uamount));
            }

            LedgerMessage::DepositAll {
                depositor,
                beneficiary,
                response,
            } => {
                let _ = response.send(ledger.deposit_all(&depositor, &beneficiary));
            }

            LedgerMessage::Withdraw {
                owner,
                recipient,
                uamount,
                response,
            } => {
                let _ = response.send(ledger.withdraw(&owner, &recipient, uamount));
            }

            LedgerMessage::WithdrawAll {
                owner,
                recipient,
                response,
            } => {
                let _ = response.send(ledger.withdraw_all(&owner, &recipient));
            }

            LedgerMessage::BalanceOf { account, response } => {
                let _ = response.send(Ok(ledger.balance_of(&account)));
            }

            LedgerMessage::ScaledBalanceOf { account, response } => {
                let _ = response.send(Ok(ledger.scaled_balance_of(&account)));
            }

            LedgerMessage::Allowance {
                owner,
                spender,
                response,
            } => {
                let _ = response.send(Ok(ledger.allowance(&owner, &spender)));
            }

            LedgerMessage::Status { response } => {
                let _ = response.send(Ok(ledger.status()));
            }

            LedgerMessage::Events { from, response } => {
                let events = ledger
                    .events()
                    .iter()
                    .filter(|e| e.sequence >= from)
                    .cloned()
                    .collect();
                let _ = response.send(Ok(events));
            }

            LedgerMessage::DrainEvents { response } => {
                let _ = response.send(Ok(ledger.drain_events()));
            }

            LedgerMessage::CheckConservation { response } => {
                let result = ledger.check_conservation();
                if let Err(e) = &result {
                    tracing::error!("Conservation check failed: {}", e);
                }
                let _ = response.send(result);
            }

            LedgerMessage::Shutdown => {
                // Handled in run loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> LedgerMessage) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Run the rebase precondition only
    pub async fn rebase(&self) -> Result<()> {
        self.request(|response| LedgerMessage::Rebase { response })
            .await
    }

    /// Holder-to-holder transfer
    pub async fn transfer(&self, from: AccountId, to: AccountId, amount: U256) -> Result<bool> {
        self.request(|response| LedgerMessage::Transfer {
            from,
            to,
            amount,
            response,
        })
        .await
    }

    /// Move a holder's whole balance
    pub async fn transfer_all(&self, from: AccountId, to: AccountId) -> Result<U256> {
        self.request(|response| LedgerMessage::TransferAll { from, to, response })
            .await
    }

    /// Allowance-backed transfer
    pub async fn transfer_from(
        &self,
        spender: AccountId,
        from: AccountId,
        to: AccountId,
        amount: U256,
    ) -> Result<bool> {
        self.request(|response| LedgerMessage::TransferFrom {
            spender,
            from,
            to,
            amount,
            response,
        })
        .await
    }

    /// Allowance-backed transfer of a whole balance
    pub async fn transfer_all_from(
        &self,
        spender: AccountId,
        from: AccountId,
        to: AccountId,
    ) -> Result<U256> {
        self.request(|response| LedgerMessage::TransferAllFrom {
            spender,
            from,
            to,
            response,
        })
        .await
    }

    /// Set an allowance
    pub async fn approve(&self, owner: AccountId, spender: AccountId, amount: U256) -> Result<bool> {
        self.request(|response| LedgerMessage::Approve {
            owner,
            spender,
            amount,
            response,
        })
        .await
    }

    /// Mint derived units
    pub async fn mint(&self, payer: AccountId, beneficiary: AccountId, amount: U256) -> Result<U256> {
        self.request(|response| LedgerMessage::Mint {
            payer,
            beneficiary,
            amount,
            response,
        })
        .await
    }

    /// Burn derived units
    pub async fn burn(&self, owner: AccountId, recipient: AccountId, amount: U256) -> Result<U256> {
        self.request(|response| LedgerMessage::Burn {
            owner,
            recipient,
            amount,
            response,
        })
        .await
    }

    /// Burn a whole balance
    pub async fn burn_all(&self, owner: AccountId, recipient: AccountId) -> Result<U256> {
        self.request(|response| LedgerMessage::BurnAll {
            owner,
            recipient,
            response,
        })
        .await
    }

    /// Deposit reference units
    pub async fn deposit(
        &self,
        depositor: AccountId,
        beneficiary: AccountId,
        uamount: U256,
    ) -> Result<U256> {
        self.request(|response| LedgerMessage::Deposit {
            depositor,
            beneficiary,
            uamount,
            response,
        })
        .await
    }

    /// Deposit everything the depositor holds
    pub async fn deposit_all(&self, depositor: AccountId, beneficiary: AccountId) -> Result<U256> {
        self.request(|response| LedgerMessage::DepositAll {
            depositor,
            beneficiary,
            response,
        })
        .await
    }

    /// Withdraw reference units
    pub async fn withdraw(
        &self,
        owner: AccountId,
        recipient: AccountId,
        uamount: U256,
    ) -> Result<U256> {
        self.request(|response| LedgerMessage::Withdraw {
            owner,
            recipient,
            uamount,
            response,
        })
        .await
    }

    /// Withdraw a whole balance
    pub async fn withdraw_all(&self, owner: AccountId, recipient: AccountId) -> Result<U256> {
        self.request(|response| LedgerMessage::WithdrawAll {
            owner,
            recipient,
            response,
        })
        .await
    }

    /// Derived balance
    pub async fn balance_of(&self, account: Account) -> Result<U256> {
        self.request(|response| LedgerMessage::BalanceOf { account, response })
            .await
    }

    /// Reference-unit balance
    pub async fn scaled_balance_of(&self, account: Account) -> Result<U256> {
        self.request(|response| LedgerMessage::ScaledBalanceOf { account, response })
            .await
    }

    /// Current allowance
    pub async fn allowance(&self, owner: AccountId, spender: AccountId) -> Result<U256> {
        self.request(|response| LedgerMessage::Allowance {
            owner,
            spender,
            response,
        })
        .await
    }

    /// Point-in-time summary
    pub async fn status(&self) -> Result<LedgerStatus> {
        self.request(|response| LedgerMessage::Status { response })
            .await
    }

    /// Committed events with `sequence >= from`
    pub async fn events(&self, from: u64) -> Result<Vec<Sequenced>> {
        self.request(|response| LedgerMessage::Events { from, response })
            .await
    }

    /// Take every committed event out of the ledger's log
    pub async fn drain_events(&self) -> Result<Vec<Sequenced>> {
        self.request(|response| LedgerMessage::DrainEvents { response })
            .await
    }

    /// Verify bit conservation
    pub async fn check_conservation(&self) -> Result<()> {
        self.request(|response| LedgerMessage::CheckConservation { response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
///
/// `mailbox_capacity` bounds the queue; senders wait when it is full. The
/// join handle yields the ledger after shutdown.
pub fn spawn_ledger_actor<P, F>(
    ledger: Ledger<P, F>,
    mailbox_capacity: usize,
) -> (LedgerHandle, JoinHandle<Ledger<P, F>>)
where
    P: PriceSource + Send + 'static,
    F: FundsMover + Send + 'static,
{
    let (tx, rx) = mpsc::channel(mailbox_capacity);
    let actor = LedgerActor::new(ledger, rx);

    let task = tokio::spawn(actor.run());

    (LedgerHandle::new(tx), task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LedgerEvent;
    use crate::funds::InMemoryFunds;
    use crate::oracle::ManualPriceSource;

    fn e18(units: u64) -> U256 {
        U256::from(units) * U256::exp10(18)
    }

    fn spawn_test_actor(raw_price: u64) -> (ManualPriceSource, LedgerHandle, JoinHandle<Ledger<ManualPriceSource, InMemoryFunds>>) {
        let source = ManualPriceSource::new("test-feed", raw_price);
        let funds = InMemoryFunds::new();
        funds.fund(&AccountId::new("alice"), e18(10));
        funds.fund(&AccountId::new("bob"), e18(10));
        let ledger = Ledger::new(source.clone(), funds).unwrap();
        let (handle, task) = spawn_ledger_actor(ledger, 16);
        (source, handle, task)
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (_, handle, task) = spawn_test_actor(100_000_000);
        handle.shutdown().await.unwrap();

        let ledger = task.await.unwrap();
        assert_eq!(ledger.epoch(), 1);
        assert!(handle.status().await.is_err());
    }

    #[tokio::test]
    async fn test_actor_deposit_and_rebase() {
        let (source, handle, _task) = spawn_test_actor(300_000_000);
        let alice = AccountId::new("alice");

        let credited = handle.deposit(alice.clone(), alice.clone(), e18(1)).await.unwrap();
        assert_eq!(credited, e18(3));

        source.set_price(400_000_000u64);
        handle.rebase().await.unwrap();
        assert_eq!(handle.balance_of(alice.clone().into()).await.unwrap(), e18(4));
        assert_eq!(handle.scaled_balance_of(alice.into()).await.unwrap(), e18(1));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_errors_are_returned() {
        let (_, handle, _task) = spawn_test_actor(100_000_000);
        let err = handle
            .transfer(AccountId::new("alice"), AccountId::new("bob"), e18(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));

        handle.check_conservation().await.unwrap();
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_callers_serialise() {
        let (_, handle, task) = spawn_test_actor(100_000_000);
        let alice = AccountId::new("alice");
        handle.deposit(alice.clone(), alice.clone(), e18(10)).await.unwrap();

        let mut joins = Vec::new();
        for i in 0..10 {
            let handle = handle.clone();
            let alice = alice.clone();
            joins.push(tokio::spawn(async move {
                handle
                    .transfer(alice, AccountId::new(format!("holder-{}", i)), e18(1))
                    .await
            }));
        }
        for join in joins {
            assert!(join.await.unwrap().unwrap());
        }

        let status = handle.status().await.unwrap();
        assert_eq!(status.holder_count, 10);
        assert_eq!(status.total_underlying, e18(10));

        let transfers = handle
            .events(0)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| matches!(e.event, LedgerEvent::Transfer { .. }))
            .count();
        assert_eq!(transfers, 11);

        handle.shutdown().await.unwrap();
        task.await.unwrap().check_conservation().unwrap();
    }

    #[tokio::test]
    async fn test_drain_events_empties_log() {
        let (_, handle, task) = spawn_test_actor(100_000_000);
        let alice = AccountId::new("alice");
        handle.deposit(alice.clone(), alice, e18(1)).await.unwrap();

        let drained = handle.drain_events().await.unwrap();
        assert_eq!(drained.len(), 4);
        assert!(handle.events(0).await.unwrap().is_empty());

        handle.rebase().await.unwrap();
        let next = handle.drain_events().await.unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].sequence, 4);

        handle.shutdown().await.unwrap();
        assert!(task.await.unwrap().events().is_empty());
    }
}
