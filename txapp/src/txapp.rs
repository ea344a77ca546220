//! The block executor.

use std::sync::{Arc, Mutex, PoisonError};

use tally_ledger::Accounts;
use tally_mempool::{Mempool, Rebroadcaster};
use tally_store::{ReadTxn, Savepoint, WriteTxn};
use tally_types::{
    Account, Amount, BlockContext, Identity, Payload, Transaction, TxCode, TxContext, Validator,
};
use tally_voting::{App, EventStore, ResolutionRegistry, ResolutionStore, ValidatorSet};
use tokio::sync::broadcast;

use crate::spend::check_and_spend;
use crate::votes::VoteProcessor;
use crate::{Route, RouteError, RouteTable, TxAppError};

/// What the submitter of a transaction gets back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxResponse {
    pub code: TxCode,
    /// Amount charged, which may be non-zero even when `code` is not `Ok`.
    pub spend: Amount,
    pub error: Option<String>,
}

impl TxResponse {
    fn ok(spend: Amount) -> Self {
        Self {
            code: TxCode::Ok,
            spend,
            error: None,
        }
    }

    fn failed(code: TxCode, spend: Amount, error: impl Into<String>) -> Self {
        Self {
            code,
            spend,
            error: Some(error.into()),
        }
    }
}

/// Validator membership changes the networking layer cares about.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FinalizeOutcome {
    /// Candidates the local node approved during this block.
    pub approved_joins: Vec<Identity>,
    /// Candidates whose join request expired this block.
    pub expired_joins: Vec<Identity>,
}

pub struct TxApp {
    routes: RouteTable,
    resolutions: ResolutionStore,
    events: EventStore,
    accounts: Arc<dyn Accounts>,
    validators: Arc<ValidatorSet>,
    mempool: Mempool,
    identity: Identity,
    approved_joins: Mutex<Vec<Identity>>,
}

impl TxApp {
    /// Open the resolution tables against `registry` and wire up the
    /// executor. Fails if `db` holds resolutions of an unregistered type.
    pub fn new(
        registry: Arc<ResolutionRegistry>,
        db: &mut dyn WriteTxn,
        accounts: Arc<dyn Accounts>,
        validators: Arc<ValidatorSet>,
        identity: Identity,
        routes: RouteTable,
    ) -> Result<Self, TxAppError> {
        let resolutions = ResolutionStore::open(db, registry.clone())?;
        let mempool = Mempool::new(accounts.clone(), validators.clone(), identity.clone());
        Ok(Self {
            routes,
            resolutions,
            events: EventStore::new(registry),
            accounts,
            validators,
            mempool,
            identity,
            approved_joins: Mutex::new(Vec::new()),
        })
    }

    /// Seed the initial validator powers and balances. Runs inside the
    /// genesis block, between `begin` and `commit`.
    pub fn genesis_init(
        &self,
        db: &mut dyn WriteTxn,
        validators: &[Validator],
        allocations: &[(Identity, Amount)],
    ) -> Result<(), TxAppError> {
        for v in validators {
            self.validators.set_power(db, &v.identity, v.power)?;
        }
        for (id, amount) in allocations {
            self.accounts.credit(db, id, *amount)?;
        }
        tracing::info!(
            validators = validators.len(),
            allocations = allocations.len(),
            "initialised genesis state"
        );
        Ok(())
    }

    /// Open the block's transaction.
    pub fn begin(&self, db: &mut dyn WriteTxn, height: i64) -> Result<(), TxAppError> {
        if db.depth() != 0 {
            return Err(TxAppError::Internal(format!(
                "block {height} started with {} transaction levels open",
                db.depth()
            )));
        }
        db.begin()?;
        tracing::debug!(height, "began block");
        Ok(())
    }

    /// Charge and run one transaction. Only storage failures are returned
    /// as errors; everything else is reported in the response.
    pub fn execute(
        &self,
        ctx: &TxContext,
        db: &mut dyn WriteTxn,
        tx: &Transaction,
    ) -> Result<TxResponse, TxAppError> {
        let payload_type = tx.payload_type();
        let Some(route) = self.routes.get(payload_type) else {
            return Ok(TxResponse::failed(
                TxCode::InvalidTxType,
                Amount::ZERO,
                format!("unknown payload type {payload_type}"),
            ));
        };

        if let Payload::ValidatorApprove { candidate } = tx.payload() {
            if tx.sender == self.identity {
                self.lock_approved().push(candidate.clone());
            }
        }

        let mut outer = Savepoint::begin(db)?;
        let spend = match check_and_spend(self.accounts.as_ref(), &mut outer, ctx, tx, route) {
            Ok(spend) => spend,
            Err(e) => {
                if e.code.keeps_spend() {
                    outer.commit()?;
                } else {
                    outer.rollback()?;
                }
                tracing::debug!(
                    sender = %tx.sender,
                    %payload_type,
                    code = %e.code,
                    spend = %e.spend,
                    error = %e.message,
                    "transaction not charged in full"
                );
                return Ok(TxResponse::failed(e.code, e.spend, e.message));
            }
        };

        let result = route
            .pre_tx(ctx, tx)
            .and_then(|()| self.run_route(ctx, &mut outer, tx, route));
        outer.commit()?;

        match result {
            Ok(()) => {
                tracing::debug!(sender = %tx.sender, %payload_type, %spend, "executed transaction");
                Ok(TxResponse::ok(spend))
            }
            Err(e) => {
                tracing::debug!(
                    sender = %tx.sender,
                    %payload_type,
                    code = %e.code,
                    error = %e.message,
                    "transaction failed"
                );
                Ok(TxResponse::failed(e.code, spend, e.message))
            }
        }
    }

    fn run_route(
        &self,
        ctx: &TxContext,
        db: &mut dyn WriteTxn,
        tx: &Transaction,
        route: &dyn Route,
    ) -> Result<(), RouteError> {
        let mut inner = Savepoint::begin(db)
            .map_err(|e| RouteError::new(TxCode::UnknownError, e.to_string()))?;
        let mut app = App {
            db: &mut inner,
            accounts: self.accounts.as_ref(),
            validators: &self.validators,
            resolutions: &self.resolutions,
            events: &self.events,
            identity: &self.identity,
        };
        route.in_tx(ctx, &mut app, tx)?;
        inner
            .commit()
            .map_err(|e| RouteError::new(TxCode::UnknownError, e.to_string()))
    }

    /// Process the block's votes. Called once, after every `execute`.
    pub fn finalize(
        &self,
        db: &mut dyn WriteTxn,
        block: &BlockContext,
    ) -> Result<FinalizeOutcome, TxAppError> {
        let processor = VoteProcessor {
            accounts: self.accounts.as_ref(),
            validators: &self.validators,
            resolutions: &self.resolutions,
            events: &self.events,
            identity: &self.identity,
        };
        let expired_joins = processor.process_votes(db, block)?;
        let approved_joins = std::mem::take(&mut *self.lock_approved());
        Ok(FinalizeOutcome {
            approved_joins,
            expired_joins,
        })
    }

    /// Persist the block and publish its validator changes.
    pub fn commit(&self, db: &mut dyn WriteTxn) -> Result<(), TxAppError> {
        db.commit()?;
        self.validators.commit(db.as_read())?;
        self.accounts.commit();
        self.mempool.reset();
        self.lock_approved().clear();
        Ok(())
    }

    /// Discard the block. Pending mempool state is dropped so that queued
    /// transactions are rechecked against the last committed state.
    pub fn rollback(&self, db: &mut dyn WriteTxn) -> Result<(), TxAppError> {
        db.rollback()?;
        self.validators.rollback();
        self.accounts.rollback();
        self.mempool.reset();
        self.lock_approved().clear();
        Ok(())
    }

    /// Price of `tx` under the given context; zero on gasless networks.
    pub fn price(&self, ctx: &TxContext, tx: &Transaction) -> Result<Amount, TxAppError> {
        let route = self
            .routes
            .get(tx.payload_type())
            .ok_or(TxAppError::UnknownRoute(tx.payload_type()))?;
        if !ctx.gas_enabled() {
            return Ok(Amount::ZERO);
        }
        route.price(tx).map_err(|e| TxAppError::Price(e.message))
    }

    pub fn apply_mempool(
        &self,
        ctx: &TxContext,
        db: &dyn ReadTxn,
        tx: &Transaction,
        rebroadcaster: Option<&dyn Rebroadcaster>,
    ) -> Result<(), TxAppError> {
        if self.routes.get(tx.payload_type()).is_none() {
            return Err(TxAppError::UnknownRoute(tx.payload_type()));
        }
        self.mempool.apply_transaction(ctx, tx, db, rebroadcaster)?;
        Ok(())
    }

    /// Balance and nonce of `id`, from the mempool's provisional view when
    /// `prefer_unconfirmed` is set.
    pub fn account_info(
        &self,
        db: &dyn ReadTxn,
        id: &Identity,
        prefer_unconfirmed: bool,
    ) -> Result<Account, TxAppError> {
        if prefer_unconfirmed {
            return Ok(self.mempool.account_info(db, id)?);
        }
        Ok(self.accounts.get_account(db, id)?)
    }

    pub fn get_validators(&self) -> Vec<Validator> {
        self.validators.get_validators()
    }

    pub fn subscribe_validators(&self) -> broadcast::Receiver<Vec<Validator>> {
        self.validators.subscribe()
    }

    pub fn resolutions(&self) -> &ResolutionStore {
        &self.resolutions
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    pub fn registry(&self) -> &ResolutionRegistry {
        self.resolutions.registry()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    fn lock_approved(&self) -> std::sync::MutexGuard<'_, Vec<Identity>> {
        self.approved_joins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_ledger::AccountLedger;
    use tally_store::MemoryStore;
    use tally_types::{ChainContext, NetworkParams, Threshold, VotableEvent};
    use tally_voting::{register_builtin_types, ResolutionConfig, VotingError};

    const FUNDS: u128 = 1_000_000_000_000_000;
    const FEE: u128 = 100_000_000_000_000;

    fn noop(
        _app: &mut App<'_>,
        _res: &tally_voting::Resolution,
        _block: &BlockContext,
    ) -> Result<(), VotingError> {
        Ok(())
    }

    const RESOLVED_TABLE: &str = "resolved";

    /// Counts its runs per body. Bodies starting with `bad` fail after
    /// writing, so their count must never persist.
    fn counting(
        app: &mut App<'_>,
        res: &tally_voting::Resolution,
        _block: &BlockContext,
    ) -> Result<(), VotingError> {
        let runs = app
            .db
            .get(RESOLVED_TABLE, &res.body)?
            .map_or(0, |v| v[0]);
        app.db.put(RESOLVED_TABLE, &res.body, &[runs + 1])?;
        if res.body.starts_with(b"bad") {
            return Err(VotingError::Rejected("bad body".into()));
        }
        Ok(())
    }

    fn with_counting_type(mut reg: ResolutionRegistry) -> ResolutionRegistry {
        reg.register(
            "counted",
            ResolutionConfig::new(Arc::new(counting))
                .with_confirmation_threshold(Threshold::ONE)
                .with_refund_threshold(Threshold::ONE)
                .with_expiration_period(2),
        )
        .unwrap();
        reg
    }

    fn registry(refund: Threshold) -> ResolutionRegistry {
        let mut reg = ResolutionRegistry::new();
        register_builtin_types(&mut reg, 2).unwrap();
        reg.register(
            "deposit",
            ResolutionConfig::new(Arc::new(noop))
                .with_confirmation_threshold(Threshold::ONE)
                .with_refund_threshold(refund)
                .with_expiration_period(2),
        )
        .unwrap();
        reg
    }

    struct Chain {
        db: MemoryStore,
        app: TxApp,
        ledger: Arc<AccountLedger>,
        height: i64,
        params: NetworkParams,
    }

    impl Chain {
        fn new(registry: ResolutionRegistry, routes: RouteTable) -> Self {
            let mut db = MemoryStore::new();
            let ledger = Arc::new(AccountLedger::new());
            let accounts: Arc<dyn Accounts> = ledger.clone();
            let app = TxApp::new(
                Arc::new(registry),
                &mut db,
                accounts,
                Arc::new(ValidatorSet::new()),
                Identity::from("a"),
                routes,
            )
            .unwrap();

            app.begin(&mut db, 0).unwrap();
            app.genesis_init(
                &mut db,
                &[Validator::new("a", 100), Validator::new("b", 100)],
                &[
                    (Identity::from("a"), Amount::new(FUNDS)),
                    (Identity::from("b"), Amount::new(FUNDS)),
                    (Identity::from("c"), Amount::new(FUNDS)),
                ],
            )
            .unwrap();
            app.commit(&mut db).unwrap();

            let params = NetworkParams {
                join_expiry: 2,
                ..NetworkParams::default()
            };
            Self {
                db,
                app,
                ledger,
                height: 0,
                params,
            }
        }

        fn block_ctx(&self) -> BlockContext {
            BlockContext {
                height: self.height,
                proposer: Identity::from("a"),
                chain: ChainContext {
                    chain_id: "tally-test".into(),
                    network_params: self.params.clone(),
                },
            }
        }

        fn block(&mut self, txs: &[Transaction]) -> (Vec<TxResponse>, FinalizeOutcome) {
            self.height += 1;
            let block = self.block_ctx();
            let ctx = TxContext::new(block.clone());
            self.app.begin(&mut self.db, self.height).unwrap();
            let responses = txs
                .iter()
                .map(|tx| self.app.execute(&ctx, &mut self.db, tx).unwrap())
                .collect();
            let outcome = self.app.finalize(&mut self.db, &block).unwrap();
            self.app.commit(&mut self.db).unwrap();
            (responses, outcome)
        }

        fn account(&self, id: &str) -> Account {
            self.ledger.get_account(&self.db, &Identity::from(id)).unwrap()
        }
    }

    fn tx(sender: &str, payload: Payload, nonce: u64) -> Transaction {
        Transaction::new(sender, payload, Amount::new(FEE), nonce)
    }

    #[test]
    fn transfer_moves_funds_and_charges_the_price() {
        let mut chain = Chain::new(registry(Threshold::ONE), RouteTable::builtin().unwrap());
        let (responses, _) = chain.block(&[tx(
            "b",
            Payload::Transfer {
                to: Identity::from("d"),
                amount: Amount::new(500),
            },
            1,
        )]);

        assert_eq!(responses[0], TxResponse::ok(Amount::new(210_000)));
        assert_eq!(chain.account("d").balance, Amount::new(500));
        let b = chain.account("b");
        assert_eq!(b.balance, Amount::new(FUNDS - 210_000 - 500));
        assert_eq!(b.nonce, 1);
    }

    #[test]
    fn failed_route_keeps_the_spend() {
        let mut chain = Chain::new(registry(Threshold::ONE), RouteTable::builtin().unwrap());
        let (responses, _) = chain.block(&[tx(
            "b",
            Payload::Transfer {
                to: Identity::from("d"),
                amount: Amount::new(FUNDS * 10),
            },
            1,
        )]);

        assert_eq!(responses[0].code, TxCode::InsufficientBalance);
        assert_eq!(responses[0].spend, Amount::new(210_000));
        let b = chain.account("b");
        assert_eq!(b.balance, Amount::new(FUNDS - 210_000));
        assert_eq!(b.nonce, 1);
        assert_eq!(chain.account("d").balance, Amount::ZERO);
    }

    #[test]
    fn unrouted_payload_is_rejected_without_charge() {
        let mut chain = Chain::new(registry(Threshold::ONE), RouteTable::new());
        let (responses, _) = chain.block(&[tx("b", Payload::ValidatorLeave, 1)]);

        assert_eq!(responses[0].code, TxCode::InvalidTxType);
        assert_eq!(responses[0].spend, Amount::ZERO);
        assert_eq!(chain.account("b").nonce, 0);
    }

    #[test]
    fn approved_join_takes_effect_at_commit() {
        let mut chain = Chain::new(registry(Threshold::ONE), RouteTable::builtin().unwrap());
        let mut updates = chain.app.subscribe_validators();

        let (responses, _) = chain.block(&[tx("c", Payload::ValidatorJoin { power: 50 }, 1)]);
        assert!(responses[0].code.is_ok(), "{:?}", responses[0]);
        assert_eq!(chain.app.validators.get_power(&Identity::from("c")), 0);

        let approve = Payload::ValidatorApprove {
            candidate: Identity::from("c"),
        };
        let (responses, outcome) = chain.block(&[
            tx("a", approve.clone(), 1),
            tx("b", approve, 1),
        ]);
        assert!(responses.iter().all(|r| r.code.is_ok()), "{responses:?}");
        assert_eq!(outcome.approved_joins, vec![Identity::from("c")]);

        assert_eq!(chain.app.validators.get_power(&Identity::from("c")), 50);
        let published = updates.try_recv().unwrap();
        assert_eq!(published.len(), 3);

        let remaining = chain
            .app
            .resolutions()
            .by_type(&chain.db, tally_voting::VALIDATOR_JOIN)
            .unwrap();
        assert!(remaining.is_empty());
    }

    #[test]
    fn unapproved_join_expires() {
        let mut chain = Chain::new(registry(Threshold::ONE), RouteTable::builtin().unwrap());
        chain.block(&[tx("c", Payload::ValidatorJoin { power: 50 }, 1)]);
        let (_, outcome) = chain.block(&[]);
        assert!(outcome.expired_joins.is_empty());

        let (_, outcome) = chain.block(&[]);
        assert_eq!(outcome.expired_joins, vec![Identity::from("c")]);
        assert_eq!(chain.app.validators.get_power(&Identity::from("c")), 0);

        // Join resolutions are not marked processed, so the candidate may retry.
        let (responses, _) = chain.block(&[tx("c", Payload::ValidatorJoin { power: 50 }, 2)]);
        assert!(responses[0].code.is_ok(), "{:?}", responses[0]);
    }

    #[test]
    fn duplicate_join_is_refused() {
        let mut chain = Chain::new(registry(Threshold::ONE), RouteTable::builtin().unwrap());
        let (responses, _) = chain.block(&[
            tx("c", Payload::ValidatorJoin { power: 50 }, 1),
            tx("c", Payload::ValidatorJoin { power: 60 }, 2),
        ]);
        assert!(responses[0].code.is_ok());
        assert_eq!(responses[1].code, TxCode::InvalidSender);
    }

    #[test]
    fn expired_resolution_over_refund_threshold_pays_the_proposer() {
        let half = Threshold::new(1, 2).unwrap();
        let mut chain = Chain::new(registry(half), RouteTable::builtin().unwrap());
        let event = VotableEvent::new("deposit", b"tx-1".to_vec());
        let id = event.id();

        let (responses, _) = chain.block(&[tx(
            "a",
            Payload::CreateResolution { resolution: event },
            1,
        )]);
        assert_eq!(responses[0], TxResponse::ok(Amount::new(4_000)));
        chain.block(&[]);

        let before = chain.account("a").balance;
        chain.block(&[]);
        assert_eq!(chain.account("a").balance, before.saturating_add(Amount::new(4_000)));
        assert!(!chain.app.resolutions().exists(&chain.db, &id).unwrap());
        assert!(chain.app.resolutions().is_processed(&chain.db, &id).unwrap());
    }

    #[test]
    fn expired_resolution_under_refund_threshold_pays_nothing() {
        let mut chain = Chain::new(registry(Threshold::ONE), RouteTable::builtin().unwrap());
        let event = VotableEvent::new("deposit", b"tx-1".to_vec());
        let id = event.id();

        chain.block(&[tx("a", Payload::CreateResolution { resolution: event }, 1)]);
        chain.block(&[]);
        let before = chain.account("a").balance;
        chain.block(&[]);

        assert_eq!(chain.account("a").balance, before);
        assert!(!chain.app.resolutions().exists(&chain.db, &id).unwrap());
        assert!(chain.app.resolutions().is_processed(&chain.db, &id).unwrap());
    }

    #[test]
    fn confirmed_resolution_pays_proposer_and_voters() {
        let mut chain = Chain::new(registry(Threshold::ONE), RouteTable::builtin().unwrap());
        let event = VotableEvent::new("deposit", b"tx-9".to_vec());
        let id = event.id();

        let a_before = chain.account("a").balance;
        let b_before = chain.account("b").balance;
        chain.block(&[
            tx("a", Payload::CreateResolution { resolution: event }, 1),
            tx("b", Payload::ApproveResolution { resolution_id: id }, 1),
        ]);

        // a paid 4_000 to create and earned 4_000 for the body.
        assert_eq!(chain.account("a").balance, a_before);
        // b paid 16_000 to approve and earned 16_000 for the vote.
        assert_eq!(chain.account("b").balance, b_before);
        assert!(chain.app.resolutions().is_processed(&chain.db, &id).unwrap());
    }

    #[test]
    fn failing_resolve_rolls_back_only_its_own_writes() {
        let mut chain = Chain::new(
            with_counting_type(registry(Threshold::ONE)),
            RouteTable::builtin().unwrap(),
        );
        let good = VotableEvent::new("counted", b"ok".to_vec());
        let bad = VotableEvent::new("counted", b"bad".to_vec());
        let (good_id, bad_id) = (good.id(), bad.id());

        let a_before = chain.account("a").balance;
        let b_before = chain.account("b").balance;
        let (responses, _) = chain.block(&[
            tx("a", Payload::CreateResolution { resolution: good }, 1),
            tx("a", Payload::CreateResolution { resolution: bad }, 2),
            tx("b", Payload::ApproveResolution { resolution_id: good_id }, 1),
            tx("b", Payload::ApproveResolution { resolution_id: bad_id }, 2),
        ]);
        assert!(responses.iter().all(|r| r.code.is_ok()), "{responses:?}");

        assert_eq!(chain.db.get(RESOLVED_TABLE, b"ok").unwrap(), Some(vec![1]));
        assert_eq!(chain.db.get(RESOLVED_TABLE, b"bad").unwrap(), None);

        let resolutions = chain.app.resolutions();
        for id in [good_id, bad_id] {
            assert!(!resolutions.exists(&chain.db, &id).unwrap());
            assert!(resolutions.is_processed(&chain.db, &id).unwrap());
        }

        // Both resolutions still pay out: fees and rewards cancel.
        assert_eq!(chain.account("a").balance, a_before);
        assert_eq!(chain.account("a").nonce, 2);
        assert_eq!(chain.account("b").balance, b_before);
        assert_eq!(chain.account("b").nonce, 2);
    }

    #[test]
    fn resolution_confirmed_at_its_expiry_height_is_settled_once() {
        let mut chain = Chain::new(
            with_counting_type(registry(Threshold::ONE)),
            RouteTable::builtin().unwrap(),
        );
        let event = VotableEvent::new("counted", b"late".to_vec());
        let id = event.id();

        let a_before = chain.account("a").balance;
        let b_before = chain.account("b").balance;
        chain.block(&[tx("a", Payload::CreateResolution { resolution: event }, 1)]);
        chain.block(&[]);
        let info = chain.app.resolutions().info(&chain.db, &id).unwrap().unwrap();
        assert_eq!(info.expiration_height, 3);

        let (responses, _) = chain.block(&[tx(
            "b",
            Payload::ApproveResolution { resolution_id: id },
            1,
        )]);
        assert_eq!(chain.height, 3);
        assert!(responses[0].code.is_ok(), "{:?}", responses[0]);

        assert_eq!(chain.db.get(RESOLVED_TABLE, b"late").unwrap(), Some(vec![1]));
        assert_eq!(chain.account("a").balance, a_before);
        assert_eq!(chain.account("b").balance, b_before);
        assert!(!chain.app.resolutions().exists(&chain.db, &id).unwrap());
        assert!(chain.app.resolutions().is_processed(&chain.db, &id).unwrap());

        chain.block(&[]);
        assert_eq!(chain.db.get(RESOLVED_TABLE, b"late").unwrap(), Some(vec![1]));
        assert_eq!(chain.account("a").balance, a_before);
    }

    #[test]
    fn expiry_past_max_height_fails_the_join_but_keeps_the_spend() {
        let mut chain = Chain::new(registry(Threshold::ONE), RouteTable::builtin().unwrap());
        chain.params.join_expiry = i64::MAX;

        let (responses, _) = chain.block(&[tx("c", Payload::ValidatorJoin { power: 5 }, 1)]);
        assert_eq!(responses[0].code, TxCode::UnknownError);
        assert_eq!(responses[0].spend, Amount::new(10_000_000_000_000));
        assert_eq!(chain.account("c").nonce, 1);
        let pending = chain
            .app
            .resolutions()
            .ids_by_type_and_proposer(&chain.db, tally_voting::VALIDATOR_JOIN, &Identity::from("c"))
            .unwrap();
        assert!(pending.is_empty());
    }

    #[test]
    fn rollback_discards_the_block() {
        let mut chain = Chain::new(registry(Threshold::ONE), RouteTable::builtin().unwrap());
        let before = chain.db.state_hash();

        chain.height += 1;
        let block = chain.block_ctx();
        let ctx = TxContext::new(block);
        chain.app.begin(&mut chain.db, chain.height).unwrap();
        let resp = chain
            .app
            .execute(&ctx, &mut chain.db, &tx("c", Payload::ValidatorJoin { power: 5 }, 1))
            .unwrap();
        assert!(resp.code.is_ok());
        chain.app.rollback(&mut chain.db).unwrap();

        assert_eq!(chain.db.state_hash(), before);
        assert_eq!(chain.account("c").nonce, 0);
    }

    #[test]
    fn begin_refuses_an_open_block() {
        let mut chain = Chain::new(registry(Threshold::ONE), RouteTable::builtin().unwrap());
        chain.app.begin(&mut chain.db, 1).unwrap();
        assert!(matches!(
            chain.app.begin(&mut chain.db, 1),
            Err(TxAppError::Internal(_))
        ));
    }

    #[test]
    fn price_is_zero_without_gas() {
        let chain = Chain::new(registry(Threshold::ONE), RouteTable::builtin().unwrap());
        let mut ctx = TxContext::new(chain.block_ctx());
        let t = tx("b", Payload::ValidatorLeave, 1);
        assert_eq!(
            chain.app.price(&ctx, &t).unwrap(),
            Amount::new(10_000_000_000_000)
        );
        ctx.block.chain.network_params.disabled_gas_costs = true;
        assert_eq!(chain.app.price(&ctx, &t).unwrap(), Amount::ZERO);
    }
}
