//! The node: one store, one executor, and the block driver around them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tally_ledger::{AccountLedger, Accounts};
use tally_mempool::Rebroadcaster;
use tally_store::{codec, MemoryStore, ReadTxn, WriteTxn};
use tally_txapp::{FinalizeOutcome, RouteTable, TxApp, TxResponse};
use tally_types::{
    Account, Amount, BlockContext, ChainContext, Identity, MigrationStatus, NetworkParams,
    Payload, ResolutionId, Transaction, TxContext, Validator, VotableEvent,
};
use tally_voting::{pending_migration, register_builtin_types, ResolutionRegistry, ValidatorSet};
use tokio::sync::broadcast;

use crate::{GenesisConfig, NodeConfig, NodeError, RebroadcastQueue};

const CHAIN_TABLE: &str = "chain";
const HEIGHT_KEY: &[u8] = b"height";

/// Result of driving one block through the executor.
#[derive(Clone, Debug)]
pub struct BlockResult {
    pub height: i64,
    pub responses: Vec<TxResponse>,
    pub outcome: FinalizeOutcome,
    /// Hash of the full state after commit.
    pub state_hash: [u8; 32],
}

pub struct Node {
    config: NodeConfig,
    identity: Identity,
    chain_id: String,
    params: NetworkParams,
    db: Mutex<MemoryStore>,
    app: TxApp,
    rebroadcast: RebroadcastQueue,
}

impl Node {
    /// Load the genesis file named in `config` (if any) and start the node.
    pub fn from_config(config: NodeConfig) -> Result<Self, NodeError> {
        let genesis = match &config.genesis_file {
            Some(path) => GenesisConfig::from_json_file(path)?,
            None => GenesisConfig::default(),
        };
        Self::new(config, genesis)
    }

    pub fn new(config: NodeConfig, genesis: GenesisConfig) -> Result<Self, NodeError> {
        Self::with_registry(config, genesis, ResolutionRegistry::new())
    }

    /// Start a node whose registry carries application resolution types in
    /// addition to the built-in ones.
    pub fn with_registry(
        config: NodeConfig,
        genesis: GenesisConfig,
        mut registry: ResolutionRegistry,
    ) -> Result<Self, NodeError> {
        let identity = config.identity()?;
        if !genesis.chain_id.is_empty() && genesis.chain_id != config.chain_id {
            return Err(NodeError::Genesis(format!(
                "genesis is for chain {}, node is configured for {}",
                genesis.chain_id, config.chain_id
            )));
        }
        register_builtin_types(&mut registry, config.join_expiry)?;

        let mut db = match &config.snapshot_file {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "loading state snapshot");
                MemoryStore::load_snapshot(path)?
            }
            _ => MemoryStore::new(),
        };
        let fresh = stored_height(&db)?.is_none();

        let validators = Arc::new(ValidatorSet::load(&db)?);
        let accounts: Arc<dyn Accounts> = Arc::new(AccountLedger::new());
        let app = TxApp::new(
            Arc::new(registry),
            &mut db,
            accounts,
            validators,
            identity.clone(),
            RouteTable::builtin()?,
        )?;

        let mut params = genesis.network_params.clone();
        params.join_expiry = config.join_expiry;
        params.max_votes_per_tx = config.max_votes_per_tx;
        params.disabled_gas_costs |= config.disable_gas_costs;

        let node = Self {
            chain_id: config.chain_id.clone(),
            config,
            identity,
            params,
            db: Mutex::new(db),
            app,
            rebroadcast: RebroadcastQueue::with_default(),
        };

        if fresh {
            node.init_genesis(&genesis)?;
        }
        tracing::info!(
            chain_id = %node.chain_id,
            identity = %node.identity,
            height = node.height()?,
            validators = node.validators().len(),
            "node started"
        );
        Ok(node)
    }

    fn init_genesis(&self, genesis: &GenesisConfig) -> Result<(), NodeError> {
        let validators = genesis.validators()?;
        let allocations = genesis.allocations()?;

        let mut db = self.lock_db();
        self.app.begin(&mut *db, 0)?;
        let seeded = self
            .app
            .genesis_init(&mut *db, &validators, &allocations)
            .map_err(NodeError::from)
            .and_then(|()| put_height(&mut *db, 0));
        if let Err(e) = seeded {
            self.app.rollback(&mut *db)?;
            return Err(e);
        }
        self.app.commit(&mut *db)?;
        self.save_snapshot(&db)?;
        Ok(())
    }

    /// Execute `txs` as the next block, proposed by `proposer`.
    ///
    /// Storage or bookkeeping faults roll the block back and are returned;
    /// a rejected transaction is only reported in its response.
    pub fn process_block(
        &self,
        proposer: &Identity,
        txs: &[Transaction],
    ) -> Result<BlockResult, NodeError> {
        let mut db = self.lock_db();
        let height = current_height(&*db)? + 1;
        let block = self.block_context(&*db, height, proposer.clone())?;

        self.app.begin(&mut *db, height)?;
        let executed = self.execute_block(&mut *db, &block, txs);
        let (responses, outcome) = match executed {
            Ok(done) => done,
            Err(e) => {
                tracing::error!(height, error = %e, "block failed, rolling back");
                self.app.rollback(&mut *db)?;
                return Err(e);
            }
        };
        self.app.commit(&mut *db)?;
        self.save_snapshot(&db)?;

        let state_hash = db.state_hash();
        tracing::info!(
            height,
            txs = txs.len(),
            failed = responses.iter().filter(|r| !r.code.is_ok()).count(),
            state_hash = %hex::encode(state_hash),
            "committed block"
        );
        Ok(BlockResult {
            height,
            responses,
            outcome,
            state_hash,
        })
    }

    fn execute_block(
        &self,
        db: &mut dyn WriteTxn,
        block: &BlockContext,
        txs: &[Transaction],
    ) -> Result<(Vec<TxResponse>, FinalizeOutcome), NodeError> {
        let ctx = TxContext::new(block.clone());
        let mut responses = Vec::with_capacity(txs.len());
        for tx in txs {
            responses.push(self.app.execute(&ctx, db, tx)?);
        }
        let outcome = self.app.finalize(db, block)?;
        put_height(db, block.height)?;
        Ok((responses, outcome))
    }

    /// Admit `tx` into the mempool for the next block.
    pub fn submit_transaction(&self, tx: &Transaction) -> Result<(), NodeError> {
        let mut db = self.lock_db();
        let height = current_height(&*db)? + 1;
        let ctx = TxContext::new(self.block_context(&*db, height, self.identity.clone())?);

        let admitted = self.app.apply_mempool(
            &ctx,
            &*db,
            tx,
            Some(&self.rebroadcast as &dyn Rebroadcaster),
        );
        self.rebroadcast.flush(self.app.events(), &mut *db)?;
        admitted?;
        Ok(())
    }

    /// Buffer an event this node observed. Returns `false` if it was
    /// already known.
    pub fn store_event(&self, event: &VotableEvent) -> Result<bool, NodeError> {
        let mut db = self.lock_db();
        Ok(self.app.events().store_event(&mut *db, event)?)
    }

    /// A vote-bodies transaction carrying every buffered event that has no
    /// resolution yet. Only useful when this node proposes the next block.
    pub fn vote_bodies_tx(&self, fee: Amount) -> Result<Option<Transaction>, NodeError> {
        let db = self.lock_db();
        let events = self.app.events().get_events(&*db)?;
        if events.is_empty() {
            return Ok(None);
        }
        let nonce = self.next_nonce(&*db)?;
        Ok(Some(Transaction::new(
            self.identity.clone(),
            Payload::ValidatorVoteBodies { events },
            fee,
            nonce,
        )))
    }

    /// A vote-IDs transaction for resolutions this node has buffered events
    /// for but not voted on yet. The IDs are marked broadcast.
    pub fn vote_ids_tx(&self, fee: Amount) -> Result<Option<Transaction>, NodeError> {
        let mut db = self.lock_db();
        let mut ids: Vec<ResolutionId> = self.app.events().unbroadcasted(&*db)?;
        ids.truncate(self.params.max_votes_per_tx);
        if ids.is_empty() {
            return Ok(None);
        }
        self.app.events().mark_broadcasted(&mut *db, &ids)?;
        let nonce = self.next_nonce(&*db)?;
        Ok(Some(Transaction::new(
            self.identity.clone(),
            Payload::ValidatorVoteIds { resolution_ids: ids },
            fee,
            nonce,
        )))
    }

    fn next_nonce(&self, db: &dyn ReadTxn) -> Result<u64, NodeError> {
        Ok(self.app.account_info(db, &self.identity, true)?.nonce + 1)
    }

    pub fn account_info(&self, id: &Identity, prefer_unconfirmed: bool) -> Result<Account, NodeError> {
        let db = self.lock_db();
        Ok(self.app.account_info(&*db, id, prefer_unconfirmed)?)
    }

    pub fn validators(&self) -> Vec<Validator> {
        self.app.get_validators()
    }

    pub fn subscribe_validators(&self) -> broadcast::Receiver<Vec<Validator>> {
        self.app.subscribe_validators()
    }

    /// Height of the last committed block.
    pub fn height(&self) -> Result<i64, NodeError> {
        current_height(&*self.lock_db())
    }

    pub fn state_hash(&self) -> [u8; 32] {
        self.lock_db().state_hash()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn app(&self) -> &TxApp {
        &self.app
    }

    /// Run `f` against the committed state.
    pub fn with_state<R>(&self, f: impl FnOnce(&dyn ReadTxn) -> R) -> R {
        f(&*self.lock_db())
    }

    /// Network parameters in force at `height`.
    pub fn network_params(&self, height: i64) -> Result<NetworkParams, NodeError> {
        let db = self.lock_db();
        let mut params = self.params.clone();
        params.migration_status = migration_status(&*db, height)?;
        Ok(params)
    }

    fn block_context(
        &self,
        db: &dyn ReadTxn,
        height: i64,
        proposer: Identity,
    ) -> Result<BlockContext, NodeError> {
        let mut params = self.params.clone();
        params.migration_status = migration_status(db, height)?;
        Ok(BlockContext {
            height,
            proposer,
            chain: ChainContext {
                chain_id: self.chain_id.clone(),
                network_params: params,
            },
        })
    }

    fn save_snapshot(&self, db: &MemoryStore) -> Result<(), NodeError> {
        if let Some(path) = &self.config.snapshot_file {
            db.save_snapshot(path)?;
        }
        Ok(())
    }

    fn lock_db(&self) -> MutexGuard<'_, MemoryStore> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn stored_height(db: &dyn ReadTxn) -> Result<Option<i64>, NodeError> {
    match db.get(CHAIN_TABLE, HEIGHT_KEY)? {
        Some(bytes) => Ok(Some(codec::decode(CHAIN_TABLE, &bytes)?)),
        None => Ok(None),
    }
}

fn current_height(db: &dyn ReadTxn) -> Result<i64, NodeError> {
    stored_height(db)?.ok_or_else(|| NodeError::Genesis("chain has no genesis block".into()))
}

fn put_height(db: &mut dyn WriteTxn, height: i64) -> Result<(), NodeError> {
    db.put(CHAIN_TABLE, HEIGHT_KEY, &codec::encode(&height)?)?;
    Ok(())
}

/// Where an approved migration stands at `height`.
fn migration_status(db: &dyn ReadTxn, height: i64) -> Result<MigrationStatus, NodeError> {
    Ok(match pending_migration(db)? {
        None => MigrationStatus::NoActiveMigration,
        Some(m) if height < m.activation_height => MigrationStatus::ActivationPeriod,
        Some(m) if height < m.end_height => MigrationStatus::MigrationInProgress,
        Some(_) => MigrationStatus::MigrationCompleted,
    })
}
