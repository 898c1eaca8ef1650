use alloy::primitives::{Address, B256, U256};

use eyre::{eyre, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Transaction;
use safescan_db::{
    EthereumTxModel, InternalTxModel, ModuleTransactionModel, MultisigConfirmationModel,
    MultisigTransactionModel, PendingDecodedTxModel, SafeContractModel, SafeStatusModel,
};
use safescan_primitives::{
    calculate_safe_tx_hash, parse_signatures, SafeTx, EXECUTION_FAILURE_TOPIC,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const PROCESS_BATCH_SIZE: u64 = 500;
const NOTIFICATION_CHANNEL_CAPACITY: usize = 1_024;

/// Row-level change event for external consumers (webhook delivery lives in a
/// separate service). Dropped silently when nobody subscribes or a subscriber
/// lags; the tables remain the source of truth.
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    pub table: &'static str,
    pub pk: String,
}

/// What applying one decoded call did. Anomalies are recorded and the row is
/// marked processed anyway so a bad frame cannot wedge the queue.
enum Outcome {
    Applied(Vec<ChangeNotification>),
    Ignored(&'static str),
    Anomaly(String),
}

fn arg_str<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str> {
    arguments
        .get(key)
        .and_then(|value| value.as_str())
        .ok_or_else(|| eyre!("missing argument {}", key))
}

fn arg_address(arguments: &serde_json::Value, key: &str) -> Result<Address> {
    arg_str(arguments, key)?
        .parse()
        .map_err(|_| eyre!("argument {} is not an address", key))
}

fn arg_addresses(arguments: &serde_json::Value, key: &str) -> Result<Vec<Address>> {
    arguments
        .get(key)
        .and_then(|value| value.as_array())
        .ok_or_else(|| eyre!("missing argument {}", key))?
        .iter()
        .map(|entry| {
            entry
                .as_str()
                .and_then(|entry| entry.parse().ok())
                .ok_or_else(|| eyre!("argument {} holds a non-address entry", key))
        })
        .collect()
}

fn arg_u256(arguments: &serde_json::Value, key: &str) -> Result<U256> {
    arg_str(arguments, key)?
        .parse()
        .map_err(|_| eyre!("argument {} is not a uint", key))
}

fn arg_u64(arguments: &serde_json::Value, key: &str) -> Result<u64> {
    arg_str(arguments, key)?
        .parse()
        .map_err(|_| eyre!("argument {} is not a u64", key))
}

fn arg_u8(arguments: &serde_json::Value, key: &str) -> Result<u8> {
    arguments
        .get(key)
        .and_then(|value| value.as_u64())
        .and_then(|value| u8::try_from(value).ok())
        .ok_or_else(|| eyre!("argument {} is not a u8", key))
}

fn arg_bytes(arguments: &serde_json::Value, key: &str) -> Result<Vec<u8>> {
    let value = arg_str(arguments, key)?;
    alloy::hex::decode(value).map_err(|_| eyre!("argument {} is not hex", key))
}

/// True when the receipt logs carry the master copy's `ExecutionFailure` for this
/// safe tx hash. The tx itself still has status 1; only the inner call reverted.
fn execution_failure_logged(
    logs: Option<&serde_json::Value>,
    safe: Address,
    safe_tx_hash: B256,
) -> bool {
    let hash_hex = format!("{safe_tx_hash}");
    logs.and_then(|logs| logs.as_array())
        .map(|logs| {
            logs.iter().any(|log| {
                let topic_matches = log["topics"]
                    .get(0)
                    .and_then(|topic| topic.as_str())
                    .and_then(|topic| topic.parse::<B256>().ok())
                    == Some(EXECUTION_FAILURE_TOPIC);
                let address_matches = log["address"]
                    .as_str()
                    .and_then(|address| address.parse::<Address>().ok())
                    == Some(safe);
                let data_matches = log["data"]
                    .as_str()
                    .map(|data| data.to_ascii_lowercase().starts_with(&hash_hex))
                    .unwrap_or(false);
                topic_matches && address_matches && data_matches
            })
        })
        .unwrap_or(false)
}

/// Serial state machine over the pending decoded queue. Single-threaded by
/// construction, so per-Safe nonce updates cannot interleave.
pub struct SafeTxProcessor {
    db_pool: Arc<Pool<SqliteConnectionManager>>,
    anomalies: AtomicU64,
    notifications: broadcast::Sender<ChangeNotification>,
}

impl SafeTxProcessor {
    pub fn new(db_pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        Self {
            db_pool,
            anomalies: AtomicU64::new(0),
            notifications,
        }
    }

    pub fn anomalies(&self) -> u64 {
        self.anomalies.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.notifications.subscribe()
    }

    fn notify(&self, table: &'static str, pk: String) {
        let _ = self.notifications.send(ChangeNotification { table, pk });
    }

    /// Drains up to one batch of the pending queue in canonical order. Returns
    /// the number of rows processed; zero means the queue is empty.
    pub fn process_pending(&self) -> Result<u64> {
        let pending = {
            let mut conn = self.db_pool.get()?;
            let tx = conn.transaction()?;
            let pending = PendingDecodedTxModel::query_pending(&tx, PROCESS_BATCH_SIZE)?;
            tx.rollback()?;
            pending
        };

        let mut processed = 0;
        for decoded in &pending {
            self.process_decoded(decoded)?;
            processed += 1;
        }

        if processed > 0 {
            info!(processed = processed, "Processed decoded internal txs");
        }
        Ok(processed)
    }

    /// One decoded call, one transaction: the status mutation and the processed
    /// flag commit together or not at all.
    fn process_decoded(&self, decoded: &PendingDecodedTxModel) -> Result<()> {
        let mut conn = self.db_pool.get()?;
        let tx = conn.transaction()?;

        let outcome = self.apply(&tx, decoded)?;
        match &outcome {
            Outcome::Applied(_) => {}
            Outcome::Ignored(reason) => {
                debug!(
                    function_name = decoded.function_name.as_str(),
                    reason = reason,
                    "Ignored decoded tx"
                );
            }
            Outcome::Anomaly(reason) => {
                self.anomalies.fetch_add(1, Ordering::Relaxed);
                warn!(
                    function_name = decoded.function_name.as_str(),
                    internal_tx_id = decoded.internal_tx_id,
                    reason = reason.as_str(),
                    "Anomalous decoded tx, marking processed"
                );
            }
        }

        PendingDecodedTxModel::set_processed(&tx, decoded.internal_tx_id)?;
        tx.commit()?;

        // Only committed rows are announced
        if let Outcome::Applied(notifications) = outcome {
            for notification in notifications {
                self.notify(notification.table, notification.pk);
            }
        }
        Ok(())
    }

    fn apply(&self, tx: &Transaction, decoded: &PendingDecodedTxModel) -> Result<Outcome> {
        let Some(safe) = decoded.safe.clone().map(Address::from) else {
            return Ok(Outcome::Anomaly("frame has no from address".to_string()));
        };
        let arguments = &decoded.arguments;

        if decoded.function_name == "setup" {
            return self.apply_setup(tx, decoded, safe);
        }

        let Some(status) = SafeStatusModel::query_last_for_address(tx, safe)? else {
            return Ok(Outcome::Anomaly(format!("no status for safe {safe}")));
        };

        let mut owners = status.owners();
        let mut threshold: u64 = status.threshold.into();
        // Owner management leaves the nonce alone; only execTransaction advances it
        let nonce: u64 = status.nonce.into();
        let mut master_copy: Address = status.master_copy.clone().into();
        let mut fallback_handler: Address = status.fallback_handler.clone().into();
        let mut enabled_modules = status.enabled_modules();

        match decoded.function_name.as_str() {
            "addOwnerWithThreshold" => {
                owners.push(arg_address(arguments, "owner")?);
                threshold = arg_u64(arguments, "_threshold")?;
            }
            "removeOwner" => {
                let owner = arg_address(arguments, "owner")?;
                let Some(position) = owners.iter().position(|existing| *existing == owner) else {
                    return Ok(Outcome::Anomaly(format!(
                        "removeOwner of unknown owner {owner}"
                    )));
                };
                owners.remove(position);
                threshold = arg_u64(arguments, "_threshold")?;
            }
            "swapOwner" => {
                let old_owner = arg_address(arguments, "oldOwner")?;
                let new_owner = arg_address(arguments, "newOwner")?;
                let Some(position) = owners.iter().position(|existing| *existing == old_owner)
                else {
                    return Ok(Outcome::Anomaly(format!(
                        "swapOwner of unknown owner {old_owner}"
                    )));
                };
                owners[position] = new_owner;
            }
            "changeThreshold" => {
                threshold = arg_u64(arguments, "_threshold")?;
            }
            "changeMasterCopy" => {
                master_copy = arg_address(arguments, "_masterCopy")?;
            }
            "setFallbackHandler" => {
                fallback_handler = arg_address(arguments, "handler")?;
            }
            "enableModule" => {
                let module = arg_address(arguments, "module")?;
                if enabled_modules.contains(&module) {
                    return Ok(Outcome::Anomaly(format!("module {module} already enabled")));
                }
                enabled_modules.push(module);
            }
            "disableModule" => {
                let module = arg_address(arguments, "module")?;
                let Some(position) = enabled_modules
                    .iter()
                    .position(|existing| *existing == module)
                else {
                    return Ok(Outcome::Anomaly(format!(
                        "disableModule of disabled module {module}"
                    )));
                };
                enabled_modules.remove(position);
            }
            "execTransaction" => {
                return self.apply_exec_transaction(tx, decoded, safe, &status);
            }
            "execTransactionFromModule" => {
                return self.apply_module_transaction(tx, decoded, safe);
            }
            _ => {
                // approveHash and friends mutate nothing the status tracks
                return Ok(Outcome::Ignored("not a status mutation"));
            }
        }

        SafeStatusModel::new(
            decoded.internal_tx_id,
            safe,
            &owners,
            threshold,
            nonce,
            master_copy,
            fallback_handler,
            &enabled_modules,
        )
        .insert(tx)?;

        Ok(Outcome::Applied(vec![ChangeNotification {
            table: "safe_statuses",
            pk: decoded.internal_tx_id.to_string(),
        }]))
    }

    fn apply_setup(
        &self,
        tx: &Transaction,
        decoded: &PendingDecodedTxModel,
        safe: Address,
    ) -> Result<Outcome> {
        if SafeStatusModel::query_last_for_address(tx, safe)?.is_some() {
            return Ok(Outcome::Ignored("safe already initialized"));
        }

        let arguments = &decoded.arguments;
        let owners = arg_addresses(arguments, "_owners")?;
        let threshold = arg_u64(arguments, "_threshold")?;
        let fallback_handler = arg_address(arguments, "fallbackHandler")?;
        let Some(master_copy) = decoded.master_copy.clone().map(Address::from) else {
            return Ok(Outcome::Anomaly("setup frame has no to address".to_string()));
        };

        SafeContractModel::new(
            safe,
            decoded.ethereum_tx_hash.clone().into(),
            decoded
                .block_number
                .map(|block_number| block_number.into())
                .unwrap_or(0),
        )
        .insert(tx)?;

        SafeStatusModel::new(
            decoded.internal_tx_id,
            safe,
            &owners,
            threshold,
            0,
            master_copy,
            fallback_handler,
            &[],
        )
        .insert(tx)?;

        info!(safe = %safe, owners = owners.len(), threshold = threshold, "New Safe");
        Ok(Outcome::Applied(vec![
            ChangeNotification {
                table: "safe_contracts",
                pk: safe.to_checksum(None),
            },
            ChangeNotification {
                table: "safe_statuses",
                pk: decoded.internal_tx_id.to_string(),
            },
        ]))
    }

    fn apply_exec_transaction(
        &self,
        tx: &Transaction,
        decoded: &PendingDecodedTxModel,
        safe: Address,
        status: &SafeStatusModel,
    ) -> Result<Outcome> {
        let arguments = &decoded.arguments;
        let to = arg_address(arguments, "to")?;
        let value = arg_u256(arguments, "value")?;
        let data = arg_bytes(arguments, "data")?;
        let operation = arg_u8(arguments, "operation")?;
        let safe_tx_gas = arg_u256(arguments, "safeTxGas")?;
        let base_gas = arg_u256(arguments, "baseGas")?;
        let gas_price = arg_u256(arguments, "gasPrice")?;
        let gas_token = arg_address(arguments, "gasToken")?;
        let refund_receiver = arg_address(arguments, "refundReceiver")?;
        let signatures = arg_bytes(arguments, "signatures")?;

        let nonce: u64 = status.nonce.into();
        let safe_tx = SafeTx {
            to,
            value,
            data: data.clone().into(),
            operation,
            safeTxGas: safe_tx_gas,
            baseGas: base_gas,
            gasPrice: gas_price,
            gasToken: gas_token,
            refundReceiver: refund_receiver,
            nonce: U256::from(nonce),
        };
        let safe_tx_hash = calculate_safe_tx_hash(safe, &safe_tx);

        let ethereum_tx_hash: B256 = decoded.ethereum_tx_hash.clone().into();
        let Some(ethereum_tx) = EthereumTxModel::query_by_hash(tx, ethereum_tx_hash)? else {
            return Ok(Outcome::Anomaly(format!(
                "executing tx {ethereum_tx_hash} not indexed"
            )));
        };
        let failed = execution_failure_logged(ethereum_tx.logs.as_ref(), safe, safe_tx_hash);

        MultisigTransactionModel {
            safe_tx_hash: safe_tx_hash.into(),
            safe: safe.into(),
            ethereum_tx_hash: Some(ethereum_tx_hash.into()),
            to_address: Some(to.into()),
            value: value.into(),
            data: (!data.is_empty()).then_some(data),
            operation: operation as i64,
            safe_tx_gas: safe_tx_gas.into(),
            base_gas: base_gas.into(),
            gas_price: gas_price.into(),
            gas_token: Some(gas_token.into()),
            refund_receiver: Some(refund_receiver.into()),
            signatures: Some(signatures.clone()),
            nonce: nonce.into(),
            failed: Some(failed),
            origin: None,
            created: MultisigTransactionModel::created_now(),
        }
        .upsert_execution(tx)?;

        let mut notifications = vec![ChangeNotification {
            table: "multisig_transactions",
            pk: format!("{safe_tx_hash}"),
        }];
        for safe_signature in parse_signatures(safe_tx_hash, &signatures) {
            notifications.push(ChangeNotification {
                table: "multisig_confirmations",
                pk: format!("{safe_tx_hash}:{}", safe_signature.owner),
            });
            MultisigConfirmationModel {
                ethereum_tx_hash: Some(ethereum_tx_hash.into()),
                multisig_transaction_hash: safe_tx_hash.into(),
                owner: safe_signature.owner.into(),
                signature: Some(safe_signature.signature),
                signature_type: safe_signature.signature_type as i64,
                created: MultisigConfirmationModel::created_now(),
            }
            .insert(tx)?;
        }

        // The nonce advances whether the inner call succeeded or not
        SafeStatusModel::new(
            decoded.internal_tx_id,
            safe,
            &status.owners(),
            status.threshold.into(),
            nonce + 1,
            status.master_copy.clone().into(),
            status.fallback_handler.clone().into(),
            &status.enabled_modules(),
        )
        .insert(tx)?;

        notifications.push(ChangeNotification {
            table: "safe_statuses",
            pk: decoded.internal_tx_id.to_string(),
        });
        Ok(Outcome::Applied(notifications))
    }

    fn apply_module_transaction(
        &self,
        tx: &Transaction,
        decoded: &PendingDecodedTxModel,
        safe: Address,
    ) -> Result<Outcome> {
        let arguments = &decoded.arguments;
        let to = arg_address(arguments, "to")?;
        let value = arg_u256(arguments, "value")?;
        let data = arg_bytes(arguments, "data")?;
        let operation = arg_u8(arguments, "operation")?;

        // The module is the caller of the nearest preceding frame that is not a
        // delegate-call (the delegate-call below us is the master copy dispatch).
        let frames = InternalTxModel::query_by_ethereum_tx(tx, decoded.ethereum_tx_hash.clone().into())?;
        let Some(position) = frames
            .iter()
            .position(|frame| frame.trace_address == decoded.trace_address)
        else {
            return Ok(Outcome::Anomaly("module frame not indexed".to_string()));
        };
        let module = frames[..position]
            .iter()
            .rev()
            .find(|frame| !frame.is_delegate_call())
            .and_then(|frame| frame.from_address.clone());
        let Some(module) = module else {
            return Ok(Outcome::Ignored("module call without a caller frame"));
        };

        ModuleTransactionModel {
            internal_tx_id: decoded.internal_tx_id,
            safe: safe.into(),
            module,
            to_address: to.into(),
            value: value.into(),
            data: (!data.is_empty()).then_some(data),
            operation: operation as i64,
            created: ModuleTransactionModel::created_now(),
            ethereum_tx_hash: None,
        }
        .insert(tx)?;

        Ok(Outcome::Applied(vec![ChangeNotification {
            table: "module_transactions",
            pk: decoded.internal_tx_id.to_string(),
        }]))
    }
}
