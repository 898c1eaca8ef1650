use alloy::{
    consensus::{Transaction as _, TxReceipt as _},
    primitives::{BlockNumber, TxHash, U256},
    providers::Provider,
    rpc::types::Log,
};

use eyre::{eyre, Result};
use safescan_db::{BlockModel, EthereumTxModel};
use safescan_primitives::EthereumRpcProvider;
use serde_json::json;
use std::{collections::BTreeMap, sync::Arc};
use tracing::warn;

/// A mined transaction with its backing block, ready to insert.
#[derive(Debug, Clone)]
pub struct TxWithBlock {
    pub tx_hash: TxHash,
    pub block: BlockModel,
    pub ethereum_tx: EthereumTxModel,
}

fn receipt_log_json(log: &Log) -> serde_json::Value {
    json!({
        "address": log.address().to_checksum(None),
        "topics": log
            .inner
            .data
            .topics()
            .iter()
            .map(|topic| format!("{topic}"))
            .collect::<Vec<_>>(),
        "data": alloy::hex::encode_prefixed(&log.inner.data.data),
    })
}

/// Fetches txs, receipts and blocks for a set of hashes and maps them onto the
/// storage models. Shared by every indexer that discovers tx hashes.
pub struct IndexService<P: Provider + Clone> {
    rpc_provider: Arc<EthereumRpcProvider<P>>,
}

impl<P> IndexService<P>
where
    P: Provider + Clone + 'static,
{
    pub fn new(rpc_provider: Arc<EthereumRpcProvider<P>>) -> Self {
        Self { rpc_provider }
    }

    pub async fn fetch_txs_with_blocks(
        &self,
        tx_hashes: &[TxHash],
        current_block_number: BlockNumber,
        reorg_blocks: u64,
    ) -> Result<Vec<TxWithBlock>> {
        if tx_hashes.is_empty() {
            return Ok(Vec::new());
        }

        let txs = self.rpc_provider.get_txs(tx_hashes).await?;
        let receipts = self.rpc_provider.get_receipts(tx_hashes).await?;

        // One block fetch per distinct number
        let mut blocks: BTreeMap<BlockNumber, BlockModel> = BTreeMap::new();
        for receipt in receipts.iter().flatten() {
            if let Some(block_number) = receipt.block_number {
                if !blocks.contains_key(&block_number) {
                    let block = self
                        .rpc_provider
                        .get_block(block_number)
                        .await?
                        .ok_or_else(|| eyre!("block {} not found", block_number))?;
                    blocks.insert(
                        block_number,
                        BlockModel::from_header(
                            &block.header,
                            current_block_number.saturating_sub(block_number) >= reorg_blocks,
                        ),
                    );
                }
            }
        }

        let mut result = Vec::with_capacity(tx_hashes.len());
        for ((tx_hash, tx), receipt) in tx_hashes.iter().zip(txs).zip(receipts) {
            let (Some(tx), Some(receipt)) = (tx, receipt) else {
                // Dropped from the pool or pruned between discovery and fetch; the
                // window will be re-scanned before the cursor passes it
                warn!(tx_hash = %tx_hash, "discovered tx disappeared before fetch");
                continue;
            };
            let Some(block_number) = receipt.block_number else {
                warn!(tx_hash = %tx_hash, "discovered tx has no block yet");
                continue;
            };
            let Some(block) = blocks.get(&block_number) else {
                continue;
            };

            let ethereum_tx = EthereumTxModel {
                tx_hash: (*tx_hash).into(),
                block_number: Some(block_number.into()),
                from_address: Some(tx.inner.signer().into()),
                to_address: tx.to().map(Into::into),
                value: tx.value().into(),
                gas: U256::from(tx.gas_limit()).into(),
                gas_price: U256::from(tx.gas_price().unwrap_or_else(|| tx.max_fee_per_gas()))
                    .into(),
                nonce: tx.nonce().into(),
                data: Some(tx.input().to_vec()),
                logs: Some(serde_json::Value::Array(
                    receipt.inner.logs().iter().map(receipt_log_json).collect(),
                )),
                status: Some(receipt.status() as i64),
                gas_used: Some(U256::from(receipt.gas_used).into()),
                transaction_index: receipt.transaction_index.map(Into::into),
            };

            result.push(TxWithBlock {
                tx_hash: *tx_hash,
                block: block.clone(),
                ethereum_tx,
            });
        }

        Ok(result)
    }
}
