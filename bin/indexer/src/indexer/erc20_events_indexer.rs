use super::{
    ethereum_indexer::{AddressCursor, EthereumIndexer},
    index_service::IndexService,
    internal_tx_indexer::dedup_first_seen,
};

use alloy::{
    primitives::{Address, BlockNumber, B256, U256},
    providers::Provider,
    rpc::types::{Filter, Log},
};

use eyre::Result;
use fnv::FnvHashSet;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Transaction;
use safescan_db::{EthereumEventModel, SafeContractModel};
use safescan_primitives::{EthereumRpcProvider, ERC20_721_TRANSFER_TOPIC};
use serde_json::json;
use std::sync::Arc;

const BLOCK_PROCESS_LIMIT: u64 = 2_000;
const UPDATED_BLOCKS_BEHIND: u64 = 200;

/// `Transfer` arguments if the log matches the ERC-20 or ERC-721 shape. The two
/// standards share a topic; the indexed `tokenId` is what tells them apart.
fn decode_transfer_arguments(log: &Log) -> Option<serde_json::Value> {
    let topics = log.inner.data.topics();
    match topics.len() {
        3 if log.inner.data.data.len() >= 32 => Some(json!({
            "from": Address::from_word(topics[1]).to_checksum(None),
            "to": Address::from_word(topics[2]).to_checksum(None),
            "value": U256::from_be_slice(&log.inner.data.data[..32]).to_string(),
        })),
        4 => Some(json!({
            "from": Address::from_word(topics[1]).to_checksum(None),
            "to": Address::from_word(topics[2]).to_checksum(None),
            "tokenId": U256::from_be_bytes(topics[3].0).to_string(),
        })),
        _ => None,
    }
}

/// Indexes ERC-20/721 `Transfer` events in and out of the known Safes, feeding
/// the unified transfer history.
pub struct Erc20EventsIndexer<P: Provider + Clone> {
    rpc_provider: Arc<EthereumRpcProvider<P>>,
    index_service: IndexService<P>,
    db_pool: Arc<Pool<SqliteConnectionManager>>,
    reorg_blocks: u64,
}

impl<P> Erc20EventsIndexer<P>
where
    P: Provider + Clone + 'static,
{
    pub fn new(
        rpc_provider: Arc<EthereumRpcProvider<P>>,
        db_pool: Arc<Pool<SqliteConnectionManager>>,
        reorg_blocks: u64,
    ) -> Self {
        Self {
            index_service: IndexService::new(Arc::clone(&rpc_provider)),
            rpc_provider,
            db_pool,
            reorg_blocks,
        }
    }

    /// Transfers where a Safe is the sender plus those where it is the receiver,
    /// deduplicated on (tx, log index).
    async fn find_transfer_logs(
        &self,
        addresses: &[Address],
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<Vec<Log>> {
        let address_topics = addresses
            .iter()
            .map(|address| B256::from(address.into_word()))
            .collect::<Vec<_>>();

        let from_filter = Filter::new()
            .event_signature(ERC20_721_TRANSFER_TOPIC)
            .topic1(address_topics.clone())
            .from_block(from_block)
            .to_block(to_block);
        let to_filter = Filter::new()
            .event_signature(ERC20_721_TRANSFER_TOPIC)
            .topic2(address_topics)
            .from_block(from_block)
            .to_block(to_block);

        let mut seen = FnvHashSet::default();
        let mut logs = Vec::new();
        for log in self
            .rpc_provider
            .get_logs(&from_filter)
            .await?
            .into_iter()
            .chain(self.rpc_provider.get_logs(&to_filter).await?)
        {
            if let (Some(tx_hash), Some(log_index)) = (log.transaction_hash, log.log_index) {
                if seen.insert((tx_hash, log_index)) {
                    logs.push(log);
                }
            }
        }
        Ok(logs)
    }
}

impl<P> EthereumIndexer for Erc20EventsIndexer<P>
where
    P: Provider + Clone + 'static,
{
    fn name(&self) -> &'static str {
        "erc20-events-indexer"
    }

    fn block_process_limit(&self) -> u64 {
        BLOCK_PROCESS_LIMIT
    }

    fn confirmations(&self) -> u64 {
        0
    }

    fn updated_blocks_behind(&self) -> u64 {
        UPDATED_BLOCKS_BEHIND
    }

    fn almost_updated_cursors(
        &self,
        tx: &Transaction,
        current_block_number: BlockNumber,
    ) -> Result<Vec<AddressCursor>> {
        Ok(SafeContractModel::query_erc20_almost_updated(
            tx,
            current_block_number,
            self.updated_blocks_behind(),
            self.confirmations(),
        )?
        .into_iter()
        .map(|row| AddressCursor {
            address: row.address.into(),
            block_number: row.erc20_block_number.into(),
        })
        .collect())
    }

    fn not_updated_cursors(
        &self,
        tx: &Transaction,
        current_block_number: BlockNumber,
    ) -> Result<Vec<AddressCursor>> {
        Ok(SafeContractModel::query_erc20_not_updated(
            tx,
            current_block_number,
            self.confirmations(),
        )?
        .into_iter()
        .map(|row| AddressCursor {
            address: row.address.into(),
            block_number: row.erc20_block_number.into(),
        })
        .collect())
    }

    fn update_cursors(
        &self,
        tx: &Transaction,
        addresses: &[Address],
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<usize> {
        SafeContractModel::update_erc20_cursor(tx, addresses, from_block, to_block)
    }

    async fn index_window(
        &self,
        addresses: &[Address],
        from_block: BlockNumber,
        to_block: BlockNumber,
        current_block_number: BlockNumber,
    ) -> Result<u64> {
        let logs = self
            .find_transfer_logs(addresses, from_block, to_block)
            .await?;
        if logs.is_empty() {
            return Ok(0);
        }

        let tx_hashes = dedup_first_seen(logs.iter().filter_map(|log| log.transaction_hash));
        let txs_with_blocks = self
            .index_service
            .fetch_txs_with_blocks(&tx_hashes, current_block_number, self.reorg_blocks)
            .await?;

        let mut stored = 0;
        {
            let mut conn = self.db_pool.get()?;
            let tx = conn.transaction()?;

            for tx_with_block in &txs_with_blocks {
                tx_with_block.block.insert(&tx)?;
                tx_with_block.ethereum_tx.insert(&tx)?;
            }

            for log in &logs {
                let (Some(tx_hash), Some(log_index)) = (log.transaction_hash, log.log_index)
                else {
                    continue;
                };
                let Some(arguments) = decode_transfer_arguments(log) else {
                    continue;
                };

                EthereumEventModel {
                    ethereum_tx_hash: tx_hash.into(),
                    log_index: log_index as i64,
                    address: log.address().into(),
                    topic: ERC20_721_TRANSFER_TOPIC.into(),
                    topics: serde_json::Value::Array(
                        log.inner
                            .data
                            .topics()
                            .iter()
                            .map(|topic| serde_json::Value::String(format!("{topic}")))
                            .collect(),
                    ),
                    arguments,
                }
                .insert(&tx)?;
                stored += 1;
            }

            tx.commit()?;
        }

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {

    use super::decode_transfer_arguments;
    use alloy::primitives::{Address, Bytes, LogData, B256, U256};

    fn transfer_log(topics: Vec<B256>, data: Vec<u8>) -> alloy::rpc::types::Log {
        alloy::rpc::types::Log {
            inner: alloy::primitives::Log {
                address: Address::repeat_byte(0x70),
                data: LogData::new_unchecked(topics, Bytes::from(data)),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_erc20_transfer() {
        let from = Address::repeat_byte(0x01);
        let to = Address::repeat_byte(0x02);
        let log = transfer_log(
            vec![
                safescan_primitives::ERC20_721_TRANSFER_TOPIC,
                from.into_word(),
                to.into_word(),
            ],
            U256::from(1_234u64).to_be_bytes::<32>().to_vec(),
        );

        let arguments = decode_transfer_arguments(&log).unwrap();
        assert_eq!(arguments["from"], from.to_checksum(None));
        assert_eq!(arguments["to"], to.to_checksum(None));
        assert_eq!(arguments["value"], "1234");
        assert!(arguments.get("tokenId").is_none());
    }

    #[test]
    fn test_decode_erc721_transfer() {
        let from = Address::repeat_byte(0x01);
        let to = Address::repeat_byte(0x02);
        let log = transfer_log(
            vec![
                safescan_primitives::ERC20_721_TRANSFER_TOPIC,
                from.into_word(),
                to.into_word(),
                B256::from(U256::from(7u64)),
            ],
            Vec::new(),
        );

        let arguments = decode_transfer_arguments(&log).unwrap();
        assert_eq!(arguments["tokenId"], "7");
        assert!(arguments.get("value").is_none());
    }

    #[test]
    fn test_decode_rejects_anonymous_shape() {
        let log = transfer_log(vec![], Vec::new());
        assert!(decode_transfer_arguments(&log).is_none());
    }
}
