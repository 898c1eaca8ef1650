use super::ProviderError;

use alloy::{
    primitives::{Address, BlockNumber, TxHash, U256},
    providers::{ext::TraceApi, Provider, RootProvider},
    rpc::types::{
        trace::{
            filter::{TraceFilter, TraceFilterMode},
            parity::LocalizedTransactionTrace,
        },
        Block, Filter, Log, Transaction, TransactionReceipt,
    },
};

use futures_util::future::try_join_all;
use std::sync::Arc;
use tracing::instrument;

/// Thin typed wrapper over an alloy provider. One instance is built per endpoint:
/// a regular node for blocks/txs/receipts/logs and a tracing node for the
/// `trace_*` namespace.
pub struct EthereumRpcProvider<P: Provider + Clone> {
    inner: Arc<P>,
}

pub type HttpRpcProvider = EthereumRpcProvider<RootProvider>;

pub fn new_http_provider(rpc_url: url::Url) -> HttpRpcProvider {
    EthereumRpcProvider {
        inner: Arc::new(RootProvider::new_http(rpc_url)),
    }
}

impl<P> EthereumRpcProvider<P>
where
    P: Provider + Clone + 'static,
{
    pub fn new(inner: Arc<P>) -> Self {
        Self { inner }
    }

    pub async fn current_block_number(&self) -> Result<BlockNumber, ProviderError> {
        self.inner.get_block_number().await.map_err(Into::into)
    }

    #[instrument(skip(self))]
    pub async fn get_block(
        &self,
        block_number: BlockNumber,
    ) -> Result<Option<Block>, ProviderError> {
        self.inner
            .get_block_by_number(block_number.into())
            .await
            .map_err(Into::into)
    }

    pub async fn get_tx(&self, tx_hash: TxHash) -> Result<Option<Transaction>, ProviderError> {
        self.inner
            .get_transaction_by_hash(tx_hash)
            .await
            .map_err(Into::into)
    }

    /// Batched lookups; output order matches the input order.
    pub async fn get_txs(
        &self,
        tx_hashes: &[TxHash],
    ) -> Result<Vec<Option<Transaction>>, ProviderError> {
        try_join_all(
            tx_hashes
                .iter()
                .map(|tx_hash| self.inner.get_transaction_by_hash(*tx_hash)),
        )
        .await
        .map_err(Into::into)
    }

    pub async fn get_receipt(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ProviderError> {
        self.inner
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(Into::into)
    }

    pub async fn get_receipts(
        &self,
        tx_hashes: &[TxHash],
    ) -> Result<Vec<Option<TransactionReceipt>>, ProviderError> {
        try_join_all(
            tx_hashes
                .iter()
                .map(|tx_hash| self.inner.get_transaction_receipt(*tx_hash)),
        )
        .await
        .map_err(Into::into)
    }

    #[instrument(skip(self))]
    pub async fn trace_block(
        &self,
        block_number: BlockNumber,
    ) -> Result<Vec<LocalizedTransactionTrace>, ProviderError> {
        self.inner
            .trace_block(block_number.into())
            .await
            .map_err(Into::into)
    }

    pub async fn trace_blocks(
        &self,
        block_numbers: impl Iterator<Item = BlockNumber>,
    ) -> Result<Vec<Vec<LocalizedTransactionTrace>>, ProviderError> {
        try_join_all(
            block_numbers.map(|block_number| self.inner.trace_block(block_number.into())),
        )
        .await
        .map_err(Into::into)
    }

    /// `trace_filter` matching frames whose `from` OR `to` is in `addresses`.
    #[instrument(skip(self, addresses))]
    pub async fn trace_filter(
        &self,
        addresses: &[Address],
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<Vec<LocalizedTransactionTrace>, ProviderError> {
        let filter = TraceFilter {
            from_block: Some(from_block),
            to_block: Some(to_block),
            from_address: addresses.to_vec(),
            to_address: addresses.to_vec(),
            mode: TraceFilterMode::Union,
            after: None,
            count: None,
        };
        self.inner.trace_filter(&filter).await.map_err(Into::into)
    }

    pub async fn trace_transactions(
        &self,
        tx_hashes: &[TxHash],
    ) -> Result<Vec<Vec<LocalizedTransactionTrace>>, ProviderError> {
        try_join_all(
            tx_hashes
                .iter()
                .map(|tx_hash| self.inner.trace_transaction(*tx_hash)),
        )
        .await
        .map_err(Into::into)
    }

    #[instrument(skip(self, filter))]
    pub async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ProviderError> {
        self.inner.get_logs(filter).await.map_err(Into::into)
    }

    pub async fn get_balance(&self, address: Address) -> Result<U256, ProviderError> {
        self.inner.get_balance(address).await.map_err(Into::into)
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}
