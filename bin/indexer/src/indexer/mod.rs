pub use erc20_events_indexer::Erc20EventsIndexer;
pub use ethereum_indexer::{index_step, EthereumIndexer};
pub use internal_tx_indexer::InternalTxIndexer;
pub use proxy_factory_indexer::ProxyFactoryIndexer;

mod erc20_events_indexer;
mod ethereum_indexer;
mod index_service;
mod internal_tx_indexer;
mod proxy_factory_indexer;
