pub use tx_processor::SafeTxProcessor;

mod tx_processor;
