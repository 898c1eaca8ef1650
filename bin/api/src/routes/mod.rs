pub mod about;
pub mod delegates;
pub mod get_balances;
pub mod get_safe_creation;
pub mod get_safe_info;
pub mod list_all_transactions;
pub mod list_module_transactions;
pub mod list_multisig_transactions;
pub mod list_safes_by_owner;
pub mod list_transfers;
