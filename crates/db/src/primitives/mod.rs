pub use fixed_bytes::FixedBytes;
pub use u256::U256Text;
pub use u64::U64;

mod fixed_bytes;
mod u256;
mod u64;
