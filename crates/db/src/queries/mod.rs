pub use safe_creation::SafeCreation;
pub use transfers::Transfer;

mod safe_creation;
mod transfers;
