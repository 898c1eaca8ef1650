use alloy::primitives::U256;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

// 256 bit values are stored as decimal strings. SQLite integers are 64 bit signed, so
// wei amounts and gas fields would overflow them; TEXT keeps the full precision at the
// cost of not being orderable in SQL.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct U256Text(pub U256);

impl From<U256> for U256Text {
    fn from(value: U256) -> Self {
        U256Text(value)
    }
}

impl From<U256Text> for U256 {
    fn from(value: U256Text) -> Self {
        value.0
    }
}

impl From<u64> for U256Text {
    fn from(value: u64) -> Self {
        U256Text(U256::from(value))
    }
}

impl ToSql for U256Text {
    #[inline]
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.to_string()))
    }
}

impl FromSql for U256Text {
    #[inline]
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Text(v) => std::str::from_utf8(v)
                .map_err(|e| FromSqlError::Other(Box::new(e)))
                .and_then(|s| {
                    s.parse::<U256>()
                        .map_err(|e| FromSqlError::Other(Box::new(e)))
                })
                .map(U256Text),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}
