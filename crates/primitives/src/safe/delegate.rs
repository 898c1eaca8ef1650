use super::signatures::recover_address;

use alloy::primitives::{keccak256, Address, B256};

/// Window length of the delegate-authorization one-time password.
pub const TOTP_PERIOD_SECS: u64 = 3600;

pub fn calculate_totp(unix_time: u64) -> u64 {
    unix_time / TOTP_PERIOD_SECS
}

/// Hash a delegator signs to authorize `delegate`:
/// `keccak(checksummed_address ++ decimal_totp)`, optionally wrapped in the
/// EIP-191 personal-message prefix.
pub fn delegate_hash(delegate: Address, totp: u64, eth_sign: bool) -> B256 {
    let message = format!("{}{}", delegate.to_checksum(None), totp);
    if eth_sign {
        keccak256(format!(
            "\x19Ethereum Signed Message:\n{}{}",
            message.len(),
            message
        ))
    } else {
        keccak256(message)
    }
}

/// Recovers the signer, accepting the current or previous window, with or
/// without the EIP-191 prefix. Expired or malformed signatures yield None.
pub fn recover_delegate_signer(
    delegate: Address,
    signature: &[u8],
    unix_time: u64,
) -> Option<Address> {
    let totp = calculate_totp(unix_time);
    [totp, totp.saturating_sub(1)]
        .iter()
        .flat_map(|window| {
            [
                delegate_hash(delegate, *window, false),
                delegate_hash(delegate, *window, true),
            ]
        })
        .find_map(|hash| recover_address(hash, signature))
}

#[cfg(test)]
mod tests {

    use super::{calculate_totp, delegate_hash, recover_delegate_signer, TOTP_PERIOD_SECS};
    use alloy::{
        primitives::Address,
        signers::{local::PrivateKeySigner, SignerSync},
    };

    #[test]
    fn test_totp_windows() {
        assert_eq!(calculate_totp(0), 0);
        assert_eq!(calculate_totp(TOTP_PERIOD_SECS - 1), 0);
        assert_eq!(calculate_totp(TOTP_PERIOD_SECS), 1);
    }

    #[test]
    fn test_recover_current_and_previous_window() {
        let delegate = Address::repeat_byte(0x21);
        let signer = PrivateKeySigner::random();
        let now = 10 * TOTP_PERIOD_SECS + 17;

        // Signed within the current window
        let hash = delegate_hash(delegate, calculate_totp(now), false);
        let signature = signer.sign_hash_sync(&hash).unwrap().as_bytes().to_vec();
        assert_eq!(
            recover_delegate_signer(delegate, &signature, now),
            Some(signer.address())
        );

        // Still valid one window later, expired two windows later
        assert_eq!(
            recover_delegate_signer(delegate, &signature, now + TOTP_PERIOD_SECS),
            Some(signer.address())
        );
        let expired = recover_delegate_signer(delegate, &signature, now + 2 * TOTP_PERIOD_SECS);
        assert_ne!(expired, Some(signer.address()));
    }

    #[test]
    fn test_recover_eth_sign_variant() {
        let delegate = Address::repeat_byte(0x21);
        let signer = PrivateKeySigner::random();
        let now = 42 * TOTP_PERIOD_SECS;

        let hash = delegate_hash(delegate, calculate_totp(now), true);
        let signature = signer.sign_hash_sync(&hash).unwrap().as_bytes().to_vec();
        assert_eq!(
            recover_delegate_signer(delegate, &signature, now),
            Some(signer.address())
        );
    }
}
