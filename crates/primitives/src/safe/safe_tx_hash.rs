use alloy::{
    primitives::{Address, B256},
    sol,
    sol_types::{eip712_domain, SolStruct},
};

sol! {
    /// EIP-712 payload of a Safe multisig transaction, pre-1.3 layout (the domain
    /// carries only the verifying contract, no chain id).
    struct SafeTx {
        address to;
        uint256 value;
        bytes data;
        uint8 operation;
        uint256 safeTxGas;
        uint256 baseGas;
        uint256 gasPrice;
        address gasToken;
        address refundReceiver;
        uint256 nonce;
    }
}

/// The `safe_tx_hash` owners sign and the contract emits in its execution events.
pub fn calculate_safe_tx_hash(safe: Address, safe_tx: &SafeTx) -> B256 {
    let domain = eip712_domain! {
        verifying_contract: safe,
    };
    safe_tx.eip712_signing_hash(&domain)
}

#[cfg(test)]
mod tests {

    use super::{calculate_safe_tx_hash, SafeTx};
    use alloy::{
        primitives::{keccak256, Address, Bytes, B256, U256},
        sol_types::SolValue,
    };

    fn test_safe_tx(nonce: u64) -> SafeTx {
        SafeTx {
            to: Address::repeat_byte(0x44),
            value: U256::from(1u64),
            data: Bytes::from(vec![0xCA, 0xFE]),
            operation: 0,
            safeTxGas: U256::from(50_000u64),
            baseGas: U256::from(21_000u64),
            gasPrice: U256::ZERO,
            gasToken: Address::ZERO,
            refundReceiver: Address::ZERO,
            nonce: U256::from(nonce),
        }
    }

    #[test]
    fn test_hash_matches_manual_construction() {
        let safe = Address::repeat_byte(0x11);
        let safe_tx = test_safe_tx(0);

        let domain_typehash = keccak256("EIP712Domain(address verifyingContract)");
        let domain_separator = keccak256((domain_typehash, safe).abi_encode());

        let safe_tx_typehash = keccak256(
            "SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,\
             uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,\
             uint256 nonce)",
        );
        let struct_hash = keccak256(
            (
                safe_tx_typehash,
                safe_tx.to,
                safe_tx.value,
                keccak256(&safe_tx.data),
                safe_tx.operation as u16,
                safe_tx.safeTxGas,
                safe_tx.baseGas,
                safe_tx.gasPrice,
                safe_tx.gasToken,
                safe_tx.refundReceiver,
                safe_tx.nonce,
            )
                .abi_encode(),
        );

        let mut preimage = Vec::with_capacity(2 + 32 + 32);
        preimage.extend_from_slice(&[0x19, 0x01]);
        preimage.extend_from_slice(domain_separator.as_slice());
        preimage.extend_from_slice(struct_hash.as_slice());
        let expected: B256 = keccak256(&preimage);

        assert_eq!(calculate_safe_tx_hash(safe, &safe_tx), expected);
    }

    #[test]
    fn test_hash_depends_on_every_coordinate() {
        let safe = Address::repeat_byte(0x11);
        let base = calculate_safe_tx_hash(safe, &test_safe_tx(0));

        assert_ne!(base, calculate_safe_tx_hash(safe, &test_safe_tx(1)));
        assert_ne!(
            base,
            calculate_safe_tx_hash(Address::repeat_byte(0x12), &test_safe_tx(0))
        );

        let mut changed = test_safe_tx(0);
        changed.value = U256::from(2u64);
        assert_ne!(base, calculate_safe_tx_hash(safe, &changed));
    }
}
