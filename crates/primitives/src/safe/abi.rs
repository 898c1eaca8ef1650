use alloy::{primitives::B256, sol, sol_types::SolEvent};

sol! {
    /// Safe master copy surface the indexer understands, v1.1.1 layout.
    interface GnosisSafe {
        function setup(
            address[] calldata _owners,
            uint256 _threshold,
            address to,
            bytes calldata data,
            address fallbackHandler,
            address paymentToken,
            uint256 payment,
            address paymentReceiver
        ) external;
        function addOwnerWithThreshold(address owner, uint256 _threshold) external;
        function removeOwner(address prevOwner, address owner, uint256 _threshold) external;
        function swapOwner(address prevOwner, address oldOwner, address newOwner) external;
        function changeThreshold(uint256 _threshold) external;
        function changeMasterCopy(address _masterCopy) external;
        function setFallbackHandler(address handler) external;
        function enableModule(address module) external;
        function disableModule(address prevModule, address module) external;
        function execTransaction(
            address to,
            uint256 value,
            bytes calldata data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            bytes calldata signatures
        ) external returns (bool success);
        function execTransactionFromModule(
            address to,
            uint256 value,
            bytes calldata data,
            uint8 operation
        ) external returns (bool success);
        function approveHash(bytes32 hashToApprove) external;

        event ExecutionSuccess(bytes32 txHash, uint256 payment);
        event ExecutionFailure(bytes32 txHash, uint256 payment);
    }
}

sol! {
    interface GnosisSafeProxyFactory {
        function createProxy(address masterCopy, bytes calldata data) external returns (address proxy);
        function createProxyWithNonce(
            address _mastercopy,
            bytes calldata initializer,
            uint256 saltNonce
        ) external returns (address proxy);

        event ProxyCreation(address proxy);
    }
}

sol! {
    /// ERC-721 shares this signature (its `tokenId` is indexed, which does not
    /// change the topic), so one constant covers both standards.
    event Transfer(address indexed from, address indexed to, uint256 value);
}

pub const ERC20_721_TRANSFER_TOPIC: B256 = Transfer::SIGNATURE_HASH;
pub const EXECUTION_FAILURE_TOPIC: B256 = GnosisSafe::ExecutionFailure::SIGNATURE_HASH;
pub const EXECUTION_SUCCESS_TOPIC: B256 = GnosisSafe::ExecutionSuccess::SIGNATURE_HASH;
pub const PROXY_CREATION_TOPIC: B256 = GnosisSafeProxyFactory::ProxyCreation::SIGNATURE_HASH;
