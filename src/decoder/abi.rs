//! ABI layouts of rollup outputs and inputs.

use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::{Address, U256};

/// `Voucher(address,uint256,bytes)`
pub const VOUCHER_SELECTOR: [u8; 4] = [0x23, 0x7a, 0x81, 0x6f];

/// `Notice(bytes)`
pub const NOTICE_SELECTOR: [u8; 4] = [0xc2, 0x58, 0xd6, 0xe5];

/// `EvmAdvance(uint256,address,address,uint256,uint256,uint256,uint256,bytes)`
pub const EVM_ADVANCE_SELECTOR: [u8; 4] = [0x41, 0x5b, 0xf3, 0x63];

pub(crate) struct VoucherFields {
    pub destination: Address,
    pub value: U256,
}

pub(crate) struct AdvanceFields {
    pub msg_sender: Address,
    pub block_number: U256,
    pub block_timestamp: U256,
    pub prev_randao: U256,
    pub payload: Vec<u8>,
}

/// Decode the arguments of a voucher (everything after the selector).
pub(crate) fn decode_voucher(args: &[u8]) -> Result<VoucherFields, String> {
    let tokens = abi::decode(
        &[ParamType::Address, ParamType::Uint(256), ParamType::Bytes],
        args,
    )
    .map_err(|e| e.to_string())?;

    match tokens.as_slice() {
        [Token::Address(destination), Token::Uint(value), Token::Bytes(_)] => Ok(VoucherFields {
            destination: *destination,
            value: *value,
        }),
        _ => Err(format!("unexpected voucher layout: {:?}", tokens)),
    }
}

/// Decode the arguments of a notice (everything after the selector).
pub(crate) fn decode_notice(args: &[u8]) -> Result<Vec<u8>, String> {
    let tokens = abi::decode(&[ParamType::Bytes], args).map_err(|e| e.to_string())?;

    match tokens.into_iter().next() {
        Some(Token::Bytes(payload)) => Ok(payload),
        other => Err(format!("unexpected notice layout: {:?}", other)),
    }
}

/// Decode the arguments of an `EvmAdvance` input (everything after the selector).
pub(crate) fn decode_evm_advance(args: &[u8]) -> Result<AdvanceFields, String> {
    let tokens = abi::decode(
        &[
            ParamType::Uint(256), // chainId
            ParamType::Address,   // appContract
            ParamType::Address,   // msgSender
            ParamType::Uint(256), // blockNumber
            ParamType::Uint(256), // blockTimestamp
            ParamType::Uint(256), // prevRandao
            ParamType::Uint(256), // index
            ParamType::Bytes,     // payload
        ],
        args,
    )
    .map_err(|e| e.to_string())?;

    match tokens.as_slice() {
        [
            Token::Uint(_),
            Token::Address(_),
            Token::Address(msg_sender),
            Token::Uint(block_number),
            Token::Uint(block_timestamp),
            Token::Uint(prev_randao),
            Token::Uint(_),
            Token::Bytes(payload),
        ] => Ok(AdvanceFields {
            msg_sender: *msg_sender,
            block_number: *block_number,
            block_timestamp: *block_timestamp,
            prev_randao: *prev_randao,
            payload: payload.clone(),
        }),
        _ => Err(format!("unexpected EvmAdvance layout: {:?}", tokens)),
    }
}

/// Whether a legacy payload is shaped like `abi.encode(bytes)`.
///
/// A single dynamic `bytes` argument starts with its offset word, which is always
/// 0x20. A legacy voucher starts with an address word instead.
pub(crate) fn is_legacy_notice(args: &[u8]) -> bool {
    args.len() >= 64
        && args[..31].iter().all(|b| *b == 0)
        && args[31] == 0x20
        && decode_notice(args).is_ok()
}

/// Lowercase 0x-prefixed hex of an address
pub(crate) fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}
