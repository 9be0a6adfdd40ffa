//! Raw entry decoding
//!
//! [`ArtifactDecoder`] turns raw upstream entries into [`Artifact`]s. It is pure: the
//! same entry always yields the same artifact or the same error, and nothing here
//! touches the network or the database.
//!
//! ## Output payload generations
//!
//! Current (V2) output payloads are `selector ++ abi.encode(args)`, where the selector
//! names the kind (voucher or notice). Legacy (V1) payloads are the bare
//! `abi.encode(args)`. Legacy payloads are bridged to V2 by prefixing the selector of
//! the kind they decode as, so downstream consumers only ever see V2.
//!
//! The generation of a payload is taken from, in order:
//! 1. the raw entry, when the upstream states it
//! 2. the configured [`EncodingMode`], unless it is `Auto`
//! 3. the leading four bytes: a zero word prefix means V1, anything else is V2. Every
//!    such decision is logged.
//!
//! V2 outputs whose selector is neither voucher nor notice (newer output kinds such as
//! delegate-call vouchers) are kept as notices with their payload untouched.

pub mod abi;

use crate::config::EncodingMode;
use crate::error::DecodeError;
use crate::types::{
    AdvanceMetadata, Artifact, CompletionStatus, Input, Notice, PayloadEncoding, RawInput,
    RawOutput, RawReport, Report, Voucher,
};
use abi::{EVM_ADVANCE_SELECTOR, NOTICE_SELECTOR, VOUCHER_SELECTOR};
use tracing::{debug, info, warn};

/// Kind of an output
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputKind {
    /// Has a destination and value
    Voucher,
    /// Opaque payload
    Notice,
}

impl OutputKind {
    /// 4-byte selector that prefixes V2 payloads of this kind
    pub fn selector(&self) -> [u8; 4] {
        match self {
            OutputKind::Voucher => VOUCHER_SELECTOR,
            OutputKind::Notice => NOTICE_SELECTOR,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            OutputKind::Voucher => "voucher",
            OutputKind::Notice => "notice",
        }
    }
}

/// Bridge a legacy payload to the current generation
pub fn legacy_to_v2(kind: OutputKind, legacy: &[u8]) -> Vec<u8> {
    let mut v2 = Vec::with_capacity(legacy.len() + 4);
    v2.extend_from_slice(&kind.selector());
    v2.extend_from_slice(legacy);
    v2
}

/// Decodes raw entries into artifacts
#[derive(Clone, Debug, Default)]
pub struct ArtifactDecoder {
    mode: EncodingMode,
}

impl ArtifactDecoder {
    /// Create a decoder using `mode` for outputs that do not state their encoding
    pub fn new(mode: EncodingMode) -> Self {
        Self { mode }
    }

    /// Decode an output into a voucher or notice.
    ///
    /// # Errors
    /// Returns [`DecodeError`] when the blob is not hex, is shorter than a selector, or
    /// its voucher/notice ABI fields do not parse. Such an entry never becomes valid.
    pub fn decode_output(&self, raw: &RawOutput) -> Result<Artifact, DecodeError> {
        let bytes = decode_hex(raw.index, &raw.blob)?;
        if bytes.len() < 4 {
            return Err(DecodeError::TooShort {
                index: raw.index,
                len: bytes.len(),
            });
        }

        let encoding = self.resolve_encoding(raw, &bytes);
        let v2 = match encoding {
            PayloadEncoding::V2 => bytes,
            PayloadEncoding::V1 => {
                let kind = legacy_kind(raw.index, &bytes)?;
                debug!(
                    output_index = raw.index,
                    kind = kind.name(),
                    "Bridging legacy payload to V2"
                );
                legacy_to_v2(kind, &bytes)
            }
        };

        let (selector, args) = v2.split_at(4);
        let payload = format!("0x{}", hex::encode(&v2));

        if selector == VOUCHER_SELECTOR {
            let fields = abi::decode_voucher(args).map_err(|reason| DecodeError::Abi {
                index: raw.index,
                kind: OutputKind::Voucher.name(),
                reason,
            })?;
            Ok(Artifact::Voucher(Voucher {
                input_index: raw.input_index,
                output_index: raw.index,
                destination: abi::format_address(&fields.destination),
                value: fields.value.to_string(),
                payload,
                executed: false,
                proof: raw.proof.clone(),
            }))
        } else if selector == NOTICE_SELECTOR {
            abi::decode_notice(args).map_err(|reason| DecodeError::Abi {
                index: raw.index,
                kind: OutputKind::Notice.name(),
                reason,
            })?;
            Ok(Artifact::Notice(Notice {
                input_index: raw.input_index,
                output_index: raw.index,
                payload,
                proof: raw.proof.clone(),
            }))
        } else {
            warn!(
                output_index = raw.index,
                input_index = raw.input_index,
                selector = %format!("0x{}", hex::encode(selector)),
                "Unrecognized output selector, storing as notice"
            );
            Ok(Artifact::Notice(Notice {
                input_index: raw.input_index,
                output_index: raw.index,
                payload,
                proof: raw.proof.clone(),
            }))
        }
    }

    /// Wrap an input as unprocessed, extracting advance metadata when the blob is an
    /// `EvmAdvance` call. Inputs never fail to decode.
    pub fn decode_input(&self, raw: &RawInput) -> Artifact {
        Artifact::Input(Input {
            index: raw.index,
            blob: raw.blob.clone(),
            status: CompletionStatus::Unprocessed,
            metadata: advance_metadata(raw),
        })
    }

    /// Map a report's fields
    pub fn decode_report(&self, raw: &RawReport) -> Artifact {
        Artifact::Report(Report {
            input_index: raw.input_index,
            index: raw.index,
            blob: raw.blob.clone(),
        })
    }

    fn resolve_encoding(&self, raw: &RawOutput, bytes: &[u8]) -> PayloadEncoding {
        if let Some(encoding) = raw.encoding {
            return encoding;
        }
        match self.mode {
            EncodingMode::V1 => PayloadEncoding::V1,
            EncodingMode::V2 => PayloadEncoding::V2,
            EncodingMode::Auto => infer_encoding(raw, bytes),
        }
    }
}

fn infer_encoding(raw: &RawOutput, bytes: &[u8]) -> PayloadEncoding {
    let prefix = &bytes[..4];
    let (encoding, reason) = if prefix == VOUCHER_SELECTOR || prefix == NOTICE_SELECTOR {
        (PayloadEncoding::V2, "known selector prefix")
    } else if prefix == [0u8; 4] {
        (PayloadEncoding::V1, "zero-padded ABI word prefix")
    } else {
        (PayloadEncoding::V2, "non-zero prefix read as an unrecognized selector")
    };

    info!(
        output_index = raw.index,
        input_index = raw.input_index,
        encoding = ?encoding,
        reason,
        "Inferred output payload encoding"
    );
    encoding
}

fn legacy_kind(index: u64, legacy: &[u8]) -> Result<OutputKind, DecodeError> {
    if abi::is_legacy_notice(legacy) {
        return Ok(OutputKind::Notice);
    }
    abi::decode_voucher(legacy)
        .map(|_| OutputKind::Voucher)
        .map_err(|reason| DecodeError::Abi {
            index,
            kind: OutputKind::Voucher.name(),
            reason,
        })
}

fn advance_metadata(raw: &RawInput) -> Option<AdvanceMetadata> {
    let bytes = match decode_hex(raw.index, &raw.blob) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(input_index = raw.index, error = %e, "Input blob is not hex, storing as-is");
            return None;
        }
    };
    if bytes.len() < 4 || bytes[..4] != EVM_ADVANCE_SELECTOR {
        return None;
    }

    let fields = match abi::decode_evm_advance(&bytes[4..]) {
        Ok(fields) => fields,
        Err(reason) => {
            debug!(input_index = raw.index, reason = %reason, "EvmAdvance fields did not parse");
            return None;
        }
    };

    let block_number = u64::try_from(fields.block_number).ok()?;
    let block_timestamp = u64::try_from(fields.block_timestamp)
        .ok()
        .and_then(|t| i64::try_from(t).ok())?;

    Some(AdvanceMetadata {
        msg_sender: abi::format_address(&fields.msg_sender),
        block_number,
        block_timestamp,
        prev_randao: fields.prev_randao.to_string(),
        payload: format!("0x{}", hex::encode(&fields.payload)),
    })
}

fn decode_hex(index: u64, blob: &str) -> Result<Vec<u8>, DecodeError> {
    let digits = blob
        .strip_prefix("0x")
        .or_else(|| blob.strip_prefix("0X"))
        .unwrap_or(blob);
    hex::decode(digits).map_err(|e| DecodeError::InvalidHex {
        index,
        reason: e.to_string(),
    })
}
