//! Filecoin chain messages
//!
//! Unsigned messages serialize to a DAG-CBOR 10-tuple. Their CID (v1,
//! dag-cbor, blake2b-256) is what secp256k1 wallets sign; the signed
//! message CID is what the backend records as proof of signature.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose, Engine as _};
use ciborium::value::Value;
use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::encoding;
use crate::error::EncodingError;
use crate::signature::{blake2b_256, SIG_TYPE_SECP256K1};

const CID_VERSION_1: u8 = 0x01;
const DAG_CBOR_CODEC: u8 = 0x71;
/// varint(0xb220), blake2b-256 multihash code
const BLAKE2B_256_CODE: [u8; 3] = [0xa0, 0xe4, 0x02];
const DIGEST_LEN: u8 = 32;

/// Content identifier of a DAG-CBOR block hashed with blake2b-256
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cid(Vec<u8>);

impl Cid {
    pub fn of_cbor(block: &[u8]) -> Self {
        let mut bytes = vec![CID_VERSION_1, DAG_CBOR_CODEC];
        bytes.extend_from_slice(&BLAKE2B_256_CODE);
        bytes.push(DIGEST_LEN);
        bytes.extend_from_slice(&blake2b_256(block));
        Self(bytes)
    }

    pub fn to_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", BASE32_NOPAD.encode(&self.0).to_ascii_lowercase())
    }
}

impl FromStr for Cid {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoded = s
            .strip_prefix('b')
            .ok_or_else(|| EncodingError::new(format!("unsupported CID multibase: {}", s)))?;
        let bytes = BASE32_NOPAD
            .decode(encoded.to_ascii_uppercase().as_bytes())
            .map_err(|e| EncodingError::new(format!("bad CID {}: {}", s, e)))?;
        if bytes.first() != Some(&CID_VERSION_1) {
            return Err(EncodingError::new(format!("not a CIDv1: {}", s)));
        }
        Ok(Self(bytes))
    }
}

/// Lotus JSON link form: `{"/": "bafy…"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidLink {
    #[serde(rename = "/")]
    pub root: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedMessage {
    pub version: u64,
    pub to: Address,
    pub from: Address,
    pub nonce: u64,
    /// attoFIL
    pub value: u128,
    pub gas_limit: i64,
    pub gas_fee_cap: u128,
    pub gas_premium: u128,
    pub method: u64,
    pub params: Vec<u8>,
}

impl UnsignedMessage {
    /// Message with zeroed nonce and gas, to be filled from the chain
    pub fn new(from: Address, to: Address, method: u64, params: Vec<u8>) -> Self {
        Self {
            version: 0,
            to,
            from,
            nonce: 0,
            value: 0,
            gas_limit: 0,
            gas_fee_cap: 0,
            gas_premium: 0,
            method,
            params,
        }
    }

    pub fn to_cbor_value(&self) -> Value {
        Value::Array(vec![
            encoding::uint(self.version),
            encoding::bytes(self.to.to_bytes()),
            encoding::bytes(self.from.to_bytes()),
            encoding::uint(self.nonce),
            encoding::big(self.value),
            encoding::int(self.gas_limit),
            encoding::big(self.gas_fee_cap),
            encoding::big(self.gas_premium),
            encoding::uint(self.method),
            encoding::bytes(self.params.clone()),
        ])
    }

    /// Serialized bytes, as sent to hardware signers
    pub fn to_cbor(&self) -> Result<Vec<u8>, EncodingError> {
        encoding::encode(&self.to_cbor_value())
    }

    pub fn cid(&self) -> Result<Cid, EncodingError> {
        Ok(Cid::of_cbor(&self.to_cbor()?))
    }

    pub fn to_json(&self) -> MessageJson {
        MessageJson {
            version: self.version,
            to: self.to.to_string(),
            from: self.from.to_string(),
            nonce: self.nonce,
            value: self.value.to_string(),
            gas_limit: self.gas_limit,
            gas_fee_cap: self.gas_fee_cap.to_string(),
            gas_premium: self.gas_premium.to_string(),
            method: self.method,
            params: general_purpose::STANDARD.encode(&self.params),
        }
    }

    pub fn from_json(json: &MessageJson) -> Result<Self, EncodingError> {
        let amount = |s: &str| {
            s.parse::<u128>()
                .map_err(|e| EncodingError::new(format!("bad amount '{}': {}", s, e)))
        };
        let address = |s: &str| {
            s.parse::<Address>()
                .map_err(|e| EncodingError::new(e.to_string()))
        };
        let params = general_purpose::STANDARD
            .decode(json.params.as_bytes())
            .map_err(|e| EncodingError::new(format!("bad params: {}", e)))?;

        Ok(Self {
            version: json.version,
            to: address(&json.to)?,
            from: address(&json.from)?,
            nonce: json.nonce,
            value: amount(&json.value)?,
            gas_limit: json.gas_limit,
            gas_fee_cap: amount(&json.gas_fee_cap)?,
            gas_premium: amount(&json.gas_premium)?,
            method: json.method,
            params,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub sig_type: u8,
    pub data: Vec<u8>,
}

impl Signature {
    pub fn secp256k1(data: Vec<u8>) -> Self {
        Self {
            sig_type: SIG_TYPE_SECP256K1,
            data,
        }
    }

    /// Wire form: type byte followed by the signature data
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.data.len());
        out.push(self.sig_type);
        out.extend_from_slice(&self.data);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
    pub message: UnsignedMessage,
    pub signature: Signature,
}

impl SignedMessage {
    pub fn cid(&self) -> Result<Cid, EncodingError> {
        let value = Value::Array(vec![
            self.message.to_cbor_value(),
            encoding::bytes(self.signature.to_bytes()),
        ]);
        Ok(Cid::of_cbor(&encoding::encode(&value)?))
    }

    pub fn to_json(&self) -> SignedMessageJson {
        SignedMessageJson {
            message: self.message.to_json(),
            signature: SignatureJson {
                sig_type: self.signature.sig_type,
                data: general_purpose::STANDARD.encode(&self.signature.data),
            },
        }
    }

    pub fn from_json(json: &SignedMessageJson) -> Result<Self, EncodingError> {
        let data = general_purpose::STANDARD
            .decode(json.signature.data.as_bytes())
            .map_err(|e| EncodingError::new(format!("bad signature: {}", e)))?;
        Ok(Self {
            message: UnsignedMessage::from_json(&json.message)?,
            signature: Signature {
                sig_type: json.signature.sig_type,
                data,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageJson {
    pub version: u64,
    pub to: String,
    pub from: String,
    pub nonce: u64,
    pub value: String,
    pub gas_limit: i64,
    pub gas_fee_cap: String,
    pub gas_premium: String,
    pub method: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub params: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureJson {
    #[serde(rename = "Type")]
    pub sig_type: u8,
    #[serde(rename = "Data")]
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignedMessageJson {
    pub message: MessageJson,
    pub signature: SignatureJson,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Network;

    fn sample() -> UnsignedMessage {
        UnsignedMessage {
            version: 0,
            to: Address::new_id(Network::Testnet, 80),
            from: Address::new_secp256k1(Network::Testnet, &[0x04; 65]),
            nonce: 7,
            value: 0,
            gas_limit: 1_000_000,
            gas_fee_cap: 100_000,
            gas_premium: 99_000,
            method: 2,
            params: vec![0x82, 0x01, 0x02],
        }
    }

    #[test]
    fn test_cbor_layout() {
        let cbor = sample().to_cbor().unwrap();
        // 10-element array header
        assert_eq!(cbor[0], 0x8a);
        let items = encoding::tuple(encoding::decode(&cbor).unwrap(), 10).unwrap();
        assert_eq!(encoding::as_u64(&items[3]).unwrap(), 7);
        assert_eq!(encoding::as_u64(&items[8]).unwrap(), 2);
    }

    #[test]
    fn test_cid_format() {
        let cid = sample().cid().unwrap();
        let s = cid.to_string();
        assert!(s.starts_with("bafy2bza"), "{}", s);
        assert_eq!(s.parse::<Cid>().unwrap(), cid);
        assert_eq!(cid.to_bytes().len(), 38);
    }

    #[test]
    fn test_json_round_trip() {
        let msg = sample();
        let json = serde_json::to_value(msg.to_json()).unwrap();
        assert_eq!(json["Method"], 2);
        assert_eq!(json["GasFeeCap"], "100000");
        let back: MessageJson = serde_json::from_value(json).unwrap();
        assert_eq!(UnsignedMessage::from_json(&back).unwrap(), msg);
    }

    #[test]
    fn test_null_params_accepted() {
        let json = serde_json::json!({
            "Version": 0, "To": "t080", "From": "t01001", "Nonce": 0, "Value": "0",
            "GasLimit": 0, "GasFeeCap": "0", "GasPremium": "0", "Method": 0, "Params": null
        });
        let parsed: MessageJson = serde_json::from_value(json).unwrap();
        assert!(UnsignedMessage::from_json(&parsed).unwrap().params.is_empty());
    }

    #[test]
    fn test_signed_cid_differs_from_unsigned() {
        let signed = SignedMessage {
            message: sample(),
            signature: Signature::secp256k1(vec![1u8; 65]),
        };
        assert_ne!(signed.cid().unwrap(), sample().cid().unwrap());
        assert_eq!(signed.signature.to_bytes().len(), 66);
    }
}
