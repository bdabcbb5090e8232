//! Filecoin addresses
//!
//! String form is `<network><protocol><payload>`; the raw byte form used
//! inside CBOR params and EVM calldata is `[protocol] ++ payload`.

use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};

use crate::error::AddressError;
use crate::signature::{address_checksum, blake2b_160};

/// Address namespace of Ethereum-style accounts on the FEVM
pub const EAM_NAMESPACE: u64 = 10;

const CHECKSUM_LEN: usize = 4;
const BLS_PUBKEY_LEN: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn prefix(&self) -> char {
        match self {
            Network::Mainnet => 'f',
            Network::Testnet => 't',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Payload {
    Id(u64),
    Secp256k1([u8; 20]),
    Actor([u8; 20]),
    Bls(Vec<u8>),
    Delegated { namespace: u64, subaddress: Vec<u8> },
}

impl Payload {
    pub fn protocol(&self) -> u8 {
        match self {
            Payload::Id(_) => 0,
            Payload::Secp256k1(_) => 1,
            Payload::Actor(_) => 2,
            Payload::Bls(_) => 3,
            Payload::Delegated { .. } => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    network: Network,
    payload: Payload,
}

impl Address {
    pub fn new_id(network: Network, id: u64) -> Self {
        Self {
            network,
            payload: Payload::Id(id),
        }
    }

    /// Address of a secp256k1 key, from its 65-byte uncompressed encoding
    pub fn new_secp256k1(network: Network, uncompressed_pubkey: &[u8]) -> Self {
        Self {
            network,
            payload: Payload::Secp256k1(blake2b_160(uncompressed_pubkey)),
        }
    }

    pub fn new_delegated(network: Network, namespace: u64, subaddress: Vec<u8>) -> Self {
        Self {
            network,
            payload: Payload::Delegated {
                namespace,
                subaddress,
            },
        }
    }

    /// `f410…` form of a `0x…` Ethereum address
    pub fn from_eth(network: Network, eth: &str) -> Result<Self, AddressError> {
        let hex_part = eth
            .strip_prefix("0x")
            .or_else(|| eth.strip_prefix("0X"))
            .ok_or_else(|| AddressError::Invalid(format!("missing 0x prefix: {}", eth)))?;
        let bytes = hex::decode(hex_part)
            .map_err(|e| AddressError::Invalid(format!("{}: {}", eth, e)))?;
        if bytes.len() != 20 {
            return Err(AddressError::Invalid(format!(
                "ethereum address must be 20 bytes: {}",
                eth
            )));
        }
        Ok(Self::new_delegated(network, EAM_NAMESPACE, bytes))
    }

    /// Parse either a Filecoin address or a `0x` Ethereum address
    pub fn parse_any(network: Network, s: &str) -> Result<Self, AddressError> {
        if s.starts_with("0x") || s.starts_with("0X") {
            Self::from_eth(network, s)
        } else {
            s.parse()
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn protocol(&self) -> u8 {
        self.payload.protocol()
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Raw bytes form: protocol byte followed by the payload
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.protocol()];
        out.extend(self.payload_bytes());
        out
    }

    pub fn from_bytes(network: Network, bytes: &[u8]) -> Result<Self, AddressError> {
        let (&protocol, rest) = bytes
            .split_first()
            .ok_or_else(|| AddressError::Invalid("empty address bytes".into()))?;

        let payload = match protocol {
            0 => {
                let (id, used) = read_uvarint(rest)?;
                if used != rest.len() {
                    return Err(AddressError::Invalid("trailing bytes after id".into()));
                }
                Payload::Id(id)
            }
            1 | 2 => {
                let hash: [u8; 20] = rest.try_into().map_err(|_| {
                    AddressError::Invalid(format!("expected 20 byte payload, got {}", rest.len()))
                })?;
                if protocol == 1 {
                    Payload::Secp256k1(hash)
                } else {
                    Payload::Actor(hash)
                }
            }
            3 => {
                if rest.len() != BLS_PUBKEY_LEN {
                    return Err(AddressError::Invalid(format!(
                        "expected 48 byte BLS payload, got {}",
                        rest.len()
                    )));
                }
                Payload::Bls(rest.to_vec())
            }
            4 => {
                let (namespace, used) = read_uvarint(rest)?;
                Payload::Delegated {
                    namespace,
                    subaddress: rest[used..].to_vec(),
                }
            }
            other => return Err(AddressError::UnknownProtocol(other)),
        };

        Ok(Self { network, payload })
    }

    fn payload_bytes(&self) -> Vec<u8> {
        match &self.payload {
            Payload::Id(id) => write_uvarint(*id),
            Payload::Secp256k1(hash) | Payload::Actor(hash) => hash.to_vec(),
            Payload::Bls(key) => key.clone(),
            Payload::Delegated {
                namespace,
                subaddress,
            } => {
                let mut out = write_uvarint(*namespace);
                out.extend_from_slice(subaddress);
                out
            }
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.network.prefix();
        match &self.payload {
            Payload::Id(id) => write!(f, "{}0{}", prefix, id),
            Payload::Delegated {
                namespace,
                subaddress,
            } => {
                let checksum = address_checksum(&self.to_bytes());
                let mut body = subaddress.clone();
                body.extend_from_slice(&checksum);
                write!(f, "{}4{}f{}", prefix, namespace, encode_base32(&body))
            }
            _ => {
                let checksum = address_checksum(&self.to_bytes());
                let mut body = self.payload_bytes();
                body.extend_from_slice(&checksum);
                write!(f, "{}{}{}", prefix, self.protocol(), encode_base32(&body))
            }
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let network = match chars.next() {
            Some('f') => Network::Mainnet,
            Some('t') => Network::Testnet,
            _ => return Err(AddressError::Invalid(format!("bad network prefix: {}", s))),
        };
        let protocol = chars
            .next()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(|| AddressError::Invalid(format!("bad protocol: {}", s)))?
            as u8;
        let rest = &s[2..];
        if rest.is_empty() {
            return Err(AddressError::Invalid(format!("empty payload: {}", s)));
        }

        if protocol == 0 {
            let id = rest
                .parse::<u64>()
                .map_err(|e| AddressError::Invalid(format!("{}: {}", s, e)))?;
            return Ok(Self::new_id(network, id));
        }

        let (prefix_bytes, encoded) = if protocol == 4 {
            let (ns, encoded) = rest
                .split_once('f')
                .ok_or_else(|| AddressError::Invalid(format!("missing namespace: {}", s)))?;
            let namespace = ns
                .parse::<u64>()
                .map_err(|e| AddressError::Invalid(format!("{}: {}", s, e)))?;
            (write_uvarint(namespace), encoded)
        } else {
            (Vec::new(), rest)
        };

        let decoded = decode_base32(encoded)
            .ok_or_else(|| AddressError::Invalid(format!("bad base32 payload: {}", s)))?;
        if decoded.len() < CHECKSUM_LEN {
            return Err(AddressError::Invalid(format!("payload too short: {}", s)));
        }
        let (body, checksum) = decoded.split_at(decoded.len() - CHECKSUM_LEN);

        let mut raw = vec![protocol];
        raw.extend_from_slice(&prefix_bytes);
        raw.extend_from_slice(body);
        if address_checksum(&raw) != checksum {
            return Err(AddressError::Checksum(s.to_string()));
        }

        Self::from_bytes(network, &raw)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_string()
    }
}

fn encode_base32(bytes: &[u8]) -> String {
    BASE32_NOPAD.encode(bytes).to_ascii_lowercase()
}

fn decode_base32(s: &str) -> Option<Vec<u8>> {
    if s.chars().any(|c| c.is_ascii_uppercase()) {
        return None;
    }
    BASE32_NOPAD.decode(s.to_ascii_uppercase().as_bytes()).ok()
}

pub(crate) fn write_uvarint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

pub(crate) fn read_uvarint(bytes: &[u8]) -> Result<(u64, usize), AddressError> {
    let mut value = 0u64;
    for (i, byte) in bytes.iter().enumerate().take(10) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(AddressError::Invalid("unterminated varint".into()))
}
