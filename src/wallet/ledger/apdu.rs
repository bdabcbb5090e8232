//! APDU framing for the Filecoin Ledger application

use crate::error::WalletError;

pub const CLA: u8 = 0x06;
pub const INS_GET_VERSION: u8 = 0x00;
pub const INS_GET_ADDR_SECP256K1: u8 = 0x01;
pub const INS_SIGN_SECP256K1: u8 = 0x02;

/// Maximum payload per sign chunk
pub const CHUNK_SIZE: usize = 250;

pub const P1_INIT: u8 = 0x00;
pub const P1_ADD: u8 = 0x01;
pub const P1_LAST: u8 = 0x02;

pub const SW_OK: u16 = 0x9000;
pub const SW_DEVICE_LOCKED: u16 = 0x5515;
pub const SW_APP_NOT_OPEN: u16 = 0x6E01;
pub const SW_CLA_NOT_SUPPORTED: u16 = 0x6E00;
pub const SW_INS_NOT_SUPPORTED: u16 = 0x6D00;
pub const SW_CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
pub const SW_TRANSACTION_REJECTED: u16 = 0x6986;

/// Oldest app release whose signing flow is supported
pub const MIN_APP_VERSION: (u16, u16, u16) = (0, 18, 2);

const HARDENED: u32 = 0x8000_0000;
const PATH_COMPONENTS: usize = 5;
const PUBKEY_LEN: usize = 65;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduCommand {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
}

impl ApduCommand {
    pub fn new(ins: u8, p1: u8, data: Vec<u8>) -> Self {
        Self {
            cla: CLA,
            ins,
            p1,
            p2: 0,
            data,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = vec![self.cla, self.ins, self.p1, self.p2, self.data.len() as u8];
        out.extend_from_slice(&self.data);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduAnswer {
    pub data: Vec<u8>,
    pub status: u16,
}

impl ApduAnswer {
    /// Split a raw device response into payload and trailing status word
    pub fn from_raw(raw: &[u8]) -> Result<Self, WalletError> {
        if raw.len() < 2 {
            return Err(WalletError::TransportDisconnected);
        }
        let (data, sw) = raw.split_at(raw.len() - 2);
        Ok(Self {
            data: data.to_vec(),
            status: u16::from_be_bytes([sw[0], sw[1]]),
        })
    }

    pub fn into_data(self) -> Result<Vec<u8>, WalletError> {
        check_status(self.status)?;
        Ok(self.data)
    }
}

/// Map a status word to the error kind callers act on
pub fn check_status(status: u16) -> Result<(), WalletError> {
    match status {
        SW_OK => Ok(()),
        SW_DEVICE_LOCKED => Err(WalletError::DeviceLocked),
        SW_APP_NOT_OPEN | SW_CLA_NOT_SUPPORTED | SW_INS_NOT_SUPPORTED => {
            Err(WalletError::WrongApplication)
        }
        SW_CONDITIONS_NOT_SATISFIED | SW_TRANSACTION_REJECTED => Err(WalletError::RejectedByUser),
        code => Err(WalletError::Device {
            code,
            message: describe_status(code).to_string(),
        }),
    }
}

fn describe_status(code: u16) -> &'static str {
    match code {
        0x6400 => "Execution error",
        0x6700 => "Wrong length",
        0x6982 => "Empty buffer",
        0x6983 => "Output buffer too small",
        0x6984 => "Data is invalid",
        0x6A80 => "Bad key handle",
        0x6B00 => "Invalid P1/P2",
        0x6F00 => "Unknown error",
        0x6F01 => "Sign/verify error",
        _ => "Unexpected device response",
    }
}

/// Serialize `m/44'/461'/0'/0/i` as five little-endian u32 with the hardened bit
pub fn serialize_path(path: &str) -> Result<Vec<u8>, WalletError> {
    let components: Vec<&str> = path
        .strip_prefix("m/")
        .ok_or_else(|| WalletError::Derivation(format!("path must start with m/: {}", path)))?
        .split('/')
        .collect();
    if components.len() != PATH_COMPONENTS {
        return Err(WalletError::Derivation(format!(
            "expected {} path components, got {}: {}",
            PATH_COMPONENTS,
            components.len(),
            path
        )));
    }

    let mut out = Vec::with_capacity(PATH_COMPONENTS * 4);
    for component in components {
        let (digits, hardened) = match component.strip_suffix('\'') {
            Some(d) => (d, true),
            None => (component, false),
        };
        let mut value: u32 = digits
            .parse()
            .map_err(|_| WalletError::Derivation(format!("bad path component '{}'", component)))?;
        if value >= HARDENED {
            return Err(WalletError::Derivation(format!("path component too large: {}", component)));
        }
        if hardened {
            value |= HARDENED;
        }
        out.extend_from_slice(&value.to_le_bytes());
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppVersion {
    pub test_mode: bool,
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub locked: bool,
}

impl AppVersion {
    /// Parse the get-version payload; newer apps send 16-bit version fields
    pub fn parse(data: &[u8]) -> Result<Self, WalletError> {
        if data.len() >= 12 {
            let u16_at = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]);
            Ok(Self {
                test_mode: data[0] != 0,
                major: u16_at(1),
                minor: u16_at(3),
                patch: u16_at(5),
                locked: data[7] == 1,
            })
        } else if data.len() >= 5 {
            Ok(Self {
                test_mode: data[0] != 0,
                major: u16::from(data[1]),
                minor: u16::from(data[2]),
                patch: u16::from(data[3]),
                locked: data[4] == 1,
            })
        } else {
            Err(WalletError::Device {
                code: 0,
                message: format!("version response too short ({} bytes)", data.len()),
            })
        }
    }

    pub fn is_supported(&self) -> bool {
        (self.major, self.minor, self.patch) >= MIN_APP_VERSION
    }

    pub fn to_version_string(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressResponse {
    pub public_key: Vec<u8>,
    pub address_bytes: Vec<u8>,
    pub address_string: String,
}

impl AddressResponse {
    /// Layout: pubkey(65) | len | address bytes | len | address string
    pub fn parse(data: &[u8]) -> Result<Self, WalletError> {
        let short = || WalletError::Device {
            code: 0,
            message: "truncated address response".to_string(),
        };

        let public_key = data.get(..PUBKEY_LEN).ok_or_else(short)?.to_vec();
        let mut offset = PUBKEY_LEN;

        let bytes_len = usize::from(*data.get(offset).ok_or_else(short)?);
        offset += 1;
        let address_bytes = data.get(offset..offset + bytes_len).ok_or_else(short)?.to_vec();
        offset += bytes_len;

        let str_len = usize::from(*data.get(offset).ok_or_else(short)?);
        offset += 1;
        let address_string = String::from_utf8(
            data.get(offset..offset + str_len).ok_or_else(short)?.to_vec(),
        )
        .map_err(|e| WalletError::Encoding(e.to_string()))?;

        Ok(Self {
            public_key,
            address_bytes,
            address_string,
        })
    }
}

/// Chunk a sign request: path first, then the message in 250-byte pieces
pub fn sign_commands(path: &[u8], message: &[u8]) -> Vec<ApduCommand> {
    let mut commands = vec![ApduCommand::new(INS_SIGN_SECP256K1, P1_INIT, path.to_vec())];
    let chunks: Vec<&[u8]> = message.chunks(CHUNK_SIZE).collect();
    let last = chunks.len().saturating_sub(1);
    for (i, chunk) in chunks.into_iter().enumerate() {
        let p1 = if i == last { P1_LAST } else { P1_ADD };
        commands.push(ApduCommand::new(INS_SIGN_SECP256K1, p1, chunk.to_vec()));
    }
    commands
}

/// Compact `r || s || v` from a sign response
pub fn parse_signature(data: &[u8]) -> Result<[u8; 65], WalletError> {
    let compact = data.get(..65).ok_or_else(|| WalletError::Device {
        code: 0,
        message: format!("signature response too short ({} bytes)", data.len()),
    })?;
    let mut out = [0u8; 65];
    out.copy_from_slice(compact);
    Ok(out)
}
