//! Signing keys: WIF and raw hex parsing, public key derivation.

use crate::address::{Address, AddressKind, Network};
use crate::base58::check_decode;
use crate::error::{LockError, LockResult};
use crate::hash::hash160;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use std::fmt;
use std::str::FromStr;

/// WIF suffix marking a compressed public key.
const COMPRESSED_FLAG: u8 = 0x01;

/// A secp256k1 private key plus the public key encoding it commits to.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    secret: SecretKey,
    compressed: bool,
    network: Option<Network>,
}

impl SigningKey {
    /// Raw 32-byte secret. Hex keys always use the compressed encoding.
    pub fn from_slice(bytes: &[u8]) -> LockResult<Self> {
        let secret = SecretKey::from_slice(bytes).map_err(|e| LockError::InvalidPrivateKey {
            message: e.to_string(),
        })?;
        Ok(Self {
            secret,
            compressed: true,
            network: None,
        })
    }

    pub fn from_hex(s: &str) -> LockResult<Self> {
        let bytes = hex::decode(s).map_err(|e| LockError::InvalidPrivateKey {
            message: format!("not hex: {}", e),
        })?;
        Self::from_slice(&bytes)
    }

    /// Wallet Import Format: `version || secret(32) [|| 0x01]` in Base58Check.
    pub fn from_wif(s: &str) -> LockResult<Self> {
        let payload = check_decode(s)?;

        let network = match payload.first() {
            Some(0x80) => Network::Mainnet,
            Some(0xef) => Network::Testnet,
            Some(&version) => return Err(LockError::InvalidVersionByte { version }),
            None => {
                return Err(LockError::InvalidPrivateKey {
                    message: "empty WIF payload".to_string(),
                })
            }
        };

        let compressed = match payload.len() {
            33 => false,
            34 if payload[33] == COMPRESSED_FLAG => true,
            _ => {
                return Err(LockError::InvalidPrivateKey {
                    message: format!("unexpected WIF payload length {}", payload.len()),
                })
            }
        };

        let mut key = Self::from_slice(&payload[1..33])?;
        key.compressed = compressed;
        key.network = Some(network);
        Ok(key)
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_secret_key(&Secp256k1::signing_only(), &self.secret)
    }

    /// Serialized public key, 33 bytes when compressed, 65 otherwise.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        let public = self.public_key();
        if self.compressed {
            public.serialize().to_vec()
        } else {
            public.serialize_uncompressed().to_vec()
        }
    }

    pub fn pub_key_hash(&self) -> [u8; 20] {
        hash160(&self.public_key_bytes())
    }

    pub fn p2pkh_address(&self, network: Network) -> Address {
        Address::from_hash(self.pub_key_hash(), AddressKind::P2pkh, network)
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Network encoded in the WIF prefix, if the key came from WIF.
    pub fn network(&self) -> Option<Network> {
        self.network
    }

    /// Reject a WIF key encoded for another network. Hex keys carry none.
    pub fn require_network(&self, network: Network) -> LockResult<()> {
        match self.network {
            Some(own) if own != network && !own.shares_prefixes_with(network) => {
                Err(LockError::InvalidPrivateKey {
                    message: format!("WIF key is for {}, not {}", own, network),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Accepts WIF first, then 64 hex characters.
impl FromStr for SigningKey {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Self::from_hex(s);
        }
        Self::from_wif(s)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("pub_key_hash", &hex::encode(self.pub_key_hash()))
            .field("compressed", &self.compressed)
            .finish_non_exhaustive()
    }
}
