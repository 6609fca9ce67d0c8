//! # Addresses
//!
//! Base58Check P2PKH and P2SH addresses for mainnet, testnet and regtest.
//! Testnet and regtest share version bytes, so a decoded test address is
//! reported as [`Network::Testnet`] and accepted by either network through
//! [`Address::require_network`].

use crate::base58::{check_decode, check_encode};
use crate::config::fees;
use crate::error::{LockError, LockResult};
use crate::hash::hash160;
use crate::script::{opcodes::*, Builder, Instruction, Script};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported Bitcoin networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub fn p2pkh_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet | Network::Regtest => 0x6f,
        }
    }

    pub fn p2sh_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x05,
            Network::Testnet | Network::Regtest => 0xc4,
        }
    }

    /// Prefix of WIF-encoded private keys
    pub fn wif_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x80,
            Network::Testnet | Network::Regtest => 0xef,
        }
    }

    pub fn default_rpc_port(self) -> u16 {
        match self {
            Network::Mainnet => 8332,
            Network::Testnet => 18332,
            Network::Regtest => 18443,
        }
    }

    /// Fee price feed for this network. Regtest has none.
    pub fn fee_api_url(self) -> Option<&'static str> {
        match self {
            Network::Mainnet => Some(fees::FEE_API_MAINNET),
            Network::Testnet => Some(fees::FEE_API_TESTNET),
            Network::Regtest => None,
        }
    }

    pub(crate) fn shares_prefixes_with(self, other: Network) -> bool {
        self.p2pkh_version() == other.p2pkh_version()
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "test" | "testnet3" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            _ => Err(format!(
                "Unknown network: {}. Valid options: mainnet, testnet, regtest",
                s
            )),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Regtest => write!(f, "regtest"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    /// Pay to public key hash
    P2pkh,
    /// Pay to script hash
    P2sh,
}

/// A 20-byte hash tagged with its address kind and network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    kind: AddressKind,
    hash: [u8; 20],
    network: Network,
}

impl Address {
    pub fn from_hash(hash: [u8; 20], kind: AddressKind, network: Network) -> Self {
        Self {
            kind,
            hash,
            network,
        }
    }

    /// P2SH address committing to `script`.
    pub fn p2sh(script: &Script, network: Network) -> Self {
        Self::from_hash(hash160(script.as_bytes()), AddressKind::P2sh, network)
    }

    pub fn to_hash(&self) -> ([u8; 20], AddressKind) {
        (self.hash, self.kind)
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn version_byte(&self) -> u8 {
        match self.kind {
            AddressKind::P2pkh => self.network.p2pkh_version(),
            AddressKind::P2sh => self.network.p2sh_version(),
        }
    }

    /// Output script paying to this address.
    pub fn script_pubkey(&self) -> Script {
        match self.kind {
            AddressKind::P2pkh => Builder::new()
                .push_opcode(OP_DUP)
                .push_opcode(OP_HASH160)
                .push_slice(&self.hash)
                .push_opcode(OP_EQUALVERIFY)
                .push_opcode(OP_CHECKSIG)
                .into_script(),
            AddressKind::P2sh => Builder::new()
                .push_opcode(OP_HASH160)
                .push_slice(&self.hash)
                .push_opcode(OP_EQUAL)
                .into_script(),
        }
    }

    /// Recognize a standard P2PKH or P2SH output script.
    pub fn from_script(script: &Script, network: Network) -> Option<Self> {
        let instructions = script.instructions().ok()?;
        match instructions.as_slice() {
            [
                Instruction::Op(OP_DUP),
                Instruction::Op(OP_HASH160),
                Instruction::Push(hash),
                Instruction::Op(OP_EQUALVERIFY),
                Instruction::Op(OP_CHECKSIG),
            ] => {
                let hash: [u8; 20] = hash.as_slice().try_into().ok()?;
                Some(Self::from_hash(hash, AddressKind::P2pkh, network))
            }
            [Instruction::Op(OP_HASH160), Instruction::Push(hash), Instruction::Op(OP_EQUAL)] => {
                let hash: [u8; 20] = hash.as_slice().try_into().ok()?;
                Some(Self::from_hash(hash, AddressKind::P2sh, network))
            }
            _ => None,
        }
    }

    pub fn is_valid_for_network(&self, network: Network) -> bool {
        self.network == network || self.network.shares_prefixes_with(network)
    }

    /// Check the address belongs to `network` and retag it accordingly.
    pub fn require_network(self, network: Network) -> LockResult<Address> {
        if !self.is_valid_for_network(network) {
            return Err(LockError::InvalidAddress {
                address: format!("{} is not a {} address", self, network),
            });
        }
        Ok(Self { network, ..self })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = Vec::with_capacity(21);
        payload.push(self.version_byte());
        payload.extend_from_slice(&self.hash);
        write!(f, "{}", check_encode(&payload))
    }
}

impl FromStr for Address {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let payload = check_decode(s)?;
        if payload.len() != 21 {
            return Err(LockError::InvalidAddress {
                address: s.to_string(),
            });
        }

        let (kind, network) = match payload[0] {
            0x00 => (AddressKind::P2pkh, Network::Mainnet),
            0x05 => (AddressKind::P2sh, Network::Mainnet),
            0x6f => (AddressKind::P2pkh, Network::Testnet),
            0xc4 => (AddressKind::P2sh, Network::Testnet),
            version => return Err(LockError::InvalidVersionByte { version }),
        };

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);
        Ok(Self::from_hash(hash, kind, network))
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PKH: &str = "8880768c36754fd2ff1954f213303a680ba67c28";

    fn pkh() -> [u8; 20] {
        hex::decode(PKH).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_known_addresses() {
        let testnet = Address::from_hash(pkh(), AddressKind::P2pkh, Network::Testnet);
        assert_eq!(testnet.to_string(), "msxi5uy33SshrJfNYU9nfSa8Rb5DbCcfRh");

        let mainnet = Address::from_hash(pkh(), AddressKind::P2pkh, Network::Mainnet);
        assert_eq!(mainnet.to_string(), "1DSknrt4ERST5CBkpuBQqXMoZbUWfaJnLP");

        let zero_p2sh = Address::from_hash([0; 20], AddressKind::P2sh, Network::Mainnet);
        assert_eq!(zero_p2sh.to_string(), "31h1vYVSYuKP6AhS86fbRdMw9XHieotbST");
    }

    #[test]
    fn test_roundtrip_all_kinds() {
        for network in [Network::Mainnet, Network::Testnet] {
            for kind in [AddressKind::P2pkh, AddressKind::P2sh] {
                let address = Address::from_hash([0x42; 20], kind, network);
                let parsed: Address = address.to_string().parse().unwrap();
                assert_eq!(parsed, address);
                assert_eq!(parsed.to_hash(), ([0x42; 20], kind));
            }
        }
    }

    #[test]
    fn test_regtest_decodes_as_testnet() {
        let address = Address::from_hash([0x42; 20], AddressKind::P2sh, Network::Regtest);
        let parsed: Address = address.to_string().parse().unwrap();
        assert_eq!(parsed.network(), Network::Testnet);

        let retagged = parsed.require_network(Network::Regtest).unwrap();
        assert_eq!(retagged, address);
        assert!(parsed.require_network(Network::Mainnet).is_err());
    }

    #[test]
    fn test_p2sh_matches_reference() {
        let script = Script::from_hex(
            "038bab1ab17576a9148880768c36754fd2ff1954f213303a680ba67c2888ac",
        )
        .unwrap();
        let ours = Address::p2sh(&script, Network::Testnet);
        assert_eq!(ours.to_string(), "2MwbgHJBG9mSp54CCG4zaLFyg3yGkZovAAE");

        let reference = bitcoin::Address::p2sh(
            &bitcoin::ScriptBuf::from_bytes(script.to_bytes()),
            bitcoin::Network::Testnet,
        )
        .unwrap();
        assert_eq!(reference.to_string(), ours.to_string());
        assert_eq!(reference.script_pubkey().to_bytes(), ours.script_pubkey().to_bytes());
    }

    #[test]
    fn test_script_pubkey_recognized() {
        let address = Address::from_hash(pkh(), AddressKind::P2pkh, Network::Testnet);
        let script = address.script_pubkey();
        assert_eq!(script.to_hex(), format!("76a914{}88ac", PKH));
        assert_eq!(Address::from_script(&script, Network::Testnet), Some(address));
        let op_return = Script::from_bytes(vec![OP_RETURN]);
        assert_eq!(Address::from_script(&op_return, Network::Testnet), None);
    }

    #[test]
    fn test_decode_errors() {
        // valid checksum, unknown version byte
        let mut payload = vec![0x30];
        payload.extend_from_slice(&[0; 20]);
        let err = check_encode(&payload).parse::<Address>().unwrap_err();
        assert!(matches!(err, LockError::InvalidVersionByte { version: 0x30 }));

        // valid checksum, wrong length
        let err = check_encode(&[0x6f, 1, 2, 3]).parse::<Address>().unwrap_err();
        assert!(matches!(err, LockError::InvalidAddress { .. }));

        let err = "msxi5uy33SshrJfNYU9nfSa8Rb5DbCcfRi".parse::<Address>().unwrap_err();
        assert!(matches!(err, LockError::ChecksumMismatch));
    }

    #[test]
    fn test_network_parsing() {
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("Mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert!("signet".parse::<Network>().is_err());
        assert_eq!(Network::Regtest.fee_api_url(), None);
    }
}
