//! # Transaction Decoder
//!
//! Human-readable and JSON breakdowns of raw transactions, recognizing
//! spends of time-locked P2SH addresses.

use crate::address::{Address, Network};
use crate::error::LockResult;
use crate::locked_script::LockSpec;
use crate::locktime::LockKind;
use crate::script::{Instruction, Script};
use crate::transaction::{Transaction, TxIn, TxOut};
use crate::utils::amount;
use serde::Serialize;
use std::fmt;

/// Transaction analysis result
#[derive(Debug, Clone, Serialize)]
pub struct TransactionAnalysis {
    pub metadata: TransactionMetadata,
    pub inputs: Vec<InputAnalysis>,
    pub outputs: Vec<OutputAnalysis>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionMetadata {
    pub txid: String,
    pub version: i32,
    pub lock_time: u32,
    pub lock_kind: Option<String>,
    pub size: usize,
    pub input_count: usize,
    pub output_count: usize,
    pub total_output: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputAnalysis {
    pub index: usize,
    pub outpoint: String,
    pub sequence: u32,
    pub script_sig: ScriptAnalysis,
    /// Redeem script revealed by a P2SH spend
    pub redeem_script: Option<ScriptAnalysis>,
    pub spending_type: SpendingType,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputAnalysis {
    pub index: usize,
    pub value: u64,
    pub script_pubkey: ScriptAnalysis,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptAnalysis {
    pub hex: String,
    pub asm: String,
}

impl ScriptAnalysis {
    fn of(script: &Script) -> Self {
        Self {
            hex: script.to_hex(),
            asm: script.to_asm(),
        }
    }
}

/// How an input unlocks the output it spends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpendingType {
    /// `<sig> <pubkey> <lock CLTV DROP DUP HASH160 pkh EQUALVERIFY CHECKSIG>`
    TimelockedP2sh {
        lock_value: u32,
        pub_key_hash: String,
        p2sh_address: String,
    },
    /// Input not signed yet
    Unsigned,
    Unknown,
}

impl fmt::Display for SpendingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpendingType::TimelockedP2sh {
                lock_value,
                p2sh_address,
                ..
            } => write!(
                f,
                "time-locked P2SH {} until {} {}",
                p2sh_address,
                LockKind::of(*lock_value),
                lock_value
            ),
            SpendingType::Unsigned => write!(f, "unsigned"),
            SpendingType::Unknown => write!(f, "unknown"),
        }
    }
}

pub struct TransactionDecoder {
    network: Network,
}

impl TransactionDecoder {
    pub fn new(network: Network) -> Self {
        Self { network }
    }

    pub fn analyze_hex(&self, raw: &str) -> LockResult<TransactionAnalysis> {
        Ok(self.analyze_transaction(&Transaction::from_hex(raw)?))
    }

    pub fn analyze_transaction(&self, tx: &Transaction) -> TransactionAnalysis {
        TransactionAnalysis {
            metadata: TransactionMetadata {
                txid: tx.txid().to_string(),
                version: tx.version,
                lock_time: tx.lock_time,
                lock_kind: (tx.lock_time != 0).then(|| LockKind::of(tx.lock_time).to_string()),
                size: tx.size(),
                input_count: tx.input.len(),
                output_count: tx.output.len(),
                total_output: tx.total_output_value(),
            },
            inputs: tx
                .input
                .iter()
                .enumerate()
                .map(|(index, input)| self.analyze_input(index, input))
                .collect(),
            outputs: tx
                .output
                .iter()
                .enumerate()
                .map(|(index, output)| self.analyze_output(index, output))
                .collect(),
        }
    }

    fn analyze_input(&self, index: usize, input: &TxIn) -> InputAnalysis {
        let redeem = redeem_script(&input.script_sig);
        let spending_type = match &redeem {
            _ if input.script_sig.is_empty() => SpendingType::Unsigned,
            Some(redeem) => self.spending_type(redeem),
            None => SpendingType::Unknown,
        };
        InputAnalysis {
            index,
            outpoint: input.previous_output.to_string(),
            sequence: input.sequence,
            script_sig: ScriptAnalysis::of(&input.script_sig),
            redeem_script: redeem.as_ref().map(ScriptAnalysis::of),
            spending_type,
        }
    }

    fn analyze_output(&self, index: usize, output: &TxOut) -> OutputAnalysis {
        OutputAnalysis {
            index,
            value: output.value,
            script_pubkey: ScriptAnalysis::of(&output.script_pubkey),
            address: Address::from_script(&output.script_pubkey, self.network)
                .map(|a| a.to_string()),
        }
    }

    fn spending_type(&self, redeem: &Script) -> SpendingType {
        match LockSpec::from_locking_script(redeem) {
            Ok(spec) => SpendingType::TimelockedP2sh {
                lock_value: spec.lock_value(),
                pub_key_hash: hex::encode(spec.pub_key_hash()),
                p2sh_address: Address::p2sh(redeem, self.network).to_string(),
            },
            Err(_) => SpendingType::Unknown,
        }
    }
}

/// Last push of a `<sig> <pubkey> <script>` unlocking script
fn redeem_script(script_sig: &Script) -> Option<Script> {
    match script_sig.instructions().ok()?.as_slice() {
        [Instruction::Push(_), Instruction::Push(_), Instruction::Push(redeem)] => {
            Some(Script::from_bytes(redeem.clone()))
        }
        _ => None,
    }
}

impl TransactionAnalysis {
    /// Multi-line report for the terminal
    pub fn generate_report(&self) -> String {
        let m = &self.metadata;
        let mut report = String::new();

        report.push_str(&format!("Transaction ID: {}\n", m.txid));
        report.push_str(&format!("Version: {}\n", m.version));
        report.push_str(&format!("Size: {} bytes\n", m.size));
        match &m.lock_kind {
            Some(kind) => report.push_str(&format!("Lock Time: {} ({})\n", m.lock_time, kind)),
            None => report.push_str("Lock Time: none\n"),
        }

        report.push_str(&format!("\nInputs ({}):\n", m.input_count));
        for input in &self.inputs {
            report.push_str(&format!(
                "  #{} {} sequence 0x{:08x}\n",
                input.index, input.outpoint, input.sequence
            ));
            report.push_str(&format!("     {}\n", input.spending_type));
            if !input.script_sig.hex.is_empty() {
                report.push_str(&format!("     scriptSig: {}\n", input.script_sig.asm));
            }
            if let Some(redeem) = &input.redeem_script {
                report.push_str(&format!("     redeemScript: {}\n", redeem.asm));
            }
        }

        report.push_str(&format!("\nOutputs ({}):\n", m.output_count));
        for output in &self.outputs {
            report.push_str(&format!(
                "  #{} {} to {}\n",
                output.index,
                amount::format_dual(output.value),
                output.address.as_deref().unwrap_or("non-standard script")
            ));
            report.push_str(&format!("     scriptPubKey: {}\n", output.script_pubkey.asm));
        }

        report.push_str(&format!("\nTotal output: {}\n", amount::format_dual(m.total_output)));
        report
    }

    /// One-line summary
    pub fn generate_summary(&self) -> String {
        let timelocked = self
            .inputs
            .iter()
            .filter(|i| matches!(i.spending_type, SpendingType::TimelockedP2sh { .. }))
            .count();
        format!(
            "{}: {} inputs ({} time-locked), {} outputs, {} sats, {} bytes",
            self.metadata.txid,
            self.metadata.input_count,
            timelocked,
            self.metadata.output_count,
            self.metadata.total_output,
            self.metadata.size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{build_spend, FeeRate};
    use crate::keys::SigningKey;
    use crate::transaction::Txid;
    use crate::utxo::{Utxo, UtxoSet};

    fn signed_spend() -> Transaction {
        let key: SigningKey = "cSyZjejfhK5gaVYoG9pgfdMrZzw7rXufpiG4oDaYShanJhwpqGcE"
            .parse()
            .unwrap();
        let lock = LockSpec::new(1747851, key.pub_key_hash()).unwrap();
        let utxos: UtxoSet = vec![Utxo {
            txid: Txid::from_byte_array([9; 32]),
            vout: 0,
            value: 80_000,
            confirmations: 1,
        }]
        .into_iter()
        .collect();
        let destination = key.p2pkh_address(Network::Testnet);
        build_spend(&utxos, &destination, &lock, &key, FeeRate::from_sats_per_byte(1.0).unwrap())
            .unwrap()
            .signed
    }

    #[test]
    fn test_recognizes_timelocked_spend() {
        let tx = signed_spend();
        let analysis = TransactionDecoder::new(Network::Testnet).analyze_hex(&tx.to_hex()).unwrap();

        assert_eq!(analysis.metadata.txid, tx.txid().to_string());
        assert_eq!(analysis.metadata.lock_kind.as_deref(), Some("block height"));
        assert_eq!(
            analysis.inputs[0].spending_type,
            SpendingType::TimelockedP2sh {
                lock_value: 1747851,
                pub_key_hash: "8880768c36754fd2ff1954f213303a680ba67c28".to_string(),
                p2sh_address: "2MwbgHJBG9mSp54CCG4zaLFyg3yGkZovAAE".to_string(),
            }
        );
        assert_eq!(
            analysis.outputs[0].address.as_deref(),
            Some("msxi5uy33SshrJfNYU9nfSa8Rb5DbCcfRh")
        );

        let report = analysis.generate_report();
        assert!(report.contains("2MwbgHJBG9mSp54CCG4zaLFyg3yGkZovAAE"));
        assert!(report.contains("OP_CHECKLOCKTIMEVERIFY"));
        assert!(analysis.generate_summary().contains("1 time-locked"));
    }

    #[test]
    fn test_unsigned_input() {
        let mut tx = signed_spend();
        tx.input[0].script_sig = Script::new();
        let analysis = TransactionDecoder::new(Network::Testnet).analyze_transaction(&tx);
        assert_eq!(analysis.inputs[0].spending_type, SpendingType::Unsigned);
    }

    #[test]
    fn test_json_output() {
        let analysis =
            TransactionDecoder::new(Network::Testnet).analyze_transaction(&signed_spend());
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["inputs"][0]["spending_type"]["type"], "timelocked_p2sh");
        assert_eq!(json["metadata"]["lock_time"], 1747851);
    }

    #[test]
    fn test_segwit_funding_is_explained() {
        let mut reference: bitcoin::Transaction =
            bitcoin::consensus::encode::deserialize(&signed_spend().to_bytes()).unwrap();
        reference.input[0].witness.push([0x01; 64]);
        let raw = bitcoin::consensus::encode::serialize_hex(&reference);

        let err = TransactionDecoder::new(Network::Testnet).analyze_hex(&raw).unwrap_err();
        assert!(err.to_string().contains("segwit"), "{}", err);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(TransactionDecoder::new(Network::Testnet).analyze_hex("0200").is_err());
    }
}
