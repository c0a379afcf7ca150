//! ECDSA signature extraction from transaction input scripts

use bitcoin::Block;
use secp256k1::ecdsa::Signature;

use crate::block::script;
use crate::types::{RValue, SignatureRecord};

/// Extract every ECDSA signature embedded in a block's input scripts.
///
/// Coinbase transactions are skipped entirely; their input script is
/// arbitrary data. For the rest, every push-data item of every input is
/// tried as a DER signature, and the ones that parse are emitted tagged
/// with their `(tx, txin, data)` position. Most items are public keys or
/// hash preimages, so parse-and-skip is the normal path.
pub fn extract_signatures(block: &Block, height: u64) -> Vec<SignatureRecord> {
    let mut records = Vec::new();

    for (tx_index, tx) in block.txdata.iter().enumerate() {
        if tx.is_coinbase() {
            continue;
        }

        for (txin_index, input) in tx.input.iter().enumerate() {
            let items = script::pushed_data(&input.script_sig);

            for (data_index, item) in items.iter().enumerate() {
                let Some(sig) = parse_der_signature(item) else {
                    continue;
                };

                records.push(SignatureRecord {
                    r: RValue::from_signature(&sig),
                    height,
                    tx_index,
                    txin_index,
                    data_index,
                });
            }
        }
    }

    records
}

/// Parse a pushed item as a DER signature.
///
/// Script signatures carry a trailing sighash-type byte after the DER body,
/// so a strict parse is retried with the last byte stripped.
fn parse_der_signature(data: &[u8]) -> Option<Signature> {
    if let Ok(sig) = Signature::from_der(data) {
        return Some(sig);
    }

    let (_, body) = data.split_last()?;
    Signature::from_der(body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::block::{Header, Version};
    use bitcoin::hashes::Hash;
    use bitcoin::transaction::Version as TxVersion;
    use bitcoin::{
        Amount, BlockHash, CompactTarget, OutPoint, ScriptBuf, Sequence, Transaction, TxIn,
        TxMerkleNode, TxOut, Txid, Witness,
    };
    use secp256k1::{Message, Secp256k1, SecretKey};

    fn der_signature(digest: [u8; 32]) -> Vec<u8> {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[0x42; 32]).unwrap();
        let sig = secp.sign_ecdsa(&Message::from_digest(digest), &sk);
        sig.serialize_der().to_vec()
    }

    fn script_with_pushes(items: &[&[u8]]) -> ScriptBuf {
        let mut bytes = Vec::new();
        for item in items {
            assert!(item.len() <= 75);
            bytes.push(item.len() as u8);
            bytes.extend_from_slice(item);
        }
        ScriptBuf::from_bytes(bytes)
    }

    fn coinbase_tx() -> Transaction {
        Transaction {
            version: TxVersion::ONE,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::from_bytes(vec![0x04, 0xff, 0xff, 0x00, 0x1d]),
                sequence: Sequence::MAX,
                witness: Witness::default(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(50_0000_0000),
                script_pubkey: ScriptBuf::new(),
            }],
        }
    }

    fn spending_tx(script_sigs: Vec<ScriptBuf>) -> Transaction {
        Transaction {
            version: TxVersion::ONE,
            lock_time: LockTime::ZERO,
            input: script_sigs
                .into_iter()
                .enumerate()
                .map(|(vout, script_sig)| TxIn {
                    previous_output: OutPoint::new(Txid::from_byte_array([0x33; 32]), vout as u32),
                    script_sig,
                    sequence: Sequence::MAX,
                    witness: Witness::default(),
                })
                .collect(),
            output: vec![TxOut {
                value: Amount::from_sat(1000),
                script_pubkey: ScriptBuf::new(),
            }],
        }
    }

    fn block_with_txs(txdata: Vec<Transaction>) -> Block {
        Block {
            header: Header {
                version: Version::ONE,
                prev_blockhash: BlockHash::all_zeros(),
                merkle_root: TxMerkleNode::all_zeros(),
                time: 1231006505,
                bits: CompactTarget::from_consensus(0x1d00ffff),
                nonce: 0,
            },
            txdata,
        }
    }

    #[test]
    fn test_coinbase_only_block_has_no_signatures() {
        let block = block_with_txs(vec![coinbase_tx()]);
        assert!(extract_signatures(&block, 0).is_empty());
    }

    #[test]
    fn test_extracts_signature_with_sighash_byte() {
        let mut sig = der_signature([0x01; 32]);
        sig.push(0x01); // SIGHASH_ALL
        let pubkey = {
            let mut pk = vec![0x02];
            pk.extend_from_slice(&[0xab; 32]);
            pk
        };

        let tx = spending_tx(vec![script_with_pushes(&[&sig[..], &pubkey[..]])]);
        let block = block_with_txs(vec![coinbase_tx(), tx]);

        let records = extract_signatures(&block, 7);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].height, 7);
        assert_eq!(records[0].tx_index, 1);
        assert_eq!(records[0].txin_index, 0);
        assert_eq!(records[0].data_index, 0);
    }

    #[test]
    fn test_extracts_bare_der_signature() {
        let sig = der_signature([0x02; 32]);
        let tx = spending_tx(vec![script_with_pushes(&[&sig[..]])]);
        let block = block_with_txs(vec![coinbase_tx(), tx]);

        assert_eq!(extract_signatures(&block, 0).len(), 1);
    }

    #[test]
    fn test_non_signature_pushes_are_skipped() {
        let junk = vec![0x99; 33];
        let tx = spending_tx(vec![script_with_pushes(&[&junk[..]])]);
        let block = block_with_txs(vec![coinbase_tx(), tx]);

        assert!(extract_signatures(&block, 0).is_empty());
    }

    #[test]
    fn test_indices_cover_inputs_and_items() {
        let mut sig_a = der_signature([0x03; 32]);
        sig_a.push(0x01);
        let mut sig_b = der_signature([0x04; 32]);
        sig_b.push(0x01);
        let pubkey = vec![0x04; 65];

        // input 0 pushes <junk> <sig_a>; input 1 pushes <sig_b> <pubkey>
        let tx = spending_tx(vec![
            script_with_pushes(&[&pubkey[..], &sig_a[..]]),
            script_with_pushes(&[&sig_b[..], &pubkey[..]]),
        ]);
        let block = block_with_txs(vec![coinbase_tx(), tx]);

        let records = extract_signatures(&block, 0);
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].txin_index, 0);
        assert_eq!(records[0].data_index, 1);
        assert_eq!(records[1].txin_index, 1);
        assert_eq!(records[1].data_index, 0);
    }

    #[test]
    fn test_same_digest_same_key_reuses_r() {
        let sig_a = der_signature([0x05; 32]);
        let sig_b = der_signature([0x05; 32]);

        let tx = spending_tx(vec![
            script_with_pushes(&[&sig_a[..]]),
            script_with_pushes(&[&sig_b[..]]),
        ]);
        let block = block_with_txs(vec![coinbase_tx(), tx]);

        let records = extract_signatures(&block, 0);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].r, records[1].r);
    }
}
