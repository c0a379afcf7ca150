//! Signature-script decoding utilities

use bitcoin::script::Instruction;
use bitcoin::Script;

/// Collect the data payloads pushed by a script.
///
/// Signature scripts of legacy inputs push a signature and usually a public
/// key; other inputs may carry garbage that does not decode at all. A
/// malformed script yields an empty list rather than an error, so callers
/// can treat every input uniformly.
pub fn pushed_data(script: &Script) -> Vec<Vec<u8>> {
    let mut items = Vec::new();

    for instruction in script.instructions() {
        match instruction {
            Ok(Instruction::PushBytes(bytes)) => items.push(bytes.as_bytes().to_vec()),
            Ok(Instruction::Op(_)) => {}
            Err(_) => return Vec::new(),
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::ScriptBuf;

    #[test]
    fn test_pushed_data_sig_and_pubkey() {
        // <71-byte sig> <33-byte pubkey>
        let mut script_bytes = Vec::new();
        script_bytes.push(71);
        script_bytes.extend_from_slice(&[0x30; 71]);
        script_bytes.push(33);
        script_bytes.push(0x02);
        script_bytes.extend_from_slice(&[0xab; 32]);

        let script = ScriptBuf::from_bytes(script_bytes);
        let items = pushed_data(&script);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].len(), 71);
        assert_eq!(items[1].len(), 33);
        assert_eq!(items[1][0], 0x02);
    }

    #[test]
    fn test_pushed_data_skips_opcodes() {
        // OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG
        let mut script_bytes = vec![0x76, 0xa9];
        script_bytes.push(20);
        script_bytes.extend_from_slice(&[0x11; 20]);
        script_bytes.extend_from_slice(&[0x88, 0xac]);

        let script = ScriptBuf::from_bytes(script_bytes);
        let items = pushed_data(&script);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0], vec![0x11; 20]);
    }

    #[test]
    fn test_pushed_data_malformed_script_is_empty() {
        // Declares a 60-byte push but truncates after 2 bytes.
        let script = ScriptBuf::from_bytes(vec![60, 0x01, 0x02]);
        assert!(pushed_data(&script).is_empty());
    }

    #[test]
    fn test_pushed_data_empty_script() {
        let script = ScriptBuf::from_bytes(Vec::new());
        assert!(pushed_data(&script).is_empty());
    }
}
