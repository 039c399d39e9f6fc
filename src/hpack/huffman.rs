//! RFC 7541 Appendix B Huffman codec: a canonical bit-code table plus a
//! decode trie built once from that table, per the design notes' "canonical
//! lookup built from the fixed table" instruction — this is the amplification
//! guard for HPACK string literals, so decode enforces an output ceiling
//! derived from the input before it ever allocates past it.

use super::huffman_table::HUFFMAN_CODES;
use super::HpackError;
use std::sync::OnceLock;

const EOS_SYMBOL: u16 = 256;

/// Huffman-encode `input`, appending the coded bytes (with RFC 7541 §5.2
/// 1-padding to the next byte boundary) to `out`.
pub fn encode(input: &[u8], out: &mut Vec<u8>) {
    let mut bit_buffer: u64 = 0;
    let mut bit_count: u32 = 0;
    for &byte in input {
        let (code, len) = HUFFMAN_CODES[byte as usize];
        bit_buffer = (bit_buffer << len) | u64::from(code);
        bit_count += u32::from(len);
        while bit_count >= 8 {
            bit_count -= 8;
            out.push((bit_buffer >> bit_count) as u8);
        }
    }
    if bit_count > 0 {
        let padding = 8 - bit_count;
        let padded = (bit_buffer << padding) | ((1u64 << padding) - 1);
        out.push(padded as u8);
    }
}

/// The exact encoded length in bytes, used by the encoder to decide whether
/// Huffman coding actually shrinks a given string.
#[must_use]
pub fn encoded_len(input: &[u8]) -> usize {
    let bits: u64 = input
        .iter()
        .map(|&b| u64::from(HUFFMAN_CODES[b as usize].1))
        .sum();
    ((bits + 7) / 8) as usize
}

struct Node {
    children: [Option<Box<Node>>; 2],
    symbol: Option<u16>,
}

impl Node {
    fn new() -> Self {
        Self {
            children: [None, None],
            symbol: None,
        }
    }
}

fn build_tree() -> Box<Node> {
    let mut root = Box::new(Node::new());
    for (symbol, &(code, len)) in HUFFMAN_CODES.iter().enumerate() {
        let mut node: &mut Node = &mut root;
        for bit_pos in (0..len).rev() {
            let bit = ((code >> bit_pos) & 1) as usize;
            node = node.children[bit].get_or_insert_with(|| Box::new(Node::new())).as_mut();
        }
        node.symbol = Some(symbol as u16);
    }
    root
}

fn tree() -> &'static Node {
    static TREE: OnceLock<Box<Node>> = OnceLock::new();
    TREE.get_or_init(build_tree)
}

/// Decode a Huffman-coded string, rejecting output past `max_output_len`
/// (the caller derives this from the input's bit length before calling in)
/// and malformed trailing padding per RFC 7541 §5.2.
pub fn decode(input: &[u8], max_output_len: usize) -> Result<Vec<u8>, HpackError> {
    let root = tree();
    let mut node = root;
    let mut depth_since_symbol: u32 = 0;
    let mut all_ones_since_symbol = true;
    let mut out = Vec::new();

    for &byte in input {
        for bit_pos in (0..8).rev() {
            let bit = ((byte >> bit_pos) & 1) as usize;
            if bit == 0 {
                all_ones_since_symbol = false;
            }
            node = match &node.children[bit] {
                Some(child) => child,
                None => return Err(HpackError::HuffmanInvalidCode),
            };
            depth_since_symbol += 1;
            if let Some(symbol) = node.symbol {
                if symbol == EOS_SYMBOL {
                    return Err(HpackError::HuffmanEosInData);
                }
                if out.len() >= max_output_len {
                    return Err(HpackError::HuffmanOutputTooLarge);
                }
                out.push(symbol as u8);
                node = root;
                depth_since_symbol = 0;
                all_ones_since_symbol = true;
            }
        }
    }

    if depth_since_symbol > 0 {
        if depth_since_symbol > 7 || !all_ones_since_symbol {
            return Err(HpackError::HuffmanBadPadding);
        }
    }

    Ok(out)
}
