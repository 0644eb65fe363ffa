//! Huffman trees built by canonical bit-path insertion
//!
//! Symbols are inserted in (code length, symbol) order. Each insertion takes
//! the leftmost free slot at its depth, which reproduces DEFLATE's canonical
//! code assignment exactly. Nodes live in an arena and refer to each other by
//! index.

use std::io::Read;

use super::bits::BitReader;
use super::inflate::InflateError;
use super::tables::MAX_CODE_BITS;

type NodeId = u16;

#[derive(Debug, Clone, Copy)]
enum Node {
    Branch([Option<NodeId>; 2]),
    Leaf(u16),
}

const ROOT: NodeId = 0;

#[derive(Debug, Clone)]
pub(crate) struct HuffmanTree {
    nodes: Vec<Node>,
    /// Code the next inserted symbol will receive, at `depth` bits.
    next_code: u32,
    depth: u8,
    leaves: usize,
}

impl HuffmanTree {
    fn new() -> Self {
        Self {
            nodes: vec![Node::Branch([None, None])],
            next_code: 0,
            depth: 0,
            leaves: 0,
        }
    }

    /// Build a tree from per-symbol code lengths (`0` = unused symbol).
    ///
    /// With `allow_sparse`, a tree holding zero or one codes is accepted even
    /// though it is incomplete; DEFLATE permits this for distance codes.
    pub fn from_lengths(lengths: &[u8], allow_sparse: bool) -> Result<Self, InflateError> {
        if lengths.iter().any(|&l| l > MAX_CODE_BITS) {
            return Err(InflateError::InvalidCodeLengths);
        }

        let mut tree = Self::new();
        for len in 1..=MAX_CODE_BITS {
            for (symbol, _) in lengths.iter().enumerate().filter(|&(_, &l)| l == len) {
                tree.insert(symbol as u16, len)?;
            }
        }

        if !tree.is_complete() && !(allow_sparse && tree.leaves <= 1) {
            return Err(InflateError::IncompleteTree);
        }
        Ok(tree)
    }

    /// True when every slot at the current depth has been handed out.
    pub fn is_complete(&self) -> bool {
        self.depth > 0 && self.next_code == 1u32 << self.depth
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        (self.nodes.len() - 1) as NodeId
    }

    /// Insert `symbol` at the leftmost free position `len` levels deep.
    fn insert(&mut self, symbol: u16, len: u8) -> Result<(), InflateError> {
        debug_assert!(len >= self.depth, "symbols must arrive in length order");
        if self.is_complete() {
            return Err(InflateError::OverfullTree);
        }

        self.next_code <<= len - self.depth;
        self.depth = len;
        if self.next_code >= 1u32 << len {
            return Err(InflateError::OverfullTree);
        }

        let code = self.next_code;
        let mut node = ROOT;
        for level in (0..len).rev() {
            let bit = ((code >> level) & 1) as usize;
            let Node::Branch(children) = self.nodes[node as usize] else {
                return Err(InflateError::OverfullTree);
            };

            if level == 0 {
                if children[bit].is_some() {
                    return Err(InflateError::OverfullTree);
                }
                let leaf = self.push(Node::Leaf(symbol));
                self.set_child(node, bit, leaf);
            } else {
                node = match children[bit] {
                    Some(next) => next,
                    None => {
                        let branch = self.push(Node::Branch([None, None]));
                        self.set_child(node, bit, branch);
                        branch
                    }
                };
            }
        }

        self.next_code += 1;
        self.leaves += 1;
        Ok(())
    }

    fn set_child(&mut self, parent: NodeId, bit: usize, child: NodeId) {
        if let Node::Branch(children) = &mut self.nodes[parent as usize] {
            children[bit] = Some(child);
        }
    }

    /// Walk the tree one input bit at a time until a leaf is reached.
    pub fn decode<R: Read>(&self, bits: &mut BitReader<R>) -> Result<u16, InflateError> {
        let mut node = ROOT;
        loop {
            match self.nodes[node as usize] {
                Node::Leaf(symbol) => return Ok(symbol),
                Node::Branch(children) => {
                    let bit = bits.bit()? as usize;
                    node = children[bit].ok_or(InflateError::InvalidCode)?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pack a sequence of `(code, len)` pairs MSB-first per code, LSB-first per
    /// byte, the way DEFLATE transmits Huffman codes.
    fn pack_codes(codes: &[(u32, u8)]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut acc = 0u32;
        let mut n = 0;
        for &(code, len) in codes {
            for level in (0..len).rev() {
                acc |= ((code >> level) & 1) << n;
                n += 1;
                if n == 8 {
                    out.push(acc as u8);
                    acc = 0;
                    n = 0;
                }
            }
        }
        if n > 0 {
            out.push(acc as u8);
        }
        out
    }

    #[test]
    fn test_rfc1951_example_assignment() {
        // RFC 1951 3.2.2: lengths (3,3,3,3,3,2,4,4) for A..H give
        // F=00, A=010, B=011, C=100, D=101, E=110, G=1110, H=1111.
        let tree = HuffmanTree::from_lengths(&[3, 3, 3, 3, 3, 2, 4, 4], false).unwrap();
        let data = pack_codes(&[(0b00, 2), (0b010, 3), (0b1110, 4), (0b1111, 4), (0b110, 3)]);
        let mut bits = BitReader::new(&data[..]);
        let decoded: Vec<u16> = (0..5).map(|_| tree.decode(&mut bits).unwrap()).collect();
        assert_eq!(decoded, vec![5, 0, 6, 7, 4]);
    }

    #[test]
    fn test_overfull_tree_is_rejected() {
        let result = HuffmanTree::from_lengths(&[1, 1, 1], false);
        assert!(matches!(result, Err(InflateError::OverfullTree)));
    }

    #[test]
    fn test_incomplete_tree_is_rejected() {
        let result = HuffmanTree::from_lengths(&[2, 2, 2], false);
        assert!(matches!(result, Err(InflateError::IncompleteTree)));
    }

    #[test]
    fn test_single_code_allowed_when_sparse() {
        let tree = HuffmanTree::from_lengths(&[0, 1, 0], true).unwrap();
        assert!(!tree.is_complete());
        let mut bits = BitReader::new(&[0u8][..]);
        assert_eq!(tree.decode(&mut bits).unwrap(), 1);

        let mut bits = BitReader::new(&[1u8][..]);
        assert!(matches!(tree.decode(&mut bits), Err(InflateError::InvalidCode)));
    }
}
