//! Test DAG fixtures.

use crate::{id::cid_for, random_bytes};
use bytes::Bytes;
use lassie_api::{Block, Cid};

/// A DAG of blocks with known links, listed root first in depth-first
/// order.
#[derive(Debug, Clone)]
pub struct TestDag {
    /// The root of the DAG.
    pub root: Cid,

    /// Every block of the DAG.
    pub blocks: Vec<Block>,
}

impl TestDag {
    /// A complete tree with `fanout` children per inner node and
    /// `depth` levels below the root. Leaves carry `leaf_size` random
    /// bytes.
    pub fn tree(fanout: usize, depth: usize, leaf_size: usize) -> Self {
        let mut blocks = Vec::new();
        let root = Self::node(fanout, depth, leaf_size, &mut blocks);
        blocks.reverse();
        Self { root, blocks }
    }

    /// A single block.
    pub fn single(size: usize) -> Self {
        Self::tree(0, 0, size)
    }

    fn node(
        fanout: usize,
        depth: usize,
        leaf_size: usize,
        blocks: &mut Vec<Block>,
    ) -> Cid {
        if depth == 0 {
            let data = Bytes::from(random_bytes(leaf_size));
            let cid = cid_for(&data);
            blocks.push(Block::new(cid.clone(), data));
            return cid;
        }

        // children are pushed before their parent, the final reverse
        // puts every parent ahead of its subtree
        let links: Vec<Cid> = (0..fanout)
            .rev()
            .map(|_| Self::node(fanout, depth - 1, leaf_size, blocks))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        let mut data = Vec::new();
        for link in &links {
            data.extend_from_slice(&link.0 .0);
        }
        let data = Bytes::from(data);
        let cid = cid_for(&data);
        blocks.push(Block::new(cid.clone(), data).with_links(links));
        cid
    }

    /// Sum of all block sizes.
    pub fn size(&self) -> u64 {
        self.blocks.iter().map(|b| b.data.len() as u64).sum()
    }

    /// The block with the given cid.
    pub fn get(&self, cid: &Cid) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.cid == cid)
    }
}
