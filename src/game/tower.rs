//! Tower State Model
//!
//! The tower is a flat list of blocks in layer-major order. Blocks are
//! never re-added: the only mutation is marking one removed, once.

use serde::{Serialize, Deserialize};

use crate::game::room::Seat;

/// Stable block identifier (its index in the tower).
pub type BlockId = u32;

/// A single block of the tower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Stable 0-based identifier.
    pub id: BlockId,
    /// Layer, 0 at the bottom.
    pub layer: u32,
    /// Position within the layer (1 is the middle of three).
    #[serde(rename = "index")]
    pub index_in_layer: u32,
    /// Whether the block has been pulled out.
    pub removed: bool,
    /// Who pulled it out.
    pub removed_by: Option<Seat>,
}

impl Block {
    /// Points awarded for removing this block.
    pub fn points(&self) -> u32 {
        (self.layer + 1) * 10
    }
}

/// Why a removal was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidMove {
    /// No block has this id.
    #[error("No such block!")]
    UnknownBlock(BlockId),

    /// The block was already removed.
    #[error("Block already removed!")]
    AlreadyRemoved(BlockId),

    /// The block sits in the current top layer.
    #[error("Can't remove from top layer!")]
    TopLayer,

    /// The block is the last one standing in its layer.
    #[error("Last block in this layer!")]
    LastInLayer,
}

/// Tower errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TowerError {
    /// Every block has been removed.
    #[error("Tower has no blocks left")]
    EmptyTower,

    /// The requested removal breaks the move rules.
    #[error(transparent)]
    InvalidMove(#[from] InvalidMove),
}

/// The tower of blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tower {
    blocks: Vec<Block>,
    blocks_per_layer: u32,
}

impl Tower {
    /// Build a fresh tower with every block in place.
    ///
    /// Ids are assigned layer-major, index-minor, starting at 0.
    pub fn build(layers: u32, blocks_per_layer: u32) -> Self {
        let mut blocks = Vec::with_capacity(layers as usize * blocks_per_layer as usize);
        for layer in 0..layers {
            for index_in_layer in 0..blocks_per_layer {
                blocks.push(Block {
                    id: blocks.len() as BlockId,
                    layer,
                    index_in_layer,
                    removed: false,
                    removed_by: None,
                });
            }
        }

        Self {
            blocks,
            blocks_per_layer,
        }
    }

    /// All blocks, in id order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Look up a block by id.
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id as usize)
    }

    /// Number of blocks per layer the tower was built with.
    pub fn blocks_per_layer(&self) -> u32 {
        self.blocks_per_layer
    }

    /// Highest layer that still holds a block.
    pub fn top_layer(&self) -> Result<u32, TowerError> {
        self.blocks
            .iter()
            .filter(|b| !b.removed)
            .map(|b| b.layer)
            .max()
            .ok_or(TowerError::EmptyTower)
    }

    /// Count of blocks still standing in `layer`.
    pub fn layer_occupancy(&self, layer: u32) -> u32 {
        self.blocks
            .iter()
            .filter(|b| !b.removed && b.layer == layer)
            .count() as u32
    }

    /// Total blocks removed so far.
    pub fn removed_count(&self) -> u32 {
        self.blocks.iter().filter(|b| b.removed).count() as u32
    }

    /// Check whether `id` may be removed, and why not.
    pub fn check_removal(&self, id: BlockId) -> Result<&Block, TowerError> {
        let block = self.block(id).ok_or(InvalidMove::UnknownBlock(id))?;
        if block.removed {
            return Err(InvalidMove::AlreadyRemoved(id).into());
        }
        if block.layer == self.top_layer()? {
            return Err(InvalidMove::TopLayer.into());
        }
        if self.layer_occupancy(block.layer) <= 1 {
            return Err(InvalidMove::LastInLayer.into());
        }
        Ok(block)
    }

    /// The move-legality rule shared by every client and the server.
    pub fn can_remove(&self, id: BlockId) -> bool {
        self.check_removal(id).is_ok()
    }

    /// Remove a block on behalf of `by`.
    ///
    /// Fails without touching the tower if the move is illegal, including a
    /// second removal of the same block.
    pub fn remove(&mut self, id: BlockId, by: Seat) -> Result<&Block, TowerError> {
        self.check_removal(id)?;

        let block = &mut self.blocks[id as usize];
        block.removed = true;
        block.removed_by = Some(by);
        Ok(block)
    }
}
