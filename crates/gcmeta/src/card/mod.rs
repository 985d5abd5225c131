//! Card Module - Card Geometry and the Block-Offset Table
//!
//! The heap is divided into fixed-size cards. The block-offset table keeps
//! one byte per card so that the start of the block covering any card can be
//! found in a bounded number of reads.

pub mod block_offset_table;
pub mod constants;

pub use block_offset_table::BlockOffsetTable;
pub use constants::BotConstants;
