use crate::storage::page::RECORD_SIZE;

pub mod reader;
pub mod record;
pub mod recovery;
pub mod writer;

/// Upper bound for one log frame body.
/// UPDATE with two full slot images is the largest record emitted.
pub const MAX_FRAME_LEN: usize = 28 + 2 * RECORD_SIZE;
